//! Property-based tests for view clipping

use super::*;
use proptest::prelude::*;

const WINDOW: Point = Point { x: 10, y: 10 };

#[derive(Debug, Clone)]
struct NodeSpec {
    parent_pick: usize,
    frame: Rect,
    hidden: bool,
}

prop_compose! {
    fn node()(
        parent_pick in 0usize..64,
        left in -10i32..60, top in -10i32..60,
        width in 0i32..50, height in 0i32..50,
        hidden in prop::bool::weighted(0.2),
    ) -> NodeSpec {
        NodeSpec { parent_pick, frame: Rect::from_size(left, top, width, height), hidden }
    }
}

fn build(nodes: &[NodeSpec]) -> ViewTree {
    let mut tree = ViewTree::new(256);
    tree.create_root(&ViewSpec {
        token: 1,
        parent: 0,
        frame: Rect::new(0, 0, 80, 80),
        event_mask: 0,
        hidden: false,
    })
    .unwrap();
    for (i, node) in nodes.iter().enumerate() {
        let token = i as u32 + 2;
        let parent = (node.parent_pick % (i + 1)) as u32 + 1;
        tree.create_child(
            &ViewSpec {
                token,
                parent,
                frame: node.frame,
                event_mask: 0,
                hidden: node.hidden,
            },
            ViewKind::Normal,
        )
        .unwrap();
    }
    tree
}

fn content() -> Region {
    Region::from_rects([Rect::new(0, 0, 70, 90), Rect::new(70, 20, 100, 50)])
}

fn is_hidden_or_below_hidden(tree: &ViewTree, mut token: ViewToken) -> bool {
    while let Some(view) = tree.get(token) {
        if view.hidden {
            return true;
        }
        match view.parent {
            Some(parent) => token = parent,
            None => return false,
        }
    }
    false
}

proptest! {
    #[test]
    fn prop_visible_clips_are_disjoint(nodes in prop::collection::vec(node(), 0..12)) {
        let mut tree = build(&nodes);
        let clips = tree.clips(1, WINDOW, &content()).clone();
        let all: Vec<&Region> = clips.values().map(|c| &c.visible).collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                prop_assert!(a.intersect(b).is_empty());
            }
        }
    }

    #[test]
    fn prop_visible_clips_cover_root_claim(nodes in prop::collection::vec(node(), 0..12)) {
        let mut tree = build(&nodes);
        let clips = tree.clips(1, WINDOW, &content()).clone();
        let union = clips
            .values()
            .fold(Region::new(), |acc, c| acc.union(&c.visible));
        let root_frame = tree.screen_frame(ViewToken(1), WINDOW).unwrap();
        prop_assert_eq!(union, content().intersect_rect(root_frame));
    }

    #[test]
    fn prop_hidden_subtrees_have_empty_clips(nodes in prop::collection::vec(node(), 1..12)) {
        let mut tree = build(&nodes);
        let clips = tree.clips(1, WINDOW, &content()).clone();
        for (token, clip) in &clips {
            if is_hidden_or_below_hidden(&tree, *token) {
                prop_assert!(clip.visible.is_empty());
                prop_assert!(clip.drawing.is_empty());
            }
        }
    }

    #[test]
    fn prop_hiding_a_view_matches_removing_it(
        nodes in prop::collection::vec(node(), 1..10),
        pick in 0usize..10,
    ) {
        let target = ViewToken((pick % nodes.len()) as u32 + 2);
        let mut hidden = build(&nodes);
        hidden.set_hidden(target, true).unwrap();
        let mut removed = build(&nodes);
        let gone = removed.delete(target).unwrap();

        let with_hidden = hidden.clips(1, WINDOW, &content()).clone();
        let with_removed = removed.clips(1, WINDOW, &content()).clone();
        for (token, clip) in &with_removed {
            prop_assert_eq!(&with_hidden[token], clip);
        }
        for token in gone {
            prop_assert!(with_hidden[&token].visible.is_empty());
        }
    }

    #[test]
    fn prop_drawing_clip_within_visible(
        nodes in prop::collection::vec(node(), 0..8),
        user in prop::collection::vec(
            (0i32..80, 0i32..80, 1i32..40, 1i32..40)
                .prop_map(|(x, y, w, h)| Rect::from_size(x, y, w, h)),
            0..4,
        ),
    ) {
        let mut tree = build(&nodes);
        let user = Region::from_rects(user);
        tree.set_user_clip(ViewToken(1), Some(&user)).unwrap();
        let once = tree.clips(1, WINDOW, &content()).clone();
        tree.set_user_clip(ViewToken(1), Some(&user)).unwrap();
        let twice = tree.clips(1, WINDOW, &content()).clone();
        prop_assert_eq!(&once, &twice);

        for clip in once.values() {
            prop_assert_eq!(clip.drawing.subtract(&clip.visible), Region::new());
        }
    }

    #[test]
    fn prop_cache_matches_fresh_walk(
        nodes in prop::collection::vec(node(), 1..10),
        dx in -20i32..20, dy in -20i32..20,
        pick in 0usize..10,
    ) {
        let mut tree = build(&nodes);
        tree.clips(1, WINDOW, &content());
        let target = ViewToken((pick % nodes.len()) as u32 + 2);
        tree.move_to(target, Point::new(dx, dy)).unwrap();

        let fresh = tree.compute_clips(WINDOW, &content());
        prop_assert_eq!(tree.clips(1, WINDOW, &content()), &fresh);
    }

    #[test]
    fn prop_children_follow_ancestor_transforms(
        nodes in prop::collection::vec(node(), 1..10),
        dx in -20i32..20, dy in -20i32..20,
        scale in 1i32..4,
    ) {
        let mut tree = build(&nodes);
        tree.clips(1, WINDOW, &content());
        let root = ViewToken(1);
        tree.apply_state(root, &StateOp::SetOrigin(PointF::new(dx as f32, dy as f32))).unwrap();
        tree.apply_state(root, &StateOp::SetScale(scale as f32)).unwrap();

        let clips = tree.clips(1, WINDOW, &content()).clone();
        prop_assert_eq!(&clips, &tree.compute_clips(WINDOW, &content()));
        let local = tree.local_origin(root, WINDOW).unwrap();
        for (i, node) in nodes.iter().enumerate() {
            let token = ViewToken(i as u32 + 2);
            if tree.get(token).unwrap().parent != Some(root) {
                continue;
            }
            let f = node.frame;
            let expected = Rect::new(
                local.x + dx + f.left * scale,
                local.y + dy + f.top * scale,
                local.x + dx + f.right * scale,
                local.y + dy + f.bottom * scale,
            );
            prop_assert_eq!(tree.screen_frame(token, WINDOW), Some(expected));
            prop_assert!(clips[&token].visible.subtract_rect(expected).is_empty());
        }

        let union = clips.values().fold(Region::new(), |acc, c| acc.union(&c.visible));
        let root_frame = tree.screen_frame(root, WINDOW).unwrap();
        prop_assert_eq!(union, content().intersect_rect(root_frame));
    }
}
