//! Unit tests for view trees and view clipping

use super::*;

const ORIGIN: Point = Point { x: 100, y: 50 };

fn spec(token: u32, parent: u32, frame: Rect) -> ViewSpec {
    ViewSpec {
        token,
        parent,
        frame,
        event_mask: 0,
        hidden: false,
    }
}

fn content() -> Region {
    Region::from_rect(Rect::new(100, 50, 300, 250))
}

fn tree_with_root() -> ViewTree {
    let mut tree = ViewTree::new(64);
    tree.create_root(&spec(1, 0, Rect::new(0, 0, 200, 200))).unwrap();
    tree
}

#[test]
fn test_child_before_root_is_rejected() {
    let mut tree = ViewTree::new(64);
    assert_eq!(
        tree.create_child(&spec(2, 1, Rect::new(0, 0, 10, 10)), ViewKind::Normal),
        Err(ServerError::NoRootView)
    );
    assert!(tree.create_root(&spec(1, 0, Rect::new(0, 0, 10, 10))).is_ok());
    assert_eq!(
        tree.create_root(&spec(3, 0, Rect::new(0, 0, 10, 10))),
        Err(ServerError::RootViewExists)
    );
}

#[test]
fn test_token_reuse_and_limits() {
    let mut tree = ViewTree::new(2);
    tree.create_root(&spec(1, 0, Rect::new(0, 0, 10, 10))).unwrap();
    assert_eq!(
        tree.create_child(&spec(1, 1, Rect::new(0, 0, 5, 5)), ViewKind::Normal),
        Err(ServerError::BadValue("view token already in use"))
    );
    tree.create_child(&spec(2, 1, Rect::new(0, 0, 5, 5)), ViewKind::Normal)
        .unwrap();
    assert_eq!(
        tree.create_child(&spec(3, 1, Rect::new(0, 0, 5, 5)), ViewKind::Normal),
        Err(ServerError::ResourceExhausted("views"))
    );
    assert_eq!(
        tree.create_child(&spec(4, 99, Rect::new(0, 0, 5, 5)), ViewKind::Normal),
        Err(ServerError::BadViewToken(99))
    );
}

#[test]
fn test_root_owns_window_content() {
    let mut tree = tree_with_root();
    let clips = tree.clip_of(ViewToken(1), 1, ORIGIN, &content());
    assert_eq!(clips.visible, content());
    assert_eq!(clips.drawing, content());
}

#[test]
fn test_children_are_excluded_from_parent() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(10, 10, 60, 60)), ViewKind::Normal)
        .unwrap();

    let clips = tree.clips(1, ORIGIN, &content()).clone();
    let child = Rect::new(110, 60, 160, 110);
    assert_eq!(clips[&ViewToken(2)].visible, Region::from_rect(child));
    assert_eq!(clips[&ViewToken(1)].visible, content().subtract_rect(child));
}

#[test]
fn test_earlier_siblings_win_overlaps() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(0, 0, 100, 100)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(3, 1, Rect::new(50, 50, 150, 150)), ViewKind::Normal)
        .unwrap();

    let clips = tree.clips(1, ORIGIN, &content()).clone();
    let first = Rect::new(100, 50, 200, 150);
    let second = Rect::new(150, 100, 250, 200);
    assert_eq!(clips[&ViewToken(2)].visible, Region::from_rect(first));
    assert_eq!(
        clips[&ViewToken(3)].visible,
        Region::from_rect(second).subtract_rect(first)
    );
}

#[test]
fn test_child_is_limited_to_parent() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(150, 150, 300, 300)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(3, 2, Rect::new(0, 0, 500, 500)), ViewKind::Normal)
        .unwrap();

    let clips = tree.clips(1, ORIGIN, &content()).clone();
    assert_eq!(
        clips[&ViewToken(3)].visible,
        Region::from_rect(Rect::new(250, 200, 300, 250))
    );
    assert!(clips[&ViewToken(2)].visible.is_empty());
}

#[test]
fn test_scroll_offsets_children() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(20, 20, 40, 40)), ViewKind::Normal)
        .unwrap();
    tree.scroll_to(ViewToken(1), Point::new(10, 5)).unwrap();

    assert_eq!(
        tree.screen_frame(ViewToken(2), ORIGIN),
        Some(Rect::new(110, 65, 130, 85))
    );
    assert_eq!(tree.local_origin(ViewToken(1), ORIGIN), Some(Point::new(90, 45)));
}

#[test]
fn test_hidden_view_gives_area_back() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(0, 0, 100, 100)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(3, 2, Rect::new(0, 0, 10, 10)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(4, 1, Rect::new(50, 50, 150, 150)), ViewKind::Normal)
        .unwrap();
    tree.set_hidden(ViewToken(2), true).unwrap();

    let clips = tree.clips(1, ORIGIN, &content()).clone();
    assert!(clips[&ViewToken(2)].visible.is_empty());
    assert!(clips[&ViewToken(3)].visible.is_empty());
    // the later sibling gets its full frame
    assert_eq!(
        clips[&ViewToken(4)].visible,
        Region::from_rect(Rect::new(150, 100, 250, 200))
    );
    assert_eq!(
        clips[&ViewToken(1)].visible,
        content().subtract_rect(Rect::new(150, 100, 250, 200))
    );
}

#[test]
fn test_user_clip_only_narrows() {
    let mut tree = tree_with_root();
    let user = Region::from_rect(Rect::new(-50, -50, 20, 20));
    tree.set_user_clip(ViewToken(1), Some(&user)).unwrap();

    let clips = tree.clip_of(ViewToken(1), 1, ORIGIN, &content());
    assert_eq!(clips.visible, content());
    assert_eq!(clips.drawing, Region::from_rect(Rect::new(100, 50, 120, 70)));
}

#[test]
fn test_user_clip_does_not_reach_children() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(100, 100, 150, 150)), ViewKind::Normal)
        .unwrap();
    tree.set_user_clip(ViewToken(1), Some(&Region::from_rect(Rect::new(0, 0, 10, 10))))
        .unwrap();

    let clips = tree.clips(1, ORIGIN, &content()).clone();
    assert_eq!(
        clips[&ViewToken(2)].drawing,
        Region::from_rect(Rect::new(200, 150, 250, 200))
    );
}

#[test]
fn test_setting_user_clip_twice_is_idempotent() {
    let mut tree = tree_with_root();
    let user = Region::from_rects([Rect::new(0, 0, 30, 30), Rect::new(60, 60, 90, 90)]);

    tree.set_user_clip(ViewToken(1), Some(&user)).unwrap();
    let once = tree.clip_of(ViewToken(1), 1, ORIGIN, &content());
    tree.set_user_clip(ViewToken(1), Some(&user)).unwrap();
    let twice = tree.clip_of(ViewToken(1), 1, ORIGIN, &content());
    assert_eq!(once, twice);
}

#[test]
fn test_user_clip_follows_origin_and_scale() {
    let mut tree = tree_with_root();
    tree.apply_state(ViewToken(1), &StateOp::SetOrigin(PointF::new(10.0, 10.0)))
        .unwrap();
    tree.apply_state(ViewToken(1), &StateOp::SetScale(2.0)).unwrap();
    tree.set_user_clip(ViewToken(1), Some(&Region::from_rect(Rect::new(0, 0, 5, 5))))
        .unwrap();

    let clips = tree.clip_of(ViewToken(1), 1, ORIGIN, &content());
    assert_eq!(clips.drawing, Region::from_rect(Rect::new(110, 60, 120, 70)));
}

#[test]
fn test_children_follow_parent_origin_and_scale() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(5, 5, 15, 15)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(3, 2, Rect::new(1, 1, 3, 3)), ViewKind::Normal)
        .unwrap();
    let before = tree.clip_of(ViewToken(2), 1, ORIGIN, &content());
    assert_eq!(before.visible.bounds(), Rect::new(105, 55, 115, 65));

    let root = ViewToken(1);
    tree.apply_state(root, &StateOp::SetOrigin(PointF::new(10.0, 10.0)))
        .unwrap();
    tree.apply_state(root, &StateOp::SetScale(2.0)).unwrap();
    tree.apply_state(ViewToken(2), &StateOp::SetScale(3.0)).unwrap();

    assert_eq!(tree.screen_frame(ViewToken(2), ORIGIN), Some(Rect::new(120, 70, 140, 90)));
    assert_eq!(tree.local_origin(ViewToken(2), ORIGIN), Some(Point::new(120, 70)));
    // the grandchild goes through both scales
    assert_eq!(tree.screen_frame(ViewToken(3), ORIGIN), Some(Rect::new(123, 73, 129, 79)));

    let after = tree.clip_of(ViewToken(2), 1, ORIGIN, &content());
    assert_eq!(
        after.visible,
        Region::from_rect(Rect::new(120, 70, 140, 90)).subtract_rect(Rect::new(123, 73, 129, 79))
    );

    // popping the state puts the children back
    tree.apply_state(root, &StateOp::PushState).unwrap();
    tree.apply_state(root, &StateOp::SetOrigin(PointF::new(50.0, 0.0)))
        .unwrap();
    assert_eq!(tree.screen_frame(ViewToken(2), ORIGIN), Some(Rect::new(220, 70, 240, 90)));
    tree.apply_state(root, &StateOp::PopState).unwrap();
    assert_eq!(tree.clip_of(ViewToken(2), 1, ORIGIN, &content()), after);
}

#[test]
fn test_state_stack_push_pop() {
    let mut tree = tree_with_root();
    let root = ViewToken(1);
    tree.apply_state(root, &StateOp::SetHighColor(Rgba::new(1, 2, 3, 255)))
        .unwrap();
    tree.apply_state(root, &StateOp::SetOrigin(PointF::new(5.0, 5.0)))
        .unwrap();
    tree.apply_state(root, &StateOp::PushState).unwrap();
    tree.apply_state(root, &StateOp::SetOrigin(PointF::new(1.0, 1.0)))
        .unwrap();
    tree.apply_state(root, &StateOp::SetScale(3.0)).unwrap();

    let view = tree.get(root).unwrap();
    assert_eq!(view.state_depth(), 2);
    assert_eq!(view.state().high_color, Rgba::new(1, 2, 3, 255));
    assert_eq!(view.transform(), (PointF::new(6.0, 6.0), 3.0));
    assert_eq!(view.map_point(PointF::new(1.0, 0.0)), PointF::new(9.0, 6.0));

    tree.apply_state(root, &StateOp::PopState).unwrap();
    tree.apply_state(root, &StateOp::PopState).unwrap();
    let view = tree.get(root).unwrap();
    assert_eq!(view.state_depth(), 1);
    assert_eq!(view.transform(), (PointF::new(5.0, 5.0), 1.0));
}

#[test]
fn test_pushed_user_clips_intersect() {
    let mut tree = tree_with_root();
    let root = ViewToken(1);
    tree.set_user_clip(root, Some(&Region::from_rect(Rect::new(0, 0, 50, 50))))
        .unwrap();
    tree.apply_state(root, &StateOp::PushState).unwrap();
    tree.set_user_clip(root, Some(&Region::from_rect(Rect::new(25, 25, 100, 100))))
        .unwrap();

    let clips = tree.clip_of(root, 1, ORIGIN, &content());
    assert_eq!(clips.drawing, Region::from_rect(Rect::new(125, 75, 150, 100)));

    tree.apply_state(root, &StateOp::PopState).unwrap();
    let clips = tree.clip_of(root, 1, ORIGIN, &content());
    assert_eq!(clips.drawing, Region::from_rect(Rect::new(100, 50, 150, 100)));
}

#[test]
fn test_cache_follows_generations() {
    let mut tree = tree_with_root();
    tree.clips(7, ORIGIN, &content());
    assert!(tree.is_cached(7));
    assert!(!tree.is_cached(8));

    tree.move_to(ViewToken(1), Point::new(5, 5)).unwrap();
    assert!(!tree.is_cached(7));

    // a new window generation picks up a new content region
    let smaller = Region::from_rect(Rect::new(100, 50, 150, 100));
    let clips = tree.clip_of(ViewToken(1), 8, ORIGIN, &smaller);
    assert_eq!(clips.visible, Region::from_rect(Rect::new(105, 55, 150, 100)));
}

#[test]
fn test_delete_removes_subtree() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(0, 0, 50, 50)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(3, 2, Rect::new(0, 0, 10, 10)), ViewKind::Normal)
        .unwrap();
    tree.create_child(&spec(4, 1, Rect::new(60, 0, 70, 10)), ViewKind::Workspaces)
        .unwrap();

    let removed = tree.delete(ViewToken(2)).unwrap();
    assert_eq!(removed, vec![ViewToken(2), ViewToken(3)]);
    assert!(tree.get(ViewToken(3)).is_none());
    assert_eq!(tree.get(ViewToken(1)).unwrap().children, vec![ViewToken(4)]);
    assert_eq!(tree.tokens_of_kind(ViewKind::Workspaces), vec![ViewToken(4)]);
    assert!(matches!(
        tree.delete(ViewToken(1)),
        Err(ServerError::NotAllowed(_))
    ));
}

#[test]
fn test_invalid_state_values_are_rejected() {
    let mut tree = tree_with_root();
    assert!(tree.apply_state(ViewToken(1), &StateOp::SetScale(0.0)).is_err());
    assert!(tree.apply_state(ViewToken(1), &StateOp::SetPenSize(f32::NAN)).is_err());
    assert_eq!(
        tree.apply_state(ViewToken(9), &StateOp::PushState),
        Err(ServerError::BadViewToken(9))
    );
}

#[test]
fn test_view_at() {
    let mut tree = tree_with_root();
    tree.create_child(&spec(2, 1, Rect::new(0, 0, 50, 50)), ViewKind::Normal)
        .unwrap();
    assert_eq!(
        tree.view_at(Point::new(110, 60), 1, ORIGIN, &content()),
        Some(ViewToken(2))
    );
    assert_eq!(
        tree.view_at(Point::new(250, 200), 1, ORIGIN, &content()),
        Some(ViewToken(1))
    );
    assert_eq!(tree.view_at(Point::new(0, 0), 1, ORIGIN, &content()), None);
}
