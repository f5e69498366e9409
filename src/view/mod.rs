//! View trees
//!
//! Every window owns a tree of [`ViewLayer`]s. A view's frame is expressed
//! in its parent's drawing coordinates: the parent's frame origin shifted by
//! its scroll offset, then mapped through the parent's composed drawing
//! origin and scale. Transforms compose down the tree, so a child lands where
//! the parent would have drawn its frame. The root view's frame is in window
//! content coordinates.
//!
//! # Clipping
//!
//! Clips are a pure function of the window's content region and the tree.
//! The walk starts with the window's content clip as the root's remaining
//! area and proceeds depth first:
//!
//! - a view claims `remaining ∩ screen_frame`;
//! - its children are visited in order, each getting what is left of the
//!   parent's claim after earlier siblings took theirs;
//! - the parent keeps its claim minus everything its children claimed;
//! - a view's drawing clip is what it keeps, intersected with its user clip.
//!   User clips never widen a clip and never affect children.
//!
//! A hidden view claims nothing: its area stays with later siblings and the
//! parent, and its whole subtree has empty clips.
//!
//! Changing a parent's origin or scale moves its children and so bumps the
//! tree generation like any other geometry change.
//!
//! Results are cached under the pair (window clip generation, tree
//! generation). Any change to the tree bumps the tree generation; the
//! desktop bumps the window generation whenever it recomputes the window's
//! clip. The cache is rebuilt lazily on the next query.

use bitflags::bitflags;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::ServerError;
use crate::geometry::{Point, PointF, Rect, RectF, Rgba};
use crate::protocol::{DrawingMode, StateOp, ViewSpec};
use crate::region::Region;
use crate::renderer::Paint;

/// Client-assigned view identifier, unique within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ViewToken(pub u32);

bitflags! {
    /// Input a view wants delivered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct EventMask: u32 {
        const POINTER = 1 << 0;
        const KEYBOARD = 1 << 1;
        const LOCK_FOCUS = 1 << 2;
        const NO_POINTER_HISTORY = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewKind {
    Normal,
    /// Server-drawn miniature of every workspace.
    Workspaces,
}

/// One entry of a view's drawing-state stack.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawState {
    pub high_color: Rgba,
    pub low_color: Rgba,
    pub pen_size: f32,
    pub mode: DrawingMode,
    /// Relative to the state below.
    pub origin: PointF,
    /// Relative to the state below.
    pub scale: f32,
    pub font: u32,
    /// In view coordinates with this state's transform already applied.
    pub user_clip: Option<Region>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            high_color: Rgba::BLACK,
            low_color: Rgba::WHITE,
            pen_size: 1.0,
            mode: DrawingMode::Copy,
            origin: PointF::new(0.0, 0.0),
            scale: 1.0,
            font: 0,
            user_clip: None,
        }
    }
}

impl DrawState {
    /// The state a push starts from: colors, pen and font carry over, the
    /// transform and user clip start fresh.
    fn pushed(&self) -> DrawState {
        DrawState {
            origin: PointF::new(0.0, 0.0),
            scale: 1.0,
            user_clip: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewLayer {
    pub token: ViewToken,
    pub parent: Option<ViewToken>,
    pub children: Vec<ViewToken>,
    /// In the parent's coordinate system.
    pub frame: Rect,
    pub scroll: Point,
    pub hidden: bool,
    pub event_mask: EventMask,
    pub kind: ViewKind,
    states: Vec<DrawState>,
}

impl ViewLayer {
    fn new(spec: &ViewSpec, parent: Option<ViewToken>, kind: ViewKind) -> Self {
        Self {
            token: ViewToken(spec.token),
            parent,
            children: Vec::new(),
            frame: spec.frame,
            scroll: Point::ORIGIN,
            hidden: spec.hidden,
            event_mask: EventMask::from_bits_truncate(spec.event_mask),
            kind,
            states: vec![DrawState::default()],
        }
    }

    pub fn state(&self) -> &DrawState {
        // the stack is never empty
        &self.states[self.states.len() - 1]
    }

    fn state_mut(&mut self) -> &mut DrawState {
        let top = self.states.len() - 1;
        &mut self.states[top]
    }

    pub fn state_depth(&self) -> usize {
        self.states.len()
    }

    pub fn paint(&self) -> Paint {
        let state = self.state();
        Paint {
            color: state.high_color,
            pen_size: state.pen_size * self.transform().1,
            mode: state.mode,
        }
    }

    /// Composed (origin, scale) of the whole state stack.
    pub fn transform(&self) -> (PointF, f32) {
        self.states.iter().fold((PointF::new(0.0, 0.0), 1.0), |(origin, scale), s| {
            (
                PointF::new(origin.x + s.origin.x * scale, origin.y + s.origin.y * scale),
                scale * s.scale,
            )
        })
    }

    /// Maps a drawing-space rectangle into view coordinates.
    pub fn map_rect(&self, rect: RectF) -> RectF {
        let (origin, scale) = self.transform();
        RectF::new(
            rect.left * scale + origin.x,
            rect.top * scale + origin.y,
            rect.right * scale + origin.x,
            rect.bottom * scale + origin.y,
        )
    }

    pub fn map_point(&self, point: PointF) -> PointF {
        let (origin, scale) = self.transform();
        PointF::new(point.x * scale + origin.x, point.y * scale + origin.y)
    }

    /// Where a child with `frame` sits in this view's local pixel
    /// coordinates.
    pub fn child_frame(&self, frame: Rect) -> Rect {
        self.map_rect(frame.to_f32()).to_pixels()
    }

    /// Intersection of the user clips of every stacked state.
    pub fn user_clip(&self) -> Option<Region> {
        self.states
            .iter()
            .filter_map(|s| s.user_clip.as_ref())
            .fold(None, |acc: Option<Region>, clip| {
                Some(match acc {
                    Some(acc) => acc.intersect(clip),
                    None => clip.clone(),
                })
            })
    }
}

/// Clips of one view, in screen coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewClips {
    /// Pixels the view owns after children and siblings took theirs.
    pub visible: Region,
    /// `visible` narrowed by the user clip.
    pub drawing: Region,
}

#[derive(Debug)]
struct ClipCache {
    key: (u64, u64),
    clips: HashMap<ViewToken, ViewClips>,
}

/// A window's views.
#[derive(Debug)]
pub struct ViewTree {
    views: HashMap<ViewToken, ViewLayer>,
    root: Option<ViewToken>,
    generation: u64,
    cache: Option<ClipCache>,
    max_views: usize,
}

impl ViewTree {
    pub fn new(max_views: usize) -> Self {
        Self {
            views: HashMap::new(),
            root: None,
            generation: 0,
            cache: None,
            max_views,
        }
    }

    pub fn root(&self) -> Option<ViewToken> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, token: ViewToken) -> Option<&ViewLayer> {
        self.views.get(&token)
    }

    fn get_mut(&mut self, token: ViewToken) -> Result<&mut ViewLayer, ServerError> {
        self.views
            .get_mut(&token)
            .ok_or(ServerError::BadViewToken(token.0))
    }

    fn touch(&mut self) {
        self.generation += 1;
    }

    fn check_new_token(&self, token: u32) -> Result<(), ServerError> {
        if self.views.contains_key(&ViewToken(token)) {
            return Err(ServerError::BadValue("view token already in use"));
        }
        if self.views.len() >= self.max_views {
            return Err(ServerError::ResourceExhausted("views"));
        }
        Ok(())
    }

    pub fn create_root(&mut self, spec: &ViewSpec) -> Result<ViewToken, ServerError> {
        if self.root.is_some() {
            return Err(ServerError::RootViewExists);
        }
        self.check_new_token(spec.token)?;
        let view = ViewLayer::new(spec, None, ViewKind::Normal);
        let token = view.token;
        self.views.insert(token, view);
        self.root = Some(token);
        self.touch();
        Ok(token)
    }

    pub fn create_child(&mut self, spec: &ViewSpec, kind: ViewKind) -> Result<ViewToken, ServerError> {
        if self.root.is_none() {
            return Err(ServerError::NoRootView);
        }
        let parent = ViewToken(spec.parent);
        if !self.views.contains_key(&parent) {
            return Err(ServerError::BadViewToken(spec.parent));
        }
        self.check_new_token(spec.token)?;

        let view = ViewLayer::new(spec, Some(parent), kind);
        let token = view.token;
        self.views.insert(token, view);
        self.get_mut(parent)?.children.push(token);
        self.touch();
        Ok(token)
    }

    /// Removes a view and its subtree; returns every removed token.
    pub fn delete(&mut self, token: ViewToken) -> Result<Vec<ViewToken>, ServerError> {
        let view = self.views.get(&token).ok_or(ServerError::BadViewToken(token.0))?;
        let Some(parent) = view.parent else {
            return Err(ServerError::NotAllowed("the root view cannot be deleted"));
        };

        let removed = self.subtree(token);
        for t in &removed {
            self.views.remove(t);
        }
        self.get_mut(parent)?.children.retain(|c| *c != token);
        self.touch();
        Ok(removed)
    }

    /// `token` and all its descendants, parents first.
    pub fn subtree(&self, token: ViewToken) -> Vec<ViewToken> {
        let mut out = Vec::new();
        let mut pending = vec![token];
        while let Some(t) = pending.pop() {
            if let Some(view) = self.views.get(&t) {
                out.push(t);
                pending.extend(view.children.iter().rev());
            }
        }
        out
    }

    pub fn tokens_of_kind(&self, kind: ViewKind) -> Vec<ViewToken> {
        let mut tokens: Vec<ViewToken> = self
            .views
            .values()
            .filter(|v| v.kind == kind)
            .map(|v| v.token)
            .collect();
        tokens.sort();
        tokens
    }

    pub fn move_to(&mut self, token: ViewToken, to: Point) -> Result<(), ServerError> {
        let view = self.get_mut(token)?;
        view.frame = view.frame.offset_to(to.x, to.y);
        self.touch();
        Ok(())
    }

    pub fn resize_to(&mut self, token: ViewToken, width: i32, height: i32) -> Result<(), ServerError> {
        if width < 0 || height < 0 {
            return Err(ServerError::BadValue("negative view size"));
        }
        let view = self.get_mut(token)?;
        view.frame = Rect::from_size(view.frame.left, view.frame.top, width, height);
        self.touch();
        Ok(())
    }

    pub fn scroll_to(&mut self, token: ViewToken, to: Point) -> Result<(), ServerError> {
        self.get_mut(token)?.scroll = to;
        self.touch();
        Ok(())
    }

    pub fn set_hidden(&mut self, token: ViewToken, hidden: bool) -> Result<(), ServerError> {
        let view = self.get_mut(token)?;
        if view.hidden != hidden {
            view.hidden = hidden;
            self.touch();
        }
        Ok(())
    }

    pub fn set_event_mask(&mut self, token: ViewToken, mask: EventMask) -> Result<(), ServerError> {
        self.get_mut(token)?.event_mask = mask;
        Ok(())
    }

    /// Sets or clears the current state's user clip. `clip` is in drawing
    /// coordinates and goes through the current origin and scale.
    pub fn set_user_clip(&mut self, token: ViewToken, clip: Option<&Region>) -> Result<(), ServerError> {
        let view = self.get_mut(token)?;
        let mapped = clip.map(|region| {
            region.map_rects(|r| {
                let f = view.map_rect(r.to_f32());
                f.to_pixels()
            })
        });
        view.state_mut().user_clip = mapped;
        self.touch();
        Ok(())
    }

    pub fn apply_state(&mut self, token: ViewToken, op: &StateOp) -> Result<(), ServerError> {
        let view = self.get_mut(token)?;
        let transform = view.transform();
        let mut clip_changed = false;
        match op {
            StateOp::SetHighColor(c) => view.state_mut().high_color = *c,
            StateOp::SetLowColor(c) => view.state_mut().low_color = *c,
            StateOp::SetPenSize(size) => {
                if !size.is_finite() || *size < 0.0 {
                    return Err(ServerError::BadValue("pen size"));
                }
                view.state_mut().pen_size = *size;
            }
            StateOp::SetDrawingMode(mode) => view.state_mut().mode = *mode,
            StateOp::SetOrigin(origin) => view.state_mut().origin = *origin,
            StateOp::SetScale(scale) => {
                if !scale.is_finite() || *scale <= 0.0 {
                    return Err(ServerError::BadValue("scale"));
                }
                view.state_mut().scale = *scale;
            }
            StateOp::SetFont(font) => view.state_mut().font = *font,
            StateOp::PushState => {
                let next = view.state().pushed();
                view.states.push(next);
            }
            StateOp::PopState => {
                if view.states.len() > 1 {
                    clip_changed = view.state().user_clip.is_some();
                    view.states.pop();
                }
            }
        }
        // children follow the parent's transform
        if !view.children.is_empty() && view.transform() != transform {
            clip_changed = true;
        }
        if clip_changed {
            self.touch();
        }
        Ok(())
    }

    /// Top-left of the view's local coordinate system on screen.
    pub fn local_origin(&self, token: ViewToken, window_origin: Point) -> Option<Point> {
        let frame = self.screen_frame(token, window_origin)?;
        let view = self.views.get(&token)?;
        Some(frame.left_top().offset_by(-view.scroll.x, -view.scroll.y))
    }

    /// The view's frame in screen coordinates.
    pub fn screen_frame(&self, token: ViewToken, window_origin: Point) -> Option<Rect> {
        let view = self.views.get(&token)?;
        let Some(parent) = view.parent else {
            return Some(view.frame.offset_by(window_origin.x, window_origin.y));
        };
        let origin = self.local_origin(parent, window_origin)?;
        let frame = self.views.get(&parent)?.child_frame(view.frame);
        Some(frame.offset_by(origin.x, origin.y))
    }

    /// Clips of every view. Recomputed only when `window_generation` or
    /// the tree changed since the last call.
    pub fn clips(
        &mut self,
        window_generation: u64,
        window_origin: Point,
        content: &Region,
    ) -> &HashMap<ViewToken, ViewClips> {
        let key = (window_generation, self.generation);
        let cache = match self.cache.take() {
            Some(cache) if cache.key == key => cache,
            _ => ClipCache {
                key,
                clips: self.compute_clips(window_origin, content),
            },
        };
        &self.cache.insert(cache).clips
    }

    pub fn clip_of(
        &mut self,
        token: ViewToken,
        window_generation: u64,
        window_origin: Point,
        content: &Region,
    ) -> ViewClips {
        self.clips(window_generation, window_origin, content)
            .get(&token)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the cached clips are current for `window_generation`.
    pub fn is_cached(&self, window_generation: u64) -> bool {
        self.cache
            .as_ref()
            .map_or(false, |c| c.key == (window_generation, self.generation))
    }

    /// Computes the clips from scratch.
    pub fn compute_clips(&self, window_origin: Point, content: &Region) -> HashMap<ViewToken, ViewClips> {
        let mut clips = HashMap::with_capacity(self.views.len());
        if let Some(root) = self.root.and_then(|root| self.views.get(&root)) {
            let frame = root.frame.offset_by(window_origin.x, window_origin.y);
            self.walk(root.token, frame, content, &mut clips);
        }
        clips
    }

    /// Visits `token`, whose frame has already been placed on screen.
    fn walk(
        &self,
        token: ViewToken,
        frame: Rect,
        remaining: &Region,
        clips: &mut HashMap<ViewToken, ViewClips>,
    ) -> Region {
        let Some(view) = self.views.get(&token) else {
            return Region::new();
        };
        if view.hidden {
            for t in self.subtree(token) {
                clips.insert(t, ViewClips::default());
            }
            return Region::new();
        }

        let claim = remaining.intersect_rect(frame);
        let local = frame.left_top().offset_by(-view.scroll.x, -view.scroll.y);

        let mut own = claim.clone();
        for child in &view.children {
            let Some(placed) = self.views.get(child).map(|c| view.child_frame(c.frame)) else {
                continue;
            };
            let taken = self.walk(*child, placed.offset_by(local.x, local.y), &own, clips);
            if !taken.is_empty() {
                own = own.subtract(&taken);
            }
        }

        let drawing = match view.user_clip() {
            Some(user) => own.intersect(&user.offset_by(local.x, local.y)),
            None => own.clone(),
        };
        clips.insert(token, ViewClips { visible: own, drawing });
        claim
    }

    /// Topmost visible view containing `point`, by clip ownership.
    pub fn view_at(
        &mut self,
        point: Point,
        window_generation: u64,
        window_origin: Point,
        content: &Region,
    ) -> Option<ViewToken> {
        self.clips(window_generation, window_origin, content)
            .iter()
            .find(|(_, clips)| clips.visible.contains(point))
            .map(|(token, _)| *token)
    }
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod property_tests;
