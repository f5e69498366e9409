//! Structural desktop state
//!
//! Everything guarded by the structural lock: windows, per-workspace
//! z-order, focus and the clipping of every window. Mutators live on
//! `&mut DesktopState` and are reachable only through a
//! [`WriteToken`](super::WriteToken).
//!
//! Every mutation ends in [`DesktopState::rebuild_clipping`], which walks the
//! current workspace front to back, assigns each visible window what is left
//! of the screen, and repaints what became exposed: background in the
//! workspace color, decorations through the decorator, and window content by
//! posting an `Update` to the client.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::paint;
use crate::config::TesseraConfig;
use crate::direct::{BufferFlags, BufferState, DirectWindowSession, ScreenInfo};
use crate::error::ServerError;
use crate::geometry::{clamp_coordinate, Point, Rect, MAX_COORDINATE};
use crate::ipc::PortHandle;
use crate::protocol::events::ServerEvent;
use crate::protocol::{SizeLimits, WindowSpec};
use crate::region::Region;
use crate::renderer::DrawingEngine;
use crate::view::ViewKind;
use crate::window::{
    all_workspaces, WindowFeel, WindowFlags, WindowId, WindowLayer, WindowLook, WindowSnapshot,
};
use crate::workspace::{mask_indices, Workspace, WorkspaceSnapshot};
use crate::workspaces_view;

/// A hand-off owed to a direct-window client, delivered once the structural
/// lock is released. The stamp is taken under the lock, so a notice that
/// loses the race to a newer one is dropped on delivery.
#[derive(Debug, Clone)]
pub struct DirectNotice {
    pub window: WindowId,
    pub session: Arc<DirectWindowSession>,
    pub stamp: u64,
    pub state: BufferState,
    pub flags: BufferFlags,
    pub frame: Rect,
    pub clip: Region,
    pub screen: ScreenInfo,
}

impl DirectNotice {
    pub fn deliver(&self) {
        let delivered = self.session.handoff_stamped(
            self.stamp,
            self.state,
            self.flags,
            self.frame,
            &self.clip,
            self.screen,
        );
        if let Err(err) = delivered {
            debug!("window {}: direct hand-off failed: {}", self.window, err);
        }
    }
}

pub struct DesktopState {
    config: Arc<TesseraConfig>,
    engine: Arc<dyn DrawingEngine>,
    screen: ScreenInfo,
    windows: HashMap<WindowId, WindowLayer>,
    workspaces: Vec<Workspace>,
    current: usize,
    previous: usize,
    focus: Option<WindowId>,
    /// Screen area no window covers on the current workspace.
    background: Region,
    next_id: u32,
    direct_flags: HashMap<WindowId, BufferFlags>,
    pending_direct: Vec<DirectNotice>,
}

impl fmt::Debug for DesktopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesktopState")
            .field("screen", &self.screen)
            .field("windows", &self.windows.len())
            .field("current", &self.current)
            .field("focus", &self.focus)
            .finish()
    }
}

impl DesktopState {
    pub(super) fn new(config: Arc<TesseraConfig>, engine: Arc<dyn DrawingEngine>, screen: ScreenInfo) -> Self {
        let workspaces = Workspace::from_config(&config.workspaces);
        let current = (config.workspaces.initial as usize).min(workspaces.len() - 1);
        let mut state = Self {
            config,
            engine,
            screen,
            windows: HashMap::new(),
            workspaces,
            current,
            previous: current,
            focus: None,
            background: Region::new(),
            next_id: 1,
            direct_flags: HashMap::new(),
            pending_direct: Vec::new(),
        };
        let everything = Region::from_rect(state.screen_rect());
        state.rebuild_clipping(&everything);
        state
    }

    pub fn config(&self) -> &TesseraConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn DrawingEngine> {
        &self.engine
    }

    pub fn screen_info(&self) -> ScreenInfo {
        self.screen
    }

    pub fn screen_rect(&self) -> Rect {
        Rect::from_size(0, 0, self.screen.width as i32, self.screen.height as i32)
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowLayer> {
        self.windows.get(&id)
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// All window ids, ascending.
    pub fn window_ids(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.windows.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn workspace_count(&self) -> usize {
        self.workspaces.len()
    }

    pub fn workspace(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn current_workspace(&self) -> usize {
        self.current
    }

    pub fn previous_workspace(&self) -> usize {
        self.previous
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.focus
    }

    pub fn background(&self) -> &Region {
        &self.background
    }

    fn is_shown(&self, id: WindowId) -> bool {
        self.windows.get(&id).is_some_and(|w| !w.is_hidden())
    }

    /// Visible windows of workspace `index`, bottom to top.
    pub fn workspace_windows(&self, index: usize) -> Vec<WindowId> {
        self.workspaces
            .get(index)
            .map(|ws| ws.stack().iter().filter(|id| self.is_shown(*id)).collect())
            .unwrap_or_default()
    }

    /// Front-most visible window of the current workspace.
    pub fn front(&self) -> Option<WindowId> {
        self.workspaces[self.current]
            .stack()
            .front_to_back()
            .find(|id| self.is_shown(*id))
    }

    /// Back-most visible window of the current workspace.
    pub fn back(&self) -> Option<WindowId> {
        self.workspaces[self.current]
            .stack()
            .iter()
            .find(|id| self.is_shown(*id))
    }

    /// Topmost visible window whose footprint contains `point`.
    pub fn window_at(&self, point: Point) -> Option<WindowId> {
        self.workspaces[self.current]
            .stack()
            .front_to_back()
            .filter_map(|id| self.windows.get(&id))
            .find(|w| !w.is_hidden() && w.footprint().contains(point))
            .map(|w| w.id())
    }

    fn window_mut(&mut self, id: WindowId) -> Result<&mut WindowLayer, ServerError> {
        self.windows.get_mut(&id).ok_or(ServerError::WindowGone(id.0))
    }

    fn current_bit(&self) -> u32 {
        1 << self.current
    }

    fn resolve_mask(&self, mask: u32) -> u32 {
        match mask & all_workspaces(self.workspaces.len() as u32) {
            0 => self.current_bit(),
            mask => mask,
        }
    }

    fn mark_direct(&mut self, id: WindowId, flags: BufferFlags) {
        *self.direct_flags.entry(id).or_default() |= flags;
    }

    pub(super) fn take_direct_notices(&mut self) -> Vec<DirectNotice> {
        std::mem::take(&mut self.pending_direct)
    }

    pub fn add_window(&mut self, spec: &WindowSpec, client: Option<PortHandle>) -> Result<WindowId, ServerError> {
        if self.windows.len() >= self.config.server.max_windows_per_desktop {
            warn!("window limit of {} reached", self.config.server.max_windows_per_desktop);
            return Err(ServerError::ResourceExhausted("windows"));
        }
        let id = WindowId(self.next_id);
        self.next_id += 1;

        let mut spec = spec.clone();
        spec.workspaces = self.resolve_mask(spec.workspaces);
        let window = WindowLayer::new(id, &spec, &self.config, client);
        let tier = window.feel().tier();
        self.windows.insert(id, window);
        for index in mask_indices(spec.workspaces, self.workspaces.len()) {
            self.workspaces[index].stack_mut().insert(id, tier);
        }

        let dirty = self.sync_followers();
        self.rebuild_clipping(&dirty);
        info!("window {} '{}' added on workspaces {:#x}", id, spec.title, spec.workspaces);
        Ok(id)
    }

    /// Removes a window; returns `false` when it was already gone.
    pub fn remove_window(&mut self, id: WindowId) -> bool {
        let Some(window) = self.windows.remove(&id) else {
            debug!("window {} already removed", id);
            return false;
        };
        for workspace in &mut self.workspaces {
            workspace.stack_mut().remove(id);
        }
        for other in self.windows.values_mut() {
            other.subset_mut().remove(&id);
        }
        self.direct_flags.remove(&id);
        if let Some(session) = window.direct() {
            session.teardown();
        }

        let mut dirty = Region::new();
        if self.focus == Some(id) {
            self.focus = None;
            dirty = self.refocus();
        }
        dirty = dirty.union(&self.sync_followers());
        self.rebuild_clipping(&dirty);
        info!("window {} '{}' removed", id, window.title());
        true
    }

    pub fn show_window(&mut self, id: WindowId) -> Result<(), ServerError> {
        let current = self.current;
        let window = self.window_mut(id)?;
        if !window.is_hidden() {
            return Ok(());
        }
        window.set_hidden(false);
        let mut dirty = window.footprint();
        if window.is_on_workspace(current) {
            dirty = dirty.union(&self.raise_and_focus(id));
        }
        self.rebuild_clipping(&dirty);
        debug!("window {} shown", id);
        Ok(())
    }

    pub fn hide_window(&mut self, id: WindowId) -> Result<(), ServerError> {
        let window = self.window_mut(id)?;
        if window.is_hidden() {
            return Ok(());
        }
        window.set_hidden(true);
        let mut dirty = Region::new();
        if self.focus == Some(id) {
            dirty = self.set_focus(None);
            dirty = dirty.union(&self.refocus());
        }
        self.rebuild_clipping(&dirty);
        debug!("window {} hidden", id);
        Ok(())
    }

    /// Brings a window to the front of its tier and focuses it, unless a
    /// modal window blocks it, in which case the modal window is activated.
    pub fn activate_window(&mut self, id: WindowId) -> Result<(), ServerError> {
        let window = self.windows.get(&id).ok_or(ServerError::WindowGone(id.0))?;
        if window.is_hidden() {
            return Ok(());
        }
        if !window.is_on_workspace(self.current) {
            if let Some(first) = mask_indices(window.workspaces(), self.workspaces.len()).next() {
                self.set_workspace(first)?;
            }
        }
        let dirty = self.raise_and_focus(id);
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    fn raise_and_focus(&mut self, id: WindowId) -> Region {
        let target = self.blocking_modal(id).unwrap_or(id);
        let Some(window) = self.windows.get(&target) else {
            return Region::new();
        };
        let (avoid_front, can_focus) = (
            window.flags().contains(WindowFlags::AVOID_FRONT),
            window.can_focus(),
        );
        if !avoid_front {
            self.workspaces[self.current].stack_mut().raise(target);
        }
        if target != id {
            debug!("activation of {} blocked by modal {}", id, target);
        }
        if can_focus {
            self.set_focus(Some(target))
        } else {
            Region::new()
        }
    }

    /// A visible modal window on the current workspace that takes focus
    /// from `target`.
    fn blocking_modal(&self, target: WindowId) -> Option<WindowId> {
        let target = self.windows.get(&target)?;
        self.workspaces[self.current]
            .stack()
            .front_to_back()
            .filter(|id| *id != target.id())
            .filter_map(|id| self.windows.get(&id))
            .filter(|m| !m.is_hidden() && m.feel().tier() >= target.feel().tier())
            .find(|m| match m.feel() {
                WindowFeel::ModalAll => true,
                WindowFeel::ModalApp => m.team() == target.team(),
                WindowFeel::ModalSubset => m.subset().contains(&target.id()),
                _ => false,
            })
            .map(|m| m.id())
    }

    /// Changes focus; returns the decorations to repaint.
    fn set_focus(&mut self, focus: Option<WindowId>) -> Region {
        if self.focus == focus {
            return Region::new();
        }
        let mut dirty = Region::new();
        for (id, active) in [(self.focus, false), (focus, true)] {
            if let Some(window) = id.and_then(|id| self.windows.get(&id)) {
                window.post(ServerEvent::WindowActivated { active });
                dirty = dirty.union(&window.decoration_region());
            }
        }
        trace!("focus {:?} -> {:?}", self.focus, focus);
        self.focus = focus;
        dirty
    }

    /// Focuses the front-most focusable window of the current workspace.
    fn refocus(&mut self) -> Region {
        let next = self.workspaces[self.current]
            .stack()
            .front_to_back()
            .filter_map(|id| self.windows.get(&id))
            .find(|w| !w.is_hidden() && w.can_focus())
            .map(|w| w.id());
        self.set_focus(next)
    }

    pub fn move_window_by(&mut self, id: WindowId, dx: i32, dy: i32) -> Result<(), ServerError> {
        let window = self.window_mut(id)?;
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        let frame = window.frame();
        let reach = |edge: i32, delta: i32| (edge as i64 + delta as i64).abs() <= MAX_COORDINATE as i64;
        if !(reach(frame.left, dx) && reach(frame.right, dx) && reach(frame.top, dy) && reach(frame.bottom, dy)) {
            return Err(ServerError::BadValue("window moved off the coordinate range"));
        }
        let old = window.footprint();
        let frame = frame.offset_by(dx, dy);
        window.set_frame(frame);
        window.post(ServerEvent::WindowMoved { to: frame.left_top() });
        let dirty = if window.is_hidden() {
            Region::new()
        } else {
            old.union(&window.footprint())
        };
        self.mark_direct(id, BufferFlags::BUFFER_MOVED);
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    pub fn move_window_to(&mut self, id: WindowId, to: Point) -> Result<(), ServerError> {
        let frame = self.window_mut(id)?.frame();
        self.move_window_by(id, to.x.saturating_sub(frame.left), to.y.saturating_sub(frame.top))
    }

    /// Resizes within the window's size limits.
    pub fn resize_window_to(&mut self, id: WindowId, width: i32, height: i32) -> Result<(), ServerError> {
        let window = self.window_mut(id)?;
        let (width, height) = window.limits().clamp(width, height);
        let frame = window.frame();
        if frame.width() == width && frame.height() == height {
            return Ok(());
        }
        let old = window.footprint();
        window.set_frame(Rect::from_size(frame.left, frame.top, width, height));
        window.post(ServerEvent::WindowResized { width, height });
        let dirty = if window.is_hidden() {
            Region::new()
        } else {
            old.union(&window.footprint())
        };
        self.mark_direct(id, BufferFlags::BUFFER_RESIZED);
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    pub fn resize_window_by(&mut self, id: WindowId, dx: i32, dy: i32) -> Result<(), ServerError> {
        let frame = self.window_mut(id)?.frame();
        let grow = |size: i32, delta: i32| clamp_coordinate(size as i64 + delta as i64);
        self.resize_window_to(id, grow(frame.width(), dx), grow(frame.height(), dy))
    }

    /// Stores new limits, clamps the frame into them, and returns the
    /// resulting frame and effective limits.
    pub fn set_size_limits(&mut self, id: WindowId, limits: SizeLimits) -> Result<(Rect, SizeLimits), ServerError> {
        let window = self.window_mut(id)?;
        let limits = window.set_limits(limits);
        let frame = window.frame();
        self.resize_window_to(id, frame.width(), frame.height())?;
        let frame = self.window_mut(id)?.frame();
        Ok((frame, limits))
    }

    /// Changes workspace membership. A mask of zero means the current
    /// workspace.
    pub fn set_window_workspaces(&mut self, id: WindowId, mask: u32) -> Result<(), ServerError> {
        let mask = self.resolve_mask(mask);
        let mut dirty = self.apply_workspaces(id, mask)?;
        dirty = dirty.union(&self.sync_followers());
        if self.focus.is_some_and(|f| !self.windows.get(&f).is_some_and(|w| w.is_on_workspace(self.current))) {
            dirty = dirty.union(&self.set_focus(None));
            dirty = dirty.union(&self.refocus());
        }
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    /// Updates the mask and the workspace stacks. Leaving the current
    /// workspace records the anchor there; entering it restores the anchor.
    fn apply_workspaces(&mut self, id: WindowId, mask: u32) -> Result<Region, ServerError> {
        let current = self.current;
        let count = self.workspaces.len();
        let window = self.windows.get_mut(&id).ok_or(ServerError::WindowGone(id.0))?;
        let old = window.workspaces();
        if old == mask {
            return Ok(Region::new());
        }
        let bit = 1u32 << current;
        let mut dirty = Region::new();
        if old & bit != 0 && mask & bit == 0 {
            window.set_anchor(current, Some(window.frame().left_top()));
            dirty = window.footprint();
        } else if old & bit == 0 && mask & bit != 0 {
            if let Some(at) = window.anchor(current) {
                let frame = window.frame().offset_to(at.x, at.y);
                if frame != window.frame() {
                    window.set_frame(frame);
                    window.post(ServerEvent::WindowMoved { to: at });
                }
            }
            dirty = window.footprint();
        }
        window.set_workspaces(mask);
        window.post(ServerEvent::WorkspacesChanged { old, new: mask });
        let tier = window.feel().tier();

        for index in 0..count {
            let member = mask & (1 << index) != 0;
            let stack = self.workspaces[index].stack_mut();
            if member {
                stack.insert(id, tier);
            } else {
                stack.remove(id);
            }
        }
        debug!("window {} workspaces {:#x} -> {:#x}", id, old, mask);
        if self.windows.get(&id).is_some_and(|w| w.is_hidden()) {
            return Ok(Region::new());
        }
        Ok(dirty)
    }

    /// Recomputes the membership of windows whose workspaces follow their
    /// subset, their team, or every workspace.
    fn sync_followers(&mut self) -> Region {
        let all = all_workspaces(self.workspaces.len() as u32);
        let updates: Vec<(WindowId, u32)> = self
            .windows
            .values()
            .filter_map(|w| {
                let feel = w.feel();
                let mask = if feel.on_all_workspaces() {
                    all
                } else if feel.follows_subset() {
                    w.subset()
                        .iter()
                        .filter_map(|member| self.windows.get(member))
                        .fold(0, |mask, member| mask | member.workspaces())
                } else if feel.follows_team() {
                    self.windows
                        .values()
                        .filter(|o| o.id() != w.id() && o.team() == w.team() && o.feel() == WindowFeel::Normal)
                        .fold(0, |mask, o| mask | o.workspaces())
                } else {
                    return None;
                };
                (mask != 0 && mask != w.workspaces()).then_some((w.id(), mask))
            })
            .collect();

        let mut dirty = Region::new();
        for (id, mask) in updates {
            if let Ok(region) = self.apply_workspaces(id, mask) {
                dirty = dirty.union(&region);
            }
        }
        dirty
    }

    /// Switches the current workspace.
    pub fn set_workspace(&mut self, index: usize) -> Result<(), ServerError> {
        if index >= self.workspaces.len() {
            return Err(ServerError::BadValue("workspace index"));
        }
        if index == self.current {
            return Ok(());
        }
        let old = self.current;
        for window in self.windows.values_mut() {
            if window.is_on_workspace(old) {
                window.set_anchor(old, Some(window.frame().left_top()));
            }
            if window.is_on_workspace(index) {
                if let Some(at) = window.anchor(index) {
                    let frame = window.frame().offset_to(at.x, at.y);
                    if frame != window.frame() {
                        window.set_frame(frame);
                        window.post(ServerEvent::WindowMoved { to: at });
                    }
                }
            }
        }
        self.previous = old;
        self.current = index;
        info!("workspace {} -> {}", old, index);

        let keep_focus = self.focus.is_some_and(|f| self.windows.get(&f).is_some_and(|w| w.is_on_workspace(index)));
        if !keep_focus {
            self.set_focus(None);
            self.refocus();
        }
        let everything = Region::from_rect(self.screen_rect());
        self.rebuild_clipping(&everything);
        Ok(())
    }

    /// Positions a window as it appears on workspace `index`: moved when
    /// that workspace is shown, anchored otherwise.
    pub fn place_on_workspace(&mut self, id: WindowId, index: usize, at: Point) -> Result<(), ServerError> {
        if index == self.current {
            return self.move_window_to(id, at);
        }
        if index >= self.workspaces.len() {
            return Err(ServerError::BadValue("workspace index"));
        }
        self.window_mut(id)?.set_anchor(index, Some(at));
        self.redraw_workspaces_views(None);
        Ok(())
    }

    pub fn set_title(&mut self, id: WindowId, title: String) -> Result<(), ServerError> {
        let window = self.window_mut(id)?;
        window.set_title(title);
        let dirty = window.decoration_region();
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    pub fn set_look(&mut self, id: WindowId, look: WindowLook) -> Result<(), ServerError> {
        let config = self.config.clone();
        let window = self.window_mut(id)?;
        let old = window.footprint();
        window.set_look(look, &config);
        let dirty = old.union(&window.footprint());
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    pub fn set_feel(&mut self, id: WindowId, feel: WindowFeel) -> Result<(), ServerError> {
        let window = self.window_mut(id)?;
        if window.feel() == feel {
            return Ok(());
        }
        window.set_feel(feel);
        let dirty = window.footprint();
        for workspace in &mut self.workspaces {
            if workspace.contains(id) {
                workspace.stack_mut().set_tier(id, feel.tier());
            }
        }
        let dirty = dirty.union(&self.sync_followers());
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    pub fn set_flags(&mut self, id: WindowId, flags: WindowFlags) -> Result<(), ServerError> {
        self.window_mut(id)?.set_flags(flags);
        if flags.contains(WindowFlags::AVOID_FOCUS) && self.focus == Some(id) {
            let mut dirty = self.set_focus(None);
            dirty = dirty.union(&self.refocus());
            self.rebuild_clipping(&dirty);
        }
        Ok(())
    }

    pub fn add_to_subset(&mut self, id: WindowId, member: WindowId) -> Result<(), ServerError> {
        if !self.windows.contains_key(&member) {
            return Err(ServerError::WindowGone(member.0));
        }
        if member == id {
            return Err(ServerError::BadValue("a window cannot be in its own subset"));
        }
        self.window_mut(id)?.subset_mut().insert(member);
        let dirty = self.sync_followers();
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    pub fn remove_from_subset(&mut self, id: WindowId, member: WindowId) -> Result<(), ServerError> {
        self.window_mut(id)?.subset_mut().remove(&member);
        let dirty = self.sync_followers();
        self.rebuild_clipping(&dirty);
        Ok(())
    }

    /// Attaches a direct session and queues its start hand-off.
    pub fn attach_direct(&mut self, id: WindowId, session: Arc<DirectWindowSession>) -> Result<(), ServerError> {
        let screen = self.screen;
        let window = self.window_mut(id)?;
        window.set_direct(Some(session.clone()));
        let notice = DirectNotice {
            window: id,
            stamp: session.stamp(),
            session,
            state: BufferState::Start,
            flags: BufferFlags::empty(),
            frame: window.frame(),
            clip: window.content_clip().clone(),
            screen,
        };
        self.pending_direct.push(notice);
        Ok(())
    }

    pub fn detach_direct(&mut self, id: WindowId) -> Option<Arc<DirectWindowSession>> {
        let window = self.windows.get_mut(&id)?;
        let session = window.direct().cloned();
        window.set_direct(None);
        self.direct_flags.remove(&id);
        session
    }

    /// Applies a new screen mode; the caller holds the screen lock.
    pub(super) fn set_screen_mode(&mut self, screen: ScreenInfo) {
        {
            let _exclusive = self.engine.lock_exclusive();
            self.engine.set_screen_size(screen.width, screen.height);
        }
        self.screen = screen;
        let ids: Vec<WindowId> = self
            .windows
            .values()
            .filter(|w| w.direct().is_some())
            .map(|w| w.id())
            .collect();
        for id in ids {
            self.mark_direct(id, BufferFlags::CLIPPING_MODIFIED);
        }
        self.background = Region::new();
        let everything = Region::from_rect(self.screen_rect());
        self.rebuild_clipping(&everything);
        info!(
            "screen mode {}x{}x{}",
            screen.width, screen.height, screen.bits_per_pixel
        );
    }

    /// Recomputes every window's clipping on the current workspace and
    /// repaints what became exposed or lies in `dirty`.
    pub fn rebuild_clipping(&mut self, dirty: &Region) {
        let mut remaining = Region::from_rect(self.screen_rect());
        let mut fresh: HashMap<WindowId, (Region, Region)> = HashMap::new();
        for id in self.workspaces[self.current].stack().front_to_back() {
            let Some(window) = self.windows.get(&id) else {
                continue;
            };
            if window.is_hidden() {
                continue;
            }
            let footprint = window.footprint();
            let visible = remaining.intersect(&footprint);
            let content = visible.intersect_rect(window.frame());
            remaining = remaining.subtract(&footprint);
            fresh.insert(id, (visible, content));
        }

        let mut exposures = Vec::new();
        for (id, window) in self.windows.iter_mut() {
            let (visible, content) = fresh.remove(id).unwrap_or_default();
            let exposed = visible
                .subtract(window.visible_region())
                .union(&visible.intersect(dirty));
            let changed = window.set_clipping(visible, content);

            let mut flags = self.direct_flags.remove(id).unwrap_or_default();
            if changed {
                flags |= BufferFlags::CLIPPING_MODIFIED;
            }
            if let Some(session) = window.direct() {
                if !flags.is_empty() && session.is_connected() {
                    self.pending_direct.push(DirectNotice {
                        window: *id,
                        stamp: session.stamp(),
                        session: session.clone(),
                        state: BufferState::Modify,
                        flags,
                        frame: window.frame(),
                        clip: window.content_clip().clone(),
                        screen: self.screen,
                    });
                }
            }
            if !exposed.is_empty() {
                exposures.push((*id, exposed));
            }
        }
        self.direct_flags.clear();

        let background_exposed = remaining
            .subtract(&self.background)
            .union(&remaining.intersect(dirty));
        self.background = remaining;

        {
            let _access = self.engine.lock_parallel();
            if !background_exposed.is_empty() {
                paint::background(
                    self.engine.as_ref(),
                    &background_exposed,
                    self.workspaces[self.current].color(),
                );
            }
            for (id, exposed) in exposures {
                if let Some(window) = self.windows.get(&id) {
                    paint::window(self.engine.as_ref(), window, &exposed, self.focus == Some(id));
                }
            }
        }
        self.redraw_workspaces_views(None);
    }

    /// Repaints `region` (screen coordinates) of a window: decoration by
    /// the server, content by an `Update` to the client.
    pub fn request_update(&self, id: WindowId, region: &Region) {
        let Some(window) = self.windows.get(&id) else {
            return;
        };
        let exposed = region.intersect(window.visible_region());
        if exposed.is_empty() {
            return;
        }
        {
            let _access = self.engine.lock_parallel();
            paint::window(self.engine.as_ref(), window, &exposed, self.focus == Some(id));
        }
        self.redraw_workspaces_views(Some(id));
    }

    /// Redraws the workspaces views of one window, or of every visible window.
    pub fn redraw_workspaces_views(&self, only: Option<WindowId>) {
        for id in self.workspace_windows(self.current) {
            if only.is_some_and(|o| o != id) {
                continue;
            }
            let Some(window) = self.windows.get(&id) else {
                continue;
            };
            let mut views = window.views();
            let tokens = views.tokens_of_kind(ViewKind::Workspaces);
            if tokens.is_empty() {
                continue;
            }
            let origin = window.frame().left_top();
            let _access = self.engine.lock_parallel();
            for token in tokens {
                let Some(bounds) = views.screen_frame(token, origin) else {
                    continue;
                };
                let clip = views
                    .clip_of(token, window.clip_generation(), origin, window.content_clip())
                    .drawing;
                if !clip.is_empty() {
                    workspaces_view::draw(self, self.engine.as_ref(), bounds, &clip);
                }
            }
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            screen: self.screen_rect(),
            current_workspace: self.current,
            previous_workspace: self.previous,
            focused: self.focus,
            front: self.front(),
            workspaces: self.workspaces.iter().map(Workspace::snapshot).collect(),
            windows: self
                .window_ids()
                .into_iter()
                .filter_map(|id| self.windows.get(&id))
                .map(WindowLayer::snapshot)
                .collect(),
        }
    }
}

/// Diagnostic view of the structural state.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub screen: Rect,
    pub current_workspace: usize,
    pub previous_workspace: usize,
    pub focused: Option<WindowId>,
    pub front: Option<WindowId>,
    pub workspaces: Vec<WorkspaceSnapshot>,
    pub windows: Vec<WindowSnapshot>,
}
