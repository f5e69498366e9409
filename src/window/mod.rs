//! Server-side top-level windows
//!
//! A [`WindowLayer`] holds everything the desktop knows about one client
//! window: its content frame, look/feel/flags, workspace membership and the
//! anchors it left behind on inactive workspaces, the decorator drawing its
//! border, the clipping it was last assigned, and its view tree.
//!
//! Windows live inside the desktop's structural state. Their fields change
//! only through the desktop's write path; the view tree sits behind its own
//! leaf mutex so a window's connection can draw under the shared read lock.

use bitflags::bitflags;
use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::config::TesseraConfig;
use crate::decoration::{self, Decorator};
use crate::direct::DirectWindowSession;
use crate::error::ProtocolError;
use crate::geometry::{Point, Rect};
use crate::ipc::PortHandle;
use crate::protocol::events::ServerEvent;
use crate::protocol::{SizeLimits, WindowSpec};
use crate::region::Region;
use crate::view::ViewTree;
use crate::workspace::MAX_WORKSPACES;

/// Desktop-unique window identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WindowId(pub u32);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Border and tab style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum WindowLook {
    NoBorder = 0,
    Bordered = 1,
    Titled = 2,
    Document = 3,
    Modal = 4,
    Floating = 5,
}

impl WindowLook {
    pub fn from_u32(value: u32) -> Result<WindowLook, ProtocolError> {
        Ok(match value {
            0 => WindowLook::NoBorder,
            1 => WindowLook::Bordered,
            2 => WindowLook::Titled,
            3 => WindowLook::Document,
            4 => WindowLook::Modal,
            5 => WindowLook::Floating,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "window_look",
                    value: value as i64,
                })
            }
        })
    }
}

/// Stacking and focus behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum WindowFeel {
    Normal = 0,
    ModalSubset = 1,
    ModalApp = 2,
    ModalAll = 3,
    FloatingSubset = 4,
    FloatingApp = 5,
    FloatingAll = 6,
    Desktop = 7,
}

impl WindowFeel {
    pub fn from_u32(value: u32) -> Result<WindowFeel, ProtocolError> {
        Ok(match value {
            0 => WindowFeel::Normal,
            1 => WindowFeel::ModalSubset,
            2 => WindowFeel::ModalApp,
            3 => WindowFeel::ModalAll,
            4 => WindowFeel::FloatingSubset,
            5 => WindowFeel::FloatingApp,
            6 => WindowFeel::FloatingAll,
            7 => WindowFeel::Desktop,
            _ => {
                return Err(ProtocolError::InvalidValue {
                    field: "window_feel",
                    value: value as i64,
                })
            }
        })
    }

    /// Stacking tier, back to front. A window never sits in front of a
    /// window of a higher tier.
    pub fn tier(self) -> u8 {
        match self {
            WindowFeel::Desktop => 0,
            WindowFeel::Normal => 1,
            WindowFeel::FloatingSubset | WindowFeel::FloatingApp => 2,
            WindowFeel::FloatingAll => 3,
            WindowFeel::ModalSubset | WindowFeel::ModalApp => 4,
            WindowFeel::ModalAll => 5,
        }
    }

    pub fn is_modal(self) -> bool {
        matches!(
            self,
            WindowFeel::ModalSubset | WindowFeel::ModalApp | WindowFeel::ModalAll
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(
            self,
            WindowFeel::FloatingSubset | WindowFeel::FloatingApp | WindowFeel::FloatingAll
        )
    }

    /// Feels whose workspaces follow their subset members.
    pub fn follows_subset(self) -> bool {
        matches!(self, WindowFeel::ModalSubset | WindowFeel::FloatingSubset)
    }

    /// Feels whose workspaces follow the normal windows of their team.
    pub fn follows_team(self) -> bool {
        matches!(self, WindowFeel::ModalApp | WindowFeel::FloatingApp)
    }

    /// Feels present on every workspace.
    pub fn on_all_workspaces(self) -> bool {
        matches!(self, WindowFeel::ModalAll | WindowFeel::FloatingAll)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct WindowFlags: u32 {
        const NOT_MOVABLE = 1 << 0;
        const NOT_CLOSABLE = 1 << 1;
        const NOT_ZOOMABLE = 1 << 2;
        const NOT_MINIMIZABLE = 1 << 3;
        const NOT_RESIZABLE = 1 << 4;
        /// Never raised to the front by activation.
        const AVOID_FRONT = 1 << 5;
        /// Never takes focus.
        const AVOID_FOCUS = 1 << 6;
        const NO_WORKSPACE_ACTIVATION = 1 << 7;
    }
}

/// Largest frame dimension accepted from a client.
pub const MAX_DIMENSION: f32 = 32768.0;

impl SizeLimits {
    /// Limits with each bound inside `[0, MAX_DIMENSION]` and min <= max.
    pub fn normalized(&self) -> SizeLimits {
        let bound = |v: f32| if v.is_finite() { v.clamp(0.0, MAX_DIMENSION) } else { MAX_DIMENSION };
        let min_width = bound(self.min_width);
        let min_height = bound(self.min_height);
        SizeLimits {
            min_width,
            max_width: bound(self.max_width).max(min_width),
            min_height,
            max_height: bound(self.max_height).max(min_height),
        }
    }

    /// Nearest size within the limits.
    pub fn clamp(&self, width: i32, height: i32) -> (i32, i32) {
        let clamp = |v: i32, min: f32, max: f32| {
            let low = min.ceil();
            (v as f32).min(max.floor().max(low)).max(low) as i32
        };
        (
            clamp(width, self.min_width, self.max_width),
            clamp(height, self.min_height, self.max_height),
        )
    }
}

/// Mask with one bit per workspace in `0..count`.
pub fn all_workspaces(count: u32) -> u32 {
    if count >= 32 {
        u32::MAX
    } else {
        (1u32 << count) - 1
    }
}

/// One client top-level window.
pub struct WindowLayer {
    id: WindowId,
    title: String,
    frame: Rect,
    look: WindowLook,
    feel: WindowFeel,
    flags: WindowFlags,
    team: i32,
    workspaces: u32,
    anchors: [Option<Point>; MAX_WORKSPACES],
    hidden: bool,
    limits: SizeLimits,
    decorator: Option<Arc<dyn Decorator>>,
    subset: BTreeSet<WindowId>,
    /// On-screen pixels of the whole footprint after occlusion.
    visible: Region,
    /// `visible` limited to the content frame.
    content_clip: Region,
    clip_generation: u64,
    views: Mutex<ViewTree>,
    direct: Option<Arc<DirectWindowSession>>,
    client: Option<PortHandle>,
}

impl fmt::Debug for WindowLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowLayer")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("frame", &self.frame)
            .field("feel", &self.feel)
            .field("workspaces", &format_args!("{:#x}", self.workspaces))
            .field("hidden", &self.hidden)
            .finish()
    }
}

impl WindowLayer {
    /// A new window. It starts hidden; `workspaces == 0` must already have
    /// been resolved to the current workspace by the caller.
    pub fn new(id: WindowId, spec: &WindowSpec, config: &TesseraConfig, client: Option<PortHandle>) -> Self {
        let limits = SizeLimits::UNLIMITED;
        let (width, height) = limits.clamp(spec.frame.width(), spec.frame.height());
        Self {
            id,
            title: spec.title.clone(),
            frame: Rect::from_size(spec.frame.left, spec.frame.top, width, height),
            look: spec.look,
            feel: spec.feel,
            flags: spec.flags,
            team: spec.team,
            workspaces: spec.workspaces,
            anchors: [None; MAX_WORKSPACES],
            hidden: true,
            limits,
            decorator: decoration::for_look(spec.look, &config.decorator),
            subset: BTreeSet::new(),
            visible: Region::new(),
            content_clip: Region::new(),
            clip_generation: 0,
            views: Mutex::new(ViewTree::new(config.server.max_views_per_window)),
            direct: None,
            client,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn frame(&self) -> Rect {
        self.frame
    }

    pub fn look(&self) -> WindowLook {
        self.look
    }

    pub fn feel(&self) -> WindowFeel {
        self.feel
    }

    pub fn flags(&self) -> WindowFlags {
        self.flags
    }

    pub fn team(&self) -> i32 {
        self.team
    }

    pub fn workspaces(&self) -> u32 {
        self.workspaces
    }

    pub fn is_on_workspace(&self, index: usize) -> bool {
        index < MAX_WORKSPACES && self.workspaces & (1 << index) != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn limits(&self) -> SizeLimits {
        self.limits
    }

    pub fn decorator(&self) -> Option<&Arc<dyn Decorator>> {
        self.decorator.as_ref()
    }

    pub fn subset(&self) -> &BTreeSet<WindowId> {
        &self.subset
    }

    pub fn anchor(&self, workspace: usize) -> Option<Point> {
        self.anchors.get(workspace).copied().flatten()
    }

    pub fn can_focus(&self) -> bool {
        !self.flags.contains(WindowFlags::AVOID_FOCUS)
    }

    /// Every screen pixel the window covers, decoration included.
    pub fn footprint(&self) -> Region {
        match &self.decorator {
            Some(decorator) => decorator.footprint(self.frame),
            None => Region::from_rect(self.frame),
        }
    }

    pub fn decoration_region(&self) -> Region {
        match &self.decorator {
            Some(decorator) => decorator.decoration_region(self.frame),
            None => Region::new(),
        }
    }

    pub fn visible_region(&self) -> &Region {
        &self.visible
    }

    pub fn content_clip(&self) -> &Region {
        &self.content_clip
    }

    /// Bumped whenever the content clip changes.
    pub fn clip_generation(&self) -> u64 {
        self.clip_generation
    }

    /// The view tree. Callers hold the desktop's read lock.
    pub fn views(&self) -> MutexGuard<'_, ViewTree> {
        self.views.lock()
    }

    pub(crate) fn views_mut(&mut self) -> &mut ViewTree {
        self.views.get_mut()
    }

    pub fn direct(&self) -> Option<&Arc<DirectWindowSession>> {
        self.direct.as_ref()
    }

    /// Posts an event to the client; a vanished client is not an error here,
    /// its connection notices on its own.
    pub fn post(&self, event: ServerEvent) {
        let Some(client) = &self.client else {
            return;
        };
        if client.send(event.to_message()).is_err() {
            debug!("window {}: client port closed, dropping {:?}", self.id, event);
        }
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub(crate) fn set_frame(&mut self, frame: Rect) {
        self.frame = frame;
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub(crate) fn set_look(&mut self, look: WindowLook, config: &TesseraConfig) {
        self.look = look;
        self.decorator = decoration::for_look(look, &config.decorator);
    }

    pub(crate) fn set_feel(&mut self, feel: WindowFeel) {
        self.feel = feel;
    }

    pub(crate) fn set_flags(&mut self, flags: WindowFlags) {
        self.flags = flags;
    }

    pub(crate) fn set_workspaces(&mut self, mask: u32) {
        self.workspaces = mask;
    }

    pub(crate) fn set_anchor(&mut self, workspace: usize, at: Option<Point>) {
        match self.anchors.get_mut(workspace) {
            Some(slot) => *slot = at,
            None => warn!("window {}: anchor for invalid workspace {}", self.id, workspace),
        }
    }

    /// Stores normalized limits and returns them.
    pub(crate) fn set_limits(&mut self, limits: SizeLimits) -> SizeLimits {
        self.limits = limits.normalized();
        self.limits
    }

    pub(crate) fn subset_mut(&mut self) -> &mut BTreeSet<WindowId> {
        &mut self.subset
    }

    pub(crate) fn set_direct(&mut self, session: Option<Arc<DirectWindowSession>>) {
        self.direct = session;
    }

    /// Installs freshly computed clipping; returns whether the content clip
    /// changed.
    pub(crate) fn set_clipping(&mut self, visible: Region, content_clip: Region) -> bool {
        self.visible = visible;
        if content_clip == self.content_clip {
            return false;
        }
        self.content_clip = content_clip;
        self.clip_generation += 1;
        true
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            id: self.id,
            title: self.title.clone(),
            frame: self.frame,
            look: self.look,
            feel: self.feel,
            flags: self.flags,
            team: self.team,
            workspaces: self.workspaces,
            hidden: self.hidden,
            clip_rects: self.content_clip.count(),
            views: self.views.lock().len(),
            direct: self.direct.is_some(),
        }
    }
}

/// Diagnostic view of one window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub id: WindowId,
    pub title: String,
    pub frame: Rect,
    pub look: WindowLook,
    pub feel: WindowFeel,
    pub flags: WindowFlags,
    pub team: i32,
    pub workspaces: u32,
    pub hidden: bool,
    pub clip_rects: usize,
    pub views: usize,
    pub direct: bool,
}
