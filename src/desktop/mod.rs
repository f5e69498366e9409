//! Desktop
//!
//! One desktop per session. It owns the windows, the workspaces and both
//! lock levels; window connections and the workspaces view reach its state
//! only through the scoped accessors here:
//!
//! - [`Desktop::read`] for drawing and geometry queries,
//! - [`Desktop::write`] for structural changes,
//! - [`Desktop::with_screen`] for the screen mode.
//!
//! Direct-window hand-offs queued by a structural change are delivered by
//! [`Desktop::write`] after the structural lock is released, so a slow
//! direct client never stalls other windows.

mod lock;
mod paint;
mod state;

pub use lock::{ReadToken, ScreenState, ScreenToken, WriteToken};
pub use state::{DesktopState, DirectNotice, StateSnapshot};

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;

use crate::config::TesseraConfig;
use crate::direct::ScreenInfo;
use crate::error::ServerError;
use crate::geometry::Rect;
use crate::renderer::DrawingEngine;
use crate::resources::SessionResources;
use crate::view::{EventMask, ViewKind, ViewToken};
use crate::window::WindowId;
use crate::workspaces_view::{self, Drag, PointerEvent};

/// A view that asked for input routed from outside the server core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub window: WindowId,
    pub view: ViewToken,
    pub mask: EventMask,
}

/// What a pointer event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Nothing,
    /// A client window; `view` is the view owning the pixel, if any.
    Window { window: WindowId, view: Option<ViewToken> },
    /// Consumed by a workspaces view.
    Workspaces { window: WindowId, view: ViewToken },
}

enum Hit {
    Nothing,
    Window(WindowId, Option<ViewToken>),
    Workspaces(WindowId, ViewToken, Rect),
}

pub struct Desktop {
    user_id: i32,
    config: Arc<TesseraConfig>,
    engine: Arc<dyn DrawingEngine>,
    resources: Arc<SessionResources>,
    screen: RwLock<ScreenState>,
    state: RwLock<DesktopState>,
    listeners: Mutex<Vec<Listener>>,
    drag: Mutex<Option<Drag>>,
}

impl std::fmt::Debug for Desktop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Desktop")
            .field("user_id", &self.user_id)
            .field("screen", &*self.screen.read())
            .finish()
    }
}

impl Desktop {
    pub fn new(user_id: i32, config: Arc<TesseraConfig>, engine: Arc<dyn DrawingEngine>) -> Self {
        let screen = ScreenState {
            width: config.screen.width,
            height: config.screen.height,
            bits_per_pixel: config.screen.bits_per_pixel,
        };
        engine.set_screen_size(screen.width, screen.height);
        let state = DesktopState::new(config.clone(), engine.clone(), screen.into());
        info!(
            "desktop for user {} created: {}x{}, {} workspaces",
            user_id,
            screen.width,
            screen.height,
            state.workspace_count()
        );
        Self {
            user_id,
            resources: Arc::new(SessionResources::new(config.server.max_pictures)),
            config,
            engine,
            screen: RwLock::new(screen),
            state: RwLock::new(state),
            listeners: Mutex::new(Vec::new()),
            drag: Mutex::new(None),
        }
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    pub fn config(&self) -> &Arc<TesseraConfig> {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn DrawingEngine> {
        &self.engine
    }

    pub fn resources(&self) -> &Arc<SessionResources> {
        &self.resources
    }

    /// Takes the structural lock for reading.
    pub fn read(&self) -> ReadToken<'_> {
        ReadToken {
            guard: self.state.read(),
        }
    }

    /// Runs `f` with the structural lock held for writing, then delivers the
    /// direct hand-offs it queued.
    pub fn write<R>(&self, f: impl FnOnce(&mut WriteToken<'_>) -> R) -> R {
        let (result, notices) = {
            let mut token = WriteToken {
                guard: self.state.write(),
            };
            let result = f(&mut token);
            (result, token.take_direct_notices())
        };
        for notice in notices {
            notice.deliver();
        }
        result
    }

    /// Runs `f` with the screen lock held. Must not be called while holding
    /// a structural token.
    pub fn with_screen<R>(&self, f: impl FnOnce(&mut ScreenToken<'_>) -> R) -> R {
        let mut token = ScreenToken {
            guard: self.screen.write(),
        };
        f(&mut token)
    }

    pub fn screen(&self) -> ScreenState {
        *self.screen.read()
    }

    pub fn set_screen_mode(&self, width: u32, height: u32, bits_per_pixel: u32) -> Result<(), ServerError> {
        if width == 0 || height == 0 {
            return Err(ServerError::BadValue("screen size"));
        }
        if !matches!(bits_per_pixel, 8 | 15 | 16 | 24 | 32) {
            return Err(ServerError::BadValue("bits per pixel"));
        }
        self.with_screen(|screen| {
            **screen = ScreenState {
                width,
                height,
                bits_per_pixel,
            };
            let info: ScreenInfo = (**screen).into();
            self.write(|state| state.set_screen_mode(info));
        });
        Ok(())
    }

    pub fn add_listener(&self, window: WindowId, view: ViewToken, mask: EventMask) {
        let mut listeners = self.listeners.lock();
        match listeners.iter_mut().find(|l| l.window == window && l.view == view) {
            Some(listener) => listener.mask = mask,
            None => listeners.push(Listener { window, view, mask }),
        }
        debug!("listener {}:{:?} mask {:?}", window, view, mask);
    }

    pub fn remove_listener(&self, window: WindowId, view: ViewToken) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !(l.window == window && l.view == view));
        listeners.len() != before
    }

    pub fn remove_window_listeners(&self, window: WindowId) {
        self.listeners.lock().retain(|l| l.window != window);
    }

    /// Listeners interested in any of `mask`.
    pub fn listeners(&self, mask: EventMask) -> Vec<Listener> {
        self.listeners
            .lock()
            .iter()
            .filter(|l| l.mask.intersects(mask))
            .copied()
            .collect()
    }

    pub(crate) fn drag(&self) -> &Mutex<Option<Drag>> {
        &self.drag
    }

    fn hit_test(&self, event: PointerEvent) -> Hit {
        let at = event.position();
        let state = self.read();
        let Some(id) = state.window_at(at) else {
            return Hit::Nothing;
        };
        let Some(window) = state.window(id) else {
            return Hit::Nothing;
        };
        let origin = window.frame().left_top();
        let mut views = window.views();
        let Some(token) = views.view_at(at, window.clip_generation(), origin, window.content_clip()) else {
            return Hit::Window(id, None);
        };
        match views.get(token) {
            Some(view) if view.kind == ViewKind::Workspaces => match views.screen_frame(token, origin) {
                Some(bounds) => Hit::Workspaces(id, token, bounds),
                None => Hit::Window(id, Some(token)),
            },
            _ => Hit::Window(id, Some(token)),
        }
    }

    /// Routes a pointer event. Workspaces views handle theirs here; other
    /// targets are reported for input routing.
    pub fn pointer_event(&self, event: PointerEvent) -> PointerTarget {
        let ongoing = *self.drag.lock();
        if let Some(drag) = ongoing {
            workspaces_view::handle_pointer(self, drag.host, drag.view, drag.bounds, event);
            return PointerTarget::Workspaces {
                window: drag.host,
                view: drag.view,
            };
        }
        match self.hit_test(event) {
            Hit::Nothing => PointerTarget::Nothing,
            Hit::Window(window, view) => PointerTarget::Window { window, view },
            Hit::Workspaces(window, view, bounds) => {
                workspaces_view::handle_pointer(self, window, view, bounds, event);
                PointerTarget::Workspaces { window, view }
            }
        }
    }

    pub fn snapshot(&self) -> DesktopSnapshot {
        let screen = self.screen();
        let state = self.read().snapshot();
        DesktopSnapshot {
            user_id: self.user_id,
            mode: screen,
            listeners: self.listeners.lock().clone(),
            state,
        }
    }
}

impl From<ScreenState> for ScreenInfo {
    fn from(screen: ScreenState) -> ScreenInfo {
        ScreenInfo {
            width: screen.width,
            height: screen.height,
            bits_per_pixel: screen.bits_per_pixel,
        }
    }
}

/// JSON-serializable view of one desktop.
#[derive(Debug, Clone, Serialize)]
pub struct DesktopSnapshot {
    pub user_id: i32,
    pub mode: ScreenState,
    pub listeners: Vec<Listener>,
    #[serde(flatten)]
    pub state: StateSnapshot,
}
