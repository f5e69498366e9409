//! Application server
//!
//! Process-wide entry point. The [`AppServer`] owns the well-known bootstrap
//! port and one [`Desktop`] per user session:
//!
//! 1. a client sends `GetDesktop` (user id, reply port) to the bootstrap
//!    port and gets back the session port of that user's desktop;
//! 2. `CreateWindow` on the session port adds a window and replies with the
//!    window id and the port of the new window's [`ServerWindow`] thread;
//! 3. everything else happens on the window port.
//!
//! Lifecycle is explicit: [`AppServer::new`], [`AppServer::run`] on the
//! thread that should serve the bootstrap port, then [`AppServer::stop`]
//! from anywhere and [`AppServer::shutdown`] to join every thread.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::TesseraConfig;
use crate::desktop::{Desktop, DesktopSnapshot};
use crate::error::{ServerError, Status};
use crate::ipc::{self, Message, PortHandle, PortReceiver, WeakPortHandle};
use crate::protocol::{self, Request, WindowSpec};
use crate::renderer::DrawingEngine;
use crate::server_window::ServerWindow;

/// Code of the message [`AppServer::stop`] posts to wake blocked loops.
/// Outside the protocol's opcode space; loops only act on it once the
/// running flag is cleared.
pub const WAKE_CODE: u32 = 0xFFFF_0000;

fn wake(port: &PortHandle) {
    if port.send(Message::new(WAKE_CODE, Vec::new())).is_err() {
        debug!("port {} already gone, nothing to wake", port.id());
    }
}

struct Session {
    desktop: Arc<Desktop>,
    port: PortHandle,
    thread: Option<JoinHandle<()>>,
}

struct WindowThread {
    port: WeakPortHandle,
    thread: JoinHandle<()>,
}

pub struct AppServer {
    config: Arc<TesseraConfig>,
    engine: Arc<dyn DrawingEngine>,
    port: PortHandle,
    receiver: Mutex<Option<PortReceiver>>,
    running: Arc<AtomicBool>,
    sessions: Mutex<HashMap<i32, Session>>,
}

impl std::fmt::Debug for AppServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServer")
            .field("port", &self.port)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

impl AppServer {
    pub fn new(config: TesseraConfig, engine: Arc<dyn DrawingEngine>) -> Self {
        let (port, receiver) = ipc::port("bootstrap");
        info!("app server created, bootstrap port {}", port.id());
        Self {
            config: Arc::new(config),
            engine,
            port,
            receiver: Mutex::new(Some(receiver)),
            running: Arc::new(AtomicBool::new(true)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The well-known bootstrap port.
    pub fn port(&self) -> PortHandle {
        self.port.clone()
    }

    pub fn config(&self) -> &Arc<TesseraConfig> {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Serves the bootstrap port until [`stop`](Self::stop) is called.
    pub fn run(&self) -> Result<()> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .context("app server is already running")?;
        info!("app server running");
        while self.is_running() {
            let Some(message) = receiver.recv() else {
                error!("bootstrap port vanished");
                break;
            };
            if message.code != WAKE_CODE {
                self.handle_bootstrap(message);
            }
        }
        info!("app server stopped serving");
        Ok(())
    }

    /// Asks every loop to wind down.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("app server stopping");
        }
        wake(&self.port);
        for session in self.sessions.lock().values() {
            wake(&session.port);
        }
    }

    /// Stops and joins every session, closing their windows.
    pub fn shutdown(&self) {
        self.stop();
        let threads: Vec<(i32, JoinHandle<()>)> = self
            .sessions
            .lock()
            .iter_mut()
            .filter_map(|(user, session)| session.thread.take().map(|t| (*user, t)))
            .collect();
        for (user, thread) in threads {
            if thread.join().is_err() {
                error!("session thread of user {} panicked", user);
            }
        }
        info!("app server shutdown complete");
    }

    /// The desktop of `user_id`, if its session exists.
    pub fn desktop(&self, user_id: i32) -> Option<Arc<Desktop>> {
        self.sessions.lock().get(&user_id).map(|s| s.desktop.clone())
    }

    pub fn snapshot(&self) -> Vec<DesktopSnapshot> {
        let mut desktops: Vec<Arc<Desktop>> = self.sessions.lock().values().map(|s| s.desktop.clone()).collect();
        desktops.sort_by_key(|d| d.user_id());
        desktops.iter().map(|d| d.snapshot()).collect()
    }

    fn handle_bootstrap(&self, message: Message) {
        let Some(reply_port) = message.port.clone() else {
            warn!("bootstrap message {:#x} without a reply port dropped", message.code);
            return;
        };
        let reply = match Request::decode(message.code, &message.data) {
            Ok(Request::GetDesktop { user_id }) => match self.session_port(user_id) {
                Ok(port) => protocol::reply_message(protocol::reply(Status::Ok)).with_port(port),
                Err(err) => {
                    error!("could not create a desktop for user {}: {:#}", user_id, err);
                    protocol::reply_message(protocol::reply(Status::NoMemory))
                }
            },
            Ok(other) => {
                warn!("unexpected {:?} on the bootstrap port", other.opcode());
                protocol::reply_message(protocol::reply(Status::NotAllowed))
            }
            Err(err) => {
                warn!("bad bootstrap message: {}", err);
                protocol::reply_message(protocol::reply(ServerError::from(err).status()))
            }
        };
        if reply_port.send(reply).is_err() {
            debug!("bootstrap reply dropped, client port closed");
        }
    }

    /// Session port of `user_id`, creating the desktop on first use.
    fn session_port(&self, user_id: i32) -> Result<PortHandle> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(&user_id) {
            return Ok(session.port.clone());
        }

        let desktop = Arc::new(Desktop::new(user_id, self.config.clone(), self.engine.clone()));
        let (port, receiver) = ipc::port("session");
        let worker = SessionWorker {
            desktop: desktop.clone(),
            running: self.running.clone(),
            windows: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name(format!("session-{}", user_id))
            .spawn(move || worker.run(receiver))
            .context("failed to spawn session thread")?;
        info!("session for user {} started on port {}", user_id, port.id());
        sessions.insert(
            user_id,
            Session {
                desktop,
                port: port.clone(),
                thread: Some(thread),
            },
        );
        Ok(port)
    }
}

/// Serves one session port.
struct SessionWorker {
    desktop: Arc<Desktop>,
    running: Arc<AtomicBool>,
    windows: Vec<WindowThread>,
}

impl SessionWorker {
    fn run(mut self, mut receiver: PortReceiver) {
        let user = self.desktop.user_id();
        while self.running.load(Ordering::SeqCst) {
            let Some(message) = receiver.recv() else {
                break;
            };
            if message.code != WAKE_CODE {
                self.handle(message);
            }
            self.windows.retain(|w| !w.thread.is_finished());
        }
        self.close_windows();
        info!("session for user {} ended", user);
    }

    fn handle(&mut self, message: Message) {
        let Some(reply_port) = message.port.clone() else {
            warn!("session message {:#x} without a reply port dropped", message.code);
            return;
        };
        let reply = match Request::decode(message.code, &message.data) {
            Ok(Request::CreateWindow(spec)) => self.create_window(&spec, reply_port.clone()),
            Ok(Request::SetWorkspace { index }) => {
                let result = self.desktop.write(|state| state.set_workspace(index as usize));
                let status = result.map_or_else(|err| err.status(), |_| Status::Ok);
                protocol::reply_message(protocol::reply(status))
            }
            Ok(Request::GetWorkspace) => {
                let mut w = protocol::reply(Status::Ok);
                w.u32(self.desktop.read().current_workspace() as u32);
                protocol::reply_message(w)
            }
            Ok(Request::CountWorkspaces) => {
                let mut w = protocol::reply(Status::Ok);
                w.u32(self.desktop.read().workspace_count() as u32);
                protocol::reply_message(w)
            }
            Ok(other) => {
                debug!("unexpected {:?} on a session port", other.opcode());
                protocol::reply_message(protocol::reply(Status::NotAllowed))
            }
            Err(err) => {
                warn!("bad session message: {}", err);
                protocol::reply_message(protocol::reply(ServerError::from(err).status()))
            }
        };
        if reply_port.send(reply).is_err() {
            debug!("session reply dropped, client port closed");
        }
    }

    /// Adds a window served by its own thread. The reply carries the window
    /// id and the window's port.
    fn create_window(&mut self, spec: &WindowSpec, client: PortHandle) -> Message {
        let window = match ServerWindow::new(self.desktop.clone(), spec, client) {
            Ok(window) => window,
            Err(err) => {
                warn!("window creation for user {} failed: {}", self.desktop.user_id(), err);
                return protocol::reply_message(protocol::reply(err.status()));
            }
        };
        let id = window.id();
        let (port, receiver) = ipc::port("window");
        let spawned = thread::Builder::new()
            .name(format!("window-{}", id))
            .spawn(move || window.run(receiver));
        match spawned {
            Ok(thread) => {
                self.windows.push(WindowThread {
                    port: port.downgrade(),
                    thread,
                });
                info!("window {} '{}' created", id, spec.title);
                let mut w = protocol::reply(Status::Ok);
                w.u32(id.0);
                protocol::reply_message(w).with_port(port)
            }
            Err(err) => {
                // dropping the unstarted window removed it again
                error!("failed to spawn thread for window {}: {}", id, err);
                protocol::reply_message(protocol::reply(Status::NoMemory))
            }
        }
    }

    fn close_windows(&mut self) {
        for window in &self.windows {
            if let Some(port) = window.port.upgrade() {
                let _ = port.send(Request::QuitWindow.to_message());
            }
        }
        for window in self.windows.drain(..) {
            if window.thread.join().is_err() {
                error!("a window thread of user {} panicked", self.desktop.user_id());
            }
        }
    }
}
