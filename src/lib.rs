//! # Tessera Display Server Core
//!
//! The window-management core of a display server: exact clipping of
//! overlapping windows and nested views, a binary per-window protocol, and
//! multiple workspaces.
//!
//! ## Architecture
//!
//! Tessera is built from small layers:
//! - `region`: exact pixel regions as sorted, non-overlapping rectangles
//! - `view`: per-window view trees and their clipping regions
//! - `window`, `decoration`, `workspace`: window layers, frames and workspaces
//! - `desktop`: one user session's windows, locks and clip rebuilding
//! - `protocol`, `ipc`: message ports and the attachment wire format
//! - `server_window`: one thread per window, serving its protocol
//! - `picture`: recorded drawing, replayed on demand
//! - `direct`: frame-buffer hand-off to clients drawing on their own
//! - `workspaces_view`: the server-drawn workspace overview
//! - `app_server`: bootstrap port and per-user desktops
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tessera::{AppServer, HeadlessEngine, TesseraConfig};
//!
//! let config = TesseraConfig::default();
//! let engine = Arc::new(HeadlessEngine::new(config.screen.width, config.screen.height));
//! let server = AppServer::new(config, engine);
//! server.run()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod app_server;
pub mod config;
pub mod decoration;
pub mod desktop;
pub mod direct;
pub mod error;
pub mod geometry;
pub mod ipc;
pub mod picture;
pub mod protocol;
pub mod region;
pub mod renderer;
pub mod resources;
pub mod server_window;
pub mod view;
pub mod window;
pub mod workspace;
pub mod workspaces_view;

// Re-export main types for easy access
pub use app_server::AppServer;
pub use config::TesseraConfig;
pub use desktop::Desktop;
pub use error::{ServerError, Status};
pub use geometry::{Point, Rect};
pub use region::Region;
pub use renderer::{DrawingEngine, HeadlessEngine};
pub use server_window::ServerWindow;

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Tessera
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
