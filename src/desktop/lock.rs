//! Desktop lock capabilities
//!
//! Two lock levels guard a desktop. The structural lock covers the window
//! list, z-order and workspace membership; the screen lock covers the screen
//! mode. When both are needed the screen lock is taken first, and it is
//! never taken while the structural lock is held.
//!
//! Holding a token is the capability: readers get `&DesktopState` through a
//! [`ReadToken`], and the structural mutators on `&mut DesktopState` are only
//! reachable through a [`WriteToken`]. Tokens are handed out by scoped
//! acquisition on [`Desktop`](super::Desktop).

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use std::ops::{Deref, DerefMut};

use super::state::DesktopState;

/// Shared side of the structural lock.
pub struct ReadToken<'a> {
    pub(super) guard: RwLockReadGuard<'a, DesktopState>,
}

impl Deref for ReadToken<'_> {
    type Target = DesktopState;

    fn deref(&self) -> &DesktopState {
        &self.guard
    }
}

/// Exclusive side of the structural lock.
pub struct WriteToken<'a> {
    pub(super) guard: RwLockWriteGuard<'a, DesktopState>,
}

impl Deref for WriteToken<'_> {
    type Target = DesktopState;

    fn deref(&self) -> &DesktopState {
        &self.guard
    }
}

impl DerefMut for WriteToken<'_> {
    fn deref_mut(&mut self) -> &mut DesktopState {
        &mut self.guard
    }
}

/// Screen mode guarded by the screen lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenState {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

/// The screen lock.
pub struct ScreenToken<'a> {
    pub(super) guard: RwLockWriteGuard<'a, ScreenState>,
}

impl Deref for ScreenToken<'_> {
    type Target = ScreenState;

    fn deref(&self) -> &ScreenState {
        &self.guard
    }
}

impl DerefMut for ScreenToken<'_> {
    fn deref_mut(&mut self) -> &mut ScreenState {
        &mut self.guard
    }
}
