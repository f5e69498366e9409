//! Virtual workspaces
//!
//! A desktop has up to [`MAX_WORKSPACES`] workspaces. Each keeps its own
//! z-order of member windows and a background color. Membership itself is a
//! bit mask stored on the window; the stacks here mirror those masks and are
//! kept in sync by the desktop.

mod stack;

use log::debug;
use serde::Serialize;

use crate::config::WorkspaceConfig;
use crate::geometry::Rgba;
use crate::window::WindowId;

pub use stack::WindowStack;

pub const MAX_WORKSPACES: usize = 32;

#[derive(Debug, Clone)]
pub struct Workspace {
    index: usize,
    color: Rgba,
    stack: WindowStack,
}

impl Workspace {
    pub fn new(index: usize, color: Rgba) -> Self {
        Self {
            index,
            color,
            stack: WindowStack::new(),
        }
    }

    /// Workspaces `0..config.count` with their configured colors.
    pub fn from_config(config: &WorkspaceConfig) -> Vec<Workspace> {
        let count = (config.count as usize).clamp(1, MAX_WORKSPACES);
        debug!("creating {} workspaces", count);
        (0..count)
            .map(|index| Workspace::new(index, config.color(index)))
            .collect()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn color(&self) -> Rgba {
        self.color
    }

    pub fn set_color(&mut self, color: Rgba) {
        self.color = color;
    }

    pub fn stack(&self) -> &WindowStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut WindowStack {
        &mut self.stack
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.stack.contains(id)
    }

    /// Bit of this workspace in a membership mask.
    pub fn bit(&self) -> u32 {
        1 << self.index
    }

    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            index: self.index,
            color: self.color.to_hex(),
            windows: self.stack.iter().collect(),
        }
    }
}

/// Diagnostic view of one workspace; windows bottom to top.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceSnapshot {
    pub index: usize,
    pub color: String,
    pub windows: Vec<WindowId>,
}

/// Indices of the set bits of `mask` below `count`, lowest first.
pub fn mask_indices(mask: u32, count: usize) -> impl Iterator<Item = usize> {
    (0..count.min(MAX_WORKSPACES)).filter(move |i| mask & (1 << i) != 0)
}
