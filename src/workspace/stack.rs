//! Per-workspace Z-order
//!
//! This module provides the `WindowStack` data structure holding the stacking
//! order of one workspace. Windows are ordered from bottom to top and grouped
//! by feel tier: a window is never stacked above a window of a higher tier.

use std::collections::HashMap;

use crate::window::WindowId;

/// Z-order of the windows on one workspace.
///
/// Index 0 is the bottom-most window and the last index is the front-most.
/// Tiers are non-decreasing from bottom to top.
///
/// # Examples
///
/// ```
/// use tessera::window::WindowId;
/// use tessera::workspace::WindowStack;
///
/// let mut stack = WindowStack::new();
/// stack.insert(WindowId(1), 1);
/// stack.insert(WindowId(2), 0);
///
/// assert_eq!(stack.front(), Some(WindowId(1)));
/// assert_eq!(stack.back(), Some(WindowId(2)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct WindowStack {
    /// (window, tier), bottom to top
    windows: Vec<(WindowId, u8)>,

    /// Fast lookup: window → index in `windows`
    positions: HashMap<WindowId, usize>,
}

impl WindowStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a window at the front of its tier.
    ///
    /// Returns `false` if the window is already in the stack.
    pub fn insert(&mut self, id: WindowId, tier: u8) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        let at = self.top_of_tier(tier);
        self.windows.insert(at, (id, tier));
        self.rebuild_positions();
        true
    }

    /// Adds a window at the back of its tier.
    pub fn insert_back(&mut self, id: WindowId, tier: u8) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        let at = self
            .windows
            .iter()
            .position(|&(_, t)| t >= tier)
            .unwrap_or(self.windows.len());
        self.windows.insert(at, (id, tier));
        self.rebuild_positions();
        true
    }

    /// Removes a window, returning its previous position.
    pub fn remove(&mut self, id: WindowId) -> Option<usize> {
        let pos = self.positions.remove(&id)?;
        self.windows.remove(pos);
        self.rebuild_positions();
        Some(pos)
    }

    /// Moves a window to the front of its tier. Returns whether the order
    /// changed.
    pub fn raise(&mut self, id: WindowId) -> bool {
        let Some(&pos) = self.positions.get(&id) else {
            return false;
        };
        let tier = self.windows[pos].1;
        self.windows.remove(pos);
        let at = self.top_of_tier(tier);
        self.windows.insert(at, (id, tier));
        self.rebuild_positions();
        at != pos
    }

    /// Re-sorts a window whose tier changed, placing it at the front of the
    /// new tier.
    pub fn set_tier(&mut self, id: WindowId, tier: u8) -> bool {
        if self.remove(id).is_none() {
            return false;
        }
        self.insert(id, tier)
    }

    /// Windows in bottom-to-top drawing order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = WindowId> + '_ {
        self.windows.iter().map(|&(id, _)| id)
    }

    /// Windows in front-to-back order, the order used for hit testing and
    /// occlusion.
    pub fn front_to_back(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.iter().rev()
    }

    pub fn front(&self) -> Option<WindowId> {
        self.windows.last().map(|&(id, _)| id)
    }

    pub fn back(&self) -> Option<WindowId> {
        self.windows.first().map(|&(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Position 0 is the bottom-most window.
    pub fn position(&self, id: WindowId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Windows stacked above `id`, bottom to top.
    pub fn windows_above(&self, id: WindowId) -> Vec<WindowId> {
        match self.positions.get(&id) {
            Some(&pos) => self.windows[pos + 1..].iter().map(|&(w, _)| w).collect(),
            None => Vec::new(),
        }
    }

    /// Index just above the last window of `tier` or below.
    fn top_of_tier(&self, tier: u8) -> usize {
        self.windows
            .iter()
            .rposition(|&(_, t)| t <= tier)
            .map_or(0, |p| p + 1)
    }

    fn rebuild_positions(&mut self) {
        self.positions.clear();
        for (i, &(id, _)) in self.windows.iter().enumerate() {
            self.positions.insert(id, i);
        }
    }
}
