//! Screen geometry primitives
//!
//! Integer types (`Point`, `Rect`) describe pixels: window frames, view
//! frames and clipping rectangles. Float types (`PointF`, `RectF`) carry
//! client drawing coordinates before they are mapped through a view's
//! drawing state onto the pixel grid.
//!
//! `Rect` is half-open: it covers `[left, right) x [top, bottom)`, so a
//! rectangle with `left == right` is empty and adjacent rectangles share
//! an edge without overlapping.

use serde::{Deserialize, Serialize};

/// Largest magnitude any pixel coordinate may take. Arithmetic on points
/// and rectangles saturates at this bound instead of overflowing.
pub const MAX_COORDINATE: i32 = 1 << 24;

/// Clamps a wide intermediate result onto the coordinate range.
pub fn clamp_coordinate(value: i64) -> i32 {
    value.clamp(-(MAX_COORDINATE as i64), MAX_COORDINATE as i64) as i32
}

fn add(a: i32, b: i32) -> i32 {
    clamp_coordinate(a as i64 + b as i64)
}

fn clamp_float(value: f32) -> i32 {
    let bound = MAX_COORDINATE as f32;
    if value.is_nan() {
        0
    } else {
        value.clamp(-bound, bound) as i32
    }
}

/// A pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset_by(self, dx: i32, dy: i32) -> Self {
        Self::new(add(self.x, dx), add(self.y, dy))
    }

    /// The point with both coordinates inside `MAX_COORDINATE`.
    pub fn clamped(self) -> Self {
        Self::new(clamp_coordinate(self.x as i64), clamp_coordinate(self.y as i64))
    }
}

/// An axis-aligned pixel rectangle, half-open on the right and bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { left: 0, top: 0, right: 0, bottom: 0 };

    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Creates a rectangle from a position and a size.
    pub fn from_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, add(x, width.max(0)), add(y, height.max(0)))
    }

    /// The rectangle with every edge inside `MAX_COORDINATE`.
    pub fn clamped(&self) -> Rect {
        let c = |v: i32| clamp_coordinate(v as i64);
        Rect::new(c(self.left), c(self.top), c(self.right), c(self.bottom))
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top).max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Number of pixels covered.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    pub fn left_top(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x < self.right && point.y >= self.top && point.y < self.bottom
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.left >= self.left
                && other.top >= self.top
                && other.right <= self.right
                && other.bottom <= self.bottom)
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// Returns the overlap of two rectangles, or `None` if they don't share a pixel.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        ))
    }

    /// Smallest rectangle containing both. Empty rectangles are ignored.
    pub fn bounding_union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn offset_by(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(add(self.left, dx), add(self.top, dy), add(self.right, dx), add(self.bottom, dy))
    }

    pub fn offset_to(&self, x: i32, y: i32) -> Rect {
        self.offset_by(x.saturating_sub(self.left), y.saturating_sub(self.top))
    }

    /// Moves every edge inwards by the given amount; negative values grow the rectangle.
    pub fn inset_by(&self, dx: i32, dy: i32) -> Rect {
        let (ndx, ndy) = (dx.saturating_neg(), dy.saturating_neg());
        Rect::new(add(self.left, dx), add(self.top, dy), add(self.right, ndx), add(self.bottom, ndy))
    }

    pub fn to_f32(&self) -> RectF {
        RectF::new(self.left as f32, self.top as f32, self.right as f32, self.bottom as f32)
    }
}

/// A drawing-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Nearest pixel, rounding half away from zero. Out-of-range values
    /// land on the coordinate bound.
    pub fn round(&self) -> Point {
        Point::new(clamp_float(self.x.round()), clamp_float(self.y.round()))
    }
}

/// A drawing-space rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Smallest pixel rectangle covering this one (floor the near edges,
    /// ceil the far edges), clamped to the coordinate range.
    pub fn to_pixels(&self) -> Rect {
        let left = self.left.min(self.right);
        let right = self.left.max(self.right);
        let top = self.top.min(self.bottom);
        let bottom = self.top.max(self.bottom);
        Rect::new(
            clamp_float(left.floor()),
            clamp_float(top.floor()),
            clamp_float(right.ceil()),
            clamp_float(bottom.ceil()),
        )
    }
}

/// A 32-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self { red, green, blue, alpha }
    }

    /// Parses `#RRGGBB` or `#RRGGBBAA`.
    pub fn from_hex(text: &str) -> Option<Rgba> {
        let hex = text.strip_prefix('#')?;
        if hex.len() != 6 && hex.len() != 8 {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        let alpha = if hex.len() == 8 { byte(6)? } else { 255 };
        Some(Rgba::new(byte(0)?, byte(2)?, byte(4)?, alpha))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.red, self.green, self.blue, self.alpha)
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::BLACK
    }
}
