//! Drawing engine interface
//!
//! The compositor core never touches pixels itself. Everything it draws,
//! client primitives as well as backgrounds and decorations, goes through a
//! [`DrawingEngine`] in screen coordinates together with the clipping region
//! the primitive must stay inside.
//!
//! Engines expose a parallel-access lock: any number of windows may draw at
//! once while holding the shared side, and operations that touch the whole
//! frame buffer (screen mode changes) take the exclusive side.

use log::debug;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;

use crate::geometry::{Point, Rect, Rgba};
use crate::protocol::DrawingMode;
use crate::region::Region;
use crate::resources::ServerBitmap;

/// Color and pen used for one primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Paint {
    pub color: Rgba,
    pub pen_size: f32,
    pub mode: DrawingMode,
}

impl Paint {
    pub fn solid(color: Rgba) -> Self {
        Self {
            color,
            pen_size: 1.0,
            mode: DrawingMode::Copy,
        }
    }
}

/// Rasterizer consumed by the compositor.
pub trait DrawingEngine: Send + Sync {
    /// Shared access for drawing into a window's clip.
    fn lock_parallel(&self) -> RwLockReadGuard<'_, ()>;

    /// Exclusive access to the whole frame buffer.
    fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()>;

    fn set_screen_size(&self, width: u32, height: u32);

    fn stroke_line(&self, from: Point, to: Point, paint: &Paint, clip: &Region);

    fn stroke_rect(&self, rect: Rect, paint: &Paint, clip: &Region);

    fn fill_rect(&self, rect: Rect, paint: &Paint, clip: &Region);

    fn fill_region(&self, region: &Region, paint: &Paint, clip: &Region);

    fn stroke_ellipse(&self, bounds: Rect, paint: &Paint, clip: &Region);

    fn fill_ellipse(&self, bounds: Rect, paint: &Paint, clip: &Region);

    /// Draws `text` with its baseline starting at `at`; returns the pen
    /// advance in pixels.
    fn draw_string(&self, text: &str, at: Point, size: f32, paint: &Paint, clip: &Region) -> i32;

    fn draw_bitmap(&self, bitmap: &ServerBitmap, source: Rect, dest: Rect, clip: &Region);
}

/// Kind of primitive recorded by the [`HeadlessEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DrawKind {
    Line,
    StrokeRect,
    FillRect,
    FillRegion,
    StrokeEllipse,
    FillEllipse,
    String,
    Bitmap,
}

/// One primitive as it reached the engine, reduced to the pixels it was
/// allowed to touch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawRecord {
    pub kind: DrawKind,
    pub touched: Region,
    pub color: Rgba,
}

/// Engine without a frame buffer. It computes what each primitive would
/// touch and keeps a log of it, which is what the server binary runs on
/// when no hardware is attached and what tests inspect.
#[derive(Debug)]
pub struct HeadlessEngine {
    access: RwLock<()>,
    screen: Mutex<(u32, u32)>,
    records: Mutex<Vec<DrawRecord>>,
}

impl HeadlessEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            access: RwLock::new(()),
            screen: Mutex::new((width, height)),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        *self.screen.lock()
    }

    pub fn records(&self) -> Vec<DrawRecord> {
        self.records.lock().clone()
    }

    pub fn take_records(&self) -> Vec<DrawRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Union of every pixel touched with `color` since the last take.
    pub fn touched_with(&self, color: Rgba) -> Region {
        self.records
            .lock()
            .iter()
            .filter(|r| r.color == color)
            .fold(Region::new(), |acc, r| acc.union(&r.touched))
    }

    fn record(&self, kind: DrawKind, shape: Region, color: Rgba, clip: &Region) {
        let (width, height) = self.screen_size();
        let screen = Rect::new(0, 0, width as i32, height as i32);
        let touched = shape.intersect(clip).intersect_rect(screen);
        if touched.is_empty() {
            return;
        }
        self.records.lock().push(DrawRecord { kind, touched, color });
    }

    fn outline(rect: Rect, pen: f32) -> Region {
        let pen = (pen.round() as i32).max(1);
        Region::from_rect(rect).subtract_rect(rect.inset_by(pen, pen))
    }
}

impl DrawingEngine for HeadlessEngine {
    fn lock_parallel(&self) -> RwLockReadGuard<'_, ()> {
        self.access.read()
    }

    fn lock_exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.access.write()
    }

    fn set_screen_size(&self, width: u32, height: u32) {
        debug!("headless engine screen size {}x{}", width, height);
        *self.screen.lock() = (width, height);
    }

    fn stroke_line(&self, from: Point, to: Point, paint: &Paint, clip: &Region) {
        let pen = (paint.pen_size.round() as i32).max(1);
        let bounds = Rect::new(
            from.x.min(to.x),
            from.y.min(to.y),
            from.x.max(to.x).saturating_add(pen),
            from.y.max(to.y).saturating_add(pen),
        );
        self.record(DrawKind::Line, Region::from_rect(bounds), paint.color, clip);
    }

    fn stroke_rect(&self, rect: Rect, paint: &Paint, clip: &Region) {
        self.record(
            DrawKind::StrokeRect,
            Self::outline(rect, paint.pen_size),
            paint.color,
            clip,
        );
    }

    fn fill_rect(&self, rect: Rect, paint: &Paint, clip: &Region) {
        self.record(DrawKind::FillRect, Region::from_rect(rect), paint.color, clip);
    }

    fn fill_region(&self, region: &Region, paint: &Paint, clip: &Region) {
        self.record(DrawKind::FillRegion, region.clone(), paint.color, clip);
    }

    fn stroke_ellipse(&self, bounds: Rect, paint: &Paint, clip: &Region) {
        self.record(
            DrawKind::StrokeEllipse,
            Self::outline(bounds, paint.pen_size),
            paint.color,
            clip,
        );
    }

    fn fill_ellipse(&self, bounds: Rect, paint: &Paint, clip: &Region) {
        self.record(DrawKind::FillEllipse, Region::from_rect(bounds), paint.color, clip);
    }

    fn draw_string(&self, text: &str, at: Point, size: f32, paint: &Paint, clip: &Region) -> i32 {
        // fixed advance of 0.6 em per character
        let size = size.max(1.0);
        let advance = (text.chars().count() as f32 * size * 0.6).ceil() as i32;
        let ascent = size.ceil() as i32;
        let bounds = Rect::new(
            at.x,
            at.y.saturating_sub(ascent),
            at.x.saturating_add(advance),
            at.y.saturating_add(ascent / 4 + 1),
        );
        self.record(DrawKind::String, Region::from_rect(bounds), paint.color, clip);
        advance
    }

    fn draw_bitmap(&self, bitmap: &ServerBitmap, _source: Rect, dest: Rect, clip: &Region) {
        self.record(DrawKind::Bitmap, Region::from_rect(dest), bitmap.average_color(), clip);
    }
}
