//! Clipping regions
//!
//! A [`Region`] is an immutable set of pixels stored as non-overlapping
//! rectangles. Every operation returns a new region; nothing is mutated in
//! place, so a region handed out as a window's or view's clip can be shared
//! and cached freely.
//!
//! # Canonical form
//!
//! Rectangles are kept in y-x banded order: the region is cut into
//! horizontal bands at every y coordinate where its horizontal extent
//! changes, each band holds its maximal horizontal spans sorted by x, and
//! vertically adjacent bands with identical spans are merged. Two regions
//! covering the same pixels therefore hold the same rectangles, and derived
//! `PartialEq` is set equality.
//!
//! ```
//! use tessera::geometry::Rect;
//! use tessera::region::Region;
//!
//! let a = Region::from_rect(Rect::new(0, 0, 100, 100));
//! let b = Region::from_rect(Rect::new(50, 50, 150, 150));
//! let l_shape = a.subtract(&b);
//! assert_eq!(l_shape.count(), 2);
//! assert_eq!(l_shape.area(), 7500);
//! ```

use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A set of pixels described by non-overlapping rectangles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    rects: Vec<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Subtract,
}

impl SetOp {
    fn keep(self, in_a: bool, in_b: bool) -> bool {
        match self {
            SetOp::Union => in_a || in_b,
            SetOp::Intersect => in_a && in_b,
            SetOp::Subtract => in_a && !in_b,
        }
    }
}

type Span = (i32, i32);

impl Region {
    /// The empty region.
    pub fn new() -> Self {
        Self { rects: Vec::new() }
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            Self::new()
        } else {
            Self { rects: vec![rect] }
        }
    }

    /// Union of arbitrary (possibly overlapping) rectangles.
    pub fn from_rects<I: IntoIterator<Item = Rect>>(rects: I) -> Self {
        let raw: Vec<Rect> = rects.into_iter().filter(|r| !r.is_empty()).collect();
        if raw.len() <= 1 {
            return Self { rects: raw };
        }
        combine(&raw, &[], SetOp::Union)
    }

    /// The rectangles in canonical y-x banded order.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn count(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Smallest rectangle enclosing the region; `Rect::EMPTY` when empty.
    pub fn bounds(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::EMPTY, |acc, r| acc.bounding_union(r))
    }

    /// Number of pixels in the region.
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn contains(&self, point: Point) -> bool {
        self.rects.iter().any(|r| r.contains(point))
    }

    pub fn intersects_rect(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|r| r.intersects(rect))
    }

    pub fn union(&self, other: &Region) -> Region {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        combine(&self.rects, &other.rects, SetOp::Union)
    }

    pub fn intersect(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return Region::new();
        }
        combine(&self.rects, &other.rects, SetOp::Intersect)
    }

    pub fn subtract(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        combine(&self.rects, &other.rects, SetOp::Subtract)
    }

    pub fn union_rect(&self, rect: Rect) -> Region {
        self.union(&Region::from_rect(rect))
    }

    pub fn intersect_rect(&self, rect: Rect) -> Region {
        if rect.is_empty() {
            return Region::new();
        }
        // Fast path: a single rectangle clips each band independently.
        let rects: Vec<Rect> = self
            .rects
            .iter()
            .filter_map(|r| r.intersection(&rect))
            .collect();
        if rects.len() == self.rects.len() && rects == self.rects {
            return self.clone();
        }
        // Clipping can make formerly distinct bands identical; renormalize.
        Region::from_rects(rects)
    }

    pub fn subtract_rect(&self, rect: Rect) -> Region {
        self.subtract(&Region::from_rect(rect))
    }

    /// Translates every rectangle. Translation preserves canonical form.
    pub fn offset_by(&self, dx: i32, dy: i32) -> Region {
        Region {
            rects: self.rects.iter().map(|r| r.offset_by(dx, dy)).collect(),
        }
    }

    /// Applies an arbitrary rectangle mapping and renormalizes.
    pub fn map_rects<F: FnMut(&Rect) -> Rect>(&self, f: F) -> Region {
        Region::from_rects(self.rects.iter().map(f))
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Region::from_rect(rect)
    }
}

/// Band sweep shared by all boolean operations.
fn combine(a: &[Rect], b: &[Rect], op: SetOp) -> Region {
    let mut ys: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|r| [r.top, r.bottom])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    let mut out: Vec<Rect> = Vec::new();
    // (top, bottom, spans) of the band being extended downwards
    let mut open: Option<(i32, i32, Vec<Span>)> = None;

    for pair in ys.windows(2) {
        let (y0, y1) = (pair[0], pair[1]);
        let spans_a = spans_in_band(a, y0, y1);
        let spans_b = spans_in_band(b, y0, y1);
        let spans = combine_spans(&spans_a, &spans_b, op);

        match open.take() {
            Some((top, bottom, prev)) if bottom == y0 && prev == spans && !spans.is_empty() => {
                open = Some((top, y1, prev));
            }
            previous => {
                if let Some((top, bottom, prev)) = previous {
                    flush_band(&mut out, top, bottom, &prev);
                }
                if !spans.is_empty() {
                    open = Some((y0, y1, spans));
                }
            }
        }
    }
    if let Some((top, bottom, prev)) = open {
        flush_band(&mut out, top, bottom, &prev);
    }

    Region { rects: out }
}

fn flush_band(out: &mut Vec<Rect>, top: i32, bottom: i32, spans: &[Span]) {
    out.extend(spans.iter().map(|&(l, r)| Rect::new(l, top, r, bottom)));
}

/// Horizontal coverage of `rects` over the band `[y0, y1)`, merged and sorted.
fn spans_in_band(rects: &[Rect], y0: i32, y1: i32) -> Vec<Span> {
    let mut spans: Vec<Span> = rects
        .iter()
        .filter(|r| r.top <= y0 && r.bottom >= y1)
        .map(|r| (r.left, r.right))
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for (l, r) in spans {
        match merged.last_mut() {
            Some(last) if l <= last.1 => last.1 = last.1.max(r),
            _ => merged.push((l, r)),
        }
    }
    merged
}

fn covered(spans: &[Span], x: i32) -> bool {
    // spans are sorted and disjoint
    let idx = spans.partition_point(|&(_, r)| r <= x);
    spans.get(idx).map_or(false, |&(l, _)| l <= x)
}

fn combine_spans(a: &[Span], b: &[Span], op: SetOp) -> Vec<Span> {
    let mut xs: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|&(l, r)| [l, r])
        .collect();
    xs.sort_unstable();
    xs.dedup();

    let mut out: Vec<Span> = Vec::new();
    for pair in xs.windows(2) {
        let (x0, x1) = (pair[0], pair[1]);
        if !op.keep(covered(a, x0), covered(b, x0)) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x0 => last.1 = x1,
            _ => out.push((x0, x1)),
        }
    }
    out
}
