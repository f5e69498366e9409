//! Workspaces view
//!
//! A view the server draws itself: every workspace is shown as one cell of
//! a grid, with its windows scaled down into the cell. Dragging a window
//! from one cell to another moves it between workspaces, and a click on a
//! cell switches to that workspace. Both go straight to the desktop's
//! structural API instead of through a window connection.

use log::debug;
use serde::Serialize;

use crate::desktop::{Desktop, DesktopState};
use crate::geometry::{Point, Rect, Rgba};
use crate::region::Region;
use crate::renderer::{DrawingEngine, Paint};
use crate::view::ViewToken;
use crate::window::{WindowId, WindowLayer};

const FRAME_COLOR: Rgba = Rgba::new(0x60, 0x60, 0x60, 255);
const CURRENT_COLOR: Rgba = Rgba::new(0xFF, 0xCB, 0x00, 255);
const WINDOW_COLOR: Rgba = Rgba::new(0xEE, 0xEE, 0xEE, 255);

/// Pointer travel before a press turns into a drag.
const DRAG_THRESHOLD: i32 = 3;

/// Columns and rows for `count` cells: as square as possible, filled row
/// by row.
pub fn grid(count: usize) -> (usize, usize) {
    let count = count.max(1);
    let mut columns = 1;
    while columns * columns < count {
        columns += 1;
    }
    (columns, count.div_ceil(columns))
}

pub fn cell_frame(bounds: Rect, count: usize, index: usize) -> Rect {
    let (columns, rows) = grid(count);
    let (column, row) = ((index % columns) as i64, (index / columns) as i64);
    let (columns, rows) = (columns as i64, rows as i64);
    let x = |c: i64| bounds.left + (bounds.width() as i64 * c / columns) as i32;
    let y = |r: i64| bounds.top + (bounds.height() as i64 * r / rows) as i32;
    Rect::new(x(column), y(row), x(column + 1), y(row + 1))
}

/// Workspace whose cell contains `point`.
pub fn workspace_at(bounds: Rect, count: usize, point: Point) -> Option<usize> {
    if !bounds.contains(point) {
        return None;
    }
    (0..count).find(|&index| cell_frame(bounds, count, index).contains(point))
}

fn scale(value: i32, from_origin: i32, from_len: i32, to_origin: i32, to_len: i32) -> i32 {
    if from_len <= 0 {
        return to_origin;
    }
    let offset = (value - from_origin) as i64 * to_len as i64;
    to_origin + offset.div_euclid(from_len as i64) as i32
}

/// Maps a screen rectangle into `cell`.
pub fn to_cell(screen: Rect, cell: Rect, rect: Rect) -> Rect {
    Rect::new(
        scale(rect.left, screen.left, screen.width(), cell.left, cell.width()),
        scale(rect.top, screen.top, screen.height(), cell.top, cell.height()),
        scale(rect.right, screen.left, screen.width(), cell.left, cell.width()),
        scale(rect.bottom, screen.top, screen.height(), cell.top, cell.height()),
    )
}

/// Maps a point inside `cell` back to the screen.
pub fn from_cell(screen: Rect, cell: Rect, point: Point) -> Point {
    Point::new(
        scale(point.x, cell.left, cell.width(), screen.left, screen.width()),
        scale(point.y, cell.top, cell.height(), screen.top, screen.height()),
    )
}

/// Where a window sits while workspace `index` is shown.
fn frame_on(state: &DesktopState, window: &WindowLayer, index: usize) -> Rect {
    let frame = window.frame();
    match window.anchor(index) {
        Some(at) if index != state.current_workspace() => frame.offset_to(at.x, at.y),
        _ => frame,
    }
}

fn footprint_bounds(window: &WindowLayer, frame: Rect) -> Rect {
    match window.decorator() {
        Some(decorator) => decorator.footprint(frame).bounds(),
        None => frame,
    }
}

/// Topmost window of workspace `index` whose miniature contains `point`.
pub fn window_in_cell(state: &DesktopState, bounds: Rect, index: usize, point: Point) -> Option<WindowId> {
    let screen = state.screen_rect();
    let cell = cell_frame(bounds, state.workspace_count(), index).inset_by(1, 1);
    state
        .workspace_windows(index)
        .into_iter()
        .rev()
        .filter_map(|id| state.window(id))
        .find(|window| {
            let frame = frame_on(state, window, index);
            to_cell(screen, cell, footprint_bounds(window, frame)).contains(point)
        })
        .map(|window| window.id())
}

/// Draws the grid into `bounds`, limited to `clip`.
pub fn draw(state: &DesktopState, engine: &dyn DrawingEngine, bounds: Rect, clip: &Region) {
    let screen = state.screen_rect();
    let count = state.workspace_count();
    for index in 0..count {
        let cell = cell_frame(bounds, count, index);
        let inner = cell.inset_by(1, 1);
        let cell_clip = clip.intersect_rect(inner);
        if !cell_clip.is_empty() {
            if let Some(workspace) = state.workspace(index) {
                engine.fill_rect(inner, &Paint::solid(workspace.color()), &cell_clip);
            }
            for id in state.workspace_windows(index) {
                let Some(window) = state.window(id) else {
                    continue;
                };
                let frame = frame_on(state, window, index);
                let focused = state.focused() == Some(id);
                if let Some(decorator) = window.decorator() {
                    let tab = to_cell(screen, inner, decorator.tab_rect(frame));
                    let colors = decorator.colors(focused);
                    engine.fill_rect(tab, &Paint::solid(colors.tab), &cell_clip);
                }
                let mapped = to_cell(screen, inner, frame);
                engine.fill_rect(mapped, &Paint::solid(WINDOW_COLOR), &cell_clip);
                engine.stroke_rect(mapped, &Paint::solid(Rgba::BLACK), &cell_clip);
            }
        }
        let border = if index == state.current_workspace() {
            CURRENT_COLOR
        } else {
            FRAME_COLOR
        };
        engine.stroke_rect(cell, &Paint::solid(border), clip);
    }
}

/// Pointer input delivered to a workspaces view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointerEvent {
    Down(Point),
    Moved(Point),
    Up(Point),
}

impl PointerEvent {
    pub fn position(&self) -> Point {
        match *self {
            PointerEvent::Down(at) | PointerEvent::Moved(at) | PointerEvent::Up(at) => at,
        }
    }
}

/// A press inside a workspaces view, held until the button is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drag {
    pub host: WindowId,
    pub view: ViewToken,
    pub bounds: Rect,
    pub from: usize,
    pub window: Option<WindowId>,
    /// Pointer position relative to the window's miniature.
    pub grab: Point,
    pub start: Point,
    pub moved: bool,
}

/// Handles one pointer event for the workspaces view `view` of `host`,
/// whose screen frame is `bounds`.
pub fn handle_pointer(desktop: &Desktop, host: WindowId, view: ViewToken, bounds: Rect, event: PointerEvent) {
    match event {
        PointerEvent::Down(at) => {
            let drag = {
                let state = desktop.read();
                let Some(from) = workspace_at(bounds, state.workspace_count(), at) else {
                    return;
                };
                let window = window_in_cell(&state, bounds, from, at);
                let grab = window
                    .and_then(|id| state.window(id))
                    .map(|w| {
                        let cell = cell_frame(bounds, state.workspace_count(), from).inset_by(1, 1);
                        let mapped = to_cell(state.screen_rect(), cell, frame_on(&state, w, from));
                        Point::new(at.x - mapped.left, at.y - mapped.top)
                    })
                    .unwrap_or(Point::ORIGIN);
                Drag {
                    host,
                    view,
                    bounds,
                    from,
                    window,
                    grab,
                    start: at,
                    moved: false,
                }
            };
            *desktop.drag().lock() = Some(drag);
        }
        PointerEvent::Moved(at) => {
            if let Some(drag) = desktop.drag().lock().as_mut() {
                let (dx, dy) = (at.x - drag.start.x, at.y - drag.start.y);
                if dx.abs() > DRAG_THRESHOLD || dy.abs() > DRAG_THRESHOLD {
                    drag.moved = true;
                }
            }
        }
        PointerEvent::Up(at) => {
            let Some(drag) = desktop.drag().lock().take() else {
                return;
            };
            finish(desktop, drag, at);
        }
    }
}

fn finish(desktop: &Desktop, drag: Drag, at: Point) {
    let result = desktop.write(|state| {
        let count = state.workspace_count();
        let Some(target) = workspace_at(drag.bounds, count, at) else {
            return Ok(());
        };
        let window = match drag.window {
            Some(window) if drag.moved => window,
            _ => {
                debug!("workspaces view click on workspace {}", target);
                return state.set_workspace(target);
            }
        };
        let cell = cell_frame(drag.bounds, count, target).inset_by(1, 1);
        let corner = Point::new(at.x - drag.grab.x, at.y - drag.grab.y);
        let position = from_cell(state.screen_rect(), cell, corner);
        if target != drag.from {
            let mask = state.window(window).map_or(0, |w| w.workspaces());
            let mask = (mask & !(1 << drag.from)) | (1 << target);
            state.set_window_workspaces(window, mask)?;
        }
        debug!("window {} dropped on workspace {} at {:?}", window, target, position);
        state.place_on_workspace(window, target, position)
    });
    if let Err(err) = result {
        debug!("workspaces view drop failed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_is_nearly_square() {
        assert_eq!(grid(1), (1, 1));
        assert_eq!(grid(2), (2, 1));
        assert_eq!(grid(4), (2, 2));
        assert_eq!(grid(5), (3, 2));
        assert_eq!(grid(9), (3, 3));
        assert_eq!(grid(10), (4, 3));
        assert_eq!(grid(32), (6, 6));
    }

    #[test]
    fn test_cells_tile_the_bounds() {
        let bounds = Rect::new(10, 20, 310, 220);
        let cells: Vec<Rect> = (0..4).map(|i| cell_frame(bounds, 4, i)).collect();
        assert_eq!(cells[0], Rect::new(10, 20, 160, 120));
        assert_eq!(cells[3], Rect::new(160, 120, 310, 220));
        let area: i64 = cells.iter().map(Rect::area).sum();
        assert_eq!(area, bounds.area());
    }

    #[test]
    fn test_workspace_at() {
        let bounds = Rect::new(0, 0, 300, 200);
        assert_eq!(workspace_at(bounds, 5, Point::new(5, 5)), Some(0));
        assert_eq!(workspace_at(bounds, 5, Point::new(250, 50)), Some(2));
        assert_eq!(workspace_at(bounds, 5, Point::new(150, 150)), Some(4));
        // sixth cell of the 3x2 grid is unused
        assert_eq!(workspace_at(bounds, 5, Point::new(250, 150)), None);
        assert_eq!(workspace_at(bounds, 5, Point::new(300, 0)), None);
    }

    #[test]
    fn test_screen_to_cell_mapping() {
        let screen = Rect::new(0, 0, 800, 600);
        let cell = Rect::new(100, 100, 180, 160);
        assert_eq!(to_cell(screen, cell, screen), cell);
        assert_eq!(
            to_cell(screen, cell, Rect::new(400, 300, 800, 600)),
            Rect::new(140, 130, 180, 160)
        );
        assert_eq!(from_cell(screen, cell, Point::new(140, 130)), Point::new(400, 300));
        assert_eq!(from_cell(screen, cell, Point::new(100, 100)), Point::ORIGIN);
    }
}
