//! Server-side repaint of exposed areas.

use log::trace;

use crate::geometry::Rgba;
use crate::protocol::events::ServerEvent;
use crate::region::Region;
use crate::renderer::{DrawingEngine, Paint};
use crate::window::WindowLayer;

/// Fills exposed desktop background.
pub(super) fn background(engine: &dyn DrawingEngine, exposed: &Region, color: Rgba) {
    trace!("background repaint of {} rects", exposed.count());
    engine.fill_region(exposed, &Paint::solid(color), exposed);
}

/// Repaints the exposed part of a window. The decorator draws its own
/// pixels; the client is asked to redraw content through an `Update` in
/// window coordinates.
pub(super) fn window(engine: &dyn DrawingEngine, window: &WindowLayer, exposed: &Region, focused: bool) {
    let frame = window.frame();
    if let Some(decorator) = window.decorator() {
        decorator.draw(engine, frame, window.title(), focused, exposed);
    }
    let content = exposed.intersect_rect(frame);
    if !content.is_empty() {
        window.post(ServerEvent::Update {
            region: content.offset_by(-frame.left, -frame.top),
        });
    }
}
