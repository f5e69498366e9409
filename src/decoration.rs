//! Window decorators
//!
//! A decorator owns the area around a window's content frame: the title tab
//! and the border. The compositor asks it for the footprint of a frame when
//! computing clipping and lets it repaint its own areas; everything inside
//! the frame belongs to the client.

use log::debug;
use std::fmt;
use std::sync::Arc;

use crate::config::DecoratorConfig;
use crate::geometry::{Point, Rect, Rgba};
use crate::region::Region;
use crate::renderer::{DrawingEngine, Paint};
use crate::window::WindowLook;

/// Themed colors of one decorator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoratorColors {
    pub tab: Rgba,
    pub border: Rgba,
    pub text: Rgba,
}

pub trait Decorator: Send + Sync + fmt::Debug {
    /// Title tab of a window with content `frame`; empty when there is none.
    fn tab_rect(&self, frame: Rect) -> Rect;

    /// Border ring around `frame`, excluding the frame itself.
    fn border_region(&self, frame: Rect) -> Region;

    fn colors(&self, focused: bool) -> DecoratorColors;

    /// Every pixel the decorated window occupies, content included.
    fn footprint(&self, frame: Rect) -> Region {
        self.border_region(frame)
            .union_rect(frame)
            .union_rect(self.tab_rect(frame))
    }

    /// Decorator-owned pixels only.
    fn decoration_region(&self, frame: Rect) -> Region {
        self.footprint(frame).subtract_rect(frame)
    }

    /// Repaints the decoration inside `clip`.
    fn draw(&self, engine: &dyn DrawingEngine, frame: Rect, title: &str, focused: bool, clip: &Region) {
        let colors = self.colors(focused);
        let visible = self.decoration_region(frame).intersect(clip);
        if visible.is_empty() {
            return;
        }
        engine.fill_region(&self.border_region(frame), &Paint::solid(colors.border), &visible);
        let tab = self.tab_rect(frame);
        if !tab.is_empty() {
            engine.fill_rect(tab, &Paint::solid(colors.tab), &visible);
            let baseline = Point::new(tab.left + 6, tab.bottom - (tab.height() / 4).max(1));
            let size = (tab.height() as f32 * 0.6).max(1.0);
            engine.draw_string(title, baseline, size, &Paint::solid(colors.text), &visible);
        }
    }

    /// Whether `point` grabs the tab (for dragging the window).
    fn tab_contains(&self, frame: Rect, point: Point) -> bool {
        self.tab_rect(frame).contains(point)
    }
}

/// Tab above the frame plus a uniform border, themed from configuration.
#[derive(Debug, Clone)]
pub struct DefaultDecorator {
    tab_height: i32,
    border_width: i32,
    focused: DecoratorColors,
    unfocused: DecoratorColors,
}

impl DefaultDecorator {
    pub fn new(config: &DecoratorConfig, with_tab: bool) -> Self {
        let border = Rgba::from_hex(&config.border_color).unwrap_or(Rgba::new(0xD8, 0xD8, 0xD8, 255));
        let focused_tab =
            Rgba::from_hex(&config.focused_tab_color).unwrap_or(Rgba::new(0xFF, 0xD8, 0x00, 255));
        let unfocused_tab =
            Rgba::from_hex(&config.unfocused_tab_color).unwrap_or(Rgba::new(0xE8, 0xE8, 0xE8, 255));

        Self {
            tab_height: if with_tab { config.tab_height as i32 } else { 0 },
            border_width: config.border_width as i32,
            focused: DecoratorColors {
                tab: focused_tab,
                border,
                text: Rgba::BLACK,
            },
            unfocused: DecoratorColors {
                tab: unfocused_tab,
                border,
                text: Rgba::new(0x50, 0x50, 0x50, 255),
            },
        }
    }

    fn bordered(&self, frame: Rect) -> Rect {
        frame.inset_by(-self.border_width, -self.border_width)
    }
}

impl Decorator for DefaultDecorator {
    fn tab_rect(&self, frame: Rect) -> Rect {
        if self.tab_height == 0 {
            return Rect::EMPTY;
        }
        let bordered = self.bordered(frame);
        Rect::new(
            bordered.left,
            bordered.top - self.tab_height,
            bordered.right,
            bordered.top,
        )
    }

    fn border_region(&self, frame: Rect) -> Region {
        Region::from_rect(self.bordered(frame)).subtract_rect(frame)
    }

    fn colors(&self, focused: bool) -> DecoratorColors {
        if focused {
            self.focused
        } else {
            self.unfocused
        }
    }
}

/// Decorator for a window look; borderless windows get none.
pub fn for_look(look: WindowLook, config: &DecoratorConfig) -> Option<Arc<dyn Decorator>> {
    let decorator: Arc<dyn Decorator> = match look {
        WindowLook::NoBorder => return None,
        WindowLook::Bordered => Arc::new(DefaultDecorator::new(config, false)),
        WindowLook::Titled
        | WindowLook::Document
        | WindowLook::Modal
        | WindowLook::Floating => Arc::new(DefaultDecorator::new(config, true)),
    };
    debug!("decorator for {:?}: {:?}", look, decorator);
    Some(decorator)
}
