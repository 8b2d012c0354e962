//! Drawing surface abstraction.
//!
//! This crate intentionally does not depend on a graphics backend.
//! The trait mirrors the small canvas-style API the render loop needs.

use crate::camera::Vec2;

/// A minimal 2D drawing API.
pub trait Surface {
    fn width(&self) -> f64;
    fn height(&self) -> f64;

    fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn set_fill_style(&mut self, color: &str);
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn set_stroke_style(&mut self, color: &str);
    fn set_line_width(&mut self, width: f64);
    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64);
    fn fill(&mut self);
    fn stroke(&mut self);
    fn translate(&mut self, dx: f64, dy: f64);
}

/// A recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    ClearRect { x: f64, y: f64, w: f64, h: f64 },
    FillStyle(String),
    FillRect { x: f64, y: f64, w: f64, h: f64 },
    StrokeStyle(String),
    LineWidth(f64),
    BeginPath,
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    Arc { x: f64, y: f64, radius: f64, start: f64, end: f64 },
    Fill,
    Stroke,
    Translate { dx: f64, dy: f64 },
}

/// Headless surface that records every call and tracks the current
/// translation. Useful for tests and for running without a display.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    width: f64,
    height: f64,
    origin: Vec2,
    commands: Vec<DrawCmd>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Resizes the surface, as a window-resize listener would.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    /// Current accumulated translation.
    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn commands(&self) -> &[DrawCmd] {
        &self.commands
    }

    /// Drops recorded commands, keeping size and translation.
    pub fn take_commands(&mut self) -> Vec<DrawCmd> {
        std::mem::take(&mut self.commands)
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCmd::ClearRect { x, y, w, h });
    }

    fn set_fill_style(&mut self, color: &str) {
        self.commands.push(DrawCmd::FillStyle(color.to_string()));
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.commands.push(DrawCmd::FillRect { x, y, w, h });
    }

    fn set_stroke_style(&mut self, color: &str) {
        self.commands.push(DrawCmd::StrokeStyle(color.to_string()));
    }

    fn set_line_width(&mut self, width: f64) {
        self.commands.push(DrawCmd::LineWidth(width));
    }

    fn begin_path(&mut self) {
        self.commands.push(DrawCmd::BeginPath);
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCmd::MoveTo { x, y });
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCmd::LineTo { x, y });
    }

    fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64) {
        self.commands.push(DrawCmd::Arc {
            x,
            y,
            radius,
            start,
            end,
        });
    }

    fn fill(&mut self) {
        self.commands.push(DrawCmd::Fill);
    }

    fn stroke(&mut self) {
        self.commands.push(DrawCmd::Stroke);
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.origin = self.origin + Vec2::new(dx, dy);
        self.commands.push(DrawCmd::Translate { dx, dy });
    }
}

/// A surface that only knows its size. Useful for running headless.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface {
    pub width: f64,
    pub height: f64,
}

impl Surface for NullSurface {
    fn width(&self) -> f64 {
        self.width
    }
    fn height(&self) -> f64 {
        self.height
    }
    fn clear_rect(&mut self, _x: f64, _y: f64, _w: f64, _h: f64) {}
    fn set_fill_style(&mut self, _color: &str) {}
    fn fill_rect(&mut self, _x: f64, _y: f64, _w: f64, _h: f64) {}
    fn set_stroke_style(&mut self, _color: &str) {}
    fn set_line_width(&mut self, _width: f64) {}
    fn begin_path(&mut self) {}
    fn move_to(&mut self, _x: f64, _y: f64) {}
    fn line_to(&mut self, _x: f64, _y: f64) {}
    fn arc(&mut self, _x: f64, _y: f64, _radius: f64, _start: f64, _end: f64) {}
    fn fill(&mut self) {}
    fn stroke(&mut self) {}
    fn translate(&mut self, _dx: f64, _dy: f64) {}
}
