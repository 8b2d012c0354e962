//! Render loop.
//!
//! Draws the playfield, its grid and the controlled entity with the camera
//! locked on that entity. Runs once per frame on the driver task, so it never
//! overlaps with packet dispatch.

use std::f64::consts::TAU;

use ws2d_shared::{
    camera::{Camera, Vec2},
    surface::Surface,
    world::{World, WORLD_SIZE},
};

/// Colours and sizes used for a frame.
#[derive(Debug, Clone)]
pub struct RenderStyle {
    pub background: &'static str,
    pub world_fill: &'static str,
    pub grid_stroke: &'static str,
    pub grid_cell: f64,
    pub world_size: f64,
    pub entity_fill: &'static str,
    pub entity_stroke: &'static str,
    pub entity_line_width: f64,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            background: "#a7a7a7",
            world_fill: "#e6e6e6",
            grid_stroke: "#d8d8d8",
            grid_cell: 25.0,
            world_size: WORLD_SIZE,
            entity_fill: "#ff0000",
            entity_stroke: "#cc0000",
            entity_line_width: 4.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    style: RenderStyle,
}

impl Renderer {
    pub fn new(style: RenderStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Draws one frame and returns the camera it used, if any.
    ///
    /// Surface size is read on every call so a resize shows up on the next
    /// frame. The translation is undone with its exact inverse before
    /// returning.
    pub fn render_frame(&self, surface: &mut dyn Surface, world: &World) -> Option<Camera> {
        let (width, height) = (surface.width(), surface.height());
        surface.clear_rect(0.0, 0.0, width, height);
        surface.set_fill_style(self.style.background);
        surface.fill_rect(0.0, 0.0, width, height);

        let focus = world.controlled()?;
        let camera = Camera::for_viewport(width, height, Vec2::new(focus.x, focus.y));
        let t = camera.translation();
        surface.translate(t.x, t.y);

        self.draw_world(surface);

        let s = &self.style;
        surface.set_fill_style(s.entity_fill);
        surface.set_line_width(s.entity_line_width);
        surface.set_stroke_style(s.entity_stroke);
        surface.begin_path();
        surface.arc(focus.x, focus.y, focus.radius(), 0.0, TAU);
        surface.fill();
        surface.stroke();

        let inv = camera.inverse_translation();
        surface.translate(inv.x, inv.y);
        Some(camera)
    }

    fn draw_world(&self, surface: &mut dyn Surface) {
        let s = &self.style;
        surface.set_fill_style(s.world_fill);
        surface.fill_rect(0.0, 0.0, s.world_size, s.world_size);

        surface.set_stroke_style(s.grid_stroke);
        surface.set_line_width(1.0);

        let mut x = 0.0;
        while x < s.world_size {
            surface.begin_path();
            surface.move_to(x, 0.0);
            surface.line_to(x, s.world_size);
            surface.stroke();
            x += s.grid_cell;
        }
        let mut y = 0.0;
        while y < s.world_size {
            surface.begin_path();
            surface.move_to(0.0, y);
            surface.line_to(s.world_size, y);
            surface.stroke();
            y += s.grid_cell;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws2d_shared::{
        surface::{DrawCmd, RecordingSurface},
        world::Entity,
    };

    #[test]
    fn controlled_entity_lands_in_viewport_centre() {
        let mut surface = RecordingSurface::new(800.0, 600.0);
        let world = World::with_test_entity();
        let camera = Renderer::default()
            .render_frame(&mut surface, &world)
            .unwrap();

        let e = world.controlled().unwrap();
        assert_eq!(camera.world_to_screen(Vec2::new(e.x, e.y)), Vec2::new(400.0, 300.0));

        // The circle is drawn at the entity's world position while the
        // surface is translated by the camera offset.
        let arc = surface
            .commands()
            .iter()
            .find_map(|c| match c {
                DrawCmd::Arc { x, y, radius, .. } => Some((*x, *y, *radius)),
                _ => None,
            })
            .unwrap();
        assert_eq!(arc, (e.x, e.y, 25.0));
    }

    #[test]
    fn translation_does_not_drift_across_frames() {
        let mut surface = RecordingSurface::new(1024.0, 768.0);
        let mut world = World::new();
        world.push(Entity::new(333.0, 5000.0, 40.0, 40.0));
        let renderer = Renderer::default();

        for step in 0..5 {
            world.controlled_mut().unwrap().x += step as f64;
            renderer.render_frame(&mut surface, &world);
            assert_eq!(surface.origin(), Vec2::ZERO);
            surface.take_commands();
        }
    }

    #[test]
    fn resize_applies_on_next_frame() {
        let mut surface = RecordingSurface::new(800.0, 600.0);
        let world = World::with_test_entity();
        let renderer = Renderer::default();
        renderer.render_frame(&mut surface, &world);

        surface.resize(1920.0, 1080.0);
        surface.take_commands();
        let camera = renderer.render_frame(&mut surface, &world).unwrap();
        assert_eq!(
            surface.commands()[0],
            DrawCmd::ClearRect {
                x: 0.0,
                y: 0.0,
                w: 1920.0,
                h: 1080.0
            }
        );
        assert_eq!(
            camera.world_to_screen(Vec2::new(12000.0, 12000.0)),
            Vec2::new(960.0, 540.0)
        );
    }

    #[test]
    fn grid_covers_world_at_fixed_cell_size() {
        let mut surface = RecordingSurface::new(100.0, 100.0);
        let renderer = Renderer::default();
        renderer.render_frame(&mut surface, &World::with_test_entity());

        let lines = surface
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCmd::LineTo { .. }))
            .count();
        // 480 vertical + 480 horizontal lines for 12000 / 25.
        assert_eq!(lines, 960);
    }

    #[test]
    fn empty_world_draws_background_only() {
        let mut surface = RecordingSurface::new(100.0, 50.0);
        assert!(Renderer::default()
            .render_frame(&mut surface, &World::new())
            .is_none());
        assert_eq!(surface.commands().len(), 3);
        assert_eq!(surface.origin(), Vec2::ZERO);
    }
}
