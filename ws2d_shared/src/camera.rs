//! 2D camera math.
//!
//! The camera is a pure translation that puts a focus point at the centre of
//! the viewport.

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Camera locked on a world-space focus point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    offset: Vec2,
}

impl Camera {
    pub fn for_viewport(width: f64, height: f64, focus: Vec2) -> Self {
        Self {
            offset: Vec2::new(width / 2.0 - focus.x, height / 2.0 - focus.y),
        }
    }

    /// Translation applied to the surface before drawing world geometry.
    pub fn translation(&self) -> Vec2 {
        self.offset
    }

    /// Exact negation of [`Camera::translation`].
    pub fn inverse_translation(&self) -> Vec2 {
        -self.offset
    }

    pub fn world_to_screen(&self, p: Vec2) -> Vec2 {
        p + self.offset
    }

    pub fn screen_to_world(&self, p: Vec2) -> Vec2 {
        p - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_projects_to_viewport_centre() {
        let focus = Vec2::new(12000.0, 12000.0);
        let cam = Camera::for_viewport(800.0, 600.0, focus);
        assert_eq!(cam.world_to_screen(focus), Vec2::new(400.0, 300.0));
        assert_eq!(cam.screen_to_world(Vec2::new(400.0, 300.0)), focus);
    }

    #[test]
    fn inverse_cancels_translation() {
        let cam = Camera::for_viewport(1023.0, 767.0, Vec2::new(0.3, 11999.7));
        assert_eq!(cam.translation() + cam.inverse_translation(), Vec2::ZERO);
    }
}
