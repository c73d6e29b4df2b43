use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching screen space.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the distance between two points.
    pub fn distance(&self, other: &Vector2) -> f32 {
        (*other - *self).magnitude()
    }

    pub fn distance_squared(&self, other: &Vector2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    ///Linear interpolation, `t` is clamped to [0, 1].
    pub fn lerp(&self, other: &Vector2, t: f32) -> Vector2 {
        let t = t.clamp(0.0, 1.0);
        Vector2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    ///Returns the vector rotated 90 degrees counter-clockwise.
    pub fn perpendicular(&self) -> Vector2 {
        Vector2 {
            x: -self.y,
            y: self.x,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vector2 {
    fn add_assign(&mut self, other: Vector2) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, other: Vector2) -> Vector2 {
        Vector2::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;

    fn mul(self, scalar: f32) -> Vector2 {
        self.scale(scalar)
    }
}

///Axis-aligned rectangle. `position` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub position: Vector2,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            position: Vector2::new(x, y),
            width,
            height,
        }
    }

    pub fn min(&self) -> Vector2 {
        self.position
    }

    pub fn max(&self) -> Vector2 {
        Vector2::new(self.position.x + self.width, self.position.y + self.height)
    }

    pub fn center(&self) -> Vector2 {
        Vector2::new(
            self.position.x + self.width / 2.0,
            self.position.y + self.height / 2.0,
        )
    }

    ///Grows the rectangle by `amount` on every side.
    pub fn expand(&self, amount: f32) -> Rect {
        Rect::new(
            self.position.x - amount,
            self.position.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    pub fn contains(&self, point: &Vector2) -> bool {
        let max = self.max();
        point.x >= self.position.x && point.x <= max.x && point.y >= self.position.y && point.y <= max.y
    }

    ///AABB intersection, touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        !(a_max.x <= b_min.x || b_max.x <= a_min.x || a_max.y <= b_min.y || b_max.y <= a_min.y)
    }

    ///Checks a circle against this rectangle using the closest point on the box.
    pub fn intersects_circle(&self, center: &Vector2, radius: f32) -> bool {
        let max = self.max();
        let closest = Vector2::new(
            center.x.clamp(self.position.x, max.x),
            center.y.clamp(self.position.y, max.y),
        );
        closest.distance_squared(center) <= radius * radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vector2::ZERO.normalize(), Vector2::ZERO);
    }

    #[test]
    fn test_normalize_unit_length() {
        let v = Vector2::new(3.0, 4.0).normalize();
        assert_approx_eq!(v.magnitude(), 1.0, 1e-6);
        assert_approx_eq!(v.x, 0.6, 1e-6);
        assert_approx_eq!(v.y, 0.8, 1e-6);
    }

    #[test]
    fn test_lerp_clamps() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(10.0, 20.0);
        assert_eq!(a.lerp(&b, 0.5), Vector2::new(5.0, 10.0));
        assert_eq!(a.lerp(&b, 2.0), b);
        assert_eq!(a.lerp(&b, -1.0), a);
    }

    #[test]
    fn test_rect_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        let c = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_rect_circle_intersection() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect.intersects_circle(&Vector2::new(12.0, 5.0), 3.0));
        assert!(!rect.intersects_circle(&Vector2::new(14.0, 5.0), 3.0));
        assert!(rect.intersects_circle(&Vector2::new(5.0, 5.0), 0.5));
    }

    #[test]
    fn test_rect_expand_and_contains() {
        let rect = Rect::new(10.0, 10.0, 10.0, 10.0).expand(5.0);
        assert!(rect.contains(&Vector2::new(5.0, 5.0)));
        assert!(rect.contains(&Vector2::new(25.0, 25.0)));
        assert!(!rect.contains(&Vector2::new(26.0, 15.0)));
        assert_eq!(rect.center(), Vector2::new(15.0, 15.0));
    }
}
