use nalgebra::geometry::{Point2, Rotation2};
use nalgebra::Vector2;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2};

/// Direction of an arc, seen from above the bed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Turn {
    Clockwise,
    CounterClockwise,
}

impl Turn {
    /// The same turn seen in a mirror
    pub fn reversed(self) -> Turn {
        match self {
            Turn::Clockwise => Turn::CounterClockwise,
            Turn::CounterClockwise => Turn::Clockwise,
        }
    }
}

/// Maps pattern coordinates onto the bed: a rotation around the center of the print
#[derive(Debug, Clone)]
pub struct Frame {
    pub center: Point2<f64>,
    rotation: Rotation2<f64>,
}

impl Frame {
    pub fn new(center: Point2<f64>, angle: f64) -> Frame {
        Frame {
            center,
            rotation: Rotation2::new(angle),
        }
    }

    /// Rotation angle, in radians
    pub fn angle(&self) -> f64 {
        self.rotation.angle()
    }

    /// Rotate an absolute position around the center of the print
    pub fn rotate(&self, p: Point2<f64>) -> Point2<f64> {
        self.center + self.rotation * (p - self.center)
    }

    /// Rotate a relative vector (e.g. an arc center offset), which is the same as rotating around the origin
    pub fn rotate_vector(&self, v: Vector2<f64>) -> Vector2<f64> {
        self.rotation * v
    }
}

/// Offset from the start of a quarter turn to its center, for a turn ending at `chord` from the start.
/// The center lies at |chord|/√2 from both ends, 45 degrees to the right of the chord for a clockwise turn and
/// to the left for a counter-clockwise one.
pub fn quarter_turn_center(chord: Vector2<f64>, turn: Turn) -> Vector2<f64> {
    let angle = chord.y.atan2(chord.x);
    let radius = chord.norm() / SQRT_2;
    let center_angle = match turn {
        Turn::Clockwise => angle - FRAC_PI_4,
        Turn::CounterClockwise => angle + FRAC_PI_4,
    };
    Vector2::new(center_angle.cos() * radius, center_angle.sin() * radius)
}

/// Arc length of a quarter turn
pub fn quarter_turn_length(chord: Vector2<f64>) -> f64 {
    FRAC_PI_2 * chord.norm() / SQRT_2
}

/// Offset from the start of a U-turn to its center. The chord is the diameter, so the center is its midpoint
/// regardless of direction.
pub fn u_turn_center(chord: Vector2<f64>) -> Vector2<f64> {
    chord / 2.0
}

/// Arc length of a U-turn
pub fn u_turn_length(chord: Vector2<f64>) -> f64 {
    PI * chord.norm() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f64 = 1e-10;

    fn cross(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
        a.x * b.y - a.y * b.x
    }

    #[test]
    fn test_zero_rotation_is_identity() {
        let frame = Frame::new(Point2::new(3.0, -2.0), 0.0);
        let p = frame.rotate(Point2::new(7.5, 1.25));
        assert_relative_eq!(p.x, 7.5, epsilon = EPSILON);
        assert_relative_eq!(p.y, 1.25, epsilon = EPSILON);
    }

    #[test]
    fn test_quarter_rotation_around_center() {
        let frame = Frame::new(Point2::new(10.0, 10.0), FRAC_PI_2);
        let p = frame.rotate(Point2::new(11.0, 10.0));
        assert_relative_eq!(p.x, 10.0, epsilon = EPSILON);
        assert_relative_eq!(p.y, 11.0, epsilon = EPSILON);
    }

    #[test]
    fn test_rotation_preserves_distance_to_center() {
        let center = Point2::new(-4.0, 2.0);
        let frame = Frame::new(center, 15f64.to_radians());
        for p in [
            Point2::new(0.0, 0.0),
            Point2::new(-30.0, 12.5),
            Point2::new(44.0, -7.0),
        ] {
            let r = frame.rotate(p);
            assert_relative_eq!((r - center).norm(), (p - center).norm(), epsilon = EPSILON);
        }
    }

    #[test]
    fn test_vector_rotation_ignores_center() {
        let frame = Frame::new(Point2::new(100.0, 100.0), FRAC_PI_2);
        let v = frame.rotate_vector(Vector2::new(1.0, 0.0));
        assert_relative_eq!(v.x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(v.y, 1.0, epsilon = EPSILON);
    }

    #[test]
    fn test_quarter_turn_center_equidistant() {
        for chord in [
            Vector2::new(0.375, 0.375),
            Vector2::new(-0.375, 0.375),
            Vector2::new(0.5, -0.5),
        ] {
            for turn in [Turn::Clockwise, Turn::CounterClockwise] {
                let c = quarter_turn_center(chord, turn);
                assert_relative_eq!(c.norm(), (c - chord).norm(), epsilon = EPSILON);
                assert_relative_eq!(c.norm(), chord.norm() / SQRT_2, epsilon = EPSILON);
            }
        }
    }

    #[test]
    fn test_quarter_turn_center_side() {
        let chord = Vector2::new(1.0, 1.0);
        let cw = quarter_turn_center(chord, Turn::Clockwise);
        assert_relative_eq!(cw.x, 1.0, epsilon = EPSILON);
        assert_relative_eq!(cw.y, 0.0, epsilon = EPSILON);
        assert!(cross(chord, cw) < 0.0);

        let ccw = quarter_turn_center(chord, Turn::CounterClockwise);
        assert_relative_eq!(ccw.x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(ccw.y, 1.0, epsilon = EPSILON);
        assert!(cross(chord, ccw) > 0.0);
    }

    #[test]
    fn test_arc_lengths() {
        // Radius 1 quarter circle
        assert_relative_eq!(
            quarter_turn_length(Vector2::new(1.0, 1.0)),
            FRAC_PI_2,
            epsilon = EPSILON
        );
        // Diameter 2 half circle
        assert_relative_eq!(u_turn_length(Vector2::new(0.0, 2.0)), PI, epsilon = EPSILON);
    }

    #[test]
    fn test_u_turn_center_is_midpoint() {
        let c = u_turn_center(Vector2::new(0.0, -0.75));
        assert_relative_eq!(c.x, 0.0, epsilon = EPSILON);
        assert_relative_eq!(c.y, -0.375, epsilon = EPSILON);
    }

    #[test]
    fn test_reversed_turn() {
        assert_eq!(Turn::Clockwise.reversed(), Turn::CounterClockwise);
        assert_eq!(Turn::CounterClockwise.reversed().reversed(), Turn::CounterClockwise);
    }
}
