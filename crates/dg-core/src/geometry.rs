//! Geometry kernel: affine compose/decompose, inverse point mapping,
//! rectangle vertices, and resize-cursor bucketing.
//!
//! Everything here is pure and NaN-safe. Angles cross the public API in
//! degrees (the unit diagram frames store); conversion to radians happens
//! at the trig boundary only.

use glam::{Affine2, Vec2};

/// Replace NaN/∞ with 0 where a numeric default is required.
pub fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

/// The translation/scale/rotation recovered from a 2×3 affine matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParts {
    pub tx: f32,
    pub ty: f32,
    pub sx: f32,
    pub sy: f32,
    /// Rotation in degrees.
    pub theta: f32,
}

/// Build an affine transform from parts: translate ∘ rotate ∘ scale.
pub fn compose_affine(parts: AffineParts) -> Affine2 {
    Affine2::from_scale_angle_translation(
        Vec2::new(parts.sx, parts.sy),
        parts.theta.to_radians(),
        Vec2::new(parts.tx, parts.ty),
    )
}

/// Recover translation, per-axis scale, and rotation from an affine matrix.
///
/// Rotation is the angle of the first column (`atan2(b, a)`); `sx` is the
/// first column's length; `sy = det / sx`, so reflections keep their sign.
/// When the first column is zero-length the angle and scale are derived
/// from the second column instead, with `sy` taking the determinant's
/// sign. Skewed input loses its skew (the parts are the best
/// rotation/scale fit) but never panics.
pub fn decompose_affine(m: Affine2) -> AffineParts {
    let a = m.matrix2.x_axis.x;
    let b = m.matrix2.x_axis.y;
    let c = m.matrix2.y_axis.x;
    let d = m.matrix2.y_axis.y;
    let det = a * d - b * c;

    let sx = (a * a + b * b).sqrt();
    let (sx, sy, theta) = if sx != 0.0 {
        (sx, det / sx, b.atan2(a))
    } else {
        // Degenerate first column: the second column still carries
        // rotation and y-scale.
        let sy = (c * c + d * d).sqrt();
        let sy = if det < 0.0 { -sy } else { sy };
        let theta = if sy != 0.0 { (-c).atan2(d) } else { 0.0 };
        (0.0, sy, theta)
    };

    AffineParts {
        tx: finite_or_zero(m.translation.x),
        ty: finite_or_zero(m.translation.y),
        sx: finite_or_zero(sx),
        sy: finite_or_zero(sy),
        theta: finite_or_zero(theta.to_degrees()),
    }
}

/// Map a point from parent space into a frame's local space: inverse
/// translation, then inverse rotation, then inverse scale.
///
/// Used to turn pointer coordinates into a diagram's own coordinate
/// frame during drag/resize. Zero scale components collapse to 0 rather
/// than producing ∞.
pub fn inverse_map_point(p: Vec2, sx: f32, sy: f32, theta_deg: f32, tx: f32, ty: f32) -> Vec2 {
    let v = p - Vec2::new(tx, ty);
    let (sin, cos) = (-theta_deg.to_radians()).sin_cos();
    let rotated = Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos);
    Vec2::new(
        finite_or_zero(rotated.x / sx),
        finite_or_zero(rotated.y / sy),
    )
}

/// The four corners of a rotated/scaled rectangle centered at `(x, y)`,
/// in order top-left, top-right, bottom-right, bottom-left.
pub fn rectangle_vertices(
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    rotation_deg: f32,
    scale_x: f32,
    scale_y: f32,
) -> [Vec2; 4] {
    let hw = finite_or_zero(width).max(0.0) / 2.0 * scale_x;
    let hh = finite_or_zero(height).max(0.0) / 2.0 * scale_y;
    let (sin, cos) = rotation_deg.to_radians().sin_cos();
    let center = Vec2::new(x, y);
    let corner = |cx: f32, cy: f32| {
        center + Vec2::new(cx * cos - cy * sin, cx * sin + cy * cos)
    };
    [
        corner(-hw, -hh),
        corner(hw, -hh),
        corner(hw, hh),
        corner(-hw, hh),
    ]
}

/// One of the eight compass resize cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeCursor {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeCursor {
    /// The CSS cursor token for this direction.
    pub fn token(self) -> &'static str {
        match self {
            Self::N => "n-resize",
            Self::Ne => "ne-resize",
            Self::E => "e-resize",
            Self::Se => "se-resize",
            Self::S => "s-resize",
            Self::Sw => "sw-resize",
            Self::W => "w-resize",
            Self::Nw => "nw-resize",
        }
    }
}

/// Map a continuous angle (degrees, 0 = north, clockwise) to one of the
/// eight resize cursors. Buckets are 45° wide, centered on the compass
/// directions, so boundaries fall on odd multiples of 22.5°. Negative
/// angles wrap via +360.
pub fn cursor_for_angle(angle_deg: f32) -> ResizeCursor {
    const ORDER: [ResizeCursor; 8] = [
        ResizeCursor::N,
        ResizeCursor::Ne,
        ResizeCursor::E,
        ResizeCursor::Se,
        ResizeCursor::S,
        ResizeCursor::Sw,
        ResizeCursor::W,
        ResizeCursor::Nw,
    ];
    let normalized = (finite_or_zero(angle_deg) % 360.0 + 360.0) % 360.0;
    let bucket = ((normalized + 22.5) / 45.0).floor() as usize % 8;
    ORDER[bucket]
}
