//! Eye-aspect-ratio estimation over facial landmark points.
//!
//! The eye aspect ratio (EAR) is a scalar openness measure computed from six
//! contour points around one eye, ordered `[corner0, top1, top2, corner3,
//! bottom4, bottom5]`. Open eyes sit around 0.25–0.35; a closed eye drops
//! well below 0.2. The liveness tracker watches this signal for blink
//! patterns.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A 2D landmark coordinate in reduced-frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("eye contour needs 6 points, got {0}")]
    NotEnoughPoints(usize),
    #[error("degenerate eye geometry: zero horizontal extent")]
    DegenerateEye,
}

/// Compute the eye aspect ratio for one eye contour.
///
/// Ratio = (dist(p1,p5) + dist(p2,p4)) / (2 * dist(p0,p3)).
///
/// Fails with [`GeometryError::DegenerateEye`] when the horizontal corner
/// distance is exactly zero; the caller must treat that frame's openness as
/// unknown rather than feeding a division artifact into the blink counter.
pub fn eye_aspect_ratio(eye: &[Point]) -> Result<f32, GeometryError> {
    if eye.len() < 6 {
        return Err(GeometryError::NotEnoughPoints(eye.len()));
    }

    let vertical_a = eye[1].distance(&eye[5]);
    let vertical_b = eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);

    if horizontal == 0.0 {
        return Err(GeometryError::DegenerateEye);
    }

    Ok((vertical_a + vertical_b) / (2.0 * horizontal))
}

/// Whole-face openness: mean of the left and right eye aspect ratios.
pub fn face_openness(left_eye: &[Point], right_eye: &[Point]) -> Result<f32, GeometryError> {
    let left = eye_aspect_ratio(left_eye)?;
    let right = eye_aspect_ratio(right_eye)?;
    Ok((left + right) / 2.0)
}
