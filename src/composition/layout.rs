//! Overlay layout and affine transforms
//!
//! Coordinates use a top-left origin, matching video render space.

use crate::types::Size;
use serde::{Deserialize, Serialize};

/// 2D affine transform in row-vector form:
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::identity()
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::identity()
        }
    }

    /// `self` applied first, then `next`
    pub fn then(&self, next: &AffineTransform) -> Self {
        Self {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            tx: self.tx * next.a + self.ty * next.c + next.tx,
            ty: self.tx * next.b + self.ty * next.d + next.ty,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Bounding size of a `size` rectangle after the linear part of the transform
    pub fn transformed_size(&self, size: Size) -> Size {
        Size::new(
            (self.a * size.width).abs() + (self.c * size.height).abs(),
            (self.b * size.width).abs() + (self.d * size.height).abs(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutKind {
    PictureInPicture,
    Stacked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayCorner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Where the front camera sits over the full-frame back camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Layout {
    /// Inset scaled to `scale` of the canvas width, `margin` px from `corner`
    PictureInPicture {
        scale: f64,
        margin: f64,
        corner: OverlayCorner,
    },
    /// Front fitted and centered in the bottom half-height band
    Stacked,
}

impl Layout {
    pub fn from_config(config: &crate::config::CompositionConfig) -> Self {
        match config.layout {
            LayoutKind::PictureInPicture => Layout::PictureInPicture {
                scale: config.inset_scale,
                margin: config.inset_margin,
                corner: config.inset_corner,
            },
            LayoutKind::Stacked => Layout::Stacked,
        }
    }

    /// Scale + translate placing a `front` sized layer on `canvas`
    pub fn front_transform(&self, front: Size, canvas: Size) -> AffineTransform {
        if front.is_empty() || canvas.is_empty() {
            return AffineTransform::identity();
        }

        let (scale, x, y) = match *self {
            Layout::PictureInPicture {
                scale,
                margin,
                corner,
            } => {
                let s = canvas.width * scale / front.width;
                let (w, h) = (front.width * s, front.height * s);
                let (x, y) = match corner {
                    OverlayCorner::TopLeft => (margin, margin),
                    OverlayCorner::TopRight => (canvas.width - w - margin, margin),
                    OverlayCorner::BottomLeft => (margin, canvas.height - h - margin),
                    OverlayCorner::BottomRight => {
                        (canvas.width - w - margin, canvas.height - h - margin)
                    }
                };
                (s, x, y)
            }
            Layout::Stacked => {
                let band = canvas.height / 2.0;
                let s = (canvas.width / front.width).min(band / front.height);
                let (w, h) = (front.width * s, front.height * s);
                (s, (canvas.width - w) / 2.0, band + (band - h) / 2.0)
            }
        };

        AffineTransform::scale(scale, scale).then(&AffineTransform::translation(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANVAS: Size = Size {
        width: 1080.0,
        height: 1920.0,
    };

    #[test]
    fn test_then_applies_in_order() {
        let t = AffineTransform::scale(2.0, 2.0).then(&AffineTransform::translation(10.0, 5.0));
        assert_eq!(t.apply(1.0, 1.0), (12.0, 7.0));

        let u = AffineTransform::translation(10.0, 5.0).then(&AffineTransform::scale(2.0, 2.0));
        assert_eq!(u.apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn test_pip_top_right_inset() {
        let layout = Layout::PictureInPicture {
            scale: 0.25,
            margin: 16.0,
            corner: OverlayCorner::TopRight,
        };
        let t = layout.front_transform(CANVAS, CANVAS);

        let (x0, y0) = t.apply(0.0, 0.0);
        let (x1, y1) = t.apply(CANVAS.width, CANVAS.height);
        assert!((x1 - x0 - 270.0).abs() < 1e-9);
        assert!((x1 - (CANVAS.width - 16.0)).abs() < 1e-9);
        assert!((y0 - 16.0).abs() < 1e-9);
        assert!((y1 - y0 - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_pip_bottom_left_stays_on_canvas() {
        let layout = Layout::PictureInPicture {
            scale: 0.3,
            margin: 20.0,
            corner: OverlayCorner::BottomLeft,
        };
        let front = Size::new(720.0, 1280.0);
        let t = layout.front_transform(front, CANVAS);
        let (x1, y1) = t.apply(front.width, front.height);
        assert!((y1 - (CANVAS.height - 20.0)).abs() < 1e-9);
        assert!(x1 <= CANVAS.width);
    }

    #[test]
    fn test_stacked_fills_bottom_band() {
        let t = Layout::Stacked.front_transform(CANVAS, CANVAS);
        let (x0, y0) = t.apply(0.0, 0.0);
        let (x1, y1) = t.apply(CANVAS.width, CANVAS.height);

        assert!(y0 >= CANVAS.height / 2.0 - 1e-9);
        assert!(y1 <= CANVAS.height + 1e-9);
        assert!(((x0 + x1) / 2.0 - CANVAS.width / 2.0).abs() < 1e-9);
        assert!(((y1 - y0) - CANVAS.height / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_transformed_size_handles_rotation() {
        let rotate_90 = AffineTransform {
            a: 0.0,
            b: 1.0,
            c: -1.0,
            d: 0.0,
            tx: 0.0,
            ty: 0.0,
        };
        let size = rotate_90.transformed_size(Size::new(1920.0, 1080.0));
        assert_eq!(size, Size::new(1080.0, 1920.0));
    }
}
