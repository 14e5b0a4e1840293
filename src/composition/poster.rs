//! Still preview of a composition, rendered from the per-camera poster frames

use super::layout::AffineTransform;
use crate::types::{RgbFrame, Size};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Overlay the front poster onto the back poster the way the render
/// instruction places the front layer on the canvas.
///
/// Returns `None` when either poster is malformed.
pub fn compose_poster(
    back: &RgbFrame,
    front: &RgbFrame,
    canvas: Size,
    front_size: Size,
    front_transform: &AffineTransform,
) -> Option<RgbFrame> {
    if canvas.is_empty() || front_size.is_empty() {
        return None;
    }
    let mut base = RgbImage::from_raw(back.width, back.height, back.rgb.clone())?;
    let overlay = RgbImage::from_raw(front.width, front.height, front.rgb.clone())?;

    // Front layer rectangle in canvas space, then in back-poster pixels
    let (x0, y0) = front_transform.apply(0.0, 0.0);
    let (x1, y1) = front_transform.apply(front_size.width, front_size.height);
    let sx = back.width as f64 / canvas.width;
    let sy = back.height as f64 / canvas.height;

    let left = (x0.min(x1) * sx).round() as i64;
    let top = (y0.min(y1) * sy).round() as i64;
    let width = ((x1 - x0).abs() * sx).round() as u32;
    let height = ((y1 - y0).abs() * sy).round() as u32;
    if width == 0 || height == 0 {
        return Some(back.clone());
    }

    let scaled = imageops::resize(&overlay, width, height, FilterType::Triangle);
    imageops::overlay(&mut base, &scaled, left, top);

    Some(RgbFrame {
        width: base.width(),
        height: base.height(),
        rgb: base.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Layout, OverlayCorner};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbFrame {
        RgbFrame {
            width,
            height,
            rgb: rgb.repeat((width * height) as usize),
        }
    }

    fn pixel(frame: &RgbFrame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width + x) * 3) as usize;
        [frame.rgb[i], frame.rgb[i + 1], frame.rgb[i + 2]]
    }

    #[test]
    fn test_inset_lands_in_corner() {
        let canvas = Size::new(400.0, 800.0);
        let layout = Layout::PictureInPicture {
            scale: 0.25,
            margin: 10.0,
            corner: OverlayCorner::TopLeft,
        };
        let transform = layout.front_transform(canvas, canvas);

        let back = solid(100, 200, [0, 0, 255]);
        let front = solid(50, 100, [255, 0, 0]);
        let poster = compose_poster(&back, &front, canvas, canvas, &transform).unwrap();

        assert_eq!((poster.width, poster.height), (100, 200));
        assert_eq!(pixel(&poster, 5, 5), [255, 0, 0]);
        assert_eq!(pixel(&poster, 90, 190), [0, 0, 255]);
    }

    #[test]
    fn test_malformed_poster_is_rejected() {
        let canvas = Size::new(10.0, 10.0);
        let back = RgbFrame {
            width: 10,
            height: 10,
            rgb: vec![0; 12],
        };
        let front = solid(10, 10, [1, 2, 3]);
        assert!(compose_poster(&back, &front, canvas, canvas, &AffineTransform::identity()).is_none());
    }
}
