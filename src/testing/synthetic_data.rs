//! Synthetic frames for offline testing
//!
//! Stand-ins for camera output so snapshot and scan-cycle tests run without
//! hardware.

use image::{Rgb, RgbImage};

/// Gradient frame whose content shifts with `frame_number`
pub fn synthetic_frame(width: u32, height: u32, frame_number: u64) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}

/// Dark text-like bars on a white page, roughly what a document under the
/// camera looks like to the OCR engine
pub fn synthetic_document(width: u32, height: u32) -> RgbImage {
    let line_height = (height / 8).max(2);
    RgbImage::from_fn(width, height, |x, y| {
        let in_line = (y / line_height) % 2 == 1 && y % line_height < line_height / 2;
        let in_margin = x < width / 10 || x > width - width / 10;
        if in_line && !in_margin && (x / 3) % 4 != 0 {
            Rgb([20, 20, 20])
        } else {
            Rgb([245, 245, 245])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_frame_size() {
        let frame = synthetic_frame(320, 240, 0);
        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(frame.as_raw().len(), 320 * 240 * 3);
    }

    #[test]
    fn test_synthetic_frames_differ() {
        let frame0 = synthetic_frame(16, 16, 0);
        let frame1 = synthetic_frame(16, 16, 1);
        assert_ne!(frame0.get_pixel(0, 0), frame1.get_pixel(0, 0));
    }

    #[test]
    fn test_document_has_ink_and_paper() {
        let page = synthetic_document(200, 160);
        let dark = page.pixels().filter(|p| p.0[0] < 128).count();
        assert!(dark > 0);
        assert!(dark < (200 * 160) / 2);
    }
}
