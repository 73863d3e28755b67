//! Still-image extraction from a live stream

use crate::errors::ScanError;
use crate::session::CaptureSession;
use crate::types::{ImageEncoding, StillImage, Viewport};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

/// Renders the current frame of a session at the viewport size and encodes it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshotter {
    viewport: Viewport,
    encoding: ImageEncoding,
}

impl Default for FrameSnapshotter {
    fn default() -> Self {
        Self::new(Viewport::FALLBACK, ImageEncoding::Png)
    }
}

impl FrameSnapshotter {
    pub fn new(viewport: Viewport, encoding: ImageEncoding) -> Self {
        Self { viewport, encoding }
    }

    /// Take a snapshot of the session's current frame.
    ///
    /// Fails with [`ScanError::NoFrameAvailable`] until the stream has
    /// produced its first frame; callers retry on the next trigger.
    pub async fn snapshot(&self, session: &CaptureSession) -> Result<StillImage, ScanError> {
        if !session.is_live() {
            return Err(ScanError::SessionReleased);
        }

        // Native frames are decoded on read, so the read happens off the runtime too.
        let stream = session.stream().clone();
        let viewport = self.viewport;
        let encoding = self.encoding;
        tokio::task::spawn_blocking(move || {
            let frame = stream.current_frame().ok_or(ScanError::NoFrameAvailable)?;
            render(frame, viewport, encoding)
        })
        .await
        .map_err(|e| ScanError::Backend(format!("Task join error: {}", e)))?
    }
}

/// Scale `frame` onto a raster of the viewport's size and encode it
pub fn render(
    frame: RgbImage,
    viewport: Viewport,
    encoding: ImageEncoding,
) -> Result<StillImage, ScanError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(ScanError::NoFrameAvailable);
    }

    let raster = if frame.dimensions() == (viewport.width, viewport.height) {
        frame
    } else {
        image::imageops::resize(&frame, viewport.width, viewport.height, FilterType::Triangle)
    };

    let mut data = Vec::new();
    let result = match encoding {
        ImageEncoding::Png => DynamicImage::ImageRgb8(raster)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png),
        ImageEncoding::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut data, quality).encode_image(&raster)
        }
    };
    result.map_err(|e| ScanError::Backend(format!("Failed to encode snapshot: {}", e)))?;

    log::debug!(
        "Encoded {}x{} snapshot as {} ({} bytes)",
        viewport.width,
        viewport.height,
        encoding.mime_type(),
        data.len()
    );

    Ok(StillImage {
        width: viewport.width,
        height: viewport.height,
        encoding,
        data,
    })
}
