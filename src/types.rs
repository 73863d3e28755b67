//! Shared value types for the scanning pipeline

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a media device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
}

/// A device as reported by the platform's enumeration call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceDescriptor {
    /// Create a video input descriptor
    pub fn video_input(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }

    pub fn is_video_input(&self) -> bool {
        self.kind == DeviceKind::VideoInput
    }
}

/// Size of the displayed video surface; snapshots are rendered at this size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Used whenever the displayed size is unknown
    pub const FALLBACK: Viewport = Viewport {
        width: 620,
        height: 480,
    };

    /// Build a viewport, substituting the fallback for any zero dimension
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: if width == 0 { Self::FALLBACK.width } else { width },
            height: if height == 0 { Self::FALLBACK.height } else { height },
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Encoding used for still images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    Png,
    Jpeg { quality: u8 },
}

impl ImageEncoding {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// A single encoded frame extracted from the live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StillImage {
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub data: Vec<u8>,
}

impl StillImage {
    /// Render as a `data:` URI suitable for an `<img>` element
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.encoding.mime_type(),
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }

    /// Decode the encoded bytes back into an image
    pub fn decode(&self) -> Result<image::DynamicImage, image::ImageError> {
        image::load_from_memory(&self.data)
    }
}

/// Text recognized in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl RecognitionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Whether any non-whitespace text was recognized
    pub fn is_match(&self) -> bool {
        !self.text.trim().is_empty()
    }
}
