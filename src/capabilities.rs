//! Capability negotiation
//!
//! Devices report optional, advisory metadata about what their video track can
//! do. [`TrackCapabilities`] mirrors that raw shape, where any field may be
//! missing or malformed. [`CapabilityModel`] is the normalized snapshot taken
//! once per acquired stream: a missing or unusable field means "unsupported",
//! never an error. Presence of a capability means it is worth attempting, not
//! that the device will honor it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Raw numeric range as reported by a device; either bound may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Raw track capabilities as reported by the platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackCapabilities {
    pub torch: Option<bool>,
    pub zoom: Option<RawRange>,
    #[serde(default)]
    pub focus_mode: Vec<String>,
}

/// Zoom factor of a track that is not zoomed in
pub const UNZOOMED_LEVEL: f64 = 1.0;

/// Inclusive zoom bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    /// A range that admits more than one zoom level
    pub fn is_non_trivial(&self) -> bool {
        self.max > self.min
    }

    pub fn contains(&self, level: f64) -> bool {
        level >= self.min && level <= self.max
    }
}

/// Normalized description of what an acquired stream can do
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityModel {
    pub zoom_range: Option<ZoomRange>,
    pub torch_available: bool,
    pub focus_modes: BTreeSet<String>,
}

impl CapabilityModel {
    /// Derive the model from raw track metadata.
    pub fn from_track(raw: &TrackCapabilities) -> Self {
        let zoom_range = raw.zoom.and_then(normalize_zoom);
        let focus_modes = raw
            .focus_mode
            .iter()
            .map(|mode| mode.trim())
            .filter(|mode| !mode.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            zoom_range,
            torch_available: raw.torch.unwrap_or(false),
            focus_modes,
        }
    }

    /// A stream without any negotiable capability
    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn supports_focus(&self) -> bool {
        !self.focus_modes.is_empty()
    }

    /// Which user controls the presentation layer should render
    pub fn controls(&self) -> ControlVisibility {
        ControlVisibility {
            scan: true,
            torch: self.torch_available,
            zoom: self.zoom_range.is_some(),
        }
    }
}

/// Only a finite, ordered pair of bounds counts as a zoom range. A missing
/// minimum means the track starts unzoomed; a missing maximum leaves nowhere to
/// zoom to, so the range collapses onto the minimum.
fn normalize_zoom(range: RawRange) -> Option<ZoomRange> {
    let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
    let (min, max) = match (finite(range.min), finite(range.max)) {
        (Some(min), Some(max)) => (min, max),
        (None, Some(max)) => (UNZOOMED_LEVEL.min(max), max),
        (Some(min), None) => (min, min),
        (None, None) => return None,
    };

    if min > max {
        log::debug!("Ignoring inverted zoom range {}..{}", min, max);
        return None;
    }

    Some(ZoomRange { min, max })
}

/// Controls the presentation layer is told to show for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlVisibility {
    pub scan: bool,
    pub torch: bool,
    pub zoom: bool,
}
