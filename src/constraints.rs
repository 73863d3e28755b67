//! Constraint building and user-intent settings
//!
//! [`build`] is a pure projection of a [`CapabilityModel`] and the current
//! [`DesiredSettings`] onto a [`ConstraintRequest`]. Nothing here touches a
//! device.

use crate::assert_invariant;
use crate::capabilities::CapabilityModel;
use serde::{Deserialize, Serialize};

/// Focus strategy requested from the device. Only one-shot focus is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusMode {
    #[serde(rename = "single-shot")]
    SingleShot,
}

impl FocusMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusMode::SingleShot => "single-shot",
        }
    }
}

/// Zoom cycling policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomPolicy {
    pub step: f64,
    pub default_level: f64,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            step: 1.0,
            default_level: 1.0,
        }
    }
}

impl ZoomPolicy {
    /// Next zoom level after `current`: one step up, wrapping to the default
    /// level once the step would pass the capability's maximum. Without a
    /// zoom range worth requesting the maximum is the default level itself,
    /// the same rule [`build`] uses to leave zoom out of the request.
    pub fn next_level(&self, current: f64, capabilities: &CapabilityModel) -> f64 {
        let max = capabilities
            .zoom_range
            .filter(|range| range.is_non_trivial())
            .map(|range| range.max)
            .unwrap_or(self.default_level);
        let candidate = current + self.step;

        if candidate <= max {
            candidate
        } else {
            self.default_level
        }
    }
}

/// User intent, mutated only through explicit actions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesiredSettings {
    pub torch_on: bool,
    pub zoom_level: f64,
}

impl Default for DesiredSettings {
    fn default() -> Self {
        Self {
            torch_on: false,
            zoom_level: ZoomPolicy::default().default_level,
        }
    }
}

impl DesiredSettings {
    pub fn with_policy(policy: &ZoomPolicy) -> Self {
        Self {
            torch_on: false,
            zoom_level: policy.default_level,
        }
    }

    pub fn toggle_torch(&mut self) -> bool {
        self.torch_on = !self.torch_on;
        self.torch_on
    }

    pub fn cycle_zoom(&mut self, capabilities: &CapabilityModel, policy: &ZoomPolicy) -> f64 {
        self.zoom_level = policy.next_level(self.zoom_level, capabilities);
        if let Some(range) = capabilities.zoom_range {
            assert_invariant!(
                self.zoom_level <= range.max || self.zoom_level == policy.default_level,
                "Zoom level never exceeds the zoom range maximum",
                "constraints::cycle_zoom"
            );
        }
        self.zoom_level
    }
}

/// Operating parameters to push to a video track.
///
/// An all-`None` request explicitly means "no constraint changes needed".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<FocusMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

impl ConstraintRequest {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.focus_mode.is_none() && self.torch.is_none() && self.zoom.is_none()
    }

    /// Split into single-field requests, in focus, torch, zoom order
    pub fn split(&self) -> Vec<ConstraintRequest> {
        let mut parts = Vec::with_capacity(3);
        if let Some(focus_mode) = self.focus_mode {
            parts.push(ConstraintRequest {
                focus_mode: Some(focus_mode),
                ..Default::default()
            });
        }
        if let Some(torch) = self.torch {
            parts.push(ConstraintRequest {
                torch: Some(torch),
                ..Default::default()
            });
        }
        if let Some(zoom) = self.zoom {
            parts.push(ConstraintRequest {
                zoom: Some(zoom),
                ..Default::default()
            });
        }
        parts
    }

    /// Overlay the fields set in `other` onto `self`
    pub fn merge(&mut self, other: &ConstraintRequest) {
        if other.focus_mode.is_some() {
            self.focus_mode = other.focus_mode;
        }
        if other.torch.is_some() {
            self.torch = other.torch;
        }
        if other.zoom.is_some() {
            self.zoom = other.zoom;
        }
    }
}

/// Project capabilities and desired settings onto a constraint request.
pub fn build(capabilities: &CapabilityModel, desired: &DesiredSettings) -> ConstraintRequest {
    let focus_mode = capabilities
        .supports_focus()
        .then_some(FocusMode::SingleShot);
    let torch = capabilities.torch_available.then_some(desired.torch_on);
    let zoom = capabilities
        .zoom_range
        .filter(|range| range.is_non_trivial())
        .map(|_| desired.zoom_level);

    ConstraintRequest {
        focus_mode,
        torch,
        zoom,
    }
}
