//! Testing utilities for crabscan
//!
//! Fakes for the injected device and recognition boundaries plus synthetic
//! frames, so the whole pipeline can be exercised without a camera or a
//! tesseract install.

pub mod fakes;
pub mod synthetic_data;

pub use fakes::{FakeMediaDevices, FakeStream, ScriptedEngineFactory};
pub use synthetic_data::{synthetic_document, synthetic_frame};
