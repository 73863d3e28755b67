//! CrabScan: live camera text scanning for Tauri applications
//!
//! This crate acquires a camera stream, negotiates what the device can do
//! (torch, zoom, focus), snapshots frames and runs OCR on them, reporting the
//! recognized text as events.
//!
//! # Features
//! - Capability negotiation that treats missing device metadata as unsupported
//! - Torch and zoom controls with partial-failure tolerant constraint pushes
//! - Manual or continuous scan cycles with clean teardown
//! - Tesseract OCR with a fresh engine per request
//!
//! # Usage
//! ```toml
//! [dependencies]
//! crabscan = "0.1"
//! tauri = { version = "2.0", features = ["protocol-asset"] }
//! ```
//!
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(crabscan::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
//!
//! The webview listens on `crabscan://scan-event` for state changes and
//! recognition results.
pub mod capabilities;
pub mod commands;
pub mod config;
pub mod constraints;
pub mod controller;
pub mod errors;
pub mod invariant_ppt;
pub mod platform;
pub mod recognition;
pub mod scanner;
pub mod session;
pub mod snapshot;
pub mod types;

// Testing utilities - fakes and synthetic frames for offline testing
pub mod testing;

// Re-exports for convenience
pub use capabilities::{CapabilityModel, ControlVisibility, TrackCapabilities, ZoomRange};
pub use config::CrabScanConfig;
pub use constraints::{ConstraintRequest, DesiredSettings, FocusMode, ZoomPolicy};
pub use controller::{CycleOutcome, ScanController, ScanEvent, ScanPolicy, ScanState};
pub use errors::ScanError;
pub use platform::{MediaDevices, MediaStream, NativeMediaDevices, PlatformError};
pub use recognition::{RecognitionEngine, RecognitionOptions, RecognitionService};
pub use scanner::Scanner;
pub use session::{ApplyOutcome, CaptureSession, CaptureSourceManager};
pub use snapshot::FrameSnapshotter;
pub use types::{DeviceDescriptor, ImageEncoding, RecognitionResult, StillImage, Viewport};

use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the CrabScan plugin with all commands
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("crabscan")
        .invoke_handler(tauri::generate_handler![
            // Scanner commands
            commands::scanner::start_scanner,
            commands::scanner::stop_scanner,
            commands::scanner::trigger_scan,
            commands::scanner::toggle_torch,
            commands::scanner::cycle_zoom,
            commands::scanner::get_scanner_controls,
            commands::scanner::get_scanner_state,
            commands::scanner::list_video_inputs,
            // Configuration commands
            commands::config::get_config,
            commands::config::update_config,
            commands::config::reset_config,
        ])
        .build()
}

/// Initialize logging for the scanner
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabscan=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
