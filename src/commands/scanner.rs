use crate::capabilities::ControlVisibility;
use crate::commands::config::current_config;
use crate::constraints::DesiredSettings;
use crate::controller::{CycleOutcome, ScanEvent, ScanState};
use crate::platform::{MediaDevices, NativeMediaDevices};
use crate::recognition::RecognitionService;
use crate::scanner::Scanner;
use crate::types::{DeviceDescriptor, RecognitionResult};
use std::sync::Arc;
use tauri::{command, AppHandle, Emitter, Runtime};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;

/// Event name scan events are emitted under
pub const SCAN_EVENT: &str = "crabscan://scan-event";

lazy_static::lazy_static! {
    static ref SCANNER: Arc<RwLock<Option<Arc<Scanner>>>> = Arc::new(RwLock::new(None));
}

async fn running_scanner() -> Result<Arc<Scanner>, String> {
    SCANNER
        .read()
        .await
        .clone()
        .ok_or_else(|| "Scanner is not running".to_string())
}

/// Acquire a camera and start scanning. Any running scanner is stopped first.
#[command]
pub async fn start_scanner<R: Runtime>(
    app: AppHandle<R>,
    device_id: Option<String>,
) -> Result<ControlVisibility, String> {
    let config = current_config();
    let mut slot = SCANNER.write().await;
    if let Some(previous) = slot.take() {
        log::info!("Stopping previous scanner before starting a new one");
        previous.stop();
    }

    let scanner = Arc::new(Scanner::new(
        Arc::new(NativeMediaDevices::new()),
        RecognitionService::tesseract(config.recognition_options()),
        &config,
    ));

    // Attached before start so the first continuous cycle reaches the webview.
    tauri::async_runtime::spawn(forward_events(app, scanner.subscribe()));

    let started = match device_id.as_deref() {
        Some(id) => scanner.start_with_device(id).await,
        None => scanner.start().await,
    };
    let session = started.map_err(|e| {
        log::error!("Failed to start scanner: {}", e);
        format!("Failed to start scanner: {}", e)
    })?;

    *slot = Some(scanner);
    Ok(session.capabilities().controls())
}

async fn forward_events<R: Runtime>(
    app: AppHandle<R>,
    mut events: tokio::sync::broadcast::Receiver<ScanEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if let Err(e) = app.emit(SCAN_EVENT, &event) {
                    log::warn!("Failed to emit scan event: {}", e);
                }
            }
            Err(RecvError::Lagged(missed)) => {
                log::warn!("Scan event forwarder lagged, {} events dropped", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Stop scanning and release the camera
#[command]
pub async fn stop_scanner() -> Result<(), String> {
    if let Some(scanner) = SCANNER.write().await.take() {
        scanner.stop();
        log::info!("Scanner stopped");
    }
    Ok(())
}

/// Run one recognition cycle. Returns `None` when the cycle produced no text
/// result (no frame yet, engine failure, or an overlapping cycle).
#[command]
pub async fn trigger_scan() -> Result<Option<RecognitionResult>, String> {
    let scanner = running_scanner().await?;
    match scanner.trigger_scan().await {
        CycleOutcome::Recognized(result) => Ok(Some(result)),
        CycleOutcome::Skipped(_) | CycleOutcome::Failed(_) | CycleOutcome::Coalesced => Ok(None),
        CycleOutcome::Stopped => Err("Scanner is stopped".to_string()),
    }
}

#[command]
pub async fn toggle_torch() -> Result<DesiredSettings, String> {
    let scanner = running_scanner().await?;
    scanner.toggle_torch().await.map_err(|e| e.to_string())?;
    Ok(scanner.desired_settings())
}

#[command]
pub async fn cycle_zoom() -> Result<DesiredSettings, String> {
    let scanner = running_scanner().await?;
    scanner.cycle_zoom().await.map_err(|e| e.to_string())?;
    Ok(scanner.desired_settings())
}

/// Controls to render for the live session; `None` before the scanner starts
#[command]
pub async fn get_scanner_controls() -> Result<Option<ControlVisibility>, String> {
    Ok(SCANNER
        .read()
        .await
        .as_ref()
        .and_then(|scanner| scanner.controls()))
}

#[command]
pub async fn get_scanner_state() -> Result<ScanState, String> {
    Ok(SCANNER
        .read()
        .await
        .as_ref()
        .map(|scanner| scanner.state())
        .unwrap_or(ScanState::Stopped))
}

/// Video inputs visible to the native backend
#[command]
pub async fn list_video_inputs() -> Result<Vec<DeviceDescriptor>, String> {
    let devices = NativeMediaDevices::new()
        .enumerate_devices()
        .await
        .map_err(|e| format!("Failed to list video inputs: {}", e))?;
    let inputs: Vec<_> = devices.into_iter().filter(|d| d.is_video_input()).collect();
    log::info!("Found {} video inputs", inputs.len());
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_controls_without_scanner() {
        assert_eq!(get_scanner_controls().await.unwrap(), None);
        assert_eq!(get_scanner_state().await.unwrap(), ScanState::Stopped);
        assert!(trigger_scan().await.is_err());
        assert!(stop_scanner().await.is_ok());
    }
}
