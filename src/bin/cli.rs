use crabscan::{
    CrabScanConfig, CycleOutcome, MediaDevices, NativeMediaDevices, RecognitionService,
    ScanEvent, Scanner,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Single scans retry while the camera has not produced a frame yet
const FRAME_RETRIES: usize = 30;
const FRAME_RETRY_DELAY: Duration = Duration::from_millis(100);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    crabscan::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: crabscan-cli <list-devices|scan> [args]");
        std::process::exit(1);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let command = &args[1];
    match command.as_str() {
        "list-devices" => runtime.block_on(cmd_list_devices(&args)),
        "scan" => runtime.block_on(cmd_scan(&args)),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

async fn cmd_list_devices(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let devices: Vec<_> = NativeMediaDevices::new()
        .enumerate_devices()
        .await?
        .into_iter()
        .filter(|d| d.is_video_input())
        .collect();

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {}", d.id, d.label);
        }
    }
    Ok(())
}

async fn cmd_scan(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    // Parse args: scan [device_id] [--config <path>] [--continuous] [--interval <ms>] [--json]
    let mut device_id = None;
    let mut config_path = None;
    let mut continuous = false;
    let mut interval_ms = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = args.get(i).cloned();
            }
            "--continuous" => continuous = true,
            "--interval" => {
                i += 1;
                interval_ms = Some(args.get(i).ok_or("--interval needs a value")?.parse::<u64>()?);
            }
            "--json" => json = true,
            _ => {
                if device_id.is_none() {
                    device_id = Some(args[i].clone());
                }
            }
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => CrabScanConfig::load_from_file(path)?,
        None => CrabScanConfig::load_or_default(),
    };
    if continuous {
        config.scanning.continuous = true;
    }
    if let Some(interval_ms) = interval_ms {
        config.scanning.interval_ms = interval_ms;
    }
    config.validate()?;

    let scanner = Scanner::new(
        Arc::new(NativeMediaDevices::new()),
        RecognitionService::tesseract(config.recognition_options()),
        &config,
    );
    let events = scanner.subscribe();
    let session = match device_id.as_deref() {
        Some(id) => scanner.start_with_device(id).await?,
        None => scanner.start().await?,
    };
    eprintln!(
        "Scanning on {} ({:?})",
        session.device_id(),
        session.capabilities().controls()
    );

    if config.scanning.continuous {
        scan_continuously(events, json).await?;
    } else {
        scan_once(&scanner, json).await?;
    }

    scanner.stop();
    Ok(())
}

async fn scan_once(scanner: &Scanner, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    for _ in 0..FRAME_RETRIES {
        match scanner.trigger_scan().await {
            CycleOutcome::Recognized(result) => {
                if json {
                    println!("{}", serde_json::to_string(&result)?);
                } else {
                    println!("{}", result.text.trim());
                }
                return Ok(());
            }
            CycleOutcome::Skipped(_) | CycleOutcome::Coalesced => {
                tokio::time::sleep(FRAME_RETRY_DELAY).await;
            }
            CycleOutcome::Failed(e) => return Err(e.into()),
            CycleOutcome::Stopped => return Err("Scanner stopped".into()),
        }
    }
    Err("No frame arrived from the camera".into())
}

async fn scan_continuously(
    mut events: tokio::sync::broadcast::Receiver<ScanEvent>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ScanEvent::Recognized { result }) if result.is_match() => {
                    if json {
                        println!("{}", serde_json::to_string(&result)?);
                    } else {
                        println!("{}", result.text.trim());
                    }
                }
                Ok(ScanEvent::StateChanged { state: crabscan::ScanState::Stopped }) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
