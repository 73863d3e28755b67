use crate::config::CrabScanConfig;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tauri::command;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Arc<RwLock<CrabScanConfig>> = Arc::new(RwLock::new(CrabScanConfig::load_or_default()));
}

/// Snapshot of the active configuration, used when a scanner starts
pub(crate) fn current_config() -> CrabScanConfig {
    GLOBAL_CONFIG
        .read()
        .map(|config| config.clone())
        .unwrap_or_default()
}

#[command]
pub async fn get_config() -> Result<CrabScanConfig, String> {
    Ok(current_config())
}

/// Replace the configuration. Returns the sections that changed; a running
/// scanner keeps its settings until the next `start_scanner`.
#[command]
pub async fn update_config(new_config: CrabScanConfig) -> Result<Vec<String>, String> {
    store_config(new_config, &CrabScanConfig::default_path())
}

/// Restore and persist the defaults
#[command]
pub async fn reset_config() -> Result<CrabScanConfig, String> {
    let defaults = CrabScanConfig::default();
    store_config(defaults.clone(), &CrabScanConfig::default_path())?;
    Ok(defaults)
}

/// Validate, persist, then publish. A failed save leaves the active config untouched.
fn store_config(new_config: CrabScanConfig, path: &Path) -> Result<Vec<String>, String> {
    new_config.validate()?;
    new_config
        .save_to_file(path)
        .map_err(|e| format!("Failed to save config: {}", e))?;

    let mut config = GLOBAL_CONFIG
        .write()
        .map_err(|e| format!("Failed to write config: {}", e))?;
    let changed = changed_sections(&config, &new_config);
    *config = new_config;

    if changed.is_empty() {
        log::debug!("Config stored without changes");
    } else {
        log::info!(
            "Config sections changed: {}; applied on the next scanner start",
            changed.join(", ")
        );
    }
    Ok(changed)
}

fn changed_sections(old: &CrabScanConfig, new: &CrabScanConfig) -> Vec<String> {
    let mut changed = Vec::new();
    if old.capture != new.capture {
        changed.push("capture".to_string());
    }
    if old.zoom != new.zoom {
        changed.push("zoom".to_string());
    }
    if old.recognition != new.recognition {
        changed.push("recognition".to_string());
    }
    if old.scanning != new.scanning {
        changed.push("scanning".to_string());
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_get_config_is_valid() {
        let config = get_config().await.unwrap();
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid() {
        let mut config = CrabScanConfig::default();
        config.zoom.step = -1.0;
        assert!(update_config(config).await.is_err());
    }

    #[test]
    fn test_changed_sections_names_only_differences() {
        let old = CrabScanConfig::default();
        let mut new = old.clone();
        assert!(changed_sections(&old, &new).is_empty());

        new.scanning.continuous = true;
        new.zoom.step = 0.5;
        assert_eq!(changed_sections(&old, &new), vec!["zoom", "scanning"]);
    }

    #[test]
    fn test_store_config_persists_and_publishes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crabscan.toml");

        let mut config = current_config();
        config.scanning.interval_ms += 250;
        let changed = store_config(config.clone(), &path).unwrap();

        assert_eq!(changed, vec!["scanning"]);
        assert_eq!(CrabScanConfig::load_from_file(&path).unwrap(), config);
        assert_eq!(current_config().scanning.interval_ms, config.scanning.interval_ms);
    }

    #[test]
    fn test_failed_save_keeps_active_config() {
        let dir = tempdir().unwrap();
        // A directory cannot be written as a file
        let before = current_config();
        let mut config = before.clone();
        config.recognition.auto_rotate = !config.recognition.auto_rotate;

        assert!(store_config(config, dir.path()).is_err());
        assert_eq!(current_config().recognition, before.recognition);
    }
}
