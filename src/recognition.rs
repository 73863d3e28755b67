//! Text recognition adapter
//!
//! Every call to [`RecognitionService::recognize`] checks out a fresh engine
//! from its [`EngineFactory`], runs it once and terminates it, so concurrent
//! recognitions never share engine state.

use crate::errors::ScanError;
use crate::types::{RecognitionResult, StillImage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Options passed to the recognition engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    pub languages: BTreeSet<String>,
    pub auto_rotate: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            languages: BTreeSet::from(["eng".to_string()]),
            auto_rotate: true,
        }
    }
}

impl RecognitionOptions {
    /// Languages joined the way tesseract expects them (`eng+deu`)
    pub fn language_spec(&self) -> String {
        if self.languages.is_empty() {
            return "eng".to_string();
        }
        self.languages.iter().cloned().collect::<Vec<_>>().join("+")
    }
}

/// A single-use OCR engine instance
#[async_trait]
pub trait RecognitionEngine: Send {
    async fn recognize_text(
        &mut self,
        image: &StillImage,
        options: &RecognitionOptions,
    ) -> Result<String, ScanError>;

    /// Release engine resources once the call is done
    async fn terminate(&mut self) {}
}

/// Creates engines on demand
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(
        &self,
        options: &RecognitionOptions,
    ) -> Result<Box<dyn RecognitionEngine>, ScanError>;
}

/// Submits still images to the OCR engine
#[derive(Clone)]
pub struct RecognitionService {
    factory: Arc<dyn EngineFactory>,
    options: RecognitionOptions,
}

impl RecognitionService {
    pub fn new(factory: Arc<dyn EngineFactory>, options: RecognitionOptions) -> Self {
        Self { factory, options }
    }

    /// Tesseract-backed service
    pub fn tesseract(options: RecognitionOptions) -> Self {
        Self::new(Arc::new(TesseractFactory), options)
    }

    pub fn options(&self) -> &RecognitionOptions {
        &self.options
    }

    pub async fn recognize(&self, image: &StillImage) -> Result<RecognitionResult, ScanError> {
        let mut engine = self
            .factory
            .create(&self.options)
            .await
            .map_err(into_recognition_failure)?;

        let outcome = engine.recognize_text(image, &self.options).await;
        engine.terminate().await;

        let text = outcome.map_err(into_recognition_failure)?;
        log::debug!("Recognized {} characters", text.chars().count());
        Ok(RecognitionResult::new(text))
    }
}

fn into_recognition_failure(error: ScanError) -> ScanError {
    match error {
        ScanError::RecognitionFailed(_) => error,
        other => ScanError::RecognitionFailed(other.to_string()),
    }
}

/// Produces [`TesseractEngine`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct TesseractFactory;

#[async_trait]
impl EngineFactory for TesseractFactory {
    async fn create(
        &self,
        options: &RecognitionOptions,
    ) -> Result<Box<dyn RecognitionEngine>, ScanError> {
        Ok(Box::new(TesseractEngine::new(options)))
    }
}

/// OCR through the system `tesseract` binary
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    lang: String,
    psm: i32,
}

impl TesseractEngine {
    pub fn new(options: &RecognitionOptions) -> Self {
        Self {
            lang: options.language_spec(),
            // 1: automatic segmentation with orientation detection, 3: fully automatic
            psm: if options.auto_rotate { 1 } else { 3 },
        }
    }

    fn args(&self) -> rusty_tesseract::Args {
        rusty_tesseract::Args {
            lang: self.lang.clone(),
            config_variables: HashMap::new(),
            dpi: Some(150),
            psm: Some(self.psm),
            oem: Some(3),
        }
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    async fn recognize_text(
        &mut self,
        image: &StillImage,
        _options: &RecognitionOptions,
    ) -> Result<String, ScanError> {
        let decoded = image
            .decode()
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to decode snapshot: {}", e)))?;
        let args = self.args();

        tokio::task::spawn_blocking(move || {
            let tess_image = rusty_tesseract::Image::from_dynamic_image(&decoded).map_err(|e| {
                ScanError::RecognitionFailed(format!("Failed to create tesseract image: {}", e))
            })?;
            rusty_tesseract::image_to_string(&tess_image, &args)
                .map_err(|e| ScanError::RecognitionFailed(format!("tesseract: {}", e)))
        })
        .await
        .map_err(|e| ScanError::RecognitionFailed(format!("Task join error: {}", e)))?
    }
}
