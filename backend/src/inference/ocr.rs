use std::path::Path;
use std::process::{Command, ExitStatus};

use crate::config::OcrSettings;

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to run OCR binary '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

pub trait TextRecognizer: Send + Sync {
    /// Text fragments found in the image, in reading order.
    fn recognize_text(&self, image_path: &Path) -> Result<Vec<String>, OcrError>;

    fn name(&self) -> &str;
}

/// Runs the `tesseract` CLI against a stored image and returns one fragment
/// per non-empty output line.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(settings: &OcrSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            language: settings.language.clone(),
        }
    }
}

impl TextRecognizer for TesseractOcr {
    fn recognize_text(&self, image_path: &Path) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|source| OcrError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(fragments_from_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &str {
        &self.binary
    }
}

fn fragments_from_output(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
