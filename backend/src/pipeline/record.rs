use shared::{LocationSource, UploadResult};

use crate::fusion::{FusedScores, LabelSet};
use crate::geo::{Coordinate, ResolvedLocation, ValidationResult};

/// Per-image processing stages. `Failed` is reachable only before scoring
/// finishes; analysis problems still end in `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Scored,
    Located,
    Validated,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadMetadata {
    pub chainage_km: Option<String>,
    pub client_lat: Option<f64>,
    pub client_lon: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub original_name: String,
    pub data: Vec<u8>,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceRecord {
    pub filename: String,
    pub chainage_km: Option<String>,
    pub labels: LabelSet,
    pub scores: FusedScores,
    pub location: Option<ResolvedLocation>,
    pub validation: Option<ValidationResult>,
    pub stage: Stage,
    /// Set when the upload could not be stored or decoded.
    pub error: Option<String>,
    /// Set when classification or OCR failed; logged, not returned to callers.
    pub analysis_error: Option<String>,
}

impl EvidenceRecord {
    pub fn coordinate(&self) -> Option<Coordinate> {
        self.location.map(|l| l.coordinate)
    }

    pub fn location_source(&self) -> Option<LocationSource> {
        self.location.map(|l| l.source)
    }

    pub fn gps_valid(&self) -> bool {
        self.validation.is_some_and(|v| v.within_tolerance)
    }

    pub fn is_failed(&self) -> bool {
        self.stage == Stage::Failed
    }

    pub fn to_upload_result(&self) -> UploadResult {
        let coordinate = self.coordinate();
        UploadResult {
            filename: self.filename.clone(),
            chainage_km: self.chainage_km.clone(),
            labels: self.labels.clone(),
            confidences: self.scores.clone(),
            lat: coordinate.map(|c| c.latitude),
            lon: coordinate.map(|c| c.longitude),
            gps_valid: self.gps_valid(),
            distance_to_route: self.validation.map(|v| v.rounded_distance()),
            nearest_route_index: self.validation.map(|v| v.nearest_index),
            location_source: self.location_source(),
            error: self.error.clone(),
        }
    }
}
