use actix_web::rt::time::timeout;
use actix_web::web;
use futures::future::join_all;
use image::DynamicImage;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use super::record::{EvidenceRecord, ImageUpload, Stage, UploadMetadata};
use crate::config::{Settings, Thresholds};
use crate::fusion::{FusionEngine, FusionError, FusionOutcome};
use crate::geo::location::extract_from_fragments;
use crate::geo::resolver::{client_coordinate, locate, resolve_location};
use crate::geo::{Coordinate, RouteIndex};
use crate::inference::{Ensemble, InferenceError, OcrError, TextRecognizer};
use crate::storage::{StorageError, StoredUpload, UploadStore};

/// Immutable, startup-time configuration shared by every request.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub thresholds: Thresholds,
    pub tolerance_meters: f64,
    pub route: RouteIndex,
    pub analysis_timeout: Duration,
    pub max_images: usize,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings, route: RouteIndex) -> Self {
        Self {
            thresholds: settings.thresholds,
            tolerance_meters: settings.route.tolerance_meters,
            route,
            analysis_timeout: Duration::from_secs(settings.server.analysis_timeout_secs),
            max_images: settings.server.max_images,
        }
    }
}

/// The upload could not be read at all. Ends the image in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("failed to store upload: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("worker failed: {0}")]
    Worker(String),
}

/// The image was readable but could not be analyzed. Degrades to empty scores.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("classification failed: {0}")]
    Classification(#[from] InferenceError),
    #[error("text recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("score fusion failed: {0}")]
    Fusion(#[from] FusionError),
    #[error("analysis did not finish within {0:?}")]
    Timeout(Duration),
    #[error("analysis worker failed: {0}")]
    Worker(String),
}

pub struct DecodedImage {
    pub image: DynamicImage,
    pub stored: StoredUpload,
}

#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub fusion: FusionOutcome,
    pub ocr_coordinate: Option<Coordinate>,
}

pub struct Pipeline {
    config: PipelineConfig,
    fusion: FusionEngine,
    ensemble: Ensemble,
    ocr: Box<dyn TextRecognizer>,
    store: UploadStore,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        ensemble: Ensemble,
        ocr: Box<dyn TextRecognizer>,
        store: UploadStore,
    ) -> Self {
        let fusion = FusionEngine::new(config.thresholds);
        Self {
            config,
            fusion,
            ensemble,
            ocr,
            store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    pub fn ocr(&self) -> &dyn TextRecognizer {
        self.ocr.as_ref()
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Runs every stage for one image on the calling thread.
    pub fn process(&self, upload: ImageUpload) -> EvidenceRecord {
        let filename = self.receive(&upload);
        match self.decode(&filename, &upload.data) {
            Ok(decoded) => {
                let analysis = self.analyze(&decoded);
                self.complete(filename, upload.metadata, analysis)
            }
            Err(e) => self.fail(filename, upload.metadata, e),
        }
    }

    pub fn receive(&self, upload: &ImageUpload) -> String {
        let filename = UploadStore::generate_filename(&upload.original_name);
        debug!(
            "{}: {:?} ({} bytes from '{}')",
            filename,
            Stage::Received,
            upload.data.len(),
            upload.original_name
        );
        filename
    }

    /// Stores the bytes, then decodes them.
    pub fn decode(&self, filename: &str, data: &[u8]) -> Result<DecodedImage, ProcessingError> {
        let stored = self.store.store(filename, data)?;
        let image = image::load_from_memory(data)?;
        debug!(
            "{}: {:?} ({}x{})",
            filename,
            Stage::Decoded,
            image.width(),
            image.height()
        );
        Ok(DecodedImage { image, stored })
    }

    /// Classification, fusion and OCR. Any error here fails the whole
    /// analysis; the caller decides how to degrade.
    pub fn analyze(&self, decoded: &DecodedImage) -> Result<Analysis, AnalysisError> {
        let verdicts = self.ensemble.classify(&decoded.image)?;
        let fusion = self.fusion.fuse(&verdicts)?;
        let fragments = self.ocr.recognize_text(&decoded.stored.path)?;
        let ocr_coordinate = extract_from_fragments(&fragments);
        Ok(Analysis {
            fusion,
            ocr_coordinate,
        })
    }

    pub fn complete(
        &self,
        filename: String,
        metadata: UploadMetadata,
        analysis: Result<Analysis, AnalysisError>,
    ) -> EvidenceRecord {
        let (analysis, analysis_error) = match analysis {
            Ok(analysis) => (analysis, None),
            Err(e) => {
                warn!("{}: analysis failed, reporting empty scores: {}", filename, e);
                (Analysis::default(), Some(e.to_string()))
            }
        };
        debug!("{}: {:?} labels={:?}", filename, Stage::Scored, analysis.fusion.labels);

        let client = client_coordinate(metadata.client_lat, metadata.client_lon);
        let located = locate(
            client,
            analysis.ocr_coordinate,
            &self.config.route,
            self.config.tolerance_meters,
        );
        debug!("{}: {:?} {:?}", filename, Stage::Located, located.location);
        debug!("{}: {:?} {:?}", filename, Stage::Validated, located.validation);

        let record = EvidenceRecord {
            filename,
            chainage_km: metadata.chainage_km,
            labels: analysis.fusion.labels,
            scores: analysis.fusion.scores,
            location: located.location,
            validation: located.validation,
            stage: Stage::Completed,
            error: None,
            analysis_error,
        };

        info!(
            "Processed {}: {:?}, Client GPS: {:?}, OCR GPS: {:?}, Final GPS: {:?}, GPS valid: {}, Distance: {:?}",
            record.filename,
            record.labels,
            client,
            analysis.ocr_coordinate,
            record.coordinate(),
            record.gps_valid(),
            record.validation.map(|v| v.distance_meters)
        );
        record
    }

    /// Best-effort record for an unreadable upload: keeps the client
    /// coordinate, skips validation.
    pub fn fail(
        &self,
        filename: String,
        metadata: UploadMetadata,
        error: ProcessingError,
    ) -> EvidenceRecord {
        error!("Error processing upload for {}: {}", filename, error);
        let client = client_coordinate(metadata.client_lat, metadata.client_lon);
        EvidenceRecord {
            filename,
            chainage_km: metadata.chainage_km,
            labels: Default::default(),
            scores: Default::default(),
            location: resolve_location(client, None),
            validation: None,
            stage: Stage::Failed,
            error: Some(error.to_string()),
            analysis_error: None,
        }
    }
}

/// Processes a batch concurrently on the blocking pool. Results keep input
/// order, and no image can fail or stall another.
pub async fn process_batch(pipeline: Arc<Pipeline>, uploads: Vec<ImageUpload>) -> Vec<EvidenceRecord> {
    join_all(
        uploads
            .into_iter()
            .map(|upload| process_upload(Arc::clone(&pipeline), upload)),
    )
    .await
}

async fn process_upload(pipeline: Arc<Pipeline>, upload: ImageUpload) -> EvidenceRecord {
    let filename = pipeline.receive(&upload);
    let ImageUpload { data, metadata, .. } = upload;

    let worker = Arc::clone(&pipeline);
    let name = filename.clone();
    let decoded = match web::block(move || worker.decode(&name, &data)).await {
        Ok(Ok(decoded)) => decoded,
        Ok(Err(e)) => return pipeline.fail(filename, metadata, e),
        Err(e) => return pipeline.fail(filename, metadata, ProcessingError::Worker(e.to_string())),
    };

    let deadline = pipeline.config().analysis_timeout;
    let worker = Arc::clone(&pipeline);
    let analysis = match timeout(deadline, web::block(move || worker.analyze(&decoded))).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AnalysisError::Worker(e.to_string())),
        Err(_) => Err(AnalysisError::Timeout(deadline)),
    };

    pipeline.complete(filename, metadata, analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{
        Classifier, ClassifierId, ClassifierVerdict, UnavailableClassifier,
    };
    use image::{ImageFormat, Rgb, RgbImage};
    use shared::{Category, LocationSource};
    use std::io::Cursor;
    use std::path::Path;

    struct Fixed(ClassifierId, Vec<(Category, f32)>);

    impl Classifier for Fixed {
        fn id(&self) -> ClassifierId {
            self.0
        }

        fn classify(&self, _image: &DynamicImage) -> Result<ClassifierVerdict, InferenceError> {
            Ok(self.1.iter().copied().collect())
        }
    }

    struct Slow;

    impl Classifier for Slow {
        fn id(&self) -> ClassifierId {
            ClassifierId::A
        }

        fn classify(&self, _image: &DynamicImage) -> Result<ClassifierVerdict, InferenceError> {
            std::thread::sleep(Duration::from_millis(1500));
            Err(InferenceError::Preprocessing("too late".to_string()))
        }
    }

    struct StaticOcr(Vec<String>);

    impl TextRecognizer for StaticOcr {
        fn recognize_text(&self, _image_path: &Path) -> Result<Vec<String>, OcrError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn ensemble() -> Ensemble {
        Ensemble::new(vec![
            Box::new(Fixed(
                ClassifierId::A,
                vec![(Category::Road, 0.9), (Category::Tripod, 0.7)],
            )),
            Box::new(Fixed(
                ClassifierId::B,
                vec![
                    (Category::Fdd, 0.3),
                    (Category::TotalStation, 0.2),
                    (Category::Tripod, 0.7),
                    (Category::LevelingStaff, 0.1),
                ],
            )),
            Box::new(Fixed(
                ClassifierId::C,
                vec![
                    (Category::Fdd, 0.1),
                    (Category::LevelingStaff, 0.1),
                    (Category::AutoLevel, 0.1),
                ],
            )),
        ])
    }

    fn config(route: RouteIndex) -> PipelineConfig {
        PipelineConfig {
            thresholds: Thresholds::default(),
            tolerance_meters: 50.0,
            route,
            analysis_timeout: Duration::from_secs(30),
            max_images: 3,
        }
    }

    fn route() -> RouteIndex {
        RouteIndex::new(vec![Coordinate::new(12.9716, 77.5946)])
    }

    fn pipeline_with(dir: &Path, ensemble: Ensemble, ocr_text: &[&str]) -> Pipeline {
        Pipeline::new(
            config(route()),
            ensemble,
            Box::new(StaticOcr(ocr_text.iter().map(|s| s.to_string()).collect())),
            UploadStore::new(dir, 1024 * 1024).unwrap(),
        )
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([90, 120, 40])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn upload(name: &str, data: Vec<u8>, lat: Option<f64>, lon: Option<f64>) -> ImageUpload {
        ImageUpload {
            original_name: name.to_string(),
            data,
            metadata: UploadMetadata {
                chainage_km: Some("3.200".to_string()),
                client_lat: lat,
                client_lon: lon,
            },
        }
    }

    #[test]
    fn readable_image_is_scored_located_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), ensemble(), &[]);

        let record = pipeline.process(upload("site.png", png_bytes(), Some(12.9716), Some(77.5946)));

        assert_eq!(record.stage, Stage::Completed);
        assert_eq!(record.error, None);
        assert_eq!(record.analysis_error, None);
        // leveling_staff passes its threshold but FDD suppresses it
        let expected: crate::fusion::LabelSet =
            [Category::Road, Category::Tripod, Category::Fdd].into_iter().collect();
        assert_eq!(record.labels, expected);
        assert_eq!(record.scores.len(), 6);
        assert!((record.scores[&Category::LevelingStaff] - 0.2).abs() < 1e-6);
        assert!(record.gps_valid());
        assert_eq!(record.location_source(), Some(LocationSource::Client));
        assert!(dir.path().join(&record.filename).exists());
    }

    #[test]
    fn ocr_coordinate_used_without_client_gps() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(
            dir.path(),
            ensemble(),
            &["Longitude: 77.5946", "Latitude: 12.9716"],
        );

        let record = pipeline.process(upload("site.png", png_bytes(), None, None));
        assert_eq!(record.coordinate(), Some(Coordinate::new(12.9716, 77.5946)));
        assert_eq!(record.location_source(), Some(LocationSource::Ocr));
        assert!(record.gps_valid());
    }

    #[test]
    fn client_coordinate_beats_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), ensemble(), &["Latitude: 1.5 Longitude: 2.5"]);

        let record = pipeline.process(upload("site.png", png_bytes(), Some(12.9716), Some(77.5946)));
        assert_eq!(record.coordinate(), Some(Coordinate::new(12.9716, 77.5946)));
    }

    #[test]
    fn oversized_image_fails_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(route()),
            ensemble(),
            Box::new(StaticOcr(Vec::new())),
            UploadStore::new(dir.path(), 16).unwrap(),
        );

        let record = pipeline.process(upload("site.png", png_bytes(), Some(12.9716), Some(77.5946)));

        assert_eq!(record.stage, Stage::Failed);
        assert!(record.error.as_deref().unwrap().starts_with("failed to store upload"));
        assert!(record.scores.is_empty());
        assert_eq!(record.coordinate(), Some(Coordinate::new(12.9716, 77.5946)));
        assert!(!dir.path().join(&record.filename).exists());
    }

    #[test]
    fn corrupt_image_fails_but_keeps_client_coordinate() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), ensemble(), &[]);

        let record = pipeline.process(upload("broken.jpg", b"not an image".to_vec(), Some(12.0), Some(77.0)));

        assert_eq!(record.stage, Stage::Failed);
        assert!(record.error.as_deref().unwrap().starts_with("failed to decode image"));
        assert!(record.labels.is_empty());
        assert!(record.scores.is_empty());
        assert_eq!(record.coordinate(), Some(Coordinate::new(12.0, 77.0)));
        assert_eq!(record.validation, None);
        assert!(!record.gps_valid());
        assert_eq!(record.chainage_km.as_deref(), Some("3.200"));
    }

    #[test]
    fn analysis_failure_degrades_without_error_field() {
        let dir = tempfile::tempdir().unwrap();
        let ensemble = Ensemble::new(vec![Box::new(UnavailableClassifier::new(
            ClassifierId::A,
            "no weights",
        ))]);
        let pipeline = pipeline_with(dir.path(), ensemble, &["Latitude: 12.9716 Longitude: 77.5946"]);

        let record = pipeline.process(upload("site.png", png_bytes(), None, None));

        assert_eq!(record.stage, Stage::Completed);
        assert_eq!(record.error, None);
        assert!(record.analysis_error.unwrap().contains("no weights"));
        assert!(record.labels.is_empty());
        assert!(record.scores.is_empty());
        // OCR coordinates are lost together with the rest of the analysis
        assert_eq!(record.location, None);
    }

    #[test]
    fn empty_route_reports_not_validated() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            config(RouteIndex::default()),
            ensemble(),
            Box::new(StaticOcr(vec![])),
            UploadStore::new(dir.path(), 1024 * 1024).unwrap(),
        );

        let record = pipeline.process(upload("site.png", png_bytes(), Some(12.9716), Some(77.5946)));
        assert!(record.coordinate().is_some());
        assert_eq!(record.validation, None);
        assert!(!record.gps_valid());
    }

    #[actix_web::test]
    async fn batch_isolates_a_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(pipeline_with(dir.path(), ensemble(), &[]));

        let records = process_batch(
            pipeline,
            vec![
                upload("first.png", png_bytes(), Some(12.9716), Some(77.5946)),
                upload("second.png", b"\x89PNG garbage".to_vec(), None, None),
                upload("third.png", png_bytes(), None, None),
            ],
        )
        .await;

        assert_eq!(records.len(), 3);
        assert!(records[0].filename.ends_with("_first.png"));
        assert!(records[1].filename.ends_with("_second.png"));
        assert!(records[2].filename.ends_with("_third.png"));

        assert_eq!(records[0].stage, Stage::Completed);
        assert!(records[0].labels.contains(&Category::Road));
        assert!(records[0].gps_valid());

        assert!(records[1].is_failed());
        assert!(records[1].error.is_some());

        assert_eq!(records[2].stage, Stage::Completed);
        assert_eq!(records[2].error, None);
        assert!(records[2].labels.contains(&Category::Road));
    }

    #[actix_web::test]
    async fn slow_analysis_times_out_into_degraded_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline_with(dir.path(), Ensemble::new(vec![Box::new(Slow)]), &[]);
        pipeline.config.analysis_timeout = Duration::from_millis(100);

        let records = process_batch(
            Arc::new(pipeline),
            vec![upload("slow.png", png_bytes(), Some(12.9716), Some(77.5946))],
        )
        .await;

        let record = &records[0];
        assert_eq!(record.stage, Stage::Completed);
        assert_eq!(record.error, None);
        assert!(record.analysis_error.as_deref().unwrap().contains("did not finish"));
        assert!(record.gps_valid());
    }
}
