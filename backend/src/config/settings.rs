use serde::{Deserialize, Serialize};
use shared::Category;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;

use crate::fusion::rules::FUSION_TABLE;
use crate::inference::model::ClassifierId;

pub const DEFAULT_CONFIG_PATH: &str = "config/settings.yaml";
pub const CONFIG_PATH_ENV: &str = "ROADSIGHT_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub route: RouteSettings,
    pub thresholds: Thresholds,
    pub classifiers: Vec<ClassifierSettings>,
    pub ocr: OcrSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_images: usize,
    pub analysis_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_images: 3,
            analysis_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub max_image_bytes: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            max_image_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    pub kml_file: PathBuf,
    pub tolerance_meters: f64,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            kml_file: PathBuf::from("data/route.kml"),
            tolerance_meters: 50.0,
        }
    }
}

/// Per-category detection thresholds. A fused score at or above the
/// threshold puts the category in the label set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub road: f32,
    pub total_station: f32,
    pub tripod: f32,
    #[serde(rename = "FDD")]
    pub fdd: f32,
    pub auto_level: f32,
    pub leveling_staff: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            road: 0.5,
            total_station: 0.5,
            tripod: 0.6,
            fdd: 0.016,
            auto_level: 0.6,
            leveling_staff: 0.016,
        }
    }
}

impl Thresholds {
    pub fn get(&self, category: Category) -> f32 {
        match category {
            Category::Road => self.road,
            Category::TotalStation => self.total_station,
            Category::Tripod => self.tripod,
            Category::Fdd => self.fdd,
            Category::AutoLevel => self.auto_level,
            Category::LevelingStaff => self.leveling_staff,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    pub id: ClassifierId,
    pub model_path: PathBuf,
    /// Category of each model output, in output order. Outputs past the end
    /// of the head are ignored.
    pub head: Vec<Category>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

fn default_input_size() -> u32 {
    crate::inference::preprocess::DEFAULT_INPUT_SIZE
}

pub fn default_classifiers() -> Vec<ClassifierSettings> {
    vec![
        ClassifierSettings {
            id: ClassifierId::A,
            model_path: PathBuf::from("models/vit_road_tripod.pt"),
            head: vec![Category::Road, Category::Tripod],
            input_size: default_input_size(),
        },
        ClassifierSettings {
            id: ClassifierId::B,
            model_path: PathBuf::from("models/vit_survey_equipment.pt"),
            head: vec![
                Category::Fdd,
                Category::TotalStation,
                Category::Tripod,
                Category::LevelingStaff,
            ],
            input_size: default_input_size(),
        },
        ClassifierSettings {
            id: ClassifierId::C,
            model_path: PathBuf::from("models/vit_site_levelling.pt"),
            head: vec![Category::Fdd, Category::LevelingStaff, Category::AutoLevel],
            input_size: default_input_size(),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub binary: String,
    pub language: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
        }
    }
}

impl Settings {
    /// Reads the YAML config (if present), applies environment overrides
    /// and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut settings = if path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::from_file(&path)?
        } else {
            log::info!(
                "No configuration file at {}, using built-in defaults",
                path.display()
            );
            Self::default()
        };

        settings.apply_overrides(|name| std::env::var(name).ok())?;
        settings.fill_defaults();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&config_str).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(route) = lookup("ROUTE_FILE") {
            self.route.kml_file = PathBuf::from(route);
        }
        if let Some(binary) = lookup("OCR_BINARY") {
            self.ocr.binary = binary;
        }
        Ok(())
    }

    /// An empty classifier list means "use the stock ensemble".
    pub fn fill_defaults(&mut self) {
        if self.classifiers.is_empty() {
            self.classifiers = default_classifiers();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for category in Category::iter() {
            let threshold = self.thresholds.get(category);
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Validation(format!(
                    "threshold for {} must be between 0 and 1, got {}",
                    category, threshold
                )));
            }
        }

        let tolerance = self.route.tolerance_meters;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "tolerance_meters must be a positive number, got {}",
                tolerance
            )));
        }

        if self.server.max_images == 0 {
            return Err(ConfigError::Validation(
                "max_images must be at least 1".to_string(),
            ));
        }
        if self.server.analysis_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "analysis_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.storage.max_image_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_image_bytes must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for classifier in &self.classifiers {
            if !seen.insert(classifier.id) {
                return Err(ConfigError::Validation(format!(
                    "classifier {} is configured more than once",
                    classifier.id
                )));
            }
            if classifier.input_size == 0 {
                return Err(ConfigError::Validation(format!(
                    "classifier {} has an input_size of 0",
                    classifier.id
                )));
            }
        }

        for rule in FUSION_TABLE.iter() {
            for source in rule.aggregation.sources() {
                let covered = self
                    .classifiers
                    .iter()
                    .any(|c| c.id == source.classifier && c.head.contains(&source.label));
                if !covered {
                    return Err(ConfigError::Validation(format!(
                        "{} needs a '{}' output from classifier {}, which no configured head provides",
                        rule.category, source.label, source.classifier
                    )));
                }
            }
        }

        Ok(())
    }
}
