pub mod settings;

pub use settings::{
    ClassifierSettings, ConfigError, OcrSettings, RouteSettings, ServerSettings, Settings,
    StorageSettings, Thresholds,
};
