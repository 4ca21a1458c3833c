pub mod ensemble;
pub mod model;
pub mod ocr;
pub mod preprocess;

pub use ensemble::{Ensemble, EnsembleVerdicts};
pub use model::{Classifier, ClassifierId, ClassifierVerdict, InferenceError, UnavailableClassifier};
pub use ocr::{OcrError, TesseractOcr, TextRecognizer};
