use image::DynamicImage;
use serde::{Deserialize, Serialize};
use shared::Category;
use std::collections::BTreeMap;
use strum::Display;

#[cfg(feature = "torch")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "torch")]
use tch::{CModule, Device, Kind, Tensor};

#[cfg(feature = "torch")]
use crate::config::ClassifierSettings;
#[cfg(feature = "torch")]
use crate::inference::preprocess::to_input_array;

/// Member of the three-model ensemble.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
pub enum ClassifierId {
    A,
    B,
    C,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),
    #[error("classifier {id} is unavailable: {reason}")]
    ModelUnavailable { id: ClassifierId, reason: String },
    #[error("classifier {id} failed: {message}")]
    Model { id: ClassifierId, message: String },
    #[error("classifier {id} returned {actual} outputs, head expects at least {expected}")]
    ShapeMismatch {
        id: ClassifierId,
        expected: usize,
        actual: usize,
    },
    #[error("classifier {0} lock poisoned")]
    LockPoisoned(ClassifierId),
}

/// Probabilities one classifier assigned to the categories its head covers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierVerdict {
    scores: BTreeMap<Category, f32>,
}

impl ClassifierVerdict {
    pub fn new(scores: BTreeMap<Category, f32>) -> Self {
        Self { scores }
    }

    /// Pairs each head label with the model output at the same position.
    pub fn from_outputs(
        id: ClassifierId,
        head: &[Category],
        outputs: &[f32],
    ) -> Result<Self, InferenceError> {
        if outputs.len() < head.len() {
            return Err(InferenceError::ShapeMismatch {
                id,
                expected: head.len(),
                actual: outputs.len(),
            });
        }
        let scores = head.iter().copied().zip(outputs.iter().copied()).collect();
        Ok(Self { scores })
    }

    pub fn score(&self, category: Category) -> Option<f32> {
        self.scores.get(&category).copied()
    }

    pub fn scores(&self) -> &BTreeMap<Category, f32> {
        &self.scores
    }
}

impl FromIterator<(Category, f32)> for ClassifierVerdict {
    fn from_iter<I: IntoIterator<Item = (Category, f32)>>(iter: I) -> Self {
        Self {
            scores: iter.into_iter().collect(),
        }
    }
}

pub trait Classifier: Send + Sync {
    fn id(&self) -> ClassifierId;

    fn is_ready(&self) -> bool {
        true
    }

    fn classify(&self, image: &DynamicImage) -> Result<ClassifierVerdict, InferenceError>;
}

/// Stand-in for a model that could not be loaded; every call fails so the
/// image degrades to empty scores.
pub struct UnavailableClassifier {
    id: ClassifierId,
    reason: String,
}

impl UnavailableClassifier {
    pub fn new(id: ClassifierId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

impl Classifier for UnavailableClassifier {
    fn id(&self) -> ClassifierId {
        self.id
    }

    fn is_ready(&self) -> bool {
        false
    }

    fn classify(&self, _image: &DynamicImage) -> Result<ClassifierVerdict, InferenceError> {
        Err(InferenceError::ModelUnavailable {
            id: self.id,
            reason: self.reason.clone(),
        })
    }
}

/// TorchScript multi-label classifier; outputs go through a sigmoid.
#[cfg(feature = "torch")]
pub struct TorchClassifier {
    id: ClassifierId,
    head: Vec<Category>,
    input_size: u32,
    device: Device,
    model: Arc<Mutex<CModule>>,
}

#[cfg(feature = "torch")]
impl TorchClassifier {
    pub fn load(settings: &ClassifierSettings) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(&settings.model_path, device).map_err(|e| {
            InferenceError::ModelUnavailable {
                id: settings.id,
                reason: format!("{}: {}", settings.model_path.display(), e),
            }
        })?;
        Ok(Self {
            id: settings.id,
            head: settings.head.clone(),
            input_size: settings.input_size,
            device,
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[cfg(feature = "torch")]
impl Classifier for TorchClassifier {
    fn id(&self) -> ClassifierId {
        self.id
    }

    fn classify(&self, image: &DynamicImage) -> Result<ClassifierVerdict, InferenceError> {
        let input = to_input_array(image, self.input_size);
        let data = input.as_slice().ok_or_else(|| {
            InferenceError::Preprocessing("input array is not contiguous".to_string())
        })?;
        let side = i64::from(self.input_size);
        let tensor = Tensor::from_slice(data)
            .view([1, 3, side, side])
            .to_device(self.device);

        let model = self
            .model
            .lock()
            .map_err(|_| InferenceError::LockPoisoned(self.id))?;
        let output = tch::no_grad(|| model.forward_ts(&[tensor])).map_err(|e| {
            InferenceError::Model {
                id: self.id,
                message: e.to_string(),
            }
        })?;

        let output = output
            .sigmoid()
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .view([-1]);
        let num_elements = output.size()[0] as usize;
        let mut outputs = vec![0.0f32; num_elements];
        output.copy_data(&mut outputs, num_elements);

        ClassifierVerdict::from_outputs(self.id, &self.head, &outputs)
    }
}
