use image::DynamicImage;
use std::collections::BTreeMap;

use super::model::{Classifier, ClassifierId, ClassifierVerdict, InferenceError};
use crate::config::ClassifierSettings;

/// One verdict per ensemble member, for a single image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnsembleVerdicts {
    verdicts: BTreeMap<ClassifierId, ClassifierVerdict>,
}

impl EnsembleVerdicts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ClassifierId, verdict: ClassifierVerdict) -> Self {
        self.verdicts.insert(id, verdict);
        self
    }

    pub fn get(&self, id: ClassifierId) -> Option<&ClassifierVerdict> {
        self.verdicts.get(&id)
    }
}

pub struct Ensemble {
    members: Vec<Box<dyn Classifier>>,
}

impl Ensemble {
    pub fn new(members: Vec<Box<dyn Classifier>>) -> Self {
        Self { members }
    }

    /// Loads every configured model. A model that fails to load is logged and
    /// replaced by an unavailable stand-in; startup carries on.
    pub fn load(settings: &[ClassifierSettings]) -> Self {
        let members = settings.iter().map(load_member).collect();
        Self { members }
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<EnsembleVerdicts, InferenceError> {
        let mut verdicts = EnsembleVerdicts::new();
        for member in &self.members {
            let verdict = member.classify(image)?;
            log::debug!("Classifier {} scores: {:?}", member.id(), verdict.scores());
            verdicts = verdicts.with(member.id(), verdict);
        }
        Ok(verdicts)
    }

    pub fn ready(&self) -> Vec<ClassifierId> {
        self.members
            .iter()
            .filter(|m| m.is_ready())
            .map(|m| m.id())
            .collect()
    }

    pub fn unavailable(&self) -> Vec<ClassifierId> {
        self.members
            .iter()
            .filter(|m| !m.is_ready())
            .map(|m| m.id())
            .collect()
    }
}

#[cfg(feature = "torch")]
fn load_member(settings: &ClassifierSettings) -> Box<dyn Classifier> {
    use super::model::{TorchClassifier, UnavailableClassifier};

    match TorchClassifier::load(settings) {
        Ok(classifier) => {
            log::info!(
                "Loaded classifier {} from {}",
                settings.id,
                settings.model_path.display()
            );
            Box::new(classifier)
        }
        Err(e) => {
            log::error!("Failed to load classifier {}: {}", settings.id, e);
            Box::new(UnavailableClassifier::new(settings.id, e.to_string()))
        }
    }
}

#[cfg(not(feature = "torch"))]
fn load_member(settings: &ClassifierSettings) -> Box<dyn Classifier> {
    use super::model::UnavailableClassifier;

    log::warn!(
        "Classifier {} ({}) not loaded: built without the `torch` feature",
        settings.id,
        settings.model_path.display()
    );
    Box::new(UnavailableClassifier::new(
        settings.id,
        "built without the `torch` feature",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::model::UnavailableClassifier;
    use shared::Category;

    struct Fixed(ClassifierId, Vec<(Category, f32)>);

    impl Classifier for Fixed {
        fn id(&self) -> ClassifierId {
            self.0
        }

        fn classify(&self, _image: &DynamicImage) -> Result<ClassifierVerdict, InferenceError> {
            Ok(self.1.iter().copied().collect())
        }
    }

    #[test]
    fn collects_a_verdict_per_member() {
        let ensemble = Ensemble::new(vec![
            Box::new(Fixed(ClassifierId::A, vec![(Category::Road, 0.9)])),
            Box::new(Fixed(ClassifierId::C, vec![(Category::AutoLevel, 0.4)])),
        ]);

        let verdicts = ensemble.classify(&DynamicImage::new_rgb8(2, 2)).unwrap();
        assert_eq!(
            verdicts.get(ClassifierId::A).unwrap().score(Category::Road),
            Some(0.9)
        );
        assert!(verdicts.get(ClassifierId::B).is_none());
    }

    #[test]
    fn one_failing_member_fails_the_image() {
        let ensemble = Ensemble::new(vec![
            Box::new(Fixed(ClassifierId::A, vec![(Category::Road, 0.9)])),
            Box::new(UnavailableClassifier::new(ClassifierId::B, "no weights")),
        ]);

        assert!(ensemble.classify(&DynamicImage::new_rgb8(2, 2)).is_err());
        assert_eq!(ensemble.ready(), vec![ClassifierId::A]);
        assert_eq!(ensemble.unavailable(), vec![ClassifierId::B]);
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn load_without_torch_marks_everything_unavailable() {
        let mut settings = crate::config::Settings::default();
        settings.fill_defaults();

        let ensemble = Ensemble::load(&settings.classifiers);
        assert!(ensemble.ready().is_empty());
        assert_eq!(
            ensemble.unavailable(),
            vec![ClassifierId::A, ClassifierId::B, ClassifierId::C]
        );
    }
}
