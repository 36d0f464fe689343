pub mod classifier;
pub mod model;

pub use classifier::{
    ModelStatus, StatisticalClassifier, StatisticalSettings, TrainingReport,
    STATISTICAL_CLASSIFIER_TAG,
};
pub use model::{TfIdfModel, TrainingParams};
