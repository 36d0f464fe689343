pub mod keywords;
pub mod patterns;

pub use keywords::{KeywordDomainClassifier, KEYWORD_CLASSIFIER_TAG};
pub use patterns::{PatternDensityClassifier, PATTERN_CLASSIFIER_TAG, UNKNOWN_CATEGORY};
