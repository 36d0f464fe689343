use std::collections::{BTreeMap, HashMap, HashSet};

use common::error::AppError;
use serde::{Deserialize, Serialize};

use crate::text::tokenize;

/// Term to weight; only non-zero components are stored.
pub type SparseVector = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingParams {
    pub min_document_frequency: usize,
    pub max_features: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            min_document_frequency: 2,
            max_features: 1_000,
        }
    }
}

/// Persisted TF-IDF model: vocabulary, IDF table and one L2-normalised vector per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TfIdfModel {
    pub vocabulary: BTreeMap<String, usize>,
    pub inverse_document_frequency: BTreeMap<String, f64>,
    pub category_vectors: BTreeMap<String, SparseVector>,
    pub trained: bool,
}

impl TfIdfModel {
    /// Builds a model from per-category document texts.
    ///
    /// Vocabulary keeps terms whose document frequency reaches `min_document_frequency`,
    /// ordered by descending frequency (ties alphabetical) and capped at `max_features`.
    pub fn fit(
        groups: &BTreeMap<String, Vec<String>>,
        params: TrainingParams,
    ) -> Result<Self, AppError> {
        let total_documents: usize = groups.values().map(Vec::len).sum();
        if total_documents == 0 {
            return Err(AppError::Training(
                "No valid training documents found".to_string(),
            ));
        }

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for text in groups.values().flatten() {
            let distinct: HashSet<String> = tokenize(text).into_iter().collect();
            for term in distinct {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= params.min_document_frequency)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(params.max_features);

        let mut model = TfIdfModel {
            trained: true,
            ..TfIdfModel::default()
        };
        for (index, (term, df)) in ranked.into_iter().enumerate() {
            let idf = (total_documents as f64 / df as f64).ln();
            model.inverse_document_frequency.insert(term.clone(), idf);
            model.vocabulary.insert(term, index);
        }

        for (category, texts) in groups {
            if texts.is_empty() {
                continue;
            }
            let corpus = texts.join(" ");
            let mut vector = model.weigh(&tokenize(&corpus));
            l2_normalize(&mut vector);
            model.category_vectors.insert(category.clone(), vector);
        }

        Ok(model)
    }

    /// Normalised tf-idf vector of `text` over this model's vocabulary.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        let mut vector = self.weigh(&tokenize(text));
        l2_normalize(&mut vector);
        vector
    }

    /// Cosine similarity against every category vector.
    pub fn similarities(&self, vector: &SparseVector) -> Vec<(String, f64)> {
        self.category_vectors
            .iter()
            .map(|(category, centroid)| (category.clone(), cosine(vector, centroid)))
            .collect()
    }

    pub fn categories(&self) -> Vec<String> {
        self.category_vectors.keys().cloned().collect()
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in tokens {
            if self.vocabulary.contains_key(token) {
                *counts.entry(token.as_str()).or_default() += 1;
            }
        }

        counts
            .into_iter()
            .filter_map(|(term, tf)| {
                let idf = self.inverse_document_frequency.get(term).copied()?;
                let weight = tf as f64 * idf;
                (weight > 0.0).then(|| (term.to_string(), weight))
            })
            .collect()
    }
}

pub fn norm(vector: &SparseVector) -> f64 {
    vector.values().map(|w| w * w).sum::<f64>().sqrt()
}

/// Divides every component by the Euclidean norm; a zero vector is left untouched.
pub fn l2_normalize(vector: &mut SparseVector) {
    let length = norm(vector);
    if length > 0.0 {
        for weight in vector.values_mut() {
            *weight /= length;
        }
    }
}

/// Dot product of two already-normalised vectors.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small
        .iter()
        .filter_map(|(term, weight)| large.get(term).map(|other| weight * other))
        .sum()
}
