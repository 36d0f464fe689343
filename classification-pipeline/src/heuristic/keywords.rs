use std::collections::BTreeMap;

use common::{
    storage::types::document::{CategoryAssignment, Document},
    utils::config::RuleCategory,
};
use url::Url;

pub const KEYWORD_CLASSIFIER_TAG: &str = "rule-based-v1.0";

const KEYWORD_WEIGHT: f64 = 0.7;
const DOMAIN_WEIGHT: f64 = 0.3;

/// Weighted keyword coverage plus trusted-domain bonus per configured category.
#[derive(Debug, Clone)]
pub struct KeywordDomainClassifier {
    rules: BTreeMap<String, RuleCategory>,
    threshold: f64,
}

impl KeywordDomainClassifier {
    pub fn new(rules: &BTreeMap<String, RuleCategory>, threshold: f64) -> Self {
        let rules = rules
            .iter()
            .map(|(name, rule)| {
                let normalized = RuleCategory {
                    keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                    domains: rule.domains.iter().map(|d| d.to_lowercase()).collect(),
                };
                (name.clone(), normalized)
            })
            .collect();
        Self { rules, threshold }
    }

    pub fn classify(&self, document: &Document) -> Vec<CategoryAssignment> {
        let text = format!("{} {}", document.metadata_text(), document.url).to_lowercase();
        self.classify_parts(&text, &document_host(&document.url))
    }

    /// Every category at or above the threshold, highest confidence first.
    pub fn classify_parts(&self, text: &str, host: &str) -> Vec<CategoryAssignment> {
        let mut assignments: Vec<CategoryAssignment> = self
            .rules
            .iter()
            .filter_map(|(name, rule)| {
                let confidence = score(rule, text, host);
                (confidence >= self.threshold)
                    .then(|| CategoryAssignment::new(name.as_str(), confidence, KEYWORD_CLASSIFIER_TAG))
            })
            .collect();
        assignments.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        assignments
    }
}

fn score(rule: &RuleCategory, text: &str, host: &str) -> f64 {
    let keyword_score = if rule.keywords.is_empty() {
        0.0
    } else {
        let matched = rule
            .keywords
            .iter()
            .filter(|keyword| text.contains(keyword.as_str()))
            .count();
        matched as f64 / rule.keywords.len() as f64
    };

    let domain_score = if !host.is_empty() && rule.domains.iter().any(|d| host.contains(d.as_str()))
    {
        1.0
    } else {
        0.0
    };

    KEYWORD_WEIGHT * keyword_score + DOMAIN_WEIGHT * domain_score
}

/// Lower-cased host without a leading `www.`; falls back to string stripping for unparsable input.
fn document_host(raw: &str) -> String {
    let host = Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| {
            let rest = raw
                .trim_start_matches("https://")
                .trim_start_matches("http://");
            rest.split('/').next().unwrap_or_default().to_string()
        })
        .to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::config::default_rule_categories;

    fn technology_only() -> BTreeMap<String, RuleCategory> {
        let mut rules = BTreeMap::new();
        rules.insert(
            "technology".to_string(),
            RuleCategory {
                keywords: vec!["software".into(), "cloud".into()],
                domains: vec!["github.com".into()],
            },
        );
        rules
    }

    #[test]
    fn full_keyword_and_domain_match_scores_one() {
        let classifier = KeywordDomainClassifier::new(&technology_only(), 0.7);
        let result = classifier.classify_parts("software in the cloud", "github.com");
        assert_eq!(result.len(), 1);
        assert!((result[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(result[0].classifier, KEYWORD_CLASSIFIER_TAG);
    }

    #[test]
    fn keywords_alone_reach_threshold() {
        let classifier = KeywordDomainClassifier::new(&technology_only(), 0.7);
        let result = classifier.classify_parts("software in the cloud", "example.org");
        assert_eq!(result.len(), 1);
        assert!((result[0].confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn partial_match_is_filtered() {
        let classifier = KeywordDomainClassifier::new(&technology_only(), 0.7);
        let result = classifier.classify_parts("software only", "example.org");
        assert!(result.is_empty());
    }

    #[test]
    fn document_host_drops_scheme_and_www() {
        assert_eq!(document_host("https://www.GitHub.com/rust-lang"), "github.com");
        assert_eq!(document_host("not a url/path"), "not a url");
    }

    #[test]
    fn classify_reads_url_and_metadata() {
        let classifier = KeywordDomainClassifier::new(&default_rule_categories(), 0.3);
        let mut doc = Document::new("https://www.reuters.com/world");
        doc.title = "Breaking news on the election".into();
        let result = classifier.classify(&doc);
        assert_eq!(result.first().map(|a| a.name.as_str()), Some("news"));
        assert!(result
            .windows(2)
            .all(|pair| pair[0].confidence >= pair[1].confidence));
    }
}
