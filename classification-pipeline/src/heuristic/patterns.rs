use common::{
    error::AppError,
    storage::types::document::{CategoryAssignment, Document},
};
use regex::{Regex, RegexBuilder};

pub const PATTERN_CLASSIFIER_TAG: &str = "enhanced-rule-based-v1.0";
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Below this best score the document is labelled `Unknown`.
const MIN_SCORE: f64 = 0.1;

const TECHNOLOGY: &[&str] = &[
    r"\b(software|programming|developer|coding|algorithm|javascript|python|java|react|angular|vue|node\.js|api|database|cloud|aws|azure|docker|kubernetes|artificial intelligence|machine learning|AI|ML|blockchain|cryptocurrency|bitcoin|ethereum)\b",
    r"\b(github|stackoverflow|tech|technology|framework|library|open source|backend|frontend|fullstack|devops|ci/cd|microservices|rest|graphql)\b",
];

const NEWSPAPER_ARTICLE: &[&str] = &[
    r"\b(breaking|news|reported|journalist|correspondent|reuters|associated press|CNN|BBC|times|post|herald|tribune|gazette|today|daily)\b",
    r"\b(politics|government|election|president|minister|congress|parliament|senate|house|policy|legislation|investigation)\b",
    r"\b(according to sources|officials said|statement|press conference|interview|exclusive|developing story)\b",
];

const TECHNOLOGY_UPDATE: &[&str] = &[
    r"\b(update|upgrade|release|version|patch|changelog|new features|announcement|launched|beta|alpha|rollout)\b",
    r"\b(apple|google|microsoft|facebook|meta|amazon|tesla|spotify|netflix|uber|twitter|instagram|tiktok|whatsapp)\b",
    r"\b(iOS|android|windows|mac|chrome|firefox|safari|edge|app store|play store|product launch|keynote)\b",
];

const SIMPLE_ARTICLE: &[&str] = &[
    r"\b(how to|guide|tutorial|tips|advice|learn|beginner|step by step|introduction|overview|basics)\b",
    r"\b(blog|article|post|content|writing|author|published|lifestyle|health|travel|food|culture|sports|entertainment)\b",
    r"\b(opinion|review|analysis|commentary|thoughts|perspective|experience|personal|story|essay)\b",
];

/// Built-in category table, in evaluation order.
pub const DEFAULT_PATTERN_TABLE: &[(&str, &[&str])] = &[
    ("Technology", TECHNOLOGY),
    ("Newspaper Article", NEWSPAPER_ARTICLE),
    ("Technology Update", TECHNOLOGY_UPDATE),
    ("Simple Article", SIMPLE_ARTICLE),
];

#[derive(Debug, Clone)]
struct PatternRule {
    category: String,
    patterns: Vec<Regex>,
}

/// Scores each category by how densely its token groups occur in the document metadata.
#[derive(Debug, Clone)]
pub struct PatternDensityClassifier {
    rules: Vec<PatternRule>,
}

impl PatternDensityClassifier {
    pub fn new() -> Result<Self, AppError> {
        Self::with_table(DEFAULT_PATTERN_TABLE)
    }

    /// Compiles a custom table once; patterns are matched case-insensitively.
    pub fn with_table(table: &[(&str, &[&str])]) -> Result<Self, AppError> {
        let rules = table
            .iter()
            .map(|(category, patterns)| {
                let patterns = patterns
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|e| {
                                AppError::InternalError(format!(
                                    "invalid pattern for category {category}: {e}"
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(PatternRule {
                    category: (*category).to_string(),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(Self { rules })
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.category.as_str())
    }

    /// Always yields exactly one assignment.
    pub fn classify(&self, document: &Document) -> Vec<CategoryAssignment> {
        vec![self.classify_text(&document.metadata_text())]
    }

    pub fn classify_text(&self, text: &str) -> CategoryAssignment {
        let content = text.to_lowercase();
        let word_count = content.split_whitespace().count().max(1);

        let mut best: Option<(&str, f64)> = None;
        for rule in &self.rules {
            let score = density_score(&content, word_count, &rule.patterns);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((rule.category.as_str(), score));
            }
        }

        match best {
            Some((category, score)) if score >= MIN_SCORE => {
                CategoryAssignment::new(category, score.min(1.0), PATTERN_CLASSIFIER_TAG)
            }
            _ => CategoryAssignment::new(UNKNOWN_CATEGORY, 1.0, PATTERN_CLASSIFIER_TAG),
        }
    }
}

/// `max(density * 2, min(matches * 0.1, 1.0))` with `density = matches / words`.
fn density_score(content: &str, word_count: usize, patterns: &[Regex]) -> f64 {
    let matches: usize = patterns
        .iter()
        .map(|pattern| pattern.find_iter(content).count())
        .sum();
    let matches = matches as f64;
    let density = matches / word_count as f64;
    (density * 2.0).max((matches * 0.1).min(1.0))
}
