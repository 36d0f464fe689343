use std::collections::BTreeMap;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Clone, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

/// Paper sizes understood by the renderer.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    Letter,
    Legal,
}

impl PageFormat {
    /// Paper width and height in inches.
    pub const fn dimensions_inches(self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (11.69, 16.54),
            PageFormat::A4 => (8.27, 11.69),
            PageFormat::Letter => (8.5, 11.0),
            PageFormat::Legal => (8.5, 14.0),
        }
    }
}

impl std::str::FromStr for PageFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            other => Err(format!("unknown page format '{other}'")),
        }
    }
}

/// Keywords and trusted domains for one keyword/domain rule category.
#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
pub struct RuleCategory {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub domains: Vec<String>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_credential")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_name")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_name")]
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default = "default_verification_timeout_secs")]
    pub verification_timeout_secs: u64,
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    #[serde(default)]
    pub render_page_format: PageFormat,
    #[serde(default = "default_true")]
    pub render_full_page: bool,
    #[serde(default = "default_true")]
    pub render_print_background: bool,
    #[serde(default)]
    pub chrome_no_sandbox: bool,
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,

    #[serde(default)]
    pub ml_enabled: bool,
    #[serde(default = "default_ml_confidence_threshold")]
    pub ml_confidence_threshold: f64,
    #[serde(default = "default_ml_model_location")]
    pub ml_model_location: String,
    #[serde(default = "default_ml_min_document_frequency")]
    pub ml_min_document_frequency: usize,
    #[serde(default = "default_ml_max_features")]
    pub ml_max_features: usize,

    #[serde(default)]
    pub mcp_enabled: bool,
    #[serde(default = "default_mcp_server_url")]
    pub mcp_server_url: String,
    #[serde(default = "default_mcp_timeout_ms")]
    pub mcp_timeout_ms: u64,
    #[serde(default = "default_mcp_tool_name")]
    pub mcp_tool_name: String,

    #[serde(default)]
    pub rule_based_enabled: bool,
    #[serde(default = "default_rule_based_confidence_threshold")]
    pub rule_based_confidence_threshold: f64,
    #[serde(default = "default_rule_categories")]
    pub rule_categories: BTreeMap<String, RuleCategory>,

    #[serde(default = "default_true")]
    pub obsidian_enabled: bool,
    #[serde(default = "default_obsidian_vault_path")]
    pub obsidian_vault_path: String,
}

fn default_true() -> bool {
    true
}

/// Embedded on-disk engine under the default data directory, so runs share their documents.
fn default_surrealdb_address() -> String {
    "surrealkv://data/db".to_string()
}

fn default_surrealdb_credential() -> String {
    "root".to_string()
}

fn default_surrealdb_name() -> String {
    "pagevault".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_verification_timeout_secs() -> u64 {
    10
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

fn default_render_timeout_secs() -> u64 {
    30
}

fn default_status_ttl_secs() -> u64 {
    3_600
}

fn default_ml_confidence_threshold() -> f64 {
    0.6
}

fn default_ml_model_location() -> String {
    "models/ml-model.json".to_string()
}

fn default_ml_min_document_frequency() -> usize {
    2
}

fn default_ml_max_features() -> usize {
    1_000
}

fn default_mcp_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_mcp_timeout_ms() -> u64 {
    30_000
}

fn default_mcp_tool_name() -> String {
    "classify_document".to_string()
}

fn default_rule_based_confidence_threshold() -> f64 {
    0.7
}

fn default_obsidian_vault_path() -> String {
    "./obsidian-vault".to_string()
}

fn rule(keywords: &[&str], domains: &[&str]) -> RuleCategory {
    RuleCategory {
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        domains: domains.iter().map(|d| (*d).to_string()).collect(),
    }
}

/// Built-in keyword/domain rule table used when the config file does not provide one.
pub fn default_rule_categories() -> BTreeMap<String, RuleCategory> {
    let mut rules = BTreeMap::new();
    rules.insert(
        "finance".to_string(),
        rule(
            &[
                "bank", "banking", "finance", "financial", "investment", "money", "loan",
                "credit", "debt", "mortgage", "insurance", "trading", "stocks", "portfolio",
                "crypto", "cryptocurrency", "bitcoin",
            ],
            &[
                "bloomberg.com",
                "cnbc.com",
                "marketwatch.com",
                "wsj.com",
                "investing.com",
                "yahoo.com/finance",
            ],
        ),
    );
    rules.insert(
        "technology".to_string(),
        rule(
            &[
                "technology",
                "tech",
                "software",
                "programming",
                "development",
                "coding",
                "computer",
                "ai",
                "artificial intelligence",
                "machine learning",
                "cloud",
                "api",
                "database",
                "framework",
                "javascript",
                "python",
                "java",
            ],
            &[
                "github.com",
                "stackoverflow.com",
                "techcrunch.com",
                "wired.com",
                "ars-technica.com",
                "theverge.com",
                "hacker-news.com",
            ],
        ),
    );
    rules.insert(
        "news".to_string(),
        rule(
            &[
                "news",
                "breaking",
                "report",
                "article",
                "journalism",
                "politics",
                "government",
                "election",
                "policy",
                "current events",
            ],
            &[
                "cnn.com",
                "bbc.com",
                "reuters.com",
                "ap.org",
                "nytimes.com",
                "washingtonpost.com",
                "theguardian.com",
            ],
        ),
    );
    rules.insert(
        "science".to_string(),
        rule(
            &[
                "science", "research", "study", "experiment", "biology", "chemistry", "physics",
                "medicine", "health", "medical", "scientific",
            ],
            &[],
        ),
    );
    rules.insert(
        "business".to_string(),
        rule(
            &[
                "business",
                "company",
                "corporate",
                "enterprise",
                "startup",
                "entrepreneur",
                "management",
                "strategy",
                "marketing",
                "sales",
            ],
            &[],
        ),
    );
    rules
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: default_surrealdb_credential(),
            surrealdb_password: default_surrealdb_credential(),
            surrealdb_namespace: default_surrealdb_name(),
            surrealdb_database: default_surrealdb_name(),
            data_dir: default_data_dir(),
            storage: StorageKind::default(),
            verification_timeout_secs: default_verification_timeout_secs(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            render_timeout_secs: default_render_timeout_secs(),
            render_page_format: PageFormat::default(),
            render_full_page: true,
            render_print_background: true,
            chrome_no_sandbox: false,
            status_ttl_secs: default_status_ttl_secs(),
            ml_enabled: false,
            ml_confidence_threshold: default_ml_confidence_threshold(),
            ml_model_location: default_ml_model_location(),
            ml_min_document_frequency: default_ml_min_document_frequency(),
            ml_max_features: default_ml_max_features(),
            mcp_enabled: false,
            mcp_server_url: default_mcp_server_url(),
            mcp_timeout_ms: default_mcp_timeout_ms(),
            mcp_tool_name: default_mcp_tool_name(),
            rule_based_enabled: false,
            rule_based_confidence_threshold: default_rule_based_confidence_threshold(),
            rule_categories: default_rule_categories(),
            obsidian_enabled: true,
            obsidian_vault_path: default_obsidian_vault_path(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_format_parses_case_insensitively() {
        assert_eq!("letter".parse::<PageFormat>(), Ok(PageFormat::Letter));
        assert_eq!("A3".parse::<PageFormat>(), Ok(PageFormat::A3));
        assert!("tabloid".parse::<PageFormat>().is_err());
    }

    #[test]
    fn empty_sources_fall_back_to_defaults() {
        let config: AppConfig = Config::builder()
            .build()
            .and_then(Config::try_deserialize)
            .expect("defaults deserialize");

        assert_eq!(config.surrealdb_address, "surrealkv://data/db");
        assert_eq!(config.storage, StorageKind::Local);
        assert_eq!(config.render_page_format, PageFormat::A4);
        assert!((config.ml_confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.ml_max_features, 1_000);
        assert_eq!(config.rule_categories.len(), 5);
        assert!(config.obsidian_enabled);
    }

    #[test]
    fn overrides_take_precedence() {
        let config: AppConfig = Config::builder()
            .set_override("ml_enabled", true)
            .and_then(|b| b.set_override("render_page_format", "Letter"))
            .and_then(|b| b.set_override("storage", "memory"))
            .and_then(|b| b.build())
            .and_then(Config::try_deserialize)
            .expect("config with overrides");

        assert!(config.ml_enabled);
        assert_eq!(config.render_page_format, PageFormat::Letter);
        assert_eq!(config.storage, StorageKind::Memory);
    }

    #[test]
    fn technology_rules_carry_domains() {
        let rules = default_rule_categories();
        let technology = rules.get("technology").expect("technology rules");
        assert!(technology.keywords.iter().any(|k| k == "software"));
        assert!(technology.domains.iter().any(|d| d == "github.com"));
    }
}
