use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Environment variable that overrides `[search] trusted_domains`.
pub const TRUSTED_DOMAINS_ENV: &str = "TRUSTED_DOMAINS";

pub const DEFAULT_TRUSTED_DOMAINS: &[&str] = &[
    "reuters.com",
    "nytimes.com",
    "bbc.com",
    "ekantipur.com",
    "kathmandupost.com",
    "setopati.com",
    "onlinekhabar.com",
    "ratopati.com",
    "nayapatrikadaily.com",
];

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct TruthGuardConfig {
    pub service: ServiceConfig,
    pub http: HttpConfig,
    pub feed: FeedConfig,
    pub search: SearchConfig,
    pub classifier: ClassifierConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    /// Community the pipeline reads when the caller names none.
    pub community: String,
    pub limit: usize,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.reddit.com".to_string(),
            community: "newsnepal289".to_string(),
            limit: 15,
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub trusted_domains: Vec<String>,
    pub page_size: u32,
    pub query_tokens: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org".to_string(),
            trusted_domains: DEFAULT_TRUSTED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            page_size: 3,
            query_tokens: 7,
            timeout_secs: 15,
            max_retries: 2,
            retry_delay_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.1,
            timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum spacing between two calls to the same upstream service.
    pub min_interval_ms: u64,
    /// Claims in flight at once. 1 keeps the run strictly sequential.
    pub concurrency: usize,
    pub run_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 400,
            concurrency: 1,
            run_timeout_secs: None,
        }
    }
}

impl TruthGuardConfig {
    /// Load from a TOML file, then apply `TRUTHGUARD__SECTION__KEY` overrides
    /// and the `TRUSTED_DOMAINS` allow-list override.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("TRUTHGUARD").separator("__"))
            .build()?;
        let mut config: Self = s.try_deserialize()?;
        config.apply_domain_override(std::env::var(TRUSTED_DOMAINS_ENV).ok().as_deref());
        Ok(config)
    }

    fn apply_domain_override(&mut self, raw: Option<&str>) {
        let Some(raw) = raw else { return };
        let domains = parse_domain_list(raw);
        if !domains.is_empty() {
            self.search.trusted_domains = domains;
        }
    }
}

/// Split a comma separated allow-list, dropping blanks.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}
