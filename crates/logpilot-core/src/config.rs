//! Configuration for LogPilot.
//!
//! [`PilotConfig`] is stored as YAML in `~/.logpilot/config.yaml`. Every
//! section and key is optional; a missing file yields defaults. Environment
//! overrides (`LLM_BASE_URL`, `LLM_MODEL`, `SHADOW_MODEL`) are applied after
//! loading.
//!
//! ```yaml
//! llm:
//!   apiBase: http://localhost:11434/v1
//!   apiKeyEnv: OPENAI_API_KEY
//!   models:
//!     fast: llama3
//!     smart: llama3:70b
//! orchestrator:
//!   retryPolicy: independent
//!   sqlRepairBudget: 3
//! shadow:
//!   enabled: true
//!   model: mistral
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use logpilot_db::SqliteSettings;
use logpilot_model::{
    ChatConfig, EmbeddingConfig, DEFAULT_API_BASE, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_MAX_INPUT_TOKENS, DEFAULT_TEMPERATURE,
};

use crate::errors::PilotError;
use crate::types::RetryPolicy;

/// Name of the per-user directory under `$HOME`.
pub const LOGPILOT_HOME_DIR: &str = ".logpilot";

/// Config filename inside [`LOGPILOT_HOME_DIR`].
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "LOGPILOT_CONFIG";

pub const LLM_BASE_URL_ENV: &str = "LLM_BASE_URL";
pub const LLM_MODEL_ENV: &str = "LLM_MODEL";
pub const SHADOW_MODEL_ENV: &str = "SHADOW_MODEL";

// ============================================================================
// PilotConfig
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub shadow: ShadowConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

impl PilotConfig {
    /// Load from `LOGPILOT_CONFIG` or `~/.logpilot/config.yaml`, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`PilotError::InvalidConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, PilotError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);
        let mut config = match path {
            Some(path) => Self::from_path(&path)?,
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PilotError::InvalidConfig`] if the file cannot be read or parsed,
    /// and [`PilotError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> Result<Self, PilotError> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            PilotError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                PilotError::InvalidConfig(format!("Failed to parse {}: {}", path.display(), e))
            })?
        };

        let warnings = config.validate()?;
        for warning in warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok(config)
    }

    /// `~/.logpilot`
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(LOGPILOT_HOME_DIR))
    }

    /// `~/.logpilot/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(CONFIG_FILENAME))
    }

    /// Defaults with every store under `data_dir`; never touches `$HOME`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                data_dir: Some(data_dir.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Apply `LLM_BASE_URL`, `LLM_MODEL` and `SHADOW_MODEL`.
    ///
    /// `lookup` abstracts the environment so tests stay hermetic.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = lookup(LLM_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("{} overrides llm.apiBase", LLM_BASE_URL_ENV);
            self.llm.api_base = base;
        }
        if let Some(model) = lookup(LLM_MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            if self.llm.models.fast.is_none() {
                self.llm.models.fast = Some(model.clone());
            }
            if self.llm.models.smart.is_none() {
                self.llm.models.smart = Some(model);
            }
        }
        if let Some(model) = lookup(SHADOW_MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("{} enables shadow evaluation", SHADOW_MODEL_ENV);
            self.shadow.enabled = true;
            self.shadow.model = Some(model);
        }
    }

    /// Validate the configuration.
    ///
    /// Returns the first critical error as [`PilotError::InvalidConfiguration`];
    /// otherwise the list of non-fatal warnings, which callers should log.
    pub fn validate(&self) -> Result<Vec<String>, PilotError> {
        let mut warnings = Vec::new();
        warnings.extend(self.llm.validate()?);
        warnings.extend(self.storage.validate()?);
        warnings.extend(self.orchestrator.validate()?);
        warnings.extend(self.shadow.validate()?);
        if self.web_search.enabled && self.web_search.max_results == 0 {
            return Err(PilotError::invalid_configuration(
                "webSearch.maxResults cannot be 0",
                "Set maxResults to at least 1 or disable webSearch",
            ));
        }
        Ok(warnings)
    }

    /// Client settings for the primary generation service.
    pub fn chat_config(&self) -> ChatConfig {
        let default_model = DEFAULT_CHAT_MODEL.to_string();
        ChatConfig {
            api_base: self.llm.api_base.clone(),
            api_key: self.llm.api_key(),
            fast_model: self.llm.models.fast.clone().unwrap_or_else(|| default_model.clone()),
            smart_model: self.llm.models.smart.clone().unwrap_or(default_model),
            temperature: self.llm.temperature,
            timeout: Duration::from_secs(self.llm.timeout_secs),
            max_input_tokens: self.llm.max_input_tokens,
        }
    }

    /// Client settings for the embedding service.
    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            api_base: self
                .embedding
                .api_base
                .clone()
                .unwrap_or_else(|| self.llm.api_base.clone()),
            api_key: self.llm.api_key(),
            model: self.embedding.model.clone(),
            timeout: Duration::from_secs(self.embedding.timeout_secs),
        }
    }
}

// ============================================================================
// LlmConfig
// ============================================================================

/// Generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the bearer key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub models: ModelNames,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
}

/// Provider model names per tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelNames {
    #[serde(default)]
    pub fast: Option<String>,
    #[serde(default)]
    pub smart: Option<String>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_input_tokens() -> usize {
    DEFAULT_MAX_INPUT_TOKENS
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key_env: None,
            models: ModelNames::default(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: default_llm_timeout_secs(),
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
        }
    }
}

impl LlmConfig {
    /// The bearer key, read from `apiKeyEnv` when configured.
    pub fn api_key(&self) -> Option<String> {
        let var = self.api_key_env.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }

    fn validate(&self) -> Result<Vec<String>, PilotError> {
        let mut warnings = Vec::new();
        if self.api_base.trim().is_empty() {
            return Err(PilotError::invalid_configuration(
                "llm.apiBase cannot be empty",
                "Set apiBase to an OpenAI-compatible endpoint such as http://localhost:11434/v1",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(PilotError::invalid_configuration(
                "llm.timeoutSecs cannot be 0",
                "Set timeoutSecs to at least 1 (recommended: 30-120)",
            ));
        }
        if self.max_input_tokens == 0 {
            return Err(PilotError::invalid_configuration(
                "llm.maxInputTokens cannot be 0",
                "Set maxInputTokens to the model's context size",
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            warnings.push(format!(
                "llm.temperature={} is outside 0.0-2.0; providers may reject it",
                self.temperature
            ));
        }
        if let Some(var) = &self.api_key_env {
            if std::env::var(var).is_err() {
                warnings.push(format!("llm.apiKeyEnv names {} but it is not set", var));
            }
        }
        Ok(warnings)
    }
}

// ============================================================================
// EmbeddingSection
// ============================================================================

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSection {
    /// Defaults to `llm.apiBase`.
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            api_base: None,
            model: default_embedding_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

// ============================================================================
// StorageConfig
// ============================================================================

/// Where the stores live and how SQLite waits on locks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Defaults to `~/.logpilot/data`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub logs_db: Option<PathBuf>,
    #[serde(default)]
    pub history_db: Option<PathBuf>,
    #[serde(default)]
    pub metrics_db: Option<PathBuf>,
    #[serde(default)]
    pub knowledge_dir: Option<PathBuf>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    2_000
}
fn default_lock_retries() -> u32 {
    30
}
fn default_lock_retry_delay_ms() -> u64 {
    2_000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            logs_db: None,
            history_db: None,
            metrics_db: None,
            knowledge_dir: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
        }
    }
}

impl StorageConfig {
    /// Resolved data directory, falling back to `./.logpilot/data` without a home dir.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            PilotConfig::default_dir()
                .unwrap_or_else(|| PathBuf::from(LOGPILOT_HOME_DIR))
                .join("data")
        })
    }

    pub fn logs_db(&self) -> PathBuf {
        self.logs_db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("logs.db"))
    }

    pub fn history_db(&self) -> PathBuf {
        self.history_db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("history.db"))
    }

    pub fn metrics_db(&self) -> PathBuf {
        self.metrics_db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("metrics.db"))
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.knowledge_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("knowledge"))
    }

    pub fn sqlite_settings(&self) -> SqliteSettings {
        SqliteSettings {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            lock_retries: self.lock_retries,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }

    fn validate(&self) -> Result<Vec<String>, PilotError> {
        let mut warnings = Vec::new();
        if self.lock_retries == 0 {
            warnings.push(
                "storage.lockRetries=0; a locked database fails the operation immediately"
                    .to_string(),
            );
        }
        if self.lock_retry_delay_ms > 10_000 {
            warnings.push(format!(
                "storage.lockRetryDelayMs={} is long; contended requests may stall",
                self.lock_retry_delay_ms
            ));
        }
        Ok(warnings)
    }
}

// ============================================================================
// OrchestratorConfig
// ============================================================================

/// Default SQL repair attempts.
pub const DEFAULT_SQL_REPAIR_BUDGET: u32 = 3;
/// Default context retries (loops back to the rewriter).
pub const DEFAULT_CONTEXT_RETRY_BUDGET: u32 = 2;
/// Default answer retries (loops back to synthesis).
pub const DEFAULT_ANSWER_RETRY_BUDGET: u32 = 2;
/// Conversation turns loaded per request.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
/// Knowledge items retrieved per request.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 5;
/// Anchor rows fetched for retrieved patterns.
pub const DEFAULT_ANCHOR_LIMIT: usize = 5;
/// Radius of a log window around an anchor.
pub const DEFAULT_LOG_WINDOW_SECS: i64 = 30;
/// Row cap per log window.
pub const DEFAULT_WINDOW_ROW_LIMIT: usize = 50;
/// Hard ceiling on node visits per execution.
pub const DEFAULT_MAX_NODE_VISITS: usize = 64;

/// State machine budgets and retrieval sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    #[serde(default = "default_sql_repair_budget")]
    pub sql_repair_budget: u32,
    #[serde(default = "default_context_retry_budget")]
    pub context_retry_budget: u32,
    #[serde(default = "default_answer_retry_budget")]
    pub answer_retry_budget: u32,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    #[serde(default = "default_anchor_limit")]
    pub anchor_limit: usize,
    #[serde(default = "default_log_window_secs")]
    pub log_window_secs: i64,
    #[serde(default = "default_window_row_limit")]
    pub window_row_limit: usize,
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: usize,
}

fn default_sql_repair_budget() -> u32 {
    DEFAULT_SQL_REPAIR_BUDGET
}
fn default_context_retry_budget() -> u32 {
    DEFAULT_CONTEXT_RETRY_BUDGET
}
fn default_answer_retry_budget() -> u32 {
    DEFAULT_ANSWER_RETRY_BUDGET
}
fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}
fn default_retrieval_top_k() -> usize {
    DEFAULT_RETRIEVAL_TOP_K
}
fn default_anchor_limit() -> usize {
    DEFAULT_ANCHOR_LIMIT
}
fn default_log_window_secs() -> i64 {
    DEFAULT_LOG_WINDOW_SECS
}
fn default_window_row_limit() -> usize {
    DEFAULT_WINDOW_ROW_LIMIT
}
fn default_max_node_visits() -> usize {
    DEFAULT_MAX_NODE_VISITS
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            sql_repair_budget: DEFAULT_SQL_REPAIR_BUDGET,
            context_retry_budget: DEFAULT_CONTEXT_RETRY_BUDGET,
            answer_retry_budget: DEFAULT_ANSWER_RETRY_BUDGET,
            history_window: DEFAULT_HISTORY_WINDOW,
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
            anchor_limit: DEFAULT_ANCHOR_LIMIT,
            log_window_secs: DEFAULT_LOG_WINDOW_SECS,
            window_row_limit: DEFAULT_WINDOW_ROW_LIMIT,
            max_node_visits: DEFAULT_MAX_NODE_VISITS,
        }
    }
}

impl OrchestratorConfig {
    /// Node visits the budgets can require in the worst case.
    ///
    /// A context retry costs rewrite, classify, retrieve and verify. Only the
    /// final classification can take the SQL branch, which is the longest:
    /// generate, validate, a repair/validate pair per repair, then execute.
    /// Each answer attempt adds synthesize and validate.
    pub fn worst_case_visits(&self) -> usize {
        let retried_passes = self.context_retry_budget as usize;
        let sql_branch = (self.sql_repair_budget as usize)
            .saturating_mul(2)
            .saturating_add(3);
        let answer_attempts = (self.answer_retry_budget as usize).saturating_add(1);

        retried_passes
            .saturating_mul(4)
            .saturating_add(2)
            .saturating_add(sql_branch)
            .saturating_add(answer_attempts.saturating_mul(2))
    }

    pub fn validate(&self) -> Result<Vec<String>, PilotError> {
        let mut warnings = Vec::new();
        if self.retrieval_top_k == 0 {
            return Err(PilotError::invalid_configuration(
                "orchestrator.retrievalTopK cannot be 0",
                "Set retrievalTopK to at least 1 (recommended: 5)",
            ));
        }
        if self.history_window == 0 {
            return Err(PilotError::invalid_configuration(
                "orchestrator.historyWindow cannot be 0",
                "Set historyWindow to at least 1 (recommended: 10)",
            ));
        }
        if self.max_node_visits == 0 {
            return Err(PilotError::invalid_configuration(
                "orchestrator.maxNodeVisits cannot be 0",
                "Leave maxNodeVisits unset to use the default of 64",
            ));
        }
        if self.log_window_secs < 0 {
            return Err(PilotError::invalid_configuration(
                "orchestrator.logWindowSecs cannot be negative",
                "Set logWindowSecs to the radius in seconds (recommended: 30)",
            ));
        }
        if self.max_node_visits < self.worst_case_visits() {
            warnings.push(format!(
                "orchestrator.maxNodeVisits={} is below the {} visits the retry budgets allow; \
                 long requests will end with a failure answer",
                self.max_node_visits,
                self.worst_case_visits()
            ));
        }
        if self.retrieval_top_k > 50 {
            warnings.push(format!(
                "orchestrator.retrievalTopK={} is large; prompts may exceed the input budget",
                self.retrieval_top_k
            ));
        }
        if self.anchor_limit == 0 {
            warnings.push(
                "orchestrator.anchorLimit=0; retrieved patterns will have no log windows"
                    .to_string(),
            );
        }
        Ok(warnings)
    }
}

// ============================================================================
// ShadowConfig / WebSearchConfig
// ============================================================================

/// Shadow evaluation side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl ShadowConfig {
    /// The shadow model, when shadow evaluation is on and has a model.
    pub fn active_model(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.model.as_deref().filter(|m| !m.trim().is_empty())
    }

    fn validate(&self) -> Result<Vec<String>, PilotError> {
        let mut warnings = Vec::new();
        if self.enabled && self.active_model().is_none() {
            warnings.push("shadow.enabled is true but shadow.model is not set; shadow evaluation is off".to_string());
        }
        if self.enabled && self.queue_capacity == 0 {
            return Err(PilotError::invalid_configuration(
                "shadow.queueCapacity cannot be 0",
                "Set queueCapacity to at least 1 (recommended: 32)",
            ));
        }
        Ok(warnings)
    }
}

/// Web search path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    #[serde(default = "default_web_max_results")]
    pub max_results: usize,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_web_enabled() -> bool {
    true
}
fn default_web_max_results() -> usize {
    5
}
fn default_web_timeout_secs() -> u64 {
    10
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            max_results: default_web_max_results(),
            timeout_secs: default_web_timeout_secs(),
        }
    }
}
