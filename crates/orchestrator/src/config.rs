use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-1.5-flash-latest";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GITHUB_EXECUTABLE: &str = "npx";
pub const DEFAULT_GITHUB_SERVER: &str = "@modelcontextprotocol/server-github";
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(86_400);

/// Which strategy drives new jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Scripted,
    Planned,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scripted => "scripted",
            Self::Planned => "planned",
        }
    }

    /// Accepts the historical names `simulated` and `gemini` as well.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scripted" | "simulated" => Some(Self::Scripted),
            "planned" | "gemini" => Some(Self::Planned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Simulated latency, no adapters
    #[default]
    DryRun,
    Live,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::Live => "live",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("live") {
            Self::Live
        } else {
            Self::DryRun
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model_id: String,
    pub api_base: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubAdapterConfig {
    pub executable: String,
    pub server: String,
    pub token: Option<String>,
    pub toolsets: Option<String>,
    pub repo_owner: Option<String>,
    pub timeout: Duration,
}

impl Default for GithubAdapterConfig {
    fn default() -> Self {
        Self {
            executable: DEFAULT_GITHUB_EXECUTABLE.to_string(),
            server: DEFAULT_GITHUB_SERVER.to_string(),
            token: None,
            toolsets: None,
            repo_owner: None,
            timeout: mcp::DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub strategy: StrategyKind,
    pub execution_mode: ExecutionMode,
    pub gemini: GeminiConfig,
    pub github: GithubAdapterConfig,
    /// Expiry for persisted jobs and steps. `None` keeps them forever.
    pub job_retention: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            execution_mode: ExecutionMode::default(),
            gemini: GeminiConfig::default(),
            github: GithubAdapterConfig::default(),
            job_retention: Some(DEFAULT_JOB_RETENTION),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(raw) = get("ORCHESTRATION_STRATEGY") {
            match StrategyKind::parse(&raw) {
                Some(kind) => config.strategy = kind,
                None => tracing::warn!(
                    requested = %raw,
                    "Unknown orchestration strategy requested, falling back to scripted"
                ),
            }
        }
        if let Some(raw) = get("MCP_EXECUTION_MODE") {
            config.execution_mode = ExecutionMode::parse(&raw);
        }

        config.gemini.api_key = get("GEMINI_API_KEY");
        if let Some(model) = get("GEMINI_MODEL_ID") {
            config.gemini.model_id = model;
        }
        if let Some(base) = get("GEMINI_API_BASE") {
            config.gemini.api_base = base;
        }

        if let Some(executable) = get("MCP_GITHUB_EXECUTABLE") {
            config.github.executable = executable;
        }
        if let Some(server) = get("MCP_GITHUB_SERVER") {
            config.github.server = server;
        }
        config.github.token = get("MCP_GITHUB_TOKEN");
        config.github.toolsets = get("MCP_GITHUB_TOOLSETS");
        config.github.repo_owner = get("MCP_GITHUB_REPO_OWNER");

        if let Some(raw) = get("JOB_RETENTION_SECS") {
            match raw.parse::<u64>() {
                Ok(0) => config.job_retention = None,
                Ok(secs) => config.job_retention = Some(Duration::from_secs(secs)),
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid JOB_RETENTION_SECS"),
            }
        }

        config
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_gemini_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.gemini.api_key = Some(api_key.into());
        self
    }

    pub fn with_github(mut self, github: GithubAdapterConfig) -> Self {
        self.github = github;
        self
    }

    pub fn with_job_retention(mut self, retention: Option<Duration>) -> Self {
        self.job_retention = retention;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[]));

        assert_eq!(config.strategy, StrategyKind::Scripted);
        assert_eq!(config.execution_mode, ExecutionMode::DryRun);
        assert_eq!(config.gemini.model_id, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.github.executable, "npx");
        assert_eq!(config.job_retention, Some(DEFAULT_JOB_RETENTION));
        assert!(config.github.token.is_none());
    }

    #[test]
    fn test_reads_environment_names() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("ORCHESTRATION_STRATEGY", "Gemini"),
            ("GEMINI_API_KEY", "key-123"),
            ("MCP_EXECUTION_MODE", "live"),
            ("MCP_GITHUB_TOKEN", "ghp_x"),
            ("MCP_GITHUB_TOOLSETS", " repos "),
            ("JOB_RETENTION_SECS", "60"),
        ]));

        assert_eq!(config.strategy, StrategyKind::Planned);
        assert_eq!(config.gemini.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.execution_mode, ExecutionMode::Live);
        assert_eq!(config.github.token.as_deref(), Some("ghp_x"));
        assert_eq!(config.github.toolsets.as_deref(), Some("repos"));
        assert_eq!(config.job_retention, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_blank_and_unknown_values() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("ORCHESTRATION_STRATEGY", "quantum"),
            ("GEMINI_API_KEY", "   "),
            ("MCP_EXECUTION_MODE", "sometimes"),
            ("JOB_RETENTION_SECS", "0"),
        ]));

        assert_eq!(config.strategy, StrategyKind::Scripted);
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.execution_mode, ExecutionMode::DryRun);
        assert_eq!(config.job_retention, None);
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(StrategyKind::parse("simulated"), Some(StrategyKind::Scripted));
        assert_eq!(StrategyKind::parse("planned"), Some(StrategyKind::Planned));
        assert_eq!(StrategyKind::parse(""), None);
        assert_eq!(ExecutionMode::Live.to_string(), "live");
    }
}
