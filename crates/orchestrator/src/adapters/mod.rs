//! Routing from abstract commands to concrete service integrations

mod github;

use std::sync::Arc;

use async_trait::async_trait;
use stackforge_core::{Command, CommandResult};

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::executor::ExecutorOptions;

pub use github::GithubAdapter;

/// Translates a [`Command`] into calls against one external service.
#[async_trait]
pub trait McpAdapter: Send + Sync {
    fn id(&self) -> &str;

    fn supports(&self, command: &Command) -> bool;

    async fn execute(&self, command: &Command, options: &ExecutorOptions) -> Result<CommandResult>;
}

/// Ordered adapter list. The first adapter whose `supports` matches wins.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn McpAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new().with_adapter(Arc::new(GithubAdapter::new(config.github.clone())))
    }

    pub fn register(&mut self, adapter: Arc<dyn McpAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn McpAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn find_adapter(&self, command: &Command) -> Option<&Arc<dyn McpAdapter>> {
        self.adapters.iter().find(|adapter| adapter.supports(command))
    }

    pub fn adapter_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.id()).collect()
    }

    /// Run through the matching adapter. With no match the command counts as
    /// done: a missing integration never blocks the pipeline.
    pub async fn execute_with_adapter(
        &self,
        command: &Command,
        options: &ExecutorOptions,
    ) -> Result<CommandResult> {
        let Some(adapter) = self.find_adapter(command) else {
            tracing::warn!(
                job_id = options.job_id.as_deref().unwrap_or("-"),
                service = %command.service,
                action = %command.action,
                "No MCP adapter found for command, returning success"
            );
            return Ok(CommandResult::success(
                format!("No adapter registered for {}.", command.service),
                0,
            )
            .with_metadata("simulated", true));
        };

        tracing::debug!(adapter = adapter.id(), action = %command.action, "Dispatching to adapter");
        adapter.execute(command, options).await
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapter_ids())
            .finish()
    }
}
