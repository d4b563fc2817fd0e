//! Single entry point for running a step's side effect.
//!
//! [`CommandExecutor::execute`] never returns an error: adapter failures,
//! transport failures, panics and cancellation all come back as a failed
//! [`CommandResult`] with the elapsed time.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use rand::Rng;
use stackforge_core::{Command, CommandResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::AdapterRegistry;
use crate::config::ExecutionMode;

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub job_id: Option<String>,
    /// Fail this call after the failure delay without touching any adapter.
    pub simulate_failure: bool,
    pub cancel: Option<CancellationToken>,
}

impl ExecutorOptions {
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Default::default()
        }
    }

    pub fn with_simulated_failure(mut self, simulate: bool) -> Self {
        self.simulate_failure = simulate;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Latency ranges (milliseconds) for simulated commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub success_delay_ms: RangeInclusive<u64>,
    pub failure_delay_ms: RangeInclusive<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_delay_ms: 400..=900,
            failure_delay_ms: 900..=1600,
        }
    }
}

impl SimulationConfig {
    pub fn instant() -> Self {
        Self {
            success_delay_ms: 0..=0,
            failure_delay_ms: 0..=0,
        }
    }
}

pub struct CommandExecutor {
    mode: ExecutionMode,
    registry: Arc<AdapterRegistry>,
    simulation: SimulationConfig,
    forced_failures: HashSet<String>,
}

impl CommandExecutor {
    pub fn new(mode: ExecutionMode, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            mode,
            registry,
            simulation: SimulationConfig::default(),
            forced_failures: HashSet::new(),
        }
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    /// Always fail commands whose action equals `action`.
    pub fn with_forced_failure(mut self, action: impl Into<String>) -> Self {
        self.forced_failures.insert(action.into());
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn execute(&self, command: &Command, options: &ExecutorOptions) -> CommandResult {
        let started = Instant::now();
        let job_id = options.job_id.as_deref().unwrap_or("-");

        info!(
            job_id,
            service = %command.service,
            action = %command.action,
            mode = %self.mode,
            "Executing MCP command"
        );

        if options.is_cancelled() {
            return self.aborted(command, job_id, started);
        }

        let forced = options.simulate_failure || self.forced_failures.contains(&command.action);
        let outcome = if forced || self.mode == ExecutionMode::DryRun {
            self.simulate(command, forced, options).await
        } else {
            self.dispatch(command, options).await
        };

        let Some(result) = outcome else {
            return self.aborted(command, job_id, started);
        };

        if result.success {
            info!(
                job_id,
                service = %command.service,
                action = %command.action,
                duration_ms = result.duration_ms,
                "MCP command succeeded"
            );
        } else {
            warn!(
                job_id,
                service = %command.service,
                action = %command.action,
                error = result.error.as_deref().unwrap_or_default(),
                duration_ms = result.duration_ms,
                "MCP command failed"
            );
        }
        result
    }

    /// `None` when cancelled during the delay.
    async fn simulate(
        &self,
        command: &Command,
        fail: bool,
        options: &ExecutorOptions,
    ) -> Option<CommandResult> {
        let started = Instant::now();
        let range = if fail {
            &self.simulation.failure_delay_ms
        } else {
            &self.simulation.success_delay_ms
        };
        let delay = pick_delay(range);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancelled(options.cancel.as_ref()) => return None,
        }

        let duration_ms = elapsed_ms(started);
        let result = if fail {
            CommandResult::failure(
                format!(
                    "Simulated failure executing {} via {}",
                    command.action, command.service
                ),
                duration_ms,
            )
            .with_metadata("simulated", true)
        } else {
            CommandResult::success(
                format!("Executed {} through {}", command.action, command.service),
                duration_ms,
            )
        };
        Some(result.with_metadata("mode", self.mode.as_str()))
    }

    async fn dispatch(&self, command: &Command, options: &ExecutorOptions) -> Option<CommandResult> {
        let started = Instant::now();
        let call = AssertUnwindSafe(self.registry.execute_with_adapter(command, options)).catch_unwind();

        let outcome = tokio::select! {
            outcome = call => outcome,
            _ = cancelled(options.cancel.as_ref()) => return None,
        };

        let result = match outcome {
            Ok(Ok(mut result)) => {
                if result.duration_ms == 0 {
                    result.duration_ms = elapsed_ms(started);
                }
                result
            }
            Ok(Err(e)) => CommandResult::failure(e.to_string(), elapsed_ms(started)),
            Err(panic) => CommandResult::failure(
                format!("Adapter panicked: {}", panic_message(panic.as_ref())),
                elapsed_ms(started),
            ),
        };
        Some(result.with_metadata("mode", self.mode.as_str()))
    }

    fn aborted(&self, command: &Command, job_id: &str, started: Instant) -> CommandResult {
        warn!(
            job_id,
            service = %command.service,
            action = %command.action,
            "MCP command aborted"
        );
        CommandResult::failure("Command aborted", elapsed_ms(started))
            .with_metadata("mode", self.mode.as_str())
            .with_metadata("aborted", true)
    }
}

fn pick_delay(range: &RangeInclusive<u64>) -> Duration {
    if range.is_empty() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(range.clone()))
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
