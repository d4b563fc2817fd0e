//! Job orchestration: strategies that turn a description into steps, the
//! executor that runs each step's command, and the engine that supervises
//! whole jobs.

pub mod adapters;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod planner;
pub mod prompts;
pub mod state_machine;
pub mod strategies;

pub use adapters::{AdapterRegistry, GithubAdapter, McpAdapter};
pub use config::{ExecutionMode, GeminiConfig, GithubAdapterConfig, OrchestratorConfig, StrategyKind};
pub use context::StrategyContext;
pub use engine::{JobDetails, OrchestrationEngine};
pub use error::{OrchestratorError, Result};
pub use executor::{CommandExecutor, ExecutorOptions, SimulationConfig};
pub use planner::{GeminiPlanner, PlanGenerator, PlannedStep};
pub use state_machine::StepStateMachine;
pub use strategies::{OrchestrationStrategy, PlannedStrategy, RemediationPlan, ScriptedStrategy};
