use std::sync::OnceLock;

use async_trait::async_trait;
use mcp::{CallToolResult, InitializeParams, StdioTransport, TransportOptions};
use regex::Regex;
use serde_json::{json, Value};
use stackforge_core::{Command, CommandResult};
use tokio::time::Instant;

use super::McpAdapter;
use crate::config::GithubAdapterConfig;
use crate::error::{OrchestratorError, Result};
use crate::executor::ExecutorOptions;

const SERVICE: &str = "GitHub";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_COMMIT_MESSAGE: &str = "Automated commit from MCP orchestrator";

static NAME_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
static SLUG_SEPARATOR: OnceLock<Option<Regex>> = OnceLock::new();

type ArgMapper = fn(&Command, &GithubAdapterConfig) -> Result<Value>;

/// One row of the action table: which tool to call and how to build its arguments.
struct ToolMapping {
    tool: &'static str,
    map_args: ArgMapper,
}

fn tool_for(action: &str) -> Option<ToolMapping> {
    match action {
        "Create GitHub Repository" => Some(ToolMapping {
            tool: "create_repository",
            map_args: create_repository_args,
        }),
        "Push to GitHub" => Some(ToolMapping {
            tool: "push_files",
            map_args: push_files_args,
        }),
        _ => None,
    }
}

fn create_repository_args(command: &Command, _config: &GithubAdapterConfig) -> Result<Value> {
    Ok(json!({
        "name": extract_repo_name(command)?,
        "description": command.arg_str("description"),
        "private": command.arg_bool("private").unwrap_or(false),
        "autoInit": command.arg_bool("autoInit").unwrap_or(false),
    }))
}

fn push_files_args(command: &Command, config: &GithubAdapterConfig) -> Result<Value> {
    let repo = match command.arg_str("repo") {
        Some(repo) => repo.to_string(),
        None => extract_repo_name(command)?,
    };
    let files = command
        .args
        .get("files")
        .filter(|files| files.is_array())
        .cloned()
        .unwrap_or_else(|| json!([]));

    Ok(json!({
        "owner": config.repo_owner,
        "repo": repo,
        "branch": command.arg_str("branch").unwrap_or(DEFAULT_BRANCH),
        "message": command.arg_str("message").unwrap_or(DEFAULT_COMMIT_MESSAGE),
        "files": files,
    }))
}

/// `name`, then `repo`, then the first word-ish token of `details`, then `title`
/// as a slug.
fn extract_repo_name(command: &Command) -> Result<String> {
    if let Some(name) = command.arg_str("name") {
        return Ok(name.to_string());
    }
    if let Some(repo) = command.arg_str("repo") {
        return Ok(repo.to_string());
    }
    if let Some(details) = command.arg_str("details") {
        let token = NAME_TOKEN.get_or_init(|| Regex::new(r"[A-Za-z0-9_-]+").ok());
        if let Some(found) = token.as_ref().and_then(|re| re.find(details)) {
            return Ok(found.as_str().to_string());
        }
    }
    if let Some(title) = command.arg_str("title") {
        let slug = slugify(title);
        if !slug.is_empty() {
            return Ok(slug);
        }
    }
    Err(OrchestratorError::Validation(
        "Unable to determine repository name for GitHub command.".to_string(),
    ))
}

fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    match SLUG_SEPARATOR.get_or_init(|| Regex::new(r"[^a-z0-9-]+").ok()) {
        Some(re) => re.replace_all(&lowered, "-").into_owned(),
        None => lowered,
    }
}

/// Drives the GitHub MCP server over stdio, one subprocess per command.
pub struct GithubAdapter {
    config: GithubAdapterConfig,
}

impl GithubAdapter {
    pub fn new(config: GithubAdapterConfig) -> Self {
        Self { config }
    }

    fn transport_options(&self, token: &str) -> TransportOptions {
        let mut args = Vec::new();
        if self.config.executable == "npx" {
            args.push("--yes".to_string());
        }
        args.push(self.config.server.clone());
        args.push("--stdio".to_string());
        if let Some(toolsets) = &self.config.toolsets {
            args.push("--toolsets".to_string());
            args.push(toolsets.clone());
        }

        let mut options = TransportOptions::new(&self.config.executable)
            .with_args(args)
            .with_env("MCP_GITHUB_TOKEN", token)
            .with_env("GITHUB_PERSONAL_ACCESS_TOKEN", token)
            .with_timeout(self.config.timeout);
        if let Some(owner) = &self.config.repo_owner {
            options = options.with_env("MCP_GITHUB_REPO_OWNER", owner);
        }
        options
    }

    async fn call_tool(
        &self,
        transport: &StdioTransport,
        tool: &str,
        arguments: Value,
        job_id: &str,
    ) -> Result<CallToolResult> {
        transport.open().await?;
        transport.initialize(&InitializeParams::default()).await?;
        transport.list_tools().await?;

        tracing::info!(job_id, tool, args = %arguments, "Calling GitHub MCP tool");
        Ok(transport.call_tool(tool, arguments).await?)
    }
}

#[async_trait]
impl McpAdapter for GithubAdapter {
    fn id(&self) -> &str {
        "github"
    }

    fn supports(&self, command: &Command) -> bool {
        command.service == SERVICE && tool_for(&command.action).is_some()
    }

    async fn execute(&self, command: &Command, options: &ExecutorOptions) -> Result<CommandResult> {
        let Some(mapping) = tool_for(&command.action) else {
            return Err(OrchestratorError::unsupported(SERVICE, &command.action));
        };
        let Some(token) = self.config.token.as_deref() else {
            return Ok(CommandResult::failure("MCP_GITHUB_TOKEN is not configured.", 0));
        };

        let started = Instant::now();
        let arguments = (mapping.map_args)(command, &self.config)?;
        let transport = StdioTransport::new(self.transport_options(token));
        let job_id = options.job_id.as_deref().unwrap_or("-");

        let outcome = self
            .call_tool(&transport, mapping.tool, arguments, job_id)
            .await;
        transport.close().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) if result.is_error => CommandResult::failure(
                format!("GitHub MCP tool \"{}\" reported an error.", mapping.tool),
                duration_ms,
            )
            .with_metadata("response", serde_json::to_value(&result)?),
            Ok(result) => {
                let content = result.content.unwrap_or_else(|| json!({}));
                CommandResult::success(content.to_string(), duration_ms)
            }
            Err(e) => CommandResult::failure(e.to_string(), duration_ms),
        };
        Ok(result)
    }
}
