//! CLI Tooling
//!
//! Command-line interface over the runtime: validate and inspect descriptors,
//! preview trigger matches and plans, and run invocation lines offline with
//! the dry-run model.

use crate::config::{ConfigLoader, RuntimeConfig};
use crate::error::RuntimeError;
use crate::logging::LoggingConfig;
use crate::model::{DryRunModel, NoopToolHost};
use crate::registry::{LoadReport, Registry};
use crate::runtime::{Outcome, Runtime};
use crate::tooling::format::{
    format_agent_result, format_command_report, format_component_table, format_descriptor_detail,
    format_event_report, format_load_report, format_match, format_plan,
};
use crate::tooling::watch::{WatchConfig, WatchDaemon};
use crate::trigger::{TriggerEvent, TriggerMatcher};
use crate::types::Tier;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// skillgraph - tiered skill, agent and command runtime
#[derive(Parser)]
#[command(name = "skillgraph")]
#[command(about = "Load, inspect and run tiered skills, agents and commands")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (replaces the global and workspace files)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the `[logging]` table.
    pub fn apply_logging_overrides(&self, logging: &mut LoggingConfig) {
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            logging.file = Some(file.clone());
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load every descriptor and report validation errors and warnings
    Validate {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List registered components
    List {
        /// Only this tier (skill, agent, command)
        #[arg(long)]
        tier: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show one component
    Show {
        name: String,
        /// Tier to look in when a name exists in several
        #[arg(long)]
        tier: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show which skills an event would dispatch
    Match {
        /// A saved file
        #[arg(long, conflicts_with_all = ["text", "commit", "message"])]
        file: Option<PathBuf>,
        /// Conversation text
        #[arg(long, conflicts_with_all = ["commit", "message"])]
        text: Option<String>,
        /// Files in a commit
        #[arg(long, num_args = 1..)]
        commit: Vec<PathBuf>,
        /// Commit message
        #[arg(long)]
        message: Option<String>,
        /// Also run the matched skills with the dry-run model
        #[arg(long)]
        run: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Describe what an invocation line would run, without running it
    Plan {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// `/command --flag value ...` or `@agent text`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },
    /// Run an invocation line with the dry-run model
    Run {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// `/command --flag value ...` or `@agent text`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        line: Vec<String>,
    },
    /// Watch the workspace and dispatch skills for saved files
    Watch {
        /// Debounce window in milliseconds
        #[arg(long, default_value = "100")]
        debounce_ms: u64,
        /// Batch window in milliseconds
        #[arg(long, default_value = "50")]
        batch_window_ms: u64,
    },
}

/// CLI context: loaded configuration plus the registry built from it
pub struct CliContext {
    workspace_root: PathBuf,
    config: RuntimeConfig,
    registry: Arc<Registry>,
    load_report: LoadReport,
}

impl CliContext {
    /// Load configuration for `workspace_root`, from `config_path` when given.
    pub fn load_config(
        workspace_root: &Path,
        config_path: Option<&Path>,
    ) -> Result<RuntimeConfig, RuntimeError> {
        let root = workspace_root
            .canonicalize()
            .unwrap_or_else(|_| workspace_root.to_path_buf());
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path, &root)?,
            None => ConfigLoader::load(&root)?,
        };
        Ok(config)
    }

    /// Build the registry from an already-loaded configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let (registry, load_report) = Registry::load(&config);
        Self {
            workspace_root: config.registry.workspace_root.clone(),
            config,
            registry: Arc::new(registry),
            load_report,
        }
    }

    /// Create a CLI context
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Result<Self, RuntimeError> {
        let config = Self::load_config(&workspace_root, config_path.as_deref())?;
        Ok(Self::with_config(config))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, RuntimeError> {
        match command {
            Commands::Validate { format } => self.handle_validate(format),
            Commands::List { tier, format } => {
                let tier = tier.as_deref().map(parse_tier).transpose()?;
                let snapshot = self.registry.snapshot();
                if format == "json" {
                    let items: Vec<_> = snapshot
                        .iter()
                        .filter(|d| tier.map_or(true, |t| d.tier() == t))
                        .map(|d| d.as_ref())
                        .collect();
                    return to_json(&items);
                }
                Ok(format_component_table(&snapshot, tier))
            }
            Commands::Show { name, tier, format } => {
                let tier = tier.as_deref().map(parse_tier).transpose()?;
                let snapshot = self.registry.snapshot();
                let found = match tier {
                    Some(tier) => snapshot.get(tier, name),
                    None => snapshot.resolve(name, None),
                };
                let descriptor = found.ok_or_else(|| {
                    RuntimeError::InvalidInvocation(format!("no component named '{}'", name))
                })?;
                if format == "json" {
                    return to_json(descriptor.as_ref());
                }
                Ok(format_descriptor_detail(descriptor))
            }
            Commands::Match {
                file,
                text,
                commit,
                message,
                run,
                format,
            } => {
                let event = build_event(file.as_ref(), text.as_ref(), commit, message.as_ref())?;
                self.handle_match(event, *run, format)
            }
            Commands::Plan { format, line } => {
                let line = join_line(line);
                let plan = self.block_on(|runtime| async move { runtime.plan(&line) })??;
                if format == "json" {
                    return to_json(&plan);
                }
                Ok(format_plan(&plan))
            }
            Commands::Run { format, line } => {
                let line = join_line(line);
                let outcome =
                    self.block_on(|runtime| async move { runtime.execute_line(&line).await })??;
                if format == "json" {
                    return to_json(&outcome);
                }
                Ok(match &outcome {
                    Outcome::Agent(result) => format_agent_result(result),
                    Outcome::Command(report) => format_command_report(report),
                })
            }
            Commands::Watch {
                debounce_ms,
                batch_window_ms,
            } => self.handle_watch(*debounce_ms, *batch_window_ms),
        }
    }

    fn handle_validate(&self, format: &str) -> Result<String, RuntimeError> {
        let rendered = if format == "json" {
            to_json(&self.load_report)?
        } else {
            format_load_report(&self.load_report)
        };
        if self.load_report.is_clean() {
            Ok(rendered)
        } else {
            Err(RuntimeError::ConfigError(format!(
                "{} descriptor(s) failed validation\n{}",
                self.load_report.errors.len(),
                rendered
            )))
        }
    }

    fn handle_match(
        &self,
        event: TriggerEvent,
        run: bool,
        format: &str,
    ) -> Result<String, RuntimeError> {
        if run {
            let report = self.block_on(|runtime| async move {
                let pending = runtime.on_event(event).await?;
                Ok::<_, RuntimeError>(pending.wait().await)
            })??;
            if format == "json" {
                return to_json(&report);
            }
            return Ok(format_event_report(&report));
        }

        let snapshot = self.registry.snapshot();
        let matched = TriggerMatcher::new(Some(self.workspace_root.clone()))
            .match_event(&snapshot, &event);
        if format == "json" {
            let names: Vec<&str> = matched.iter().map(|d| d.name.as_str()).collect();
            return to_json(&names);
        }
        Ok(format_match(&matched))
    }

    fn handle_watch(&self, debounce_ms: u64, batch_window_ms: u64) -> Result<String, RuntimeError> {
        let rt = build_tokio_runtime()?;
        let runtime = {
            let _guard = rt.enter();
            Arc::new(self.offline_runtime())
        };
        let daemon = WatchDaemon::new(
            Arc::clone(&runtime),
            WatchConfig {
                workspace_root: self.workspace_root.clone(),
                debounce_ms,
                batch_window_ms,
                ..WatchConfig::default()
            },
        );

        info!(workspace = %self.workspace_root.display(), "Starting watch mode");
        let result = daemon.start(rt.handle(), |report| {
            println!("{}", format_event_report(report));
        });
        rt.block_on(runtime.shutdown());
        result?;
        Ok("Watch stopped".to_string())
    }

    /// Runtime backed by the dry-run model and a no-op tool host.
    fn offline_runtime(&self) -> Runtime {
        Runtime::new(
            Arc::clone(&self.registry),
            Arc::new(DryRunModel),
            Arc::new(NoopToolHost),
            self.config.clone(),
        )
    }

    /// Run `f` against a fresh offline runtime on a fresh Tokio runtime.
    fn block_on<F, Fut, T>(&self, f: F) -> Result<T, RuntimeError>
    where
        F: FnOnce(Arc<Runtime>) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let rt = build_tokio_runtime()?;
        Ok(rt.block_on(async {
            let runtime = Arc::new(self.offline_runtime());
            let output = f(Arc::clone(&runtime)).await;
            runtime.shutdown().await;
            output
        }))
    }
}

fn build_tokio_runtime() -> Result<tokio::runtime::Runtime, RuntimeError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RuntimeError::Io)
}

fn parse_tier(value: &str) -> Result<Tier, RuntimeError> {
    Tier::parse(value).ok_or_else(|| {
        RuntimeError::InvalidInvocation(format!(
            "unknown tier '{}' (expected skill, agent or command)",
            value
        ))
    })
}

fn build_event(
    file: Option<&PathBuf>,
    text: Option<&String>,
    commit: &[PathBuf],
    message: Option<&String>,
) -> Result<TriggerEvent, RuntimeError> {
    if let Some(path) = file {
        return Ok(TriggerEvent::FileSaved { path: path.clone() });
    }
    if let Some(text) = text {
        return Ok(TriggerEvent::ConversationText { text: text.clone() });
    }
    if !commit.is_empty() || message.is_some() {
        return Ok(TriggerEvent::Commit {
            paths: commit.to_vec(),
            message: message.cloned().unwrap_or_default(),
        });
    }
    Err(RuntimeError::InvalidInvocation(
        "one of --file, --text, --commit or --message is required".to_string(),
    ))
}

/// Rebuild an invocation line from shell words, re-quoting words that
/// contain whitespace or quotes.
pub fn join_line(words: &[String]) -> String {
    words
        .iter()
        .map(|word| {
            let needs_quotes =
                word.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'');
            if word.is_empty() || needs_quotes {
                format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RuntimeError> {
    serde_json::to_string_pretty(value).map_err(|e| RuntimeError::Parse(e.to_string()))
}
