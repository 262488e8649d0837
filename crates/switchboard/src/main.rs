//! switchboard - submit one request to the orchestration core
//!
//! ```bash
//! switchboard "should we migrate the budget spreadsheet to a database?" \
//!     --context session=alice --context requires_decision=true
//! switchboard --print-default-config > switchboard.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use coordination::{JsonlAuditSink, Orchestrator, OrchestratorConfig, Request, TemplateHandler};
use serde_json::Value;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Request text
    #[arg(required_unless_present = "print_default_config")]
    content: Option<String>,

    /// TOML configuration file; SWITCHBOARD_* variables override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Context hint as key=value; values are parsed as JSON, else kept as strings
    #[arg(long = "context", value_parser = parse_context)]
    context: Vec<(String, Value)>,

    /// Append performance records and decisions to this JSONL file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Print the default configuration as TOML and exit
    #[arg(long, default_value_t = false)]
    print_default_config: bool,
}

#[derive(Debug, thiserror::Error)]
enum ContextArgError {
    #[error("expected key=value, got '{0}'")]
    MissingSeparator(String),

    #[error("context key is empty in '{0}'")]
    EmptyKey(String),
}

fn parse_context(raw: &str) -> Result<(String, Value), ContextArgError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ContextArgError::MissingSeparator(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ContextArgError::EmptyKey(raw.to_string()));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        let rendered = toml::to_string_pretty(&OrchestratorConfig::default())
            .context("failed to render default config")?;
        print!("{rendered}");
        return Ok(());
    }

    init_tracing(args.json_logs);

    let config = OrchestratorConfig::resolve(args.config.as_deref())
        .context("failed to load configuration")?;

    let mut builder = Orchestrator::builder().config(config);
    for handler in TemplateHandler::default_roster() {
        builder = builder.handler(handler);
    }
    if let Some(path) = &args.audit_log {
        let sink = JsonlAuditSink::open(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        builder = builder.audit_sink(Arc::new(sink));
    }
    let orchestrator = builder.build().context("invalid configuration")?;

    let content = args.content.unwrap_or_default();
    let mut request = Request::new(content);
    for (key, value) in args.context {
        request = request.with_context(key, value);
    }

    let response = orchestrator.submit(request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Some(stats) = orchestrator.shutdown().await {
        info!(
            applied = stats.applied,
            ignored = stats.ignored,
            publications = stats.publications,
            "feedback loop stopped"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_context_json_and_string() {
        assert_eq!(
            parse_context("requires_decision=true").unwrap(),
            ("requires_decision".to_string(), json!(true))
        );
        assert_eq!(
            parse_context("recent_errors=3").unwrap(),
            ("recent_errors".to_string(), json!(3))
        );
        assert_eq!(
            parse_context("session=alice").unwrap(),
            ("session".to_string(), json!("alice"))
        );
    }

    #[test]
    fn test_parse_context_rejects_malformed() {
        assert!(matches!(
            parse_context("session"),
            Err(ContextArgError::MissingSeparator(_))
        ));
        assert!(matches!(parse_context("=x"), Err(ContextArgError::EmptyKey(_))));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "switchboard",
            "--context",
            "mood=tired",
            "plan my week",
        ])
        .unwrap();
        assert_eq!(args.content.as_deref(), Some("plan my week"));
        assert_eq!(args.context.len(), 1);
        assert!(Args::try_parse_from(["switchboard"]).is_err());
        assert!(Args::try_parse_from(["switchboard", "--print-default-config"]).is_ok());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let rendered = toml::to_string_pretty(&OrchestratorConfig::default()).unwrap();
        let parsed: OrchestratorConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, OrchestratorConfig::default());
    }
}
