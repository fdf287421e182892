mod config;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use nodeflow_engine::{Engine, EndpointOutcome, EvaluationContext, Principal, TypeRegistry};
use nodeflow_types::{ActionResult, Model};
use nodeflow_util::{expand_tilde, http::HttpClientPool, redact_sensitive};

use crate::config::RuntimeConfig;

#[derive(Debug, Parser)]
#[command(name = "nodeflow", version, about = "Run nodeflow models from the command line")]
struct Cli {
    /// Configuration file (JSON or YAML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Model file; overrides `model_path` from the configuration.
    #[arg(long, short, global = true)]
    model: Option<PathBuf>,
    /// Named environment from the model's environment table.
    #[arg(long, short, global = true)]
    environment: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run an action chain starting at a node id.
    Run {
        node: String,
        #[command(flatten)]
        input: InvocationInput,
    },
    /// Invoke a controller or graph endpoint by id.
    Invoke {
        endpoint: String,
        /// HTTP verb for controllers; ignored by graphs.
        #[arg(long, default_value = "get")]
        method: String,
        #[command(flatten)]
        input: InvocationInput,
    },
    /// Route a request path to a controller and invoke it.
    Request {
        method: String,
        path: String,
        #[command(flatten)]
        input: InvocationInput,
    },
    /// Print the registered types and entities as JSON.
    Schema,
    /// List registered entity names.
    Entities,
}

#[derive(Debug, Args)]
struct InvocationInput {
    /// Initial context as a JSON object, or `@file` to read it from a file.
    #[arg(long)]
    context: Option<String>,
    /// Caller claim as `type=value`; repeatable. No claims means anonymous.
    #[arg(long = "claim")]
    claims: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::load(cli.config.as_deref())?;
    init_tracing(config.log_filter.as_deref());
    debug!(?config, "loaded runtime configuration");

    // The interpreter blocks on outbound calls; keep it off the async workers.
    tokio::task::spawn_blocking(move || execute(cli, config))
        .await
        .context("command task failed")?
}

fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn execute(cli: Cli, config: RuntimeConfig) -> Result<()> {
    let mut builder = TypeRegistry::builder().with_builtins();
    config.register_stores(&mut builder)?;
    let registry = Arc::new(builder.build());

    match cli.command {
        Command::Schema => return print_json(&registry.describe()),
        Command::Entities => {
            for name in registry.list_entity_names() {
                println!("{name}");
            }
            return Ok(());
        }
        _ => {}
    }

    let model_path = cli
        .model
        .or(config.model_path.clone())
        .context("no model given; pass --model or set model_path in the configuration")?;
    let mut model = load_model(&model_path)?;
    let environment = cli.environment.unwrap_or(config.environment.clone());
    if !model.environments().environments().is_empty() && !model.set_environment(&environment) {
        bail!("model {} has no environment named '{environment}'", model_path.display());
    }
    info!(model = %model_path.display(), nodes = model.len(), environment = %model.active_environment(), "model loaded");

    let pool = Arc::new(HttpClientPool::new(Duration::from_secs(config.http_timeout_secs)));
    let engine = Engine::new(registry, Arc::new(model)).with_http_pool(pool);

    match cli.command {
        Command::Run { node, input } => {
            let mut context = input.context()?;
            let result = engine.run(&node, &mut context);
            print_result(&result, &context)
        }
        Command::Invoke { endpoint, method, input } => {
            let mut context = input.context()?;
            let outcome = engine.invoke_endpoint(&endpoint, &method, &input.principal()?, &mut context);
            print_outcome(&outcome, &context)
        }
        Command::Request { method, path, input } => {
            let mut context = input.context()?;
            let outcome = engine.handle_request(&method, &path, &input.principal()?, &mut context);
            print_outcome(&outcome, &context)
        }
        Command::Schema | Command::Entities => Ok(()),
    }
}

impl InvocationInput {
    fn context(&self) -> Result<EvaluationContext> {
        let Some(raw) = self.context.as_deref() else {
            return Ok(EvaluationContext::new());
        };
        let text = match raw.strip_prefix('@') {
            Some(path) => {
                let path = expand_tilde(path);
                std::fs::read_to_string(&path).with_context(|| format!("reading context file {}", path.display()))?
            }
            None => raw.to_string(),
        };
        match serde_json::from_str::<Value>(&text).context("parsing context JSON")? {
            Value::Object(map) => Ok(EvaluationContext::from_map(map)),
            other => bail!("context must be a JSON object, got {other}"),
        }
    }

    fn principal(&self) -> Result<Principal> {
        if self.claims.is_empty() {
            return Ok(Principal::anonymous());
        }
        let pairs = self
            .claims
            .iter()
            .map(|claim| {
                claim
                    .split_once('=')
                    .map(|(kind, value)| (kind.trim().to_string(), value.trim().to_string()))
                    .with_context(|| format!("claim '{}' is not of the form type=value", redact_sensitive(claim)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Principal::from_claims(pairs))
    }
}

fn load_model(path: &Path) -> Result<Model> {
    let path = expand_tilde(&path.to_string_lossy());
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading model {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| matches!(extension, "yaml" | "yml"));
    let document: Value = if is_yaml {
        serde_yaml::from_str(&text).with_context(|| format!("parsing model {}", path.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("parsing model {}", path.display()))?
    };
    Model::from_value(&document).with_context(|| format!("loading model {}", path.display()))
}

fn print_result(result: &ActionResult, context: &EvaluationContext) -> Result<()> {
    let state = context.state().cloned().unwrap_or_else(Map::new);
    print_json(&json!({
        "success": result.success,
        "returnData": result.return_data,
        "state": state,
    }))
}

fn print_outcome(outcome: &EndpointOutcome, context: &EvaluationContext) -> Result<()> {
    let status = outcome.status_code();
    match outcome {
        EndpointOutcome::Completed(result) => {
            let state = context.state().cloned().unwrap_or_else(Map::new);
            print_json(&json!({
                "status": status,
                "success": result.success,
                "returnData": result.return_data,
                "state": state,
            }))
        }
        EndpointOutcome::NotFound | EndpointOutcome::Unauthorized => print_json(&json!({ "status": status })),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(context: Option<&str>, claims: &[&str]) -> InvocationInput {
        InvocationInput {
            context: context.map(str::to_string),
            claims: claims.iter().map(|claim| claim.to_string()).collect(),
        }
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nodeflow", "run", "greet", "--model", "model.json", "-e", "Dev"]).expect("parse");
        assert_eq!(cli.model, Some(PathBuf::from("model.json")));
        assert_eq!(cli.environment.as_deref(), Some("Dev"));
        assert!(matches!(cli.command, Command::Run { ref node, .. } if node == "greet"));
    }

    #[test]
    fn test_context_accepts_inline_json_objects_only() {
        let context = input(Some(r#"{"query": {"name": "Ada"}}"#), &[]).context().expect("context");
        assert_eq!(context.value("query"), Some(&json!({"name": "Ada"})));
        assert!(input(Some("[1, 2]"), &[]).context().is_err());
        assert!(input(None, &[]).context().expect("empty").keys().next().is_none());
    }

    #[test]
    fn test_context_reads_file_reference() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("context.json");
        std::fs::write(&path, r#"{"body": {"title": "Hello"}}"#).expect("write context");
        let reference = format!("@{}", path.display());
        let context = input(Some(&reference), &[]).context().expect("context");
        assert_eq!(context.value("body"), Some(&json!({"title": "Hello"})));
    }

    #[test]
    fn test_claims_build_principal() {
        assert_eq!(input(None, &[]).principal().expect("anonymous"), Principal::anonymous());

        let principal = input(None, &["sub=ada", "role=editor", "role=admin"]).principal().expect("principal");
        assert!(principal.authenticated);
        assert_eq!(principal.roles, vec!["editor", "admin"]);
        assert_eq!(principal.claims.get("role"), Some(&json!("editor,admin")));

        assert!(input(None, &["no-separator"]).principal().is_err());
    }

    #[test]
    fn test_load_model_reads_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.yaml");
        std::fs::write(
            &path,
            "actions:\n  - _id: greet\n    _type: JsonAction\n    properties:\n      json: hi\n",
        )
        .expect("write model");
        let model = load_model(&path).expect("model");
        assert!(model.action("greet").is_some());
    }
}
