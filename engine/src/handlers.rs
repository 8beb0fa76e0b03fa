//! Command handlers for CLI operations
//!
//! - serve: run the HTTP API until ctrl-c, then flush live sessions
//! - chat: interactive terminal session for one user
//! - history: print a user's stored exchanges and summary
//! - doctor: validate configuration and check backends

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::api::{self, parse_model, AppState};
use crate::config::Config;
use crate::db::{Database, SnapshotStore};
use crate::llm::{Backend, ConfiguredProviders, ModelGateway};
use crate::secrets::{SecretCache, SecretManager, SERVICE_NAME};
use crate::session::{Coach, SessionRegistry, TurnOutcome};
use sdk::UserIdentity;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a serving or chatting process needs, wired from config
struct Runtime {
    database: Database,
    registry: Arc<SessionRegistry>,
}

async fn build_runtime(config: &Config) -> Result<Runtime> {
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;
    let store: Arc<dyn SnapshotStore> = Arc::new(database.users());

    let secrets = SecretCache::new(Arc::new(SecretManager::new(SERVICE_NAME)));
    let providers = Arc::new(ConfiguredProviders::new(config.llm.clone(), secrets));
    let gateway = Arc::new(ModelGateway::new(
        providers,
        Duration::from_secs(config.llm.request_timeout_secs),
    ));

    let coach = Coach::from_config(config, gateway).context("Invalid model configuration")?;
    let registry = Arc::new(SessionRegistry::new(Arc::new(coach), store));

    Ok(Runtime { database, registry })
}

/// Serve the HTTP API
///
/// On ctrl-c the listener stops accepting, every live session is flushed to
/// the store and the database WAL is checkpointed.
pub async fn handle_serve(bind: Option<String>, config: &Config) -> Result<()> {
    let runtime = build_runtime(config).await?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());

    let app = api::router(
        AppState {
            registry: Arc::clone(&runtime.registry),
        },
        &config.server,
    );

    let listener = tokio::net::TcpListener::bind(bind.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("PT API listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let closed = runtime.registry.close_all().await;
    tracing::info!("Flushed {} live session(s) on shutdown", closed);

    runtime
        .database
        .close()
        .await
        .context("Failed to close database")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Interactive chat in the terminal
///
/// Opens the session, reads one message per line, and closes the session on
/// `exit` or end of input.
pub async fn handle_chat(
    first_name: String,
    last_name: String,
    model: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let identity = UserIdentity::new(first_name, last_name)?;
    let model = parse_model(model.as_deref())?;
    let runtime = build_runtime(config).await?;
    let registry = &runtime.registry;

    let init = registry.open(&identity).await?;
    match format {
        OutputFormat::Text => {
            println!(
                "Session opened for {} ({} previous exchange(s)). Type 'exit' to quit.",
                identity,
                init.messages.len().min(init.responses.len())
            );
            if !init.meal_plan.is_empty() {
                println!();
                println!("Current meal plan:");
                println!("{}", init.meal_plan);
            }
            println!();
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(&init)?),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        if matches!(format, OutputFormat::Text) {
            stdout.write_all(b"you> ").await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") {
            break;
        }

        let reply = registry.chat(&identity, message, model.as_ref()).await?;
        match format {
            OutputFormat::Text => {
                println!("pt> {}", reply.response);
                if reply.plan_revised {
                    println!();
                    println!("Meal plan updated:");
                    println!("{}", reply.meal_plan);
                }
                if reply.outcome == TurnOutcome::Degraded {
                    println!("(the message was not recorded; try again later)");
                }
                println!();
            }
            OutputFormat::Json => {
                let output = json!({
                    "response": reply.response,
                    "meal_plan": reply.meal_plan,
                    "outcome": reply.outcome,
                });
                println!("{}", serde_json::to_string(&output)?);
            }
        }
    }

    let report = registry.close(&identity).await?;
    match format {
        OutputFormat::Text => println!("{}", report.message),
        OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
    }

    runtime
        .database
        .close()
        .await
        .context("Failed to close database")?;
    Ok(())
}

/// Show a user's stored exchanges and summary
pub async fn handle_history(
    first_name: String,
    last_name: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let identity = UserIdentity::new(first_name, last_name)?;
    let database = Database::new(&config.database_path())
        .await
        .context("Failed to open database")?;

    let snapshot = database
        .users()
        .load(&identity)
        .await
        .context("Failed to fetch conversation history")?;
    let Some(snapshot) = snapshot else {
        anyhow::bail!("No stored conversation for {}", identity);
    };
    let history = crate::session::History::from_snapshot(&snapshot, limit);

    match format {
        OutputFormat::Text => {
            if history.history.is_empty() {
                println!("No exchanges stored for {}", identity);
            } else {
                println!("History for {} (last {} exchanges):", identity, limit);
                println!();
                for exchange in &history.history {
                    println!("  You: {}", exchange.message);
                    println!("  PT:  {}", exchange.response);
                    println!();
                }
            }

            if !history.summary.is_empty() {
                println!("Summary: {}", history.summary);
            }
            if !snapshot.key_facts.is_empty() {
                println!("Key facts:");
                for (key, value) in &snapshot.key_facts {
                    println!("  {}: {}", key, value);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "history": history.history,
                "summary": history.summary,
                "key_facts": snapshot.key_facts,
                "count": history.history.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    database.close().await.context("Failed to close database")?;
    Ok(())
}

/// Validate configuration and report what each backend is missing
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(String, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration".into(), "Valid".into()));

    if config.core.data_dir.exists() {
        checks.push(("Data directory".into(), "Exists".into()));
    } else {
        checks.push(("Data directory".into(), "Missing".into()));
        issues.push(format!(
            "Data directory does not exist: {:?}",
            config.core.data_dir
        ));
    }

    let db_path = config.database_path();
    match Database::new(&db_path).await {
        Ok(database) => {
            checks.push(("Database".into(), "OK".into()));
            if let Err(e) = database.close().await {
                issues.push(format!("Database did not close cleanly: {:#}", e));
            }
        }
        Err(e) => {
            checks.push(("Database".into(), "Failed".into()));
            issues.push(format!("Cannot open database at {:?}: {:#}", db_path, e));
        }
    }

    let secrets = SecretManager::new(SERVICE_NAME);
    let mut usable = 0;
    for backend in Backend::ALL {
        let name = format!("{} backend", backend);
        let status = match backend {
            Backend::Ollama if config.llm.ollama.enabled => {
                usable += 1;
                format!("Enabled ({})", config.llm.ollama.base_url)
            }
            Backend::Ollama => "Disabled".to_string(),
            _ => {
                let env = config.llm.api_key_env(backend);
                if secrets.has_secret(backend.secret_key(), env) {
                    usable += 1;
                    "API key configured".to_string()
                } else {
                    "API key not configured".to_string()
                }
            }
        };
        checks.push((name, status));
    }
    if usable == 0 {
        issues.push("No model backend is usable. Configure at least one API key.".to_string());
    }

    for (role, model) in [
        ("Default model", &config.llm.default_model),
        ("Guardrail model", &config.llm.guardrail_model),
        ("Utility model", &config.llm.utility_model),
    ] {
        checks.push((role.to_string(), model.clone()));
        if let Ok(spec) = model.parse::<crate::llm::ModelSpec>() {
            let env = config.llm.api_key_env(spec.backend);
            let ready = match spec.backend {
                Backend::Ollama => config.llm.ollama.enabled,
                backend => secrets.has_secret(backend.secret_key(), env),
            };
            if !ready {
                issues.push(format!("{} '{}' has no usable backend", role, model));
            }
        }
    }

    match format {
        OutputFormat::Text => {
            println!("PT System Diagnostics");
            println!("=====================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
