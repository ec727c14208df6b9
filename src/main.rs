use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use formrelay::{ClientConfig, Engine, EventInit, EventKind, HttpTransport, LoggingHost, WidgetRegistry};
use tokio::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: formrelay <page.html> [events.yaml]";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let page = args.next().map(PathBuf::from).ok_or_else(|| anyhow!(USAGE))?;
    let script = args.next().map(PathBuf::from);

    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let config = ClientConfig::from_env().unwrap_or_else(|err| {
        eprintln!("Failed to load client configuration: {err}. Using defaults.");
        ClientConfig::default()
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("formrelay runtime")?;
    runtime.block_on(replay(page, script, config))
}

async fn replay(page: PathBuf, script: Option<PathBuf>, config: ClientConfig) -> Result<()> {
    let html = std::fs::read_to_string(&page).with_context(|| format!("read page {}", page.display()))?;
    let steps: Vec<EventInit> = match script {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("read script {}", path.display()))?;
            serde_yaml::from_str(&raw).with_context(|| format!("parse script {}", path.display()))?
        }
        None => Vec::new(),
    };

    let transport = HttpTransport::new(config.server_url()?)?;
    info!(server = %transport.url(), steps = steps.len(), "replaying event script");
    let engine = Engine::load(
        &html,
        &config,
        WidgetRegistry::with_builtins(),
        Box::new(LoggingHost),
        Instant::now(),
    );
    let client = formrelay::spawn(engine, Arc::new(transport));

    for step in steps {
        let result = if step.kind == EventKind::ValueChange && step.target_id.is_some() && step.value.is_some() {
            client.change_value(step).await
        } else {
            client.dispatch_event(step).await
        };
        if let Err(err) = result {
            eprintln!("event rejected: {err}");
        }
        client.when_idle().await?;
    }

    for report in client.take_reports().await? {
        eprintln!("{}: {}", report.form, report.message);
    }
    println!("{}", client.snapshot().await?);
    Ok(())
}
