use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::Value;
use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

mod cli;
mod config;
mod error;
mod inbox;
mod model;
mod notify;
mod render;
mod store;
mod util;
mod workflow;

use cli::{CheckConfigArgs, Command, ProcessArgs, RenderArgs, RootArgs, ServeArgs};
use config::WorkerConfig;
use model::{HrEvent, WorkflowOutcome, FIELD_CASE_NUMBER, FIELD_DATE};
use notify::{notifier_from_config, Notifier};
use render::{DocumentRenderer, TemplateRenderer};
use store::P360Client;
use workflow::Provisioner;

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);
    let config_path = args.config.as_deref();

    match args.command {
        Command::Process(args) => cmd_process(config_path, args),
        Command::Serve(args) => cmd_serve(config_path, args),
        Command::Render(args) => cmd_render(args),
        Command::CheckConfig(args) => cmd_check_config(config_path, args),
    }
}

/// Logs go to stderr so stdout stays free for notifications.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Collaborators built from a loaded config.
struct Runtime {
    config: WorkerConfig,
    store: P360Client,
    notifier: Box<dyn Notifier>,
}

impl Runtime {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config::resolve_config_path(config_path)?;
        let config = config::load_config(&path)?;
        tracing::info!(path = %path.display(), "config loaded");
        let timeout = Duration::from_secs(config.case_store.http_timeout_secs);
        let store = P360Client::new(&config.case_store);
        let notifier = notifier_from_config(&config.notifications, timeout);
        Ok(Self {
            config,
            store,
            notifier,
        })
    }

    fn provisioner<'a>(&'a self, renderer: &'a dyn DocumentRenderer) -> Provisioner<'a> {
        Provisioner::new(
            &self.store,
            renderer,
            self.notifier.as_ref(),
            &self.config.workflow,
        )
    }
}

fn cmd_process(config_path: Option<&Path>, args: ProcessArgs) -> Result<()> {
    let runtime = Runtime::load(config_path)?;
    let text = fs::read_to_string(&args.event)
        .with_context(|| format!("read event {}", args.event.display()))?;
    let renderer = TemplateRenderer;
    let outcome = inbox::process_event(&text, &runtime.provisioner(&renderer))?;
    match outcome {
        WorkflowOutcome::Succeeded {
            case_number,
            case_recno,
        } => {
            tracing::info!(case_number, case_recno, "event provisioned");
            Ok(())
        }
        WorkflowOutcome::Failed { kind, message, .. } => {
            Err(anyhow!("provisioning failed ({kind:?}): {message}"))
        }
    }
}

fn cmd_serve(config_path: Option<&Path>, args: ServeArgs) -> Result<()> {
    let runtime = Runtime::load(config_path)?;
    let max_in_flight = args
        .max_in_flight
        .unwrap_or(runtime.config.worker.max_in_flight);
    let renderer = TemplateRenderer;
    let provisioner = runtime.provisioner(&renderer);
    let summary = match &args.input {
        Some(path) => {
            let file =
                fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
            inbox::serve(BufReader::new(file), &provisioner, max_in_flight)?
        }
        None => inbox::serve(std::io::stdin().lock(), &provisioner, max_in_flight)?,
    };
    let text = serde_json::to_string(&summary).context("serialize summary")?;
    eprintln!("{text}");
    Ok(())
}

fn cmd_render(args: RenderArgs) -> Result<()> {
    let text = fs::read_to_string(&args.event)
        .with_context(|| format!("read event {}", args.event.display()))?;
    let event = HrEvent::parse(&text)?;
    let mut data = event.fields().clone();
    data.insert(
        FIELD_DATE.to_string(),
        Value::String(chrono::Local::now().format("%d.%m.%Y").to_string()),
    );
    if let Some(case_number) = args.case_number {
        data.insert(FIELD_CASE_NUMBER.to_string(), Value::String(case_number));
    }
    let bytes = TemplateRenderer.render(&args.template, &data)?;
    fs::write(&args.out, &bytes).with_context(|| format!("write {}", args.out.display()))?;
    println!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_check_config(config_path: Option<&Path>, args: CheckConfigArgs) -> Result<()> {
    if args.stub {
        println!("{}", config::config_stub()?);
        return Ok(());
    }
    let path = config::resolve_config_path(config_path)?;
    let loaded = config::load_config(&path)?;
    let text = serde_json::to_string_pretty(&config::redacted(&loaded))
        .context("serialize config")?;
    println!("{text}");
    eprintln!("config ok: {}", path.display());
    Ok(())
}
