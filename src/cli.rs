//! CLI argument parsing for the case provisioner.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint for the provisioning worker.
///
/// `--config` and `--verbose` are global so every subcommand resolves the
/// same config file and log level.
#[derive(Parser, Debug)]
#[command(
    name = "caseprov",
    version,
    about = "Provision personnel cases in the archive from HR events",
    after_help = "Commands:\n  process --event <file>                 Run one event envelope\n  serve [--input <file>]                 Run newline-delimited envelopes (stdin by default)\n  render --template <f> --event <f> --out <f>  Merge one template locally\n  check-config [--stub]                  Validate config or print a starter config\n\nExamples:\n  caseprov check-config --stub > ~/.config/caseprov/config.json\n  caseprov process --event onboarding.json\n  tail -f events.ndjson | caseprov serve",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Config file (defaults to $CASEPROV_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Worker commands. Only `process` and `serve` talk to the archive.
#[derive(Subcommand, Debug)]
pub enum Command {
    Process(ProcessArgs),
    Serve(ServeArgs),
    Render(RenderArgs),
    CheckConfig(CheckConfigArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Provision a single event and exit non-zero if it failed")]
pub struct ProcessArgs {
    /// JSON file holding one event envelope
    #[arg(long, value_name = "FILE")]
    pub event: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about = "Provision newline-delimited event envelopes")]
pub struct ServeArgs {
    /// Read envelopes from this file instead of stdin
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Override worker.max_in_flight from the config
    #[arg(long, value_name = "N")]
    pub max_in_flight: Option<usize>,
}

#[derive(Parser, Debug)]
#[command(about = "Merge an event into a template without touching the archive")]
pub struct RenderArgs {
    /// Template file with {{Field}} placeholders
    #[arg(long, value_name = "FILE")]
    pub template: PathBuf,

    /// JSON file holding one event envelope
    #[arg(long, value_name = "FILE")]
    pub event: PathBuf,

    /// Where to write the rendered document
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Case number to merge as p360_case_number
    #[arg(long, value_name = "NUMBER")]
    pub case_number: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Validate the config, or print a starter config")]
pub struct CheckConfigArgs {
    /// Print a starter config to stdout instead of validating
    #[arg(long)]
    pub stub: bool,
}
