use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use heapwise_advisor::{PhysicalMemoryProbe, SuggestionPolicy};
use heapwise_config::{ConfigDiagnostics, HeapwiseConfig};
use heapwise_memory::{bytes_to_mb, MB};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "heapwise", version, about = "Heapwise CLI (heap size suggestions, config checks)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe physical memory and print the suggested -Xmx
    Suggest(SuggestArgs),
    /// Inspect `heapwise.toml`
    Config(ConfigArgs),
}

#[derive(Args)]
struct SuggestArgs {
    /// Use this much memory (in MB) instead of probing the machine
    #[arg(long)]
    total_mb: Option<u64>,

    /// Config file (defaults to discovery in the current directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit JSON suitable for scripts
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Validate a config file and print diagnostics (exit 1 on errors)
    Check(CheckArgs),
    /// Print the JSON schema for `heapwise.toml`
    Schema,
}

#[derive(Args)]
struct CheckArgs {
    /// Config file (defaults to discovery in the current directory)
    path: Option<PathBuf>,

    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Suggest(args) => {
            let (config, config_path) = load_config(args.config.as_deref())?;
            heapwise_config::init_tracing(&config.logging);

            let registry = config
                .policy_registry()
                .context("invalid [policy] section")?;
            let total_bytes = match args.total_mb {
                Some(total_mb) => total_mb.saturating_mul(MB),
                None => config.memory.probe().total_physical_memory_bytes(),
            };
            let physical_memory_mb = bytes_to_mb(total_bytes);
            let limits = registry.limits();

            let report = SuggestReport {
                config_path,
                physical_memory_mb,
                suggested_xmx_mb: registry.active().suggest(physical_memory_mb),
                policy: registry.active_name().to_owned(),
                limits: limits.into(),
            };
            tracing::debug!(
                target: "heapwise.cli",
                physical_memory_mb,
                suggested_xmx_mb = report.suggested_xmx_mb,
                "computed heap suggestion"
            );
            print_output(&report, args.json)?;
            Ok(0)
        }
        Command::Config(args) => match args.command {
            ConfigCommand::Check(args) => {
                let report = check_config(args.path.as_deref())?;
                let exit = if report.diagnostics.is_ok() { 0 } else { 1 };
                print_output(&report, args.json)?;
                Ok(exit)
            }
            ConfigCommand::Schema => {
                print_output(&heapwise_config::json_schema(), true)?;
                Ok(0)
            }
        },
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to determine current directory")
}

fn load_config(explicit: Option<&Path>) -> Result<(HeapwiseConfig, Option<PathBuf>)> {
    match explicit {
        Some(path) => Ok((
            HeapwiseConfig::load_from_path(path)?,
            Some(path.to_path_buf()),
        )),
        None => Ok(heapwise_config::load_from_dir(&current_dir()?)?),
    }
}

fn check_config(explicit: Option<&Path>) -> Result<CheckReport> {
    let (path, diagnostics) = match explicit {
        Some(path) => {
            let (_config, diagnostics) = HeapwiseConfig::load_from_path_with_diagnostics(path)?;
            (Some(path.to_path_buf()), diagnostics)
        }
        None => {
            let (_config, path, diagnostics) =
                heapwise_config::load_from_dir_with_diagnostics(&current_dir()?)?;
            (path, diagnostics)
        }
    };
    Ok(CheckReport { path, diagnostics })
}

#[derive(Serialize)]
struct LimitsReport {
    default_xmx_mb: u64,
    maximum_suggested_xmx_mb: u64,
    legacy_default_mb: u64,
}

impl From<heapwise_advisor::PolicyLimits> for LimitsReport {
    fn from(limits: heapwise_advisor::PolicyLimits) -> Self {
        Self {
            default_xmx_mb: limits.default_xmx_mb(),
            maximum_suggested_xmx_mb: limits.maximum_suggested_xmx_mb(),
            legacy_default_mb: limits.legacy_default_mb(),
        }
    }
}

#[derive(Serialize)]
struct SuggestReport {
    config_path: Option<PathBuf>,
    physical_memory_mb: u64,
    suggested_xmx_mb: u64,
    policy: String,
    limits: LimitsReport,
}

#[derive(Serialize)]
struct CheckReport {
    path: Option<PathBuf>,
    diagnostics: ConfigDiagnostics,
}

fn print_output<T: Serialize + 'static>(value: &T, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
        return Ok(());
    }

    // Human output for key types. Everything else falls back to pretty JSON.
    let any = value as &dyn std::any::Any;
    if let Some(report) = any.downcast_ref::<SuggestReport>() {
        println!("physical memory: {}M", report.physical_memory_mb);
        println!("suggested -Xmx: {}M", report.suggested_xmx_mb);
        println!("  policy: {}", report.policy);
        println!(
            "  limits: default {}M, maximum {}M, legacy {}M",
            report.limits.default_xmx_mb,
            report.limits.maximum_suggested_xmx_mb,
            report.limits.legacy_default_mb
        );
        if let Some(path) = &report.config_path {
            println!("  config: {}", path.display());
        }
    } else if let Some(report) = any.downcast_ref::<CheckReport>() {
        match &report.path {
            Some(path) => println!("config: {}", path.display()),
            None => println!("config: none found, defaults in effect"),
        }
        for key in &report.diagnostics.unknown_keys {
            println!("warning: unknown key `{key}`");
        }
        for warning in &report.diagnostics.warnings {
            println!("warning: {warning}");
        }
        for error in &report.diagnostics.errors {
            println!("error: {error}");
        }
        println!(
            "summary: {} errors, {} warnings",
            report.diagnostics.errors.len(),
            report.diagnostics.warnings.len() + report.diagnostics.unknown_keys.len()
        );
    } else {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
    }
    Ok(())
}
