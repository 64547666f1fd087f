use anyhow::Context;
use clap::Parser;
use opal_core::config::{CliOverrides, CompilerConfig, OptimizationLevel};
use opal_core::optimizer::{OptimizationReport, OptimizerStats};
use opal_core::{print_program, CompilationError, Container};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "opal.yaml";

/// Opal - whole-program optimizer for resolved object-oriented programs
#[derive(Parser, Debug)]
#[command(name = "opal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Program to optimize (JSON, or YAML by extension)
    #[arg(value_name = "INPUT", required_unless_present = "init")]
    input: Option<PathBuf>,

    /// Configuration file; defaults to ./opal.yaml when present
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Optimization level (O0, O1, O2, O3, auto)
    #[arg(short = 'O', long, value_name = "LEVEL", value_parser = parse_level)]
    level: Option<OptimizationLevel>,

    /// Upper bound on fixed-point iterations
    #[arg(long, value_name = "N")]
    max_iterations: Option<usize>,

    /// Rescan the whole program in every pass
    #[arg(long)]
    no_incremental: bool,

    /// Check tree and graph consistency after every pass
    #[arg(long)]
    verify: bool,

    /// Keep assert statements
    #[arg(long)]
    enable_assertions: bool,

    /// Keep long arithmetic instead of lowering it to runtime calls
    #[arg(long)]
    no_emulate_longs: bool,

    /// Print the optimized program
    #[arg(long)]
    dump: bool,

    /// Write the optimized program to a file
    #[arg(short, long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Print statistics as JSON
    #[arg(long)]
    stats_json: bool,

    /// Write a default opal.yaml to the current directory
    #[arg(long)]
    init: bool,
}

fn parse_level(text: &str) -> Result<OptimizationLevel, String> {
    OptimizationLevel::parse(text).ok_or_else(|| {
        format!(
            "invalid optimization level '{}'. Supported levels: O0, O1, O2, O3, auto",
            text
        )
    })
}

fn main() -> anyhow::Result<()> {
    // Set RUST_LOG=debug for detailed logs, RUST_LOG=info for progress
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if cli.init {
        CompilerConfig::init_file(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG))?;
        println!("Created {}", DEFAULT_CONFIG);
        return Ok(());
    }

    let config = load_config(&cli)?;
    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("No input file specified. Use --help for usage information.");
    };

    info!("Optimizing {} at {:?}", input.display(), config.optimizer.level);
    debug!("Options: {:?}", config.optimizer);

    let container = Container::new(config);
    let (program, report) = match container.compile_file(input) {
        Ok(result) => result,
        Err(CompilationError::Semantic { errors }) => {
            eprintln!(
                "Error: {} has {} error(s), nothing was optimized",
                input.display(),
                errors
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to optimize {}", input.display()));
        }
    };

    if cli.stats_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if cli.dump || cli.out.is_some() {
        let text = print_program(&program);
        if cli.dump {
            print!("{}", text);
        }
        if let Some(out) = &cli.out {
            std::fs::write(out, &text)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!("Wrote {}", out.display());
        }
    }

    Ok(())
}

/// Configuration file (given or default) with command line values on top
fn load_config(cli: &Cli) -> anyhow::Result<CompilerConfig> {
    let mut config = match &cli.config {
        Some(path) => CompilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG);
            if default_path.exists() {
                CompilerConfig::from_file(&default_path)
                    .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG))?
            } else {
                CompilerConfig::default()
            }
        }
    };

    let overrides = CliOverrides {
        level: cli.level,
        max_iterations: cli.max_iterations,
        incremental: cli.no_incremental.then_some(false),
        verify_after_each_pass: cli.verify.then_some(true),
        enable_assertions: cli.enable_assertions.then_some(true),
        emulate_longs: cli.no_emulate_longs.then_some(false),
    };
    config.merge_with_cli(&overrides);
    Ok(config)
}

fn print_report(report: &OptimizationReport) {
    println!(
        "Optimized at {:?}: {} iteration(s), {}",
        report.level,
        report.iterations,
        if report.converged {
            "converged"
        } else {
            "iteration limit reached"
        }
    );
    for child in &report.stats.children {
        print_stats(child, 1);
    }
    println!(
        "Total: {} visits, {} modifications",
        report.stats.num_visits, report.stats.num_mods
    );
}

fn print_stats(stats: &OptimizerStats, depth: usize) {
    println!(
        "{}{}: {} visits, {} modifications",
        "  ".repeat(depth),
        stats.name,
        stats.num_visits,
        stats.num_mods
    );
    for child in &stats.children {
        print_stats(child, depth + 1);
    }
}
