//! statica CLI - classify images with compiled plans, benchmark, and
//! produce or inspect plan files.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use statica_cli::Device;
use statica_cli::synth::PlanKind;
use statica_core::EngineConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statica")]
#[command(about = "Fixed-shape synchronous image classification runtime", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EngineArgs {
    /// Compiled plan file [default: ./model/resnet50_fp16.plan]
    #[arg(long, value_name = "FILE")]
    plan: Option<PathBuf>,

    /// Image to classify [default: ./input/dog.jpg]
    #[arg(long, value_name = "FILE")]
    image: Option<PathBuf>,

    /// Accelerator to run on
    #[arg(long, value_enum, default_value_t = Device::Host)]
    device: Device,
}

impl EngineArgs {
    fn config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(plan) = &self.plan {
            config = config.with_plan_path(plan);
        }
        if let Some(image) = &self.image {
            config = config.with_image_path(image);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one image and print the top-1 class and confidence
    Run {
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run repeated inferences and report latency
    Bench {
        #[command(flatten)]
        engine: EngineArgs,

        /// Timed iterations
        #[arg(short = 'n', long, default_value = "100")]
        iterations: usize,

        /// Untimed warmup iterations
        #[arg(long, default_value = "10")]
        warmup: usize,
    },
    /// Write a synthetic plan for the default input and output shapes
    Plan {
        /// Kind of plan to generate
        #[arg(value_enum)]
        kind: PlanKind,

        /// Output file path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Seed for random weights
        #[arg(long, default_value = "0")]
        seed: u64,
    },
    /// Print a plan's header and layers
    Inspect {
        /// Path to the plan file
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Run { engine } => cmd_run(&engine),
        Commands::Bench {
            engine,
            iterations,
            warmup,
        } => cmd_bench(&engine, iterations, warmup),
        Commands::Plan { kind, output, seed } => cmd_plan(kind, output, seed),
        Commands::Inspect { plan } => cmd_inspect(plan),
    }
}

/// Preprocess, infer and print the predicted class.
fn cmd_run(args: &EngineArgs) -> Result<()> {
    let config = args.config();
    let accelerator = args.device.open()?;
    let top = statica_cli::run::classify_image(&config, accelerator)?;

    println!("class index: {}", top.index);
    println!("confidence: {:.2}%", top.confidence_percent());
    Ok(())
}

fn cmd_bench(args: &EngineArgs, iterations: usize, warmup: usize) -> Result<()> {
    let config = args.config();
    let accelerator = args.device.open()?;
    let name = accelerator.name().to_string();
    let report = statica_cli::bench::bench(&config, accelerator, iterations, warmup)?;

    println!("device: {name}");
    println!("iterations: {} (+{warmup} warmup)", report.iterations);
    println!("min:  {:.3} ms", report.min.as_secs_f64() * 1e3);
    println!("mean: {:.3} ms", report.mean.as_secs_f64() * 1e3);
    println!("max:  {:.3} ms", report.max.as_secs_f64() * 1e3);
    if let Some(top) = report.top {
        println!(
            "class index: {} ({:.2}%)",
            top.index,
            top.confidence_percent()
        );
    }
    Ok(())
}

fn cmd_plan(kind: PlanKind, output: PathBuf, seed: u64) -> Result<()> {
    let config = EngineConfig::default();
    let program = statica_cli::synth::write_plan(
        kind,
        &config.input_shape,
        &config.output_shape,
        seed,
        &output,
    )?;
    println!(
        "Wrote plan '{}' ({} layers) to {}",
        program.name,
        program.layers.len(),
        output.display()
    );
    Ok(())
}

fn cmd_inspect(plan: PathBuf) -> Result<()> {
    print!("{}", statica_cli::inspect::describe_plan_file(&plan)?);
    Ok(())
}
