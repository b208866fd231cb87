//! FlexPipe CLI.
//!
//! Provides the `flexpipe` binary with subcommands for working with pipeline
//! programs. `reconfig` runs a reconfiguration plan against a running
//! program, through the same batch path the control plane uses, and `check`
//! validates that a pipeline JSON file builds.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use flexpipe_core::program_from_json;
use flexpipe_runtime::Switch;

/// FlexPipe pipeline tools.
#[derive(Parser)]
#[command(name = "flexpipe", about = "FlexPipe pipeline tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Apply a reconfiguration plan to a running program.
    Reconfig {
        /// Path to the running program JSON.
        #[arg(short, long)]
        running: PathBuf,

        /// Path to the staged (new) program JSON.
        #[arg(short, long)]
        staged: PathBuf,

        /// Path to the plan file.
        #[arg(short, long)]
        plan: PathBuf,

        /// Snapshot path; the result is written to `<output>.new`.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate that a pipeline JSON file builds.
    Check {
        /// Path to the pipeline JSON.
        config: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Reconfig {
            running,
            staged,
            plan,
            output,
        } => run_reconfig(&running, &staged, &plan, output.as_deref()),
        Commands::Check { config } => run_check(&config),
    };
    process::exit(exit_code);
}

/// Execute the reconfig subcommand.
///
/// Returns the reconfiguration status code: 0 = success, otherwise the
/// taxonomy code of the first failure.
fn run_reconfig(
    running: &std::path::Path,
    staged: &std::path::Path,
    plan: &std::path::Path,
    output: Option<&std::path::Path>,
) -> i32 {
    let running_json = match std::fs::read_to_string(running) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot open running program '{}': {}", running.display(), e);
            return 1;
        }
    };

    let switch = Switch::new(1);
    if let Err(e) = switch.load_program(0, &running_json) {
        eprintln!("Error: running program does not build: {}", e);
        return e.code();
    }

    match switch.runtime_reconfig_files(0, staged, plan, output) {
        Ok(()) => {
            println!("reconfiguration applied");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.code()
        }
    }
}

/// Execute the check subcommand. Returns 0 if the config builds.
fn run_check(config: &std::path::Path) -> i32 {
    let text = match std::fs::read_to_string(config) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot open '{}': {}", config.display(), e);
            return 1;
        }
    };

    match program_from_json(&text) {
        Ok(program) => {
            let nodes: usize = program.pipelines().map(|p| p.node_count()).sum();
            println!(
                "ok: {} pipeline(s), {} node(s), {} register array(s)",
                program.pipeline_count(),
                nodes,
                program.register_arrays().count()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
