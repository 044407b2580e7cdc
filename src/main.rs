use std::io::Read;
use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::pipeline::Pipeline;
use crate::toolchain::probe::probe;

mod config;
mod core;
mod native;
mod toolchain;


#[derive(Debug, Parser)]
#[command(name = "playground-runner", about = "Run untrusted snippets with a time budget")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile (if needed) and run a snippet, printing the result as JSON.
    Run {
        #[arg(short, long)]
        language: String,
        /// Source file; read from standard input when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Text fed to the program's standard input.
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,
        #[arg(long)]
        input_file: Option<PathBuf>,
    },
    /// Report the version of every configured toolchain.
    Toolchains,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[arg(long, env = "PLAYGROUND_WORKSPACE_ROOT", global = true)]
    workspace_root: Option<PathBuf>,
    #[arg(long, env = "PLAYGROUND_BUILD_TIMEOUT_MS", default_value_t = 15_000, global = true)]
    build_timeout_ms: u64,
    #[arg(long, env = "PLAYGROUND_RUN_TIMEOUT_MS", default_value_t = 10_000, global = true)]
    run_timeout_ms: u64,
    #[arg(long, env = "PLAYGROUND_KILL_GRACE_MS", default_value_t = 1_000, global = true)]
    kill_grace_ms: u64,
    #[arg(long, env = "PLAYGROUND_OUTPUT_LIMIT_BYTES", default_value_t = 1024 * 1024, global = true)]
    output_limit_bytes: usize,
    #[arg(long, env = "PLAYGROUND_MAX_CONCURRENT", global = true)]
    max_concurrent: Option<usize>,
    #[arg(long, env = "PLAYGROUND_PYTHON", default_value = "python3", global = true)]
    python: PathBuf,
    #[arg(long, env = "PLAYGROUND_GPP", default_value = "g++", global = true)]
    gpp: PathBuf,
    #[arg(long, env = "PLAYGROUND_GCC", default_value = "gcc", global = true)]
    gcc: PathBuf,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        let defaults = Config::default();
        Config {
            workspace_root: args.workspace_root.unwrap_or(defaults.workspace_root),
            build_timeout: Duration::from_millis(args.build_timeout_ms),
            run_timeout: Duration::from_millis(args.run_timeout_ms),
            kill_grace: Duration::from_millis(args.kill_grace_ms),
            output_limit_bytes: args.output_limit_bytes,
            max_concurrent: args.max_concurrent,
            python_path: args.python,
            gpp_path: args.gpp,
            gcc_path: args.gcc,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let config = Config::from(cli.config);
    tracing::debug!(?config, "Configuration loaded");
    let pipeline = Pipeline::from_config(&config);

    match cli.command {
        Command::Run {
            language,
            file,
            input,
            input_file,
        } => {
            let source = match file {
                Some(path) => tokio::fs::read_to_string(path).await?,
                None => {
                    let mut source = String::new();
                    std::io::stdin().read_to_string(&mut source)?;
                    source
                }
            };
            let stdin = match (input, input_file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(path).await?,
                (None, None) => String::new(),
            };

            let result = pipeline.execute(&language, &source, &stdin).await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            Ok(if result.status_code() == 200 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Toolchains => {
            let versions = probe(pipeline.registry(), pipeline.supervisor()).await;
            println!("{}", serde_json::to_string_pretty(&versions)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
