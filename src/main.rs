use std::num::NonZeroUsize;

use clap::Parser;
use tracing::{info, warn};

use fanout::{
    config::{AdmissionPolicy, CeilingMode, Config, SERIAL_CUTOFF},
    driver::Scheduler,
};

/// Times a bounded fan-out fork-join computation of fibonacci(n).
///
/// Prints the elapsed seconds of every run on its own line.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of worker threads. Anything but a positive integer falls back
    /// to the detected parallelism.
    #[arg(env = "FANOUT_THREADS")]
    threads: Option<String>,

    /// Fibonacci number to compute.
    #[arg(short = 'n', long, default_value_t = 45)]
    number: u32,

    /// Number of timed runs.
    #[arg(short, long, default_value_t = 20)]
    runs: usize,

    /// Ceiling mode, `hard` or `soft`. Unknown values fall back to `soft`.
    #[arg(long, env = "FANOUT_MODE")]
    mode: Option<String>,

    /// Limit active execution contexts to exactly the thread count. Same as
    /// `--mode hard`.
    #[arg(long)]
    limit: bool,

    /// Never let the active count exceed the ceiling, even transiently.
    #[arg(long)]
    strict: bool,

    /// Problem sizes at or below this are computed serially.
    #[arg(long, default_value_t = SERIAL_CUTOFF)]
    cutoff: u32,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(threads) = &self.threads {
            match threads.parse::<NonZeroUsize>() {
                Ok(threads) => config = Config::new(threads),
                Err(_) => warn!(
                    threads = %threads,
                    default = config.parallelism().get(),
                    "invalid thread count, using default"
                ),
            }
        }

        let mode = if self.limit {
            CeilingMode::Hard
        } else {
            match self.mode.as_deref().map(str::parse::<CeilingMode>) {
                None => CeilingMode::default(),
                Some(Ok(mode)) => mode,
                Some(Err(error)) => {
                    warn!(%error, "using the default ceiling mode");
                    CeilingMode::default()
                }
            }
        };

        let admission = if self.strict {
            AdmissionPolicy::Strict
        } else {
            AdmissionPolicy::Approximate
        };

        config
            .with_ceiling_mode(mode)
            .with_admission(admission)
            .with_serial_cutoff(self.cutoff)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    info!(
        threads = config.parallelism().get(),
        mode = %config.ceiling_mode(),
        ceiling = config.ceiling(),
        n = cli.number,
        "configured"
    );

    let mut scheduler = Scheduler::new(config);
    for _ in 0..cli.runs {
        let execution = scheduler.execute(cli.number)?;
        println!("{:.6}", execution.elapsed.as_secs_f64());
        info!(
            value = execution.value,
            spawned = execution.spawned,
            rejected = execution.rejected,
            peak_active = execution.peak_active,
            "run complete"
        );
    }

    Ok(())
}
