use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use queryscope::loginfo::{LogInfo, ParseOpts};

#[derive(Parser, Debug)]
#[command(name = "queryscope", version, about = "Slow-operation query shapes from database server logs")]
struct Cli {
    /// Log files (plain or gzip) or previously written `.enc` artifacts.
    #[arg(required = true)]
    input: Vec<PathBuf>,

    /// Only aggregate collection scans
    #[arg(long = "collscan", default_value_t = false)]
    collscan: bool,

    /// No progress output
    #[arg(long = "silent", default_value_t = false)]
    silent: bool,

    /// Print startup options and the slowest individual operations too
    #[arg(long = "verbose", short = 'v', default_value_t = false)]
    verbose: bool,

    /// Directory for `.enc` artifacts (defaults to the working directory)
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Tracing filter, e.g. `debug` or `queryscope=trace`
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let opts = ParseOpts {
        collscan_only: cli.collscan,
        silent: cli.silent,
        verbose: cli.verbose,
    };

    for path in &cli.input {
        let mut li = LogInfo::new(path, opts);
        if let Some(dir) = &cli.output_dir {
            li = li.output_dir(dir);
        }
        let result = li.analyze()?;
        println!("{}", li.summary(&result));
        if let Some(out) = li.output_filename().filter(|p| p.exists()) {
            eprintln!("Encoded output written to {}", out.display());
        }
    }
    Ok(())
}
