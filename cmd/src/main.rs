use std::{
    io::{self, Write},
    path::PathBuf,
    time::Instant,
};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, Result};
use metric_cmd::{Edit, FingerprintKind};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Inspect the label sets of Prometheus series")]
struct Cli {
    #[arg(
        short,
        long,
        default_value = "-",
        global = true,
        help = r#"Input file, `-` for stdin

Accepted formats:
    Prometheus API response   {"status":"success","data":{"result":[{"metric":{...}}]}}
    JSON lines                {"__name__":"up","job":"node"}"#
    )]
    input: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print series in canonical form, sorted
    Render,
    /// Print the fingerprint of every series
    Fingerprint {
        /// Use the cheaper, collision-prone fingerprint
        #[arg(long)]
        fast: bool,
    },
    /// Print distinct series in input order
    Dedup {
        /// Bucket by the cheaper, collision-prone fingerprint
        #[arg(long)]
        fast: bool,
    },
    /// Edit labels and print the series as JSON lines; deletions are applied
    /// before assignments
    Relabel {
        #[arg(long = "set", value_name = "NAME=VALUE", value_parser = Edit::parse_set)]
        set: Vec<Edit>,
        #[arg(long = "del", value_name = "NAME", value_parser = Edit::parse_del)]
        del: Vec<Edit>,
    },
    /// Report series with invalid label names
    Validate,
}

fn kind(fast: bool) -> FingerprintKind {
    if fast {
        FingerprintKind::Fast
    } else {
        FingerprintKind::Strong
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();
    let start_time = Instant::now();

    let mut series = metric_cmd::load_series(&cli.input)?;
    tracing::info!(
        series = series.len(),
        "load time: {:?}",
        start_time.elapsed()
    );

    let mut out = io::stdout().lock();
    match cli.command {
        Command::Render => {
            series.sort();
            for metric in &series {
                writeln!(out, "{metric}")?;
            }
        }
        Command::Fingerprint { fast } => {
            let kind = kind(fast);
            for metric in &series {
                writeln!(out, "{} {metric}", kind.fingerprint(metric))?;
            }
        }
        Command::Dedup { fast } => {
            let dedup = metric_cmd::dedup(&series, kind(fast));
            for metric in &dedup.unique {
                writeln!(out, "{metric}")?;
            }
            tracing::info!(
                unique = dedup.unique.len(),
                duplicates = dedup.duplicates,
                collisions = dedup.collisions,
                "dedup done"
            );
        }
        Command::Relabel { set, del } => {
            let edits = del.into_iter().chain(set).collect::<Vec<_>>();
            for metric in &series {
                let cow = metric_cmd::relabel(metric, &edits);
                serde_json::to_writer(&mut out, &cow)?;
                writeln!(out)?;
            }
        }
        Command::Validate => {
            let mut invalid = 0;
            for metric in &series {
                if let Err(error) = metric.validate() {
                    writeln!(out, "{metric}: {error}")?;
                    invalid += 1;
                }
            }
            if invalid > 0 {
                bail!("{invalid} of {} series have invalid label names", series.len());
            }
        }
    }
    tracing::info!("execute time: {:?}", start_time.elapsed());
    Ok(())
}
