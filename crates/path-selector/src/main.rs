//! Path Selection CLI
//!
//! Picks one path from a path-set file for the given objective.
//!
//! Usage:
//!   select-path --paths data/paths.json --objective carbon
//!   select-path --paths data/paths.json --objective policy \
//!               --query "0-0#0,0@0 # 0-0#0,0@L1000" --pin 1:L2000 \
//!               --output decision.json

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use path_selector::dataplane::DeclaredDataplaneBuilder;
use path_selector::fabrid::HopPin;
use path_selector::loader::PathSetFile;
use path_selector::orchestrator::{DecisionContext, DecisionReport, Verdict, VerdictSink};
use path_selector::{IsdAs, Objective, PolicyQuery, SelectionOrchestrator, SelectorConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ObjectiveArg {
    Connectivity,
    Carbon,
    Bandwidth,
    Epic,
    Fabrid,
    Policy,
}

#[derive(Parser, Debug)]
#[command(name = "select-path", about = "Select a SCION path for a stated objective")]
struct Args {
    /// Path set JSON file
    #[arg(short, long)]
    paths: PathBuf,

    /// Selection objective
    #[arg(long, value_enum, default_value_t = ObjectiveArg::Connectivity)]
    objective: ObjectiveArg,

    /// FABRID policy query (policy objective)
    #[arg(short, long)]
    query: Option<String>,

    /// Required policy on a hop counted from the end, e.g. 1:L2000
    #[arg(long)]
    pin: Option<HopPin>,

    /// Latency bound in ms (bandwidth objective)
    #[arg(long)]
    latency_bound_ms: Option<f64>,

    /// Local ISD-AS (defaults to the path set's)
    #[arg(long)]
    src: Option<IsdAs>,

    /// Remote ISD-AS (defaults to the path set's)
    #[arg(long)]
    dst: Option<IsdAs>,

    /// Selector config JSON file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Writes each report as JSON to a file or stdout
///
/// There is no remote verifier, so the verdict mirrors the objective.
struct ReportWriter {
    output: Option<PathBuf>,
}

impl VerdictSink for ReportWriter {
    fn report(&mut self, report: &DecisionReport) -> path_selector::Result<Verdict> {
        info!(
            "Selected {} [{}] fulfilled={}",
            report.path_id, report.fingerprint, report.objective_fulfilled
        );

        match &self.output {
            Some(path) => {
                info!("Writing decision to {:?}", path);
                let file = File::create(path)?;
                serde_json::to_writer_pretty(BufWriter::new(file), report)?;
            }
            None => println!("{}", serde_json::to_string_pretty(report)?),
        }

        Ok(if report.objective_fulfilled {
            Verdict::Passed
        } else {
            Verdict::Failed
        })
    }
}

fn objective(args: &Args, config: &SelectorConfig) -> Result<Objective> {
    Ok(match args.objective {
        ObjectiveArg::Connectivity => Objective::Connectivity,
        ObjectiveArg::Carbon => Objective::LowestCarbon,
        ObjectiveArg::Bandwidth => Objective::MaxBandwidth {
            latency_bound_ms: args.latency_bound_ms.unwrap_or(config.latency_bound_ms),
        },
        ObjectiveArg::Epic => Objective::EpicHidden,
        ObjectiveArg::Fabrid => Objective::FabridConnectivity,
        ObjectiveArg::Policy => {
            let text = args.query.as_deref().unwrap_or(&config.wildcard_query);
            let query = PolicyQuery::parse(text)
                .with_context(|| format!("invalid policy query '{}'", text))?;
            Objective::FabridPolicy {
                query,
                pin: args.pin,
            }
        }
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => SelectorConfig::from_file(path)?,
        None => SelectorConfig::default(),
    };

    let set = PathSetFile::load(&args.paths)?;
    let ctx = DecisionContext::new(
        args.src.unwrap_or(set.local),
        args.dst.unwrap_or(set.remote),
    );
    let objective = objective(&args, &config)?;

    info!("Objective: {}", objective);

    let orchestrator = SelectionOrchestrator::new(config);
    let mut writer = ReportWriter {
        output: args.output.clone(),
    };
    orchestrator.run(
        &ctx,
        &set,
        &DeclaredDataplaneBuilder,
        &mut writer,
        &objective,
    )?;

    Ok(())
}
