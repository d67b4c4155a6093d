use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use clap::ValueEnum;
use constrained_portfolio::config::Objective;
use constrained_portfolio::config::PortfolioConfig;
use constrained_portfolio::data::PriceLoadOptions;
use constrained_portfolio::PortfolioOptimizer;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Select a sector- and cardinality-constrained portfolio from daily prices.
#[derive(Parser, Debug)]
#[command(name = "constrained-portfolio", version, about, long_about = None)]
struct Cli {
  /// Price table: a date column followed by one column per asset
  #[arg(long)]
  prices: PathBuf,

  /// Headerless two-column asset,sector file
  #[arg(long)]
  sectors: PathBuf,

  /// TOML configuration; flags below override its values
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[arg(long, value_enum)]
  objective: Option<Objective>,

  /// Maximum number of selected assets
  #[arg(long)]
  max_assets: Option<usize>,

  /// Default per-sector weight cap
  #[arg(long)]
  sector_limit: Option<f64>,

  /// Minimum weight of a selected asset
  #[arg(long)]
  min_investment: Option<f64>,

  /// Maximum weight of a selected asset
  #[arg(long)]
  max_investment: Option<f64>,

  /// Daily standard-deviation cap (max-profit only)
  #[arg(long)]
  max_risk: Option<f64>,

  /// Daily return floor; defaults to the mean of the asset means
  #[arg(long)]
  target_return: Option<f64>,

  /// Solver wall-clock limit in seconds
  #[arg(long)]
  time_limit: Option<f64>,

  /// Keep rows with missing prices instead of dropping them
  #[arg(long)]
  keep_incomplete_rows: bool,

  #[arg(long, value_enum, default_value = "text")]
  format: OutputFormat,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
  Text,
  Json,
}

impl Cli {
  fn resolve_config(&self) -> anyhow::Result<PortfolioConfig> {
    let mut config = match &self.config {
      Some(path) => PortfolioConfig::from_file(path)
        .with_context(|| format!("reading configuration {}", path.display()))?,
      None => PortfolioConfig::default(),
    };

    if let Some(objective) = self.objective {
      config.objective = objective;
    }
    if let Some(k) = self.max_assets {
      config.max_assets = k;
    }
    if let Some(limit) = self.sector_limit {
      config.sector_limit = limit;
    }
    if let Some(min) = self.min_investment {
      config.min_investment = min;
    }
    if let Some(max) = self.max_investment {
      config.max_investment = max;
    }
    if let Some(risk) = self.max_risk {
      config.max_risk = risk;
    }
    if self.target_return.is_some() {
      config.target_return = self.target_return;
    }
    if self.time_limit.is_some() {
      config.solver.time_limit_secs = self.time_limit;
    }
    if self.verbose > 1 {
      config.solver.verbose = true;
    }

    config.validate()?;
    Ok(config)
  }
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::registry()
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .with(filter)
    .init();
}

fn main() -> anyhow::Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let config = cli.resolve_config()?;
  debug!(?config, "resolved configuration");

  let load_options = PriceLoadOptions {
    drop_incomplete_rows: !cli.keep_incomplete_rows,
  };
  let outcome = PortfolioOptimizer::new(config)
    .optimize_files(&cli.prices, &cli.sectors, &load_options)
    .with_context(|| {
      format!(
        "optimizing {} with sectors {}",
        cli.prices.display(),
        cli.sectors.display()
      )
    })?;

  match cli.format {
    OutputFormat::Text => print!("{outcome}"),
    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome.to_json())?),
  }

  Ok(if outcome.status().is_optimal() {
    ExitCode::SUCCESS
  } else {
    ExitCode::from(2)
  })
}
