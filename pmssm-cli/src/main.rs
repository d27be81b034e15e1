use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use pmssm_common::Config;
use pmssm_core::maps::Density;
use pmssm_core::{
    describe_dataset, print_reports, print_summary, resolve_paths, run_job, write_outcome, Analysis, AxisSpec,
    Composition, ParquetSource, Plan, PlotJob, PlotKind, DEFAULT_PLAN,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `BINS,LOW,HIGH`, validated at parse time
fn parse_axis(s: &str) -> Result<AxisSpec, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [bins, low, high] = parts.as_slice() else {
        return Err(format!("expected BINS,LOW,HIGH, got {s}"));
    };
    let bins: usize = bins.parse().map_err(|_| format!("not a bin count: {bins}"))?;
    let low: f64 = low.parse().map_err(|_| format!("not a float: {low}"))?;
    let high: f64 = high.parse().map_err(|_| format!("not a float: {high}"))?;
    if bins == 0 || !(high > low) {
        return Err(format!("need at least one bin and LOW < HIGH, got {s}"));
    }
    Ok(AxisSpec::new(bins, low, high))
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("not a float: {s}"))?;
    if v > 0.0 && v <= 1.0 { Ok(v) } else { Err(format!("fraction must be in (0.0, 1.0], got {v}")) }
}

#[derive(Clone, Copy, ValueEnum)]
enum DensityArg {
    Prior,
    Posterior,
}

impl From<DensityArg> for Density {
    fn from(d: DensityArg) -> Self {
        match d {
            DensityArg::Prior => Density::Prior,
            DensityArg::Posterior => Density::Posterior,
        }
    }
}

#[derive(Parser)]
#[command(name = "pmssm", version, about = "pMSSM scan plotter: impact, survival, quantile and credibility plots")]
struct Cli {
    /// config file (default: $PMSSM_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// output directory, overrides the config
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,
    /// comma-separated output formats (svg, json, csv), overrides the config
    #[arg(long, global = true)]
    format: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PlotArgs {
    /// parquet file, directory or glob
    input: String,
    /// quantity to bin, or `Y:X` for 2D plots
    #[arg(long)]
    draw: String,
    #[arg(long, default_value = "combined")]
    analysis: Analysis,
    /// x axis as BINS,LOW,HIGH
    #[arg(long, value_parser = parse_axis)]
    x: AxisSpec,
    /// y axis as BINS,LOW,HIGH; makes the plot two-dimensional
    #[arg(long, value_parser = parse_axis)]
    y: Option<AxisSpec>,
    #[arg(long)]
    x_title: Option<String>,
    #[arg(long)]
    y_title: Option<String>,
    /// displayed x edges are divided by this factor
    #[arg(long, default_value_t = 1.0)]
    x_scale: f64,
    #[arg(long, default_value_t = 1.0)]
    y_scale: f64,
    #[arg(long)]
    log_x: bool,
    #[arg(long)]
    log_y: bool,
    /// extra selection, repeatable
    #[arg(long = "constraint")]
    constraints: Vec<String>,
    /// selection applied to the prior only, repeatable
    #[arg(long = "prior-constraint")]
    prior_constraints: Vec<String>,
    /// neutralino content, one plot per value
    #[arg(long = "composition")]
    compositions: Vec<Composition>,
    /// output name (default: derived from the draw string)
    #[arg(long)]
    name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dataset summary: files, rows, columns
    Info {
        input: String,
        #[arg(long)]
        json: bool,
    },
    /// Prior and posterior densities of one quantity
    Impact(PlotArgs),
    /// Survival probability, 1D or 2D
    Survival(PlotArgs),
    /// Bayes-factor quantiles per bin, 1D or 2D
    Quantile {
        #[command(flatten)]
        plot: PlotArgs,
        /// fraction or percentage, repeatable
        #[arg(long = "quantile", short = 'q')]
        quantiles: Vec<f64>,
    },
    /// Credible-region contours of the prior or posterior density
    Credible {
        #[command(flatten)]
        plot: PlotArgs,
        #[arg(long, value_enum, default_value_t = DensityArg::Posterior)]
        density: DensityArg,
        /// credibility fraction, repeatable
        #[arg(long = "interval", value_parser = parse_fraction)]
        intervals: Vec<f64>,
    },
    /// Run a plot plan (default: the built-in survey)
    Run {
        input: String,
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Print the built-in plot plan
    DefaultPlan,
    /// Shell completions
    Completions { shell: clap_complete::Shell },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).map_err(|e| anyhow::anyhow!("{e}"))?,
        None => Config::load().unwrap_or_default(),
    };
    if let Some(format) = &cli.format {
        config.export.format = format.clone();
    }
    let out_dir = cli.output.clone().unwrap_or_else(|| PathBuf::from(&config.export.output_dir));

    match cli.command {
        Commands::Info { input, json } => run_info(&input, json)?,
        Commands::Impact(args) => {
            let job = plot_job(PlotKind::Impact, &args)?;
            run_single(&args.input, job, &out_dir, &config)?
        }
        Commands::Survival(args) => {
            let kind = if args.y.is_some() { PlotKind::Survival2d } else { PlotKind::Survival1d };
            let job = plot_job(kind, &args)?;
            run_single(&args.input, job, &out_dir, &config)?
        }
        Commands::Quantile { plot, quantiles } => {
            let kind = if plot.y.is_some() { PlotKind::Quantile2d } else { PlotKind::Quantile1d };
            let job = PlotJob { quantiles, ..plot_job(kind, &plot)? };
            run_single(&plot.input, job, &out_dir, &config)?
        }
        Commands::Credible { plot, density, intervals } => {
            if plot.y.is_none() {
                anyhow::bail!("credible regions need a y axis (--y BINS,LOW,HIGH)");
            }
            let job = PlotJob { density: density.into(), intervals, ..plot_job(PlotKind::Credible, &plot)? };
            run_single(&plot.input, job, &out_dir, &config)?
        }
        Commands::Run { input, plan } => run_plan(&input, plan.as_deref(), &out_dir, &config)?,
        Commands::DefaultPlan => print!("{DEFAULT_PLAN}"),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
    }
    Ok(())
}

fn plot_job(kind: PlotKind, args: &PlotArgs) -> anyhow::Result<PlotJob> {
    let x = AxisSpec {
        title: args.x_title.clone(),
        log_scale: args.log_x,
        linear_scale: args.x_scale,
        ..args.x.clone()
    };
    let y = args.y.clone().map(|y| AxisSpec {
        title: args.y_title.clone(),
        log_scale: args.log_y,
        linear_scale: args.y_scale,
        ..y
    });
    if kind.is_2d() != args.draw.contains(':') {
        anyhow::bail!("draw string '{}' does not match a {} plot", args.draw, if kind.is_2d() { "2D" } else { "1D" });
    }
    Ok(PlotJob {
        name: args.name.clone().unwrap_or_else(|| args.draw.clone()),
        kind,
        analysis: args.analysis,
        draw: args.draw.clone(),
        x,
        y,
        constraints: args.constraints.clone(),
        prior_constraints: args.prior_constraints.clone(),
        compositions: args.compositions.clone(),
        quantiles: Vec::new(),
        intervals: Vec::new(),
        density: Density::default(),
        prior_ci: None,
        posterior_ci: None,
    })
}

fn open_source(input: &str) -> anyhow::Result<ParquetSource> {
    let source = ParquetSource::open(input).map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(files = source.files().len(), "opened dataset");
    Ok(source)
}

fn run_info(input: &str, json: bool) -> anyhow::Result<()> {
    let paths = resolve_paths(input).map_err(|e| anyhow::anyhow!("{e}"))?;
    if paths.is_empty() {
        anyhow::bail!("No Parquet files found: {input}");
    }
    let dataset = describe_dataset(&paths).map_err(|e| anyhow::anyhow!("{e}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&dataset)?);
    } else {
        print_summary(&dataset);
    }
    Ok(())
}

fn run_single(input: &str, job: PlotJob, out_dir: &Path, config: &Config) -> anyhow::Result<()> {
    let source = open_source(input)?;
    for job in job.variants() {
        let outcome = run_job(&source, &job, config).map_err(|e| anyhow::anyhow!("{}: {e}", job.name))?;
        let written = write_outcome(out_dir, &job, &outcome, config).map_err(|e| anyhow::anyhow!("{e}"))?;
        for path in written {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_plan(input: &str, plan_path: Option<&Path>, out_dir: &Path, config: &Config) -> anyhow::Result<()> {
    let plan = match plan_path {
        Some(p) => Plan::load(p),
        None => Plan::default_plan(),
    }
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    let source = open_source(input)?;
    let reports = plan.run(&source, config, |job, outcome| write_outcome(out_dir, job, outcome, config).map(|_| ()));
    print_reports(&reports);
    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} plots failed", reports.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_is_a_closed_choice() {
        let cli = Cli::try_parse_from([
            "pmssm", "credible", "scan.parquet", "--draw", "abs(chi10):g", "--x", "10,0,1000", "--y", "10,0,100",
            "--density", "prior",
        ])
        .unwrap();
        match cli.command {
            Commands::Credible { density, .. } => assert_eq!(Density::from(density), Density::Prior),
            _ => panic!("expected the credible subcommand"),
        }

        let bad = Cli::try_parse_from([
            "pmssm", "credible", "scan.parquet", "--draw", "abs(chi10):g", "--x", "10,0,1000", "--y", "10,0,100",
            "--density", "likelihood",
        ]);
        assert_eq!(bad.err().map(|e| e.kind()), Some(clap::error::ErrorKind::InvalidValue));
    }

    #[test]
    fn axis_strings() {
        let a = parse_axis("50, 0, 2500").unwrap();
        assert_eq!((a.bins, a.interval), (50, [0.0, 2500.0]));
        assert!(parse_axis("0,0,1").is_err());
        assert!(parse_axis("10,5,1").is_err());
        assert!(parse_axis("10,0").is_err());
    }
}
