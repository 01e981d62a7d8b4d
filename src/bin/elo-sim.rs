use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use elo_consensus::records::{
    join_judgments, parse_comparison_line, task_items, truth_ratings, AnswerRecord, TaskRecord, TruthRecord,
};
use elo_consensus::{
    run_empirical, run_synthetic, sample_population, EmpiricalConfig, EnsembleConfig, LabelPolicy, RaterPopulation,
    SimulationHarness, SyntheticConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "elo-sim",
    version,
    about = "Elo convergence and majority-vote simulations on pairwise comparisons"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate raters and items, and compare Elo labels with a majority vote.
    Synthetic(SyntheticArgs),
    /// Measure label recovery on recorded `a,b,score` comparisons.
    Empirical(EmpiricalArgs),
    /// Replay crowdsourced judgments across an ensemble of shuffles.
    Ensemble(EnsembleArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LabelPolicyArg {
    Zero,
    Median,
}

impl From<LabelPolicyArg> for LabelPolicy {
    fn from(value: LabelPolicyArg) -> Self {
        match value {
            LabelPolicyArg::Zero => LabelPolicy::ZeroThreshold,
            LabelPolicyArg::Median => LabelPolicy::MedianSplit,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SyntheticArgs {
    /// Number of items.
    items: usize,
    /// Number of raters, spammers included.
    raters: usize,
    #[arg(long, default_value_t = 3)]
    individual_votes: usize,
    #[arg(long, default_value_t = 0)]
    spammers: usize,
    #[arg(long, default_value_t = 0.5)]
    personal_threshold_variance: f64,
    #[arg(long, default_value_t = 0.5)]
    perception_ambiguity: f64,
    #[arg(long, default_value_t = 0.5)]
    comparison_ambiguity: f64,
    /// Alpha of the Beta distribution behind the bad-feature importance.
    #[arg(long, requires = "beta")]
    alpha: Option<f64>,
    /// Beta of the Beta distribution behind the bad-feature importance.
    #[arg(long, requires = "alpha")]
    beta: Option<f64>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 10_000)]
    max_comparisons: usize,
    #[arg(long, default_value_t = 1000)]
    report_distance: usize,
    #[arg(long, default_value_t = 20)]
    epochs: usize,
    #[arg(long, default_value_t = 0.15)]
    k_value: f64,
    #[arg(long, value_enum, default_value_t = LabelPolicyArg::Zero)]
    label_policy: LabelPolicyArg,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct EmpiricalArgs {
    /// File of `itemA,itemB,score` lines.
    comparisons: PathBuf,
    /// Number of items subsetted from the full set.
    items: usize,
    #[arg(long, default_value_t = 0)]
    selection_seed: u64,
    #[arg(long, default_value_t = 0)]
    shuffle_seed: u64,
    #[arg(long, default_value_t = 1000)]
    report_distance: usize,
    #[arg(long, default_value_t = 20)]
    epochs: usize,
    #[arg(long, default_value_t = 0.15)]
    k_value: f64,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct EnsembleArgs {
    /// JSON-lines task records.
    tasks: PathBuf,
    /// JSON-lines answer records.
    answers: PathBuf,
    /// JSON-lines ground-truth records.
    truth: PathBuf,
    /// Number of items to keep for a smaller run.
    sample: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 10)]
    size: usize,
    #[arg(long, default_value_t = 16.0)]
    k_value: f64,
    #[arg(long, default_value_t = 1)]
    epochs: usize,
    #[arg(long, default_value_t = 1500.0)]
    initial_rating: f64,
    #[arg(long, default_value_t = 5)]
    snapshot_every: usize,
    /// Per-replica rating series, one JSON object per line.
    #[arg(long)]
    ratings_out: Option<PathBuf>,
    /// Per-replica ranking series, one JSON object per line.
    #[arg(long)]
    rankings_out: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
struct EnsembleSummary<'a> {
    params: &'a EnsembleConfig,
    cardinality: usize,
    matches: usize,
    average_rating_diffs: &'a [f64],
    average_ranking_diffs: &'a [f64],
    average_true_rating_diffs: &'a [f64],
    average_true_ranking_diffs: &'a [f64],
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Synthetic(args) => synthetic(args),
        Commands::Empirical(args) => empirical(args),
        Commands::Ensemble(args) => ensemble(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn synthetic(args: SyntheticArgs) -> Result<()> {
    let config = SyntheticConfig {
        items: args.items,
        population: RaterPopulation {
            raters: args.raters,
            spammers: args.spammers,
            threshold_spread: args.personal_threshold_variance,
            perception_ambiguity: args.perception_ambiguity,
            comparison_ambiguity: args.comparison_ambiguity,
            feature_importance: args.alpha.zip(args.beta),
        },
        votes_per_item: args.individual_votes,
        seed: args.seed,
        max_comparisons: args.max_comparisons,
        report_distance: args.report_distance,
        epochs: args.epochs,
        k: args.k_value,
        label_policy: args.label_policy.into(),
    };

    let report = run_synthetic(&config).context("synthetic simulation failed")?;
    write_json(args.output.as_deref(), &report)
}

fn empirical(args: EmpiricalArgs) -> Result<()> {
    let reader = open(&args.comparisons)?;
    let mut comparisons = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", args.comparisons.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let comparison = parse_comparison_line(&line)
            .with_context(|| format!("{}:{}", args.comparisons.display(), line_no + 1))?;
        comparisons.push(comparison);
    }
    info!(comparisons = comparisons.len(), "loaded comparisons");

    let config = EmpiricalConfig {
        items: args.items,
        selection_seed: args.selection_seed,
        shuffle_seed: args.shuffle_seed,
        report_distance: args.report_distance,
        epochs: args.epochs,
        k: args.k_value,
    };
    let report = run_empirical(comparisons, &config).context("empirical scaling failed")?;
    write_json(args.output.as_deref(), &report)
}

fn ensemble(args: EnsembleArgs) -> Result<()> {
    let tasks: Vec<TaskRecord> = read_json_lines(&args.tasks)?;
    let answers: Vec<AnswerRecord> = read_json_lines(&args.answers)?;
    let truth_records: Vec<TruthRecord> = read_json_lines(&args.truth)?;

    let all_items: Vec<String> = task_items(&tasks).into_iter().collect();
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let items = sample_population(&all_items, args.sample, &mut rng).context("failed to sample items")?;
    let keep = items.iter().cloned().collect();

    let matches = join_judgments(&tasks, &answers, &keep).context("failed to build matches")?;
    let truth = truth_ratings(&truth_records, &keep);
    info!(
        tasks = tasks.len(),
        answers = answers.len(),
        items = items.len(),
        matches = matches.len(),
        "loaded judgments"
    );

    let config = EnsembleConfig {
        ensemble_size: args.size,
        epochs: args.epochs,
        k: args.k_value,
        initial_rating: args.initial_rating,
        snapshot_every: args.snapshot_every,
        seed: args.seed,
    };
    let report = SimulationHarness::new(config)?
        .with_truth(&truth)
        .run(&items, &matches)
        .context("ensemble run failed")?;

    if let Some(path) = &args.ratings_out {
        write_json_lines(path, report.replicas.iter().map(|r| &r.rating_series))?;
    }
    if let Some(path) = &args.rankings_out {
        write_json_lines(path, report.replicas.iter().map(|r| &r.ranking_series))?;
    }

    let summary = EnsembleSummary {
        params: &report.params,
        cardinality: report.cardinality,
        matches: report.matches,
        average_rating_diffs: &report.average_rating_diffs,
        average_ranking_diffs: &report.average_ranking_diffs,
        average_true_rating_diffs: &report.average_true_rating_diffs,
        average_true_ranking_diffs: &report.average_true_ranking_diffs,
    };
    write_json(args.output.as_deref(), &summary)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for (line_no, line) in open(path)?.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), line_no + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn write_json_lines<'a, T: Serialize + 'a>(path: &Path, values: impl Iterator<Item = &'a T>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        serde_json::to_writer(&mut writer, value)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, value)?;
            writeln!(writer)?;
            writer.flush()?;
            info!(path = %path.display(), "report written");
        }
        None => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}
