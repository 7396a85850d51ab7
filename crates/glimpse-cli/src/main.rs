//! Glimpse CLI
//!
//! - `glimpse summarize`: simulate user query logs over a knowledge graph,
//!   build one summary per user and method from the training half, and score
//!   it on the held-out half
//! - `glimpse generate`: write synthetic question records for given topics
//!
//! Logs are drawn either from topic entities (`--n-topic-mids`) or from
//! named `by-topic` question lists (`--n-topics`).

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use glimpse_core::{generate, Budget, GenerateOptions, GraphStore, GraphView, SummarizeConfig};
use glimpse_ingest::{
    load_entity_names, load_into, load_questions_from_dir, open_triples, save_question,
    write_mid_lists, write_topic_list, EntityNaming, EntityScheme, LabelCleanup, QuestionRecord,
    TripleFormat,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

mod config;
mod metrics;
mod workload;

use config::{FileConfig, WorkloadConfig};
use metrics::{average_query_log_metrics, total_query_log_metrics, Scores};
use workload::{
    load_named_topics, queries, query_log_by_mids, query_log_by_topics, sample_named_topics,
    sample_topics, train_test_split, LogStats, NamedTopic, QuestionPool,
};

#[derive(Parser)]
#[command(name = "glimpse")]
#[command(
    author,
    version,
    about = "Glimpse: query-relevant knowledge graph summaries"
)]
struct Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// TOML file with `[summarize]`, `[workload]` and `[[method]]` tables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a graph for simulated users and score the summaries.
    Summarize(SummarizeArgs),

    /// Write synthetic question records rooted at the given topics.
    Generate(GenerateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// Tab-separated, last column dropped
    Tsv,
    /// `subject relation object .`
    Nt,
}

impl From<FormatArg> for TripleFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Tsv => TripleFormat::Tsv,
            FormatArg::Nt => TripleFormat::NTriples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CleanupArg {
    #[value(name = "none")]
    Keep,
    Punctuation,
    Freebase,
}

impl From<CleanupArg> for LabelCleanup {
    fn from(cleanup: CleanupArg) -> Self {
        match cleanup {
            CleanupArg::Keep => LabelCleanup::None,
            CleanupArg::Punctuation => LabelCleanup::Punctuation,
            CleanupArg::Freebase => LabelCleanup::FreebasePrefix,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct GraphArgs {
    /// Triple dump (`.gz` is decompressed on the fly)
    #[arg(long)]
    triples: PathBuf,

    #[arg(long, value_enum, default_value_t = FormatArg::Tsv)]
    format: FormatArg,

    /// Label normalization applied while reading (TSV only)
    #[arg(long, value_enum, default_value_t = CleanupArg::Keep)]
    cleanup: CleanupArg,

    /// Stop after this many distinct triples
    #[arg(long)]
    head: Option<usize>,
}

#[derive(Args, Debug, Clone)]
struct SummarizeArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Directory of question JSON files to replay, with optional
    /// `by-topic/<topic>.list` files
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Summary size in triples
    #[arg(long, conflicts_with = "percent_triples")]
    k: Option<i64>,

    /// Summary size as a fraction of the graph's triples
    #[arg(long)]
    percent_triples: Option<f64>,

    #[arg(long)]
    n_users: Option<usize>,

    /// Queries per user log
    #[arg(long)]
    n_queries: Option<usize>,

    /// Topic entities per user
    #[arg(long)]
    n_topic_mids: Option<usize>,

    /// Named topics per user, drawn from `<queries>/by-topic`
    #[arg(long)]
    n_topics: Option<usize>,

    /// Topic entities drawn from each named topic
    #[arg(long)]
    n_mids_per_topic: Option<usize>,

    /// Fraction of each log replaced by questions drawn from the whole pool
    #[arg(long)]
    random_query_prob: Option<f64>,

    #[arg(long)]
    shuffle: bool,

    #[arg(long)]
    test_size: Option<f64>,

    /// Methods to run (built-in: `glimpse`, `glimpse-2`)
    #[arg(long = "method", default_value = "glimpse")]
    methods: Vec<String>,

    /// Selector sampling accuracy
    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Write per-user results as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write every summary as `user<N>-<method>.tsv` into this directory
    #[arg(long)]
    summaries: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct GenerateArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Topic entity labels
    #[arg(long, value_delimiter = ',', required = true)]
    topics: Vec<String>,

    #[arg(long, default_value_t = 1)]
    n_per_topic: usize,

    /// Maximum number of relations per question
    #[arg(long, default_value_t = 3)]
    chain_length: usize,

    /// Probability of adding one constraint to a question
    #[arg(long, default_value_t = 0.0)]
    constraint_prob: f64,

    /// Output directory; `by-mid/<topic>.list` files are appended there too
    #[arg(long)]
    out: PathBuf,

    /// Also list the questions in `<out>/by-topic/<name>.list`
    #[arg(long)]
    topic_name: Option<String>,

    /// `mid<TAB>name` file (header line first) naming answer entities
    #[arg(long)]
    entity_names: Option<PathBuf>,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Commands::Summarize(args) => cmd_summarize(file, &args),
        Commands::Generate(args) => cmd_generate(&args),
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_graph(args: &GraphArgs) -> Result<GraphStore> {
    let mut source = open_triples(&args.triples, args.format.into(), args.cleanup.into())
        .with_context(|| format!("failed to open {}", args.triples.display()))?;
    let mut graph = GraphStore::new();
    load_into(&mut graph, &mut *source, args.head)
        .with_context(|| format!("failed to load {}", args.triples.display()))?;
    Ok(graph)
}

// ============================================================================
// summarize
// ============================================================================

/// One (user, method) evaluation.
#[derive(Debug, Clone, Serialize)]
struct MethodRun {
    user: usize,
    method: String,
    k: usize,
    summary_triples: usize,
    objective: f64,
    runtime_secs: f64,
    train_queries: usize,
    test_queries: usize,
    total: Scores,
    average: Scores,
}

/// Fold command-line overrides into the file configuration.
fn apply_overrides(file: &mut FileConfig, args: &SummarizeArgs) {
    if let Some(k) = args.k {
        file.summarize.budget = Budget::Triples(k);
    }
    if let Some(fraction) = args.percent_triples {
        file.summarize.budget = Budget::Fraction(fraction);
    }
    if let Some(eps) = args.epsilon {
        file.summarize.epsilon = Some(eps);
    }
    if let Some(seed) = args.seed {
        file.summarize.seed = seed;
    }

    let workload = &mut file.workload;
    if let Some(n) = args.n_users {
        workload.n_users = n;
    }
    if let Some(n) = args.n_queries {
        workload.n_queries = n;
    }
    if let Some(n) = args.n_topic_mids {
        workload.n_topic_mids = n;
    }
    if let Some(n) = args.n_topics {
        workload.n_topics = Some(n);
    }
    if let Some(n) = args.n_mids_per_topic {
        workload.n_mids_per_topic = n;
    }
    if let Some(p) = args.random_query_prob {
        workload.random_query_prob = p;
    }
    if let Some(t) = args.test_size {
        workload.test_size = t;
    }
    workload.shuffle |= args.shuffle;
}

/// Everything a simulated user shares with the others.
struct Simulation<'a> {
    graph: &'a GraphStore,
    pool: &'a QuestionPool,
    topics: &'a [NamedTopic],
    workload: &'a WorkloadConfig,
    methods: &'a [(String, SummarizeConfig)],
    seed: u64,
    summary_dir: Option<&'a Path>,
}

fn cmd_summarize(mut file: FileConfig, args: &SummarizeArgs) -> Result<()> {
    apply_overrides(&mut file, args);
    file.workload.validate()?;
    if file.workload.n_topics.is_some() && args.queries.is_none() {
        bail!("--n-topics needs --queries pointing at a directory with by-topic lists");
    }
    let methods = file.methods(&args.methods)?;

    let graph = load_graph(&args.graph)?;
    if graph.number_of_triples() == 0 {
        bail!("{} holds no triples", args.graph.triples.display());
    }

    let pool = match &args.queries {
        Some(dir) => {
            let records = load_questions_from_dir(dir)
                .with_context(|| format!("failed to load questions from {}", dir.display()))?;
            QuestionPool::from_records(&graph, records.values())
        }
        None => QuestionPool::new(),
    };

    let topics = match (&args.queries, file.workload.n_topics) {
        (Some(dir), Some(_)) => {
            let topics = load_named_topics(&graph, dir)?;
            if topics.is_empty() {
                bail!("no topic list under {} names an entity of the graph", dir.display());
            }
            topics
        }
        _ => Vec::new(),
    };

    if let Some(dir) = &args.summaries {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let sim = Simulation {
        graph: &graph,
        pool: &pool,
        topics: &topics,
        workload: &file.workload,
        methods: &methods,
        seed: file.summarize.seed,
        summary_dir: args.summaries.as_deref(),
    };
    let runs: Vec<Vec<MethodRun>> = (0..file.workload.n_users)
        .into_par_iter()
        .map(|user| run_user(&sim, user))
        .collect::<Result<Vec<_>>>()?;
    let runs: Vec<MethodRun> = runs.into_iter().flatten().collect();

    print_report(&graph, &file.workload, &methods, &runs);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&runs)?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }
    Ok(())
}

fn run_user(sim: &Simulation<'_>, user: usize) -> Result<Vec<MethodRun>> {
    let Simulation {
        graph,
        pool,
        workload,
        ..
    } = *sim;
    let user_seed = sim.seed.wrapping_add(user as u64);
    let mut rng = StdRng::seed_from_u64(user_seed);

    let log = match workload.n_topics {
        Some(n_topics) => {
            let topics = sample_named_topics(sim.topics, n_topics, &mut rng);
            query_log_by_topics(graph, &topics, pool, workload, &mut rng)
        }
        None => {
            let mids = sample_topics(graph, pool, workload.n_topic_mids, &mut rng);
            query_log_by_mids(graph, &mids, pool, workload, &mut rng)
        }
    };
    let stats = LogStats::of(&log);
    tracing::info!(
        user,
        queries = stats.queries,
        distinct = stats.distinct,
        reuse = stats.reuse,
        topics = stats.entity_counts.len(),
        relations = stats.relation_counts.len(),
        "simulated query log"
    );

    let (train, test) = train_test_split(&log, workload.test_size, &mut rng);
    let train_queries = queries(&train);

    let mut runs = Vec::with_capacity(sim.methods.len());
    for (name, config) in sim.methods {
        let start = Instant::now();
        let k = config.budget.resolve(graph.number_of_triples())?;
        let values = config.value_model()?.annotate(graph, &train_queries)?;
        let mut select_rng = StdRng::seed_from_u64(user_seed);
        let summary = config.selector()?.select(graph, &values, k, &mut select_rng);
        let runtime = start.elapsed();

        if let Some(dir) = sim.summary_dir {
            let path = dir.join(format!("user{user}-{name}.tsv"));
            write_summary(&path, &summary.labeled_triples())?;
        }

        let total = total_query_log_metrics(&summary, graph, &test);
        let average = average_query_log_metrics(&summary, &test);
        tracing::info!(
            user,
            method = %name,
            k,
            runtime_ms = runtime.as_millis() as u64,
            total_f1 = total.f1,
            average_f1 = average.f1,
            "evaluated summary"
        );

        runs.push(MethodRun {
            user,
            method: name.clone(),
            k,
            summary_triples: summary.len(),
            objective: summary.objective(),
            runtime_secs: runtime.as_secs_f64(),
            train_queries: train.len(),
            test_queries: test.len(),
            total,
            average,
        });
    }
    Ok(runs)
}

/// One `subject<TAB>relation<TAB>object<TAB>.` line per triple, readable
/// back as a TSV dump.
fn write_summary(path: &Path, triples: &[(&str, &str, &str)]) -> Result<()> {
    let mut text = String::new();
    for (subject, relation, object) in triples {
        text.push_str(&format!("{subject}\t{relation}\t{object}\t.\n"));
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn mean<F: Fn(&MethodRun) -> f64>(runs: &[&MethodRun], f: F) -> f64 {
    if runs.is_empty() {
        return 0.0;
    }
    runs.iter().map(|&r| f(r)).sum::<f64>() / runs.len() as f64
}

fn print_report(
    graph: &GraphStore,
    workload: &WorkloadConfig,
    methods: &[(String, SummarizeConfig)],
    runs: &[MethodRun],
) {
    println!("{}", "Glimpse summaries".green().bold());
    println!(
        "graph: {} triples, {} entities, {} relations",
        graph.number_of_triples(),
        graph.number_of_entities(),
        graph.number_of_relations()
    );
    let topics = match workload.n_topics {
        Some(n) => format!("{n} named x {} mids", workload.n_mids_per_topic),
        None => workload.n_topic_mids.to_string(),
    };
    println!(
        "users: {}  queries/user: {}  topics/user: {}  test_size: {}",
        workload.n_users, workload.n_queries, topics, workload.test_size
    );
    println!();
    println!(
        "{:<12} {:>8} {:>10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "method", "k", "secs", "F1", "P", "R", "avg F1", "avg P", "avg R"
    );
    for (name, _) in methods {
        let rows: Vec<&MethodRun> = runs.iter().filter(|r| &r.method == name).collect();
        let k = rows.first().map(|r| r.k).unwrap_or(0);
        println!(
            "{:<12} {:>8} {:>10.3} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4} {:>8.4}",
            name.bold(),
            k,
            mean(&rows, |r| r.runtime_secs),
            mean(&rows, |r| r.total.f1),
            mean(&rows, |r| r.total.precision),
            mean(&rows, |r| r.total.recall),
            mean(&rows, |r| r.average.f1),
            mean(&rows, |r| r.average.precision),
            mean(&rows, |r| r.average.recall),
        );
    }
}

// ============================================================================
// generate
// ============================================================================

fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    if args.chain_length == 0 {
        bail!("--chain-length must be positive");
    }
    if !(0.0..=1.0).contains(&args.constraint_prob) {
        bail!("--constraint-prob must be in [0, 1], got {}", args.constraint_prob);
    }

    let names = match &args.entity_names {
        Some(path) => load_entity_names(path)
            .with_context(|| format!("failed to load entity names from {}", path.display()))?,
        None => Default::default(),
    };
    let scheme = EntityScheme::for_source(args.graph.format.into(), args.graph.cleanup.into());
    let naming = EntityNaming::new(scheme, names);

    let graph = load_graph(&args.graph)?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let records = generate_records(&graph, args, &naming, &mut rng)?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    for record in &records {
        save_question(record, &question_path(&args.out, &record.question_id))?;
    }
    write_mid_lists(&args.out, records.iter())?;
    if let Some(topic) = &args.topic_name {
        write_topic_list(&args.out, topic, records.iter())?;
    }

    eprintln!(
        "{} wrote {} questions to {}",
        "ok".green().bold(),
        records.len(),
        args.out.display()
    );
    Ok(())
}

fn question_path(dir: &Path, qid: &str) -> PathBuf {
    dir.join(format!("{qid}.json"))
}

fn generate_records<R: Rng + ?Sized>(
    graph: &GraphStore,
    args: &GenerateArgs,
    naming: &EntityNaming,
    rng: &mut R,
) -> Result<Vec<QuestionRecord>> {
    let mut records = Vec::new();
    for label in &args.topics {
        let topic = graph
            .entity_id(label)
            .map_err(|e| anyhow!("topic `{label}`: {e}"))?;
        for i in 0..args.n_per_topic {
            let mut options = GenerateOptions::chain(args.chain_length);
            if rng.gen_bool(args.constraint_prob) {
                options = options.with_constraint_at(rng.gen_range(1..=args.chain_length));
            }
            let query = generate(graph, topic, &options, rng);
            if query.chain.is_empty() {
                tracing::warn!(topic = %label, "topic has no outgoing relations");
                break;
            }
            let qid = format!("Synth-{topic}-{i}");
            records.push(QuestionRecord::from_query_with(graph, &query, qid, naming)?);
        }
    }
    Ok(records)
}
