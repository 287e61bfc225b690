//! RAG Eval Explorer CLI
//!
//! Compare evaluation runs and saved analyses, project a run into the
//! 3-axis metric space, and manage its cluster maps.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rag_eval_explorer::{
    analytics::{
        CaseStatus, DeltaRow, PriorityComparison, Quadrant, compare_analyses, compare_runs,
        projection::{cluster_stats, filter_by_clusters},
        project_run,
    },
    cluster::{ClusterPalette, ClusterRegistry, Delimiter, export_cluster_items},
    config::Config,
    model::{AnalysisResult, ClusterAssignment, ClusterItem, RunDetails, RunSummary},
    store::{AnalysisStore, ClusterMapStore, RunStore, file::FileStore, http::ApiClient},
};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// RAG Eval Explorer - compare evaluation runs and analyses
#[derive(Parser)]
#[command(name = "eval-explorer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML config file (default: user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List known runs
    Runs,

    /// Show a run's summary
    Info {
        /// Run id
        run: String,
    },

    /// Compare two runs (A is the base, B the target)
    CompareRuns {
        run_a: String,
        run_b: String,

        /// Number of metric rows and cases to show per section
        #[arg(short = 'n', long, default_value_t = 10)]
        top: usize,

        /// Only list cases with this status (regression, improvement, new, removed, same_pass, same_fail)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two saved analysis results
    CompareAnalyses {
        result_a: String,
        result_b: String,

        /// Number of numeric rows to show
        #[arg(short = 'n', long, default_value_t = 20)]
        top: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Project a run into the groundedness / relevance / summary space
    Project {
        run: String,

        /// Cluster map version to color by (default: newest)
        #[arg(long)]
        map_id: Option<String>,

        /// Ignore cluster maps entirely
        #[arg(long, conflicts_with = "map_id")]
        no_clusters: bool,

        /// Only show points in these clusters (repeatable)
        #[arg(short, long = "cluster")]
        clusters: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage a run's cluster maps
    Clusters {
        #[command(subcommand)]
        command: ClusterCommand,
    },
}

#[derive(Subcommand)]
enum ClusterCommand {
    /// List cluster map versions, newest first
    List { run: String },

    /// Show one version (default: newest)
    Show {
        run: String,
        #[arg(long)]
        map_id: Option<String>,
    },

    /// Import a two-column delimited file as a new version
    Import {
        run: String,
        file: PathBuf,

        /// comma, tab or semicolon (default: from file extension)
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Label stored with the version (default: file name)
        #[arg(long)]
        source: Option<String>,
    },

    /// Export a version as delimited text
    Export {
        run: String,
        #[arg(long)]
        map_id: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// comma, tab or semicolon (default: from output extension, else comma)
        #[arg(short, long)]
        delimiter: Option<String>,
    },

    /// Delete a version
    Delete { run: String, map_id: String },
}

/// Where the data comes from: local files or the dashboard API.
#[derive(Clone)]
enum Backend {
    File(FileStore),
    Api(ApiClient),
}

impl Backend {
    fn from_config(config: &Config) -> Result<Self> {
        if config.uses_api() {
            info!(api_base = %config.api.api_base, "using dashboard API");
            Ok(Backend::Api(
                ApiClient::new(&config.api).context("Failed to create API client")?,
            ))
        } else {
            info!(data_dir = %config.store.data_dir.display(), "using file store");
            Ok(Backend::File(FileStore::new(config.store.data_dir.clone())))
        }
    }
}

impl RunStore for Backend {
    async fn get_run(&self, run_id: &str) -> rag_eval_explorer::Result<RunDetails> {
        match self {
            Backend::File(s) => s.get_run(run_id).await,
            Backend::Api(s) => s.get_run(run_id).await,
        }
    }

    async fn list_runs(&self) -> rag_eval_explorer::Result<Vec<RunSummary>> {
        match self {
            Backend::File(s) => s.list_runs().await,
            Backend::Api(s) => s.list_runs().await,
        }
    }
}

impl AnalysisStore for Backend {
    async fn get_analysis(&self, result_id: &str) -> rag_eval_explorer::Result<AnalysisResult> {
        match self {
            Backend::File(s) => s.get_analysis(result_id).await,
            Backend::Api(s) => s.get_analysis(result_id).await,
        }
    }
}

impl ClusterMapStore for Backend {
    async fn list_cluster_maps(&self, run_id: &str) -> rag_eval_explorer::Result<Vec<ClusterAssignment>> {
        match self {
            Backend::File(s) => s.list_cluster_maps(run_id).await,
            Backend::Api(s) => s.list_cluster_maps(run_id).await,
        }
    }

    async fn get_cluster_map(
        &self,
        run_id: &str,
        map_id: Option<&str>,
    ) -> rag_eval_explorer::Result<ClusterAssignment> {
        match self {
            Backend::File(s) => s.get_cluster_map(run_id, map_id).await,
            Backend::Api(s) => s.get_cluster_map(run_id, map_id).await,
        }
    }

    async fn save_cluster_map(
        &self,
        run_id: &str,
        items: Vec<ClusterItem>,
        source: Option<String>,
    ) -> rag_eval_explorer::Result<ClusterAssignment> {
        match self {
            Backend::File(s) => s.save_cluster_map(run_id, items, source).await,
            Backend::Api(s) => s.save_cluster_map(run_id, items, source).await,
        }
    }

    async fn delete_cluster_map(&self, run_id: &str, map_id: &str) -> rag_eval_explorer::Result<()> {
        match self {
            Backend::File(s) => s.delete_cluster_map(run_id, map_id).await,
            Backend::Api(s) => s.delete_cluster_map(run_id, map_id).await,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "rag_eval_explorer=debug,eval_explorer=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(p) => Config::load_with_file(p).context("Failed to load configuration file")?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_ref())?;
    let backend = Backend::from_config(&config)?;

    match cli.command {
        Commands::Runs => cmd_runs(&backend).await,
        Commands::Info { run } => cmd_info(&backend, &run).await,
        Commands::CompareRuns {
            run_a,
            run_b,
            top,
            status,
            json,
        } => cmd_compare_runs(&backend, &run_a, &run_b, top, status.as_deref(), json).await,
        Commands::CompareAnalyses {
            result_a,
            result_b,
            top,
            json,
        } => cmd_compare_analyses(&backend, &result_a, &result_b, top, json).await,
        Commands::Project {
            run,
            map_id,
            no_clusters,
            clusters,
            json,
        } => cmd_project(&backend, &config, &run, map_id.as_deref(), no_clusters, clusters, json).await,
        Commands::Clusters { command } => cmd_clusters(backend, command).await,
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "—".to_string())
}

fn fmt_delta(value: Option<f64>) -> String {
    value.map(|v| format!("{:+.3}", v)).unwrap_or_else(|| "—".to_string())
}

fn print_delta_rows(rows: &[DeltaRow], top: usize) {
    println!("  {:<36} {:>8} {:>8} {:>8}", "Metric", "A", "B", "Delta");
    for row in rows.iter().take(top) {
        println!(
            "  {:<36} {:>8} {:>8} {:>8}",
            row.name,
            fmt_opt(row.value_a),
            fmt_opt(row.value_b),
            fmt_delta(row.delta)
        );
    }
    if rows.len() > top {
        println!("  ... {} more", rows.len() - top);
    }
}

async fn cmd_runs(backend: &Backend) -> Result<()> {
    let runs = backend.list_runs().await.context("Failed to list runs")?;
    if runs.is_empty() {
        println!("No runs found.");
        return Ok(());
    }

    println!("{:<28} {:<20} {:<20} {:>9} {:>7}", "Run", "Dataset", "Model", "Pass rate", "Cases");
    println!("{}", "─".repeat(88));
    for run in runs {
        println!(
            "{:<28} {:<20} {:<20} {:>8.1}% {:>7}",
            run.run_id,
            run.dataset_name,
            run.model_name,
            run.pass_rate * 100.0,
            run.total_test_cases
        );
    }
    Ok(())
}

async fn cmd_info(backend: &Backend, run_id: &str) -> Result<()> {
    let run = backend.get_run(run_id).await.context("Failed to load run")?;
    let s = &run.summary;

    println!("Run Information");
    println!("{}", "─".repeat(40));
    println!("  Run:          {}", s.run_id);
    println!("  Dataset:      {}", s.dataset_name);
    println!("  Model:        {}", s.model_name);
    println!("  Pass rate:    {:.1}%", s.pass_rate * 100.0);
    println!("  Cases:        {} passed / {} total", s.passed_test_cases, s.total_test_cases);
    println!("  Results:      {}", run.results.len());
    println!("  Metrics:      {}", s.metrics_evaluated.join(", "));
    if let Some(profile) = &s.threshold_profile {
        println!("  Thresholds:   {}", profile);
    }
    if let Some(started) = &s.started_at {
        println!("  Started:      {}", started);
    }
    if let Some(finished) = &s.finished_at {
        println!("  Finished:     {}", finished);
    }
    Ok(())
}

async fn cmd_compare_runs(
    backend: &Backend,
    run_a: &str,
    run_b: &str,
    top: usize,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let status_filter = match status {
        Some(s) => match CaseStatus::parse(s) {
            Some(parsed) => Some(parsed),
            None => {
                let known: Vec<&str> = CaseStatus::ALL.iter().map(|c| c.as_str()).collect();
                bail!("Unknown status '{}'. Expected one of: {}", s, known.join(", "));
            }
        },
        None => None,
    };

    let (a, b) = tokio::try_join!(backend.get_run(run_a), backend.get_run(run_b))
        .context("Failed to load runs")?;
    let comparison = compare_runs(&a, &b);

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    println!("Run Comparison: {} → {}", comparison.run_a, comparison.run_b);
    println!("{}", "─".repeat(60));
    println!(
        "  Pass rate:    {:.1}% → {:.1}%  ({:+.1} pts)",
        comparison.pass_rate_a * 100.0,
        comparison.pass_rate_b * 100.0,
        comparison.pass_rate_delta * 100.0
    );
    let c = &comparison.counts;
    println!(
        "  Cases:        {} regressions, {} improvements, {} new, {} removed, {} same pass, {} same fail",
        c.regression, c.improvement, c.new, c.removed, c.same_pass, c.same_fail
    );
    if comparison.threshold_profile_changed {
        println!("  Note:         threshold profiles differ");
    }

    println!("\nMetric averages:");
    print_delta_rows(&comparison.metric_deltas, top);

    if comparison.threshold_deltas.iter().any(|r| r.delta != Some(0.0)) {
        println!("\nThresholds:");
        print_delta_rows(&comparison.threshold_deltas, top);
    }

    let statuses: Vec<CaseStatus> = match status_filter {
        Some(s) => vec![s],
        None => vec![CaseStatus::Regression, CaseStatus::Improvement],
    };
    for s in statuses {
        let cases: Vec<_> = comparison.cases_with_status(s).collect();
        if cases.is_empty() {
            continue;
        }
        println!("\n{} ({}):", s, cases.len());
        for t in cases.iter().take(top) {
            let worst = t
                .metric_deltas
                .first()
                .map(|r| format!("{} {}", r.name, fmt_delta(r.delta)))
                .unwrap_or_default();
            let question: String = t.question.chars().take(60).collect();
            println!("  {:<16} {:<32} {}", t.test_case_id, worst, question);
        }
        if cases.len() > top {
            println!("  ... {} more", cases.len() - top);
        }
    }

    Ok(())
}

async fn cmd_compare_analyses(
    backend: &Backend,
    result_a: &str,
    result_b: &str,
    top: usize,
    json: bool,
) -> Result<()> {
    let (a, b) = tokio::try_join!(backend.get_analysis(result_a), backend.get_analysis(result_b))
        .context("Failed to load analysis results")?;
    let comparison = compare_analyses(&a, &b);

    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
        return Ok(());
    }

    println!("Analysis Comparison: {} → {}", comparison.result_a, comparison.result_b);
    println!("{}", "─".repeat(60));

    if comparison.metric_deltas.is_empty() {
        println!("  No numeric outputs found.");
    } else {
        print_delta_rows(&comparison.metric_deltas, top);
    }

    let changed: Vec<_> = comparison.node_changes.iter().filter(|n| n.changed).collect();
    if !changed.is_empty() {
        println!("\nNode status changes:");
        for n in changed {
            println!(
                "  {:<28} {} → {}",
                n.node_id,
                n.status_a.as_deref().unwrap_or("—"),
                n.status_b.as_deref().unwrap_or("—")
            );
        }
    }

    println!("\nPriority cases:");
    match &comparison.priority {
        PriorityComparison::Comparable(diff) => {
            for (label, set) in [("bottom", &diff.bottom), ("impact", &diff.impact)] {
                println!(
                    "  {:<8} +{} added, -{} removed, {} shared",
                    label,
                    set.added.len(),
                    set.removed.len(),
                    set.shared.len()
                );
            }
            for row in diff.metric_deltas.iter().take(top) {
                println!("  {:<36} {:>4} → {:<4} ({:+})", row.metric, row.count_a, row.count_b, row.delta);
            }
        }
        PriorityComparison::NotComparable { missing } => {
            println!("  Not comparable: priority summary missing on side {:?}", missing);
        }
    }

    Ok(())
}

async fn cmd_project(
    backend: &Backend,
    config: &Config,
    run_id: &str,
    map_id: Option<&str>,
    no_clusters: bool,
    clusters: Vec<String>,
    json: bool,
) -> Result<()> {
    let run = backend.get_run(run_id).await.context("Failed to load run")?;

    let registry = ClusterRegistry::new(backend.clone());
    let state = if no_clusters {
        rag_eval_explorer::ClusterState::unclustered(run_id)
    } else {
        let state = registry
            .resolve_state(run_id, map_id)
            .await
            .context("Failed to load cluster maps")?;
        match map_id {
            Some(id) => state.select(id).context("Cluster map not available")?,
            None => state,
        }
    };

    let projection = project_run(&run.results, state.active());
    let selected: HashSet<String> = clusters.into_iter().collect();
    let points = filter_by_clusters(&projection.points, &selected);

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    let threshold = config.projection.quadrant_threshold;
    let palette_override = config.projection.palette.clone().unwrap_or_default();
    let palette = ClusterPalette::for_points(&projection.points, &palette_override);

    println!("Projection: {}", run_id);
    println!("{}", "─".repeat(60));
    match state.active() {
        Some(active) => println!(
            "  Cluster map:  {} ({}), {:.0}% coverage",
            active.map_id,
            active.source.as_deref().unwrap_or("unnamed"),
            projection.coverage.percent()
        ),
        None => println!("  Cluster map:  none"),
    }
    if !projection.unmatched_ids.is_empty() {
        println!("  Unmatched:    {} ids not in this run", projection.unmatched_ids.len());
    }

    println!(
        "\n  {:<16} {:>6} {:>6} {:>6} {:>6} {:>6}  {:<14} {}",
        "Case", "x", "y", "z", "avg", "pass", "quadrant", "cluster"
    );
    for p in &points {
        let cluster = match p.cluster_id.as_deref() {
            Some(id) => format!("{} {}", id, palette.color_of(id).unwrap_or("")),
            None => "—".to_string(),
        };
        println!(
            "  {:<16} {:>6.3} {:>6.3} {:>6.3} {:>6.3} {:>5.0}%  {:<14} {}",
            p.id,
            p.x,
            p.y,
            p.z,
            p.avg,
            p.pass_rate * 100.0,
            Quadrant::classify(p.x, p.y, threshold).label(),
            cluster
        );
    }

    let stats = cluster_stats(&projection.points);
    if !stats.is_empty() {
        println!("\nClusters:");
        for s in stats {
            println!(
                "  {:<20} {:>5} cases  avg {:.3}  pass {:.0}%",
                s.cluster_id,
                s.count,
                s.mean_avg,
                s.mean_pass_rate * 100.0
            );
        }
    }

    Ok(())
}

fn parse_delimiter(name: Option<&str>, fallback: Delimiter) -> Result<Delimiter> {
    match name {
        Some(n) => Delimiter::parse(n).with_context(|| format!("Unknown delimiter '{}'", n)),
        None => Ok(fallback),
    }
}

async fn cmd_clusters(backend: Backend, command: ClusterCommand) -> Result<()> {
    let registry = ClusterRegistry::new(backend);

    match command {
        ClusterCommand::List { run } => {
            let versions = registry.list(&run).await.context("Failed to list cluster maps")?;
            if versions.is_empty() {
                println!("No cluster maps for run '{}'.", run);
                return Ok(());
            }
            for (i, v) in versions.iter().enumerate() {
                let marker = if i == 0 { "*" } else { " " };
                println!(
                    "{} {:<18} {}  {:>5} items  {}",
                    marker,
                    v.map_id,
                    v.created_at.format("%Y-%m-%d %H:%M:%S"),
                    v.items.len(),
                    v.source.as_deref().unwrap_or("")
                );
            }
        }
        ClusterCommand::Show { run, map_id } => {
            let assignment = match map_id {
                Some(id) => registry.get_by_id(&run, &id).await,
                None => registry
                    .latest(&run)
                    .await?
                    .ok_or_else(|| rag_eval_explorer::ExplorerError::cluster_map_not_found(&run, None)),
            }
            .context("Failed to load cluster map")?;
            println!("{}", serde_json::to_string_pretty(&assignment)?);
        }
        ClusterCommand::Import {
            run,
            file,
            delimiter,
            source,
        } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read '{}'", file.display()))?;
            let delimiter = parse_delimiter(delimiter.as_deref(), Delimiter::from_path(&file))?;
            let source = source.or_else(|| {
                file.file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            });

            let (saved, upload) = registry
                .import(&run, &text, delimiter, source)
                .await
                .context("Failed to save cluster map")?;
            println!("Saved cluster map {} ({} items)", saved.map_id, saved.items.len());
            if upload.skipped > 0 {
                println!("  Skipped {} malformed lines", upload.skipped);
            }
        }
        ClusterCommand::Export {
            run,
            map_id,
            output,
            delimiter,
        } => {
            let assignment = match map_id {
                Some(id) => registry.get_by_id(&run, &id).await,
                None => registry
                    .latest(&run)
                    .await?
                    .ok_or_else(|| rag_eval_explorer::ExplorerError::cluster_map_not_found(&run, None)),
            }
            .context("Failed to load cluster map")?;

            let fallback = output.as_deref().map(Delimiter::from_path).unwrap_or_default();
            let delimiter = parse_delimiter(delimiter.as_deref(), fallback)?;
            let text = export_cluster_items(&assignment.items, delimiter);

            match output {
                Some(path) => {
                    tokio::fs::write(&path, text)
                        .await
                        .with_context(|| format!("Failed to write '{}'", path.display()))?;
                    println!("Exported {} items to {}", assignment.items.len(), path.display());
                }
                None => print!("{}", text),
            }
        }
        ClusterCommand::Delete { run, map_id } => {
            let state = registry
                .resolve_state(&run, None)
                .await
                .context("Failed to load cluster maps")?;
            let state = registry
                .delete_and_resolve(state, &map_id)
                .await
                .context("Failed to delete cluster map")?;
            println!("Deleted cluster map {}", map_id);
            match state.active_id() {
                Some(id) => println!("  Active version is now {}", id),
                None => println!("  No cluster maps remain; run is unclustered"),
            }
        }
    }

    Ok(())
}
