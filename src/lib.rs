//! RAG Eval Explorer - comparative analytics for RAG evaluation runs.
//!
//! Takes evaluation runs (dataset x model x metric set), saved pipeline
//! analyses and cluster maps, and derives the numbers a results dashboard
//! shows: metric deltas, pass/fail transitions, priority-set diffs, numeric
//! diffs of arbitrary analysis output, and a 3-axis projection colored by
//! cluster.
//!
//! # Overview
//!
//! The analytics are pure functions over already-fetched data. Fetching goes
//! through the store traits, which have file, HTTP and in-memory adapters.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_eval_explorer::{
//!     analytics::{compare_runs, project_run},
//!     cluster::ClusterRegistry,
//!     store::{RunStore, file::FileStore},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = FileStore::new("data");
//!
//!     // Fetch both operands, then compare
//!     let (a, b) = tokio::try_join!(store.get_run("run-a"), store.get_run("run-b"))?;
//!     let comparison = compare_runs(&a, &b);
//!     println!(
//!         "pass rate {:+.3}, {} regressions, {} improvements",
//!         comparison.pass_rate_delta, comparison.counts.regression, comparison.counts.improvement
//!     );
//!
//!     // Project run B, colored by its newest cluster map
//!     let registry = ClusterRegistry::new(store.clone());
//!     let state = registry.resolve_state("run-b", None).await?;
//!     let projection = project_run(&b.results, state.active());
//!     println!("{:.0}% of cases clustered", projection.coverage.percent());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **model**: runs, test cases, metric scores, priority summaries, cluster maps
//! - **analytics**: normalizer, aggregates, deltas, transitions, priority diff,
//!   numeric extraction, projection, comparison reports
//! - **cluster**: delimited upload/export, palette, versioned registry
//! - **store**: store traits plus file, HTTP and in-memory adapters

pub mod analytics;
pub mod cluster;
pub mod config;
pub mod error;
pub mod model;
pub mod store;

// Re-export commonly used types
pub use analytics::{AnalysisComparison, CaseStatus, DeltaRow, RunComparison, ScatterPoint};
pub use cluster::{ClusterRegistry, ClusterState};
pub use config::Config;
pub use error::{ExplorerError, Result};
pub use model::{
    AnalysisResult, ClusterAssignment, ClusterItem, MetricScore, PriorityCase, PrioritySummary,
    RunDetails, RunSummary, TestCaseResult,
};
