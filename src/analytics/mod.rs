//! Comparative analytics over evaluation results.
//!
//! Every function in this module is pure and synchronous: it takes already
//! fetched runs, analyses or cluster assignments and returns derived values.
//!
//! - [`normalize`]: raw score to [0, 1]
//! - [`aggregate`]: averages that never yield NaN
//! - [`delta`]: two-sided metric tables
//! - [`transition`]: pass/fail transitions between runs
//! - [`priority`]: bottom-performer / high-impact set diffs
//! - [`extract`]: numeric leaves of arbitrary JSON
//! - [`projection`]: 3-axis scatter projection
//! - [`compare`]: the run and analysis comparison reports

pub mod aggregate;
pub mod compare;
pub mod delta;
pub mod extract;
pub mod normalize;
pub mod priority;
pub mod projection;
pub mod transition;

pub use aggregate::{average, average_per_metric, case_average, metric_averages};
pub use compare::{AnalysisComparison, NodeStatusChange, RunComparison, compare_analyses, compare_runs};
pub use delta::{DeltaRow, compute_deltas};
pub use extract::extract_numerics;
pub use normalize::normalize_score;
pub use priority::{
    PriorityComparison, PriorityDiff, PriorityInput, SetDelta, diff_priority_inputs,
    diff_priority_summaries, parse_priority_summary,
};
pub use projection::{Projection, Quadrant, ScatterPoint, project, project_run};
pub use transition::{CaseStatus, CaseTransition, TransitionCounts, classify};
