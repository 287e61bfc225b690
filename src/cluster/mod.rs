//! Cluster maps: upload parsing, coloring and version management.

pub mod delimited;
pub mod palette;
pub mod registry;

pub use delimited::{Delimiter, ParsedUpload, export_cluster_items, parse_cluster_upload};
pub use palette::{ClusterPalette, DEFAULT_PALETTE};
pub use registry::{ClusterRegistry, ClusterState};
