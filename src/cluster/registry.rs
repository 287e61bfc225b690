//! Versioned cluster maps for a run.
//!
//! Saves always create a new version; nothing is updated in place. The
//! "active" version is explicit state ([`ClusterState`]) that the caller
//! threads through saves and deletes.

use super::delimited::{Delimiter, ParsedUpload, parse_cluster_upload};
use crate::error::{ExplorerError, Result};
use crate::model::{ClusterAssignment, ClusterItem};
use crate::store::ClusterMapStore;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// The cluster versions known for a run and which one is active.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterState {
    run_id: String,
    /// Newest first.
    versions: Vec<ClusterAssignment>,
    active: Option<String>,
}

impl ClusterState {
    /// No versions, nothing active.
    pub fn unclustered(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            versions: Vec::new(),
            active: None,
        }
    }

    /// Build state from the stored versions.
    ///
    /// `preferred` is activated if it exists; otherwise the newest version is.
    pub fn resolve(run_id: impl Into<String>, mut versions: Vec<ClusterAssignment>, preferred: Option<&str>) -> Self {
        sort_newest_first(&mut versions);
        let active = preferred
            .filter(|id| versions.iter().any(|v| v.map_id == *id))
            .map(str::to_string)
            .or_else(|| versions.first().map(|v| v.map_id.clone()));
        Self {
            run_id: run_id.into(),
            versions,
            active,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn versions(&self) -> &[ClusterAssignment] {
        &self.versions
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&ClusterAssignment> {
        let id = self.active.as_deref()?;
        self.versions.iter().find(|v| v.map_id == id)
    }

    /// Switch to another known version.
    pub fn select(mut self, map_id: &str) -> Result<Self> {
        if !self.versions.iter().any(|v| v.map_id == map_id) {
            return Err(ExplorerError::cluster_map_not_found(&self.run_id, Some(map_id)));
        }
        self.active = Some(map_id.to_string());
        Ok(self)
    }

    /// Stop coloring by any version.
    pub fn clear(mut self) -> Self {
        self.active = None;
        self
    }

    /// Record a freshly saved version and make it active.
    pub fn after_save(mut self, saved: ClusterAssignment) -> Self {
        self.active = Some(saved.map_id.clone());
        self.versions.retain(|v| v.map_id != saved.map_id);
        self.versions.push(saved);
        sort_newest_first(&mut self.versions);
        self
    }

    /// Drop a deleted version.
    ///
    /// If it was active, the next-newest version becomes active, or nothing
    /// when none remain.
    pub fn after_delete(mut self, deleted_map_id: &str) -> Self {
        self.versions.retain(|v| v.map_id != deleted_map_id);
        if self.active.as_deref() == Some(deleted_map_id) {
            self.active = self.versions.first().map(|v| v.map_id.clone());
        }
        self
    }

    /// Lookup table for the projector; empty when nothing is active.
    pub fn cluster_of(&self) -> HashMap<String, String> {
        self.active().map(ClusterAssignment::cluster_of).unwrap_or_default()
    }
}

fn sort_newest_first(versions: &mut [ClusterAssignment]) {
    versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Save, list, fetch and delete cluster map versions through a store.
pub struct ClusterRegistry<S> {
    store: S,
}

impl<S: ClusterMapStore> ClusterRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a new version. Earlier versions are untouched.
    pub async fn save(&self, run_id: &str, items: Vec<ClusterItem>, source: Option<String>) -> Result<ClusterAssignment> {
        let count = items.len();
        let saved = self.store.save_cluster_map(run_id, items, source).await?;
        info!(run_id = %run_id, map_id = %saved.map_id, items = count, "saved cluster map version");
        Ok(saved)
    }

    /// Parse an upload and save it as a new version.
    ///
    /// Malformed lines are skipped; the returned upload summary reports how
    /// many.
    pub async fn import(
        &self,
        run_id: &str,
        text: &str,
        delimiter: Delimiter,
        source: Option<String>,
    ) -> Result<(ClusterAssignment, ParsedUpload)> {
        let mut parsed = parse_cluster_upload(text, delimiter);
        if parsed.skipped > 0 {
            warn!(run_id = %run_id, skipped = parsed.skipped, "skipped malformed cluster map lines");
        }
        let items = std::mem::take(&mut parsed.items);
        let saved = self.save(run_id, items, source).await?;
        parsed.items = saved.items.clone();
        Ok((saved, parsed))
    }

    /// All versions for the run, newest first.
    pub async fn list(&self, run_id: &str) -> Result<Vec<ClusterAssignment>> {
        let mut versions = self.store.list_cluster_maps(run_id).await?;
        versions.retain(|v| v.run_id == run_id);
        sort_newest_first(&mut versions);
        debug!(run_id = %run_id, count = versions.len(), "listed cluster maps");
        Ok(versions)
    }

    /// One version; `ClusterMapNotFound` if absent or owned by another run.
    pub async fn get_by_id(&self, run_id: &str, map_id: &str) -> Result<ClusterAssignment> {
        let assignment = self.store.get_cluster_map(run_id, Some(map_id)).await?;
        if assignment.run_id != run_id || assignment.map_id != map_id {
            return Err(ExplorerError::cluster_map_not_found(run_id, Some(map_id)));
        }
        Ok(assignment)
    }

    /// Newest version, or `None` when the run has no cluster maps.
    pub async fn latest(&self, run_id: &str) -> Result<Option<ClusterAssignment>> {
        match self.store.get_cluster_map(run_id, None).await {
            Ok(assignment) if assignment.run_id == run_id => Ok(Some(assignment)),
            Ok(_) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Remove one version.
    pub async fn delete(&self, run_id: &str, map_id: &str) -> Result<()> {
        self.get_by_id(run_id, map_id).await?;
        self.store.delete_cluster_map(run_id, map_id).await?;
        info!(run_id = %run_id, map_id = %map_id, "deleted cluster map version");
        Ok(())
    }

    /// Load the run's versions and pick the active one.
    pub async fn resolve_state(&self, run_id: &str, preferred: Option<&str>) -> Result<ClusterState> {
        let versions = self.list(run_id).await?;
        Ok(ClusterState::resolve(run_id, versions, preferred))
    }

    /// Delete a version and return the state re-resolved against the store.
    pub async fn delete_and_resolve(&self, state: ClusterState, map_id: &str) -> Result<ClusterState> {
        let run_id = state.run_id().to_string();
        self.delete(&run_id, map_id).await?;

        let preferred = state.after_delete(map_id).active_id().map(str::to_string);
        self.resolve_state(&run_id, preferred.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, Utc};

    fn version(run_id: &str, map_id: &str, age_secs: i64) -> ClusterAssignment {
        ClusterAssignment {
            map_id: map_id.to_string(),
            run_id: run_id.to_string(),
            source: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
            items: vec![ClusterItem::new("t1", map_id)],
        }
    }

    #[test]
    fn test_resolve_prefers_requested_then_newest() {
        let versions = vec![version("r", "old", 100), version("r", "new", 1), version("r", "mid", 50)];

        let state = ClusterState::resolve("r", versions.clone(), None);
        assert_eq!(state.active_id(), Some("new"));
        let ids: Vec<&str> = state.versions().iter().map(|v| v.map_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let state = ClusterState::resolve("r", versions.clone(), Some("mid"));
        assert_eq!(state.active_id(), Some("mid"));

        let state = ClusterState::resolve("r", versions, Some("gone"));
        assert_eq!(state.active_id(), Some("new"));
    }

    #[test]
    fn test_delete_active_falls_back() {
        let versions = vec![version("r", "old", 100), version("r", "new", 1)];
        let state = ClusterState::resolve("r", versions, None);

        let state = state.after_delete("new");
        assert_eq!(state.active_id(), Some("old"));
        assert_eq!(state.cluster_of().get("t1").map(String::as_str), Some("old"));

        let state = state.after_delete("old");
        assert_eq!(state.active_id(), None);
        assert!(state.cluster_of().is_empty());
    }

    #[test]
    fn test_delete_inactive_keeps_active() {
        let versions = vec![version("r", "old", 100), version("r", "new", 1)];
        let state = ClusterState::resolve("r", versions, None).after_delete("old");
        assert_eq!(state.active_id(), Some("new"));
        assert_eq!(state.versions().len(), 1);
    }

    #[test]
    fn test_select_and_after_save() {
        let state = ClusterState::resolve("r", vec![version("r", "a", 10)], None);
        assert!(state.clone().select("missing").unwrap_err().is_not_found());

        let saved = version("r", "b", 0);
        let state = state.after_save(saved).clear();
        assert_eq!(state.active_id(), None);
        let state = state.select("b").unwrap();
        assert_eq!(state.active().unwrap().map_id, "b");
        assert_eq!(state.versions()[0].map_id, "b");
    }

    #[tokio::test]
    async fn test_registry_save_list_get_delete() {
        let registry = ClusterRegistry::new(MemoryStore::new());

        let first = registry
            .save("run-1", vec![ClusterItem::new("t1", "a")], Some("first".into()))
            .await
            .unwrap();
        let second = registry
            .save("run-1", vec![ClusterItem::new("t1", "b")], Some("second".into()))
            .await
            .unwrap();
        assert_ne!(first.map_id, second.map_id);

        let versions = registry.list("run-1").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].map_id, second.map_id);

        let fetched = registry.get_by_id("run-1", &first.map_id).await.unwrap();
        assert_eq!(fetched.source.as_deref(), Some("first"));

        let wrong_run = registry.get_by_id("run-2", &first.map_id).await;
        assert!(wrong_run.unwrap_err().is_not_found());

        let state = registry.resolve_state("run-1", None).await.unwrap();
        assert_eq!(state.active_id(), Some(second.map_id.as_str()));

        let state = registry.delete_and_resolve(state, &second.map_id).await.unwrap();
        assert_eq!(state.active_id(), Some(first.map_id.as_str()));

        let state = registry.delete_and_resolve(state, &first.map_id).await.unwrap();
        assert_eq!(state.active_id(), None);
        assert!(registry.latest("run-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registry_import_reports_skipped_lines() {
        let registry = ClusterRegistry::new(MemoryStore::new());
        let (saved, upload) = registry
            .import("run-1", "test_case_id,cluster_id\nt1,a\nbroken\nt2,b\n", Delimiter::Comma, None)
            .await
            .unwrap();
        assert_eq!(saved.items.len(), 2);
        assert_eq!(upload.skipped, 1);
        assert!(upload.had_header);
    }

    #[tokio::test]
    async fn test_delete_unknown_version_is_not_found() {
        let registry = ClusterRegistry::new(MemoryStore::new());
        let err = registry.delete("run-1", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
