//! The top-level stateful entry point (not itself a spec.md component): it
//! wires C1-C10 together the way an external HTTP layer would, one call at
//! a time, over a registry of projects.
//!
//! Grounded on the teacher's `TimelineEngine` (`timeline.rs`: a single
//! `Mutex<TimelineState>` plus a version counter). This widens that single
//! mutex/version pair into a map of projects, each holding a map of
//! independently locked, independently versioned sequences (spec.md §3: "a
//! project owns zero or more sequences"). Every call here takes an explicit
//! `now: DateTime<Utc>` rather than reading the clock itself, the same
//! determinism `lock`/`history` already require.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::analysis::{self, AnalysisReport};
use crate::batch::{self, BatchResponse, IdempotencyCache};
use crate::config::CoreConfig;
use crate::dispatcher::{self, ChangeDetail, DispatchOutcome, OperationInput};
use crate::error::{CoreError, ErrorCode};
use crate::events::{EventPublisher, TimelineUpdated};
use crate::history::{self, HistoryQuery, OperationRecord};
use crate::ids;
use crate::lock::{LockAcquireResult, SequenceLock};
use crate::model::{generate_id, OperationSource, Project, Sequence, Timeline};
use crate::read_api::{self, AssetCatalogEntry, AssetLookup, ClipDetail, ProjectOverview, TimelineAtTime, TimelineStructure};
use crate::semantic;

/// One independently-versioned, independently-locked timeline belonging to
/// a project (GLOSSARY: `Sequence`).
struct SequenceRuntime {
    sequence: Sequence,
    version: u64,
    lock: SequenceLock,
    history: Vec<OperationRecord>,
    idempotency: IdempotencyCache,
}

impl SequenceRuntime {
    fn new(sequence: Sequence) -> Self {
        Self {
            sequence,
            version: 0,
            lock: SequenceLock::default(),
            history: Vec::new(),
            idempotency: IdempotencyCache::new(),
        }
    }
}

/// A project's metadata plus every sequence it owns. `status`/
/// `last_modified` back L1's `project_overview` fields; neither is part of
/// the timeline model itself since render/job status is out of this
/// crate's scope (spec.md §1, §6) — the store is where a host would track
/// it instead.
struct ProjectRuntime {
    id: String,
    name: String,
    width: u32,
    height: u32,
    fps: u32,
    default_sequence_id: String,
    sequences: HashMap<String, Mutex<SequenceRuntime>>,
    status: String,
    last_modified: DateTime<Utc>,
}

impl ProjectRuntime {
    fn new(name: String, width: u32, height: u32, fps: u32, now: DateTime<Utc>) -> Self {
        let id = generate_id();
        let default_sequence = Sequence::new_default(id.clone());
        let default_sequence_id = default_sequence.id.clone();
        let mut sequences = HashMap::new();
        sequences.insert(default_sequence_id.clone(), Mutex::new(SequenceRuntime::new(default_sequence)));
        Self {
            id,
            name,
            width,
            height,
            fps,
            default_sequence_id,
            sequences,
            status: "ready".to_string(),
            last_modified: now,
        }
    }

    fn as_project(&self, timeline_data: Timeline, version: u64) -> Project {
        Project {
            id: self.id.clone(),
            name: self.name.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration_ms: timeline_data.duration_ms,
            version,
            timeline_data,
            default_sequence_id: Some(self.default_sequence_id.clone()),
        }
    }
}

fn resolve_sequence_id(project: &ProjectRuntime, search: &str) -> Result<String, CoreError> {
    let ids_list: Vec<&str> = project.sequences.keys().map(String::as_str).collect();
    let index = ids::resolve_index(search, ids_list.iter().copied())
        .ok_or_else(|| CoreError::new(ErrorCode::NotFound, format!("sequence {search} not found")))?;
    Ok(ids_list[index].to_string())
}

/// Build the single history record a whole `apply_batch` call produces:
/// `"batch"` with aggregated affected-entity lists when it ran more than
/// one operation, the underlying op's own type (and rollback data) when it
/// ran exactly one (spec.md §4.5 step 3; C5's `recorded_op_type`).
fn record_batch(
    project_id: &str,
    outcomes: &[DispatchOutcome],
    source: OperationSource,
    idempotency_key: Option<String>,
    user_id: Option<String>,
    version: u64,
    now: DateTime<Utc>,
) -> OperationRecord {
    let operation_type = batch::recorded_op_type(outcomes);
    let mut affected_clips = Vec::new();
    let mut affected_layers = Vec::new();
    let mut affected_audio_clips = Vec::new();
    let mut all_changes: Vec<ChangeDetail> = Vec::new();
    for outcome in outcomes {
        affected_clips.extend(outcome.affected_clips.iter().cloned());
        affected_layers.extend(outcome.affected_layers.iter().cloned());
        affected_audio_clips.extend(outcome.affected_audio_clips.iter().cloned());
        all_changes.extend(outcome.changes.iter().cloned());
    }
    // A multi-op batch has no single inverse; only a one-operation "batch"
    // carries its underlying op's own rollback support forward.
    let rollback_data = match outcomes {
        [single] => single.rollback.clone(),
        _ => None,
    };
    debug_assert_eq!(
        rollback_data.is_some(),
        dispatcher::is_rollback_supported(&operation_type),
        "op {operation_type} produced rollback data inconsistent with its declared support",
    );

    OperationRecord {
        id: generate_id(),
        project_id: project_id.to_string(),
        operation_type,
        source,
        affected_clips,
        affected_layers,
        affected_audio_clips,
        diff: history::compute_diff(&all_changes),
        request_summary: None,
        result_summary: None,
        rollback_data: rollback_data.clone(),
        rollback_available: rollback_data.is_some(),
        rolled_back: false,
        rolled_back_at: None,
        rolled_back_by: None,
        success: true,
        error_code: None,
        error_message: None,
        idempotency_key,
        user_id,
        project_version: version,
        created_at: now,
    }
}

/// The one process-wide entry point a host service calls through. Holds no
/// transport, auth, or storage logic of its own (those stay behind
/// `external`'s trait boundaries) — only timeline state and the C1-C10
/// machinery operating on it.
pub struct ProjectStore {
    projects: RwLock<HashMap<String, Arc<RwLock<ProjectRuntime>>>>,
    config: CoreConfig,
    events: EventPublisher,
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl ProjectStore {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            config,
            events: EventPublisher::new(),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    async fn project_handle(&self, project_id: &str) -> Result<Arc<RwLock<ProjectRuntime>>, CoreError> {
        self.projects
            .read()
            .await
            .get(project_id)
            .cloned()
            .ok_or_else(|| CoreError::new(ErrorCode::ProjectNotFound, format!("project {project_id} not found")))
    }

    /// Create a project with its required, undeletable default sequence
    /// (I6). Returns the new project id.
    pub async fn create_project(&self, name: impl Into<String>, width: u32, height: u32, fps: u32, now: DateTime<Utc>) -> String {
        let runtime = ProjectRuntime::new(name.into(), width, height, fps, now);
        let id = runtime.id.clone();
        self.projects.write().await.insert(id.clone(), Arc::new(RwLock::new(runtime)));
        id
    }

    /// Add a named, non-default sequence to an existing project.
    pub async fn create_sequence(&self, project_id: &str, name: impl Into<String>) -> Result<String, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let mut project = project_arc.write().await;
        let sequence = Sequence::named(project.id.clone(), name);
        let sequence_id = sequence.id.clone();
        project.sequences.insert(sequence_id.clone(), Mutex::new(SequenceRuntime::new(sequence)));
        Ok(sequence_id)
    }

    /// The id of a project's default sequence — the one operations target
    /// when a caller names none (spec.md §3).
    pub async fn default_sequence_id(&self, project_id: &str) -> Result<String, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        Ok(project_arc.read().await.default_sequence_id.clone())
    }

    /// Remove a non-default sequence. I6 forbids deleting the default
    /// sequence outright; a sequence another holder currently has locked
    /// is rejected with `OPERATION_IN_PROGRESS` rather than deleted out
    /// from under them (spec.md §9's open question, resolved this way).
    pub async fn delete_sequence(&self, project_id: &str, sequence_id: &str, now: DateTime<Utc>) -> Result<(), CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let mut project = project_arc.write().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;

        if canonical == project.default_sequence_id {
            return Err(CoreError::new(ErrorCode::OperationNotSupported, "the default sequence cannot be deleted"));
        }
        {
            let runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;
            if runtime.lock.is_held(now, self.config.lock_timeout) {
                return Err(CoreError::new(
                    ErrorCode::OperationInProgress,
                    "this sequence is locked by another editor",
                ));
            }
        }
        project.sequences.remove(&canonical);
        Ok(())
    }

    /// L1 (C8): ~300-token project summary, read from the default sequence.
    pub async fn project_overview(&self, project_id: &str) -> Result<ProjectOverview, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let default_sequence_id = project.default_sequence_id.clone();
        let runtime = project.sequences.get(&default_sequence_id).expect("default sequence always exists").lock().await;
        let snapshot = project.as_project(runtime.sequence.timeline_data.clone(), runtime.version);
        Ok(read_api::project_overview(&snapshot, project.status.clone(), project.last_modified))
    }

    /// A point-in-time copy of a sequence's timeline, cheap enough for the
    /// read-only L2/L3/analysis projections below since none of them need
    /// to hold the sequence lock across a mutation.
    async fn sequence_timeline(&self, project_id: &str, sequence_id: &str) -> Result<Timeline, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;
        Ok(runtime.sequence.timeline_data.clone())
    }

    /// L2, shape one (C8).
    pub async fn timeline_structure(&self, project_id: &str, sequence_id: &str) -> Result<TimelineStructure, CoreError> {
        let timeline = self.sequence_timeline(project_id, sequence_id).await?;
        Ok(read_api::timeline_structure(&timeline))
    }

    /// L2, shape two (C8).
    pub async fn timeline_at_time(&self, project_id: &str, sequence_id: &str, at_ms: i64) -> Result<TimelineAtTime, CoreError> {
        let timeline = self.sequence_timeline(project_id, sequence_id).await?;
        Ok(read_api::timeline_at_time(&timeline, at_ms))
    }

    /// L2, shape three (C8).
    pub async fn asset_catalog(&self, project_id: &str, sequence_id: &str, assets: &impl AssetLookup) -> Result<Vec<AssetCatalogEntry>, CoreError> {
        let timeline = self.sequence_timeline(project_id, sequence_id).await?;
        Ok(read_api::asset_catalog(&timeline, assets))
    }

    /// L3 (C8).
    pub async fn clip_detail(&self, project_id: &str, sequence_id: &str, clip_id: &str) -> Result<ClipDetail, CoreError> {
        let timeline = self.sequence_timeline(project_id, sequence_id).await?;
        read_api::clip_detail(&timeline, clip_id)
    }

    /// Gaps/pacing/audio/section/quality analysis and suggestions (C9).
    pub async fn analyze(&self, project_id: &str, sequence_id: &str) -> Result<AnalysisReport, CoreError> {
        let timeline = self.sequence_timeline(project_id, sequence_id).await?;
        Ok(analysis::analyze_all(&timeline, &self.config, Some(project_id)))
    }

    /// C5: apply one or more operations atomically under an optimistic
    /// version check. Records one history entry, then publishes a
    /// `timeline_updated` event (C10) — best-effort, never fails the
    /// mutation itself.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_batch(
        &self,
        project_id: &str,
        sequence_id: &str,
        expected_version: u64,
        operations: &[OperationInput],
        source: OperationSource,
        idempotency_key: Option<String>,
        user_id: Option<String>,
        user_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BatchResponse, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let mut runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;

        if let Some(key) = &idempotency_key {
            if let Some(response) = runtime
                .idempotency
                .check(key, expected_version, operations)
                .map_err(|e| e.resolve_endpoint(project_id))?
            {
                return Ok(response);
            }
        }

        let (response, outcomes) = batch::apply_batch(&mut runtime.sequence.timeline_data, &mut runtime.version, expected_version, operations, &self.config)
            .map_err(|e| e.into_core_error().resolve_endpoint(project_id))?;

        let record = record_batch(project_id, &outcomes, source, idempotency_key.clone(), user_id.clone(), runtime.version, now);
        runtime.history.push(record);

        if let Some(key) = idempotency_key {
            runtime.idempotency.store(key, expected_version, operations, response.clone());
        }

        let version = response.version;
        drop(runtime);
        drop(project);

        self.events.publish(TimelineUpdated {
            project_id: project_id.to_string(),
            sequence_id: canonical,
            source,
            version,
            user_id,
            user_name,
        });

        Ok(response)
    }

    async fn apply_semantic(
        &self,
        project_id: &str,
        sequence_id: &str,
        now: DateTime<Utc>,
        user_id: Option<String>,
        op: impl FnOnce(&mut Timeline, &CoreConfig) -> Result<DispatchOutcome, CoreError>,
    ) -> Result<BatchResponse, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let mut runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;

        let outcome = op(&mut runtime.sequence.timeline_data, &self.config).map_err(|e| e.resolve_endpoint(project_id))?;
        runtime.version += 1;
        let version = runtime.version;
        let record = history::record_success(project_id, &outcome, OperationSource::Editor, None, user_id.clone(), version, now);
        runtime.history.push(record);
        let response = BatchResponse {
            version,
            timeline_data: runtime.sequence.timeline_data.clone(),
        };

        drop(runtime);
        drop(project);
        self.events.publish(TimelineUpdated {
            project_id: project_id.to_string(),
            sequence_id: canonical,
            source: OperationSource::Editor,
            version,
            user_id,
            user_name: None,
        });
        Ok(response)
    }

    /// §6 semantic route: snap a clip flush against its predecessor.
    pub async fn snap_to_previous(&self, project_id: &str, sequence_id: &str, clip_id: &str, user_id: Option<String>, now: DateTime<Utc>) -> Result<BatchResponse, CoreError> {
        self.apply_semantic(project_id, sequence_id, now, user_id, |timeline, config| semantic::snap_to_previous(timeline, clip_id, config)).await
    }

    /// §6 semantic route: snap a clip flush against its successor.
    pub async fn snap_to_next(&self, project_id: &str, sequence_id: &str, clip_id: &str, user_id: Option<String>, now: DateTime<Utc>) -> Result<BatchResponse, CoreError> {
        self.apply_semantic(project_id, sequence_id, now, user_id, |timeline, config| semantic::snap_to_next(timeline, clip_id, config)).await
    }

    /// §6 semantic route: close a specific gap, shifting everything after
    /// it left.
    #[allow(clippy::too_many_arguments)]
    pub async fn close_gap(
        &self,
        project_id: &str,
        sequence_id: &str,
        layer_id: &str,
        gap_start_ms: i64,
        gap_end_ms: i64,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BatchResponse, CoreError> {
        self.apply_semantic(project_id, sequence_id, now, user_id, |timeline, _config| semantic::close_gap(timeline, layer_id, gap_start_ms, gap_end_ms)).await
    }

    /// §6 semantic route: configure auto-ducking on a BGM track.
    #[allow(clippy::too_many_arguments)]
    pub async fn auto_duck_bgm(
        &self,
        project_id: &str,
        sequence_id: &str,
        bgm_track_id: &str,
        narration_track_id: &str,
        user_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BatchResponse, CoreError> {
        self.apply_semantic(project_id, sequence_id, now, user_id, |timeline, _config| semantic::auto_duck_bgm(timeline, bgm_track_id, narration_track_id))
            .await
    }

    /// C6: acquire (or refresh) the advisory lock on a sequence.
    pub async fn acquire_lock(&self, project_id: &str, sequence_id: &str, requester: &str, now: DateTime<Utc>) -> Result<LockAcquireResult, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let mut runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;
        Ok(runtime.lock.acquire(requester, now, self.config.lock_timeout))
    }

    /// C6: refresh an already-held lock's expiry.
    pub async fn heartbeat_lock(&self, project_id: &str, sequence_id: &str, requester: &str, now: DateTime<Utc>) -> Result<(), CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let mut runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;
        runtime.lock.heartbeat(requester, now, self.config.lock_timeout)
    }

    /// C6: release a held lock.
    pub async fn release_lock(&self, project_id: &str, sequence_id: &str, requester: &str, now: DateTime<Utc>) -> Result<(), CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let mut runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;
        runtime.lock.release(requester, now, self.config.lock_timeout)
    }

    /// C7: the filtered, paginated operation log.
    pub async fn history(&self, project_id: &str, sequence_id: &str, query: &HistoryQuery) -> Result<Vec<OperationRecord>, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;
        Ok(history::query(&runtime.history, query).into_iter().cloned().collect())
    }

    /// C7: roll back a previously recorded operation.
    pub async fn rollback(&self, project_id: &str, sequence_id: &str, operation_id: &str, now: DateTime<Utc>) -> Result<OperationRecord, CoreError> {
        let project_arc = self.project_handle(project_id).await?;
        let project = project_arc.read().await;
        let canonical = resolve_sequence_id(&project, sequence_id)?;
        let mut runtime = project.sequences.get(&canonical).expect("resolved above").lock().await;

        let record = history::rollback(&mut runtime.history, &mut runtime.sequence.timeline_data, &mut runtime.version, operation_id, now)
            .map_err(|e| e.resolve_endpoint(project_id))?;
        let version = runtime.version;

        drop(runtime);
        drop(project);
        self.events.publish(TimelineUpdated {
            project_id: project_id.to_string(),
            sequence_id: canonical,
            source: OperationSource::Editor,
            version,
            user_id: None,
            user_name: None,
        });

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::NewClip;
    use crate::model::{ClipEffects, Transform};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn add_clip_op(layer_id: &str, start_ms: i64, duration_ms: i64) -> OperationInput {
        OperationInput::ClipAdd {
            layer_id: layer_id.to_string(),
            clip: NewClip {
                asset_id: None,
                start_ms,
                duration_ms,
                in_point_ms: 0,
                out_point_ms: None,
                transform: Transform::default(),
                effects: ClipEffects::default(),
                transition_in: None,
                transition_out: None,
                text_content: Some("hello".to_string()),
                text_style: None,
                shape: None,
                crop: None,
                keyframes: None,
                group_id: None,
            },
        }
    }

    async fn project_with_layer(store: &ProjectStore) -> (String, String, String) {
        let project_id = store.create_project("Demo", 1920, 1080, 30, now()).await;
        let overview = store.project_overview(&project_id).await.unwrap();
        assert_eq!(overview.layer_count, 0);

        let project_arc = store.project_handle(&project_id).await.unwrap();
        let project = project_arc.read().await;
        let sequence_id = project.default_sequence_id.clone();
        drop(project);

        let layer_op = OperationInput::LayerAdd {
            name: "V1".to_string(),
            layer_type: crate::model::LayerType::Content,
            insert_at: None,
        };
        let response = store
            .apply_batch(&project_id, &sequence_id, 0, &[layer_op], OperationSource::Editor, None, None, None, now())
            .await
            .unwrap();
        let layer_id = response.timeline_data.layers[0].id.clone();
        (project_id, sequence_id, layer_id)
    }

    #[tokio::test]
    async fn create_project_starts_with_a_default_sequence() {
        let store = ProjectStore::default();
        let project_id = store.create_project("Demo", 1920, 1080, 30, now()).await;
        let overview = store.project_overview(&project_id).await.unwrap();
        assert_eq!(overview.name, "Demo");
        assert_eq!(overview.duration_ms, 0);
    }

    #[tokio::test]
    async fn apply_batch_records_history_and_bumps_version() {
        let store = ProjectStore::default();
        let (project_id, sequence_id, layer_id) = project_with_layer(&store).await;

        let response = store
            .apply_batch(
                &project_id,
                &sequence_id,
                1,
                &[add_clip_op(&layer_id, 0, 1000)],
                OperationSource::Editor,
                None,
                None,
                None,
                now(),
            )
            .await
            .unwrap();
        assert_eq!(response.version, 2);

        let history = store.history(&project_id, &sequence_id, &HistoryQuery::default()).await.unwrap();
        assert_eq!(history.len(), 2, "one record for the layer add, one for the clip add");
        assert_eq!(history.last().unwrap().operation_type, "add_clip");
    }

    #[tokio::test]
    async fn concurrent_modification_is_reported_with_server_version() {
        let store = ProjectStore::default();
        let (project_id, sequence_id, layer_id) = project_with_layer(&store).await;

        let err = store
            .apply_batch(
                &project_id,
                &sequence_id,
                0,
                &[add_clip_op(&layer_id, 0, 1000)],
                OperationSource::Editor,
                None,
                None,
                None,
                now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConcurrentModification);
    }

    #[tokio::test]
    async fn rollback_restores_the_deleted_clip() {
        let store = ProjectStore::default();
        let (project_id, sequence_id, layer_id) = project_with_layer(&store).await;

        let add_response = store
            .apply_batch(
                &project_id,
                &sequence_id,
                1,
                &[add_clip_op(&layer_id, 0, 1000)],
                OperationSource::Editor,
                None,
                None,
                None,
                now(),
            )
            .await
            .unwrap();
        let clip_id = add_response.timeline_data.layers[0].clips[0].id.clone();

        let delete_op = OperationInput::ClipDelete { clip_id: clip_id.clone() };
        store
            .apply_batch(&project_id, &sequence_id, 2, &[delete_op], OperationSource::Editor, None, None, None, now())
            .await
            .unwrap();

        let history = store.history(&project_id, &sequence_id, &HistoryQuery::default()).await.unwrap();
        let delete_record = history.iter().find(|r| r.operation_type == "delete_clip").unwrap();

        store.rollback(&project_id, &sequence_id, &delete_record.id, now()).await.unwrap();
        let structure = store.timeline_structure(&project_id, &sequence_id).await.unwrap();
        assert_eq!(structure.layers[0].clip_count, 1);
    }

    #[tokio::test]
    async fn lock_acquired_by_one_user_is_refused_to_another() {
        let store = ProjectStore::default();
        let project_id = store.create_project("Demo", 1920, 1080, 30, now()).await;
        let project_arc = store.project_handle(&project_id).await.unwrap();
        let sequence_id = project_arc.read().await.default_sequence_id.clone();

        let first = store.acquire_lock(&project_id, &sequence_id, "alice", now()).await.unwrap();
        assert!(first.granted);
        let second = store.acquire_lock(&project_id, &sequence_id, "bob", now()).await.unwrap();
        assert!(!second.granted);
        assert_eq!(second.holder, "alice");
    }

    #[tokio::test]
    async fn default_sequence_cannot_be_deleted() {
        let store = ProjectStore::default();
        let project_id = store.create_project("Demo", 1920, 1080, 30, now()).await;
        let project_arc = store.project_handle(&project_id).await.unwrap();
        let default_sequence_id = project_arc.read().await.default_sequence_id.clone();

        let err = store.delete_sequence(&project_id, &default_sequence_id, now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationNotSupported);
    }

    #[tokio::test]
    async fn locked_sequence_refuses_deletion() {
        let store = ProjectStore::default();
        let project_id = store.create_project("Demo", 1920, 1080, 30, now()).await;
        let sequence_id = store.create_sequence(&project_id, "B-roll").await.unwrap();
        store.acquire_lock(&project_id, &sequence_id, "alice", now()).await.unwrap();

        let err = store.delete_sequence(&project_id, &sequence_id, now()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::OperationInProgress);
    }

    #[tokio::test]
    async fn unlocked_non_default_sequence_can_be_deleted() {
        let store = ProjectStore::default();
        let project_id = store.create_project("Demo", 1920, 1080, 30, now()).await;
        let sequence_id = store.create_sequence(&project_id, "B-roll").await.unwrap();

        store.delete_sequence(&project_id, &sequence_id, now()).await.unwrap();
        let err = store.timeline_structure(&project_id, &sequence_id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn events_published_on_apply_batch_reach_a_subscriber() {
        let store = ProjectStore::default();
        let (project_id, sequence_id, layer_id) = project_with_layer(&store).await;
        let mut rx = store.events().subscribe(&project_id);

        store
            .apply_batch(
                &project_id,
                &sequence_id,
                1,
                &[add_clip_op(&layer_id, 0, 1000)],
                OperationSource::Editor,
                None,
                None,
                None,
                now(),
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.version, 2);
    }
}
