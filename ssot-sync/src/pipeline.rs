//! The upsert pipeline and the per-run context that owns it.
//!
//! A [`Reconciler`] is created by [`Reconciler::bootstrap`], shared by `Arc`
//! across source tasks for one run, and dropped at the end. It owns the
//! Canonical Store, the priority table, the remote client and the run's
//! tallies and error log.
//!
//! # Run flow
//!
//! 1. Bootstrap: list every kind, seed store and orphan sets, ensure the
//!    sentinel tag and the source custom field exist.
//! 2. Sources submit desired objects concurrently via [`Reconciler::upsert`].
//! 3. Sweep: delete still-unclaimed objects, children before parents.
//! 4. Report.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use ssot_core::config::{Config, ManagedTagConfig, SweepConfig, SweepScope};
use ssot_core::objects::{CustomField, CustomFieldType, Tag};
use ssot_core::{Entity, EntityKind, NaturalKey, ObjectId, SourceName, SourcePriority, SOURCE_FIELD};

use crate::diff::{self, DiffContext, FieldDiff, Origin};
use crate::error::{RemoteError, RemoteOp, SyncError};
use crate::remote::RemoteClient;
use crate::report::{KindTally, RunError, RunReport, SourceOutcome, SweepEntry, SweepOutcome};
use crate::source::Source;
use crate::store::{CanonicalStore, KindOps, KindStore, LoadStats, OrphanSeed, Stored};

// ---------------------------------------------------------------------------
// 1. Options & results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilerOptions {
    /// Compute everything, write nothing.
    pub dry_run: bool,
    pub sweep: SweepConfig,
    pub managed_tag: ManagedTagConfig,
}

impl ReconcilerOptions {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            dry_run,
            sweep: config.sweep.clone(),
            managed_tag: config.managed_tag.clone(),
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Created,
    Patched { fields: Vec<String> },
    Unchanged,
    WouldCreate,
    WouldPatch { diff: FieldDiff },
}

/// An upsert result: the object as the store now holds it (or, in dry-run,
/// as it would be sent) and the action taken.
#[derive(Debug, Clone)]
pub struct Upserted<E> {
    pub object: E,
    pub action: Action,
}

#[derive(Default)]
struct RunLog {
    tallies: BTreeMap<EntityKind, KindTally>,
    errors: Vec<RunError>,
}

// ---------------------------------------------------------------------------
// 2. Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    remote: Arc<dyn RemoteClient>,
    store: CanonicalStore,
    priority: SourcePriority,
    options: ReconcilerOptions,
    sentinel_tag: Option<ObjectId>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
    bootstrap: BTreeMap<EntityKind, LoadStats>,
    log: Mutex<RunLog>,
}

impl Reconciler {
    /// List every kind, seed the store and orphan sets, then ensure the
    /// sentinel tag and the source custom field exist.
    ///
    /// Nothing is written unless every kind listed successfully. Any failure
    /// here is fatal for the run.
    pub async fn bootstrap(
        remote: Arc<dyn RemoteClient>,
        priority: SourcePriority,
        options: ReconcilerOptions,
        cancel: CancellationToken,
    ) -> Result<Self, SyncError> {
        let started_at = Utc::now();

        let mut listed = BTreeMap::new();
        for &kind in EntityKind::all() {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let objects = remote
                .list(kind)
                .await
                .map_err(|source| SyncError::Bootstrap { kind, source })?;
            tracing::debug!(kind = %kind, count = objects.len(), "listed");
            listed.insert(kind, objects);
        }

        let mut reconciler = Self {
            remote,
            store: CanonicalStore::new(),
            priority,
            options,
            sentinel_tag: None,
            cancel,
            started_at,
            bootstrap: BTreeMap::new(),
            log: Mutex::new(RunLog::default()),
        };

        // Tags load first: under the `managed` sweep scope the sentinel tag's
        // id decides which objects are tracked.
        let tags = listed.remove(&EntityKind::Tag).unwrap_or_default();
        let stats = KindOps::load(&reconciler.store.tags, tags, OrphanSeed::Untracked);
        reconciler.bootstrap.insert(EntityKind::Tag, stats);
        reconciler.sentinel_tag = reconciler.ensure_sentinel_tag().await?;

        let seed = reconciler.orphan_seed();
        for (kind, objects) in listed {
            if let Some(ops) = reconciler.store.ops(kind) {
                let stats = ops.load(objects, seed);
                reconciler.bootstrap.insert(kind, stats);
            }
        }
        reconciler.ensure_source_field().await?;

        let loaded: usize = reconciler.bootstrap.values().map(|s| s.loaded).sum();
        let tracked: usize = reconciler.bootstrap.values().map(|s| s.tracked).sum();
        tracing::info!(loaded, tracked, dry_run = reconciler.options.dry_run, "bootstrap complete");
        Ok(reconciler)
    }

    fn orphan_seed(&self) -> OrphanSeed {
        match (self.options.sweep.scope, self.sentinel_tag) {
            (SweepScope::All, _) => OrphanSeed::All,
            (SweepScope::Managed, Some(tag)) => OrphanSeed::Tagged(tag),
            (SweepScope::Managed, None) => OrphanSeed::Untracked,
        }
    }

    async fn ensure_sentinel_tag(&self) -> Result<Option<ObjectId>, SyncError> {
        let config = &self.options.managed_tag;
        let mut tag = Tag::new(config.name.clone());
        tag.color = config.color.clone();
        tag.base.description = config.description.clone();
        let upserted = self.upsert(Origin::internal(), tag).await?;
        Ok(upserted.object.id())
    }

    async fn ensure_source_field(&self) -> Result<(), SyncError> {
        let mut content_types = EntityKind::managed_content_types();
        content_types.sort();
        let field = CustomField {
            name: SOURCE_FIELD.to_string(),
            label: "Source".to_string(),
            field_type: Some(CustomFieldType::Text),
            content_types,
            ..CustomField::default()
        };
        self.upsert(Origin::internal(), field).await?;
        Ok(())
    }

    // ---- accessors ------------------------------------------------------

    pub fn store(&self) -> &CanonicalStore {
        &self.store
    }

    pub fn priority(&self) -> &SourcePriority {
        &self.priority
    }

    pub fn dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Id of the tag stamped on managed objects. `None` only in a dry run
    /// against a backend that does not have the tag yet.
    pub fn sentinel_tag(&self) -> Option<ObjectId> {
        self.sentinel_tag
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn bootstrap_stats(&self) -> &BTreeMap<EntityKind, LoadStats> {
        &self.bootstrap
    }

    /// The stored object with natural key `key`, for reference resolution.
    pub fn lookup<E: Stored>(&self, key: &NaturalKey) -> Option<E> {
        E::slot(&self.store).lookup(key)
    }

    fn lock_log(&self) -> MutexGuard<'_, RunLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a per-object failure the pipeline did not see, such as an
    /// unresolvable reference in a source's input.
    pub fn record_error(&self, error: RunError) {
        self.lock_log().errors.push(error);
    }

    pub fn errors(&self) -> Vec<RunError> {
        self.lock_log().errors.clone()
    }

    pub fn tallies(&self) -> BTreeMap<EntityKind, KindTally> {
        self.lock_log().tallies.clone()
    }

    // ---- upsert ---------------------------------------------------------

    /// Create-or-patch `desired` on behalf of `origin`.
    ///
    /// Failures are recorded in the run's error log before being returned.
    /// Priority errors cancel the run.
    pub async fn upsert<E: Stored>(
        &self,
        origin: Origin,
        desired: E,
    ) -> Result<Upserted<E>, SyncError> {
        let label = desired.natural_key().ok().map(|key| key.to_string());
        let result = self.try_upsert(&origin, desired).await;

        match &result {
            Ok(upserted) => self.tally(E::KIND, &upserted.action),
            Err(SyncError::Cancelled) => {}
            Err(err) => {
                tracing::warn!(
                    kind = %E::KIND,
                    key = label.as_deref().unwrap_or("-"),
                    error = %err,
                    "upsert failed"
                );
                let mut entry = RunError::from_sync(err, origin.source.as_ref()).kind(E::KIND);
                if let Some(label) = label {
                    entry = entry.object(label);
                }
                {
                    let mut log = self.lock_log();
                    log.tallies.entry(E::KIND).or_default().failed += 1;
                    log.errors.push(entry);
                }
                if err.is_fatal() {
                    tracing::error!(error = %err, "fatal error, cancelling run");
                    self.cancel.cancel();
                }
            }
        }
        result
    }

    /// [`upsert`](Self::upsert) with every field owned by `source`.
    pub async fn upsert_as<E: Stored>(
        &self,
        source: &SourceName,
        desired: E,
    ) -> Result<Upserted<E>, SyncError> {
        self.upsert(Origin::source(source.clone()), desired).await
    }

    async fn try_upsert<E: Stored>(
        &self,
        origin: &Origin,
        mut desired: E,
    ) -> Result<Upserted<E>, SyncError> {
        let kind = E::KIND;
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        for source in origin.sources() {
            self.priority.require(source)?;
        }

        if kind.is_managed() {
            let base = desired.base_mut();
            if let Some(tag) = self.sentinel_tag {
                base.tags.insert(tag);
            }
            if let Some(source) = &origin.source {
                base.set_source(source);
            }
        }

        desired.normalize();
        let key = desired.natural_key()?;
        let slot = E::slot(&self.store);
        let latch = slot.latch(&key);
        let _guard = latch.lock().await;

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        if slot.is_unconfirmed(&key) {
            return Err(SyncError::Unconfirmed { kind, key });
        }

        match slot.lookup(&key) {
            None => self.create(slot, origin, key, desired).await,
            Some(stored) => self.patch(slot, origin, key, desired, stored).await,
        }
    }

    async fn create<E: Stored>(
        &self,
        slot: &KindStore<E>,
        origin: &Origin,
        key: NaturalKey,
        desired: E,
    ) -> Result<Upserted<E>, SyncError> {
        let kind = E::KIND;
        let body = wire_body(kind, &desired)?;

        if self.options.dry_run {
            tracing::info!(kind = %kind, key = %key, "dry run: would create");
            return Ok(Upserted {
                object: desired,
                action: Action::WouldCreate,
            });
        }

        let echo = self
            .remote
            .create(kind, &body)
            .await
            .map_err(|source| SyncError::Remote {
                kind,
                op: RemoteOp::Create,
                source,
            })?;
        let created = decode::<E>(kind, echo).and_then(|created| {
            created
                .id()
                .map(|id| (created, id))
                .ok_or_else(|| SyncError::MissingId {
                    kind,
                    key: key.clone(),
                })
        });
        let (created, id) = match created {
            Ok(pair) => pair,
            Err(err) => {
                // The record exists remotely; refuse to create it again.
                slot.mark_unconfirmed(key);
                return Err(err);
            }
        };

        slot.insert(key.clone(), created.clone())?;
        if let Value::Object(fields) = &body {
            slot.record_owners(&key, &diff::owned_fields(fields), origin);
        }
        tracing::info!(kind = %kind, key = %key, id = %id, "created");
        Ok(Upserted {
            object: created,
            action: Action::Created,
        })
    }

    async fn patch<E: Stored>(
        &self,
        slot: &KindStore<E>,
        origin: &Origin,
        key: NaturalKey,
        desired: E,
        stored: E,
    ) -> Result<Upserted<E>, SyncError> {
        let kind = E::KIND;
        let id = stored.id().ok_or_else(|| SyncError::MissingId {
            kind,
            key: key.clone(),
        })?;
        // A source still claims it, whatever happens to the patch.
        slot.unmark_orphan(id);

        let desired_json = to_json(kind, &desired)?;
        let stored_json = to_json(kind, &stored)?;
        let owners = slot.field_owners(&key);
        let ctx = DiffContext {
            priority: &self.priority,
            origin,
            stored_owner: stored.base().source(),
            field_owners: &owners,
        };
        let changes = diff::compute(&desired_json, &stored_json, &ctx)?;

        if changes.is_empty() {
            tracing::debug!(kind = %kind, key = %key, id = %id, "up to date");
            return Ok(Upserted {
                object: stored,
                action: Action::Unchanged,
            });
        }

        let fields: Vec<String> = changes.keys().cloned().collect();
        if self.options.dry_run {
            tracing::info!(kind = %kind, key = %key, id = %id, fields = ?fields, "dry run: would patch");
            return Ok(Upserted {
                object: stored,
                action: Action::WouldPatch { diff: changes },
            });
        }

        let echo = self
            .remote
            .patch(kind, id, &changes)
            .await
            .map_err(|source| SyncError::Remote {
                kind,
                op: RemoteOp::Patch,
                source,
            })?;
        let patched: E = decode(kind, echo)?;

        slot.replace(key.clone(), patched.clone());
        slot.record_owners(&key, &diff::owned_fields(&changes), origin);
        tracing::info!(kind = %kind, key = %key, id = %id, fields = ?fields, "patched");
        Ok(Upserted {
            object: patched,
            action: Action::Patched { fields },
        })
    }

    fn tally(&self, kind: EntityKind, action: &Action) {
        let mut log = self.lock_log();
        let tally = log.tallies.entry(kind).or_default();
        match action {
            Action::Created => tally.created += 1,
            Action::Patched { .. } => tally.patched += 1,
            Action::Unchanged => tally.unchanged += 1,
            Action::WouldCreate => tally.would_create += 1,
            Action::WouldPatch { .. } => tally.would_patch += 1,
        }
    }

    // ---- sweep ----------------------------------------------------------

    /// Delete every still-marked orphan, children before parents.
    ///
    /// A delete that succeeds or finds the record already gone removes it
    /// from store and tracker. Any other failure is reported and the object
    /// stays.
    pub async fn sweep(&self) -> Vec<SweepEntry> {
        let mut entries = Vec::new();
        for ops in self.store.all().into_iter().rev() {
            let kind = ops.kind();
            if !kind.is_managed() {
                continue;
            }
            for (id, key) in ops.orphan_entries() {
                let outcome = if self.cancel.is_cancelled() {
                    SweepOutcome::Cancelled
                } else if self.options.dry_run {
                    tracing::info!(kind = %kind, key = %key, id = %id, "dry run: would delete orphan");
                    SweepOutcome::WouldDelete
                } else {
                    match self.remote.delete(kind, id).await {
                        Ok(()) => {
                            ops.forget(id);
                            tracing::info!(kind = %kind, key = %key, id = %id, "deleted orphan");
                            SweepOutcome::Deleted
                        }
                        Err(RemoteError::NotFound { .. }) => {
                            ops.forget(id);
                            tracing::debug!(kind = %kind, id = %id, "orphan already gone");
                            SweepOutcome::AlreadyGone
                        }
                        Err(err) => {
                            tracing::warn!(kind = %kind, key = %key, id = %id, error = %err, "orphan delete failed");
                            SweepOutcome::Failed {
                                error: err.to_string(),
                            }
                        }
                    }
                };
                entries.push(SweepEntry {
                    kind,
                    id,
                    key,
                    outcome,
                });
            }
        }
        entries
    }

    // ---- full run -------------------------------------------------------

    /// Run every source concurrently, then sweep (unless a source failed, the
    /// run was aborted, or sweeping is disabled) and report.
    pub async fn run(self: Arc<Self>, sources: Vec<Arc<dyn Source>>) -> RunReport {
        let mut join_set = JoinSet::new();
        let mut names = HashMap::new();
        for source in sources {
            let reconciler = Arc::clone(&self);
            let name = source.name().clone();
            let handle = join_set.spawn(async move {
                let name = source.name().clone();
                let result = source.sync(&reconciler).await;
                (name, result)
            });
            names.insert(handle.id(), name);
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::info!(source = %name, "source finished");
                    outcomes.push(SourceOutcome {
                        name: name.0,
                        error: None,
                    });
                }
                Ok((name, Err(err))) => {
                    tracing::warn!(source = %name, error = %err, "source failed");
                    if err.is_fatal() {
                        self.cancel.cancel();
                    }
                    outcomes.push(SourceOutcome {
                        name: name.0,
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => {
                    let name = names
                        .remove(&err.id())
                        .map_or_else(|| "unknown".to_string(), |name| name.0);
                    tracing::error!(source = %name, error = %err, "source task panicked");
                    outcomes.push(SourceOutcome {
                        name,
                        error: Some(format!("internal error: {err}")),
                    });
                }
            }
        }
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));

        let aborted = self.cancel.is_cancelled();
        let sweep_skipped = if !self.options.sweep.enabled {
            Some("sweep disabled in config".to_string())
        } else if aborted {
            Some("run was aborted".to_string())
        } else {
            outcomes
                .iter()
                .find(|o| !o.succeeded())
                .map(|o| format!("source {} failed", o.name))
        };

        let sweep = match &sweep_skipped {
            None => self.sweep().await,
            Some(reason) => {
                tracing::warn!(reason = %reason, "skipping orphan sweep");
                Vec::new()
            }
        };

        self.report(outcomes, sweep, sweep_skipped)
    }

    fn report(
        &self,
        sources: Vec<SourceOutcome>,
        sweep: Vec<SweepEntry>,
        sweep_skipped: Option<String>,
    ) -> RunReport {
        let log = self.lock_log();
        RunReport {
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run: self.options.dry_run,
            aborted: self.cancel.is_cancelled(),
            bootstrap: self.bootstrap.clone(),
            kinds: log.tallies.clone(),
            sources,
            errors: log.errors.clone(),
            sweep,
            sweep_skipped,
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Wire helpers
// ---------------------------------------------------------------------------

fn to_json<E: Entity>(kind: EntityKind, object: &E) -> Result<Value, SyncError> {
    serde_json::to_value(object).map_err(|source| SyncError::Decode { kind, source })
}

/// Create body: the serialized object without `id` and without nulls.
fn wire_body<E: Entity>(kind: EntityKind, object: &E) -> Result<Value, SyncError> {
    let mut body = to_json(kind, object)?;
    if let Value::Object(fields) = &mut body {
        fields.remove("id");
        fields.retain(|_, value| !value.is_null());
    }
    Ok(body)
}

fn decode<E: Entity>(kind: EntityKind, value: Value) -> Result<E, SyncError> {
    serde_json::from_value(value).map_err(|source| SyncError::Decode { kind, source })
}
