//! End-to-end reconciliation against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use ssot_core::config::SweepScope;
use ssot_core::objects::{CustomField, Device, IpAddress, Site, Tag};
use ssot_core::{Entity, EntityKind, NaturalKey, ObjectId, SourceName, SourcePriority};
use ssot_sync::{
    Action, FieldDiff, MemoryRemote, Reconciler, ReconcilerOptions, RemoteClient, RemoteError, RemoteOp,
    Source, SourceError, SweepOutcome, SyncError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn priority(names: &[&str]) -> SourcePriority {
    SourcePriority::from_names(names.iter().copied()).unwrap()
}

async fn bootstrap_with(
    remote: &Arc<MemoryRemote>,
    priority: SourcePriority,
    options: ReconcilerOptions,
) -> Reconciler {
    let client: Arc<dyn RemoteClient> = remote.clone();
    Reconciler::bootstrap(client, priority, options, CancellationToken::new())
        .await
        .unwrap()
}

async fn bootstrap(remote: &Arc<MemoryRemote>) -> Reconciler {
    bootstrap_with(
        remote,
        priority(&["primary", "secondary"]),
        ReconcilerOptions::default(),
    )
    .await
}

/// Seed the sentinel tag so tests know its id before bootstrap.
fn seed_sentinel(remote: &MemoryRemote) -> ObjectId {
    remote.seed(
        EntityKind::Tag,
        json!({
            "name": "ssot",
            "slug": "ssot",
            "color": "00add8",
            "description": "Created and maintained by ssot"
        }),
    )
}

/// A site exactly as a previous run by `source` would have left it.
fn seed_managed_site(remote: &MemoryRemote, tag: ObjectId, name: &str, source: &str) -> ObjectId {
    remote.seed(
        EntityKind::Site,
        json!({
            "name": name,
            "slug": name.to_lowercase(),
            "tags": [tag.0],
            "custom_fields": {"ssot_source": source}
        }),
    )
}

fn site_named<'a>(objects: &'a [Value], name: &str) -> Option<&'a Value> {
    objects.iter().find(|o| o["name"] == json!(name))
}

/// Submits a fixed list of sites.
struct StaticSource {
    name: SourceName,
    sites: Vec<Site>,
}

impl StaticSource {
    fn new(name: &str, sites: &[&str]) -> Arc<dyn Source> {
        Arc::new(Self {
            name: SourceName::from(name),
            sites: sites.iter().map(|s| Site::new(*s)).collect(),
        })
    }
}

#[async_trait]
impl Source for StaticSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn sync(&self, reconciler: &Reconciler) -> Result<(), SourceError> {
        for site in &self.sites {
            if let Err(err) = reconciler.upsert_as(&self.name, site.clone()).await {
                if err.is_fatal() {
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }
}

/// Fails before submitting anything.
struct BrokenSource(SourceName);

#[async_trait]
impl Source for BrokenSource {
    fn name(&self) -> &SourceName {
        &self.0
    }

    async fn sync(&self, _reconciler: &Reconciler) -> Result<(), SourceError> {
        Err(SourceError::Load {
            path: "inventory.yaml".into(),
            message: "expected a mapping".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_creates_sentinel_tag_and_source_field() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;

    let tags = remote.objects(EntityKind::Tag);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0]["name"], json!("ssot"));
    assert_eq!(reconciler.sentinel_tag(), Some(ObjectId(1)));

    let fields: Vec<CustomField> = remote
        .objects(EntityKind::CustomField)
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "ssot_source");
    assert!(fields[0].content_types.contains(&"dcim.site".to_string()));
    assert!(!fields[0].content_types.contains(&"extras.tag".to_string()));
}

#[tokio::test]
async fn bootstrap_reuses_existing_sentinel_tag() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    let reconciler = bootstrap(&remote).await;

    assert_eq!(reconciler.sentinel_tag(), Some(tag));
    assert_eq!(remote.calls_to(RemoteOp::Create, EntityKind::Tag), 0);
    assert_eq!(remote.calls_to(RemoteOp::Patch, EntityKind::Tag), 0);
}

#[tokio::test]
async fn bootstrap_skips_objects_it_cannot_key() {
    let remote = Arc::new(MemoryRemote::new());
    remote.seed(EntityKind::Site, json!({"name": "NYC"}));
    remote.seed(EntityKind::Site, json!({"name": ""}));
    remote.seed(EntityKind::Site, json!({"name": "NYC"}));

    let reconciler = bootstrap(&remote).await;
    let stats = reconciler.bootstrap_stats()[&EntityKind::Site];
    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.tracked, 1);
}

#[tokio::test]
async fn bootstrap_list_failure_is_fatal_and_writes_nothing() {
    let remote = Arc::new(MemoryRemote::new());
    remote.fail(
        RemoteOp::List,
        EntityKind::Vlan,
        RemoteError::Status {
            status: 503,
            body: "maintenance".into(),
        },
    );
    let client: Arc<dyn RemoteClient> = remote.clone();
    let err = Reconciler::bootstrap(
        client,
        priority(&["primary"]),
        ReconcilerOptions::default(),
        CancellationToken::new(),
    )
    .await
    .err()
    .unwrap();

    assert!(matches!(
        err,
        SyncError::Bootstrap {
            kind: EntityKind::Vlan,
            ..
        }
    ));
    assert_eq!(remote.writes(), 0);
}

// ---------------------------------------------------------------------------
// Upsert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_identical_submission_is_a_no_op() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    let source = SourceName::from("primary");

    let first = reconciler.upsert_as(&source, Site::new("NYC")).await.unwrap();
    assert_eq!(first.action, Action::Created);
    let second = reconciler.upsert_as(&source, Site::new("NYC")).await.unwrap();
    assert_eq!(second.action, Action::Unchanged);

    assert_eq!(remote.calls_to(RemoteOp::Create, EntityKind::Site), 1);
    assert_eq!(remote.calls_to(RemoteOp::Patch, EntityKind::Site), 0);
    assert_eq!(second.object.id(), first.object.id());
}

#[tokio::test]
async fn created_objects_carry_sentinel_tag_and_source() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    let tag = reconciler.sentinel_tag().unwrap();

    let created = reconciler
        .upsert_as(&SourceName::from("secondary"), Site::new("NYC"))
        .await
        .unwrap()
        .object;

    assert!(created.base.tags.contains(&tag));
    assert_eq!(created.base.source(), Some("secondary"));
    let stored = remote.get(EntityKind::Site, created.id().unwrap()).unwrap();
    assert_eq!(stored["custom_fields"]["ssot_source"], json!("secondary"));
    assert_eq!(stored["tags"], json!([tag.0]));
}

#[tokio::test]
async fn identity_field_never_reaches_the_backend() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    let id = seed_managed_site(&remote, tag, "NYC", "primary");
    let reconciler = bootstrap(&remote).await;
    remote.clear_calls();

    let mut desired = Site::new("NYC");
    desired.base.id = Some(ObjectId(999));
    let upserted = reconciler
        .upsert_as(&SourceName::from("primary"), desired)
        .await
        .unwrap();

    assert_eq!(upserted.action, Action::Unchanged);
    assert_eq!(remote.writes(), 0);
    assert_eq!(remote.get(EntityKind::Site, id).unwrap()["id"], json!(id.0));
}

#[tokio::test]
async fn lower_priority_source_cannot_override_owner() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    let id = remote.seed(
        EntityKind::Site,
        json!({
            "name": "NYC",
            "slug": "nyc",
            "description": "from p3",
            "tags": [tag.0],
            "custom_fields": {"ssot_source": "p3"}
        }),
    );
    let reconciler = bootstrap_with(
        &remote,
        priority(&["p5", "p4", "p3", "p2", "p1"]),
        ReconcilerOptions::default(),
    )
    .await;

    let mut low = Site::new("NYC");
    low.base.description = "from p1".into();
    let upserted = reconciler
        .upsert_as(&SourceName::from("p1"), low)
        .await
        .unwrap();
    assert_eq!(upserted.action, Action::Unchanged);
    assert_eq!(remote.calls_to(RemoteOp::Patch, EntityKind::Site), 0);

    let mut high = Site::new("NYC");
    high.base.description = "from p5".into();
    let upserted = reconciler
        .upsert_as(&SourceName::from("p5"), high)
        .await
        .unwrap();
    match upserted.action {
        Action::Patched { fields } => assert!(fields.contains(&"description".to_string())),
        other => panic!("expected a patch, got {other:?}"),
    }

    let stored = remote.get(EntityKind::Site, id).unwrap();
    assert_eq!(stored["description"], json!("from p5"));
    assert_eq!(stored["custom_fields"]["ssot_source"], json!("p5"));
}

#[tokio::test]
async fn field_owned_this_run_is_protected_from_lower_sources() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;

    let mut first = Site::new("NYC");
    first.base.description = "primary says".into();
    reconciler
        .upsert_as(&SourceName::from("primary"), first)
        .await
        .unwrap();

    let mut second = Site::new("NYC");
    second.base.description = "secondary says".into();
    let upserted = reconciler
        .upsert_as(&SourceName::from("secondary"), second)
        .await
        .unwrap();

    assert_eq!(upserted.action, Action::Unchanged);
    let sites = remote.objects(EntityKind::Site);
    assert_eq!(sites[0]["description"], json!("primary says"));
}

#[tokio::test]
async fn concurrent_submissions_create_once() {
    let remote = Arc::new(MemoryRemote::new().with_latency(Duration::from_millis(20)));
    let reconciler = Arc::new(bootstrap(&remote).await);
    let source = SourceName::from("primary");

    let mut handles = Vec::new();
    for _ in 0..4 {
        let reconciler = Arc::clone(&reconciler);
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            reconciler.upsert_as(&source, Site::new("NYC")).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().action == Action::Created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(remote.calls_to(RemoteOp::Create, EntityKind::Site), 1);
    assert_eq!(remote.count(EntityKind::Site), 1);
    assert_eq!(reconciler.store().sites.len(), 1);
}

#[tokio::test]
async fn missing_key_is_rejected_before_any_call() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    remote.clear_calls();

    let err = reconciler
        .upsert_as(&SourceName::from("primary"), Site::new(""))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Validation(_)));
    assert!(remote.calls().is_empty());
    assert_eq!(reconciler.errors().len(), 1);
    assert_eq!(reconciler.tallies()[&EntityKind::Site].failed, 1);
    assert!(!reconciler.is_cancelled());
}

#[tokio::test]
async fn failed_patch_leaves_store_untouched() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    let id = seed_managed_site(&remote, tag, "NYC", "primary");
    let reconciler = bootstrap(&remote).await;
    remote.fail(
        RemoteOp::Patch,
        EntityKind::Site,
        RemoteError::Status {
            status: 500,
            body: "boom".into(),
        },
    );

    let mut desired = Site::new("NYC");
    desired.base.description = "new".into();
    let err = reconciler
        .upsert_as(&SourceName::from("primary"), desired)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Remote {
            op: RemoteOp::Patch,
            ..
        }
    ));
    let stored: Site = reconciler.lookup(&NaturalKey::name("NYC")).unwrap();
    assert_eq!(stored.base.description, "");
    assert_eq!(stored.id(), Some(id));
    // Still claimed by a source, so the sweep leaves it alone.
    assert!(!reconciler.store().sites.is_orphan(id));
    assert_eq!(reconciler.errors()[0].object.as_deref(), Some("NYC"));
}

#[tokio::test]
async fn failed_create_leaves_store_empty() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    remote.fail_once(
        RemoteOp::Create,
        EntityKind::Site,
        RemoteError::Transport("connection reset".into()),
    );

    let source = SourceName::from("primary");
    assert!(reconciler.upsert_as(&source, Site::new("NYC")).await.is_err());
    assert!(reconciler.store().sites.is_empty());

    // The next attempt goes through normally.
    let upserted = reconciler.upsert_as(&source, Site::new("NYC")).await.unwrap();
    assert_eq!(upserted.action, Action::Created);
}

/// Creates for real, then echoes the record back without its id.
struct EchoWithoutId(Arc<MemoryRemote>);

#[async_trait]
impl RemoteClient for EchoWithoutId {
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError> {
        self.0.list(kind).await
    }

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<Value, RemoteError> {
        let mut echo = self.0.create(kind, body).await?;
        if kind == EntityKind::Site {
            if let Value::Object(fields) = &mut echo {
                fields.remove("id");
            }
        }
        Ok(echo)
    }

    async fn patch(
        &self,
        kind: EntityKind,
        id: ObjectId,
        diff: &FieldDiff,
    ) -> Result<Value, RemoteError> {
        self.0.patch(kind, id, diff).await
    }

    async fn delete(&self, kind: EntityKind, id: ObjectId) -> Result<(), RemoteError> {
        self.0.delete(kind, id).await
    }
}

#[tokio::test]
async fn unusable_create_echo_is_never_created_twice() {
    let remote = Arc::new(MemoryRemote::new());
    let client: Arc<dyn RemoteClient> = Arc::new(EchoWithoutId(Arc::clone(&remote)));
    let reconciler = Reconciler::bootstrap(
        client,
        priority(&["primary"]),
        ReconcilerOptions::default(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let source = SourceName::from("primary");

    let first = reconciler.upsert_as(&source, Site::new("NYC")).await.unwrap_err();
    assert!(matches!(first, SyncError::MissingId { .. }));

    let second = reconciler.upsert_as(&source, Site::new("NYC")).await.unwrap_err();
    assert!(matches!(second, SyncError::Unconfirmed { kind: EntityKind::Site, .. }));
    assert_eq!(remote.calls_to(RemoteOp::Create, EntityKind::Site), 1);
    assert_eq!(remote.count(EntityKind::Site), 1);
    assert_eq!(reconciler.tallies()[&EntityKind::Site].failed, 2);
}

#[tokio::test]
async fn ip_address_matches_regardless_of_spelling() {
    let remote = Arc::new(MemoryRemote::new());
    let stored = remote.seed(EntityKind::IpAddress, json!({"address": "2001:db8::1/64"}));
    let reconciler = Arc::new(bootstrap(&remote).await);
    remote.clear_calls();

    let desired = IpAddress {
        address: "2001:DB8:0::1/64".into(),
        ..IpAddress::default()
    };
    let upserted = reconciler
        .upsert_as(&SourceName::from("primary"), desired)
        .await
        .unwrap();

    match &upserted.action {
        Action::Patched { fields } => assert!(!fields.iter().any(|f| f == "address"), "{fields:?}"),
        other => panic!("expected a patch, got {other:?}"),
    }
    assert_eq!(upserted.object.id(), Some(stored));
    assert_eq!(remote.calls_to(RemoteOp::Create, EntityKind::IpAddress), 0);

    let report = Arc::clone(&reconciler).run(Vec::new()).await;
    assert_eq!(remote.calls_to(RemoteOp::Delete, EntityKind::IpAddress), 0);
    assert!(report.sweep.iter().all(|e| e.kind != EntityKind::IpAddress));
    assert_eq!(remote.count(EntityKind::IpAddress), 1);
}

#[tokio::test]
async fn unknown_source_cancels_the_run() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    remote.clear_calls();

    let err = reconciler
        .upsert_as(&SourceName::from("stranger"), Site::new("NYC"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Priority(_)));
    assert!(err.is_fatal());
    assert!(reconciler.is_cancelled());
    assert_eq!(remote.writes(), 0);
}

#[tokio::test]
async fn cancelled_run_submits_nothing() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    remote.clear_calls();
    reconciler.cancel_token().cancel();

    let err = reconciler
        .upsert_as(&SourceName::from("primary"), Site::new("NYC"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert!(remote.calls().is_empty());
    assert!(reconciler.errors().is_empty());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let remote = Arc::new(MemoryRemote::new());
    let existing = remote.seed(EntityKind::Site, json!({"name": "SFO", "slug": "sfo"}));
    let options = ReconcilerOptions {
        dry_run: true,
        ..ReconcilerOptions::default()
    };
    let reconciler = Arc::new(bootstrap_with(&remote, priority(&["primary"]), options).await);
    assert_eq!(reconciler.sentinel_tag(), None);

    let report = reconciler
        .run(vec![StaticSource::new("primary", &["NYC"])])
        .await;

    assert_eq!(remote.writes(), 0);
    assert!(report.dry_run);
    assert_eq!(report.tally(EntityKind::Site).would_create, 1);
    assert_eq!(report.sweep.len(), 1);
    assert_eq!(report.sweep[0].id, existing);
    assert_eq!(report.sweep[0].outcome, SweepOutcome::WouldDelete);
    assert_eq!(remote.count(EntityKind::Site), 1);
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconfirmed_sites_survive_and_the_rest_are_swept() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    let nyc = seed_managed_site(&remote, tag, "NYC", "primary");
    let lax = seed_managed_site(&remote, tag, "LAX", "primary");
    let reconciler = Arc::new(bootstrap(&remote).await);
    remote.clear_calls();

    let report = Arc::clone(&reconciler)
        .run(vec![StaticSource::new("primary", &["NYC", "SFO"])])
        .await;

    assert_eq!(remote.calls_to(RemoteOp::Patch, EntityKind::Site), 0);
    assert_eq!(remote.calls_to(RemoteOp::Create, EntityKind::Site), 1);
    assert_eq!(remote.calls_to(RemoteOp::Delete, EntityKind::Site), 1);

    let sites = remote.objects(EntityKind::Site);
    assert!(site_named(&sites, "NYC").is_some());
    assert!(site_named(&sites, "SFO").is_some());
    assert!(site_named(&sites, "LAX").is_none());
    assert!(remote.get(EntityKind::Site, nyc).is_some());

    assert_eq!(report.deleted(), 1);
    assert_eq!(report.sweep[0].id, lax);
    assert_eq!(report.sweep[0].key, "LAX");
    let tally = report.tally(EntityKind::Site);
    assert_eq!((tally.created, tally.unchanged), (1, 1));
    assert!(report.is_clean());
    assert!(reconciler
        .lookup::<Site>(&NaturalKey::name("LAX"))
        .is_none());
}

#[tokio::test]
async fn object_claimed_by_any_source_is_kept() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    seed_managed_site(&remote, tag, "NYC", "primary");
    seed_managed_site(&remote, tag, "LAX", "secondary");
    let reconciler = Arc::new(bootstrap(&remote).await);

    let report = reconciler
        .run(vec![
            StaticSource::new("primary", &["NYC"]),
            StaticSource::new("secondary", &["LAX"]),
        ])
        .await;

    assert!(report.sweep.is_empty());
    assert_eq!(remote.count(EntityKind::Site), 2);
    let names: Vec<&str> = report.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["primary", "secondary"]);
}

#[tokio::test]
async fn sweep_deletes_children_before_parents() {
    let remote = Arc::new(MemoryRemote::new());
    let site = remote.seed(EntityKind::Site, json!({"name": "NYC"}));
    remote.seed(EntityKind::Device, json!({"name": "esx01", "site": site.0}));
    let reconciler = Arc::new(bootstrap(&remote).await);
    remote.clear_calls();

    let report = reconciler.run(Vec::new()).await;

    let deletes: Vec<EntityKind> = remote
        .calls()
        .into_iter()
        .filter(|c| c.op == RemoteOp::Delete)
        .map(|c| c.kind)
        .collect();
    assert_eq!(deletes, [EntityKind::Device, EntityKind::Site]);
    assert_eq!(report.deleted(), 2);
    // Tags and custom fields are never swept.
    assert_eq!(remote.count(EntityKind::Tag), 1);
    assert_eq!(remote.count(EntityKind::CustomField), 1);
}

#[tokio::test]
async fn failed_delete_keeps_the_object() {
    let remote = Arc::new(MemoryRemote::new());
    let sfo = remote.seed(EntityKind::Site, json!({"name": "SFO"}));
    let reconciler = Arc::new(bootstrap(&remote).await);
    remote.fail_object(
        RemoteOp::Delete,
        EntityKind::Site,
        sfo,
        RemoteError::Status {
            status: 409,
            body: "protected".into(),
        },
    );

    let report = Arc::clone(&reconciler).run(Vec::new()).await;

    assert_eq!(report.sweep_failures(), 1);
    assert!(matches!(report.sweep[0].outcome, SweepOutcome::Failed { .. }));
    assert!(!report.is_clean());
    assert!(remote.get(EntityKind::Site, sfo).is_some());
    assert!(reconciler.store().sites.is_orphan(sfo));
    assert!(reconciler
        .lookup::<Site>(&NaturalKey::name("SFO"))
        .is_some());
}

#[tokio::test]
async fn delete_of_vanished_object_counts_as_gone() {
    let remote = Arc::new(MemoryRemote::new());
    let sfo = remote.seed(EntityKind::Site, json!({"name": "SFO"}));
    let reconciler = Arc::new(bootstrap(&remote).await);
    remote.fail_object(
        RemoteOp::Delete,
        EntityKind::Site,
        sfo,
        RemoteError::NotFound {
            kind: EntityKind::Site,
            id: sfo,
        },
    );

    let report = Arc::clone(&reconciler).run(Vec::new()).await;

    assert_eq!(report.sweep[0].outcome, SweepOutcome::AlreadyGone);
    assert_eq!(report.deleted(), 1);
    assert!(reconciler.store().sites.is_empty());
}

#[tokio::test]
async fn failed_source_skips_the_sweep() {
    let remote = Arc::new(MemoryRemote::new());
    let sfo = remote.seed(EntityKind::Site, json!({"name": "SFO"}));
    let reconciler = Arc::new(bootstrap(&remote).await);

    let report = reconciler
        .run(vec![
            StaticSource::new("primary", &["NYC"]),
            Arc::new(BrokenSource(SourceName::from("secondary"))),
        ])
        .await;

    assert!(report.sweep.is_empty());
    assert_eq!(report.sweep_skipped.as_deref(), Some("source secondary failed"));
    assert!(remote.get(EntityKind::Site, sfo).is_some());
    assert_eq!(report.tally(EntityKind::Site).created, 1);
    assert!(!report.sources[1].succeeded());
    assert!(!report.aborted);
}

/// Panics partway through its run.
struct PanickingSource(SourceName);

#[async_trait]
impl Source for PanickingSource {
    fn name(&self) -> &SourceName {
        &self.0
    }

    async fn sync(&self, _reconciler: &Reconciler) -> Result<(), SourceError> {
        panic!("connector bug");
    }
}

#[tokio::test]
async fn panicking_source_is_reported_by_name() {
    let remote = Arc::new(MemoryRemote::new());
    remote.seed(EntityKind::Site, json!({"name": "SFO"}));
    let reconciler = Arc::new(bootstrap(&remote).await);

    let report = reconciler
        .run(vec![
            StaticSource::new("primary", &["NYC"]),
            Arc::new(PanickingSource(SourceName::from("secondary"))),
        ])
        .await;

    assert_eq!(report.sources[1].name, "secondary");
    assert!(!report.sources[1].succeeded());
    assert_eq!(report.sweep_skipped.as_deref(), Some("source secondary failed"));
    assert_eq!(remote.calls_to(RemoteOp::Delete, EntityKind::Site), 0);
}

#[tokio::test]
async fn fatal_source_error_aborts_the_run() {
    let remote = Arc::new(MemoryRemote::new());
    remote.seed(EntityKind::Site, json!({"name": "SFO"}));
    let reconciler = Arc::new(bootstrap(&remote).await);

    let report = reconciler
        .run(vec![StaticSource::new("stranger", &["NYC"])])
        .await;

    assert!(report.aborted);
    assert_eq!(report.sweep_skipped.as_deref(), Some("run was aborted"));
    assert_eq!(remote.calls_to(RemoteOp::Delete, EntityKind::Site), 0);
    assert_eq!(report.errors.len(), 1);
}

#[tokio::test]
async fn disabled_sweep_deletes_nothing() {
    let remote = Arc::new(MemoryRemote::new());
    remote.seed(EntityKind::Site, json!({"name": "SFO"}));
    let mut options = ReconcilerOptions::default();
    options.sweep.enabled = false;
    let reconciler = Arc::new(bootstrap_with(&remote, priority(&["primary"]), options).await);

    let report = reconciler.run(Vec::new()).await;

    assert_eq!(report.sweep_skipped.as_deref(), Some("sweep disabled in config"));
    assert_eq!(remote.count(EntityKind::Site), 1);
}

#[tokio::test]
async fn managed_scope_only_sweeps_tagged_objects() {
    let remote = Arc::new(MemoryRemote::new());
    let tag = seed_sentinel(&remote);
    let ours = seed_managed_site(&remote, tag, "NYC", "primary");
    let manual = remote.seed(EntityKind::Site, json!({"name": "LAB"}));
    let mut options = ReconcilerOptions::default();
    options.sweep.scope = SweepScope::Managed;
    let reconciler = Arc::new(bootstrap_with(&remote, priority(&["primary"]), options).await);

    let report = reconciler.run(Vec::new()).await;

    assert_eq!(report.sweep.len(), 1);
    assert_eq!(report.sweep[0].id, ours);
    assert!(remote.get(EntityKind::Site, ours).is_none());
    assert!(remote.get(EntityKind::Site, manual).is_some());
}

#[tokio::test]
async fn tags_applied_by_hand_are_preserved() {
    let remote = Arc::new(MemoryRemote::new());
    let sentinel = seed_sentinel(&remote);
    let manual = remote.seed_entity(&Tag::new("customer-a"));
    let id = remote.seed(
        EntityKind::Site,
        json!({"name": "NYC", "slug": "nyc", "tags": [manual.0]}),
    );
    let reconciler = bootstrap(&remote).await;

    reconciler
        .upsert_as(&SourceName::from("primary"), Site::new("NYC"))
        .await
        .unwrap();

    let stored = remote.get(EntityKind::Site, id).unwrap();
    let mut tags: Vec<u64> = serde_json::from_value(stored["tags"].clone()).unwrap();
    tags.sort_unstable();
    let mut expected = vec![sentinel.0, manual.0];
    expected.sort_unstable();
    assert_eq!(tags, expected);
}

#[tokio::test]
async fn device_lookup_is_scoped_to_its_site() {
    let remote = Arc::new(MemoryRemote::new());
    let reconciler = bootstrap(&remote).await;
    let source = SourceName::from("primary");

    let nyc = reconciler.upsert_as(&source, Site::new("NYC")).await.unwrap().object;
    let lax = reconciler.upsert_as(&source, Site::new("LAX")).await.unwrap().object;
    for site in [&nyc, &lax] {
        let device = Device {
            name: "edge01".into(),
            site: site.id(),
            ..Device::default()
        };
        let upserted = reconciler.upsert_as(&source, device).await.unwrap();
        assert_eq!(upserted.action, Action::Created);
    }

    assert_eq!(remote.count(EntityKind::Device), 2);
    let key = NaturalKey::scoped(lax.id().unwrap(), "edge01");
    let device: Device = reconciler.lookup(&key).unwrap();
    assert_eq!(device.site, lax.id());
}
