//! Canonical Store: the in-memory mirror of remote state.
//!
//! One [`KindStore`] per entity kind, each behind its own mutex. The mutex
//! guards the natural-key index, the kind's orphan set, the per-field owners
//! recorded this run and the per-key latches. It is never held across an
//! `.await`.
//!
//! Per-key latches are async mutexes handed out by [`KindStore::latch`]. The
//! pipeline holds one across lookup, network call and insert so two
//! submissions of the same key never both create.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;

use ssot_core::objects::*;
use ssot_core::{Entity, EntityKind, NaturalKey, ObjectId, SourceName};

use crate::diff::Origin;
use crate::error::SyncError;
use crate::orphans::OrphanSet;

// ---------------------------------------------------------------------------
// 1. Per-kind store
// ---------------------------------------------------------------------------

struct KindState<E> {
    index: HashMap<NaturalKey, E>,
    ids: HashMap<ObjectId, NaturalKey>,
    orphans: OrphanSet<E>,
    owners: HashMap<NaturalKey, BTreeMap<String, SourceName>>,
    latches: HashMap<NaturalKey, Arc<tokio::sync::Mutex<()>>>,
    unconfirmed: HashSet<NaturalKey>,
}

impl<E> Default for KindState<E> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            ids: HashMap::new(),
            orphans: OrphanSet::default(),
            owners: HashMap::new(),
            latches: HashMap::new(),
            unconfirmed: HashSet::new(),
        }
    }
}

/// Objects of one kind, indexed by natural key.
pub struct KindStore<E> {
    state: Mutex<KindState<E>>,
}

impl<E> Default for KindStore<E> {
    fn default() -> Self {
        Self {
            state: Mutex::new(KindState::default()),
        }
    }
}

impl<E: Entity> KindStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, KindState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, key: &NaturalKey) -> Option<E> {
        self.lock().index.get(key).cloned()
    }

    /// Add a newly created or bootstrapped object. The key must be free.
    pub fn insert(&self, key: NaturalKey, object: E) -> Result<(), SyncError> {
        let mut state = self.lock();
        if state.index.contains_key(&key) {
            return Err(SyncError::DuplicateKey { kind: E::KIND, key });
        }
        if let Some(id) = object.id() {
            state.ids.insert(id, key.clone());
        }
        state.index.insert(key, object);
        Ok(())
    }

    /// Overwrite the object stored under `key` after a successful patch.
    pub fn replace(&self, key: NaturalKey, object: E) {
        let mut state = self.lock();
        if let Some(id) = object.id() {
            state.ids.insert(id, key.clone());
        }
        state.index.insert(key, object);
    }

    /// Drop the object with `id` from the index and the orphan set.
    pub fn remove(&self, id: ObjectId) -> Option<E> {
        let mut state = self.lock();
        state.orphans.unmark(id);
        let key = state.ids.remove(&id)?;
        state.owners.remove(&key);
        state.index.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().index.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> Vec<NaturalKey> {
        let mut keys: Vec<NaturalKey> = self.lock().index.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn latch(&self, key: &NaturalKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut state = self.lock();
        Arc::clone(state.latches.entry(key.clone()).or_default())
    }

    /// Remember that a create for `key` reached the backend but its echo
    /// was unusable. The record exists remotely without a store entry.
    pub fn mark_unconfirmed(&self, key: NaturalKey) {
        self.lock().unconfirmed.insert(key);
    }

    pub fn is_unconfirmed(&self, key: &NaturalKey) -> bool {
        self.lock().unconfirmed.contains(key)
    }

    // ---- orphan tracking ------------------------------------------------

    pub fn mark_orphan(&self, object: E) {
        if let Some(id) = object.id() {
            self.lock().orphans.mark(id, object);
        }
    }

    pub fn unmark_orphan(&self, id: ObjectId) -> bool {
        self.lock().orphans.unmark(id)
    }

    pub fn is_orphan(&self, id: ObjectId) -> bool {
        self.lock().orphans.contains(id)
    }

    /// Still-unclaimed objects, in id order.
    pub fn orphans(&self) -> Vec<E> {
        self.lock()
            .orphans
            .snapshot()
            .into_iter()
            .map(|(_, obj)| obj)
            .collect()
    }

    // ---- field ownership ------------------------------------------------

    pub fn field_owners(&self, key: &NaturalKey) -> BTreeMap<String, SourceName> {
        self.lock().owners.get(key).cloned().unwrap_or_default()
    }

    /// Record `origin` as the owner of each written field.
    pub fn record_owners(&self, key: &NaturalKey, fields: &[String], origin: &Origin) {
        if origin.is_internal() {
            return;
        }
        let mut state = self.lock();
        let owners = state.owners.entry(key.clone()).or_default();
        for field in fields {
            if let Some(source) = origin.source_for(field) {
                owners.insert(field.clone(), source.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Kind-erased operations
// ---------------------------------------------------------------------------

/// Which bootstrapped objects become deletion candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanSeed {
    /// Nothing is tracked.
    Untracked,
    /// Every object of a managed kind.
    All,
    /// Only objects carrying this tag.
    Tagged(ObjectId),
}

/// Bootstrap counts for one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub loaded: usize,
    pub skipped: usize,
    pub tracked: usize,
}

/// What bootstrap and the sweep need from a kind, without knowing its type.
pub trait KindOps: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn orphan_count(&self) -> usize;

    /// `(id, key)` of each orphan, in id order.
    fn orphan_entries(&self) -> Vec<(ObjectId, String)>;

    /// Remove `id` from store and tracker once it is gone remotely.
    fn forget(&self, id: ObjectId);

    /// Seed the store from listed wire objects. Objects that fail to decode,
    /// lack an id or key, or repeat an indexed key are skipped with a warning.
    fn load(&self, objects: Vec<Value>, seed: OrphanSeed) -> LoadStats;
}

impl<E: Entity> KindOps for KindStore<E> {
    fn kind(&self) -> EntityKind {
        E::KIND
    }

    fn len(&self) -> usize {
        KindStore::len(self)
    }

    fn orphan_count(&self) -> usize {
        self.lock().orphans.len()
    }

    fn orphan_entries(&self) -> Vec<(ObjectId, String)> {
        let state = self.lock();
        state
            .orphans
            .snapshot()
            .into_iter()
            .map(|(id, _)| {
                let key = state
                    .ids
                    .get(&id)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("#{id}"));
                (id, key)
            })
            .collect()
    }

    fn forget(&self, id: ObjectId) {
        self.remove(id);
    }

    fn load(&self, objects: Vec<Value>, seed: OrphanSeed) -> LoadStats {
        let kind = E::KIND;
        let seed = if kind.is_managed() {
            seed
        } else {
            OrphanSeed::Untracked
        };
        let mut stats = LoadStats::default();
        let mut state = self.lock();

        for value in objects {
            let object: E = match serde_json::from_value(value) {
                Ok(object) => object,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "skipping undecodable object");
                    stats.skipped += 1;
                    continue;
                }
            };
            let Some(id) = object.id() else {
                tracing::warn!(kind = %kind, "skipping object without id");
                stats.skipped += 1;
                continue;
            };
            let key = match object.natural_key() {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!(kind = %kind, id = %id, error = %e, "skipping object without a usable key");
                    stats.skipped += 1;
                    continue;
                }
            };
            if state.index.contains_key(&key) {
                tracing::warn!(kind = %kind, id = %id, key = %key, "skipping object with duplicate key");
                stats.skipped += 1;
                continue;
            }

            let tracked = match seed {
                OrphanSeed::Untracked => false,
                OrphanSeed::All => true,
                OrphanSeed::Tagged(tag) => object.base().tags.contains(&tag),
            };
            if tracked {
                state.orphans.mark(id, object.clone());
                stats.tracked += 1;
            }
            state.ids.insert(id, key.clone());
            state.index.insert(key, object);
            stats.loaded += 1;
        }

        tracing::debug!(
            kind = %kind,
            loaded = stats.loaded,
            skipped = stats.skipped,
            tracked = stats.tracked,
            "kind loaded"
        );
        stats
    }
}

// ---------------------------------------------------------------------------
// 3. All kinds
// ---------------------------------------------------------------------------

/// Entity types that have a slot in the [`CanonicalStore`].
pub trait Stored: Entity {
    fn slot(store: &CanonicalStore) -> &KindStore<Self>;
}

macro_rules! canonical_store {
    ($($field:ident: $ty:ty),+ $(,)?) => {
        /// One [`KindStore`] per entity kind.
        #[derive(Default)]
        pub struct CanonicalStore {
            $(pub $field: KindStore<$ty>,)+
        }

        impl CanonicalStore {
            pub fn new() -> Self {
                Self::default()
            }

            /// Every kind, in creation order.
            pub fn all(&self) -> Vec<&dyn KindOps> {
                vec![$(&self.$field as &dyn KindOps),+]
            }
        }

        $(
            impl Stored for $ty {
                fn slot(store: &CanonicalStore) -> &KindStore<Self> {
                    &store.$field
                }
            }
        )+
    };
}

canonical_store! {
    tags: Tag,
    custom_fields: CustomField,
    tenant_groups: TenantGroup,
    tenants: Tenant,
    contact_groups: ContactGroup,
    contact_roles: ContactRole,
    contacts: Contact,
    sites: Site,
    manufacturers: Manufacturer,
    platforms: Platform,
    device_roles: DeviceRole,
    device_types: DeviceType,
    cluster_groups: ClusterGroup,
    cluster_types: ClusterType,
    clusters: Cluster,
    devices: Device,
    vlan_groups: VlanGroup,
    vlans: Vlan,
    interfaces: Interface,
    vms: Vm,
    vm_interfaces: VmInterface,
    ip_addresses: IpAddress,
    prefixes: Prefix,
    contact_assignments: ContactAssignment,
}

impl CanonicalStore {
    pub fn ops(&self, kind: EntityKind) -> Option<&dyn KindOps> {
        self.all().into_iter().find(|ops| ops.kind() == kind)
    }

    /// Object counts per kind.
    pub fn counts(&self) -> BTreeMap<EntityKind, usize> {
        self.all()
            .into_iter()
            .map(|ops| (ops.kind(), ops.len()))
            .collect()
    }
}
