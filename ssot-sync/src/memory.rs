//! In-process backend for tests and dry experiments.
//!
//! Assigns sequential ids, merges patches the way the real backend does
//! (custom fields merged per key), records every call, and can be told to
//! fail specific operations or to add latency.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use ssot_core::{Entity, EntityKind, ObjectId};

use crate::diff::FieldDiff;
use crate::error::{RemoteError, RemoteOp};
use crate::remote::RemoteClient;

/// One recorded remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub op: RemoteOp,
    pub kind: EntityKind,
    pub id: Option<ObjectId>,
}

struct Failure {
    op: RemoteOp,
    kind: EntityKind,
    id: Option<ObjectId>,
    error: RemoteError,
    /// `None` fails forever.
    remaining: Option<usize>,
}

impl Failure {
    fn matches(&self, op: RemoteOp, kind: EntityKind, id: Option<ObjectId>) -> bool {
        self.op == op
            && self.kind == kind
            && (self.id.is_none() || self.id == id)
            && self.remaining != Some(0)
    }
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    objects: BTreeMap<EntityKind, BTreeMap<ObjectId, Value>>,
    calls: Vec<Call>,
    failures: Vec<Failure>,
}

#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- fixtures -------------------------------------------------------

    /// Store `object` as if it already existed remotely. Not recorded as a call.
    pub fn seed(&self, kind: EntityKind, mut object: Value) -> ObjectId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = ObjectId(state.next_id);
        if let Value::Object(fields) = &mut object {
            fields.insert("id".into(), Value::from(id.0));
        }
        state.objects.entry(kind).or_default().insert(id, object);
        id
    }

    /// [`seed`](Self::seed) from a typed object.
    pub fn seed_entity<E: Entity>(&self, object: &E) -> ObjectId {
        let value = serde_json::to_value(object).unwrap_or(Value::Null);
        self.seed(E::KIND, value)
    }

    /// Fail every matching call with `error`.
    pub fn fail(&self, op: RemoteOp, kind: EntityKind, error: RemoteError) {
        self.push_failure(op, kind, None, error, None);
    }

    /// Fail the next matching call only.
    pub fn fail_once(&self, op: RemoteOp, kind: EntityKind, error: RemoteError) {
        self.push_failure(op, kind, None, error, Some(1));
    }

    /// Fail every call for one object.
    pub fn fail_object(&self, op: RemoteOp, kind: EntityKind, id: ObjectId, error: RemoteError) {
        self.push_failure(op, kind, Some(id), error, None);
    }

    fn push_failure(
        &self,
        op: RemoteOp,
        kind: EntityKind,
        id: Option<ObjectId>,
        error: RemoteError,
        remaining: Option<usize>,
    ) {
        self.lock().failures.push(Failure {
            op,
            kind,
            id,
            error,
            remaining,
        });
    }

    // ---- inspection -----------------------------------------------------

    pub fn get(&self, kind: EntityKind, id: ObjectId) -> Option<Value> {
        self.lock().objects.get(&kind)?.get(&id).cloned()
    }

    /// Objects of `kind` in id order.
    pub fn objects(&self, kind: EntityKind) -> Vec<Value> {
        self.lock()
            .objects
            .get(&kind)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock().objects.get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of recorded `op` calls against `kind`.
    pub fn calls_to(&self, op: RemoteOp, kind: EntityKind) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op && c.kind == kind)
            .count()
    }

    /// Number of recorded calls that write.
    pub fn writes(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op != RemoteOp::List)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    // ---- call plumbing --------------------------------------------------

    /// Record the call and return the injected failure, if any.
    async fn enter(
        &self,
        op: RemoteOp,
        kind: EntityKind,
        id: Option<ObjectId>,
    ) -> Result<(), RemoteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut state = self.lock();
        state.calls.push(Call { op, kind, id });
        let failure = state
            .failures
            .iter_mut()
            .find(|f| f.matches(op, kind, id));
        match failure {
            Some(failure) => {
                if let Some(remaining) = failure.remaining.as_mut() {
                    *remaining -= 1;
                }
                Err(failure.error.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn list(&self, kind: EntityKind) -> Result<Vec<Value>, RemoteError> {
        self.enter(RemoteOp::List, kind, None).await?;
        Ok(self.objects(kind))
    }

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<Value, RemoteError> {
        self.enter(RemoteOp::Create, kind, None).await?;
        if !body.is_object() {
            return Err(RemoteError::Status {
                status: 400,
                body: "expected a JSON object".into(),
            });
        }
        let id = self.seed(kind, body.clone());
        self.get(kind, id)
            .ok_or(RemoteError::NotFound { kind, id })
    }

    async fn patch(
        &self,
        kind: EntityKind,
        id: ObjectId,
        diff: &FieldDiff,
    ) -> Result<Value, RemoteError> {
        self.enter(RemoteOp::Patch, kind, Some(id)).await?;
        let mut state = self.lock();
        let object = state
            .objects
            .get_mut(&kind)
            .and_then(|objects| objects.get_mut(&id))
            .ok_or(RemoteError::NotFound { kind, id })?;
        let Value::Object(fields) = &mut *object else {
            return Err(RemoteError::Decode(format!("{kind} {id} is not an object")));
        };
        for (field, value) in diff {
            if field == "id" {
                continue;
            }
            if field == "custom_fields" {
                if let (Value::Object(incoming), Some(Value::Object(current))) =
                    (value, fields.get_mut(field))
                {
                    for (name, v) in incoming {
                        current.insert(name.clone(), v.clone());
                    }
                    continue;
                }
            }
            fields.insert(field.clone(), value.clone());
        }
        Ok(object.clone())
    }

    async fn delete(&self, kind: EntityKind, id: ObjectId) -> Result<(), RemoteError> {
        self.enter(RemoteOp::Delete, kind, Some(id)).await?;
        self.lock()
            .objects
            .get_mut(&kind)
            .and_then(|objects| objects.remove(&id))
            .map(|_| ())
            .ok_or(RemoteError::NotFound { kind, id })
    }
}
