//! The [`Entity`] trait every reconciled object kind implements.

use std::fmt::Debug;

use ipnetwork::IpNetwork;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::KeyError;
use crate::types::{BaseRecord, EntityKind, NaturalKey, ObjectId};

/// An object kind the engine can mirror, diff, create, patch and delete.
///
/// The JSON form produced by `Serialize` is what the engine diffs and sends;
/// reference fields serialize as bare ids.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: EntityKind;

    fn base(&self) -> &BaseRecord;

    fn base_mut(&mut self) -> &mut BaseRecord;

    /// Derive the natural key from the object's own fields.
    fn natural_key(&self) -> Result<NaturalKey, KeyError>;

    fn id(&self) -> Option<ObjectId> {
        self.base().id
    }

    /// Rewrite key fields into the form the backend echoes, so a desired
    /// object diffs equal to its stored copy. Runs before the key is taken.
    fn normalize(&mut self) {}
}

// ---------------------------------------------------------------------------
// Key-field helpers
// ---------------------------------------------------------------------------

pub(crate) fn required_str<'a>(
    kind: EntityKind,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, KeyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(KeyError::Missing { kind, field });
    }
    Ok(trimmed)
}

pub(crate) fn required_ref(
    kind: EntityKind,
    field: &'static str,
    value: Option<ObjectId>,
) -> Result<ObjectId, KeyError> {
    value.ok_or(KeyError::Missing { kind, field })
}

pub(crate) fn name_key(
    kind: EntityKind,
    field: &'static str,
    value: &str,
) -> Result<NaturalKey, KeyError> {
    required_str(kind, field, value).map(NaturalKey::name)
}

/// An interface address such as `10.0.0.5/24`; host bits may be set.
pub(crate) fn address_key(
    kind: EntityKind,
    field: &'static str,
    value: &str,
) -> Result<NaturalKey, KeyError> {
    let net = parse_cidr(kind, field, value)?;
    Ok(NaturalKey::name(cidr_string(&net)))
}

/// A network prefix such as `10.0.0.0/24`; host bits must be clear.
pub(crate) fn prefix_key(
    kind: EntityKind,
    field: &'static str,
    value: &str,
) -> Result<NaturalKey, KeyError> {
    let net = parse_cidr(kind, field, value)?;
    if net.network() != net.ip() {
        return Err(KeyError::Malformed {
            kind,
            field,
            value: value.trim().to_string(),
            reason: format!("host bits set; network is {}/{}", net.network(), net.prefix()),
        });
    }
    Ok(NaturalKey::name(cidr_string(&net)))
}

fn parse_cidr(kind: EntityKind, field: &'static str, value: &str) -> Result<IpNetwork, KeyError> {
    let raw = required_str(kind, field, value)?;
    raw.parse::<IpNetwork>().map_err(|e| KeyError::Malformed {
        kind,
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn cidr_string(net: &IpNetwork) -> String {
    format!("{}/{}", net.ip(), net.prefix())
}

/// The canonical `addr/len` spelling of `value`, or `None` if it does not
/// parse. IPv6 comes out lower-case and compressed.
pub fn canonical_cidr(value: &str) -> Option<String> {
    value.trim().parse::<IpNetwork>().ok().map(|net| cidr_string(&net))
}
