//! VLANs, IP addresses and prefixes.

use serde::{Deserialize, Serialize};

use crate::entity::{address_key, canonical_cidr, name_key, prefix_key, required_ref, Entity};
use crate::error::KeyError;
use crate::slug::slugify;
use crate::types::{BaseRecord, EntityKind, NaturalKey, ObjectId};
use crate::wire::choice;

/// Lowest and highest usable 802.1Q VLAN id.
pub const VID_RANGE: std::ops::RangeInclusive<u16> = 1..=4094;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlanStatus {
    Active,
    Reserved,
    Deprecated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpAddressStatus {
    Active,
    Reserved,
    Deprecated,
    Dhcp,
    Slaac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixStatus {
    Container,
    Active,
    Reserved,
    Deprecated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VlanGroup {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_vid: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_vid: Option<u16>,
}

impl VlanGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for VlanGroup {
    const KIND: EntityKind = EntityKind::VlanGroup;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

/// A VLAN, unique by `(group, vid)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vlan {
    #[serde(flatten)]
    pub base: BaseRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ObjectId>,
    pub vid: Option<u16>,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<VlanStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<ObjectId>,
}

impl Entity for Vlan {
    const KIND: EntityKind = EntityKind::Vlan;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        let group = required_ref(Self::KIND, "group", self.group)?;
        let vid = self.vid.ok_or(KeyError::Missing {
            kind: Self::KIND,
            field: "vid",
        })?;
        if !VID_RANGE.contains(&vid) {
            return Err(KeyError::Malformed {
                kind: Self::KIND,
                field: "vid",
                value: vid.to_string(),
                reason: format!(
                    "outside {}..={}",
                    VID_RANGE.start(),
                    VID_RANGE.end()
                ),
            });
        }
        Ok(NaturalKey::Vlan { group, vid })
    }
}

/// An interface address in CIDR form (`10.0.0.5/24`), optionally assigned to
/// a device or VM interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpAddress {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub address: String,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<IpAddressStatus>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dns_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    /// `dcim.interface` or `virtualization.vminterface`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_object_id: Option<ObjectId>,
}

impl Entity for IpAddress {
    const KIND: EntityKind = EntityKind::IpAddress;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        address_key(Self::KIND, "address", &self.address)
    }

    fn normalize(&mut self) {
        if let Some(address) = canonical_cidr(&self.address) {
            self.address = address;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prefix {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub prefix: String,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<PrefixStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<ObjectId>,
}

impl Entity for Prefix {
    const KIND: EntityKind = EntityKind::Prefix;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        prefix_key(Self::KIND, "prefix", &self.prefix)
    }

    fn normalize(&mut self) {
        if let Some(prefix) = canonical_cidr(&self.prefix) {
            self.prefix = prefix;
        }
    }
}
