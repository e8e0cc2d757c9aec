//! Clusters, virtual machines and their interfaces.

use serde::{Deserialize, Serialize};

use crate::entity::{name_key, required_ref, required_str, Entity};
use crate::error::KeyError;
use crate::objects::dcim::InterfaceMode;
use crate::slug::slugify;
use crate::types::{BaseRecord, EntityKind, NaturalKey, ObjectId};
use crate::wire::{choice, lenient_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Planned,
    Staging,
    Active,
    Decommissioning,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Offline,
    Active,
    Planned,
    Staged,
    Failed,
    Decommissioning,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterGroup {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
}

impl ClusterGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for ClusterGroup {
    const KIND: EntityKind = EntityKind::ClusterGroup;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterType {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
}

impl ClusterType {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for ClusterType {
    const KIND: EntityKind = EntityKind::ClusterType;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub cluster_type: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<ClusterStatus>,
}

impl Entity for Cluster {
    const KIND: EntityKind = EntityKind::Cluster;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

/// A virtual machine. `device` is the physical host, when known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<VmStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_ip4: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_ip6: Option<ObjectId>,
    #[serde(
        default,
        deserialize_with = "lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub vcpus: Option<f64>,
    /// MB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    /// GB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
}

impl Entity for Vm {
    const KIND: EntityKind = EntityKind::Vm;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmInterface {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub virtual_machine: Option<ObjectId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectId>,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub mode: Option<InterfaceMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untagged_vlan: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tagged_vlans: Vec<ObjectId>,
}

impl Entity for VmInterface {
    const KIND: EntityKind = EntityKind::VmInterface;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        let vm = required_ref(Self::KIND, "virtual_machine", self.virtual_machine)?;
        let name = required_str(Self::KIND, "name", &self.name)?;
        Ok(NaturalKey::scoped(vm, name))
    }
}
