//! The YAML desired-state document.
//!
//! Every section is optional. References to other objects use their natural
//! keys: plain names for most kinds, `{name, site}` for devices and
//! `{group, vid}` for VLANs. Missing key fields are not a parse error; they
//! are rejected per entry when the entry is submitted.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use ssot_core::objects::{
    Airflow, ClusterStatus, ContactPriority, DeviceStatus, InterfaceMode, IpAddressStatus,
    PrefixStatus, SiteStatus, VlanStatus, VmStatus,
};
use ssot_sync::SourceError;

/// Sections in the order they are submitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Document {
    pub tags: Vec<TagEntry>,
    pub tenant_groups: Vec<NamedEntry>,
    pub tenants: Vec<TenantEntry>,
    pub contact_groups: Vec<ContactGroupEntry>,
    pub contact_roles: Vec<NamedEntry>,
    pub contacts: Vec<ContactEntry>,
    pub sites: Vec<SiteEntry>,
    pub manufacturers: Vec<NamedEntry>,
    pub platforms: Vec<PlatformEntry>,
    pub device_roles: Vec<DeviceRoleEntry>,
    pub device_types: Vec<DeviceTypeEntry>,
    pub cluster_groups: Vec<NamedEntry>,
    pub cluster_types: Vec<NamedEntry>,
    pub clusters: Vec<ClusterEntry>,
    pub devices: Vec<DeviceEntry>,
    pub vlan_groups: Vec<VlanGroupEntry>,
    pub vlans: Vec<VlanEntry>,
    pub interfaces: Vec<InterfaceEntry>,
    pub vms: Vec<VmEntry>,
    pub vm_interfaces: Vec<VmInterfaceEntry>,
    pub ip_addresses: Vec<IpAddressEntry>,
    pub prefixes: Vec<PrefixEntry>,
    pub contact_assignments: Vec<ContactAssignmentEntry>,
}

impl Document {
    pub fn parse(path: &Path, text: &str) -> Result<Self, SourceError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| SourceError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Total number of entries across all sections.
    pub fn len(&self) -> usize {
        self.tags.len()
            + self.tenant_groups.len()
            + self.tenants.len()
            + self.contact_groups.len()
            + self.contact_roles.len()
            + self.contacts.len()
            + self.sites.len()
            + self.manufacturers.len()
            + self.platforms.len()
            + self.device_roles.len()
            + self.device_types.len()
            + self.cluster_groups.len()
            + self.cluster_types.len()
            + self.clusters.len()
            + self.devices.len()
            + self.vlan_groups.len()
            + self.vlans.len()
            + self.interfaces.len()
            + self.vms.len()
            + self.vm_interfaces.len()
            + self.ip_addresses.len()
            + self.prefixes.len()
            + self.contact_assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// Fields every entry may carry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Common {
    pub description: String,
    /// Tag names.
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, Value>,
    /// Per-field source overrides, e.g. `{description: cmdb}`.
    pub field_sources: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceRef {
    pub name: String,
    pub site: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VlanRef {
    pub group: String,
    pub vid: u16,
}

/// The interface an IP address is bound to. Give `device` or
/// `virtual_machine`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssignedRef {
    pub device: Option<DeviceRef>,
    pub virtual_machine: Option<String>,
    pub interface: String,
}

/// The object a contact is assigned to. Give exactly one field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssignmentTarget {
    pub site: Option<String>,
    pub tenant: Option<String>,
    pub device: Option<DeviceRef>,
    pub virtual_machine: Option<String>,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagEntry {
    pub name: String,
    pub color: String,
    #[serde(flatten)]
    pub common: Common,
}

/// Kinds that are just a name: tenant groups, contact roles, manufacturers,
/// cluster groups and cluster types.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamedEntry {
    pub name: String,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TenantEntry {
    pub name: String,
    pub group: Option<String>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactGroupEntry {
    pub name: String,
    /// Must appear earlier in the section.
    pub parent: Option<String>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactEntry {
    pub name: String,
    pub title: String,
    pub phone: String,
    pub email: String,
    pub group: Option<String>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteEntry {
    pub name: String,
    pub status: Option<SiteStatus>,
    pub tenant: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformEntry {
    pub name: String,
    pub manufacturer: Option<String>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceRoleEntry {
    pub name: String,
    pub color: String,
    pub vm_role: Option<bool>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceTypeEntry {
    pub model: String,
    pub manufacturer: Option<String>,
    pub part_number: String,
    pub u_height: Option<f64>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: Option<String>,
    pub group: Option<String>,
    pub site: Option<String>,
    pub tenant: Option<String>,
    pub status: Option<ClusterStatus>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceEntry {
    pub name: String,
    pub site: Option<String>,
    pub role: Option<String>,
    pub device_type: Option<String>,
    pub platform: Option<String>,
    pub tenant: Option<String>,
    pub cluster: Option<String>,
    pub status: Option<DeviceStatus>,
    pub airflow: Option<Airflow>,
    pub serial: String,
    pub asset_tag: Option<String>,
    pub comments: String,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VlanGroupEntry {
    pub name: String,
    pub min_vid: Option<u16>,
    pub max_vid: Option<u16>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VlanEntry {
    pub group: Option<String>,
    pub vid: Option<u16>,
    pub name: String,
    pub status: Option<VlanStatus>,
    pub tenant: Option<String>,
    pub site: Option<String>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterfaceEntry {
    pub device: Option<DeviceRef>,
    pub name: String,
    #[serde(rename = "type")]
    pub interface_type: Option<String>,
    pub enabled: Option<bool>,
    pub mtu: Option<u32>,
    pub speed: Option<u64>,
    pub mac_address: Option<String>,
    /// Name of another interface on the same device, listed earlier.
    pub parent: Option<String>,
    pub mode: Option<InterfaceMode>,
    pub untagged_vlan: Option<VlanRef>,
    pub tagged_vlans: Vec<VlanRef>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VmEntry {
    pub name: String,
    pub status: Option<VmStatus>,
    pub site: Option<String>,
    pub cluster: Option<String>,
    /// Physical host.
    pub device: Option<DeviceRef>,
    pub role: Option<String>,
    pub tenant: Option<String>,
    pub platform: Option<String>,
    /// Addresses from `ip_addresses`; set after those are submitted.
    pub primary_ip4: Option<String>,
    pub primary_ip6: Option<String>,
    pub vcpus: Option<f64>,
    pub memory: Option<u64>,
    pub disk: Option<u64>,
    pub comments: String,
    #[serde(flatten)]
    pub common: Common,
}

impl VmEntry {
    pub fn has_primary_ip(&self) -> bool {
        self.primary_ip4.is_some() || self.primary_ip6.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VmInterfaceEntry {
    pub virtual_machine: Option<String>,
    pub name: String,
    pub enabled: Option<bool>,
    pub mtu: Option<u32>,
    pub mac_address: Option<String>,
    pub parent: Option<String>,
    pub mode: Option<InterfaceMode>,
    pub untagged_vlan: Option<VlanRef>,
    pub tagged_vlans: Vec<VlanRef>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpAddressEntry {
    pub address: String,
    pub status: Option<IpAddressStatus>,
    pub dns_name: String,
    pub tenant: Option<String>,
    pub assigned: Option<AssignedRef>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PrefixEntry {
    pub prefix: String,
    pub status: Option<PrefixStatus>,
    pub site: Option<String>,
    pub tenant: Option<String>,
    pub vlan: Option<VlanRef>,
    #[serde(flatten)]
    pub common: Common,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactAssignmentEntry {
    #[serde(flatten)]
    pub target: AssignmentTarget,
    pub contact: Option<String>,
    pub role: Option<String>,
    pub priority: Option<ContactPriority>,
    #[serde(flatten)]
    pub common: Common,
}
