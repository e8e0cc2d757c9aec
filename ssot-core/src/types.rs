//! Shared domain types: identifiers, source names, entity kinds and their
//! descriptors, natural keys, and the base record every object embeds.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Custom field that records which source last wrote a managed object.
pub const SOURCE_FIELD: &str = "ssot_source";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Backend-assigned identifier of a remote record.
///
/// Serializes as a bare integer. Deserializes from an integer or from a nested
/// object carrying an `id` member, which is how the backend echoes references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(u64),
            Nested { id: u64 },
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bare(id) | Repr::Nested { id } => Ok(ObjectId(id)),
        }
    }
}

/// Name of a configured source connector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceName(pub String);

impl SourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Borrow<str> for SourceName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for SourceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Every kind of object the engine reconciles.
///
/// Declaration order is creation order: a kind only references kinds declared
/// before it. Sweeping walks the list in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tag,
    CustomField,
    TenantGroup,
    Tenant,
    ContactGroup,
    ContactRole,
    Contact,
    Site,
    Manufacturer,
    Platform,
    DeviceRole,
    DeviceType,
    ClusterGroup,
    ClusterType,
    Cluster,
    Device,
    VlanGroup,
    Vlan,
    Interface,
    Vm,
    VmInterface,
    IpAddress,
    Prefix,
    ContactAssignment,
}

/// Static facts about one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    pub kind: EntityKind,
    /// Human label used in logs and reports.
    pub label: &'static str,
    /// Collection endpoint on the backend, with leading and trailing slash.
    pub api_path: &'static str,
    /// `app_label.model` string the backend uses for generic relations.
    pub content_type: &'static str,
    /// Managed kinds receive the sentinel tag and the source custom field and
    /// are subject to the orphan sweep.
    pub managed: bool,
}

const fn descriptor(
    kind: EntityKind,
    label: &'static str,
    api_path: &'static str,
    content_type: &'static str,
    managed: bool,
) -> KindDescriptor {
    KindDescriptor {
        kind,
        label,
        api_path,
        content_type,
        managed,
    }
}

impl EntityKind {
    /// All kinds in creation order.
    pub fn all() -> &'static [EntityKind] {
        use EntityKind::*;
        &[
            Tag,
            CustomField,
            TenantGroup,
            Tenant,
            ContactGroup,
            ContactRole,
            Contact,
            Site,
            Manufacturer,
            Platform,
            DeviceRole,
            DeviceType,
            ClusterGroup,
            ClusterType,
            Cluster,
            Device,
            VlanGroup,
            Vlan,
            Interface,
            Vm,
            VmInterface,
            IpAddress,
            Prefix,
            ContactAssignment,
        ]
    }

    pub fn descriptor(self) -> KindDescriptor {
        use EntityKind::*;
        match self {
            Tag => descriptor(self, "tag", "/api/extras/tags/", "extras.tag", false),
            CustomField => descriptor(
                self,
                "custom field",
                "/api/extras/custom-fields/",
                "extras.customfield",
                false,
            ),
            TenantGroup => descriptor(
                self,
                "tenant group",
                "/api/tenancy/tenant-groups/",
                "tenancy.tenantgroup",
                true,
            ),
            Tenant => descriptor(self, "tenant", "/api/tenancy/tenants/", "tenancy.tenant", true),
            ContactGroup => descriptor(
                self,
                "contact group",
                "/api/tenancy/contact-groups/",
                "tenancy.contactgroup",
                true,
            ),
            ContactRole => descriptor(
                self,
                "contact role",
                "/api/tenancy/contact-roles/",
                "tenancy.contactrole",
                true,
            ),
            Contact => descriptor(self, "contact", "/api/tenancy/contacts/", "tenancy.contact", true),
            Site => descriptor(self, "site", "/api/dcim/sites/", "dcim.site", true),
            Manufacturer => descriptor(
                self,
                "manufacturer",
                "/api/dcim/manufacturers/",
                "dcim.manufacturer",
                true,
            ),
            Platform => descriptor(self, "platform", "/api/dcim/platforms/", "dcim.platform", true),
            DeviceRole => descriptor(
                self,
                "device role",
                "/api/dcim/device-roles/",
                "dcim.devicerole",
                true,
            ),
            DeviceType => descriptor(
                self,
                "device type",
                "/api/dcim/device-types/",
                "dcim.devicetype",
                true,
            ),
            ClusterGroup => descriptor(
                self,
                "cluster group",
                "/api/virtualization/cluster-groups/",
                "virtualization.clustergroup",
                true,
            ),
            ClusterType => descriptor(
                self,
                "cluster type",
                "/api/virtualization/cluster-types/",
                "virtualization.clustertype",
                true,
            ),
            Cluster => descriptor(
                self,
                "cluster",
                "/api/virtualization/clusters/",
                "virtualization.cluster",
                true,
            ),
            Device => descriptor(self, "device", "/api/dcim/devices/", "dcim.device", true),
            VlanGroup => descriptor(
                self,
                "vlan group",
                "/api/ipam/vlan-groups/",
                "ipam.vlangroup",
                true,
            ),
            Vlan => descriptor(self, "vlan", "/api/ipam/vlans/", "ipam.vlan", true),
            Interface => descriptor(
                self,
                "interface",
                "/api/dcim/interfaces/",
                "dcim.interface",
                true,
            ),
            Vm => descriptor(
                self,
                "virtual machine",
                "/api/virtualization/virtual-machines/",
                "virtualization.virtualmachine",
                true,
            ),
            VmInterface => descriptor(
                self,
                "vm interface",
                "/api/virtualization/interfaces/",
                "virtualization.vminterface",
                true,
            ),
            IpAddress => descriptor(
                self,
                "ip address",
                "/api/ipam/ip-addresses/",
                "ipam.ipaddress",
                true,
            ),
            Prefix => descriptor(self, "prefix", "/api/ipam/prefixes/", "ipam.prefix", true),
            ContactAssignment => descriptor(
                self,
                "contact assignment",
                "/api/tenancy/contact-assignments/",
                "tenancy.contactassignment",
                true,
            ),
        }
    }

    pub fn label(self) -> &'static str {
        self.descriptor().label
    }

    pub fn is_managed(self) -> bool {
        self.descriptor().managed
    }

    /// Content types of every managed kind, used to scope the source custom field.
    pub fn managed_content_types() -> Vec<String> {
        Self::all()
            .iter()
            .filter(|k| k.is_managed())
            .map(|k| k.descriptor().content_type.to_string())
            .collect()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Natural keys
// ---------------------------------------------------------------------------

/// Identity of an object derivable from its own fields, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NaturalKey {
    /// Name, model, address or prefix string.
    Name(String),
    /// A name unique only within a parent object (site, device, vm).
    Scoped { scope: ObjectId, name: String },
    Vlan { group: ObjectId, vid: u16 },
    Assignment {
        content_type: String,
        object: ObjectId,
        contact: ObjectId,
        role: ObjectId,
    },
}

impl NaturalKey {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn scoped(scope: ObjectId, name: impl Into<String>) -> Self {
        Self::Scoped {
            scope,
            name: name.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Name(name) => f.write_str(name),
            NaturalKey::Scoped { scope, name } => write!(f, "{name}@{scope}"),
            NaturalKey::Vlan { group, vid } => write!(f, "vid {vid}@{group}"),
            NaturalKey::Assignment {
                content_type,
                object,
                contact,
                role,
            } => write!(f, "{content_type}:{object}/contact {contact}/role {role}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Base record
// ---------------------------------------------------------------------------

/// Fields shared by every object kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<ObjectId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl BaseRecord {
    /// Source recorded on the object by a previous write, if any.
    pub fn source(&self) -> Option<&str> {
        self.custom_fields.get(SOURCE_FIELD).and_then(Value::as_str)
    }

    pub fn set_source(&mut self, source: &SourceName) {
        self.custom_fields
            .insert(SOURCE_FIELD.to_string(), Value::String(source.0.clone()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
