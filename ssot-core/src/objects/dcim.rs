//! Sites, hardware catalog (manufacturers, device types, roles, platforms),
//! devices and their interfaces.

use serde::{Deserialize, Serialize};

use crate::entity::{name_key, required_ref, required_str, Entity};
use crate::error::KeyError;
use crate::slug::slugify;
use crate::types::{BaseRecord, EntityKind, NaturalKey, ObjectId};
use crate::wire::choice;

// ---------------------------------------------------------------------------
// Choices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteStatus {
    Planned,
    Staging,
    Active,
    Decommissioning,
    Retired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Offline,
    Active,
    Planned,
    Staged,
    Failed,
    Inventory,
    Decommissioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Airflow {
    FrontToRear,
    RearToFront,
    LeftToRight,
    RightToLeft,
    SideToRear,
    Passive,
    Mixed,
}

/// 802.1Q tagging mode, shared by device and VM interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceMode {
    Access,
    Tagged,
    TaggedAll,
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<SiteStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for Site {
    const KIND: EntityKind = EntityKind::Site;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manufacturer {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
}

impl Manufacturer {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for Manufacturer {
    const KIND: EntityKind = EntityKind::Manufacturer;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<ObjectId>,
}

impl Platform {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for Platform {
    const KIND: EntityKind = EntityKind::Platform;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRole {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_role: Option<bool>,
}

impl DeviceRole {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for DeviceRole {
    const KIND: EntityKind = EntityKind::DeviceRole;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

/// Hardware model. Keyed by `model`, not by manufacturer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub part_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub u_height: Option<f64>,
}

impl DeviceType {
    pub fn new(model: impl Into<String>, manufacturer: ObjectId) -> Self {
        let model = model.into();
        Self {
            slug: slugify(&model),
            model,
            manufacturer: Some(manufacturer),
            ..Self::default()
        }
    }
}

impl Entity for DeviceType {
    const KIND: EntityKind = EntityKind::DeviceType;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "model", &self.model)
    }
}

/// A physical host. Names are unique per site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ObjectId>,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<DeviceStatus>,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub airflow: Option<Airflow>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_tag: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comments: String,
}

impl Entity for Device {
    const KIND: EntityKind = EntityKind::Device;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        let name = required_str(Self::KIND, "name", &self.name)?;
        let site = required_ref(Self::KIND, "site", self.site)?;
        Ok(NaturalKey::scoped(site, name))
    }
}

/// A physical interface on a device. Names are unique per device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub device: Option<ObjectId>,
    pub name: String,
    /// Backend interface type value such as `1000base-t`, `virtual` or `other`.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub interface_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<u64>,
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

impl Entity for Interface {
    const KIND: EntityKind = EntityKind::Interface;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        let device = required_ref(Self::KIND, "device", self.device)?;
        let name = required_str(Self::KIND, "name", &self.name)?;
        Ok(NaturalKey::scoped(device, name))
    }
}
