//! [`FileSource`]: submits a [`Document`] through the reconciler.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use ssot_core::objects::*;
use ssot_core::slug::slugify;
use ssot_core::{BaseRecord, Entity, EntityKind, NaturalKey, ObjectId, SourceConfig, SourceKind, SourceName};
use ssot_sync::error::io_err;
use ssot_sync::{Origin, Reconciler, RunError, Source, SourceError, Stored};

use crate::document::*;

/// Desired state read from one YAML file on every run.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: SourceName,
    path: PathBuf,
}

impl FileSource {
    pub fn new(name: impl Into<SourceName>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        match &config.kind {
            SourceKind::File { path } => Self::new(config.name.as_str(), path.clone()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Document, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_err(&self.path, e))?;
        Document::parse(&self.path, &text)
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &SourceName {
        &self.name
    }

    async fn sync(&self, reconciler: &Reconciler) -> Result<(), SourceError> {
        let doc = self.load().await?;
        tracing::info!(
            source = %self.name,
            path = %self.path.display(),
            entries = doc.len(),
            "loaded desired state"
        );
        Submitter {
            reconciler,
            source: &self.name,
        }
        .submit_all(&doc)
        .await
    }
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// A reference that names nothing in the store.
#[derive(Debug, Error)]
#[error("unknown {kind} '{reference}'")]
struct Unresolved {
    kind: EntityKind,
    reference: String,
}

struct Submitter<'a> {
    reconciler: &'a Reconciler,
    source: &'a SourceName,
}

impl Submitter<'_> {
    fn id_of<E: Stored>(&self, key: NaturalKey, label: &str) -> Result<ObjectId, Unresolved> {
        self.reconciler
            .lookup::<E>(&key)
            .and_then(|object| object.id())
            .ok_or_else(|| Unresolved {
                kind: E::KIND,
                reference: label.to_string(),
            })
    }

    /// Optional reference by name; empty means none.
    fn named<E: Stored>(&self, name: &Option<String>) -> Result<Option<ObjectId>, Unresolved> {
        match name.as_deref() {
            None | Some("") => Ok(None),
            Some(name) => self.id_of::<E>(NaturalKey::name(name), name).map(Some),
        }
    }

    fn device(&self, reference: &DeviceRef) -> Result<ObjectId, Unresolved> {
        let site = self.id_of::<Site>(NaturalKey::name(&reference.site), &reference.site)?;
        self.id_of::<Device>(
            NaturalKey::scoped(site, &reference.name),
            &format!("{}@{}", reference.name, reference.site),
        )
    }

    fn vlan(&self, reference: &VlanRef) -> Result<ObjectId, Unresolved> {
        let group = self.id_of::<VlanGroup>(NaturalKey::name(&reference.group), &reference.group)?;
        self.id_of::<Vlan>(
            NaturalKey::Vlan {
                group,
                vid: reference.vid,
            },
            &format!("{}@{}", reference.vid, reference.group),
        )
    }

    fn vlans(&self, references: &[VlanRef]) -> Result<Vec<ObjectId>, Unresolved> {
        references.iter().map(|r| self.vlan(r)).collect()
    }

    /// `(content type, id)` of the interface an address is bound to.
    fn assigned(&self, reference: &AssignedRef) -> Result<(String, ObjectId), Unresolved> {
        let (kind, key) = if let Some(vm) = &reference.virtual_machine {
            let vm = self.id_of::<Vm>(NaturalKey::name(vm), vm)?;
            (EntityKind::VmInterface, NaturalKey::scoped(vm, &reference.interface))
        } else if let Some(device) = &reference.device {
            let device = self.device(device)?;
            (EntityKind::Interface, NaturalKey::scoped(device, &reference.interface))
        } else {
            return Err(Unresolved {
                kind: EntityKind::Interface,
                reference: reference.interface.clone(),
            });
        };
        let id = match kind {
            EntityKind::VmInterface => self.id_of::<VmInterface>(key, &reference.interface)?,
            _ => self.id_of::<Interface>(key, &reference.interface)?,
        };
        Ok((kind.descriptor().content_type.to_string(), id))
    }

    fn assignment_target(
        &self,
        target: &AssignmentTarget,
    ) -> Result<Option<(String, ObjectId)>, Unresolved> {
        let resolved = if let Some(id) = self.named::<Site>(&target.site)? {
            (EntityKind::Site, id)
        } else if let Some(id) = self.named::<Tenant>(&target.tenant)? {
            (EntityKind::Tenant, id)
        } else if let Some(device) = &target.device {
            (EntityKind::Device, self.device(device)?)
        } else if let Some(id) = self.named::<Vm>(&target.virtual_machine)? {
            (EntityKind::Vm, id)
        } else {
            return Ok(None);
        };
        let (kind, id) = resolved;
        Ok(Some((kind.descriptor().content_type.to_string(), id)))
    }

    fn ip_address(&self, address: &Option<String>) -> Result<Option<ObjectId>, Unresolved> {
        let Some(address) = address.as_deref().filter(|a| !a.is_empty()) else {
            return Ok(None);
        };
        let probe = IpAddress {
            address: address.to_string(),
            ..IpAddress::default()
        };
        let key = probe.natural_key().map_err(|_| Unresolved {
            kind: EntityKind::IpAddress,
            reference: address.to_string(),
        })?;
        self.id_of::<IpAddress>(key, address).map(Some)
    }

    fn base(&self, common: &Common) -> Result<BaseRecord, Unresolved> {
        let tags = common
            .tags
            .iter()
            .map(|name| self.id_of::<Tag>(NaturalKey::name(name), name))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(BaseRecord {
            id: None,
            tags,
            custom_fields: common.custom_fields.clone(),
            description: common.description.clone(),
        })
    }

    fn origin(&self, common: &Common) -> Origin {
        common
            .field_sources
            .iter()
            .fold(Origin::source(self.source.clone()), |origin, (field, source)| {
                origin.with_field(field.as_str(), source.as_str())
            })
    }

    // ---- submission -----------------------------------------------------

    /// Upsert one entry. Unresolved references and per-object failures are
    /// recorded and skipped; only fatal errors stop the source.
    async fn submit<E: Stored>(
        &self,
        label: &str,
        common: &Common,
        object: Result<E, Unresolved>,
    ) -> Result<(), SourceError> {
        let object = match object {
            Ok(object) => object,
            Err(unresolved) => {
                tracing::warn!(
                    source = %self.source,
                    kind = %E::KIND,
                    object = label,
                    error = %unresolved,
                    "skipping entry"
                );
                self.reconciler.record_error(
                    RunError::new(unresolved.to_string())
                        .kind(E::KIND)
                        .source(self.source.clone())
                        .object(label),
                );
                return Ok(());
            }
        };
        match self.reconciler.upsert(self.origin(common), object).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(_) => Ok(()),
        }
    }

    async fn submit_all(&self, doc: &Document) -> Result<(), SourceError> {
        for e in &doc.tags {
            let tag = self.base(&e.common).map(|base| Tag {
                base,
                color: e.color.clone(),
                ..Tag::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, tag).await?;
        }
        for e in &doc.tenant_groups {
            let group = self.base(&e.common).map(|base| TenantGroup {
                base,
                ..TenantGroup::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, group).await?;
        }
        for e in &doc.tenants {
            self.submit(&e.name, &e.common, self.tenant(e)).await?;
        }
        for e in &doc.contact_groups {
            self.submit(&e.name, &e.common, self.contact_group(e)).await?;
        }
        for e in &doc.contact_roles {
            let role = self.base(&e.common).map(|base| ContactRole {
                base,
                ..ContactRole::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, role).await?;
        }
        for e in &doc.contacts {
            self.submit(&e.name, &e.common, self.contact(e)).await?;
        }
        for e in &doc.sites {
            self.submit(&e.name, &e.common, self.site(e)).await?;
        }
        for e in &doc.manufacturers {
            let manufacturer = self.base(&e.common).map(|base| Manufacturer {
                base,
                ..Manufacturer::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, manufacturer).await?;
        }
        for e in &doc.platforms {
            self.submit(&e.name, &e.common, self.platform(e)).await?;
        }
        for e in &doc.device_roles {
            let role = self.base(&e.common).map(|base| DeviceRole {
                base,
                color: e.color.clone(),
                vm_role: e.vm_role,
                ..DeviceRole::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, role).await?;
        }
        for e in &doc.device_types {
            self.submit(&e.model, &e.common, self.device_type(e)).await?;
        }
        for e in &doc.cluster_groups {
            let group = self.base(&e.common).map(|base| ClusterGroup {
                base,
                ..ClusterGroup::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, group).await?;
        }
        for e in &doc.cluster_types {
            let cluster_type = self.base(&e.common).map(|base| ClusterType {
                base,
                ..ClusterType::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, cluster_type).await?;
        }
        for e in &doc.clusters {
            self.submit(&e.name, &e.common, self.cluster(e)).await?;
        }
        for e in &doc.devices {
            self.submit(&e.name, &e.common, self.device_entry(e)).await?;
        }
        for e in &doc.vlan_groups {
            let group = self.base(&e.common).map(|base| VlanGroup {
                base,
                min_vid: e.min_vid,
                max_vid: e.max_vid,
                ..VlanGroup::new(e.name.as_str())
            });
            self.submit(&e.name, &e.common, group).await?;
        }
        for e in &doc.vlans {
            self.submit(&vlan_label(e), &e.common, self.vlan_entry(e)).await?;
        }
        for e in &doc.interfaces {
            let label = match &e.device {
                Some(device) => format!("{}/{}", device.name, e.name),
                None => e.name.clone(),
            };
            self.submit(&label, &e.common, self.interface(e)).await?;
        }
        for e in &doc.vms {
            self.submit(&e.name, &e.common, self.vm(e, None, None)).await?;
        }
        for e in &doc.vm_interfaces {
            let label = match &e.virtual_machine {
                Some(vm) => format!("{vm}/{}", e.name),
                None => e.name.clone(),
            };
            self.submit(&label, &e.common, self.vm_interface(e)).await?;
        }
        for e in &doc.ip_addresses {
            self.submit(&e.address, &e.common, self.ip_address_entry(e))
                .await?;
        }
        for e in &doc.prefixes {
            self.submit(&e.prefix, &e.common, self.prefix(e)).await?;
        }
        for e in &doc.contact_assignments {
            let label = e.contact.clone().unwrap_or_default();
            self.submit(&label, &e.common, self.contact_assignment(e))
                .await?;
        }
        // Primary addresses can only point at addresses that now exist.
        for e in doc.vms.iter().filter(|e| e.has_primary_ip()) {
            let vm = self.ip_address(&e.primary_ip4).and_then(|ip4| {
                let ip6 = self.ip_address(&e.primary_ip6)?;
                self.vm(e, ip4, ip6)
            });
            self.submit(&e.name, &e.common, vm).await?;
        }
        Ok(())
    }

    // ---- entry conversion -----------------------------------------------

    fn tenant(&self, e: &TenantEntry) -> Result<Tenant, Unresolved> {
        Ok(Tenant {
            base: self.base(&e.common)?,
            group: self.named::<TenantGroup>(&e.group)?,
            ..Tenant::new(e.name.as_str())
        })
    }

    fn contact_group(&self, e: &ContactGroupEntry) -> Result<ContactGroup, Unresolved> {
        Ok(ContactGroup {
            base: self.base(&e.common)?,
            parent: self.named::<ContactGroup>(&e.parent)?,
            ..ContactGroup::new(e.name.as_str())
        })
    }

    fn contact(&self, e: &ContactEntry) -> Result<Contact, Unresolved> {
        Ok(Contact {
            base: self.base(&e.common)?,
            name: e.name.clone(),
            title: e.title.clone(),
            phone: e.phone.clone(),
            email: e.email.clone(),
            group: self.named::<ContactGroup>(&e.group)?,
        })
    }

    fn site(&self, e: &SiteEntry) -> Result<Site, Unresolved> {
        Ok(Site {
            base: self.base(&e.common)?,
            status: e.status,
            tenant: self.named::<Tenant>(&e.tenant)?,
            latitude: e.latitude,
            longitude: e.longitude,
            ..Site::new(e.name.as_str())
        })
    }

    fn platform(&self, e: &PlatformEntry) -> Result<Platform, Unresolved> {
        Ok(Platform {
            base: self.base(&e.common)?,
            manufacturer: self.named::<Manufacturer>(&e.manufacturer)?,
            ..Platform::new(e.name.as_str())
        })
    }

    fn device_type(&self, e: &DeviceTypeEntry) -> Result<DeviceType, Unresolved> {
        Ok(DeviceType {
            base: self.base(&e.common)?,
            model: e.model.clone(),
            slug: slugify(&e.model),
            manufacturer: self.named::<Manufacturer>(&e.manufacturer)?,
            part_number: e.part_number.clone(),
            u_height: e.u_height,
        })
    }

    fn cluster(&self, e: &ClusterEntry) -> Result<Cluster, Unresolved> {
        Ok(Cluster {
            base: self.base(&e.common)?,
            name: e.name.clone(),
            cluster_type: self.named::<ClusterType>(&e.cluster_type)?,
            group: self.named::<ClusterGroup>(&e.group)?,
            site: self.named::<Site>(&e.site)?,
            tenant: self.named::<Tenant>(&e.tenant)?,
            status: e.status,
        })
    }

    fn device_entry(&self, e: &DeviceEntry) -> Result<Device, Unresolved> {
        Ok(Device {
            base: self.base(&e.common)?,
            name: e.name.clone(),
            role: self.named::<DeviceRole>(&e.role)?,
            device_type: self.named::<DeviceType>(&e.device_type)?,
            site: self.named::<Site>(&e.site)?,
            platform: self.named::<Platform>(&e.platform)?,
            tenant: self.named::<Tenant>(&e.tenant)?,
            cluster: self.named::<Cluster>(&e.cluster)?,
            status: e.status,
            airflow: e.airflow,
            serial: e.serial.clone(),
            asset_tag: e.asset_tag.clone(),
            comments: e.comments.clone(),
        })
    }

    fn vlan_entry(&self, e: &VlanEntry) -> Result<Vlan, Unresolved> {
        Ok(Vlan {
            base: self.base(&e.common)?,
            group: self.named::<VlanGroup>(&e.group)?,
            vid: e.vid,
            name: e.name.clone(),
            status: e.status,
            tenant: self.named::<Tenant>(&e.tenant)?,
            site: self.named::<Site>(&e.site)?,
        })
    }

    fn interface(&self, e: &InterfaceEntry) -> Result<Interface, Unresolved> {
        let device = e.device.as_ref().map(|d| self.device(d)).transpose()?;
        let parent = match (device, e.parent.as_deref()) {
            (Some(device), Some(parent)) if !parent.is_empty() => {
                Some(self.id_of::<Interface>(NaturalKey::scoped(device, parent), parent)?)
            }
            _ => None,
        };
        Ok(Interface {
            base: self.base(&e.common)?,
            device,
            name: e.name.clone(),
            interface_type: e.interface_type.clone(),
            enabled: e.enabled,
            mtu: e.mtu,
            speed: e.speed,
            mac_address: e.mac_address.clone(),
            parent,
            mode: e.mode,
            untagged_vlan: e.untagged_vlan.as_ref().map(|v| self.vlan(v)).transpose()?,
            tagged_vlans: self.vlans(&e.tagged_vlans)?,
        })
    }

    fn vm(
        &self,
        e: &VmEntry,
        primary_ip4: Option<ObjectId>,
        primary_ip6: Option<ObjectId>,
    ) -> Result<Vm, Unresolved> {
        Ok(Vm {
            base: self.base(&e.common)?,
            name: e.name.clone(),
            status: e.status,
            site: self.named::<Site>(&e.site)?,
            cluster: self.named::<Cluster>(&e.cluster)?,
            device: e.device.as_ref().map(|d| self.device(d)).transpose()?,
            role: self.named::<DeviceRole>(&e.role)?,
            tenant: self.named::<Tenant>(&e.tenant)?,
            platform: self.named::<Platform>(&e.platform)?,
            primary_ip4,
            primary_ip6,
            vcpus: e.vcpus,
            memory: e.memory,
            disk: e.disk,
            comments: e.comments.clone(),
        })
    }

    fn vm_interface(&self, e: &VmInterfaceEntry) -> Result<VmInterface, Unresolved> {
        let virtual_machine = self.named::<Vm>(&e.virtual_machine)?;
        let parent = match (virtual_machine, e.parent.as_deref()) {
            (Some(vm), Some(parent)) if !parent.is_empty() => {
                Some(self.id_of::<VmInterface>(NaturalKey::scoped(vm, parent), parent)?)
            }
            _ => None,
        };
        Ok(VmInterface {
            base: self.base(&e.common)?,
            virtual_machine,
            name: e.name.clone(),
            enabled: e.enabled,
            mtu: e.mtu,
            mac_address: e.mac_address.clone(),
            parent,
            mode: e.mode,
            untagged_vlan: e.untagged_vlan.as_ref().map(|v| self.vlan(v)).transpose()?,
            tagged_vlans: self.vlans(&e.tagged_vlans)?,
        })
    }

    fn ip_address_entry(&self, e: &IpAddressEntry) -> Result<IpAddress, Unresolved> {
        let (assigned_object_type, assigned_object_id) =
            match e.assigned.as_ref().map(|a| self.assigned(a)).transpose()? {
                Some((content_type, id)) => (Some(content_type), Some(id)),
                None => (None, None),
            };
        Ok(IpAddress {
            base: self.base(&e.common)?,
            address: e.address.clone(),
            status: e.status,
            dns_name: e.dns_name.clone(),
            tenant: self.named::<Tenant>(&e.tenant)?,
            assigned_object_type,
            assigned_object_id,
        })
    }

    fn prefix(&self, e: &PrefixEntry) -> Result<Prefix, Unresolved> {
        Ok(Prefix {
            base: self.base(&e.common)?,
            prefix: e.prefix.clone(),
            status: e.status,
            site: self.named::<Site>(&e.site)?,
            tenant: self.named::<Tenant>(&e.tenant)?,
            vlan: e.vlan.as_ref().map(|v| self.vlan(v)).transpose()?,
        })
    }

    fn contact_assignment(
        &self,
        e: &ContactAssignmentEntry,
    ) -> Result<ContactAssignment, Unresolved> {
        let (content_type, object_id) = match self.assignment_target(&e.target)? {
            Some((content_type, id)) => (content_type, Some(id)),
            None => (String::new(), None),
        };
        Ok(ContactAssignment {
            base: self.base(&e.common)?,
            content_type,
            object_id,
            contact: self.named::<Contact>(&e.contact)?,
            role: self.named::<ContactRole>(&e.role)?,
            priority: e.priority,
        })
    }
}

fn vlan_label(e: &VlanEntry) -> String {
    match (&e.group, e.vid) {
        (Some(group), Some(vid)) => format!("{vid}@{group}"),
        _ => e.name.clone(),
    }
}
