//! Typed objects for every entity kind, grouped the way the backend groups
//! its API: extras, tenancy, dcim, virtualization and ipam.

macro_rules! base_accessors {
    () => {
        fn base(&self) -> &$crate::types::BaseRecord {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::types::BaseRecord {
            &mut self.base
        }
    };
}

pub mod dcim;
pub mod extras;
pub mod ipam;
pub mod tenancy;
pub mod virtualization;

pub use dcim::{
    Airflow, Device, DeviceRole, DeviceStatus, DeviceType, Interface, InterfaceMode, Manufacturer,
    Platform, Site, SiteStatus,
};
pub use extras::{CustomField, CustomFieldType, Tag};
pub use ipam::{IpAddress, IpAddressStatus, Prefix, PrefixStatus, Vlan, VlanGroup, VlanStatus};
pub use tenancy::{
    Contact, ContactAssignment, ContactGroup, ContactPriority, ContactRole, Tenant, TenantGroup,
};
pub use virtualization::{Cluster, ClusterGroup, ClusterStatus, ClusterType, Vm, VmInterface, VmStatus};
