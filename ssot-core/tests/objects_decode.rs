//! Decoding backend payloads into typed objects, and the natural keys
//! derived from them.

use rstest::rstest;
use serde_json::{json, Value};
use ssot_core::objects::*;
use ssot_core::{Entity, EntityKind, KeyError, NaturalKey, ObjectId};

fn decode<E: Entity>(value: Value) -> E {
    serde_json::from_value(value).expect("decode")
}

#[test]
fn site_payload_with_choice_and_tenant() {
    let site: Site = decode(json!({
        "id": 1,
        "url": "https://netbox/api/dcim/sites/1/",
        "display": "NYC",
        "name": "NYC",
        "slug": "nyc",
        "status": {"value": "active", "label": "Active"},
        "tenant": {"id": 4, "name": "Acme"},
        "tags": [],
        "custom_fields": {"ssot_source": null},
        "created": "2024-01-01T00:00:00Z",
    }));
    assert_eq!(site.id(), Some(ObjectId(1)));
    assert_eq!(site.status, Some(SiteStatus::Active));
    assert_eq!(site.tenant, Some(ObjectId(4)));
    assert_eq!(site.base.source(), None);
    assert_eq!(site.natural_key().expect("key"), NaturalKey::name("NYC"));
}

#[test]
fn ip_address_with_assigned_interface() {
    let ip: IpAddress = decode(json!({
        "id": 9,
        "address": "10.0.0.5/24",
        "status": "active",
        "assigned_object_type": "virtualization.vminterface",
        "assigned_object_id": 12,
        "dns_name": "web-01.example.com",
    }));
    assert_eq!(ip.assigned_object_id, Some(ObjectId(12)));
    assert_eq!(ip.status, Some(IpAddressStatus::Active));
    assert_eq!(ip.natural_key().expect("key"), NaturalKey::name("10.0.0.5/24"));
}

#[test]
fn vlan_payload_keys_on_group_and_vid() {
    let vlan: Vlan = decode(json!({
        "id": 3,
        "group": {"id": 2, "name": "dc1"},
        "vid": 120,
        "name": "backup",
        "status": {"value": "reserved", "label": "Reserved"},
    }));
    assert_eq!(vlan.status, Some(VlanStatus::Reserved));
    assert_eq!(
        vlan.natural_key().expect("key"),
        NaturalKey::Vlan {
            group: ObjectId(2),
            vid: 120
        }
    );
}

#[test]
fn serialized_form_omits_unset_fields() {
    let platform = Platform::new("VMware ESXi");
    assert_eq!(
        serde_json::to_value(&platform).expect("serialize"),
        json!({"name": "VMware ESXi", "slug": "vmware-esxi"})
    );
}

#[rstest]
#[case::empty_site_name(
    serde_json::to_value(Site::default()).unwrap(),
    EntityKind::Site,
    "name"
)]
#[case::blank_tenant_name(json!({"name": "   "}), EntityKind::Tenant, "name")]
#[case::device_type_without_model(json!({"model": ""}), EntityKind::DeviceType, "model")]
#[case::interface_without_device(json!({"name": "eth0"}), EntityKind::Interface, "device")]
fn missing_key_fields(#[case] payload: Value, #[case] kind: EntityKind, #[case] field: &str) {
    let err = match kind {
        EntityKind::Site => decode::<Site>(payload).natural_key(),
        EntityKind::Tenant => decode::<Tenant>(payload).natural_key(),
        EntityKind::DeviceType => decode::<DeviceType>(payload).natural_key(),
        EntityKind::Interface => decode::<Interface>(payload).natural_key(),
        other => panic!("unexpected kind {other}"),
    }
    .unwrap_err();
    match err {
        KeyError::Missing { kind: k, field: f } => {
            assert_eq!(k, kind);
            assert_eq!(f, field);
        }
        other => panic!("expected Missing, got {other}"),
    }
}

#[test]
fn malformed_prefix_reports_value() {
    let prefix = Prefix {
        prefix: "10.1.1.1/16".into(),
        ..Prefix::default()
    };
    let err = prefix.natural_key().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("10.1.1.1/16"), "got: {msg}");
    assert!(msg.contains("10.1.0.0/16"), "got: {msg}");
}

#[test]
fn every_kind_has_a_distinct_api_path() {
    let mut paths: Vec<&str> = EntityKind::all()
        .iter()
        .map(|k| k.descriptor().api_path)
        .collect();
    paths.sort_unstable();
    paths.dedup();
    assert_eq!(paths.len(), EntityKind::all().len());
    assert!(paths.iter().all(|p| p.starts_with("/api/") && p.ends_with('/')));
}
