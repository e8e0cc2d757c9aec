//! Tenants, contacts and contact assignments.

use serde::{Deserialize, Serialize};

use crate::entity::{name_key, required_ref, required_str, Entity};
use crate::error::KeyError;
use crate::slug::slugify;
use crate::types::{BaseRecord, EntityKind, NaturalKey, ObjectId};
use crate::wire::choice;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantGroup {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
}

impl TenantGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for TenantGroup {
    const KIND: EntityKind = EntityKind::TenantGroup;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ObjectId>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for Tenant {
    const KIND: EntityKind = EntityKind::Tenant;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactGroup {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ObjectId>,
}

impl ContactGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for ContactGroup {
    const KIND: EntityKind = EntityKind::ContactGroup;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRole {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
}

impl ContactRole {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for ContactRole {
    const KIND: EntityKind = EntityKind::ContactRole;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<ObjectId>,
}

impl Entity for Contact {
    const KIND: EntityKind = EntityKind::Contact;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactPriority {
    Primary,
    Secondary,
    Tertiary,
    Inactive,
}

/// Links a contact, in a role, to an arbitrary object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactAssignment {
    #[serde(flatten)]
    pub base: BaseRecord,
    /// `app_label.model` of the assigned object, e.g. `virtualization.virtualmachine`.
    pub content_type: String,
    pub object_id: Option<ObjectId>,
    pub contact: Option<ObjectId>,
    pub role: Option<ObjectId>,
    #[serde(
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<ContactPriority>,
}

impl Entity for ContactAssignment {
    const KIND: EntityKind = EntityKind::ContactAssignment;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        let content_type = required_str(Self::KIND, "content_type", &self.content_type)?;
        Ok(NaturalKey::Assignment {
            content_type: content_type.to_string(),
            object: required_ref(Self::KIND, "object_id", self.object_id)?,
            contact: required_ref(Self::KIND, "contact", self.contact)?,
            role: required_ref(Self::KIND, "role", self.role)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contact_assignment_key_is_the_four_tuple() {
        let ca = ContactAssignment {
            content_type: "virtualization.virtualmachine".into(),
            object_id: Some(ObjectId(10)),
            contact: Some(ObjectId(2)),
            role: Some(ObjectId(3)),
            ..ContactAssignment::default()
        };
        assert_eq!(
            ca.natural_key().unwrap(),
            NaturalKey::Assignment {
                content_type: "virtualization.virtualmachine".into(),
                object: ObjectId(10),
                contact: ObjectId(2),
                role: ObjectId(3),
            }
        );
    }

    #[test]
    fn contact_assignment_without_role_is_rejected() {
        let ca = ContactAssignment {
            content_type: "dcim.device".into(),
            object_id: Some(ObjectId(1)),
            contact: Some(ObjectId(2)),
            ..ContactAssignment::default()
        };
        assert_eq!(
            ca.natural_key().unwrap_err(),
            KeyError::Missing {
                kind: EntityKind::ContactAssignment,
                field: "role"
            }
        );
    }

    #[test]
    fn contact_assignment_decodes_nested_references() {
        let ca: ContactAssignment = serde_json::from_value(json!({
            "id": 77,
            "content_type": "dcim.device",
            "object_id": 5,
            "contact": {"id": 2, "name": "Jane"},
            "role": {"id": 3, "name": "Owner"},
            "priority": {"value": "primary", "label": "Primary"},
        }))
        .unwrap();
        assert_eq!(ca.id(), Some(ObjectId(77)));
        assert_eq!(ca.contact, Some(ObjectId(2)));
        assert_eq!(ca.priority, Some(ContactPriority::Primary));
    }
}
