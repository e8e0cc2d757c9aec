//! Tags and custom fields. Neither kind is managed: they are never tagged and
//! never swept.

use serde::{Deserialize, Serialize};

use crate::entity::{name_key, Entity};
use crate::error::KeyError;
use crate::slug::slugify;
use crate::types::{BaseRecord, EntityKind, NaturalKey};
use crate::wire::choice;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub slug: String,
    /// Hex RGB without the leading `#`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            ..Self::default()
        }
    }
}

impl Entity for Tag {
    const KIND: EntityKind = EntityKind::Tag;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldType {
    Text,
    Longtext,
    Integer,
    Decimal,
    Boolean,
    Date,
    Url,
    Json,
    Select,
    Multiselect,
    Object,
    Multiobject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "choice",
        skip_serializing_if = "Option::is_none"
    )]
    pub field_type: Option<CustomFieldType>,
    /// `app_label.model` strings of the kinds the field applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl Entity for CustomField {
    const KIND: EntityKind = EntityKind::CustomField;
    base_accessors!();

    fn natural_key(&self) -> Result<NaturalKey, KeyError> {
        name_key(Self::KIND, "name", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_new_fills_slug() {
        let tag = Tag::new("Managed By SSOT");
        assert_eq!(tag.slug, "managed-by-ssot");
        assert_eq!(tag.natural_key().unwrap(), NaturalKey::name("Managed By SSOT"));
    }

    #[test]
    fn custom_field_type_decodes_from_choice_object() {
        let cf: CustomField = serde_json::from_value(json!({
            "id": 4,
            "name": "ssot_source",
            "type": {"value": "text", "label": "Text"},
            "content_types": ["dcim.device"],
        }))
        .unwrap();
        assert_eq!(cf.field_type, Some(CustomFieldType::Text));
        assert_eq!(serde_json::to_value(&cf).unwrap()["type"], json!("text"));
    }
}
