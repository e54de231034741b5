// Typed views over the REST API's JSON payloads. Missing members default
// instead of failing the parse.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiVersion {
    pub version: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Describe result for one object type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<Field>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub child_relationships: Vec<ChildRelationship>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reference_to: Vec<String>,
    #[serde(default)]
    pub name_field: bool,
    #[serde(default)]
    pub deprecated_and_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildRelationship {
    #[serde(rename = "childSObject", default)]
    pub child_sobject: Option<String>,
    /// Foreign key field on the child pointing back at the parent
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub relationship_name: Option<String>,
    #[serde(default)]
    pub deprecated_and_hidden: bool,
}

/// Declared targets of a reference field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    Single(String),
    Polymorphic(Vec<String>),
}

impl ReferenceTarget {
    /// Pick the object type to follow: a single target only if accepted,
    /// otherwise the first accepted target in declared order
    pub fn resolve<F>(&self, accept: F) -> Option<&str>
    where
        F: Fn(&str) -> bool,
    {
        match self {
            ReferenceTarget::Single(name) => accept(name.as_str()).then_some(name.as_str()),
            ReferenceTarget::Polymorphic(names) => {
                names.iter().map(String::as_str).find(|n| accept(*n))
            }
        }
    }
}

impl Field {
    pub fn is_reference(&self) -> bool {
        self.field_type == "reference"
    }

    pub fn targets(&self) -> Option<ReferenceTarget> {
        match self.reference_to.as_slice() {
            [] => None,
            [single] => Some(ReferenceTarget::Single(single.clone())),
            many => Some(ReferenceTarget::Polymorphic(many.to_vec())),
        }
    }

    /// Label shown on edges discovered through this field
    pub fn relation_label(&self) -> String {
        match self.label {
            Some(ref label) if !label.is_empty() => label.clone(),
            _ => self.name.clone(),
        }
    }
}

impl ChildRelationship {
    pub fn relation_label(&self) -> Option<String> {
        self.relationship_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.field.clone())
    }
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn name_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.name_field && !f.name.is_empty())
    }
}

/// One row of a query result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Scalar value as text; null, objects and arrays yield `None`
    pub fn get_text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<String> {
        self.get_text("Id")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub done: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub records: Vec<Record>,
    #[serde(default)]
    pub next_records_url: Option<String>,
}

/// Entry of the global describe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SObjectSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub queryable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalDescribe {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sobjects: Vec<SObjectSummary>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
