//! Type-instance references.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::manifest::ManifestRef;

/// Identifier of a Type-instance in the Type-instance repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeInstanceId(String);

impl TypeInstanceId {
    /// Wrap a repository identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeInstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// A Type-instance handed to an action as input, bound to a local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputTypeInstance {
    /// Name under which the instance is visible to the workflow.
    pub name: String,
    /// Repository identifier.
    pub id: TypeInstanceId,
}

impl InputTypeInstance {
    /// Bind `id` to `name`.
    pub fn new(name: impl Into<String>, id: impl Into<TypeInstanceId>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// A Type-instance produced by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputTypeInstance {
    /// Output name, as declared by the producing step.
    pub name: String,
    /// Type of the produced instance.
    pub type_ref: ManifestRef,
    /// Repository identifier assigned on upload.
    pub id: TypeInstanceId,
}

/// A materialized Type-instance as stored in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeInstance {
    /// Repository identifier.
    pub id: TypeInstanceId,
    /// Type of the instance.
    pub type_ref: ManifestRef,
    /// Current value.
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn type_instance_id_is_transparent_in_json() {
        let binding = InputTypeInstance::new("db", "abc");
        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "db", "id": "abc" }));
    }

    #[test]
    fn output_type_instance_uses_camel_case() {
        let out = OutputTypeInstance {
            name: "config".into(),
            type_ref: ManifestRef::new("cap.type.config"),
            id: TypeInstanceId::new("t-1"),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["typeRef"]["path"], "cap.type.config");
    }
}
