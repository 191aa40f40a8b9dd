//! Typed references between tasks
//!
//! A task that needs another resource to exist first holds a [`TaskRef`] to
//! it as an ordinary field. A reference serializes to a single-entry map
//! `{"$task": "Kind/name"}`; the dependency resolver walks each task's
//! serialized fields and turns every such marker into an edge.

use crate::task::{TaskKey, TaskKind};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Map key marking a serialized task reference
pub const REF_MARKER: &str = "$task";

/// Reference to a task of kind `T`
pub struct TaskRef<T> {
    name: String,
    _kind: PhantomData<fn() -> T>,
}

impl<T: TaskKind> TaskRef<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _kind: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(T::KIND, &self.name)
    }
}

impl<T> Clone for TaskRef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T> PartialEq for TaskRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for TaskRef<T> {}

impl<T> Hash for TaskRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<T: TaskKind> fmt::Debug for TaskRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskRef({})", self.key())
    }
}

impl<T: TaskKind> fmt::Display for TaskRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl<T: TaskKind> Serialize for TaskRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(REF_MARKER, &self.key().to_string())?;
        map.end()
    }
}

/// Accepted input forms: a bare name (manifests) or the serialized marker
#[derive(Deserialize)]
#[serde(untagged)]
enum RefRepr {
    Name(String),
    Marker {
        #[serde(rename = "$task")]
        key: String,
    },
}

impl<'de, T: TaskKind> Deserialize<'de> for TaskRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RefRepr::deserialize(deserializer)? {
            RefRepr::Name(name) => Ok(TaskRef::new(name)),
            RefRepr::Marker { key } => {
                let key: TaskKey = key.parse().map_err(D::Error::custom)?;
                if key.kind() != T::KIND {
                    return Err(D::Error::custom(format!(
                        "expected a reference to {}, found {}",
                        T::KIND,
                        key
                    )));
                }
                Ok(TaskRef::new(key.name()))
            }
        }
    }
}

/// Returns the key if `value` is a serialized task reference
pub fn as_reference(value: &Value) -> Option<TaskKey> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(REF_MARKER)?.as_str()?.parse().ok()
}

/// Collects every task reference held anywhere in `value`, in field order,
/// without duplicates.
pub fn collect_references(value: &Value) -> Vec<TaskKey> {
    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

fn walk(value: &Value, found: &mut Vec<TaskKey>) {
    if let Some(key) = as_reference(value) {
        if !found.contains(&key) {
            found.push(key);
        }
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| walk(v, found)),
        Value::Object(map) => map.values().for_each(|v| walk(v, found)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Network;
    impl TaskKind for Network {
        const KIND: &'static str = "Network";
    }

    struct Subnet;
    impl TaskKind for Subnet {
        const KIND: &'static str = "Subnet";
    }

    #[derive(Serialize, Deserialize)]
    struct Holder {
        network: TaskRef<Network>,
        subnets: Vec<TaskRef<Subnet>>,
        by_zone: BTreeMap<String, TaskRef<Subnet>>,
        optional: Option<TaskRef<Network>>,
    }

    #[test]
    fn test_reference_serializes_to_marker() {
        let r: TaskRef<Network> = TaskRef::new("main");
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            json!({"$task": "Network/main"})
        );
    }

    #[test]
    fn test_reference_accepts_bare_name() {
        let r: TaskRef<Network> = serde_json::from_value(json!("main")).unwrap();
        assert_eq!(r.key(), TaskKey::new("Network", "main"));
    }

    #[test]
    fn test_reference_rejects_wrong_kind() {
        let result: Result<TaskRef<Network>, _> =
            serde_json::from_value(json!({"$task": "Subnet/a"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_walks_sequences_maps_and_options() {
        let holder = Holder {
            network: TaskRef::new("main"),
            subnets: vec![TaskRef::new("a"), TaskRef::new("b")],
            by_zone: [("zone-1".to_string(), TaskRef::new("a"))]
                .into_iter()
                .collect(),
            optional: Some(TaskRef::new("edge")),
        };
        let value = serde_json::to_value(&holder).unwrap();
        let refs = collect_references(&value);

        assert_eq!(refs.len(), 4);
        assert!(refs.contains(&TaskKey::new("Network", "main")));
        assert!(refs.contains(&TaskKey::new("Network", "edge")));
        assert!(refs.contains(&TaskKey::new("Subnet", "a")));
        assert!(refs.contains(&TaskKey::new("Subnet", "b")));
    }

    #[test]
    fn test_plain_maps_are_not_references() {
        let value = json!({"tags": {"$task": 3}, "labels": {"$task": "x/y", "other": 1}});
        assert!(collect_references(&value).is_empty());
    }
}
