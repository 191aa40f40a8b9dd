//! Field-level comparison of current and desired state

use crate::refs::as_reference;
use crate::report::ActionType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Fields that are identity or policy, never state
const ALWAYS_IGNORED: &[&str] = &["name", "lifecycle"];

/// A single field that differs between current and desired state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    /// `Value::Null` when the resource does not exist yet
    pub current: Value,
    pub desired: Value,
}

/// The set of changes needed to converge one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    action: ActionType,
    fields: Vec<FieldChange>,
}

impl Changes {
    pub fn none() -> Self {
        Self {
            action: ActionType::NoOp,
            fields: Vec::new(),
        }
    }

    /// Changes for creating a resource that does not exist yet
    pub fn create(desired: &Value, ignored: &[&str]) -> Self {
        let fields = compared_fields(desired, ignored)
            .map(|(field, value)| FieldChange {
                field: field.clone(),
                current: Value::Null,
                desired: value.clone(),
            })
            .collect();
        Self {
            action: ActionType::Create,
            fields,
        }
    }

    /// Changes needed to turn `actual` into `desired`.
    ///
    /// Fields left unset in `desired` are not compared, so values assigned
    /// by the cloud (ids, addresses) never show up as drift.
    pub fn between(actual: &Value, desired: &Value, ignored: &[&str]) -> Self {
        let fields: Vec<FieldChange> = compared_fields(desired, ignored)
            .filter_map(|(field, want)| {
                let have = actual.get(field).unwrap_or(&Value::Null);
                (have != want).then(|| FieldChange {
                    field: field.clone(),
                    current: have.clone(),
                    desired: want.clone(),
                })
            })
            .collect();
        let action = if fields.is_empty() {
            ActionType::NoOp
        } else {
            ActionType::Update
        };
        Self { action, fields }
    }

    pub fn action(&self) -> ActionType {
        self.action
    }

    pub fn is_empty(&self) -> bool {
        self.action == ActionType::NoOp
    }

    pub fn fields(&self) -> &[FieldChange] {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.fields.iter().find(|c| c.field == field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }
}

fn compared_fields<'a>(
    desired: &'a Value,
    ignored: &'a [&'a str],
) -> impl Iterator<Item = (&'a String, &'a Value)> + 'a {
    desired
        .as_object()
        .into_iter()
        .flat_map(|map| map.iter())
        .filter(move |(field, value)| {
            !value.is_null()
                && !ALWAYS_IGNORED.contains(&field.as_str())
                && !ignored.contains(&field.as_str())
        })
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, change) in self.fields.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match self.action {
                ActionType::Create => {
                    write!(f, "  {}: {}", change.field, display_value(&change.desired))?
                }
                _ => write!(
                    f,
                    "  {}: {} -> {}",
                    change.field,
                    display_value(&change.current),
                    display_value(&change.desired)
                )?,
            }
        }
        Ok(())
    }
}

/// Compact rendering of a field value; task references print as their key
pub fn display_value(value: &Value) -> String {
    if let Some(key) = as_reference(value) {
        return key.to_string();
    }
    match value {
        Value::Null => "<none>".to_string(),
        Value::String(s) => format!("{:?}", s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(display_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", k, display_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        other => other.to_string(),
    }
}
