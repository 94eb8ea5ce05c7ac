//! Legacy rows, field values and current-schema entities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, ShapeProblem};

/// Field name to value mapping of a row or entity.
pub type Fields = BTreeMap<String, Value>;

/// A raw field value as found in a dump or produced by a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Multilingual value, one entry per site language.
    List(Vec<Value>),
    /// An enumeration code already resolved against its choice list.
    Choice(Choice),
}

/// A resolved enumeration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Name of the choice list, e.g. `tickets.TicketStates`.
    pub list: String,
    /// Stored code, e.g. `"20"`.
    pub value: String,
    /// Symbolic name, e.g. `"todo"`.
    pub name: String,
}

impl Value {
    /// Whether the value counts as "not given": `Null` or empty text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// The value as a lookup code, if it is text or an integer.
    pub fn code(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Int(n) => Some(n.to_string()),
            Self::Choice(c) => Some(c.value.clone()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a JSON value from a dump. Objects and nested arrays are not
    /// valid field values and yield `None`.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        Some(match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64()?),
            },
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
                        scalar => Self::from_json(scalar),
                    })
                    .collect::<Option<Vec<_>>>()?,
            ),
            serde_json::Value::Object(_) => return None,
        })
    }

    /// Convert to JSON for export. Choices export their symbolic name.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => (*b).into(),
            Self::Int(n) => (*n).into(),
            Self::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Text(s) => s.clone().into(),
            Self::List(items) => items.iter().map(Value::to_json).collect(),
            Self::Choice(c) => c.name.clone().into(),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Option<i64>> for Value {
    fn from(n: Option<i64>) -> Self {
        n.map_or(Self::Null, Self::Int)
    }
}

impl From<Choice> for Value {
    fn from(c: Choice) -> Self {
        Self::Choice(c)
    }
}

/// One row of a dump, tagged with its row kind (`app.model`).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub kind: String,
    pub fields: Fields,
}

impl Row {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            fields: Fields::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Remove and return a field that must be present.
    pub fn take(&mut self, name: &str) -> Result<Value, MigrationError> {
        self.fields.remove(name).ok_or_else(|| {
            MigrationError::shape(&self.kind, ShapeProblem::Missing(vec![name.to_string()]))
        })
    }

    /// Remove and return a field that must hold an integer.
    pub fn take_int(&mut self, name: &str) -> Result<i64, MigrationError> {
        match self.take(name)? {
            Value::Int(n) => Ok(n),
            _ => Err(self.wrong_type(name, "an integer")),
        }
    }

    /// Remove and return a field that must hold an integer or null.
    pub fn take_opt_int(&mut self, name: &str) -> Result<Option<i64>, MigrationError> {
        match self.take(name)? {
            Value::Int(n) => Ok(Some(n)),
            Value::Null => Ok(None),
            _ => Err(self.wrong_type(name, "an integer or null")),
        }
    }

    /// Move a field to a new name.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), MigrationError> {
        let value = self.take(from)?;
        self.fields.insert(to.to_string(), value);
        Ok(())
    }

    /// Remove a field that no longer exists in the next version.
    pub fn drop_field(&mut self, name: &str) -> Result<(), MigrationError> {
        self.take(name).map(|_| ())
    }

    /// Re-tag the row with a new kind, keeping its fields.
    pub fn retag(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    /// Check that the row carries exactly `declared` fields.
    pub fn check_exact<'a, I>(&self, declared: I) -> Result<(), MigrationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let declared: Vec<&str> = declared.into_iter().collect();
        let missing: Vec<String> = declared
            .iter()
            .filter(|name| !self.fields.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MigrationError::shape(&self.kind, ShapeProblem::Missing(missing)));
        }
        let unexpected: Vec<String> = self
            .fields
            .keys()
            .filter(|name| !declared.contains(&name.as_str()))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(MigrationError::shape(
                &self.kind,
                ShapeProblem::Unexpected(unexpected),
            ));
        }
        Ok(())
    }

    fn wrong_type(&self, field: &str, expected: &'static str) -> MigrationError {
        MigrationError::shape(
            &self.kind,
            ShapeProblem::WrongType {
                field: field.to_string(),
                expected,
            },
        )
    }
}

/// A current-schema row instance, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Model name, e.g. `topics.interest`.
    pub model: String,
    pub fields: Fields,
}

impl Entity {
    pub fn new(model: &str, fields: Fields) -> Self {
        Self {
            model: model.to_string(),
            fields,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The integer primary key, if the entity has one.
    pub fn id(&self) -> Option<i64> {
        self.fields.get("id").and_then(Value::as_int)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// JSON object of the entity's fields.
    pub fn to_json(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::json!({ "model": self.model, "fields": fields })
    }
}
