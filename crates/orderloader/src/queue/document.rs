//! Order documents and their schema check.

use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// First schema violation found in a document, with its field path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// e.g. `items[0].code`
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A field value as the document spells it. Exporters disagree on whether
/// tax IDs, quantities and prices are strings or numbers, so both are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Other(Value),
}

impl Scalar {
    /// Numeric reading, parsing text such as `"2"` or `" 9.50 "`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Other(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Other(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub tax_id: Scalar,
    pub name: Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub description: Scalar,
    pub code: Scalar,
    pub quantity: Scalar,
    pub unit_price: Scalar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDocument {
    pub order_id: Scalar,
    pub document_date: Scalar,
    pub buyer: Buyer,
    pub items: Vec<OrderItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<Scalar>,
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "must be an object"))
}

/// Presence only. The value itself may be any JSON, `null` included.
fn require<'a>(
    obj: &'a Map<String, Value>,
    prefix: &str,
    key: &str,
) -> Result<&'a Value, ValidationError> {
    obj.get(key).ok_or_else(|| {
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        ValidationError::new(path, "is required")
    })
}

/// Check a parsed document against the order schema: required keys and the
/// object/array shape of `buyer` and `items`. Field types are not checked.
pub fn validate(value: &Value) -> Result<(), ValidationError> {
    let root = object(value, "<document>")?;
    require(root, "", "orderId")?;
    require(root, "", "documentDate")?;

    let buyer = object(require(root, "", "buyer")?, "buyer")?;
    require(buyer, "buyer", "taxId")?;
    require(buyer, "buyer", "name")?;

    let items = require(root, "", "items")?
        .as_array()
        .ok_or_else(|| ValidationError::new("items", "must be an array"))?;
    for (i, item) in items.iter().enumerate() {
        let prefix = format!("items[{i}]");
        let item = object(item, &prefix)?;
        for key in ["description", "code", "quantity", "unitPrice"] {
            require(item, &prefix, key)?;
        }
    }
    Ok(())
}

impl OrderDocument {
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        validate(&value)?;
        serde_json::from_value(value).map_err(|e| ValidationError::new("<document>", e.to_string()))
    }

    /// Read and validate. Unreadable files and invalid JSON are `Io`/`Json` errors.
    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_value(value)?)
    }
}
