//! Subscriber Data Model
//!
//! A subscriber is a flat bag of typed attributes. Built-in and
//! tenant-custom fields share the same attribute map; a field that is not
//! present in the map is "unset" for presence tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::{SubscriberId, TenantId};

/// Typed attribute value carried by a subscriber record.
///
/// Enum-kind fields store their selected choice as a `String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free-form string
    String(String),
    /// Numeric value (integers widen to f64)
    Number(f64),
    /// Boolean flag
    Bool(bool),
    /// Timestamp value
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// Natural total order for number/date values.
    ///
    /// Returns `None` for cross-type comparisons and for NaN, which
    /// ordering operators treat as a non-match.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => a.partial_cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// String view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Date(v)
    }
}

/// One subscriber, owned by a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberRecord {
    /// Unique subscriber ID
    pub id: SubscriberId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Attribute map (built-in and custom fields alike)
    pub attributes: HashMap<String, FieldValue>,
}

impl SubscriberRecord {
    /// Create an empty record for a tenant
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            id: SubscriberId::new_v4(),
            tenant_id,
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Look up an attribute
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }

    /// Presence test backing `is_set` / `is_not_set`
    pub fn has(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}
