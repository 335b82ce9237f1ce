//! Field Registry
//!
//! Catalog of queryable subscriber attributes: a static built-in set merged
//! with per-tenant custom fields. Custom fields extend, never shadow,
//! built-in names; collisions are rejected at registration time.

use dashmap::DashMap;
use pulse_common::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::filter::Operator;

/// Value type of a queryable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form string
    String,
    /// Numeric
    Number,
    /// Boolean flag
    Boolean,
    /// Timestamp
    Date,
    /// Closed choice from `enum_values`
    Enum,
}

/// Operators a field of the given kind accepts by default.
///
/// Ordering operators are restricted to kinds with a natural total order.
pub fn default_operators(kind: FieldKind) -> HashSet<Operator> {
    use Operator::*;
    let ops: &[Operator] = match kind {
        FieldKind::String => &[Eq, Neq, Contains, In, IsSet, IsNotSet],
        FieldKind::Number => &[Eq, Neq, Gt, Gte, Lt, Lte, Between, In, IsSet, IsNotSet],
        FieldKind::Boolean => &[Eq, Neq, IsSet, IsNotSet],
        FieldKind::Date => &[Eq, Gt, Gte, Lt, Lte, Between, IsSet, IsNotSet],
        FieldKind::Enum => &[Eq, Neq, In, IsSet, IsNotSet],
    };
    ops.iter().copied().collect()
}

/// One queryable attribute definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Unique name within the tenant's merged catalog
    pub name: String,
    /// Value type
    pub kind: FieldKind,
    /// Operators conditions on this field may use
    pub operators: HashSet<Operator>,
    /// Permitted choices; non-empty iff `kind` is `Enum`
    pub enum_values: Vec<String>,
    /// Whether this is a tenant custom field
    pub custom: bool,
}

impl FieldDefinition {
    /// Built-in field with the default operator set for its kind
    pub fn builtin(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            operators: default_operators(kind),
            enum_values: Vec::new(),
            custom: false,
        }
    }

    /// Tenant custom field with the default operator set for its kind
    pub fn custom(name: &str, kind: FieldKind) -> Self {
        Self {
            custom: true,
            ..Self::builtin(name, kind)
        }
    }

    /// Attach enum choices (Enum-kind fields only)
    pub fn with_enum_values(mut self, values: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Whether conditions on this field may use `operator`
    pub fn allows(&self, operator: Operator) -> bool {
        self.operators.contains(&operator)
    }
}

/// Registration failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Name already taken by a built-in or an existing tenant field
    #[error("field `{0}` is already defined")]
    NameCollision(String),
    /// No custom field with that name for the tenant
    #[error("custom field `{0}` not found")]
    NotFound(String),
    /// Enum-kind field registered without choices
    #[error("enum field `{0}` requires at least one value")]
    MissingEnumValues(String),
    /// Non-enum field registered with choices
    #[error("field `{0}` is not enum-kind but carries enum values")]
    UnexpectedEnumValues(String),
}

/// Built-in + per-tenant custom field catalog
pub struct FieldRegistry {
    builtins: Vec<FieldDefinition>,
    /// Tenant → custom fields in creation order
    custom: DashMap<TenantId, Vec<FieldDefinition>>,
}

impl FieldRegistry {
    /// Registry over the platform's built-in catalog
    pub fn new() -> Self {
        Self::with_builtins(builtin_catalog())
    }

    /// Registry over an explicit built-in set
    pub fn with_builtins(builtins: Vec<FieldDefinition>) -> Self {
        Self {
            builtins,
            custom: DashMap::new(),
        }
    }

    /// Register a tenant custom field.
    ///
    /// Rejects collisions with built-ins and with the tenant's existing
    /// custom fields; enum choices must match the field kind.
    pub fn register_custom(
        &self,
        tenant_id: TenantId,
        mut def: FieldDefinition,
    ) -> Result<(), FieldError> {
        match (def.kind, def.enum_values.is_empty()) {
            (FieldKind::Enum, true) => {
                return Err(FieldError::MissingEnumValues(def.name));
            }
            (kind, false) if kind != FieldKind::Enum => {
                return Err(FieldError::UnexpectedEnumValues(def.name));
            }
            _ => {}
        }

        if self.builtins.iter().any(|b| b.name == def.name) {
            return Err(FieldError::NameCollision(def.name));
        }

        let mut fields = self.custom.entry(tenant_id).or_default();
        if fields.iter().any(|f| f.name == def.name) {
            return Err(FieldError::NameCollision(def.name));
        }

        def.custom = true;
        if def.operators.is_empty() {
            def.operators = default_operators(def.kind);
        }
        fields.push(def);
        Ok(())
    }

    /// Remove a tenant custom field. Built-ins cannot be removed.
    pub fn remove_custom(&self, tenant_id: TenantId, name: &str) -> Result<(), FieldError> {
        let mut fields = self
            .custom
            .get_mut(&tenant_id)
            .ok_or_else(|| FieldError::NotFound(name.to_string()))?;
        let before = fields.len();
        fields.retain(|f| f.name != name);
        if fields.len() == before {
            return Err(FieldError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Merged catalog for a tenant: built-ins first, then custom fields in
    /// creation order.
    pub fn fields_for(&self, tenant_id: TenantId) -> Vec<FieldDefinition> {
        let mut out = self.builtins.clone();
        if let Some(fields) = self.custom.get(&tenant_id) {
            out.extend(fields.iter().cloned());
        }
        out
    }

    /// Definition of one field within a tenant's merged catalog
    pub fn definition(&self, tenant_id: TenantId, name: &str) -> Option<FieldDefinition> {
        if let Some(def) = self.builtins.iter().find(|b| b.name == name) {
            return Some(def.clone());
        }
        self.custom
            .get(&tenant_id)
            .and_then(|fields| fields.iter().find(|f| f.name == name).cloned())
    }

    /// Operators permitted for a field, used by the compiler
    pub fn operators_for(&self, tenant_id: TenantId, name: &str) -> Option<HashSet<Operator>> {
        self.definition(tenant_id, name).map(|d| d.operators)
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The platform's built-in subscriber fields
pub fn builtin_catalog() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::builtin("email", FieldKind::String),
        FieldDefinition::builtin("first_name", FieldKind::String),
        FieldDefinition::builtin("last_name", FieldKind::String),
        FieldDefinition::builtin("country", FieldKind::String),
        FieldDefinition::builtin("language", FieldKind::String),
        FieldDefinition::builtin("active", FieldKind::Boolean),
        FieldDefinition::builtin("subscribed_at", FieldKind::Date),
        FieldDefinition::builtin("last_open_at", FieldKind::Date),
        FieldDefinition::builtin("open_count", FieldKind::Number),
        FieldDefinition::builtin("status", FieldKind::Enum)
            .with_enum_values(&["subscribed", "unsubscribed", "bounced"]),
    ]
}
