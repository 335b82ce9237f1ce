//! Filter Compiler
//!
//! Turns a user-submitted filter tree into a validated predicate plan.
//! Compilation is all-or-nothing: the first invalid node aborts with a
//! `ValidationError` naming the offending field/operator and its path.
//! The resulting plan is immutable and evaluable repeatedly without
//! re-validation.

use chrono::{DateTime, Utc};
use pulse_common::{FieldValue, SubscriberRecord, TenantId};
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

use crate::fields::{FieldDefinition, FieldKind, FieldRegistry};
use crate::filter::{Combinator, FilterNode, Literal, Operator};

/// What was wrong with a filter node
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    /// Field does not exist in the tenant's catalog
    #[error("unknown field `{field}`")]
    UnknownField {
        /// Offending field name
        field: String,
    },
    /// Operator not in the field's allowed set
    #[error("operator `{operator:?}` not allowed on field `{field}`")]
    OperatorNotAllowed {
        /// Referenced field
        field: String,
        /// Disallowed operator
        operator: Operator,
    },
    /// Group with zero children
    #[error("group has no children")]
    EmptyGroup,
    /// `in` with an empty value list
    #[error("`in` on field `{field}` requires a non-empty list")]
    EmptyList {
        /// Referenced field
        field: String,
    },
    /// `between` without a 2-element range
    #[error("`between` on field `{field}` requires a 2-element range")]
    BadRange {
        /// Referenced field
        field: String,
    },
    /// Value shape does not match the field kind
    #[error("value for field `{field}` must be of kind {expected:?}")]
    TypeMismatch {
        /// Referenced field
        field: String,
        /// Kind the field requires
        expected: FieldKind,
    },
    /// Date value is not RFC 3339
    #[error("value `{value}` for field `{field}` is not an RFC 3339 date")]
    BadDate {
        /// Referenced field
        field: String,
        /// Rejected input
        value: String,
    },
    /// Enum value outside the field's choices
    #[error("`{value}` is not a permitted value of enum field `{field}`")]
    UnknownEnumValue {
        /// Referenced field
        field: String,
        /// Rejected choice
        value: String,
    },
}

/// Compilation failure, locating the offending node
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid filter at {path}: {kind}")]
pub struct ValidationError {
    /// Path of the offending node (`$`, `$.children[1]`, ...)
    pub path: String,
    /// What was wrong
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    fn at(path: &str, kind: ValidationErrorKind) -> Self {
        Self {
            path: path.to_string(),
            kind,
        }
    }
}

/// Validated, immutable predicate plan
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    root: CompiledNode,
}

impl CompiledPredicate {
    /// Evaluate the plan against one subscriber record.
    ///
    /// AND/OR short-circuit left to right; a condition on an absent
    /// attribute is false except `is_not_set`.
    pub fn matches(&self, record: &SubscriberRecord) -> bool {
        self.root.matches(record)
    }
}

#[derive(Debug, Clone)]
enum CompiledNode {
    Condition(CompiledCondition),
    Group {
        combinator: Combinator,
        children: Vec<CompiledNode>,
    },
}

impl CompiledNode {
    fn matches(&self, record: &SubscriberRecord) -> bool {
        match self {
            CompiledNode::Condition(cond) => cond.matches(record),
            CompiledNode::Group {
                combinator,
                children,
            } => match combinator {
                Combinator::And => children.iter().all(|c| c.matches(record)),
                Combinator::Or => children.iter().any(|c| c.matches(record)),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledCondition {
    field: String,
    test: CompiledTest,
}

#[derive(Debug, Clone)]
enum CompiledTest {
    Eq(FieldValue),
    Neq(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    /// Needle is pre-lowercased at compile time
    Contains(String),
    In(Vec<FieldValue>),
    /// Inclusive bounds
    Between(FieldValue, FieldValue),
    IsSet,
    IsNotSet,
}

impl CompiledCondition {
    fn matches(&self, record: &SubscriberRecord) -> bool {
        let value = record.get(&self.field);

        match &self.test {
            CompiledTest::IsSet => return value.is_some(),
            CompiledTest::IsNotSet => return value.is_none(),
            _ => {}
        }

        let Some(value) = value else {
            return false;
        };

        match &self.test {
            CompiledTest::Eq(expected) => value == expected,
            CompiledTest::Neq(expected) => value != expected,
            CompiledTest::Gt(bound) => {
                matches!(value.compare(bound), Some(Ordering::Greater))
            }
            CompiledTest::Gte(bound) => matches!(
                value.compare(bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompiledTest::Lt(bound) => {
                matches!(value.compare(bound), Some(Ordering::Less))
            }
            CompiledTest::Lte(bound) => matches!(
                value.compare(bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompiledTest::Contains(needle) => value
                .as_str()
                .map(|s| s.to_lowercase().contains(needle))
                .unwrap_or(false),
            CompiledTest::In(set) => set.iter().any(|v| v == value),
            CompiledTest::Between(lo, hi) => {
                let above = matches!(
                    value.compare(lo),
                    Some(Ordering::Greater | Ordering::Equal)
                );
                let below = matches!(
                    value.compare(hi),
                    Some(Ordering::Less | Ordering::Equal)
                );
                above && below
            }
            CompiledTest::IsSet | CompiledTest::IsNotSet => unreachable!("handled above"),
        }
    }
}

/// Validates filter trees against a tenant's field catalog
#[derive(Clone)]
pub struct FilterCompiler {
    registry: Arc<FieldRegistry>,
}

impl FilterCompiler {
    /// Compiler over a field registry
    pub fn new(registry: Arc<FieldRegistry>) -> Self {
        Self { registry }
    }

    /// Compile a filter tree for one tenant.
    pub fn compile(
        &self,
        filter: &FilterNode,
        tenant_id: TenantId,
    ) -> Result<CompiledPredicate, ValidationError> {
        let root = self.compile_node(filter, tenant_id, "$")?;
        Ok(CompiledPredicate { root })
    }

    fn compile_node(
        &self,
        node: &FilterNode,
        tenant_id: TenantId,
        path: &str,
    ) -> Result<CompiledNode, ValidationError> {
        match node {
            FilterNode::Group {
                combinator,
                children,
            } => {
                if children.is_empty() {
                    return Err(ValidationError::at(path, ValidationErrorKind::EmptyGroup));
                }
                let children = children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        self.compile_node(child, tenant_id, &format!("{path}.children[{i}]"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CompiledNode::Group {
                    combinator: *combinator,
                    children,
                })
            }
            FilterNode::Condition {
                field,
                operator,
                value,
            } => {
                let test = self.compile_condition(field, *operator, value, tenant_id, path)?;
                Ok(CompiledNode::Condition(CompiledCondition {
                    field: field.clone(),
                    test,
                }))
            }
        }
    }

    fn compile_condition(
        &self,
        field: &str,
        operator: Operator,
        value: &Literal,
        tenant_id: TenantId,
        path: &str,
    ) -> Result<CompiledTest, ValidationError> {
        let def = self.registry.definition(tenant_id, field).ok_or_else(|| {
            ValidationError::at(
                path,
                ValidationErrorKind::UnknownField {
                    field: field.to_string(),
                },
            )
        })?;

        if !def.allows(operator) {
            return Err(ValidationError::at(
                path,
                ValidationErrorKind::OperatorNotAllowed {
                    field: field.to_string(),
                    operator,
                },
            ));
        }

        match operator {
            Operator::IsSet => Ok(CompiledTest::IsSet),
            Operator::IsNotSet => Ok(CompiledTest::IsNotSet),
            Operator::Contains => match value {
                Literal::String(s) => Ok(CompiledTest::Contains(s.to_lowercase())),
                _ => Err(ValidationError::at(
                    path,
                    ValidationErrorKind::TypeMismatch {
                        field: field.to_string(),
                        expected: def.kind,
                    },
                )),
            },
            Operator::In => match value {
                Literal::List(items) if !items.is_empty() => {
                    let set = items
                        .iter()
                        .map(|item| coerce_scalar(&def, item, path))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(CompiledTest::In(set))
                }
                Literal::List(_) => Err(ValidationError::at(
                    path,
                    ValidationErrorKind::EmptyList {
                        field: field.to_string(),
                    },
                )),
                _ => Err(ValidationError::at(
                    path,
                    ValidationErrorKind::TypeMismatch {
                        field: field.to_string(),
                        expected: def.kind,
                    },
                )),
            },
            Operator::Between => match value {
                Literal::List(items) if items.len() == 2 => {
                    let lo = coerce_scalar(&def, &items[0], path)?;
                    let hi = coerce_scalar(&def, &items[1], path)?;
                    Ok(CompiledTest::Between(lo, hi))
                }
                _ => Err(ValidationError::at(
                    path,
                    ValidationErrorKind::BadRange {
                        field: field.to_string(),
                    },
                )),
            },
            Operator::Eq => Ok(CompiledTest::Eq(coerce_scalar(&def, value, path)?)),
            Operator::Neq => Ok(CompiledTest::Neq(coerce_scalar(&def, value, path)?)),
            Operator::Gt => Ok(CompiledTest::Gt(coerce_scalar(&def, value, path)?)),
            Operator::Gte => Ok(CompiledTest::Gte(coerce_scalar(&def, value, path)?)),
            Operator::Lt => Ok(CompiledTest::Lt(coerce_scalar(&def, value, path)?)),
            Operator::Lte => Ok(CompiledTest::Lte(coerce_scalar(&def, value, path)?)),
        }
    }
}

/// Coerce one literal to the field's value type.
fn coerce_scalar(
    def: &FieldDefinition,
    literal: &Literal,
    path: &str,
) -> Result<FieldValue, ValidationError> {
    let mismatch = || {
        ValidationError::at(
            path,
            ValidationErrorKind::TypeMismatch {
                field: def.name.clone(),
                expected: def.kind,
            },
        )
    };

    match (def.kind, literal) {
        (FieldKind::String, Literal::String(s)) => Ok(FieldValue::String(s.clone())),
        (FieldKind::Number, Literal::Number(n)) => Ok(FieldValue::Number(*n)),
        (FieldKind::Boolean, Literal::Bool(b)) => Ok(FieldValue::Bool(*b)),
        (FieldKind::Date, Literal::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| FieldValue::Date(d.with_timezone(&Utc)))
            .map_err(|_| {
                ValidationError::at(
                    path,
                    ValidationErrorKind::BadDate {
                        field: def.name.clone(),
                        value: s.clone(),
                    },
                )
            }),
        (FieldKind::Enum, Literal::String(s)) => {
            if def.enum_values.iter().any(|v| v == s) {
                Ok(FieldValue::String(s.clone()))
            } else {
                Err(ValidationError::at(
                    path,
                    ValidationErrorKind::UnknownEnumValue {
                        field: def.name.clone(),
                        value: s.clone(),
                    },
                ))
            }
        }
        _ => Err(mismatch()),
    }
}
