//! Filter Model
//!
//! User-submitted filter criteria as a closed recursive tagged type. A
//! filter tree deserializes straight from the client payload; nothing is
//! evaluated until the compiler has validated the whole tree against the
//! field registry.

use serde::{Deserialize, Serialize};

/// Comparison operator a condition may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equality
    Eq,
    /// Inequality
    Neq,
    /// Strictly greater (number/date)
    Gt,
    /// Greater or equal (number/date)
    Gte,
    /// Strictly less (number/date)
    Lt,
    /// Less or equal (number/date)
    Lte,
    /// Case-insensitive substring (string)
    Contains,
    /// Membership in a non-empty value list
    In,
    /// Inclusive 2-element range (number/date)
    Between,
    /// Attribute is present on the record
    IsSet,
    /// Attribute is absent from the record
    IsNotSet,
}

impl Operator {
    /// Presence operators ignore any supplied value
    pub fn is_presence(&self) -> bool {
        matches!(self, Operator::IsSet | Operator::IsNotSet)
    }
}

/// How a group combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    /// Every child must match
    And,
    /// At least one child must match
    Or,
}

/// Raw condition value as submitted by the user
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// No value (presence operators)
    #[default]
    Null,
    /// Boolean literal
    Bool(bool),
    /// Numeric literal
    Number(f64),
    /// String literal (also dates in RFC 3339 and enum choices)
    String(String),
    /// Value list (`in` membership, `between` ranges)
    List(Vec<Literal>),
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::String(v.to_string())
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Number(v)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Literal::Bool(v)
    }
}

/// One node of a filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterNode {
    /// Leaf test against one field
    Condition {
        /// Field name, resolved against the registry at compile time
        field: String,
        /// Comparison operator
        operator: Operator,
        /// Operand; ignored by presence operators
        #[serde(default)]
        value: Literal,
    },
    /// Boolean combination of child nodes (must be non-empty)
    Group {
        /// And / Or
        combinator: Combinator,
        /// Child nodes, evaluated left to right
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    /// Leaf condition
    pub fn condition(field: &str, operator: Operator, value: impl Into<Literal>) -> Self {
        FilterNode::Condition {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }

    /// AND group
    pub fn all(children: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            combinator: Combinator::And,
            children,
        }
    }

    /// OR group
    pub fn any(children: Vec<FilterNode>) -> Self {
        FilterNode::Group {
            combinator: Combinator::Or,
            children,
        }
    }
}
