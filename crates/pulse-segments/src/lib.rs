//! OpenPulse Segmentation
//!
//! Dynamic audience segmentation over a tenant-scoped subscriber
//! population.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       SegmentService                           │
//! │   every operation: AuthzEngine ──► compile ──► evaluate        │
//! │                                                                │
//! │  ┌─────────────┐   ┌────────────────┐   ┌──────────────────┐  │
//! │  │FieldRegistry│──►│ FilterCompiler │──►│ SegmentEvaluator │  │
//! │  │ builtin +   │   │ all-or-nothing │   │ deadline-bounded │  │
//! │  │ custom      │   │ validation     │   │ scans, single-   │  │
//! │  └─────────────┘   └────────────────┘   │ flight refresh   │  │
//! │                                         └────────┬─────────┘  │
//! │                                                  ▼            │
//! │                              SubscriberStore / SegmentRepo    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Filter trees arrive as a closed tagged type, are validated exhaustively
//! by the compiler, and only then run against the store. Segment count
//! refreshes coalesce: concurrent requests for one (tenant, segment) share
//! a single scan.

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod fields;
pub mod filter;
pub mod segment;
pub mod service;
pub mod store;

pub use compiler::{CompiledPredicate, FilterCompiler, ValidationError, ValidationErrorKind};
pub use error::SegmentError;
pub use evaluator::{EvaluatorConfig, SegmentEvaluator};
pub use fields::{builtin_catalog, FieldDefinition, FieldError, FieldKind, FieldRegistry};
pub use filter::{Combinator, FilterNode, Literal, Operator};
pub use segment::{
    InMemorySegmentRepository, RefreshStatus, RepoError, Segment, SegmentRepository,
};
pub use service::{SegmentService, ServiceConfig};
pub use store::{InMemorySubscriberStore, StoreError, SubscriberStore};
