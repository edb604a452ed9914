//! TaskFlow Core Library
//!
//! Foundational domain models and business rules for the TaskFlow platform.
//! Every service crate depends on the types defined here.
//!
//! # Architecture
//!
//! - [`models`] - Entities (Worker, Project, Task, AuditEntry) and DTOs
//! - [`error`] - Error taxonomy with HTTP status mapping
//! - [`recurrence`] - Recurrence patterns and next-due computation
//! - [`principal`] - Authenticated caller identity and tenant resolution
//! - [`events`] - Typed pub/sub event payloads
//! - [`validation`] - Input validation and identity derivation

pub mod error;
pub mod events;
pub mod models;
pub mod principal;
pub mod recurrence;
pub mod validation;

pub use error::{Result, TaskflowError};
pub use models::{
    AgentFamily, AuditEntry, EntityType, MemberRole, NewProject, NewTask, Project, ProjectMember,
    RecurrenceTrigger, SortOrder, Task, TaskFilter, TaskPriority, TaskSort, TaskStatus,
    UpdateProject, UpdateTask, Worker, WorkerKind,
};
pub use principal::{CredentialKind, Principal, DEFAULT_TENANT};
pub use recurrence::{next_due, RecurrencePattern};
pub use validation::Validator;

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
