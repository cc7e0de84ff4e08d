//! Policy translation and enforcement.
//!
//! Relational role/group/user bookkeeping is turned into the five-field policy
//! tuples and grouping relations the evaluation engine understands.
pub mod catalog;
pub mod engine;
pub mod errors;
pub mod grouping;
pub mod scope;
pub mod service;
pub mod translate;
pub mod types;
pub mod web;

pub use catalog::PermissionCatalog;
pub use engine::{CasbinEngine, EngineModel, PolicyEngine};
pub use errors::AuthzError;
pub use service::EnforcementGateway;
