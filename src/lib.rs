//! Warden - multi-tenant access-control policy layer
//!
//! Translates groups, roles, users and their scoped role assignments into
//! policy and grouping tuples for an embedded evaluation engine, and keeps
//! the relational store and the engine in agreement.
//! It exposes all modules for testing purposes.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod relations;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod web;
