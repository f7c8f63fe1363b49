//! Gridmesh Auth Service
//!
//! PostgreSQL-backed authorization and identity service with:
//! - Signed bearer tokens (access, refresh, API, recovery, invitation)
//! - Relation-tuple policies evaluated by an external relation engine
//! - Domain (tenant) lifecycle with compensated multi-store writes

pub mod config;
pub mod db;
pub mod grpc;
pub mod models;
pub mod services;
