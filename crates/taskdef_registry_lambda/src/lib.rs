//! AWS-oriented adapters and the Lambda handler for task definition registration.
//!
//! This crate owns runtime integration details (the Lambda entry point, the
//! DynamoDB lock table and the ECS registrar) and wires them into the
//! coordinator from `taskdef_registry_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
