//! Core library of the admissions platform: tenant configuration, the
//! storage ports with their in-memory backends, and the admission workflow
//! built on top of them.

pub mod config;
pub mod error;
pub mod stores;
pub mod telemetry;
pub mod tenants;
pub mod workflows;
