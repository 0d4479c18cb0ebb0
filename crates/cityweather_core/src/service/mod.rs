//! Ingestion use-case services.
//!
//! # Responsibility
//! - Keep pure aggregation separate from orchestration with side effects.
//! - Keep CLI callers decoupled from source and storage details.

pub mod aggregate;
pub mod ingest_service;
