//! Business-logic services, kept out of the HTTP handlers for testability.

pub mod ingest;

pub use ingest::IngestService;
