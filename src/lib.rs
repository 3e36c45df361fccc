//! Adhera — medication schedule and adherence engine.
//!
//! Prescriptions and their items are the source of truth; the concrete
//! dose instances a patient sees are expanded on demand and never stored.
//! Adherence is an append-only log matched back to instances within a
//! tolerance window, and background tasks turn the same data into
//! reminders and low-adherence alerts.

pub mod adherence_log;
pub mod alerts;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod models;
pub mod prescriptions;
pub mod report;
pub mod schedule;
pub mod tasks;

pub use error::EngineError;
