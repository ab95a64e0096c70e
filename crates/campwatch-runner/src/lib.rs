//! Polling runner for the campaign alert engine.
//!
//! Wires a [`campwatch_storage::CycleSource`], an
//! [`campwatch_storage::AlertLogStore`] and a
//! [`campwatch_notify::manager::NotificationManager`] around
//! [`campwatch_alert::AlertEngine`] and runs one cycle per poll interval.

pub mod config;
pub mod cycle;
