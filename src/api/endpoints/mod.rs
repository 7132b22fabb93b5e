//! API endpoint handlers.
//!
//! Patient-facing routes live under `/api/patients`, care-team routes under
//! `/api/provider`, scheduler hooks under `/api/cron`.

pub mod alerts;
pub mod cron;
pub mod health;
pub mod medications;
pub mod notes;
pub mod patients;
pub mod provider;
pub mod vitals;
