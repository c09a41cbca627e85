//! Appointment rebooker: polls the scheduling site for an earlier opening
//! and rebooks onto it.

pub mod availability;
pub mod booking;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod manager;
pub mod policy;
pub mod poller;
pub mod types;
