//! MediConnect Domain Models

/// Accounts, roles and identity claims
pub mod accounts;

/// Passwordless sign-in and sessions
pub mod auth;

/// Appointment aggregate
pub mod appointments;

/// Command bus over the event store
pub mod bus;

/// Medicine catalog and stock
pub mod catalog;

/// Delivery packages
pub mod deliveries;

/// Domain errors
pub mod errors;

/// In-app, realtime and email notifications
pub mod notifications;

/// Prescription order aggregate
pub mod orders;

/// Doctor-patient relationships
pub mod relationships;

/// Record stores and view repositories
pub mod store;

pub use errors::Error;
