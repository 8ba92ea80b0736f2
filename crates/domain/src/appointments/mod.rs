/// Appointment aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Input DTOs
pub mod inputs;

/// View (read model)
pub mod view;

/// CQRS setup
pub mod cqrs;

/// Command entry points used by the API
pub mod service;

pub use aggregate::{Appointment, AppointmentStatus, Services, AGGREGATE_TYPE};
pub use commands::Command;
pub use events::Event;
pub use service::AppointmentService;
pub use view::{Query, View};
