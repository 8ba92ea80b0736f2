/// Prescription order aggregate
pub mod aggregate;

/// Commands
pub mod commands;

/// Events
pub mod events;

/// Input DTOs
pub mod inputs;

/// Line-item pricing and stock checks
pub mod pricing;

/// View (read model)
pub mod view;

/// CQRS setup
pub mod cqrs;

/// Command entry points used by the API
pub mod service;

pub use aggregate::{
    LineItem, OrderStatus, PaymentDetails, PaymentStatus, PrescriptionOrder, Services,
    AGGREGATE_TYPE,
};
pub use commands::Command;
pub use events::Event;
pub use service::{DispatchedOrder, OrderService, PharmacistStats};
pub use view::{PharmacistOrderSummary, Query, View};
