//! Application Layer
//!
//! Relay use cases: owning destinations and dispatching lines to them.

pub mod destination;
pub mod relay_service;

pub use destination::{Destination, DestinationConfig, DestinationError, DestinationHandle};
pub use relay_service::RelayService;
