//! Domain Layer
//!
//! Relay entities, value objects and the ports the outer layers implement.

pub mod entities;
pub mod ports;
pub mod value_objects;

pub use entities::{DestinationCounters, Route};
pub use value_objects::{LevelLegacy, LevelM20};
