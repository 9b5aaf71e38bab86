//! Infrastructure Layer
//!
//! Destination connections and the cross-cutting runtime pieces around them.

pub mod connection;
pub mod handoff;
pub mod instrumentation;
pub mod pid_file;
pub mod shutdown;

pub use connection::{ConnError, Connection};
pub use handoff::HandoffError;
pub use instrumentation::{Reporter, ReporterConfig};
pub use pid_file::PidFile;
pub use shutdown::{shutdown_signal, ClientGuard, ShutdownController};
