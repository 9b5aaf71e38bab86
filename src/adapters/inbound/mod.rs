mod line_server;

pub use line_server::LineServer;
