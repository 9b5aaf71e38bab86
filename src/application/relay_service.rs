//! Relay Service - Main application use case
//!
//! Hands every inbound metric line to the destinations of the routes it
//! matches. This is the primary interface for the inbound adapter.

use crate::application::destination::{Destination, DestinationConfig, DestinationHandle};
use crate::domain::entities::Route;
use crate::domain::ports::MetricsStore;
use bytes::BytesMut;
use std::collections::HashMap;
use std::sync::Arc;

struct RouteEntry {
    route: Route,
    destinations: Vec<DestinationHandle>,
}

/// Relay service.
///
/// Destinations are shared between routes naming the same address, so each
/// address gets exactly one connection.
pub struct RelayService {
    routes: Vec<RouteEntry>,
    destinations: Vec<DestinationHandle>,
    first_only: bool,
}

impl RelayService {
    /// Build the service and spawn one destination task per distinct address.
    pub fn new(
        routes: Vec<Route>,
        first_only: bool,
        metrics: Arc<dyn MetricsStore>,
        config: DestinationConfig,
    ) -> Self {
        let mut by_addr: HashMap<String, DestinationHandle> = HashMap::new();
        let mut destinations = Vec::new();
        let mut entries = Vec::with_capacity(routes.len());

        for route in routes {
            let mut handles = Vec::with_capacity(route.destinations.len());
            for addr in &route.destinations {
                let handle = match by_addr.get(addr) {
                    Some(handle) => handle.clone(),
                    None => {
                        let handle =
                            Destination::spawn(addr.clone(), metrics.clone(), config.clone());
                        by_addr.insert(addr.clone(), handle.clone());
                        destinations.push(handle.clone());
                        handle
                    }
                };
                handles.push(handle);
            }

            tracing::info!(
                "route {} (prefix {:?}) -> {:?}",
                route.key,
                route.prefix,
                route.destinations
            );
            entries.push(RouteEntry {
                route,
                destinations: handles,
            });
        }

        Self {
            routes: entries,
            destinations,
            first_only,
        }
    }

    /// All distinct destinations.
    pub fn destinations(&self) -> &[DestinationHandle] {
        &self.destinations
    }

    /// Relay one line. Returns how many destinations it was queued for.
    pub async fn dispatch(&self, line: &[u8]) -> usize {
        let mut queued = 0;

        for entry in &self.routes {
            if !entry.route.matches(line) {
                continue;
            }
            for dest in &entry.destinations {
                match dest.send(BytesMut::from(line)).await {
                    Ok(()) => queued += 1,
                    Err(e) => tracing::error!("route {}: {}", entry.route.key, e),
                }
            }
            if self.first_only {
                break;
            }
        }

        if queued == 0 {
            tracing::trace!("no route for {}", String::from_utf8_lossy(line));
        }
        queued
    }

    /// Flush every destination, logging failures.
    pub async fn flush_all(&self) {
        for dest in &self.destinations {
            if let Err(e) = dest.flush().await {
                tracing::warn!("{} flush failed: {}", dest.addr(), e);
            }
        }
    }

    /// Flush, close and stop every destination.
    pub async fn shutdown(&self) {
        for dest in &self.destinations {
            dest.shutdown().await;
        }
    }
}
