//! Sluice - Routing
//!
//! Ordered pattern→target tables with first-match semantics. Routing tables
//! are built during configuration and read-only on the hot path; lookup cost
//! is a linear scan over pre-compiled regexes in insertion order.
//!
//! The filter-chain DAG (each filter routing only to later-registered
//! filters) is assembled by the engine out of plain [`TagRouter`] values;
//! nothing here knows about filters.

mod error;
mod router;
mod unit_id;

#[cfg(test)]
mod router_test;

pub use error::RoutingError;
pub use router::TagRouter;
pub use unit_id::UnitId;

/// Result type for routing operations
pub type Result<T> = std::result::Result<T, RoutingError>;
