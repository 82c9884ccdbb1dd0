//! Operational HTTP surface: liveness of the backing services and outbox
//! backlog.
//!
//! - GET /health — Postgres and Redis reachability
//! - GET /api/outbox/stats — pending/processed counts, oldest pending row

pub mod routes;
pub mod state;
