//! ClawDBot HTTP gateway.
//!
//! Axum server exposing the automation surface: health, auth-class stubs,
//! AI assist endpoints, the admin trigger route, and analytics. Every request
//! passes through the fixed-window rate limiter before reaching a handler.

pub mod ratelimit;
pub mod routes;
pub mod server;

pub use ratelimit::{CounterStore, MemoryCounterStore, RateDecision, RateLimiter, RouteClass};
pub use server::{AppState, build_router, start};
