//! Navigation gating.
//!
//! This module provides:
//! - `RouteTable`: ordered destinations with their auth/role requirements
//! - `NavigationGuard`: the per-transition allow/redirect decision
//!
//! The guard only reads the in-memory session; it never performs I/O.

pub mod guard;
pub mod routes;

pub use guard::{Decision, NavigationGuard, Navigator, Redirect, REDIRECT_PARAM};
pub use routes::{ResolvedRoute, RouteIntent, RouteTable};
