//! Client-side session and access-control layer for the library app.
//!
//! The crate is split into three cooperating parts:
//! - [`auth`]: the session store, the single owner of credential and identity
//! - [`api`]: the request pipeline and HTTP client that stamps and reacts to calls
//! - [`nav`]: the route table and the navigation guard
//!
//! Views, transport internals and server logic live outside this crate.

pub mod api;
pub mod auth;
pub mod config;
pub mod nav;

pub use api::{ApiClient, ApiError, AuthApi, AuthEvent};
pub use auth::{AuthError, Credential, Identity, Role, SessionHandle, SessionSnapshot, SessionStore};
pub use config::Config;
pub use nav::{Decision, NavigationGuard, Navigator, RouteIntent, RouteTable};
