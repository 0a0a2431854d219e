//! REST API client module for the library server.
//!
//! This module provides the `ApiClient` for calling the server, and the
//! request pipeline every protected call passes through: the credential is
//! attached on the way out, and a credential rejection on the way back
//! clears the session and publishes an [`AuthEvent`].
//!
//! The [`AuthApi`] trait is the seam the session store talks to.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod pipeline;

pub use client::ApiClient;
pub use endpoints::{AuthApi, LoginRequest, RegisterRequest};
pub use error::ApiError;
pub use pipeline::{AuthEvent, Pipeline};
