//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionHandle`: the shared, single-writer session cell (credential + identity)
//! - `SessionStore`: the actions that mutate it (login, refresh, register, logout)
//! - `DurableStorage`: the write-through backup the session is hydrated from
//!
//! Identity is never held without a credential; every mutation upholds this.

pub mod error;
pub mod session;
pub mod storage;
pub mod store;

pub use error::AuthError;
pub use session::{Credential, Identity, InvalidCredential, Role, SessionHandle, SessionSnapshot};
pub use storage::{DurableStorage, FileStorage, KeyringStorage, MemoryStorage};
pub use store::SessionStore;
