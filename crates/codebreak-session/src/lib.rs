//! Player connection lifecycle for Codebreak.
//!
//! This crate tracks who is connected and what happens when they drop:
//!
//! 1. **Authentication** — validating identity ([`Authenticator`] trait;
//!    credential issuance itself is an external concern)
//! 2. **Link tracking** — one [`PlayerLink`] per player
//!    ([`ConnectionManager`])
//! 3. **Reconnection** — a dropped player holds a token and a grace
//!    window; resuming within it restores the link without losing game
//!    state
//!
//! The manager is a plain single-owner structure (no interior locking);
//! the server guards it with one mutex and the periodic maintenance
//! sweep turns expired links into room forfeits.

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod link;
mod manager;

pub use auth::Authenticator;
pub use error::ConnectionError;
pub use link::{ConnectionConfig, LinkState, PlayerLink};
pub use manager::ConnectionManager;
