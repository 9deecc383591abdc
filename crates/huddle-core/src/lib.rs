//! # huddle-core
//!
//! Foundation types for the Huddle session relay.
//!
//! This crate provides the shared vocabulary that all other Huddle crates
//! depend on:
//!
//! - **Events**: [`event::Event`] — the wire-level envelope, with opaque
//!   JSON payload and opt-in typed access via [`event::Event::typed_payload`]
//! - **Users**: [`user::User`] and [`user::Status`] — the participant record
//! - **Sessions**: [`session::Session`] — roster, bounded history, metadata
//! - **Errors**: [`errors`] hierarchy via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other huddle crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod event;
pub mod session;
pub mod user;

pub use errors::{EventError, SessionError, StoreError, WireError};
pub use event::{Event, EventType};
pub use session::Session;
pub use user::{Status, User};
