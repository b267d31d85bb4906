//! The subscribe endpoint.
//!
//! [`Server::subscribe`] serves one streaming call:
//! - calls for another datacenter are relayed to it through the backend
//! - local calls resolve the caller's token, subscribe to the publisher and
//!   send every event the token may read, converted to [`wire::Event`]
//!
//! A call only ends with an error. [`SubscribeError::Aborted`] means the
//! server invalidated the subscription and the caller must resubscribe from
//! scratch.
//!
//! [`SubscribeError::Aborted`]: crate::error::SubscribeError::Aborted

mod filter;
mod logger;
mod server;
pub mod wire;

pub use filter::filter_by_auth;
pub use server::{Backend, EventStream, Server, ServerStream, StateChangeClient};
