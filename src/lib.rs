//! # Changefeed
//!
//! The event-streaming core of a coordination service: subscribers watch a
//! topic and receive a consistent snapshot followed by every later change,
//! in order and without gaps.
//!
//! ## Core Concepts
//!
//! - **Events**: Immutable changes carrying an index, topic, key and payload
//! - **Publisher**: Appends published events to per-topic buffers and builds
//!   snapshots on subscribe
//! - **Subscriptions**: Cursors into a buffer with blocking, cancellable reads
//! - **Server**: Forwards, authorizes and streams subscribe calls
//!
//! ## Example
//!
//! ```ignore
//! use changefeed::{Context, EventPublisher, PublisherConfig, SnapshotHandlers, Topic};
//!
//! let publisher = EventPublisher::new(handlers, PublisherConfig::default());
//! let ctx = Context::new();
//! let driver = publisher.clone();
//! std::thread::spawn(move || driver.run(&ctx));
//!
//! // Publish changes as the state store commits them
//! publisher.publish(events)?;
//!
//! // Serve subscribers
//! let server = Server::new(backend);
//! server.subscribe(&request, &mut stream)?;
//! ```

pub mod acl;
pub mod context;
pub mod error;
pub mod stream;
pub mod subscribe;
pub mod types;

// Re-exports
pub use acl::{Authorizer, Decision};
pub use context::Context;
pub use error::{BoxError, Code, ContextError, Result, StreamError, SubscribeError};
pub use stream::{
    Event, EventPublisher, Payload, PublisherConfig, Snapshot, SnapshotHandlers, SubscribeRequest,
    Subscription, SubscriptionId,
};
pub use subscribe::{Backend, EventStream, Server, ServerStream, StateChangeClient};
pub use types::*;
