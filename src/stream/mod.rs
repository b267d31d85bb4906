//! Snapshot-then-tail event streams.
//!
//! This module provides the publish/subscribe core:
//! - [`EventPublisher`] owns one buffer per topic and key, appends published
//!   events to it and builds snapshots on demand
//! - [`Subscription`] is a cursor into one buffer
//!
//! A new subscriber first receives the snapshot produced by the topic's
//! handler, then an end-of-snapshot sentinel, then every event published
//! afterwards, in publish order. Buffers nobody reads are kept for
//! [`PublisherConfig::idle_buffer_ttl`] so a returning subscriber can reuse
//! the snapshot.
//!
//! # Example
//!
//! ```ignore
//! let handlers = SnapshotHandlers::new().with(Topic::ServiceHealth, |req| {
//!     Ok(Snapshot { events: catalog.service_health(&req.key), index: catalog.index() })
//! });
//! let publisher = EventPublisher::new(handlers, PublisherConfig::default());
//!
//! let ctx = Context::new();
//! let driver = publisher.clone();
//! let run_ctx = ctx.clone();
//! std::thread::spawn(move || driver.run(&run_ctx));
//!
//! let mut sub = publisher.subscribe(SubscribeRequest::new(Topic::ServiceHealth, "web"))?;
//! loop {
//!     match sub.next(&ctx) {
//!         Ok(event) if event.is_end_of_snapshot() => println!("now live"),
//!         Ok(event) => println!("got {:?}", event),
//!         Err(StreamError::SubscriptionClosed) => break, // resubscribe
//!         Err(e) => return Err(e),
//!     }
//! }
//! ```

mod buffer;
mod event;
mod publisher;
mod subscription;

pub use event::{Event, Payload, SubscribeRequest, Subject};
pub use publisher::{EventPublisher, PublisherConfig, Snapshot, SnapshotFn, SnapshotHandlers};
pub use subscription::{Subscription, SubscriptionId};
