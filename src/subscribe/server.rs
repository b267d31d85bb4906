//! The subscribe server: serves one streaming call per subscriber.

use crate::acl::Authorizer;
use crate::context::Context;
use crate::error::{StreamError, SubscribeError};
use crate::stream::{self, Subscription};
use std::sync::Arc;
use tracing::{trace, trace_span};

use super::filter::filter_by_auth;
use super::logger::EventLogger;
use super::wire;

/// Outgoing half of a served call.
pub trait ServerStream {
    /// Cancelled when the caller goes away.
    fn context(&self) -> &Context;
    fn send(&mut self, event: wire::Event) -> Result<(), SubscribeError>;
}

/// Incoming half of a call made to a peer.
pub trait EventStream {
    /// Next event from the peer. The stream ends only with an error.
    fn recv(&mut self) -> Result<wire::Event, SubscribeError>;
}

/// Client for a peer's subscribe endpoint.
pub trait StateChangeClient {
    fn subscribe(
        &self,
        ctx: &Context,
        req: &wire::SubscribeRequest,
    ) -> Result<Box<dyn EventStream + '_>, SubscribeError>;
}

/// Collaborators the server depends on.
pub trait Backend {
    /// Resolve a token to its permissions. `Ok(None)` means ACLs are disabled.
    fn resolve_token(&self, token: &str) -> Result<Option<Arc<dyn Authorizer>>, SubscribeError>;

    /// Run `call` against the server for `datacenter` if it is not this one.
    ///
    /// Returns `Ok(false)` without calling `call` when the request should be
    /// served locally, otherwise `call`'s outcome with `true`.
    fn forward<F>(&self, datacenter: &str, call: F) -> Result<bool, SubscribeError>
    where
        F: FnOnce(&dyn StateChangeClient) -> Result<(), SubscribeError>;

    fn subscribe(&self, req: stream::SubscribeRequest) -> Result<Subscription, StreamError>;
}

/// Accepts subscribe calls and streams the matching events.
pub struct Server<B> {
    backend: B,
}

impl<B: Backend> Server<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Serve one subscribe call until it fails.
    ///
    /// Calls for another datacenter are relayed verbatim to that
    /// datacenter's servers, which apply their own ACL filtering; nothing is
    /// filtered here. Local calls resolve the token, subscribe, and send every
    /// event the token may read. A server-side reset ends the call with
    /// [`SubscribeError::Aborted`]; the call never ends successfully on its own.
    pub fn subscribe<S>(&self, req: &wire::SubscribeRequest, stream: &mut S) -> Result<(), SubscribeError>
    where
        S: ServerStream + ?Sized,
    {
        let span = trace_span!(
            "subscribe",
            topic = %req.topic,
            key = %req.key,
            index = req.index,
            dc = %req.datacenter
        );
        let _enter = span.enter();

        let handled = self
            .backend
            .forward(&req.datacenter, |client| forward_to_dc(req, &mut *stream, client))?;
        if handled {
            return Ok(());
        }

        trace!("new subscription");
        let result = self.serve_local(req, stream);
        trace!("subscription closed");
        result
    }

    fn serve_local<S>(&self, req: &wire::SubscribeRequest, stream: &mut S) -> Result<(), SubscribeError>
    where
        S: ServerStream + ?Sized,
    {
        // TODO: end the stream when the resolved token expires instead of
        // waiting for a token-change reset.
        let authz = self.backend.resolve_token(&req.token)?;

        let stream_req = req.to_stream_request();
        let mut sub = self.backend.subscribe(stream_req.clone())?;
        let ctx = stream.context().clone();

        let mut elog = EventLogger::default();
        loop {
            let event = match sub.next(&ctx) {
                Ok(event) => event,
                Err(e) if e.is_closed() => {
                    trace!("subscription reset by server");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            let Some(event) = filter_by_auth(authz.as_deref(), &event) else {
                continue;
            };

            elog.trace(&event);
            stream.send(wire::Event::from_stream(&stream_req, &event))?;
        }
    }
}

fn forward_to_dc<S>(
    req: &wire::SubscribeRequest,
    stream: &mut S,
    client: &dyn StateChangeClient,
) -> Result<(), SubscribeError>
where
    S: ServerStream + ?Sized,
{
    trace!("forwarding to another DC");
    let result = relay(req, stream, client);
    trace!("forwarded stream closed");
    result
}

fn relay<S>(
    req: &wire::SubscribeRequest,
    stream: &mut S,
    client: &dyn StateChangeClient,
) -> Result<(), SubscribeError>
where
    S: ServerStream + ?Sized,
{
    let ctx = stream.context().clone();
    let mut remote = client.subscribe(&ctx, req)?;
    loop {
        let event = remote.recv()?;
        stream.send(event)?;
    }
}
