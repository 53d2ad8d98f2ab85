//! Provider side: accepts consumer channels and dispatches their requests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use datashare_cursor::{encode_result_set, encode_value_list, PageWindow, RowSource};
use datashare_transport::UnixDomainSocket;
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelMap};
use crate::config::ProviderConfig;
use crate::error::{PeerError, Result};
use crate::readiness::{Readiness, Token};
use crate::request::{
    decode_request, DecodedFrame, DeleteRequest, IncomingFrame, IncomingRequest, InsertRequest,
    MapGetRequest, MapSetRequest, MapValueRequest, OperationKind, ProviderRef, RejectedRequest,
    Request, SelectRequest, UpdateRequest,
};
use crate::response::{
    encode_response, encode_row_id, ResponseHeader, NOT_SUPPORTED, RESULT_TOO_LARGE,
};

/// Who sent a request, and the provider-local id to answer it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: i32,
    pub caller_id: String,
    pub provider: ProviderRef,
}

/// Provider callbacks, one per operation.
///
/// Each callback answers through the [`Responder`], either before
/// returning or later via [`Provider::responder`]. Returning an error while
/// the request is still unanswered sends the error to the consumer.
/// Operations left unimplemented answer "operation not supported".
pub trait ProviderHandler {
    fn on_select(
        &mut self,
        ctx: &RequestContext,
        _request: &SelectRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_insert(
        &mut self,
        ctx: &RequestContext,
        _request: &InsertRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_update(
        &mut self,
        ctx: &RequestContext,
        _request: &UpdateRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_delete(
        &mut self,
        ctx: &RequestContext,
        _request: &DeleteRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_map_get(
        &mut self,
        ctx: &RequestContext,
        _request: &MapGetRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_map_set(
        &mut self,
        ctx: &RequestContext,
        _request: &MapSetRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_map_add(
        &mut self,
        ctx: &RequestContext,
        _request: &MapValueRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }

    fn on_map_remove(
        &mut self,
        ctx: &RequestContext,
        _request: &MapValueRequest,
        responder: &mut Responder<'_>,
    ) -> Result<()> {
        responder.send_error(ctx.request_id, NOT_SUPPORTED)
    }
}

/// A received request not yet answered.
#[derive(Debug, Clone)]
struct Unanswered {
    channel_key: String,
    consumer_request_id: i32,
    kind: OperationKind,
    provider: ProviderRef,
    window: Option<PageWindow>,
}

/// Channels and unanswered requests, shared with [`Responder`].
#[derive(Debug, Default)]
struct Connections {
    readiness: Readiness,
    channels: ChannelMap,
    /// Accepted connections that have not identified their caller yet.
    anonymous: HashMap<Token, Channel>,
    unanswered: HashMap<i32, Unanswered>,
}

impl Connections {
    fn drop_channel(&mut self, key: &str) {
        if let Some(channel) = self.channels.remove(key) {
            channel.close(&mut self.readiness);
        }
        let before = self.unanswered.len();
        self.unanswered.retain(|_, request| request.channel_key != key);
        let dropped = before - self.unanswered.len();
        if dropped > 0 {
            warn!(peer = key, dropped, "caller went away with requests unanswered");
        }
    }

    fn reply(
        &mut self,
        channel_key: &str,
        header: &ResponseHeader,
        body: &[u8],
    ) -> Result<()> {
        let payload = encode_response(header, body)?;
        let Some(channel) = self.channels.get_mut(channel_key) else {
            return Err(PeerError::invalid(format!("caller {channel_key} is gone")));
        };
        match channel.send(&payload) {
            Ok(()) => {}
            Err(err) if err.is_channel_failure() => {
                warn!(peer = channel_key, error = %err, "reply failed, dropping channel");
                self.drop_channel(channel_key);
                return Err(err);
            }
            Err(err) => {
                warn!(
                    request_id = header.request_id,
                    peer = channel_key,
                    error = %err,
                    "response refused, reporting failure instead"
                );
                let failure = ResponseHeader {
                    success: false,
                    error: Some(RESULT_TOO_LARGE.to_string()),
                    ..header.clone()
                };
                let payload = encode_response(&failure, &[])?;
                if let Err(send_err) = channel.send(&payload) {
                    warn!(peer = channel_key, error = %send_err, "reply failed, dropping channel");
                    self.drop_channel(channel_key);
                    return Err(send_err);
                }
                return Err(err);
            }
        }
        debug!(
            request_id = header.request_id,
            kind = %header.kind,
            success = header.success,
            size = body.len(),
            "response sent"
        );
        Ok(())
    }
}

/// Answers requests by provider-local id.
///
/// Each request can be answered once; later attempts fail with
/// [`PeerError::UnknownRequest`].
pub struct Responder<'a> {
    connections: &'a mut Connections,
}

impl Responder<'_> {
    /// True while `request_id` has not been answered.
    pub fn is_pending(&self, request_id: i32) -> bool {
        self.connections.unanswered.contains_key(&request_id)
    }

    fn lookup(&self, request_id: i32, expected: &[OperationKind]) -> Result<&Unanswered> {
        let request = self
            .connections
            .unanswered
            .get(&request_id)
            .ok_or(PeerError::UnknownRequest(request_id))?;
        if !expected.is_empty() && !expected.contains(&request.kind) {
            return Err(PeerError::invalid(format!(
                "request {request_id} is a {} request",
                request.kind
            )));
        }
        Ok(request)
    }

    fn finish(
        &mut self,
        request_id: i32,
        success: bool,
        error: Option<String>,
        body: &[u8],
    ) -> Result<()> {
        let request = self
            .connections
            .unanswered
            .remove(&request_id)
            .ok_or(PeerError::UnknownRequest(request_id))?;
        let header = ResponseHeader {
            kind: request.kind,
            request_id: request.consumer_request_id,
            provider: request.provider,
            success,
            error,
        };
        self.connections.reply(&request.channel_key, &header, body)
    }

    /// Answer a select with the requested page of `source`.
    pub fn send_select_result(&mut self, request_id: i32, source: &mut dyn RowSource) -> Result<()> {
        let request = self.lookup(request_id, &[OperationKind::Select])?;
        let window = request.window.unwrap_or_default();
        let body = encode_result_set(source, window)?;
        self.finish(request_id, true, None, &body)
    }

    /// Answer an insert with the new row's id.
    pub fn send_insert_result(&mut self, request_id: i32, row_id: i64) -> Result<()> {
        self.lookup(request_id, &[OperationKind::Insert])?;
        self.finish(request_id, true, None, &encode_row_id(row_id))
    }

    /// Answer a map get with the requested page of `values`.
    pub fn send_map_get_result(&mut self, request_id: i32, values: &[String]) -> Result<()> {
        let request = self.lookup(request_id, &[OperationKind::MapGet])?;
        let window = request.window.unwrap_or_default();
        let body = encode_value_list(values, window)?;
        self.finish(request_id, true, None, &body)
    }

    /// Report success for an operation without a result body.
    pub fn send_success(&mut self, request_id: i32) -> Result<()> {
        self.lookup(
            request_id,
            &[
                OperationKind::Update,
                OperationKind::Delete,
                OperationKind::MapSet,
                OperationKind::MapAdd,
                OperationKind::MapRemove,
            ],
        )?;
        self.finish(request_id, true, None, &[])
    }

    /// Report failure for any request.
    pub fn send_error(&mut self, request_id: i32, message: &str) -> Result<()> {
        self.lookup(request_id, &[])?;
        self.finish(request_id, false, Some(message.to_string()), &[])
    }
}

/// Serves one provider endpoint.
pub struct Provider<H: ProviderHandler> {
    provider_id: String,
    listener: UnixDomainSocket,
    listener_token: Token,
    config: ProviderConfig,
    handler: H,
    connections: Connections,
    next_request_id: i32,
}

impl<H: ProviderHandler> Provider<H> {
    /// Bind `<dir>/<provider_id>.sock` and serve it with `handler`.
    pub fn bind(dir: impl AsRef<Path>, provider_id: &str, handler: H) -> Result<Self> {
        Self::bind_with_config(dir, provider_id, handler, ProviderConfig::default())
    }

    pub fn bind_with_config(
        dir: impl AsRef<Path>,
        provider_id: &str,
        handler: H,
        config: ProviderConfig,
    ) -> Result<Self> {
        if provider_id.is_empty() {
            return Err(PeerError::invalid("provider id is empty"));
        }
        let listener = UnixDomainSocket::bind_endpoint(dir, provider_id)?;
        let mut connections = Connections::default();
        let listener_token = connections.readiness.add(listener.as_raw_fd());
        info!(provider = provider_id, path = ?listener.path(), "provider listening");
        Ok(Self {
            provider_id: provider_id.to_string(),
            listener,
            listener_token,
            config,
            handler,
            connections,
            next_request_id: 0,
        })
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Identified caller channels.
    pub fn connection_count(&self) -> usize {
        self.connections.channels.len()
    }

    /// Requests received and not yet answered.
    pub fn unanswered_count(&self) -> usize {
        self.connections.unanswered.len()
    }

    /// Answer requests outside a handler callback.
    pub fn responder(&mut self) -> Responder<'_> {
        Responder {
            connections: &mut self.connections,
        }
    }

    /// Wait for activity and handle it. Returns the number of frames handled.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let events = self.connections.readiness.wait(timeout)?;
        let mut handled = 0;
        for event in events {
            if event.token == self.listener_token {
                self.accept();
                continue;
            }
            if self.on_readable(event.token) {
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// Serve until `stop` is set, polling at `interval`.
    pub fn run_until(&mut self, stop: &AtomicBool, interval: Duration) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            self.poll_once(Some(interval))?;
        }
        info!(provider = %self.provider_id, "provider stopped");
        Ok(())
    }

    fn accept(&mut self) {
        let stream = match self.listener.accept() {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "accept failed");
                return;
            }
        };
        match Channel::open(
            "",
            stream,
            &self.config.message,
            &mut self.connections.readiness,
        ) {
            Ok(channel) => {
                self.connections.anonymous.insert(channel.token(), channel);
            }
            Err(err) => warn!(error = %err, "failed to open accepted channel"),
        }
    }

    /// Read one frame from the channel watched by `token`.
    fn on_readable(&mut self, token: Token) -> bool {
        let received = if let Some(channel) = self.connections.anonymous.get_mut(&token) {
            channel.recv()
        } else if let Some(key) = self.connections.channels.key_for(token).map(str::to_string) {
            match self.connections.channels.get_mut(&key) {
                Some(channel) => channel.recv(),
                None => return false,
            }
        } else {
            return false;
        };

        let payload = match received {
            Ok(payload) => payload,
            Err(err) => {
                self.close_token(token, &err);
                return false;
            }
        };
        self.on_frame(token, payload);
        true
    }

    fn close_token(&mut self, token: Token, err: &PeerError) {
        if let Some(channel) = self.connections.anonymous.remove(&token) {
            debug!(error = %err, "unidentified connection closed");
            channel.close(&mut self.connections.readiness);
            return;
        }
        if let Some(key) = self.connections.channels.key_for(token).map(str::to_string) {
            if matches!(err, PeerError::Frame(frame) if frame.is_closed()) {
                debug!(peer = %key, "caller closed channel");
            } else {
                warn!(peer = %key, error = %err, "channel read failed");
            }
            self.connections.drop_channel(&key);
        }
    }

    /// Key the connection behind `token` by `caller_id`, returning the key.
    fn identify(&mut self, token: Token, caller_id: &str) -> Option<String> {
        if let Some(key) = self.connections.channels.key_for(token) {
            return Some(key.to_string());
        }
        let mut channel = self.connections.anonymous.remove(&token)?;
        channel.set_peer_key(caller_id);
        if let Some(old) = self.connections.channels.insert(channel) {
            debug!(peer = caller_id, "caller reconnected, replacing channel");
            old.close(&mut self.connections.readiness);
        }
        info!(peer = caller_id, "caller identified");
        Some(caller_id.to_string())
    }

    fn on_frame(&mut self, token: Token, payload: Bytes) {
        let frame = match decode_request(payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping undecodable request");
                return;
            }
        };
        match frame {
            DecodedFrame::Frame(IncomingFrame::Hello { caller_id }) => {
                self.identify(token, &caller_id);
            }
            DecodedFrame::Frame(IncomingFrame::Request(incoming)) => {
                let Some(key) = self.identify(token, &incoming.caller_id) else {
                    return;
                };
                if incoming.provider.provider_id != self.provider_id {
                    let rejected = RejectedRequest {
                        caller_id: incoming.caller_id,
                        provider_id: incoming.provider.provider_id.clone(),
                        data_id: incoming.provider.data_id,
                        request_id: incoming.request_id,
                        kind: incoming.request.kind(),
                        reason: format!("unknown provider {}", incoming.provider.provider_id),
                    };
                    self.reject(&key, rejected);
                    return;
                }
                self.dispatch(key, incoming);
            }
            DecodedFrame::Rejected(rejected) => {
                let Some(key) = self.identify(token, &rejected.caller_id) else {
                    return;
                };
                self.reject(&key, rejected);
            }
        }
    }

    fn reject(&mut self, channel_key: &str, rejected: RejectedRequest) {
        warn!(
            request_id = rejected.request_id,
            kind = %rejected.kind,
            reason = %rejected.reason,
            "rejecting malformed request"
        );
        let header = ResponseHeader {
            kind: rejected.kind,
            request_id: rejected.request_id,
            provider: ProviderRef {
                provider_id: rejected.provider_id,
                data_id: rejected.data_id,
            },
            success: false,
            error: Some(rejected.reason),
        };
        if let Err(err) = self.connections.reply(channel_key, &header, &[]) {
            warn!(error = %err, "failed to send rejection");
        }
    }

    fn mint_request_id(&mut self) -> i32 {
        loop {
            self.next_request_id = self.next_request_id.checked_add(1).unwrap_or(1);
            if !self.connections.unanswered.contains_key(&self.next_request_id) {
                return self.next_request_id;
            }
        }
    }

    fn dispatch(&mut self, channel_key: String, incoming: IncomingRequest) {
        let request_id = self.mint_request_id();
        let kind = incoming.request.kind();
        self.connections.unanswered.insert(
            request_id,
            Unanswered {
                channel_key,
                consumer_request_id: incoming.request_id,
                kind,
                provider: incoming.provider.clone(),
                window: incoming.request.window(),
            },
        );
        debug!(
            request_id,
            consumer_request_id = incoming.request_id,
            %kind,
            peer = %incoming.caller_id,
            "dispatching request"
        );

        let ctx = RequestContext {
            request_id,
            caller_id: incoming.caller_id,
            provider: incoming.provider,
        };
        let mut responder = Responder {
            connections: &mut self.connections,
        };
        let handler = &mut self.handler;
        let result = match &incoming.request {
            Request::Select(request) => handler.on_select(&ctx, request, &mut responder),
            Request::Insert(request) => handler.on_insert(&ctx, request, &mut responder),
            Request::Update(request) => handler.on_update(&ctx, request, &mut responder),
            Request::Delete(request) => handler.on_delete(&ctx, request, &mut responder),
            Request::MapGet(request) => handler.on_map_get(&ctx, request, &mut responder),
            Request::MapSet(request) => handler.on_map_set(&ctx, request, &mut responder),
            Request::MapAdd(request) => handler.on_map_add(&ctx, request, &mut responder),
            Request::MapRemove(request) => handler.on_map_remove(&ctx, request, &mut responder),
        };

        if let Err(err) = result {
            warn!(request_id, %kind, error = %err, "handler failed");
            if responder.is_pending(request_id) {
                if let Err(err) = responder.send_error(request_id, &err.to_string()) {
                    warn!(request_id, error = %err, "failed to report handler error");
                }
            }
        }
    }
}
