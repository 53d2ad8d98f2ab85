//! Consumer side: sends requests, correlates responses by request id.

use std::time::{Duration, Instant};

use bytes::Bytes;
use datashare_cursor::{DecodeOptions, PageWindow};
use tracing::{debug, info, warn};

use crate::activator::{launch_with_retry, Activator};
use crate::bundle::Bundle;
use crate::channel::{Channel, ChannelMap};
use crate::config::ConsumerConfig;
use crate::error::{PeerError, Result};
use crate::readiness::Readiness;
use crate::registry::{new_request_id, PendingRequest, RequestRegistry};
use crate::request::{
    encode_hello, encode_request, DeleteRequest, InsertRequest, MapGetRequest, MapSetRequest,
    MapValueRequest, ProviderRef, Request, SelectRequest, UpdateRequest,
};
use crate::response::{decode_response_header, Response, ResponseHandler, ResponsePayload};

/// Issues requests to providers and delivers their responses.
///
/// Every request resolves exactly once through the handler: with the
/// provider's response, or with a synthetic failure when its channel fails
/// or is closed.
pub struct Consumer<A: Activator> {
    caller_id: String,
    config: ConsumerConfig,
    activator: A,
    channels: ChannelMap,
    registry: RequestRegistry,
    readiness: Readiness,
    handler: Box<dyn ResponseHandler>,
}

impl<A: Activator> Consumer<A> {
    pub fn new(
        caller_id: impl Into<String>,
        activator: A,
        handler: impl ResponseHandler + 'static,
    ) -> Self {
        Self::with_config(caller_id, activator, handler, ConsumerConfig::default())
    }

    pub fn with_config(
        caller_id: impl Into<String>,
        activator: A,
        handler: impl ResponseHandler + 'static,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            caller_id: caller_id.into(),
            config,
            activator,
            channels: ChannelMap::new(),
            registry: RequestRegistry::new(),
            readiness: Readiness::new(),
            handler: Box::new(handler),
        }
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn activator_mut(&mut self) -> &mut A {
        &mut self.activator
    }

    /// Requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_pending(&self, request_id: i32) -> bool {
        self.registry.contains(request_id)
    }

    pub fn has_channel(&self, provider_id: &str) -> bool {
        self.channels.contains(provider_id)
    }

    /// Query `columns` of a table, one page at a time.
    pub fn select(
        &mut self,
        provider: &ProviderRef,
        columns: &[&str],
        where_clause: Option<&str>,
        order: Option<&str>,
        window: PageWindow,
    ) -> Result<i32> {
        if columns.is_empty() {
            return Err(PeerError::invalid("select needs at least one column"));
        }
        self.send(
            provider,
            Request::Select(SelectRequest {
                columns: columns.iter().map(|column| column.to_string()).collect(),
                where_clause: where_clause.map(str::to_string),
                order: order.map(str::to_string),
                window,
            }),
        )
    }

    pub fn insert(&mut self, provider: &ProviderRef, values: Bundle) -> Result<i32> {
        if values.is_empty() {
            return Err(PeerError::invalid("insert needs at least one column value"));
        }
        self.send(provider, Request::Insert(InsertRequest { values }))
    }

    pub fn update(
        &mut self,
        provider: &ProviderRef,
        values: Bundle,
        where_clause: Option<&str>,
    ) -> Result<i32> {
        if values.is_empty() {
            return Err(PeerError::invalid("update needs at least one column value"));
        }
        self.send(
            provider,
            Request::Update(UpdateRequest {
                values,
                where_clause: where_clause.map(str::to_string),
            }),
        )
    }

    pub fn delete(&mut self, provider: &ProviderRef, where_clause: Option<&str>) -> Result<i32> {
        self.send(
            provider,
            Request::Delete(DeleteRequest {
                where_clause: where_clause.map(str::to_string),
            }),
        )
    }

    pub fn map_get(&mut self, provider: &ProviderRef, key: &str, window: PageWindow) -> Result<i32> {
        require_key(key)?;
        self.send(
            provider,
            Request::MapGet(MapGetRequest {
                key: key.to_string(),
                window,
            }),
        )
    }

    pub fn map_set(
        &mut self,
        provider: &ProviderRef,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<i32> {
        require_key(key)?;
        self.send(
            provider,
            Request::MapSet(MapSetRequest {
                key: key.to_string(),
                old_value: old_value.to_string(),
                new_value: new_value.to_string(),
            }),
        )
    }

    pub fn map_add(&mut self, provider: &ProviderRef, key: &str, value: &str) -> Result<i32> {
        require_key(key)?;
        self.send(provider, Request::MapAdd(map_value(key, value)))
    }

    pub fn map_remove(&mut self, provider: &ProviderRef, key: &str, value: &str) -> Result<i32> {
        require_key(key)?;
        self.send(provider, Request::MapRemove(map_value(key, value)))
    }

    /// Send any typed request and return its id.
    ///
    /// A failed write evicts the channel, fails whatever else was pending
    /// on it, and retries on a fresh channel up to `send_attempts` times.
    pub fn send(&mut self, provider: &ProviderRef, request: Request) -> Result<i32> {
        let request_id = unused_request_id(&self.registry, new_request_id);
        let kind = request.kind();
        let payload = encode_request(&self.caller_id, provider, request_id, &request)?;
        let key = provider.provider_id.clone();

        let attempts = self.config.send_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_payload(&key, &payload) {
                Ok(()) => break,
                Err(err) if err.is_channel_failure() => {
                    warn!(
                        request_id,
                        peer = %key,
                        attempt,
                        error = %err,
                        "send failed, evicting channel"
                    );
                    self.fail_channel(&key);
                    if attempt >= attempts {
                        return Err(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        let registered = self.registry.register(
            request_id,
            PendingRequest {
                kind,
                channel_key: key,
                provider: provider.clone(),
            },
        );
        if !registered {
            return Err(PeerError::invalid(format!(
                "request id {request_id} is already pending"
            )));
        }
        debug!(request_id, %kind, provider = %provider.provider_id, "request sent");
        Ok(request_id)
    }

    fn send_payload(&mut self, key: &str, payload: &Bytes) -> Result<()> {
        self.channel_for(key)?.send(payload)
    }

    /// Look up the channel for `provider_id`, activating the provider and
    /// opening one if none exists.
    fn channel_for(&mut self, provider_id: &str) -> Result<&mut Channel> {
        if !self.channels.contains(provider_id) {
            launch_with_retry(
                &mut self.activator,
                &self.caller_id,
                provider_id,
                self.config.launch_attempts,
                self.config.launch_backoff,
            )?;
            let stream = self.activator.connect(&self.caller_id, provider_id)?;
            let mut channel =
                Channel::open(provider_id, stream, &self.config.message, &mut self.readiness)?;
            if let Err(err) = channel.send(&encode_hello(&self.caller_id, provider_id)?) {
                channel.close(&mut self.readiness);
                return Err(err);
            }
            info!(peer = provider_id, "channel established");
            self.channels.insert(channel);
        }
        self.channels
            .get_mut(provider_id)
            .ok_or_else(|| PeerError::invalid(format!("no channel for {provider_id}")))
    }

    /// Tear down the channel for `provider_id` and fail its pending
    /// requests. Returns how many requests were failed.
    fn fail_channel(&mut self, provider_id: &str) -> usize {
        if let Some(channel) = self.channels.remove(provider_id) {
            channel.close(&mut self.readiness);
        }
        let drained = self.registry.drain_all(provider_id);
        let count = drained.len();
        for (request_id, pending) in drained {
            self.handler
                .on_response(Response::channel_failed(request_id, pending.kind, pending.provider));
        }
        count
    }

    /// Explicitly unregister the channel for `provider_id`.
    ///
    /// Requests still pending on it resolve with the channel-failure
    /// response. Returns how many there were.
    pub fn close_channel(&mut self, provider_id: &str) -> usize {
        debug!(peer = provider_id, "closing channel");
        self.fail_channel(provider_id)
    }

    /// Wait for channel activity and deliver every response it carries.
    ///
    /// Returns how many requests were resolved.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let events = self.readiness.wait(timeout)?;
        let mut resolved = 0;
        for event in events {
            let Some(key) = self.channels.key_for(event.token).map(str::to_string) else {
                continue;
            };
            resolved += self.on_readable(&key);
        }
        Ok(resolved)
    }

    fn on_readable(&mut self, key: &str) -> usize {
        let Some(channel) = self.channels.get_mut(key) else {
            return 0;
        };
        match channel.recv() {
            Ok(payload) => usize::from(self.dispatch(payload)),
            Err(err) => {
                if matches!(&err, PeerError::Frame(frame) if frame.is_closed()) {
                    debug!(peer = key, "provider closed channel");
                } else {
                    warn!(peer = key, error = %err, "channel read failed");
                }
                self.fail_channel(key)
            }
        }
    }

    /// Decode one response and hand it to the handler.
    fn dispatch(&mut self, payload: Bytes) -> bool {
        let (header, body) = match decode_response_header(payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(error = %err, "dropping undecodable response");
                return false;
            }
        };
        let request_id = header.request_id;
        let Some(pending) = self.registry.remove(request_id) else {
            warn!(request_id, "dropping response for unknown request");
            return false;
        };
        if pending.kind != header.kind {
            warn!(request_id, expected = %pending.kind, got = %header.kind, "response kind mismatch");
        }

        let kind = pending.kind;
        let response = if header.success {
            let options = DecodeOptions {
                store: self.config.store,
                ..DecodeOptions::default()
            };
            match ResponsePayload::decode(kind, body, &options) {
                Ok(payload) => Response {
                    request_id,
                    kind,
                    provider: pending.provider,
                    provider_result: true,
                    error: header.error,
                    payload,
                },
                Err(err) => {
                    warn!(request_id, error = %err, "malformed response body");
                    Response::failed(
                        request_id,
                        kind,
                        pending.provider,
                        format!("malformed {kind} response: {err}"),
                    )
                }
            }
        } else {
            let error = header
                .error
                .unwrap_or_else(|| "provider reported failure".to_string());
            Response::failed(request_id, kind, pending.provider, error)
        };

        debug!(request_id, %kind, success = response.provider_result, "response delivered");
        self.handler.on_response(response);
        true
    }

    /// Poll until `request_id` resolves or `response_timeout` passes.
    pub fn wait_for(&mut self, request_id: i32) -> Result<()> {
        let timeout = self.config.response_timeout;
        let deadline = Instant::now() + timeout;
        while self.registry.contains(request_id) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PeerError::Timeout(timeout));
            }
            self.poll_once(Some(remaining))?;
        }
        Ok(())
    }
}

impl<A: Activator> Drop for Consumer<A> {
    fn drop(&mut self) {
        let keys: Vec<String> = self.channels.keys().map(str::to_string).collect();
        for key in keys {
            self.fail_channel(&key);
        }
    }
}

/// Draw ids from `next` until one is not pending in `registry`.
fn unused_request_id(registry: &RequestRegistry, mut next: impl FnMut() -> i32) -> i32 {
    loop {
        let request_id = next();
        if !registry.contains(request_id) {
            return request_id;
        }
    }
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(PeerError::invalid("map key is empty"));
    }
    Ok(())
}

fn map_value(key: &str, value: &str) -> MapValueRequest {
    MapValueRequest {
        key: key.to_string(),
        value: value.to_string(),
    }
}
