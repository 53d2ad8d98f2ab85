//! Consumer and provider dispatchers for datashare.
//!
//! A [`Consumer`] sends select/insert/update/delete and map requests to a
//! provider over one channel per provider, and delivers each response
//! exactly once to its [`ResponseHandler`]. A [`Provider`] accepts those
//! channels and hands every decoded request to a [`ProviderHandler`],
//! which answers through a [`Responder`].
//!
//! Both sides are single-threaded: call `poll_once` from your own loop, or
//! [`Provider::run_until`] for a dedicated provider thread.

pub mod activator;
pub mod bundle;
pub mod channel;
pub mod config;
pub mod consumer;
pub mod error;
pub mod provider;
pub mod readiness;
pub mod registry;
pub mod request;
pub mod response;

pub use activator::{launch_with_retry, Activator, SocketDirActivator};
pub use bundle::{Bundle, BundleValue};
pub use config::{ConsumerConfig, ProviderConfig};
pub use consumer::Consumer;
pub use error::{PeerError, Result};
pub use provider::{Provider, ProviderHandler, RequestContext, Responder};
pub use registry::new_request_id;
pub use request::{
    DeleteRequest, InsertRequest, MapGetRequest, MapSetRequest, MapValueRequest, OperationKind,
    ProviderRef, Request, SelectRequest, UpdateRequest, MAX_REQUEST_ARGUMENT_SIZE, NULL_CLAUSE,
};
pub use response::{
    Response, ResponseHandler, ResponsePayload, NOT_SUPPORTED, PROVIDER_IO_ERROR,
    RESULT_TOO_LARGE,
};
