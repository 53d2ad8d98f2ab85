//! Byte-stream socket transport for datashare.
//!
//! This is the lowest layer. It provides:
//! - [`IpcStream`], a connected socket (Unix domain socket on Unix)
//! - [`UnixDomainSocket`], the listener a provider binds
//! - [`io::read_all`] / [`io::write_all`], which transfer exactly the
//!   requested number of bytes or fail, retrying transient conditions
//!   within a fixed budget
//!
//! Everything else builds on top of these.

pub mod error;
pub mod io;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{ErrorClass, Result, TransportError};
pub use io::{read_all, write_all, RETRY_BUDGET};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::{endpoint_path, UnixDomainSocket};
