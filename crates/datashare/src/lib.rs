//! Cross-process data sharing over Unix sockets.
//!
//! A consumer application runs SQL-like (select, insert, update, delete)
//! and key-value map (get, set, add, remove) operations against data owned
//! by a provider application. Requests and responses travel as
//! length-prefixed messages on one socket per provider; tabular results
//! come back in a paged columnar encoding read through a random-access
//! cursor.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-socket I/O and Unix domain sockets
//! - [`frame`]: message envelopes and request block layout
//! - [`cursor`]: result-set and value-list codecs, the result cursor
//! - [`peer`]: consumer and provider dispatchers
//! - [`memory`]: an in-memory provider backed by a JSON dataset

/// Re-export transport types.
pub mod transport {
    pub use datashare_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use datashare_frame::*;
}

/// Re-export cursor types.
pub mod cursor {
    pub use datashare_cursor::*;
}

/// Re-export peer types.
pub mod peer {
    pub use datashare_peer::*;
}

pub mod memory;
