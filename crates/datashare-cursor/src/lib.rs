//! Result-set and value-list codecs for datashare.
//!
//! A provider turns a [`RowSource`] into wire bytes with
//! [`encode_result_set`], applying the page window before any row body is
//! written. A consumer streams those bytes through [`decode_result_set`],
//! which mirrors them into a [`BackingStore`] and returns a
//! [`ResultCursor`] for first/last/next/previous navigation and typed
//! cell reads.
//!
//! Map "get" responses use the simpler [`value_list`] layout.

pub mod cell;
pub mod cursor;
pub mod encode;
pub mod error;
pub mod page;
pub mod source;
pub mod store;
pub mod value_list;

pub use cell::{CellType, Value};
pub use cursor::{decode_result_set, DecodeOptions, Position, ResultCursor};
pub use encode::{encode_result_set, NO_DATA};
pub use error::{CursorError, Result};
pub use page::PageWindow;
pub use source::{MemoryRows, RowSource};
pub use store::{BackingStore, StoreKind};
pub use value_list::{decode_value_list, encode_value_list};
