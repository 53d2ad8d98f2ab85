//! Typed requests and their positional wire form.
//!
//! On the wire a request is a bundle carrying the caller, provider and
//! data ids, the operation code, the caller's request id and an `arg`
//! string array whose positions mean different things per operation:
//!
//! | Operation  | `arg`                                                        | extra block   |
//! |------------|--------------------------------------------------------------|---------------|
//! | Select     | `data_id, n, col_0..col_{n-1}, where, order, page, count`    |               |
//! | Insert     | `data_id`                                                    | column values |
//! | Update     | `data_id, where`                                             | column values |
//! | Delete     | `data_id, where`                                             |               |
//! | MapGet     | `data_id, key, page, count`                                  |               |
//! | MapSet     | `data_id, key, old_value, new_value`                         |               |
//! | MapAdd     | `data_id, key, value`                                        |               |
//! | MapRemove  | `data_id, key, value`                                        |               |
//!
//! `"NULL"` in a `where` or `order` slot means the clause is absent. Past
//! [`decode_request`] nothing sees positional arrays.

use bytes::Bytes;
use datashare_cursor::PageWindow;
use datashare_frame::RequestBlocks;
use serde::{Deserialize, Serialize};

use crate::bundle::{
    Bundle, KEY_ARG, KEY_CALLER_ID, KEY_DATA_ID, KEY_PROVIDER_ID, KEY_REQUEST_ID, KEY_REQUEST_TYPE,
};
use crate::error::{PeerError, Result};

/// Cap on the total size of one request's arguments: 1 MiB.
pub const MAX_REQUEST_ARGUMENT_SIZE: usize = 1024 * 1024;

/// Placeholder for an absent `where` or `order` clause.
pub const NULL_CLAUSE: &str = "NULL";

/// The operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    MapGet,
    MapSet,
    MapAdd,
    MapRemove,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::Select,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::MapGet,
        OperationKind::MapSet,
        OperationKind::MapAdd,
        OperationKind::MapRemove,
    ];

    /// Operation code carried in the `request_type` field.
    pub fn code(self) -> i32 {
        match self {
            OperationKind::Select => 1,
            OperationKind::Insert => 2,
            OperationKind::Update => 3,
            OperationKind::Delete => 4,
            OperationKind::MapGet => 5,
            OperationKind::MapSet => 6,
            OperationKind::MapAdd => 7,
            OperationKind::MapRemove => 8,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| PeerError::invalid(format!("unknown request type {code}")))
    }

    pub fn is_map(self) -> bool {
        matches!(
            self,
            OperationKind::MapGet
                | OperationKind::MapSet
                | OperationKind::MapAdd
                | OperationKind::MapRemove
        )
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationKind::Select => "select",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::MapGet => "map_get",
            OperationKind::MapSet => "map_set",
            OperationKind::MapAdd => "map_add",
            OperationKind::MapRemove => "map_remove",
        };
        f.write_str(name)
    }
}

/// Identifies a target data endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderRef {
    pub provider_id: String,
    pub data_id: String,
}

impl ProviderRef {
    pub fn new(provider_id: impl Into<String>, data_id: impl Into<String>) -> Result<Self> {
        let provider = Self {
            provider_id: provider_id.into(),
            data_id: data_id.into(),
        };
        if provider.provider_id.is_empty() {
            return Err(PeerError::invalid("provider id is empty"));
        }
        if provider.data_id.is_empty() {
            return Err(PeerError::invalid("data id is empty"));
        }
        Ok(provider)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectRequest {
    pub columns: Vec<String>,
    pub where_clause: Option<String>,
    pub order: Option<String>,
    pub window: PageWindow,
}

/// Column values travel in the extra block as their own bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertRequest {
    pub values: Bundle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub values: Bundle,
    pub where_clause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub where_clause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapGetRequest {
    pub key: String,
    pub window: PageWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapSetRequest {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
}

/// Shared by map add and map remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapValueRequest {
    pub key: String,
    pub value: String,
}

/// A decoded request, one variant per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Select(SelectRequest),
    Insert(InsertRequest),
    Update(UpdateRequest),
    Delete(DeleteRequest),
    MapGet(MapGetRequest),
    MapSet(MapSetRequest),
    MapAdd(MapValueRequest),
    MapRemove(MapValueRequest),
}

impl Request {
    pub fn kind(&self) -> OperationKind {
        match self {
            Request::Select(_) => OperationKind::Select,
            Request::Insert(_) => OperationKind::Insert,
            Request::Update(_) => OperationKind::Update,
            Request::Delete(_) => OperationKind::Delete,
            Request::MapGet(_) => OperationKind::MapGet,
            Request::MapSet(_) => OperationKind::MapSet,
            Request::MapAdd(_) => OperationKind::MapAdd,
            Request::MapRemove(_) => OperationKind::MapRemove,
        }
    }

    /// Page window for operations that return paged data.
    pub fn window(&self) -> Option<PageWindow> {
        match self {
            Request::Select(select) => Some(select.window),
            Request::MapGet(get) => Some(get.window),
            _ => None,
        }
    }

    /// Positional `arg` array, starting with `data_id`.
    pub fn to_args(&self, data_id: &str) -> Vec<String> {
        let mut args = vec![data_id.to_string()];
        match self {
            Request::Select(select) => {
                args.push(select.columns.len().to_string());
                args.extend(select.columns.iter().cloned());
                args.push(clause_arg(&select.where_clause));
                args.push(clause_arg(&select.order));
                args.push(select.window.page_number.to_string());
                args.push(select.window.count_per_page.to_string());
            }
            Request::Insert(_) => {}
            Request::Update(update) => args.push(clause_arg(&update.where_clause)),
            Request::Delete(delete) => args.push(clause_arg(&delete.where_clause)),
            Request::MapGet(get) => {
                args.push(get.key.clone());
                args.push(get.window.page_number.to_string());
                args.push(get.window.count_per_page.to_string());
            }
            Request::MapSet(set) => {
                args.push(set.key.clone());
                args.push(set.old_value.clone());
                args.push(set.new_value.clone());
            }
            Request::MapAdd(value) | Request::MapRemove(value) => {
                args.push(value.key.clone());
                args.push(value.value.clone());
            }
        }
        args
    }

    fn extra(&self) -> Option<&Bundle> {
        match self {
            Request::Insert(insert) => Some(&insert.values),
            Request::Update(update) => Some(&update.values),
            _ => None,
        }
    }

    /// Rebuild a typed request from its positional form.
    ///
    /// Returns the `data_id` found at position 0 along with the request.
    pub fn from_args(
        kind: OperationKind,
        args: &[String],
        extra: Option<&[u8]>,
    ) -> Result<(String, Request)> {
        let mut args = Args::new(kind, args);
        let data_id = args.next()?.to_string();
        let request = match kind {
            OperationKind::Select => {
                let count = args.next_i32()?;
                let count = usize::try_from(count)
                    .map_err(|_| PeerError::invalid(format!("negative column count {count}")))?;
                let columns = (0..count)
                    .map(|_| args.next().map(str::to_string))
                    .collect::<Result<Vec<_>>>()?;
                Request::Select(SelectRequest {
                    columns,
                    where_clause: args.next_clause()?,
                    order: args.next_clause()?,
                    window: args.next_window()?,
                })
            }
            OperationKind::Insert => Request::Insert(InsertRequest {
                values: extra_bundle(kind, extra)?,
            }),
            OperationKind::Update => Request::Update(UpdateRequest {
                where_clause: args.next_clause()?,
                values: extra_bundle(kind, extra)?,
            }),
            OperationKind::Delete => Request::Delete(DeleteRequest {
                where_clause: args.next_clause()?,
            }),
            OperationKind::MapGet => Request::MapGet(MapGetRequest {
                key: args.next()?.to_string(),
                window: args.next_window()?,
            }),
            OperationKind::MapSet => Request::MapSet(MapSetRequest {
                key: args.next()?.to_string(),
                old_value: args.next()?.to_string(),
                new_value: args.next()?.to_string(),
            }),
            OperationKind::MapAdd => Request::MapAdd(args.next_map_value()?),
            OperationKind::MapRemove => Request::MapRemove(args.next_map_value()?),
        };
        Ok((data_id, request))
    }
}

fn clause_arg(clause: &Option<String>) -> String {
    match clause {
        Some(clause) if !clause.is_empty() => clause.clone(),
        _ => NULL_CLAUSE.to_string(),
    }
}

fn extra_bundle(kind: OperationKind, extra: Option<&[u8]>) -> Result<Bundle> {
    let extra = extra.ok_or_else(|| PeerError::invalid(format!("{kind} request without column values")))?;
    Bundle::decode(extra)
}

/// Cursor over a positional argument array.
struct Args<'a> {
    kind: OperationKind,
    items: &'a [String],
    next: usize,
}

impl<'a> Args<'a> {
    fn new(kind: OperationKind, items: &'a [String]) -> Self {
        Self {
            kind,
            items,
            next: 0,
        }
    }

    fn next(&mut self) -> Result<&'a str> {
        let item = self.items.get(self.next).ok_or_else(|| {
            PeerError::invalid(format!(
                "{} request has {} arguments, missing position {}",
                self.kind,
                self.items.len(),
                self.next
            ))
        })?;
        self.next += 1;
        Ok(item)
    }

    fn next_i32(&mut self) -> Result<i32> {
        let raw = self.next()?;
        raw.parse()
            .map_err(|_| PeerError::invalid(format!("{} argument is not an integer: {raw}", self.kind)))
    }

    fn next_clause(&mut self) -> Result<Option<String>> {
        let raw = self.next()?;
        Ok((raw != NULL_CLAUSE && !raw.is_empty()).then(|| raw.to_string()))
    }

    fn next_window(&mut self) -> Result<PageWindow> {
        let page_number = self.next_i32()?;
        let count_per_page = self.next_i32()?;
        Ok(PageWindow::new(page_number, count_per_page)?)
    }

    fn next_map_value(&mut self) -> Result<MapValueRequest> {
        Ok(MapValueRequest {
            key: self.next()?.to_string(),
            value: self.next()?.to_string(),
        })
    }
}

/// Build the payload of a request message.
pub fn encode_request(
    caller_id: &str,
    provider: &ProviderRef,
    request_id: i32,
    request: &Request,
) -> Result<Bytes> {
    let args = request.to_args(&provider.data_id);
    let mut bundle = Bundle::new();
    bundle.insert_str(KEY_CALLER_ID, caller_id);
    bundle.insert_str(KEY_PROVIDER_ID, provider.provider_id.as_str());
    bundle.insert_str(KEY_DATA_ID, provider.data_id.as_str());
    bundle.insert_str(KEY_REQUEST_TYPE, request.kind().code().to_string());
    bundle.insert_str(KEY_REQUEST_ID, request_id.to_string());
    bundle.insert_array(KEY_ARG, args);

    let mut blocks = RequestBlocks::new(bundle.encode()?);
    if let Some(extra) = request.extra() {
        blocks = blocks.with_extra(extra.encode()?);
    }
    let size = blocks.bundle.len() + blocks.extra.as_ref().map_or(0, Bytes::len);
    if size > MAX_REQUEST_ARGUMENT_SIZE {
        return Err(PeerError::MaxExceeded {
            size,
            max: MAX_REQUEST_ARGUMENT_SIZE,
        });
    }
    Ok(blocks.encode()?)
}

/// Build the first-contact payload a consumer sends on a fresh channel.
pub fn encode_hello(caller_id: &str, provider_id: &str) -> Result<Bytes> {
    let mut bundle = Bundle::new();
    bundle.insert_str(KEY_CALLER_ID, caller_id);
    bundle.insert_str(KEY_PROVIDER_ID, provider_id);
    Ok(RequestBlocks::new(bundle.encode()?).encode()?)
}

/// A request message as the provider sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingFrame {
    /// First contact: no operation marker, only the caller's identity.
    Hello { caller_id: String },
    /// A full request.
    Request(IncomingRequest),
}

/// A decoded request along with its addressing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub caller_id: String,
    pub provider: ProviderRef,
    pub request_id: i32,
    pub request: Request,
}

/// Header fields of a request that could not be fully decoded.
///
/// Enough to answer the caller with an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRequest {
    pub caller_id: String,
    pub provider_id: String,
    pub data_id: String,
    pub request_id: i32,
    pub kind: OperationKind,
    pub reason: String,
}

/// Outcome of decoding a request payload.
#[derive(Debug)]
pub enum DecodedFrame {
    Frame(IncomingFrame),
    /// The header was readable but the arguments were not.
    Rejected(RejectedRequest),
}

/// Decode a request payload.
///
/// Errors mean even the header was unreadable; the frame must be dropped.
pub fn decode_request(payload: Bytes) -> Result<DecodedFrame> {
    let blocks = RequestBlocks::decode(payload)?;
    let bundle = Bundle::decode(&blocks.bundle)?;
    let caller_id = bundle.require_str(KEY_CALLER_ID)?.to_string();

    if !bundle.contains_key(KEY_REQUEST_TYPE) {
        return Ok(DecodedFrame::Frame(IncomingFrame::Hello { caller_id }));
    }

    let kind = OperationKind::from_code(bundle.require_i32(KEY_REQUEST_TYPE)?)?;
    let request_id = bundle.require_i32(KEY_REQUEST_ID)?;
    let provider_id = bundle.require_str(KEY_PROVIDER_ID)?.to_string();

    let decoded = bundle
        .get_array(KEY_ARG)
        .ok_or_else(|| PeerError::invalid(format!("missing bundle field '{KEY_ARG}'")))
        .and_then(|args| Request::from_args(kind, args, blocks.extra.as_deref()));

    match decoded {
        Ok((data_id, request)) => Ok(DecodedFrame::Frame(IncomingFrame::Request(
            IncomingRequest {
                caller_id,
                provider: ProviderRef {
                    provider_id,
                    data_id,
                },
                request_id,
                request,
            },
        ))),
        Err(err) => Ok(DecodedFrame::Rejected(RejectedRequest {
            caller_id,
            provider_id,
            data_id: bundle.get_str(KEY_DATA_ID).unwrap_or_default().to_string(),
            request_id,
            kind,
            reason: err.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderRef {
        ProviderRef::new("org.example.provider", "contacts").unwrap()
    }

    fn round_trip(request: Request) -> IncomingRequest {
        let payload = encode_request("org.example.consumer", &provider(), 42, &request).unwrap();
        match decode_request(payload).unwrap() {
            DecodedFrame::Frame(IncomingFrame::Request(incoming)) => incoming,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    #[test]
    fn select_arguments_are_positional() {
        let request = Request::Select(SelectRequest {
            columns: vec!["id".into(), "name".into()],
            where_clause: None,
            order: Some("id DESC".into()),
            window: PageWindow::new(2, 10).unwrap(),
        });
        assert_eq!(
            request.to_args("contacts"),
            vec!["contacts", "2", "id", "name", "NULL", "id DESC", "2", "10"]
        );

        let incoming = round_trip(request.clone());
        assert_eq!(incoming.request, request);
        assert_eq!(incoming.request_id, 42);
        assert_eq!(incoming.caller_id, "org.example.consumer");
        assert_eq!(incoming.provider, provider());
    }

    #[test]
    fn every_operation_round_trips() {
        let values: Bundle = [("name", "ada")].into_iter().collect();
        let requests = vec![
            Request::Insert(InsertRequest {
                values: values.clone(),
            }),
            Request::Update(UpdateRequest {
                values,
                where_clause: Some("id = 1".into()),
            }),
            Request::Delete(DeleteRequest { where_clause: None }),
            Request::MapGet(MapGetRequest {
                key: "colors".into(),
                window: PageWindow::new(1, 20).unwrap(),
            }),
            Request::MapSet(MapSetRequest {
                key: "colors".into(),
                old_value: "red".into(),
                new_value: "blue".into(),
            }),
            Request::MapAdd(MapValueRequest {
                key: "colors".into(),
                value: "green".into(),
            }),
            Request::MapRemove(MapValueRequest {
                key: "colors".into(),
                value: "green".into(),
            }),
        ];
        for request in requests {
            assert_eq!(round_trip(request.clone()).request, request);
        }
    }

    #[test]
    fn null_sentinel_becomes_absent_clause() {
        let args: Vec<String> = ["contacts", "NULL"].iter().map(|s| s.to_string()).collect();
        let (data_id, request) = Request::from_args(OperationKind::Delete, &args, None).unwrap();
        assert_eq!(data_id, "contacts");
        assert_eq!(request, Request::Delete(DeleteRequest { where_clause: None }));
    }

    #[test]
    fn hello_has_no_request_type() {
        let payload = encode_hello("org.example.consumer", "org.example.provider").unwrap();
        match decode_request(payload).unwrap() {
            DecodedFrame::Frame(IncomingFrame::Hello { caller_id }) => {
                assert_eq!(caller_id, "org.example.consumer")
            }
            other => panic!("expected hello, got {other:?}"),
        }
    }

    #[test]
    fn short_argument_list_is_rejected_with_header() {
        let mut bundle = Bundle::new();
        bundle.insert_str(KEY_CALLER_ID, "c");
        bundle.insert_str(KEY_PROVIDER_ID, "p");
        bundle.insert_str(KEY_DATA_ID, "d");
        bundle.insert_str(KEY_REQUEST_TYPE, OperationKind::MapSet.code().to_string());
        bundle.insert_str(KEY_REQUEST_ID, "9");
        bundle.insert_array(KEY_ARG, vec!["d".into(), "key".into()]);
        let payload = RequestBlocks::new(bundle.encode().unwrap()).encode().unwrap();

        match decode_request(payload).unwrap() {
            DecodedFrame::Rejected(rejected) => {
                assert_eq!(rejected.request_id, 9);
                assert_eq!(rejected.kind, OperationKind::MapSet);
                assert_eq!(rejected.data_id, "d");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn missing_caller_is_an_error() {
        let bundle = Bundle::new();
        let payload = RequestBlocks::new(bundle.encode().unwrap()).encode().unwrap();
        assert!(matches!(
            decode_request(payload),
            Err(PeerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn oversized_arguments_are_max_exceeded() {
        let request = Request::MapAdd(MapValueRequest {
            key: "k".into(),
            value: "x".repeat(MAX_REQUEST_ARGUMENT_SIZE),
        });
        let err = encode_request("c", &provider(), 1, &request).unwrap_err();
        assert!(matches!(err, PeerError::MaxExceeded { .. }));
    }

    #[test]
    fn operation_codes_are_stable() {
        for kind in OperationKind::ALL {
            assert_eq!(OperationKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(OperationKind::from_code(0).is_err());
        assert!(OperationKind::MapAdd.is_map());
        assert!(!OperationKind::Select.is_map());
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert!(ProviderRef::new("", "d").is_err());
        assert!(ProviderRef::new("p", "").is_err());
    }
}
