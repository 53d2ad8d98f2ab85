//! Response messages.
//!
//! Payload layout: a bundle block (`request_type`, `request_id`,
//! `provider_id`, `data_id`, `result`, `error`) followed by a body whose
//! shape depends on the operation:
//! - Select: result-set bytes
//! - Insert: the new row id as an `i64` LE
//! - MapGet: a value list
//! - everything else, and every failed result: empty

use bytes::{Buf, BufMut, Bytes, BytesMut};
use datashare_cursor::{decode_result_set, decode_value_list, DecodeOptions, ResultCursor};
use datashare_frame::{get_block, put_block};

use crate::bundle::{
    Bundle, KEY_DATA_ID, KEY_ERROR, KEY_PROVIDER_ID, KEY_REQUEST_ID, KEY_REQUEST_TYPE, KEY_RESULT,
};
use crate::error::{PeerError, Result};
use crate::request::{OperationKind, ProviderRef};

/// Message delivered for every request that fails because its channel did.
pub const PROVIDER_IO_ERROR: &str = "provider I/O Error";

/// Message sent for operations the provider does not implement.
pub const NOT_SUPPORTED: &str = "operation not supported";

/// Message sent in place of a response that would exceed the message cap.
pub const RESULT_TOO_LARGE: &str = "result exceeds message cap";

/// Header fields of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub kind: OperationKind,
    pub request_id: i32,
    pub provider: ProviderRef,
    pub success: bool,
    pub error: Option<String>,
}

impl ResponseHeader {
    fn to_bundle(&self) -> Bundle {
        let mut bundle = Bundle::new();
        bundle.insert_str(KEY_REQUEST_TYPE, self.kind.code().to_string());
        bundle.insert_str(KEY_REQUEST_ID, self.request_id.to_string());
        bundle.insert_str(KEY_PROVIDER_ID, self.provider.provider_id.as_str());
        bundle.insert_str(KEY_DATA_ID, self.provider.data_id.as_str());
        bundle.insert_str(KEY_RESULT, if self.success { "1" } else { "0" });
        if let Some(error) = &self.error {
            bundle.insert_str(KEY_ERROR, error.as_str());
        }
        bundle
    }

    fn from_bundle(bundle: &Bundle) -> Result<Self> {
        Ok(Self {
            kind: OperationKind::from_code(bundle.require_i32(KEY_REQUEST_TYPE)?)?,
            request_id: bundle.require_i32(KEY_REQUEST_ID)?,
            provider: ProviderRef {
                provider_id: bundle.require_str(KEY_PROVIDER_ID)?.to_string(),
                data_id: bundle.get_str(KEY_DATA_ID).unwrap_or_default().to_string(),
            },
            success: bundle.require_str(KEY_RESULT)? == "1",
            error: bundle.get_str(KEY_ERROR).map(str::to_string),
        })
    }
}

/// Encode a response payload.
pub fn encode_response(header: &ResponseHeader, body: &[u8]) -> Result<Bytes> {
    let bundle = header.to_bundle().encode()?;
    let mut dst = BytesMut::with_capacity(4 + bundle.len() + body.len());
    put_block(&mut dst, &bundle)?;
    dst.put_slice(body);
    Ok(dst.freeze())
}

/// Body of an insert response.
pub fn encode_row_id(row_id: i64) -> Bytes {
    Bytes::copy_from_slice(&row_id.to_le_bytes())
}

/// Split a response payload into its header and undecoded body.
pub fn decode_response_header(mut payload: Bytes) -> Result<(ResponseHeader, Bytes)> {
    let bundle = get_block(&mut payload)?;
    let header = ResponseHeader::from_bundle(&Bundle::decode(&bundle)?)?;
    Ok((header, payload))
}

/// Decoded body of a response.
#[derive(Debug)]
pub enum ResponsePayload {
    /// Select result, to be released by the receiver.
    Cursor(ResultCursor),
    /// Row id assigned by an insert.
    RowId(i64),
    /// Map get values.
    Values(Vec<String>),
    /// Operations that only report success, and every failure.
    None,
}

impl ResponsePayload {
    /// Decode `body` according to the operation the request performed.
    pub fn decode(kind: OperationKind, mut body: Bytes, options: &DecodeOptions) -> Result<Self> {
        match kind {
            OperationKind::Select => Ok(ResponsePayload::Cursor(decode_result_set(
                &mut body.reader(),
                options,
            )?)),
            OperationKind::Insert => {
                if body.remaining() < 8 {
                    return Err(PeerError::invalid("insert response without row id"));
                }
                Ok(ResponsePayload::RowId(body.get_i64_le()))
            }
            OperationKind::MapGet => Ok(ResponsePayload::Values(decode_value_list(
                &mut body.reader(),
            )?)),
            _ => Ok(ResponsePayload::None),
        }
    }

    pub fn into_cursor(self) -> Option<ResultCursor> {
        match self {
            ResponsePayload::Cursor(cursor) => Some(cursor),
            _ => None,
        }
    }
}

/// A response as delivered to the consumer's handler.
#[derive(Debug)]
pub struct Response {
    pub request_id: i32,
    pub kind: OperationKind,
    pub provider: ProviderRef,
    /// False when the provider reported failure or the channel failed.
    pub provider_result: bool,
    pub error: Option<String>,
    pub payload: ResponsePayload,
}

impl Response {
    /// Synthetic failure for a request whose channel failed.
    pub fn channel_failed(request_id: i32, kind: OperationKind, provider: ProviderRef) -> Self {
        Self::failed(request_id, kind, provider, PROVIDER_IO_ERROR)
    }

    pub(crate) fn failed(
        request_id: i32,
        kind: OperationKind,
        provider: ProviderRef,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            kind,
            provider,
            provider_result: false,
            error: Some(error.into()),
            payload: ResponsePayload::None,
        }
    }
}

/// Receives every response a consumer resolves.
pub trait ResponseHandler {
    fn on_response(&mut self, response: Response);
}

impl<F: FnMut(Response)> ResponseHandler for F {
    fn on_response(&mut self, response: Response) {
        self(response)
    }
}
