//! Domain messages and delegated-authorization wrapping

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Type URL of the authz execute-as-granter message
pub const MSG_EXEC_TYPE_URL: &str = "/cosmos.authz.v1beta1.MsgExec";

/// Packed message: type URL plus protobuf-encoded value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Any {
    pub type_url: String,
    pub value: Vec<u8>,
}

/// A ledger message the client can carry in a transaction
pub trait Msg: fmt::Debug + Send + Sync {
    fn type_url(&self) -> &str;

    /// Stateless well-formedness check, run before any network call
    fn validate_basic(&self) -> Result<(), String>;

    /// Protobuf encoding of the message body
    fn encode_value(&self) -> Vec<u8>;

    fn to_any(&self) -> Any {
        Any {
            type_url: self.type_url().to_string(),
            value: self.encode_value(),
        }
    }
}

/// Shared handle to a message
pub type MsgRef = Arc<dyn Msg>;

/// Runs `msgs` with the authority of a granter; signed by the grantee
#[derive(Debug, Clone)]
pub struct MsgExec {
    pub grantee: String,
    pub msgs: Vec<MsgRef>,
}

impl MsgExec {
    pub fn new(grantee: impl Into<String>, msgs: Vec<MsgRef>) -> Self {
        Self {
            grantee: grantee.into(),
            msgs,
        }
    }
}

impl Msg for MsgExec {
    fn type_url(&self) -> &str {
        MSG_EXEC_TYPE_URL
    }

    fn validate_basic(&self) -> Result<(), String> {
        if self.grantee.is_empty() {
            return Err("invalid grantee address: empty".to_string());
        }
        if self.msgs.is_empty() {
            return Err("messages cannot be empty".to_string());
        }
        Ok(())
    }

    fn encode_value(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_len_delimited(&mut buf, 1, self.grantee.as_bytes());
        for msg in &self.msgs {
            let any = encode_any(&msg.to_any());
            // repeated fields are written even when the element is empty
            put_key(&mut buf, 2, WIRE_LEN);
            put_varint(&mut buf, any.len() as u64);
            buf.extend_from_slice(&any);
        }
        buf
    }
}

/// Replace `msgs` by a single exec message when acting for a granter
pub fn wrap_for_granter(grantee: &str, msgs: &[MsgRef], granter: Option<&str>) -> Vec<MsgRef> {
    match granter {
        Some(_) => vec![Arc::new(MsgExec::new(grantee, msgs.to_vec())) as MsgRef],
        None => msgs.to_vec(),
    }
}

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
pub(crate) const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

pub(crate) fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

pub(crate) fn put_key(buf: &mut Vec<u8>, field: u64, wire_type: u64) {
    put_varint(buf, (field << 3) | wire_type);
}

/// Length-delimited scalar; proto3 omits it when empty
pub(crate) fn put_len_delimited(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// One decoded protobuf field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldValue<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    /// fixed32 and fixed64 fields, which nothing here needs to read
    Fixed,
}

fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64, String> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = *buf.get(*pos).ok_or("truncated varint")?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte < 0x80 {
            return Ok(value);
        }
    }
    Err("varint overflow".to_string())
}

fn take<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], String> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or("truncated field")?;
    let bytes = &buf[*pos..end];
    *pos = end;
    Ok(bytes)
}

/// Top-level fields of a protobuf message, in wire order
pub(crate) fn read_fields(buf: &[u8]) -> Result<Vec<(u64, FieldValue<'_>)>, String> {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let key = read_varint(buf, &mut pos)?;
        let value = match key & 0x7 {
            WIRE_VARINT => FieldValue::Varint(read_varint(buf, &mut pos)?),
            WIRE_FIXED64 => {
                take(buf, &mut pos, 8)?;
                FieldValue::Fixed
            }
            WIRE_LEN => {
                let len = usize::try_from(read_varint(buf, &mut pos)?)
                    .map_err(|_| "field length overflow".to_string())?;
                FieldValue::Bytes(take(buf, &mut pos, len)?)
            }
            WIRE_FIXED32 => {
                take(buf, &mut pos, 4)?;
                FieldValue::Fixed
            }
            other => return Err(format!("unsupported wire type {}", other)),
        };
        fields.push((key >> 3, value));
    }
    Ok(fields)
}

fn encode_any(any: &Any) -> Vec<u8> {
    let mut buf = Vec::new();
    put_len_delimited(&mut buf, 1, any.type_url.as_bytes());
    put_len_delimited(&mut buf, 2, &any.value);
    buf
}
