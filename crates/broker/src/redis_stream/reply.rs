//! Parsers for raw Redis Streams replies.
//!
//! Replies are walked by hand rather than through `redis::streams` so that
//! payload bytes are never forced through UTF-8 and deleted entries (which
//! `XAUTOCLAIM` reports as nil on some server versions) can be skipped.

use redis::Value;

use crate::error::{BrokerError, BrokerResult};

/// Stream field holding the publisher's dedup key.
pub(crate) const FIELD_MSG_ID: &str = "msg_id";

/// Stream field holding the message payload.
pub(crate) const FIELD_PAYLOAD: &str = "payload";

/// One stream entry as stored by the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamEntry {
    pub id: String,
    pub dedup_key: String,
    pub payload: Vec<u8>,
}

fn protocol(msg: impl Into<String>) -> BrokerError {
    BrokerError::Protocol(msg.into())
}

fn as_array<'a>(value: &'a Value, what: &str) -> BrokerResult<&'a [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(protocol(format!("Expected array for {what}, got {other:?}"))),
    }
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(bytes) => Some(bytes.clone()),
        Value::SimpleString(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

/// Parse `[id, [field, value, ...]]`.
///
/// Returns `None` for a nil entry. Missing fields yield an empty dedup key
/// or payload; the consumer treats such an entry as undecodable.
pub(crate) fn parse_entry(value: &Value) -> BrokerResult<Option<StreamEntry>> {
    let entry = match value {
        Value::Nil => return Ok(None),
        other => as_array(other, "stream entry")?,
    };
    if entry.len() < 2 {
        return Err(protocol("Stream entry too short"));
    }

    let id = as_string(&entry[0])
        .ok_or_else(|| protocol(format!("Expected string for entry id, got {:?}", entry[0])))?;

    let fields = match &entry[1] {
        // Entry deleted after it was delivered
        Value::Nil => return Ok(None),
        other => as_array(other, "entry fields")?,
    };

    let mut dedup_key = String::new();
    let mut payload = Vec::new();
    for pair in fields.chunks_exact(2) {
        match as_string(&pair[0]).as_deref() {
            Some(FIELD_MSG_ID) => dedup_key = as_string(&pair[1]).unwrap_or_default(),
            Some(FIELD_PAYLOAD) => payload = as_bytes(&pair[1]).unwrap_or_default(),
            _ => {}
        }
    }

    Ok(Some(StreamEntry {
        id,
        dedup_key,
        payload,
    }))
}

fn parse_entries(value: &Value) -> BrokerResult<Vec<StreamEntry>> {
    let mut entries = Vec::new();
    for item in as_array(value, "entries")? {
        if let Some(entry) = parse_entry(item)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Parse an `XREADGROUP` reply: `[[stream_key, [entry, ...]], ...]`.
///
/// A nil reply means the block timeout expired.
pub(crate) fn parse_read_reply(value: &Value) -> BrokerResult<Vec<StreamEntry>> {
    let streams = match value {
        Value::Nil => return Ok(Vec::new()),
        other => as_array(other, "XREADGROUP reply")?,
    };

    let mut entries = Vec::new();
    for stream in streams {
        let stream = as_array(stream, "stream")?;
        if stream.len() < 2 {
            return Err(protocol("Stream reply too short"));
        }
        entries.extend(parse_entries(&stream[1])?);
    }
    Ok(entries)
}

/// Parse an `XAUTOCLAIM` reply: `[next_cursor, [entry, ...], [deleted_id, ...]]`.
///
/// The third element only exists on Redis 7+.
pub(crate) fn parse_autoclaim_reply(value: &Value) -> BrokerResult<(String, Vec<StreamEntry>)> {
    let reply = as_array(value, "XAUTOCLAIM reply")?;
    if reply.len() < 2 {
        return Err(protocol("XAUTOCLAIM reply too short"));
    }
    let cursor = as_string(&reply[0]).ok_or_else(|| protocol("Expected string cursor"))?;
    Ok((cursor, parse_entries(&reply[1])?))
}

/// Parse the delivery count out of an extended `XPENDING` reply for one id:
/// `[[id, consumer, idle_ms, delivery_count]]`.
///
/// Returns `None` when the entry is no longer pending.
pub(crate) fn parse_delivery_count(value: &Value) -> BrokerResult<Option<u32>> {
    let rows = as_array(value, "XPENDING reply")?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let row = as_array(row, "XPENDING row")?;
    match row.get(3) {
        Some(Value::Int(count)) => Ok(Some(u32::try_from(*count).unwrap_or(u32::MAX))),
        other => Err(protocol(format!(
            "Expected integer delivery count, got {other:?}"
        ))),
    }
}
