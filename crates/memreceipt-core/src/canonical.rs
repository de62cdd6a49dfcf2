//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Two documents are encoded here: the canonical fact (input to the
//! fingerprint) and the receipt fields (input to the signature).
//!
//! **This encoding is frozen per version.** Changing a key name, a field
//! type or the domain prefixes below without bumping the version breaks
//! every signature issued so far.

use ciborium::value::Value;

use crate::crypto::Ed25519Signature;
use crate::error::CoreError;
use crate::fact::CanonicalFact;
use crate::key::KeyId;
use crate::receipt::{Action, Receipt, ReceiptFields};
use crate::types::Fingerprint;

/// Domain separation prefix for receipt signatures.
pub const SIGN_DOMAIN: &[u8] = b"memreceipt/receipt-sig/v1";

/// Domain separation prefix for fact fingerprints.
pub const FACT_DOMAIN: &[u8] = b"memreceipt/fact/v1";

/// Domain separation prefix for receipt ids.
pub const RECEIPT_ID_DOMAIN: &[u8] = b"memreceipt/receipt-id/v1";

/// Receipt map keys.
mod keys {
    pub const ACTION: &str = "act";
    pub const FINGERPRINT: &str = "fp";
    pub const KEY_ID: &str = "kid";
    pub const SIGNATURE: &str = "sig";
    pub const TIMESTAMP: &str = "ts";

    pub const STATEMENT: &str = "statement";
    pub const TAGS: &str = "tags";
    pub const ATTRIBUTES: &str = "attrs";
}

/// Encode receipt fields 1-4 to canonical CBOR bytes.
pub fn canonical_fields_bytes(fields: &ReceiptFields) -> Vec<u8> {
    let value = Value::Map(fields_entries(fields));
    encode_cbor_value_canonical(&value)
}

/// Build the message to sign: `SIGN_DOMAIN || canonical_fields_bytes`.
pub fn signed_message(fields: &ReceiptFields) -> Vec<u8> {
    let content = canonical_fields_bytes(fields);
    let mut msg = Vec::with_capacity(SIGN_DOMAIN.len() + content.len());
    msg.extend_from_slice(SIGN_DOMAIN);
    msg.extend_from_slice(&content);
    msg
}

/// Encode a full receipt (all five fields) to canonical CBOR bytes.
pub fn canonical_receipt_bytes(receipt: &Receipt) -> Vec<u8> {
    let mut entries = fields_entries(&receipt.fields());
    entries.push((
        Value::Text(keys::SIGNATURE.to_string()),
        Value::Bytes(receipt.signature.0.to_vec()),
    ));
    encode_cbor_value_canonical(&Value::Map(entries))
}

/// Encode a canonical fact to CBOR bytes (input to the fingerprint hash).
pub fn canonical_fact_bytes(fact: &CanonicalFact) -> Vec<u8> {
    let attributes = fact
        .attributes
        .iter()
        .map(|(k, v)| (Value::Text(k.clone()), Value::Text(v.clone())))
        .collect();

    let entries = vec![
        (
            Value::Text(keys::STATEMENT.to_string()),
            Value::Text(fact.statement.clone()),
        ),
        (
            Value::Text(keys::TAGS.to_string()),
            Value::Array(fact.tags.iter().cloned().map(Value::Text).collect()),
        ),
        (
            Value::Text(keys::ATTRIBUTES.to_string()),
            Value::Map(attributes),
        ),
    ];

    encode_cbor_value_canonical(&Value::Map(entries))
}

fn fields_entries(fields: &ReceiptFields) -> Vec<(Value, Value)> {
    vec![
        (
            Value::Text(keys::FINGERPRINT.to_string()),
            Value::Bytes(fields.fingerprint.0.to_vec()),
        ),
        (
            Value::Text(keys::ACTION.to_string()),
            Value::Text(fields.action.as_str().to_string()),
        ),
        (
            Value::Text(keys::TIMESTAMP.to_string()),
            Value::Integer(fields.timestamp.into()),
        ),
        (
            Value::Text(keys::KEY_ID.to_string()),
            Value::Text(fields.key_id.as_str().to_string()),
        ),
    ]
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
///
/// Only the value kinds produced by this module are supported.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        _ => panic!("unsupported CBOR value in canonical encoding"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n = i128::from(i);

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode a receipt from canonical CBOR bytes.
///
/// Decoding is strict: the map must hold exactly the five receipt fields,
/// and the input must be byte-identical to its canonical re-encoding.
pub fn decode_receipt(bytes: &[u8]) -> Result<Receipt, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let map = match &value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedReceipt("expected map".into())),
    };

    if map.len() != 5 {
        return Err(CoreError::MalformedReceipt(format!(
            "expected 5 fields, found {}",
            map.len()
        )));
    }

    let get = |key: &str| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Text(s) if s == key))
            .map(|(_, v)| v)
    };

    let fingerprint = match get(keys::FINGERPRINT) {
        Some(Value::Bytes(b)) => Fingerprint::try_from(b.as_slice())
            .map_err(|_| CoreError::MalformedReceipt("invalid fingerprint length".into()))?,
        _ => return Err(CoreError::MalformedReceipt("missing fingerprint".into())),
    };

    let action = match get(keys::ACTION) {
        Some(Value::Text(s)) => Action::parse(s)
            .ok_or_else(|| CoreError::MalformedReceipt(format!("unknown action: {}", s)))?,
        _ => return Err(CoreError::MalformedReceipt("missing action".into())),
    };

    let timestamp = match get(keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i64::try_from(i128::from(*i))
            .map_err(|_| CoreError::MalformedReceipt("timestamp out of range".into()))?,
        _ => return Err(CoreError::MalformedReceipt("missing timestamp".into())),
    };

    let key_id = match get(keys::KEY_ID) {
        Some(Value::Text(s)) => KeyId::new(s.clone())?,
        _ => return Err(CoreError::MalformedReceipt("missing key id".into())),
    };

    let signature = match get(keys::SIGNATURE) {
        Some(Value::Bytes(b)) if b.len() == 64 => {
            let mut arr = [0u8; 64];
            arr.copy_from_slice(b);
            Ed25519Signature(arr)
        }
        _ => return Err(CoreError::MalformedReceipt("invalid signature".into())),
    };

    let receipt = ReceiptFields {
        fingerprint,
        action,
        timestamp,
        key_id,
    }
    .into_receipt(signature);

    if canonical_receipt_bytes(&receipt) != bytes {
        return Err(CoreError::MalformedReceipt("non-canonical encoding".into()));
    }

    Ok(receipt)
}
