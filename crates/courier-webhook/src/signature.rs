// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical body encoding and HMAC-SHA256 signatures.
//!
//! The signed bytes are the exact request body: compact JSON with object
//! keys sorted at every level. Receivers recompute the HMAC over the raw
//! body they received and compare with [`verify_signature`].

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use courier_core::CourierError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

const SCHEME_PREFIX: &str = "sha256=";

/// Compact JSON with lexicographically sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex HMAC-SHA256 of `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, CourierError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CourierError::Internal(format!("invalid signing key: {e}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Value of [`SIGNATURE_HEADER`]: `sha256=<hex>`.
pub fn signature_header(secret: &str, body: &[u8]) -> Result<String, CourierError> {
    Ok(format!("{SCHEME_PREFIX}{}", sign(secret, body)?))
}

/// Constant-time check of a `sha256=<hex>` header against `body`.
///
/// Returns `false` for a missing scheme prefix or malformed hex.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(digest) = header.trim().strip_prefix(SCHEME_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn keys_sorted_at_every_level() {
        let value = json!({"z": 1, "a": {"y": [ {"b": true, "a": null} ], "x": "s"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"x":"s","y":[{"a":null,"b":true}]},"z":1}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!({"k\"": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"k\"":"line\nbreak"}"#);
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn header_round_trip_and_rejections() {
        let body = br#"{"event":"message.sent"}"#;
        let header = signature_header("s3cret", body).unwrap();
        assert!(header.starts_with("sha256="));
        assert!(verify_signature("s3cret", body, &header));
        assert!(!verify_signature("other", body, &header));
        assert!(!verify_signature("s3cret", b"{}", &header));
        assert!(!verify_signature("s3cret", body, &header["sha256=".len()..]));
        assert!(!verify_signature("s3cret", body, "sha256=zz"));
    }

    proptest! {
        #[test]
        fn any_tampered_byte_fails(
            secret in "[a-zA-Z0-9]{1,32}",
            body in proptest::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
        ) {
            let header = signature_header(&secret, &body).unwrap();
            prop_assert!(verify_signature(&secret, &body, &header));

            let mut tampered = body.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= 0x01;
            prop_assert!(!verify_signature(&secret, &tampered, &header));
        }

        #[test]
        fn canonical_form_ignores_insertion_order(
            entries in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16),
        ) {
            let forward: serde_json::Map<String, Value> =
                entries.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reverse: serde_json::Map<String, Value> =
                entries.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();
            prop_assert_eq!(
                canonical_json(&Value::Object(forward)),
                canonical_json(&Value::Object(reverse))
            );
        }
    }
}
