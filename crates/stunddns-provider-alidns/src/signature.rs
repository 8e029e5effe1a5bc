//! Alibaba Cloud RPC request signing (signature version 1.0)
//!
//! ```text
//! canonical     = sorted "k=v" pairs, both sides percent-encoded, joined by '&'
//! StringToSign  = "GET&%2F&" + percentEncode(canonical)
//! Signature     = base64(HMAC-SHA1(secret + "&", StringToSign))
//! ```

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;

use stunddns_core::{Error, Result};

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters stay as-is, everything else is encoded
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode one query component the way the API expects
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, UNRESERVED).to_string()
}

/// Sorted, encoded `k=v&k=v` query string
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(params: &BTreeMap<String, String>) -> String {
    format!("GET&%2F&{}", percent_encode(&canonical_query(params)))
}

/// Base64 HMAC-SHA1 signature of `params`
pub fn sign(params: &BTreeMap<String, String>, access_key_secret: &str) -> Result<String> {
    let key = format!("{}&", access_key_secret);
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| Error::provider("alidns", format!("Invalid signing key: {}", e)))?;
    mac.update(string_to_sign(params).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Full signed query string, ready to append after `?`
pub fn signed_query(params: &BTreeMap<String, String>, access_key_secret: &str) -> Result<String> {
    let signature = sign(params, access_key_secret)?;
    Ok(format!(
        "{}&Signature={}",
        canonical_query(params),
        percent_encode(&signature)
    ))
}
