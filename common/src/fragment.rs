use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::api_error::ApiError;
use crate::constants::{MAX_ENCODED_NAME_LEN, MAX_FILENAME_LEN, MAX_FRAGMENT_NAME_LEN};

/// Wire name of fragment `index` of `filename`. Shard nodes and reclaimed
/// uploads rely on this exact shape.
pub fn fragment_name(filename: &str, index: u64) -> String {
    format!("{}_{}", filename, index)
}

/// Filesystem-safe form of a fragment name, as laid out on a shard node.
///
/// Case is preserved: `A_0` and `a_0` are different fragments. Names whose
/// encoding would not fit in a path component fall back to `h-<blake3 hex>`;
/// encoded names never contain a raw `-`, so the two forms cannot collide.
pub fn fragment_file_name(fragment: &str) -> String {
    let encoded = utf8_percent_encode(fragment, NON_ALPHANUMERIC).to_string();
    if encoded.len() <= MAX_ENCODED_NAME_LEN {
        return encoded;
    }
    format!("h-{}", blake3::hash(fragment.as_bytes()).to_hex())
}

fn validate_name(kind: &str, name: &str, max_len: usize) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is empty", kind)));
    }
    if name.len() > max_len {
        return Err(ApiError::BadRequest(format!(
            "{} exceeds {} bytes",
            kind, max_len
        )));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ApiError::BadRequest(format!(
            "{} contains control characters",
            kind
        )));
    }
    Ok(())
}

pub fn validate_filename(filename: &str) -> Result<(), ApiError> {
    validate_name("filename", filename, MAX_FILENAME_LEN)
}

/// Pulls the `filename` query value out of an optional extractor result.
pub fn require_filename(filename: Option<String>) -> Result<String, ApiError> {
    let filename = filename.unwrap_or_default();
    validate_filename(&filename)?;
    Ok(filename)
}

/// Same as [`require_filename`], sized for fragment names on a shard node.
pub fn require_fragment_name(name: Option<String>) -> Result<String, ApiError> {
    let name = name.unwrap_or_default();
    validate_name("fragment name", &name, MAX_FRAGMENT_NAME_LEN)?;
    Ok(name)
}
