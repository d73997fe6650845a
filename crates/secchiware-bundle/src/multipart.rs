// crates/secchiware-bundle/src/multipart.rs
// ============================================================================
// Module: Multipart Extraction
// Description: Minimal multipart/form-data parser for bundle uploads.
// Purpose: Extract the single `packages` part after digest verification.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Bundle uploads travel as `multipart/form-data` with a single part named
//! `packages`. The request digest covers the raw body, so receivers parse
//! the body only after signature and digest verification succeed. The
//! encoder builds the exact framing the parser handles: CRLF-delimited parts
//! with a `Content-Disposition` name, emitted deterministically so the same
//! bundle always signs to the same digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Multipart part name carrying bundle bytes.
pub const BUNDLE_PART_NAME: &str = "packages";
/// Boundary used for locally encoded bundle uploads.
pub const BUNDLE_BOUNDARY: &str = "secchiware-bundle";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while extracting a multipart part.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultipartError {
    /// Content type is not multipart/form-data with a boundary.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    /// Body framing violated the multipart grammar.
    #[error("malformed multipart body: {0}")]
    Malformed(String),
    /// The named part was not present.
    #[error("missing multipart part: {0}")]
    MissingPart(String),
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Returns the `Content-Type` value matching [`encode_bundle_body`].
#[must_use]
pub fn bundle_content_type() -> String {
    format!("multipart/form-data; boundary={BUNDLE_BOUNDARY}")
}

/// Encodes a bundle as a deterministic multipart body.
#[must_use]
pub fn encode_bundle_body(bundle: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bundle.len() + 256);
    body.extend_from_slice(format!("--{BUNDLE_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{BUNDLE_PART_NAME}\"; \
             filename=\"bundle.tar.gz\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/gzip\r\n\r\n");
    body.extend_from_slice(bundle);
    body.extend_from_slice(format!("\r\n--{BUNDLE_BOUNDARY}--\r\n").as_bytes());
    body
}

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Parses the boundary parameter from a `Content-Type` header value.
///
/// # Errors
///
/// Returns [`MultipartError::UnsupportedMediaType`] when the value is not
/// `multipart/form-data` with a boundary parameter.
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mut parts = content_type.split(';');
    let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    if media_type != "multipart/form-data" {
        return Err(MultipartError::UnsupportedMediaType(media_type));
    }
    for parameter in parts {
        let Some((name, value)) = parameter.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            if value.is_empty() {
                return Err(MultipartError::UnsupportedMediaType(
                    "empty multipart boundary".to_string(),
                ));
            }
            return Ok(value.to_string());
        }
    }
    Err(MultipartError::UnsupportedMediaType("missing multipart boundary".to_string()))
}

/// Extracts the bytes of the named part from a multipart body.
///
/// # Errors
///
/// Returns [`MultipartError`] when the framing is invalid or the part is
/// absent.
pub fn extract_part(
    body: &[u8],
    boundary: &str,
    part_name: &str,
) -> Result<Vec<u8>, MultipartError> {
    let delimiter = format!("--{boundary}");
    let mut cursor = 0_usize;
    // Skip any preamble before the first delimiter.
    let first = find(body, delimiter.as_bytes(), cursor)
        .ok_or_else(|| MultipartError::Malformed("missing opening boundary".to_string()))?;
    cursor = first + delimiter.len();
    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        let Some(after_crlf) = strip_crlf(body, cursor) else {
            return Err(MultipartError::Malformed("boundary not followed by crlf".to_string()));
        };
        cursor = after_crlf;
        let headers_end = find(body, b"\r\n\r\n", cursor)
            .ok_or_else(|| MultipartError::Malformed("part headers unterminated".to_string()))?;
        let headers = String::from_utf8_lossy(&body[cursor..headers_end]).to_string();
        let content_start = headers_end + 4;
        let next = find(body, delimiter.as_bytes(), content_start)
            .ok_or_else(|| MultipartError::Malformed("missing closing boundary".to_string()))?;
        // Content ends before the CRLF preceding the next delimiter.
        let content_end = next
            .checked_sub(2)
            .filter(|end| *end >= content_start && &body[*end..next] == b"\r\n")
            .ok_or_else(|| MultipartError::Malformed("part content unterminated".to_string()))?;
        if part_has_name(&headers, part_name) {
            return Ok(body[content_start..content_end].to_vec());
        }
        cursor = next + delimiter.len();
    }
    Err(MultipartError::MissingPart(part_name.to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Finds a needle in the haystack starting at `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

/// Consumes a CRLF at the cursor, returning the following offset.
fn strip_crlf(body: &[u8], cursor: usize) -> Option<usize> {
    if body[cursor..].starts_with(b"\r\n") { Some(cursor + 2) } else { None }
}

/// Returns true when the part headers carry the wanted form name.
fn part_has_name(headers: &str, part_name: &str) -> bool {
    let quoted = format!("name=\"{part_name}\"");
    let bare = format!("name={part_name}");
    headers.lines().any(|line| {
        line.to_ascii_lowercase().starts_with("content-disposition")
            && (line.contains(&quoted) || line.contains(&bare))
    })
}

#[cfg(test)]
mod tests;
