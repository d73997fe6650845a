// crates/secchiware-bundle/src/multipart/tests.rs
// ============================================================================
// Module: Multipart Unit Tests
// Description: Unit tests for the minimal multipart parser.
// Purpose: Validate boundary parsing and part extraction framing.
// Dependencies: secchiware-bundle
// ============================================================================

//! ## Overview
//! Exercises boundary parsing and part extraction against well-formed and
//! malformed bodies.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use super::BUNDLE_BOUNDARY;
use super::BUNDLE_PART_NAME;
use super::MultipartError;
use super::bundle_content_type;
use super::encode_bundle_body;
use super::extract_part;
use super::parse_boundary;

// ============================================================================
// SECTION: Boundary Parsing
// ============================================================================

#[test]
fn parses_boundary_with_and_without_quotes() {
    assert_eq!(
        parse_boundary("multipart/form-data; boundary=secchiware").expect("boundary"),
        "secchiware"
    );
    assert_eq!(
        parse_boundary("multipart/form-data; boundary=\"secchiware\"").expect("boundary"),
        "secchiware"
    );
}

#[test]
fn rejects_non_multipart_content_types() {
    assert!(matches!(
        parse_boundary("application/json"),
        Err(MultipartError::UnsupportedMediaType(_))
    ));
    assert!(matches!(
        parse_boundary("multipart/form-data"),
        Err(MultipartError::UnsupportedMediaType(_))
    ));
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

#[test]
fn encoded_body_roundtrips_through_extraction() {
    let bundle = [0x1F_u8, 0x8B, 0x08, 0x00, 0x42];
    let body = encode_bundle_body(&bundle);
    let boundary = parse_boundary(&bundle_content_type()).expect("boundary");
    assert_eq!(boundary, BUNDLE_BOUNDARY);
    let extracted = extract_part(&body, &boundary, BUNDLE_PART_NAME).expect("extract");
    assert_eq!(extracted, bundle);
}

#[test]
fn encoding_is_deterministic() {
    let bundle = b"same bytes";
    assert_eq!(encode_bundle_body(bundle), encode_bundle_body(bundle));
}

// ============================================================================
// SECTION: Part Extraction
// ============================================================================

fn body_with_part(name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"--bound\r\n");
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"bundle.tar.gz\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/gzip\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n--bound--\r\n");
    body
}

#[test]
fn extracts_named_part_bytes() {
    let content = [0x1F_u8, 0x8B, 0x00, 0xFF];
    let body = body_with_part("packages", &content);
    let extracted = extract_part(&body, "bound", "packages").expect("extract");
    assert_eq!(extracted, content);
}

#[test]
fn reports_missing_part_by_name() {
    let body = body_with_part("other", b"data");
    assert!(matches!(
        extract_part(&body, "bound", "packages"),
        Err(MultipartError::MissingPart(name)) if name == "packages"
    ));
}

#[test]
fn rejects_bodies_without_boundary() {
    assert!(matches!(
        extract_part(b"no delimiters here", "bound", "packages"),
        Err(MultipartError::Malformed(_))
    ));
}

#[test]
fn rejects_unterminated_part() {
    let mut body = Vec::new();
    body.extend_from_slice(b"--bound\r\n");
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"packages\"\r\n\r\n");
    body.extend_from_slice(b"data without closing boundary");
    assert!(matches!(
        extract_part(&body, "bound", "packages"),
        Err(MultipartError::Malformed(_))
    ));
}
