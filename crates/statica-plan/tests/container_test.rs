//! Container round-trips through the filesystem and damage detection.

use statica_plan::{DIGEST_LEN, HEADER_LEN, Layer, PlanBuilder, PlanError, RUNTIME_VERSION, decode};
use std::io::Write;

/// A plan written to disk decodes to the same program.
#[test]
fn test_plan_file_round_trip() {
    let program = PlanBuilder::pool_dense_classifier([1, 3, 16, 16], [1, 10], 7).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&program.encode()).unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    let decoded = decode(&bytes).unwrap();

    assert_eq!(decoded.header.runtime_version, RUNTIME_VERSION);
    assert_eq!(decoded.program, program);
    assert!(matches!(decoded.program.layers[0], Layer::GlobalAvgPool { channels: 3, spatial: 256 }));
}

/// Cutting the file anywhere short of its full length is detected.
#[test]
fn test_truncation_at_every_boundary() {
    let program = PlanBuilder::identity([1, 3, 4, 4], [1, 8]).unwrap();
    let bytes = program.encode();
    let body_end = bytes.len() - DIGEST_LEN;

    for cut in [0, 1, 7, 8, 12, 16, HEADER_LEN - 1, HEADER_LEN, body_end, bytes.len() - 1] {
        let err = decode(&bytes[..cut]).unwrap_err();
        assert!(
            matches!(err, PlanError::Truncated { .. }),
            "cut at {cut} should be truncated, got {err}"
        );
    }
}

/// A body that decodes but whose layers don't chain is rejected as invalid.
#[test]
fn test_inconsistent_body_rejected() {
    let program = PlanBuilder::identity([1, 3, 4, 4], [1, 8]).unwrap();
    let mut proto = program.to_proto();
    proto.output_shape = vec![1, 9];

    let body = prost::Message::encode_to_vec(&proto);
    let mut bytes = program.encode();
    let header = bytes[..HEADER_LEN].to_vec();
    bytes.clear();
    bytes.extend_from_slice(&header);
    bytes[16..24].copy_from_slice(&(body.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&body);
    bytes.extend_from_slice(&<sha2::Sha256 as sha2::Digest>::digest(&body));

    assert!(matches!(decode(&bytes), Err(PlanError::Invalid(_))));
}

/// Random bytes with a valid-looking header fail in the body.
#[test]
fn test_garbage_body_rejected() {
    let program = PlanBuilder::identity([1, 3, 4, 4], [1, 8]).unwrap();
    let mut bytes = program.encode();
    for b in &mut bytes[HEADER_LEN..] {
        *b = 0xA5;
    }
    let err = decode(&bytes).unwrap_err();
    assert!(matches!(err, PlanError::DigestMismatch));
}

/// Dimensions whose product overflows are rejected, not multiplied.
#[test]
fn test_overflowing_shape_rejected() {
    let program = PlanBuilder::identity([1, 3, 4, 4], [1, 8]).unwrap();
    let mut proto = program.to_proto();
    proto.input_shape = vec![1 << 33, 1 << 33, 1 << 33];

    let body = prost::Message::encode_to_vec(&proto);
    let mut bytes = program.encode()[..HEADER_LEN].to_vec();
    bytes[16..24].copy_from_slice(&(body.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&body);
    bytes.extend_from_slice(&<sha2::Sha256 as sha2::Digest>::digest(&body));

    let err = decode(&bytes).unwrap_err();
    assert!(
        matches!(&err, PlanError::Invalid(msg) if msg.contains("overflows")),
        "got {err}"
    );
}
