// Path: crates/crypto/src/algorithms/hash/tests.rs
use super::*;

#[test]
fn test_sha256_known_vector() {
    let digest = sha256(b"abc");
    assert_eq!(
        hex::encode(digest),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn test_sha512_known_prefix() {
    assert!(hex::encode(sha512(b"abc")).starts_with("ddaf35a193617aba"));
}

#[test]
fn test_concat_matches_joined_input() {
    let joined = sha256(b"keyvalueprev");
    let parts = sha256_concat([&b"key"[..], b"value", b"prev"]);
    assert_eq!(joined, parts);
}

#[test]
fn test_empty_parts_hash_empty_input() {
    let empty: [&[u8]; 0] = [];
    assert_eq!(sha256_concat(empty), sha256(b""));
}
