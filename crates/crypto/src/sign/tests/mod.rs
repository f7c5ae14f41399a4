// Path: crates/crypto/src/sign/tests/mod.rs
use super::*;

const NETWORK_ID: &[u8] = b"isaac-test-network";

#[test]
fn test_sign_verify_every_kind() {
    for kind in [KeyKind::Btc, KeyKind::Ether, KeyKind::Stellar] {
        let key = Privatekey::generate(kind);
        let signature = key.sign(b"payload", NETWORK_ID).unwrap();
        assert!(key
            .publickey()
            .verify(b"payload", NETWORK_ID, &signature)
            .is_ok());
    }
}

#[test]
fn test_signature_is_bound_to_network_id() {
    let key = Privatekey::generate(KeyKind::Stellar);
    let signature = key.sign(b"payload", NETWORK_ID).unwrap();
    let err = key
        .publickey()
        .verify(b"payload", b"another-network", &signature)
        .unwrap_err();
    assert_eq!(err, CryptoError::VerificationFailed);
}

#[test]
fn test_text_form_roundtrip() {
    let key = Privatekey::generate(KeyKind::Btc);
    let text = key.to_text().unwrap();
    assert!(text.ends_with("~btc"));

    let loaded: Privatekey = text.parse().unwrap();
    assert_eq!(loaded.publickey(), key.publickey());

    let public_text = key.publickey().to_string();
    let public: Publickey = public_text.parse().unwrap();
    assert_eq!(public, key.publickey());
}

#[test]
fn test_rejects_unknown_kind() {
    let key = Privatekey::generate(KeyKind::Ether);
    let text = key.publickey().to_string().replace("~ether", "~dogecoin");
    assert!(matches!(
        text.parse::<Publickey>(),
        Err(CryptoError::InvalidKey(_))
    ));
    assert!("no-separator".parse::<Publickey>().is_err());
}

#[test]
fn test_signature_serde_forms() {
    let key = Privatekey::generate(KeyKind::Stellar);
    let signature = key.sign(b"x", NETWORK_ID).unwrap();

    let json = serde_json::to_string(&signature).unwrap();
    assert!(json.starts_with('"'));
    let back: Signature = serde_json::from_str(&json).unwrap();
    assert_eq!(back, signature);

    let raw = bincode::serialize(&signature).unwrap();
    let back: Signature = bincode::deserialize(&raw).unwrap();
    assert_eq!(back, signature);
}
