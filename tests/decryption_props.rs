#[path = "common/mod.rs"]
mod common;

use archive_qc::crypto::{decrypt_stats, derive_key_iv, encrypt_stats, SALT_MAGIC};
use archive_qc::stats::GcHistogram;
use archive_qc::DecryptionError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;

proptest! {
    #[test]
    fn round_trip_reproduces_plaintext(
        plaintext in "[ -~\n\t]{0,300}",
        password in proptest::collection::vec(any::<u8>(), 1..32),
        salt in any::<[u8; 8]>(),
    ) {
        let sealed = encrypt_stats(&plaintext, &password, salt).expect("round trip encrypts");
        let opened = decrypt_stats(&sealed, &password).expect("round trip decrypts");
        prop_assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_magic_never_yields_plaintext(
        magic in any::<[u8; 8]>().prop_filter("not the salt marker", |m| m != SALT_MAGIC),
        body in proptest::collection::vec(any::<u8>(), 16..64),
    ) {
        let mut raw = magic.to_vec();
        raw.extend_from_slice(&body);
        let sealed = common::gzip(STANDARD.encode(&raw).as_bytes());
        prop_assert!(matches!(
            decrypt_stats(&sealed, b"pw"),
            Err(DecryptionError::MissingSaltHeader)
        ));
    }
}

#[test]
fn multi_block_stats_survive_round_trip() {
    let text = "SN\traw total sequences:\t1000\nGCF\t30.0\t1\nGCL\t40.0\t3\n";
    assert!(text.len() > 16);
    let sealed = encrypt_stats(text, b"archive-key", *b"saltsalt").unwrap();
    let opened = decrypt_stats(&sealed, b"archive-key").unwrap();
    assert_eq!(opened, text);
    assert_eq!(GcHistogram::from_stats_text(&opened).mean(), Some(37.5));
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[test]
fn key_derivation_matches_openssl() {
    // openssl enc -aes-256-cbc -md md5 -pass pass:password -S 0001020304050607 -P
    let (key, iv) = derive_key_iv(b"password", &[0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(
        hex(&key),
        "b03096345e805d3aa4392d2e72791dfb13e12d3f61094a3fc347ace86b99ada6"
    );
    assert_eq!(hex(&iv), "acde38b46073eef81840283e44a4b22a");
}

#[test]
fn wrong_password_is_a_failure() {
    let sealed = encrypt_stats("GCF\t40.0\t10\n", b"right", *b"12345678").unwrap();
    assert!(decrypt_stats(&sealed, b"wrong").is_err());
}
