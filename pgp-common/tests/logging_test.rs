use pgp_common::compact_ids::short_key_label;
use pgp_common::logging::{Component, LogLevel, Logger, LoggingConfig};

#[test]
fn test_logging_config_installs_once() {
    let config = LoggingConfig::new()
        .with_default_level(LogLevel::Debug)
        .for_tests();
    // The first install may or may not win depending on test ordering in this
    // binary; the second one must always report an existing logger.
    let _ = config.apply();
    assert!(!config.apply());

    let logger = Logger::new_root(Component::Keys, "0011223344556677");
    logger.debug("debug line");
    logger.info_args(format_args!("info {}", 1));
    logger.with_subject("uid:bob").warn("warning line");
}

#[test]
fn test_short_key_label_uses_trailing_bytes() {
    let fingerprint: Vec<u8> = (0u8..20).collect();
    assert_eq!(short_key_label(&fingerprint), "0C0D0E0F10111213");
    assert_eq!(short_key_label(&[0xAB, 0xCD]), "ABCD");
}
