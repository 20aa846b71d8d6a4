//! Environment overrides for configuration
//!
//! Kept in its own test binary: it mutates process environment variables.

use acton_ingest::config::IngestConfig;
use std::io::Write;

#[test]
fn test_env_overrides_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "[coordinator]\nmax_concurrent_transfers = 2\n\n[security_log]\nenabled = true\n"
    )
    .unwrap();

    std::env::set_var("ACTON_COORDINATOR__MAX_CONCURRENT_TRANSFERS", "9");
    std::env::set_var("ACTON_SECURITY_LOG__ENABLED", "false");

    let config = IngestConfig::load_from(file.path()).unwrap();

    std::env::remove_var("ACTON_COORDINATOR__MAX_CONCURRENT_TRANSFERS");
    std::env::remove_var("ACTON_SECURITY_LOG__ENABLED");

    assert_eq!(config.coordinator.max_concurrent_transfers, 9);
    assert!(!config.security_log.enabled);
    assert_eq!(
        config.storage.upload_url,
        "http://localhost:3000/files/upload"
    );
}
