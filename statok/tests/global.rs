//! Behavior of the process-wide facade.
//!
//! A single test function keeps the initialization order deterministic: the
//! global client can only be initialized once per process.

use statok::{ClientError, Config};

#[test]
fn test_facade_lifecycle() {
    // Inert before initialization: reporting is a silent no-op.
    statok::event("early", 1, &[]);
    statok::event_value("early", 1.0, &[]);
    assert!(statok::event_with_error("early", 1, &[]).is_ok());
    assert!(statok::event_value_with_error("early", 1.0, &[]).is_ok());

    // A malformed API key is rejected and leaves the facade uninitialized.
    let error = statok::init(Config::new("malformed")).unwrap_err();
    assert!(matches!(error, ClientError::Config(_)));

    // The endpoint points at a closed local port; delivery failures are
    // internal to the sender and never surface here.
    let config = Config {
        endpoint: "http://127.0.0.1:9".to_owned(),
        ..Config::new("1_secret")
    };
    statok::init(config.clone()).unwrap();

    statok::event("requests", 2, &["GET"]);
    statok::event_value("latency", 3.5, &["GET"]);
    assert!(statok::event_with_error("requests", 1, &["GET"]).is_ok());

    // Double initialization is an error.
    let error = statok::init(config).unwrap_err();
    assert!(matches!(error, ClientError::AlreadyInitialized));
}
