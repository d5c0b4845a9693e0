// Runs in its own test binary because it installs the global subscriber.
use rs_mcp_flow::logging::init_logging;

#[test]
fn second_initialisation_fails() {
    init_logging("warn").unwrap();
    assert!(init_logging("debug").is_err());
}
