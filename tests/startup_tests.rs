//! Tests for main.rs startup validation (JWT_SECRET, service URLs, etc.)

use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// 32 bytes of 'k', base64-encoded.
const GOOD_SECRET: &str = "a2tra2tra2tra2tra2tra2tra2tra2tra2tra2tra2s=";

fn gateway() -> Command {
    gateway_with_upstream("http://127.0.0.1:9")
}

fn gateway_with_upstream(upstream: &str) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_portcullis"));
    command
        .env_remove("JWT_SECRET")
        .env_remove("GATEWAY_PORT")
        .env_remove("GATEWAY_UPSTREAM")
        .env_remove("GATEWAY_AUTH_SERVICE")
        .env_remove("GATEWAY_OPEN_PATHS")
        .args([
            "--upstream",
            upstream,
            "--auth-service",
            "http://127.0.0.1:9",
        ])
        .stderr(Stdio::piped())
        .stdout(Stdio::piped());
    command
}

fn combined_output(output: &Output) -> String {
    // tracing logs to stdout by default
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn test_missing_jwt_secret_exits_with_error() {
    let output = gateway().output().expect("Failed to run binary");

    assert!(
        !output.status.success(),
        "Should exit with error when JWT_SECRET is missing"
    );
    let combined = combined_output(&output);
    assert!(
        combined.contains("JWT_SECRET") && combined.contains("required"),
        "Should mention JWT_SECRET is required, got: {}",
        combined
    );
}

#[test]
fn test_short_jwt_secret_exits_with_error() {
    let output = gateway()
        .env("JWT_SECRET", "c2hvcnQ=")
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("32 bytes"),
        "Should mention minimum secret length, got: {}",
        combined
    );
}

#[test]
fn test_non_base64_jwt_secret_exits_with_error() {
    let output = gateway()
        .env("JWT_SECRET", "this is not base64 at all!!")
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("base64"),
        "Should mention base64 encoding, got: {}",
        combined
    );
}

#[test]
fn test_jwt_secret_file_is_read() {
    let path = std::env::temp_dir().join(format!("portcullis-secret-{}", std::process::id()));
    std::fs::write(&path, format!("{}\n", GOOD_SECRET)).unwrap();

    let mut child = gateway()
        .args(["--jwt-secret-file", path.to_str().unwrap(), "--port", "0"])
        .spawn()
        .expect("Failed to run binary");

    std::thread::sleep(Duration::from_millis(500));
    let status = child.try_wait().expect("Error checking process status");
    child.kill().ok();
    std::fs::remove_file(&path).ok();

    assert!(status.is_none(), "Server exited unexpectedly: {:?}", status);
}

#[test]
fn test_non_http_upstream_exits_with_error() {
    let output = gateway_with_upstream("ftp://backend")
        .env("JWT_SECRET", GOOD_SECRET)
        .output()
        .expect("Failed to run binary");

    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(
        combined.contains("http or https"),
        "Should mention the URL scheme, got: {}",
        combined
    );
}

#[test]
fn test_valid_configuration_starts() {
    let mut child = gateway()
        .env("JWT_SECRET", GOOD_SECRET)
        .args(["--port", "0", "--route-match", "prefix", "--coalesce-refresh"])
        .spawn()
        .expect("Failed to run binary");

    // Give it a moment to start or fail
    std::thread::sleep(Duration::from_millis(500));

    match child.try_wait() {
        Ok(Some(status)) => {
            let output = child.wait_with_output().unwrap();
            panic!(
                "Server exited unexpectedly with status {:?}, output: {}",
                status,
                combined_output(&output)
            );
        }
        Ok(None) => {
            child.kill().ok();
        }
        Err(e) => panic!("Error checking process status: {}", e),
    }
}
