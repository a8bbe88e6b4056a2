use std::io::Write;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("centinel.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    (dir, path)
}

const GOOD_CONFIG: &str = r#"
    [timeperiod.always]
    alias = "Always"

    [command.check_ping]
    line = "/bin/true"

    [host.web1]
    address = "127.0.0.1"
    check_command = "check_ping"
    check_period = "always"
    notification_period = "always"

    [service.web1_http]
    host = "web1"
    description = "http"
    check_command = "check_ping"
    check_period = "always"
    notification_period = "always"
"#;

const BAD_CONFIG: &str = r#"
    [host.web1]
    address = "127.0.0.1"
    check_command = "does_not_exist"
    check_period = "never_defined"
    notification_period = "never_defined"
"#;

#[test]
fn accepts_a_well_formed_configuration() {
    let (_dir, path) = write_config(GOOD_CONFIG);
    let bin = env!("CARGO_BIN_EXE_centinel");
    let output = std::process::Command::new(bin)
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("failed to run centinel binary");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("configuration OK"));
}

#[test]
fn rejects_dangling_references() {
    let (_dir, path) = write_config(BAD_CONFIG);
    let bin = env!("CARGO_BIN_EXE_centinel");
    let output = std::process::Command::new(bin)
        .arg("validate")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("failed to run centinel binary");
    assert!(!output.status.success());
}
