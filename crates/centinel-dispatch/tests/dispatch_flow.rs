use centinel_config::schema::RawConfig;
use centinel_core::object_graph::apply_config;
use centinel_core::macros::MacroContext;
use centinel_dispatch::{command_file::parse_command_line, run_check, write_retention, PerfdataSink, SinkKind};
use std::time::Duration;

fn sample_config() -> RawConfig {
    let toml = r#"
        [timeperiod.always]
        alias = "Always"

        [command.check_ping]
        line = "/bin/true"

        [host.web1]
        address = "127.0.0.1"
        check_command = "check_ping"
        check_period = "always"
        notification_period = "always"
    "#;
    toml::from_str(toml).expect("sample config parses")
}

#[tokio::test]
async fn check_result_feeds_into_perfdata_sink() {
    let result = run_check("echo 'OK | rta=12ms'", Duration::from_secs(5)).await;
    assert!(result.is_executed);
    assert_eq!(result.result.exit_code, 0);

    let dir = tempfile::tempdir().unwrap();
    let sink = PerfdataSink::new(
        SinkKind::File,
        dir.path().join("perfdata.log"),
        "$HOSTNAME$\t$OUTPUT$",
    );
    let mut ctx = MacroContext::new();
    ctx.set("HOSTNAME", "web1");
    ctx.set("OUTPUT", result.result.stdout.trim());
    sink.write_record(&ctx).unwrap();

    let contents = std::fs::read_to_string(dir.path().join("perfdata.log")).unwrap();
    assert!(contents.starts_with("web1\t"));
}

#[test]
fn external_command_drives_retention_write_cycle() {
    let cmd = parse_command_line("[1700000000] SCHEDULE_FORCED_HOST_CHECK;web1;1700000300").unwrap();
    assert_eq!(cmd.name, "SCHEDULE_FORCED_HOST_CHECK");

    let raw = sample_config();
    let (graph, _) = apply_config(None, &raw).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("retention.dat");
    write_retention(&path, &graph).unwrap();
    assert!(path.exists());

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("hoststatus"));
    assert!(contents.contains("host_name=web1"));
}
