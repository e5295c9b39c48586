//! Bootstrap integration: config in, running service set out.

use std::io::Write;

use weft_core::WorkerMonitor;
use weft_server::{bootstrap, config};

fn load_config(contents: &str) -> config::RuntimeConfig {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    config::load(file.path()).expect("load config")
}

#[test]
fn bootstrap_launches_logger_and_start_service() {
    let config = load_config("start = \"echo\"");
    let runtime = bootstrap(&config).expect("bootstrap");

    // Logger plus the start service.
    assert_eq!(runtime.live_services(), 2);
    assert_eq!(runtime.env().get("start").as_deref(), Some("echo"));

    let probe = runtime.launch("echo", Some(".probe")).expect("probe");
    assert!(
        runtime.command(probe, "QUERY", Some(".logger")).is_some(),
        "logger name must be bound"
    );
    assert!(
        runtime.command(probe, "QUERY", Some(".echo")).is_some(),
        "start service registered itself"
    );

    runtime.command(probe, "ABORT", None);
    assert_eq!(runtime.live_services(), 0);
}

#[test]
fn bootstrap_without_start_only_runs_boot_services() {
    let config = load_config("");
    let runtime = bootstrap(&config).expect("bootstrap");
    assert_eq!(runtime.live_services(), 1);

    let probe = runtime.launch("echo", Some(".probe")).expect("probe");
    runtime.command(probe, "ABORT", None);
    assert_eq!(runtime.live_services(), 0);
}

#[test]
fn transport_comes_up_when_cluster_addresses_are_set() {
    let config = load_config(
        r#"
master = "127.0.0.1:2012"
address = "127.0.0.1:2525"
harbor = 2
"#,
    );
    let runtime = bootstrap(&config).expect("bootstrap");
    // Logger plus transport.
    assert_eq!(runtime.live_services(), 2);

    let probe = runtime.launch("echo", Some(".probe")).expect("probe");
    // A global (bare) name registration now has somewhere to go; it is
    // fire-and-forget, so success is just "no answer, no panic".
    assert_eq!(runtime.command(probe, "REG", Some("gateway")), None);

    let monitor = WorkerMonitor::new();
    while !runtime.dispatch_once(&monitor) {}

    runtime.command(probe, "ABORT", None);
    assert_eq!(runtime.live_services(), 0);
}

#[test]
fn standalone_runs_the_master_locally() {
    let config = load_config("standalone = \"127.0.0.1:2012\"");
    let runtime = bootstrap(&config).expect("bootstrap");
    // Logger plus the local master, no transport without cluster addresses.
    assert_eq!(runtime.live_services(), 2);

    let probe = runtime.launch("echo", Some(".probe")).expect("probe");
    runtime.command(probe, "ABORT", None);
    assert_eq!(runtime.live_services(), 0);
}

#[test]
fn standalone_cluster_node_runs_master_and_transport() {
    let config = load_config(
        r#"
standalone = "127.0.0.1:2012"
master = "127.0.0.1:2012"
address = "127.0.0.1:2525"
"#,
    );
    let runtime = bootstrap(&config).expect("bootstrap");
    // Logger, master, and transport.
    assert_eq!(runtime.live_services(), 3);

    let probe = runtime.launch("echo", Some(".probe")).expect("probe");
    assert_eq!(runtime.command(probe, "REG", Some("gateway")), None);

    let monitor = WorkerMonitor::new();
    while !runtime.dispatch_once(&monitor) {}

    runtime.command(probe, "ABORT", None);
    assert_eq!(runtime.live_services(), 0);
}

#[test]
fn unknown_start_service_fails_bootstrap() {
    let config = load_config("start = \"no-such-module\"");
    assert!(bootstrap(&config).is_err());
}

#[test]
fn logger_file_receives_runtime_reports() {
    let log = tempfile::NamedTempFile::new().expect("log file");
    let config = load_config(&format!("logger = \"{}\"", log.path().display()));
    let runtime = bootstrap(&config).expect("bootstrap");

    let probe = runtime.launch("echo", Some(".probe")).expect("probe");
    runtime.command(probe, "EXIT", None);

    // Drive dispatch so the logger service consumes the KILL notice.
    let monitor = WorkerMonitor::new();
    while !runtime.dispatch_once(&monitor) {}

    let cleaner = runtime.launch("echo", Some(".cleaner")).expect("cleaner");
    runtime.command(cleaner, "ABORT", None);
    assert_eq!(runtime.live_services(), 0);

    let contents = std::fs::read_to_string(log.path()).expect("read log");
    assert!(
        contents.contains("KILL self"),
        "expected the KILL notice in the log file, got: {contents:?}"
    );
}
