mod common;
use common::{Behavior, FakeExecutor, ENV_LOCK};

use clap::Parser;
use fleetcmd::app::{App, Job};
use fleetcmd::cli::Cli;
use fleetcmd::errors::FleetErrorKind;
use std::sync::Arc;

fn tmp_path(prefix: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()))
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("cli parse")
}

#[tokio::test]
async fn missing_private_key_fails_before_any_host() {
    let _guard = ENV_LOCK.lock().await;

    let missing = tmp_path("fleetcmd-missing-key");
    let missing = missing.to_string_lossy().to_string();
    let cli = parse(&[
        "fleetcmd",
        "--key",
        &missing,
        "--user",
        "ops",
        "--log-level",
        "error",
        "sshcmd",
        "--nodes",
        "127.0.0.1:1,127.0.0.1:2",
        "-c",
        "true",
    ]);

    let app = App::initialize(&cli).expect("initialize");
    let err = app.run(&cli).await.expect_err("missing key");
    assert_eq!(err.kind, FleetErrorKind::Configuration);
    assert!(err.message.contains("private key"), "{}", err.message);
}

#[tokio::test]
async fn non_key_file_is_a_configuration_failure() {
    let _guard = ENV_LOCK.lock().await;

    let path = tmp_path("fleetcmd-not-a-key");
    std::fs::write(&path, "just some text\n").expect("write");
    let path_text = path.to_string_lossy().to_string();
    let cli = parse(&[
        "fleetcmd", "--key", &path_text, "--user", "ops", "sshcmd", "-n", "a", "-c", "true",
    ]);

    let app = App::initialize(&cli).expect("initialize");
    let err = app.run(&cli).await.expect_err("bad key");
    assert_eq!(err.kind, FleetErrorKind::Configuration);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn missing_nodes_is_rejected_before_loading_the_key() {
    let _guard = ENV_LOCK.lock().await;

    let cli = parse(&["fleetcmd", "--user", "ops", "sshcmd", "-c", "true"]);
    let app = App::initialize(&cli).expect("initialize");
    let err = app.run(&cli).await.expect_err("no nodes");
    assert_eq!(err.kind, FleetErrorKind::InvalidArgs);
}

#[tokio::test]
async fn largest_job_merges_listings_across_hosts() {
    let _guard = ENV_LOCK.lock().await;

    let cli = parse(&[
        "fleetcmd",
        "--user",
        "ops",
        "--workers",
        "2",
        "--log-level",
        "error",
        "largest-with-nodes",
        "--nodes",
        "web1,web2,db1",
        "--json",
    ]);
    let executor = FakeExecutor::new()
        .plan(
            "web1",
            5,
            Behavior::Output("5000 /var/log/syslog\n100 /tmp/foo".into()),
        )
        .plan(
            "web2",
            10,
            Behavior::Output("100 /tmp/foo\nnot-a-size /broken".into()),
        )
        .plan("db1", 5, Behavior::Fail(FleetErrorKind::Connection));

    let app = App::initialize(&cli).expect("initialize");
    let job = Job::from_cli(&cli.command).expect("job");
    let outcome = app
        .run_job(job, Arc::new(executor.clone()))
        .await
        .expect("run");

    assert_eq!(outcome.summary.total, 3);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.exit_code(), 2);

    let largest = outcome.largest.expect("largest report");
    let paths: Vec<&str> = largest.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["/var/log/syslog", "/tmp/foo"]);
    let foo = &largest.entries[1];
    let mut hosts: Vec<String> = foo.contributing_hosts.iter().map(|h| h.to_string()).collect();
    hosts.sort();
    assert_eq!(hosts, vec!["web1:22", "web2:22"]);
    assert_eq!(largest.warnings.len(), 1);
    assert!(executor.max_active() <= 2);
}

#[tokio::test]
async fn command_job_wraps_the_command_for_bash() {
    let _guard = ENV_LOCK.lock().await;

    let cli = parse(&[
        "fleetcmd", "--user", "ops", "--log-level", "error", "sshcmd", "-n", "a", "-c", "uptime",
        "--json",
    ]);
    let job = Job::from_cli(&cli.command).expect("job");
    let Job::Command { command, .. } = &job else {
        panic!("expected command job");
    };
    assert!(command.starts_with("/bin/bash <<CMD\n"));
    assert!(command.contains("\nuptime\n"));

    let app = App::initialize(&cli).expect("initialize");
    let outcome = app
        .run_job(job, Arc::new(FakeExecutor::new()))
        .await
        .expect("run");
    assert_eq!(outcome.exit_code(), 0);
    assert!(outcome.report.results[0].output.starts_with("ran /bin/bash"));
}
