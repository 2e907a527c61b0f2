//! Unit tests for relay construction and lifecycle guards.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use restcmd_config::{LaunchPolicy, MalformedUri, RelayConfig};

use crate::process::run_relay;
use crate::relay::{CommandRelay, RelayError, RelaySettings};
use crate::reply::ReplyCollector;
use crate::transport::{ANSWER_PORT_HEADER, COMMAND_PATH, ListenerError};

use super::support::{HealthEvent, RecordingHealthReporter, RecordingRegistry, ScriptedProcessor};

#[fixture]
fn processor() -> Arc<ScriptedProcessor> {
    Arc::new(ScriptedProcessor::default())
}

fn loopback_relay(
    processor: Arc<ScriptedProcessor>,
    reporter: Arc<RecordingHealthReporter>,
) -> CommandRelay {
    let settings = RelaySettings {
        drain_interval: Duration::from_millis(20),
        ..RelaySettings::default()
    };
    relay_with_settings(processor, reporter, settings)
}

fn relay_with_settings(
    processor: Arc<ScriptedProcessor>,
    reporter: Arc<RecordingHealthReporter>,
    settings: RelaySettings,
) -> CommandRelay {
    CommandRelay::from_uri(
        "rest://127.0.0.1:0",
        processor,
        settings,
        Some(Arc::new(RecordingRegistry::default())),
    )
    .expect("relay builds")
    .with_reporter(reporter)
}

#[rstest]
fn settings_follow_configuration() {
    let config = RelayConfig {
        app_name: "robot".to_owned(),
        threads: 3,
        launch_policy: LaunchPolicy::Deferred,
        ..RelayConfig::default()
    };
    let settings = RelaySettings::from_config(&config);
    assert_eq!(settings.app_name, "robot");
    assert_eq!(settings.listener.threads, 3);
    assert_eq!(settings.launch_policy, LaunchPolicy::Deferred);
}

#[rstest]
#[case::ephemeral_without_registry(
    "rest://127.0.0.1:0",
    MalformedUri::EphemeralWithoutRegistry("rest://127.0.0.1:0".to_owned())
)]
#[case::missing_port("rest://localhost", MalformedUri::MissingPort("rest://localhost".to_owned()))]
fn from_uri_rejects_unusable_endpoints(
    processor: Arc<ScriptedProcessor>,
    #[case] uri: &str,
    #[case] expected: MalformedUri,
) {
    let error = CommandRelay::from_uri(uri, processor, RelaySettings::default(), None)
        .expect_err("endpoint is unusable");
    match error {
        RelayError::Configuration { source } => assert_eq!(source, expected),
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn ephemeral_port_is_allowed_with_registry(processor: Arc<ScriptedProcessor>) {
    let relay = loopback_relay(processor, Arc::new(RecordingHealthReporter::default()));
    assert_eq!(relay.address().port(), 0);
}

#[rstest]
fn second_start_is_refused(processor: Arc<ScriptedProcessor>) {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let mut relay = loopback_relay(processor, reporter);
    relay.init().expect("init");
    let addr = relay.start().expect("first start");

    let error = relay.start().expect_err("second start fails");
    assert!(matches!(
        error,
        RelayError::Listener {
            source: ListenerError::AlreadyStarted { addr: running }
        } if running == addr
    ));
    assert_eq!(relay.local_addr(), Some(addr));
    relay.shutdown().expect("shutdown");
}

#[rstest]
fn relay_cannot_restart_after_shutdown(processor: Arc<ScriptedProcessor>) {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let mut relay = loopback_relay(processor, reporter.clone());
    relay.init().expect("init");
    relay.start().expect("start");
    relay.shutdown().expect("shutdown");

    assert!(matches!(relay.start(), Err(RelayError::ShutDown)));
    assert_eq!(
        reporter
            .events()
            .iter()
            .filter(|event| **event == HealthEvent::RelayStarting)
            .count(),
        1
    );
}

#[rstest]
fn run_relay_returns_once_cancelled(processor: Arc<ScriptedProcessor>) {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let mut relay = loopback_relay(processor, reporter.clone());
    relay.init().expect("init");
    let addr = relay.start().expect("start");

    let cancel = CancellationToken::new();
    cancel.cancel();
    run_relay(&mut relay, &cancel).expect("relay shuts down");

    let events = reporter.events();
    assert_eq!(events.last(), Some(&HealthEvent::RelayStopped));
    assert!(TcpStream::connect(addr).is_err());
}

fn post_command(addr: SocketAddr, body: &Value, answer_port: u16) -> u16 {
    Client::new()
        .post(format!("http://{addr}{COMMAND_PATH}"))
        .header(CONTENT_TYPE, "application/json")
        .header(ANSWER_PORT_HEADER, answer_port.to_string())
        .body(body.to_string())
        .send()
        .expect("post command")
        .status()
        .as_u16()
}

#[rstest]
fn shutdown_inside_async_host_flushes_replies(processor: Arc<ScriptedProcessor>) {
    let collector = ReplyCollector::start();
    let mut relay = loopback_relay(processor, Arc::new(RecordingHealthReporter::default()));
    relay.init().expect("init");
    let addr = relay.start().expect("start");
    let command = json!({"id": "hosted", "delay_ms": 200, "data": {}});
    assert_eq!(post_command(addr, &command, collector.port()), 202);

    let host = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("host runtime");
    host.block_on(async { relay.shutdown() })
        .expect("shutdown inside async host");

    assert_eq!(relay.pending_replies(), 0);
    let replies = collector.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["result"], "hosted");
}

#[rstest]
fn relay_dropped_inside_async_host(processor: Arc<ScriptedProcessor>) {
    let mut relay = loopback_relay(processor, Arc::new(RecordingHealthReporter::default()));
    relay.init().expect("init");
    let addr = relay.start().expect("start");

    let host = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("host runtime");
    host.block_on(async move { drop(relay) });

    assert!(TcpStream::connect(addr).is_err());
}

#[rstest]
fn unbounded_shutdown_grace_waits_for_running_commands(processor: Arc<ScriptedProcessor>) {
    let collector = ReplyCollector::start();
    let settings = RelaySettings {
        drain_interval: Duration::from_millis(20),
        shutdown_grace: Duration::MAX,
        ..RelaySettings::default()
    };
    let mut relay = relay_with_settings(
        processor.clone(),
        Arc::new(RecordingHealthReporter::default()),
        settings,
    );
    relay.init().expect("init");
    let addr = relay.start().expect("start");
    let command = json!({"id": "patient", "delay_ms": 300, "data": {}});
    assert_eq!(post_command(addr, &command, collector.port()), 202);

    relay.shutdown().expect("shutdown");

    assert_eq!(processor.calls(), 1);
    assert_eq!(relay.pending_replies(), 0);
    let replies = collector.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["result"], "patient");
}
