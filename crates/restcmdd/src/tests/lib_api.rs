//! Tests that exercise the crate's public re-exports.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use rstest::rstest;
use serde_json::json;

use restcmd_config::{EndpointAddress, PortPolicy};

use crate::reply::ReplyCollector;
use crate::transport::{ANSWER_HOST_HEADER, ANSWER_PORT_HEADER, COMMAND_PATH};
use crate::{CommandRelay, CountingProcessor, RelaySettings};

#[rstest]
fn counting_processor_answers_through_the_relay() {
    let collector = ReplyCollector::start();
    let processor = Arc::new(CountingProcessor::new(["stop"]));
    let address = EndpointAddress::parse("rest://api@127.0.0.1:0", PortPolicy::AllowEphemeral)
        .expect("endpoint");
    let mut relay = CommandRelay::new(address, processor.clone(), RelaySettings::default())
        .expect("relay builds");
    relay.init().expect("init");
    let addr = relay.start().expect("start");

    for id in ["conf", "stop"] {
        let status = Client::new()
            .post(format!("http://{addr}{COMMAND_PATH}"))
            .header("content-type", "application/json; charset=utf-8")
            .header(ANSWER_HOST_HEADER, "127.0.0.1")
            .header(ANSWER_PORT_HEADER, collector.port().to_string())
            .body(json!({"id": id}).to_string())
            .send()
            .expect("post command")
            .status();
        assert_eq!(status.as_u16(), 202);
    }

    let mut replies = collector.wait_for(2, Duration::from_secs(5));
    replies.sort_by_key(|reply| reply["data"]["cmdid"].to_string());
    assert_eq!(
        replies,
        vec![
            json!({"success": true, "result": "OK", "appname": "restcmd", "data": {"cmdid": "conf"}}),
            json!({
                "success": false,
                "result": "command 'stop' rejected",
                "appname": "restcmd",
                "data": {"cmdid": "stop"}
            }),
        ]
    );
    assert_eq!(processor.executed(), 1);
    assert_eq!(relay.commands_launched(), 2);
    relay.shutdown().expect("shutdown");
    assert_eq!(relay.reply_attempts(), 2);
}
