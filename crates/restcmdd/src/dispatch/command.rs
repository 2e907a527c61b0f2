//! Command envelopes and replies exchanged with the command processor.
//!
//! An accepted request becomes a [`CommandEnvelope`]: the JSON command plus
//! the [`ReplyRoute`] the caller asked the reply to be posted to. The
//! processor answers with a [`CommandReply`]; the relay attaches the route for
//! delivery and detaches it again before the reply is serialised, so routing
//! fields never reach the caller.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Path appended to the caller's address when posting a reply.
pub const REPLY_PATH: &str = "/response";

/// Key under which the originating command id is echoed in reply data.
pub const COMMAND_ID_KEY: &str = "cmdid";

/// Data keys reserved for routing; stripped from outgoing replies.
pub const ROUTING_KEYS: [&str; 4] = ["answer_host", "answer_port", "ans-host", "ans-port"];

/// Address the caller asked the reply to be delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRoute {
    answer_host: String,
    answer_port: u16,
}

impl ReplyRoute {
    /// Builds a route from the caller's answer host and port.
    pub fn new(answer_host: impl Into<String>, answer_port: u16) -> Self {
        Self {
            answer_host: answer_host.into(),
            answer_port,
        }
    }

    /// Host the reply is posted to.
    #[must_use]
    pub fn answer_host(&self) -> &str {
        &self.answer_host
    }

    /// Port the reply is posted to.
    #[must_use]
    pub const fn answer_port(&self) -> u16 {
        self.answer_port
    }

    /// Full reply URL, `http://{host}:{port}/response`.
    #[must_use]
    pub fn reply_url(&self) -> String {
        format!("http://{self}{REPLY_PATH}")
    }
}

impl fmt::Display for ReplyRoute {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.answer_host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => write!(formatter, "[{}]:{}", self.answer_host, self.answer_port),
            _ => write!(formatter, "{}:{}", self.answer_host, self.answer_port),
        }
    }
}

/// Inbound command document plus the caller's reply route.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    command: Value,
    route: ReplyRoute,
}

impl CommandEnvelope {
    /// Wraps a parsed command with its reply route.
    #[must_use]
    pub const fn new(command: Value, route: ReplyRoute) -> Self {
        Self { command, route }
    }

    /// The command document as received.
    #[must_use]
    pub const fn command(&self) -> &Value {
        &self.command
    }

    /// Where the reply for this command goes.
    #[must_use]
    pub const fn route(&self) -> &ReplyRoute {
        &self.route
    }

    /// Identifier taken from the command's `id` field, or an empty string.
    #[must_use]
    pub fn command_id(&self) -> String {
        match self.command.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        }
    }

    /// Splits the envelope into its command and route.
    #[must_use]
    pub fn into_parts(self) -> (Value, ReplyRoute) {
        (self.command, self.route)
    }
}

/// Result of processing one command, sent back to the caller out of band.
///
/// The serialised form is
/// `{"success": bool, "result": "...", "appname": "...", "data": {...}}`,
/// with the originating command id under `data.cmdid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    /// Whether the processor completed the command.
    pub success: bool,
    /// Processor result text, or the failure message.
    pub result: String,
    /// Application that processed the command.
    #[serde(rename = "appname", default)]
    pub app_name: String,
    /// Additional reply metadata.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(skip)]
    route: Option<ReplyRoute>,
}

impl CommandReply {
    /// Builds a successful reply.
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: result.into(),
            app_name: String::new(),
            data: Map::new(),
            route: None,
        }
    }

    /// Builds a failed reply carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(message)
        }
    }

    /// Sets the application name when the processor left it empty.
    #[must_use]
    pub fn with_default_app_name(mut self, app_name: &str) -> Self {
        if self.app_name.is_empty() {
            app_name.clone_into(&mut self.app_name);
        }
        self
    }

    /// Records the originating command id in the reply data.
    #[must_use]
    pub fn with_command_id(mut self, command_id: &str) -> Self {
        self.data.insert(
            COMMAND_ID_KEY.to_owned(),
            Value::String(command_id.to_owned()),
        );
        self
    }

    /// Originating command id, when recorded.
    #[must_use]
    pub fn command_id(&self) -> Option<&str> {
        self.data.get(COMMAND_ID_KEY).and_then(Value::as_str)
    }

    /// Attaches the delivery route.
    #[must_use]
    pub fn with_route(mut self, route: ReplyRoute) -> Self {
        self.route = Some(route);
        self
    }

    /// Delivery route, when attached.
    #[must_use]
    pub const fn route(&self) -> Option<&ReplyRoute> {
        self.route.as_ref()
    }

    /// Removes the route and any routing keys from the reply data.
    pub fn detach_route(&mut self) -> Option<ReplyRoute> {
        for key in ROUTING_KEYS {
            self.data.remove(key);
        }
        self.route.take()
    }

    /// Serialises the reply body as sent to the caller.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a data value fails to serialise.
    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reply_url_appends_response_path() {
        assert_eq!(
            ReplyRoute::new("10.0.0.7", 12333).reply_url(),
            "http://10.0.0.7:12333/response"
        );
        assert_eq!(
            ReplyRoute::new("::1", 80).reply_url(),
            "http://[::1]:80/response"
        );
    }

    #[test]
    fn command_id_reads_string_and_numeric_ids() {
        let route = ReplyRoute::new("localhost", 1);
        let named = CommandEnvelope::new(json!({"id": "conf"}), route.clone());
        let numbered = CommandEnvelope::new(json!({"id": 7}), route.clone());
        let anonymous = CommandEnvelope::new(json!({"data": {}}), route);
        assert_eq!(named.command_id(), "conf");
        assert_eq!(numbered.command_id(), "7");
        assert_eq!(anonymous.command_id(), "");
    }

    #[test]
    fn detached_reply_body_has_no_routing_fields() {
        let mut reply = CommandReply::success("OK")
            .with_command_id("start")
            .with_route(ReplyRoute::new("10.0.0.7", 12333));
        reply
            .data
            .insert("answer_port".to_owned(), Value::from(12333));

        let route = reply.detach_route().expect("route attached");
        assert_eq!(route.answer_port(), 12333);

        let body: Value =
            serde_json::from_slice(&reply.to_body().expect("serialise")).expect("json body");
        let text = body.to_string();
        assert!(!text.contains("answer_host"), "body leaked host: {text}");
        assert!(!text.contains("answer_port"), "body leaked port: {text}");
        assert_eq!(body["data"]["cmdid"], "start");
        assert_eq!(body["success"], true);
    }

    #[test]
    fn default_app_name_does_not_override_processor_value() {
        let mut reply = CommandReply::failure("boom");
        reply.app_name = "custom".to_owned();
        let reply = reply.with_default_app_name("relay");
        assert_eq!(reply.app_name, "custom");
        assert!(!reply.success);
    }
}
