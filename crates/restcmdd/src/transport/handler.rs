//! Request handling for the `POST /command` route.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatch::{CommandEnvelope, ReplyRoute};

use super::{LISTENER_TARGET, RequestRejection};

/// Route served by the listener.
pub const COMMAND_PATH: &str = "/command";

/// Header carrying the port the reply should be posted to.
pub const ANSWER_PORT_HEADER: &str = "x-answer-port";

/// Header carrying the host the reply should be posted to.
pub const ANSWER_HOST_HEADER: &str = "x-answer-host";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const JSON_MEDIA_TYPE: &str = "application/json";
const ACKNOWLEDGEMENT: &str = "Command received\n";

fn cors_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_METHODS, "POST,GET"),
    ]
}

/// Receives commands accepted by the listener.
///
/// `submit` runs on the HTTP worker pool and must return promptly.
pub trait CommandSink: Send + Sync + 'static {
    /// Takes ownership of an accepted command.
    fn submit(&self, envelope: CommandEnvelope);
}

pub(crate) type SharedSink = Arc<dyn CommandSink>;

pub(crate) async fn accept_command(
    State(sink): State<SharedSink>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match admit(&headers, &body, peer) {
        Ok(envelope) => {
            debug!(
                target: LISTENER_TARGET,
                command_id = %envelope.command_id(),
                reply_to = %envelope.route(),
                "command accepted"
            );
            sink.submit(envelope);
            (StatusCode::ACCEPTED, cors_headers(), ACKNOWLEDGEMENT).into_response()
        }
        Err(rejection) => {
            warn!(
                target: LISTENER_TARGET,
                peer = %peer,
                reason = %rejection,
                "command rejected"
            );
            rejection.into_response()
        }
    }
}

impl RequestRejection {
    /// HTTP status returned for this rejection.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedContentType | Self::MalformedJson => StatusCode::NOT_ACCEPTABLE,
            Self::MissingAnswerPort | Self::InvalidAnswerPort { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RequestRejection {
    fn into_response(self) -> Response {
        (self.status(), cors_headers(), format!("{self}\n")).into_response()
    }
}

/// Validates a request and builds the envelope handed to dispatch.
pub(crate) fn admit(
    headers: &HeaderMap,
    body: &[u8],
    peer: SocketAddr,
) -> Result<CommandEnvelope, RequestRejection> {
    if !is_json_content(headers) {
        return Err(RequestRejection::UnsupportedContentType);
    }
    let command: Value =
        serde_json::from_slice(body).map_err(|_| RequestRejection::MalformedJson)?;
    let route = extract_route(headers, peer)?;
    Ok(CommandEnvelope::new(command, route))
}

fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}

fn extract_route(headers: &HeaderMap, peer: SocketAddr) -> Result<ReplyRoute, RequestRejection> {
    let raw_port = header_text(headers, ANSWER_PORT_HEADER)
        .ok_or(RequestRejection::MissingAnswerPort)?;
    let answer_port = raw_port
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| RequestRejection::InvalidAnswerPort {
            value: raw_port.to_owned(),
        })?;

    let answer_host = header_text(headers, ANSWER_HOST_HEADER)
        .or_else(|| {
            header_text(headers, FORWARDED_FOR_HEADER)
                .and_then(|forwarded| forwarded.split(',').next())
                .map(str::trim)
                .filter(|host| !host.is_empty())
        })
        .map_or_else(|| peer.ip().to_string(), str::to_owned);

    Ok(ReplyRoute::new(answer_host, answer_port))
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
