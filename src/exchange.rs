//! WebRcon request / response envelopes and the single-command exchange.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tungstenite::{Error as WsError, Message};

use crate::connection::{is_timeout, Session};
use crate::error::RconError;

/// Client name every WebRcon request carries.
pub const CLIENT_NAME: &str = "WebRcon";

pub const NO_MESSAGE: &str = "No message in response";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request<'a> {
    #[serde(rename = "Identifier")]
    pub identifier: i64,
    #[serde(rename = "Message")]
    pub message: &'a str,
    #[serde(rename = "Name")]
    pub name: &'a str,
}

impl<'a> Request<'a> {
    pub fn new(identifier: i64, message: &'a str) -> Self {
        Request {
            identifier,
            message,
            name: CLIENT_NAME,
        }
    }
}

/// A decoded reply. Keys beyond the three known ones are kept in `extra`;
/// `body` is the whole object in the order the server sent it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    #[serde(rename = "Identifier", default)]
    pub identifier: Option<i64>,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub body: Map<String, Value>,
}

impl Response {
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or(NO_MESSAGE)
    }

    pub fn to_pretty_json(&self) -> Result<String, RconError> {
        serde_json::to_string_pretty(&self.body).map_err(|e| RconError::Internal(e.to_string()))
    }
}

pub fn encode_request(request: &Request<'_>) -> Result<String, RconError> {
    serde_json::to_string(request).map_err(|e| RconError::Internal(e.to_string()))
}

pub fn decode_response(raw: &str) -> Result<Response, RconError> {
    let malformed = |_| RconError::MalformedResponse(raw.to_string());
    let body: Map<String, Value> = serde_json::from_str(raw).map_err(malformed)?;
    let mut response: Response =
        serde_json::from_value(Value::Object(body.clone())).map_err(malformed)?;
    response.body = body;
    Ok(response)
}

/// Sends `command` as one frame and blocks until one reply frame arrives.
pub fn execute(session: &mut Session, command: &str) -> Result<Response, RconError> {
    if !session.is_open() {
        return Err(RconError::NotConnected);
    }
    if session.interrupt().is_raised() {
        return Err(RconError::Interrupted);
    }

    let identifier = session.next_request_id();
    let payload = encode_request(&Request::new(identifier, command))?;

    tracing::debug!(identifier, "Sending command: {}", command);
    session
        .socket_mut()?
        .send(Message::Text(payload))
        .map_err(transport_error)?;

    let raw = receive(session)?;
    tracing::debug!("Received response: {}", raw);
    decode_response(&raw)
}

fn receive(session: &mut Session) -> Result<String, RconError> {
    let deadline = session.options().reply_timeout.map(|t| Instant::now() + t);
    let interrupt = session.interrupt().clone();

    loop {
        if interrupt.is_raised() {
            return Err(RconError::Interrupted);
        }

        match session.socket_mut()?.read() {
            Ok(Message::Text(text)) => return Ok(text),
            Ok(Message::Binary(bytes)) => {
                return String::from_utf8(bytes).map_err(|e| {
                    RconError::MalformedResponse(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })
            }
            Ok(Message::Close(_)) => {
                return Err(RconError::TransportError("connection closed by server".into()))
            }
            Ok(_) => continue,
            Err(WsError::Io(e)) if is_timeout(&e) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(RconError::ServerTimeout);
                }
            }
            Err(e) => return Err(transport_error(e)),
        }
    }
}

fn transport_error(e: WsError) -> RconError {
    match e {
        WsError::Io(e) if is_timeout(&e) => RconError::ServerTimeout,
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            RconError::TransportError("connection closed".into())
        }
        e => RconError::TransportError(e.to_string()),
    }
}
