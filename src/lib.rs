//! Client for the WebRcon remote console spoken by game servers over WebSockets.
//!
//! A run is one [`Session::open`], one [`execute`], and the session's close,
//! optionally wrapped in [`run_with_retries`].

pub mod connection;
pub mod error;
pub mod exchange;
pub mod logging;
pub mod retry;

pub use connection::{ConnectOptions, Endpoint, Session};
pub use error::RconError;
pub use exchange::{execute, Request, Response, CLIENT_NAME};
pub use retry::{run_with_retries, Interrupt, RetryOutcome};

pub type Result<T> = std::result::Result<T, RconError>;

/// Opens a session, runs `command` once, and closes the session on every path.
pub fn send_command(
    endpoint: &Endpoint,
    options: &ConnectOptions,
    interrupt: &Interrupt,
    command: &str,
) -> Result<Response> {
    let mut session = Session::open(endpoint, options, interrupt.clone())?;
    let response = execute(&mut session, command)?;
    session.close();
    Ok(response)
}
