#[cfg(test)]
pub mod memory;
pub mod tcp;

use std::fmt;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crate::wire::codec::{CodecError, Message};

pub const POLL_TICK: Duration = Duration::from_millis(2);

#[derive(Debug)]
pub enum TransportError {
    InvalidEndpoint { endpoint: String },
    UnsupportedScheme { endpoint: String },
    Bind { address: String, source: io::Error },
    SetNonBlocking { source: io::Error },
    Accept { source: io::Error },
    ConfigureAcceptedStream { source: io::Error },
    Encode(CodecError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEndpoint { endpoint } => write!(
                f,
                "invalid endpoint '{endpoint}', expected 'tcp://host:port' or 'host:port'"
            ),
            Self::UnsupportedScheme { endpoint } => {
                write!(f, "unsupported transport scheme in endpoint '{endpoint}'")
            }
            Self::Bind { address, source } => {
                write!(f, "failed to bind channel on {address}: {source}")
            }
            Self::SetNonBlocking { source } => {
                write!(f, "failed to set channel listener to non-blocking mode: {source}")
            }
            Self::Accept { source } => write!(f, "failed to accept connection: {source}"),
            Self::ConfigureAcceptedStream { source } => {
                write!(f, "failed to configure accepted TCP stream: {source}")
            }
            Self::Encode(source) => write!(f, "failed to encode outbound message: {source}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub trait RouterChannel {
    fn endpoint(&self) -> &str;

    fn poll_readable(&mut self) -> Result<bool, TransportError>;

    fn recv(&mut self) -> Result<Option<Message>, TransportError>;

    fn send(&mut self, message: Message) -> Result<bool, TransportError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub backend: bool,
    pub frontend: bool,
}

impl PollOutcome {
    pub fn any(self) -> bool {
        self.backend || self.frontend
    }
}

pub fn poll(
    backend: &mut dyn RouterChannel,
    mut frontend: Option<&mut dyn RouterChannel>,
    timeout: Duration,
    interrupted: impl Fn() -> bool,
) -> Result<PollOutcome, TransportError> {
    let started_at = Instant::now();

    loop {
        let outcome = PollOutcome {
            backend: backend.poll_readable()?,
            frontend: match frontend.as_deref_mut() {
                Some(channel) => channel.poll_readable()?,
                None => false,
            },
        };
        if outcome.any() || interrupted() {
            return Ok(outcome);
        }

        let elapsed = started_at.elapsed();
        if elapsed >= timeout {
            return Ok(outcome);
        }
        thread::sleep(POLL_TICK.min(timeout - elapsed));
    }
}

pub fn parse_endpoint(endpoint: &str) -> Result<String, TransportError> {
    let trimmed = endpoint.trim();
    let address = match trimmed.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => {
            return Err(TransportError::UnsupportedScheme {
                endpoint: endpoint.to_owned(),
            })
        }
        None => trimmed,
    };

    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
        });
    };
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(TransportError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
        });
    }

    let host = if host == "*" { "0.0.0.0" } else { host };
    Ok(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::memory::MemoryChannel;
    use super::{parse_endpoint, poll, PollOutcome, RouterChannel, TransportError};

    #[test]
    fn parses_zmq_style_and_plain_endpoints() {
        assert_eq!(
            parse_endpoint("tcp://*:5555").expect("wildcard endpoint should parse"),
            "0.0.0.0:5555"
        );
        assert_eq!(
            parse_endpoint("127.0.0.1:0").expect("plain endpoint should parse"),
            "127.0.0.1:0"
        );
    }

    #[test]
    fn rejects_unsupported_or_malformed_endpoints() {
        assert!(matches!(
            parse_endpoint("ipc:///tmp/balancer"),
            Err(TransportError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            parse_endpoint("tcp://localhost"),
            Err(TransportError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            parse_endpoint("tcp://*:notaport"),
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn poll_returns_immediately_when_backend_is_readable() {
        let (mut backend, backend_peer) = MemoryChannel::pair("backend");
        let (mut frontend, _frontend_peer) = MemoryChannel::pair("frontend");
        backend_peer.inject(vec![b"worker".to_vec(), b"READY".to_vec()]);

        let outcome = poll(
            &mut backend,
            Some(&mut frontend as &mut dyn RouterChannel),
            Duration::from_secs(5),
            || false,
        )
        .expect("poll should succeed");

        assert_eq!(
            outcome,
            PollOutcome {
                backend: true,
                frontend: false
            }
        );
    }

    #[test]
    fn unpolled_frontend_is_ignored_until_timeout() {
        let (mut backend, _backend_peer) = MemoryChannel::pair("backend");
        let (_frontend, frontend_peer) = MemoryChannel::pair("frontend");
        frontend_peer.inject(vec![b"client".to_vec()]);

        let started_at = Instant::now();
        let outcome = poll(&mut backend, None, Duration::from_millis(20), || false)
            .expect("poll should succeed");

        assert!(!outcome.any());
        assert!(started_at.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn interrupted_poll_returns_early() {
        let (mut backend, _backend_peer) = MemoryChannel::pair("backend");

        let started_at = Instant::now();
        let outcome = poll(&mut backend, None, Duration::from_secs(5), || true)
            .expect("poll should succeed");

        assert!(!outcome.any());
        assert!(started_at.elapsed() < Duration::from_secs(1));
    }
}
