use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::address::{self, AddressError};
use crate::clock::Clock;
use crate::config::ClientViolationPolicy;
use crate::heartbeat::{HeartbeatConfig, HeartbeatError, HeartbeatSchedule};
use crate::logging::{LogLevel, Logger};
use crate::pools::WorkerPool;
use crate::shutdown::StopSignal;
use crate::transport::{self, RouterChannel, TransportError};
use crate::wire::codec::Message;
use crate::wire::envelope::{
    dump_frames, heartbeat_message, ClientRequest, EnvelopeError, WorkerEnvelope, WorkerMessage,
};

#[derive(Debug)]
pub enum BrokerError {
    Transport(TransportError),
    Heartbeat(HeartbeatError),
    ClientProtocol(EnvelopeError),
    Address(AddressError),
    EmptyPool,
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(source) => write!(f, "transport failure: {source}"),
            Self::Heartbeat(source) => write!(f, "heartbeat configuration error: {source}"),
            Self::ClientProtocol(source) => write!(f, "client protocol violation: {source}"),
            Self::Address(source) => write!(f, "worker address corrupted: {source}"),
            Self::EmptyPool => write!(f, "attempted to route a request with no idle workers"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<TransportError> for BrokerError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerOptions {
    pub heartbeat: HeartbeatConfig,
    pub client_violations: ClientViolationPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub requests_routed: u64,
    pub requests_dropped: u64,
    pub replies_forwarded: u64,
    pub heartbeats_sent: u64,
    pub workers_expired: u64,
}

pub struct Broker<F, B> {
    frontend: F,
    backend: B,
    pool: WorkerPool,
    heartbeat: HeartbeatSchedule,
    clock: Arc<dyn Clock>,
    logger: Arc<Logger>,
    client_violations: ClientViolationPolicy,
    poll_timeout: Duration,
    stats: BrokerStats,
}

impl<F: RouterChannel, B: RouterChannel> Broker<F, B> {
    pub fn new(
        frontend: F,
        backend: B,
        clock: Arc<dyn Clock>,
        logger: Arc<Logger>,
        options: BrokerOptions,
    ) -> Result<Self, BrokerError> {
        let heartbeat =
            HeartbeatSchedule::new(options.heartbeat, clock.now_ms()).map_err(BrokerError::Heartbeat)?;
        let pool = WorkerPool::new(Arc::clone(&clock), heartbeat.liveness_window_ms());

        Ok(Self {
            frontend,
            backend,
            pool,
            poll_timeout: heartbeat.interval(),
            heartbeat,
            clock,
            logger,
            client_violations: options.client_violations,
            stats: BrokerStats::default(),
        })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    #[cfg(test)]
    pub fn stats(&self) -> BrokerStats {
        self.stats
    }

    #[cfg(test)]
    fn set_poll_timeout(&mut self, timeout: Duration) {
        self.poll_timeout = timeout;
    }

    pub fn run(&mut self, stop: &StopSignal) -> Result<(), BrokerError> {
        self.logger.log(
            LogLevel::Info,
            Some("broker"),
            "Broker loop started",
            Some(json!({
                "frontend": self.frontend.endpoint(),
                "backend": self.backend.endpoint(),
                "heartbeat": self.heartbeat.metadata_payload()
            })),
        );

        while !stop.is_triggered() {
            self.run_once(|| stop.is_triggered())?;
        }

        self.logger.log(
            LogLevel::Info,
            Some("broker"),
            "Broker loop stopped",
            Some(json!({
                "idle_workers": self.pool.len(),
                "requests_routed": self.stats.requests_routed,
                "requests_dropped": self.stats.requests_dropped,
                "replies_forwarded": self.stats.replies_forwarded,
                "heartbeats_sent": self.stats.heartbeats_sent,
                "workers_expired": self.stats.workers_expired
            })),
        );
        Ok(())
    }

    // Order matters: backend, frontend, heartbeats, then purge.
    pub fn run_once(&mut self, interrupted: impl Fn() -> bool) -> Result<(), BrokerError> {
        // No idle workers means nobody could take a request, so leave clients queued.
        let frontend = if self.pool.is_empty() {
            None
        } else {
            Some(&mut self.frontend as &mut dyn RouterChannel)
        };
        let readiness = transport::poll(&mut self.backend, frontend, self.poll_timeout, interrupted)?;

        if readiness.backend {
            if let Some(message) = self.backend.recv()? {
                self.handle_backend_message(message)?;
            }
        }
        if readiness.frontend {
            if let Some(message) = self.frontend.recv()? {
                self.handle_frontend_message(message)?;
            }
        }

        let now_ms = self.clock.now_ms();
        if self.heartbeat.is_due(now_ms) {
            self.send_heartbeats()?;
            self.heartbeat.reschedule(self.clock.now_ms());
        }

        self.purge_expired(self.clock.now_ms());
        Ok(())
    }

    pub fn handle_backend_message(&mut self, message: Message) -> Result<(), BrokerError> {
        let envelope = match WorkerEnvelope::parse(message) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.logger
                    .warn(Some("broker::backend"), &format!("dropping worker message: {error}"));
                return Ok(());
            }
        };
        let worker = envelope.worker_key;

        match envelope.message {
            WorkerMessage::Ready => {
                let re_registered = self.pool.delete(&worker);
                if let Err(error) = self.pool.append(&worker) {
                    self.logger.error(Some("broker::backend"), &error.to_string());
                    return Ok(());
                }
                self.logger.log(
                    LogLevel::Info,
                    Some("broker::backend"),
                    if re_registered {
                        "Worker re-registered"
                    } else {
                        "Worker registered"
                    },
                    Some(json!({ "worker": worker, "idle_workers": self.pool.len() })),
                );
            }
            WorkerMessage::Heartbeat => match self.pool.refresh(&worker) {
                Ok(()) => self
                    .logger
                    .verbose(Some("broker::backend"), &format!("heartbeat from {worker}")),
                Err(error) => self.logger.warn(Some("broker::backend"), &error.to_string()),
            },
            WorkerMessage::Invalid(body) => {
                self.logger.log(
                    LogLevel::Warn,
                    Some("broker::backend"),
                    &format!("invalid message from {worker}"),
                    Some(json!({ "frames": dump_frames(&[body]) })),
                );
            }
            WorkerMessage::Reply(frames) => {
                if !self.frontend.send(frames)? {
                    self.logger.debug(
                        Some("broker::frontend"),
                        &format!("reply from {worker} addressed an unknown client; dropped"),
                    );
                } else {
                    self.stats.replies_forwarded += 1;
                }

                if let Err(error) = self.pool.append(&worker) {
                    self.logger.warn(Some("broker::backend"), &error.to_string());
                }
            }
        }

        Ok(())
    }

    pub fn handle_frontend_message(&mut self, message: Message) -> Result<(), BrokerError> {
        let mut request = match ClientRequest::parse(message) {
            Ok(request) => request,
            Err(error) => return self.client_violation(BrokerError::ClientProtocol(error)),
        };

        let (worker_address, pinned) = match request.worker_preference.take() {
            Some(preferred) => (preferred, true),
            None => {
                let worker = self.pool.dequeue_front().map_err(|_| BrokerError::EmptyPool)?;
                match address::decode(&worker) {
                    Ok(binary) => (binary, false),
                    Err(error) => return self.client_violation(BrokerError::Address(error)),
                }
            }
        };

        if self.logger.is_enabled(LogLevel::Debug) {
            self.logger.log(
                LogLevel::Debug,
                Some("broker::frontend"),
                "Routing client request",
                Some(json!({
                    "client": address::encode(&request.client_address).ok(),
                    "worker": address::encode(&worker_address).ok(),
                    "pinned": pinned,
                    "idle_workers": self.pool.len()
                })),
            );
        }

        if self.backend.send(request.into_worker_message(worker_address))? {
            self.stats.requests_routed += 1;
        } else {
            self.stats.requests_dropped += 1;
            self.logger.debug(
                Some("broker::backend"),
                "request addressed a worker with no connection; dropped",
            );
        }

        Ok(())
    }

    pub fn send_heartbeats(&mut self) -> Result<usize, BrokerError> {
        let mut sent = 0;
        for worker in self.pool.addresses() {
            let binary = address::decode(worker).map_err(BrokerError::Address)?;
            if self.backend.send(heartbeat_message(binary))? {
                sent += 1;
            }
        }

        self.stats.heartbeats_sent += sent as u64;
        self.logger.verbose(
            Some("broker::heartbeat"),
            &format!("sent {sent} heartbeat(s) to {} idle worker(s)", self.pool.len()),
        );
        Ok(sent)
    }

    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let evicted = self.pool.purge_expired(now_ms);
        for worker in &evicted {
            self.logger.log(
                LogLevel::Warn,
                Some("broker::pool"),
                "Worker expired",
                Some(json!({ "worker": worker, "idle_workers": self.pool.len() })),
            );
        }

        self.stats.workers_expired += evicted.len() as u64;
        evicted.len()
    }

    fn client_violation(&mut self, error: BrokerError) -> Result<(), BrokerError> {
        match self.client_violations {
            ClientViolationPolicy::Fatal => {
                self.logger.error(Some("broker::frontend"), &error.to_string());
                Err(error)
            }
            ClientViolationPolicy::Drop => {
                self.stats.requests_dropped += 1;
                self.logger.warn(
                    Some("broker::frontend"),
                    &format!("dropping client request: {error}"),
                );
                Ok(())
            }
        }
    }
}
