use std::fmt;

use crate::address::{self, AddressError, BINARY_ADDRESS_LEN};
use crate::wire::codec::{Frame, Message};

pub const READY: &[u8] = b"READY";
pub const HEARTBEAT: &[u8] = b"HEARTBEAT";
pub const REQUEST_FRAME_COUNT: usize = 7;

#[derive(Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    MissingSenderAddress,
    EmptyWorkerMessage { worker: String },
    InvalidWorkerAddress(AddressError),
    InvalidFrameCount { expected: usize, actual: usize },
    InvalidClientAddressLength { length: usize },
    InvalidWorkerPreferenceLength { length: usize },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSenderAddress => write!(f, "message carries no sender address frame"),
            Self::EmptyWorkerMessage { worker } => {
                write!(f, "worker {worker} sent a message without a body")
            }
            Self::InvalidWorkerAddress(source) => write!(f, "invalid worker address: {source}"),
            Self::InvalidFrameCount { expected, actual } => write!(
                f,
                "client request must have {expected} frames, got {actual}"
            ),
            Self::InvalidClientAddressLength { length } => write!(
                f,
                "client address frame must be {BINARY_ADDRESS_LEN} bytes, got {length}"
            ),
            Self::InvalidWorkerPreferenceLength { length } => write!(
                f,
                "worker preference frame must be empty or {BINARY_ADDRESS_LEN} bytes, got {length}"
            ),
        }
    }
}

impl std::error::Error for EnvelopeError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerMessage {
    Ready,
    Heartbeat,
    Reply(Message),
    Invalid(Frame),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerEnvelope {
    pub worker_key: String,
    pub message: WorkerMessage,
}

impl WorkerEnvelope {
    pub fn parse(mut frames: Message) -> Result<Self, EnvelopeError> {
        if frames.is_empty() {
            return Err(EnvelopeError::MissingSenderAddress);
        }

        let sender = frames.remove(0);
        let worker_key = address::encode(&sender).map_err(EnvelopeError::InvalidWorkerAddress)?;

        let message = match frames.len() {
            0 => return Err(EnvelopeError::EmptyWorkerMessage { worker: worker_key }),
            1 => {
                let body = frames.remove(0);
                if body == READY {
                    WorkerMessage::Ready
                } else if body == HEARTBEAT {
                    WorkerMessage::Heartbeat
                } else {
                    WorkerMessage::Invalid(body)
                }
            }
            _ => WorkerMessage::Reply(frames),
        };

        Ok(Self {
            worker_key,
            message,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientRequest {
    pub client_address: Frame,
    pub worker_preference: Option<Frame>,
    pub payload: Vec<Frame>,
}

impl ClientRequest {
    pub fn parse(frames: Message) -> Result<Self, EnvelopeError> {
        if frames.len() != REQUEST_FRAME_COUNT {
            return Err(EnvelopeError::InvalidFrameCount {
                expected: REQUEST_FRAME_COUNT,
                actual: frames.len(),
            });
        }

        let mut frames = frames.into_iter();
        let client_address = frames.next().unwrap_or_default();
        let preference = frames.next().unwrap_or_default();
        let payload: Vec<Frame> = frames.collect();

        if client_address.len() != BINARY_ADDRESS_LEN {
            return Err(EnvelopeError::InvalidClientAddressLength {
                length: client_address.len(),
            });
        }

        let worker_preference = match preference.len() {
            0 => None,
            BINARY_ADDRESS_LEN => Some(preference),
            length => return Err(EnvelopeError::InvalidWorkerPreferenceLength { length }),
        };

        Ok(Self {
            client_address,
            worker_preference,
            payload,
        })
    }

    pub fn into_worker_message(self, worker_address: Frame) -> Message {
        let mut message = Vec::with_capacity(2 + self.payload.len());
        message.push(worker_address);
        message.push(self.client_address);
        message.extend(self.payload);
        message
    }
}

pub fn heartbeat_message(worker_address: Frame) -> Message {
    vec![worker_address, HEARTBEAT.to_vec()]
}

pub fn dump_frames(frames: &[Frame]) -> String {
    frames
        .iter()
        .map(|frame| {
            let printable = frame.iter().all(|byte| (0x20..0x7F).contains(byte));
            if printable {
                format!("[{:03}] {}", frame.len(), String::from_utf8_lossy(frame))
            } else {
                let hex: String = frame.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("[{:03}] {hex}", frame.len())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
