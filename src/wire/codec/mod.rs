use std::fmt;

pub const MAX_MESSAGE_SIZE_BYTES: usize = 8 * 1024 * 1024;
pub const LENGTH_PREFIX_SIZE_BYTES: usize = 4;

pub type Frame = Vec<u8>;
pub type Message = Vec<Frame>;

#[derive(Debug, PartialEq, Eq)]
pub enum CodecError {
    MessageTooLarge { size: usize, limit: usize },
    ProtocolZeroLength,
    EmptyMessage,
    TruncatedBody { needed: usize, remaining: usize },
    TrailingBytes { count: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageTooLarge { size, limit } => {
                write!(f, "message size {size} exceeds limit {limit}")
            }
            Self::ProtocolZeroLength => {
                write!(f, "protocol error: message length cannot be zero")
            }
            Self::EmptyMessage => write!(f, "protocol error: message must carry at least one frame"),
            Self::TruncatedBody { needed, remaining } => write!(
                f,
                "message body truncated: needed {needed} more bytes, {remaining} remaining"
            ),
            Self::TrailingBytes { count } => {
                write!(f, "message body has {count} trailing bytes after last frame")
            }
        }
    }
}

impl std::error::Error for CodecError {}

// [u32 body length][u32 frame count]([u32 frame length][frame bytes])*, big-endian.
pub fn encode_message(message: &[Frame]) -> Result<Vec<u8>, CodecError> {
    if message.is_empty() {
        return Err(CodecError::EmptyMessage);
    }

    let body_len = LENGTH_PREFIX_SIZE_BYTES
        + message
            .iter()
            .map(|frame| LENGTH_PREFIX_SIZE_BYTES + frame.len())
            .sum::<usize>();
    if body_len > MAX_MESSAGE_SIZE_BYTES {
        return Err(CodecError::MessageTooLarge {
            size: body_len,
            limit: MAX_MESSAGE_SIZE_BYTES,
        });
    }

    let mut encoded = Vec::with_capacity(LENGTH_PREFIX_SIZE_BYTES + body_len);
    encoded.extend_from_slice(&(body_len as u32).to_be_bytes());
    encoded.extend_from_slice(&(message.len() as u32).to_be_bytes());
    for frame in message {
        encoded.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        encoded.extend_from_slice(frame);
    }

    Ok(encoded)
}

#[cfg(test)]
pub fn decode_message(bytes: &[u8]) -> Result<Message, CodecError> {
    let body_len = read_length(bytes, 0)?;
    validate_body_length(body_len)?;

    let body = &bytes[LENGTH_PREFIX_SIZE_BYTES..];
    if body.len() < body_len {
        return Err(CodecError::TruncatedBody {
            needed: body_len,
            remaining: body.len(),
        });
    }
    if body.len() > body_len {
        return Err(CodecError::TrailingBytes {
            count: body.len() - body_len,
        });
    }

    decode_body(body)
}

fn decode_body(body: &[u8]) -> Result<Message, CodecError> {
    let frame_count = read_length(body, 0)?;
    if frame_count == 0 {
        return Err(CodecError::EmptyMessage);
    }

    let mut cursor = LENGTH_PREFIX_SIZE_BYTES;
    // Every frame costs at least its length prefix.
    let mut message = Vec::with_capacity(frame_count.min(body.len() / LENGTH_PREFIX_SIZE_BYTES));
    for _ in 0..frame_count {
        let frame_len = read_length(body, cursor)?;
        cursor += LENGTH_PREFIX_SIZE_BYTES;

        let remaining = body.len() - cursor;
        if frame_len > remaining {
            return Err(CodecError::TruncatedBody {
                needed: frame_len,
                remaining,
            });
        }
        message.push(body[cursor..cursor + frame_len].to_vec());
        cursor += frame_len;
    }

    if cursor != body.len() {
        return Err(CodecError::TrailingBytes {
            count: body.len() - cursor,
        });
    }

    Ok(message)
}

fn read_length(bytes: &[u8], offset: usize) -> Result<usize, CodecError> {
    let end = offset + LENGTH_PREFIX_SIZE_BYTES;
    if bytes.len() < end {
        return Err(CodecError::TruncatedBody {
            needed: LENGTH_PREFIX_SIZE_BYTES,
            remaining: bytes.len().saturating_sub(offset),
        });
    }

    let raw = [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]];
    Ok(u32::from_be_bytes(raw) as usize)
}

fn validate_body_length(body_len: usize) -> Result<(), CodecError> {
    if body_len == 0 {
        return Err(CodecError::ProtocolZeroLength);
    }
    if body_len > MAX_MESSAGE_SIZE_BYTES {
        return Err(CodecError::MessageTooLarge {
            size: body_len,
            limit: MAX_MESSAGE_SIZE_BYTES,
        });
    }

    Ok(())
}

#[derive(Debug, Default)]
pub struct MessageReader {
    buffer: Vec<u8>,
}

impl MessageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_message(&mut self) -> Result<Option<Message>, CodecError> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE_BYTES {
            return Ok(None);
        }

        let body_len = read_length(&self.buffer, 0)?;
        validate_body_length(body_len)?;

        let total_len = LENGTH_PREFIX_SIZE_BYTES + body_len;
        if self.buffer.len() < total_len {
            return Ok(None);
        }

        let message = decode_body(&self.buffer[LENGTH_PREFIX_SIZE_BYTES..total_len])?;
        self.buffer.drain(..total_len);
        Ok(Some(message))
    }
}
