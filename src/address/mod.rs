use std::fmt;

pub const BINARY_ADDRESS_LEN: usize = 17;
pub const TEXT_ADDRESS_LEN: usize = 33;
pub const TEXT_ADDRESS_PREFIX: u8 = b'@';

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

#[derive(Debug, PartialEq, Eq)]
pub enum AddressError {
    InvalidBinaryLength { length: usize },
    MissingZeroPrefix { found: u8 },
    InvalidTextLength { length: usize },
    MissingTextPrefix { found: u8 },
    InvalidHexDigit { position: usize, found: u8 },
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBinaryLength { length } => write!(
                f,
                "binary address must be {BINARY_ADDRESS_LEN} bytes, got {length}"
            ),
            Self::MissingZeroPrefix { found } => {
                write!(f, "binary address must start with 0x00, got 0x{found:02X}")
            }
            Self::InvalidTextLength { length } => write!(
                f,
                "text address must be {TEXT_ADDRESS_LEN} bytes, got {length}"
            ),
            Self::MissingTextPrefix { found } => {
                write!(f, "text address must start with '@', got 0x{found:02X}")
            }
            Self::InvalidHexDigit { position, found } => write!(
                f,
                "invalid hex digit 0x{found:02X} at position {position} of text address"
            ),
        }
    }
}

impl std::error::Error for AddressError {}

pub fn encode(binary: &[u8]) -> Result<String, AddressError> {
    if binary.len() != BINARY_ADDRESS_LEN {
        return Err(AddressError::InvalidBinaryLength {
            length: binary.len(),
        });
    }
    if binary[0] != 0 {
        return Err(AddressError::MissingZeroPrefix { found: binary[0] });
    }

    let mut text = String::with_capacity(TEXT_ADDRESS_LEN);
    text.push(TEXT_ADDRESS_PREFIX as char);
    for byte in &binary[1..] {
        text.push(HEX_DIGITS[usize::from(byte >> 4)] as char);
        text.push(HEX_DIGITS[usize::from(byte & 0x0F)] as char);
    }

    Ok(text)
}

pub fn decode(text: &str) -> Result<Vec<u8>, AddressError> {
    let bytes = text.as_bytes();
    if bytes.len() != TEXT_ADDRESS_LEN {
        return Err(AddressError::InvalidTextLength {
            length: bytes.len(),
        });
    }
    if bytes[0] != TEXT_ADDRESS_PREFIX {
        return Err(AddressError::MissingTextPrefix { found: bytes[0] });
    }

    let mut binary = Vec::with_capacity(BINARY_ADDRESS_LEN);
    binary.push(0);
    for (index, pair) in bytes[1..].chunks_exact(2).enumerate() {
        let position = 1 + index * 2;
        let high = hex_value(pair[0]).ok_or(AddressError::InvalidHexDigit {
            position,
            found: pair[0],
        })?;
        let low = hex_value(pair[1]).ok_or(AddressError::InvalidHexDigit {
            position: position + 1,
            found: pair[1],
        })?;
        binary.push((high << 4) | low);
    }

    Ok(binary)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, AddressError, BINARY_ADDRESS_LEN, TEXT_ADDRESS_LEN};

    fn sample_binary() -> Vec<u8> {
        let mut binary = vec![0_u8];
        binary.extend(0x10_u8..0x20);
        binary
    }

    #[test]
    fn encodes_binary_address_as_uppercase_hex_with_prefix() {
        let text = encode(&sample_binary()).expect("address should encode");

        assert_eq!(text.len(), TEXT_ADDRESS_LEN);
        assert_eq!(text, "@101112131415161718191A1B1C1D1E1F");
    }

    #[test]
    fn decode_restores_original_binary_address() {
        let binary = sample_binary();
        let text = encode(&binary).expect("address should encode");
        let decoded = decode(&text).expect("address should decode");

        assert_eq!(decoded.len(), BINARY_ADDRESS_LEN);
        assert_eq!(decoded, binary);
        assert_eq!(encode(&decoded).expect("re-encode should succeed"), text);
    }

    #[test]
    fn every_byte_value_survives_encode_and_decode_in_every_position() {
        for position in 1..BINARY_ADDRESS_LEN {
            for value in 0..=u8::MAX {
                let mut binary = vec![0_u8; BINARY_ADDRESS_LEN];
                binary[position] = value;
                // Keep a neighbouring byte non-zero as well.
                binary[(position % 16) + 1] ^= 0x5A;

                let text = encode(&binary).expect("address should encode");
                assert_eq!(
                    decode(&text).expect("address should decode"),
                    binary,
                    "byte {value:#04X} at position {position}"
                );
            }
        }
    }

    #[test]
    fn decode_accepts_lowercase_hex() {
        let decoded = decode("@ffffffffffffffffffffffffffffff00").expect("lowercase should decode");

        assert_eq!(decoded[0], 0);
        assert_eq!(decoded[1], 0xFF);
        assert_eq!(decoded[16], 0x00);
    }

    #[test]
    fn encode_rejects_wrong_length_and_missing_zero_byte() {
        assert_eq!(
            encode(&[0_u8; 16]),
            Err(AddressError::InvalidBinaryLength { length: 16 })
        );

        let mut binary = sample_binary();
        binary[0] = 7;
        assert_eq!(encode(&binary), Err(AddressError::MissingZeroPrefix { found: 7 }));
    }

    #[test]
    fn decode_fails_loudly_on_corrupted_text() {
        assert_eq!(
            decode("@00"),
            Err(AddressError::InvalidTextLength { length: 3 })
        );
        assert_eq!(
            decode("#101112131415161718191A1B1C1D1E1F"),
            Err(AddressError::MissingTextPrefix { found: b'#' })
        );
        assert_eq!(
            decode("@1011121314151617181G1A1B1C1D1E1F"),
            Err(AddressError::InvalidHexDigit {
                position: 20,
                found: b'G'
            })
        );
    }
}
