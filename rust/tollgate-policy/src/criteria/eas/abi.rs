//! Decoding of ABI-encoded attestation data.
//!
//! Attestation schemas are declared as a comma separated list of
//! `type name` pairs, e.g. `string did,address owner`. The data is the
//! standard contract ABI encoding of a tuple of those types: one 32 byte
//! head word per field, with `bytes` and `string` values stored in the tail
//! behind an offset.

use std::{fmt, str::FromStr};

const WORD: usize = 32;

/// Errors from parsing a schema or decoding data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    /// The schema uses a type this decoder does not support.
    #[error("unsupported ABI type {0:?}")]
    UnsupportedType(String),

    /// The schema definition is malformed.
    #[error("invalid schema definition: {0}")]
    InvalidSchema(String),

    /// The data is not valid hex.
    #[error("invalid hex data: {0}")]
    InvalidHex(String),

    /// A read would leave the data.
    #[error("read of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds {
        /// Where the read starts
        offset: usize,
        /// How many bytes it needs
        len: usize,
    },

    /// A word does not hold a valid value of its type.
    #[error("invalid {kind} value: {reason}")]
    InvalidValue {
        /// The type being decoded
        kind: AbiType,
        /// What is wrong with it
        reason: String,
    },
}

/// A supported ABI type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    /// A 20 byte account address.
    Address,
    /// A boolean.
    Bool,
    /// An unsigned integer of the given bit width.
    Uint(u16),
    /// A signed integer of the given bit width.
    Int(u16),
    /// A fixed-size byte array of the given length.
    FixedBytes(u8),
    /// A dynamic byte array.
    Bytes,
    /// A dynamic UTF-8 string.
    String,
}

impl AbiType {
    const fn is_dynamic(self) -> bool {
        matches!(self, Self::Bytes | Self::String)
    }
}

fn bit_width(bits: &str, kind: &str) -> Result<u16, AbiError> {
    if bits.is_empty() {
        return Ok(256);
    }
    match bits.parse::<u16>() {
        Ok(n) if n % 8 == 0 && (8..=256).contains(&n) => Ok(n),
        _ => Err(AbiError::UnsupportedType(format!("{kind}{bits}"))),
    }
}

impl FromStr for AbiType {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "address" => return Ok(Self::Address),
            "bool" => return Ok(Self::Bool),
            "bytes" => return Ok(Self::Bytes),
            "string" => return Ok(Self::String),
            _ => {}
        }
        if let Some(bits) = s.strip_prefix("uint") {
            return bit_width(bits, "uint").map(Self::Uint);
        }
        if let Some(bits) = s.strip_prefix("int") {
            return bit_width(bits, "int").map(Self::Int);
        }
        if let Some(size) = s.strip_prefix("bytes") {
            return match size.parse::<u8>() {
                Ok(n) if (1..=32).contains(&n) => Ok(Self::FixedBytes(n)),
                _ => Err(AbiError::UnsupportedType(s.to_string())),
            };
        }
        Err(AbiError::UnsupportedType(s.to_string()))
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => f.write_str("address"),
            Self::Bool => f.write_str("bool"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::FixedBytes(n) => write!(f, "bytes{n}"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
        }
    }
}

/// One named field of an attestation schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// The field's type.
    pub kind: AbiType,
    /// The field's name.
    pub name: String,
}

impl SchemaField {
    /// Parse a schema definition such as `string did,address owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if a field is not a `type name` pair or uses an
    /// unsupported type.
    pub fn parse_schema(definition: &str) -> Result<Vec<Self>, AbiError> {
        definition
            .split(',')
            .map(|field| {
                let mut parts = field.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(kind), Some(name), None) => Ok(Self {
                        kind: kind.parse()?,
                        name: name.to_string(),
                    }),
                    _ => Err(AbiError::InvalidSchema(format!("bad field {field:?}"))),
                }
            })
            .collect()
    }
}

/// A decoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    /// An address.
    Address([u8; 20]),
    /// A boolean.
    Bool(bool),
    /// An unsigned integer, as its big-endian 32 byte word.
    Uint([u8; 32]),
    /// A signed integer, as its big-endian two's complement 32 byte word.
    Int([u8; 32]),
    /// A fixed-size byte array.
    FixedBytes(Vec<u8>),
    /// A dynamic byte array.
    Bytes(Vec<u8>),
    /// A string.
    String(String),
}

impl AbiValue {
    /// The value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AbiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Uint(word) | Self::Int(word) => write!(f, "0x{}", hex::encode(word)),
            Self::FixedBytes(bytes) | Self::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// Decode `0x`-prefixed (or bare) hex data as a tuple of `types`.
///
/// # Errors
///
/// Returns an error if the hex is malformed or the data does not decode.
pub fn decode_hex(types: &[AbiType], data: &str) -> Result<Vec<AbiValue>, AbiError> {
    let data = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(data).map_err(|e| AbiError::InvalidHex(e.to_string()))?;
    decode(types, &bytes)
}

/// Decode ABI data as a tuple of `types`.
///
/// # Errors
///
/// Returns an error if any offset or length leaves the data, or a word
/// does not hold a valid value of its type.
pub fn decode(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
    types
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            let head = word(data, index * WORD)?;
            if kind.is_dynamic() {
                decode_dynamic(*kind, data, head)
            } else {
                decode_static(*kind, head)
            }
        })
        .collect()
}

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], AbiError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(AbiError::OutOfBounds { offset, len })
}

fn word(data: &[u8], offset: usize) -> Result<&[u8; 32], AbiError> {
    slice(data, offset, WORD)?
        .try_into()
        .map_err(|_| AbiError::OutOfBounds { offset, len: WORD })
}

/// Read a word as a `usize`, rejecting values that cannot be offsets.
fn word_to_usize(kind: AbiType, word: &[u8; 32]) -> Result<usize, AbiError> {
    let (high, low) = word.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(AbiError::InvalidValue {
            kind,
            reason: "offset or length does not fit in 64 bits".to_string(),
        });
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|_| AbiError::InvalidValue {
        kind,
        reason: "offset or length does not fit in memory".to_string(),
    })
}

fn decode_dynamic(kind: AbiType, data: &[u8], head: &[u8; 32]) -> Result<AbiValue, AbiError> {
    let offset = word_to_usize(kind, head)?;
    let len = word_to_usize(kind, word(data, offset)?)?;
    let start = offset
        .checked_add(WORD)
        .ok_or(AbiError::OutOfBounds { offset, len: WORD })?;
    let bytes = slice(data, start, len)?.to_vec();
    match kind {
        AbiType::String => String::from_utf8(bytes)
            .map(AbiValue::String)
            .map_err(|e| AbiError::InvalidValue {
                kind,
                reason: e.to_string(),
            }),
        _ => Ok(AbiValue::Bytes(bytes)),
    }
}

fn decode_static(kind: AbiType, head: &[u8; 32]) -> Result<AbiValue, AbiError> {
    let invalid = |reason: &str| AbiError::InvalidValue {
        kind,
        reason: reason.to_string(),
    };
    match kind {
        AbiType::Address => {
            let (padding, address) = head.split_at(WORD - 20);
            if padding.iter().any(|b| *b != 0) {
                return Err(invalid("non-zero padding"));
            }
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(address);
            Ok(AbiValue::Address(bytes))
        }
        AbiType::Bool => match (head[..WORD - 1].iter().all(|b| *b == 0), head[WORD - 1]) {
            (true, 0) => Ok(AbiValue::Bool(false)),
            (true, 1) => Ok(AbiValue::Bool(true)),
            _ => Err(invalid("not 0 or 1")),
        },
        AbiType::Uint(bits) => {
            let unused = WORD - usize::from(bits / 8);
            if head[..unused].iter().any(|b| *b != 0) {
                return Err(invalid("value exceeds bit width"));
            }
            Ok(AbiValue::Uint(*head))
        }
        AbiType::Int(bits) => {
            let unused = WORD - usize::from(bits / 8);
            let sign = if head[unused] & 0x80 == 0 { 0x00 } else { 0xff };
            if head[..unused].iter().any(|b| *b != sign) {
                return Err(invalid("value is not sign extended"));
            }
            Ok(AbiValue::Int(*head))
        }
        AbiType::FixedBytes(n) => {
            let (value, padding) = head.split_at(usize::from(n));
            if padding.iter().any(|b| *b != 0) {
                return Err(invalid("non-zero padding"));
            }
            Ok(AbiValue::FixedBytes(value.to_vec()))
        }
        AbiType::Bytes | AbiType::String => Err(invalid("dynamic type in static position")),
    }
}
