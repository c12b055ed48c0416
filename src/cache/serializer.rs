//! Serializer Module
//!
//! Turns arbitrary serde values into store-safe text and back.
//!
//! Frame layout before base64: `[FORMAT_VERSION][protocol id][body]`.
//! The protocol id travels with the payload, so a reader decodes records
//! written under either protocol regardless of its own setting.

use std::io::{Read, Write};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CacheError, Result};

/// Current frame format. Frames with any other version are rejected.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 2;

// == Protocol ==
/// Body encoding selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Plain serde_json
    #[default]
    Json,
    /// serde_json compressed with deflate
    JsonDeflate,
}

impl Protocol {
    fn id(self) -> u8 {
        match self {
            Protocol::Json => 0,
            Protocol::JsonDeflate => 1,
        }
    }

    fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Protocol::Json),
            1 => Some(Protocol::JsonDeflate),
            _ => None,
        }
    }
}

impl FromStr for Protocol {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Protocol::Json),
            "json-deflate" | "deflate" => Ok(Protocol::JsonDeflate),
            other => Err(CacheError::Config(format!("unknown serializer protocol: {}", other))),
        }
    }
}

// == Serializer ==
/// Encodes values with the configured protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer {
    protocol: Protocol,
}

impl Serializer {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    // == Encode ==
    /// Encodes `value` into base64 text suitable for a string field.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        let mut frame = Vec::with_capacity(json.len() + HEADER_LEN);
        frame.push(FORMAT_VERSION);
        frame.push(self.protocol.id());

        match self.protocol {
            Protocol::Json => frame.extend_from_slice(&json),
            Protocol::JsonDeflate => {
                let mut encoder = DeflateEncoder::new(frame, Compression::default());
                encoder
                    .write_all(&json)
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
                frame = encoder
                    .finish()
                    .map_err(|e| CacheError::Serialization(e.to_string()))?;
            }
        }

        Ok(STANDARD.encode(frame))
    }

    // == Decode ==
    /// Decodes text produced by [`Serializer::encode`].
    ///
    /// Fails with [`CacheError::Deserialization`] on bad base64, an unknown
    /// frame version or protocol, a corrupt body, or a type mismatch.
    pub fn decode<T: DeserializeOwned>(&self, encoded: &str) -> Result<T> {
        let frame = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| CacheError::Deserialization(format!("invalid base64: {}", e)))?;

        if frame.len() < HEADER_LEN {
            return Err(CacheError::Deserialization("truncated frame".to_string()));
        }
        if frame[0] != FORMAT_VERSION {
            return Err(CacheError::Deserialization(format!(
                "unsupported format version {}",
                frame[0]
            )));
        }
        let protocol = Protocol::from_id(frame[1]).ok_or_else(|| {
            CacheError::Deserialization(format!("unknown protocol id {}", frame[1]))
        })?;

        let body = &frame[HEADER_LEN..];
        match protocol {
            Protocol::Json => serde_json::from_slice(body)
                .map_err(|e| CacheError::Deserialization(e.to_string())),
            Protocol::JsonDeflate => {
                let mut json = Vec::new();
                DeflateDecoder::new(body)
                    .read_to_end(&mut json)
                    .map_err(|e| CacheError::Deserialization(e.to_string()))?;
                serde_json::from_slice(&json).map_err(|e| CacheError::Deserialization(e.to_string()))
            }
        }
    }
}
