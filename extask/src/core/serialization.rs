//! Serialization data formats for object variables.
//!
//! An object variable is carried as text plus the name of the format that
//! produced it (`valueInfo.serializationDataFormat`). Three formats are
//! understood:
//!
//! | name                     | encoding                                  |
//! |--------------------------|-------------------------------------------|
//! | `application/json`       | `serde_json`                              |
//! | `application/xml`        | `quick-xml` serde support                 |
//! | `application/x-bincode`  | `bincode` (standard config), base64 text  |
//!
//! Binary payloads (`Bytes`, `File`, bincode objects) use standard base64.

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire name of the JSON data format.
pub const JSON_FORMAT: &str = "application/json";
/// Wire name of the XML data format.
pub const XML_FORMAT: &str = "application/xml";
/// Wire name of the native binary data format.
pub const BINARY_FORMAT: &str = "application/x-bincode";

/// A serialization data format for object variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/xml")]
    Xml,
    #[serde(rename = "application/x-bincode")]
    Binary,
}

impl DataFormat {
    /// Returns the wire name of this format.
    pub fn name(&self) -> &'static str {
        match self {
            DataFormat::Json => JSON_FORMAT,
            DataFormat::Xml => XML_FORMAT,
            DataFormat::Binary => BINARY_FORMAT,
        }
    }

    /// Looks a format up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            JSON_FORMAT => Some(DataFormat::Json),
            XML_FORMAT => Some(DataFormat::Xml),
            BINARY_FORMAT => Some(DataFormat::Binary),
            _ => None,
        }
    }

    /// Serializes `value` into this format's text representation.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, FormatError> {
        match self {
            DataFormat::Json => Ok(serde_json::to_string(value)?),
            DataFormat::Xml => {
                quick_xml::se::to_string(value).map_err(|e| FormatError::Xml(e.to_string()))
            }
            DataFormat::Binary => {
                let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
                Ok(encode_base64(&bytes))
            }
        }
    }

    /// Deserializes a payload produced by [`DataFormat::serialize`].
    pub fn deserialize<T: DeserializeOwned>(&self, payload: &str) -> Result<T, FormatError> {
        match self {
            DataFormat::Json => Ok(serde_json::from_str(payload)?),
            DataFormat::Xml => {
                quick_xml::de::from_str(payload).map_err(|e| FormatError::Xml(e.to_string()))
            }
            DataFormat::Binary => {
                let bytes = decode_base64(payload)?;
                let (value, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
                Ok(value)
            }
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataFormat::from_name(s).ok_or_else(|| format!("unknown serialization data format: {}", s))
    }
}

/// Failure of a single format conversion.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xml: {0}")]
    Xml(String),

    #[error("bincode encode: {0}")]
    BinaryEncode(#[from] bincode::error::EncodeError),

    #[error("bincode decode: {0}")]
    BinaryDecode(#[from] bincode::error::DecodeError),

    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encodes raw bytes as standard base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes standard base64 text.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(text.trim())
}
