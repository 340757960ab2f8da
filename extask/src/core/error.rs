use thiserror::Error;

/// Error raised while mapping variables between their native and wire forms.
///
/// Encoding failures surface synchronously to whoever builds the outgoing
/// request; decoding failures cause the affected task to be skipped for the
/// current poll cycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The value (or payload) has no wire mapping, or its payload could not
    /// be converted.
    #[error("Exception while converting variable value of type '{type_name}': {reason}")]
    UnsupportedType { type_name: String, reason: String },

    /// The declared object type is not registered on the decoding side.
    #[error("Cannot deserialize object of type '{type_name}': the type of the object is not on the class path")]
    UnknownType { type_name: String },

    /// An object value without an `objectTypeName` cannot be decoded or encoded.
    #[error("no 'objectTypeName' provided for non-null object value")]
    MissingObjectTypeName,

    /// A wire value was structurally invalid (for example a string where a
    /// number was expected).
    #[error("invalid value for type '{type_name}': {reason}")]
    InvalidValue { type_name: String, reason: String },
}

impl CodecError {
    pub(crate) fn unsupported(type_name: impl Into<String>, reason: impl ToString) -> Self {
        CodecError::UnsupportedType {
            type_name: type_name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(type_name: impl Into<String>, reason: impl ToString) -> Self {
        CodecError::InvalidValue {
            type_name: type_name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
