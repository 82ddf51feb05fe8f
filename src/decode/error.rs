//! Error Handling.
//!
//! This is a private module. Its public content is being re-exported by the
//! parent module.
//!
//! Decoding distinguishes two kinds of problems. Problems with the data
//! itself are described by a [`DecodeError`]. These never abort decoding of
//! a message. Instead, they are attached as an [`Annotation`] to the node
//! of the decoded tree they occurred in and decoding continues with
//! whatever can still be made sense of.
//!
//! Resource guards, on the other hand, are signalled through a
//! [`FatalError`]. These are the only conditions that reject a message.

use std::fmt;
use std::borrow::Cow;
use crate::cursor::OutOfBounds;


//------------ ErrorKind -----------------------------------------------------

/// The class of a decoding problem.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// An access would have read past the available data.
    OutOfBounds,

    /// The length octets are broken or contradict the enclosing data.
    MalformedLength,

    /// The identifier octets are broken.
    MalformedTag,

    /// The content of a value isn’t correctly encoded.
    MalformedValue,

    /// A field expected to be ASCII digits contains something else.
    InvalidNumericField,

    /// A declared length contradicts the actual amount of data.
    InvalidLength,

    /// A value with an unexpected tag was encountered.
    UnexpectedTag,

    /// A mandatory value is missing.
    MissingField,

    /// There is data left over after all expected values.
    TrailingData,

    /// The encoding is valid but not supported.
    Unsupported,

    /// A declared size is larger than the configured maximum.
    DeclaredSizeExceedsMaximum,

    /// Values are nested deeper than the configured maximum.
    RecursionLimitExceeded,

    /// No decoder is registered for an embedded value.
    UnknownDiscriminator,

    /// Sequence numbers reveal lost, repeated or out-of-window messages.
    SequenceAnomaly,

    /// Protected content could not be verified or decrypted.
    Authentication,
}

impl ErrorKind {
    /// Returns whether the kind is a resource guard.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::DeclaredSizeExceedsMaximum
                | ErrorKind::RecursionLimitExceeded
        )
    }

    /// Returns the severity an error of this kind has unless overidden.
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::UnknownDiscriminator => Severity::Note,
            ErrorKind::TrailingData
                | ErrorKind::SequenceAnomaly
                | ErrorKind::Unsupported => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ErrorKind::OutOfBounds => "out of bounds",
            ErrorKind::MalformedLength => "malformed length",
            ErrorKind::MalformedTag => "malformed tag",
            ErrorKind::MalformedValue => "malformed value",
            ErrorKind::InvalidNumericField => "invalid numeric field",
            ErrorKind::InvalidLength => "invalid length",
            ErrorKind::UnexpectedTag => "unexpected tag",
            ErrorKind::MissingField => "missing field",
            ErrorKind::TrailingData => "trailing data",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::DeclaredSizeExceedsMaximum => {
                "declared size exceeds maximum"
            }
            ErrorKind::RecursionLimitExceeded => "recursion limit exceeded",
            ErrorKind::UnknownDiscriminator => "unknown discriminator",
            ErrorKind::SequenceAnomaly => "sequence anomaly",
            ErrorKind::Authentication => "authentication",
        })
    }
}


//------------ DecodeError ---------------------------------------------------

/// A problem with the data being decoded.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{kind} at offset {pos}: {detail}")]
pub struct DecodeError {
    kind: ErrorKind,
    detail: Cow<'static, str>,

    /// The absolute position in the message.
    pos: usize,
}

impl DecodeError {
    pub fn new(
        kind: ErrorKind, detail: impl Into<Cow<'static, str>>, pos: usize
    ) -> Self {
        DecodeError { kind, detail: detail.into(), pos }
    }

    pub fn malformed_length(
        detail: impl Into<Cow<'static, str>>, pos: usize
    ) -> Self {
        Self::new(ErrorKind::MalformedLength, detail, pos)
    }

    pub fn malformed_tag(
        detail: impl Into<Cow<'static, str>>, pos: usize
    ) -> Self {
        Self::new(ErrorKind::MalformedTag, detail, pos)
    }

    pub fn malformed(
        detail: impl Into<Cow<'static, str>>, pos: usize
    ) -> Self {
        Self::new(ErrorKind::MalformedValue, detail, pos)
    }

    pub fn unsupported(
        detail: impl Into<Cow<'static, str>>, pos: usize
    ) -> Self {
        Self::new(ErrorKind::Unsupported, detail, pos)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    /// Replaces the error kind, keeping detail and position.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

impl From<OutOfBounds> for DecodeError {
    fn from(err: OutOfBounds) -> Self {
        DecodeError::new(
            ErrorKind::OutOfBounds, "unexpected end of data", err.offset
        )
    }
}

impl From<FatalError> for DecodeError {
    fn from(err: FatalError) -> Self {
        let pos = err.pos();
        DecodeError::new(err.kind(), err.to_string(), pos)
    }
}


//------------ Severity ------------------------------------------------------

/// How serious an annotation is.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd,
    serde::Serialize
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}


//------------ Annotation ----------------------------------------------------

/// A decode error attached to a node of the decoded tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Annotation {
    severity: Severity,
    error: DecodeError,
}

impl Annotation {
    pub fn new(severity: Severity, error: DecodeError) -> Self {
        Annotation { severity, error }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn error(&self) -> &DecodeError {
        &self.error
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<DecodeError> for Annotation {
    fn from(error: DecodeError) -> Self {
        Annotation { severity: error.kind().default_severity(), error }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.error)
    }
}


//------------ FatalError ----------------------------------------------------

/// A resource guard rejected the data.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FatalError {
    #[error("declared size of {declared} octets exceeds maximum of {maximum}")]
    DeclaredSizeExceedsMaximum {
        declared: u64,
        maximum: u64,
        pos: usize,
    },

    #[error("nesting exceeds the maximum depth of {limit}")]
    RecursionLimitExceeded {
        limit: usize,
        pos: usize,
    },
}

impl FatalError {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            FatalError::DeclaredSizeExceedsMaximum { .. } => {
                ErrorKind::DeclaredSizeExceedsMaximum
            }
            FatalError::RecursionLimitExceeded { .. } => {
                ErrorKind::RecursionLimitExceeded
            }
        }
    }

    pub fn pos(&self) -> usize {
        match *self {
            FatalError::DeclaredSizeExceedsMaximum { pos, .. } => pos,
            FatalError::RecursionLimitExceeded { pos, .. } => pos,
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn out_of_bounds_converts() {
        let err = DecodeError::from(
            OutOfBounds { offset: 7, width: 2, end: 8 }
        );
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        assert_eq!(err.pos(), 7);
        assert_eq!(
            err.to_string(), "out of bounds at offset 7: unexpected end of data"
        );
    }

    #[test]
    fn severities() {
        let note = Annotation::from(DecodeError::new(
            ErrorKind::UnknownDiscriminator, "no decoder", 0
        ));
        assert_eq!(note.severity(), Severity::Note);
        let err = Annotation::from(DecodeError::malformed("bad", 0));
        assert_eq!(err.severity(), Severity::Error);
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn fatal_round_trip() {
        let fatal = FatalError::RecursionLimitExceeded { limit: 4, pos: 12 };
        let err = DecodeError::from(fatal.clone());
        assert!(err.is_fatal());
        assert_eq!(err.pos(), 12);
        assert_eq!(err.kind(), fatal.kind());
    }
}
