use std::{fmt, io};

/// The error taxonomy for page rendering.
///
/// Not every variant aborts a page: see [`RenderError::is_recoverable`] and
/// the propagation rules in the renderer. Recoverable failures are logged,
/// recorded as [`Warning`]s and the offending operator is skipped so that
/// rendering stays best-effort.
#[derive(Debug)]
pub enum RenderError {
    /// An unterminated string, array or dictionary in a content stream, or
    /// a structurally invalid operand stack.
    MalformedStream { reason: &'static str },

    /// A construct the PDF specification defines but this crate does not
    /// implement (LZW, JBIG2, certain shading types, ...).
    UnsupportedFeature { feature: String },

    /// A name that is not present in the resource tables, or an indirect
    /// reference that fails to resolve.
    InvalidReference { name: String },

    /// A filter chain or color-space conversion was handed invalid input.
    DecodeError { reason: String },

    /// An image was too large or XObject recursion went too deep.
    ResourceExhausted { what: &'static str },

    /// The cancellation signal was observed between operators.
    Cancelled,

    /// Invariant violation. Always a bug.
    Internal { reason: String },

    IoError(io::Error),
}

impl RenderError {
    pub(crate) fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    pub(crate) fn missing(name: impl Into<String>) -> Self {
        Self::InvalidReference { name: name.into() }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::DecodeError {
            reason: reason.into(),
        }
    }

    /// Whether an operator that failed with this error may be skipped
    /// without aborting the page.
    ///
    /// `MalformedStream` is recoverable here because a bad operand stack
    /// degrades to a skipped operator; the top-level tokenizer surfaces its
    /// own `MalformedStream` before any operator executes.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFeature { .. }
                | Self::InvalidReference { .. }
                | Self::DecodeError { .. }
                | Self::MalformedStream { .. }
        )
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedStream { reason } => write!(f, "malformed content stream: {}", reason),
            Self::UnsupportedFeature { feature } => write!(f, "unsupported feature: {}", feature),
            Self::InvalidReference { name } => write!(f, "invalid reference: {}", name),
            Self::DecodeError { reason } => write!(f, "decode error: {}", reason),
            Self::ResourceExhausted { what } => write!(f, "resource exhausted: {}", what),
            Self::Cancelled => write!(f, "render cancelled"),
            Self::Internal { reason } => write!(f, "internal error: {}", reason),
            Self::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<io::Error> for RenderError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// A recoverable failure recorded while rendering a page.
///
/// The page render still completed; the warning describes what was skipped
/// or approximated.
#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
}

impl Warning {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
