use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("body error: {source}")]
    BodyError {
        #[from]
        source: BodyError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status")]
    InvalidStatus,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("conflicting message framing: {reason}")]
    ConflictingFraming { reason: String },

    #[error("unexpected eof: {reason}")]
    UnexpectedEof { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidChunk { reason: str.to_string() }
    }

    pub fn conflicting_framing<S: ToString>(str: S) -> Self {
        Self::ConflictingFraming { reason: str.to_string() }
    }

    pub fn unexpected_eof<S: ToString>(str: S) -> Self {
        Self::UnexpectedEof { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The body bytes on the wire could not be delimited.
    pub fn is_framing(&self) -> bool {
        matches!(self, Self::InvalidChunk { .. } | Self::ConflictingFraming { .. } | Self::InvalidContentLength { .. })
    }

    /// The peer went away or the socket failed while a message was in flight.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. } | Self::Io { .. })
    }
}

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("corrupt {encoding} stream: {source}")]
    Corrupt {
        encoding: String,
        #[source]
        source: io::Error,
    },

    #[error("unsupported content encoding: {encoding}")]
    Unsupported { encoding: String },

    #[error("can't create {encoding} decoder: {source}")]
    Decoder {
        encoding: String,
        #[source]
        source: io::Error,
    },
}

impl CompressionError {
    pub fn corrupt<S: ToString>(encoding: S, source: io::Error) -> Self {
        Self::Corrupt { encoding: encoding.to_string(), source }
    }

    pub fn unsupported<S: ToString>(encoding: S) -> Self {
        Self::Unsupported { encoding: encoding.to_string() }
    }

    pub fn decoder<S: ToString>(encoding: S, source: io::Error) -> Self {
        Self::Decoder { encoding: encoding.to_string(), source }
    }
}

/// Errors raised while reading a message body.
#[derive(Error, Debug)]
pub enum BodyError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("body is not valid utf-8: {source}")]
    Utf8 {
        #[from]
        source: FromUtf8Error,
    },

    #[error("body decoding has already started")]
    AlreadyDecoding,

    #[error("body stream failed earlier and can only be drained")]
    Failed,
}

impl BodyError {
    /// Whether the connection the body was read from must be discarded.
    ///
    /// Framing and transport failures leave the read position somewhere inside the message,
    /// everything else still allows the raw body to be drained.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Parse(_))
    }
}

/// Recovers a [`BodyError`] that travelled through an [`io::Read`] implementation.
impl From<io::Error> for BodyError {
    fn from(e: io::Error) -> Self {
        if !e.get_ref().is_some_and(|inner| inner.is::<BodyError>()) {
            return Self::Parse(ParseError::io(e));
        }

        match e.into_inner().map(|inner| inner.downcast::<BodyError>()) {
            Some(Ok(body_error)) => *body_error,
            _ => Self::Parse(ParseError::io(io::Error::other("body error lost while unwrapping"))),
        }
    }
}

impl From<BodyError> for io::Error {
    fn from(e: BodyError) -> Self {
        io::Error::other(e)
    }
}

#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("invalid multipart boundary: {reason}")]
    InvalidBoundary { reason: String },

    #[error("multipart boundary missing before end of body")]
    MissingBoundary,

    #[error("invalid part header: {reason}")]
    InvalidHeader { reason: String },

    #[error("body error: {source}")]
    Body {
        #[from]
        source: BodyError,
    },
}

impl MultipartError {
    pub fn invalid_boundary<S: ToString>(str: S) -> Self {
        Self::InvalidBoundary { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
