//! Core HTTP/1.x protocol types.
//!
//! - **Message handling** ([`Message`], [`PayloadItem`]): head or payload items flowing
//!   through the codecs
//! - **Framing** ([`Framing`], [`BodyInfo`]): how many body bytes follow a head
//! - **Heads** ([`RequestHeader`], [`ResponseHead`]) and the body rules attached to them
//! - **Connection facts** ([`ConnectionContext`], [`CloseAction`])
//! - **Errors** ([`HttpError`], [`ParseError`], [`BodyError`], ...)

mod message;
pub use message::Message;
pub use message::PayloadItem;

mod framing;
pub use framing::BodyInfo;
pub use framing::Framing;
pub use framing::connection_has_token;
pub use framing::content_length;
pub use framing::declared_encoding;
pub use framing::is_chunked;
pub use framing::transfer_codings;

mod request;
pub use request::RequestHeader;
pub use request::request_allows_body;
pub(crate) use request::parse_version;

mod response;
pub use response::ResponseHead;
pub use response::response_allows_body;
pub use response::response_body_info;
pub use response::response_is_keep_alive;

mod context;
pub use context::CloseAction;
pub use context::ConnectionContext;
pub use context::TlsInfo;
pub use context::TlsVersion;

mod error;
pub use error::BodyError;
pub use error::CompressionError;
pub use error::HttpError;
pub use error::MultipartError;
pub use error::ParseError;
pub use error::SendError;
