//! Per-connection facts shared with handlers.

use std::fmt;
use std::net::SocketAddr;

/// TLS protocol versions as reported by the TLS layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
    Unknown(String),
}

impl TlsVersion {
    /// Maps the common protocol names (`TLSv1.2`, `TLSv1.3`, ...) onto a version.
    pub fn from_name(name: &str) -> Self {
        match name {
            "TLSv1" | "TLSv1.0" => TlsVersion::Tls10,
            "TLSv1.1" => TlsVersion::Tls11,
            "TLSv1.2" => TlsVersion::Tls12,
            "TLSv1.3" => TlsVersion::Tls13,
            other => TlsVersion::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsVersion::Tls10 => f.write_str("TLSv1"),
            TlsVersion::Tls11 => f.write_str("TLSv1.1"),
            TlsVersion::Tls12 => f.write_str("TLSv1.2"),
            TlsVersion::Tls13 => f.write_str("TLSv1.3"),
            TlsVersion::Unknown(name) => f.write_str(name),
        }
    }
}

/// Outcome of a TLS handshake, filled in by whoever established the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsInfo {
    protocol: TlsVersion,
    cipher: String,
    sni: Vec<String>,
}

impl TlsInfo {
    pub fn new<S: Into<String>>(protocol: TlsVersion, cipher: S) -> Self {
        Self { protocol, cipher: cipher.into(), sni: Vec::new() }
    }

    #[must_use]
    pub fn with_sni<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sni.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Immutable facts about the connection a request arrived on.
///
/// Handlers signal that the connection should be closed or reset through
/// the [`CloseAction`] of their reply, never through the context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionContext {
    remote_addr: Option<SocketAddr>,
    tls: Option<TlsInfo>,
}

impl ConnectionContext {
    pub fn new(remote_addr: Option<SocketAddr>) -> Self {
        Self { remote_addr, tls: None }
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsInfo) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn negotiated_protocol(&self) -> Option<&TlsVersion> {
        self.tls.as_ref().map(|tls| &tls.protocol)
    }

    pub fn negotiated_cipher(&self) -> Option<&str> {
        self.tls.as_ref().map(|tls| tls.cipher.as_str())
    }

    /// Server names sent by the client, empty for plain connections.
    pub fn sni(&self) -> &[String] {
        self.tls.as_ref().map_or(&[], |tls| tls.sni.as_slice())
    }
}

/// What happens to the connection once the current response is flushed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CloseAction {
    /// Keep serving requests if the protocol allows it
    #[default]
    None,
    /// Close the connection gracefully
    Close,
    /// Abort the connection without a graceful shutdown
    Reset,
}

impl CloseAction {
    pub fn is_none(&self) -> bool {
        matches!(self, CloseAction::None)
    }
}
