use std::sync::Arc;

use crate::body::compression::DecoderRegistry;

/// Default socket read granularity
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Knobs of the body pipeline.
///
/// Servers start from [`BodyConfig::server`], clients from [`BodyConfig::client`]; they
/// only differ in whether a body may run until the connection closes.
#[derive(Debug, Clone)]
pub struct BodyConfig {
    allow_unknown_length: bool,
    strict_encoding: bool,
    read_buffer_size: usize,
    decoders: Arc<DecoderRegistry>,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self::server()
    }
}

impl BodyConfig {
    pub fn server() -> Self {
        Self {
            allow_unknown_length: false,
            strict_encoding: false,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            decoders: Arc::new(DecoderRegistry::new()),
        }
    }

    pub fn client() -> Self {
        Self { allow_unknown_length: true, ..Self::server() }
    }

    /// Permits bodies delimited by connection close, and chunked framing winning over a
    /// declared content-length.
    #[must_use]
    pub fn with_unknown_length(mut self, allow: bool) -> Self {
        self.allow_unknown_length = allow;
        self
    }

    /// Rejects bodies with a content coding no decoder is known for.
    #[must_use]
    pub fn with_strict_encoding(mut self, strict: bool) -> Self {
        self.strict_encoding = strict;
        self
    }

    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = Arc::new(decoders);
        self
    }

    pub fn allow_unknown_length(&self) -> bool {
        self.allow_unknown_length
    }

    pub fn strict_encoding(&self) -> bool {
        self.strict_encoding
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn decoders(&self) -> &Arc<DecoderRegistry> {
        &self.decoders
    }
}
