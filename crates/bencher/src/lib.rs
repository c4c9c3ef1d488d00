//! Fixtures shared by the decoder benchmarks.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

#[derive(Debug, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    payload: Vec<u8>,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, payload: Vec<u8>) -> Self {
        Self { name, group, payload }
    }

    pub fn small(name: &'static str, payload: Vec<u8>) -> Self {
        Self::new(name, TestGroup::Small, payload)
    }

    pub fn normal(name: &'static str, payload: Vec<u8>) -> Self {
        Self::new(name, TestGroup::Normal, payload)
    }

    pub fn large(name: &'static str, payload: Vec<u8>) -> Self {
        Self::new(name, TestGroup::Large, payload)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}

impl TestGroup {
    /// Body size used for this group.
    pub fn body_size(self) -> usize {
        match self {
            TestGroup::Small => 256,
            TestGroup::Normal => 16 * 1024,
            TestGroup::Large => 1024 * 1024,
        }
    }
}

/// Repetitive text, compressible like typical markup.
pub fn text_body(size: usize) -> Vec<u8> {
    b"<li class=\"item\">micro-h1 benchmark line</li>\n".iter().copied().cycle().take(size).collect()
}

/// `body` in chunked framing, split into chunks of `chunk_size` bytes.
pub fn chunked(body: &[u8], chunk_size: usize) -> Vec<u8> {
    let mut framed = Vec::with_capacity(body.len() + body.len() / chunk_size.max(1) * 8 + 8);
    for chunk in body.chunks(chunk_size.max(1)) {
        framed.extend_from_slice(format!("{:X}\r\n", chunk.len()).as_bytes());
        framed.extend_from_slice(chunk);
        framed.extend_from_slice(b"\r\n");
    }
    framed.extend_from_slice(b"0\r\n\r\n");
    framed
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).expect("writing to a vec never fails");
    encoder.finish().expect("writing to a vec never fails")
}

/// A request head followed by its framed `body`.
pub fn request(extra_headers: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!("POST /upload HTTP/1.1\r\nHost: localhost\r\n{extra_headers}\r\n").into_bytes();
    request.extend_from_slice(body);
    request
}
