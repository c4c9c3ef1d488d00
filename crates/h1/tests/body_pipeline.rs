use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use indoc::indoc;
use micro_h1::body::{BodyConfig, BodyDecoder, BodyStream, Compression, DecoderRegistry, MessageReader};
use micro_h1::codec::{ChunkedEncoder, RequestHeadDecoder};
use micro_h1::protocol::{BodyError, BodyInfo, CompressionError, Framing, PayloadItem};
use tokio_util::codec::Encoder;

fn crlf(text: &str) -> Vec<u8> {
    text.replace('\n', "\r\n").into_bytes()
}

fn request(headers: &str, body: &[u8]) -> Vec<u8> {
    let mut request = crlf(headers);
    request.extend_from_slice(body);
    request
}

/// Reads the next request head and describes its body.
fn next_body_info(reader: &mut MessageReader<&[u8]>, config: &BodyConfig) -> BodyInfo {
    let head = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    head.body_info(config.allow_unknown_length()).unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn chunked(pieces: &[&[u8]]) -> Vec<u8> {
    let mut encoder = ChunkedEncoder::new();
    let mut dst = BytesMut::new();
    for piece in pieces {
        encoder.encode(PayloadItem::Chunk(Bytes::copy_from_slice(piece)), &mut dst).unwrap();
    }
    encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
    dst.to_vec()
}

const CHUNKED_HEAD: &str = indoc! {"
    POST /upload HTTP/1.1
    Host: localhost
    Transfer-Encoding: chunked

"};

#[test]
fn content_length_prefix_leaves_the_rest() {
    let data = request("POST / HTTP/1.1\nContent-Length: 5\n\n", b"helloEXTRA");
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert!(body.has_body());
    assert_eq!(body.content_length(), Some(5));
    assert_eq!(body.read_as_string().unwrap(), "hello");
    assert_eq!(body.drain().unwrap(), 0);
    drop(body);

    assert_eq!(reader.buffered(), b"EXTRA");
}

#[test]
fn chunked_round_trip() {
    let data = request(CHUNKED_HEAD, &chunked(&[b"hello".as_slice(), b" ", b"chunked", b" world"]));
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert!(body.is_chunked());
    assert_eq!(body.read_as_bytes().unwrap(), Bytes::from_static(b"hello chunked world"));
    drop(body);

    assert!(reader.is_reusable());
    assert!(reader.buffered().is_empty());
}

#[test]
fn chunked_round_trip_without_chunks() {
    let data = request(CHUNKED_HEAD, &chunked(&[]));
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert!(body.has_body());
    assert!(body.read_as_bytes().unwrap().is_empty());
}

#[test]
fn gzip_round_trip() {
    let text = "a body that is compressed with gzip ".repeat(50);
    let compressed = gzip(text.as_bytes());
    let head = format!("POST / HTTP/1.1\nContent-Encoding: gzip\nContent-Length: {}\n\n", compressed.len());
    let data = request(&head, &compressed);
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert!(body.is_compressed());
    assert_eq!(body.read_as_string().unwrap(), text);
    assert!(body.is_compressed());
    assert_eq!(body.compression().unwrap(), Compression::Gzip);
}

#[test]
fn mislabeled_gzip_passes_through() {
    let data = request("POST / HTTP/1.1\nContent-Encoding: gzip\nContent-Length: 11\n\n", b"plain words");
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert_eq!(body.read_as_string().unwrap(), "plain words");
    assert!(!body.is_compressed());
}

#[test]
fn wrapped_and_raw_deflate_decode_the_same() {
    let text = b"deflate comes in two flavours, with and without the zlib wrapper";

    let mut wrapped = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    wrapped.write_all(text).unwrap();
    let mut raw = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    raw.write_all(text).unwrap();

    for (encoded, expected) in [
        (wrapped.finish().unwrap(), Compression::Deflate { wrapped: true }),
        (raw.finish().unwrap(), Compression::Deflate { wrapped: false }),
    ] {
        let head = format!("POST / HTTP/1.1\nContent-Encoding: deflate\nContent-Length: {}\n\n", encoded.len());
        let data = request(&head, &encoded);
        let config = BodyConfig::server();
        let mut reader = MessageReader::new(&data[..]);
        let info = next_body_info(&mut reader, &config);

        let mut body = BodyStream::new(&mut reader, info, &config);
        assert_eq!(&body.read_as_bytes().unwrap()[..], &text[..]);
        assert_eq!(body.compression().unwrap(), expected);
    }
}

#[test]
fn drain_is_idempotent() {
    let data = request("POST / HTTP/1.1\nContent-Length: 10\n\n", b"0123456789GET /next HTTP/1.1\r\n\r\n");
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    let mut first = [0u8; 3];
    body.stream().read_exact(&mut first).unwrap();
    assert_eq!(body.drain().unwrap(), 7);
    assert_eq!(body.drain().unwrap(), 0);
    assert_eq!(body.read(&mut first).unwrap(), 0);
    drop(body);

    let next = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    assert_eq!(next.uri().path(), "/next");
}

#[test]
fn unread_body_is_skipped_by_the_reader() {
    let mut data = request(CHUNKED_HEAD, &chunked(&[b"never".as_slice(), b"read"]));
    data.extend_from_slice(b"GET /after HTTP/1.1\r\n\r\n");
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    drop(BodyStream::new(&mut reader, info, &config));

    let next = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    assert_eq!(next.uri().path(), "/after");
}

#[test]
fn malformed_chunk_size_is_a_framing_error() {
    let data = request(CHUNKED_HEAD, b"zz\r\nhello\r\n0\r\n\r\n");
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    let error = body.read_as_bytes().unwrap_err();
    match &error {
        BodyError::Parse(e) => assert!(e.is_framing()),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(error.is_fatal());
    drop(body);

    assert!(!reader.is_reusable());
}

#[test]
fn premature_end_is_a_transport_error() {
    let data = request("POST / HTTP/1.1\nContent-Length: 100\n\n", b"short");
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    match body.read_as_bytes().unwrap_err() {
        BodyError::Parse(e) => assert!(e.is_transport()),
        other => panic!("unexpected error {other:?}"),
    }
    drop(body);

    assert!(reader.is_broken());
}

#[test]
fn gzip_listed_as_transfer_coding() {
    let compressed = gzip(b"transfer coded");
    let data = request(
        "POST / HTTP/1.1\nTransfer-Encoding: gzip, chunked\n\n",
        &chunked(&[&compressed[..4], &compressed[4..]]),
    );
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);
    assert_eq!(info.framing(), Framing::Chunked);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert!(body.is_compressed());
    assert_eq!(body.read_as_string().unwrap(), "transfer coded");
}

#[test]
fn concatenated_gzip_members() {
    let mut compressed = gzip(b"first member, ");
    compressed.extend_from_slice(&gzip(b"second member"));
    let head = format!("POST / HTTP/1.1\nContent-Encoding: gzip\nContent-Length: {}\n\n", compressed.len());
    let data = request(&head, &compressed);
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert_eq!(body.read_as_string().unwrap(), "first member, second member");
}

/// A chunked body holding a gzip stream followed by bytes the stream does not cover,
/// then a second request.
fn gzip_with_trailing_bytes(text: &str) -> Vec<u8> {
    let mut encoded = gzip(text.as_bytes());
    encoded.extend_from_slice(b"not part of the gzip stream");
    let pieces: Vec<&[u8]> = encoded.chunks(7).collect();

    let head = "POST /first HTTP/1.1\nContent-Encoding: gzip\nTransfer-Encoding: chunked\n\n";
    let mut data = request(head, &chunked(&pieces));
    data.extend_from_slice(b"GET /next HTTP/1.1\r\n\r\n");
    data
}

#[test]
fn partly_read_gzip_body_drains_to_the_next_message() {
    let text = "partially consumed gzip body ".repeat(40);
    let data = gzip_with_trailing_bytes(&text);
    let config = BodyConfig::server();
    let mut reader = MessageReader::with_read_size(&data[..], 5);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    let mut start = [0u8; 10];
    body.stream().read_exact(&mut start).unwrap();
    assert_eq!(&start, &text.as_bytes()[..10]);
    assert!(body.drain().unwrap() > 0);
    assert_eq!(body.drain().unwrap(), 0);
    drop(body);

    assert!(reader.is_reusable());
    let next = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    assert_eq!(next.uri().path(), "/next");
}

#[test]
fn fully_read_gzip_body_leaves_trailing_bytes_for_drain() {
    let text = "gzip stream that ends before its chunked body ".repeat(10);
    let data = gzip_with_trailing_bytes(&text);
    let config = BodyConfig::server();
    let mut reader = MessageReader::with_read_size(&data[..], 5);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert_eq!(body.read_as_string().unwrap(), text);
    body.drain().unwrap();
    drop(body);

    let next = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    assert_eq!(next.uri().path(), "/next");
}

#[test]
fn truncated_zstd_and_brotli_bodies_fail() {
    let text = "registered decoders must notice a cut stream ".repeat(300);
    let zstd_body = zstd::encode_all(text.as_bytes(), 3).unwrap();
    let brotli_body = {
        let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 5, 22);
        writer.write_all(text.as_bytes()).unwrap();
        writer.into_inner()
    };

    let config = BodyConfig::server().with_decoders(DecoderRegistry::with_defaults());
    for (encoding, encoded) in [("zstd", zstd_body), ("br", brotli_body)] {
        let cut = &encoded[..encoded.len() / 2];
        let head = format!("POST / HTTP/1.1\nContent-Encoding: {encoding}\nContent-Length: {}\n\n", cut.len());
        let data = request(&head, cut);
        let mut reader = MessageReader::new(&data[..]);
        let info = next_body_info(&mut reader, &config);

        let mut body = BodyStream::new(&mut reader, info, &config);
        let error = body.read_as_bytes().unwrap_err();
        assert!(matches!(error, BodyError::Compression(CompressionError::Corrupt { .. })), "{encoding}: {error:?}");
    }
}

#[test]
fn registered_zstd_and_brotli() {
    let text = b"registered decoders handle codings beyond gzip and deflate";
    let zstd_body = zstd::encode_all(&text[..], 3).unwrap();
    let brotli_body = {
        let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 5, 22);
        writer.write_all(text).unwrap();
        writer.into_inner()
    };

    let config = BodyConfig::server().with_decoders(DecoderRegistry::with_defaults());
    for (encoding, encoded) in [("zstd", zstd_body), ("br", brotli_body)] {
        let head = format!("POST / HTTP/1.1\nContent-Encoding: {encoding}\nContent-Length: {}\n\n", encoded.len());
        let data = request(&head, &encoded);
        let mut reader = MessageReader::new(&data[..]);
        let info = next_body_info(&mut reader, &config);

        let mut body = BodyStream::new(&mut reader, info, &config);
        assert!(body.is_compressed());
        assert_eq!(&body.read_as_bytes().unwrap()[..], &text[..]);
        assert_eq!(body.compression().unwrap(), Compression::Custom(encoding.to_owned()));
    }
}

#[derive(Default)]
struct Uppercase(BytesMut);

impl BodyDecoder for Uppercase {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.extend(data.iter().map(u8::to_ascii_uppercase));
        Ok(data.len())
    }

    fn take(&mut self) -> Bytes {
        self.0.split().freeze()
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn custom_decoder_factory() {
    let registry = DecoderRegistry::new()
        .with("x-upper", || -> io::Result<Box<dyn BodyDecoder>> { Ok(Box::new(Uppercase::default())) });
    let config = BodyConfig::server().with_decoders(registry);
    let data = request("POST / HTTP/1.1\nContent-Encoding: X-Upper\nContent-Length: 5\n\n", b"shout");
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert!(body.is_compressed());
    assert_eq!(body.read_as_string().unwrap(), "SHOUT");
}

#[test]
fn unknown_encoding_strict_and_lenient() {
    let head = "POST / HTTP/1.1\nContent-Encoding: snappy\nContent-Length: 4\n\n";
    let data = request(head, b"abcdGET / HTTP/1.1\r\n\r\n");

    let lenient = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &lenient);
    let mut body = BodyStream::new(&mut reader, info, &lenient);
    assert!(!body.is_compressed());
    assert_eq!(body.read_as_string().unwrap(), "abcd");

    let strict = BodyConfig::server().with_strict_encoding(true);
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &strict);
    let mut body = BodyStream::new(&mut reader, info, &strict);
    let error = body.read_as_bytes().unwrap_err();
    assert!(matches!(error, BodyError::Compression(CompressionError::Unsupported { .. })));
    assert!(!error.is_fatal());
    assert!(matches!(body.compression(), Err(BodyError::Failed)));
    assert!(matches!(body.compression(), Err(BodyError::Failed)));
    assert_eq!(body.drain().unwrap(), 4);
    drop(body);

    let next = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    assert_eq!(next.uri().path(), "/");
}

#[test]
fn raw_bytes_are_not_decoded() {
    let compressed = gzip(b"stays compressed");
    let head = format!("POST / HTTP/1.1\nContent-Encoding: gzip\nContent-Length: {}\n\n", compressed.len());
    let data = request(&head, &compressed);
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let info = next_body_info(&mut reader, &config);

    let mut body = BodyStream::new(&mut reader, info, &config);
    assert_eq!(&body.raw_bytes().unwrap()[..], &compressed[..]);
}

#[test]
fn conflicting_framing_is_rejected_on_servers() {
    let data = crlf("POST / HTTP/1.1\nContent-Length: 5\nTransfer-Encoding: chunked\n\n");
    let mut reader = MessageReader::new(&data[..]);
    let head = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();

    assert!(head.body_info(false).unwrap_err().is_framing());
    assert_eq!(head.body_info(true).unwrap().framing(), Framing::Chunked);
}
