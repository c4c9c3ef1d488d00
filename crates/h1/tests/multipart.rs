use std::io::Write;

use flate2::write::GzEncoder;
use indoc::indoc;
use micro_h1::body::{BodyConfig, BodyStream, MessageReader, boundary_from_content_type};
use micro_h1::codec::RequestHeadDecoder;
use micro_h1::protocol::MultipartError;

const FORM: &str = indoc! {r#"
    --AaB03x
    Content-Disposition: form-data; name="submit-name"

    Larry
    --AaB03x
    Content-Disposition: form-data; name="files"; filename="file1.txt"
    Content-Type: text/plain

    ... contents of file1.txt ...
    --AaB03x--
"#};

fn crlf(text: &str) -> Vec<u8> {
    text.replace('\n', "\r\n").into_bytes()
}

fn upload(extra_headers: &str, body: &[u8]) -> Vec<u8> {
    let mut data = crlf(&format!(
        "POST /upload HTTP/1.1\nContent-Type: multipart/form-data; boundary=AaB03x\n\
         {extra_headers}Content-Length: {}\n\n",
        body.len()
    ));
    data.extend_from_slice(body);
    data
}

#[test]
fn two_part_form_from_a_request() {
    let data = upload("", &crlf(FORM));
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let head = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    let boundary = boundary_from_content_type(head.headers()).unwrap();
    let info = head.body_info(false).unwrap();

    let mut body = BodyStream::new(&mut reader, info, &config);
    let mut parts = body.multipart(&boundary).unwrap();

    let first = parts.next_part().unwrap().unwrap();
    assert_eq!(first.name(), Some("submit-name"));
    assert_eq!(first.body_str().unwrap(), "Larry");

    let second = parts.next_part().unwrap().unwrap();
    assert_eq!(second.name(), Some("files"));
    assert_eq!(second.filename(), Some("file1.txt"));
    assert_eq!(second.header("Content-Type"), Some("text/plain"));
    assert_eq!(second.body_str().unwrap(), "... contents of file1.txt ...");

    assert!(parts.next_part().unwrap().is_none());
}

#[test]
fn compressed_multipart_body_is_decoded_first() {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&crlf(FORM)).unwrap();
    let data = upload("Content-Encoding: gzip\n", &encoder.finish().unwrap());

    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let head = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    let info = head.body_info(false).unwrap();

    let mut body = BodyStream::new(&mut reader, info, &config);
    let mut parts = body.multipart("AaB03x").unwrap();
    let mut names = Vec::new();
    while let Some(part) = parts.next_part().unwrap() {
        names.push(part.name().map(str::to_owned));
    }

    assert_eq!(names, vec![Some("submit-name".to_owned()), Some("files".to_owned())]);
}

#[test]
fn truncated_form_reports_missing_boundary() {
    let form = crlf(FORM);
    let data = upload("", &form[..form.len() / 2]);
    let config = BodyConfig::server();
    let mut reader = MessageReader::new(&data[..]);
    let head = reader.read_head(&mut RequestHeadDecoder).unwrap().unwrap();
    let info = head.body_info(false).unwrap();

    let mut body = BodyStream::new(&mut reader, info, &config);
    let mut parts = body.multipart("AaB03x").unwrap();
    let mut result = parts.next_part();
    while let Ok(Some(_)) = result {
        result = parts.next_part();
    }

    assert!(matches!(result, Err(MultipartError::MissingBoundary)));
}
