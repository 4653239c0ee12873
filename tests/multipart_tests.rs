mod common;

use std::io::{self, Cursor};
use std::sync::{Arc, Mutex};

use common::{content_type, multipart_body, FailingReader, Field, ThrottledReader};
use stick_http::{
    factory_fn, parse_file_upload, BufferFactory, Charset, Error, FileUpload, MimePart,
    MultipartDecoder, Options, ParamValue, Params, PartSink,
};

async fn decode_with(body: &[u8], boundary: &str, buffer_size: usize, step: usize) -> Result<Params, Error> {
    let mut params = Params::new();
    let mut input = ThrottledReader::new(body.to_vec(), step);
    MultipartDecoder::new(boundary, &BufferFactory)
        .buffer_size(buffer_size)
        .refill_threshold(buffer_size.min(64))
        .decode(&mut input, &mut params)
        .await?;
    Ok(params)
}

#[tokio::test]
async fn decodes_text_and_file_fields() {
    let body = b"--X\r\n\
Content-Disposition: form-data; name=\"color\"\r\n\r\n\
red\r\n\
--X\r\n\
Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
hi\r\n\
--X--\r\n";

    let mut params = Params::new();
    parse_file_upload(
        Some("multipart/form-data; boundary=X"),
        &mut Cursor::new(body.to_vec()),
        &mut params,
        &BufferFactory,
        &Options::new(),
    )
    .await
    .unwrap();

    assert_eq!(params.len(), 2);
    assert_eq!(params["color"], ParamValue::Text("red".into()));
    assert_eq!(
        params["doc"],
        ParamValue::File(FileUpload {
            filename: "a.txt".into(),
            content_type: Some("text/plain".into()),
            value: b"hi".to_vec(),
        })
    );
}

#[tokio::test]
async fn field_count_is_independent_of_buffer_capacity() {
    let large = "0123456789abcdef".repeat(200);
    let binary: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let body = multipart_body(
        "----boundary42",
        &[
            Field::Text("title", "hello world"),
            Field::Text("essay", &large),
            Field::File {
                name: "upload",
                filename: "data.bin",
                content_type: "application/octet-stream",
                data: &binary,
            },
            Field::Text("empty", ""),
        ],
    );

    for buffer_size in [128, 200, 257, 1024, 8192] {
        for step in [1, 7, 64, 4096] {
            let params = decode_with(&body, "----boundary42", buffer_size, step)
                .await
                .unwrap_or_else(|e| panic!("buffer {} step {}: {}", buffer_size, step, e));
            assert_eq!(params.len(), 4, "buffer {} step {}", buffer_size, step);
            assert_eq!(params["title"].as_text(), Some("hello world"));
            assert_eq!(params["essay"].as_text(), Some(large.as_str()));
            assert_eq!(params["empty"].as_text(), Some(""));
            let upload = params["upload"].as_file().unwrap();
            assert_eq!(upload.filename, "data.bin");
            assert_eq!(upload.value, binary);
        }
    }
}

#[tokio::test]
async fn buffers_smaller_than_a_field_body() {
    let value = "x".repeat(1000);
    let body = multipart_body("b", &[Field::Text("a", &value), Field::Text("b", "short")]);
    for buffer_size in [64, 128, 256] {
        for step in [1, 13, 1000] {
            let params = decode_with(&body, "b", buffer_size, step).await.unwrap();
            assert_eq!(params.len(), 2);
            assert_eq!(params["a"].as_text().map(str::len), Some(1000));
            assert_eq!(params["b"].as_text(), Some("short"));
        }
    }
}

#[tokio::test]
async fn repeated_names_collapse_into_ordered_list() {
    let body = multipart_body(
        "B",
        &[
            Field::Text("tag", "one"),
            Field::Text("other", "x"),
            Field::Text("tag", "two"),
            Field::Text("tag", "three"),
        ],
    );

    for buffer_size in [64, 8192] {
        let params = decode_with(&body, "B", buffer_size, 5).await.unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(
            params["tag"],
            ParamValue::List(vec!["one".into(), "two".into(), "three".into()])
        );
        assert_eq!(params["other"].as_text(), Some("x"));
    }
}

#[tokio::test]
async fn missing_terminal_boundary_is_malformed() {
    let mut body = multipart_body("XYZ", &[Field::Text("a", "1"), Field::Text("b", "22")]);
    let cut = body.len() - "--XYZ--\r\n".len();
    body.truncate(cut);

    for buffer_size in [64, 128, 8192] {
        for step in [1, 3, 1000] {
            let err = decode_with(&body, "XYZ", buffer_size, step).await.unwrap_err();
            assert!(err.is_malformed_multipart(), "got {:?}", err);
        }
    }
}

#[tokio::test]
async fn unterminated_part_body_is_malformed() {
    let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nno end in sight";
    let err = decode_with(body, "XYZ", 8192, 4).await.unwrap_err();
    assert!(err.is_malformed_multipart());
}

#[tokio::test]
async fn boundary_never_found_is_malformed() {
    let err = decode_with(b"just some text, nothing multipart", "XYZ", 64, 8)
        .await
        .unwrap_err();
    assert!(err.is_malformed_multipart());

    let err = decode_with(b"", "XYZ", 64, 8).await.unwrap_err();
    assert!(err.is_malformed_multipart());
}

#[tokio::test]
async fn unterminated_header_block_is_malformed() {
    let body = b"--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n";
    let err = decode_with(body, "XYZ", 8192, 8192).await.unwrap_err();
    assert!(err.is_malformed_multipart());
}

#[tokio::test]
async fn missing_boundary_parameter_is_a_no_op() {
    let mut params = Params::new();
    params.insert("kept".into(), "yes".into());
    let mut input = Cursor::new(b"whatever".to_vec());

    for content_type in [
        None,
        Some("multipart/form-data"),
        Some("multipart/form-data; boundary="),
        Some("text/plain"),
    ] {
        parse_file_upload(
            content_type,
            &mut input,
            &mut params,
            &BufferFactory,
            &Options::new(),
        )
        .await
        .unwrap();
    }

    assert_eq!(params.len(), 1);
    assert_eq!(input.position(), 0);
}

#[tokio::test]
async fn preamble_and_quoted_boundary_are_handled() {
    let mut body = b"This is a preamble that should be ignored.\r\n".to_vec();
    body.extend(multipart_body("a b:c", &[Field::Text("k", "v")]));

    let mut params = Params::new();
    parse_file_upload(
        Some("multipart/form-data; boundary=\"a b:c\""),
        &mut ThrottledReader::new(body, 3),
        &mut params,
        &BufferFactory,
        &Options::new(),
    )
    .await
    .unwrap();
    assert_eq!(params["k"].as_text(), Some("v"));
}

#[tokio::test]
async fn boundary_is_read_from_the_content_type() {
    let body = multipart_body("7d91c2", &[Field::Text("q", "rust")]);
    let mut params = Params::new();
    MultipartDecoder::from_content_type(Some(&content_type("7d91c2")), &BufferFactory)
        .unwrap()
        .buffer_size(64)
        .decode(&mut ThrottledReader::new(body, 9), &mut params)
        .await
        .unwrap();
    assert_eq!(params["q"].as_text(), Some("rust"));

    assert!(MultipartDecoder::from_content_type(Some("multipart/form-data"), &BufferFactory).is_none());
}

#[tokio::test]
async fn folded_headers_and_header_casing() {
    let body = b"--X\r\n\
content-disposition: form-data;\r\n\
\tname=\"folded\"; filename=\"f.csv\"\r\n\
CONTENT-TYPE:   text/csv  \r\n\r\n\
a,b\r\n\
--X--";
    let params = decode_with(body, "X", 8192, 8192).await.unwrap();
    let file = params["folded"].as_file().unwrap();
    assert_eq!(file.filename, "f.csv");
    assert_eq!(file.content_type.as_deref(), Some("text/csv"));
    assert_eq!(file.value, b"a,b");
}

#[tokio::test]
async fn body_containing_line_breaks_and_dashes_is_kept_intact() {
    let tricky = "line one\r\n--not-the-boundary\r\n\r\n-\r\n--";
    let body = multipart_body("BOUNDARY", &[Field::Text("t", tricky)]);
    for buffer_size in [64, 100, 8192] {
        for step in [1, 2, 5, 100] {
            let params = decode_with(&body, "BOUNDARY", buffer_size, step).await.unwrap();
            assert_eq!(params["t"].as_text(), Some(tricky));
        }
    }
}

#[tokio::test]
async fn nameless_parts_are_discarded() {
    let body = b"--X\r\n\
Content-Type: text/plain\r\n\r\n\
orphan\r\n\
--X\r\n\
Content-Disposition: form-data; name=\"named\"\r\n\r\n\
ok\r\n\
--X--\r\n";
    let params = decode_with(body, "X", 8192, 8192).await.unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params["named"].as_text(), Some("ok"));
}

#[tokio::test]
async fn text_fields_are_decoded_with_the_configured_charset() {
    let mut body = b"--X\r\nContent-Disposition: form-data; name=\"city\"\r\n\r\n".to_vec();
    body.extend_from_slice(&[0x4d, 0xfc, 0x6e, 0x63, 0x68, 0x65, 0x6e]);
    body.extend_from_slice(b"\r\n--X--\r\n");

    let mut params = Params::new();
    MultipartDecoder::new("X", &BufferFactory)
        .charset(Charset::Latin1)
        .decode(&mut Cursor::new(body), &mut params)
        .await
        .unwrap();
    assert_eq!(params["city"].as_text(), Some("München"));
}

struct CountingSink {
    part: MimePart,
    writes: Arc<Mutex<Vec<(String, usize)>>>,
    total: usize,
}

impl PartSink for CountingSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.total += bytes.len();
        Ok(())
    }

    fn finalize(self: Box<Self>) -> io::Result<ParamValue> {
        let name = self.part.name.clone().unwrap_or_default();
        self.writes.lock().unwrap().push((name, self.total));
        Ok(ParamValue::Text(format!("{} bytes", self.total)))
    }
}

#[tokio::test]
async fn custom_sink_factory_receives_streamed_parts() {
    let payload = vec![b'z'; 5000];
    let body = multipart_body(
        "S",
        &[
            Field::File {
                name: "big",
                filename: "big.bin",
                content_type: "application/octet-stream",
                data: &payload,
            },
            Field::Text("small", "abc"),
        ],
    );

    let writes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&writes);
    let factory = factory_fn(move |part: &MimePart, _charset: Charset| {
        Ok(Box::new(CountingSink {
            part: part.clone(),
            writes: Arc::clone(&seen),
            total: 0,
        }) as Box<dyn PartSink>)
    });

    let mut params = Params::new();
    MultipartDecoder::new("S", &factory)
        .buffer_size(256)
        .decode(&mut ThrottledReader::new(body, 100), &mut params)
        .await
        .unwrap();

    assert_eq!(params["big"].as_text(), Some("5000 bytes"));
    assert_eq!(params["small"].as_text(), Some("3 bytes"));
    assert_eq!(
        *writes.lock().unwrap(),
        vec![("big".to_string(), 5000), ("small".to_string(), 3)]
    );
}

#[tokio::test]
async fn io_errors_propagate_unchanged() {
    let body = multipart_body("X", &[Field::Text("a", &"x".repeat(500))]);
    let mut params = Params::new();
    let err = MultipartDecoder::new("X", &BufferFactory)
        .buffer_size(64)
        .decode(&mut FailingReader::new(body, 100), &mut params)
        .await
        .unwrap_err();
    match err {
        Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected io error, got {:?}", other),
    }
}

#[tokio::test]
async fn delimiter_must_be_followed_by_crlf() {
    let lf_only = b"--X\nContent-Disposition: form-data; name=\"a\"\n\nv\n--X--\n";
    let err = decode_with(lf_only, "X", 8192, 8192).await.unwrap_err();
    assert!(err.is_malformed_multipart(), "got {:?}", err);

    let glued = b"--Xjunk\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nv\r\n--X--\r\n";
    let err = decode_with(glued, "X", 8192, 8192).await.unwrap_err();
    assert!(err.is_malformed_multipart());
}
