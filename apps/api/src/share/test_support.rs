//! Builders for multipart share submissions used across the share tests.

use axum::body::Body;
use axum::http::{header, Method, Request};

const BOUNDARY: &str = "----jobmail-test-boundary";

pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

impl Part {
    pub fn text(name: &str, value: &str) -> Self {
        Part::Text {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn file(name: &str, file_name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Part::File {
            name: name.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }
}

pub fn multipart_body(parts: Vec<Part>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {mime_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(path: &str, parts: Vec<Part>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}
