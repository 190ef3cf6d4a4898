//! HTTP transport types.
//!
//! # Design
//! Requests are described as plain data: the dispatcher renders an
//! `HttpRequest` (always a POST to the REST endpoint) and a `Transport`
//! executes it. Bodies are rendered here, either as a form-urlencoded string
//! or as a `multipart/form-data` document with the file part first, so the
//! bytes on the wire can be asserted on without a network.

use std::io;
use std::path::Path;

use crate::params::ParameterSet;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A POST request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Form-urlencoded POST of every parameter.
    pub fn form(url: impl Into<String>, params: &ParameterSet) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        HttpRequest {
            url: url.into(),
            headers: vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body: body.into_bytes(),
        }
    }

    /// Multipart POST: the file part, then one text part per parameter.
    pub fn multipart(url: impl Into<String>, params: &ParameterSet, file: &FileUpload) -> Self {
        let boundary = format!("----f8-{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::with_capacity(file.bytes.len() + params.len() * 96 + 256);

        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}\"\r\n",
                name = escape_quoted(&file.file_name)
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");

        for (name, value) in params.iter() {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n",
                    escape_quoted(name)
                )
                .as_bytes(),
            );
            body.extend_from_slice(b"Content-Type: text/plain; charset=UTF-8\r\n\r\n");
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        HttpRequest {
            url: url.into(),
            headers: vec![(
                "content-type".to_string(),
                format!("multipart/form-data; boundary={boundary}"),
            )],
            body,
        }
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A file sent as the first part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Read `path` into memory, named after its final component.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
            .to_string();
        let bytes = std::fs::read(path)?;
        Ok(Self::new(file_name, content_type_for(path), bytes))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
