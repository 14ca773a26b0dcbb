//! Multipart form data parsing.
//!
//! Parses `multipart/form-data` request bodies into the field and file maps
//! that get attached to the request before a form-mode handler runs. Parsing
//! is boundary-based over the fully buffered body; a request body that never
//! completes never reaches this module.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// RFC 2046 recommends multipart boundary length <= 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// Errors that can occur during multipart parsing.
#[derive(Debug, PartialEq, Eq)]
pub enum MultipartError {
    /// Missing boundary in Content-Type header.
    MissingBoundary,
    /// Content-Type is not multipart/form-data or the boundary is malformed.
    InvalidBoundary,
    /// Missing or unusable Content-Disposition header in a part.
    InvalidContentDisposition,
    /// Malformed part headers.
    InvalidPartHeaders,
    /// Body ended before the closing boundary.
    UnexpectedEof,
    /// Structural violation of the multipart format.
    InvalidFormat(&'static str),
}

impl std::fmt::Display for MultipartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBoundary => write!(f, "missing boundary in multipart Content-Type"),
            Self::InvalidBoundary => write!(f, "invalid multipart boundary"),
            Self::InvalidContentDisposition => {
                write!(f, "missing or invalid Content-Disposition header in part")
            }
            Self::InvalidPartHeaders => write!(f, "invalid part headers"),
            Self::UnexpectedEof => write!(f, "unexpected end of multipart data"),
            Self::InvalidFormat(detail) => write!(f, "invalid multipart format: {detail}"),
        }
    }
}

impl std::error::Error for MultipartError {}

/// A file extracted from a multipart body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    /// Original filename from Content-Disposition.
    pub filename: String,
    /// Content-Type of the part, defaulting to `application/octet-stream`.
    pub content_type: String,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

/// Structured result of parsing a form submission.
///
/// A part with a `filename` lands in `files`, everything else in `fields`.
/// Repeated names accumulate in order, mirroring how browsers submit
/// multi-valued inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormData {
    pub fields: HashMap<String, Vec<String>>,
    pub files: HashMap<String, Vec<UploadedFile>>,
}

impl FormData {
    /// First value of a named field, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)?.first().map(String::as_str)
    }

    /// First file uploaded under a name, if present.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)?.first()
    }
}

/// Parse the boundary out of a Content-Type header.
///
/// Content-Type format: `multipart/form-data; boundary=----WebKitFormBoundary...`
pub fn parse_boundary(content_type: &str) -> Result<String, MultipartError> {
    let content_type = content_type.trim();
    let main = content_type.split(';').next().unwrap_or("").trim();
    if !main.eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::InvalidBoundary);
    }
    for param in content_type.split(';').skip(1) {
        let Some((k, v)) = param.trim().split_once('=') else {
            continue;
        };
        if k.trim().eq_ignore_ascii_case("boundary") {
            let boundary = v.trim().trim_matches('"');
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(MultipartError::InvalidBoundary);
            }
            return Ok(boundary.to_string());
        }
    }
    Err(MultipartError::MissingBoundary)
}

/// Parse a buffered multipart body into field and file maps.
///
/// # Errors
///
/// Any structural problem is reported as a [`MultipartError`]; the caller
/// turns that into a 500 response rather than invoking the handler.
pub fn parse_form(content_type: &str, body: &[u8]) -> Result<FormData, MultipartError> {
    let boundary = parse_boundary(content_type)?;
    let delim = format!("--{boundary}").into_bytes();
    let mut form = FormData::default();

    let mut pos = find_boundary(body, &delim, 0)?;
    loop {
        let after = pos + delim.len();
        // Closing delimiter is the boundary followed by "--".
        if body.len() >= after + 2 && body[after..after + 2] == *b"--" {
            break;
        }
        if body.len() < after + 2 {
            return Err(MultipartError::UnexpectedEof);
        }
        if body[after..after + 2] != *b"\r\n" {
            return Err(MultipartError::InvalidFormat("expected CRLF after boundary"));
        }
        let mut cursor = after + 2;

        let (headers, body_start) = parse_part_headers(body, cursor)?;
        cursor = body_start;

        let disposition = headers
            .get("content-disposition")
            .ok_or(MultipartError::InvalidContentDisposition)?;
        let name = disposition_param(disposition, "name")
            .ok_or(MultipartError::InvalidContentDisposition)?;
        let filename = disposition_param(disposition, "filename");

        let data_end = find_boundary(body, &delim, cursor)?;
        // Part data runs up to the CRLF that precedes the next boundary.
        if data_end < cursor + 2 || body[data_end - 2..data_end] != *b"\r\n" {
            return Err(MultipartError::InvalidFormat("expected CRLF before boundary"));
        }
        let data = &body[cursor..data_end - 2];

        match filename {
            Some(filename) => {
                let content_type = headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                form.files.entry(name).or_default().push(UploadedFile {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            None => {
                let text = String::from_utf8_lossy(data).into_owned();
                form.fields.entry(name).or_default().push(text);
            }
        }
        pos = data_end;
    }
    Ok(form)
}

/// Find the next occurrence of the delimiter at or after `start`.
fn find_boundary(body: &[u8], delim: &[u8], start: usize) -> Result<usize, MultipartError> {
    if start > body.len() {
        return Err(MultipartError::UnexpectedEof);
    }
    body[start..]
        .windows(delim.len())
        .position(|w| w == delim)
        .map(|p| start + p)
        .ok_or(MultipartError::UnexpectedEof)
}

/// Parse the header block of a part, returning lowercase-keyed headers and
/// the offset of the first data byte.
fn parse_part_headers(
    body: &[u8],
    mut pos: usize,
) -> Result<(HashMap<String, String>, usize), MultipartError> {
    let mut headers = HashMap::new();
    loop {
        let line_end = body[pos..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|p| pos + p)
            .ok_or(MultipartError::UnexpectedEof)?;
        if line_end == pos {
            // Blank line terminates the header block.
            return Ok((headers, pos + 2));
        }
        let line = std::str::from_utf8(&body[pos..line_end])
            .map_err(|_| MultipartError::InvalidPartHeaders)?;
        let (name, value) = line
            .split_once(':')
            .ok_or(MultipartError::InvalidPartHeaders)?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        pos = line_end + 2;
    }
}

/// Extract a quoted or bare parameter from a Content-Disposition value.
fn disposition_param(disposition: &str, param: &str) -> Option<String> {
    for piece in disposition.split(';').skip(1) {
        let (k, v) = piece.trim().split_once('=')?;
        if k.trim().eq_ignore_ascii_case(param) {
            return Some(v.trim().trim_matches('"').to_string());
        }
    }
    None
}
