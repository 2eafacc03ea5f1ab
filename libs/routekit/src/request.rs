use std::path::PathBuf;
use std::time::Duration;

use http::{HeaderMap, Method};

/// A fully built request, ready for a [`Transport`](crate::Transport).
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Text(String),
    /// Encoded by the transport, which also reads the files.
    Multipart(MultipartBody),
}

impl Body {
    /// Text content, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    pub boundary: String,
    /// Text fields in declaration order.
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

/// A file to upload as one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    pub path: PathBuf,
}

impl MultipartBody {
    /// `content-type` header value for this body.
    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the body, reading every file part from disk.
    ///
    /// # Errors
    ///
    /// Returns the I/O error and path of the first unreadable file.
    pub async fn encode(&self) -> Result<Vec<u8>, (PathBuf, std::io::Error)> {
        let boundary = &self.boundary;
        let mut out = Vec::new();

        for (name, value) in &self.fields {
            out.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
                    escape_quoted(name)
                )
                .as_bytes(),
            );
        }

        for file in &self.files {
            let contents = tokio::fs::read(&file.path)
                .await
                .map_err(|e| (file.path.clone(), e))?;
            let filename = file
                .path
                .file_name()
                .map(|n| escape_quoted(&n.to_string_lossy()))
                .unwrap_or_default();
            out.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    escape_quoted(&file.field)
                )
                .as_bytes(),
            );
            out.extend_from_slice(&contents);
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        Ok(out)
    }
}

/// Percent-escape `"`, CR and LF inside a quoted `Content-Disposition`
/// parameter, as browsers do for form submissions.
fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("%22"),
            '\r' => out.push_str("%0D"),
            '\n' => out.push_str("%0A"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[tokio::test]
    async fn encodes_fields_and_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let body = MultipartBody {
            boundary: "XyZ".into(),
            fields: vec![("title".into(), "Report".into())],
            files: vec![FilePart {
                field: "attachment".into(),
                path: file.path().to_path_buf(),
            }],
        };
        let encoded = String::from_utf8(body.encode().await.unwrap()).unwrap();

        assert!(encoded.starts_with(
            "--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nReport\r\n"
        ));
        assert!(encoded.contains("name=\"attachment\"; filename=\""));
        assert!(encoded.contains("\r\n\r\nhello\r\n"));
        assert!(encoded.ends_with("--XyZ--\r\n"));
        assert_eq!(body.content_type(), "multipart/form-data; boundary=XyZ");
    }

    #[tokio::test]
    async fn quotes_and_line_breaks_in_names_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a\"b.txt");
        std::fs::write(&path, b"x").unwrap();

        let body = MultipartBody {
            boundary: "XyZ".into(),
            fields: vec![("bad\"\r\nX-Injected: 1".into(), "v".into())],
            files: vec![FilePart {
                field: "up\nload".into(),
                path,
            }],
        };
        let encoded = String::from_utf8(body.encode().await.unwrap()).unwrap();

        assert!(encoded.contains("name=\"bad%22%0D%0AX-Injected: 1\"\r\n"));
        assert!(encoded.contains("name=\"up%0Aload\"; filename=\"a%22b.txt\""));
        assert!(!encoded.contains("\r\nX-Injected"));
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let body = MultipartBody {
            boundary: "b".into(),
            fields: Vec::new(),
            files: vec![FilePart {
                field: "f".into(),
                path: PathBuf::from("/no/such/file.bin"),
            }],
        };
        let (path, _) = body.encode().await.unwrap_err();
        assert_eq!(path, PathBuf::from("/no/such/file.bin"));
    }
}
