//! Binary attachments sent as multipart file parts.
//!
//! A file attachment is opened and sized synchronously when the request body
//! is encoded, so an unreadable file fails the call before anything is sent.
//! Its content is then streamed into the request in fixed-size chunks and
//! never held in memory as a whole.

use crate::config::TransportConfig;
use crate::error::{Result, RpcError};
use bytes::Bytes;
use futures::stream::{self, Stream};
use reqwest::multipart::Part;
use std::collections::btree_map::{self, BTreeMap};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Where an attachment's bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// A file on the local filesystem.
    Path(PathBuf),
    /// Caller-owned bytes.
    Bytes(Bytes),
}

/// A named binary stream associated with a parameter.
#[derive(Debug, Clone)]
pub struct Attachment {
    source: AttachmentSource,
    file_name: Option<String>,
    content_type: Option<String>,
}

impl Attachment {
    /// Attach a file by path.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: AttachmentSource::Path(path.into()),
            file_name: None,
            content_type: None,
        }
    }

    /// Attach in-memory bytes.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            source: AttachmentSource::Bytes(data.into()),
            file_name: None,
            content_type: None,
        }
    }

    /// Override the filename sent with the part.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Override the guessed content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn source(&self) -> &AttachmentSource {
        &self.source
    }

    /// Filename sent with the part. `index` is the attachment's 1-based
    /// position under its parameter name.
    pub fn file_name(&self, index: usize) -> String {
        if let Some(name) = &self.file_name {
            return name.clone();
        }
        match &self.source {
            AttachmentSource::Path(path) => path
                .file_name()
                .and_then(|f| f.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("attachment-{}", index)),
            AttachmentSource::Bytes(_) => format!("attachment-{}", index),
        }
    }

    /// Content type sent with the part.
    pub fn content_type(&self, file_name: &str) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(file_name).to_string())
    }

    /// Open the attachment and turn it into a streaming multipart part.
    pub(crate) fn open_part(&self, parameter: &str, index: usize) -> Result<Part> {
        let file_name = self.file_name(index);
        let content_type = self.content_type(&file_name);

        let part = match &self.source {
            AttachmentSource::Path(path) => {
                let (file, length) = open_file(parameter, path)?;
                debug!(
                    "Streaming attachment '{}' for '{}' ({} bytes)",
                    path.display(),
                    parameter,
                    length
                );
                let body = reqwest::Body::wrap_stream(file_stream(file));
                Part::stream_with_length(body, length)
            }
            AttachmentSource::Bytes(data) => {
                Part::stream_with_length(reqwest::Body::from(data.clone()), data.len() as u64)
            }
        };

        part.file_name(file_name)
            .mime_str(&content_type)
            .map_err(|e| RpcError::UnsupportedArgumentShape {
                parameter: parameter.to_string(),
                reason: format!("invalid attachment content type '{}': {}", content_type, e),
            })
    }
}

/// Open a regular file for streaming and return it with its byte length.
fn open_file(parameter: &str, path: &Path) -> Result<(tokio::fs::File, u64)> {
    let file = std::fs::File::open(path)
        .map_err(|e| RpcError::attachment_read(parameter, Some(path.to_path_buf()), e))?;
    let metadata = file
        .metadata()
        .map_err(|e| RpcError::attachment_read(parameter, Some(path.to_path_buf()), e))?;

    if !metadata.is_file() {
        return Err(RpcError::attachment_read(
            parameter,
            Some(path.to_path_buf()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }

    Ok((tokio::fs::File::from_std(file), metadata.len()))
}

/// Stream a file in chunks to avoid loading it all into memory.
fn file_stream(
    file: tokio::fs::File,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; TransportConfig::UPLOAD_CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Guess a MIME type from a filename's extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => TransportConfig::DEFAULT_CONTENT_TYPE,
    }
}

/// Attachments of one invocation, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    entries: BTreeMap<String, Vec<Attachment>>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attachment, builder style.
    pub fn with(mut self, parameter: impl Into<String>, attachment: Attachment) -> Self {
        self.add(parameter, attachment);
        self
    }

    /// Append an attachment to a parameter's list.
    pub fn add(&mut self, parameter: impl Into<String>, attachment: Attachment) {
        self.entries
            .entry(parameter.into())
            .or_default()
            .push(attachment);
    }

    /// Total number of attachments across all parameters.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<Attachment>> {
        self.entries.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Attachment)> for Attachments {
    fn from_iter<I: IntoIterator<Item = (K, Attachment)>>(iter: I) -> Self {
        let mut attachments = Attachments::new();
        for (parameter, attachment) in iter {
            attachments.add(parameter, attachment);
        }
        attachments
    }
}
