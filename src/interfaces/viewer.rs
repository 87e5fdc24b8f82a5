use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tracing::debug;

use crate::core::synthesizer::Comment;
use crate::error::SinkError;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<log>\n</log>";

/// Append-only record of released comments, consumed by a third-party
/// viewer. Writes must land in release order.
#[async_trait]
pub trait CommentSink: Send + Sync {
    async fn append_comment(&self, comment: &Comment) -> Result<(), SinkError>;
}

/// Writes the `<log>` XML document the comment viewer tails. Each append
/// rewrites the file with the new entry inserted before the closing tag, so
/// the document stays well-formed at all times.
pub struct XmlCommentSink {
    path: PathBuf,
}

impl XmlCommentSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommentSink for XmlCommentSink {
    async fn append_comment(&self, comment: &Comment) -> Result<(), SinkError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => XML_HEADER.to_string(),
            Err(e) => return Err(e.into()),
        };

        let unix_time = comment
            .produced_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let entry = format!(
            "  <comment no=\"0\" time=\"{}\" owner=\"0\" service=\"youtubelive\" handle=\"{}\">{}</comment>",
            unix_time,
            quick_xml::escape::escape(comment.handle.as_str()),
            quick_xml::escape::escape(comment.text.as_str()),
        );
        let content = content.replace("</log>", &format!("{}\n</log>", entry));

        tokio::fs::write(&self.path, content).await?;
        debug!(path = %self.path.display(), handle = %comment.handle, "comment appended");
        Ok(())
    }
}
