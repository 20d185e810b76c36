use serde::{Deserialize, Serialize};

/// One protocol message exchanged over a tether connection.
///
/// On the wire this is a JSON object tagged by `type`:
///
/// ```text
/// {"type":"text","text":"hello"}
/// {"type":"file","filename":"a.bin","filesize":16384,"filepath":null}
/// {"type":"request_file","filepath":"/srv/a.bin"}
/// ```
///
/// A `file` envelope is followed on the same stream by exactly `filesize`
/// raw bytes that are not wrapped in envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "file")]
    File(FileHeader),

    #[serde(rename = "request_file")]
    FileRequest { filepath: String },
}

/// Header that opens a file transfer in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub filename: String,
    pub filesize: i64,
    /// Destination override on upload, source path on download.
    #[serde(default)]
    pub filepath: Option<String>,
}

impl Envelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn file(filename: impl Into<String>, filesize: i64) -> Self {
        Self::File(FileHeader {
            filename: filename.into(),
            filesize,
            filepath: None,
        })
    }

    pub fn request_file(filepath: impl Into<String>) -> Self {
        Self::FileRequest {
            filepath: filepath.into(),
        }
    }

    /// Wire tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::File(_) => "file",
            Self::FileRequest { .. } => "request_file",
        }
    }
}
