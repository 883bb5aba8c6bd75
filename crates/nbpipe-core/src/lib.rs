use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

mod notebook;
mod options;
mod response;

pub use notebook::{
    is_empty_source, normalize, Cell, CellSource, CellType, Notebook, NotebookMetadata, Output,
    OutputType,
};
pub use options::ExtractionOptions;
pub use response::{
    CellListResponse, CellSummary, ChunkResponse, ExtractResponse, OutputAction,
    NO_CONTENT_FOUND,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("parse failed: {0}")]
    Parse(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no notebook content found")]
    NoContentFound,
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the operation (network + body read).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
    /// Optional headers to add (best-effort; adapter may drop unsafe headers).
    pub headers: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            max_bytes: None,
            headers: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reads a URL. Used by the raw-file resolution strategy.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

/// A live notebook model exposed by the page runtime (classic `Jupyter.notebook`, a lab
/// widget model, ...). Returns the serialized notebook when the runtime can produce one.
pub trait NotebookRuntime: Send + Sync {
    fn to_json(&self) -> Option<serde_json::Value>;
}

/// Fire-and-forget file delivery. Implementations own deduplication and the actual write.
pub trait FileSink: Send + Sync {
    fn deliver_file(&self, text: &str, filename: &str, source_tag: &str) -> Result<()>;
}

pub trait ClipboardSink {
    fn write_text(&mut self, text: &str) -> Result<()>;
}
