use std::io::{self, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{encode, AuditSink};
use crate::error::{AuditError, AuditResult};
use crate::handler::BoxFuture;
use crate::render::Renderer;
use crate::summary::Summary;

const APPEND_PREFIX: &str = ">>";

/// Writes every summary into one JSON array per file.
///
/// The file is opened at construction and `[` written immediately; records
/// follow, separated by `,\n`; [`close`](AuditSink::close) writes the closing
/// `]`. A file closed at any point is therefore a valid JSON array.
/// Renderers that do not produce JSON (the text format) have each record
/// stored as a JSON string. A record whose write fails is cut back off the
/// file before the error is returned.
///
/// Opening in append mode adds a new array after whatever the file already
/// holds.
pub struct FileAuditSink {
    path: PathBuf,
    renderer: Arc<dyn Renderer>,
    state: Mutex<Option<OpenFile>>,
}

struct OpenFile {
    file: File,
    separator: &'static [u8],
    /// End of the last complete record.
    end: u64,
}

impl OpenFile {
    async fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        let written = async {
            self.file.write_all(self.separator).await?;
            self.file.write_all(record).await?;
            self.file.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                self.end += (self.separator.len() + record.len()) as u64;
                self.separator = b",\n";
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.rollback().await {
                    warn!(error = %rollback, "failed to cut partial audit record");
                }
                Err(e)
            }
        }
    }

    async fn rollback(&mut self) -> io::Result<()> {
        // Buffered bytes may still be in flight; the truncation below wins.
        let _ = self.file.flush().await;
        self.file.set_len(self.end).await?;
        self.file.seek(SeekFrom::Start(self.end)).await?;
        Ok(())
    }
}

/// Works out the audit file name for a backend.
///
/// With a backend, `-{backend}` goes in before the `.json` extension; without
/// one, `.json` is appended if missing.
///
/// ```
/// use audittap::sinks::determine_filename;
///
/// assert_eq!(determine_filename("/var/log/audit.json", "api"), "/var/log/audit-api.json");
/// assert_eq!(determine_filename("/var/log/audit", ""), "/var/log/audit.json");
/// ```
pub fn determine_filename(file: &str, backend: &str) -> String {
    if backend.is_empty() {
        if file.ends_with(".json") {
            file.to_string()
        } else {
            format!("{file}.json")
        }
    } else {
        let stem = file.strip_suffix(".json").unwrap_or(file);
        format!("{stem}-{backend}.json")
    }
}

impl FileAuditSink {
    /// Opens (or creates) the audit file.
    ///
    /// A leading `>>` on `file` selects append mode; otherwise the file is
    /// truncated. An explicit `truncate` overrides the prefix.
    pub fn open(
        file: &str,
        backend: &str,
        truncate: Option<bool>,
        renderer: Arc<dyn Renderer>,
    ) -> AuditResult<Self> {
        let (file, append) = match file.strip_prefix(APPEND_PREFIX) {
            Some(rest) => (rest.trim(), true),
            None => (file, false),
        };
        if file.is_empty() {
            return Err(AuditError::config("audit file path is empty"));
        }
        let truncate = truncate.unwrap_or(!append);

        let path = PathBuf::from(determine_filename(file, backend));
        let mut options = std::fs::OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let mut std_file = options.open(&path)?;
        std_file.write_all(b"[")?;
        let end = std_file.metadata()?.len();

        debug!(path = %path.display(), truncate, renderer = renderer.name(), "audit file opened");

        Ok(Self {
            path,
            renderer,
            state: Mutex::new(Some(OpenFile {
                file: File::from_std(std_file),
                separator: b"\n",
                end,
            })),
        })
    }

    /// The resolved file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, summary: &Summary) -> AuditResult<Bytes> {
        let bytes = encode(self.name(), self.renderer.as_ref(), summary)?;
        if self.renderer.is_json() {
            return Ok(bytes);
        }
        serde_json::to_vec(&String::from_utf8_lossy(&bytes))
            .map(Bytes::from)
            .map_err(|e| AuditError::render(self.renderer.name(), e.to_string()))
    }
}

impl std::fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("path", &self.path)
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}

impl AuditSink for FileAuditSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn audit<'a>(&'a self, summary: &'a Summary) -> BoxFuture<'a, AuditResult<()>> {
        Box::pin(async move {
            let record = self.record(summary)?;

            // Separator and record are written under one lock so concurrent
            // records never interleave.
            let mut guard = self.state.lock().await;
            let open = guard.as_mut().ok_or(AuditError::Closed("file"))?;
            open.write_record(&record).await?;
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, AuditResult<()>> {
        Box::pin(async move {
            let Some(mut open) = self.state.lock().await.take() else {
                return Ok(());
            };
            open.file.write_all(b"\n]\n").await?;
            open.file.flush().await?;
            open.file.sync_all().await?;
            debug!(path = %self.path.display(), "audit file closed");
            Ok(())
        })
    }
}
