//! File delivery into a local directory.
//!
//! Mirrors a browser download: the name is reduced to its last path component, an existing file
//! is never overwritten (`name (1).txt`, `name (2).txt`, ...), and a request repeating the same
//! (filename, length) pair within the dedup window is acknowledged without writing again.

use nbpipe_core::{Error, FileSink, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEDUP_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct DirSink {
    dir: PathBuf,
    window: Duration,
    recent: Mutex<HashMap<(String, usize), Instant>>,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            window: DEDUP_WINDOW,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Checks and records in one step so concurrent identical requests write once.
    fn claim(&self, key: (String, usize)) -> bool {
        let now = Instant::now();
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.retain(|_, at| now.duration_since(*at) < self.window);
        if recent.contains_key(&key) {
            return false;
        }
        recent.insert(key, now);
        true
    }

    fn release(&self, key: &(String, usize)) {
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.remove(key);
    }
}

impl FileSink for DirSink {
    fn deliver_file(&self, text: &str, filename: &str, source_tag: &str) -> Result<()> {
        let name = sanitize_filename(filename)?;
        let key = (name.clone(), text.len());
        if !self.claim(key.clone()) {
            tracing::debug!(filename = %name, source = source_tag, "duplicate delivery skipped");
            return Ok(());
        }

        let written = std::fs::create_dir_all(&self.dir)
            .and_then(|_| {
                let path = unique_path(&self.dir, &name);
                std::fs::write(&path, text).map(|_| path)
            })
            .map_err(|e| Error::Delivery(format!("{}: {e}", self.dir.join(&name).display())));
        match written {
            Ok(path) => {
                tracing::info!(path = %path.display(), bytes = text.len(), source = source_tag, "delivered");
                Ok(())
            }
            Err(e) => {
                self.release(&key);
                Err(e)
            }
        }
    }
}

fn sanitize_filename(filename: &str) -> Result<String> {
    let name = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim().to_string())
        .unwrap_or_default();
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidInput(format!("unusable filename: {filename:?}")));
    }
    Ok(name)
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, format!(".{e}")),
        _ => (name, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}
