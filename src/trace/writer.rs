//! The rolling trace file writer.
//!
//! Runs entirely on the writer thread. Files are named
//! `<base>.<index>.<ext>` with the index increasing and chosen to skip
//! names that already exist; once the directory's trace files exceed the
//! size budget, the oldest indices are deleted first.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How often a failed exclusive create is retried before giving up.
const MAX_OPEN_ATTEMPTS: u32 = 100;

/// Writer-side failures. Surfaced to the network thread only as the
/// barrier-releasing `on_error` callback; the pipeline itself keeps going.
#[derive(Debug, thiserror::Error)]
pub enum TraceWriterError {
    /// Underlying file I/O failed.
    #[error("trace i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// No trace file is open.
    #[error("no open trace file")]
    NotOpen,
    /// Exclusive creation kept failing.
    #[error("could not create a trace file after {0} attempts")]
    CreateFailed(u32),
}

pub(crate) struct FileTraceLogWriter {
    directory: PathBuf,
    process_name: String,
    basename: String,
    extension: String,
    max_logs_size: u64,
    index: u32,
    file: Option<File>,
    /// Invoked on a serious write error so flush barriers posted before
    /// the failure cannot block forever.
    on_error: Arc<dyn Fn() + Send + Sync>,
}

impl FileTraceLogWriter {
    pub(crate) fn new(
        directory: impl Into<PathBuf>,
        process_name: impl Into<String>,
        basename: impl Into<String>,
        extension: impl Into<String>,
        max_logs_size: u64,
        on_error: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            directory: directory.into(),
            process_name: process_name.into(),
            basename: basename.into(),
            extension: extension.into(),
            max_logs_size,
            index: 0,
            file: None,
            on_error,
        }
    }

    fn current_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}.{}.{}", self.basename, self.index, self.extension))
    }

    pub(crate) fn open(&mut self) -> Result<(), TraceWriterError> {
        self.cleanup_trace_files();
        for _ in 0..MAX_OPEN_ATTEMPTS {
            self.index += 1;
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.current_path())
            {
                Ok(file) => {
                    self.file = Some(file);
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    (self.on_error)();
                    return Err(e.into());
                }
            }
        }
        (self.on_error)();
        Err(TraceWriterError::CreateFailed(MAX_OPEN_ATTEMPTS))
    }

    pub(crate) fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if file.write_all(text.as_bytes()).is_err() {
            (self.on_error)();
        }
    }

    pub(crate) fn sync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            if file.sync_data().is_err() {
                (self.on_error)();
            }
        }
    }

    pub(crate) fn close(&mut self) {
        self.file = None;
    }

    pub(crate) fn roll(&mut self) {
        self.close();
        if let Err(e) = self.open() {
            eprintln!("trace roll failed: {e}");
        }
    }

    /// `(root, index)` of a trace file name, for age ordering.
    fn name_info(name: &str) -> (String, i64) {
        let trimmed = match name.rfind('.') {
            Some(dot) => &name[..dot],
            None => name,
        };
        match trimmed.rfind('.') {
            Some(dot) => {
                let index = trimmed[dot + 1..].parse().unwrap_or(-1);
                (trimmed[..dot].to_string(), index)
            }
            None => (trimmed.to_string(), -1),
        }
    }

    /// Deletes the oldest trace files once the directory holds more than
    /// `max_logs_size` bytes of them. A zero budget disables cleanup.
    pub(crate) fn cleanup_trace_files(&self) {
        if self.max_logs_size == 0 {
            return;
        }
        let Ok(entries) = std::fs::read_dir(&self.directory) else {
            return;
        };
        let suffix = format!(".{}", self.extension);
        let mut files: Vec<(String, u64)> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                if !name.starts_with(&self.process_name) || !name.ends_with(&suffix) {
                    return None;
                }
                let size = entry.metadata().ok()?.len();
                Some((name, size))
            })
            .collect();

        // Newest first; keep files while they fit, delete the tail.
        files.sort_by(|a, b| {
            let (root_a, index_a) = Self::name_info(&a.0);
            let (root_b, index_b) = Self::name_info(&b.0);
            root_b
                .cmp(&root_a)
                .then(index_b.cmp(&index_a))
                .then(b.0.cmp(&a.0))
        });

        let mut total = 0u64;
        for (name, size) in files {
            total += size;
            if total > self.max_logs_size {
                let _ = std::fs::remove_file(self.directory.join(&name));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn path_for_test(&self) -> PathBuf {
        self.current_path()
    }
}

/// Lists trace files under `directory` for `process_name`, oldest first.
/// Exposed for tests and operational tooling.
#[must_use]
pub fn list_trace_files(directory: &Path, process_name: &str, extension: &str) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(directory) else {
        return Vec::new();
    };
    let suffix = format!(".{extension}");
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(process_name) && name.ends_with(&suffix))
        .collect();
    names.sort_by(|a, b| {
        let (root_a, index_a) = FileTraceLogWriter::name_info(a);
        let (root_b, index_b) = FileTraceLogWriter::name_info(b);
        root_a.cmp(&root_b).then(index_a.cmp(&index_b)).then(a.cmp(b))
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer(dir: &Path, max: u64) -> FileTraceLogWriter {
        FileTraceLogWriter::new(
            dir,
            "proc",
            "proc.test",
            "json",
            max,
            Arc::new(|| {}),
        )
    }

    #[test]
    fn open_skips_existing_indices() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("proc.test.1.json"), "x").unwrap();
        let mut w = writer(dir.path(), 0);
        w.open().unwrap();
        assert_eq!(w.index, 2);
        assert!(w.path_for_test().ends_with("proc.test.2.json"));
    }

    #[test]
    fn write_appends_to_the_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), 0);
        w.open().unwrap();
        w.write("hello ");
        w.write("world");
        w.sync();
        let path = w.path_for_test();
        w.close();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello world");
    }

    #[test]
    fn roll_moves_to_the_next_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), 0);
        w.open().unwrap();
        w.write("a");
        w.roll();
        w.write("b");
        w.close();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("proc.test.1.json")).unwrap(),
            "a"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("proc.test.2.json")).unwrap(),
            "b"
        );
    }

    #[test]
    fn cleanup_deletes_oldest_beyond_budget() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=4 {
            std::fs::write(
                dir.path().join(format!("proc.test.{i}.json")),
                vec![b'x'; 100],
            )
            .unwrap();
        }
        let w = writer(dir.path(), 250);
        w.cleanup_trace_files();
        let left = list_trace_files(dir.path(), "proc", "json");
        assert_eq!(left, vec!["proc.test.3.json", "proc.test.4.json"]);
    }

    #[test]
    fn zero_budget_disables_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            std::fs::write(dir.path().join(format!("proc.test.{i}.json")), "data").unwrap();
        }
        let w = writer(dir.path(), 0);
        w.cleanup_trace_files();
        assert_eq!(list_trace_files(dir.path(), "proc", "json").len(), 3);
    }
}
