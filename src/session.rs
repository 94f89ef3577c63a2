use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::archive::PakArchive;
use crate::errors::{ErrorKind, ExtractError};
use crate::record::EntryDescriptor;

/// Called once per finished entry with `(completed, total, path)`. Runs on
/// the worker thread that finished the entry and must return quickly.
pub type ProgressFn<'a> = dyn Fn(usize, usize, &str) + Send + Sync + 'a;

/// Cooperative stop signal, checked before each entry is started.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Destination for extracted entries.
pub trait EntrySink: Sync {
    fn write_entry(&self, entry: &EntryDescriptor, data: Vec<u8>) -> Result<(), ExtractError>;
}

impl<F> EntrySink for F
where
    F: Fn(&EntryDescriptor, Vec<u8>) -> Result<(), ExtractError> + Sync,
{
    fn write_entry(&self, entry: &EntryDescriptor, data: Vec<u8>) -> Result<(), ExtractError> {
        self(entry, data)
    }
}

/// Writes each entry to `root / logical path`, creating directories as
/// needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins a logical path onto the root, refusing anything that could
    /// land outside of it.
    pub fn target(&self, logical_path: &str) -> Result<PathBuf, ExtractError> {
        let mut target = self.root.clone();
        let mut pushed = false;
        for component in Path::new(logical_path).components() {
            match component {
                Component::Normal(part) => {
                    target.push(part);
                    pushed = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ExtractError::UnsafePath(logical_path.to_owned()))
                }
            }
        }
        if !pushed {
            return Err(ExtractError::UnsafePath(logical_path.to_owned()));
        }
        Ok(target)
    }
}

impl EntrySink for DirectorySink {
    fn write_entry(&self, entry: &EntryDescriptor, data: Vec<u8>) -> Result<(), ExtractError> {
        let target = self.target(&entry.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, data)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct EntryFailure {
    pub path: String,
    pub error: ExtractError,
}

impl EntryFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Outcome of a batch extraction. Failures are listed in index order.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub extracted_bytes: u64,
    /// Set when the run stopped early; skipped entries are not counted.
    pub cancelled: bool,
    pub failures: Vec<EntryFailure>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

type EntryFilter<'a> = Box<dyn Fn(&EntryDescriptor) -> bool + Send + Sync + 'a>;

/// Batch extraction of an archive's live entries.
///
/// ```no_run
/// # use kurapak::{DirectorySink, ExtractionSession, PakArchive, PakOptions};
/// let archive = PakArchive::open("pakchunk0-Android.pak", PakOptions::new())?;
/// let report = ExtractionSession::new(&archive)
///     .filter(|entry| entry.path.ends_with(".uasset"))
///     .workers(4)
///     .run(&DirectorySink::new("out"));
/// println!("{} of {} extracted", report.succeeded, report.attempted);
/// # Ok::<(), kurapak::OpenError>(())
/// ```
pub struct ExtractionSession<'a> {
    archive: &'a PakArchive,
    filter: Option<EntryFilter<'a>>,
    workers: usize,
    progress: Option<&'a ProgressFn<'a>>,
    cancellation: CancellationToken,
}

impl<'a> ExtractionSession<'a> {
    pub fn new(archive: &'a PakArchive) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        Self {
            archive,
            filter: None,
            workers,
            progress: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&EntryDescriptor) -> bool + Send + Sync + 'a,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Number of extraction threads; 1 runs on the calling thread.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn progress(mut self, progress: &'a ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn run(&self, sink: &dyn EntrySink) -> SessionReport {
        let entries: Vec<&EntryDescriptor> = self
            .archive
            .index()
            .live_entries()
            .filter(|entry| self.filter.as_ref().map_or(true, |filter| filter(*entry)))
            .collect();
        let total = entries.len();
        let completed = AtomicUsize::new(0);
        log::debug!("extracting {total} entries on {} workers", self.workers);

        let process = |entry: &&EntryDescriptor| -> Option<Result<u64, ExtractError>> {
            if self.cancellation.is_cancelled() {
                return None;
            }
            let result = self.archive.extract_entry(entry).and_then(|data| {
                let len = data.len() as u64;
                sink.write_entry(entry, data).map(|()| len)
            });
            if let Err(e) = &result {
                log::warn!("failed to extract {}: {e}", entry.path);
            }
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(progress) = self.progress {
                progress(done, total, &entry.path);
            }
            Some(result)
        };

        let results: Vec<_> = if self.workers == 1 {
            entries.iter().map(&process).collect()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
            {
                Ok(pool) => pool.install(|| entries.par_iter().map(&process).collect()),
                Err(e) => {
                    log::warn!("could not start worker pool, extracting sequentially: {e}");
                    entries.iter().map(&process).collect()
                }
            }
        };

        let mut report = SessionReport::default();
        for (entry, result) in entries.iter().zip(results) {
            match result {
                None => report.cancelled = true,
                Some(Ok(len)) => {
                    report.attempted += 1;
                    report.succeeded += 1;
                    report.extracted_bytes += len;
                }
                Some(Err(error)) => {
                    report.attempted += 1;
                    report.failed += 1;
                    report.failures.push(EntryFailure {
                        path: entry.path.clone(),
                        error,
                    });
                }
            }
        }
        log::debug!(
            "extracted {} of {} entries ({} bytes)",
            report.succeeded,
            report.attempted,
            report.extracted_bytes
        );
        report
    }
}
