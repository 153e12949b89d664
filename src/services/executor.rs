//! Backup executor.
//!
//! Runs a [`BackupValidation`] through a pool of compression workers and
//! reports progress over a [`ProgressStream`]. One run at a time per executor:
//!
//! ```text
//! Idle -> Running -> Completed
//!                 -> Failed
//! ```
//!
//! # Work distribution
//!
//! Each worker owns one zip archive. With a single worker the output is
//! `<name>.zip`; with N workers it is `<name>_part_01.zip` .. `<name>_part_NN.zip`.
//! Mods are handed out largest first to the least-loaded part so the parts
//! finish at roughly the same time.
//!
//! # Failure and cancellation
//!
//! Archives are written as `<file>.partial` and renamed only once every part
//! succeeded. Any read or write error aborts the whole run, cancellation is
//! observed between mods, and in both cases the partial files are removed.

use super::progress::{PREPARING_LABEL, ProgressSender, ProgressStream, progress_channel};
use crate::metrics::Metrics;
use crate::models::{AuroraConfig, BackupResult, BackupValidation, format_ratio, format_size};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Extension appended to archives that are still being written.
pub const PARTIAL_EXTENSION: &str = "partial";

/// Errors that can occur when starting or running a backup
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("A backup is already running")]
    Busy,

    #[error("Nothing to back up: no used mod passes the filters")]
    NothingToBackup,

    #[error("Not enough disk space: {required} required, {available} available")]
    InsufficientSpace { required: String, available: String },

    #[error("{context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Backup cancelled")]
    Cancelled,

    #[error("Backup worker stopped unexpectedly: {0}")]
    WorkerPanicked(String),
}

impl BackupError {
    fn execution(context: impl Into<String>, source: io::Error) -> Self {
        Self::Execution {
            context: context.into(),
            source,
        }
    }

    fn archive(context: impl Into<String>, source: ZipError) -> Self {
        Self::execution(context, io::Error::other(source))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Lifecycle of the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Where and how archives are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub output_dir: Utf8PathBuf,
    pub archive_name: String,
    pub compression_level: i64,
}

impl ArchiveSettings {
    pub fn from_config(config: &AuroraConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            archive_name: config.archive_name.clone(),
            compression_level: config.compression_level,
        }
    }
}

/// Hook notified when a run starts and when it settles.
///
/// `on_finish` is called after the phase has left `Running` and before the
/// terminal progress event is emitted.
pub trait RunObserver: Send + Sync {
    fn on_start(&self, _plan: &BackupValidation) {}

    fn on_finish(&self, _outcome: &Result<BackupResult, BackupError>) {}
}

/// Backup engine. Cheap to clone; clones share the run state.
#[derive(Clone)]
pub struct BackupExecutor {
    settings: ArchiveSettings,
    phase: Arc<Mutex<RunPhase>>,
    metrics: Arc<Metrics>,
    observer: Option<Arc<dyn RunObserver>>,
}

impl BackupExecutor {
    pub fn new(settings: ArchiveSettings, metrics: Arc<Metrics>) -> Self {
        Self {
            settings,
            phase: Arc::new(Mutex::new(RunPhase::Idle)),
            metrics,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Replace the archive settings used by future runs.
    pub fn set_settings(&mut self, settings: ArchiveSettings) {
        self.settings = settings;
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.phase() == RunPhase::Running
    }

    /// Start a run in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `plan` - The validated plan; only its non-filtered items are archived
    /// * `concurrency` - Worker count, 0 = all available cores
    ///
    /// # Errors
    /// * [`BackupError::Busy`] if a run is in progress; that run is unaffected
    /// * [`BackupError::NothingToBackup`] if the plan includes no mod
    pub fn start(
        &self,
        plan: &BackupValidation,
        concurrency: u32,
    ) -> Result<BackupRun, BackupError> {
        let units: Vec<WorkUnit> = plan
            .included()
            .map(|item| WorkUnit {
                name: item.mod_entry.name.clone(),
                path: item.mod_entry.path.clone(),
                size: item.mod_entry.size,
            })
            .collect();

        {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *phase == RunPhase::Running {
                tracing::warn!("Rejected backup request: a run is already in progress");
                return Err(BackupError::Busy);
            }
            if units.is_empty() {
                return Err(BackupError::NothingToBackup);
            }
            *phase = RunPhase::Running;
        }

        if let Some(observer) = &self.observer {
            observer.on_start(plan);
        }

        let workers = resolve_workers(concurrency, units.len());
        let job = Job {
            parts: distribute(units, workers),
            settings: self.settings.clone(),
        };

        let (mut progress_tx, progress_rx) = progress_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut guard = PhaseGuard {
            phase: Arc::clone(&self.phase),
            settled: false,
        };
        let metrics = Arc::clone(&self.metrics);
        let observer = self.observer.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = run_job(job, &mut progress_tx, cancel_rx, Arc::clone(&metrics)).await;
            let elapsed = started.elapsed();

            match &outcome {
                Ok(result) => {
                    metrics.record_run_completed(result.compressed_size, elapsed);
                    guard.settle(RunPhase::Completed);
                }
                Err(e) if e.is_cancelled() => {
                    metrics.record_run_cancelled(elapsed);
                    guard.settle(RunPhase::Failed);
                }
                Err(_) => {
                    metrics.record_run_failed(elapsed);
                    guard.settle(RunPhase::Failed);
                }
            }

            if let Some(observer) = observer {
                observer.on_finish(&outcome);
            }

            match &outcome {
                Ok(_) => progress_tx.complete(),
                Err(e) => progress_tx.fail(e.to_string()),
            }

            outcome
        });

        Ok(BackupRun {
            progress: progress_rx,
            handle: RunHandle {
                task,
                cancel: CancelHandle(Arc::new(cancel_tx)),
            },
        })
    }
}

/// A started run: its progress stream and its control handle.
///
/// Dropping a `BackupRun` detaches from the run without cancelling it.
pub struct BackupRun {
    progress: ProgressStream,
    handle: RunHandle,
}

impl BackupRun {
    pub fn progress(&mut self) -> &mut ProgressStream {
        &mut self.progress
    }

    /// Request cancellation; the run stops at the next mod boundary.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.cancel.clone()
    }

    pub fn into_parts(self) -> (ProgressStream, RunHandle) {
        (self.progress, self.handle)
    }

    /// Wait for the outcome, discarding progress events.
    pub async fn wait(self) -> Result<BackupResult, BackupError> {
        self.handle.wait().await
    }
}

/// Control side of a run.
pub struct RunHandle {
    task: JoinHandle<Result<BackupResult, BackupError>>,
    cancel: CancelHandle,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn wait(self) -> Result<BackupResult, BackupError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(BackupError::WorkerPanicked(e.to_string())),
        }
    }
}

/// Cloneable cancel trigger, e.g. for a Ctrl-C handler.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        tracing::info!("Backup cancellation requested");
        self.0.send_replace(true);
    }
}

/// Moves the phase out of `Running` even if the coordinator task dies.
struct PhaseGuard {
    phase: Arc<Mutex<RunPhase>>,
    settled: bool,
}

impl PhaseGuard {
    fn settle(&mut self, next: RunPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = next;
        self.settled = true;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(RunPhase::Failed);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkUnit {
    name: String,
    path: Utf8PathBuf,
    size: u64,
}

struct Job {
    parts: Vec<Vec<WorkUnit>>,
    settings: ArchiveSettings,
}

enum WorkerEvent {
    Started(String),
    Finished { name: String, size: u64 },
}

struct PartOutcome {
    bytes_read: u64,
    mods: usize,
}

/// Number of workers for a run: `concurrency`, or every available core when
/// it is 0, never more than the number of mods.
pub fn resolve_workers(concurrency: u32, units: usize) -> usize {
    let requested = if concurrency == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        concurrency as usize
    };
    requested.min(units).max(1)
}

/// Archive file names for a run with `parts` archives.
pub fn part_file_names(archive_name: &str, parts: usize) -> Vec<String> {
    if parts <= 1 {
        return vec![format!("{}.zip", archive_name)];
    }
    (1..=parts)
        .map(|i| format!("{}_part_{:02}.zip", archive_name, i))
        .collect()
}

fn partial_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut partial = path.as_str().to_string();
    partial.push('.');
    partial.push_str(PARTIAL_EXTENSION);
    Utf8PathBuf::from(partial)
}

/// Split units into `workers` parts, largest first onto the least-loaded part.
/// Each part keeps plan order.
fn distribute(units: Vec<WorkUnit>, workers: usize) -> Vec<Vec<WorkUnit>> {
    let workers = workers.max(1);
    let mut order: Vec<usize> = (0..units.len()).collect();
    order.sort_by(|&a, &b| units[b].size.cmp(&units[a].size).then(a.cmp(&b)));

    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); workers];
    let mut loads = vec![0u64; workers];
    for index in order {
        let target = (0..workers)
            .min_by_key(|&w| (loads[w], buckets[w].len()))
            .unwrap_or(0);
        loads[target] += units[index].size;
        buckets[target].push(index);
    }

    let mut slots: Vec<Option<WorkUnit>> = units.into_iter().map(Some).collect();
    buckets
        .into_iter()
        .filter(|bucket| !bucket.is_empty())
        .map(|mut bucket| {
            bucket.sort_unstable();
            bucket
                .into_iter()
                .filter_map(|index| slots[index].take())
                .collect()
        })
        .collect()
}

fn percent_of(done_bytes: u64, total_bytes: u64, done_units: usize, total_units: usize) -> f64 {
    if total_bytes > 0 {
        done_bytes as f64 / total_bytes as f64 * 100.0
    } else if total_units > 0 {
        done_units as f64 / total_units as f64 * 100.0
    } else {
        100.0
    }
}

/// Coordinate one run: spawn the workers, relay their progress, watch for
/// cancellation, then publish or clean up the archives.
async fn run_job(
    job: Job,
    progress: &mut ProgressSender,
    mut cancel_rx: watch::Receiver<bool>,
    metrics: Arc<Metrics>,
) -> Result<BackupResult, BackupError> {
    progress.update(0.0, PREPARING_LABEL);

    let Job { parts, settings } = job;
    tokio::fs::create_dir_all(&settings.output_dir)
        .await
        .map_err(|e| {
            BackupError::execution(
                format!("Failed to create output directory {}", settings.output_dir),
                e,
            )
        })?;

    let names = part_file_names(&settings.archive_name, parts.len());
    let finals: Vec<Utf8PathBuf> = names.iter().map(|n| settings.output_dir.join(n)).collect();
    let partials: Vec<Utf8PathBuf> = finals.iter().map(|p| partial_path(p)).collect();

    let total_units: usize = parts.iter().map(Vec::len).sum();
    let total_bytes: u64 = parts.iter().flatten().map(|u| u.size).sum();

    tracing::info!(
        "Starting backup of {} mods ({}) into {} archive(s) in {}",
        total_units,
        format_size(total_bytes),
        parts.len(),
        settings.output_dir
    );

    let abort = Arc::new(AtomicBool::new(false));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut handles = Vec::with_capacity(parts.len());

    for (units, partial) in parts.into_iter().zip(partials.iter().cloned()) {
        let abort = Arc::clone(&abort);
        let events = events_tx.clone();
        let metrics = Arc::clone(&metrics);
        let level = settings.compression_level;

        handles.push(tokio::task::spawn_blocking(move || {
            let result = write_part(&units, &partial, level, &abort, &events, &metrics);
            if result.is_err() {
                // Stop the other workers at their next mod
                abort.store(true, Ordering::SeqCst);
            }
            result
        }));
    }
    drop(events_tx);

    let mut done_bytes = 0u64;
    let mut done_units = 0usize;
    let mut cancelled = false;
    let mut cancel_open = true;

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(WorkerEvent::Started(name)) => {
                    progress.update(progress.percent(), name);
                }
                Some(WorkerEvent::Finished { name, size }) => {
                    done_bytes += size;
                    done_units += 1;
                    progress.update(percent_of(done_bytes, total_bytes, done_units, total_units), name);
                }
                None => break,
            },
            changed = cancel_rx.changed(), if cancel_open && !cancelled => match changed {
                Ok(()) => {
                    if *cancel_rx.borrow_and_update() {
                        cancelled = true;
                        abort.store(true, Ordering::SeqCst);
                    }
                }
                // Every handle was dropped; the run can no longer be cancelled
                Err(_) => cancel_open = false,
            },
        }
    }

    let mut failure: Option<BackupError> = None;
    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(Ok(outcome)) => outcomes.push(outcome),
            Ok(Err(BackupError::Cancelled)) => {}
            Ok(Err(e)) => {
                failure.get_or_insert(e);
            }
            Err(e) => {
                failure.get_or_insert(BackupError::WorkerPanicked(e.to_string()));
            }
        }
    }

    if *cancel_rx.borrow() {
        cancelled = true;
    }
    if failure.is_none() && (cancelled || outcomes.len() < partials.len()) {
        failure = Some(BackupError::Cancelled);
    }

    if let Some(error) = failure {
        if error.is_cancelled() {
            tracing::warn!("Backup cancelled after {} of {} mods", done_units, total_units);
        } else {
            tracing::error!("Backup failed: {}", error);
        }
        remove_files(&partials);
        return Err(error);
    }

    for (i, (partial, target)) in partials.iter().zip(&finals).enumerate() {
        if let Err(e) = fs::rename(partial, target) {
            remove_files(&partials[i..]);
            remove_files(&finals[..i]);
            return Err(BackupError::execution(
                format!("Failed to move {} to {}", partial, target),
                e,
            ));
        }
    }

    let mut compressed_size = 0;
    for path in &finals {
        compressed_size += fs::metadata(path)
            .map_err(|e| BackupError::execution(format!("Failed to stat {}", path), e))?
            .len();
    }
    let original_size: u64 = outcomes.iter().map(|o| o.bytes_read).sum();
    let mods_archived: usize = outcomes.iter().map(|o| o.mods).sum();

    let output_path = match names.as_slice() {
        [only] => only.clone(),
        [first, .., last] => format!("{} ... {}", first, last),
        [] => String::new(),
    };

    let result = BackupResult {
        output_path,
        parts: finals,
        original_size,
        compressed_size,
        ratio: format_ratio(compressed_size, original_size),
        mods_archived,
    };

    tracing::info!(
        "Backup complete: {} mods, {} -> {} ({})",
        result.mods_archived,
        format_size(result.original_size),
        format_size(result.compressed_size),
        result.ratio
    );

    Ok(result)
}

fn remove_files(paths: &[Utf8PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!("Removed incomplete archive {}", path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove incomplete archive {}: {}", path, e),
        }
    }
}

/// Write one archive. Runs on a blocking thread.
fn write_part(
    units: &[WorkUnit],
    partial: &Utf8Path,
    level: i64,
    abort: &AtomicBool,
    events: &mpsc::UnboundedSender<WorkerEvent>,
    metrics: &Metrics,
) -> Result<PartOutcome, BackupError> {
    let file = File::create(partial)
        .map_err(|e| BackupError::execution(format!("Failed to create archive {}", partial), e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut bytes_read = 0;

    for unit in units {
        if abort.load(Ordering::SeqCst) {
            return Err(BackupError::Cancelled);
        }

        let _ = events.send(WorkerEvent::Started(unit.name.clone()));
        let read = add_mod(&mut zip, unit, level)?;
        bytes_read += read;
        metrics.record_mod_archived(read);
        tracing::debug!("Archived {} ({}) into {}", unit.name, format_size(read), partial);
        let _ = events.send(WorkerEvent::Finished {
            name: unit.name.clone(),
            size: unit.size,
        });
    }

    let mut writer = zip
        .finish()
        .map_err(|e| BackupError::archive(format!("Failed to finalize archive {}", partial), e))?;
    writer
        .flush()
        .map_err(|e| BackupError::execution(format!("Failed to write archive {}", partial), e))?;

    Ok(PartOutcome {
        bytes_read,
        mods: units.len(),
    })
}

/// Add one mod directory under `<mod name>/`. Returns the bytes read.
fn add_mod<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    unit: &WorkUnit,
    level: i64,
) -> Result<u64, BackupError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level));
    let mut read = 0;

    for entry in WalkDir::new(&unit.path).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BackupError::execution(format!("Failed to read mod {}", unit.name), e.into())
        })?;
        let Ok(relative) = entry.path().strip_prefix(&unit.path) else {
            continue;
        };

        let mut name = unit.name.clone();
        for component in relative.components() {
            name.push('/');
            name.push_str(&component.as_os_str().to_string_lossy());
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| BackupError::archive(format!("Failed to add {}", entry.path().display()), e))?;
            continue;
        }
        if !file_type.is_file() {
            tracing::debug!("Skipping non-regular file {}", entry.path().display());
            continue;
        }

        let mut source = File::open(entry.path()).map_err(|e| {
            BackupError::execution(format!("Failed to open {}", entry.path().display()), e)
        })?;
        let len = entry.metadata().map(|m| m.len()).unwrap_or(0);

        zip.start_file(name, options.large_file(len >= u64::from(u32::MAX)))
            .map_err(|e| BackupError::archive(format!("Failed to add {}", entry.path().display()), e))?;
        read += io::copy(&mut source, zip).map_err(|e| {
            BackupError::execution(format!("Failed to compress {}", entry.path().display()), e)
        })?;
    }

    Ok(read)
}
