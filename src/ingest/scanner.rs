//! Directory import: walk a tree, build a metadata document per file and
//! upsert it. Stands in for the external extractor with the little that can
//! be learned from the filesystem plus an optional `<file>.json` sidecar.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{bounded, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::database::store::{MetaStore, PerceptualHashes};
use crate::media::{mimetype, phash};

pub struct ScanJob {
    pub path: PathBuf,
    pub document: Value,
    pub hashes: Option<PerceptualHashes>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub seen: usize,
    pub stored: usize,
    pub failed: usize,
}

/// Sends every importable file under `root`. Entries that cannot be read
/// are logged and skipped; the return value counts them.
pub fn scan_directory(root: &Path, tx: Sender<PathBuf>) -> usize {
    let walker = WalkDir::new(root).follow_links(true).into_iter();
    let mut failed = 0;

    for entry in walker.filter_entry(|e| !is_hidden(e)) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                failed += 1;
                continue;
            }
        };
        if entry.file_type().is_file() && !is_sidecar(entry.path()) {
            // Receiver gone means the pipeline is shutting down.
            if tx.send(entry.path().to_path_buf()).is_err() {
                break;
            }
        }
    }
    failed
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".json");
    PathBuf::from(name)
}

/// `photo.jpg.json` next to `photo.jpg`.
fn is_sidecar(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false) && path.with_extension("").is_file()
}

pub fn build_job(path: &Path) -> Result<ScanJob> {
    let metadata = fs::metadata(path).with_context(|| format!("Failed to stat {:?}", path))?;
    let mime = mimetype::detect_mimetype(path)?;

    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut document = Map::new();
    document.insert(
        "file".to_string(),
        json!({
            "name": name,
            "extension": extension,
            "size": metadata.len(),
            "mime": mime,
        }),
    );

    let sidecar = sidecar_path(path);
    if sidecar.is_file() {
        let raw = fs::read_to_string(&sidecar)
            .with_context(|| format!("Failed to read sidecar {:?}", sidecar))?;
        let extra: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse sidecar {:?}", sidecar))?;
        if let Value::Object(categories) = extra {
            for (category, value) in categories {
                // The filesystem view of the file is authoritative.
                if category != "file" {
                    document.insert(category, value);
                }
            }
        }
    }

    let hashes = if mime.starts_with("image/") {
        match phash::compute_hashes(path) {
            Ok(hashes) => Some(hashes),
            Err(e) => {
                debug!("No perceptual hash for {:?}: {}", path, e);
                None
            }
        }
    } else {
        None
    };

    Ok(ScanJob {
        path: path.to_path_buf(),
        document: Value::Object(document),
        hashes,
    })
}

/// Scanner thread -> `workers` document builders -> upserts on this thread.
/// Per-file failures are logged and counted, they never stop the scan.
pub fn run_scan(store: &MetaStore, root: &Path, workers: usize, show_progress: bool) -> Result<ScanReport> {
    if !root.is_dir() {
        return Err(anyhow!("Not a directory: {:?}", root));
    }
    info!("Scanning {:?} with {} workers", root, workers);

    let (scan_tx, scan_rx) = bounded::<PathBuf>(1024);
    let (job_tx, job_rx) = bounded::<Result<ScanJob>>(256);

    let scan_root = root.to_path_buf();
    let scanner_handle = thread::spawn(move || scan_directory(&scan_root, scan_tx));

    let mut worker_handles = Vec::new();
    for i in 0..workers.max(1) {
        let rx = scan_rx.clone();
        let tx = job_tx.clone();
        worker_handles.push(thread::spawn(move || {
            debug!("Worker {} started", i);
            for path in rx {
                let job = build_job(&path).with_context(|| format!("Failed to inspect {:?}", path));
                if tx.send(job).is_err() {
                    break;
                }
            }
            debug!("Worker {} finished", i);
        }));
    }
    // Only the workers hold senders now, so the loop below ends with them.
    drop(scan_rx);
    drop(job_tx);

    let progress = if show_progress {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    progress.set_style(ProgressStyle::with_template("{spinner} {pos} files {msg}")?);

    let mut report = ScanReport::default();
    for job in job_rx {
        report.seen += 1;
        progress.inc(1);

        let stored = job.and_then(|job| {
            store
                .upsert(&job.path, &job.document, job.hashes.as_ref(), None)
                .with_context(|| format!("Failed to store {:?}", job.path))
        });
        match stored {
            Ok(_) => report.stored += 1,
            Err(e) => {
                error!("{:#}", e);
                report.failed += 1;
            }
        }
    }

    report.failed += scanner_handle
        .join()
        .map_err(|_| anyhow!("Scanner thread panicked"))?;
    for handle in worker_handles {
        handle.join().map_err(|_| anyhow!("Worker thread panicked"))?;
    }

    progress.finish_with_message(format!("stored, {} failed", report.failed));
    info!("Scan finished: {} seen, {} stored, {} failed", report.seen, report.stored, report.failed);
    Ok(report)
}
