//! Checksum-verified downloads with selective retry.
//!
//! A [`Downloader`] is one unit's pipeline: its tasks run one after another in declared order,
//! while the downloaders of different units run independently. Every task is remembered by
//! destination so [`Downloader::restart_download`] can re-issue only the ones that failed.

use crate::catalog::Credentials;
use crate::config::REQUEST_TIMEOUT_SECS;
use crate::error::DownloadError;
use crate::installer::core::progress::Throttle;
use crate::installer::types::ProgressReporter;
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub sha256: Option<String>,
    pub credentials: Option<Credentials>,
    /// Declared size, used for progress weighting only
    pub size: u64,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            sha256: None,
            credentials: None,
            size: 0,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }
}

/// Receives per-task failures and the single completion of each batch.
pub trait DownloadObserver: Send + Sync {
    fn on_failure(&self, _task: &DownloadTask, _error: &DownloadError) {}

    fn on_batch_complete(&self, _report: &BatchReport) {}
}

/// Observer that only logs.
pub struct LogObserver;

impl DownloadObserver for LogObserver {
    fn on_failure(&self, task: &DownloadTask, error: &DownloadError) {
        log::error!("Download of {} failed: {}", task.url, error);
    }
}

/// Outcome of a batch, by destination path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn into_result(self) -> Result<Self, DownloadError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(DownloadError::Incomplete {
                failed: self.failed.len(),
                total: self.total(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskStatus {
    Pending,
    Succeeded,
    Failed(String),
}

struct TaskRecord {
    task: DownloadTask,
    status: TaskStatus,
}

#[derive(Default)]
struct Memo {
    order: Vec<PathBuf>,
    records: HashMap<PathBuf, TaskRecord>,
}

pub struct Downloader {
    client: Client,
    progress_interval: Duration,
    /// Longest wait for response headers or the next body chunk
    idle_timeout: Duration,
    memo: Mutex<Memo>,
}

impl Downloader {
    pub fn new(client: Client, progress_interval: Duration) -> Self {
        Self {
            client,
            progress_interval,
            idle_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            memo: Mutex::new(Memo::default()),
        }
    }

    /// A transfer fails once the server stays silent this long. Slow but steady
    /// transfers are never cut off.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Download every task in order. Resolves once each task has either succeeded or failed;
    /// a failure never stops the tasks after it.
    pub async fn download(
        &self,
        tasks: Vec<DownloadTask>,
        reporter: Arc<dyn ProgressReporter>,
        observer: &dyn DownloadObserver,
    ) -> BatchReport {
        if let Ok(mut memo) = self.memo.lock() {
            for task in &tasks {
                if !memo.records.contains_key(&task.destination) {
                    memo.order.push(task.destination.clone());
                }
                memo.records.insert(
                    task.destination.clone(),
                    TaskRecord {
                        task: task.clone(),
                        status: TaskStatus::Pending,
                    },
                );
            }
        }
        self.run_batch(tasks, reporter, observer).await
    }

    /// Re-issue only the tasks that failed, from their remembered url, destination, checksum and credentials.
    pub async fn restart_download(
        &self,
        reporter: Arc<dyn ProgressReporter>,
        observer: &dyn DownloadObserver,
    ) -> BatchReport {
        let tasks = self.failed_tasks();
        log::info!("Restarting {} failed download(s)", tasks.len());
        self.run_batch(tasks, reporter, observer).await
    }

    pub fn failed_tasks(&self) -> Vec<DownloadTask> {
        let Ok(memo) = self.memo.lock() else {
            return Vec::new();
        };
        memo.order
            .iter()
            .filter_map(|dest| memo.records.get(dest))
            .filter(|record| matches!(record.status, TaskStatus::Failed(_)))
            .map(|record| record.task.clone())
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_tasks().is_empty()
    }

    /// Error message of a failed task, if it failed.
    pub fn failure_of(&self, destination: &Path) -> Option<String> {
        let memo = self.memo.lock().ok()?;
        match &memo.records.get(destination)?.status {
            TaskStatus::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    fn set_status(&self, destination: &Path, status: TaskStatus) {
        if let Ok(mut memo) = self.memo.lock() {
            if let Some(record) = memo.records.get_mut(destination) {
                record.status = status;
            }
        }
    }

    async fn run_batch(
        &self,
        tasks: Vec<DownloadTask>,
        reporter: Arc<dyn ProgressReporter>,
        observer: &dyn DownloadObserver,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let total_size: u64 = tasks.iter().map(|t| t.size).sum();
        reporter.set_total_amount(total_size);

        let throttle = Throttle::new(self.progress_interval);
        let mut completed_bytes = 0u64;
        let mut outstanding = tasks.len();

        for task in tasks {
            reporter.set_status(&format!("Downloading {}", task.url));
            match self
                .fetch(&task, &*reporter, &throttle, completed_bytes)
                .await
            {
                Ok(bytes) => {
                    completed_bytes += bytes;
                    self.set_status(&task.destination, TaskStatus::Succeeded);
                    report.succeeded.push(task.destination.clone());
                }
                Err(e) => {
                    log::warn!("Download failed: {} -> {:?}: {}", task.url, task.destination, e);
                    self.set_status(&task.destination, TaskStatus::Failed(e.to_string()));
                    reporter.set_failed(&e.to_string());
                    observer.on_failure(&task, &e);
                    report.failed.push(task.destination.clone());
                }
            }
            outstanding -= 1;
            log::debug!("{} download(s) outstanding in batch", outstanding);
        }

        reporter.set_current(completed_bytes);
        if report.is_success() {
            reporter.set_complete();
        }
        observer.on_batch_complete(&report);
        report
    }

    /// Stream one task to disk and verify it. Returns the number of bytes written.
    async fn fetch(
        &self,
        task: &DownloadTask,
        reporter: &dyn ProgressReporter,
        throttle: &Throttle,
        base: u64,
    ) -> Result<u64, DownloadError> {
        log::debug!("Downloading: {} -> {:?}", task.url, task.destination);
        let start = Instant::now();

        if let Some(parent) = task.destination.parent() {
            create_dir_all(parent).await.map_err(|source| DownloadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut request = self.client.get(&task.url);
        if let Some(creds) = &task.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = tokio::time::timeout(self.idle_timeout, request.send())
            .await
            .map_err(|_| DownloadError::Stalled {
                url: task.url.clone(),
                idle: self.idle_timeout,
            })?
            .map_err(|source| DownloadError::Transport {
                url: task.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: task.url.clone(),
                status: response.status(),
            });
        }

        // Write next to the destination and move into place once verified
        let tmp_path = part_path(&task.destination);
        let result = stream_to_file(
            response,
            &tmp_path,
            task,
            reporter,
            throttle,
            base,
            self.idle_timeout,
        )
        .await;
        let (written, computed) = match result {
            Ok(ok) => ok,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(e);
            }
        };

        if let Some(expected) = &task.sha256 {
            if !crate::utils::hash::checksum_matches(&computed, expected) {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(DownloadError::ChecksumMismatch {
                    path: task.destination.clone(),
                    expected: expected.clone(),
                    actual: computed,
                });
            }
            log::debug!("SHA256 validated: {}", computed);
        }

        tokio::fs::rename(&tmp_path, &task.destination)
            .await
            .map_err(|source| DownloadError::Io {
                path: task.destination.clone(),
                source,
            })?;

        let secs = start.elapsed().as_secs_f64();
        let throughput = (written as f64 / 1024.0 / 1024.0) / secs.max(0.001);
        log::info!(
            "Download stats: url={}, size={} bytes, time={:.2}s, throughput={:.2} MB/s",
            task.url,
            written,
            secs,
            throughput
        );

        Ok(written)
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    destination.with_file_name(format!("{}.part", name))
}

/// Returns bytes written and the lowercase hex SHA-256 of them.
async fn stream_to_file(
    response: reqwest::Response,
    path: &Path,
    task: &DownloadTask,
    reporter: &dyn ProgressReporter,
    throttle: &Throttle,
    base: u64,
    idle_timeout: Duration,
) -> Result<(u64, String), DownloadError> {
    let io_err = |source| DownloadError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).await.map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut written = 0u64;
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::time::timeout(idle_timeout, stream.next())
            .await
            .map_err(|_| DownloadError::Stalled {
                url: task.url.clone(),
                idle: idle_timeout,
            })?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|source| DownloadError::Transport {
            url: task.url.clone(),
            source,
        })?;
        file.write_all(&chunk).await.map_err(io_err)?;
        hasher.update(&chunk);
        written += chunk.len() as u64;

        if throttle.ready() {
            reporter.set_current(base + written);
        }
    }

    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    Ok((written, format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_file_sits_next_to_destination() {
        assert_eq!(
            part_path(Path::new("/tmp/dl/jdk.zip")),
            PathBuf::from("/tmp/dl/jdk.zip.part")
        );
    }

    #[test]
    fn incomplete_report_is_an_error() {
        let report = BatchReport {
            succeeded: vec![PathBuf::from("a")],
            failed: vec![PathBuf::from("b")],
        };
        assert!(matches!(
            report.into_result(),
            Err(DownloadError::Incomplete { failed: 1, total: 2 })
        ));
    }

    #[test]
    fn task_builder() {
        let task = DownloadTask::new("https://example.com/a", "/tmp/a")
            .with_sha256("00")
            .with_size(4);
        assert_eq!(task.sha256.as_deref(), Some("00"));
        assert_eq!(task.size, 4);
        assert!(task.credentials.is_none());
    }
}
