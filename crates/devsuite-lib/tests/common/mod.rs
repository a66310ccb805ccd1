#![allow(dead_code)]

use devsuite_lib::catalog::{Catalog, Requirement};
use devsuite_lib::installer::types::{Detection, OsType, ProgressReporter};
use devsuite_lib::installer::{InstallContext, Recipe};
use devsuite_lib::{InstallerConfig, Orchestrator};
use futures::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn catalog(json: &str) -> Catalog {
    Catalog::from_json_str(json, OsType::current()).expect("catalog")
}

pub fn config(root: &Path) -> InstallerConfig {
    let mut config = InstallerConfig::new(
        root.join("install"),
        root.join("downloads"),
        root.join("bundle"),
    );
    config.progress_interval_ms = 0;
    config
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Records what the fake recipes did, in order.
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

/// Recipe with scripted detection that logs installs to a [`Journal`].
pub struct FakeRecipe {
    pub host: Host,
    pub fail_install: bool,
    pub journal: Arc<Journal>,
}

impl Recipe for FakeRecipe {
    fn detect<'a>(
        &'a self,
        requirement: &'a Requirement,
    ) -> BoxFuture<'a, anyhow::Result<Option<Detection>>> {
        Box::pin(async move { Ok(self.host.detection_of(&requirement.id)) })
    }

    fn install_after_requirements<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        _reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let id = &ctx.requirement.id;
            let running = self.journal.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.journal.max_running.fetch_max(running, Ordering::SeqCst);
            self.journal.push(format!("start:{}", id));

            for artifact in &ctx.artifacts {
                assert!(artifact.exists(), "artifact {:?} missing at install", artifact);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;

            self.journal.running.fetch_sub(1, Ordering::SeqCst);
            if self.fail_install {
                self.journal.push(format!("fail:{}", id));
                anyhow::bail!("scripted failure of {}", id);
            }
            self.journal.push(format!("end:{}", id));
            Ok(())
        })
    }

    fn setup<'a>(
        &'a self,
        ctx: &'a InstallContext<'a>,
        _reporter: Arc<dyn ProgressReporter>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.journal.push(format!("setup:{}", ctx.requirement.id));
            Ok(())
        })
    }
}

/// Scripted host: which components are already installed and which installers fail.
/// Clones share the installed set, so a test can change the host between detections.
#[derive(Default, Clone)]
pub struct Host {
    detected: Arc<Mutex<HashMap<String, Detection>>>,
    pub failing: HashSet<String>,
}

impl Host {
    pub fn with_detected(self, id: &str, version: &str, location: &Path) -> Self {
        self.install(id, version, location);
        self
    }

    pub fn install(&self, id: &str, version: &str, location: &Path) {
        self.detected.lock().unwrap().insert(
            id.to_string(),
            Detection {
                version: version.to_string(),
                location: location.to_path_buf(),
            },
        );
    }

    pub fn uninstall(&self, id: &str) {
        self.detected.lock().unwrap().remove(id);
    }

    pub fn detection_of(&self, id: &str) -> Option<Detection> {
        self.detected.lock().unwrap().get(id).cloned()
    }

    pub fn with_failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

pub fn orchestrator(
    catalog: Catalog,
    root: &Path,
    host: Host,
    journal: Arc<Journal>,
) -> devsuite_lib::Result<Orchestrator> {
    Orchestrator::with_recipes(
        catalog,
        config(root),
        Arc::new(RecordingReporter::default()),
        move |requirement: &Requirement| -> Box<dyn Recipe> {
            Box::new(FakeRecipe {
                host: host.clone(),
                fail_install: host.failing.contains(&requirement.id),
                journal: journal.clone(),
            })
        },
    )
}

#[derive(Default)]
pub struct RecordingReporter {
    pub statuses: Mutex<Vec<String>>,
    pub currents: Mutex<Vec<u64>>,
    pub totals: Mutex<Vec<u64>>,
    pub failures: Mutex<Vec<String>>,
    pub completions: AtomicUsize,
}

impl ProgressReporter for RecordingReporter {
    fn set_status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }

    fn set_current(&self, current: u64) {
        self.currents.lock().unwrap().push(current);
    }

    fn set_total_amount(&self, total: u64) {
        self.totals.lock().unwrap().push(total);
    }

    fn set_complete(&self) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn set_failed(&self, message: &str) {
        self.failures.lock().unwrap().push(message.to_string());
    }
}

pub fn ids(units: &[Arc<devsuite_lib::InstallableUnit>]) -> Vec<String> {
    units.iter().map(|u| u.id().to_string()).collect()
}

pub fn path_of(root: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(root.to_path_buf(), |p, part| p.join(part))
}
