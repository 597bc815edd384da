use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use devwatch::errors::{DevwatchError, Result};
use devwatch::watch::{ChangeReceiver, WatchBackend, WatchHandle};

#[derive(Debug, Default)]
struct BackendLog {
    opened: Vec<Vec<PathBuf>>,
    added: Vec<PathBuf>,
    close_calls: usize,
    fail_add: Vec<PathBuf>,
    tx: Option<mpsc::UnboundedSender<PathBuf>>,
}

/// Watch backend that records every call and lets the test inject change
/// events by hand.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<BackendLog>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add` fail for this path.
    pub fn fail_add_for(&self, path: impl Into<PathBuf>) {
        self.log.lock().unwrap().fail_add.push(path.into());
    }

    /// Paths passed to each `open` call.
    pub fn opened(&self) -> Vec<Vec<PathBuf>> {
        self.log.lock().unwrap().opened.clone()
    }

    /// Paths passed to `add`, flattened, in call order.
    pub fn added(&self) -> Vec<PathBuf> {
        self.log.lock().unwrap().added.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.log.lock().unwrap().close_calls
    }

    /// Emit a change event as if the OS had reported `path`.
    ///
    /// Returns `false` if no subscription was opened or the watcher stopped
    /// listening.
    pub fn emit(&self, path: impl AsRef<Path>) -> bool {
        let log = self.log.lock().unwrap();
        match &log.tx {
            Some(tx) => tx.send(path.as_ref().to_path_buf()).is_ok(),
            None => false,
        }
    }
}

impl WatchBackend for RecordingBackend {
    fn open(&self, paths: &[PathBuf]) -> Result<(Box<dyn WatchHandle>, ChangeReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut log = self.log.lock().unwrap();
            log.opened.push(paths.to_vec());
            log.tx = Some(tx);
        }
        Ok((
            Box::new(RecordingHandle {
                log: Arc::clone(&self.log),
                watched: paths.to_vec(),
            }),
            rx,
        ))
    }
}

struct RecordingHandle {
    log: Arc<Mutex<BackendLog>>,
    watched: Vec<PathBuf>,
}

impl WatchHandle for RecordingHandle {
    fn add(&mut self, paths: &[PathBuf]) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if let Some(bad) = paths.iter().find(|p| log.fail_add.contains(p)) {
            return Err(DevwatchError::Other(anyhow::anyhow!(
                "refusing to watch {}",
                bad.display()
            )));
        }
        log.added.extend(paths.iter().cloned());
        self.watched.extend(paths.iter().cloned());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().close_calls += 1;
        self.watched.clear();
        Ok(())
    }

    fn watched(&self) -> Vec<PathBuf> {
        self.watched.clone()
    }
}
