//! Background model import.
//!
//! Parsing happens on a worker thread so the render loop keeps running while
//! a model loads. Requests carry an epoch; the owner compares it against its
//! current epoch when results arrive and drops anything stale.

use crate::engine::import::{self, ImportError, ImportedModel};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

enum ImportCommand {
    Parse {
        epoch: u64,
        name: String,
        bytes: Arc<[u8]>,
    },
    Stop,
}

pub struct ImportResult {
    pub epoch: u64,
    pub name: String,
    pub model: Result<ImportedModel, ImportError>,
}

pub struct ImportWorker {
    tx: Sender<ImportCommand>,
    rx: Receiver<ImportResult>,
    handle: Option<JoinHandle<()>>,
}

impl ImportWorker {
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = channel::<ImportCommand>();
        let (res_tx, res_rx) = channel::<ImportResult>();

        let handle = thread::Builder::new()
            .name("model-import".to_string())
            .spawn(move || worker_loop(cmd_rx, res_tx))
            .map_err(|err| log::error!("Failed to spawn import worker: {}", err))
            .ok();

        Self {
            tx: cmd_tx,
            rx: res_rx,
            handle,
        }
    }

    /// Queues a parse. Returns `false` when the worker is gone and the
    /// request was dropped.
    pub fn request(&self, epoch: u64, name: &str, bytes: Arc<[u8]>) -> bool {
        log::debug!("Import requested: {} (epoch {})", name, epoch);
        let sent = self
            .tx
            .send(ImportCommand::Parse {
                epoch,
                name: name.to_string(),
                bytes,
            })
            .is_ok();
        if !sent {
            log::warn!("Import worker is not running; dropped request for '{}'", name);
        }
        sent
    }

    /// Non-blocking poll for a finished import.
    pub fn try_recv(&self) -> Option<ImportResult> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ImportResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn stop(&mut self) {
        let _ = self.tx.send(ImportCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ImportWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(rx: Receiver<ImportCommand>, tx: Sender<ImportResult>) {
    while let Ok(command) = rx.recv() {
        match command {
            ImportCommand::Parse { epoch, name, bytes } => {
                let model = import::parse_obj(&name, &bytes);
                if tx.send(ImportResult { epoch, name, model }).is_err() {
                    break;
                }
            }
            ImportCommand::Stop => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_returns_epoch_with_result() {
        let mut worker = ImportWorker::spawn();
        let bytes: Arc<[u8]> = Arc::from(&b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n"[..]);
        assert!(worker.request(7, "tri.obj", bytes));
        let result = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result.epoch, 7);
        assert_eq!(result.name, "tri.obj");
        assert_eq!(result.model.unwrap().meshes.len(), 1);
        worker.stop();
        worker.stop();
    }

    #[test]
    fn test_results_arrive_in_request_order() {
        let worker = ImportWorker::spawn();
        worker.request(1, "first.obj", Arc::from(Vec::<u8>::new()));
        worker.request(2, "second.obj", Arc::from(Vec::<u8>::new()));
        let first = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!((first.epoch, second.epoch), (1, 2));
    }

    #[test]
    fn test_request_after_stop_is_rejected() {
        let mut worker = ImportWorker::spawn();
        worker.stop();
        assert!(!worker.request(1, "late.obj", Arc::from(Vec::<u8>::new())));
        assert!(worker.recv_timeout(Duration::from_millis(50)).is_none());
    }
}
