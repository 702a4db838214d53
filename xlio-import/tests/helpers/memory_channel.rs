//! In-memory notification transport
//!
//! Frames pushed while no connection is open are queued and delivered on the
//! next successful connect.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use xlio_import::channel::{Connection, Connector, TransportError};

pub struct MemoryConnector {
    accepting: AtomicBool,
    connect_calls: AtomicUsize,
    pending: Mutex<VecDeque<String>>,
    live: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl MemoryConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accepting: AtomicBool::new(true),
            connect_calls: AtomicUsize::new(0),
            pending: Mutex::new(VecDeque::new()),
            live: Mutex::new(None),
        })
    }

    /// Connector whose every connect attempt fails
    pub fn refusing() -> Arc<Self> {
        let connector = Self::new();
        connector.set_accepting(false);
        connector
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .map_or(false, |tx| !tx.is_closed())
    }

    /// Deliver a raw text frame
    pub fn push(&self, text: impl Into<String>) {
        let text = text.into();
        let mut live = self.live.lock().unwrap();
        if let Some(tx) = live.as_ref() {
            match tx.send(text) {
                Ok(()) => return,
                Err(mpsc::error::SendError(text)) => {
                    *live = None;
                    self.pending.lock().unwrap().push_back(text);
                }
            }
        } else {
            self.pending.lock().unwrap().push_back(text);
        }
    }

    /// Simulate the peer dropping the connection
    pub fn drop_connection(&self) {
        self.live.lock().unwrap().take();
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for frame in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(frame);
        }
        *self.live.lock().unwrap() = Some(tx);
        Ok(Box::new(MemoryConnection { rx }))
    }
}

struct MemoryConnection {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

pub fn progress_frame(task_id: &str, current: u64, total: u64) -> String {
    let percent = if total > 0 { current * 100 / total } else { 0 };
    json!({
        "type": "progress",
        "task_id": task_id,
        "current": current,
        "total": total,
        "percent": percent,
        "status": "processing",
    })
    .to_string()
}

pub fn completed_frame(task_id: &str, inserted: u64) -> String {
    json!({
        "type": "completed",
        "task_id": task_id,
        "status": "completed",
        "inserted": inserted,
        "skipped": [],
    })
    .to_string()
}

pub fn failed_frame(task_id: &str, current: u64, error: &str) -> String {
    json!({
        "type": "progress",
        "task_id": task_id,
        "current": current,
        "total": 10,
        "percent": current * 10,
        "status": "failed",
        "error": error,
    })
    .to_string()
}
