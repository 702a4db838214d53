//! Test Helper Utilities
//!
//! Shared fixtures for xlio-import integration tests

#![allow(dead_code)]

pub mod fake_gateway;
pub mod memory_channel;

pub use fake_gateway::{CallRecord, FakeGateway, GatewayCall};
pub use memory_channel::{completed_frame, failed_frame, progress_frame, MemoryConnector};

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use xlio_import::models::{RowRecord, SelectedFile, SheetDescriptor};
use xlio_import::{ImportConfig, ImportOrchestrator, ProgressChannel, ReconnectPolicy};

/// Config with short, deterministic timings
pub fn test_config() -> ImportConfig {
    ImportConfig {
        reconnect: ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 3),
        watchdog: Duration::from_secs(5),
        reset_delay: Duration::from_secs(3),
        ..ImportConfig::default()
    }
}

pub fn build_orchestrator(
    config: ImportConfig,
    gateway: &Arc<FakeGateway>,
    connector: &Arc<MemoryConnector>,
) -> ImportOrchestrator {
    let channel = ProgressChannel::new(connector.clone(), config.reconnect);
    ImportOrchestrator::new(config, gateway.clone(), channel)
}

pub fn rows(count: usize) -> Vec<RowRecord> {
    (0..count)
        .filter_map(|i| {
            json!({"username": format!("user{}", i), "email": format!("u{}@example.com", i)})
                .as_object()
                .cloned()
        })
        .collect()
}

/// Sheet with full row data, as a confirmed validation round returns it
pub fn sheet(name: &str, row_count: usize) -> SheetDescriptor {
    SheetDescriptor::new(name, vec!["username".into(), "email".into()]).with_rows(rows(row_count), 5)
}

pub fn xlsx(name: &str) -> SelectedFile {
    SelectedFile::from_bytes(name, vec![0x50, 0x4b, 0x03, 0x04, 0, 0, 0, 0])
}

/// Poll `condition` until it holds, advancing (paused) time in small steps
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}
