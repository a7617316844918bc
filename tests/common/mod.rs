#![allow(dead_code)]

pub mod mocks;
pub mod strategies;

#[allow(unused_imports)]
pub use mocks::*;

use image2sheet_core::config::ConverterConfig;
use image2sheet_core::models::TableArtifact;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Configuration with no inter-iteration pause and output under `dir`
pub fn test_config(dir: &Path) -> ConverterConfig {
    let mut config = ConverterConfig::default();
    config.engine.iteration_pause_ms = 0;
    config.engine.output_dir = dir.join("generated");
    config.bridge.worker_pool_size = 2;
    config.bridge.shutdown_timeout_seconds = 1;
    config
}

/// A small fake PNG on disk
pub fn fixture_image(dir: &Path) -> PathBuf {
    let path = dir.join("table.png");
    std::fs::write(&path, [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3])
        .expect("write fixture image");
    path
}

pub fn sample_table() -> TableArtifact {
    TableArtifact::new(
        vec!["item".into(), "qty".into()],
        vec![vec![json!("bolt"), json!(4)], vec![json!("nut"), json!(10)]],
    )
    .expect("sample table is rectangular")
}

/// Poll `condition` from a synchronous test until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Async counterpart of [`wait_until`]
pub async fn wait_until_async(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
