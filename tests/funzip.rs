//! Round trips through a real `funzip`, skipped when none is installed.

#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use common::*;
use zipbridge::bridge::BridgeError;
use zipbridge::{BridgeConfig, BridgedReader, EntryReader, MemoryReader, ReadOptions, ZipArchive};

fn find_funzip() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join("funzip"))
        .find(|candidate| candidate.is_file())
}

/// Decode one deflated entry through funzip after `tamper` adjusts it
async fn decode_with(tamper: impl FnOnce(&mut TestEntry)) -> Option<std::io::Result<Vec<u8>>> {
    let Some(funzip) = find_funzip() else {
        eprintln!("funzip not found in PATH, skipping");
        return None;
    };

    let text = sample(220);
    let mut entry = TestEntry::deflated("sample.txt", &text);
    tamper(&mut entry);
    let bytes = build_zip(&[entry], b"", false);

    let reader = BridgedReader::new(
        ZipArchive::new(Arc::new(MemoryReader::new(bytes))),
        BridgeConfig::force_all().with_engine_path(funzip),
    );
    let entries = reader.list_files().await.unwrap();
    let mut stream = reader
        .open_read_stream(&entries[0], &ReadOptions::default())
        .await
        .unwrap();

    let mut out = Vec::new();
    Some(stream.read_to_end(&mut out).await.map(|_| out))
}

fn assert_engine_failure(result: std::io::Result<Vec<u8>>, expected: &str) {
    let err = result.expect_err("tampered entry decoded cleanly");
    match BridgeError::from_io(&err) {
        Some(BridgeError::Engine { diagnostics, .. }) => {
            assert!(
                diagnostics.contains(expected),
                "unexpected diagnostics: {}",
                diagnostics
            );
        }
        other => panic!("expected engine error, got {:?}", other),
    }
}

#[tokio::test]
async fn decodes_deflate_entry() {
    if let Some(result) = decode_with(|_| {}).await {
        let out = result.unwrap();
        assert_eq!(out.len(), 220);
        assert_eq!(out, sample(220));
    }
}

#[tokio::test]
async fn reports_crc_error() {
    if let Some(result) = decode_with(|e| e.crc32 = e.crc32.wrapping_add(1)).await {
        assert_engine_failure(result, "crc error");
    }
}

#[tokio::test]
async fn reports_short_length() {
    if let Some(result) = decode_with(|e| e.uncompressed_size -= 1).await {
        assert_engine_failure(result, "length error");
    }
}

#[tokio::test]
async fn reports_long_length() {
    if let Some(result) = decode_with(|e| e.uncompressed_size += 1).await {
        assert_engine_failure(result, "length error");
    }
}
