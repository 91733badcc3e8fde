// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upload scenarios: backpressure, incomplete streams, and the pipe drain
//! gating job start.

use super::harness::Harness;
use jl_core::{JobId, JobState, UploadFile};
use jl_isolation::{
    upload::byte_budget, StreamPair, UploadError, UploadManager, UploadTransport,
};
use std::time::Duration;

fn upload(path: &str, size: u64) -> UploadFile {
    UploadFile {
        path: path.to_string(),
        mode: 0o644,
        size,
    }
}

#[test]
fn budget_follows_the_memory_cap() {
    // A 128 MiB job gets a 32 MiB in-flight window; big jobs cap at 64 MiB.
    assert_eq!(byte_budget(128), 32 * 1024 * 1024);
    assert_eq!(byte_budget(512), 64 * 1024 * 1024);
}

#[tokio::test]
async fn producer_blocks_until_the_consumer_drains() {
    // Scaled-down scenario: payload several times the budget; the producer
    // must stall until the drain starts, then everything arrives.
    let dest = tempfile::tempdir().unwrap();
    let manager = UploadManager::new("/tmp/unused");
    let payload = vec![42u8; 1024 * 1024];
    let session = manager.prepare_session(
        &JobId::new("big"),
        vec![upload("model.bin", payload.len() as u64)],
        1, // 1 MB cap -> 256 KiB budget
    );

    let UploadTransport::Stream(StreamPair { producer, consumer }) =
        manager.create_stream_transport(&session)
    else {
        panic!("expected stream transport");
    };

    let send = tokio::spawn(async move {
        producer.send_file("model.bin", 0o644, &payload).await?;
        producer.finish().await
    });

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!send.is_finished(), "producer should be blocked on budget");

    let dest_path = dest.path().to_path_buf();
    let drain = tokio::spawn(async move { consumer.drain_to(&dest_path).await });

    send.await.unwrap().unwrap();
    drain.await.unwrap().unwrap();
    assert_eq!(
        std::fs::metadata(dest.path().join("model.bin")).unwrap().len(),
        1024 * 1024
    );
}

#[tokio::test]
async fn producer_abort_surfaces_upload_incomplete() {
    let dest = tempfile::tempdir().unwrap();
    let manager = UploadManager::new("/tmp/unused");
    let session = manager.prepare_session(
        &JobId::new("aborted"),
        vec![upload("data.bin", 4096)],
        64,
    );

    let UploadTransport::Stream(StreamPair { producer, consumer }) =
        manager.create_stream_transport(&session)
    else {
        panic!("expected stream transport");
    };

    producer.send_file("data.bin", 0o644, &[1, 2, 3]).await.unwrap();
    drop(producer); // abort mid-stream, before the terminator

    let err = consumer.drain_to(dest.path()).await.unwrap_err();
    assert!(matches!(err, UploadError::Incomplete(_)), "got {err:?}");
}

#[tokio::test]
async fn job_with_uploads_starts_after_the_pipe_drains() {
    let h = Harness::new();

    let content = "print('ready')\n";
    let mut spec = Harness::spec("/bin/true", &[]);
    spec.uploads = vec![UploadFile {
        path: "main.py".into(),
        mode: 0o644,
        size: content.len() as u64,
    }];
    spec.limits.max_memory_mb = 128;

    let job = h
        .orchestrator
        .submit_with_uploads(
            Some("uploader".into()),
            spec,
            vec![("main.py".into(), content.as_bytes().to_vec())],
        )
        .await
        .unwrap();

    // The shim drains the pipe before exec'ing /bin/true, so completion
    // proves the producer fed the whole session through the FIFO.
    let done = h.wait_for_job(&job.id, JobState::Completed).await;
    assert_eq!(done.exit_code, Some(0));
}
