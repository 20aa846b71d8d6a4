//! End-to-end tests of the upload coordinator with in-memory collaborators

use acton_ingest::prelude::*;
use acton_ingest::testing::{RecordingSecurityCollector, RecordingStorage};
use std::sync::Arc;
use std::time::Duration;

const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
const PDF: &[u8] = b"%PDF-1.7\n%binary";
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x18];

fn coordinator_with(
    storage: &RecordingStorage,
    collector: &RecordingSecurityCollector,
) -> UploadCoordinator {
    UploadCoordinator::builder("spaces/../team one", Arc::new(storage.clone()))
        .security_logger(SecurityEventLogger::spawn(Arc::new(collector.clone()), 64))
        .max_concurrent_transfers(2)
        .build()
}

#[tokio::test]
async fn test_one_invalid_candidate_does_not_affect_the_batch() {
    let storage = RecordingStorage::new();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    let ids = coordinator.submit_all([
        UploadCandidate::new("a.png", "image/png", PNG),
        UploadCandidate::new("b.pdf", "application/pdf", PDF),
        // Declared PNG, actually a PDF
        UploadCandidate::new("forged.png", "image/png", b"%PDF-1.4 forged".to_vec()),
        UploadCandidate::new("c.jpg", "image/jpeg", JPEG),
        UploadCandidate::new("notes.txt", "text/plain", b"quarterly numbers".to_vec()),
    ]);
    assert_eq!(ids.len(), 5);

    let batch = coordinator.settled().await;
    let summary = batch.summary();
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total(), 5);

    // Display order is submission order
    let names: Vec<_> = batch
        .records()
        .iter()
        .map(|record| record.metadata().filename.clone())
        .collect();
    assert_eq!(names, ["a.png", "b.pdf", "forged.png", "c.jpg", "notes.txt"]);

    let forged = batch.get(ids[2]).unwrap();
    assert_eq!(
        forged.failure().and_then(UploadFailure::validation_kind),
        Some(ValidationFailureKind::SignatureMismatch)
    );

    // The forged file never reached the collaborator
    assert_eq!(storage.request_count(), 4);
    assert!(!storage.received_content(b"%PDF-1.4 forged"));

    assert_eq!(batch.remote_locations().len(), 4);
    for location in batch.remote_locations() {
        assert!(location.starts_with("https://storage.test/spaces/team_one/"));
    }

    collector.wait_for_events(1).await;
    assert_eq!(collector.count_of(SecurityEventKind::ValidationFailed), 1);
    assert_eq!(collector.count_of(SecurityEventKind::UploadFailed), 0);
}

#[tokio::test]
async fn test_rejected_candidates_produce_no_transmissions() {
    let storage = RecordingStorage::new();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    coordinator.submit_all([
        UploadCandidate::new("run.exe", "application/x-msdownload", vec![0x4D, 0x5A]),
        UploadCandidate::new("notes.txt", "text/plain", b"<ScRiPt>alert(1)".to_vec()),
        UploadCandidate::new("image.svg", "image/png", PNG),
    ]);

    let batch = coordinator.settled().await;
    let kinds: Vec<_> = batch
        .records()
        .iter()
        .map(|record| record.failure().and_then(UploadFailure::validation_kind))
        .collect();
    assert_eq!(
        kinds,
        [
            Some(ValidationFailureKind::TypeNotAllowed),
            Some(ValidationFailureKind::MaliciousContentDetected),
            Some(ValidationFailureKind::ExtensionNotAllowed),
        ]
    );
    assert_eq!(storage.request_count(), 0);

    collector.wait_for_events(3).await;
    let event = &collector.events()[0];
    assert_eq!(event.event_kind, SecurityEventKind::ValidationFailed);
    assert!(event.detail["fileName"].is_string());
    assert!(event.detail["reason"].is_string());
}

#[tokio::test]
async fn test_server_rejection_is_recorded_and_reported() {
    let storage = RecordingStorage::new()
        .fail_content(PDF, TransmissionError::rejected("HTTP 413: payload too large"));
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    let ok = coordinator.submit(UploadCandidate::new("a.png", "image/png", PNG));
    let rejected = coordinator.submit(UploadCandidate::new("b.pdf", "application/pdf", PDF));

    let rejected = coordinator.wait_for_record(rejected).await.unwrap();
    assert_eq!(
        rejected.failure().and_then(UploadFailure::transmission_kind),
        Some(TransmissionFailureKind::ServerRejected)
    );
    assert!(rejected
        .error_detail()
        .is_some_and(|detail| detail.contains("413")));

    let ok = coordinator.wait_for_record(ok).await.unwrap();
    assert!(ok.remote_location().is_some());

    collector.wait_for_events(1).await;
    let events = collector.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_kind, SecurityEventKind::UploadFailed);
    assert_eq!(events[0].detail["reason"], "server_rejected");
    assert_eq!(events[0].detail["fileName"], "b.pdf");
    assert_eq!(
        events[0].detail["checksum"],
        acton_ingest::identity::checksum_hex(PDF).as_str()
    );
    assert!(events[0].detail["secureName"]
        .as_str()
        .is_some_and(|name| name.ends_with(".pdf")));
}

#[tokio::test]
async fn test_transmitted_request_carries_identity() {
    let storage = RecordingStorage::new();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    let id = coordinator.submit(UploadCandidate::new("Holiday Photo.PNG", "image/png", PNG));
    coordinator.wait_for_record(id).await.unwrap();

    let request = &storage.requests()[0];
    assert_eq!(request.content().as_ref(), PNG);
    assert_eq!(request.sanitized_path(), "spaces/team_one");
    assert_eq!(request.checksum_hex(), acton_ingest::identity::checksum_hex(PNG));
    // The extension keeps its original spelling; nothing else of the name survives
    assert!(request.secure_filename().ends_with(".PNG"));
    assert!(!request.secure_filename().contains("Holiday"));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_success() {
    let storage = RecordingStorage::paused();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);
    let mut updates = coordinator.subscribe();

    let id = coordinator.submit(UploadCandidate::new("a.png", "image/png", PNG));
    storage.wait_for_started(1).await;

    let record = coordinator.record(id).unwrap();
    assert_eq!(record.status(), &UploadStatus::Uploading { progress_percent: 0 });

    storage.release(1);

    let mut seen = Vec::new();
    loop {
        updates.changed().await.unwrap();
        let snapshot = updates.borrow_and_update().clone();
        let record = snapshot.get(id).unwrap();
        if let Some(percent) = record.progress_percent() {
            seen.push(percent);
        }
        if record.status().is_terminal() {
            break;
        }
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(coordinator.record(id).unwrap().status().name(), "success");
}

#[tokio::test]
async fn test_transfer_limit_holds_extra_records() {
    let storage = RecordingStorage::paused();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    coordinator.submit_all((0..4).map(|n| {
        UploadCandidate::new(format!("{n}.txt"), "text/plain", format!("file {n}").into_bytes())
    }));

    storage.wait_for_started(2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(storage.request_count(), 2);

    storage.release(4);
    let batch = coordinator.settled().await;
    assert_eq!(batch.summary().succeeded, 4);
    assert_eq!(storage.request_count(), 4);
}

#[tokio::test]
async fn test_detach_stops_tracking_but_transfer_completes() {
    let storage = RecordingStorage::paused();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    let id = coordinator.submit(UploadCandidate::new("a.png", "image/png", PNG));
    storage.wait_for_started(1).await;

    let removed = coordinator.remove(id, Removal::Detach).unwrap();
    assert_eq!(removed.id(), id);
    assert!(coordinator.record(id).is_none());
    assert!(coordinator.snapshot().is_empty());
    // The detached transfer is still running
    assert_eq!(coordinator.in_flight(), 1);

    storage.release(1);
    storage.wait_for_completed(1).await;
    tokio::time::timeout(Duration::from_secs(1), async {
        while coordinator.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("detached task deregisters when its transfer ends");

    // Completion of a detached record never resurrects it
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(coordinator.record(id).is_none());
    assert!(coordinator.wait_for_record(id).await.is_none());
}

#[tokio::test]
async fn test_abort_cancels_in_flight_transfer() {
    let storage = RecordingStorage::paused();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    let id = coordinator.submit(UploadCandidate::new("a.png", "image/png", PNG));
    storage.wait_for_started(1).await;

    coordinator.remove(id, Removal::Abort).unwrap();
    assert_eq!(coordinator.in_flight(), 0);

    storage.release(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(storage.completed_count(), 0);
    assert!(coordinator.record(id).is_none());
    assert!(matches!(
        coordinator.remove(id, Removal::Abort),
        Err(IngestError::RecordNotFound(_))
    ));
}

#[tokio::test]
async fn test_removing_settled_record() {
    let storage = RecordingStorage::new();
    let collector = RecordingSecurityCollector::new();
    let coordinator = coordinator_with(&storage, &collector);

    let id = coordinator.submit(UploadCandidate::new("a.png", "image/png", PNG));
    coordinator.wait_for_record(id).await.unwrap();

    let removed = coordinator.remove(id, Removal::Abort).unwrap();
    assert_eq!(removed.status().name(), "success");
    assert!(coordinator.snapshot().is_empty());
}
