//! Pipeline scenarios: intake through upload completion.

use std::time::Duration;

use package_ingest_lib::error::IngestError;
use package_ingest_lib::models::RequestStatus;
use package_ingest_lib::services::{IngestFailure, IngestOutcome};
use uuid::Uuid;

use super::test_helpers::*;

async fn submit(harness: &Harness, name: &str, archive: &[u8]) -> IngestOutcome {
    harness
        .pipeline
        .submit(name, harness.seal(archive))
        .await
        .expect("ingestion should be accepted")
}

/// Wait for the background uploads of an accepted request.
async fn settle(outcome: IngestOutcome) -> Uuid {
    match outcome {
        IngestOutcome::Accepted {
            request_id,
            uploads,
            ..
        } => {
            uploads.await.unwrap();
            request_id
        }
        IngestOutcome::Duplicate { request_id, .. } => request_id,
    }
}

async fn ingest_failure(harness: &Harness, name: &str, payload: Vec<u8>) -> IngestFailure {
    let request_id = harness.pipeline.open_request().await.unwrap();
    harness
        .pipeline
        .ingest(request_id, name, payload)
        .await
        .expect_err("ingestion should fail")
}

/// (1) A valid package is persisted, uploaded and reported once.
#[tokio::test]
async fn test_valid_package_completes() {
    let harness = Harness::new();

    let outcome = submit(&harness, "car123.zip", &car_archive()).await;
    let (entries, files) = match &outcome {
        IngestOutcome::Accepted { entries, files, .. } => (*entries, *files),
        other => panic!("expected acceptance, got {:?}", other),
    };
    assert_eq!(entries, 2);
    assert_eq!(files, 4);

    let id = settle(outcome).await;

    let record = harness.status(id);
    assert_eq!(record.status, RequestStatus::Completed);
    assert!(!record.duplicate);
    assert!(record.error_code.is_none());

    assert_eq!(
        harness.store.keys(),
        vec![
            format!("img/{}front.png", id),
            format!("img/{}side.png", id),
            preset_key(),
            "unrecognized/car.obj".to_string(),
        ]
    );

    let notices = harness.notifier.notices.lock().unwrap().clone();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].request_id, id);
    assert_eq!(notices[0].package_name, "car123");
    assert_eq!(notices[0].vendor, "Volkswagen");

    assert!(!harness.work_dir_exists(id), "working directory should be removed");
}

/// (2) Stored entries carry the request identity and resolvable references.
#[tokio::test]
async fn test_entries_reference_uploaded_assets() {
    let harness = Harness::new();

    let id = settle(submit(&harness, "car123.zip", &car_archive()).await).await;

    let entries = harness.gateway.entries.lock().unwrap().clone();
    let keys = harness.store.keys();
    assert_eq!(entries.len(), 2);

    for entry in &entries {
        assert_eq!(entry.universal_uuid, id.to_string());
        assert_eq!(entry.parent_package_name, "car123");
        assert_eq!(entry.version, 1);
        assert_eq!(entry.vendor, "Volkswagen");
        assert_eq!(entry.user, "ops@example.com");
        for image in &entry.image_file_names {
            assert!(image.starts_with(&id.to_string()));
            assert!(keys.contains(&format!("img/{}", image)), "{} not uploaded", image);
        }
    }

    let preset = entries[0].psf_file_name.as_deref().unwrap();
    assert_eq!(format!("psf/{}", preset), preset_key());
    assert_eq!(entries[1].psf_file_name.as_deref(), Some(""));
    assert_eq!(entries[0].metrics["sharpness"], serde_json::json!(0.93));
}

/// (3) Resubmitting a package stores nothing and is marked duplicate.
#[tokio::test]
async fn test_duplicate_package() {
    let harness = Harness::new();

    settle(submit(&harness, "car123.zip", &car_archive()).await).await;
    let puts_before = harness.store.total_puts();

    let outcome = submit(&harness, "car123.zip", &car_archive()).await;
    let id = match outcome {
        IngestOutcome::Duplicate {
            request_id,
            package_name,
        } => {
            assert_eq!(package_name, "car123");
            request_id
        }
        other => panic!("expected duplicate, got {:?}", other),
    };

    let record = harness.status(id);
    assert_eq!(record.status, RequestStatus::Completed);
    assert!(record.duplicate);

    assert_eq!(harness.gateway.entry_count(), 2);
    assert_eq!(harness.store.total_puts(), puts_before);
    assert_eq!(harness.notifier.count(), 1);
    assert!(!harness.work_dir_exists(id));
}

/// (4) Presets with equal parameters are stored once across requests.
#[tokio::test]
async fn test_preset_deduplicated_across_requests() {
    let harness = Harness::new();

    settle(submit(&harness, "car123.zip", &car_archive()).await).await;
    let second = settle(submit(&harness, "car456.zip", &car_archive()).await).await;

    assert_eq!(harness.store.put_count(&preset_key()), 1);
    assert_eq!(harness.status(second).status, RequestStatus::Completed);
    assert_eq!(harness.notifier.count(), 2);
    assert_eq!(harness.gateway.entry_count(), 4);
}

/// (5) Missing asset group: nothing persisted, nothing stored.
#[tokio::test]
async fn test_missing_group_rejected() {
    let harness = Harness::new();
    let manifest = car_manifest();
    let archive = build_zip(&[("img/front.png", b"png"), ("info.json", manifest.as_slice())]);

    let failure = ingest_failure(&harness, "car123.zip", harness.seal(&archive)).await;

    assert_eq!(
        failure.error,
        IngestError::MissingRequiredAssetGroup("psf".into())
    );
    let record = harness.status(failure.request_id);
    assert_eq!(record.status, RequestStatus::Error);
    assert_eq!(record.error_code.as_deref(), Some("MISSING_REQUIRED_ASSET_GROUP"));

    assert_eq!(harness.gateway.entry_count(), 0);
    assert_eq!(harness.store.total_puts(), 0);
    assert_eq!(harness.notifier.count(), 0);
    assert!(!harness.work_dir_exists(failure.request_id));
}

/// (6) Archive entries escaping the working directory abort the request.
#[tokio::test]
async fn test_path_traversal_rejected() {
    let harness = Harness::new();
    let manifest = car_manifest();
    let archive = build_zip(&[
        ("img/front.png", b"png"),
        ("psf/studio.psf", PRESET),
        ("info.json", manifest.as_slice()),
        ("../../outside.sh", b"echo"),
    ]);

    let failure = ingest_failure(&harness, "car123.zip", harness.seal(&archive)).await;

    assert_eq!(failure.error.code(), "PATH_TRAVERSAL");
    assert_eq!(harness.status(failure.request_id).status, RequestStatus::Error);
    assert_eq!(harness.gateway.entry_count(), 0);
    assert!(!harness.dir.path().join("outside.sh").exists());
}

/// (7) A payload sealed with another key fails authentication.
#[tokio::test]
async fn test_wrong_key_rejected() {
    let harness = Harness::new();
    let other_key = package_ingest_lib::config::EncryptionKey::new([1u8; 32]);

    let failure = ingest_failure(&harness, "car123.zip", seal(&car_archive(), &other_key)).await;

    assert_eq!(failure.error, IngestError::AuthenticationFailed);
    assert_eq!(
        harness.status(failure.request_id).error_code.as_deref(),
        Some("AUTHENTICATION_FAILED")
    );
}

/// (8) Only .zip uploads are accepted.
#[tokio::test]
async fn test_wrong_extension_rejected() {
    let harness = Harness::new();

    let failure = ingest_failure(&harness, "car123.tar", harness.seal(&car_archive())).await;

    assert_eq!(failure.error, IngestError::InvalidExtension("car123.tar".into()));
    assert_eq!(harness.store.total_puts(), 0);
}

/// (9) Manifest naming an image the archive lacks.
#[tokio::test]
async fn test_dangling_reference_rejected() {
    let harness = Harness::new();
    let manifest = serde_json::to_vec(&serde_json::json!([
        {"file_name": "car.obj", "image_file_names": ["rear.png"]}
    ]))
    .unwrap();
    let archive = build_zip(&[
        ("img/front.png", b"png"),
        ("psf/studio.psf", PRESET),
        ("info.json", manifest.as_slice()),
    ]);

    let failure = ingest_failure(&harness, "car123.zip", harness.seal(&archive)).await;

    assert_eq!(
        failure.error,
        IngestError::DanglingAssetReference("rear.png".into())
    );
    assert_eq!(harness.gateway.entry_count(), 0);
    assert!(!harness.work_dir_exists(failure.request_id));
}

/// (10) A failed object upload is counted; the request still completes.
#[tokio::test]
async fn test_failed_upload_still_completes() {
    let harness = Harness::with_store(MemoryStore::failing(&["unrecognized/car.obj"]));

    let id = settle(submit(&harness, "car123.zip", &car_archive()).await).await;

    assert_eq!(harness.status(id).status, RequestStatus::Completed);
    assert_eq!(harness.store.put_count("unrecognized/car.obj"), 1);
    assert!(!harness.store.keys().contains(&"unrecognized/car.obj".to_string()));
    assert_eq!(harness.notifier.count(), 1);
}

/// (11) Minimal package: one entry without a package name of its own.
#[tokio::test]
async fn test_minimal_package_round_trip() {
    let harness = Harness::new();
    let manifest = serde_json::to_vec(&serde_json::json!([
        {"file_name": "a", "image_file_names": ["a.png"], "psf_file_name": "settings.psf"}
    ]))
    .unwrap();
    let archive = build_zip(&[
        ("img/a.png", b"png"),
        ("psf/settings.psf", PRESET),
        ("info.json", manifest.as_slice()),
    ]);

    let id = settle(submit(&harness, "car123.zip", &archive).await).await;

    assert_eq!(harness.status(id).status, RequestStatus::Completed);

    let entries = harness.gateway.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].parent_package_name, "car123");
    assert_eq!(entries[0].image_file_names, vec![format!("{}a.png", id)]);

    assert_eq!(
        harness.store.keys(),
        vec![format!("img/{}a.png", id), preset_key()]
    );
    assert!(!harness.work_dir_exists(id));
}

/// (12) Uploads outliving the dispatch deadline fail the request and withdraw it.
#[tokio::test]
async fn test_dispatch_deadline_aborts_request() {
    let harness = Harness::build(
        MemoryGateway::default(),
        MemoryStore::slow(Duration::from_secs(5)),
        RecordingNotifier::default(),
        |settings| {
            settings.dispatch_timeout_secs = 1;
            settings.upload_timeout_secs = 30;
        },
    );

    let id = settle(submit(&harness, "car123.zip", &car_archive()).await).await;

    let record = harness.status(id);
    assert_eq!(record.status, RequestStatus::Error);
    assert_eq!(record.error_code.as_deref(), Some("UPLOAD_TIMEOUT"));
    assert!(!harness.work_dir_exists(id));
    assert_eq!(harness.notifier.count(), 0);
    assert_eq!(harness.gateway.entry_count(), 0);
}

/// (13) A package whose uploads timed out can be submitted again.
#[tokio::test]
async fn test_timed_out_package_is_not_a_duplicate() {
    let harness = Harness::build(
        MemoryGateway::default(),
        MemoryStore::slow(Duration::from_secs(5)),
        RecordingNotifier::default(),
        |settings| {
            settings.dispatch_timeout_secs = 1;
            settings.upload_timeout_secs = 30;
        },
    );

    settle(submit(&harness, "car123.zip", &car_archive()).await).await;

    match submit(&harness, "car123.zip", &car_archive()).await {
        outcome @ IngestOutcome::Accepted { .. } => {
            settle(outcome).await;
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
}

/// (14) An undeliverable webhook leaves the request completed.
#[tokio::test]
async fn test_webhook_failure_keeps_completion() {
    let harness = Harness::build(
        MemoryGateway::default(),
        MemoryStore::default(),
        RecordingNotifier::failing(),
        |_| {},
    );

    let id = settle(submit(&harness, "car123.zip", &car_archive()).await).await;

    let record = harness.status(id);
    assert_eq!(record.status, RequestStatus::Completed);
    assert!(record.error_code.is_none());
    assert_eq!(harness.notifier.count(), 1);
    assert_eq!(harness.gateway.entry_count(), 2);
}

/// (15) A failed manifest insert stores nothing and uploads nothing.
#[tokio::test]
async fn test_manifest_insert_failure() {
    let harness = Harness::build(
        MemoryGateway::failing_inserts(),
        MemoryStore::default(),
        RecordingNotifier::default(),
        |_| {},
    );

    let failure = ingest_failure(&harness, "car123.zip", harness.seal(&car_archive())).await;

    assert_eq!(failure.error.code(), "PERSISTENCE_FAILURE");
    let record = harness.status(failure.request_id);
    assert_eq!(record.status, RequestStatus::Error);
    assert_eq!(record.error_code.as_deref(), Some("PERSISTENCE_FAILURE"));

    assert_eq!(harness.gateway.entry_count(), 0);
    assert_eq!(harness.store.total_puts(), 0);
    assert_eq!(harness.notifier.count(), 0);
    assert!(!harness.work_dir_exists(failure.request_id));
}

/// (16) Files outside the asset groups are uploaded on every request, while
/// presets are stored once by content.
#[tokio::test]
async fn test_only_presets_are_content_addressed() {
    let harness = Harness::new();
    let preset_json: &[u8] = br#"{"parameters": {"exposure": 2.0}}"#;
    let manifest = serde_json::to_vec(&serde_json::json!([
        {"file_name": "a", "image_file_names": ["a.png"], "psf_file_name": "p.json"}
    ]))
    .unwrap();

    let first = build_zip(&[
        ("img/a.png", b"png"),
        ("psf/p.json", preset_json),
        ("extra.psf", b"first"),
        ("info.json", manifest.as_slice()),
    ]);
    let second = build_zip(&[
        ("img/a.png", b"png"),
        ("psf/p.json", preset_json),
        ("extra.psf", b"second"),
        ("info.json", manifest.as_slice()),
    ]);

    settle(submit(&harness, "car123.zip", &first).await).await;
    settle(submit(&harness, "car456.zip", &second).await).await;

    let preset = format!(
        "psf/{}.json",
        package_ingest_lib::services::content_hash::preset_digest(preset_json).unwrap()
    );
    assert_eq!(harness.store.put_count("unrecognized/extra.psf"), 2);
    assert_eq!(harness.store.put_count(&preset), 1);
    assert_eq!(harness.store.put_count("unrecognized/p.json"), 0);
}

/// (17) Interpreted manifest fields are recognized in any letter case.
#[tokio::test]
async fn test_capitalized_manifest_fields() {
    let harness = Harness::new();
    let manifest = serde_json::to_vec(&serde_json::json!([
        {"File_name": "a", "Image_file_names": ["a.png"], "Psf_file_name": "settings.psf"}
    ]))
    .unwrap();
    let archive = build_zip(&[
        ("img/a.png", b"png"),
        ("psf/settings.psf", PRESET),
        ("info.json", manifest.as_slice()),
    ]);

    let id = settle(submit(&harness, "car123.zip", &archive).await).await;

    let entries = harness.gateway.entries.lock().unwrap().clone();
    assert_eq!(entries[0].file_name, "a");
    assert_eq!(entries[0].image_file_names, vec![format!("{}a.png", id)]);
    assert_eq!(
        format!("psf/{}", entries[0].psf_file_name.as_deref().unwrap()),
        preset_key()
    );
    assert!(entries[0].metrics.is_empty());
}
