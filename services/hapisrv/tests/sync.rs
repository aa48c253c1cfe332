//! Core database synchronization between two in-memory nodes

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use common::{store, RecordingPublisher};
use errors::HapiError;
use hapi_model::{CoreDataset, CoreTable, PinMode, SequenceStep, Site};
use hapisrv::sync::Synchronizer;
use serde_json::json;

fn site(name: &str) -> Site {
    Site {
        site_id: "S1".into(),
        name: name.into(),
        operator: "Dana".into(),
        ..Site::default()
    }
}

async fn published(sync: &Synchronizer) -> String {
    let publisher = RecordingPublisher::default();
    sync.publish_core_db(&publisher).await.unwrap();
    publisher.take().remove(0).payload
}

#[tokio::test]
async fn test_resync_of_identical_data_is_unchanged() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_site(&site("North Farm")).await.unwrap();
    let (sync_a, sync_b) = (Synchronizer::new(a.clone()), Synchronizer::new(b.clone()));

    let payload = published(&sync_a).await;
    let first = sync_b.synchronize(&payload).await.unwrap();
    assert_eq!(first.applied, 1);
    assert_eq!(b.load_site().await.unwrap().unwrap().name, "North Farm");

    let version = b.read_version().await.unwrap();
    let second = sync_b.synchronize(&payload).await.unwrap();
    assert!(!second.changed());
    assert_eq!(second.unchanged, 1);
    assert_eq!(b.read_version().await.unwrap(), version);

    // Same content, same fingerprint on both nodes
    assert_eq!(
        a.read_version().await.unwrap().fingerprint,
        version.fingerprint
    );
}

#[tokio::test]
async fn test_published_dataset_carries_only_own_rows() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_site(&site("North Farm")).await.unwrap();
    let sync_b = Synchronizer::new(b.clone());
    sync_b
        .synchronize(&published(&Synchronizer::new(a.clone())).await)
        .await
        .unwrap();

    let dataset: CoreDataset = serde_json::from_str(&published(&sync_b).await).unwrap();
    assert_eq!(dataset.node, "node-b");
    assert!(dataset.rows.is_empty());
}

#[tokio::test]
async fn test_own_dataset_echo_is_ignored() {
    let a = store("node-a").await;
    a.save_site(&site("North Farm")).await.unwrap();
    let sync_a = Synchronizer::new(a.clone());
    let before = a.read_version().await.unwrap();

    let report = sync_a.synchronize(&published(&sync_a).await).await.unwrap();
    assert_eq!(report.own_rows, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(a.read_version().await.unwrap(), before);
}

#[tokio::test]
async fn test_newer_stamp_wins_and_older_is_kept_out() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_site(&site("North Farm")).await.unwrap();
    let sync_b = Synchronizer::new(b.clone());
    sync_b
        .synchronize(&published(&Synchronizer::new(a.clone())).await)
        .await
        .unwrap();

    let local = b.core_row(CoreTable::Site, &[json!("S1")]).await.unwrap().unwrap();

    let mut stale = local.clone();
    stale.values.insert("name".into(), json!("Old Name"));
    stale.updated_at -= 1_000;
    stale.origin = "node-c".into();

    let mut fresh = local.clone();
    fresh.values.insert("operator".into(), json!("Lee"));
    fresh.updated_at += 1_000;
    fresh.origin = "node-c".into();

    let mut payload = CoreDataset {
        node: "node-c".into(),
        version: a.read_version().await.unwrap(),
        rows: vec![stale],
    };
    let report = sync_b
        .synchronize(&serde_json::to_string(&payload).unwrap())
        .await
        .unwrap();
    assert_eq!(report.local_newer, 1);
    assert_eq!(b.load_site().await.unwrap().unwrap().name, "North Farm");

    payload.rows = vec![fresh];
    let report = sync_b
        .synchronize(&serde_json::to_string(&payload).unwrap())
        .await
        .unwrap();
    assert_eq!(report.applied, 1);
    let merged = b.load_site().await.unwrap().unwrap();
    assert_eq!(merged.operator, "Lee");
    assert_eq!(merged.name, "North Farm");
}

#[tokio::test]
async fn test_equal_stamp_with_different_content_is_a_conflict() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_site(&site("North Farm")).await.unwrap();
    let sync_b = Synchronizer::new(b.clone());
    sync_b
        .synchronize(&published(&Synchronizer::new(a.clone())).await)
        .await
        .unwrap();

    // Relayed by a third node with the same stamp but altered data
    let mut tampered = b.core_row(CoreTable::Site, &[json!("S1")]).await.unwrap().unwrap();
    tampered.values.insert("name".into(), json!("South Farm"));
    let payload = CoreDataset {
        node: "node-c".into(),
        version: a.read_version().await.unwrap(),
        rows: vec![tampered],
    };

    let report = sync_b
        .synchronize(&serde_json::to_string(&payload).unwrap())
        .await
        .unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.conflicts.len(), 1);
    assert!(matches!(
        &report.conflicts[0],
        HapiError::SyncConflict { key, .. } if key == "S1"
    ));
    assert_eq!(b.load_site().await.unwrap().unwrap().name, "North Farm");
}

#[tokio::test]
async fn test_malformed_rows_are_rejected_individually() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_site(&site("North Farm")).await.unwrap();
    let mut dataset = Synchronizer::new(a.clone()).local_dataset().await.unwrap();

    let mut broken = dataset.rows[0].clone();
    broken.key = "S2".into();
    broken.values.insert("mystery".into(), json!(1));
    dataset.rows.push(broken);

    let report = Synchronizer::new(b.clone())
        .synchronize(&serde_json::to_string(&dataset).unwrap())
        .await
        .unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.applied, 1);
}

#[tokio::test]
async fn test_unreadable_payload_is_an_error() {
    let b = store("node-b").await;
    let result = Synchronizer::new(b).synchronize("not json").await;
    assert!(result.is_err());
}

fn fill_step(command: &str) -> SequenceStep {
    SequenceStep {
        name: "fill/drain".into(),
        step: 1,
        step_name: "open valve".into(),
        command: command.into(),
        timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_slash_in_sequence_name_merges_by_key_columns() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_sequence_step(&fill_step("dow13")).await.unwrap();
    let (sync_a, sync_b) = (Synchronizer::new(a.clone()), Synchronizer::new(b.clone()));

    let stale = published(&sync_a).await;
    assert_eq!(sync_b.synchronize(&stale).await.unwrap().applied, 1);
    let version = b.read_version().await.unwrap();
    let again = sync_b.synchronize(&stale).await.unwrap();
    assert_eq!(again.unchanged, 1);
    assert_eq!(b.read_version().await.unwrap(), version);

    // Keep the edit's stamp strictly after the first save
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    a.save_sequence_step(&fill_step("dow14")).await.unwrap();
    assert_eq!(
        sync_b
            .synchronize(&published(&sync_a).await)
            .await
            .unwrap()
            .applied,
        1
    );

    let replay = sync_b.synchronize(&stale).await.unwrap();
    assert_eq!(replay.applied, 0);
    assert_eq!(replay.local_newer, 1);
    let sequence = b.load_sequence("fill/drain").await.unwrap();
    assert_eq!(sequence.steps().len(), 1);
    assert_eq!(sequence.steps()[0].command, "dow14");
}

#[tokio::test]
async fn test_large_dataset_is_split_within_payload_limit() {
    let a = store("node-a").await;
    let b = store("node-b").await;
    for rtu in 1..=5 {
        for pin in 0..16 {
            a.save_pin_mode(
                &format!("RTU{}", rtu),
                &PinMode {
                    pin: format!("D{}", pin),
                    mode: "1".into(),
                    default_value: "0".into(),
                    pos: pin,
                },
            )
            .await
            .unwrap();
        }
    }

    let limit = 4096;
    let publisher = RecordingPublisher::default();
    let sent = Synchronizer::new(a.clone())
        .with_max_payload(limit)
        .publish_core_db(&publisher)
        .await
        .unwrap();
    assert_eq!(sent, 80);

    let messages = publisher.take();
    assert!(messages.len() > 1);
    let sync_b = Synchronizer::new(b.clone());
    let mut applied = 0;
    for message in &messages {
        assert_eq!(message.topic, "SYNCHRONIZE/DATA/node-a");
        assert!(message.payload.len() <= limit, "{} bytes", message.payload.len());
        applied += sync_b.synchronize(&message.payload).await.unwrap().applied;
    }
    assert_eq!(applied, 80);
    assert_eq!(
        b.read_version().await.unwrap().fingerprint,
        a.read_version().await.unwrap().fingerprint
    );
}
