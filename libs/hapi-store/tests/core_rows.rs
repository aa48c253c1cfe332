//! Integration tests for core dataset reads and transactional merges

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use hapi_model::{Asset, CoreTable, PinMode, SequenceStep};
use hapi_store::{validate_core_row, MergeAction, Result, Store};
use serde_json::json;

async fn store(node: &str) -> Store {
    Store::open_in_memory(node)
        .await
        .expect("Failed to create in-memory store")
}

fn asset(asset_id: i64, name: &str) -> Asset {
    Asset {
        asset_id,
        rtuid: "RTU1".into(),
        abbreviation: "wt".into(),
        name: name.into(),
        pin: "A0".into(),
        unit: "C".into(),
    }
}

#[tokio::test]
async fn test_core_rows_are_stamped_with_local_node() -> Result<()> {
    let a = store("node-a").await;
    a.save_asset(&asset(1, "Water Temp")).await?;
    a.save_pin_mode(
        "RTU1",
        &PinMode {
            pin: "D3".into(),
            mode: "1".into(),
            default_value: "0".into(),
            pos: 0,
        },
    )
    .await?;

    let rows = a.read_core_rows().await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].table, CoreTable::Pins);
    assert_eq!(rows[0].key, "RTU1/D3");
    assert_eq!(rows[1].table, CoreTable::Assets);
    for row in &rows {
        assert_eq!(row.origin, "node-a");
        assert!(row.updated_at > 0);
        validate_core_row(row)?;
    }

    let by_key = a.core_row(CoreTable::Pins, &[json!("RTU1"), json!("D3")]).await?;
    assert_eq!(by_key.as_ref(), Some(&rows[0]));
    assert!(a
        .core_row(CoreTable::Assets, &[json!("not-a-number")])
        .await?
        .is_none());
    assert!(a.core_row(CoreTable::Pins, &[json!("RTU1")]).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_merge_applies_rows_with_their_own_stamp() -> Result<()> {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_asset(&asset(1, "Water Temp")).await?;
    let published = a.core_dataset().await?;

    let applied = b
        .merge_core_rows(&published.rows, |local, _| {
            assert!(local.is_none());
            MergeAction::Apply
        })
        .await?;
    assert_eq!(applied, 1);

    let merged = b.read_core_rows().await?;
    assert_eq!(merged, published.rows);
    assert_eq!(b.read_version().await?.counter, 1);
    assert_eq!(
        b.read_version().await?.fingerprint,
        published.version.fingerprint
    );
    assert_eq!(b.load_asset(1).await?, Some(asset(1, "Water Temp")));
    Ok(())
}

#[tokio::test]
async fn test_merge_that_keeps_everything_leaves_counter_alone() -> Result<()> {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_asset(&asset(1, "Water Temp")).await?;
    b.save_asset(&asset(1, "Old Name")).await?;
    let before = b.read_version().await?;

    let rows = a.read_core_rows().await?;
    let applied = b
        .merge_core_rows(&rows, |local, _| {
            assert!(local.is_some());
            MergeAction::Keep
        })
        .await?;

    assert_eq!(applied, 0);
    assert_eq!(b.read_version().await?, before);
    Ok(())
}

#[tokio::test]
async fn test_merge_finds_local_row_when_text_key_contains_slash() -> Result<()> {
    let a = store("node-a").await;
    let b = store("node-b").await;
    a.save_sequence_step(&SequenceStep {
        name: "fill/drain".into(),
        step: 1,
        step_name: "open valve".into(),
        command: "dow13".into(),
        timeout_secs: 5,
    })
    .await?;
    let rows = a.read_core_rows().await?;
    assert_eq!(rows[0].key, "fill/drain/1");

    b.merge_core_rows(&rows, |_, _| MergeAction::Apply).await?;
    let mut seen = Vec::new();
    b.merge_core_rows(&rows, |local, _| {
        seen.push(local.cloned());
        MergeAction::Keep
    })
    .await?;
    assert_eq!(seen, vec![Some(rows[0].clone())]);

    let by_key = b
        .core_row(CoreTable::Sequence, &[json!("fill/drain"), json!(1)])
        .await?;
    assert_eq!(by_key.as_ref(), Some(&rows[0]));
    Ok(())
}
