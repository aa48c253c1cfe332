//! Core database synchronization between nodes
//!
//! Nodes exchange their core rows over pub/sub and merge them last-write-wins
//! on the `(updated_at, origin)` stamp. A node is authoritative for the rows
//! it wrote: copies of its own rows coming back from peers are ignored.

use errors::{HapiError, HapiResult};
use hapi_model::{topics, CoreDataset, CoreRow, DbVersion, SyncEnvelope};
use hapi_store::{validate_core_row, MergeAction, Store};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::router::Publisher;

/// How one inbound row was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Unchanged,
    LocalNewer,
    OwnRow,
    Conflict,
}

/// Merge policy for one row
pub fn decide(local: Option<&CoreRow>, inbound: &CoreRow, node: &str) -> Decision {
    if inbound.origin == node {
        return Decision::OwnRow;
    }
    let Some(local) = local else {
        return Decision::Apply;
    };
    if local.same_content(inbound) {
        return Decision::Unchanged;
    }
    match inbound.cmp_stamp(local) {
        Ordering::Greater => Decision::Apply,
        Ordering::Less => Decision::LocalNewer,
        Ordering::Equal => Decision::Conflict,
    }
}

/// Outcome of merging one inbound dataset
#[derive(Debug, Default)]
pub struct MergeReport {
    pub applied: usize,
    pub unchanged: usize,
    pub local_newer: usize,
    pub own_rows: usize,
    pub rejected: usize,
    pub conflicts: Vec<HapiError>,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.applied > 0
    }
}

struct ChunkPayload {
    rows: usize,
    json: String,
}

#[derive(Clone)]
pub struct Synchronizer {
    store: Store,
    max_payload: usize,
}

impl Synchronizer {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            max_payload: MqttConfig::default().max_payload_bytes(),
        }
    }

    /// Split published datasets so no payload exceeds `bytes`
    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes;
        self
    }

    pub fn node(&self) -> &str {
        self.store.node()
    }

    pub async fn read_version(&self) -> HapiResult<DbVersion> {
        Ok(self.store.read_version().await?)
    }

    /// Dataset carrying the rows this node wrote
    pub async fn local_dataset(&self) -> HapiResult<CoreDataset> {
        let mut dataset = self.store.core_dataset().await?;
        dataset.rows.retain(|row| row.origin == dataset.node);
        Ok(dataset)
    }

    /// Publish this node's rows on `SYNCHRONIZE/DATA/<node>`
    ///
    /// Rows are spread over as many messages as the payload limit requires.
    /// Every message carries the same version; at least one is sent so peers
    /// learn the version even when this node owns no rows.
    pub async fn publish_core_db(&self, publisher: &dyn Publisher) -> HapiResult<usize> {
        let dataset = self.local_dataset().await?;
        let counter = dataset.version.counter;
        let topic = topics::sync_data(self.node());
        let mut count = 0;
        let mut messages = 0;
        for payload in self.split_dataset(dataset)? {
            count += payload.rows;
            messages += 1;
            publisher.publish(SyncEnvelope::new(topic.clone(), payload.json))?;
        }
        info!(
            "Published {} core rows in {} message(s) (counter {})",
            count, messages, counter
        );
        Ok(count)
    }

    fn split_dataset(&self, dataset: CoreDataset) -> HapiResult<Vec<ChunkPayload>> {
        let CoreDataset {
            node,
            version,
            rows,
        } = dataset;
        let empty = CoreDataset {
            node,
            version,
            rows: Vec::new(),
        };
        let base = serde_json::to_string(&empty)?.len();

        let mut chunks: Vec<Vec<CoreRow>> = vec![Vec::new()];
        let mut size = base;
        for row in rows {
            // Separating comma included
            let row_size = serde_json::to_string(&row)?.len() + 1;
            if base + row_size > self.max_payload {
                warn!(
                    "Core row {}[{}] exceeds the {} byte payload limit; not published",
                    row.table, row.key, self.max_payload
                );
                continue;
            }
            if size + row_size > self.max_payload {
                chunks.push(Vec::new());
                size = base;
            }
            size += row_size;
            if let Some(chunk) = chunks.last_mut() {
                chunk.push(row);
            }
        }

        let mut payloads = Vec::with_capacity(chunks.len());
        for rows in chunks {
            let chunk = CoreDataset {
                node: empty.node.clone(),
                version: empty.version.clone(),
                rows,
            };
            payloads.push(ChunkPayload {
                rows: chunk.rows.len(),
                json: serde_json::to_string(&chunk)?,
            });
        }
        Ok(payloads)
    }

    /// Merge a dataset received from a peer
    ///
    /// Malformed rows are rejected individually; the rest merge in one
    /// transaction. Stamp ties with different content are reported as
    /// conflicts and the local row is kept.
    pub async fn synchronize(&self, payload: &str) -> HapiResult<MergeReport> {
        let dataset: CoreDataset = serde_json::from_str(payload)?;
        let node = self.node().to_string();
        let mut report = MergeReport::default();

        if dataset.node == node {
            debug!("Ignoring own dataset echo");
            report.own_rows = dataset.rows.len();
            return Ok(report);
        }

        let mut valid = Vec::with_capacity(dataset.rows.len());
        for row in dataset.rows {
            match validate_core_row(&row) {
                Ok(()) => valid.push(row),
                Err(e) => {
                    warn!("Rejected row from {}: {}", dataset.node, e);
                    report.rejected += 1;
                },
            }
        }

        let applied = self
            .store
            .merge_core_rows(&valid, |local, inbound| {
                match decide(local, inbound, &node) {
                    Decision::Apply => return MergeAction::Apply,
                    Decision::Unchanged => report.unchanged += 1,
                    Decision::LocalNewer => report.local_newer += 1,
                    Decision::OwnRow => report.own_rows += 1,
                    Decision::Conflict => report.conflicts.push(HapiError::SyncConflict {
                        table: inbound.table.to_string(),
                        key: inbound.key.clone(),
                        reason: format!(
                            "same stamp ({}, {}) with different content",
                            inbound.updated_at, inbound.origin
                        ),
                    }),
                }
                MergeAction::Keep
            })
            .await?;
        report.applied = applied;

        for conflict in &report.conflicts {
            warn!("{}", conflict);
        }
        info!(
            "Merged dataset from {}: {} applied, {} unchanged, {} kept newer, {} conflicts, {} rejected",
            dataset.node,
            report.applied,
            report.unchanged,
            report.local_newer,
            report.conflicts.len(),
            report.rejected
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapi_model::CoreTable;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn row(name: &str, updated_at: i64, origin: &str) -> CoreRow {
        let mut values = BTreeMap::new();
        values.insert("site_id".to_string(), json!("S1"));
        values.insert("name".to_string(), json!(name));
        CoreRow {
            table: CoreTable::Site,
            key: "S1".into(),
            values,
            updated_at,
            origin: origin.into(),
        }
    }

    #[test]
    fn test_decide_last_write_wins() {
        let local = row("Old", 100, "node-a");
        assert_eq!(decide(None, &row("New", 1, "node-b"), "node-a"), Decision::Apply);
        assert_eq!(
            decide(Some(&local), &row("New", 200, "node-b"), "node-a"),
            Decision::Apply
        );
        assert_eq!(
            decide(Some(&local), &row("New", 50, "node-b"), "node-a"),
            Decision::LocalNewer
        );
        // Origin breaks time ties
        assert_eq!(
            decide(Some(&local), &row("New", 100, "node-b"), "node-c"),
            Decision::Apply
        );
    }

    #[test]
    fn test_decide_unchanged_own_and_conflict() {
        let local = row("Same", 100, "node-b");
        assert_eq!(
            decide(Some(&local), &row("Same", 900, "node-b"), "node-a"),
            Decision::Unchanged
        );
        assert_eq!(
            decide(Some(&local), &row("Mine", 900, "node-a"), "node-a"),
            Decision::OwnRow
        );
        assert_eq!(
            decide(Some(&local), &row("Other", 100, "node-b"), "node-a"),
            Decision::Conflict
        );
    }
}
