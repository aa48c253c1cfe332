//! Shared fakes for hapisrv integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use errors::{HapiError, HapiResult};
use hapi_model::{Rtu, SyncEnvelope};
use hapi_store::Store;
use hapisrv::config::DeviceConfig;
use hapisrv::device::{DeviceLink, Registry, SubnetScanner};
use hapisrv::router::Publisher;
use hapisrv::scheduler::JobExecutor;
use hapisrv::status::StatusReporter;
use hapisrv::telemetry::TelemetrySink;
use parking_lot::Mutex;

/// One recorded device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub address: String,
    pub command: String,
    pub timeout: Duration,
}

/// Device link that records every call and answers from a table
///
/// Commands in `failing` time out; unknown commands answer `ok`.
#[derive(Default)]
pub struct RecordingLink {
    pub sent: Mutex<Vec<SentCommand>>,
    replies: HashMap<String, String>,
    failing: HashSet<String>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: &str, response: &str) -> Self {
        self.replies.insert(command.to_string(), response.to_string());
        self
    }

    pub fn fail(mut self, command: &str) -> Self {
        self.failing.insert(command.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.sent.lock().iter().map(|s| s.command.clone()).collect()
    }
}

#[async_trait]
impl DeviceLink for RecordingLink {
    async fn send(
        &self,
        address: &str,
        _port: u16,
        timeout: Duration,
        command: &str,
    ) -> HapiResult<String> {
        self.sent.lock().push(SentCommand {
            address: address.to_string(),
            command: command.to_string(),
            timeout,
        });
        if self.failing.contains(command) {
            return Err(HapiError::CommandTimeout {
                address: address.to_string(),
                command: command.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(self
            .replies
            .get(command)
            .cloned()
            .unwrap_or_else(|| "ok".to_string()))
    }
}

pub struct NoScanner;

#[async_trait]
impl SubnetScanner for NoScanner {
    async fn scan(&self, _iface: &str) -> HapiResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Publisher that keeps everything it is asked to send
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<SyncEnvelope>>,
}

impl RecordingPublisher {
    pub fn take(&self) -> Vec<SyncEnvelope> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, message: SyncEnvelope) -> HapiResult<()> {
        self.sent.lock().push(message);
        Ok(())
    }
}

pub async fn store(node: &str) -> Store {
    Store::open_in_memory(node)
        .await
        .expect("Failed to create in-memory store")
}

/// Registry whose online set is exactly `rtus`
pub fn registry(store: &Store, link: Arc<RecordingLink>, rtus: Vec<Rtu>) -> Arc<Registry> {
    let config = DeviceConfig {
        serial_enabled: false,
        ..DeviceConfig::default()
    };
    let registry = Registry::new(store.clone(), link, Box::new(NoScanner), config);
    registry.replace_online(rtus);
    Arc::new(registry)
}

pub fn executor(store: &Store, registry: Arc<Registry>) -> Arc<JobExecutor> {
    Arc::new(JobExecutor::new(
        registry,
        TelemetrySink::new(store.clone()),
        store.clone(),
        Arc::new(StatusReporter::new("0.1.0-test", false)),
    ))
}

pub fn rtu(rtuid: &str, address: &str) -> Rtu {
    Rtu::identified(rtuid, address, "1.0")
}
