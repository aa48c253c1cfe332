//! Computations available to virtual jobs
//!
//! A virtual job names one of these entries in its command column. The table
//! is fixed at build time.

use std::collections::BTreeMap;

use errors::{HapiError, HapiResult};
use hapi_model::StatusSnapshot;

/// What a local computation may read
pub struct LocalInputs {
    pub snapshot: StatusSnapshot,
}

pub type LocalFn = fn(&LocalInputs) -> HapiResult<BTreeMap<String, f64>>;

const LOCAL_COMPUTATIONS: &[(&str, LocalFn)] = &[
    ("system_status", system_status),
    ("uptime", uptime),
];

pub fn lookup(name: &str) -> Option<LocalFn> {
    LOCAL_COMPUTATIONS
        .iter()
        .find(|(n, _)| *n == name.trim())
        .map(|(_, f)| *f)
}

/// Run a named computation
pub fn run(name: &str, inputs: &LocalInputs) -> HapiResult<BTreeMap<String, f64>> {
    let f = lookup(name)
        .ok_or_else(|| HapiError::configuration(format!("Unknown local computation '{}'", name)))?;
    f(inputs)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    LOCAL_COMPUTATIONS.iter().map(|(n, _)| *n)
}

fn system_status(inputs: &LocalInputs) -> HapiResult<BTreeMap<String, f64>> {
    Ok(inputs
        .snapshot
        .metrics()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect())
}

fn uptime(inputs: &LocalInputs) -> HapiResult<BTreeMap<String, f64>> {
    let mut out = BTreeMap::new();
    out.insert("uptime".to_string(), inputs.snapshot.uptime_secs as f64);
    out.insert(
        "host_uptime".to_string(),
        inputs.snapshot.host_uptime_secs as f64,
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn inputs() -> LocalInputs {
        LocalInputs {
            snapshot: StatusSnapshot {
                software_version: "1.0.0".into(),
                platform: "linux".into(),
                host: "node-a".into(),
                uptime_secs: 42,
                host_uptime_secs: 3600,
                cpu_percent: 12.5,
                memory_percent: 40.0,
                rtus_online: 2,
                broker_clients: 3,
                is_scheduler: false,
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn test_system_status_flattens_snapshot() {
        let values = run("system_status", &inputs()).unwrap();
        assert_eq!(values["uptime"], 42.0);
        assert_eq!(values["cpu"], 12.5);
        assert_eq!(values["rtus"], 2.0);
    }

    #[test]
    fn test_unknown_name_is_a_configuration_error() {
        let err = run("os.system('rm -rf /')", &inputs()).unwrap_err();
        assert!(matches!(err, HapiError::Configuration(_)));
        assert!(names().any(|n| n == "uptime"));
    }
}
