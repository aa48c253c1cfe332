//! HAPI node service
//!
//! One process per field node: discovers RTUs, runs interval jobs against
//! them, routes pub/sub traffic and keeps the core tables in sync with peers.
//!
//! ```text
//! Registry ──▶ JobExecutor ◀── Scheduler (tick loop, control channel)
//!    ▲             ▲
//!    │             └────────── Console (TCP sessions)
//!    └── Router ◀── MQTT event loop
//!          └──▶ Synchronizer ──▶ Store
//! ```

pub mod alert;
pub mod bootstrap;
pub mod config;
pub mod console;
pub mod device;
pub mod router;
pub mod scheduler;
pub mod status;
pub mod sync;
pub mod telemetry;

pub use config::HapiConfig;
pub use router::Router;
pub use scheduler::{ControlHandle, Scheduler};
pub use sync::Synchronizer;
