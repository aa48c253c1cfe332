//! HAPI Model Library
//!
//! Plain domain types shared by the store and the node service. Nothing in
//! here performs I/O.
//!
//! # Modules
//!
//! - `device`: RTUs and their pin configuration
//! - `site`: the facility profile
//! - `job`: interval jobs, sequences, time units and job kinds
//! - `asset`: sensors bound to RTU pins and their readings
//! - `control`: scheduler control signals
//! - `status`: node status snapshots
//! - `sync`: core dataset rows and version stamps exchanged between nodes
//! - `topics`: pub/sub topic names

pub mod asset;
pub mod control;
pub mod device;
pub mod job;
pub mod site;
pub mod status;
pub mod sync;
pub mod topics;

pub use asset::{Asset, AssetReading};
pub use control::ControlSignal;
pub use device::{pin_modes_congruent, PinMode, Rtu, RtuProtocol, USB_ADDRESS};
pub use job::{IntervalJob, JobKind, JobTarget, Sequence, SequenceStep, TimeUnit, VIRTUAL_TARGET};
pub use site::Site;
pub use status::StatusSnapshot;
pub use sync::{CoreDataset, CoreRow, CoreTable, DbVersion, SyncEnvelope};
