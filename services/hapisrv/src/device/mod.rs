//! RTU discovery and communication

pub mod discovery;
pub mod link;
pub mod registry;
pub mod transport;

pub use discovery::{ArpScanner, SubnetScanner};
pub use link::{Communicator, DeviceLink};
pub use registry::Registry;
