//! # opcua-harvester
//!
//! OPC UA tag harvesting library: connect to a server, enumerate the tag
//! references under a root node, filter them, and read each tag's current
//! value and source timestamp.
//!
//! ## Features
//! - `opcua-backend` (default): live [`OpcUaSource`] built on the `opcua` crate
//! - `test-support`: enables [`MockTagSource`] via `mockall`

mod error;
mod harvest;
mod hints;
mod provider;

#[cfg(feature = "opcua-backend")]
mod backend;

// Stable public API
pub use error::{HarvestError, NodeIdParseError, ReadError};
pub use harvest::{SITE_UTC_OFFSET_HOURS, HarvestReport, TagRecord, filter_references, harvest};
pub use hints::status_hint;
pub use provider::{TagNodeId, TagRef, TagSample, TagSource, TagValue};

// Backend re-exports (conditional)
#[cfg(feature = "opcua-backend")]
pub use backend::opc_ua::{OpcUaSource, SourceConfig, harvest_endpoint};

// Test support re-export
#[cfg(feature = "test-support")]
pub use provider::MockTagSource;
