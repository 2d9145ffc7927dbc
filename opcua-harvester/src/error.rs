use thiserror::Error;

/// Fatal harvester errors. Either of these aborts the whole run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HarvestError {
    /// The session to the server could not be established.
    #[error("can't connect to OPC server {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// The root node's references could not be retrieved.
    #[error("browse of node {node} failed: {reason}")]
    Browse { node: String, reason: String },
}

/// A single tag read that failed.
///
/// Never fatal: the harvester logs it, counts it in the report, and moves on
/// to the next tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tag {tag}: {reason}")]
pub struct ReadError {
    /// Browse name of the tag whose read failed.
    pub tag: String,
    /// Named failure reason, e.g. a status code or "read timed out".
    pub reason: String,
}

/// The root node argument did not parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid node id '{input}': expected ns=<namespace>;s=<identifier>")]
pub struct NodeIdParseError {
    pub input: String,
}
