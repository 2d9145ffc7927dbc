use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

use crate::error::{HarvestError, NodeIdParseError, ReadError};

/// A scalar tag value as reported by the server.
///
/// Values pass through the pipeline unexamined: whatever scalar the server
/// reports is what lands in the spreadsheet. No numeric coercion happens
/// between read and export.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// The server returned an empty variant.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Identifies a node by namespace index and string identifier.
///
/// Parsed from the `ns=<n>;s=<id>` form used on the command line. Whitespace
/// around the `s=` part is tolerated because site defaults historically carry
/// it (`ns=1; s=...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNodeId {
    pub namespace: u16,
    pub identifier: String,
}

impl TagNodeId {
    pub fn new(namespace: u16, identifier: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for TagNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};s={}", self.namespace, self.identifier)
    }
}

impl FromStr for TagNodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || NodeIdParseError {
            input: s.to_string(),
        };

        let (ns_part, id_part) = s.split_once(';').ok_or_else(err)?;
        let namespace = ns_part
            .trim()
            .strip_prefix("ns=")
            .ok_or_else(err)?
            .trim()
            .parse::<u16>()
            .map_err(|_| err())?;
        let identifier = id_part.trim_start().strip_prefix("s=").ok_or_else(err)?;
        if identifier.is_empty() {
            return Err(err());
        }

        Ok(Self::new(namespace, identifier))
    }
}

/// One child reference the server reported for the root node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// The referenced node.
    pub node: TagNodeId,
    /// Human-readable name of the referenced node.
    pub browse_name: String,
    /// Whether the reference type is `Organizes`. Only those references
    /// point at tags; everything else is folders or metadata.
    pub organizes: bool,
}

/// A successful raw read: the value plus the server's source timestamp,
/// before any timezone adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSample {
    pub value: TagValue,
    pub source_timestamp: DateTime<Utc>,
}

/// Async trait for the tag-reading operations of one server session.
///
/// This is the stable seam between the harvest logic and the wire protocol.
/// The live implementation is [`OpcUaSource`](crate::OpcUaSource); tests use
/// `MockTagSource`.
#[cfg_attr(any(test, feature = "test-support"), automock)]
#[async_trait]
pub trait TagSource: Send + Sync {
    /// All forward references of the given node, in server order.
    ///
    /// # Errors
    /// Returns `Err` if the browse request fails or times out. Discovery
    /// failure is fatal to the harvest: no tags can exist without it.
    async fn child_references(&self, root: &TagNodeId) -> Result<Vec<TagRef>, HarvestError>;

    /// Read the current value and source timestamp of one tag node.
    ///
    /// # Errors
    /// Returns a named [`ReadError`] on any failure (bad status, missing
    /// value or timestamp, timeout). The caller treats this as non-fatal.
    async fn read_tag(&self, tag: &TagRef) -> Result<TagSample, ReadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_node_id() {
        let node: TagNodeId = "ns=2;s=Pump1.Speed".parse().unwrap();
        assert_eq!(node, TagNodeId::new(2, "Pump1.Speed"));
    }

    #[test]
    fn test_parse_site_default_with_spaces() {
        let node: TagNodeId = "ns=1; s=f|@LOCALMACHINE::List of all tags".parse().unwrap();
        assert_eq!(node.namespace, 1);
        assert_eq!(node.identifier, "f|@LOCALMACHINE::List of all tags");
    }

    #[test]
    fn test_parse_keeps_semicolon_free_identifier_verbatim() {
        // Identifiers may contain '=' and spaces; only the first ';' splits.
        let node: TagNodeId = "ns=3;s=a=b c".parse().unwrap();
        assert_eq!(node.identifier, "a=b c");
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for input in [
            "",
            "ns=1",
            "s=OnlyIdentifier",
            "ns=one;s=Tag",
            "ns=1;i=42",
            "ns=1;s=",
            "ns=70000;s=Tag",
        ] {
            let err = input.parse::<TagNodeId>().unwrap_err();
            assert_eq!(err.input, input);
        }
    }

    #[test]
    fn test_node_id_display_round_trip() {
        let node = TagNodeId::new(1, "f|@LOCALMACHINE::List of all tags");
        let reparsed: TagNodeId = node.to_string().parse().unwrap();
        assert_eq!(node, reparsed);
    }

    #[test]
    fn test_tag_value_display() {
        assert_eq!(TagValue::Null.to_string(), "");
        assert_eq!(TagValue::Bool(true).to_string(), "true");
        assert_eq!(TagValue::Int(-42).to_string(), "-42");
        assert_eq!(TagValue::Float(3.5).to_string(), "3.5");
        assert_eq!(TagValue::Text("run".into()).to_string(), "run");
    }
}
