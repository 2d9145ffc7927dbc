//! Live [`TagSource`] backend built on the `opcua` crate.
//!
//! The `opcua` client API is blocking, so every network call is pushed onto
//! the blocking thread pool and bounded by the configured timeout. A timeout
//! is reported exactly like any other failure of the same call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use opcua::client::prelude::*;
use opcua::sync::RwLock;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{HarvestError, ReadError};
use crate::harvest::{HarvestReport, harvest};
use crate::provider::{TagNodeId, TagRef, TagSample, TagSource, TagValue};

/// Connection settings for one harvesting session.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Server address in `opc.tcp://host:port` form.
    pub endpoint: String,
    /// Bound on each network call: connect, browse, and every per-tag read.
    pub timeout: Duration,
}

/// A live session against an OPC UA server.
///
/// The session is exclusively owned for the duration of one harvest. It is
/// released by [`disconnect`](Self::disconnect) or, failing that, on drop —
/// whichever comes first wins and the other is a no-op.
pub struct OpcUaSource {
    session: Arc<RwLock<Session>>,
    endpoint: String,
    timeout: Duration,
    released: Arc<AtomicBool>,
}

impl OpcUaSource {
    /// Establish a session to the configured endpoint.
    ///
    /// # Errors
    /// Returns [`HarvestError::Connect`] carrying the endpoint address if the
    /// server is unreachable, the handshake fails, or the attempt times out.
    pub async fn connect(config: &SourceConfig) -> Result<Self, HarvestError> {
        let endpoint = config.endpoint.clone();
        info!(endpoint = %endpoint, "connecting to OPC server");

        let connect_err = |reason: String| HarvestError::Connect {
            endpoint: config.endpoint.clone(),
            reason,
        };

        let url = endpoint.clone();
        let task = tokio::task::spawn_blocking(move || connect_session(&url));
        let session = match tokio::time::timeout(config.timeout, task).await {
            Err(_) => return Err(connect_err("connect timed out".to_string())),
            Ok(Err(join)) => return Err(connect_err(join.to_string())),
            Ok(Ok(Err(reason))) => return Err(connect_err(reason)),
            Ok(Ok(Ok(session))) => session,
        };

        info!(endpoint = %endpoint, "session established");
        Ok(Self {
            session,
            endpoint,
            timeout: config.timeout,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Close the session. Safe to call once; drop covers every other path.
    pub async fn disconnect(&self) {
        let session = Arc::clone(&self.session);
        let released = Arc::clone(&self.released);
        let _ = tokio::task::spawn_blocking(move || {
            if !released.swap(true, Ordering::SeqCst) {
                session.read().disconnect();
            }
        })
        .await;
        info!(endpoint = %self.endpoint, "session released");
    }
}

impl Drop for OpcUaSource {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.session.read().disconnect();
        }
    }
}

/// Connect, harvest, and release the session on every exit path.
///
/// # Errors
/// Propagates [`HarvestError`] from connect or discovery; individual tag
/// read failures are aggregated inside the report instead.
pub async fn harvest_endpoint(
    config: &SourceConfig,
    root: &TagNodeId,
    filter: &Regex,
) -> Result<HarvestReport, HarvestError> {
    let source = OpcUaSource::connect(config).await?;
    let report = harvest(&source, root, filter).await;
    source.disconnect().await;
    report
}

/// Blocking connect: endpoint discovery, then an anonymous session over the
/// unsecured channel. Plant servers here expose a None/None endpoint; no
/// security is negotiated.
fn connect_session(endpoint_url: &str) -> Result<Arc<RwLock<Session>>, String> {
    let mut client = ClientBuilder::new()
        .application_name("opc2xls")
        .application_uri("urn:opc2xls")
        .create_sample_keypair(false)
        .trust_server_certs(true)
        .session_retry_limit(0)
        .client()
        .ok_or_else(|| "invalid client configuration".to_string())?;

    let endpoints = client
        .get_server_endpoints_from_url(endpoint_url)
        .map_err(|status| format!("endpoint discovery failed: {status}"))?;

    let endpoint = endpoints
        .iter()
        .find(|e| {
            e.security_policy_uri.as_ref() == SecurityPolicy::None.to_uri()
                && e.security_mode == opcua::types::MessageSecurityMode::None
        })
        .cloned()
        .ok_or_else(|| "server offers no unsecured endpoint".to_string())?;

    client
        .connect_to_endpoint(endpoint, IdentityToken::Anonymous)
        .map_err(|status| format!("session handshake failed: {status}"))
}

fn to_tag_ref(reference: &opcua::types::ReferenceDescription, organizes: &NodeId) -> TagRef {
    let node = &reference.node_id.node_id;
    let identifier = match &node.identifier {
        opcua::types::Identifier::String(s) => s.as_ref().to_string(),
        opcua::types::Identifier::Numeric(n) => n.to_string(),
        other => format!("{other:?}"),
    };

    TagRef {
        node: TagNodeId::new(node.namespace, identifier),
        browse_name: reference.browse_name.name.as_ref().to_string(),
        organizes: reference.reference_type_id == *organizes,
    }
}

fn variant_to_tag_value(variant: &Variant) -> TagValue {
    match variant {
        Variant::Empty => TagValue::Null,
        Variant::Boolean(v) => TagValue::Bool(*v),
        Variant::SByte(v) => TagValue::Int(i64::from(*v)),
        Variant::Byte(v) => TagValue::Int(i64::from(*v)),
        Variant::Int16(v) => TagValue::Int(i64::from(*v)),
        Variant::UInt16(v) => TagValue::Int(i64::from(*v)),
        Variant::Int32(v) => TagValue::Int(i64::from(*v)),
        Variant::UInt32(v) => TagValue::Int(i64::from(*v)),
        Variant::Int64(v) => TagValue::Int(*v),
        Variant::UInt64(v) => {
            i64::try_from(*v).map_or_else(|_| TagValue::Text(v.to_string()), TagValue::Int)
        }
        Variant::Float(v) => TagValue::Float(f64::from(*v)),
        Variant::Double(v) => TagValue::Float(*v),
        Variant::String(v) => TagValue::Text(v.as_ref().to_string()),
        // Non-scalar and exotic types survive as their debug rendering; the
        // pipeline only promises printable values.
        other => TagValue::Text(format!("{other:?}")),
    }
}

fn data_value_to_sample(value: DataValue) -> Result<TagSample, String> {
    if let Some(status) = value.status {
        if !status.is_good() {
            return Err(format!("bad status {status}"));
        }
    }
    let variant = value
        .value
        .ok_or_else(|| "no value in response".to_string())?;
    let source_timestamp = value
        .source_timestamp
        .map(|t| t.as_chrono())
        .ok_or_else(|| "no source timestamp in response".to_string())?;

    Ok(TagSample {
        value: variant_to_tag_value(&variant),
        source_timestamp,
    })
}

#[async_trait]
impl TagSource for OpcUaSource {
    async fn child_references(&self, root: &TagNodeId) -> Result<Vec<TagRef>, HarvestError> {
        let session = Arc::clone(&self.session);
        let node = NodeId::new(root.namespace, root.identifier.clone());
        let root_text = root.to_string();

        let browse_err = |reason: String| HarvestError::Browse {
            node: root_text.clone(),
            reason,
        };

        debug!(node = %root_text, "browsing root references");

        let task = tokio::task::spawn_blocking(move || {
            let description = BrowseDescription {
                node_id: node,
                browse_direction: BrowseDirection::Forward,
                reference_type_id: ReferenceTypeId::References.into(),
                include_subtypes: true,
                node_class_mask: 0,
                result_mask: BrowseDescriptionResultMask::all().bits(),
            };
            session.read().browse(&[description])
        });

        let results = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(browse_err("browse timed out".to_string())),
            Ok(Err(join)) => return Err(browse_err(join.to_string())),
            Ok(Ok(Err(status))) => return Err(browse_err(status.to_string())),
            Ok(Ok(Ok(results))) => results,
        };

        let references = results
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .and_then(|r| r.references)
            .unwrap_or_default();

        let organizes: NodeId = ReferenceTypeId::Organizes.into();
        Ok(references
            .iter()
            .map(|r| to_tag_ref(r, &organizes))
            .collect())
    }

    async fn read_tag(&self, tag: &TagRef) -> Result<TagSample, ReadError> {
        let session = Arc::clone(&self.session);
        let node = NodeId::new(tag.node.namespace, tag.node.identifier.clone());
        let name = tag.browse_name.clone();

        let read_err = |reason: String| ReadError {
            tag: tag.browse_name.clone(),
            reason,
        };

        let task = tokio::task::spawn_blocking(move || {
            let read_id = ReadValueId {
                node_id: node,
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            };
            session
                .read()
                .read(&[read_id], TimestampsToReturn::Source, 0.0)
        });

        debug!(tag = %name, "reading tag");

        let mut values = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => return Err(read_err("read timed out".to_string())),
            Ok(Err(join)) => return Err(read_err(join.to_string())),
            Ok(Ok(Err(status))) => return Err(read_err(status.to_string())),
            Ok(Ok(Ok(values))) => values,
        };

        if values.is_empty() {
            return Err(read_err("server returned no result".to_string()));
        }

        data_value_to_sample(values.remove(0)).map_err(read_err)
    }
}
