/// Maps known OPC UA status-code names to actionable user hints.
///
/// The input is a failure reason string as carried by
/// [`HarvestError`](crate::HarvestError) or [`ReadError`](crate::ReadError).
///
/// # Examples
/// ```
/// use opcua_harvester::status_hint;
///
/// assert_eq!(
///     status_hint("BadNodeIdUnknown"),
///     Some("Node does not exist in the server address space"),
/// );
/// assert_eq!(status_hint("something else"), None);
/// ```
pub fn status_hint(reason: &str) -> Option<&'static str> {
    if reason.contains("BadNodeIdUnknown") {
        Some("Node does not exist in the server address space")
    } else if reason.contains("BadTcpEndpointUrlInvalid") {
        Some("Endpoint URL is malformed — expected opc.tcp://host:port")
    } else if reason.contains("BadConnectionRejected") || reason.contains("BadTcpInternalError") {
        Some("Server refused the TCP connection — check host, port and firewall")
    } else if reason.contains("BadSecurityChecksFailed") {
        Some("Server rejected the handshake — it may require a security policy")
    } else if reason.contains("BadIdentityTokenRejected") {
        Some("Server does not accept anonymous sessions")
    } else if reason.contains("BadSessionClosed") || reason.contains("BadSessionIdInvalid") {
        Some("Session was closed by the server — it may limit concurrent clients")
    } else if reason.contains("BadAttributeIdInvalid") {
        Some("Node has no value attribute — it is likely a folder, not a tag")
    } else if reason.contains("BadTimeout") || reason.contains("timed out") {
        Some("Request timed out — the server may be overloaded, try a larger timeout")
    } else if reason.contains("BadTooManyOperations") {
        Some("Server limits operations per request — narrow the tag filter")
    } else {
        None
    }
}
