//! Client address extraction.

use std::net::IpAddr;

/// Best-effort client address for the source-address scope.
///
/// Prefers the first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// address of the direct connection. Returns `None` when nothing usable is
/// present; the caller should reject the request rather than invent one.
pub fn extract_source_address(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> Option<String> {
    if let Some(first) = forwarded_for.and_then(|xff| xff.split(',').next()) {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    if let Some(ip) = real_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        return Some(ip.to_string());
    }

    peer.map(|addr| addr.to_string())
}
