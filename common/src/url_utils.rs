use anyhow::anyhow;
use std::net::SocketAddr;
use url::Url;

use crate::constants::FILENAME_PARAM;

/// Normalizes a shard-node address before it is registered.
///
/// Only absolute http(s) URLs without a fragment are accepted. A trailing
/// slash is dropped so that `http://a/file` and `http://a/file/` collide on
/// the uniqueness index.
pub fn normalize_shard_address(address: &str) -> anyhow::Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(anyhow!("address cannot be empty"));
    }

    if address.chars().any(|c| c.is_control()) {
        return Err(anyhow!("address contains control characters"));
    }

    let parsed = Url::parse(address).map_err(|e| anyhow!("invalid address: {}", e))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("unsupported address scheme: {}", other)),
    }
    if parsed.host_str().is_none() {
        return Err(anyhow!("address has no host"));
    }
    if parsed.fragment().is_some() {
        return Err(anyhow!("address must not carry a fragment"));
    }

    let normalized = parsed.to_string();
    Ok(normalized.trim_end_matches('/').to_string())
}

/// Attaches `filename=<name>` to a shard-node address, keeping any query
/// parameters the address already has.
pub fn with_filename(address: &str, name: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(address).map_err(|e| anyhow!("invalid address {}: {}", address, e))?;
    url.query_pairs_mut().append_pair(FILENAME_PARAM, name);
    Ok(url)
}

pub fn parse_socket_addr(listen: &str) -> anyhow::Result<SocketAddr> {
    let url = if listen.starts_with("http://") || listen.starts_with("https://") {
        Url::parse(listen)?
    } else {
        Url::parse(&format!("http://{}", listen))?
    };

    let host = url
        .host_str()
        .ok_or(anyhow!("missing host in {}", listen))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    Ok(addr)
}
