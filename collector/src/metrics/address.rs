use std::net::IpAddr;

/// Extracts the host of a `host:port`, `[v6]:port` or bare host address.
///
/// Anything that is neither of the first two forms is taken as a bare host as
/// it is, which covers unbracketed IPv6 addresses.
pub fn parse_host(remote_addr: &str) -> Option<&str> {
    let remote_addr = remote_addr.trim();
    if remote_addr.is_empty() {
        return None;
    }

    if let Some((host, tail)) = remote_addr.strip_prefix('[').and_then(|rest| rest.split_once(']')) {
        if tail.is_empty() || tail.strip_prefix(':').is_some_and(is_port) {
            return non_empty(host);
        }
    }

    match remote_addr.split_once(':') {
        Some((host, port)) if is_port(port) => non_empty(host),
        _ => Some(remote_addr),
    }
}

/// True for peers on this machine: `127.0.0.0/8`, `::1` and v4-mapped loopback,
/// bracketed or not, with or without port.
pub fn is_loopback(remote_addr: &str) -> bool {
    let Some(host) = parse_host(remote_addr) else {
        return false;
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        if ip.to_canonical().is_loopback() {
            return true;
        }
    }

    // `::1:40000` parses as a v6 address, but MediaMTX means loopback plus port
    remote_addr
        .trim()
        .strip_prefix("::1:")
        .is_some_and(is_port)
}

fn is_port(port: &str) -> bool {
    !port.is_empty() && port.parse::<u16>().is_ok()
}

fn non_empty(host: &str) -> Option<&str> {
    (!host.is_empty()).then_some(host)
}
