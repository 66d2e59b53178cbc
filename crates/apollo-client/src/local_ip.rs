//! Outbound local address reported to the config service (`?ip=`).

use std::net::UdpSocket;

const FALLBACK_IP: &str = "127.0.0.1";

/// Address of the interface the OS would route external traffic through.
///
/// Connecting a UDP socket sends no packets; it only binds a route.
pub fn detect() -> String {
    let route_source = || -> std::io::Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("1.2.3.4:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    };

    match route_source() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::debug!("Local IP detection failed, using {}: {}", FALLBACK_IP, e);
            FALLBACK_IP.to_string()
        },
    }
}
