// Outbound interface discovery
//
// "Connecting" a UDP socket only selects a route, no packet is sent. The
// local address the kernel picks is the one the device can reach us on.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

pub const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:80";

pub fn outbound_ip(probe: SocketAddr) -> io::Result<IpAddr> {
    let bind: SocketAddr = match probe {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind)?;
    socket.connect(probe)?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no route towards {}", probe),
        ));
    }
    Ok(ip)
}
