use dnsfilter_infrastructure::dns::UpstreamRegistry;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

/// Largest query accepted from a client.
const MAX_QUERY_SIZE: usize = 65_535;

/// Forwards every datagram received on `bind_addr` to the upstream registry
/// and relays the answer back. Runs until the socket fails.
pub async fn start_dns_server(
    bind_addr: &str,
    registry: Arc<UpstreamRegistry>,
    answer_buffer_size: usize,
) -> anyhow::Result<()> {
    let socket_addr: SocketAddr = bind_addr.parse()?;
    let socket = Arc::new(create_udp_socket(socket_addr)?);

    info!(
        bind_address = %socket_addr,
        upstreams = registry.len(),
        "DNS forwarder listening"
    );

    let mut recv_buf = vec![0u8; MAX_QUERY_SIZE];

    loop {
        let (n, from) = match socket.recv_from(&mut recv_buf).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP port-unreachable from an earlier reply surfaces here on some platforms.
                if e.kind() == std::io::ErrorKind::ConnectionReset {
                    continue;
                }
                error!(error = %e, "UDP recv error");
                return Err(e.into());
            }
        };

        let query = recv_buf[..n].to_vec();
        let registry = registry.clone();
        let socket = socket.clone();

        tokio::spawn(async move {
            let mut answer = vec![0u8; answer_buffer_size];

            match registry.resolve_with_fallback(&query, &mut answer).await {
                Ok(len) => {
                    if let Err(e) = socket.send_to(&answer[..len], from).await {
                        warn!(client = %from, error = %e, "Failed to send answer");
                    } else {
                        debug!(client = %from, query_len = query.len(), answer_len = len, "Answered");
                    }
                }
                Err(e) => {
                    warn!(client = %from, error = %e, "All upstreams failed");
                }
            }
        });
    }
}

fn create_udp_socket(socket_addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let domain = if socket_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    socket.bind(&socket_addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}
