use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::address::NetAddress;
use super::stats::{NetworkStats, PacketLossSimulation};
use crate::protocol::MAX_MSGLEN;

pub trait Transport {
    fn send_to(&mut self, data: &[u8], to: &NetAddress) -> io::Result<()>;

    /// Next pending datagram, or `None` once the socket is drained.
    fn recv(&mut self) -> io::Result<Option<(Vec<u8>, NetAddress)>>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: NetworkStats,
    loss: PacketLossSimulation,
    recv_buffer: Vec<u8>,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: NetworkStats::default(),
            loss: PacketLossSimulation::default(),
            recv_buffer: vec![0u8; MAX_MSGLEN + 1],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn set_loss_simulation(&mut self, loss: PacketLossSimulation) {
        self.loss = loss;
    }
}

impl Transport for UdpTransport {
    fn send_to(&mut self, data: &[u8], to: &NetAddress) -> io::Result<()> {
        let addr = to.socket_addr().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("can't send to {} over udp", to),
            )
        })?;
        let bytes = self.socket.send_to(data, addr)?;
        self.stats.record_sent(bytes);
        Ok(())
    }

    fn recv(&mut self) -> io::Result<Option<(Vec<u8>, NetAddress)>> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    if size > MAX_MSGLEN {
                        log::warn!("Oversize packet from {}", addr);
                        self.stats.packets_dropped += 1;
                        continue;
                    }
                    if self.loss.should_drop() {
                        self.stats.packets_dropped += 1;
                        continue;
                    }
                    self.stats.record_received(size);
                    return Ok(Some((self.recv_buffer[..size].to_vec(), addr.into())));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// In-process transport: records what is sent and replays what is injected.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbox: VecDeque<(Vec<u8>, NetAddress)>,
    sent: Vec<(Vec<u8>, NetAddress)>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, data: impl Into<Vec<u8>>, from: NetAddress) {
        self.inbox.push_back((data.into(), from));
    }

    pub fn sent(&self) -> &[(Vec<u8>, NetAddress)] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<(Vec<u8>, NetAddress)> {
        std::mem::take(&mut self.sent)
    }
}

impl Transport for MemoryTransport {
    fn send_to(&mut self, data: &[u8], to: &NetAddress) -> io::Result<()> {
        self.sent.push((data.to_vec(), *to));
        Ok(())
    }

    fn recv(&mut self) -> io::Result<Option<(Vec<u8>, NetAddress)>> {
        Ok(self.inbox.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_transport_replays_in_order() {
        let mut transport = MemoryTransport::new();
        transport.inject(vec![1], NetAddress::Loopback);
        transport.inject(vec![2], NetAddress::Loopback);

        assert_eq!(transport.recv().unwrap().unwrap().0, vec![1]);
        assert_eq!(transport.recv().unwrap().unwrap().0, vec![2]);
        assert!(transport.recv().unwrap().is_none());
    }

    #[test]
    fn udp_rejects_loopback_variant() {
        let mut transport = UdpTransport::bind("127.0.0.1:0").unwrap();
        let err = transport.send_to(&[0], &NetAddress::Loopback).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn udp_round_trip() {
        let mut a = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0").unwrap();
        let to = NetAddress::from(b.local_addr());

        a.send_to(b"hello", &to).unwrap();

        let start = std::time::Instant::now();
        let received = loop {
            if let Some(packet) = b.recv().unwrap() {
                break packet;
            }
            assert!(start.elapsed().as_millis() < 1000, "no datagram");
            std::thread::sleep(std::time::Duration::from_millis(1));
        };
        assert_eq!(received.0, b"hello");
        assert_eq!(received.1, NetAddress::from(a.local_addr()));
        assert_eq!(a.stats().packets_sent, 1);
    }

    #[test]
    fn udp_drops_oversize_datagrams() {
        let mut a = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0").unwrap();
        let to = NetAddress::from(b.local_addr());

        a.send_to(&vec![7u8; MAX_MSGLEN + 1], &to).unwrap();
        a.send_to(&vec![9u8; MAX_MSGLEN], &to).unwrap();

        let start = std::time::Instant::now();
        let received = loop {
            if let Some(packet) = b.recv().unwrap() {
                break packet;
            }
            assert!(start.elapsed().as_millis() < 1000, "no datagram");
            std::thread::sleep(std::time::Duration::from_millis(1));
        };
        assert_eq!(received.0, vec![9u8; MAX_MSGLEN]);
        assert_eq!(b.stats().packets_dropped, 1);
        assert_eq!(b.stats().packets_received, 1);
    }

    #[test]
    fn udp_loss_simulation_is_counted() {
        let mut a = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut b = UdpTransport::bind("127.0.0.1:0").unwrap();
        b.set_loss_simulation(PacketLossSimulation::with_loss(100.0));
        let to = NetAddress::from(b.local_addr());

        a.send_to(b"lost", &to).unwrap();

        let start = std::time::Instant::now();
        while b.stats().packets_dropped == 0 {
            assert!(b.recv().unwrap().is_none());
            assert!(start.elapsed().as_millis() < 1000, "no datagram");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(b.stats().packets_received, 0);
        assert_eq!(b.stats().loss_percent(), 100.0);
    }
}
