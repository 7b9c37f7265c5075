//! UDP transport
//!
//! [`Datagram`] is the seam between the reactor and the network so tests can
//! run the whole engine against an in-memory socket. [`EchonetChannel`] adds
//! the bits every sender needs on top: a receive buffer, a bounded receive
//! window and the transaction id counter.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::protocol::MAX_FRAME_LEN;

/// Minimal datagram socket used by the reactor.
pub trait Datagram: Send {
    fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Wait at most `timeout` for one datagram. `Ok(None)` means the window
    /// elapsed without traffic.
    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>>;
}

/// Multicast-joined UDP socket on the ECHONET Lite port.
pub struct UdpDatagram {
    socket: UdpSocket,
    read_timeout: Option<Duration>,
}

impl UdpDatagram {
    pub fn bind(interface: Ipv4Addr, port: u16, group: Ipv4Addr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(interface, port))?;
        socket.join_multicast_v4(&group, &interface)?;
        // Own multicast discovery requests must not come back as traffic.
        socket.set_multicast_loop_v4(false)?;
        tracing::info!(
            "ECHONET Lite socket bound to {} (group {})",
            socket.local_addr()?,
            group
        );
        Ok(Self {
            socket,
            read_timeout: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Datagram for UdpDatagram {
    fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target)
    }

    fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
        // A zero read timeout is rejected by the OS.
        let timeout = timeout.max(Duration::from_millis(1));
        if self.read_timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }

        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Transaction id source; wraps at `u16::MAX`.
#[derive(Debug)]
pub struct TransactionIds {
    next: u16,
}

impl TransactionIds {
    /// Start from a random id so restarts do not collide with old replies.
    pub fn random() -> Self {
        Self::starting_at(rand::random())
    }

    pub fn starting_at(next: u16) -> Self {
        Self { next }
    }

    pub fn next_tid(&mut self) -> u16 {
        let tid = self.next;
        self.next = self.next.wrapping_add(1);
        tid
    }
}

/// Socket plus receive buffer and transaction id counter.
pub struct EchonetChannel {
    socket: Box<dyn Datagram>,
    tids: TransactionIds,
    receive_timeout: Duration,
    recv_buf: Box<[u8; MAX_FRAME_LEN]>,
}

impl EchonetChannel {
    pub fn new(socket: Box<dyn Datagram>, receive_timeout: Duration) -> Self {
        Self {
            socket,
            tids: TransactionIds::random(),
            receive_timeout,
            recv_buf: Box::new([0u8; MAX_FRAME_LEN]),
        }
    }

    pub fn tids(&mut self) -> &mut TransactionIds {
        &mut self.tids
    }

    pub fn send(&mut self, frame: &[u8], target: SocketAddr) -> io::Result<()> {
        let sent = self.socket.send_to(frame, target)?;
        if sent != frame.len() {
            tracing::warn!("Short send to {}: {} of {} bytes", target, sent, frame.len());
        }
        Ok(())
    }

    /// Receive one datagram within the configured window.
    pub fn recv(&mut self) -> io::Result<Option<(&[u8], SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buf[..], self.receive_timeout)? {
            Some((len, source)) => Ok(Some((&self.recv_buf[..len], source))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted in-memory socket. Queued inbound frames are returned one per
    /// receive; every send is recorded.
    #[derive(Clone, Default)]
    pub(crate) struct MockDatagram {
        pub(crate) inbound: Arc<Mutex<VecDeque<(Vec<u8>, SocketAddr)>>>,
        pub(crate) sent: Arc<Mutex<Vec<(Vec<u8>, SocketAddr)>>>,
    }

    impl MockDatagram {
        pub(crate) fn push_inbound(&self, frame: Vec<u8>, source: SocketAddr) {
            self.inbound.lock().unwrap().push_back((frame, source));
        }

        pub(crate) fn take_sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    impl Datagram for MockDatagram {
        fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push((buf.to_vec(), target));
            Ok(buf.len())
        }

        fn recv_from(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<(usize, SocketAddr)>> {
            let next = self.inbound.lock().unwrap().pop_front();
            match next {
                Some((frame, source)) => {
                    buf[..frame.len()].copy_from_slice(&frame);
                    Ok(Some((frame.len(), source)))
                }
                None => {
                    std::thread::sleep(timeout.min(Duration::from_millis(5)));
                    Ok(None)
                }
            }
        }
    }

    #[test]
    fn test_tids_wrap() {
        let mut tids = TransactionIds::starting_at(u16::MAX);
        assert_eq!(tids.next_tid(), u16::MAX);
        assert_eq!(tids.next_tid(), 0);
        assert_eq!(tids.next_tid(), 1);
    }

    #[test]
    fn test_channel_round_trip() {
        let mock = MockDatagram::default();
        let peer: SocketAddr = "192.168.1.20:3610".parse().unwrap();
        let mut channel = EchonetChannel::new(Box::new(mock.clone()), Duration::from_millis(1));

        assert!(channel.recv().unwrap().is_none());

        mock.push_inbound(vec![0x10, 0x81, 0x00, 0x01], peer);
        let (frame, source) = channel.recv().unwrap().unwrap();
        assert_eq!(frame, &[0x10, 0x81, 0x00, 0x01]);
        assert_eq!(source, peer);

        channel.send(&[1, 2, 3], peer).unwrap();
        assert_eq!(mock.take_sent(), vec![(vec![1, 2, 3], peer)]);
    }
}
