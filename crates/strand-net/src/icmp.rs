use std::process;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::socket::{BaseSocket, Family};

const ICMP_ECHO_REQUEST_V4: u8 = 8;
const ICMP_ECHO_REPLY_V4: u8 = 0;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

static NEXT_SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Raw ICMP Echo (ping) socket. Identification is the low 16 bits of the
/// process id; sequence is a wrapping per-process counter.
pub struct IcmpSocket {
    socket: BaseSocket,
    family: Family,
    identifier: u16,
}

impl IcmpSocket {
    pub fn new(family: Family) -> Result<Self, Error> {
        let socket = BaseSocket::raw_icmp(family, true)?;
        Ok(Self { socket, family, identifier: process::id() as u16 })
    }

    fn next_sequence() -> u16 {
        NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    }

    /// Build and send an Echo Request with `payload` as the data section,
    /// returning the sequence number used.
    pub fn send_echo_request(&self, endpoint: Endpoint, payload: &[u8]) -> Result<u16, Error> {
        let sequence = Self::next_sequence();
        let (echo_type, code) = match self.family {
            Family::V4 => (ICMP_ECHO_REQUEST_V4, 0),
            Family::V6 => (ICMPV6_ECHO_REQUEST, 0),
        };
        let packet = self.build_packet(echo_type, code, sequence, payload);
        self.socket
            .send_to(endpoint, &packet)
            .map_err(Error::System)?;
        Ok(sequence)
    }

    /// Build an Echo Request/Reply packet: 8-byte header + payload, with
    /// the checksum field populated (IPv4 only — IPv6 checksums are
    /// computed by the kernel over a pseudo-header this socket never sees).
    fn build_packet(&self, icmp_type: u8, code: u8, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(8 + payload.len());
        packet.push(icmp_type);
        packet.push(code);
        packet.extend_from_slice(&[0, 0]); // checksum placeholder
        packet.extend_from_slice(&self.identifier.to_be_bytes());
        packet.extend_from_slice(&sequence.to_be_bytes());
        packet.extend_from_slice(payload);

        if matches!(self.family, Family::V4) {
            let checksum = BaseSocket::ip_checksum(&packet);
            packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        }
        packet
    }

    /// Parse a received buffer as an Echo Reply, returning
    /// `(identifier, sequence, payload)` if it matches this socket's echo
    /// reply type.
    pub fn parse_echo_reply<'a>(&self, buf: &'a [u8]) -> Option<(u16, u16, &'a [u8])> {
        if buf.len() < 8 {
            return None;
        }
        let expected_reply = match self.family {
            Family::V4 => ICMP_ECHO_REPLY_V4,
            Family::V6 => ICMPV6_ECHO_REPLY,
        };
        if buf[0] != expected_reply {
            return None;
        }
        let identifier = u16::from_be_bytes([buf[4], buf[5]]);
        let sequence = u16::from_be_bytes([buf[6], buf[7]]);
        Some((identifier, sequence, &buf[8..]))
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<(usize, Endpoint), Error> {
        self.socket.recv_from(buf).map_err(Error::System)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_populated_for_v4() {
        // Build without a live socket by exercising the checksum helper
        // directly, since raw sockets require privilege in CI.
        let mut packet = vec![8u8, 0, 0, 0, 0, 1, 0, 1];
        let checksum = BaseSocket::ip_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        assert_eq!(BaseSocket::ip_checksum(&packet), 0);
    }
}
