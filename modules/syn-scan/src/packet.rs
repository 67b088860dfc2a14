//! IPv4 and TCP header construction for a bare SYN segment.

use crate::SynError;
use std::net::{IpAddr, Ipv4Addr};

pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const SYN_PACKET_LEN: usize = IPV4_HEADER_LEN + TCP_HEADER_LEN;

const TTL: u8 = 64;
const PROTO_TCP: u8 = 6;
const WINDOW: u16 = 14600;
const FLAG_SYN: u8 = 0x02;

/// Internet checksum (RFC 1071): one's complement of the one's complement
/// sum of big-endian 16-bit words, an odd trailing byte padded with zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for w in &mut words {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Narrow an address to IPv4, the only family the raw path supports.
pub fn ipv4(ip: IpAddr) -> Result<Ipv4Addr, SynError> {
    match ip {
        IpAddr::V4(v4) => Ok(v4),
        IpAddr::V6(v6) => Err(SynError::InvalidAddress(v6.to_string())),
    }
}

pub fn build_ipv4_header(src: Ipv4Addr, dst: Ipv4Addr, payload_len: u16) -> [u8; IPV4_HEADER_LEN] {
    let mut h = [0u8; IPV4_HEADER_LEN];
    h[0] = 0x45;
    h[2..4].copy_from_slice(&(IPV4_HEADER_LEN as u16 + payload_len).to_be_bytes());
    h[8] = TTL;
    h[9] = PROTO_TCP;
    h[12..16].copy_from_slice(&src.octets());
    h[16..20].copy_from_slice(&dst.octets());
    let sum = checksum(&h);
    h[10..12].copy_from_slice(&sum.to_be_bytes());
    h
}

/// The 12-byte pseudo-header that prefixes a segment for its checksum.
fn pseudo_header(src: Ipv4Addr, dst: Ipv4Addr, segment_len: u16) -> [u8; 12] {
    let mut p = [0u8; 12];
    p[0..4].copy_from_slice(&src.octets());
    p[4..8].copy_from_slice(&dst.octets());
    p[9] = PROTO_TCP;
    p[10..12].copy_from_slice(&segment_len.to_be_bytes());
    p
}

pub fn tcp_checksum(src: Ipv4Addr, dst: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(12 + segment.len());
    buf.extend_from_slice(&pseudo_header(src, dst, segment.len() as u16));
    buf.extend_from_slice(segment);
    checksum(&buf)
}

pub fn build_tcp_syn_header(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
) -> [u8; TCP_HEADER_LEN] {
    let mut h = [0u8; TCP_HEADER_LEN];
    h[0..2].copy_from_slice(&src_port.to_be_bytes());
    h[2..4].copy_from_slice(&dst_port.to_be_bytes());
    h[4..8].copy_from_slice(&seq.to_be_bytes());
    h[12] = 5 << 4;
    h[13] = FLAG_SYN;
    h[14..16].copy_from_slice(&WINDOW.to_be_bytes());
    let sum = tcp_checksum(src, dst, &h);
    h[16..18].copy_from_slice(&sum.to_be_bytes());
    h
}

/// IPv4 header followed by the SYN segment, ready for an `IP_HDRINCL` socket.
pub fn build_syn_packet(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    seq: u32,
) -> [u8; SYN_PACKET_LEN] {
    let mut p = [0u8; SYN_PACKET_LEN];
    p[..IPV4_HEADER_LEN].copy_from_slice(&build_ipv4_header(src, dst, TCP_HEADER_LEN as u16));
    p[IPV4_HEADER_LEN..].copy_from_slice(&build_tcp_syn_header(src, dst, src_port, dst_port, seq));
    p
}
