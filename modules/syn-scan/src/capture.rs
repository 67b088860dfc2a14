//! Live capture of the target's reply on a datalink channel.
//!
//! The raw sender never receives replies: the local TCP stack has no socket
//! for the flow, so the answer is sniffed off the interface instead.

use crate::SynError;
use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

const FLAG_SYN: u8 = 0x02;
const FLAG_RST: u8 = 0x04;
const FLAG_ACK: u8 = 0x10;

/// A reply that settles the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpReply {
    SynAck,
    Rst,
}

/// SYN+ACK means a listener, RST means none; anything else is ignored.
pub fn classify(flags: u8) -> Option<TcpReply> {
    if flags & (FLAG_SYN | FLAG_ACK) == FLAG_SYN | FLAG_ACK {
        Some(TcpReply::SynAck)
    } else if flags & FLAG_RST != 0 {
        Some(TcpReply::Rst)
    } else {
        None
    }
}

/// How frames on an interface are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    /// Point-to-point and tunnel devices hand up bare IP packets.
    RawIp,
}

impl LinkKind {
    pub fn of(iface: &NetworkInterface) -> Self {
        if iface.mac.is_none() || iface.is_point_to_point() {
            LinkKind::RawIp
        } else {
            LinkKind::Ethernet
        }
    }
}

/// Accepts TCP segments from `peer:peer_port` to `local:local_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFilter {
    pub peer: Ipv4Addr,
    pub peer_port: u16,
    pub local: Ipv4Addr,
    pub local_port: u16,
}

impl CaptureFilter {
    /// Return the TCP flags of `frame` if it passes the filter.
    pub fn match_frame(&self, frame: &[u8], link: LinkKind) -> Option<u8> {
        match link {
            LinkKind::Ethernet => {
                let eth = EthernetPacket::new(frame)?;
                if eth.get_ethertype() != EtherTypes::Ipv4 {
                    return None;
                }
                self.match_ipv4(eth.payload())
            }
            LinkKind::RawIp => self.match_ipv4(frame),
        }
    }

    fn match_ipv4(&self, packet: &[u8]) -> Option<u8> {
        let ip = Ipv4Packet::new(packet)?;
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
            || ip.get_source() != self.peer
            || ip.get_destination() != self.local
        {
            return None;
        }
        let tcp = ip.payload();
        if tcp.len() < 14 {
            return None;
        }
        let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
        let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
        (src_port == self.peer_port && dst_port == self.local_port).then_some(tcp[13])
    }
}

/// A receive handle that blocks for at most `poll` per read.
pub struct Capture {
    rx: Box<dyn DataLinkReceiver>,
    link: LinkKind,
}

impl Capture {
    pub fn open(iface: &NetworkInterface, poll: Duration) -> Result<Self, SynError> {
        // replies are addressed to us
        let config = datalink::Config {
            read_timeout: Some(poll),
            promiscuous: false,
            ..Default::default()
        };
        match datalink::channel(iface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => Ok(Capture { rx, link: LinkKind::of(iface) }),
            Ok(_) => Err(SynError::Interface(format!("{}: unsupported channel type", iface.name))),
            Err(e) => Err(SynError::Capture(e)),
        }
    }

    pub fn link(&self) -> LinkKind {
        self.link
    }
}

/// Anything that yields captured frames one at a time.
pub trait FrameSource {
    /// Next frame, or `None` when the poll interval passed without one.
    fn next_frame(&mut self) -> io::Result<Option<&[u8]>>;
}

impl FrameSource for Capture {
    fn next_frame(&mut self) -> io::Result<Option<&[u8]>> {
        match self.rx.next() {
            Ok(frame) => Ok(Some(frame)),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Pick the capture interface: by name when given, otherwise the one that
/// owns `source`.
pub fn find_interface(name: Option<&str>, source: Ipv4Addr) -> Result<NetworkInterface, SynError> {
    let all = datalink::interfaces();
    let found = match name {
        Some(n) => all.into_iter().find(|i| i.name == n),
        None => all
            .into_iter()
            .find(|i| i.ips.iter().any(|net| net.ip() == IpAddr::V4(source))),
    };
    found.ok_or_else(|| match name {
        Some(n) => SynError::Interface(format!("no interface named {n}")),
        None => SynError::Interface(format!("no interface owns {source}")),
    })
}
