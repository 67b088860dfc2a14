use crate::error::DnsError;
use crate::name::{Name, Reader, Writer};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Record types whose data this codec interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RecordType {
    A = 1,
    Ns = 2,
    Cname = 5,
    Mx = 15,
    Aaaa = 28,
}

impl RecordType {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(RecordType::A),
            2 => Some(RecordType::Ns),
            5 => Some(RecordType::Cname),
            15 => Some(RecordType::Mx),
            28 => Some(RecordType::Aaaa),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Ns => "NS",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Aaaa => "AAAA",
        }
    }
}

/// Mnemonic for a class code.
pub fn class_name(code: u16) -> Option<&'static str> {
    match code {
        1 => Some("IN"),
        2 => Some("CS"),
        3 => Some("NCHS"),
        4 => Some("HS"),
        _ => None,
    }
}

pub const CLASS_IN: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: Name,
    pub qtype: u16,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: Name, qtype: RecordType) -> Self {
        Question { name, qtype: qtype.code(), qclass: CLASS_IN }
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, DnsError> {
        let name = r.name()?;
        let qtype = r.u16()?;
        let qclass = r.u16()?;
        Ok(Question { name, qtype, qclass })
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.name(&self.name);
        w.u16(self.qtype);
        w.u16(self.qclass);
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = RecordType::from_u16(self.qtype).map(RecordType::as_str);
        write!(
            f,
            "{} {} {}",
            self.name,
            class_name(self.qclass).unwrap_or("?"),
            ty.unwrap_or("?")
        )
    }
}

/// Interpreted RDATA; the variant fixes the record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Mx { preference: u16, exchange: Name },
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Cname(_) => RecordType::Cname,
            RecordData::Mx { .. } => RecordType::Mx,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::A(ip) => write!(f, "{ip}"),
            RecordData::Aaaa(ip) => write!(f, "{ip}"),
            RecordData::Ns(n) | RecordData::Cname(n) => write!(f, "{n}"),
            RecordData::Mx { preference, exchange } => write!(f, "{preference} {exchange}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: Name,
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn new(name: Name, ttl: u32, data: RecordData) -> Self {
        ResourceRecord { name, class: CLASS_IN, ttl, data }
    }

    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    /// Read one record. On a per-record failure (unknown type, bad length)
    /// the cursor is left past the record's data so the next one can be read.
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, DnsError> {
        let name = r.name()?;
        let rtype = r.u16()?;
        let class = r.u16()?;
        let ttl = r.u32()?;
        let rdlen = r.u16()?;
        let start = r.position();
        let end = start + usize::from(rdlen);
        if end > r.len() {
            return Err(DnsError::Truncated { offset: start, needed: end - r.len() });
        }

        let Some(kind) = RecordType::from_u16(rtype) else {
            r.seek(end);
            return Err(DnsError::UnknownRecordType(rtype));
        };
        let bad_len = DnsError::BadRecordLength { rtype, len: rdlen };

        let data = match kind {
            RecordType::A => {
                let b = r.bytes(usize::from(rdlen))?;
                let octets: [u8; 4] = b.try_into().map_err(|_| bad_len.clone())?;
                RecordData::A(Ipv4Addr::from(octets))
            }
            RecordType::Aaaa => {
                let b = r.bytes(usize::from(rdlen))?;
                let octets: [u8; 16] = b.try_into().map_err(|_| bad_len.clone())?;
                RecordData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::Ns => RecordData::Ns(r.name()?),
            RecordType::Cname => RecordData::Cname(r.name()?),
            RecordType::Mx => {
                let preference = r.u16()?;
                RecordData::Mx { preference, exchange: r.name()? }
            }
        };

        if r.position() != end {
            r.seek(end);
            return Err(bad_len);
        }
        Ok(ResourceRecord { name, class, ttl, data })
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.name(&self.name);
        w.u16(self.record_type().code());
        w.u16(self.class);
        w.u32(self.ttl);
        let len_at = w.len();
        w.u16(0);
        match &self.data {
            RecordData::A(ip) => w.bytes(&ip.octets()),
            RecordData::Aaaa(ip) => w.bytes(&ip.octets()),
            RecordData::Ns(n) | RecordData::Cname(n) => w.name(n),
            RecordData::Mx { preference, exchange } => {
                w.u16(*preference);
                w.name(exchange);
            }
        }
        let rdlen = w.len() - len_at - 2;
        w.patch_u16(len_at, rdlen as u16);
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name,
            self.ttl,
            class_name(self.class).unwrap_or("?"),
            self.record_type().as_str(),
            self.data
        )
    }
}
