use crate::error::DnsError;

const QR: u16 = 1 << 15;
const OPCODE_SHIFT: u16 = 11;
const AA: u16 = 1 << 10;
const TC: u16 = 1 << 9;
const RD: u16 = 1 << 8;
const RA: u16 = 1 << 7;
const Z_SHIFT: u16 = 4;

/// The fixed 12-byte DNS header with the flags word split into named fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    /// Set on responses.
    pub qr: bool,
    /// 4 bits; 0 is a standard query.
    pub opcode: u8,
    pub aa: bool,
    pub tc: bool,
    pub rd: bool,
    pub ra: bool,
    /// 3 reserved bits.
    pub z: u8,
    /// 4 bits.
    pub rcode: u8,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub const LEN: usize = 12;

    /// Pack the flag fields into the second 16-bit word.
    pub fn flags(&self) -> u16 {
        let mut f = 0u16;
        if self.qr {
            f |= QR;
        }
        f |= (u16::from(self.opcode) & 0xF) << OPCODE_SHIFT;
        if self.aa {
            f |= AA;
        }
        if self.tc {
            f |= TC;
        }
        if self.rd {
            f |= RD;
        }
        if self.ra {
            f |= RA;
        }
        f |= (u16::from(self.z) & 0x7) << Z_SHIFT;
        f | (u16::from(self.rcode) & 0xF)
    }

    /// Unpack a flags word; the counts are left at zero.
    pub fn from_flags(id: u16, flags: u16) -> Self {
        Header {
            id,
            qr: flags & QR != 0,
            opcode: ((flags >> OPCODE_SHIFT) & 0xF) as u8,
            aa: flags & AA != 0,
            tc: flags & TC != 0,
            rd: flags & RD != 0,
            ra: flags & RA != 0,
            z: ((flags >> Z_SHIFT) & 0x7) as u8,
            rcode: (flags & 0xF) as u8,
            ..Header::default()
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DnsError> {
        if buf.len() < Self::LEN {
            return Err(DnsError::MalformedHeader(buf.len()));
        }
        let word = |i: usize| u16::from_be_bytes([buf[i], buf[i + 1]]);
        let mut h = Header::from_flags(word(0), word(2));
        h.qdcount = word(4);
        h.ancount = word(6);
        h.nscount = word(8);
        h.arcount = word(10);
        Ok(h)
    }

    pub fn encode(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        let words = [
            self.id,
            self.flags(),
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount,
        ];
        for (chunk, w) in out.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&w.to_be_bytes());
        }
        out
    }
}
