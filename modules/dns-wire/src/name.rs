//! Domain names and the byte cursor / writer that handle their wire form,
//! including message compression.

use crate::error::DnsError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// RFC 1035 limit on a name's wire length, root byte included.
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_LABEL_LEN: usize = 63;
/// Highest offset a compression pointer can encode.
const MAX_POINTER: usize = 0x3FFF;

/// A domain name as a sequence of labels, root omitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    pub fn root() -> Self {
        Name::default()
    }

    pub fn from_labels(labels: Vec<Vec<u8>>) -> Result<Self, DnsError> {
        let name = Name { labels };
        for l in &name.labels {
            if l.is_empty() || l.len() > MAX_LABEL_LEN {
                return Err(DnsError::InvalidName(format!("label of {} bytes", l.len())));
            }
        }
        if name.wire_len() > MAX_NAME_LEN {
            return Err(DnsError::NameTooLong);
        }
        Ok(name)
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Uncompressed encoded size.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }
}

impl FromStr for Name {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Ok(Name::root());
        }
        Name::from_labels(s.split('.').map(|l| l.as_bytes().to_vec()).collect())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        for (i, l) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&String::from_utf8_lossy(l))?;
        }
        Ok(())
    }
}

/// Bounds-checked read cursor over a whole message.
///
/// Offsets are absolute so compression pointers can be followed.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Reader { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], DnsError> {
        let out = slice_at(self.buf, self.pos, n)?;
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DnsError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, DnsError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, DnsError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Decode a possibly compressed name starting at the cursor.
    ///
    /// Every pointer must target an offset strictly below the start of the
    /// segment it was found in, so a chain of pointers always terminates.
    /// The cursor ends just past the first pointer, or past the root label
    /// when the name was written out in full.
    pub fn name(&mut self) -> Result<Name, DnsError> {
        let buf = self.buf;
        let mut pos = self.pos;
        let mut floor = pos;
        let mut resume = None;
        let mut visited = HashSet::new();
        let mut labels = Vec::new();
        let mut wire_len = 1;

        loop {
            let len = slice_at(buf, pos, 1)?[0];
            match len >> 6 {
                0b00 if len == 0 => {
                    pos += 1;
                    break;
                }
                0b00 => {
                    let n = len as usize;
                    wire_len += n + 1;
                    if wire_len > MAX_NAME_LEN {
                        return Err(DnsError::NameTooLong);
                    }
                    labels.push(slice_at(buf, pos + 1, n)?.to_vec());
                    pos += 1 + n;
                }
                0b11 => {
                    let lo = slice_at(buf, pos + 1, 1)?[0];
                    let target = (usize::from(len & 0x3F) << 8) | usize::from(lo);
                    if target >= floor || !visited.insert(target) {
                        return Err(DnsError::CompressionCycle(pos));
                    }
                    resume.get_or_insert(pos + 2);
                    pos = target;
                    floor = target;
                }
                _ => return Err(DnsError::BadLabel(len)),
            }
        }

        self.pos = resume.unwrap_or(pos);
        Ok(Name { labels })
    }
}

fn slice_at(buf: &[u8], pos: usize, n: usize) -> Result<&[u8], DnsError> {
    buf.get(pos..pos + n).ok_or(DnsError::Truncated {
        offset: pos,
        needed: (pos + n).saturating_sub(buf.len()),
    })
}

/// Message writer that compresses repeated name suffixes.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    names: HashMap<Vec<Vec<u8>>, u16>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn u16(&mut self, v: u16) {
        self.bytes(&v.to_be_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.bytes(&v.to_be_bytes());
    }

    /// Overwrite two bytes already written, used to back-fill RDLENGTH.
    pub fn patch_u16(&mut self, at: usize, v: u16) {
        self.buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }

    /// Write `name`, replacing the longest suffix already present in the
    /// message with a pointer to it.
    pub fn name(&mut self, name: &Name) {
        let labels = name.labels();
        for i in 0..labels.len() {
            let suffix = &labels[i..];
            if let Some(&offset) = self.names.get(suffix) {
                self.u16(0xC000 | offset);
                return;
            }
            let here = self.buf.len();
            if here <= MAX_POINTER {
                self.names.insert(suffix.to_vec(), here as u16);
            }
            self.buf.push(labels[i].len() as u8);
            self.buf.extend_from_slice(&labels[i]);
        }
        self.buf.push(0);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        let n = name("www.Example.com.");
        assert_eq!(n.labels().len(), 3);
        assert_eq!(n.to_string(), "www.Example.com");
        assert_eq!(n.wire_len(), 17);
        assert_eq!(name("").to_string(), ".");
        assert!(name(".").is_root());
    }

    #[test]
    fn rejects_bad_labels() {
        assert!(matches!("a..b".parse::<Name>(), Err(DnsError::InvalidName(_))));
        let long_label = "x".repeat(64);
        assert!(matches!(long_label.parse::<Name>(), Err(DnsError::InvalidName(_))));
        let long_name = vec!["abcdefghij"; 26].join(".");
        assert_eq!(long_name.parse::<Name>(), Err(DnsError::NameTooLong));
    }

    #[test]
    fn writer_compresses_shared_suffix() {
        let mut w = Writer::new();
        w.name(&name("a.example.com"));
        w.name(&name("b.example.com"));
        let buf = w.finish();
        // "a.example.com" literal: 1+1 + 1+7 + 1+3 + 1 = 15 bytes,
        // then "b" literal and a pointer to offset 2 ("example.com").
        assert_eq!(buf.len(), 15 + 2 + 2);
        assert_eq!(&buf[15..], &[1, b'b', 0xC0, 2]);

        let mut r = Reader::new(&buf);
        assert_eq!(r.name().unwrap(), name("a.example.com"));
        assert_eq!(r.position(), 15);
        assert_eq!(r.name().unwrap(), name("b.example.com"));
        assert_eq!(r.position(), buf.len());
    }

    #[test]
    fn identical_name_becomes_single_pointer() {
        let mut w = Writer::new();
        w.name(&name("example.com"));
        w.name(&name("example.com"));
        let buf = w.finish();
        assert_eq!(&buf[13..], &[0xC0, 0]);
    }

    #[test]
    fn self_pointer_is_a_cycle() {
        let buf = [0xC0, 0x00];
        assert_eq!(Reader::new(&buf).name(), Err(DnsError::CompressionCycle(0)));
    }

    #[test]
    fn forward_pointer_loop_is_a_cycle() {
        // offset 0 points to 2, offset 2 points back to 0.
        let buf = [0xC0, 0x02, 0xC0, 0x00];
        assert_eq!(Reader::new(&buf).name(), Err(DnsError::CompressionCycle(0)));
        // Entering at 2: the backwards jump to 0 is legal, the jump to 2 is not.
        assert_eq!(Reader::at(&buf, 2).name(), Err(DnsError::CompressionCycle(0)));
    }

    #[test]
    fn pointer_into_own_name_is_rejected() {
        // label "a" at 0, then a pointer back to 0 from inside the same name.
        let buf = [1, b'a', 0xC0, 0x00];
        assert_eq!(Reader::new(&buf).name(), Err(DnsError::CompressionCycle(2)));
    }

    #[test]
    fn overlong_chain_is_rejected() {
        // 5 x 63-byte labels exceed the 255 octet limit before any terminator.
        let mut buf = Vec::new();
        for _ in 0..5 {
            buf.push(63);
            buf.extend_from_slice(&[b'x'; 63]);
        }
        buf.push(0);
        assert_eq!(Reader::new(&buf).name(), Err(DnsError::NameTooLong));
    }

    #[test]
    fn truncated_label_reports_offset() {
        let buf = [5, b'a', b'b'];
        assert_eq!(
            Reader::new(&buf).name(),
            Err(DnsError::Truncated { offset: 1, needed: 3 })
        );
        assert!(matches!(Reader::new(&[0x40]).name(), Err(DnsError::BadLabel(0x40))));
    }
}
