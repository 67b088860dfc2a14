/// Failures while decoding or encoding a DNS message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DnsError {
    #[error("message of {0} bytes is shorter than the 12-byte header")]
    MalformedHeader(usize),
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),
    #[error("unknown record type {0}")]
    UnknownRecordType(u16),
    #[error("compression pointer at offset {0} does not point strictly backwards")]
    CompressionCycle(usize),
    #[error("domain name exceeds 255 octets")]
    NameTooLong,
    #[error("invalid domain name: {0}")]
    InvalidName(String),
    #[error("reserved label type 0x{0:02x}")]
    BadLabel(u8),
    #[error("truncated at offset {offset}: {needed} more byte(s) needed")]
    Truncated { offset: usize, needed: usize },
    #[error("record of type {rtype} has bad data length {len}")]
    BadRecordLength { rtype: u16, len: u16 },
}

impl DnsError {
    /// Whether the error invalidates the whole message rather than one record.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DnsError::UnknownRecordType(_)
                | DnsError::BadRecordLength { .. }
                | DnsError::Truncated { .. }
        )
    }
}
