//! DNS wire-format codec (RFC 1035 subset): header flags, questions,
//! A/AAAA/NS/CNAME/MX records and name compression.

mod error;
mod header;
mod message;
mod name;
mod record;

pub use error::DnsError;
pub use header::Header;
pub use message::Message;
pub use name::{Name, Reader, Writer, MAX_LABEL_LEN, MAX_NAME_LEN};
pub use record::{class_name, Question, RecordData, RecordType, ResourceRecord, CLASS_IN};

/// Decode a query: exactly one question and a standard opcode are required.
pub fn parse_request(buf: &[u8]) -> Result<Message, DnsError> {
    let header = Header::decode(buf)?;
    if header.qdcount != 1 {
        return Err(DnsError::UnsupportedQuery(format!(
            "expected one question, got {}",
            header.qdcount
        )));
    }
    if header.opcode != 0 {
        return Err(DnsError::UnsupportedQuery(format!("opcode {}", header.opcode)));
    }
    Message::decode(buf)
}

/// Decode a response leniently; see [`Message`] for how bad records are handled.
pub fn parse_response(buf: &[u8]) -> Result<Message, DnsError> {
    Message::decode(buf)
}
