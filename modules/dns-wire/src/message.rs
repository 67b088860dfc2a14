use crate::error::DnsError;
use crate::header::Header;
use crate::name::{Name, Reader, Writer};
use crate::record::{Question, RecordType, ResourceRecord};

/// A decoded (or to-be-encoded) DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
    /// Per-record errors for records that were dropped while decoding.
    pub skipped: Vec<DnsError>,
}

impl Message {
    /// A standard recursive query with a single question.
    pub fn query(id: u16, name: Name, qtype: RecordType) -> Self {
        let mut m = Message {
            header: Header { id, rd: true, ..Header::default() },
            ..Message::default()
        };
        m.questions.push(Question::new(name, qtype));
        m.sync_counts();
        m
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    pub fn push_answer(&mut self, rr: ResourceRecord) {
        self.answers.push(rr);
        self.sync_counts();
    }

    pub fn push_authority(&mut self, rr: ResourceRecord) {
        self.authorities.push(rr);
        self.sync_counts();
    }

    pub fn push_additional(&mut self, rr: ResourceRecord) {
        self.additionals.push(rr);
        self.sync_counts();
    }

    /// Set the header counts to the number of entries actually held.
    pub fn sync_counts(&mut self) {
        self.header.qdcount = self.questions.len() as u16;
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authorities.len() as u16;
        self.header.arcount = self.additionals.len() as u16;
    }

    /// Serialize with name compression. Counts are written from the
    /// section lengths, not from the header fields.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = self.header;
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16;

        let mut w = Writer::new();
        w.bytes(&header.encode());
        for q in &self.questions {
            q.write(&mut w);
        }
        for rr in self.answers.iter().chain(&self.authorities).chain(&self.additionals) {
            rr.write(&mut w);
        }
        w.finish()
    }

    /// Decode header, questions and all three record sections.
    ///
    /// Records that fail on their own are dropped and kept in `skipped`; a
    /// truncated record ends decoding since nothing after it can be located.
    /// Name errors (cycles, overlong names) abort the whole message.
    pub(crate) fn decode(buf: &[u8]) -> Result<Self, DnsError> {
        let header = Header::decode(buf)?;
        let mut r = Reader::at(buf, Header::LEN);

        let mut msg = Message { header, ..Message::default() };
        for _ in 0..header.qdcount {
            msg.questions.push(Question::read(&mut r)?);
        }

        let wanted = [header.ancount, header.nscount, header.arcount];
        let mut sections: [Vec<ResourceRecord>; 3] = Default::default();
        'sections: for (section, &count) in sections.iter_mut().zip(&wanted) {
            for _ in 0..count {
                match ResourceRecord::read(&mut r) {
                    Ok(rr) => section.push(rr),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e @ DnsError::Truncated { .. }) => {
                        tracing::debug!(error = %e, "dns record truncated, stopping");
                        msg.skipped.push(e);
                        break 'sections;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "dns record skipped");
                        msg.skipped.push(e);
                    }
                }
            }
        }

        let [answers, authorities, additionals] = sections;
        msg.answers = answers;
        msg.authorities = authorities;
        msg.additionals = additionals;
        msg.sync_counts();
        Ok(msg)
    }
}
