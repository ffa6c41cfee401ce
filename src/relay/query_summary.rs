use simple_dns::Packet;
use std::fmt::Display;

/// Query id and first question for log lines.
///
/// Best effort only. The relay never rejects a query it can't parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySummary {
    Parsed {
        id: u16,
        question: Option<String>,
    },
    Unparsable {
        len: usize,
    },
}

impl QuerySummary {
    pub fn new(query: &[u8]) -> Self {
        match Packet::parse(query) {
            Ok(packet) => {
                let question = packet
                    .questions
                    .first()
                    .map(|question| format!("{} {:?}", question.qname, question.qtype));
                Self::Parsed {
                    id: packet.id(),
                    question,
                }
            }
            Err(_) => Self::Unparsable { len: query.len() },
        }
    }
}

impl Display for QuerySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuerySummary::Parsed {
                id,
                question: Some(question),
            } => write!(f, "id={id} {question}"),
            QuerySummary::Parsed { id, question: None } => write!(f, "id={id} <no question>"),
            QuerySummary::Unparsable { len } => write!(f, "<unparsable {len} bytes>"),
        }
    }
}
