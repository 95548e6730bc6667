// Incremental packet parsing: the push-parser contract plus an ADTS framer

mod adts;
mod parser;

pub use adts::AdtsParser;
pub use parser::{
    PacketParser, ParseError, ParseOutput, ParsedPacket, StreamFormat,
};
