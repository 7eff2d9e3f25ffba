//! NETCONF message framing
//!
//! Two framings share one codec: end-of-message framing (each message
//! followed by `]]>]]>`) used until the hello exchange completes, and
//! chunked framing (`\n#<len>\n<data>` chunks closed by `\n##\n`) used
//! once both peers advertise base:1.1. The framing can be switched on a
//! live codec without losing buffered bytes.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::NetconfError;

/// End-of-message delimiter
pub const EOM_DELIMITER: &[u8] = b"]]>]]>";

/// Default upper bound on one reassembled message
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const MAX_CHUNK_SIZE: u64 = u32::MAX as u64;
// "\n#" + 10 digits + "\n"
const MAX_CHUNK_HEADER: usize = 13;

/// Active message framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    EndOfMessage,
    Chunked,
}

/// Codec for NETCONF message framing
#[derive(Debug)]
pub struct NetconfCodec {
    framing: Framing,
    max_frame_size: usize,
    /// Chunks of the message being reassembled
    partial: Vec<u8>,
}

impl Default for NetconfCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl NetconfCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            framing: Framing::EndOfMessage,
            max_frame_size,
            partial: Vec::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switch framing for all following messages
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
    }

    fn decode_eom(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, NetconfError> {
        let Some(pos) = src
            .windows(EOM_DELIMITER.len())
            .position(|w| w == EOM_DELIMITER)
        else {
            if src.len() > self.max_frame_size + EOM_DELIMITER.len() {
                return Err(NetconfError::Transport(format!(
                    "message exceeds {} bytes without a delimiter",
                    self.max_frame_size
                )));
            }
            return Ok(None);
        };

        if pos > self.max_frame_size {
            return Err(NetconfError::Transport(format!(
                "message of {pos} bytes exceeds the {} byte limit",
                self.max_frame_size
            )));
        }
        let message = src.split_to(pos).to_vec();
        src.advance(EOM_DELIMITER.len());
        Ok(Some(message))
    }

    fn decode_chunked(&mut self, src: &mut BytesMut) -> Result<Option<Vec<u8>>, NetconfError> {
        loop {
            if self.partial.is_empty() {
                // whitespace between messages, such as a newline trailing
                // the hello, but never the newline opening a chunk header
                let mut skip = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
                if skip > 0 && src[skip - 1] == b'\n' {
                    skip -= 1;
                }
                src.advance(skip);
            }
            if src.len() < 4 {
                return Ok(None);
            }
            if &src[..2] != b"\n#" {
                return Err(NetconfError::Transport("invalid chunk header".into()));
            }

            if src[2] == b'#' {
                if src[3] != b'\n' {
                    return Err(NetconfError::Transport("invalid end-of-chunks marker".into()));
                }
                if self.partial.is_empty() {
                    return Err(NetconfError::Transport("end-of-chunks without any chunk".into()));
                }
                src.advance(4);
                return Ok(Some(std::mem::take(&mut self.partial)));
            }

            let search = &src[2..src.len().min(MAX_CHUNK_HEADER)];
            let Some(newline) = search.iter().position(|&b| b == b'\n') else {
                if src.len() >= MAX_CHUNK_HEADER {
                    return Err(NetconfError::Transport("chunk size too long".into()));
                }
                return Ok(None);
            };

            let digits = &search[..newline];
            let size = parse_chunk_size(digits)?;
            let header_len = 2 + newline + 1;
            let size = usize::try_from(size)
                .map_err(|_| NetconfError::Transport(format!("chunk of {size} bytes is too large")))?;

            if self.partial.len() + size > self.max_frame_size {
                return Err(NetconfError::Transport(format!(
                    "message exceeds the {} byte limit",
                    self.max_frame_size
                )));
            }
            if src.len() < header_len + size {
                src.reserve(header_len + size - src.len());
                return Ok(None);
            }

            src.advance(header_len);
            self.partial.extend_from_slice(&src[..size]);
            src.advance(size);
        }
    }
}

fn parse_chunk_size(digits: &[u8]) -> Result<u64, NetconfError> {
    let invalid = || {
        NetconfError::Transport(format!(
            "invalid chunk size '{}'",
            String::from_utf8_lossy(digits)
        ))
    };
    if digits.is_empty() || digits[0] == b'0' || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let size: u64 = std::str::from_utf8(digits)
        .map_err(|_| invalid())?
        .parse()
        .map_err(|_| invalid())?;
    if size > MAX_CHUNK_SIZE {
        return Err(invalid());
    }
    Ok(size)
}

impl Decoder for NetconfCodec {
    type Item = Vec<u8>;
    type Error = NetconfError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing {
            Framing::EndOfMessage => self.decode_eom(src),
            Framing::Chunked => self.decode_chunked(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        if src.iter().all(u8::is_ascii_whitespace) && self.partial.is_empty() {
            src.clear();
            return Ok(None);
        }
        Err(NetconfError::Transport("stream ended inside a message".into()))
    }
}

impl Encoder<Vec<u8>> for NetconfCodec {
    type Error = NetconfError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self.framing {
            Framing::EndOfMessage => {
                dst.reserve(item.len() + EOM_DELIMITER.len());
                dst.put_slice(&item);
                dst.put_slice(EOM_DELIMITER);
            }
            Framing::Chunked => {
                if item.is_empty() {
                    return Err(NetconfError::Transport("cannot frame an empty message".into()));
                }
                for chunk in item.chunks(MAX_CHUNK_SIZE as usize) {
                    dst.put_slice(format!("\n#{}\n", chunk.len()).as_bytes());
                    dst.put_slice(chunk);
                }
                dst.put_slice(b"\n##\n");
            }
        }
        Ok(())
    }
}
