use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Comment lines and other fields are
/// consumed silently, and blocks without any `data` line are skipped.
pub struct Sse {
    buf: String,
    // Bytes of a UTF-8 sequence that was split across two chunks.
    undecoded: Vec<u8>,
    chunks: Chunks,
    exhausted: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            undecoded: Vec::new(),
            chunks,
            exhausted: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }
            if self.exhausted {
                // An unterminated trailing block is dropped.
                return Ok(None);
            }

            match self.chunks.next_chunk().await.map_err(Error::Chunks)? {
                Some(bytes) => self.push_bytes(&bytes)?,
                None => {
                    self.exhausted = true;
                    if !self.undecoded.is_empty() {
                        return Err(Error::InvalidPayload);
                    }
                }
            }
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.undecoded.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.undecoded) {
            Ok(s) => {
                self.buf.push_str(s);
                self.undecoded.clear();
                return Ok(());
            }
            // The chunk ends in the middle of a character.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let tail = self.undecoded.split_off(valid_up_to);
        let head = std::mem::replace(&mut self.undecoded, tail);
        let head = String::from_utf8(head).map_err(|_| Error::InvalidPayload)?;
        self.buf.push_str(&head);
        Ok(())
    }

    fn try_parse_event(&mut self) -> Option<String> {
        loop {
            if self.buf.contains("\r\n") {
                self.buf = self.buf.replace("\r\n", "\n");
            }
            let end = self.buf.find("\n\n")?;
            let block: String = self.buf.drain(..end + 2).collect();

            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => {
                        (field, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                if field == "data" {
                    let data = data.get_or_insert_with(String::new);
                    data.push_str(value);
                    data.push('\n');
                }
            }

            if let Some(mut data) = data {
                data.pop();
                return Some(data);
            }
        }
    }
}
