use std::io::{self, Write};

use crate::http::message::Message;

/// Writes a serialized response head, then the body, onto a blocking sink.
pub struct ResponseWriter<'a> {
    head: Vec<u8>,
    body: &'a [u8],
    written: usize,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(response: &'a Message) -> Self {
        Self {
            head: response.serialize_response(),
            body: response.body_bytes(),
            written: 0,
        }
    }

    /// Total bytes this writer puts on the wire.
    pub fn len(&self) -> usize {
        self.head.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_to_stream<W: Write>(&mut self, stream: &mut W) -> io::Result<()> {
        while self.written < self.len() {
            let chunk = if self.written < self.head.len() {
                &self.head[self.written..]
            } else {
                &self.body[self.written - self.head.len()..]
            };

            let n = match stream.write(chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "connection closed while writing",
                ));
            }

            self.written += n;
        }

        stream.flush()
    }
}
