use anyhow::anyhow;
use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, Read, Write};

/// `Content-Length` framed reader half.
pub struct DapReader<R: BufRead> {
    reader: R,
}

impl<R: BufRead> DapReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read_message(&mut self) -> anyhow::Result<Value> {
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            let read_n = self.reader.read_line(&mut line)?;
            if read_n == 0 {
                return Err(anyhow!("DAP connection closed"));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(v) = line.strip_prefix("Content-Length:") {
                content_length = Some(v.trim().parse()?);
            }
        }

        let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        let msg: Value = serde_json::from_slice(&buf)?;
        Ok(msg)
    }
}

/// `Content-Length` framed writer half.
pub struct DapWriter<W: Write> {
    stream: W,
}

impl<W: Write> DapWriter<W> {
    pub fn new(stream: W) -> Self {
        Self { stream }
    }

    pub fn write_message<T: Serialize>(&mut self, v: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(v)?;
        write!(self.stream, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        Ok(())
    }
}
