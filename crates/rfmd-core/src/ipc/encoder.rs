//! Response encoding
//!
//! Frames are assembled in a growable buffer with a hard ceiling. Going over
//! the ceiling is a typed error for that one response; nothing is truncated.

use super::protocol::{
    Frame, FrameStatus, ERROR_SENTINEL, FILE_CONTENT_PREFIX, PROCESS_LIST_HEADER,
};
use crate::config::ProtocolConfig;
use crate::{Error, Result};

/// Serializes [`Frame`]s into wire bytes
#[derive(Debug, Clone, Copy)]
pub struct ResponseEncoder {
    envelope: bool,
    max_frame_bytes: usize,
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self::from_config(&ProtocolConfig::default())
    }
}

impl ResponseEncoder {
    pub fn new(envelope: bool, max_frame_bytes: usize) -> Self {
        Self {
            envelope,
            max_frame_bytes,
        }
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.envelope, config.max_frame_bytes)
    }

    /// Encode one frame, envelope header included when enabled
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let body = self.encode_body(frame)?;
        if !self.envelope {
            return Ok(body);
        }

        let mut out = format!("{} {}\n", frame.status().as_str(), body.len()).into_bytes();
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Empty `ERR 0` frame standing in for an answer the client is waiting
    /// on but will not get. Raw mode has nothing to send.
    pub fn missing_frame(&self) -> Option<Vec<u8>> {
        self.envelope
            .then(|| format!("{} 0\n", FrameStatus::Err.as_str()).into_bytes())
    }

    fn encode_body(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut buf = FrameBuf::new(self.max_frame_bytes);
        match frame {
            Frame::Cwd(path) => buf.push(path.as_bytes())?,
            Frame::FileContent { path, content } => {
                buf.push(FILE_CONTENT_PREFIX.as_bytes())?;
                buf.push(path.as_bytes())?;
                buf.push(b"\n")?;
                buf.push(content)?;
            }
            Frame::ProcessList(processes) => {
                buf.push(PROCESS_LIST_HEADER.as_bytes())?;
                for process in processes {
                    buf.push(process.to_line().as_bytes())?;
                }
            }
            Frame::Listing(entries) => {
                for entry in entries {
                    buf.push(entry.to_line().as_bytes())?;
                }
            }
            Frame::Error => buf.push(ERROR_SENTINEL.as_bytes())?,
        }
        Ok(buf.into_inner())
    }
}

/// Byte buffer that refuses to grow past `limit`
struct FrameBuf {
    bytes: Vec<u8>,
    limit: usize,
}

impl FrameBuf {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        let size = self.bytes.len() + data.len();
        if size > self.limit {
            return Err(Error::FrameTooLarge {
                size,
                max: self.limit,
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::ProcessEntry;

    #[test]
    fn test_envelope_header() {
        let encoder = ResponseEncoder::new(true, 1024);
        assert_eq!(encoder.encode(&Frame::Cwd("/".into())).unwrap(), b"OK 1\n/");
        assert_eq!(encoder.encode(&Frame::Error).unwrap(), b"ERR 5\nerror");
        assert_eq!(encoder.encode(&Frame::Listing(Vec::new())).unwrap(), b"OK 0\n");
    }

    #[test]
    fn test_missing_frame() {
        let encoder = ResponseEncoder::new(true, 1024);
        assert_eq!(encoder.missing_frame().unwrap(), b"ERR 0\n");
        assert_eq!(Frame::decode(FrameStatus::Err, b"").unwrap(), Frame::Error);
        assert!(ResponseEncoder::new(false, 1024).missing_frame().is_none());
    }

    #[test]
    fn test_raw_bodies() {
        let encoder = ResponseEncoder::new(false, 1024);
        let frame = Frame::FileContent {
            path: "/notes.txt".into(),
            content: b"hello\n".to_vec(),
        };
        assert_eq!(
            encoder.encode(&frame).unwrap(),
            b"FILE_CONTENT_START:/notes.txt\nhello\n"
        );

        let frame = Frame::ProcessList(vec![ProcessEntry {
            pid: 1,
            ppid: 0,
            command: "init".into(),
        }]);
        assert_eq!(
            encoder.encode(&frame).unwrap(),
            b"PROCESS_LIST_START\n    1     0 init\n"
        );
    }

    #[test]
    fn test_frame_too_large() {
        let encoder = ResponseEncoder::new(true, 16);
        let frame = Frame::FileContent {
            path: "/big".into(),
            content: vec![b'x'; 64],
        };
        let err = encoder.encode(&frame).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { max: 16, .. }));

        // A body exactly at the limit still fits.
        let frame = Frame::Cwd(format!("/{}", "a".repeat(15)));
        assert!(encoder.encode(&frame).is_ok());
    }

    #[test]
    fn test_encoded_frame_decodes() {
        let encoder = ResponseEncoder::new(true, 1024);
        let frame = Frame::Cwd("/sub".into());
        let bytes = encoder.encode(&frame).unwrap();

        let newline = bytes.iter().position(|&b| b == b'\n').unwrap();
        let header = std::str::from_utf8(&bytes[..newline]).unwrap();
        let (status, len) = FrameStatus::parse_header(header).unwrap();
        assert_eq!(len, bytes.len() - newline - 1);
        assert_eq!(Frame::decode(status, &bytes[newline + 1..]).unwrap(), frame);
    }
}
