//! Length-prefixed tagged frames. A frame on the wire is a u32 length
//! covering everything after itself, a u32 tag chosen by the client to
//! pair responses with requests, and the payload bytes. Tags let several
//! in-flight requests share one connection.

use std::io::{Read, Write};

use crate::encoding;
use crate::error::{Error, Result};

/// Frames larger than this are rejected as corrupt rather than allocated.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub tag: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(tag: u32, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        encoding::write_u32(w, 4 + self.payload.len() as u32)?;
        encoding::write_u32(w, self.tag)?;
        w.write_all(&self.payload)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let len = encoding::read_u32(r)?;
        if len < 4 {
            return Err(Error::Corrupted(format!(
                "frame length {} shorter than tag",
                len
            )));
        }
        if len > MAX_FRAME_LEN {
            return Err(Error::Corrupted(format!(
                "frame length {} exceeds limit",
                len
            )));
        }
        let tag = encoding::read_u32(r)?;
        let mut payload = vec![0u8; (len - 4) as usize];
        r.read_exact(&mut payload)
            .map_err(|e| Error::Decode("frame payload", e))?;
        Ok(Self { tag, payload })
    }
}
