//! Stream header encoding and decoding.
//!
//! Jeder XBIS-Stream beginnt mit:
//! - Magic: `XBIS` als 4 ASCII-Bytes
//! - Format-Versionsbyte (aktuell 1)
//! - Source-Id-Byte (Produzenten-Dialekt, z.B. [`crate::node::JIBX_SOURCE_ID`])
//! - zwei Capability-Values: Share-Tiefe für Character-Content und für
//!   Attributwerte (0 = Sharing deaktiviert)
//!
//! Danach folgt der Dokumentinhalt als einzelne, mit 0 terminierte
//! Kindknoten-Liste.

use std::io::Read;

use crate::buffer::{InputBuffer, OutputBuffer};
use crate::node::{HEADER_MAGIC, HEADER_VERSION, JIBX_SOURCE_ID};
use crate::value;
use crate::{Error, Result};

/// Decoded XBIS stream header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Producer dialect id; readers accept any value.
    pub source_id: u8,
    /// Minimum byte length at which character content enters the shared
    /// table (0 disables sharing).
    pub content_share_depth: u64,
    /// Minimum byte length at which attribute values enter the shared table
    /// (0 disables sharing).
    pub attribute_share_depth: u64,
}

impl Default for StreamHeader {
    fn default() -> Self {
        Self {
            source_id: JIBX_SOURCE_ID,
            content_share_depth: 6,
            attribute_share_depth: 6,
        }
    }
}

/// Writes the stream header.
pub(crate) fn encode(out: &mut OutputBuffer, header: &StreamHeader) {
    out.extend(&HEADER_MAGIC);
    out.write_byte(HEADER_VERSION);
    out.write_byte(header.source_id);
    value::write_value(out, header.content_share_depth);
    value::write_value(out, header.attribute_share_depth);
}

/// Reads and verifies the stream header.
pub(crate) fn decode<R: Read>(inp: &mut InputBuffer<R>) -> Result<StreamHeader> {
    let mut magic = [0u8; 4];
    for b in &mut magic {
        *b = inp.read_byte()?;
    }
    if magic != HEADER_MAGIC {
        return Err(Error::InvalidMagic(magic));
    }
    let version = inp.read_byte()?;
    if version != HEADER_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let source_id = inp.read_byte()?;
    let content_share_depth = value::read_value(inp)?;
    let attribute_share_depth = value::read_value(inp)?;
    Ok(StreamHeader { source_id, content_share_depth, attribute_share_depth })
}
