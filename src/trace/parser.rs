//! Streaming trace reader.
//!
//! [`TraceReader`] validates the uncompressed header, then decodes call
//! records lazily from the zlib body. It is the production [`CallSource`]:
//! one record per `next_call`, numbered from 1.
//!
//! # Error model
//!
//! Open-time problems (missing file, wrong magic, unknown version) are typed
//! in [`TraceOpenError`] and surfaced to the caller. Problems *past* the
//! header — truncation, unknown opcodes, oversized markers — are reported to
//! stderr once and then mapped to end-of-stream: a damaged tail replays the
//! calls that decoded cleanly and stops, it does not abort the process.

use super::format::{
    opcode, read_array, read_varint, read_varint_required, read_varint_u32, MAGIC,
    MAX_MARKER_LEN, VERSION,
};
use super::{Call, CallOp, CallSource};
use flate2::read::ZlibDecoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

// ============================================================================
// Errors
// ============================================================================

/// Failure to open a trace container.
#[derive(Debug)]
#[non_exhaustive]
pub enum TraceOpenError {
    /// I/O error reading the header.
    Io(io::Error),
    /// The first four bytes are not the trace magic.
    BadMagic,
    /// The container version is newer than this reader understands.
    UnsupportedVersion { found: u8 },
}

impl fmt::Display for TraceOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::BadMagic => write!(f, "not a trace file (bad magic)"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported trace version {found} (supported: {VERSION})")
            }
        }
    }
}

impl std::error::Error for TraceOpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for TraceOpenError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Streaming decoder over a trace container.
///
/// Generic over the underlying reader so tests can decode from memory; the
/// CLI uses [`TraceReader::open`] over a buffered file.
#[derive(Debug)]
pub struct TraceReader<R: Read> {
    body: ZlibDecoder<R>,
    /// Call number for the next record (assigned, not stored in the file).
    next_no: u32,
    /// Set after end-of-stream or the first malformed record.
    done: bool,
}

impl TraceReader<BufReader<File>> {
    /// Opens a trace file and validates its header.
    pub fn open(path: &Path) -> Result<Self, TraceOpenError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> TraceReader<R> {
    /// Wraps a reader positioned at the start of the container.
    pub fn new(mut input: R) -> Result<Self, TraceOpenError> {
        let magic: [u8; 4] = read_array(&mut input)?;
        if magic != MAGIC {
            return Err(TraceOpenError::BadMagic);
        }
        let [version] = read_array::<_, 1>(&mut input)?;
        if version != VERSION {
            return Err(TraceOpenError::UnsupportedVersion { found: version });
        }
        Ok(TraceReader {
            body: ZlibDecoder::new(input),
            next_no: 1,
            done: false,
        })
    }

    /// Decodes one record, or `Ok(None)` at a clean end-of-stream.
    fn read_record(&mut self) -> io::Result<Option<(u32, CallOp)>> {
        let thread_id = match read_varint(&mut self.body)? {
            Some(v) => u32::try_from(v).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "thread id exceeds u32")
            })?,
            None => return Ok(None),
        };
        let [op] = read_array::<_, 1>(&mut self.body)?;
        let op = match op {
            opcode::CLEAR => CallOp::Clear {
                color: read_array(&mut self.body)?,
            },
            opcode::FILL_RECT => CallOp::FillRect {
                x: read_varint_u32(&mut self.body)?,
                y: read_varint_u32(&mut self.body)?,
                w: read_varint_u32(&mut self.body)?,
                h: read_varint_u32(&mut self.body)?,
                color: read_array(&mut self.body)?,
            },
            opcode::PRESENT => CallOp::Present,
            opcode::BIND_TARGET => CallOp::BindTarget {
                target: read_varint_u32(&mut self.body)?,
            },
            opcode::FRAME_END => CallOp::FrameEnd,
            opcode::VIEWPORT => CallOp::Viewport {
                width: read_varint_u32(&mut self.body)?,
                height: read_varint_u32(&mut self.body)?,
            },
            opcode::MARKER => {
                let len = read_varint_required(&mut self.body)?;
                if len > MAX_MARKER_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("marker length {len} exceeds cap {MAX_MARKER_LEN}"),
                    ));
                }
                let mut buf = vec![0u8; len as usize];
                self.body.read_exact(&mut buf)?;
                let text = String::from_utf8(buf).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidData, "marker is not UTF-8")
                })?;
                CallOp::Marker { text }
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown opcode 0x{other:02x}"),
                ));
            }
        };
        Ok(Some((thread_id, op)))
    }

}

impl<R: Read + Send> CallSource for TraceReader<R> {
    fn next_call(&mut self) -> Option<Call> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some((thread_id, op))) => {
                let no = self.next_no;
                self.next_no += 1;
                Some(Call::new(no, thread_id, op))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                // Unrecoverable parse error: report once, then behave as
                // end-of-stream so replay terminates normally.
                eprintln!(
                    "error: malformed trace record before call {}: {err}",
                    self.next_no
                );
                self.done = true;
                None
            }
        }
    }
}
