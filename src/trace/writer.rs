//! Streaming trace writer.
//!
//! Counterpart of [`TraceReader`](super::TraceReader): writes the
//! uncompressed header, then appends call records into a zlib stream. Used
//! by the `gen_trace` tool, tests, and benches; the replayer itself never
//! writes traces.

use super::format::{opcode, write_varint, MAGIC, MAX_MARKER_LEN, VERSION};
use super::CallOp;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Appends call records to a trace container.
///
/// Records carry no call numbers; readers assign them from record order, so
/// the writer only needs the recorded thread id per call.
pub struct TraceWriter<W: Write> {
    body: ZlibEncoder<W>,
}

impl TraceWriter<BufWriter<File>> {
    /// Creates (or truncates) a trace file.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> TraceWriter<W> {
    /// Writes the header into `out` and prepares the compressed body.
    pub fn new(mut out: W) -> io::Result<Self> {
        out.write_all(&MAGIC)?;
        out.write_all(&[VERSION])?;
        Ok(TraceWriter {
            body: ZlibEncoder::new(out, Compression::default()),
        })
    }

    /// Appends one call record.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying writer, and `InvalidInput` for marker
    /// text longer than the format cap.
    pub fn write_call(&mut self, thread_id: u32, op: &CallOp) -> io::Result<()> {
        write_varint(&mut self.body, u64::from(thread_id))?;
        match op {
            CallOp::Clear { color } => {
                self.body.write_all(&[opcode::CLEAR])?;
                self.body.write_all(color)?;
            }
            CallOp::FillRect { x, y, w, h, color } => {
                self.body.write_all(&[opcode::FILL_RECT])?;
                for v in [x, y, w, h] {
                    write_varint(&mut self.body, u64::from(*v))?;
                }
                self.body.write_all(color)?;
            }
            CallOp::Present => self.body.write_all(&[opcode::PRESENT])?,
            CallOp::BindTarget { target } => {
                self.body.write_all(&[opcode::BIND_TARGET])?;
                write_varint(&mut self.body, u64::from(*target))?;
            }
            CallOp::FrameEnd => self.body.write_all(&[opcode::FRAME_END])?,
            CallOp::Viewport { width, height } => {
                self.body.write_all(&[opcode::VIEWPORT])?;
                write_varint(&mut self.body, u64::from(*width))?;
                write_varint(&mut self.body, u64::from(*height))?;
            }
            CallOp::Marker { text } => {
                if text.len() as u64 > MAX_MARKER_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("marker length {} exceeds cap {MAX_MARKER_LEN}", text.len()),
                    ));
                }
                self.body.write_all(&[opcode::MARKER])?;
                write_varint(&mut self.body, text.len() as u64)?;
                self.body.write_all(text.as_bytes())?;
            }
        }
        Ok(())
    }

    /// Flushes the compressed stream and returns the underlying writer.
    ///
    /// Dropping the writer without `finish` loses the zlib trailer, which a
    /// reader sees as a truncated body.
    pub fn finish(self) -> io::Result<W> {
        self.body.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_over_cap_is_rejected() {
        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        let text = "x".repeat(MAX_MARKER_LEN as usize + 1);
        let err = writer
            .write_call(0, &CallOp::Marker { text })
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn header_precedes_compressed_body() {
        let mut writer = TraceWriter::new(Vec::new()).unwrap();
        writer.write_call(0, &CallOp::Present).unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..4], &MAGIC);
        assert_eq!(bytes[4], VERSION);
        assert!(bytes.len() > 5);
    }
}
