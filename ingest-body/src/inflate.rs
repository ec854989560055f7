//! Pooled gzip and zlib decompression.
//!
//! flate2's stream decoders allocate their inflate state on construction and cannot be reused
//! across requests. [`Inflater`] keeps the raw inflate state together with an input buffer so that
//! both can be pooled, and [`InflateReader`] drives it for a single request body. Gzip framing is
//! handled here, including concatenated members.

use std::fmt;
use std::io::{self, BufRead, Read};

use flate2::{Crc, Decompress, DecompressError, FlushDecompress, Status};
use ingest_common::Reset;

/// Size of the buffer holding compressed input.
const INPUT_BUFFER_SIZE: usize = 32 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_METHOD_DEFLATE: u8 = 8;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;
const FRESERVED: u8 = 0xe0;

/// Describes why a compressed stream could not be decoded.
///
/// Returned as the inner error of [`io::ErrorKind::InvalidData`] errors, which distinguishes them
/// from errors of the underlying reader.
#[derive(Debug, thiserror::Error)]
pub enum InvalidStream {
    /// The gzip member header is malformed.
    #[error("invalid gzip header")]
    Header,
    /// The CRC32 or size in the gzip trailer does not match the decompressed data.
    #[error("gzip checksum mismatch")]
    Checksum,
    /// The stream ended before the end of the compressed data.
    #[error("unexpected end of compressed stream")]
    Truncated,
    /// The deflate data is corrupt.
    #[error("corrupt deflate stream")]
    Inflate(#[source] DecompressError),
}

fn invalid(reason: InvalidStream) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason)
}

fn eof_as(reason: InvalidStream) -> impl FnOnce(io::Error) -> io::Error {
    move |error| match error.kind() {
        io::ErrorKind::UnexpectedEof => invalid(reason),
        _ => error,
    }
}

/// Reusable decompression state.
pub struct Inflater {
    state: Decompress,
    crc: Crc,
    input: Box<[u8]>,
}

impl Inflater {
    /// Creates a new inflater with an empty state.
    pub fn new() -> Self {
        Self {
            state: Decompress::new(false),
            crc: Crc::new(),
            input: vec![0; INPUT_BUFFER_SIZE].into_boxed_slice(),
        }
    }
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Reset for Inflater {
    fn reset(&mut self) {
        self.state.reset(false);
        self.crc.reset();
    }
}

impl fmt::Debug for Inflater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inflater")
            .field("total_in", &self.state.total_in())
            .field("total_out", &self.state.total_out())
            .finish_non_exhaustive()
    }
}

/// Buffered reader over compressed input, backed by the inflater's input buffer.
struct Input<'a, R> {
    reader: R,
    buf: &'a mut [u8],
    pos: usize,
    filled: usize,
}

impl<R: Read> Read for Input<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for Input<'_, R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.filled {
            self.filled = loop {
                match self.reader.read(self.buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
            self.pos = 0;
        }

        Ok(&self.buf[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

/// Skips a zero-terminated string in a gzip header.
fn skip_zero_terminated(input: &mut impl BufRead) -> io::Result<()> {
    loop {
        let buf = input.fill_buf()?;
        if buf.is_empty() {
            return Err(invalid(InvalidStream::Header));
        }

        match buf.iter().position(|&b| b == 0) {
            Some(index) => {
                input.consume(index + 1);
                return Ok(());
            }
            None => {
                let len = buf.len();
                input.consume(len);
            }
        }
    }
}

/// Reads a gzip member header as specified in RFC 1952.
///
/// Optional fields are skipped. The header CRC is not verified.
fn read_gzip_header(input: &mut impl BufRead) -> io::Result<()> {
    let mut header = [0; 10];
    input
        .read_exact(&mut header)
        .map_err(eof_as(InvalidStream::Header))?;

    if header[..2] != GZIP_MAGIC || header[2] != GZIP_METHOD_DEFLATE {
        return Err(invalid(InvalidStream::Header));
    }

    let flags = header[3];
    if flags & FRESERVED != 0 {
        return Err(invalid(InvalidStream::Header));
    }

    if flags & FEXTRA != 0 {
        let mut len = [0; 2];
        input
            .read_exact(&mut len)
            .map_err(eof_as(InvalidStream::Header))?;

        let len = u64::from(u16::from_le_bytes(len));
        let skipped = io::copy(&mut (&mut *input).take(len), &mut io::sink())?;
        if skipped != len {
            return Err(invalid(InvalidStream::Header));
        }
    }

    if flags & FNAME != 0 {
        skip_zero_terminated(input)?;
    }

    if flags & FCOMMENT != 0 {
        skip_zero_terminated(input)?;
    }

    if flags & FHCRC != 0 {
        let mut crc = [0; 2];
        input
            .read_exact(&mut crc)
            .map_err(eof_as(InvalidStream::Header))?;
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Stage {
    Header,
    Body,
    Trailer,
    Done,
}

/// Decompresses a gzip or zlib stream using a pooled [`Inflater`].
///
/// Corrupt input yields [`io::ErrorKind::InvalidData`] errors carrying an [`InvalidStream`]. All
/// other errors originate from the underlying reader.
pub struct InflateReader<'a, R> {
    input: Input<'a, R>,
    state: &'a mut Decompress,
    crc: &'a mut Crc,
    gzip: bool,
    stage: Stage,
}

impl<'a, R: Read> InflateReader<'a, R> {
    /// Creates a reader for a gzip stream.
    pub fn gzip(reader: R, inflater: &'a mut Inflater) -> Self {
        Self::new(reader, inflater, true)
    }

    /// Creates a reader for a zlib stream, which is the `deflate` content encoding in HTTP.
    pub fn zlib(reader: R, inflater: &'a mut Inflater) -> Self {
        Self::new(reader, inflater, false)
    }

    fn new(reader: R, inflater: &'a mut Inflater, gzip: bool) -> Self {
        let Inflater { state, crc, input } = inflater;
        state.reset(!gzip);
        crc.reset();

        Self {
            input: Input {
                reader,
                buf: input,
                pos: 0,
                filled: 0,
            },
            state,
            crc,
            gzip,
            stage: if gzip { Stage::Header } else { Stage::Body },
        }
    }

    /// Inflates into `out`, returning the number of bytes written and whether the deflate stream
    /// has ended.
    fn inflate(&mut self, out: &mut [u8]) -> io::Result<(usize, bool)> {
        loop {
            let input = self.input.fill_buf()?;
            let eof = input.is_empty();

            let before_in = self.state.total_in();
            let before_out = self.state.total_out();
            let flush = match eof {
                true => FlushDecompress::Finish,
                false => FlushDecompress::None,
            };

            let status = self
                .state
                .decompress(input, out, flush)
                .map_err(|e| invalid(InvalidStream::Inflate(e)))?;

            let consumed = (self.state.total_in() - before_in) as usize;
            let written = (self.state.total_out() - before_out) as usize;
            self.input.consume(consumed);

            if self.gzip {
                self.crc.update(&out[..written]);
            }

            match status {
                Status::StreamEnd => return Ok((written, true)),
                _ if written > 0 => return Ok((written, false)),
                _ if eof => return Err(invalid(InvalidStream::Truncated)),
                _ => continue,
            }
        }
    }

    fn check_trailer(&mut self) -> io::Result<()> {
        let mut trailer = [0; 8];
        self.input
            .read_exact(&mut trailer)
            .map_err(eof_as(InvalidStream::Truncated))?;

        let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        if crc != self.crc.sum() || size != self.crc.amount() {
            return Err(invalid(InvalidStream::Checksum));
        }

        Ok(())
    }
}

impl<R: Read> Read for InflateReader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            match self.stage {
                Stage::Header => {
                    read_gzip_header(&mut self.input)?;
                    self.state.reset(false);
                    self.crc.reset();
                    self.stage = Stage::Body;
                }
                Stage::Body => {
                    let (written, done) = self.inflate(out)?;
                    if done {
                        self.stage = match self.gzip {
                            true => Stage::Trailer,
                            false => Stage::Done,
                        };
                    }
                    if written > 0 {
                        return Ok(written);
                    }
                }
                Stage::Trailer => {
                    self.check_trailer()?;
                    // Another member may follow.
                    self.stage = match self.input.fill_buf()?.is_empty() {
                        true => Stage::Done,
                        false => Stage::Header,
                    };
                }
                Stage::Done => return Ok(0),
            }
        }
    }
}
