//! Response (and request) body decompression. Decoded bytes accumulate in
//! an owned buffer the connection parser drains after every write, so the
//! decompressor never needs to call back into the parser. Compression-bomb
//! defenses: a hard per-write output cap, an output/input ratio limit and
//! a wall-clock time budget; the ratio and time checks run in the parser
//! after each drain.

use std::{
    io::Write,
    time::Instant,
};

/// Default max decompressed output for a single compressed input write.
const DEFAULT_BOMB_LIMIT: u64 = 1_048_576;
/// Default decompressed-to-compressed ratio that should not be exceeded.
const DEFAULT_BOMB_RATIO: u64 = 2048;
/// Default time budget for decompression, in microseconds.
const DEFAULT_TIME_LIMIT: u32 = 100_000;
/// Default number of writes between time-limit checks.
const DEFAULT_TIME_FREQ_TEST: u32 = 256;
/// Default number of encoding layers that will be decompressed.
const DEFAULT_LAYER_LIMIT: u32 = 2;

/// Decompression limits.
#[derive(Copy, Clone)]
pub struct Options {
    bomb_limit: u64,
    bomb_ratio: u64,
    time_limit: u32,
    time_test_freq: u32,
    layer_limit: Option<u32>,
}

impl Options {
    /// Get the output cap for a compression bomb.
    pub fn get_bomb_limit(&self) -> u64 {
        self.bomb_limit
    }

    /// Set the output cap for a compression bomb.
    pub fn set_bomb_limit(&mut self, bomb_limit: u64) {
        self.bomb_limit = bomb_limit;
    }

    /// Get the output/input bomb ratio.
    pub fn get_bomb_ratio(&self) -> u64 {
        self.bomb_ratio
    }

    /// Set the output/input bomb ratio.
    pub fn set_bomb_ratio(&mut self, bomb_ratio: u64) {
        self.bomb_ratio = bomb_ratio;
    }

    /// Get the decompression time budget in microseconds.
    pub fn get_time_limit(&self) -> u32 {
        self.time_limit
    }

    /// Set the decompression time budget in microseconds.
    pub fn set_time_limit(&mut self, time_limit: u32) {
        self.time_limit = time_limit;
    }

    /// Get the number of writes between time-limit checks.
    pub fn get_time_test_freq(&self) -> u32 {
        self.time_test_freq
    }

    /// Get the encoding layer limit.
    pub fn get_layer_limit(&self) -> Option<u32> {
        self.layer_limit
    }

    /// Set the encoding layer limit.
    pub fn set_layer_limit(&mut self, layer_limit: Option<u32>) {
        self.layer_limit = layer_limit;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bomb_limit: DEFAULT_BOMB_LIMIT,
            bomb_ratio: DEFAULT_BOMB_RATIO,
            time_limit: DEFAULT_TIME_LIMIT,
            time_test_freq: DEFAULT_TIME_FREQ_TEST,
            layer_limit: Some(DEFAULT_LAYER_LIMIT),
        }
    }
}

/// Body compression schemes the parser recognizes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ContentEncoding {
    /// No compression.
    None,
    /// Gzip-wrapped deflate.
    Gzip,
    /// Raw deflate.
    Deflate,
    /// Zlib-wrapped deflate.
    Zlib,
}

/// Capped output sink the decoders write into. Exceeding the cap fails the
/// write, which surfaces as a decompression failure (fatal for the
/// stream).
struct OutBuf {
    buf: Vec<u8>,
    limit: u64,
}

impl OutBuf {
    fn new(limit: u64) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }
}

impl Write for OutBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if (self.buf.len() as u64).saturating_add(data.len() as u64) > self.limit {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "decompression output limit exceeded",
            ));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

enum Stage {
    Gzip(Box<flate2::write::GzDecoder<OutBuf>>),
    Deflate(Box<flate2::write::DeflateDecoder<OutBuf>>),
    Zlib(Box<flate2::write::ZlibDecoder<OutBuf>>),
}

impl Stage {
    fn new(encoding: ContentEncoding, limit: u64) -> Option<Self> {
        match encoding {
            ContentEncoding::Gzip => Some(Stage::Gzip(Box::new(flate2::write::GzDecoder::new(
                OutBuf::new(limit),
            )))),
            ContentEncoding::Deflate => Some(Stage::Deflate(Box::new(
                flate2::write::DeflateDecoder::new(OutBuf::new(limit)),
            ))),
            ContentEncoding::Zlib => Some(Stage::Zlib(Box::new(
                flate2::write::ZlibDecoder::new(OutBuf::new(limit)),
            ))),
            ContentEncoding::None => None,
        }
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Stage::Gzip(inner) => inner.write_all(data),
            Stage::Deflate(inner) => inner.write_all(data),
            Stage::Zlib(inner) => inner.write_all(data),
        }
    }

    fn drain(&mut self) -> Vec<u8> {
        let out = match self {
            Stage::Gzip(inner) => inner.get_mut(),
            Stage::Deflate(inner) => inner.get_mut(),
            Stage::Zlib(inner) => inner.get_mut(),
        };
        std::mem::take(&mut out.buf)
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        let out = match self {
            Stage::Gzip(inner) => inner.finish()?,
            Stage::Deflate(inner) => inner.finish()?,
            Stage::Zlib(inner) => inner.finish()?,
        };
        Ok(out.buf)
    }
}

/// A chain of decompression stages. Wire bytes enter the first stage; each
/// stage's output feeds the next. Most messages have exactly one stage;
/// layered Content-Encoding values build longer chains.
pub struct Decompressor {
    stages: Vec<Stage>,
    /// Accumulated decompression time in microseconds.
    time_spent: u64,
    /// Number of writes performed, for the periodic time check.
    writes: u32,
    /// When set, input is passed through untouched (bomb downgrade).
    passthrough: bool,
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Decompressor")
            .field("stages", &self.stages.len())
            .field("time_spent", &self.time_spent)
            .field("passthrough", &self.passthrough)
            .finish()
    }
}

impl Decompressor {
    /// Build a single-stage decompressor for the given encoding. Returns
    /// `None` for [`ContentEncoding::None`].
    pub(crate) fn new(encoding: ContentEncoding, options: Options) -> Option<Self> {
        Stage::new(encoding, options.get_bomb_limit()).map(|stage| Self {
            stages: vec![stage],
            time_spent: 0,
            writes: 0,
            passthrough: false,
        })
    }

    /// Insert a stage in front of the chain, so the new encoding is the
    /// first applied to wire bytes. Building a chain from a
    /// Content-Encoding list in header order means prepending each listed
    /// encoding in turn.
    pub(crate) fn prepend(&mut self, encoding: ContentEncoding, options: Options) {
        if let Some(stage) = Stage::new(encoding, options.get_bomb_limit()) {
            self.stages.insert(0, stage);
        }
    }

    /// Feed compressed bytes through every stage, returning the decoded
    /// output produced so far.
    pub(crate) fn decompress(&mut self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        if self.passthrough {
            return Ok(data.to_vec());
        }
        let before = Instant::now();
        self.writes = self.writes.wrapping_add(1);
        let mut cur = data.to_vec();
        for stage in &mut self.stages {
            stage.write_all(&cur)?;
            cur = stage.drain();
        }
        self.time_spent = self
            .time_spent
            .wrapping_add(before.elapsed().as_micros() as u64);
        Ok(cur)
    }

    /// Close every stage, returning any remaining decoded bytes.
    pub(crate) fn finish(self) -> std::io::Result<Vec<u8>> {
        if self.passthrough {
            return Ok(Vec::new());
        }
        let mut carry: Vec<u8> = Vec::new();
        for stage in self.stages {
            let mut stage = stage;
            if !carry.is_empty() {
                stage.write_all(&carry)?;
            }
            carry = stage.finish()?;
        }
        Ok(carry)
    }

    /// Microseconds spent decompressing so far.
    pub(crate) fn time_spent(&self) -> u64 {
        self.time_spent
    }

    /// Number of writes performed so far.
    pub(crate) fn writes(&self) -> u32 {
        self.writes
    }

    /// Stop decompressing and hand input through untouched. Used when a
    /// bomb limit trips but the stream should still be followed.
    pub(crate) fn set_passthrough(&mut self, passthrough: bool) {
        self.passthrough = passthrough;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn gzipped(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gzip_round_trip() {
        let compressed = gzipped(b"Hello World!");
        let mut d = Decompressor::new(ContentEncoding::Gzip, Options::default()).unwrap();
        let mut out = d.decompress(&compressed).unwrap();
        out.extend(d.finish().unwrap());
        assert_eq!(out, b"Hello World!");
    }

    #[test]
    fn gzip_split_input() {
        let compressed = gzipped(b"Hello World!");
        let (a, b) = compressed.split_at(compressed.len() / 2);
        let mut d = Decompressor::new(ContentEncoding::Gzip, Options::default()).unwrap();
        let mut out = d.decompress(a).unwrap();
        out.extend(d.decompress(b).unwrap());
        out.extend(d.finish().unwrap());
        assert_eq!(out, b"Hello World!");
    }

    #[test]
    fn garbage_input_fails() {
        let mut d = Decompressor::new(ContentEncoding::Zlib, Options::default()).unwrap();
        assert!(d.decompress(b"definitely not zlib data").is_err());
    }

    #[test]
    fn output_cap_trips() {
        let data = vec![b'A'; 4096];
        let compressed = gzipped(&data);
        let mut options = Options::default();
        options.set_bomb_limit(16);
        let mut d = Decompressor::new(ContentEncoding::Gzip, options).unwrap();
        assert!(d
            .decompress(&compressed)
            .and_then(|_| d.finish())
            .is_err());
    }

    #[test]
    fn passthrough_copies_input() {
        let mut d = Decompressor::new(ContentEncoding::Gzip, Options::default()).unwrap();
        d.set_passthrough(true);
        assert_eq!(d.decompress(b"raw bytes").unwrap(), b"raw bytes");
    }
}
