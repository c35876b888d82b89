// UTF-8 DFA tables derived from the design by Bjoern Hoehrmann,
// http://bjoern.hoehrmann.de/utf-8/decoder/dfa/.

use crate::{
    bstr::Bstr,
    config::{DecoderConfig, Unwanted},
    unicode_bestfit_map::UnicodeBestfitMap,
    util::{FlagOps, Flags},
};

#[rustfmt::skip]
static UTF8D: [u8; 400] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    0xa, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x4, 0x3, 0x3, 0xb, 0x6, 0x6,
    0x6, 0x5, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0, 0x1, 0x2, 0x3, 0x5, 0x8,
    0x7, 0x1, 0x1, 0x1, 0x4, 0x6, 0x1, 0x1, 0x1, 0x1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1, 1, 1, 3, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1,
    1, 1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];
#[rustfmt::skip]
static UTF8D_ALLOW_OVERLONG: [u8; 400] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x3, 0x4, 0x3, 0x3, 0x6, 0x6, 0x6,
    0x6, 0x5, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0x8, 0, 0x1, 0x2, 0x3, 0x5, 0x8,
    0x7, 0x1, 0x1, 0x1, 0x4, 0x6, 0x1, 0x1, 0x1, 0x1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 0, 1, 1, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1, 1, 1, 3, 1, 1, 1, 1, 1, 3, 1, 3, 1, 1, 1, 1, 1,
    1, 1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

/// Streaming UTF-8 decoder feeding the best-fit mapper. Invalid sequences
/// are replaced with the configured replacement byte and decoding resumes
/// at the next byte; the stream is never aborted.
pub(crate) struct Utf8Decoder {
    bestfit_map: UnicodeBestfitMap,
    state: u32,
    seq: u32,
    codepoint: u32,
    pub(crate) flags: u64,
    pub(crate) seen_valid: bool,
    pub(crate) decoded_bytes: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn new(bestfit_map: UnicodeBestfitMap) -> Self {
        Self {
            bestfit_map,
            state: 0,
            seq: 0,
            codepoint: 0,
            flags: 0,
            seen_valid: false,
            decoded_bytes: Vec::new(),
        }
    }

    /// Feed one byte through the DFA, emitting decoded output when a code
    /// point completes or an invalid sequence is recognized.
    fn decode_byte(&mut self, encoded_byte: u8, is_last_byte: bool) {
        self.seq = self.seq.wrapping_add(1);
        self.advance_dfa(encoded_byte as u32);
        match self.state {
            0 => {
                if self.seq == 1 {
                    // Plain ASCII, copied through.
                    self.decoded_bytes.push(self.codepoint as u8);
                } else {
                    self.seen_valid = true;
                    // The overlong forms the permissive table accepted
                    // still get flagged.
                    if (self.seq == 2 && self.codepoint < 0x80)
                        || (self.seq == 3 && self.codepoint < 0x800)
                        || (self.seq == 4 && self.codepoint < 0x10000)
                    {
                        self.flags.set(Flags::PATH_UTF8_OVERLONG);
                    }
                    if (0xff00..=0xffef).contains(&self.codepoint) {
                        self.flags.set(Flags::PATH_HALF_FULL_RANGE);
                    }
                    self.decoded_bytes.push(self.bestfit_codepoint());
                }
                self.seq = 0;
            }
            1 => {
                self.flags.set(Flags::PATH_UTF8_INVALID);
                // Emit the replacement byte. If the offending byte began a
                // sequence, consume it; otherwise re-run it as the start of
                // the next character.
                self.state = 0;
                self.codepoint = 0;
                self.decoded_bytes.push(self.bestfit_map.replacement_byte);
                if self.seq != 1 {
                    self.seq = 0;
                    self.decode_byte(encoded_byte, is_last_byte);
                } else {
                    self.seq = 0;
                }
            }
            _ => {
                if is_last_byte {
                    // Input ended mid-sequence; one replacement byte per
                    // byte already consumed into the unfinished sequence.
                    for _ in 1..self.seq {
                        self.decoded_bytes.push(self.bestfit_map.replacement_byte);
                    }
                }
            }
        }
    }

    fn advance_dfa(&mut self, byte: u32) {
        let class = UTF8D_ALLOW_OVERLONG[byte as usize] as u32;
        self.codepoint = if self.state != 0 {
            (byte & 0x3f) | (self.codepoint << 6)
        } else {
            (0xff >> class) & byte
        };
        self.state = UTF8D[(256u32)
            .wrapping_add(self.state.wrapping_mul(16))
            .wrapping_add(class) as usize] as u32;
    }

    /// Run the whole input through the decoder, resetting prior state.
    fn decode_and_validate(&mut self, input: &[u8]) {
        self.state = 0;
        self.seq = 0;
        self.codepoint = 0;
        self.flags = 0;
        self.seen_valid = false;
        self.decoded_bytes.clear();
        self.decoded_bytes.reserve(input.len());
        let last = input.len();
        for (i, byte) in input.iter().enumerate() {
            self.decode_byte(*byte, i + 1 == last);
        }
        if self.seen_valid && !self.flags.is_set(Flags::PATH_UTF8_INVALID) {
            self.flags.set(Flags::PATH_UTF8_VALID);
        }
    }

    fn bestfit_codepoint(&self) -> u8 {
        if self.codepoint < 0x100 {
            return self.codepoint as u8;
        }
        self.bestfit_map.get(self.codepoint)
    }
}

/// Validate (and, if configured, best-fit convert) a UTF-8 path in place.
/// Flags for invalid and overlong sequences are raised on the caller's flag
/// set either way; the path bytes are only replaced when
/// `utf8_convert_bestfit` is enabled.
pub(crate) fn decode_and_validate_inplace(
    cfg: &DecoderConfig, flags: &mut u64, status: &mut Unwanted, path: &mut Bstr,
) {
    let mut decoder = Utf8Decoder::new(cfg.bestfit_map);
    decoder.decode_and_validate(path.as_slice());
    if cfg.utf8_convert_bestfit {
        path.clear();
        path.add(decoder.decoded_bytes.as_slice());
    }
    flags.set(decoder.flags);
    if flags.is_set(Flags::PATH_UTF8_INVALID) && cfg.utf8_invalid_unwanted != Unwanted::Ignore {
        *status = cfg.utf8_invalid_unwanted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DecoderCtx};
    use rstest::rstest;

    #[rstest]
    #[case(b"\xf1.\xf1\xef\xbd\x9dabcd", "?.?}abcd")]
    #[case::invalid_incomplete_seq(b"\xf0\x90\x8d\xff", "??")]
    #[case::truncated_tail(b"\xe2\x82", "?")]
    #[case::invalid_continuation(b"\xc2\xff\xf0", "??")]
    #[case::invalid_mid_seq(b"\xf0\x90\x28\xbc", "?(?")]
    fn test_decode_and_validate_inplace(#[case] input: &[u8], #[case] expected: &str) {
        let mut cfg = Config::default();
        cfg.set_utf8_convert_bestfit(DecoderCtx::UrlPath, true);
        let mut path = Bstr::from(input);
        let mut flags = 0;
        let mut status = Unwanted::Ignore;
        decode_and_validate_inplace(
            cfg.decoder_cfg(DecoderCtx::UrlPath),
            &mut flags,
            &mut status,
            &mut path,
        );
        assert_eq!(path, Bstr::from(expected));
        assert!(flags.is_set(Flags::PATH_UTF8_INVALID));
    }

    #[test]
    fn valid_utf8_flag() {
        let cfg = Config::default();
        let mut path = Bstr::from("/\u{0100}bc".as_bytes());
        let mut flags = 0;
        let mut status = Unwanted::Ignore;
        decode_and_validate_inplace(
            cfg.decoder_cfg(DecoderCtx::UrlPath),
            &mut flags,
            &mut status,
            &mut path,
        );
        assert!(flags.is_set(Flags::PATH_UTF8_VALID));
        // Conversion disabled by default, path untouched.
        assert_eq!(path, Bstr::from("/\u{0100}bc".as_bytes()));
    }
}
