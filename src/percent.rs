//! Percent- and %u-decoding for URI components, with the configurable
//! policies (invalid-encoding handling, NUL termination, separator
//! handling, best-fit mapping) security tooling needs to mirror a target
//! server's behavior.

use crate::{
    bstr::Bstr,
    config::{DecoderConfig, Unwanted, UrlEncodingHandling},
    error::Result,
    util::{FlagOps, Flags},
};
use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take, take_while_m_n},
    character::complete::char,
    combinator::{map, not},
    multi::fold_many0,
    number::complete::be_u8,
    sequence::tuple,
    IResult,
};

/// Convert two hexadecimal characters into one byte. Happily converts
/// invalid input; validity is the caller's concern.
fn x2c(input: &[u8]) -> IResult<&[u8], u8> {
    let (input, (c1, c2)) = tuple((be_u8, be_u8))(input)?;
    let hi = if c1 >= b'A' {
        ((c1 & 0xdf) - b'A') + 10
    } else {
        c1.wrapping_sub(b'0')
    };
    let lo = if c2 >= b'A' {
        ((c2 & 0xdf) - b'A') + 10
    } else {
        c2.wrapping_sub(b'0')
    };
    Ok((input, hi.wrapping_mul(16).wrapping_add(lo)))
}

/// One decoded byte plus everything the caller needs to act on it.
struct DecodedByte {
    byte: u8,
    expected_status_code: Unwanted,
    flags: u64,
    /// Whether the byte goes into the output at all.
    emit: bool,
}

/// Decode the four hex digits of a path %u sequence, applying the best-fit
/// map when both bytes are used.
fn path_decode_u_hex<'a>(
    i: &'a [u8], cfg: &DecoderConfig,
) -> IResult<&'a [u8], (u8, u64, Unwanted)> {
    let mut flags = 0;
    let mut expected_status_code = Unwanted::Ignore;
    let (i, c1) = x2c(i)?;
    let (i, c2) = x2c(i)?;
    let mut byte = c2;
    if c1 == 0 {
        flags.set(Flags::PATH_OVERLONG_U);
    } else {
        if c1 == 0xff {
            flags.set(Flags::PATH_HALF_FULL_RANGE);
        }
        expected_status_code = cfg.u_encoding_unwanted;
        byte = cfg.bestfit_map.get(bestfit_key!(c1, c2));
    }
    if byte == b'/' || (cfg.backslash_convert_slashes && byte == b'\\') {
        flags.set(Flags::PATH_ENCODED_SEPARATOR);
        if cfg.path_separators_encoded_unwanted != Unwanted::Ignore {
            expected_status_code = cfg.path_separators_encoded_unwanted;
        }
    }
    Ok((i, (byte, flags, expected_status_code)))
}

/// Decode the four hex digits of a non-path %u sequence.
fn decode_u_hex<'a>(i: &'a [u8], cfg: &DecoderConfig) -> IResult<&'a [u8], (u8, u64)> {
    let (i, c1) = x2c(i)?;
    let (i, c2) = x2c(i)?;
    let mut flags = 0;
    if c1 == 0 {
        flags.set(Flags::URLEN_OVERLONG_U);
        return Ok((i, (c2, flags)));
    }
    if c1 == 0xff && c2 <= 0xef {
        flags.set(Flags::URLEN_HALF_FULL_RANGE);
    }
    Ok((i, (cfg.bestfit_map.get(bestfit_key!(c1, c2)), flags)))
}

/// Apply control-character and backslash/lowercase policy to an already
/// decoded path byte.
fn path_decode_control(mut byte: u8, cfg: &DecoderConfig) -> (u8, Unwanted) {
    let expected_status_code = if byte < 0x20 {
        cfg.control_chars_unwanted
    } else {
        Unwanted::Ignore
    };
    if byte == b'\\' && cfg.backslash_convert_slashes {
        byte = b'/';
    }
    if cfg.convert_lowercase {
        byte = byte.to_ascii_lowercase();
    }
    (byte, expected_status_code)
}

/// Path decoder: a valid %uHHHH sequence.
fn path_percent_u_valid(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |remaining_input| {
        let (left, _) = tag_no_case("u")(remaining_input)?;
        let mut output = remaining_input;
        let mut byte = b'%';
        let mut flags = 0;
        let mut expected_status_code = Unwanted::Ignore;
        if cfg.u_encoding_decode {
            let (left, hex) = take_while_m_n(4, 4, |c: u8| c.is_ascii_hexdigit())(left)?;
            output = left;
            expected_status_code = cfg.u_encoding_unwanted;
            let (_, (b, f, c)) = path_decode_u_hex(hex, cfg)?;
            byte = b;
            flags.set(f);
            if c != Unwanted::Ignore {
                expected_status_code = c;
            }
            if byte == 0 {
                flags.set(Flags::PATH_ENCODED_NUL);
                if cfg.nul_encoded_unwanted != Unwanted::Ignore {
                    expected_status_code = cfg.nul_encoded_unwanted;
                }
                if cfg.nul_encoded_terminates {
                    // Terminate the path at the encoded NUL byte.
                    return Ok((
                        b"",
                        DecodedByte {
                            byte,
                            expected_status_code,
                            flags,
                            emit: false,
                        },
                    ));
                }
            }
        }
        let (byte, code) = path_decode_control(byte, cfg);
        if code != Unwanted::Ignore {
            expected_status_code = code;
        }
        Ok((
            output,
            DecodedByte {
                byte,
                expected_status_code,
                flags,
                emit: true,
            },
        ))
    }
}

/// Path decoder: a %u sequence whose four following bytes are not all hex.
fn path_percent_u_invalid(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |remaining_input| {
        let mut output = remaining_input;
        let mut byte = b'%';
        let mut flags = 0;
        let mut expected_status_code = Unwanted::Ignore;
        let (left, _) = tag_no_case("u")(remaining_input)?;
        if cfg.u_encoding_decode {
            let (left, hex) = take(4usize)(left)?;
            flags = Flags::PATH_INVALID_ENCODING;
            expected_status_code = cfg.url_encoding_invalid_unwanted;
            if cfg.url_encoding_invalid_handling == UrlEncodingHandling::RemovePercent {
                // Consume the percent, emit nothing.
                return Ok((
                    remaining_input,
                    DecodedByte {
                        byte,
                        expected_status_code,
                        flags,
                        emit: false,
                    },
                ));
            } else if cfg.url_encoding_invalid_handling == UrlEncodingHandling::ProcessInvalid {
                let (_, (b, f, c)) = path_decode_u_hex(hex, cfg)?;
                if c != Unwanted::Ignore {
                    expected_status_code = c;
                }
                flags.set(f);
                byte = b;
                output = left;
            }
        }
        let (byte, code) = path_decode_control(byte, cfg);
        if code != Unwanted::Ignore {
            expected_status_code = code;
        }
        Ok((
            output,
            DecodedByte {
                byte,
                expected_status_code,
                flags,
                emit: true,
            },
        ))
    }
}

/// Path decoder: a valid %HH sequence.
fn path_percent_hex_valid(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |remaining_input| {
        let original_remaining = remaining_input;
        not(tag_no_case("u"))(remaining_input)?;
        let (mut left, hex) = take_while_m_n(2, 2, |c: u8| c.is_ascii_hexdigit())(remaining_input)?;
        let mut flags = 0;
        let (_, mut byte) = x2c(hex)?;
        if byte == 0 {
            flags.set(Flags::PATH_ENCODED_NUL);
            if cfg.nul_encoded_terminates {
                return Ok((
                    b"",
                    DecodedByte {
                        byte,
                        expected_status_code: cfg.nul_encoded_unwanted,
                        flags,
                        emit: false,
                    },
                ));
            }
        }
        let mut sep_code = Unwanted::Ignore;
        if byte == b'/' || (cfg.backslash_convert_slashes && byte == b'\\') {
            flags.set(Flags::PATH_ENCODED_SEPARATOR);
            sep_code = cfg.path_separators_encoded_unwanted;
            if !cfg.path_separators_decode {
                // Leave the separator encoded.
                byte = b'%';
                left = original_remaining;
            }
        }
        let (byte, mut expected_status_code) = path_decode_control(byte, cfg);
        if expected_status_code == Unwanted::Ignore {
            expected_status_code = sep_code;
        }
        Ok((
            left,
            DecodedByte {
                byte,
                expected_status_code,
                flags,
                emit: true,
            },
        ))
    }
}

/// Path decoder: a percent followed by two bytes that are not both hex.
fn path_percent_hex_invalid(
    cfg: &DecoderConfig,
) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |remaining_input| {
        let mut remaining = remaining_input;
        not(tag_no_case("u"))(remaining_input)?;
        let (left, hex) = take(2usize)(remaining_input)?;
        let mut byte = b'%';
        let flags = Flags::PATH_INVALID_ENCODING;
        let expected_status_code = cfg.url_encoding_invalid_unwanted;
        if cfg.url_encoding_invalid_handling == UrlEncodingHandling::RemovePercent {
            return Ok((
                remaining_input,
                DecodedByte {
                    byte,
                    expected_status_code,
                    flags,
                    emit: false,
                },
            ));
        } else if cfg.url_encoding_invalid_handling == UrlEncodingHandling::ProcessInvalid {
            let (_, b) = x2c(hex)?;
            remaining = left;
            byte = b;
        }
        let (byte, expected_status_code2) = path_decode_control(byte, cfg);
        let expected_status_code = if expected_status_code2 != Unwanted::Ignore {
            expected_status_code2
        } else {
            expected_status_code
        };
        Ok((
            remaining,
            DecodedByte {
                byte,
                expected_status_code,
                flags,
                emit: true,
            },
        ))
    }
}

/// Path decoder entry for a '%': tries the %u and %HH shapes from most to
/// least specific, falling back to the invalid-encoding policies.
fn path_percent(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |i| {
        map(
            tuple((
                char('%'),
                alt((
                    path_percent_u_valid(cfg),
                    path_percent_u_invalid(cfg),
                    move |remaining_input| {
                        // A %u with fewer than four bytes after it.
                        let (_, _) = tag_no_case("u")(remaining_input)?;
                        Ok((
                            remaining_input,
                            DecodedByte {
                                byte: b'%',
                                expected_status_code: cfg.url_encoding_invalid_unwanted,
                                flags: Flags::PATH_INVALID_ENCODING,
                                emit: cfg.url_encoding_invalid_handling
                                    != UrlEncodingHandling::RemovePercent,
                            },
                        ))
                    },
                    path_percent_hex_valid(cfg),
                    path_percent_hex_invalid(cfg),
                    move |remaining_input| {
                        // A percent with fewer than two bytes after it.
                        Ok((
                            remaining_input,
                            DecodedByte {
                                byte: b'%',
                                expected_status_code: cfg.url_encoding_invalid_unwanted,
                                flags: Flags::PATH_INVALID_ENCODING,
                                emit: cfg.url_encoding_invalid_handling
                                    != UrlEncodingHandling::RemovePercent,
                            },
                        ))
                    },
                )),
            )),
            |(_, result)| result,
        )(i)
    }
}

/// Path decoder for one unencoded byte; handles raw NULs per policy.
fn path_plain_byte(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |i| {
        let (remaining_input, byte) = be_u8(i)?;
        if byte == 0 && cfg.nul_raw_terminates {
            // Terminate the path at the raw NUL byte.
            return Ok((
                b"",
                DecodedByte {
                    byte,
                    expected_status_code: cfg.nul_raw_unwanted,
                    flags: 0,
                    emit: false,
                },
            ));
        }
        let (byte, expected_status_code) = path_decode_control(byte, cfg);
        Ok((
            remaining_input,
            DecodedByte {
                byte,
                expected_status_code,
                flags: 0,
                emit: true,
            },
        ))
    }
}

/// Decode a whole path under the configured policies.
///
/// Returns the decoded bytes, the accumulated flags, and the expected
/// server status code, if any.
fn path_decode<'a>(
    input: &'a [u8], cfg: &DecoderConfig,
) -> IResult<&'a [u8], (Vec<u8>, u64, Unwanted)> {
    fold_many0(
        alt((path_percent(cfg), path_plain_byte(cfg))),
        || (Vec::new(), 0, Unwanted::Ignore),
        |mut acc: (Vec<_>, u64, Unwanted), decoded| {
            if decoded.emit {
                if decoded.byte == b'/' && cfg.path_separators_compress {
                    if acc.0.last() != Some(&b'/') {
                        acc.0.push(decoded.byte);
                    }
                } else {
                    acc.0.push(decoded.byte);
                }
            }
            acc.1.set(decoded.flags);
            acc.2 = decoded.expected_status_code;
            acc
        },
    )(input)
}

/// Decode the parsed URI path in place under the path-context policies.
pub(crate) fn path_decode_inplace(
    cfg: &DecoderConfig, flags: &mut u64, status: &mut Unwanted, path: &mut Bstr,
) {
    if let Ok((_, (decoded, f, expected_status_code))) = path_decode(path.as_slice(), cfg) {
        path.clear();
        path.add(decoded.as_slice());
        *status = expected_status_code;
        flags.set(f);
    }
}

/// General decoder: a valid %uHHHH sequence, e.g. "u0064" -> "d".
fn percent_u_valid(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |input| {
        let (left, _) = alt((char('u'), char('U')))(input)?;
        if cfg.u_encoding_decode {
            let (input, hex) = take_while_m_n(4, 4, |c: u8| c.is_ascii_hexdigit())(left)?;
            let (_, (byte, flags)) = decode_u_hex(hex, cfg)?;
            return Ok((
                input,
                DecodedByte {
                    byte,
                    expected_status_code: cfg.u_encoding_unwanted,
                    flags,
                    emit: true,
                },
            ));
        }
        Ok((
            input,
            DecodedByte {
                byte: b'%',
                expected_status_code: Unwanted::Ignore,
                flags: 0,
                emit: true,
            },
        ))
    }
}

/// General decoder: a %u without four hex digits after it.
fn percent_u_invalid(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |mut input| {
        let (left, _) = alt((char('u'), char('U')))(input)?;
        let mut byte = b'%';
        let mut code = Unwanted::Ignore;
        let mut flags = 0;
        let mut emit = true;
        if cfg.u_encoding_decode {
            let (left, invalid_hex) = take(4usize)(left)?;
            flags.set(Flags::URLEN_INVALID_ENCODING);
            code = if cfg.url_encoding_invalid_unwanted != Unwanted::Ignore {
                cfg.url_encoding_invalid_unwanted
            } else {
                cfg.u_encoding_unwanted
            };
            if cfg.url_encoding_invalid_handling == UrlEncodingHandling::RemovePercent {
                emit = false;
            } else if cfg.url_encoding_invalid_handling == UrlEncodingHandling::ProcessInvalid {
                let (_, (b, f)) = decode_u_hex(invalid_hex, cfg)?;
                flags.set(f);
                byte = b;
                input = left;
            }
        }
        Ok((
            input,
            DecodedByte {
                byte,
                expected_status_code: code,
                flags,
                emit,
            },
        ))
    }
}

/// General decoder: a valid %HH sequence, e.g. "2f" -> "/".
fn percent_hex_valid() -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> {
    move |input| {
        not(alt((char('u'), char('U'))))(input)?;
        let (input, hex) = take_while_m_n(2, 2, |c: u8| c.is_ascii_hexdigit())(input)?;
        let (_, byte) = x2c(hex)?;
        Ok((
            input,
            DecodedByte {
                byte,
                expected_status_code: Unwanted::Ignore,
                flags: 0,
                emit: true,
            },
        ))
    }
}

/// General decoder: a percent followed by two bytes that are not both hex.
fn percent_hex_invalid(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |mut input| {
        not(alt((char('u'), char('U'))))(input)?;
        let mut byte = b'%';
        let mut emit = true;
        if cfg.url_encoding_invalid_handling == UrlEncodingHandling::RemovePercent {
            emit = false;
        } else if cfg.url_encoding_invalid_handling == UrlEncodingHandling::ProcessInvalid {
            let (left, b) = x2c(input)?;
            input = left;
            byte = b;
        }
        Ok((
            input,
            DecodedByte {
                byte,
                expected_status_code: cfg.url_encoding_invalid_unwanted,
                flags: Flags::URLEN_INVALID_ENCODING,
                emit,
            },
        ))
    }
}

/// General decoder entry for a '%'.
fn percent(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |i| {
        let (input, _) = char('%')(i)?;
        let (input, decoded) = alt((
            percent_u_valid(cfg),
            percent_u_invalid(cfg),
            percent_hex_valid(),
            percent_hex_invalid(cfg),
            move |input| {
                // Not even two bytes of data after the percent.
                Ok((
                    input,
                    DecodedByte {
                        byte: b'%',
                        expected_status_code: cfg.url_encoding_invalid_unwanted,
                        flags: Flags::URLEN_INVALID_ENCODING,
                        emit: cfg.url_encoding_invalid_handling
                            != UrlEncodingHandling::RemovePercent,
                    },
                ))
            },
        ))(input)?;
        if decoded.byte == 0 {
            let flags = decoded.flags | Flags::URLEN_ENCODED_NUL;
            let mut expected_status_code = decoded.expected_status_code;
            if cfg.nul_encoded_unwanted != Unwanted::Ignore {
                expected_status_code = cfg.nul_encoded_unwanted;
            }
            if cfg.nul_encoded_terminates {
                return Ok((
                    b"",
                    DecodedByte {
                        byte: decoded.byte,
                        expected_status_code,
                        flags,
                        emit: false,
                    },
                ));
            }
            return Ok((
                input,
                DecodedByte {
                    byte: decoded.byte,
                    expected_status_code,
                    flags,
                    emit: decoded.emit,
                },
            ));
        }
        Ok((input, decoded))
    }
}

/// General decoder: '+' decodes to space when configured.
fn plus(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |input| {
        let (input, byte) = map(char('+'), |byte| {
            if cfg.plusspace_decode {
                0x20
            } else {
                byte as u8
            }
        })(input)?;
        Ok((
            input,
            DecodedByte {
                byte,
                expected_status_code: Unwanted::Ignore,
                flags: 0,
                emit: true,
            },
        ))
    }
}

/// General decoder for one unencoded byte; handles raw NULs per policy.
fn plain_byte(cfg: &DecoderConfig) -> impl Fn(&[u8]) -> IResult<&[u8], DecodedByte> + '_ {
    move |input| {
        let (input, byte) = be_u8(input)?;
        if byte == 0 {
            return Ok((
                if cfg.nul_raw_terminates { b"" } else { input },
                DecodedByte {
                    byte,
                    expected_status_code: cfg.nul_raw_unwanted,
                    flags: Flags::URLEN_RAW_NUL,
                    emit: !cfg.nul_raw_terminates,
                },
            ));
        }
        Ok((
            input,
            DecodedByte {
                byte,
                expected_status_code: Unwanted::Ignore,
                flags: 0,
                emit: true,
            },
        ))
    }
}

/// Decode a URI component (not the path) under the configured policies.
fn decode_component<'a>(
    input: &'a [u8], cfg: &DecoderConfig,
) -> IResult<&'a [u8], (Vec<u8>, u64, Unwanted)> {
    fold_many0(
        alt((percent(cfg), plus(cfg), plain_byte(cfg))),
        || (Vec::new(), 0, Unwanted::Ignore),
        |mut acc: (Vec<_>, u64, Unwanted), decoded| {
            if decoded.emit {
                acc.0.push(decoded.byte);
            }
            acc.1.set(decoded.flags);
            if decoded.expected_status_code != Unwanted::Ignore {
                acc.2 = decoded.expected_status_code;
            }
            acc
        },
    )(input)
}

/// Decode a URI component into a fresh string, translating the component
/// flag bits into their path equivalents on the caller's flag set.
pub(crate) fn decode_component_with_flags(
    cfg: &DecoderConfig, flags: &mut u64, input: &[u8],
) -> Result<Bstr> {
    let (_, (decoded, f, _)) = decode_component(input, cfg)?;
    if f.is_set(Flags::URLEN_INVALID_ENCODING) {
        flags.set(Flags::PATH_INVALID_ENCODING);
    }
    if f.is_set(Flags::URLEN_ENCODED_NUL) {
        flags.set(Flags::PATH_ENCODED_NUL);
    }
    if f.is_set(Flags::URLEN_RAW_NUL) {
        flags.set(Flags::PATH_RAW_NUL);
    }
    Ok(Bstr::from(decoded))
}

/// Decode a URI component in place.
pub(crate) fn decode_component_inplace(cfg: &DecoderConfig, input: &mut Bstr) -> Result<()> {
    let (_, (decoded, _, _)) = decode_component(input.as_slice(), cfg)?;
    input.clear();
    input.add(decoded.as_slice());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DecoderCtx};
    use rstest::rstest;

    fn decoded(cfg: &Config, ctx: DecoderCtx, input: &str) -> Vec<u8> {
        decode_component(input.as_bytes(), cfg.decoder_cfg(ctx))
            .unwrap()
            .1
             .0
    }

    #[rstest]
    #[case("/dest", "/dest", "/dest", "/dest")]
    #[case("/%64est", "/dest", "/dest", "/dest")]
    #[case("/%xxest", "/1est", "/%xxest", "/xxest")]
    #[case("/%a", "/%a", "/%a", "/a")]
    #[case("/%00ABC", "/\0ABC", "/\0ABC", "/\0ABC")]
    #[case("/%u0064", "/%u0064", "/%u0064", "/%u0064")]
    #[case("/%u006", "/%u006", "/%u006", "/%u006")]
    #[case("/one%2ftwo", "/one/two", "/one/two", "/one/two")]
    fn test_decode_component(
        #[case] input: &str, #[case] expected_process: &str, #[case] expected_preserve: &str,
        #[case] expected_remove: &str,
    ) {
        let mut cfg = Config::default();
        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::ProcessInvalid,
        );
        assert_eq!(
            decoded(&cfg, DecoderCtx::Defaults, input),
            expected_process.as_bytes()
        );
        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::PreservePercent,
        );
        assert_eq!(
            decoded(&cfg, DecoderCtx::Defaults, input),
            expected_preserve.as_bytes()
        );
        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::RemovePercent,
        );
        assert_eq!(
            decoded(&cfg, DecoderCtx::Defaults, input),
            expected_remove.as_bytes()
        );
    }

    #[rstest]
    #[case("/%u0064", "/d", "/d", "/d")]
    #[case("/%U0064", "/d", "/d", "/d")]
    #[case("/%u006", "/%u006", "/%u006", "/u006")]
    #[case("/%uXXXX", "/?", "/%uXXXX", "/uXXXX")]
    #[case("/%u0000ABC", "/\0ABC", "/\0ABC", "/\0ABC")]
    fn test_decode_component_u_enabled(
        #[case] input: &str, #[case] expected_process: &str, #[case] expected_preserve: &str,
        #[case] expected_remove: &str,
    ) {
        let mut cfg = Config::default();
        cfg.set_u_encoding_decode(DecoderCtx::Defaults, true);
        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::ProcessInvalid,
        );
        assert_eq!(
            decoded(&cfg, DecoderCtx::Defaults, input),
            expected_process.as_bytes()
        );
        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::PreservePercent,
        );
        assert_eq!(
            decoded(&cfg, DecoderCtx::Defaults, input),
            expected_preserve.as_bytes()
        );
        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::RemovePercent,
        );
        assert_eq!(
            decoded(&cfg, DecoderCtx::Defaults, input),
            expected_remove.as_bytes()
        );
    }

    #[rstest]
    #[case("/%u0000ABC")]
    #[case("/%00ABC")]
    #[case("/\0ABC")]
    fn test_decode_component_nul_terminates(#[case] input: &str) {
        let mut cfg = Config::default();
        cfg.set_u_encoding_decode(DecoderCtx::Defaults, true);
        cfg.set_nul_encoded_terminates(DecoderCtx::Defaults, true);
        cfg.set_nul_raw_terminates(DecoderCtx::Defaults, true);
        assert_eq!(decoded(&cfg, DecoderCtx::Defaults, input), b"/");
    }

    #[rstest]
    #[case("/dest", "/dest", 0)]
    #[case("/%64est", "/dest", 0)]
    #[case("/%xxest", "/%xxest", Flags::PATH_INVALID_ENCODING)]
    #[case("/%00ABC", "/\0ABC", Flags::PATH_ENCODED_NUL)]
    #[case("/one%2ftwo", "/one%2ftwo", Flags::PATH_ENCODED_SEPARATOR)]
    fn test_path_decode_inplace(#[case] input: &str, #[case] expected: &str, #[case] flags: u64) {
        let cfg = Config::default();
        let mut path = Bstr::from(input);
        let mut f = 0;
        let mut status = Unwanted::Ignore;
        path_decode_inplace(
            cfg.decoder_cfg(DecoderCtx::UrlPath),
            &mut f,
            &mut status,
            &mut path,
        );
        assert_eq!(path, Bstr::from(expected));
        assert_eq!(f, flags);
    }

    #[rstest]
    #[case::encoded("/one%2ftwo")]
    #[case::convert("/one\\two")]
    #[case::compress("/one//two")]
    fn test_path_decode_inplace_separators(#[case] input: &str) {
        let mut cfg = Config::default();
        cfg.set_backslash_convert_slashes(DecoderCtx::UrlPath, true);
        cfg.set_path_separators_decode(DecoderCtx::UrlPath, true);
        cfg.set_path_separators_compress(DecoderCtx::UrlPath, true);
        let mut path = Bstr::from(input);
        let mut f = 0;
        let mut status = Unwanted::Ignore;
        path_decode_inplace(
            cfg.decoder_cfg(DecoderCtx::UrlPath),
            &mut f,
            &mut status,
            &mut path,
        );
        assert_eq!(path, Bstr::from("/one/two"));
    }

    #[rstest]
    #[case("/%u0000ABC", Flags::PATH_ENCODED_NUL | Flags::PATH_OVERLONG_U)]
    #[case("/%00ABC", Flags::PATH_ENCODED_NUL)]
    #[case("/\0ABC", 0)]
    fn test_path_decode_inplace_nul_terminates(#[case] input: &str, #[case] expected_flags: u64) {
        let mut cfg = Config::default();
        cfg.set_u_encoding_decode(DecoderCtx::UrlPath, true);
        cfg.set_nul_encoded_terminates(DecoderCtx::UrlPath, true);
        cfg.set_nul_raw_terminates(DecoderCtx::UrlPath, true);
        let mut path = Bstr::from(input);
        let mut f = 0;
        let mut status = Unwanted::Ignore;
        path_decode_inplace(
            cfg.decoder_cfg(DecoderCtx::UrlPath),
            &mut f,
            &mut status,
            &mut path,
        );
        assert_eq!(path, Bstr::from("/"));
        assert_eq!(f, expected_flags);
    }

    #[rstest]
    #[case(
        "/one/tw%u006f/three/%u123",
        "/one/two/three/%u123",
        "/one/two/three/%u123",
        "/one/two/three/u123"
    )]
    #[case(
        "/one/tw%u006f/three/%uXXXX",
        "/one/two/three/?",
        "/one/two/three/%uXXXX",
        "/one/two/three/uXXXX"
    )]
    fn test_decode_component_inplace(
        #[case] input: &str, #[case] expected_process: &str, #[case] expected_preserve: &str,
        #[case] expected_remove: &str,
    ) {
        let mut cfg = Config::default();
        cfg.set_u_encoding_decode(DecoderCtx::Defaults, true);

        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::ProcessInvalid,
        );
        let mut input_process = Bstr::from(input);
        decode_component_inplace(cfg.decoder_cfg(DecoderCtx::Defaults), &mut input_process)
            .unwrap();
        assert_eq!(input_process, Bstr::from(expected_process));

        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::PreservePercent,
        );
        let mut input_preserve = Bstr::from(input);
        decode_component_inplace(cfg.decoder_cfg(DecoderCtx::Defaults), &mut input_preserve)
            .unwrap();
        assert_eq!(input_preserve, Bstr::from(expected_preserve));

        cfg.set_url_encoding_invalid_handling(
            DecoderCtx::Defaults,
            UrlEncodingHandling::RemovePercent,
        );
        let mut input_remove = Bstr::from(input);
        decode_component_inplace(cfg.decoder_cfg(DecoderCtx::Defaults), &mut input_remove)
            .unwrap();
        assert_eq!(input_remove, Bstr::from(expected_remove));
    }
}
