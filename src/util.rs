//! Byte classification and low-level lexical helpers shared by both
//! parser state machines.

use crate::{config::Personality, error::NomError};
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, tag_no_case, take_till, take_until, take_while, take_while1, take_while_m_n},
    bytes::streaming::{tag as streaming_tag, take_till as streaming_take_till},
    character::complete::{char, digit1},
    combinator::{map, opt},
    sequence::tuple,
    Err::Incomplete,
    IResult, Needed,
};
use std::str::FromStr;

/// Trait to manipulate bit-flag fields in place.
pub trait FlagOps<T> {
    /// Insert the given flags.
    fn set(&mut self, other: T);
    /// Remove the given flags.
    fn unset(&mut self, other: T);
    /// Whether any of the given flags are set.
    fn is_set(&self, other: T) -> bool;
}

impl FlagOps<u8> for u8 {
    fn set(&mut self, other: u8) {
        *self |= other;
    }
    fn unset(&mut self, other: u8) {
        *self &= !other;
    }
    fn is_set(&self, other: u8) -> bool {
        self & other != 0
    }
}

impl FlagOps<u64> for u64 {
    fn set(&mut self, other: u64) {
        *self |= other;
    }
    fn unset(&mut self, other: u64) {
        *self &= !other;
    }
    fn is_set(&self, other: u64) -> bool {
        self & other != 0
    }
}

/// Anomaly flag bits. All flag users (header entries, transactions,
/// connections) share one namespace because the same condition is often
/// recorded in more than one place: a folded header raises the folded bit
/// on the header entry and on its transaction.
pub struct Flags;

impl Flags {
    /// Field cannot be parsed.
    pub const FIELD_UNPARSEABLE: u64 = 0x0000_0000_0004;
    /// Field is invalid.
    pub const FIELD_INVALID: u64 = 0x0000_0000_0008;
    /// Field is folded over multiple lines.
    pub const FIELD_FOLDED: u64 = 0x0000_0000_0010;
    /// Field appears more than once.
    pub const FIELD_REPEATED: u64 = 0x0000_0000_0020;
    /// Message framing is ambiguous in a way exploitable for smuggling.
    pub const REQUEST_SMUGGLING: u64 = 0x0000_0000_0100;
    /// Folding onto a non-existent previous header.
    pub const INVALID_FOLDING: u64 = 0x0000_0000_0200;
    /// Request transfer-encoding is not a recognized value.
    pub const REQUEST_INVALID_T_E: u64 = 0x0000_0000_0400;
    /// Request head spanned multiple input chunks.
    pub const MULTI_PACKET_HEAD: u64 = 0x0000_0000_0800;
    /// No host information available.
    pub const HOST_MISSING: u64 = 0x0000_0000_1000;
    /// URI and Host header disagree on host or port.
    pub const HOST_AMBIGUOUS: u64 = 0x0000_0000_2000;
    /// Encoded NUL byte in the path.
    pub const PATH_ENCODED_NUL: u64 = 0x0000_0000_4000;
    /// Raw NUL byte in the path.
    pub const PATH_RAW_NUL: u64 = 0x0000_0000_8000;
    /// Invalid percent-encoding in the path.
    pub const PATH_INVALID_ENCODING: u64 = 0x0000_0001_0000;
    /// Overlong %u sequence in the path.
    pub const PATH_OVERLONG_U: u64 = 0x0000_0004_0000;
    /// Encoded path separator present.
    pub const PATH_ENCODED_SEPARATOR: u64 = 0x0000_0008_0000;
    /// Path contained valid UTF-8 and no invalid sequences.
    pub const PATH_UTF8_VALID: u64 = 0x0000_0010_0000;
    /// Invalid UTF-8 in the path.
    pub const PATH_UTF8_INVALID: u64 = 0x0000_0020_0000;
    /// Overlong UTF-8 sequence in the path.
    pub const PATH_UTF8_OVERLONG: u64 = 0x0000_0040_0000;
    /// Code point in the half-width/full-width range U+FF00..U+FFEF.
    pub const PATH_HALF_FULL_RANGE: u64 = 0x0000_0080_0000;
    /// Status line is invalid.
    pub const STATUS_LINE_INVALID: u64 = 0x0000_0100_0000;
    /// Host in the URI is invalid.
    pub const HOSTU_INVALID: u64 = 0x0000_0200_0000;
    /// Host in the Host header is invalid.
    pub const HOSTH_INVALID: u64 = 0x0000_0400_0000;
    /// Encoded NUL in a URI component.
    pub const URLEN_ENCODED_NUL: u64 = 0x0000_0800_0000;
    /// Invalid percent-encoding in a URI component.
    pub const URLEN_INVALID_ENCODING: u64 = 0x0000_1000_0000;
    /// Overlong %u sequence in a URI component.
    pub const URLEN_OVERLONG_U: u64 = 0x0000_2000_0000;
    /// Code point in the range U+FF00..U+FFEF in a URI component.
    pub const URLEN_HALF_FULL_RANGE: u64 = 0x0000_4000_0000;
    /// Raw NUL in a URI component.
    pub const URLEN_RAW_NUL: u64 = 0x0000_8000_0000;
    /// Request is invalid.
    pub const REQUEST_INVALID: u64 = 0x0001_0000_0000;
    /// Request Content-Length is invalid.
    pub const REQUEST_INVALID_C_L: u64 = 0x0002_0000_0000;
    /// Authorization header is invalid.
    pub const AUTH_INVALID: u64 = 0x0004_0000_0000;
    /// Missing bytes in request or response data.
    pub const MISSING_BYTES: u64 = 0x0008_0000_0000;
    /// Missing bytes in request data.
    pub const REQUEST_MISSING_BYTES: u64 = 0x0010_0000_0000 | Self::MISSING_BYTES;
    /// Missing bytes in response data.
    pub const RESPONSE_MISSING_BYTES: u64 = 0x0020_0000_0000 | Self::MISSING_BYTES;
    /// Too many headers; logged only once.
    pub const HEADERS_TOO_MANY: u64 = 0x0040_0000_0000;
}

/// Determines if the byte is an HTTP separator.
/// separators = "(" | ")" | "<" | ">" | "@" | "," | ";" | ":" | "\" | <">
///            | "/" | "[" | "]" | "?" | "=" | "{" | "}" | SP | HT
pub(crate) fn is_separator(c: u8) -> bool {
    matches!(
        c,
        b'(' | b')'
            | b'<'
            | b'>'
            | b'@'
            | b','
            | b';'
            | b':'
            | b'\\'
            | b'"'
            | b'/'
            | b'['
            | b']'
            | b'?'
            | b'='
            | b'{'
            | b'}'
            | b' '
            | b'\t'
    )
}

/// Determines if the byte is an HTTP token character.
/// token = 1*<any CHAR except CTLs or separators>
pub(crate) fn is_token(c: u8) -> bool {
    (32..=126).contains(&c) && !is_separator(c)
}

/// Determines if the byte is linear whitespace in the strict HTTP/1.1
/// sense: SP or HT.
pub fn is_lws(c: u8) -> bool {
    matches!(c, b' ' | b'\t')
}

/// Determines if the byte is linear whitespace in the permissive sense the
/// parsers use: SP, HT, CR, LF, VT or FF.
pub(crate) fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x0b | 0x0c)
}

/// Determines if the byte is a chunked-framing control character (those the
/// chunk-length scanner skips over).
fn is_chunked_ctl_char(c: u8) -> bool {
    matches!(c, 0x0d | 0x0a | 0x20 | 0x09 | 0x0b | 0x0c)
}

/// Whether the entire line consists of chunked control characters.
pub(crate) fn is_chunked_ctl_line(line: &[u8]) -> bool {
    line.iter().all(|c| is_chunked_ctl_char(*c))
}

/// Remove all line terminators (LF, CR or CRLF) from the end of the line.
pub(crate) fn chomp(mut data: &[u8]) -> &[u8] {
    while matches!(data.last(), Some(b'\n') | Some(b'\r')) {
        data = &data[..data.len() - 1];
    }
    data
}

fn trim_start(input: &[u8]) -> &[u8] {
    let mut result = input;
    while let Some(x) = result.first() {
        if is_space(*x) {
            result = &result[1..];
        } else {
            break;
        }
    }
    result
}

fn trim_end(input: &[u8]) -> &[u8] {
    let mut result = input;
    while let Some(x) = result.last() {
        if is_space(*x) {
            result = &result[..result.len() - 1];
        } else {
            break;
        }
    }
    result
}

/// Trim leading and trailing whitespace as defined by [`is_space`].
pub(crate) fn trimmed(input: &[u8]) -> &[u8] {
    trim_end(trim_start(input))
}

/// Split the input in two on the given predicate. With `reverse` the split
/// happens at the last match instead of the first. With `do_trim` both
/// halves come back whitespace-trimmed. If the predicate never matches the
/// whole input lands in the first half.
pub(crate) fn split_on_predicate<F>(
    input: &[u8], reverse: bool, do_trim: bool, predicate: F,
) -> (&[u8], &[u8])
where
    F: FnMut(&u8) -> bool,
{
    let (first, second) = if reverse {
        let mut iter = input.rsplitn(2, predicate);
        let second = iter.next();
        match iter.next() {
            Some(first) => (first, second.unwrap_or(b"")),
            None => (second.unwrap_or(b""), &b""[..]),
        }
    } else {
        let mut iter = input.splitn(2, predicate);
        let first = iter.next().unwrap_or(b"");
        (first, iter.next().unwrap_or(b""))
    };
    if do_trim {
        (trimmed(first), trimmed(second))
    } else {
        (first, second)
    }
}

/// Is the given line empty (a bare terminator)?
fn is_line_empty(data: &[u8]) -> bool {
    matches!(data, b"\x0d" | b"\x0a" | b"\x0d\x0a")
}

/// Is the entire line whitespace?
fn is_line_whitespace(data: &[u8]) -> bool {
    data.iter().all(|c| is_space(*c))
}

fn is_line_terminator(personality: Personality, data: &[u8], next_no_lf: bool) -> bool {
    // IIS 5.0 accepts a whitespace-only line as a headers terminator.
    if personality == Personality::Iis5_0 && is_line_whitespace(data) {
        return true;
    }
    if is_line_empty(data) {
        return true;
    }
    if data.len() == 2 && is_space(data[0]) && data[1] == b'\n' {
        return next_no_lf;
    }
    false
}

/// Whether a line seen before the request line can be skipped.
pub(crate) fn is_line_ignorable(personality: Personality, data: &[u8]) -> bool {
    is_line_terminator(personality, data, false)
}

/// Converts the given slice to a port number; `None` on empty input,
/// garbage, overflow or zero.
pub(crate) fn convert_port(port: &[u8]) -> Option<u16> {
    if port.is_empty() {
        return None;
    }
    let port_number = std::str::from_utf8(port).ok()?.parse::<u16>().ok()?;
    if port_number == 0 {
        None
    } else {
        Some(port_number)
    }
}

/// Determine whether a response "line" is good enough to be a status line.
/// Browsers only look for the word "http" at the beginning; anything else
/// is treated as response body.
pub(crate) fn treat_response_line_as_body(data: &[u8]) -> bool {
    tuple((opt(take_is_space_or_null), tag_no_case::<_, _, NomError<&[u8]>>("http")))(data)
        .is_err()
}

/// Relaxed (not strictly RFC) hostname validation. Accepts bracketed IPv6
/// literals and underscores in labels.
pub(crate) fn validate_hostname(input: &[u8]) -> bool {
    if input.is_empty() || input.len() > 255 {
        return false;
    }
    if let Ok((_rest, (_open, addr, _close))) = tuple((
        char::<_, NomError<&[u8]>>('['),
        is_not::<_, _, NomError<&[u8]>>("#?/]"),
        char::<_, NomError<&[u8]>>(']'),
    ))(input)
    {
        if let Ok(addr) = std::str::from_utf8(addr) {
            return std::net::Ipv6Addr::from_str(addr).is_ok();
        }
    }
    if tag::<_, _, NomError<&[u8]>>(".")(input).is_ok()
        || take_until::<_, _, NomError<&[u8]>>("..")(input).is_ok()
    {
        return false;
    }
    for label in input.split(|&c| c == b'.') {
        if label.len() > 63 {
            return false;
        }
        if take_while_m_n::<_, _, NomError<&[u8]>>(label.len(), label.len(), |c: u8| {
            c == b'_' || c == b'-' || c.is_ascii_alphanumeric()
        })(label)
        .is_err()
        {
            return false;
        }
    }
    true
}

/// Take leading whitespace as defined by [`is_space`].
pub(crate) fn take_is_space(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_space)(data)
}

/// Take leading whitespace or NUL bytes.
pub(crate) fn take_is_space_or_null(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|c| is_space(c) || c == b'\0')(data)
}

/// Take bytes until the first whitespace character.
pub(crate) fn take_not_is_space(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|c: u8| !is_space(c))(data)
}

/// Take leading ASCII whitespace.
pub(crate) fn take_ascii_whitespace() -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> {
    move |input| take_while(|c: u8| c.is_ascii_whitespace())(input)
}

/// Take bytes up to the first NUL, if any.
pub(crate) fn take_until_null(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(|c| c != b'\0')(data)
}

/// Returns all data up to and including the first LF.
/// Errs with `Incomplete` if no LF is present.
pub(crate) fn take_till_lf(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let (_, line) = streaming_take_till(|c| c == b'\n')(data)?;
    Ok((&data[line.len() + 1..], &data[0..line.len() + 1]))
}

/// Returns all data up to and including the first LF or NUL.
/// Errs with `Incomplete` if neither is present.
pub(crate) fn take_till_lf_null(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let (_, line) = streaming_take_till(|c| c == b'\n' || c == 0)(data)?;
    Ok((&data[line.len() + 1..], &data[0..line.len() + 1]))
}

/// Returns all data up to and including the first EOL (LF, CR or CRLF).
/// Errs with `Incomplete` if no terminator is present.
pub(crate) fn take_till_eol(data: &[u8]) -> IResult<&[u8], &[u8]> {
    let (_, (line, eol)) = tuple((
        streaming_take_till(|c| c == b'\n' || c == b'\r'),
        alt((
            streaming_tag("\r\n"),
            streaming_tag("\r"),
            streaming_tag("\n"),
        )),
    ))(data)?;
    match eol {
        b"\n" | b"\r" => Ok((&data[line.len() + 1..], &data[0..line.len() + 1])),
        b"\r\n" => Ok((&data[line.len() + 2..], &data[0..line.len() + 2])),
        _ => Err(Incomplete(Needed::new(1))),
    }
}

/// Searches for the next run of decimal digits, skipping leading and
/// trailing whitespace.
///
/// Returns (trailing non-whitespace bytes, (leading non-digit bytes, digits)).
pub(crate) fn ascii_digits(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    map(
        tuple((
            take_is_space,
            take_till(|c: u8| c.is_ascii_digit()),
            digit1,
            take_is_space,
        )),
        |(_, leading, digits, _)| (leading, digits),
    )(input)
}

/// Searches for the next run of hexadecimal digits, skipping leading and
/// trailing whitespace.
pub(crate) fn hex_digits(input: &[u8]) -> IResult<&[u8], &[u8]> {
    map(
        tuple((
            take_is_space,
            take_while(|c: u8| c.is_ascii_hexdigit()),
            take_is_space,
        )),
        |(_, digits, _)| digits,
    )(input)
}

/// Skip chunked-framing control characters.
pub(crate) fn take_chunked_ctl_chars(data: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while(is_chunked_ctl_char)(data)
}

/// Whether the data seen so far could still be a valid chunk-length line:
/// leading chunked control characters followed by hex digits.
pub(crate) fn is_valid_chunked_length_data(data: &[u8]) -> bool {
    tuple((
        take_chunked_ctl_chars,
        take_while1::<_, _, NomError<&[u8]>>(|c: u8| !c.is_ascii_hexdigit()),
    ))(data)
    .is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b'a', false)]
    #[case(b'^', false)]
    #[case(b'-', false)]
    #[case(b'(', true)]
    #[case(b'\\', true)]
    #[case(b'/', true)]
    #[case(b'=', true)]
    #[case(b'\t', true)]
    fn test_is_separator(#[case] input: u8, #[case] expected: bool) {
        assert_eq!(is_separator(input), expected);
    }

    #[rstest]
    #[case(b'a', true)]
    #[case(b'&', true)]
    #[case(b'+', true)]
    #[case(b'\t', false)]
    #[case(b'\n', false)]
    fn test_is_token(#[case] input: u8, #[case] expected: bool) {
        assert_eq!(is_token(input), expected);
    }

    #[rstest]
    #[case(b' ', true)]
    #[case(b'\t', true)]
    #[case(b'\r', false)]
    #[case(b'\n', false)]
    #[case(b'a', false)]
    fn test_is_lws(#[case] input: u8, #[case] expected: bool) {
        assert_eq!(is_lws(input), expected);
    }

    #[rstest]
    #[case("", "")]
    #[case("test\n", "test")]
    #[case("test\r\n", "test")]
    #[case("test\r\n\n", "test")]
    #[case("test\n\r\r\n\r", "test")]
    #[case("te\nst", "te\nst")]
    fn test_chomp(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(chomp(input.as_bytes()), expected.as_bytes());
    }

    #[rstest]
    #[case::no_trim(b"notrim", b"notrim")]
    #[case::start(b"\t trim", b"trim")]
    #[case::both(b" trim ", b"trim")]
    #[case::middle_kept(b" trim trim ", b"trim trim")]
    #[case::empty(b"", b"")]
    fn test_trimmed(#[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(trimmed(input), expected);
    }

    #[rstest]
    #[case("", false, ("", ""))]
    #[case("ONE TWO THREE", false, ("ONE", "TWO THREE"))]
    #[case("ONE TWO THREE", true, ("ONE TWO", "THREE"))]
    #[case("ONE   TWO   THREE", false, ("ONE", "TWO   THREE"))]
    #[case("ONE", false, ("ONE", ""))]
    #[case("ONE", true, ("ONE", ""))]
    fn test_split_on_predicate(
        #[case] input: &str, #[case] reverse: bool, #[case] expected: (&str, &str),
    ) {
        assert_eq!(
            split_on_predicate(input.as_bytes(), reverse, true, |c| *c == 0x20),
            (expected.0.as_bytes(), expected.1.as_bytes())
        );
    }

    #[rstest]
    #[case("   http 1.1", false)]
    #[case("\0 http 1.1", false)]
    #[case("http", false)]
    #[case("HTTP", false)]
    #[case("    HTTP", false)]
    #[case("test", true)]
    #[case("", true)]
    #[case("kfgjl  hTtp ", true)]
    fn test_treat_response_line_as_body(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(treat_response_line_as_body(input.as_bytes()), expected);
    }

    #[rstest]
    #[case("", false)]
    #[case("www.ExAmplE-1984.com", true)]
    #[case("[::]", true)]
    #[case("[2001:3db8:0000:0000:0000:ff00:d042:8530]", true)]
    #[case("www.exa_mple.com", true)]
    #[case(".www.example.com", false)]
    #[case("www..example.com", false)]
    #[case("www example com", false)]
    #[case("[::", false)]
    #[case("[::#garbage]", false)]
    #[case::over_63_char_label(
        "www.exampleexampleexampleexampleexampleexampleexampleexampleexampleexample.com",
        false
    )]
    fn test_validate_hostname(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(validate_hostname(input.as_bytes()), expected);
    }

    #[rstest]
    #[case("", None)]
    #[case("0", None)]
    #[case("81", Some(81))]
    #[case("65535", Some(65535))]
    #[case("65536", None)]
    #[case("-1", None)]
    #[case("8x", None)]
    fn test_convert_port(#[case] input: &str, #[case] expected: Option<u16>) {
        assert_eq!(convert_port(input.as_bytes()), expected);
    }

    #[rstest]
    #[case("header:value\r\n", "", "header:value\r\n")]
    #[case("header:value\n\r", "\r", "header:value\n")]
    #[case("abcdefg\nhijk", "hijk", "abcdefg\n")]
    fn test_take_till_lf(#[case] input: &str, #[case] remaining: &str, #[case] parsed: &str) {
        assert_eq!(
            take_till_lf(input.as_bytes()).unwrap(),
            (remaining.as_bytes(), parsed.as_bytes())
        );
    }

    #[test]
    fn test_take_till_lf_incomplete() {
        assert!(take_till_lf(b"no lf here").is_err());
        assert!(take_till_lf(b"").is_err());
    }

    #[rstest]
    #[case("abcdefg\nhijk", "hijk", "abcdefg\n")]
    #[case("abcdefg\rhijk", "hijk", "abcdefg\r")]
    #[case("abcdefg\r\nhijk", "hijk", "abcdefg\r\n")]
    fn test_take_till_eol(#[case] input: &str, #[case] remaining: &str, #[case] parsed: &str) {
        assert_eq!(
            take_till_eol(input.as_bytes()).unwrap(),
            (remaining.as_bytes(), parsed.as_bytes())
        );
    }

    #[rstest]
    #[case("    a200 \t  bcd ", "bcd ", "a", "200")]
    #[case("   555555555    ", "", "", "555555555")]
    #[case("   555555555    500", "500", "", "555555555")]
    fn test_ascii_digits(
        #[case] input: &str, #[case] remaining: &str, #[case] leading: &str, #[case] digits: &str,
    ) {
        assert_eq!(
            ascii_digits(input.as_bytes()).unwrap(),
            (remaining.as_bytes(), (leading.as_bytes(), digits.as_bytes()))
        );
    }

    #[rstest]
    #[case("12a5", "", "12a5")]
    #[case("12a5   .....", ".....", "12a5")]
    #[case("    \t12a5.....    ", ".....    ", "12a5")]
    #[case("  .....", ".....", "")]
    fn test_hex_digits(#[case] input: &str, #[case] remaining: &str, #[case] digits: &str) {
        assert_eq!(
            hex_digits(input.as_bytes()).unwrap(),
            (remaining.as_bytes(), digits.as_bytes())
        );
    }

    #[rstest]
    #[case("", true)]
    #[case("68656c6c6f", true)]
    #[case("\x0d\x0a\x20\x09\x0b\x0c68656c6c6f", true)]
    #[case("X5O!P%@AP", false)]
    fn test_is_valid_chunked_length_data(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_valid_chunked_length_data(input.as_bytes()), expected);
    }
}
