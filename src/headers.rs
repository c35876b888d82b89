//! Wire-format header parser. Streaming: when the input ends before a
//! value terminator is seen the parser reports `Incomplete` so the caller
//! can buffer and retry once more data arrives. Request and response sides
//! share the grammar but differ in the line endings they accept.

use crate::util::{is_token, trimmed, FlagOps};
use nom::{
    branch::alt,
    bytes::complete::tag as complete_tag,
    bytes::streaming::{tag, take_till, take_while},
    character::streaming::space0,
    combinator::{complete, map, not, opt, peek},
    sequence::tuple,
    Err::Incomplete,
    IResult, Needed,
};

/// Parsed bytes plus the flags raised while parsing them.
pub(crate) type ParsedBytes<'a> = (&'a [u8], u64);
/// Parsed headers plus whether the end-of-headers terminator was seen.
pub(crate) type ParsedHeaders = (Vec<Header>, bool);
/// Matched eol bytes, folding whitespace and flags.
type FoldingBytes<'a> = (&'a [u8], &'a [u8], u64);
/// Folding bytes or a value terminator.
type FoldingOrTerminator<'a> = (ParsedBytes<'a>, Option<&'a [u8]>);
/// Value bytes plus the terminator that ended them.
type ValueBytes<'a> = (&'a [u8], FoldingOrTerminator<'a>);

/// Flags describing how a header deviated from the grammar.
pub(crate) struct HeaderFlags;

impl HeaderFlags {
    pub(crate) const FOLDING: u64 = 0x0001;
    pub(crate) const FOLDING_SPECIAL_CASE: u64 = 0x0002 | Self::FOLDING;
    pub(crate) const NAME_EMPTY: u64 = 0x0004;
    pub(crate) const VALUE_EMPTY: u64 = 0x0008;
    pub(crate) const NAME_NON_TOKEN_CHARS: u64 = 0x0010;
    pub(crate) const FIELD_REPEATED: u64 = 0x0020;
    pub(crate) const NAME_TRAILING_WHITESPACE: u64 = 0x0040;
    pub(crate) const NAME_LEADING_WHITESPACE: u64 = 0x0080;
    pub(crate) const NULL_TERMINATED: u64 = 0x0100;
    pub(crate) const MISSING_COLON: u64 = 0x0200 | Self::NAME_EMPTY;
    pub(crate) const DEFORMED_EOL: u64 = 0x0400;
}

/// A parsed header name, trimmed, with its flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Name {
    pub(crate) name: Vec<u8>,
    pub(crate) flags: u64,
}

impl Name {
    fn new(name: &[u8], flags: u64) -> Self {
        Self {
            name: trimmed(name).to_vec(),
            flags,
        }
    }
}

/// A parsed header value, trimmed, with its flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Value {
    pub(crate) value: Vec<u8>,
    pub(crate) flags: u64,
}

impl Value {
    fn new(value: &[u8], flags: u64) -> Self {
        Self {
            value: trimmed(value).to_vec(),
            flags,
        }
    }
}

/// One parsed wire header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) name: Name,
    pub(crate) value: Value,
}

impl Header {
    fn new(name: Name, value: Value) -> Self {
        Self { name, value }
    }

    #[cfg(test)]
    fn new_with_flags(
        name_bytes: &[u8], name_flags: u64, value_bytes: &[u8], value_flags: u64,
    ) -> Self {
        Self::new(
            Name::new(name_bytes, name_flags),
            Value::new(value_bytes, value_flags),
        )
    }
}

/// Which side of the exchange the parser works on.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) enum Side {
    /// Request headers; a NUL terminates the block.
    Request,
    /// Response headers; a bare CR is accepted as a line ending.
    Response,
}

/// The per-side wire parser. `complete` flips the streaming behavior off
/// once the stream has closed and no further data can arrive.
pub(crate) struct Parser {
    side: Side,
    complete: bool,
}

impl Parser {
    pub(crate) fn new(side: Side) -> Self {
        Self {
            side,
            complete: false,
        }
    }

    /// Assume no more data is incoming from now on.
    pub(crate) fn set_complete(&mut self, complete: bool) {
        self.complete = complete;
    }

    fn is_eol(&self) -> impl Fn(u8) -> bool + '_ {
        move |c| c == b'\n' || (self.side == Side::Response && c == b'\r')
    }

    /// One complete, well-formed end of line.
    fn complete_eol_regular(&self) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> + '_ {
        move |input| {
            if self.side == Side::Response {
                alt((
                    complete_tag("\r\n"),
                    complete_tag("\n\r"),
                    complete_tag("\n"),
                    complete_tag("\r"),
                ))(input)
            } else {
                alt((complete_tag("\r\n"), complete_tag("\n")))(input)
            }
        }
    }

    /// One complete deformed end-of-line character set (CR/LF soup real
    /// servers emit and clients tolerate).
    fn complete_eol_deformed(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ParsedBytes> + '_ {
        move |input| {
            if self.side == Side::Response {
                alt((
                    map(
                        tuple((
                            complete_tag("\n\r\r\n"),
                            peek(alt((complete_tag("\n"), complete_tag("\r\n")))),
                        )),
                        |(eol, _): (&[u8], _)| (eol, HeaderFlags::DEFORMED_EOL),
                    ),
                    map(
                        tuple((
                            complete_tag("\r\n\r"),
                            nom::bytes::complete::take_while1(|c| {
                                c == b'\r' || c == b' ' || c == b'\t'
                            }),
                            opt(complete_tag("\n")),
                            not(alt((complete_tag("\n"), complete_tag("\r\n")))),
                        )),
                        |(eol1, eol2, eol3, _): (&[u8], &[u8], Option<&[u8]>, _)| {
                            (
                                &input[..(eol1.len() + eol2.len() + eol3.unwrap_or(b"").len())],
                                HeaderFlags::DEFORMED_EOL,
                            )
                        },
                    ),
                ))(input)
            } else {
                map(
                    alt((
                        tuple((
                            complete_tag("\n\r\r\n"),
                            peek(alt((complete_tag("\n"), complete_tag("\r\n")))),
                        )),
                        tuple((complete_tag("\n\r"), peek(complete_tag("\r\n")))),
                    )),
                    |(eol, _): (&[u8], _)| (eol, HeaderFlags::DEFORMED_EOL),
                )(input)
            }
        }
    }

    /// One complete end of line, regular or deformed.
    fn complete_eol(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ParsedBytes> + '_ {
        move |input| {
            alt((
                self.complete_eol_deformed(),
                map(self.complete_eol_regular(), |eol| (eol, 0)),
            ))(input)
        }
    }

    /// One end of line guaranteed not to be folding.
    fn eol(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ParsedBytes> + '_ {
        move |input| map(tuple((self.complete_eol(), not(folding_lws))), |(end, _)| end)(input)
    }

    /// A NUL byte or one non-folding end of line.
    fn null_or_eol(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ParsedBytes> + '_ {
        move |input| alt((null, self.eol()))(input)
    }

    /// A NUL byte or one complete end of line.
    fn complete_null_or_eol(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ParsedBytes> + '_ {
        move |input| alt((null, self.complete_eol()))(input)
    }

    /// Header folding: an end of line followed by linear whitespace.
    fn folding(&self) -> impl Fn(&[u8]) -> IResult<&[u8], FoldingBytes> + '_ {
        move |input| {
            if self.side == Side::Response {
                map(
                    tuple((
                        map(self.complete_eol_regular(), |eol| (eol, 0)),
                        folding_lws,
                    )),
                    |((eol, flags), (lws, other_flags)): (ParsedBytes, ParsedBytes)| {
                        (eol, lws, flags | other_flags)
                    },
                )(input)
            } else {
                map(
                    tuple((self.complete_eol(), folding_lws)),
                    |((eol, flags), (lws, other_flags))| (eol, lws, flags | other_flags),
                )(input)
            }
        }
    }

    /// Complete folding bytes or a value terminator.
    fn complete_folding_or_terminator(
        &self,
    ) -> impl Fn(&[u8]) -> IResult<&[u8], FoldingOrTerminator> + '_ {
        move |input| {
            alt((
                complete(map(self.folding(), |(end, fold, flags)| {
                    ((end, flags), Some(fold))
                })),
                map(self.complete_null_or_eol(), |end| (end, None)),
            ))(input)
        }
    }

    /// Streaming folding bytes or a value terminator.
    fn streaming_folding_or_terminator(
        &self,
    ) -> impl Fn(&[u8]) -> IResult<&[u8], FoldingOrTerminator> + '_ {
        move |input| {
            alt((
                map(self.folding(), |(end, fold, flags)| {
                    ((end, flags), Some(fold))
                }),
                map(self.null_or_eol(), |end| (end, None)),
            ))(input)
        }
    }

    /// Folding bytes or a value terminator, complete or streaming per the
    /// parser's completeness state.
    fn folding_or_terminator(&self) -> impl Fn(&[u8]) -> IResult<&[u8], FoldingOrTerminator> + '_ {
        move |input| {
            if self.complete {
                self.complete_folding_or_terminator()(input)
            } else {
                self.streaming_folding_or_terminator()(input)
            }
        }
    }

    /// A header value fragment and the terminator that ended it.
    fn value_bytes(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ValueBytes> + '_ {
        move |input| {
            let (mut remaining, mut value) = take_till(self.is_eol())(input)?;
            if value.last() == Some(&b'\r') {
                value = &value[..value.len() - 1];
                remaining = &input[value.len()..];
            }
            let (remaining, result) = self.folding_or_terminator()(remaining)?;
            Ok((remaining, (value, result)))
        }
    }

    /// A complete header value, folded continuation lines included.
    fn value(&self) -> impl Fn(&[u8]) -> IResult<&[u8], Value> + '_ {
        move |input| {
            let (mut rest, (val_bytes, ((_eol, mut flags), fold))) = self.value_bytes()(input)?;
            let mut value = val_bytes.to_vec();
            if let Some(fold) = fold {
                let mut i = rest;
                let mut ofold = fold;
                loop {
                    if self.side == Side::Response {
                        // What looks like folding may be the next header
                        // with a leading-whitespace name; peek for a
                        // "token:" shape to disambiguate.
                        match tuple((token_chars, separator_regular))(i) {
                            Ok((_, ((_, tokens, _), (_, _)))) if !tokens.is_empty() => {
                                flags.unset(HeaderFlags::FOLDING_SPECIAL_CASE);
                                if value.is_empty() {
                                    flags.set(HeaderFlags::VALUE_EMPTY);
                                }
                                return Ok((i, Value::new(&value, flags)));
                            }
                            Err(Incomplete(_)) => {
                                return Err(Incomplete(Needed::new(1)));
                            }
                            _ => {}
                        }
                    }
                    let (rest2, (val_bytes, ((eol, other_flags), fold))) = self.value_bytes()(i)?;
                    i = rest2;
                    flags.set(other_flags);
                    // A value that started with a fold gets no separator
                    // pushed in front of it.
                    if !value.is_empty() {
                        if !ofold.is_empty() {
                            value.push(ofold[0]);
                        } else {
                            value.push(b' ');
                        }
                    }
                    if !val_bytes.is_empty() || eol.len() > 1 {
                        rest = rest2;
                        value.extend(val_bytes);
                    } else if val_bytes.is_empty()
                        && eol.len() == 1
                        && !rest2.is_empty()
                        && rest2[0] == b'\n'
                    {
                        // An empty fold followed by a second eol ends the
                        // header block.
                        rest = rest2;
                    }
                    if let Some(fold) = fold {
                        ofold = fold;
                    } else {
                        return Ok((rest, Value::new(&value, flags)));
                    }
                }
            } else {
                if value.is_empty() {
                    flags.set(HeaderFlags::VALUE_EMPTY);
                }
                Ok((rest, Value::new(&value, flags)))
            }
        }
    }

    /// One header name, up to the colon.
    fn name(&self) -> impl Fn(&[u8]) -> IResult<&[u8], Name> + '_ {
        move |input| {
            let mut terminated = 0u8;
            let mut offset = 0;
            for (i, c) in input.iter().enumerate() {
                if terminated == 0 {
                    if *c == b':' {
                        offset = i;
                        break;
                    } else if *c == b'\n' || (self.side == Side::Response && *c == b'\r') {
                        terminated = *c;
                    }
                } else if *c == b' ' {
                    terminated = 0;
                } else if *c == b'\n' && terminated == b'\r' {
                    terminated = *c;
                } else {
                    offset = i - 1;
                    break;
                }
            }
            let (name, rem) = input.split_at(offset);
            let mut flags = 0;
            if !name.is_empty() {
                if name[0].is_ascii_whitespace() {
                    flags.set(HeaderFlags::NAME_LEADING_WHITESPACE);
                }
                if let Some(end) = name.last() {
                    if end.is_ascii_whitespace() {
                        flags.set(HeaderFlags::NAME_TRAILING_WHITESPACE);
                    }
                }
                if let Ok((rem, _)) = token_chars(name) {
                    if !rem.is_empty() {
                        flags.set(HeaderFlags::NAME_NON_TOKEN_CHARS);
                    }
                }
            } else {
                flags.set(HeaderFlags::NAME_EMPTY);
            }
            Ok((rem, Name::new(name, flags)))
        }
    }

    /// Data before an eol with no colon: an empty name with the data as
    /// the value.
    fn header_sans_colon(&self) -> impl Fn(&[u8]) -> IResult<&[u8], Header> + '_ {
        move |input| {
            let (remaining, (_, value)) =
                tuple((not(complete_tag("\r\n")), self.value()))(input)?;
            let flags = value.flags | HeaderFlags::MISSING_COLON;
            Ok((
                remaining,
                Header::new(Name::new(b"", flags), Value::new(&value.value, flags)),
            ))
        }
    }

    /// A header of the regular name:value shape.
    fn header_with_colon(&self) -> impl Fn(&[u8]) -> IResult<&[u8], Header> + '_ {
        move |input| {
            map(
                tuple((self.name(), separator_regular, self.value())),
                |(name, _, value)| Header::new(name, value),
            )(input)
        }
    }

    /// One header, with or without a colon separator.
    fn header(&self) -> impl Fn(&[u8]) -> IResult<&[u8], Header> + '_ {
        move |input| alt((complete(self.header_with_colon()), self.header_sans_colon()))(input)
    }

    /// Parse as many headers as the input holds. The boolean in the result
    /// reports whether the end-of-headers terminator was reached.
    pub(crate) fn headers(&self) -> impl Fn(&[u8]) -> IResult<&[u8], ParsedHeaders> + '_ {
        move |input| {
            let mut out = Vec::with_capacity(16);
            let mut i = input;
            loop {
                match self.header()(i) {
                    Ok((rest, head)) => {
                        i = rest;
                        let is_null_terminated =
                            head.value.flags.is_set(HeaderFlags::NULL_TERMINATED);
                        out.push(head);
                        if is_null_terminated {
                            return Ok((rest, (out, true)));
                        }
                        if let Ok((rest2, _eoh)) = self.complete_eol_regular()(rest) {
                            return Ok((rest2, (out, true)));
                        }
                    }
                    Err(Incomplete(x)) => {
                        if out.is_empty() {
                            return Err(Incomplete(x));
                        }
                        return Ok((i, (out, false)));
                    }
                    Err(e) => {
                        if out.is_empty() {
                            if let Ok((rest2, _eoh)) = self.complete_eol()(i) {
                                return Ok((rest2, (out, true)));
                            }
                        }
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// One NUL byte, flagged as a terminator.
fn null(input: &[u8]) -> IResult<&[u8], ParsedBytes<'_>> {
    map(complete_tag("\0"), |null| {
        (null, HeaderFlags::NULL_TERMINATED)
    })(input)
}

/// Folding linear whitespace.
fn folding_lws(input: &[u8]) -> IResult<&[u8], ParsedBytes<'_>> {
    map(alt((tag(" "), tag("\t"), tag("\0"))), |fold| {
        (fold, HeaderFlags::FOLDING)
    })(input)
}

/// Colon plus optional spaces between name and value.
fn separator_regular(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    tuple((complete_tag(":"), space0))(input)
}

type LeadingTokenTrailing<'a> = (&'a [u8], &'a [u8], &'a [u8]);
/// Token characters with surrounding whitespace.
fn token_chars(input: &[u8]) -> IResult<&[u8], LeadingTokenTrailing<'_>> {
    tuple((space0, take_while(is_token), space0))(input)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    macro_rules! b {
        ($b: literal) => {
            $b.as_bytes()
        };
    }

    #[rstest]
    #[case::null_does_not_terminate_value(
        b"k1:v1\r\nk2:v2 before\0v2 after\r\n\r\n",
        Ok((b!(""), (vec![
            Header::new_with_flags(b"k1", 0, b"v1", 0),
            Header::new_with_flags(b"k2", 0, b"v2 before\0v2 after", 0),
        ], true)))
    )]
    #[case::incomplete_eoh(
        b"k1:v1\r\nk2:v2\r",
        Ok((b!("k2:v2\r"), (vec![Header::new_with_flags(b"k1", 0, b"v1", 0)], false)))
    )]
    #[case::incomplete_eoh_null(
        b"k1:v1\nk2:v2\0v2\r\nk3:v3\r",
        Ok((b!("k3:v3\r"), (vec![
            Header::new_with_flags(b"k1", 0, b"v1", 0),
            Header::new_with_flags(b"k2", 0, b"v2\0v2", 0),
        ], false)))
    )]
    fn test_headers(#[case] input: &[u8], #[case] expected: IResult<&[u8], ParsedHeaders>) {
        let req_parser = Parser::new(Side::Request);
        assert_eq!(req_parser.headers()(input), expected);
    }

    #[rstest]
    #[case::only_lf_eoh(
        b"Name1: Value1\nName2:Value2\nName3: Val\n ue3\nName4: Value4\n Value4.1\n Value4.2\n\n"
    )]
    #[case::only_crlf_eoh(b"Name1: Value1\r\nName2:Value2\r\nName3: Val\r\n ue3\r\nName4: Value4\r\n Value4.1\r\n Value4.2\r\n\r\n")]
    #[case::crlf_lf_eoh(b"Name1: Value1\r\nName2:Value2\nName3: Val\r\n ue3\r\nName4: Value4\r\n Value4.1\n Value4.2\r\n\n")]
    fn test_headers_with_folding(#[case] input: &[u8]) {
        let expected = Ok((
            b!(""),
            (
                vec![
                    Header::new_with_flags(b"Name1", 0, b"Value1", 0),
                    Header::new_with_flags(b"Name2", 0, b"Value2", 0),
                    Header::new_with_flags(b"Name3", 0, b"Val ue3", HeaderFlags::FOLDING),
                    Header::new_with_flags(
                        b"Name4",
                        0,
                        b"Value4 Value4.1 Value4.2",
                        HeaderFlags::FOLDING,
                    ),
                ],
                true,
            ),
        ));
        let req_parser = Parser::new(Side::Request);
        assert_eq!(req_parser.headers()(input), expected);
        let res_parser = Parser::new(Side::Response);
        assert_eq!(res_parser.headers()(input), expected);
    }

    #[rstest]
    #[case::incomplete(b"K: V", Err(Incomplete(Needed::new(1))))]
    #[case::incomplete_trailing_eol(b"K: V\r\n", Err(Incomplete(Needed::new(1))))]
    #[case::empty_value(b"K:\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"K", 0, b"", HeaderFlags::VALUE_EMPTY))))]
    #[case::empty_name(b":V\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"", HeaderFlags::NAME_EMPTY, b"V", 0))))]
    #[case::regular(b"K: V\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"K", 0, b"V", 0))))]
    #[case::value_with_null(b"K: V before\0 V after\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"K", 0, b"V before\0 V after", 0))))]
    #[case::multi_fold(b"K: V\r\n a\r\n l\r\n u\r\n\te\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"K", 0, b"V a l u\te", HeaderFlags::FOLDING))))]
    fn test_header_with_colon(#[case] input: &[u8], #[case] expected: IResult<&[u8], Header>) {
        let req_parser = Parser::new(Side::Request);
        assert_eq!(req_parser.header_with_colon()(input), expected);
        let res_parser = Parser::new(Side::Response);
        assert_eq!(res_parser.header_with_colon()(input), expected);
    }

    #[rstest]
    #[case::missing_colon(b"K1 V1\r\nK2:V2\n\r\n", Ok((b!("K2:V2\n\r\n"), Header::new_with_flags(b"", HeaderFlags::MISSING_COLON, b"K1 V1", HeaderFlags::MISSING_COLON))), None)]
    #[case::cr_in_name(b"Host:www.google.com\rName: Value\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"Host", 0, b"www.google.com\rName: Value", 0))), Some(Ok((b!("Name: Value\r\n\r\n"), Header::new_with_flags(b"Host", 0, b"www.google.com", 0)))))]
    #[case::non_token(b"K\x0c:Value\r\n V\r\n\r\n", Ok((b!("\r\n"), Header::new_with_flags(b"K\x0c", HeaderFlags::NAME_NON_TOKEN_CHARS, b"Value V", HeaderFlags::FOLDING))), None)]
    fn test_header(
        #[case] input: &[u8], #[case] expected: IResult<&[u8], Header>,
        #[case] diff_res_expected: Option<IResult<&[u8], Header>>,
    ) {
        let req_parser = Parser::new(Side::Request);
        assert_eq!(req_parser.header()(input), expected);
        let res_parser = Parser::new(Side::Response);
        if let Some(res_expected) = diff_res_expected {
            assert_eq!(res_parser.header()(input), res_expected);
        } else {
            assert_eq!(res_parser.header()(input), expected);
        }
    }

    #[rstest]
    #[case::name(b"Hello: world", Ok((b!(": world"), Name { name: b"Hello".to_vec(), flags: 0 })))]
    #[case::trailing_ws(b"Hello : world", Ok((b!(": world"), Name { name: b"Hello".to_vec(), flags: HeaderFlags::NAME_TRAILING_WHITESPACE })))]
    #[case::surrounding_ws(b" Hello : world", Ok((b!(": world"), Name { name: b"Hello".to_vec(), flags: HeaderFlags::NAME_LEADING_WHITESPACE | HeaderFlags::NAME_TRAILING_WHITESPACE })))]
    #[case::non_token(b"Hello;invalid: world", Ok((b!(": world"), Name { name: b"Hello;invalid".to_vec(), flags: HeaderFlags::NAME_NON_TOKEN_CHARS })))]
    #[case::only_space_name(b"   : world", Ok((b!(": world"), Name { name: b"".to_vec(), flags: HeaderFlags::NAME_LEADING_WHITESPACE | HeaderFlags::NAME_TRAILING_WHITESPACE })))]
    fn test_name(#[case] input: &[u8], #[case] expected: IResult<&[u8], Name>) {
        let req_parser = Parser::new(Side::Request);
        assert_eq!(req_parser.name()(input), expected);
    }

    #[rstest]
    #[case(b"test", false)]
    #[case(b"\r\n", false)]
    #[case(b"\0a", true)]
    fn test_null(#[case] input: &[u8], #[case] ok: bool) {
        assert_eq!(null(input).is_ok(), ok);
    }
}
