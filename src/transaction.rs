use crate::{
    bstr::Bstr,
    config::{Config, Unwanted},
    decompressors::{ContentEncoding, Decompressor},
    headers::{Parser as HeaderWireParser, Side},
    hook::{DataCallbackFn, DataHook},
    log::Logger,
    parsers::{parse_authorization, parse_content_length, parse_content_type, parse_cookies, parse_hostport},
    request::Method,
    uri::Uri,
    util::{validate_hostname, FlagOps, Flags},
    Status,
};
use std::{any::Any, rc::Rc};

/// The body-framing method of one message.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TransferCoding {
    /// Not determined yet.
    Unknown,
    /// The message has no body.
    NoBody,
    /// The body is sent as-is, with its length known in advance or bounded
    /// by stream close.
    Identity,
    /// Chunked encoding.
    Chunked,
    /// The framing headers could not be interpreted.
    Invalid,
}

/// A parsed response status number.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ResponseNumber {
    /// Not parsed yet.
    Unknown,
    /// Could not be parsed.
    Invalid,
    /// Parsed successfully.
    Valid(u16),
}

impl ResponseNumber {
    /// Whether the status number lies in the given inclusive range.
    pub fn in_range(self, min: u16, max: u16) -> bool {
        match self {
            ResponseNumber::Valid(status) => status >= min && status <= max,
            _ => false,
        }
    }

    /// Whether the status number equals the given number.
    pub fn eq_num(self, num: u16) -> bool {
        matches!(self, ResponseNumber::Valid(status) if status == num)
    }
}

/// A single request or response header entry.
#[derive(Clone, Debug)]
pub struct Header {
    /// Header name as seen on the wire (trimmed).
    pub name: Bstr,
    /// Header value (trimmed).
    pub value: Bstr,
    /// Entry flags: a combination of `FIELD_INVALID`, `FIELD_FOLDED` and
    /// `FIELD_REPEATED`.
    pub flags: u64,
}

impl Header {
    /// Construct a new header entry.
    pub fn new(name: Bstr, value: Bstr) -> Self {
        Self::new_with_flags(name, value, 0)
    }

    /// Construct a new header entry with flags.
    pub fn new_with_flags(name: Bstr, value: Bstr, flags: u64) -> Self {
        Self { name, value, flags }
    }
}

/// Ordered table of header entries. Entries with the same name are all
/// kept, in insertion order, with the repeated flag raised from the second
/// occurrence on; duplicate framing headers must stay visible for
/// smuggling audits.
#[derive(Clone, Debug, Default)]
pub struct Headers {
    /// The entries, in insertion order.
    pub elements: Vec<Header>,
}

impl Headers {
    /// Make a new table with the given capacity.
    pub fn with_capacity(size: usize) -> Self {
        Self {
            elements: Vec::with_capacity(size),
        }
    }

    /// Append an entry, raising the repeated flag on it and on the earlier
    /// entries of the same name.
    ///
    /// Returns whether the name was already present.
    pub fn add(&mut self, mut entry: Header) -> bool {
        let mut repeated = false;
        for existing in self
            .elements
            .iter_mut()
            .filter(|e| e.name.eq_nocase_trimmed(entry.name.as_slice()))
        {
            repeated = true;
            existing.flags.set(Flags::FIELD_REPEATED);
        }
        if repeated {
            entry.flags.set(Flags::FIELD_REPEATED);
        }
        self.elements.push(entry);
        repeated
    }

    /// First entry whose name matches, ignoring ASCII case.
    pub fn get_nocase<K: AsRef<[u8]>>(&self, key: K) -> Option<&Header> {
        self.elements
            .iter()
            .find(|x| x.name.eq_nocase_trimmed(key.as_ref()))
    }

    /// First entry whose name matches, ignoring ASCII case and NUL bytes
    /// in the stored name.
    pub fn get_nocase_nozero<K: AsRef<[u8]>>(&self, key: K) -> Option<&Header> {
        self.elements
            .iter()
            .find(|x| x.name.eq_nocase_nozero_trimmed(key.as_ref()))
    }

    /// Mutable variant of [`Headers::get_nocase_nozero`].
    pub fn get_nocase_nozero_mut<K: AsRef<[u8]>>(&mut self, key: K) -> Option<&mut Header> {
        self.elements
            .iter_mut()
            .find(|x| x.name.eq_nocase_nozero_trimmed(key.as_ref()))
    }

    /// Number of entries in the table.
    pub fn size(&self) -> usize {
        self.elements.len()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> std::slice::Iter<'a, Header> {
        self.elements.iter()
    }
}

/// Progress of the request side of a transaction. Progress moves to a
/// state when the activities of that state begin, and never moves
/// backwards.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Debug)]
pub enum RequestProgress {
    /// Default state.
    NotStarted,
    /// Parsing the request line.
    Line,
    /// Parsing request headers.
    Headers,
    /// Consuming the request body.
    Body,
    /// Parsing trailer headers.
    Trailer,
    /// The request side is done.
    Complete,
    /// The request side failed.
    Error,
    /// A gap swallowed part of the request.
    Gap,
}

/// Progress of the response side of a transaction.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Debug)]
pub enum ResponseProgress {
    /// Default state.
    NotStarted,
    /// Parsing the response line.
    Line,
    /// Parsing response headers.
    Headers,
    /// Consuming the response body.
    Body,
    /// Parsing trailer headers.
    Trailer,
    /// The response side is done.
    Complete,
    /// The response side failed.
    Error,
    /// A gap swallowed part of the response.
    Gap,
}

/// Authentication type used in the request.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum HttpAuthType {
    /// Not determined yet (e.g. headers not seen).
    Unknown,
    /// No authentication.
    None,
    /// HTTP Basic.
    Basic,
    /// HTTP Digest.
    Digest,
    /// HTTP Bearer.
    Bearer,
    /// An unrecognized scheme.
    Unrecognized,
}

/// Protocol versions. The ordering is meaningful: later variants are
/// newer protocols, and the pre-version variants sort below all of them.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Debug)]
pub enum HttpProtocol {
    /// Could not be parsed.
    Invalid,
    /// Not parsed yet.
    Unknown,
    /// HTTP/0.9.
    V0_9,
    /// HTTP/1.0.
    V1_0,
    /// HTTP/1.1.
    V1_1,
}

/// One request/response exchange. Owns every parsed artifact of both
/// sides: lines, header tables, URIs, body accounting and anomaly flags.
pub struct Transaction {
    /// Logger handle.
    pub(crate) logger: Logger,
    /// Configuration shared with the owning parser.
    pub(crate) cfg: Rc<Config>,
    /// Opaque user data.
    user_data: Option<Box<dyn Any>>,

    /// Count of empty lines skipped before the request line.
    pub request_ignored_lines: u32,
    /// The raw request line.
    pub request_line: Option<Bstr>,
    /// Request method, as text.
    pub request_method: Option<Bstr>,
    /// Request method, recognized.
    pub request_method_number: Method,
    /// Request URI exactly as present on the request line. For CONNECT
    /// this is an authority; for proxy requests it may be absolute.
    pub request_uri: Option<Bstr>,
    /// Request protocol, as text; absent on HTTP/0.9 short requests.
    pub request_protocol: Option<Bstr>,
    /// Request protocol, recognized.
    pub request_protocol_number: HttpProtocol,
    /// Whether this is a genuine HTTP/0.9 short-form request. The version
    /// number alone cannot tell: "GET / HTTP/0.9" is not treated as 0.9.
    pub is_protocol_0_9: bool,
    /// URI components with normalization applied. Derived from
    /// `parsed_uri_raw`, never built directly, except when CONNECT
    /// authority parsing installs it.
    pub parsed_uri: Option<Uri>,
    /// URI components exactly as supplied, split but not transformed.
    pub parsed_uri_raw: Option<Uri>,
    /// The whole normalized URI, scheme through fragment.
    pub complete_normalized_uri: Option<Bstr>,
    /// The normalized path, query and fragment only.
    pub partial_normalized_uri: Option<Bstr>,
    /// Request body length as seen on the wire (chunk framing included).
    pub request_message_len: u64,
    /// Request body length after dechunking.
    pub request_entity_len: u64,
    /// Parsed request headers.
    pub request_headers: Headers,
    /// Request body framing.
    pub request_transfer_coding: TransferCoding,
    /// Lowercased request content type, parameters stripped.
    pub request_content_type: Option<Bstr>,
    /// Value of the request Content-Length header, once parsed. Stays
    /// `None` when the header is absent or unusable.
    pub request_content_length: Option<u64>,
    /// Transaction-specific request body data hook; runs before the
    /// configuration hook of the same name.
    pub(crate) hook_request_body_data: DataHook,
    /// Transaction-specific response body data hook.
    pub(crate) hook_response_body_data: DataHook,
    /// Authentication type.
    pub request_auth_type: HttpAuthType,
    /// Authentication username, when Basic or Digest credentials parsed.
    pub request_auth_username: Option<Bstr>,
    /// Authentication password, when Basic credentials parsed.
    pub request_auth_password: Option<Bstr>,
    /// Authentication token, when a Bearer token parsed.
    pub request_auth_token: Option<Bstr>,
    /// Cookies, in order of appearance.
    pub request_cookies: Vec<(Bstr, Bstr)>,
    /// Request hostname: from the URI when present there, otherwise from
    /// the Host header. No port information.
    pub request_hostname: Option<Bstr>,
    /// Request port number, when presented.
    pub request_port_number: Option<u16>,

    /// Count of empty lines skipped before the status line.
    pub response_ignored_lines: u32,
    /// The raw response line.
    pub response_line: Option<Bstr>,
    /// Response protocol, as text.
    pub response_protocol: Option<Bstr>,
    /// Response protocol, recognized.
    pub response_protocol_number: HttpProtocol,
    /// Response status code, as text.
    pub response_status: Option<Bstr>,
    /// Response status code, recognized.
    pub response_status_number: ResponseNumber,
    /// Status code the decoder expects the backend server to reject this
    /// request with, based on anomalies seen while decoding.
    pub response_status_expected_number: Unwanted,
    /// The reason phrase.
    pub response_message: Option<Bstr>,
    /// Whether an interim 100 response has been seen already.
    pub seen_100continue: bool,
    /// Parsed response headers.
    pub response_headers: Headers,
    /// Whether this response upgrades the connection to HTTP/2.
    pub is_http_2_upgrade: bool,
    /// Response body length as seen on the wire.
    pub response_message_len: u64,
    /// Response body length after dechunking and decompression.
    pub response_entity_len: u64,
    /// Value of the response Content-Length header, once parsed.
    pub response_content_length: Option<u64>,
    /// Response body framing.
    pub response_transfer_coding: TransferCoding,
    /// Compression indicated by response headers.
    pub response_content_encoding: ContentEncoding,
    /// Compression the parser will actually undo. Clearing this in a
    /// response-headers callback suppresses decompression.
    pub response_content_encoding_processing: ContentEncoding,
    /// Lowercased response content type, parameters stripped.
    pub response_content_type: Option<Bstr>,
    /// Decompression filter for the response body.
    pub(crate) response_decompressor: Option<Decompressor>,

    /// Anomaly flags.
    pub flags: u64,
    /// Request-side progress.
    pub request_progress: RequestProgress,
    /// Response-side progress.
    pub response_progress: ResponseProgress,
    /// Position of this transaction on its connection.
    pub index: usize,
    /// Total header repetitions counted in the request.
    pub request_header_repetitions: u16,
    /// Total header repetitions counted in the response.
    pub response_header_repetitions: u16,
    /// Wire parser for request headers.
    pub(crate) request_header_parser: HeaderWireParser,
    /// Wire parser for response headers.
    pub(crate) response_header_parser: HeaderWireParser,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("index", &self.index)
            .field("request_line", &self.request_line)
            .field("request_method", &self.request_method)
            .field("request_uri", &self.request_uri)
            .field("request_protocol_number", &self.request_protocol_number)
            .field("request_progress", &self.request_progress)
            .field("response_line", &self.response_line)
            .field("response_status_number", &self.response_status_number)
            .field("response_progress", &self.response_progress)
            .field("flags", &self.flags)
            .finish()
    }
}

impl Transaction {
    /// Construct a new transaction at the given connection index.
    pub(crate) fn new(cfg: &Rc<Config>, logger: &Logger, index: usize) -> Self {
        Self {
            logger: logger.clone(),
            cfg: Rc::clone(cfg),
            user_data: None,
            request_ignored_lines: 0,
            request_line: None,
            request_method: None,
            request_method_number: Method::Unknown,
            request_uri: None,
            request_protocol: None,
            request_protocol_number: HttpProtocol::Unknown,
            is_protocol_0_9: false,
            parsed_uri: None,
            parsed_uri_raw: None,
            complete_normalized_uri: None,
            partial_normalized_uri: None,
            request_message_len: 0,
            request_entity_len: 0,
            request_headers: Headers::with_capacity(32),
            request_transfer_coding: TransferCoding::Unknown,
            request_content_type: None,
            request_content_length: None,
            hook_request_body_data: DataHook::default(),
            hook_response_body_data: DataHook::default(),
            request_auth_type: HttpAuthType::Unknown,
            request_auth_username: None,
            request_auth_password: None,
            request_auth_token: None,
            request_cookies: Vec::new(),
            request_hostname: None,
            request_port_number: None,
            response_ignored_lines: 0,
            response_line: None,
            response_protocol: None,
            response_protocol_number: HttpProtocol::Unknown,
            response_status: None,
            response_status_number: ResponseNumber::Unknown,
            response_status_expected_number: Unwanted::Ignore,
            response_message: None,
            seen_100continue: false,
            response_headers: Headers::with_capacity(32),
            is_http_2_upgrade: false,
            response_message_len: 0,
            response_entity_len: 0,
            response_content_length: None,
            response_transfer_coding: TransferCoding::Unknown,
            response_content_encoding: ContentEncoding::None,
            response_content_encoding_processing: ContentEncoding::None,
            response_content_type: None,
            response_decompressor: None,
            flags: 0,
            request_progress: RequestProgress::NotStarted,
            response_progress: ResponseProgress::NotStarted,
            index,
            request_header_repetitions: 0,
            response_header_repetitions: 0,
            request_header_parser: HeaderWireParser::new(Side::Request),
            response_header_parser: HeaderWireParser::new(Side::Response),
        }
    }

    /// Register a transaction-specific request body data callback.
    pub fn register_request_body_data(&mut self, cbk_fn: DataCallbackFn) {
        self.hook_request_body_data.register(cbk_fn)
    }

    /// Register a transaction-specific response body data callback.
    pub fn register_response_body_data(&mut self, cbk_fn: DataCallbackFn) {
        self.hook_response_body_data.register(cbk_fn)
    }

    /// Has either side of this transaction started?
    pub fn is_started(&self) -> bool {
        !(self.request_progress == RequestProgress::NotStarted
            && self.response_progress == ResponseProgress::NotStarted)
    }

    /// A transaction is complete only when both sides are complete; a
    /// finished response can be seen while the request is still arriving.
    pub fn is_complete(&self) -> bool {
        self.request_progress == RequestProgress::Complete
            && self.response_progress == ResponseProgress::Complete
    }

    /// Set the opaque user data.
    pub fn set_user_data(&mut self, data: Box<dyn Any + 'static>) {
        self.user_data = Some(data);
    }

    /// Borrow the opaque user data.
    pub fn user_data<T: 'static>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|ud| ud.downcast_ref::<T>())
    }

    /// Mutably borrow the opaque user data.
    pub fn user_data_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut().and_then(|ud| ud.downcast_mut::<T>())
    }

    /// Whether the request carries a body.
    pub fn request_has_body(&self) -> bool {
        self.request_transfer_coding == TransferCoding::Identity
            || self.request_transfer_coding == TransferCoding::Chunked
    }

    /// Decide the request body framing and resolve the host, content type
    /// and authentication information from the parsed headers.
    pub(crate) fn process_request_headers(&mut self) -> crate::error::Result<()> {
        // Transfer-Encoding takes precedence over Content-Length.
        let te_present = self
            .request_headers
            .get_nocase_nozero("transfer-encoding")
            .is_some();
        if te_present {
            let te = self
                .request_headers
                .get_nocase_nozero("transfer-encoding")
                .ok_or(Status::Error)?;
            if te.value.index_of_nocase_nozero("chunked").is_none() {
                // Any Transfer-Encoding other than chunked is an error;
                // downstream servers disagree wildly on what to do with
                // such requests, which is exactly the ambiguity smuggling
                // needs.
                self.request_transfer_coding = TransferCoding::Invalid;
                self.flags.set(Flags::REQUEST_INVALID_T_E);
                self.flags.set(Flags::REQUEST_INVALID);
            } else {
                // Chunked is an HTTP/1.1 feature; seeing it on an earlier
                // (or unparseable) protocol is framing ambiguity.
                if self.request_protocol_number < HttpProtocol::V1_1 {
                    self.flags.set(Flags::REQUEST_INVALID_T_E);
                    self.flags.set(Flags::REQUEST_SMUGGLING);
                }
                self.request_transfer_coding = TransferCoding::Chunked;
                if self.request_headers.get_nocase_nozero("content-length").is_some() {
                    // Both T-E and C-L present: the RFC says C-L must be
                    // ignored, but the combination is the classic
                    // request-smuggling vector, so flag it.
                    self.flags.set(Flags::REQUEST_SMUGGLING);
                }
            }
        } else if let Some(cl) = self.request_headers.get_nocase_nozero("content-length") {
            let cl = cl.clone();
            if cl.flags.is_set(Flags::FIELD_FOLDED) {
                self.flags.set(Flags::REQUEST_SMUGGLING);
            }
            if cl.flags.is_set(Flags::FIELD_REPEATED) {
                self.flags.set(Flags::REQUEST_SMUGGLING);
            }
            self.request_content_length =
                parse_content_length(cl.value.as_slice(), Some(&mut self.logger));
            if self.request_content_length.is_some() {
                self.request_transfer_coding = TransferCoding::Identity;
            } else {
                self.request_transfer_coding = TransferCoding::Invalid;
                self.flags.set(Flags::REQUEST_INVALID_C_L);
                self.flags.set(Flags::REQUEST_INVALID);
            }
        } else {
            // Neither framing header: no body.
            self.request_transfer_coding = TransferCoding::NoBody;
        }
        if self.request_transfer_coding == TransferCoding::Unknown {
            self.request_transfer_coding = TransferCoding::Invalid;
            self.flags.set(Flags::REQUEST_INVALID);
        }

        // Hostname from the URI wins over the Host header.
        if let Some(hostname) = self.get_parsed_uri_hostname() {
            self.request_hostname = Some(Bstr::from(hostname.as_slice()));
        }
        if let Some(port_number) = self.get_parsed_uri_port_number() {
            self.request_port_number = Some(*port_number);
        }
        if let Some(header) = self.request_headers.get_nocase_nozero("host") {
            let header_value = header.value.clone();
            if let Ok((_, (hostname, port_nmb, valid))) = parse_hostport(header_value.as_slice()) {
                if !valid {
                    self.flags.set(Flags::HOSTH_INVALID);
                }
                if self.request_hostname.is_none() {
                    let mut hostname = Bstr::from(hostname);
                    hostname.make_ascii_lowercase();
                    self.request_hostname = Some(hostname);
                    if let Some((_, port)) = port_nmb {
                        self.request_port_number = port;
                    }
                } else {
                    // Host information both in the URI and in the headers.
                    // The RFC says ignore the header copy, but disagreement
                    // between the two is worth flagging.
                    if let Some(host) = &self.request_hostname {
                        if !host.eq_nocase(hostname) {
                            self.flags.set(Flags::HOST_AMBIGUOUS);
                        }
                    }
                    if let Some((_, port)) = port_nmb {
                        if self.request_port_number.is_some() && self.request_port_number != port {
                            self.flags.set(Flags::HOST_AMBIGUOUS);
                        }
                    }
                }
            } else if self.request_hostname.is_some() {
                self.flags.set(Flags::HOST_AMBIGUOUS);
            }
        } else if self.request_protocol_number >= HttpProtocol::V1_1 {
            // HTTP/1.1 requires host information in the headers.
            self.flags.set(Flags::HOST_MISSING);
        }

        if let Some(ct) = self.request_headers.get_nocase_nozero("content-type") {
            self.request_content_type = Some(parse_content_type(ct.value.as_slice())?);
        }
        if self.cfg.parse_request_cookies {
            parse_cookies(self)?;
        }
        if self.cfg.parse_request_auth {
            parse_authorization(self).or_else(|rc| {
                if rc == Status::Declined {
                    // An unparseable Authorization header is the sender's
                    // problem, not the stream's.
                    self.flags.set(Flags::AUTH_INVALID);
                    Ok(())
                } else {
                    Err(rc)
                }
            })?;
        }
        Ok(())
    }

    /// Build the raw and normalized URI structures from the request-line
    /// URI text.
    pub(crate) fn build_request_uri(&mut self) -> crate::error::Result<()> {
        let mut parsed_uri = Uri::with_config(self.cfg.decoder_cfgs);
        if self.request_method_number == Method::Connect {
            // A CONNECT target is an authority, not a URI.
            parsed_uri.parse_uri_hostport(
                self.request_uri.as_ref().ok_or(Status::Error)?,
                &mut self.flags,
            );
        } else if let Some(uri) = self.request_uri.as_ref() {
            parsed_uri.parse_uri(uri.as_slice());
        }
        self.parsed_uri_raw = Some(parsed_uri);
        // Build the normalized copy, unless a collaborator already
        // installed one.
        if self.parsed_uri.is_none() {
            self.normalize_parsed_uri();
        }
        if let Some(hostname) = self.get_parsed_uri_hostname() {
            if !validate_hostname(hostname.as_slice()) {
                self.flags.set(Flags::HOSTU_INVALID);
            }
        }
        Ok(())
    }

    /// Sanity check the response line, logging an invalid protocol or
    /// status number.
    pub(crate) fn validate_response_line(&mut self) {
        if self.response_protocol_number == HttpProtocol::Invalid {
            htap_warn!(
                self.logger,
                LogCode::ResponseLineInvalidProtocol,
                "Invalid response line: invalid protocol"
            );
            self.flags.set(Flags::STATUS_LINE_INVALID);
        }
        if !self.response_status_number.in_range(100, 999) {
            htap_warn!(
                self.logger,
                LogCode::ResponseLineInvalidResponseStatus,
                "Invalid response line: invalid response status"
            );
            self.response_status_number = ResponseNumber::Invalid;
            self.flags.set(Flags::STATUS_LINE_INVALID);
        }
    }

    /// Return the normalized URI query, if any.
    pub fn get_parsed_uri_query(&self) -> Option<&Bstr> {
        self.parsed_uri.as_ref().and_then(|uri| uri.query.as_ref())
    }

    /// Return the normalized URI hostname, if any.
    pub fn get_parsed_uri_hostname(&self) -> Option<&Bstr> {
        self.parsed_uri.as_ref().and_then(|uri| uri.hostname.as_ref())
    }

    /// Return the normalized URI port number, if any.
    pub fn get_parsed_uri_port_number(&self) -> Option<&u16> {
        self.parsed_uri.as_ref().and_then(|uri| uri.port_number.as_ref())
    }

    /// Derive `parsed_uri` from `parsed_uri_raw`.
    pub(crate) fn normalize_parsed_uri(&mut self) {
        let mut uri = Uri::with_config(self.cfg.decoder_cfgs);
        if let Some(raw) = &self.parsed_uri_raw {
            uri.scheme = raw.normalized_scheme();
            uri.username = raw.normalized_username(&mut self.flags);
            uri.password = raw.normalized_password(&mut self.flags);
            uri.hostname = raw.normalized_hostname(&mut self.flags);
            uri.port_number = raw.normalized_port(&mut self.flags);
            uri.query = raw.query.clone();
            uri.fragment = raw.normalized_fragment(&mut self.flags);
            uri.path =
                raw.normalized_path(&mut self.flags, &mut self.response_status_expected_number);
        }
        self.parsed_uri = Some(uri);
    }
}

impl PartialEq for Transaction {
    /// Two references denote the same transaction when their connection
    /// indices match.
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_preserve_duplicates() {
        let mut t = Headers::with_capacity(2);
        assert!(!t.add(Header::new(Bstr::from("Content-Length"), Bstr::from("5"))));
        assert!(t.add(Header::new(Bstr::from("content-length"), Bstr::from("6"))));
        assert_eq!(t.size(), 2);
        // Lookup returns the first occurrence.
        let first = t.get_nocase("content-length").unwrap();
        assert!(first.value.eq_slice("5"));
        assert!(first.flags.is_set(Flags::FIELD_REPEATED));
        assert!(t.elements[1].flags.is_set(Flags::FIELD_REPEATED));
    }

    #[test]
    fn headers_nozero_lookup() {
        let mut t = Headers::with_capacity(2);
        t.add(Header::new(
            Bstr::from(b"K\x00\x00ey\x001".as_ref()),
            Bstr::from("Value1"),
        ));
        let h = t.get_nocase_nozero("key1").unwrap();
        assert!(h.value.eq_slice("Value1"));
        assert!(t.get_nocase("key1").is_none());
    }
}
