use crate::{
    bstr::Bstr,
    config::{Personality, Unwanted},
    connection::ConnectionFlags,
    connection_parser::{ConnectionParser, ParserData, State, StreamState},
    error::Result,
    headers::HeaderFlags,
    hook::DataHook,
    parsers::{parse_chunked_length, parse_content_length, parse_protocol},
    transaction::{
        Header, HttpProtocol, RequestProgress, ResponseProgress, TransferCoding,
    },
    util::{
        chomp, is_chunked_ctl_line, is_line_ignorable, is_space, is_valid_chunked_length_data,
        split_on_predicate, take_is_space, take_not_is_space, take_till_lf, take_till_lf_null,
        take_until_null, trimmed, FlagOps, Flags,
    },
    Status,
};
use nom::sequence::tuple;
use std::{cmp::min, mem::take};
use time::OffsetDateTime;

/// Request methods.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[allow(missing_docs)]
pub enum Method {
    /// Used until the method is determined.
    Unknown,
    Head,
    Get,
    Put,
    Post,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    Propfind,
    Proppatch,
    Mkcol,
    Copy,
    Move,
    Lock,
    Unlock,
    VersionControl,
    Checkout,
    Uncheckout,
    Checkin,
    Update,
    Label,
    Report,
    Mkworkspace,
    Mkactivity,
    BaselineControl,
    Merge,
    Invalid,
}

impl Method {
    /// Recognize a method token. Matching is exact; methods are
    /// case-sensitive on the wire.
    pub(crate) fn new(method: &[u8]) -> Self {
        match method {
            b"GET" => Method::Get,
            b"PUT" => Method::Put,
            b"POST" => Method::Post,
            b"DELETE" => Method::Delete,
            b"CONNECT" => Method::Connect,
            b"OPTIONS" => Method::Options,
            b"TRACE" => Method::Trace,
            b"PATCH" => Method::Patch,
            b"PROPFIND" => Method::Propfind,
            b"PROPPATCH" => Method::Proppatch,
            b"MKCOL" => Method::Mkcol,
            b"COPY" => Method::Copy,
            b"MOVE" => Method::Move,
            b"LOCK" => Method::Lock,
            b"UNLOCK" => Method::Unlock,
            b"VERSION-CONTROL" => Method::VersionControl,
            b"CHECKOUT" => Method::Checkout,
            b"UNCHECKOUT" => Method::Uncheckout,
            b"CHECKIN" => Method::Checkin,
            b"UPDATE" => Method::Update,
            b"LABEL" => Method::Label,
            b"REPORT" => Method::Report,
            b"MKWORKSPACE" => Method::Mkworkspace,
            b"MKACTIVITY" => Method::Mkactivity,
            b"BASELINE-CONTROL" => Method::BaselineControl,
            b"MERGE" => Method::Merge,
            b"INVALID" => Method::Invalid,
            b"HEAD" => Method::Head,
            _ => Method::Unknown,
        }
    }
}

impl ConnectionParser {
    /// Send outstanding raw bytes to the active inbound data receiver.
    fn request_receiver_send_data(&mut self, data: &mut ParserData) -> Result<()> {
        let hook = match &self.request_data_receiver_hook {
            Some(hook) => hook.clone(),
            None => return Ok(()),
        };
        let data = ParserData::from(data.callback_data());
        let req = self.request_mut().ok_or(Status::Error)?;
        hook.run_all(req, &data)
    }

    /// Install (or clear) the inbound raw-data receiver.
    fn request_receiver_set(&mut self, data_receiver_hook: Option<DataHook>) {
        self.request_data_receiver_hook = data_receiver_hook;
    }

    /// Send the receiver its final bytes and remove it. The last call a
    /// receiver sees is the (possibly zero-length) flush performed here.
    pub(crate) fn request_receiver_finalize_clear(
        &mut self, input: &mut ParserData,
    ) -> Result<()> {
        if self.request_data_receiver_hook.is_none() {
            return Ok(());
        }
        let rc = self.request_receiver_send_data(input);
        self.request_data_receiver_hook = None;
        rc
    }

    /// React to request-side state changes: raw-data receivers are
    /// installed exactly when the headers state is entered and removed
    /// when it is left.
    fn request_handle_state_change(&mut self, input: &mut ParserData) -> Result<()> {
        if self.request_state_previous == Some(self.request_state) {
            return Ok(());
        }
        if self.request_state == State::Headers {
            let header_fn = Some(self.cfg.hook_request_header_data.clone());
            let trailer_fn = Some(self.cfg.hook_request_trailer_data.clone());
            input.reset_callback_start();
            let progress = self.request().ok_or(Status::Error)?.request_progress;
            match progress {
                RequestProgress::Headers => self.request_receiver_set(header_fn),
                RequestProgress::Trailer => self.request_receiver_set(trailer_fn),
                _ => {}
            }
        }
        self.request_state_previous = Some(self.request_state);
        Ok(())
    }

    /// Check that buffering `len` more bytes stays within the hard field
    /// limit. Exceeding the limit is fatal; it is what stops an endless
    /// header line from eating memory.
    fn check_request_buffer_limit(&mut self, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let mut newlen = self.request_buf.len().wrapping_add(len);
        if let Some(header) = &self.request_header {
            newlen = newlen.wrapping_add(header.len());
        }
        let field_limit = self.cfg.field_limit;
        if newlen > field_limit {
            htap_error!(
                self.logger,
                LogCode::RequestFieldTooLong,
                format!(
                    "Request buffer over the limit: size {} limit {}.",
                    newlen, field_limit
                )
            );
            return Err(Status::Error);
        }
        Ok(())
    }

    /// A CONNECT request cannot carry a body, but its handling depends on
    /// the response, so inbound parsing has to pause until the other side
    /// answers.
    pub(crate) fn request_connect_check(&mut self) -> Result<()> {
        let req = self.request().ok_or(Status::Error)?;
        if req.request_method_number == Method::Connect {
            self.request_state = State::ConnectWaitResponse;
            self.request_status = StreamState::DataOther;
            return Err(Status::DataOther);
        }
        self.request_state = State::BodyDetermine;
        Ok(())
    }

    /// Probe post-CONNECT tunnel data: if it still looks like HTTP keep
    /// parsing it, otherwise switch both directions to tunnel mode.
    pub(crate) fn request_connect_probe_data(&mut self, input: &mut ParserData) -> Result<()> {
        let data = if let Ok((_, data)) = take_till_lf_null(input.as_slice()) {
            data
        } else {
            return self.handle_request_absent_lf(input);
        };
        if !self.request_buf.is_empty() {
            self.check_request_buffer_limit(data.len())?;
        }
        let mut buffered = self.request_buf.clone();
        buffered.add(data);
        // A known method token means plain HTTP is flowing through the
        // tunnel; IIS tolerates leading whitespace, so skip it.
        let mut probe = tuple((take_is_space, take_not_is_space));
        if let Ok((_, (_, method))) = probe(buffered.as_slice()) {
            if Method::new(method) == Method::Unknown {
                self.request_status = StreamState::Tunnel;
                self.response_status = StreamState::Tunnel;
            } else {
                return self.state_request_complete(input);
            }
        }
        Ok(())
    }

    /// Resume a CONNECT request once the response verdict is in: 2xx means
    /// an established tunnel (probe it), anything else means the HTTP
    /// stream continues.
    pub(crate) fn request_connect_wait_response(&mut self) -> Result<()> {
        let req = self.request().ok_or(Status::Error)?;
        if req.response_progress <= ResponseProgress::Line {
            return Err(Status::DataOther);
        }
        if req.response_status_number.in_range(200, 299) {
            self.request_state = State::ConnectProbeData;
        } else {
            self.request_state = State::Finalize;
        }
        Ok(())
    }

    /// Consume the line terminator that follows a chunk's payload.
    pub(crate) fn request_body_chunked_data_end(&mut self, input: &mut ParserData) -> Result<()> {
        match take_till_lf(input.as_slice()) {
            Ok((_, line)) => {
                let req = self.request_mut().ok_or(Status::Error)?;
                req.request_message_len = req.request_message_len.wrapping_add(line.len() as u64);
                self.request_data_consume(input, line.len());
                self.request_state = State::BodyChunkedLength;
                Ok(())
            }
            _ => {
                let req = self.request_mut().ok_or(Status::Error)?;
                req.request_message_len = req.request_message_len.wrapping_add(input.len() as u64);
                self.handle_request_absent_lf(input)
            }
        }
    }

    /// Consume chunk payload bytes, passing them to the body-data hooks.
    pub(crate) fn request_body_chunked_data(&mut self, input: &mut ParserData) -> Result<()> {
        let bytes_to_consume = min(
            input.len(),
            self.request_chunked_length.unwrap_or(0) as usize,
        );
        if bytes_to_consume == 0 {
            return Err(Status::Data);
        }
        self.request_body_data(Some(&input.as_slice()[0..bytes_to_consume]))?;
        self.request_data_consume(input, bytes_to_consume);
        if let Some(len) = self.request_chunked_length.as_mut() {
            *len -= bytes_to_consume as u64;
            if *len == 0 {
                self.request_state = State::BodyChunkedDataEnd;
                return Ok(());
            }
        }
        Err(Status::Data)
    }

    /// Read one chunk-length line. Zero length moves to the trailer pass;
    /// an unparseable length is fatal on the request side.
    pub(crate) fn request_body_chunked_length(&mut self, input: &mut ParserData) -> Result<()> {
        let mut data = input.as_slice();
        loop {
            match take_till_lf(data) {
                Ok((remaining, line)) => {
                    self.request_data_consume(input, line.len());
                    if !self.request_buf.is_empty() {
                        self.check_request_buffer_limit(line.len())?;
                    }
                    let mut full_line = take(&mut self.request_buf);
                    full_line.add(line);
                    if is_chunked_ctl_line(full_line.as_slice()) {
                        let req = self.request_mut().ok_or(Status::Error)?;
                        req.request_message_len =
                            req.request_message_len.wrapping_add(full_line.len() as u64);
                        // An empty chunk-length line; keep scanning.
                        data = remaining;
                        continue;
                    }
                    let req = self.request_mut().ok_or(Status::Error)?;
                    req.request_message_len =
                        req.request_message_len.wrapping_add(full_line.len() as u64);
                    let (len, ext) = parse_chunked_length(full_line.as_slice())?;
                    self.request_chunked_length = len;
                    if ext {
                        htap_warn!(
                            self.logger,
                            LogCode::RequestChunkExtension,
                            "Request chunk extension"
                        );
                    }
                    match len {
                        Some(0) => {
                            // Last chunk; trailers follow.
                            self.request_state = State::Headers;
                            self.request_mut().ok_or(Status::Error)?.request_progress =
                                RequestProgress::Trailer;
                        }
                        Some(_) => {
                            self.request_state = State::BodyChunkedData;
                        }
                        None => {
                            htap_error!(
                                self.logger,
                                LogCode::InvalidRequestChunkLen,
                                "Request chunk encoding: Invalid chunk length"
                            );
                            return Err(Status::Error);
                        }
                    }
                    return Ok(());
                }
                _ => {
                    return if self.request_buf.is_empty() && !is_valid_chunked_length_data(data) {
                        // Leading junk that can never become a hex length.
                        htap_error!(
                            self.logger,
                            LogCode::InvalidRequestChunkLen,
                            "Request chunk encoding: Invalid chunk length"
                        );
                        Err(Status::Error)
                    } else {
                        self.handle_request_absent_lf(input)
                    };
                }
            }
        }
    }

    /// Consume identity request body bytes up to the declared length.
    pub(crate) fn request_body_identity(&mut self, data: &mut ParserData) -> Result<()> {
        let left = self.request_body_data_left.ok_or(Status::Error)?;
        let bytes_to_consume = min(data.len(), left as usize);
        if bytes_to_consume == 0 {
            return Err(Status::Data);
        }
        if data.is_gap() {
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_message_len = req
                .request_message_len
                .wrapping_add(bytes_to_consume as u64);
            req.request_entity_len = req.request_entity_len.wrapping_add(bytes_to_consume as u64);
            // Pass the gap through to the body hooks.
            let gap = ParserData::from(bytes_to_consume);
            self.request_run_hook_body_data(&gap)?;
        } else {
            self.request_body_data(Some(&data.as_slice()[0..bytes_to_consume]))?;
        }
        self.request_data_consume(data, bytes_to_consume);
        self.request_body_data_left = Some(left - bytes_to_consume as u64);
        if self.request_body_data_left > Some(0) {
            return Err(Status::Data);
        }
        // End of the body; the end marker goes out when the request side
        // finalizes.
        self.request_state = State::Finalize;
        Ok(())
    }

    /// Decide how the request body is framed and which state reads it.
    pub(crate) fn request_body_determine(&mut self) -> Result<()> {
        let req = self.request_mut().ok_or(Status::Error)?;
        match req.request_transfer_coding {
            TransferCoding::Chunked => {
                req.request_progress = RequestProgress::Body;
                self.request_state = State::BodyChunkedLength;
            }
            TransferCoding::Identity => {
                if req.request_content_length > Some(0) {
                    req.request_progress = RequestProgress::Body;
                }
                self.request_content_length = req.request_content_length;
                self.request_body_data_left = self.request_content_length;
                if self.request_content_length > Some(0) {
                    self.request_state = State::BodyIdentity;
                } else {
                    self.request_state = State::Finalize;
                }
            }
            TransferCoding::NoBody => {
                if req.request_method_number == Method::Put {
                    // A PUT with nothing to put. Proceed without a body.
                    htap_warn!(
                        self.logger,
                        LogCode::PutRequestMissingBody,
                        "PUT request has no body"
                    );
                }
                self.request_state = State::Finalize;
            }
            _ => {
                // Invalid/unknown framing cannot be read safely.
                return Err(Status::Error);
            }
        }
        Ok(())
    }

    /// Parse request headers (or trailers) out of the accumulated input.
    pub(crate) fn request_headers(&mut self, input: &mut ParserData) -> Result<()> {
        if self.request_status == StreamState::Closed {
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_header_parser.set_complete(true);
            req.request_progress = RequestProgress::Trailer;
            if let Some(request_header) = self.request_header.take() {
                self.parse_request_headers(request_header.as_slice())?;
            }
            self.request_buf.clear();
            return self.state_request_headers(input);
        }
        if take_till_lf(input.as_slice()).is_err() {
            // No line terminator in sight; buffer what we have.
            let data = input.as_slice();
            self.request_data_consume(input, data.len());
            self.check_request_buffer_limit(data.len())?;
            if let Some(rh) = &mut self.request_header {
                rh.add(data);
            } else {
                self.request_header = Some(Bstr::from(data));
            }
            return Err(Status::DataBuffer);
        }
        let request_header = if let Some(mut request_header) = self.request_header.take() {
            request_header.add(input.as_slice());
            request_header
        } else {
            Bstr::from(input.as_slice())
        };

        let (remaining, eoh) = self.parse_request_headers(request_header.as_slice())?;
        let eol = remaining.len() == request_header.len()
            && (remaining.starts_with(b"\r\n") || remaining.starts_with(b"\n"));
        if eoh || eol {
            if eol {
                // The empty line is consumed but carries no header data.
                self.request_data_consume(input, input.len());
            } else if remaining.len() <= input.len() {
                self.request_data_consume(input, input.len() - remaining.len());
            }
            self.state_request_headers(input)
        } else {
            self.request_data_consume(input, input.len());
            self.check_request_buffer_limit(remaining.len())?;
            let remaining = Bstr::from(remaining);
            self.request_header.replace(remaining);
            Err(Status::DataBuffer)
        }
    }

    /// Decide whether headers follow the request line. Only genuine
    /// HTTP/0.9 short requests skip them.
    pub(crate) fn request_protocol(&mut self, input: &mut ParserData) -> Result<()> {
        let req = self.request_mut().ok_or(Status::Error)?;
        if !req.is_protocol_0_9 {
            req.request_progress = RequestProgress::Headers;
            self.request_state = State::Headers;
            return Ok(());
        }
        if let Ok((rem, _)) = take_is_space(input.as_slice()) {
            if !rem.is_empty() {
                // More than trailing whitespace: not 0.9 after all.
                let req = self.request_mut().ok_or(Status::Error)?;
                req.is_protocol_0_9 = false;
                req.request_progress = RequestProgress::Headers;
                htap_warn!(
                    self.logger,
                    LogCode::RequestLineNoProtocol,
                    "Request line: missing protocol"
                );
                self.request_state = State::Headers;
                return Ok(());
            }
        }
        self.request_state = State::Finalize;
        Ok(())
    }

    /// Process one full request line (terminator already located).
    fn request_line_complete(&mut self, line: &[u8]) -> Result<()> {
        self.check_request_buffer_limit(line.len())?;
        if line.is_empty() {
            return Err(Status::Data);
        }
        let personality = self.cfg.server_personality;
        if is_line_ignorable(personality, line) {
            // Note the empty/whitespace line and move on.
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_ignored_lines = req.request_ignored_lines.wrapping_add(1);
            return Ok(());
        }
        let data = chomp(line);
        self.parse_request_line(data)?;
        self.state_request_line()?;
        Ok(())
    }

    /// Scan for the end of the request line, buffering across chunks.
    pub(crate) fn request_line(&mut self, input: &mut ParserData) -> Result<()> {
        match take_till_lf(input.as_slice()) {
            Ok((_, line)) => {
                let mut data = take(&mut self.request_buf);
                data.add(line);
                self.request_data_consume(input, line.len());
                self.request_line_complete(data.as_slice())
            }
            _ => {
                if self.request_status == StreamState::Closed {
                    let mut data = take(&mut self.request_buf);
                    data.add(input.as_slice());
                    self.request_data_consume(input, input.len());
                    self.request_line_complete(data.as_slice())
                } else {
                    self.handle_request_absent_lf(input)
                }
            }
        }
    }

    /// Record one parsed request header in the transaction's table.
    /// Duplicates are preserved, not merged; an ambiguous Content-Length
    /// repetition marks the request as smuggling-suspect and invalid.
    fn process_request_header(&mut self, header: Header) -> Result<()> {
        let header_limit = self.cfg.number_headers_limit as usize;
        let mut repeated = false;
        let mut too_many = false;
        let mut ambiguous_cl = false;
        {
            let req = self.request_mut().ok_or(Status::Error)?;
            let reps = req.request_header_repetitions;
            let mut update_reps = false;
            if let Some(existing) = req.request_headers.get_nocase(header.name.as_slice()) {
                repeated = true;
                if existing.flags.is_set(Flags::FIELD_REPEATED) {
                    if reps < 64 {
                        update_reps = true;
                    } else {
                        // Runaway repetition; stop storing copies.
                        return Ok(());
                    }
                }
                if header.name.eq_nocase("content-length") {
                    let existing_cl = parse_content_length(existing.value.as_slice(), None);
                    let new_cl = parse_content_length(header.value.as_slice(), None);
                    if existing_cl.is_none() || new_cl.is_none() || existing_cl != new_cl {
                        ambiguous_cl = true;
                    }
                }
            } else if req.request_headers.size() > header_limit {
                if !req.flags.is_set(Flags::HEADERS_TOO_MANY) {
                    req.flags.set(Flags::HEADERS_TOO_MANY);
                    too_many = true;
                }
            }
            if !too_many {
                req.request_headers.add(header);
            }
            if update_reps {
                req.request_header_repetitions = req.request_header_repetitions.wrapping_add(1);
            }
            if ambiguous_cl {
                req.flags.set(Flags::REQUEST_SMUGGLING);
                req.flags.set(Flags::REQUEST_INVALID);
            }
        }
        if too_many {
            htap_warn!(
                self.logger,
                LogCode::RequestTooManyHeaders,
                "Too many request headers"
            );
            return Err(Status::Error);
        }
        if ambiguous_cl {
            htap_warn!(
                self.logger,
                LogCode::DuplicateContentLengthFieldInRequest,
                "Ambiguous request C-L value"
            );
        }
        if repeated {
            htap_warn!(
                self.logger,
                LogCode::RequestHeaderRepetition,
                "Repetition for header"
            );
        }
        Ok(())
    }

    /// Run the wire parser over header data and fold the per-header flags
    /// into transaction anomalies.
    fn parse_request_headers<'a>(&mut self, data: &'a [u8]) -> Result<(&'a [u8], bool)> {
        let rc = {
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_header_parser.headers()(data)
        };
        if let Ok((remaining, (headers, eoh))) = rc {
            for h in headers {
                let mut flags = 0;
                let name_flags = h.name.flags;
                if name_flags.is_set(HeaderFlags::NAME_TRAILING_WHITESPACE) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::RequestInvalidLwsAfterName,
                        "Request field invalid: LWS after name",
                        self.request_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_INVALID
                    );
                }
                if name_flags.is_set(HeaderFlags::NAME_LEADING_WHITESPACE) {
                    // Leading whitespace on a name is folding onto a
                    // header that is not there.
                    htap_warn_once!(
                        self.logger,
                        LogCode::InvalidRequestFieldFolding,
                        "Invalid request field folding",
                        self.request_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::INVALID_FOLDING
                    );
                }
                if name_flags.is_set(HeaderFlags::NAME_NON_TOKEN_CHARS) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::RequestHeaderInvalid,
                        "Request header name is not a token",
                        self.request_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_INVALID
                    );
                }
                if name_flags.is_set(HeaderFlags::MISSING_COLON) {
                    // Handled as a header with an empty name and the whole
                    // line as the value.
                    htap_warn_once!(
                        self.logger,
                        LogCode::RequestFieldMissingColon,
                        "Request field invalid: colon missing",
                        self.request_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_UNPARSEABLE
                    );
                } else if name_flags.is_set(HeaderFlags::NAME_EMPTY) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::RequestInvalidEmptyName,
                        "Request field invalid: empty name",
                        self.request_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_INVALID
                    );
                }
                let mut value_flags = flags;
                if h.value.flags.is_set(HeaderFlags::FOLDING) {
                    value_flags.set(Flags::FIELD_FOLDED);
                }
                self.process_request_header(Header::new_with_flags(
                    h.name.name.into(),
                    h.value.value.into(),
                    value_flags,
                ))?;
            }
            Ok((remaining, eoh))
        } else {
            Ok((data, false))
        }
    }

    /// Split the request line into method, URI and protocol.
    pub(crate) fn parse_request_line(&mut self, request_line: &[u8]) -> Result<()> {
        {
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_line = Some(Bstr::from(request_line));
        }
        let mut data: &[u8] = request_line;
        if self.cfg.server_personality == Personality::Apache2 {
            // Apache treats the request line as NUL-terminated.
            if let Ok((_, before_null)) = take_until_null(data) {
                data = before_null;
            }
        }
        // The method runs from the start of the line to the first
        // whitespace. Leading whitespace is tolerated because IIS
        // tolerates it; what follows the method may be delimited by any
        // whitespace, since that is what Apache accepts.
        let mut method_parser = tuple((take_is_space, take_not_is_space, take_is_space));
        let mut keep_leading_in_method = false;
        if let Ok((remaining, (leading, method, ws))) = method_parser(data) {
            if !leading.is_empty() {
                htap_warn!(
                    self.logger,
                    LogCode::RequestLineLeadingWhitespace,
                    "Request line: leading whitespace"
                );
                let unwanted = self.cfg.requestline_leading_whitespace_unwanted;
                if unwanted != Unwanted::Ignore {
                    // Fold the whitespace into the method and note the
                    // status the server would have answered with.
                    keep_leading_in_method = true;
                    let req = self.request_mut().ok_or(Status::Error)?;
                    req.response_status_expected_number = unwanted;
                }
            }
            {
                let req = self.request_mut().ok_or(Status::Error)?;
                if keep_leading_in_method {
                    req.request_method = Some(Bstr::from([leading, method].concat()));
                } else {
                    req.request_method = Some(Bstr::from(method));
                }
                if let Some(request_method) = &req.request_method {
                    req.request_method_number = Method::new(request_method.as_slice());
                }
            }
            if ws.iter().any(|&c| c != 0x20) {
                htap_warn!(
                    self.logger,
                    LogCode::MethodDelimNonCompliant,
                    "Request line: non-compliant delimiter between Method and URI"
                );
            }
            if remaining.is_empty() {
                // Nothing after the method: HTTP/0.9 short form.
                let req = self.request_mut().ok_or(Status::Error)?;
                req.is_protocol_0_9 = true;
                req.request_protocol_number = HttpProtocol::V0_9;
                if req.request_method_number == Method::Unknown {
                    req.flags.set(Flags::REQUEST_INVALID);
                    htap_warn!(
                        self.logger,
                        LogCode::RequestLineUnknownMethod,
                        "Request line: unknown method only"
                    );
                }
                return Ok(());
            }
            let remaining = trimmed(remaining);
            let allow_space_uri = self.cfg.decoder_cfg(crate::config::DecoderCtx::Defaults)
                .allow_space_uri;
            let (mut uri, mut protocol) =
                split_on_predicate(remaining, allow_space_uri, true, |c| *c == 0x20);
            if uri.len() == remaining.len() && uri.iter().any(|&c| is_space(c)) {
                htap_warn!(
                    self.logger,
                    LogCode::UriDelimNonCompliant,
                    "Request line: URI contains non-compliant delimiter"
                );
                // Retry the split on the non-compliant delimiters.
                let uri_protocol =
                    split_on_predicate(remaining, allow_space_uri, true, |c| is_space(*c));
                uri = uri_protocol.0;
                protocol = uri_protocol.1;
            }
            {
                let req = self.request_mut().ok_or(Status::Error)?;
                req.request_uri = Some(Bstr::from(uri));
            }
            if protocol.is_empty() {
                let req = self.request_mut().ok_or(Status::Error)?;
                req.is_protocol_0_9 = true;
                req.request_protocol_number = HttpProtocol::V0_9;
                if req.request_method_number == Method::Unknown {
                    req.flags.set(Flags::REQUEST_INVALID);
                    htap_warn!(
                        self.logger,
                        LogCode::RequestLineUnknownMethodNoProtocol,
                        "Request line: unknown method and no protocol"
                    );
                }
                return Ok(());
            }
            {
                let req = self.request_mut().ok_or(Status::Error)?;
                req.request_protocol = Some(Bstr::from(protocol));
            }
            let protocol_number = parse_protocol(protocol, &mut self.logger);
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_protocol_number = protocol_number;
            if req.request_method_number == Method::Unknown
                && req.request_protocol_number == HttpProtocol::Invalid
            {
                req.flags.set(Flags::REQUEST_INVALID);
                htap_warn!(
                    self.logger,
                    LogCode::RequestLineUnknownMethodInvalidProtocol,
                    "Request line: unknown method and invalid protocol"
                );
            }
        }
        Ok(())
    }

    /// Pass request body data to the body hooks, keeping the length
    /// counters current. `None` marks the end of the body.
    pub(crate) fn request_body_data(&mut self, data: Option<&[u8]>) -> Result<()> {
        {
            let req = self.request_mut().ok_or(Status::Error)?;
            let len = data.unwrap_or(b"").len() as u64;
            req.request_message_len = req.request_message_len.wrapping_add(len);
            req.request_entity_len = req.request_entity_len.wrapping_add(len);
        }
        let data = ParserData::from(data);
        self.request_run_hook_body_data(&data).map_err(|e| {
            htap_error!(
                self.logger,
                LogCode::RequestBodyDataCallbackError,
                format!("Request body data callback returned error ({:?})", e)
            );
            e
        })
    }

    /// Finalize the request: look at whatever trailing bytes remain and
    /// decide whether they belong to this request or to the next one.
    pub(crate) fn request_finalize(&mut self, input: &mut ParserData) -> Result<()> {
        if input.is_gap() {
            return self.state_request_complete(input);
        }
        let mut work = input.as_slice();
        if self.request_status != StreamState::Closed {
            if input.as_slice().first().is_none() {
                return self.state_request_complete(input);
            }
            if let Ok((_, line)) = take_till_lf(work) {
                self.request_data_consume(input, line.len());
                work = line;
            } else {
                return self.handle_request_absent_lf(input);
            }
        }
        if !self.request_buf.is_empty() {
            self.check_request_buffer_limit(work.len())?;
        }
        let mut data = take(&mut self.request_buf);
        let buf_len = data.len();
        data.add(work);
        if data.is_empty() {
            // Stream closing with nothing pending.
            return self.state_request_complete(input);
        }
        let mut probe = tuple((take_is_space, take_not_is_space));
        if let Ok((_, (_, method))) = probe(data.as_slice()) {
            if method.is_empty() {
                // A whitespace-only line; treat it as body data.
                let rc = self.request_body_data(Some(data.as_slice()));
                self.request_buf.clear();
                return rc;
            }
            if Method::new(method) == Method::Unknown {
                if self.request_body_data_left.unwrap_or(0) == 0 {
                    htap_warn!(
                        self.logger,
                        LogCode::RequestBodyUnexpected,
                        "Unexpected request body"
                    );
                } else {
                    self.request_body_data_left = Some(1);
                }
                // Interpret the remaining bytes as body data.
                let rc = self.request_body_data(Some(data.as_slice()));
                self.request_buf.clear();
                return rc;
            }
            self.request_body_data_left = None;
        }
        // The data was not used; restore it and rewind so the next
        // request's line parser sees it.
        self.request_buf.add(&data.as_slice()[0..buf_len]);
        self.request_data_unconsume(input, data.len());
        self.state_request_complete(input)
    }

    /// Absorb whatever follows an HTTP/0.9 exchange.
    pub(crate) fn request_ignore_data_after_http_0_9(
        &mut self, data: &mut ParserData,
    ) -> Result<()> {
        if !data.is_empty() {
            self.conn.flags.set(ConnectionFlags::HTTP_0_9_EXTRA);
        }
        self.request_data_consume(data, data.len());
        Err(Status::Data)
    }

    /// Between transactions. A new request starts only once at least one
    /// byte is available, so idle connections do not allocate.
    pub(crate) fn request_idle(&mut self, data: &mut ParserData) -> Result<()> {
        if data.is_empty() {
            // On close, buffered bytes still deserve processing.
            if self.request_status != StreamState::Closed || self.request_buf.is_empty() {
                return Err(Status::Data);
            }
        }
        self.request_reset();
        let _ = self.state_request_start();
        Ok(())
    }

    /// Buffer a partial unit that spans the chunk boundary and ask for
    /// more data, subject to the field limit.
    fn handle_request_absent_lf(&mut self, data: &ParserData) -> Result<()> {
        self.check_request_buffer_limit(data.len())?;
        self.request_buf.add(data.as_slice());
        self.request_data_consume(data, data.len());
        Err(Status::DataBuffer)
    }

    /// Run the request body-data hooks: transaction-level first, then
    /// configuration-level. Empty chunks are suppressed; the end marker
    /// and gaps go through.
    fn request_run_hook_body_data(&mut self, d: &ParserData) -> Result<()> {
        if d.is_empty() && !d.is_end() {
            return Ok(());
        }
        let tx_hook = self
            .request_mut()
            .ok_or(Status::Error)?
            .hook_request_body_data
            .clone();
        let cfg_hook = self.cfg.hook_request_body_data.clone();
        let req = self.request_mut().ok_or(Status::Error)?;
        tx_hook.run_all(req, d)?;
        cfg_hook.run_all(req, d)
    }

    /// Inbound entry point: process one chunk of request data. Drives the
    /// state machine until it runs out of data or hits a terminal
    /// condition, and reports the stream state to the caller.
    pub fn request_data(
        &mut self, mut chunk: ParserData, timestamp: Option<OffsetDateTime>,
    ) -> StreamState {
        self.request_bytes_consumed = 0;
        if self.request_status == StreamState::Stop {
            htap_info!(
                self.logger,
                LogCode::ParserStateError,
                "Inbound parser is in STOP state"
            );
            return StreamState::Stop;
        }
        if self.request_status == StreamState::Error {
            htap_error!(
                self.logger,
                LogCode::ParserStateError,
                "Inbound parser is in ERROR state"
            );
            return StreamState::Error;
        }
        // Zero-length feeds are only the close flush; anything else is a
        // caller error.
        if chunk.is_empty() && self.request_status != StreamState::Closed {
            htap_error!(
                self.logger,
                LogCode::ZeroLengthDataChunks,
                "Zero-length data chunks are not allowed"
            );
            return StreamState::Closed;
        }
        if let Some(timestamp) = timestamp {
            self.request_timestamp = timestamp;
        }
        self.request_chunk_count = self.request_chunk_count.wrapping_add(1);
        self.conn.track_inbound_data(chunk.len());
        if self.request_status == StreamState::Tunnel {
            // Tunnel traffic is not parsed.
            return StreamState::Tunnel;
        }
        if self.response_status == StreamState::DataOther {
            self.response_status = StreamState::Data;
        }
        if chunk.is_gap() {
            let idx = self.request_index();
            let req = match self.request_mut() {
                Some(req) => req,
                None => return StreamState::Error,
            };
            req.flags.set(Flags::REQUEST_MISSING_BYTES);
            if idx == 0 && req.request_progress == RequestProgress::NotStarted {
                // A gap before the first request line: no way to recover.
                req.request_progress = RequestProgress::Gap;
                self.request_status = StreamState::Error;
                return StreamState::Error;
            }
        }

        // Run state functions until one reports an error or runs out of
        // data; the states leave their own log records, so no commentary
        // is added here.
        loop {
            if chunk.is_gap()
                && self.request_state != State::BodyIdentity
                && self.request_state != State::IgnoreDataAfterHttp09
                && self.request_state != State::Finalize
            {
                htap_error!(
                    self.logger,
                    LogCode::InvalidGap,
                    "Gaps are not allowed during this state"
                );
                return StreamState::Closed;
            }
            let mut rc = self.handle_request_state(&mut chunk);
            if rc.is_ok() {
                if self.request_status == StreamState::Tunnel {
                    return StreamState::Tunnel;
                }
                rc = self.request_handle_state_change(&mut chunk);
            }
            match rc {
                Ok(_) => {}
                Err(Status::Data) | Err(Status::DataBuffer) => {
                    let _ = self.request_receiver_send_data(&mut chunk);
                    self.request_status = StreamState::Data;
                    return StreamState::Data;
                }
                Err(Status::DataOther) => {
                    if chunk.is_empty() {
                        // The entire chunk was consumed after all.
                        self.request_status = StreamState::Data;
                        return StreamState::Data;
                    } else {
                        self.request_status = StreamState::DataOther;
                        return StreamState::DataOther;
                    }
                }
                Err(Status::Stop) => {
                    self.request_status = StreamState::Stop;
                    return StreamState::Stop;
                }
                Err(_) => {
                    self.request_status = StreamState::Error;
                    return StreamState::Error;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"GET", Method::Get)]
    #[case(b"PUT", Method::Put)]
    #[case(b"POST", Method::Post)]
    #[case(b"CONNECT", Method::Connect)]
    #[case(b"PoST", Method::Unknown)]
    #[case(b"post", Method::Unknown)]
    #[case(b"NOT_METHOD", Method::Unknown)]
    fn test_method(#[case] input: &[u8], #[case] expected: Method) {
        assert_eq!(Method::new(input), expected);
    }
}
