use crate::{
    bstr::Bstr,
    connection_parser::{ConnectionParser, ParserData, State, StreamState},
    decompressors::{ContentEncoding, Decompressor},
    error::Result,
    headers::HeaderFlags,
    hook::DataHook,
    parsers::{parse_chunked_length, parse_content_length, parse_protocol, parse_status},
    request::Method,
    transaction::{
        Header, HttpProtocol, RequestProgress, ResponseNumber, ResponseProgress, TransferCoding,
    },
    util::{
        chomp, is_chunked_ctl_line, is_line_ignorable, is_space, is_valid_chunked_length_data,
        take_ascii_whitespace, take_is_space, take_is_space_or_null, take_not_is_space,
        take_till_eol, take_till_lf, treat_response_line_as_body, FlagOps, Flags,
    },
    Status,
};
use nom::{bytes::streaming::take_till as streaming_take_till, error::ErrorKind, sequence::tuple};
use std::{cmp::min, mem::take};
use time::OffsetDateTime;

impl ConnectionParser {
    /// Send outstanding raw bytes to the active outbound data receiver.
    fn response_receiver_send_data(&mut self, data: &mut ParserData) -> Result<()> {
        let hook = match &self.response_data_receiver_hook {
            Some(hook) => hook.clone(),
            None => return Ok(()),
        };
        let data = ParserData::from(data.callback_data());
        let resp = self.response_mut().ok_or(Status::Error)?;
        hook.run_all(resp, &data)
    }

    /// Send the receiver its final bytes and remove it.
    pub(crate) fn response_receiver_finalize_clear(
        &mut self, input: &mut ParserData,
    ) -> Result<()> {
        if self.response_data_receiver_hook.is_none() {
            return Ok(());
        }
        let rc = self.response_receiver_send_data(input);
        self.response_data_receiver_hook = None;
        rc
    }

    /// Install (or clear) the outbound raw-data receiver.
    fn response_receiver_set(&mut self, data_receiver_hook: Option<DataHook>) {
        self.response_data_receiver_hook = data_receiver_hook;
    }

    /// React to response-side state changes; mirrors the request side.
    fn response_handle_state_change(&mut self, input: &mut ParserData) -> Result<()> {
        if self.response_state_previous == Some(self.response_state) {
            return Ok(());
        }
        if self.response_state == State::Headers {
            let header_fn = Some(self.cfg.hook_response_header_data.clone());
            let trailer_fn = Some(self.cfg.hook_response_trailer_data.clone());
            input.reset_callback_start();
            let progress = self.response().ok_or(Status::Error)?.response_progress;
            match progress {
                ResponseProgress::Headers => self.response_receiver_set(header_fn),
                ResponseProgress::Trailer => self.response_receiver_set(trailer_fn),
                _ => {}
            }
        }
        self.response_state_previous = Some(self.response_state);
        Ok(())
    }

    /// Check that buffering `len` more bytes stays within the hard field
    /// limit.
    fn check_response_buffer_limit(&mut self, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        let mut newlen = self.response_buf.len().wrapping_add(len);
        if let Some(response_header) = &self.response_header {
            newlen = newlen.wrapping_add(response_header.len());
        }
        let field_limit = self.cfg.field_limit;
        if newlen > field_limit {
            htap_error!(
                self.logger,
                LogCode::ResponseFieldTooLong,
                format!(
                    "Response buffer over the limit: size {} limit {}.",
                    newlen, field_limit
                )
            );
            return Err(Status::Error);
        }
        Ok(())
    }

    /// Consume the line terminator that follows a chunk's payload.
    pub(crate) fn response_body_chunked_data_end(&mut self, input: &mut ParserData) -> Result<()> {
        match take_till_lf(input.as_slice()) {
            Ok((_, line)) => {
                let len = line.len();
                self.response_data_consume(input, len);
                let resp = self.response_mut().ok_or(Status::Error)?;
                resp.response_message_len = resp.response_message_len.wrapping_add(len as u64);
                self.response_state = State::BodyChunkedLength;
                Ok(())
            }
            _ => {
                let resp = self.response_mut().ok_or(Status::Error)?;
                resp.response_message_len =
                    resp.response_message_len.wrapping_add(input.len() as u64);
                self.response_data_consume(input, input.len());
                Err(Status::DataBuffer)
            }
        }
    }

    /// Consume chunk payload bytes, passing them to the body-data hooks.
    pub(crate) fn response_body_chunked_data(&mut self, input: &mut ParserData) -> Result<()> {
        if self.response_status == StreamState::Closed {
            // Truncated body; deliver what there is and finalize.
            self.response_state = State::Finalize;
            let remaining = input.as_slice();
            if !remaining.is_empty() {
                return self.response_body_data(Some(remaining));
            }
            return Ok(());
        }
        let bytes_to_consume = min(
            input.len(),
            self.response_chunked_length.unwrap_or(0) as usize,
        );
        if bytes_to_consume == 0 {
            return Err(Status::Data);
        }
        self.response_body_data(Some(&input.as_slice()[0..bytes_to_consume]))?;
        self.response_data_consume(input, bytes_to_consume);
        if let Some(len) = &mut self.response_chunked_length {
            *len -= bytes_to_consume as u64;
            if *len == 0 {
                self.response_state = State::BodyChunkedDataEnd;
                return Ok(());
            }
        }
        Err(Status::Data)
    }

    /// Read one chunk-length line. The response side is lenient: an
    /// unparseable length falls back to reading the rest of the stream as
    /// an identity body, because that is what clients do.
    pub(crate) fn response_body_chunked_length(&mut self, input: &mut ParserData) -> Result<()> {
        let mut data = input.as_slice();
        loop {
            let buf_empty = self.response_buf.is_empty();
            match take_till_lf(data) {
                Ok((remaining, line)) => {
                    self.response_data_consume(input, line.len());
                    if !buf_empty {
                        self.check_response_buffer_limit(line.len())?;
                    }
                    let mut full_line = take(&mut self.response_buf);
                    full_line.add(line);
                    if is_chunked_ctl_line(full_line.as_slice()) {
                        let resp = self.response_mut().ok_or(Status::Error)?;
                        resp.response_message_len =
                            resp.response_message_len.wrapping_add(full_line.len() as u64);
                        // An empty chunk-length line; keep scanning.
                        data = remaining;
                        continue;
                    }
                    let resp = self.response_mut().ok_or(Status::Error)?;
                    resp.response_message_len =
                        resp.response_message_len.wrapping_add(full_line.len() as u64);
                    match parse_chunked_length(full_line.as_slice()) {
                        Ok((len, ext)) => {
                            self.response_chunked_length = len;
                            if ext {
                                htap_warn!(
                                    self.logger,
                                    LogCode::ResponseChunkExtension,
                                    "Response chunk extension"
                                );
                            }
                            match len {
                                Some(0) => {
                                    // Last chunk; trailers follow.
                                    self.response_state = State::Headers;
                                    self.response_mut()
                                        .ok_or(Status::Error)?
                                        .response_progress = ResponseProgress::Trailer;
                                }
                                Some(_) => {
                                    self.response_state = State::BodyChunkedData;
                                }
                                None => {
                                    // An empty length line; try to go on.
                                    return Ok(());
                                }
                            }
                        }
                        Err(_) => {
                            // Rewind so the identity reader sees these
                            // bytes too.
                            let line_len = line.len();
                            self.response_data_unconsume(input, line_len);
                            self.response_state = State::BodyIdentityStreamClose;
                            self.response_mut()
                                .ok_or(Status::Error)?
                                .response_transfer_coding = TransferCoding::Identity;
                            htap_error!(
                                self.logger,
                                LogCode::InvalidResponseChunkLen,
                                "Response chunk encoding: Invalid chunk length"
                            );
                        }
                    }
                    return Ok(());
                }
                _ => {
                    return if buf_empty && !is_valid_chunked_length_data(data) {
                        // Leading junk that can never become a hex length.
                        self.response_mut()
                            .ok_or(Status::Error)?
                            .response_transfer_coding = TransferCoding::Identity;
                        self.response_state = State::BodyIdentityStreamClose;
                        htap_error!(
                            self.logger,
                            LogCode::InvalidResponseChunkLen,
                            "Response chunk encoding: Invalid chunk length"
                        );
                        Ok(())
                    } else {
                        self.handle_response_absent_lf(input)
                    };
                }
            }
        }
    }

    /// Consume identity response body bytes up to the declared length.
    pub(crate) fn response_body_identity_cl_known(&mut self, data: &mut ParserData) -> Result<()> {
        if self.response_status == StreamState::Closed {
            // Truncated body; deliver what there is and finalize.
            self.response_state = State::Finalize;
            let remaining = data.as_slice();
            if !remaining.is_empty() {
                return self.response_body_data(Some(remaining));
            }
            return Ok(());
        }
        let left = self.response_body_data_left.ok_or(Status::Error)?;
        let bytes_to_consume = min(data.len() as u64, left);
        if bytes_to_consume == 0 {
            return Err(Status::Data);
        }
        if data.is_gap() {
            let resp = self.response_mut().ok_or(Status::Error)?;
            if resp.response_content_encoding_processing == ContentEncoding::None {
                resp.response_message_len =
                    resp.response_message_len.wrapping_add(bytes_to_consume);
                resp.response_entity_len =
                    resp.response_entity_len.wrapping_add(bytes_to_consume);
                let gap = ParserData::from(bytes_to_consume as usize);
                self.response_run_hook_body_data(&gap)?;
            } else {
                // A gap in compressed data; the decoder state is lost, so
                // end decompression here.
                self.response_body_data(None)?;
            }
        } else {
            self.response_body_data(Some(&data.as_slice()[0..bytes_to_consume as usize]))?;
        }
        self.response_data_consume(data, bytes_to_consume as usize);
        self.response_body_data_left = Some(left - bytes_to_consume);
        if self.response_body_data_left > Some(0) {
            return Err(Status::Data);
        }
        // End of the body; the end marker goes out when the response side
        // finalizes.
        self.response_state = State::Finalize;
        Ok(())
    }

    /// Consume an identity response body bounded only by stream close.
    pub(crate) fn response_body_identity_stream_close(
        &mut self, data: &ParserData,
    ) -> Result<()> {
        if !data.is_empty() {
            self.response_body_data(data.data())?;
            self.response_data_consume(data, data.len());
        }
        if self.response_status == StreamState::Closed {
            self.response_state = State::Finalize;
            return Ok(());
        }
        Err(Status::Data)
    }

    /// Decide how the response body is framed. This is where CONNECT,
    /// 100/101/204/304, HEAD and the framing headers all meet.
    pub(crate) fn response_body_determine(&mut self, input: &mut ParserData) -> Result<()> {
        let (request_method, status, cl_opt, te_opt) = {
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            (
                response_tx.request_method_number,
                response_tx.response_status_number,
                response_tx
                    .response_headers
                    .get_nocase_nozero("content-length")
                    .cloned(),
                response_tx
                    .response_headers
                    .get_nocase_nozero("transfer-encoding")
                    .cloned(),
            )
        };
        if request_method == Method::Connect {
            if status.in_range(200, 299) {
                // Tunnel established. Wrap this transaction up; the
                // request side will probe the tunnel bytes.
                self.response_state = State::Finalize;
                return self.state_response_headers(input);
            } else if status.eq_num(407) {
                // Proxy auth required; the request side may continue.
                if self.request_status != StreamState::Error {
                    self.request_status = StreamState::Data;
                }
            } else {
                // Failed CONNECT: unblock request parsing, but remember
                // to stop at the end of this transaction so we do not
                // read into the next one.
                if self.request_status != StreamState::Error {
                    self.request_status = StreamState::Data;
                }
                self.response_data_other_at_tx_end = true;
            }
        }
        // 101 Switching Protocols: what follows the empty line is not
        // HTTP. Unlike CONNECT there is nothing to probe for, so go to
        // tunnel mode right away.
        if status.eq_num(101) {
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            if response_tx
                .response_headers
                .get_nocase_nozero("upgrade")
                .map(|upgrade| upgrade.value.index_of_nocase_nozero("h2c").is_some())
                .unwrap_or(false)
            {
                response_tx.is_http_2_upgrade = true;
            }
            if te_opt.is_none() && cl_opt.is_none() {
                self.response_state = State::Finalize;
                if self.request_status != StreamState::Error {
                    self.request_status = StreamState::Tunnel;
                }
                self.response_status = StreamState::Tunnel;
                return self.state_response_headers(input);
            } else {
                htap_warn!(
                    self.logger,
                    LogCode::SwitchingProtoWithContentLength,
                    "Switching Protocol with Content-Length"
                );
            }
        }
        // An interim 100 Continue: discard the headers seen so far and
        // expect a fresh status line. Permitted once per transaction; a
        // second one is a hard error.
        else if status.eq_num(100) && te_opt.is_none() {
            let cl_value = cl_opt
                .as_ref()
                .and_then(|cl| parse_content_length(cl.value.as_slice(), Some(&mut self.logger)));
            match cl_value {
                // A 100 with an actual body length is not an interim
                // response; fall through to regular handling.
                Some(x) if x > 0 => (),
                _ => {
                    let seen = self.response().ok_or(Status::Error)?.seen_100continue;
                    if seen {
                        htap_error!(
                            self.logger,
                            LogCode::ContinueAlreadySeen,
                            "Already seen 100-Continue."
                        );
                        return Err(Status::Error);
                    }
                    let response_tx = self.response_mut().ok_or(Status::Error)?;
                    response_tx.response_headers.elements.clear();
                    response_tx.response_progress = ResponseProgress::Line;
                    response_tx.seen_100continue = true;
                    self.response_state = State::Line;
                    return Ok(());
                }
            }
        }
        // A 4xx while the request body has not started moving can settle
        // an Expect: 100-continue request early.
        else if status.in_range(400, 499)
            && self.request_content_length > Some(0)
            && self.request_body_data_left == self.request_content_length
        {
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            if let Some(expect) = response_tx.request_headers.get_nocase("expect") {
                if expect.value.eq_slice("100-continue") {
                    self.request_state = State::Finalize;
                }
            }
        }

        // Responses that must not carry a body (1xx, 204, 304, or any
        // response to HEAD) end at the blank line after the headers, no
        // matter what the framing headers claim.
        if request_method == Method::Head {
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            response_tx.response_transfer_coding = TransferCoding::NoBody;
            self.response_state = State::Finalize;
        } else if status.in_range(100, 199) || status.eq_num(204) || status.eq_num(304) {
            if te_opt.is_none() && cl_opt.is_none() {
                let response_tx = self.response_mut().ok_or(Status::Error)?;
                response_tx.response_transfer_coding = TransferCoding::NoBody;
                self.response_state = State::Finalize;
            } else {
                // Browsers will render whatever the server sends anyway.
                htap_warn!(
                    self.logger,
                    LogCode::ResponseBodyUnexpected,
                    "Unexpected Response body"
                );
            }
        }
        let mut multipart_byteranges = false;
        if self.response_state != State::Finalize {
            // There is a response body. Extract the content type first.
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            if let Some(ct) = response_tx
                .response_headers
                .get_nocase_nozero("content-type")
            {
                let ct_value = if let Ok((_, ct)) = streaming_take_till::<_, _, (&[u8], ErrorKind)>(
                    |c| c == b';' || is_space(c),
                )(ct.value.as_slice())
                {
                    ct
                } else {
                    ct.value.as_slice()
                };
                let mut response_content_type = Bstr::from(ct_value);
                response_content_type.make_ascii_lowercase();
                if response_content_type
                    .index_of_nocase("multipart/byteranges")
                    .is_some()
                {
                    multipart_byteranges = true;
                }
                response_tx.response_content_type = Some(response_content_type);
            }
            // Chunked takes precedence; Content-Length next; otherwise
            // the body runs until the stream closes.
            if let Some(te) =
                te_opt.and_then(|te| te.value.index_of_nocase_nozero("chunked").and(Some(te)))
            {
                if !te.value.eq_nocase("chunked") {
                    htap_warn!(
                        self.logger,
                        LogCode::ResponseAbnormalTransferEncoding,
                        "Transfer-encoding has abnormal chunked value"
                    );
                }
                // Chunked is HTTP/1.1 only on paper; some browsers accept
                // it from 1.0 servers as well.
                let response_tx = self.response_mut().ok_or(Status::Error)?;
                if response_tx.response_protocol_number < HttpProtocol::V1_1 {
                    htap_warn!(
                        self.logger,
                        LogCode::ResponseChunkedOldProto,
                        "Chunked transfer-encoding on HTTP/0.9 or HTTP/1.0"
                    );
                }
                let response_tx = self.response_mut().ok_or(Status::Error)?;
                response_tx.response_transfer_coding = TransferCoding::Chunked;
                if cl_opt.is_some() {
                    // Both framing headers present: the smuggling setup.
                    response_tx.flags.set(Flags::REQUEST_SMUGGLING);
                }
                response_tx.response_progress = ResponseProgress::Body;
                self.response_state = State::BodyChunkedLength;
            } else if let Some(cl) = cl_opt {
                let response_tx = self.response_mut().ok_or(Status::Error)?;
                response_tx.response_transfer_coding = TransferCoding::Identity;
                if cl.flags.is_set(Flags::FIELD_REPEATED) {
                    response_tx.flags.set(Flags::REQUEST_SMUGGLING);
                }
                let response_content_length =
                    parse_content_length(cl.value.as_slice(), Some(&mut self.logger));
                self.response_mut().ok_or(Status::Error)?.response_content_length =
                    response_content_length;
                self.response_content_length = response_content_length;
                self.response_body_data_left = response_content_length;
                if let Some(len) = response_content_length {
                    if len != 0 {
                        self.response_state = State::BodyIdentityClKnown;
                        self.response_mut().ok_or(Status::Error)?.response_progress =
                            ResponseProgress::Body;
                    } else {
                        self.response_state = State::Finalize;
                    }
                } else {
                    htap_error!(
                        self.logger,
                        LogCode::InvalidContentLengthFieldInResponse,
                        "Invalid C-L field in response"
                    );
                    return Err(Status::Error);
                }
            } else {
                // multipart/byteranges would be self-delimiting, which
                // this parser does not read.
                if multipart_byteranges {
                    htap_error!(
                        self.logger,
                        LogCode::ResponseMultipartByteranges,
                        "C-T multipart/byteranges in responses not supported"
                    );
                    return Err(Status::Error);
                }
                let response_tx = self.response_mut().ok_or(Status::Error)?;
                response_tx.response_transfer_coding = TransferCoding::Identity;
                response_tx.response_progress = ResponseProgress::Body;
                self.response_state = State::BodyIdentityStreamClose;
                self.response_body_data_left = None;
            }
        }
        self.state_response_headers(input)
    }

    /// Scan for the end of the response line, buffering across chunks.
    pub(crate) fn response_line(&mut self, input: &mut ParserData) -> Result<()> {
        match take_till_eol(input.as_slice()) {
            Ok((_, line)) => {
                let mut data = take(&mut self.response_buf);
                data.add(line);
                self.response_data_consume(input, line.len());
                self.response_line_complete(data.as_slice(), input)
            }
            _ => {
                if self.response_status == StreamState::Closed {
                    let mut data = take(&mut self.response_buf);
                    data.add(input.as_slice());
                    self.response_data_consume(input, input.len());
                    self.response_line_complete(data.as_slice(), input)
                } else {
                    self.handle_response_absent_lf(input)
                }
            }
        }
    }

    /// Process one full response line. A line that does not look like a
    /// status line at all is routed into body processing, because that is
    /// how browsers treat it.
    fn response_line_complete(&mut self, line: &[u8], input: &ParserData) -> Result<()> {
        self.check_response_buffer_limit(line.len())?;
        if line.is_empty() {
            return Err(Status::Data);
        }
        self.response_mut().ok_or(Status::Error)?;
        if is_line_ignorable(self.cfg.server_personality, line) {
            if self.response_status == StreamState::Closed {
                self.response_state = State::Finalize;
            }
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            response_tx.response_ignored_lines =
                response_tx.response_ignored_lines.wrapping_add(1);
            return Ok(());
        }
        // Throw away anything a 100 response left behind.
        let response_tx = self.response_mut().ok_or(Status::Error)?;
        response_tx.response_line = None;
        response_tx.response_protocol = None;
        response_tx.response_status = None;
        response_tx.response_message = None;

        if treat_response_line_as_body(line) {
            // A lone short line with an 'H' coming right behind it is
            // probably a mangled prefix of the real status line; skip it.
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            if input.len() > 1 && (input.as_slice()[0] == b'H' || chomp(line).len() <= 2) {
                response_tx.response_ignored_lines =
                    response_tx.response_ignored_lines.wrapping_add(1);
                return Ok(());
            }
            response_tx.response_content_encoding_processing = ContentEncoding::None;
            self.response_body_data(Some(line))?;
            // No headers will follow; the body runs to end of stream.
            if input.is_empty() {
                let response_tx = self.response_mut().ok_or(Status::Error)?;
                response_tx.response_transfer_coding = TransferCoding::Identity;
                response_tx.response_progress = ResponseProgress::Body;
                self.response_body_data_left = None;
                self.response_state = State::Finalize;
            }
            return Ok(());
        }
        self.parse_response_line(line)?;
        self.state_response_line()?;
        self.response_state = State::Headers;
        self.response_mut().ok_or(Status::Error)?.response_progress = ResponseProgress::Headers;
        Ok(())
    }

    /// Split the response line into protocol, status code and message.
    pub(crate) fn parse_response_line(&mut self, response_line: &[u8]) -> Result<()> {
        let response_tx = self.response_mut().ok_or(Status::Error)?;
        response_tx.response_line = Some(Bstr::from(response_line));
        response_tx.response_protocol_number = HttpProtocol::Invalid;
        response_tx.response_status = None;
        response_tx.response_status_number = ResponseNumber::Invalid;
        response_tx.response_message = None;

        let mut response_line_parser = tuple((
            take_is_space_or_null,
            take_not_is_space,
            take_is_space,
            take_not_is_space,
            take_ascii_whitespace(),
        ));
        let (message, (_ls, response_protocol, ws1, status_code, ws2)) =
            response_line_parser(response_line)?;
        if response_protocol.is_empty() {
            return Ok(());
        }
        {
            let response_tx = self.response_mut().ok_or(Status::Error)?;
            response_tx.response_protocol = Some(Bstr::from(response_protocol));
        }
        let protocol_number = parse_protocol(response_protocol, &mut self.logger);
        self.response_mut().ok_or(Status::Error)?.response_protocol_number = protocol_number;
        if ws1.is_empty() || status_code.is_empty() {
            return Ok(());
        }
        let response_tx = self.response_mut().ok_or(Status::Error)?;
        response_tx.response_status = Some(Bstr::from(status_code));
        response_tx.response_status_number = parse_status(status_code);
        if ws2.is_empty() {
            return Ok(());
        }
        response_tx.response_message = Some(Bstr::from(chomp(message)));
        Ok(())
    }

    /// Run the wire parser over response header data and fold the
    /// per-header flags into transaction anomalies.
    fn parse_response_headers<'a>(&mut self, data: &'a [u8]) -> Result<(&'a [u8], bool)> {
        let rc = {
            let resp = self.response_mut().ok_or(Status::Error)?;
            resp.response_header_parser.headers()(data)
        };
        if let Ok((remaining, (headers, eoh))) = rc {
            for h in headers {
                let mut flags = 0;
                let name_flags = h.name.flags;
                let value_flags = h.value.flags;
                if value_flags.is_set(HeaderFlags::DEFORMED_EOL)
                    || name_flags.is_set(HeaderFlags::DEFORMED_EOL)
                {
                    htap_warn!(
                        self.logger,
                        LogCode::DeformedEol,
                        "Weird response end of lines mix"
                    );
                }
                if name_flags.is_set(HeaderFlags::NAME_TRAILING_WHITESPACE) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::ResponseInvalidLwsAfterName,
                        "Response field invalid: LWS after name",
                        self.response_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_INVALID
                    );
                }
                if name_flags.is_set(HeaderFlags::NAME_LEADING_WHITESPACE) {
                    // Leading whitespace on a name is folding onto a
                    // header that is not there.
                    htap_warn_once!(
                        self.logger,
                        LogCode::InvalidResponseFieldFolding,
                        "Invalid response field folding",
                        self.response_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::INVALID_FOLDING
                    );
                    flags.set(Flags::FIELD_INVALID);
                }
                if name_flags.is_set(HeaderFlags::NAME_NON_TOKEN_CHARS) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::ResponseHeaderNameNotToken,
                        "Response header name is not a token",
                        self.response_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_INVALID
                    );
                }
                if name_flags.is_set(HeaderFlags::MISSING_COLON) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::ResponseFieldMissingColon,
                        "Response field invalid: colon missing",
                        self.response_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_UNPARSEABLE
                    );
                    flags.set(Flags::FIELD_INVALID);
                } else if name_flags.is_set(HeaderFlags::NAME_EMPTY) {
                    htap_warn_once!(
                        self.logger,
                        LogCode::ResponseInvalidEmptyName,
                        "Response field invalid: empty name",
                        self.response_mut().ok_or(Status::Error)?.flags,
                        flags,
                        Flags::FIELD_INVALID
                    );
                }
                let mut entry_flags = flags;
                if value_flags.is_set(HeaderFlags::FOLDING) {
                    entry_flags.set(Flags::FIELD_FOLDED);
                }
                self.process_response_header(Header::new_with_flags(
                    h.name.name.into(),
                    h.value.value.into(),
                    entry_flags,
                ))?;
            }
            Ok((remaining, eoh))
        } else {
            Ok((data, false))
        }
    }

    /// Record one parsed response header, preserving duplicates.
    fn process_response_header(&mut self, header: Header) -> Result<()> {
        let header_limit = self.cfg.number_headers_limit as usize;
        let mut repeated = false;
        let mut too_many = false;
        let mut ambiguous_cl = false;
        {
            let resp = self.response_mut().ok_or(Status::Error)?;
            let reps = resp.response_header_repetitions;
            let mut update_reps = false;
            if let Some(existing) = resp.response_headers.get_nocase(header.name.as_slice()) {
                repeated = true;
                if existing.flags.is_set(Flags::FIELD_REPEATED) {
                    if reps < 64 {
                        update_reps = true;
                    } else {
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
            } else if resp.response_headers.size() > header_limit {
                if !resp.flags.is_set(Flags::HEADERS_TOO_MANY) {
                    resp.flags.set(Flags::HEADERS_TOO_MANY);
                    too_many = true;
                }
            }
            if !too_many {
                resp.response_headers.add(header);
            }
            if update_reps {
                resp.response_header_repetitions =
                    resp.response_header_repetitions.wrapping_add(1);
            }
            if ambiguous_cl {
                resp.flags.set(Flags::REQUEST_SMUGGLING);
            }
        }
        if too_many {
            htap_warn!(
                self.logger,
                LogCode::ResponseTooManyHeaders,
                "Too many response headers"
            );
            return Err(Status::Error);
        }
        if ambiguous_cl {
            htap_warn!(
                self.logger,
                LogCode::DuplicateContentLengthFieldInResponse,
                "Ambiguous response C-L value"
            );
        }
        if repeated {
            htap_warn!(
                self.logger,
                LogCode::ResponseHeaderRepetition,
                "Repetition for header"
            );
        }
        Ok(())
    }

    /// Parse response headers (or trailers) out of the accumulated input.
    pub(crate) fn response_headers(&mut self, input: &mut ParserData) -> Result<()> {
        if self.response_status == StreamState::Closed {
            let resp = self.response_mut().ok_or(Status::Error)?;
            resp.response_header_parser.set_complete(true);
            if let Some(response_header) = self.response_header.take() {
                self.parse_response_headers(response_header.as_slice())?;
            }
            self.response_receiver_finalize_clear(input)?;
            let hook = self.cfg.hook_response_trailer.clone();
            let resp = self.response_mut().ok_or(Status::Error)?;
            hook.run_all(resp)?;
            self.response_state = State::Finalize;
            return Ok(());
        }
        if let Ok((_, line)) = take_till_lf(input.as_slice()) {
            if self.response_header.is_some() {
                self.check_response_buffer_limit(line.len())?;
            }
        } else {
            // No line terminator in sight; buffer what we have.
            let data = input.as_slice();
            self.response_data_consume(input, data.len());
            self.check_response_buffer_limit(data.len())?;
            if let Some(rh) = &mut self.response_header {
                rh.add(data);
            } else {
                self.response_header = Some(Bstr::from(data));
            }
            return Err(Status::DataBuffer);
        }
        let response_header = if let Some(mut response_header) = self.response_header.take() {
            response_header.add(input.as_slice());
            response_header
        } else {
            Bstr::from(input.as_slice())
        };

        let (remaining, eoh) = self.parse_response_headers(response_header.as_slice())?;
        let eol = remaining.len() == response_header.len()
            && (remaining == b"\r\n" || remaining == b"\n");
        if eoh || eol {
            if eol {
                self.response_data_consume(input, input.len());
            } else if remaining.len() <= input.len() {
                self.response_data_consume(input, input.len() - remaining.len());
            }
            if self.response().ok_or(Status::Error)?.response_progress
                == ResponseProgress::Headers
            {
                // First pass: next decide whether there is a body.
                self.response_state = State::BodyDetermine;
            } else {
                // Trailer pass: flush the raw receiver, run the trailer
                // hook, finalize.
                self.response_receiver_finalize_clear(input)?;
                let hook = self.cfg.hook_response_trailer.clone();
                let resp = self.response_mut().ok_or(Status::Error)?;
                hook.run_all(resp)?;
                self.response_state = State::Finalize;
            }
            Ok(())
        } else {
            self.response_data_consume(input, input.len());
            self.check_response_buffer_limit(remaining.len())?;
            let remaining = Bstr::from(remaining);
            self.response_header.replace(remaining);
            Err(Status::DataBuffer)
        }
    }

    /// Pass response body data through the decompression filter (when one
    /// is installed) and on to the body hooks. `None` marks the end of
    /// the body. Decompression failures are fatal for the stream.
    pub(crate) fn response_body_data(&mut self, data: Option<&[u8]>) -> Result<()> {
        let encoding = {
            let resp = self.response_mut().ok_or(Status::Error)?;
            resp.response_message_len = resp
                .response_message_len
                .wrapping_add(data.unwrap_or(b"").len() as u64);
            resp.response_content_encoding_processing
        };
        match encoding {
            ContentEncoding::Gzip | ContentEncoding::Deflate | ContentEncoding::Zlib => {
                let decompressor = self
                    .response_mut()
                    .ok_or(Status::Error)?
                    .response_decompressor
                    .take();
                match (decompressor, data) {
                    (None, None) => Ok(()),
                    (None, Some(_)) => Err(Status::Error),
                    (Some(mut decompressor), Some(data)) => {
                        let decoded = decompressor.decompress(data).map_err(|e| {
                            htap_error!(
                                self.logger,
                                LogCode::DecompressionFailed,
                                format!("Decompression failed ({})", e)
                            );
                            Status::Error
                        })?;
                        self.response_deliver_decoded(&decoded)?;
                        let options = self.cfg.compression_options;
                        if decompressor.writes() % options.get_time_test_freq() == 0
                            && decompressor.time_spent() > options.get_time_limit() as u64
                        {
                            htap_error!(
                                self.logger,
                                LogCode::CompressionBomb,
                                format!(
                                    "Compression bomb: spent {} us decompressing",
                                    decompressor.time_spent()
                                )
                            );
                            decompressor.set_passthrough(true);
                        }
                        let resp = self.response_mut().ok_or(Status::Error)?;
                        let exceeds_ratio = resp
                            .response_message_len
                            .checked_mul(options.get_bomb_ratio())
                            .map(|limit| resp.response_entity_len > limit)
                            .unwrap_or(true);
                        if resp.response_entity_len > options.get_bomb_limit() && exceeds_ratio {
                            let entity = resp.response_entity_len;
                            let message = resp.response_message_len;
                            htap_error!(
                                self.logger,
                                LogCode::CompressionBomb,
                                format!(
                                    "Compression bomb: decompressed {} bytes out of {}",
                                    entity, message
                                )
                            );
                            return Err(Status::Error);
                        }
                        self.response_mut()
                            .ok_or(Status::Error)?
                            .response_decompressor
                            .replace(decompressor);
                        Ok(())
                    }
                    (Some(decompressor), None) => {
                        let decoded = decompressor.finish().map_err(|e| {
                            htap_error!(
                                self.logger,
                                LogCode::DecompressionFailed,
                                format!("Decompression failed ({})", e)
                            );
                            Status::Error
                        })?;
                        self.response_deliver_decoded(&decoded)?;
                        // Final body-data call with the end marker.
                        let end = ParserData::from(None);
                        self.response_run_hook_body_data(&end)
                    }
                }
            }
            ContentEncoding::None => {
                let parser_data = ParserData::from(data);
                {
                    let resp = self.response_mut().ok_or(Status::Error)?;
                    resp.response_entity_len = resp
                        .response_entity_len
                        .wrapping_add(parser_data.len() as u64);
                }
                self.response_run_hook_body_data(&parser_data)
            }
        }
    }

    /// Hand decoded body bytes to the hooks and account for them.
    fn response_deliver_decoded(&mut self, decoded: &[u8]) -> Result<()> {
        if decoded.is_empty() {
            return Ok(());
        }
        {
            let resp = self.response_mut().ok_or(Status::Error)?;
            resp.response_entity_len =
                resp.response_entity_len.wrapping_add(decoded.len() as u64);
        }
        let parser_data = ParserData::from(decoded);
        self.response_run_hook_body_data(&parser_data)
    }

    /// Inspect the Content-Encoding header and splice a decompression
    /// filter in front of the body-data hooks when decompression is
    /// enabled. Layered encodings chain filters, within the configured
    /// layer limit.
    pub(crate) fn response_initialize_decompressors(&mut self) -> Result<()> {
        let ce = self
            .response_mut()
            .ok_or(Status::Error)?
            .response_headers
            .get_nocase_nozero("content-encoding")
            .map(|val| val.value.clone());
        // Fast path: the whole value is one known token.
        let mut slow_path = false;
        let encoding = if let Some(ce) = &ce {
            if ce.eq_nocase_nozero(b"gzip") || ce.eq_nocase_nozero(b"x-gzip") {
                ContentEncoding::Gzip
            } else if ce.eq_nocase_nozero(b"deflate") || ce.eq_nocase_nozero(b"x-deflate") {
                ContentEncoding::Deflate
            } else if ce.eq_nocase_nozero(b"inflate") || ce.eq_nocase_nozero(b"none") {
                ContentEncoding::None
            } else {
                slow_path = true;
                ContentEncoding::None
            }
        } else {
            ContentEncoding::None
        };
        let decompression_enabled = self.cfg.response_decompression_enabled;
        {
            let resp = self.response_mut().ok_or(Status::Error)?;
            resp.response_content_encoding = encoding;
            resp.response_content_encoding_processing = if decompression_enabled {
                encoding
            } else {
                slow_path = false;
                ContentEncoding::None
            };
        }
        let processing = self
            .response_mut()
            .ok_or(Status::Error)?
            .response_content_encoding_processing;
        match processing {
            ContentEncoding::Gzip | ContentEncoding::Deflate | ContentEncoding::Zlib => {
                self.response_prepend_decompressor(processing)?;
            }
            ContentEncoding::None => {
                if slow_path {
                    if let Some(ce) = &ce {
                        let options = self.cfg.compression_options;
                        let mut layers = 0;
                        for encoding in ce.as_slice().split(|c| *c == b',' || *c == b' ') {
                            if encoding.is_empty() {
                                continue;
                            }
                            layers += 1;
                            if let Some(limit) = options.get_layer_limit() {
                                if layers > limit {
                                    htap_warn!(
                                        self.logger,
                                        LogCode::TooManyEncodingLayers,
                                        "Too many response content encoding layers"
                                    );
                                    break;
                                }
                            }
                            let encoding = Bstr::from(encoding);
                            let encoding = if encoding.index_of_nocase(b"gzip").is_some() {
                                if !(encoding.eq_slice(b"gzip") || encoding.eq_slice(b"x-gzip")) {
                                    htap_warn!(
                                        self.logger,
                                        LogCode::AbnormalCeHeader,
                                        "C-E gzip has abnormal value"
                                    );
                                }
                                ContentEncoding::Gzip
                            } else if encoding.index_of_nocase(b"deflate").is_some() {
                                if !(encoding.eq_slice(b"deflate")
                                    || encoding.eq_slice(b"x-deflate"))
                                {
                                    htap_warn!(
                                        self.logger,
                                        LogCode::AbnormalCeHeader,
                                        "C-E deflate has abnormal value"
                                    );
                                }
                                ContentEncoding::Deflate
                            } else if encoding.eq_slice(b"inflate")
                                || encoding.eq_slice(b"none")
                                || encoding.eq_slice(b"identity")
                            {
                                ContentEncoding::None
                            } else {
                                htap_warn!(
                                    self.logger,
                                    LogCode::AbnormalCeHeader,
                                    "C-E unknown setting"
                                );
                                ContentEncoding::None
                            };
                            self.response_prepend_decompressor(encoding)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Put a decompression stage in front of whatever is already
    /// installed.
    fn response_prepend_decompressor(&mut self, encoding: ContentEncoding) -> Result<()> {
        if encoding == ContentEncoding::None {
            return Ok(());
        }
        let options = self.cfg.compression_options;
        let resp = self.response_mut().ok_or(Status::Error)?;
        match resp.response_decompressor.as_mut() {
            Some(decompressor) => decompressor.prepend(encoding, options),
            None => {
                // The first stage decides the processing encoding.
                resp.response_content_encoding_processing = encoding;
                resp.response_decompressor = Decompressor::new(encoding, options);
            }
        }
        Ok(())
    }

    /// Finalize the response: check whether trailing bytes are an
    /// unexpected body before completing the transaction.
    pub(crate) fn response_finalize(&mut self, input: &mut ParserData) -> Result<()> {
        if input.is_gap() {
            return self.state_response_complete(input);
        }
        let mut work = input.as_slice();
        if self.response_status != StreamState::Closed {
            let response_next_byte = input.as_slice().first();
            if response_next_byte.is_none() {
                return self.state_response_complete(input);
            }
            let lf = response_next_byte
                .map(|byte| *byte == b'\n')
                .unwrap_or(false);
            if !lf {
                if let Ok((_, line)) = take_till_lf(work) {
                    self.response_data_consume(input, line.len());
                    work = line;
                } else {
                    return self.handle_response_absent_lf(input);
                }
            } else {
                self.response_data_consume(input, work.len());
            }
        }
        if !self.response_buf.is_empty() {
            self.check_response_buffer_limit(work.len())?;
        }
        let mut data = take(&mut self.response_buf);
        let buf_len = data.len();
        data.add(work);
        if data.is_empty() {
            // Stream closing with nothing pending.
            return self.state_response_complete(input);
        }
        if treat_response_line_as_body(data.as_slice()) {
            htap_warn!(
                self.logger,
                LogCode::ResponseBodyUnexpected,
                "Unexpected response body"
            );
            return self.response_body_data(Some(data.as_slice()));
        }
        // The data was not used; restore it and rewind so the next
        // response's line parser sees it.
        self.response_buf.add(&data.as_slice()[0..buf_len]);
        self.response_data_unconsume(input, data.len());
        self.state_response_complete(input)
    }

    /// Between transactions on the response side. Starting a response
    /// requires a matching request transaction; a response with no
    /// request to pair with is a fatal stream error.
    pub(crate) fn response_idle(&mut self, input: &ParserData) -> Result<()> {
        if input.is_empty() {
            return Err(Status::Data);
        }
        let resp = self.response_mut().ok_or(Status::Error)?;
        if resp.request_progress == RequestProgress::NotStarted {
            htap_error!(
                self.logger,
                LogCode::UnableToMatchResponseToRequest,
                "Unable to match response to request"
            );
            return Err(Status::Error);
        }
        self.response_content_length = None;
        self.response_body_data_left = None;
        self.state_response_start()
    }

    /// Run the response body-data hooks: transaction-level first, then
    /// configuration-level. Empty chunks are suppressed; the end marker
    /// and gaps go through.
    fn response_run_hook_body_data(&mut self, d: &ParserData) -> Result<()> {
        if d.is_empty() && !d.is_end() {
            return Ok(());
        }
        let tx_hook = self
            .response_mut()
            .ok_or(Status::Error)?
            .hook_response_body_data
            .clone();
        let cfg_hook = self.cfg.hook_response_body_data.clone();
        let resp = self.response_mut().ok_or(Status::Error)?;
        tx_hook.run_all(resp, d)?;
        cfg_hook.run_all(resp, d)
    }

    /// Outbound entry point: process one chunk of response data.
    pub fn response_data(
        &mut self, mut chunk: ParserData, timestamp: Option<OffsetDateTime>,
    ) -> StreamState {
        self.response_bytes_consumed = 0;
        if self.response_status == StreamState::Stop {
            htap_info!(
                self.logger,
                LogCode::ParserStateError,
                "Outbound parser is in STOP state"
            );
            return StreamState::Stop;
        }
        if self.response_status == StreamState::Error {
            htap_error!(
                self.logger,
                LogCode::ParserStateError,
                "Outbound parser is in ERROR state"
            );
            return StreamState::Error;
        }
        // Zero-length feeds are only the close flush; anything else is a
        // caller error.
        if chunk.is_empty() && self.response_status != StreamState::Closed {
            htap_error!(
                self.logger,
                LogCode::ZeroLengthDataChunks,
                "Zero-length data chunks are not allowed"
            );
            return StreamState::Closed;
        }
        if let Some(timestamp) = timestamp {
            self.response_timestamp = timestamp;
        }
        self.conn.track_outbound_data(chunk.len());
        if self.response_status == StreamState::Tunnel {
            // Tunnel traffic is not parsed.
            return StreamState::Tunnel;
        }
        if chunk.is_gap() {
            let resp = match self.response_mut() {
                Some(resp) => resp,
                None => return StreamState::Error,
            };
            resp.flags.set(Flags::RESPONSE_MISSING_BYTES);
            if resp.index == 0 && resp.response_progress == ResponseProgress::NotStarted {
                // A gap before the first status line: no way to recover.
                return StreamState::Closed;
            }
        }

        // Run state functions until one reports an error or runs out of
        // data.
        loop {
            if chunk.is_gap()
                && self.response_state != State::BodyIdentityClKnown
                && self.response_state != State::BodyIdentityStreamClose
                && self.response_state != State::Finalize
            {
                htap_error!(
                    self.logger,
                    LogCode::InvalidGap,
                    "Gaps are not allowed during this state"
                );
                return StreamState::Closed;
            }
            let mut rc = self.handle_response_state(&mut chunk);
            if rc.is_ok() {
                if self.response_status == StreamState::Tunnel {
                    return StreamState::Tunnel;
                }
                rc = self.response_handle_state_change(&mut chunk);
            }
            match rc {
                Ok(_) => {}
                Err(Status::Data) | Err(Status::DataBuffer) => {
                    let _ = self.response_receiver_send_data(&mut chunk);
                    self.response_status = StreamState::Data;
                    return StreamState::Data;
                }
                Err(Status::Stop) => {
                    self.response_status = StreamState::Stop;
                    return StreamState::Stop;
                }
                Err(Status::DataOther) => {
                    if chunk.is_empty() {
                        // The entire chunk was consumed after all.
                        self.response_status = StreamState::Data;
                        return StreamState::Data;
                    } else {
                        self.response_status = StreamState::DataOther;
                        return StreamState::DataOther;
                    }
                }
                Err(_) => {
                    self.response_status = StreamState::Error;
                    return StreamState::Error;
                }
            }
        }
    }

    /// Buffer a partial unit that spans the chunk boundary and ask for
    /// more data, subject to the field limit.
    fn handle_response_absent_lf(&mut self, data: &ParserData) -> Result<()> {
        self.check_response_buffer_limit(data.len())?;
        self.response_buf.add(data.as_slice());
        self.response_data_consume(data, data.len());
        Err(Status::DataBuffer)
    }
}
