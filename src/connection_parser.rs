use crate::{
    bstr::Bstr,
    config::Config,
    connection::Connection,
    error::Result,
    hook::DataHook,
    log::Logger,
    transaction::{RequestProgress, ResponseProgress, Transaction, TransferCoding},
    util::{FlagOps, Flags},
    Status,
};
use std::{any::Any, borrow::Cow, cell::Cell, net::IpAddr, rc::Rc, time::SystemTime};
use time::OffsetDateTime;

/// Parser states. One machine per direction; a state function consumes
/// bytes until it either completes its syntactic unit (state change) or
/// runs out of data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum State {
    /// Waiting for the first byte of the next transaction.
    Idle,
    /// Parsing the request or response line.
    Line,
    /// Parsing headers (or trailers, depending on transaction progress).
    Headers,
    /// Deciding how the body is framed.
    BodyDetermine,
    /// Reading a chunk-length line.
    BodyChunkedLength,
    /// Reading chunk payload bytes.
    BodyChunkedData,
    /// Reading the terminator line after a chunk.
    BodyChunkedDataEnd,
    /// Finalizing this side of the transaction.
    Finalize,
    // Request-side only states.
    /// Deciding whether the request protocol implies headers.
    Protocol,
    /// Checking whether a CONNECT request suspends inbound parsing.
    ConnectCheck,
    /// Probing tunnel bytes after a successful CONNECT.
    ConnectProbeData,
    /// Waiting on the response before continuing a CONNECT request.
    ConnectWaitResponse,
    /// Reading a request body of known length.
    BodyIdentity,
    /// Absorbing whatever follows an HTTP/0.9 exchange.
    IgnoreDataAfterHttp09,
    // Response-side only states.
    /// Reading a response body bounded by stream close.
    BodyIdentityStreamClose,
    /// Reading a response body of known length.
    BodyIdentityClKnown,
}

/// Stream states reported to the caller. Each connection has two streams,
/// inbound and outbound, tracked separately.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum StreamState {
    /// Not opened yet.
    New,
    /// Open, no data processed yet.
    Open,
    /// Closed; only the final flush may still run.
    Closed,
    /// A fatal error occurred; no further data is accepted.
    Error,
    /// The stream is a tunnel; bytes are no longer parsed as HTTP.
    Tunnel,
    /// Parsing is suspended until the other direction progresses. The data
    /// chunk was only partially consumed.
    DataOther,
    /// A callback asked for this connection to no longer be followed.
    Stop,
    /// All supplied data was processed; feed more when available.
    Data,
}

/// One chunk of input being parsed, with a consume cursor and a separate
/// callback cursor for the raw-data receiver hooks. A chunk is either
/// bytes, a gap of a known length (missing data), or the empty end-of-
/// stream marker.
#[derive(Debug, Default, Clone)]
pub struct ParserData<'a> {
    data: Option<Cow<'a, [u8]>>,
    /// Length of the gap, when this chunk is a gap.
    gap_len: Option<usize>,
    /// Parsing position.
    position: Cell<usize>,
    /// Position up to which raw data has been handed to receiver hooks.
    callback_position: usize,
}

impl ParserData<'_> {
    /// The unconsumed data, if this chunk carries any.
    pub(crate) fn data(&self) -> Option<&[u8]> {
        let data = self.data.as_ref()?;
        if self.position.get() <= data.len() {
            Some(&data[self.position.get()..])
        } else {
            None
        }
    }

    /// Length of the unconsumed data or gap.
    pub fn len(&self) -> usize {
        if let Some(gap_len) = self.gap_len {
            gap_len.saturating_sub(self.position.get())
        } else {
            self.as_slice().len()
        }
    }

    /// How much of this chunk has been consumed.
    pub(crate) fn consumed_len(&self) -> usize {
        self.position.get()
    }

    /// The unconsumed data as a slice; empty for gaps and end markers.
    pub fn as_slice(&self) -> &[u8] {
        if let Some(data) = self.data.as_ref() {
            if self.position.get() <= data.len() {
                return &data[self.position.get()..];
            }
        }
        b""
    }

    /// Whether this chunk is a gap.
    pub fn is_gap(&self) -> bool {
        self.gap_len.is_some()
    }

    /// Whether this chunk is the end-of-data marker.
    pub fn is_end(&self) -> bool {
        self.data.is_none() && self.gap_len.is_none()
    }

    /// Whether no data remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_position(&self, position: usize) {
        self.position.set(position);
    }

    /// Advance the parsing position.
    pub fn consume(&self, consumed: usize) {
        self.set_position(self.position.get() + consumed);
    }

    /// Rewind the parsing position, clamping at the start.
    fn unconsume(&self, unconsume: usize) {
        if unconsume < self.position.get() {
            self.set_position(self.position.get() - unconsume);
        } else {
            self.set_position(0);
        }
    }

    /// Make an owned copy of this chunk.
    pub fn into_owned(self) -> ParserData<'static> {
        ParserData {
            data: self.data.map(|d| Cow::Owned(d.into_owned())),
            gap_len: self.gap_len,
            position: self.position,
            callback_position: self.callback_position,
        }
    }

    /// Raw bytes consumed since the last call, for the raw-data receiver
    /// hooks.
    pub(crate) fn callback_data(&mut self) -> &[u8] {
        if let Some(data) = self.data.as_ref() {
            if self.position.get() <= data.len() && self.callback_position <= self.position.get() {
                let d = &data[self.callback_position..self.position.get()];
                self.callback_position = self.position.get();
                return d;
            }
        }
        b""
    }

    /// Move the callback cursor up to the current parsing position.
    pub(crate) fn reset_callback_start(&mut self) {
        self.callback_position = self.position.get();
    }
}

impl<'a> From<Option<&'a [u8]>> for ParserData<'a> {
    fn from(data: Option<&'a [u8]>) -> Self {
        ParserData {
            data: data.map(Cow::Borrowed),
            gap_len: None,
            position: Cell::new(0),
            callback_position: 0,
        }
    }
}

impl<'a> From<&'a [u8]> for ParserData<'a> {
    fn from(data: &'a [u8]) -> Self {
        ParserData {
            data: Some(Cow::Borrowed(data)),
            gap_len: None,
            position: Cell::new(0),
            callback_position: 0,
        }
    }
}

impl From<Vec<u8>> for ParserData<'static> {
    fn from(data: Vec<u8>) -> Self {
        ParserData {
            data: Some(Cow::Owned(data)),
            gap_len: None,
            position: Cell::new(0),
            callback_position: 0,
        }
    }
}

impl From<usize> for ParserData<'_> {
    fn from(gap_len: usize) -> Self {
        ParserData {
            data: None,
            gap_len: Some(gap_len),
            position: Cell::new(0),
            callback_position: 0,
        }
    }
}

/// Drives both state machines of one connection. Single-threaded by
/// construction: the caller feeds byte chunks to the two entry points and
/// the parser returns control when it needs more data.
pub struct ConnectionParser {
    /// The logger for this connection.
    pub(crate) logger: Logger,
    /// Parser configuration, read-only once parsing begins.
    pub(crate) cfg: Rc<Config>,
    /// The connection being parsed.
    pub(crate) conn: Connection,
    /// Opaque user data.
    user_data: Option<Box<dyn Any>>,
    /// Inbound stream status.
    pub(crate) request_status: StreamState,
    /// Outbound stream status.
    pub(crate) response_status: StreamState,
    /// Set when response parsing must stop at the end of the current
    /// transaction so buffered inbound data can be consumed first.
    pub(crate) response_data_other_at_tx_end: bool,
    /// Timestamp of the most recent request chunk.
    pub(crate) request_timestamp: OffsetDateTime,
    /// Bytes consumed from the most recent request chunk.
    pub(crate) request_bytes_consumed: usize,
    /// Number of inbound chunks seen so far.
    pub(crate) request_chunk_count: usize,
    /// Inbound chunk number at which the current request started.
    pub(crate) request_chunk_request_index: usize,
    /// Inbound reassembly buffer for data spanning chunk boundaries.
    pub(crate) request_buf: Bstr,
    /// Partially accumulated request header block, when one spans chunks.
    pub(crate) request_header: Option<Bstr>,
    /// Request body length declared by a usable Content-Length header.
    pub(crate) request_content_length: Option<u64>,
    /// Request body bytes still expected, when the length is known.
    pub(crate) request_body_data_left: Option<u64>,
    /// Bytes left in the current request chunk (chunked framing).
    pub(crate) request_chunked_length: Option<u64>,
    /// Current request-side state.
    pub(crate) request_state: State,
    /// Previous request-side state, to detect changes.
    pub(crate) request_state_previous: Option<State>,
    /// Receiver hook for raw inbound header/trailer bytes, when active.
    pub(crate) request_data_receiver_hook: Option<DataHook>,
    /// Timestamp of the most recent response chunk.
    pub(crate) response_timestamp: OffsetDateTime,
    /// Bytes consumed from the most recent response chunk.
    pub(crate) response_bytes_consumed: usize,
    /// Outbound reassembly buffer.
    pub(crate) response_buf: Bstr,
    /// Partially accumulated response header block.
    pub(crate) response_header: Option<Bstr>,
    /// Response body length declared by a usable Content-Length header.
    pub(crate) response_content_length: Option<u64>,
    /// Response body bytes still expected, when the length is known.
    pub(crate) response_body_data_left: Option<u64>,
    /// Bytes left in the current response chunk (chunked framing).
    pub(crate) response_chunked_length: Option<u64>,
    /// Current response-side state.
    pub(crate) response_state: State,
    /// Previous response-side state.
    pub(crate) response_state_previous: Option<State>,
    /// Receiver hook for raw outbound header/trailer bytes, when active.
    pub(crate) response_data_receiver_hook: Option<DataHook>,
}

impl std::fmt::Debug for ConnectionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ConnectionParser")
            .field("request_status", &self.request_status)
            .field("response_status", &self.response_status)
            .field("request_index", &self.request_index())
            .field("response_index", &self.response_index())
            .finish()
    }
}

impl ConnectionParser {
    /// Create a parser for one connection with the given configuration.
    pub fn new(cfg: Config) -> Self {
        let cfg = Rc::new(cfg);
        let conn = Connection::new(Rc::clone(&cfg));
        let logger = conn.new_logger();
        Self {
            logger,
            cfg,
            conn,
            user_data: None,
            request_status: StreamState::New,
            response_status: StreamState::New,
            response_data_other_at_tx_end: false,
            request_timestamp: OffsetDateTime::from(SystemTime::now()),
            request_bytes_consumed: 0,
            request_chunk_count: 0,
            request_chunk_request_index: 0,
            request_buf: Bstr::new(),
            request_header: None,
            request_content_length: None,
            request_body_data_left: None,
            request_chunked_length: None,
            request_state: State::Idle,
            request_state_previous: None,
            request_data_receiver_hook: None,
            response_timestamp: OffsetDateTime::from(SystemTime::now()),
            response_bytes_consumed: 0,
            response_buf: Bstr::new(),
            response_header: None,
            response_content_length: None,
            response_body_data_left: None,
            response_chunked_length: None,
            response_state: State::Idle,
            response_state_previous: None,
            response_data_receiver_hook: None,
        }
    }

    /// Borrow the connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Get a transaction by its connection index.
    pub fn tx(&self, index: usize) -> Option<&Transaction> {
        self.conn.tx(index)
    }

    /// Get a transaction by its connection index, mutably.
    pub fn tx_mut(&mut self, index: usize) -> Option<&mut Transaction> {
        self.conn.tx_mut(index)
    }

    /// Number of transactions processed so far.
    pub fn tx_size(&self) -> usize {
        self.conn.tx_size()
    }

    /// The current request transaction.
    pub fn request(&mut self) -> Option<&Transaction> {
        self.conn.transactions.request_mut().map(|tx| &*tx)
    }

    /// The current request transaction, mutably.
    pub fn request_mut(&mut self) -> Option<&mut Transaction> {
        self.conn.transactions.request_mut()
    }

    /// The current response transaction.
    pub fn response(&mut self) -> Option<&Transaction> {
        self.conn.transactions.response_mut().map(|tx| &*tx)
    }

    /// The current response transaction, mutably.
    pub fn response_mut(&mut self) -> Option<&mut Transaction> {
        self.conn.transactions.response_mut()
    }

    /// Advance the request cursor, detecting pipelining on the way.
    pub(crate) fn request_next(&mut self) -> usize {
        if self.conn.transactions.request_index() > self.conn.transactions.response_index() {
            self.conn.flags.set(crate::connection::ConnectionFlags::PIPELINED);
        }
        self.conn.transactions.request_next()
    }

    /// Advance the response cursor.
    pub(crate) fn response_next(&mut self) -> usize {
        self.conn.transactions.response_next()
    }

    /// Index of the current request transaction.
    pub fn request_index(&self) -> usize {
        self.conn.transactions.request_index()
    }

    /// Index of the current response transaction.
    pub fn response_index(&self) -> usize {
        self.conn.transactions.response_index()
    }

    /// Dispatch on the current request-side state.
    pub(crate) fn handle_request_state(&mut self, data: &mut ParserData) -> Result<()> {
        match self.request_state {
            State::Idle => self.request_idle(data),
            State::IgnoreDataAfterHttp09 => self.request_ignore_data_after_http_0_9(data),
            State::Line => self.request_line(data),
            State::Protocol => self.request_protocol(data),
            State::Headers => self.request_headers(data),
            State::ConnectWaitResponse => self.request_connect_wait_response(),
            State::ConnectCheck => self.request_connect_check(),
            State::ConnectProbeData => self.request_connect_probe_data(data),
            State::BodyDetermine => self.request_body_determine(),
            State::BodyChunkedData => self.request_body_chunked_data(data),
            State::BodyChunkedLength => self.request_body_chunked_length(data),
            State::BodyChunkedDataEnd => self.request_body_chunked_data_end(data),
            State::BodyIdentity => self.request_body_identity(data),
            State::Finalize => self.request_finalize(data),
            // Response-side states are unreachable here.
            _ => Err(Status::Error),
        }
    }

    /// Dispatch on the current response-side state.
    pub(crate) fn handle_response_state(&mut self, data: &mut ParserData) -> Result<()> {
        match self.response_state {
            State::Idle => self.response_idle(data),
            State::Line => self.response_line(data),
            State::Headers => self.response_headers(data),
            State::BodyDetermine => self.response_body_determine(data),
            State::BodyChunkedData => self.response_body_chunked_data(data),
            State::BodyChunkedLength => self.response_body_chunked_length(data),
            State::BodyChunkedDataEnd => self.response_body_chunked_data_end(data),
            State::Finalize => self.response_finalize(data),
            State::BodyIdentityStreamClose => self.response_body_identity_stream_close(data),
            State::BodyIdentityClKnown => self.response_body_identity_cl_known(data),
            // Request-side states are unreachable here.
            _ => Err(Status::Error),
        }
    }

    /// Open the connection, recording peer addressing. Must happen before
    /// any data is fed.
    pub fn open(
        &mut self, client_addr: Option<IpAddr>, client_port: Option<u16>,
        server_addr: Option<IpAddr>, server_port: Option<u16>,
        timestamp: Option<OffsetDateTime>,
    ) {
        if self.request_status != StreamState::New || self.response_status != StreamState::New {
            htap_error!(
                self.logger,
                LogCode::ConnectionAlreadyOpen,
                "Connection is already open"
            );
            return;
        }
        self.conn
            .open(client_addr, client_port, server_addr, server_port, timestamp);
        self.request_status = StreamState::Open;
        self.response_status = StreamState::Open;
    }

    /// Close the inbound direction only, then flush its final state.
    pub fn request_close(&mut self, timestamp: Option<OffsetDateTime>) {
        if self.request_status != StreamState::Error {
            self.request_status = StreamState::Closed;
        }
        self.request_data(ParserData::default(), timestamp);
    }

    /// Close both directions, then flush final state so events that
    /// depend on stream closure can fire.
    pub fn close(&mut self, timestamp: Option<OffsetDateTime>) {
        self.conn.close(timestamp);
        if self.request_status != StreamState::Error {
            self.request_status = StreamState::Closed;
        }
        if self.response_status != StreamState::Error {
            self.response_status = StreamState::Closed;
        }
        self.request_data(ParserData::default(), timestamp);
        self.response_data(ParserData::default(), timestamp);
    }

    /// Reset per-request scratch state before a new request starts.
    pub(crate) fn request_reset(&mut self) {
        self.request_content_length = None;
        self.request_body_data_left = None;
        self.request_chunk_request_index = self.request_chunk_count;
    }

    /// Bytes consumed from the most recent request chunk. Useful after a
    /// partial-consumption return.
    pub fn request_data_consumed(&self) -> usize {
        self.request_bytes_consumed
    }

    /// Bytes consumed from the most recent response chunk.
    pub fn response_data_consumed(&self) -> usize {
        self.response_bytes_consumed
    }

    /// Timestamp of the most recent request data chunk.
    pub fn request_timestamp(&self) -> OffsetDateTime {
        self.request_timestamp
    }

    /// Timestamp of the most recent response data chunk.
    pub fn response_timestamp(&self) -> OffsetDateTime {
        self.response_timestamp
    }

    /// Consume bytes from the request chunk, tracking the total.
    pub(crate) fn request_data_consume(&mut self, input: &ParserData, consumed: usize) {
        input.consume(consumed);
        self.request_bytes_consumed = input.consumed_len();
    }

    /// Rewind the request chunk.
    pub(crate) fn request_data_unconsume(&mut self, input: &mut ParserData, unconsume: usize) {
        input.unconsume(unconsume);
        self.request_bytes_consumed = input.consumed_len();
    }

    /// Consume bytes from the response chunk, tracking the total.
    pub(crate) fn response_data_consume(&mut self, input: &ParserData, consumed: usize) {
        input.consume(consumed);
        self.response_bytes_consumed = input.consumed_len();
    }

    /// Rewind the response chunk.
    pub(crate) fn response_data_unconsume(&mut self, input: &mut ParserData, unconsume: usize) {
        input.unconsume(unconsume);
        self.response_bytes_consumed = input.consumed_len();
    }

    /// Set the opaque user data.
    pub fn set_user_data(&mut self, data: Box<dyn Any + 'static>) {
        self.user_data = Some(data);
    }

    /// Borrow the opaque user data.
    pub fn user_data<T: 'static>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|ud| ud.downcast_ref::<T>())
    }

    /// Start a new request transaction: progress to Line and run the
    /// request-start hook.
    pub(crate) fn state_request_start(&mut self) -> Result<()> {
        self.request_state = State::Line;
        let req = self.request_mut().ok_or(Status::Error)?;
        req.request_progress = RequestProgress::Line;
        let hook = self.cfg.hook_request_start.clone();
        let req = self.request_mut().ok_or(Status::Error)?;
        hook.run_all(req)?;
        Ok(())
    }

    /// Headers (or trailers) fully parsed on the request side. The same
    /// wire state is entered twice on chunked requests; transaction
    /// progress decides which pass this is.
    pub(crate) fn state_request_headers(&mut self, input: &mut ParserData) -> Result<()> {
        // Flush the raw-header-data receiver first.
        self.request_receiver_finalize_clear(input)?;
        let progress = self
            .request()
            .ok_or(Status::Error)?
            .request_progress;
        if progress > RequestProgress::Headers {
            // Trailer pass: run the trailer hook, then finalize.
            let hook = self.cfg.hook_request_trailer.clone();
            let req = self.request_mut().ok_or(Status::Error)?;
            hook.run_all(req)?;
            self.request_state = State::Finalize;
            Ok(())
        } else if progress >= RequestProgress::Line {
            // First pass: decide framing and run the headers hook.
            let multi_packet = self.request_chunk_count != self.request_chunk_request_index;
            let req = self.request_mut().ok_or(Status::Error)?;
            if multi_packet {
                req.flags.set(Flags::MULTI_PACKET_HEAD);
            }
            req.process_request_headers()?;
            let hook = self.cfg.hook_request_headers.clone();
            let req = self.request_mut().ok_or(Status::Error)?;
            hook.run_all(req)?;
            // An invalid request still moves forward.
            self.request_state = State::ConnectCheck;
            Ok(())
        } else {
            htap_warn!(
                self.logger,
                LogCode::ResponseBodyInternalError,
                format!("[Internal Error] Invalid tx progress: {:?}", progress)
            );
            Err(Status::Error)
        }
    }

    /// Request line fully parsed: build the URIs, run the hook, move to
    /// the protocol check.
    pub(crate) fn state_request_line(&mut self) -> Result<()> {
        let req = self.request_mut().ok_or(Status::Error)?;
        req.build_request_uri()?;
        let hook = self.cfg.hook_request_line.clone();
        let req = self.request_mut().ok_or(Status::Error)?;
        hook.run_all(req)?;
        let logger = self.logger.clone();
        let req = self.request_mut().ok_or(Status::Error)?;
        if let Some(parsed_uri) = req.parsed_uri.as_ref() {
            let (partial_normalized_uri, complete_normalized_uri) =
                parsed_uri.generate_normalized_uri(Some(logger));
            req.partial_normalized_uri = partial_normalized_uri;
            req.complete_normalized_uri = complete_normalized_uri;
        }
        self.request_state = State::Protocol;
        Ok(())
    }

    /// The request side is done: run completion hooks exactly once, then
    /// return to idle (or the HTTP/0.9 data sink).
    pub(crate) fn state_request_complete(&mut self, input: &mut ParserData) -> Result<()> {
        let req = self.request_mut().ok_or(Status::Error)?;
        if req.request_progress != RequestProgress::Complete {
            let has_body = req.request_has_body();
            if has_body {
                // Final body-data call with the end marker.
                self.request_body_data(None)?;
            }
            let req = self.request_mut().ok_or(Status::Error)?;
            req.request_progress = RequestProgress::Complete;
            let hook = self.cfg.hook_request_complete.clone();
            let req = self.request_mut().ok_or(Status::Error)?;
            hook.run_all(req)?;
            self.request_receiver_finalize_clear(input)?;
        }
        self.request_state = if self.request().ok_or(Status::Error)?.is_protocol_0_9 {
            State::IgnoreDataAfterHttp09
        } else {
            State::Idle
        };
        self.finalize(self.request_index())?;
        self.request_next();
        Ok(())
    }

    /// Run the transaction-complete hook when both sides are done; with
    /// auto-destroy configured the transaction is released right after.
    /// Guarded by the progress check, so it fires exactly once.
    pub(crate) fn finalize(&mut self, tx_index: usize) -> Result<()> {
        let complete = self
            .tx(tx_index)
            .map(|tx| tx.is_complete())
            .unwrap_or(false);
        if !complete {
            return Ok(());
        }
        let hook = self.cfg.hook_transaction_complete.clone();
        if let Some(tx) = self.tx_mut(tx_index) {
            hook.run_all(tx)?;
        }
        if self.cfg.tx_auto_destroy {
            self.conn.transactions.remove(tx_index);
        }
        Ok(())
    }

    /// Start response parsing for the current transaction.
    pub(crate) fn state_response_start(&mut self) -> Result<()> {
        let tx = self.response_mut().ok_or(Status::Error)?;
        if tx.is_protocol_0_9 {
            // An HTTP/0.9 response is all body, no status line or headers.
            tx.response_transfer_coding = TransferCoding::Identity;
            tx.response_content_encoding_processing =
                crate::decompressors::ContentEncoding::None;
            tx.response_progress = ResponseProgress::Body;
            self.response_state = State::BodyIdentityStreamClose;
            self.response_body_data_left = None;
        } else {
            tx.response_progress = ResponseProgress::Line;
            self.response_state = State::Line;
        }
        let hook = self.cfg.hook_response_start.clone();
        let tx = self.response_mut().ok_or(Status::Error)?;
        hook.run_all(tx)?;
        // A response starting while the request line is still incomplete
        // points at a timed-out or overlong request.
        let tx = self.response_mut().ok_or(Status::Error)?;
        if tx.request_method.is_none()
            && tx.request_uri.is_none()
            && self.request_state == State::Line
        {
            htap_warn!(
                self.logger,
                LogCode::RequestLineIncomplete,
                "Request line incomplete"
            );
        }
        Ok(())
    }

    /// Response headers fully parsed: flush the raw receiver, run the
    /// hook, set up decompression.
    pub(crate) fn state_response_headers(&mut self, input: &mut ParserData) -> Result<()> {
        self.response_receiver_finalize_clear(input)?;
        let hook = self.cfg.hook_response_headers.clone();
        let resp = self.response_mut().ok_or(Status::Error)?;
        hook.run_all(resp)?;
        self.response_initialize_decompressors()
    }

    /// Response line fully parsed: validate it and run the hook.
    pub(crate) fn state_response_line(&mut self) -> Result<()> {
        let tx = self.response_mut().ok_or(Status::Error)?;
        tx.validate_response_line();
        let hook = self.cfg.hook_response_line.clone();
        let tx = self.response_mut().ok_or(Status::Error)?;
        hook.run_all(tx)
    }

    /// The response side is done: run completion hooks exactly once,
    /// check whether the request side is waiting on us, then return to
    /// idle.
    pub(crate) fn state_response_complete(&mut self, input: &mut ParserData) -> Result<()> {
        let response_index = self.response_index();
        let tx = self.response_mut().ok_or(Status::Error)?;
        if tx.response_progress != ResponseProgress::Complete {
            tx.response_progress = ResponseProgress::Complete;
            if tx.response_transfer_coding != TransferCoding::NoBody {
                // Final body-data call with the end marker.
                let _ = self.response_body_data(None);
            }
            let hook = self.cfg.hook_response_complete.clone();
            let tx = self.response_mut().ok_or(Status::Error)?;
            hook.run_all(tx)?;
            self.response_receiver_finalize_clear(input)?;
        }
        self.request_parser_check_waiting()?;
        self.finalize(response_index)?;
        self.response_next();
        self.response_state = State::Idle;
        Ok(())
    }

    /// Yield to the inbound parser when it has been waiting on response
    /// progress (CONNECT handling, pipelining).
    fn request_parser_check_waiting(&mut self) -> Result<()> {
        // The inbound parser may have stopped to hear the server's verdict
        // (a CONNECT, say) before deciding how to continue. If it has
        // unconsumed data we must yield before creating the illusion of a
        // response with no request. The index comparison matters: with
        // pipelining, many requests may already be parsed while we still
        // wait on an earlier response.
        if self.response_status == StreamState::DataOther
            && self.response_index() == self.request_index()
        {
            return Err(Status::DataOther);
        }
        if self.response_data_other_at_tx_end {
            self.response_data_other_at_tx_end = false;
            if self.response_index() == self.request_index() {
                return Err(Status::DataOther);
            }
        }
        Ok(())
    }

    /// Remove the given transaction from the connection.
    pub fn remove_tx(&mut self, tx_index: usize) {
        self.conn.transactions.remove(tx_index);
    }
}
