use std::{cell::RefCell, collections::VecDeque, rc::Rc};

/// Diagnostic codes attached to every log record. Consumers match on these
/// rather than on message text.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LogCode {
    /// Default value.
    Unknown,
    /// Tried to open a connection that is already open.
    ConnectionAlreadyOpen,
    /// Supplied data chunk has a length of zero.
    ZeroLengthDataChunks,
    /// Parser was fed data while in the stop or error state.
    ParserStateError,
    /// A gap was supplied in a state that cannot absorb one.
    InvalidGap,
    /// Request buffer field is over the limit.
    RequestFieldTooLong,
    /// Response buffer field is over the limit.
    ResponseFieldTooLong,
    /// Request line has leading whitespace.
    RequestLineLeadingWhitespace,
    /// Non-compliant delimiter between method and URI in the request line.
    MethodDelimNonCompliant,
    /// Parsed request URI contains a non-compliant delimiter.
    UriDelimNonCompliant,
    /// Request-line method is unknown.
    RequestLineUnknownMethod,
    /// Request-line method is unknown and no protocol information was found.
    RequestLineUnknownMethodNoProtocol,
    /// Request-line method is unknown and the protocol is invalid.
    RequestLineUnknownMethodInvalidProtocol,
    /// Request line is missing protocol information.
    RequestLineNoProtocol,
    /// Request line was never completed.
    RequestLineIncomplete,
    /// Protocol version contains leading or trailing garbage.
    ProtocolContainsExtraData,
    /// Request chunk length line could not be parsed.
    InvalidRequestChunkLen,
    /// Response chunk length line could not be parsed.
    InvalidResponseChunkLen,
    /// Request chunk length line carried a chunk extension.
    RequestChunkExtension,
    /// Response chunk length line carried a chunk extension.
    ResponseChunkExtension,
    /// Request Transfer-Encoding value is not "chunked".
    InvalidTransferEncodingValueInRequest,
    /// Response Transfer-Encoding value is abnormal.
    ResponseAbnormalTransferEncoding,
    /// Chunked transfer-encoding seen on HTTP/0.9 or HTTP/1.0.
    ResponseChunkedOldProto,
    /// Request Content-Length could not be parsed.
    InvalidContentLengthFieldInRequest,
    /// Response Content-Length could not be parsed.
    InvalidContentLengthFieldInResponse,
    /// Request carries ambiguous duplicate Content-Length fields.
    DuplicateContentLengthFieldInRequest,
    /// Response carries ambiguous duplicate Content-Length fields.
    DuplicateContentLengthFieldInResponse,
    /// Content-Length value carries extra leading characters.
    ContentLengthExtraDataStart,
    /// Content-Length value carries extra trailing characters.
    ContentLengthExtraDataEnd,
    /// Request header field is missing a colon.
    RequestFieldMissingColon,
    /// Response header field is missing a colon.
    ResponseFieldMissingColon,
    /// Request header name is empty.
    RequestInvalidEmptyName,
    /// Response header name is empty.
    ResponseInvalidEmptyName,
    /// Request header name is followed by whitespace.
    RequestInvalidLwsAfterName,
    /// Response header name is followed by whitespace.
    ResponseInvalidLwsAfterName,
    /// Request header name is not a token.
    RequestHeaderInvalid,
    /// Response header name is not a token.
    ResponseHeaderNameNotToken,
    /// Request has invalid line folding.
    InvalidRequestFieldFolding,
    /// Response has invalid line folding.
    InvalidResponseFieldFolding,
    /// Request header seen more than once.
    RequestHeaderRepetition,
    /// Response header seen more than once.
    ResponseHeaderRepetition,
    /// Too many request headers.
    RequestTooManyHeaders,
    /// Too many response headers.
    ResponseTooManyHeaders,
    /// Mix of line-ending styles within one header block.
    DeformedEol,
    /// Host header is missing.
    MissingHostHeader,
    /// Host header is ambiguous.
    HostHeaderAmbiguous,
    /// Hostname in the URI is invalid.
    UriHostInvalid,
    /// Hostname in the Host header is invalid.
    HeaderHostInvalid,
    /// Authorization header could not be recognized.
    AuthUnrecognized,
    /// Response line protocol is invalid.
    ResponseLineInvalidProtocol,
    /// Response line status number is out of range.
    ResponseLineInvalidResponseStatus,
    /// A second interim 100 response was seen on the same transaction.
    ContinueAlreadySeen,
    /// A response arrived with no request to match it to.
    UnableToMatchResponseToRequest,
    /// 101 Switching Protocols seen together with Content-Length.
    SwitchingProtoWithContentLength,
    /// Unexpected request body present.
    RequestBodyUnexpected,
    /// Unexpected response body present.
    ResponseBodyUnexpected,
    /// PUT request carries no body.
    PutRequestMissingBody,
    /// Response content-type is multipart/byteranges (unsupported).
    ResponseMultipartByteranges,
    /// Content-Encoding header carries an abnormal value.
    AbnormalCeHeader,
    /// More content-encoding layers than the configured limit.
    TooManyEncodingLayers,
    /// Invalid content-encoding detected.
    InvalidContentEncoding,
    /// Decompression produced more output than the configured limits allow.
    CompressionBomb,
    /// Decompression failed.
    DecompressionFailed,
    /// URI path or query is double encoded.
    DoubleEncodedUri,
    /// Body data callback returned an error.
    RequestBodyDataCallbackError,
    /// Parsing progress is at an internally inconsistent state.
    ResponseBodyInternalError,
}

/// Log severity levels.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Debug)]
pub enum LogLevel {
    /// Fatal or stream-terminating conditions.
    Error,
    /// Hazardous but recoverable conditions.
    Warning,
    /// Default level.
    Notice,
    /// Useful information.
    Info,
}

/// A single diagnostic record.
#[derive(Clone, Debug)]
pub struct Log {
    /// Severity.
    pub level: LogLevel,
    /// Diagnostic code.
    pub code: LogCode,
    /// Human-readable message.
    pub msg: String,
    /// Source file that raised the record.
    pub file: &'static str,
    /// Source line that raised the record.
    pub line: u32,
}

/// Cloneable handle that pushes records onto a per-connection queue. The
/// queue is drained by the consumer via [`crate::connection::Connection`].
#[derive(Clone)]
pub struct Logger {
    pub(crate) sink: Rc<RefCell<VecDeque<Log>>>,
    /// Records below this level are dropped.
    pub(crate) level: LogLevel,
}

impl Logger {
    /// Make a new logger feeding the given queue.
    pub(crate) fn new(sink: &Rc<RefCell<VecDeque<Log>>>) -> Logger {
        Self {
            sink: Rc::clone(sink),
            level: LogLevel::Notice,
        }
    }

    /// Push one record, subject to the level filter.
    pub fn log(
        &mut self, file: &'static str, line: u32, level: LogLevel, code: LogCode, msg: String,
    ) {
        if level <= self.level {
            self.sink.borrow_mut().push_back(Log {
                level,
                code,
                msg,
                file,
                line,
            });
        }
    }
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! htap_log {
    ($logger:expr, $level:expr, $code:expr, $msg:expr) => {{
        use $crate::log::{LogCode, LogLevel};
        $logger.log(file!(), line!(), $level, $code, $msg.to_string());
    }};
}

/// Logs a message at the info level.
#[macro_export]
macro_rules! htap_info {
    ($logger:expr, $code:expr, $msg:expr) => {
        htap_log!($logger, LogLevel::Info, $code, $msg);
    };
}

/// Logs a message at the warning level.
#[macro_export]
macro_rules! htap_warn {
    ($logger:expr, $code:expr, $msg:expr) => {
        htap_log!($logger, LogLevel::Warning, $code, $msg);
    };
}

/// Logs a message at the error level.
#[macro_export]
macro_rules! htap_error {
    ($logger:expr, $code:expr, $msg:expr) => {
        htap_log!($logger, LogLevel::Error, $code, $msg);
    };
}

/// Logs a message at the warning level at most once per transaction, keyed
/// on a transaction flag bit.
#[macro_export]
macro_rules! htap_warn_once {
    ($logger:expr, $code:expr, $msg:expr, $tx_flags:expr, $flags:expr, $flag:expr) => {
        if !$tx_flags.is_set($flag) {
            htap_warn!($logger, $code, $msg);
        }
        $tx_flags.set($flag);
        $flags.set($flag);
    };
}
