use crate::{
    decompressors::Options,
    error::Result,
    hook::{DataHook, TxHook},
    unicode_bestfit_map::UnicodeBestfitMap,
    Status,
};

/// Decoder option contexts. Options are kept in per-context copies so the
/// URL path can be decoded under different rules than the other URI
/// components. Writing to [`DecoderCtx::Defaults`] fans the value out to
/// every context at call time; there is no hidden fallback between
/// contexts afterwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DecoderCtx {
    /// Applies to every context when written through.
    Defaults = 0,
    /// Decoding of the URL path.
    UrlPath = 1,
    /// Decoding of query parameters.
    UrlEncoded = 2,
}

const DECODER_CTXS: usize = 3;

/// Parser configuration. Built once, then treated as read-only while any
/// parser holds a reference to it.
#[derive(Clone)]
pub struct Config {
    /// Hard limit on the reassembly buffer: the most bytes buffered while
    /// waiting for the rest of an incomplete unit (e.g. a header line
    /// spanning several packets). Exceeding it is a fatal parse error.
    pub(crate) field_limit: usize,
    /// Server personality.
    pub(crate) server_personality: Personality,
    /// Per-context decoder options.
    pub(crate) decoder_cfgs: [DecoderConfig; DECODER_CTXS],
    /// Invoked when the parser sees the first byte of a new request. Since
    /// every transaction starts with a request this doubles as the
    /// transaction-start hook.
    pub(crate) hook_request_start: TxHook,
    /// Invoked after the request line has been parsed.
    pub(crate) hook_request_line: TxHook,
    /// Receives the raw request header bytes exactly as seen on the wire,
    /// including the terminating empty line. Not available on genuine
    /// HTTP/0.9 requests.
    pub(crate) hook_request_header_data: DataHook,
    /// Invoked after all request headers have been parsed.
    pub(crate) hook_request_headers: TxHook,
    /// Invoked for every piece of dechunked, decompressed request body
    /// data, then once more with the end marker.
    pub(crate) hook_request_body_data: DataHook,
    /// Receives raw request trailer bytes on chunked requests, from right
    /// after the zero-length chunk through the terminating empty line.
    pub(crate) hook_request_trailer_data: DataHook,
    /// Invoked after trailer headers have been parsed, if any were present.
    pub(crate) hook_request_trailer: TxHook,
    /// Invoked when the request side of a transaction completes.
    pub(crate) hook_request_complete: TxHook,
    /// Invoked when response parsing starts.
    pub(crate) hook_response_start: TxHook,
    /// Invoked after the response line has been parsed.
    pub(crate) hook_response_line: TxHook,
    /// Raw response header bytes; the response-side mirror of
    /// `hook_request_header_data`.
    pub(crate) hook_response_header_data: DataHook,
    /// Invoked after all response headers have been parsed.
    pub(crate) hook_response_headers: TxHook,
    /// Invoked for every piece of dechunked, decompressed response body
    /// data, then once more with the end marker.
    pub(crate) hook_response_body_data: DataHook,
    /// Raw response trailer bytes; the response-side mirror of
    /// `hook_request_trailer_data`.
    pub(crate) hook_response_trailer_data: DataHook,
    /// Invoked after response trailer headers have been parsed.
    pub(crate) hook_response_trailer: TxHook,
    /// Invoked when the response side of a transaction completes. Servers
    /// sometimes answer before reading the whole request, so this may fire
    /// before the request-complete hook.
    pub(crate) hook_response_complete: TxHook,
    /// Invoked exactly once per transaction, after both sides complete.
    /// Always the last hook a transaction sees.
    pub(crate) hook_transaction_complete: TxHook,
    /// Reaction to leading whitespace on the request line.
    pub(crate) requestline_leading_whitespace_unwanted: Unwanted,
    /// Whether compressed response bodies are decompressed before being
    /// handed to the body-data hooks.
    pub(crate) response_decompression_enabled: bool,
    /// Decompression limits.
    pub(crate) compression_options: Options,
    /// Whether the Authorization request header is parsed.
    pub(crate) parse_request_auth: bool,
    /// Whether the Cookie request header is parsed.
    pub(crate) parse_request_cookies: bool,
    /// Whether a transaction is released as soon as its transaction-complete
    /// hook returns.
    pub(crate) tx_auto_destroy: bool,
    /// Maximum number of live transactions per connection.
    pub(crate) max_tx: u32,
    /// Maximum number of headers per message.
    pub(crate) number_headers_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            field_limit: 18000,
            server_personality: Personality::Minimal,
            decoder_cfgs: Default::default(),
            hook_request_start: TxHook::default(),
            hook_request_line: TxHook::default(),
            hook_request_header_data: DataHook::default(),
            hook_request_headers: TxHook::default(),
            hook_request_body_data: DataHook::default(),
            hook_request_trailer_data: DataHook::default(),
            hook_request_trailer: TxHook::default(),
            hook_request_complete: TxHook::default(),
            hook_response_start: TxHook::default(),
            hook_response_line: TxHook::default(),
            hook_response_header_data: DataHook::default(),
            hook_response_headers: TxHook::default(),
            hook_response_body_data: DataHook::default(),
            hook_response_trailer_data: DataHook::default(),
            hook_response_trailer: TxHook::default(),
            hook_response_complete: TxHook::default(),
            hook_transaction_complete: TxHook::default(),
            requestline_leading_whitespace_unwanted: Unwanted::Ignore,
            response_decompression_enabled: true,
            compression_options: Options::default(),
            parse_request_auth: true,
            parse_request_cookies: true,
            tx_auto_destroy: false,
            max_tx: 512,
            number_headers_limit: 1024,
        }
    }
}

/// Decoder options for one context.
#[derive(Copy, Clone)]
pub(crate) struct DecoderConfig {
    /// Decode the path a second time when generating the normalized URI.
    pub(crate) double_decode_normalized_path: bool,
    /// Decode the query a second time when generating the normalized URI.
    pub(crate) double_decode_normalized_query: bool,
    /// Convert backslashes to forward slashes.
    pub(crate) backslash_convert_slashes: bool,
    /// Lowercase the decoded bytes.
    pub(crate) convert_lowercase: bool,
    /// Compress consecutive path separators.
    pub(crate) path_separators_compress: bool,
    /// URL-decode encoded path separators.
    pub(crate) path_separators_decode: bool,
    /// Server reaction to encoded path separators.
    pub(crate) path_separators_encoded_unwanted: Unwanted,
    /// Decode '+' to space.
    pub(crate) plusspace_decode: bool,
    /// A raw NUL byte terminates the string.
    pub(crate) nul_raw_terminates: bool,
    /// Server reaction to a raw NUL byte.
    pub(crate) nul_raw_unwanted: Unwanted,
    /// Server reaction to raw control characters.
    pub(crate) control_chars_unwanted: Unwanted,
    /// Allow whitespace inside the request URI.
    pub(crate) allow_space_uri: bool,
    /// Decode %u sequences.
    pub(crate) u_encoding_decode: bool,
    /// Server reaction to %u encoding.
    pub(crate) u_encoding_unwanted: Unwanted,
    /// Handling of invalid URL encodings.
    pub(crate) url_encoding_invalid_handling: UrlEncodingHandling,
    /// Server reaction to invalid URL encodings.
    pub(crate) url_encoding_invalid_unwanted: Unwanted,
    /// An encoded NUL byte terminates the string.
    pub(crate) nul_encoded_terminates: bool,
    /// Server reaction to an encoded NUL byte.
    pub(crate) nul_encoded_unwanted: Unwanted,
    /// Server reaction to invalid UTF-8.
    pub(crate) utf8_invalid_unwanted: Unwanted,
    /// Treat the path as UTF-8 and best-fit convert it to single bytes.
    pub(crate) utf8_convert_bestfit: bool,
    /// Best-fit map used for %u and UTF-8 conversion.
    pub(crate) bestfit_map: UnicodeBestfitMap,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            double_decode_normalized_path: false,
            double_decode_normalized_query: false,
            backslash_convert_slashes: false,
            convert_lowercase: false,
            path_separators_compress: false,
            path_separators_decode: false,
            path_separators_encoded_unwanted: Unwanted::Ignore,
            plusspace_decode: true,
            nul_raw_terminates: false,
            nul_raw_unwanted: Unwanted::Ignore,
            control_chars_unwanted: Unwanted::Ignore,
            allow_space_uri: false,
            u_encoding_decode: false,
            u_encoding_unwanted: Unwanted::Ignore,
            url_encoding_invalid_handling: UrlEncodingHandling::PreservePercent,
            url_encoding_invalid_unwanted: Unwanted::Ignore,
            nul_encoded_terminates: false,
            nul_encoded_unwanted: Unwanted::Ignore,
            utf8_invalid_unwanted: Unwanted::Ignore,
            utf8_convert_bestfit: false,
            bestfit_map: UnicodeBestfitMap::default(),
        }
    }
}

/// Server personalities. Each selects the request/response-line and header
/// processing quirks of one server family and installs the matching decoder
/// defaults as a bundle.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Personality {
    /// Performs as little work as possible; all optional decoding steps are
    /// disabled. Good starting point for custom configurations.
    Minimal,
    /// Works reasonably well for all server types.
    Generic,
    /// Performs as much decoding as possible; intended for IDS use.
    Ids,
    /// IIS 4.0 (Windows NT 4.0).
    Iis4_0,
    /// IIS 5.0 (Windows 2000).
    Iis5_0,
    /// IIS 5.1 (Windows XP Professional).
    Iis5_1,
    /// IIS 6.0 (Windows 2003).
    Iis6_0,
    /// IIS 7.0 (Windows 2008).
    Iis7_0,
    /// IIS 7.5 (Windows 7).
    Iis7_5,
    /// Apache 2.x.
    Apache2,
}

/// How a server is expected to respond to a malformed construct: not at
/// all, or with a particular status code the parser should anticipate.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Unwanted {
    /// The problem is ignored.
    Ignore,
    /// The server is expected to respond with a 400.
    Code400 = 400,
}

/// Approaches to handling invalid URL encodings.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UrlEncodingHandling {
    /// Leave the percent and the following bytes in the data untouched.
    PreservePercent,
    /// Remove the percent, leave the following bytes untouched.
    RemovePercent,
    /// Decode the invalid sequence anyway.
    ProcessInvalid,
}

impl Config {
    /// Borrow the decoder options for one context.
    pub(crate) fn decoder_cfg(&self, ctx: DecoderCtx) -> &DecoderConfig {
        &self.decoder_cfgs[ctx as usize]
    }

    /// Apply a decoder option write to the given context, fanning a
    /// Defaults write out to every context.
    fn decoder_set<F: Fn(&mut DecoderConfig)>(&mut self, ctx: DecoderCtx, f: F) {
        if ctx == DecoderCtx::Defaults {
            for cfg in self.decoder_cfgs.iter_mut() {
                f(cfg);
            }
        } else {
            f(&mut self.decoder_cfgs[ctx as usize]);
        }
    }

    /// Registers a request_start callback.
    pub fn register_request_start(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_request_start.register(cbk_fn);
    }

    /// Registers a request_line callback.
    pub fn register_request_line(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_request_line.register(cbk_fn);
    }

    /// Registers a request_header_data callback receiving raw header bytes.
    pub fn register_request_header_data(&mut self, cbk_fn: crate::hook::DataCallbackFn) {
        self.hook_request_header_data.register(cbk_fn);
    }

    /// Registers a request_headers callback.
    pub fn register_request_headers(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_request_headers.register(cbk_fn);
    }

    /// Registers a request_body_data callback.
    pub fn register_request_body_data(&mut self, cbk_fn: crate::hook::DataCallbackFn) {
        self.hook_request_body_data.register(cbk_fn);
    }

    /// Registers a request_trailer_data callback receiving raw trailer bytes.
    pub fn register_request_trailer_data(&mut self, cbk_fn: crate::hook::DataCallbackFn) {
        self.hook_request_trailer_data.register(cbk_fn);
    }

    /// Registers a request_trailer callback.
    pub fn register_request_trailer(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_request_trailer.register(cbk_fn);
    }

    /// Registers a request_complete callback.
    pub fn register_request_complete(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_request_complete.register(cbk_fn);
    }

    /// Registers a response_start callback.
    pub fn register_response_start(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_response_start.register(cbk_fn);
    }

    /// Registers a response_line callback.
    pub fn register_response_line(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_response_line.register(cbk_fn);
    }

    /// Registers a response_header_data callback receiving raw header bytes.
    pub fn register_response_header_data(&mut self, cbk_fn: crate::hook::DataCallbackFn) {
        self.hook_response_header_data.register(cbk_fn);
    }

    /// Registers a response_headers callback.
    pub fn register_response_headers(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_response_headers.register(cbk_fn);
    }

    /// Registers a response_body_data callback.
    pub fn register_response_body_data(&mut self, cbk_fn: crate::hook::DataCallbackFn) {
        self.hook_response_body_data.register(cbk_fn);
    }

    /// Registers a response_trailer_data callback receiving raw trailer bytes.
    pub fn register_response_trailer_data(&mut self, cbk_fn: crate::hook::DataCallbackFn) {
        self.hook_response_trailer_data.register(cbk_fn);
    }

    /// Registers a response_trailer callback.
    pub fn register_response_trailer(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_response_trailer.register(cbk_fn);
    }

    /// Registers a response_complete callback.
    pub fn register_response_complete(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_response_complete.register(cbk_fn);
    }

    /// Registers a transaction_complete callback.
    pub fn register_transaction_complete(&mut self, cbk_fn: crate::hook::TxCallbackFn) {
        self.hook_transaction_complete.register(cbk_fn);
    }

    /// Configures the maximum size of the reassembly buffer, used when a
    /// syntactic unit (e.g. a very long header line) spans several packets.
    pub fn set_field_limit(&mut self, field_limit: usize) {
        self.field_limit = field_limit;
    }

    /// Configures the desired server personality; this installs the
    /// personality's decoder-option bundle as a side effect.
    ///
    /// Returns an error if the personality is not supported.
    pub fn set_server_personality(&mut self, personality: Personality) -> Result<()> {
        match personality {
            Personality::Minimal => {}
            Personality::Generic => {
                self.set_backslash_convert_slashes(DecoderCtx::Defaults, true);
                self.set_path_separators_decode(DecoderCtx::Defaults, true);
                self.set_path_separators_compress(DecoderCtx::Defaults, true);
            }
            Personality::Ids => {
                self.set_backslash_convert_slashes(DecoderCtx::Defaults, true);
                self.set_path_separators_decode(DecoderCtx::Defaults, true);
                self.set_path_separators_compress(DecoderCtx::Defaults, true);
                self.set_convert_lowercase(DecoderCtx::Defaults, true);
                self.set_utf8_convert_bestfit(DecoderCtx::Defaults, true);
                self.set_u_encoding_decode(DecoderCtx::Defaults, true);
                self.set_requestline_leading_whitespace_unwanted(Unwanted::Ignore);
            }
            Personality::Apache2 => {
                self.set_backslash_convert_slashes(DecoderCtx::Defaults, false);
                self.set_path_separators_decode(DecoderCtx::Defaults, false);
                self.set_path_separators_compress(DecoderCtx::Defaults, true);
                self.set_u_encoding_decode(DecoderCtx::Defaults, false);
                self.set_url_encoding_invalid_handling(
                    DecoderCtx::Defaults,
                    UrlEncodingHandling::PreservePercent,
                );
                self.set_url_encoding_invalid_unwanted(DecoderCtx::Defaults, Unwanted::Code400);
                self.set_control_chars_unwanted(DecoderCtx::Defaults, Unwanted::Ignore);
                self.set_requestline_leading_whitespace_unwanted(Unwanted::Code400);
            }
            Personality::Iis5_1 => {
                self.set_backslash_convert_slashes(DecoderCtx::Defaults, true);
                self.set_path_separators_decode(DecoderCtx::Defaults, true);
                self.set_path_separators_compress(DecoderCtx::Defaults, true);
                self.set_u_encoding_decode(DecoderCtx::Defaults, false);
                self.set_url_encoding_invalid_handling(
                    DecoderCtx::Defaults,
                    UrlEncodingHandling::PreservePercent,
                );
                self.set_control_chars_unwanted(DecoderCtx::Defaults, Unwanted::Ignore);
                self.set_requestline_leading_whitespace_unwanted(Unwanted::Ignore);
            }
            Personality::Iis6_0 => {
                self.set_backslash_convert_slashes(DecoderCtx::Defaults, true);
                self.set_path_separators_decode(DecoderCtx::Defaults, true);
                self.set_path_separators_compress(DecoderCtx::Defaults, true);
                self.set_u_encoding_decode(DecoderCtx::Defaults, true);
                self.set_url_encoding_invalid_handling(
                    DecoderCtx::Defaults,
                    UrlEncodingHandling::PreservePercent,
                );
                self.set_u_encoding_unwanted(DecoderCtx::Defaults, Unwanted::Code400);
                self.set_control_chars_unwanted(DecoderCtx::Defaults, Unwanted::Code400);
                self.set_requestline_leading_whitespace_unwanted(Unwanted::Ignore);
            }
            Personality::Iis7_0 | Personality::Iis7_5 => {
                self.set_backslash_convert_slashes(DecoderCtx::Defaults, true);
                self.set_path_separators_decode(DecoderCtx::Defaults, true);
                self.set_path_separators_compress(DecoderCtx::Defaults, true);
                self.set_u_encoding_decode(DecoderCtx::Defaults, true);
                self.set_url_encoding_invalid_handling(
                    DecoderCtx::Defaults,
                    UrlEncodingHandling::PreservePercent,
                );
                self.set_url_encoding_invalid_unwanted(DecoderCtx::Defaults, Unwanted::Code400);
                self.set_control_chars_unwanted(DecoderCtx::Defaults, Unwanted::Code400);
                self.set_requestline_leading_whitespace_unwanted(Unwanted::Ignore);
            }
            _ => return Err(Status::Error),
        }
        self.server_personality = personality;
        Ok(())
    }

    /// Configures whether backslashes are treated as path separators.
    pub fn set_backslash_convert_slashes(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.backslash_convert_slashes = enabled);
    }

    /// Configures whether decoded bytes are lowercased.
    pub fn set_convert_lowercase(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.convert_lowercase = enabled);
    }

    /// Configures whether consecutive path separators are compressed, so
    /// "/one//two" normalizes to "/one/two".
    pub fn set_path_separators_compress(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.path_separators_compress = enabled);
    }

    /// Configures whether encoded path separators are decoded, so
    /// "/one%2ftwo" normalizes to "/one/two". Apache leaves them encoded,
    /// IIS does not.
    pub fn set_path_separators_decode(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.path_separators_decode = enabled);
    }

    /// Configures the expected server reaction to encoded path separators.
    pub fn set_path_separators_encoded_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.path_separators_encoded_unwanted = unwanted);
    }

    /// Configures whether '+' decodes to a space.
    pub fn set_plusspace_decode(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.plusspace_decode = enabled);
    }

    /// Configures whether a raw NUL byte terminates the decoded string.
    pub fn set_nul_raw_terminates(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.nul_raw_terminates = enabled);
    }

    /// Configures the expected server reaction to a raw NUL byte.
    pub fn set_nul_raw_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.nul_raw_unwanted = unwanted);
    }

    /// Configures whether an encoded NUL byte terminates the decoded
    /// string. When termination is off the NUL stays in the output.
    pub fn set_nul_encoded_terminates(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.nul_encoded_terminates = enabled);
    }

    /// Configures the expected server reaction to an encoded NUL byte.
    pub fn set_nul_encoded_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.nul_encoded_unwanted = unwanted);
    }

    /// Configures the expected server reaction to raw control characters.
    pub fn set_control_chars_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.control_chars_unwanted = unwanted);
    }

    /// Configures whether %u sequences are decoded; when disabled they are
    /// treated as opaque bytes.
    pub fn set_u_encoding_decode(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.u_encoding_decode = enabled);
    }

    /// Configures the expected server reaction to %u encoding.
    pub fn set_u_encoding_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.u_encoding_unwanted = unwanted);
    }

    /// Configures the handling of invalid URL encodings.
    pub fn set_url_encoding_invalid_handling(
        &mut self, ctx: DecoderCtx, handling: UrlEncodingHandling,
    ) {
        self.decoder_set(ctx, |c| c.url_encoding_invalid_handling = handling);
    }

    /// Configures the expected server reaction to invalid URL encodings.
    pub fn set_url_encoding_invalid_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.url_encoding_invalid_unwanted = unwanted);
    }

    /// Configures whether the path is treated as UTF-8 and best-fit
    /// converted to a single-byte stream.
    pub fn set_utf8_convert_bestfit(&mut self, ctx: DecoderCtx, enabled: bool) {
        self.decoder_set(ctx, |c| c.utf8_convert_bestfit = enabled);
    }

    /// Configures the expected server reaction to invalid UTF-8.
    pub fn set_utf8_invalid_unwanted(&mut self, ctx: DecoderCtx, unwanted: Unwanted) {
        self.decoder_set(ctx, |c| c.utf8_invalid_unwanted = unwanted);
    }

    /// Configures whether whitespace is tolerated inside the request URI.
    pub fn set_allow_space_uri(&mut self, allow_space: bool) {
        self.decoder_set(DecoderCtx::Defaults, |c| c.allow_space_uri = allow_space);
    }

    /// Installs a custom best-fit map.
    pub fn set_bestfit_map(&mut self, ctx: DecoderCtx, map: &'static [(u32, u8)]) {
        self.decoder_set(ctx, |c| c.bestfit_map.map = map);
    }

    /// Sets the replacement byte used by the best-fit mapping for code
    /// points the table does not cover. Defaults to '?'.
    pub fn set_bestfit_replacement_byte(&mut self, ctx: DecoderCtx, b: u8) {
        self.decoder_set(ctx, |c| c.bestfit_map.replacement_byte = b);
    }

    /// Decode the normalized URI path a second time, flagging double
    /// encoding when the second pass shrinks it.
    pub fn set_double_decode_normalized_path(&mut self, enabled: bool) {
        self.decoder_set(DecoderCtx::Defaults, |c| {
            c.double_decode_normalized_path = enabled
        });
    }

    /// Decode the normalized URI query a second time.
    pub fn set_double_decode_normalized_query(&mut self, enabled: bool) {
        self.decoder_set(DecoderCtx::Defaults, |c| {
            c.double_decode_normalized_query = enabled
        });
    }

    /// Configures the expected server reaction to leading whitespace on
    /// the request line.
    pub fn set_requestline_leading_whitespace_unwanted(&mut self, unwanted: Unwanted) {
        self.requestline_leading_whitespace_unwanted = unwanted;
    }

    /// Configures whether compressed response bodies are decompressed.
    pub fn set_response_decompression(&mut self, enabled: bool) {
        self.response_decompression_enabled = enabled;
    }

    /// Configures whether the Authorization request header is parsed.
    pub fn set_parse_request_auth(&mut self, enabled: bool) {
        self.parse_request_auth = enabled;
    }

    /// Configures whether the Cookie request header is parsed.
    pub fn set_parse_request_cookies(&mut self, enabled: bool) {
        self.parse_request_cookies = enabled;
    }

    /// Configures whether transactions are destroyed as soon as their
    /// transaction-complete hook returns. Callers must not retain
    /// transaction references past that hook when this is enabled.
    pub fn set_tx_auto_destroy(&mut self, enabled: bool) {
        self.tx_auto_destroy = enabled;
    }

    /// Configures how many layers of compression are decompressed.
    pub fn set_decompression_layer_limit(&mut self, limit: Option<u32>) {
        self.compression_options.set_layer_limit(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fan_out() {
        let mut cfg = Config::default();
        cfg.set_u_encoding_decode(DecoderCtx::Defaults, true);
        assert!(cfg.decoder_cfg(DecoderCtx::Defaults).u_encoding_decode);
        assert!(cfg.decoder_cfg(DecoderCtx::UrlPath).u_encoding_decode);
        assert!(cfg.decoder_cfg(DecoderCtx::UrlEncoded).u_encoding_decode);
    }

    #[test]
    fn context_write_is_isolated() {
        let mut cfg = Config::default();
        cfg.set_u_encoding_decode(DecoderCtx::UrlPath, true);
        assert!(!cfg.decoder_cfg(DecoderCtx::Defaults).u_encoding_decode);
        assert!(cfg.decoder_cfg(DecoderCtx::UrlPath).u_encoding_decode);
        assert!(!cfg.decoder_cfg(DecoderCtx::UrlEncoded).u_encoding_decode);
    }

    #[test]
    fn personality_installs_bundle() {
        let mut cfg = Config::default();
        cfg.set_server_personality(Personality::Ids).unwrap();
        assert_eq!(cfg.server_personality, Personality::Ids);
        assert!(cfg.decoder_cfg(DecoderCtx::UrlPath).u_encoding_decode);
        assert!(cfg.decoder_cfg(DecoderCtx::UrlPath).utf8_convert_bestfit);
        assert!(cfg
            .decoder_cfg(DecoderCtx::UrlPath)
            .backslash_convert_slashes);
    }

    #[test]
    fn unsupported_personality() {
        let mut cfg = Config::default();
        assert!(cfg.set_server_personality(Personality::Iis4_0).is_err());
    }
}
