use htap::{
    bstr::Bstr,
    config::{Config, DecoderCtx, Personality},
    connection::ConnectionFlags,
    connection_parser::{ConnectionParser, StreamState},
    request::Method,
    test::{MainUserData, Test, TestConfig},
    transaction::{
        HttpProtocol, RequestProgress, ResponseNumber, ResponseProgress, TransferCoding,
    },
    util::{FlagOps, Flags},
};
use std::io::Write as _;

mod common;

fn parser(cfg: Config) -> ConnectionParser {
    let mut connp = ConnectionParser::new(cfg);
    connp.open(None, None, None, None, None);
    connp
}

fn feed_request(connp: &mut ConnectionParser, data: &[u8]) -> StreamState {
    connp.request_data(data.into(), None)
}

fn feed_response(connp: &mut ConnectionParser, data: &[u8]) -> StreamState {
    connp.response_data(data.into(), None)
}

#[test]
fn simple_get() {
    let mut connp = parser(TestConfig());
    assert_eq!(
        feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n"),
        StreamState::Data
    );
    connp.request_close(None);

    assert_eq!(1, connp.tx_size());
    let tx = connp.tx(0).unwrap();
    assert!(tx.request_method.as_ref().unwrap().eq_slice("GET"));
    assert_eq!(tx.request_method_number, Method::Get);
    assert!(tx.request_uri.as_ref().unwrap().eq_slice("/"));
    assert!(tx.request_protocol.as_ref().unwrap().eq_slice("HTTP/1.1"));
    assert_eq!(tx.request_protocol_number, HttpProtocol::V1_1);
    assert_request_header_eq!(tx, "host", "example.com");
    assert!(tx
        .request_hostname
        .as_ref()
        .unwrap()
        .eq_slice("example.com"));
    assert_eq!(tx.request_transfer_coding, TransferCoding::NoBody);
    assert_eq!(tx.request_progress, RequestProgress::Complete);
    assert_eq!(tx.flags, 0);
}

#[test]
fn get_with_query() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET /?p=%20 HTTP/1.0\r\nUser-Agent: Mozilla\r\n\r\n");
    let tx = connp.tx(0).unwrap();
    assert!(tx.request_uri.as_ref().unwrap().eq_slice("/?p=%20"));
    assert!(tx
        .parsed_uri
        .as_ref()
        .unwrap()
        .query
        .as_ref()
        .unwrap()
        .eq_slice("p=%20"));
    assert!(tx
        .partial_normalized_uri
        .as_ref()
        .unwrap()
        .eq_slice("/?p= "));
}

#[test]
fn request_and_response_complete() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
    feed_response(
        &mut connp,
        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
    );
    connp.close(None);

    let tx = connp.tx(0).unwrap();
    assert!(tx.is_complete());
    assert_eq!(tx.response_status_number, ResponseNumber::Valid(200));
    assert!(tx.response_message.as_ref().unwrap().eq_slice("OK"));
    assert_eq!(tx.response_progress, ResponseProgress::Complete);
    assert_eq!(tx.response_message_len, 5);
}

#[test]
fn empty_input_parses_to_zero_transactions() {
    let mut connp = parser(TestConfig());
    connp.close(None);
    assert_eq!(0, connp.tx_size());
}

#[test]
fn malformed_request_line_is_flagged() {
    // A line with no recognizable method/URI/protocol triple is not a
    // crash, but it must come out marked invalid.
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"blah blah\r\n");
    connp.request_close(None);
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.request_method_number, Method::Unknown);
    assert!(tx.flags.is_set(Flags::REQUEST_INVALID));
}

#[test]
fn zero_length_feed_on_open_stream_is_rejected() {
    let mut connp = parser(TestConfig());
    assert_eq!(feed_request(&mut connp, b""), StreamState::Closed);
}

#[test]
fn chunked_request_body() {
    let mut connp = parser(TestConfig());
    let rc = feed_request(
        &mut connp,
        b"POST /x HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    );
    assert_eq!(rc, StreamState::Data);
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.request_transfer_coding, TransferCoding::Chunked);
    assert_eq!(tx.request_progress, RequestProgress::Complete);
    assert_eq!(tx.request_entity_len, 9);
}

#[test]
fn chunked_request_body_hook_data() {
    let mut t = Test::new_with_callbacks();
    assert!(t
        .run_slice(
            b">>>\r\n\
POST /x HTTP/1.1\r\n\
Host: h\r\n\
Transfer-Encoding: chunked\r\n\
\r\n\
4\r\n\
Wiki\r\n\
5\r\n\
pedia\r\n\
0\r\n\
\r\n\
\r\n\
<<<\r\n\
HTTP/1.1 200 OK\r\n\
Content-Length: 0\r\n\
\r\n"
        )
        .is_ok());
    let tx = t.connp.tx(0).unwrap();
    let user_data = tx.user_data::<MainUserData>().unwrap();
    // Body pieces in order, then the end marker.
    assert_eq!(
        user_data.request_data,
        vec![Bstr::from("Wiki"), Bstr::from("pedia"), Bstr::from("")]
    );
    assert_eq!(tx.request_entity_len, 9);
}

#[test]
fn chunk_split_points_do_not_change_the_result() {
    // The buffer-span property: feeding the same stream in chunks of any
    // size must produce identical transactions.
    let request: &[u8] = b"POST /x HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
    let response: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc";

    let collect = |chunk_size: usize| -> (Vec<(Bstr, Bstr)>, u64, u64) {
        let mut connp = parser(TestConfig());
        for chunk in request.chunks(chunk_size) {
            assert_ne!(feed_request(&mut connp, chunk), StreamState::Error);
        }
        for chunk in response.chunks(chunk_size) {
            assert_ne!(feed_response(&mut connp, chunk), StreamState::Error);
        }
        connp.close(None);
        let tx = connp.tx(0).unwrap();
        let headers = tx
            .request_headers
            .elements
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect();
        (headers, tx.request_entity_len, tx.response_entity_len)
    };

    let whole = collect(request.len().max(response.len()));
    for size in [1, 2, 3] {
        assert_eq!(collect(size), whole, "chunk size {} diverged", size);
    }
}

#[test]
fn smuggling_te_cl_combination_is_flagged() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nTransfer-Encoding: chunked\r\n\r\n\
          0\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    // Chunked framing wins, but the combination is flagged.
    assert_eq!(tx.request_transfer_coding, TransferCoding::Chunked);
    assert!(tx.flags.is_set(Flags::REQUEST_SMUGGLING));
}

#[test]
fn smuggling_differing_content_lengths_flagged_invalid() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\nhello",
    );
    let tx = connp.tx(0).unwrap();
    assert!(tx.flags.is_set(Flags::REQUEST_SMUGGLING));
    assert!(tx.flags.is_set(Flags::REQUEST_INVALID));
    // Both copies stay visible for auditing.
    assert_eq!(
        tx.request_headers
            .elements
            .iter()
            .filter(|h| h.name.eq_nocase("content-length"))
            .count(),
        2
    );
}

#[test]
fn invalid_transfer_encoding_is_invalid_request() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: identity\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.request_transfer_coding, TransferCoding::Invalid);
    assert!(tx.flags.is_set(Flags::REQUEST_INVALID_T_E));
    assert!(tx.flags.is_set(Flags::REQUEST_INVALID));
}

#[test]
fn callback_order_and_exactly_once_completion() {
    let mut t = Test::new_with_callbacks();
    assert!(t
        .run_slice(
            b">>>\r\n\
GET / HTTP/1.1\r\n\
Host: example.com\r\n\
\r\n\
\r\n\
<<<\r\n\
HTTP/1.1 200 OK\r\n\
Content-Length: 4\r\n\
\r\n\
body"
        )
        .is_ok());
    let tx = t.connp.tx(0).unwrap();
    let user_data = tx.user_data::<MainUserData>().unwrap();
    assert_eq!(
        user_data.order,
        vec![
            "request_start 0",
            "request_complete 0",
            "response_start 0",
            "response_complete 0",
            "transaction_complete 0"
        ]
    );
}

#[test]
fn progress_is_monotonic_across_feeds() {
    let stream: &[u8] =
        b"POST /x HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\nbody";
    let mut connp = parser(TestConfig());
    let mut last = RequestProgress::NotStarted;
    for chunk in stream.chunks(3) {
        feed_request(&mut connp, chunk);
        let progress = connp.tx(0).map(|tx| tx.request_progress).unwrap_or(last);
        assert!(progress >= last, "{:?} regressed from {:?}", progress, last);
        last = progress;
    }
    assert_eq!(last, RequestProgress::Complete);
}

#[test]
fn pipelined_requests_share_the_connection() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"GET /first HTTP/1.1\r\nHost: h\r\n\r\nGET /second HTTP/1.1\r\nHost: h\r\n\r\n",
    );
    feed_response(
        &mut connp,
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n\
          HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n",
    );
    connp.close(None);
    assert_eq!(2, connp.tx_size());
    assert!(connp.conn().flags.is_set(ConnectionFlags::PIPELINED));
    let first = connp.tx(0).unwrap();
    let second = connp.tx(1).unwrap();
    assert!(first.request_uri.as_ref().unwrap().eq_slice("/first"));
    assert_eq!(first.response_status_number, ResponseNumber::Valid(200));
    assert!(second.request_uri.as_ref().unwrap().eq_slice("/second"));
    assert_eq!(second.response_status_number, ResponseNumber::Valid(404));
    assert!(first.is_complete() && second.is_complete());
}

#[test]
fn response_without_request_is_fatal() {
    let mut connp = parser(TestConfig());
    assert_eq!(
        feed_response(&mut connp, b"HTTP/1.1 200 OK\r\n\r\n"),
        StreamState::Error
    );
}

#[test]
fn second_100_continue_is_fatal() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\nExpect: 100-continue\r\n\r\nbody",
    );
    assert_eq!(
        feed_response(&mut connp, b"HTTP/1.1 100 Continue\r\n\r\n"),
        StreamState::Data
    );
    assert_eq!(
        feed_response(&mut connp, b"HTTP/1.1 100 Continue\r\n\r\n"),
        StreamState::Error
    );
}

#[test]
fn single_100_continue_is_interim() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\nExpect: 100-continue\r\n\r\nbody",
    );
    feed_response(
        &mut connp,
        b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    );
    connp.close(None);
    let tx = connp.tx(0).unwrap();
    assert!(tx.seen_100continue);
    assert_eq!(tx.response_status_number, ResponseNumber::Valid(200));
    assert!(tx.is_complete());
}

#[test]
fn head_response_has_no_body() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"HEAD / HTTP/1.1\r\nHost: h\r\n\r\n");
    feed_response(
        &mut connp,
        b"HTTP/1.1 200 OK\r\nContent-Length: 12345\r\n\r\n",
    );
    connp.close(None);
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.response_transfer_coding, TransferCoding::NoBody);
    assert!(tx.is_complete());
    assert_eq!(tx.response_entity_len, 0);
}

#[test]
fn response_204_has_no_body() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n");
    feed_response(&mut connp, b"HTTP/1.1 204 No Content\r\n\r\n");
    connp.close(None);
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.response_transfer_coding, TransferCoding::NoBody);
    assert!(tx.is_complete());
}

#[test]
fn response_line_that_is_not_http_becomes_body() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET / HTTP/1.0\r\n\r\n");
    feed_response(&mut connp, b"garbage response without a status line");
    connp.close(None);
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.response_transfer_coding, TransferCoding::Identity);
    assert!(tx.is_complete());
    assert_eq!(
        tx.response_message_len,
        b"garbage response without a status line".len() as u64
    );
}

#[test]
fn connect_establishes_a_tunnel() {
    let mut connp = parser(TestConfig());
    let rc = feed_request(
        &mut connp,
        b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com\r\n\r\n",
    );
    // The request side waits on the response verdict.
    assert_eq!(rc, StreamState::Data);
    feed_response(
        &mut connp,
        b"HTTP/1.1 200 Connection Established\r\n\r\n",
    );
    // Post-CONNECT bytes that are not HTTP switch the stream into tunnel
    // passthrough.
    assert_eq!(
        feed_request(&mut connp, b"\x16\x03\x01tls bytes\r\n"),
        StreamState::Tunnel
    );
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.request_method_number, Method::Connect);
    assert!(tx
        .parsed_uri
        .as_ref()
        .unwrap()
        .hostname
        .as_ref()
        .unwrap()
        .eq_slice("example.com"));
    assert_eq!(tx.parsed_uri.as_ref().unwrap().port_number, Some(443));
}

#[test]
fn request_trailers_are_recorded() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n0\r\nX-Trailer: v\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.request_progress, RequestProgress::Complete);
    assert_request_header_eq!(tx, "x-trailer", "v");
}

#[test]
fn folded_header_is_joined_and_flagged() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"GET / HTTP/1.1\r\nHost: h\r\nX-Folded: one\r\n two\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    let header = tx.request_headers.get_nocase("x-folded").unwrap();
    assert!(header.value.eq_slice("one two"));
    assert!(header.flags.is_set(Flags::FIELD_FOLDED));
}

#[test]
fn http_0_9_short_request() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET /\r\n");
    connp.request_close(None);
    let tx = connp.tx(0).unwrap();
    assert!(tx.is_protocol_0_9);
    assert_eq!(tx.request_protocol_number, HttpProtocol::V0_9);
    assert_eq!(tx.request_progress, RequestProgress::Complete);
}

#[test]
fn gap_in_request_body_is_tolerated() {
    let mut t = Test::new_with_callbacks();
    assert!(t
        .run_slice(
            b">>>\r\n\
POST / HTTP/1.1\r\n\
Host: h\r\n\
Content-Length: 10\r\n\
\r\n\
abcd\r\n\
><>\r\n\
123456\r\n\
<<<\r\n\
HTTP/1.1 200 OK\r\n\
Content-Length: 0\r\n\
\r\n"
        )
        .is_ok());
    let tx = t.connp.tx(0).unwrap();
    assert!(tx.flags.is_set(Flags::REQUEST_MISSING_BYTES));
    assert_eq!(tx.request_message_len, 10);
    assert_eq!(tx.request_progress, RequestProgress::Complete);
}

#[test]
fn gzip_response_body_is_decompressed() {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"Hello World!").unwrap();
    let compressed = encoder.finish().unwrap();

    fn record_body_piece(
        tx: &mut htap::transaction::Transaction,
        d: &htap::connection_parser::ParserData,
    ) -> htap::error::Result<()> {
        let piece = Bstr::from(d.as_slice());
        if tx.user_data::<Vec<Bstr>>().is_none() {
            tx.set_user_data(Box::<Vec<Bstr>>::default());
        }
        tx.user_data_mut::<Vec<Bstr>>().unwrap().push(piece);
        Ok(())
    }

    let mut cfg = TestConfig();
    cfg.register_response_body_data(record_body_piece);
    let mut connp = parser(cfg);
    feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n");
    let mut response = Vec::new();
    response.extend_from_slice(
        format!(
            "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
            compressed.len()
        )
        .as_bytes(),
    );
    response.extend_from_slice(&compressed);
    assert_ne!(feed_response(&mut connp, &response), StreamState::Error);
    connp.close(None);

    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.response_entity_len, 12);
    assert_eq!(tx.response_message_len, compressed.len() as u64);
    let pieces = tx.user_data::<Vec<Bstr>>().unwrap();
    let mut body = Vec::new();
    for piece in pieces {
        body.extend_from_slice(piece.as_slice());
    }
    assert_eq!(body, b"Hello World!");
}

#[test]
fn corrupt_gzip_response_is_fatal() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n");
    assert_eq!(
        feed_response(
            &mut connp,
            b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 9\r\n\r\nnot gzip!",
        ),
        StreamState::Error
    );
}

#[test]
fn encoded_dot_segments_normalize_away() {
    // "/a/%2e%2e/b" must normalize to "/b" once percent-decoding and
    // best-fit conversion run.
    let mut cfg = Config::default();
    cfg.set_server_personality(Personality::Ids).unwrap();
    let mut connp = parser(cfg);
    feed_request(&mut connp, b"GET /a/%2e%2e/b HTTP/1.1\r\nHost: h\r\n\r\n");
    let tx = connp.tx(0).unwrap();
    assert!(tx
        .parsed_uri
        .as_ref()
        .unwrap()
        .path
        .as_ref()
        .unwrap()
        .eq_slice("/b"));
}

#[test]
fn auto_destroy_releases_completed_transactions() {
    let mut cfg = TestConfig();
    cfg.set_tx_auto_destroy(true);
    let mut connp = parser(cfg);
    feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n");
    feed_response(&mut connp, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    connp.close(None);
    assert!(connp.tx(0).is_none());
}

#[test]
fn request_cookies_are_parsed() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"GET / HTTP/1.1\r\nHost: h\r\nCookie: a=1; b=2; broken\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    assert_eq!(
        tx.request_cookies,
        vec![
            (Bstr::from("a"), Bstr::from("1")),
            (Bstr::from("b"), Bstr::from("2")),
            (Bstr::from("broken"), Bstr::from("")),
        ]
    );
}

#[test]
fn basic_auth_is_parsed() {
    let mut connp = parser(TestConfig());
    // base64("ivanr:secret")
    feed_request(
        &mut connp,
        b"GET / HTTP/1.1\r\nHost: h\r\nAuthorization: Basic aXZhbnI6c2VjcmV0\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    assert_eq!(
        tx.request_auth_type,
        htap::transaction::HttpAuthType::Basic
    );
    assert!(tx.request_auth_username.as_ref().unwrap().eq_slice("ivanr"));
    assert!(tx
        .request_auth_password
        .as_ref()
        .unwrap()
        .eq_slice("secret"));
}

#[test]
fn host_disagreement_is_ambiguous() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"GET http://www.example.com/ HTTP/1.1\r\nHost: www.example.org\r\n\r\n",
    );
    let tx = connp.tx(0).unwrap();
    assert!(tx.flags.is_set(Flags::HOST_AMBIGUOUS));
    // The URI copy wins.
    assert!(tx
        .request_hostname
        .as_ref()
        .unwrap()
        .eq_slice("www.example.com"));
}

#[test]
fn missing_host_on_http11_is_flagged() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET / HTTP/1.1\r\n\r\n");
    let tx = connp.tx(0).unwrap();
    assert!(tx.flags.is_set(Flags::HOST_MISSING));
}

#[test]
fn response_chunked_body() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"GET / HTTP/1.1\r\nHost: h\r\n\r\n");
    feed_response(
        &mut connp,
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    );
    connp.close(None);
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.response_transfer_coding, TransferCoding::Chunked);
    assert_eq!(tx.response_entity_len, 9);
    assert!(tx.is_complete());
}

#[test]
fn field_limit_stops_endless_header_line() {
    let mut cfg = TestConfig();
    cfg.set_field_limit(64);
    let mut connp = parser(cfg);
    feed_request(&mut connp, b"GET / HTTP/1.1\r\n");
    let long = vec![b'A'; 128];
    assert_eq!(feed_request(&mut connp, &long), StreamState::Error);
}

#[test]
fn logs_are_available_to_the_caller() {
    let mut connp = parser(TestConfig());
    feed_request(
        &mut connp,
        b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\nContent-Length: 6\r\n\r\nhello",
    );
    let logs = connp.conn().get_logs();
    assert!(logs
        .iter()
        .any(|log| log.code == htap::log::LogCode::DuplicateContentLengthFieldInRequest));
    // The queue drains.
    assert!(connp.conn().get_next_log().is_none());
}

#[test]
fn put_without_body_is_logged_but_proceeds() {
    let mut connp = parser(TestConfig());
    feed_request(&mut connp, b"PUT /file HTTP/1.1\r\nHost: h\r\n\r\n");
    let tx = connp.tx(0).unwrap();
    assert_eq!(tx.request_transfer_coding, TransferCoding::NoBody);
    assert_eq!(tx.request_progress, RequestProgress::Complete);
    let logs = connp.conn().get_logs();
    assert!(logs
        .iter()
        .any(|log| log.code == htap::log::LogCode::PutRequestMissingBody));
}

#[test]
fn decoder_ctx_defaults_cascade() {
    let mut cfg = Config::default();
    cfg.set_u_encoding_decode(DecoderCtx::Defaults, true);
    cfg.set_utf8_convert_bestfit(DecoderCtx::UrlPath, true);
    let mut connp = parser(cfg);
    feed_request(&mut connp, b"GET /%u0064ir HTTP/1.1\r\nHost: h\r\n\r\n");
    let tx = connp.tx(0).unwrap();
    assert!(tx
        .parsed_uri
        .as_ref()
        .unwrap()
        .path
        .as_ref()
        .unwrap()
        .eq_slice("/dir"));
}
