//! Replays annotated client/server streams through a connection parser.
//! Test inputs mark direction with ">>>" (client) and "<<<" (server)
//! lines; "><>" and "<><" mark gaps. Used by the integration tests.

use crate::{
    bstr::Bstr,
    config::{Config, Personality},
    connection_parser::{ConnectionParser, ParserData, StreamState},
    error::Result,
    transaction::Transaction,
};
use std::{
    net::{IpAddr, Ipv4Addr},
    time::SystemTime,
};
use time::OffsetDateTime;

#[derive(Debug)]
enum Chunk {
    Client(ParserData<'static>),
    Server(ParserData<'static>),
}

/// Callback observations collected during a test run.
pub struct MainUserData {
    /// Invocation order of the milestone callbacks.
    pub order: Vec<String>,
    /// Request body pieces, one entry per body-data call.
    pub request_data: Vec<Bstr>,
    /// Response body pieces, one entry per body-data call.
    pub response_data: Vec<Bstr>,
}

impl Default for MainUserData {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            request_data: Vec::with_capacity(5),
            response_data: Vec::with_capacity(5),
        }
    }
}

#[derive(Debug)]
struct TestInput {
    chunks: Vec<Chunk>,
}

impl From<&[u8]> for TestInput {
    fn from(input: &[u8]) -> Self {
        let mut test_input = TestInput { chunks: Vec::new() };
        let mut current = Vec::<u8>::new();
        let mut client = true;
        let mut is_gap = false;
        let mut started = false;
        for line in input.split_inclusive(|c| *c == b'\n') {
            if line.len() >= 4
                && line.len() <= 5
                && (&line[0..3] == b"<<<"
                    || &line[0..3] == b"<><"
                    || &line[0..3] == b">>>"
                    || &line[0..3] == b"><>")
                && (line.len() == 4 || line[3] == b'\r')
                && line[line.len() - 1] == b'\n'
            {
                if !current.is_empty() {
                    // The line break before the direction marker separates
                    // data from the marker and is not data itself.
                    if let Some(b'\n') = current.last() {
                        current.pop();
                    }
                    if let Some(b'\r') = current.last() {
                        current.pop();
                    }
                    test_input.append(client, current, is_gap);
                    current = Vec::<u8>::new();
                }
                client = line[0] == b'>';
                is_gap = line[0] != line[1];
                started = true;
            } else {
                if !started {
                    // Input must open with a direction marker.
                    return test_input;
                }
                current.extend_from_slice(line);
            }
        }
        test_input.append(client, current, is_gap);
        test_input
    }
}

impl TestInput {
    fn append(&mut self, client: bool, data: Vec<u8>, is_gap: bool) {
        let chunk = match (client, is_gap) {
            (true, true) => Chunk::Client(data.len().into()),
            (true, false) => Chunk::Client(data.into()),
            (false, true) => Chunk::Server(data.len().into()),
            (false, false) => Chunk::Server(data.into()),
        };
        self.chunks.push(chunk);
    }
}

/// Ways a test run can fail.
#[derive(Debug)]
pub enum TestError {
    /// A stream entered the error state.
    StreamError,
}

/// Test harness around one connection parser.
#[derive(Debug)]
pub struct Test {
    /// The connection parser under test.
    pub connp: ConnectionParser,
}

/// A config most tests use: Apache personality, auth and cookie parsing
/// on.
#[allow(non_snake_case)]
pub fn TestConfig() -> Config {
    let mut cfg = Config::default();
    cfg.set_server_personality(Personality::Apache2)
        .expect("personality");
    cfg
}

#[allow(non_snake_case)]
impl Test {
    /// Make a new test around the given config.
    pub fn new(cfg: Config) -> Self {
        let connp = ConnectionParser::new(cfg);
        Test { connp }
    }

    /// Make a new test with the default config and the full set of
    /// observation callbacks registered.
    pub fn new_with_callbacks() -> Self {
        let mut cfg = TestConfig();
        cfg.register_request_start(request_start);
        cfg.register_request_complete(request_complete);
        cfg.register_response_start(response_start);
        cfg.register_response_complete(response_complete);
        cfg.register_response_body_data(response_body_data);
        cfg.register_request_body_data(request_body_data);
        cfg.register_transaction_complete(transaction_complete);
        let mut t = Test::new(cfg);
        t.connp
            .request_mut()
            .expect("tx")
            .set_user_data(Box::<MainUserData>::default());
        t
    }

    /// Open a connection on the underlying parser.
    pub fn open_connection(&mut self, tv_start: Option<OffsetDateTime>) {
        self.connp.open(
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            Some(10000),
            Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            Some(80),
            tv_start,
        );
    }

    fn run(&mut self, test: TestInput) -> std::result::Result<(), TestError> {
        let tv_start = Some(OffsetDateTime::from(SystemTime::now()));
        self.open_connection(tv_start);

        let mut request_buf: Option<ParserData> = None;
        let mut response_buf: Option<ParserData> = None;
        for chunk in test.chunks {
            match chunk {
                Chunk::Client(data) => {
                    let rc = self.connp.request_data(data.clone(), tv_start);
                    if rc == StreamState::Error {
                        return Err(TestError::StreamError);
                    }
                    if rc == StreamState::DataOther {
                        let consumed = self.connp.request_data_consumed();
                        let remaining = data.into_owned();
                        remaining.consume(consumed);
                        request_buf = Some(remaining);
                    }
                }
                Chunk::Server(data) => {
                    // Feed any leftover outbound data first.
                    if let Some(response_remaining) = response_buf {
                        let rc = self
                            .connp
                            .response_data(response_remaining.as_slice().into(), tv_start);
                        response_buf = None;
                        if rc == StreamState::Error {
                            return Err(TestError::StreamError);
                        }
                    }
                    let rc = self.connp.response_data(data.clone(), tv_start);
                    if rc == StreamState::Error {
                        return Err(TestError::StreamError);
                    }
                    if rc == StreamState::DataOther {
                        let consumed = self.connp.response_data_consumed();
                        let remaining = data.into_owned();
                        remaining.consume(consumed);
                        response_buf = Some(remaining);
                    }
                    // The response may have unblocked buffered inbound
                    // data.
                    if let Some(request_remaining) = request_buf {
                        let rc = self
                            .connp
                            .request_data(request_remaining.as_slice().into(), tv_start);
                        request_buf = None;
                        if rc == StreamState::Error {
                            return Err(TestError::StreamError);
                        }
                    }
                }
            }
        }
        if let Some(response_remaining) = response_buf {
            let rc = self
                .connp
                .response_data(response_remaining.as_slice().into(), tv_start);
            if rc == StreamState::Error {
                return Err(TestError::StreamError);
            }
        }
        self.connp
            .close(Some(OffsetDateTime::from(SystemTime::now())));
        Ok(())
    }

    /// Run an annotated byte stream through the parser.
    pub fn run_slice(&mut self, slice: &[u8]) -> std::result::Result<(), TestError> {
        self.run(TestInput::from(slice))
    }
}

fn user_data_of(tx: &mut Transaction) -> &mut MainUserData {
    if tx.user_data::<MainUserData>().is_none() {
        tx.set_user_data(Box::<MainUserData>::default());
    }
    tx.user_data_mut::<MainUserData>().expect("user data")
}

fn request_start(tx: &mut Transaction) -> Result<()> {
    let id = tx.index;
    user_data_of(tx).order.push(format!("request_start {}", id));
    Ok(())
}

fn request_complete(tx: &mut Transaction) -> Result<()> {
    let id = tx.index;
    user_data_of(tx)
        .order
        .push(format!("request_complete {}", id));
    Ok(())
}

fn response_start(tx: &mut Transaction) -> Result<()> {
    let id = tx.index;
    user_data_of(tx).order.push(format!("response_start {}", id));
    Ok(())
}

fn response_complete(tx: &mut Transaction) -> Result<()> {
    let id = tx.index;
    user_data_of(tx)
        .order
        .push(format!("response_complete {}", id));
    Ok(())
}

fn transaction_complete(tx: &mut Transaction) -> Result<()> {
    let id = tx.index;
    user_data_of(tx)
        .order
        .push(format!("transaction_complete {}", id));
    Ok(())
}

fn response_body_data(tx: &mut Transaction, d: &ParserData) -> Result<()> {
    let bstr = if d.is_gap() {
        Bstr::with_capacity(d.len())
    } else {
        Bstr::from(d.as_slice())
    };
    user_data_of(tx).response_data.push(bstr);
    Ok(())
}

fn request_body_data(tx: &mut Transaction, d: &ParserData) -> Result<()> {
    let bstr = if d.is_gap() {
        Bstr::with_capacity(d.len())
    } else {
        Bstr::from(d.as_slice())
    };
    user_data_of(tx).request_data.push(bstr);
    Ok(())
}
