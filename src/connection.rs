use crate::{
    config::Config,
    log::{Log, Logger},
    transaction::Transaction,
    transactions::TransactionList,
};
use std::{
    cell::RefCell,
    collections::VecDeque,
    net::IpAddr,
    rc::Rc,
    time::SystemTime,
};
use time::OffsetDateTime;

/// Connection-level flag bits.
pub struct ConnectionFlags;

impl ConnectionFlags {
    /// No flags raised.
    pub const UNKNOWN: u8 = 0x00;
    /// Pipelined requests were seen on this connection.
    pub const PIPELINED: u8 = 0x01;
    /// Extra data arrived after an HTTP/0.9 exchange.
    pub const HTTP_0_9_EXTRA: u8 = 0x02;
}

/// One logical TCP stream: the ordered transactions exchanged on it, byte
/// counters for both directions, open/close timestamps and the peer
/// addresses. Owns its transactions; their lifetime ends with the
/// connection unless auto-destroy releases them earlier.
pub struct Connection {
    /// Client address.
    pub client_addr: Option<IpAddr>,
    /// Client port.
    pub client_port: Option<u16>,
    /// Server address.
    pub server_addr: Option<IpAddr>,
    /// Server port.
    pub server_port: Option<u16>,
    /// Diagnostic records raised while parsing this connection.
    log_queue: Rc<RefCell<VecDeque<Log>>>,
    /// Connection flags.
    pub flags: u8,
    /// When the connection was opened.
    pub open_timestamp: OffsetDateTime,
    /// When the connection was closed.
    pub close_timestamp: OffsetDateTime,
    /// Inbound bytes seen.
    pub request_data_counter: u64,
    /// Outbound bytes seen.
    pub response_data_counter: u64,
    /// The transactions exchanged on this connection.
    pub(crate) transactions: TransactionList,
}

impl Connection {
    /// Make a new connection for the given configuration.
    pub(crate) fn new(cfg: Rc<Config>) -> Self {
        let log_queue = Rc::new(RefCell::new(VecDeque::new()));
        let logger = Logger::new(&log_queue);
        Self {
            client_addr: None,
            client_port: None,
            server_addr: None,
            server_port: None,
            log_queue,
            flags: 0,
            open_timestamp: OffsetDateTime::from(SystemTime::now()),
            close_timestamp: OffsetDateTime::from(SystemTime::now()),
            request_data_counter: 0,
            response_data_counter: 0,
            transactions: TransactionList::new(cfg, logger),
        }
    }

    /// Record the peer addresses and the open timestamp.
    pub(crate) fn open(
        &mut self, client_addr: Option<IpAddr>, client_port: Option<u16>,
        server_addr: Option<IpAddr>, server_port: Option<u16>,
        timestamp: Option<OffsetDateTime>,
    ) {
        self.client_addr = client_addr;
        self.client_port = client_port;
        self.server_addr = server_addr;
        self.server_port = server_port;
        if let Some(timestamp) = timestamp {
            self.open_timestamp = timestamp;
        }
    }

    /// Record the close timestamp.
    pub(crate) fn close(&mut self, timestamp: Option<OffsetDateTime>) {
        if let Some(timestamp) = timestamp {
            self.close_timestamp = timestamp;
        }
    }

    /// Account for inbound bytes.
    pub(crate) fn track_inbound_data(&mut self, len: usize) {
        self.request_data_counter = self.request_data_counter.wrapping_add(len as u64);
    }

    /// Account for outbound bytes.
    pub(crate) fn track_outbound_data(&mut self, len: usize) {
        self.response_data_counter = self.response_data_counter.wrapping_add(len as u64);
    }

    /// A logger handle feeding this connection's log queue.
    pub(crate) fn new_logger(&self) -> Logger {
        Logger::new(&self.log_queue)
    }

    /// Drain and return every queued log record.
    pub fn get_logs(&self) -> Vec<Log> {
        self.log_queue.borrow_mut().drain(..).collect()
    }

    /// Pop the next queued log record.
    pub fn get_next_log(&self) -> Option<Log> {
        self.log_queue.borrow_mut().pop_front()
    }

    /// Get a transaction by its connection index.
    pub fn tx(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    /// Get a transaction by its connection index, mutably.
    pub fn tx_mut(&mut self, index: usize) -> Option<&mut Transaction> {
        self.transactions.get_mut(index)
    }

    /// Number of transactions processed on this connection so far.
    pub fn tx_size(&self) -> usize {
        self.transactions.size()
    }
}

impl PartialEq for Connection {
    /// Two connections are the same when their peer addressing matches.
    fn eq(&self, rhs: &Self) -> bool {
        self.client_addr == rhs.client_addr
            && self.client_port == rhs.client_port
            && self.server_addr == rhs.server_addr
            && self.server_port == rhs.server_port
    }
}
