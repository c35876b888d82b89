//! Streaming HTTP/1.x connection and transaction parser.
//!
//! The crate reconstructs HTTP requests and responses from raw TCP byte
//! streams, one connection at a time. Input arrives in arbitrary chunks;
//! the parser consumes as much as forms complete syntactic units, invokes
//! registered hooks at unit boundaries, and buffers the rest until more
//! data is supplied. It is designed for security tooling, so malformed and
//! adversarial traffic is routed around and flagged rather than rejected
//! wherever a real server or browser would have accepted it.

#![deny(missing_docs)]
#![deny(unused_lifetimes)]

/// Status codes used internally to drive parsing, and by hook callbacks to
/// report their outcome.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Status {
    /// General-purpose error; for a stream this is fatal.
    Error,
    /// The callback declined to handle the event. Not an error.
    Declined,
    /// Work completed successfully.
    Ok,
    /// All supplied data was consumed; call again with more data.
    Data,
    /// Parsing must continue on the other direction before this one can
    /// proceed. The data chunk was only partially consumed.
    DataOther,
    /// As [`Status::Data`], but the unconsumed tail has been saved into the
    /// reassembly buffer.
    DataBuffer,
    /// A callback asked for this connection to no longer be followed.
    Stop,
}

/// Module for logging macros and the per-connection log queue.
#[macro_use]
pub mod log;
/// Module for the owned binary-string type.
pub mod bstr;
/// Module for the parser configuration surface.
pub mod config;
/// Module for the connection object.
pub mod connection;
/// Module for the connection parser and its two state machines.
pub mod connection_parser;
/// Module for the response body decompression filter.
pub mod decompressors;
/// Module for error/result plumbing.
pub mod error;
/// Module for the wire-format header parser.
mod headers;
/// Module for hooks (ordered callback lists).
pub mod hook;
/// Module for field parsers shared by both machines.
pub mod parsers;
/// Module for the unicode best-fit mapping table.
#[macro_use]
mod unicode_bestfit_map;
/// Module for percent- and %u-decoding.
mod percent;
/// Module for the request-side state machine.
pub mod request;
/// Module for the response-side state machine.
pub mod response;
/// Module for the transaction model.
pub mod transaction;
/// Module for the connection's transaction slot list.
pub mod transactions;
/// Module for URI splitting and normalization.
pub mod uri;
/// Module for the UTF-8 decoder used on request paths.
mod utf8;
/// Module for byte classification and low-level lexical helpers.
pub mod util;

/// Test harness used by the integration tests; replays annotated
/// client/server streams through a connection parser.
pub mod test;
