use crate::{connection_parser::ParserData, error::Result, transaction::Transaction, Status};

/// Callback invoked at a transaction milestone (line parsed, headers
/// parsed, side complete, ...).
pub type TxCallbackFn = fn(tx: &mut Transaction) -> Result<()>;

/// Callback invoked with a piece of data (body bytes, raw header bytes).
/// The payload distinguishes data, gaps and the end-of-data marker.
pub type DataCallbackFn = fn(tx: &mut Transaction, data: &ParserData) -> Result<()>;

/// Hook for transaction milestones.
pub type TxHook = Hook<TxCallbackFn>;

/// Hook for data payloads.
pub type DataHook = Hook<DataCallbackFn>;

/// An ordered list of callback registrations. Callbacks run synchronously
/// in registration order.
#[derive(Clone)]
pub struct Hook<F> {
    pub(crate) callbacks: Vec<F>,
}

impl<F> Default for Hook<F> {
    fn default() -> Self {
        Hook {
            callbacks: Vec::new(),
        }
    }
}

impl<F> Hook<F> {
    /// Append a callback to the list.
    pub fn register(&mut self, cbk_fn: F) {
        self.callbacks.push(cbk_fn)
    }
}

impl TxHook {
    /// Run every callback in registration order. Stops at, and propagates,
    /// the first result that is neither success nor the declined sentinel.
    pub(crate) fn run_all(&self, tx: &mut Transaction) -> Result<()> {
        for cbk_fn in &self.callbacks {
            if let Err(e) = cbk_fn(tx) {
                if e != Status::Declined {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Run callbacks until one claims the event: the first callback that
    /// returns anything other than the declined sentinel ends the run and
    /// its result is propagated.
    pub(crate) fn run_one(&self, tx: &mut Transaction) -> Result<()> {
        for cbk_fn in &self.callbacks {
            match cbk_fn(tx) {
                Err(Status::Declined) => continue,
                other => return other,
            }
        }
        Ok(())
    }
}

impl DataHook {
    /// Run every callback in registration order. Stops at, and propagates,
    /// the first result that is neither success nor the declined sentinel.
    pub(crate) fn run_all(&self, tx: &mut Transaction, data: &ParserData) -> Result<()> {
        for cbk_fn in &self.callbacks {
            if let Err(e) = cbk_fn(tx, data) {
                if e != Status::Declined {
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::Config, log::Logger};
    use std::{cell::RefCell, collections::VecDeque, rc::Rc};

    fn make_tx() -> Transaction {
        let sink = Rc::new(RefCell::new(VecDeque::new()));
        Transaction::new(&Rc::new(Config::default()), &Logger::new(&sink), 0)
    }

    #[test]
    fn run_all_skips_declined() {
        let mut hook = TxHook::default();
        hook.register(|_| Err(Status::Declined));
        hook.register(|tx| {
            tx.request_ignored_lines += 1;
            Ok(())
        });
        let mut tx = make_tx();
        assert!(hook.run_all(&mut tx).is_ok());
        assert_eq!(tx.request_ignored_lines, 1);
    }

    #[test]
    fn run_all_propagates_errors() {
        let mut hook = TxHook::default();
        hook.register(|_| Err(Status::Error));
        hook.register(|tx| {
            tx.request_ignored_lines += 1;
            Ok(())
        });
        let mut tx = make_tx();
        assert_eq!(hook.run_all(&mut tx), Err(Status::Error));
        assert_eq!(tx.request_ignored_lines, 0);
    }

    #[test]
    fn run_one_stops_at_first_claim() {
        let mut hook = TxHook::default();
        hook.register(|_| Err(Status::Declined));
        hook.register(|tx| {
            tx.request_ignored_lines += 1;
            Ok(())
        });
        hook.register(|tx| {
            tx.request_ignored_lines += 10;
            Ok(())
        });
        let mut tx = make_tx();
        assert!(hook.run_one(&mut tx).is_ok());
        assert_eq!(tx.request_ignored_lines, 1);
    }
}
