//! A single-threaded event loop for queued positional transfers.
//!
//! Submitting a transfer only validates it and queues it. Nothing touches
//! storage until the owner pumps the loop with [`Reactor::run`] or
//! [`Reactor::run_one`]; each executed transfer then hands its buffer back to
//! its completion handler together with the outcome.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::hdu::Hdu;
use crate::io::RandomAccess;

/// Outcome of a queued transfer.
#[derive(Debug)]
pub struct Completion {
    /// Bytes transferred, or the storage error.
    pub result: io::Result<usize>,
    /// The buffer handed over at submission. Holds the data for reads.
    pub buffer: Vec<u8>,
}

/// Callback invoked once a queued transfer has run.
pub type Handler = Box<dyn FnOnce(&mut Scope<'_>, Completion)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

struct Operation {
    direction: Direction,
    offset: u64,
    buffer: Vec<u8>,
    handler: Handler,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("direction", &self.direction)
            .field("offset", &self.offset)
            .field("len", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

/// Queue of pending transfers for one container.
#[derive(Debug, Default)]
pub struct Reactor {
    queue: VecDeque<Operation>,
    stopped: bool,
}

impl Reactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued transfers.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Abandon every queued transfer without calling its handler. The loop
    /// stays stopped until [`Reactor::restart`].
    pub fn stop(&mut self) {
        if !self.queue.is_empty() {
            warn!("stopping event loop with {} pending operations", self.queue.len());
        }
        self.queue.clear();
        self.stopped = true;
        debug!("event loop stopped");
    }

    pub fn restart(&mut self) {
        self.stopped = false;
    }

    /// Validate a transfer against `hdus[hdu]` and queue it.
    pub fn submit(
        &mut self,
        hdus: &[Hdu],
        hdu: usize,
        index: &[u64],
        direction: Direction,
        buffer: Vec<u8>,
        handler: Handler,
    ) -> Result<()> {
        let target = hdus.get(hdu).ok_or(Error::HduNotFound {
            index: hdu,
            count: hdus.len(),
        })?;
        let offset = target.transfer_offset(index, buffer.len())?;
        trace!(
            "queued {:?} of {} bytes at offset {} (HDU {})",
            direction,
            buffer.len(),
            offset,
            hdu
        );
        self.queue.push_back(Operation {
            direction,
            offset,
            buffer,
            handler,
        });
        Ok(())
    }

    /// Execute at most one queued transfer. Returns `false` if the loop is
    /// stopped or idle.
    pub fn run_one<S>(&mut self, storage: &mut S, hdus: &[Hdu], writable: bool) -> bool
    where
        S: RandomAccess + ?Sized,
    {
        if self.stopped {
            return false;
        }
        let Some(op) = self.queue.pop_front() else {
            return false;
        };

        let Operation {
            direction,
            offset,
            mut buffer,
            handler,
        } = op;
        let result = match direction {
            Direction::Read => storage.read_exact_at(&mut buffer, offset),
            Direction::Write => storage.write_all_at(&buffer, offset),
        }
        .map(|()| buffer.len());
        trace!("completed {:?} at offset {}: {:?}", direction, offset, result);

        let mut scope = Scope {
            hdus,
            reactor: self,
            writable,
        };
        handler(&mut scope, Completion { result, buffer });
        true
    }

    /// Execute queued transfers, including ones submitted by handlers, until
    /// the queue is empty or the loop is stopped. Returns how many ran.
    pub fn run<S>(&mut self, storage: &mut S, hdus: &[Hdu], writable: bool) -> usize
    where
        S: RandomAccess + ?Sized,
    {
        let mut executed = 0;
        while self.run_one(storage, hdus, writable) {
            executed += 1;
        }
        executed
    }
}

/// The loop as seen from inside a completion handler.
///
/// Handlers use it to chain follow-up transfers or to stop the loop.
pub struct Scope<'a> {
    hdus: &'a [Hdu],
    reactor: &'a mut Reactor,
    writable: bool,
}

impl Scope<'_> {
    pub fn hdus(&self) -> &[Hdu] {
        self.hdus
    }

    /// Queue a read of `buffer.len()` bytes at `index` of HDU `hdu`.
    pub fn read_async<H>(&mut self, hdu: usize, index: &[u64], buffer: Vec<u8>, handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        self.reactor
            .submit(self.hdus, hdu, index, Direction::Read, buffer, Box::new(handler))
    }

    /// Queue a write of `buffer` at `index` of HDU `hdu`.
    ///
    /// Fails with [`Error::ReadOnly`] inside a reader's loop.
    pub fn write_async<H>(&mut self, hdu: usize, index: &[u64], buffer: Vec<u8>, handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        self.reactor
            .submit(self.hdus, hdu, index, Direction::Write, buffer, Box::new(handler))
    }

    pub fn stop(&mut self) {
        self.reactor.stop();
    }

    pub fn pending(&self) -> usize {
        self.reactor.pending()
    }
}
