//! Connection registry
//!
//! A fixed-capacity, index-addressed table of client sockets plus the
//! listening socket, and the readiness query over all of them. Occupancy is
//! explicit (`Option`), so no handle value is reserved as a "free" marker.

use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no listening socket registered")]
    NoListener,

    #[error("readiness query failed: {0}")]
    Poll(#[from] Errno),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Watched {
    Listener,
    Slot(usize),
}

/// Owns the listening socket and every registered client socket.
///
/// Client sockets are closed when their slot is freed, on
/// [`release_all`](Registry::release_all), or when the registry is dropped.
#[derive(Debug)]
pub struct Registry<L, S> {
    listener: Option<L>,
    slots: Vec<Option<S>>,
    occupied: usize,

    /// Readiness set, rebuilt by `sync`
    watched: Vec<Watched>,
    max_fd: RawFd,

    /// Results of the last poll
    listener_ready: bool,
    ready: Vec<bool>,
}

impl<L, S> Registry<L, S> {
    /// Creates an empty registry holding at most `capacity` clients (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            listener: None,
            slots: (0..capacity).map(|_| None).collect(),
            occupied: 0,
            watched: Vec::with_capacity(capacity + 1),
            max_fd: -1,
            listener_ready: false,
            ready: vec![false; capacity],
        }
    }

    /// Binds the registry to its listening socket. The listener never takes a slot.
    pub fn register(&mut self, listener: L) {
        self.listener = Some(listener);
        self.listener_ready = false;
    }

    pub fn listener(&self) -> Option<&L> {
        self.listener.as_ref()
    }

    /// Stores `conn` in the first free slot and returns its index.
    ///
    /// When every slot is taken the socket is handed back untouched and the
    /// registry is not modified.
    pub fn add(&mut self, conn: S) -> Result<usize, S> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(conn);
        };

        self.slots[index] = Some(conn);
        self.occupied += 1;
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut S> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Closes the socket in slot `index`. Returns false if the slot was
    /// already free or out of range.
    pub fn free(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index).and_then(Option::take) {
            Some(conn) => {
                drop(conn);
                self.occupied -= 1;
                self.ready[index] = false;
                true
            }
            None => false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.slots.len()
    }

    /// Largest handle in the current readiness set, -1 before the first sync.
    pub fn max_fd(&self) -> RawFd {
        self.max_fd
    }

    pub fn is_listener_ready(&self) -> bool {
        self.listener_ready
    }

    /// Whether slot `index` was reported readable by the last poll and is
    /// still occupied.
    pub fn is_ready(&self, index: usize) -> bool {
        self.ready.get(index).copied().unwrap_or(false) && self.get(index).is_some()
    }

    /// Closes every client socket. Returns how many were closed.
    pub fn release_all(&mut self) -> usize {
        let mut closed = 0;

        for slot in &mut self.slots {
            if slot.take().is_some() {
                closed += 1;
            }
        }

        self.occupied = 0;
        self.watched.clear();
        self.ready.iter_mut().for_each(|ready| *ready = false);
        self.listener_ready = false;

        if closed > 0 {
            tracing::debug!(closed, "Client connections terminated");
        }

        closed
    }
}

impl<L: AsFd, S: AsFd> Registry<L, S> {
    /// Rebuilds the readiness set: the listener plus every occupied slot.
    pub fn sync(&mut self) {
        self.watched.clear();
        self.max_fd = -1;

        if let Some(listener) = &self.listener {
            self.watched.push(Watched::Listener);
            self.max_fd = listener.as_fd().as_raw_fd();
        }

        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(conn) = slot {
                self.watched.push(Watched::Slot(index));
                self.max_fd = self.max_fd.max(conn.as_fd().as_raw_fd());
            }
        }

        tracing::trace!(watched = self.watched.len(), max_fd = self.max_fd, "descriptors synced");
    }

    /// Blocks until at least one socket in the synced set is ready.
    ///
    /// A set that was never synced since the listener was registered is
    /// synced first, so the listener is always watched. An interrupted wait
    /// is retried; any other failure is returned.
    pub fn poll(&mut self) -> Result<(), RegistryError> {
        self.wait(PollTimeout::NONE).map(|_| ())
    }

    /// Like [`poll`](Registry::poll) but gives up after `timeout` (clamped to
    /// about 65 seconds). Returns false on timeout.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Result<bool, RegistryError> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        self.wait(PollTimeout::from(millis))
    }

    fn wait(&mut self, timeout: PollTimeout) -> Result<bool, RegistryError> {
        if self.listener.is_none() {
            return Err(RegistryError::NoListener);
        }
        if !self.watched.contains(&Watched::Listener) {
            self.sync();
        }

        let listener = self.listener.as_ref().ok_or(RegistryError::NoListener)?;
        let readable = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;

        let ready: Vec<Watched> = loop {
            let mut tokens = Vec::with_capacity(self.watched.len());
            let mut fds = Vec::with_capacity(self.watched.len());

            for &watched in &self.watched {
                let fd = match watched {
                    Watched::Listener => Some(listener.as_fd()),
                    Watched::Slot(index) => self.slots[index].as_ref().map(AsFd::as_fd),
                };

                if let Some(fd) = fd {
                    tokens.push(watched);
                    fds.push(PollFd::new(fd, PollFlags::POLLIN));
                }
            }

            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => {
                    tracing::trace!("readiness query interrupted, retrying");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "readiness query failed");
                    return Err(e.into());
                }
            }

            break tokens
                .into_iter()
                .zip(&fds)
                .filter(|(_, fd)| fd.revents().is_some_and(|events| events.intersects(readable)))
                .map(|(watched, _)| watched)
                .collect();
        };

        self.listener_ready = false;
        self.ready.iter_mut().for_each(|flag| *flag = false);

        for watched in &ready {
            match *watched {
                Watched::Listener => self.listener_ready = true,
                Watched::Slot(index) => self.ready[index] = true,
            }
        }

        Ok(!ready.is_empty())
    }
}

impl<L, S> Drop for Registry<L, S> {
    fn drop(&mut self) {
        self.release_all();
    }
}
