//! Single-threaded readiness notification over `poll(2)`.
//!
//! Each watched descriptor gets a [`Token`]; a channel keeps its token as
//! its read-source handle and removes it on teardown.

use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{PeerError, Result};

/// Handle of one registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub u64);

/// A readiness event for one watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: Token,
    pub readable: bool,
    /// Hang-up or error condition on the descriptor.
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct Readiness {
    watches: Vec<(Token, RawFd)>,
    next_token: u64,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `fd` for readability.
    pub fn add(&mut self, fd: RawFd) -> Token {
        self.next_token += 1;
        let token = Token(self.next_token);
        self.watches.push((token, fd));
        token
    }

    /// Stop watching. Returns false for an unknown token.
    pub fn remove(&mut self, token: Token) -> bool {
        let before = self.watches.len();
        self.watches.retain(|(watched, _)| *watched != token);
        self.watches.len() != before
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Block until a watch is ready or `timeout` elapses (`None` waits forever).
    ///
    /// An interrupted wait returns no events.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<Vec<Event>> {
        if self.watches.is_empty() {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout);
            }
            return Ok(Vec::new());
        }

        let mut fds: Vec<libc::pollfd> = self
            .watches
            .iter()
            .map(|(_, fd)| libc::pollfd {
                fd: *fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        let timeout_ms = match timeout {
            Some(timeout) => i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };

        // SAFETY: `fds` is a valid, initialized slice of pollfd for the
        // duration of the call and its length is passed alongside it.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(PeerError::Poll(err));
        }

        Ok(fds
            .iter()
            .zip(&self.watches)
            .filter(|(pollfd, _)| pollfd.revents != 0)
            .map(|(pollfd, (token, _))| Event {
                token: *token,
                readable: pollfd.revents & libc::POLLIN != 0,
                closed: pollfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0,
            })
            .collect())
    }
}
