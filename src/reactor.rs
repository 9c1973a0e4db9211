// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The reactor translates file descriptor readiness into waker firings.
//!
//! There is one reactor per thread, installed by [`crate::Executor::new`] and
//! torn down when the executor is dropped. Futures reach it through the free
//! functions in this module ([`register`], [`unregister`]) rather than
//! through an explicit handle, because `std::future::Future::poll` leaves no
//! room to carry one: the ambient thread-local state stands in for the
//! handle the abstract contract passes into every progress call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::task::Waker;

use thiserror::Error;

use crate::diag::fatal;

#[derive(Debug, Error)]
pub enum Error {
    /// `register` was called for an fd that already has a live entry.
    #[error("fd {0} is already monitored")]
    AlreadyMonitored(RawFd),
    /// `unregister` was called for an fd with no live entry.
    #[error("fd {0} is not monitored")]
    NotMonitored(RawFd),
    /// Two executors were created on the same thread.
    #[error("an executor is already active on this thread")]
    DuplicateExecutor,
    /// A future called `register`/`unregister` outside of a running executor.
    #[error("no reactor is active on this thread")]
    NoActiveReactor,
}
pub type Result<T> = std::result::Result<T, Error>;

/// The kernel readiness events a registration is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u32);

impl Interest {
    pub const READABLE: Interest = Interest(libc::EPOLLIN as u32);
    pub const WRITABLE: Interest = Interest(libc::EPOLLOUT as u32);

    fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

struct Entry {
    waker: Waker,
}

/// Owns the epoll instance and the table of fds currently being watched.
///
/// The table is a plain `HashMap` keyed by fd rather than the source's
/// preallocated `MAX_DESCRIPTORS`-sized array threaded through a linked
/// list; both give O(1) register/unregister/lookup and efficient
/// enumeration, which is all the contract requires.
struct Reactor {
    epoll_fd: RawFd,
    entries: HashMap<RawFd, Entry>,
}

impl Reactor {
    fn new() -> Reactor {
        // Safe because epoll_create1 does not touch any memory we own; we
        // check its return value below.
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            fatal!(
                "epoll_create1 failed: {}",
                std::io::Error::last_os_error()
            );
        }
        Reactor {
            epoll_fd,
            entries: HashMap::new(),
        }
    }

    fn register(&mut self, fd: RawFd, interest: Interest, waker: Waker) -> Result<()> {
        if self.entries.contains_key(&fd) {
            return Err(Error::AlreadyMonitored(fd));
        }
        let mut event = libc::epoll_event {
            events: interest.bits(),
            u64: fd as u64,
        };
        // Safe because `event` lives for the duration of the call and the fd
        // is a plain integer the caller owns.
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if ret < 0 {
            fatal!(
                "epoll_ctl(ADD, {}) failed: {}",
                fd,
                std::io::Error::last_os_error()
            );
        }
        self.entries.insert(fd, Entry { waker });
        Ok(())
    }

    fn unregister(&mut self, fd: RawFd) -> Result<()> {
        if self.entries.remove(&fd).is_none() {
            return Err(Error::NotMonitored(fd));
        }
        // Safe because we are only removing a registration for an fd that
        // was previously added through `register`.
        let ret =
            unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if ret < 0 {
            fatal!(
                "epoll_ctl(DEL, {}) failed: {}",
                fd,
                std::io::Error::last_os_error()
            );
        }
        Ok(())
    }

    // Consults the kernel for ready fds and fires their wakers. Blocks when
    // `block` is set and at least one fd is monitored; a faithful
    // implementation must not busy-spin when the executor's ready queue is
    // empty (see the run loop in `executor.rs`).
    fn poll(&mut self, block: bool) {
        if self.entries.is_empty() {
            return;
        }
        let timeout = if block { -1 } else { 0 };
        let mut events: [libc::epoll_event; 64] = unsafe { std::mem::zeroed() };
        // Safe because `events` is sized to the buffer length we pass in.
        let n = unsafe {
            libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), events.len() as i32, timeout)
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return;
            }
            fatal!("epoll_wait failed: {}", err);
        }
        for event in &events[..n as usize] {
            let fd = event.u64 as RawFd;
            // Level-triggered: unregister before firing so a future that
            // wants to keep observing this fd must re-register.
            if let Some(entry) = self.entries.remove(&fd) {
                // Safe: fd was registered with this epoll instance above.
                let ret = unsafe {
                    libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
                };
                if ret < 0 {
                    fatal!(
                        "epoll_ctl(DEL, {}) failed while retiring a ready fd: {}",
                        fd,
                        std::io::Error::last_os_error()
                    );
                }
                entry.waker.wake();
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        // Safe: epoll_fd is owned by this Reactor and not used again.
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

thread_local!(static REACTOR: RefCell<Option<Reactor>> = RefCell::new(None));

pub(crate) fn install() -> Result<()> {
    REACTOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_some() {
            return Err(Error::DuplicateExecutor);
        }
        *slot = Some(Reactor::new());
        Ok(())
    })
}

pub(crate) fn uninstall() {
    REACTOR.with(|cell| {
        cell.borrow_mut().take();
    });
}

/// Tells the reactor to wake `waker` the next time `fd` reports `interest`.
/// `fd` must stay open and owned by the caller until the waker fires or
/// [`unregister`] is called; the reactor does not take ownership of it.
pub fn register(fd: RawFd, interest: Interest, waker: Waker) -> Result<()> {
    REACTOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_mut() {
            Some(reactor) => reactor.register(fd, interest, waker),
            None => Err(Error::NoActiveReactor),
        }
    })
}

/// Removes the registration for `fd` if the waker hasn't already fired.
pub fn unregister(fd: RawFd) -> Result<()> {
    REACTOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_mut() {
            Some(reactor) => reactor.unregister(fd),
            None => Err(Error::NoActiveReactor),
        }
    })
}

pub(crate) fn poll(block: bool) {
    REACTOR.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_mut() {
            Some(reactor) => reactor.poll(block),
            None => unreachable!("reactor::poll called without an active executor"),
        }
    })
}
