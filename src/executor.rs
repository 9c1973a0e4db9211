// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The executor owns a bounded FIFO of ready futures and drives them to
//! completion, alternating between draining that queue and polling the
//! reactor for readiness. `Executor` is meant to be used the way a poll or
//! select loop would be used otherwise: construct one, spawn the top-level
//! futures onto it, and call [`Executor::run`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Context;
use std::task::Poll;

use slab::Slab;
use thiserror::Error;

use crate::reactor;
use crate::waker::make_waker;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Reactor(#[from] reactor::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

struct Task {
    // `None` while the future is out being polled; see `Executor::drive`.
    future: Option<Pin<Box<dyn Future<Output = ()>>>>,
    generation: u64,
}

/// Shared executor state a waker can reach independently of whatever is
/// currently on the call stack driving `run`.
pub(crate) struct Inner {
    tasks: Slab<Task>,
    ready: VecDeque<usize>,
    capacity: usize,
    in_progress: usize,
    next_generation: u64,
}

impl Inner {
    // Re-enqueues `task` unless its slot has since been freed or reused by
    // a different, newer future (`generation` mismatch) or the queue is at
    // capacity. Matches the source's silent-drop-on-overflow behavior; see
    // DESIGN.md for the sizing guidance this crate recommends instead of
    // enforcing.
    pub(crate) fn wake(&mut self, task: usize, generation: u64) {
        let still_live = matches!(self.tasks.get(task), Some(t) if t.generation == generation);
        if still_live && self.ready.len() < self.capacity {
            self.ready.push_back(task);
        }
    }
}

/// Drives spawned futures to completion on the current thread.
///
/// Only one `Executor` may be alive on a given thread at a time, because it
/// installs a thread-local reactor that leaf futures reach through
/// [`crate::register`]/[`crate::unregister`]. Dropping the executor tears
/// the reactor down again.
pub struct Executor {
    inner: Rc<RefCell<Inner>>,
}

impl Executor {
    /// Allocates the ready queue with the given fixed capacity and installs
    /// this thread's reactor.
    pub fn new(max_queue_size: usize) -> Result<Executor> {
        reactor::install()?;
        Ok(Executor {
            inner: Rc::new(RefCell::new(Inner {
                tasks: Slab::new(),
                ready: VecDeque::new(),
                capacity: max_queue_size,
                in_progress: 0,
                next_generation: 0,
            })),
        })
    }

    /// Enqueues `future` for its first poll and marks it in-progress.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let generation = inner.next_generation;
        inner.next_generation += 1;
        let key = inner.tasks.insert(Task {
            future: Some(Box::pin(future)),
            generation,
        });
        inner.in_progress += 1;
        if inner.ready.len() < inner.capacity {
            inner.ready.push_back(key);
        }
    }

    /// Runs until every spawned future has reached a terminal state.
    pub fn run(&self) {
        loop {
            if self.inner.borrow().in_progress == 0 {
                return;
            }
            let queue_empty = self.inner.borrow().ready.is_empty();
            if queue_empty {
                // Blocks until the kernel reports readiness on some
                // monitored fd; a correctly-behaved future only leaves the
                // queue empty while in-progress futures are all parked on
                // the reactor, so blocking here is what avoids busy-spin.
                reactor::poll(true);
            }
            loop {
                let task_id = self.inner.borrow_mut().ready.pop_front();
                match task_id {
                    Some(task_id) => self.drive(task_id),
                    None => break,
                }
            }
        }
    }

    // Pops `task_id`'s future out of its slot, polls it without holding any
    // borrow of `inner` (a future's poll may spawn or wake synchronously),
    // and either removes the slot (terminal) or puts the future back
    // (pending).
    fn drive(&self, task_id: usize) {
        let taken = {
            let mut inner = self.inner.borrow_mut();
            match inner.tasks.get_mut(task_id) {
                Some(task) => task.future.take().map(|f| (f, task.generation)),
                None => None,
            }
        };
        let (mut future, generation) = match taken {
            Some(v) => v,
            None => return,
        };

        let waker = make_waker(Rc::clone(&self.inner), task_id, generation);
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => {
                let mut inner = self.inner.borrow_mut();
                inner.tasks.remove(task_id);
                inner.in_progress -= 1;
            }
            Poll::Pending => {
                let mut inner = self.inner.borrow_mut();
                if let Some(task) = inner.tasks.get_mut(task_id) {
                    task.future = Some(future);
                }
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        reactor::uninstall();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc as StdRc;

    #[test]
    fn run_completes_immediately_ready_future() {
        let ex = Executor::new(8).unwrap();
        let ran = StdRc::new(Cell::new(false));
        let ran2 = StdRc::clone(&ran);
        ex.spawn(async move {
            ran2.set(true);
        });
        ex.run();
        assert!(ran.get());
    }

    #[test]
    fn spawn_increments_and_run_drains_in_progress() {
        let ex = Executor::new(8).unwrap();
        let count = StdRc::new(Cell::new(0));
        for _ in 0..5 {
            let count = StdRc::clone(&count);
            ex.spawn(async move {
                count.set(count.get() + 1);
            });
        }
        ex.run();
        assert_eq!(count.get(), 5);
        assert_eq!(ex.inner.borrow().in_progress, 0);
        assert!(ex.inner.borrow().ready.is_empty());
    }

    #[test]
    fn duplicate_executor_on_same_thread_fails() {
        let _ex = Executor::new(8).unwrap();
        assert!(matches!(
            Executor::new(8),
            Err(Error::Reactor(reactor::Error::DuplicateExecutor))
        ));
    }
}
