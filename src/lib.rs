// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A single-threaded cooperative executor and future combinators based on
//! file descriptor readiness.
//!
//! Futures run until they block on a file descriptor becoming readable or
//! writable. The [`Executor`] drains a bounded ready queue and polls the
//! reactor for readiness whenever that queue empties, alternating between
//! the two until every spawned future has terminated.
//!
//! # Running futures
//!
//! Construct an [`Executor`] with the ready-queue capacity you need,
//! [`Executor::spawn`] the top-level futures, and call [`Executor::run`].
//! Dropping the executor releases the queue and the reactor it installed.
//!
//! # Composing futures
//!
//! [`then`] sequences two futures, feeding the first's output into the
//! second. [`join`] waits for two futures to both terminate, recording
//! each outcome independently. [`select`] races two futures, completing as
//! soon as either succeeds.
//!
//! # Implementing new fd-based futures
//!
//! Leaf futures that block on a file descriptor call [`register`] before
//! returning [`Poll::Pending`](std::task::Poll::Pending), and should call
//! [`unregister`] from their `Drop` impl if they might be dropped while
//! still registered. The reactor is level-triggered: once a waker fires,
//! the fd is unregistered and must be re-registered to keep being watched.

mod combinators;
mod diag;
mod executor;
mod reactor;
mod waker;

pub use combinators::{
    join, select, then, Accepts, JoinFuture, JoinOutcome, SelectError, SelectFuture, SelectWinner,
    ThenError, ThenFuture, THEN_FUTURE_ERR_FUT1_FAILED, THEN_FUTURE_ERR_FUT2_FAILED,
};
pub use executor::{Error as ExecutorError, Executor};
pub use reactor::{register, unregister, Error as ReactorError, Interest};
