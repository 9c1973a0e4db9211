// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sequential composition: drive `fut1` to completion, feed its output into
//! `fut2`, then drive `fut2` to completion.
//!
//! If `fut1` completes synchronously inside a single progress call,
//! `fut2` is driven in that same call rather than waiting for a trip
//! through the executor's ready queue.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Errcode surfaced when `fut1` fails.
pub const THEN_FUTURE_ERR_FUT1_FAILED: i32 = 1;
/// Errcode surfaced when `fut2` fails.
pub const THEN_FUTURE_ERR_FUT2_FAILED: i32 = 2;

/// The failure half of [`ThenFuture`]'s output, tagging which child failed
/// while keeping that child's own error available.
#[derive(Debug)]
pub enum ThenError<E1, E2> {
    Fut1Failed(E1),
    Fut2Failed(E2),
}

impl<E1, E2> ThenError<E1, E2> {
    pub fn errcode(&self) -> i32 {
        match self {
            ThenError::Fut1Failed(_) => THEN_FUTURE_ERR_FUT1_FAILED,
            ThenError::Fut2Failed(_) => THEN_FUTURE_ERR_FUT2_FAILED,
        }
    }
}

/// Lets [`ThenFuture`] feed `fut1`'s output into `fut2` before driving it,
/// standing in for the source's settable `arg` field on a plain struct.
pub trait Accepts<Input> {
    fn provide(&mut self, input: Input);
}

enum State<F1, F2> {
    WaitingFut1(F1, F2),
    WaitingFut2(F2),
    Done,
}

/// See the module documentation.
pub struct ThenFuture<F1, F2>
where
    F1: Future + Unpin,
    F2: Future + Unpin,
{
    state: State<F1, F2>,
}

pub fn then<F1, F2>(fut1: F1, fut2: F2) -> ThenFuture<F1, F2>
where
    F1: Future + Unpin,
    F2: Future + Unpin,
{
    ThenFuture {
        state: State::WaitingFut1(fut1, fut2),
    }
}

impl<F1, F2, T1, E1, T2, E2> Future for ThenFuture<F1, F2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin + Accepts<T1>,
{
    type Output = Result<T2, ThenError<E1, E2>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::WaitingFut1(mut fut1, mut fut2) => match Pin::new(&mut fut1).poll(cx) {
                    Poll::Ready(Ok(value)) => {
                        fut2.provide(value);
                        self.state = State::WaitingFut2(fut2);
                        // Fall through in this same call: fut1 resolved
                        // synchronously, so there is no reason to make
                        // fut2 wait for a separate scheduler turn.
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(ThenError::Fut1Failed(e))),
                    Poll::Pending => {
                        self.state = State::WaitingFut1(fut1, fut2);
                        return Poll::Pending;
                    }
                },
                State::WaitingFut2(mut fut2) => {
                    return match Pin::new(&mut fut2).poll(cx) {
                        Poll::Ready(Ok(value)) => Poll::Ready(Ok(value)),
                        Poll::Ready(Err(e)) => Poll::Ready(Err(ThenError::Fut2Failed(e))),
                        Poll::Pending => {
                            self.state = State::WaitingFut2(fut2);
                            Poll::Pending
                        }
                    };
                }
                State::Done => panic!("ThenFuture polled after completion"),
            }
        }
    }
}
