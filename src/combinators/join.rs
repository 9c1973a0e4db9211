// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Waits for two children to both reach a terminal state, driving each one
//! independently of the other's outcome and never forcibly terminating
//! either.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Each child's terminal outcome, retained independently of the other's —
/// this is the observable result of a [`JoinFuture`], not a single
/// aggregate value.
pub struct JoinOutcome<T1, E1, T2, E2> {
    pub fut1: Result<T1, E1>,
    pub fut2: Result<T2, E2>,
}

impl<T1, E1, T2, E2> JoinOutcome<T1, E1, T2, E2> {
    pub fn is_failure(&self) -> bool {
        self.fut1.is_err() || self.fut2.is_err()
    }
}

/// See the module documentation.
pub struct JoinFuture<F1, F2, T1, E1, T2, E2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin,
{
    fut1: Option<F1>,
    fut2: Option<F2>,
    result1: Option<Result<T1, E1>>,
    result2: Option<Result<T2, E2>>,
}

pub fn join<F1, F2, T1, E1, T2, E2>(fut1: F1, fut2: F2) -> JoinFuture<F1, F2, T1, E1, T2, E2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin,
{
    JoinFuture {
        fut1: Some(fut1),
        fut2: Some(fut2),
        result1: None,
        result2: None,
    }
}

impl<F1, F2, T1, E1, T2, E2> Future for JoinFuture<F1, F2, T1, E1, T2, E2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin,
{
    // Unlike `then`/`select`, join never needs an outer `Result`: the
    // outcome pair already carries each child's success or failure, so
    // there is nothing left to distinguish by wrapping the whole thing
    // again. This also sidesteps the open question of which child's
    // errcode an aggregate failure should report (see DESIGN.md) — there
    // is no single aggregate errcode to pick.
    type Output = JoinOutcome<T1, E1, T2, E2>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(fut1) = this.fut1.as_mut() {
            if let Poll::Ready(result) = Pin::new(fut1).poll(cx) {
                this.result1 = Some(result);
                this.fut1 = None;
            }
        }

        if let Some(fut2) = this.fut2.as_mut() {
            if let Poll::Ready(result) = Pin::new(fut2).poll(cx) {
                this.result2 = Some(result);
                this.fut2 = None;
            }
        }

        match (this.result1.take(), this.result2.take()) {
            (Some(r1), Some(r2)) => Poll::Ready(JoinOutcome { fut1: r1, fut2: r2 }),
            (r1, r2) => {
                // Not both done yet: put back whichever result we already
                // have, since `take()` above would otherwise drop it.
                this.result1 = r1;
                this.result2 = r2;
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::task::{RawWaker, RawWakerVTable, Waker};

    struct Ready<T>(Option<Result<T, i32>>);
    impl<T: Unpin> Future for Ready<T> {
        type Output = Result<T, i32>;
        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            Poll::Ready(self.0.take().expect("polled after completion"))
        }
    }

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn noop(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    #[test]
    fn completes_when_both_succeed() {
        let mut fut = join(Ready(Some(Ok(1))), Ready(Some(Ok(2))));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(outcome) => {
                assert!(!outcome.is_failure());
                assert_eq!(outcome.fut1, Ok(1));
                assert_eq!(outcome.fut2, Ok(2));
            }
            Poll::Pending => panic!("expected both children to be ready synchronously"),
        }
    }

    #[test]
    fn failure_in_either_child_fails_aggregate_but_keeps_both_outcomes() {
        let mut fut = join(Ready(Some(Ok(1))), Ready::<i32>(Some(Err(7))));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(outcome) => {
                assert!(outcome.is_failure());
                assert_eq!(outcome.fut1, Ok(1));
                assert_eq!(outcome.fut2, Err(7));
            }
            Poll::Pending => panic!("expected both children to be ready synchronously"),
        }
    }
}
