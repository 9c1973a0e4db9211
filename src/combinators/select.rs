// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Races two children, completing as soon as either succeeds and failing
//! only once both have failed.
//!
//! The source tracks this with a six-way `which_completed` lattice (none,
//! completed-fut1, completed-fut2, failed-fut1, failed-fut2, failed-both).
//! Two of those six values never actually persist across a progress call
//! here: the instant either child succeeds the aggregate is fully resolved
//! and this future returns, so "completed-fut1"/"completed-fut2" are
//! return values, not stored states. What is stored between calls is only
//! which child (if any) has already failed, since the contract is to keep
//! driving whichever side is still racing.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Which child produced the winning value.
#[derive(Debug)]
pub enum SelectWinner<T1, T2> {
    Fut1(T1),
    Fut2(T2),
}

/// The error of whichever child failed first, kept even after the second
/// child also fails so the aggregate can report it.
#[derive(Debug)]
pub enum SelectError<E1, E2> {
    Fut1(E1),
    Fut2(E2),
}

enum Which {
    None,
    FailedFut1,
    FailedFut2,
}

/// See the module documentation.
pub struct SelectFuture<F1, F2, T1, E1, T2, E2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin,
{
    fut1: F1,
    fut2: F2,
    which: Which,
    first_error: Option<SelectError<E1, E2>>,
}

pub fn select<F1, F2, T1, E1, T2, E2>(
    fut1: F1,
    fut2: F2,
) -> SelectFuture<F1, F2, T1, E1, T2, E2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin,
{
    SelectFuture {
        fut1,
        fut2,
        which: Which::None,
        first_error: None,
    }
}

impl<F1, F2, T1, E1, T2, E2> Future for SelectFuture<F1, F2, T1, E1, T2, E2>
where
    F1: Future<Output = Result<T1, E1>> + Unpin,
    F2: Future<Output = Result<T2, E2>> + Unpin,
{
    type Output = Result<SelectWinner<T1, T2>, SelectError<E1, E2>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };

        // Drive fut1 unless it has already failed (it may still be raced
        // if fut2 failed first, or if neither has resolved yet).
        if matches!(this.which, Which::None | Which::FailedFut2) {
            if let Poll::Ready(result) = Pin::new(&mut this.fut1).poll(cx) {
                match result {
                    Ok(value) => return Poll::Ready(Ok(SelectWinner::Fut1(value))),
                    Err(e) => {
                        if matches!(this.which, Which::FailedFut2) {
                            return Poll::Ready(Err(this
                                .first_error
                                .take()
                                .expect("first_error set when fut2 failed")));
                        }
                        this.which = Which::FailedFut1;
                        this.first_error = Some(SelectError::Fut1(e));
                    }
                }
            }
        }

        // Drive fut2 unless it has already failed.
        if matches!(this.which, Which::None | Which::FailedFut1) {
            if let Poll::Ready(result) = Pin::new(&mut this.fut2).poll(cx) {
                match result {
                    Ok(value) => return Poll::Ready(Ok(SelectWinner::Fut2(value))),
                    Err(e) => {
                        if matches!(this.which, Which::FailedFut1) {
                            return Poll::Ready(Err(this
                                .first_error
                                .take()
                                .expect("first_error set when fut1 failed")));
                        }
                        this.which = Which::FailedFut2;
                        this.first_error = Some(SelectError::Fut2(e));
                    }
                }
            }
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::task::{RawWaker, RawWakerVTable, Waker};

    struct Once<T>(Option<Result<T, i32>>);
    impl<T: Unpin> Future for Once<T> {
        type Output = Result<T, i32>;
        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
            match self.0.take() {
                Some(r) => Poll::Ready(r),
                None => Poll::Pending,
            }
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
    fn first_success_wins() {
        let mut fut = select(Once(Some(Ok("win"))), Once::<&str>(None));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(Ok(SelectWinner::Fut1(v))) => assert_eq!(v, "win"),
            _ => panic!("expected fut1 to win immediately"),
        }
    }

    #[test]
    fn failure_then_later_success_completes() {
        let mut fut = select(Once::<&str>(Some(Err(1))), Once(None));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        // fut1 fails immediately; fut2 is still pending.
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
        fut.fut2.0 = Some(Ok("win"));
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(Ok(SelectWinner::Fut2(v))) => assert_eq!(v, "win"),
            _ => panic!("expected fut2 to win after fut1 failed"),
        }
    }

    #[test]
    fn both_failing_reports_first_failure_and_which_completed_both() {
        let mut fut = select(Once::<&str>(Some(Err(1))), Once::<&str>(None));
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
        fut.fut2.0 = Some(Err(2));
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(Err(SelectError::Fut1(1))) => (),
            _ => panic!("expected the first failure (fut1's) to win"),
        }
    }
}
