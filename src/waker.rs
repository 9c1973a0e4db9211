// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Builds the `std::task::Waker` handed to a future's progress call.
//!
//! A waker is an immutable pair of handles: the executor it belongs to and
//! the task slot it should re-enqueue. The model is single-threaded (see
//! the crate's concurrency notes), so the pair is a reference-counted `Rc`
//! plus a plain index rather than the `Arc` an `std::task::Wake` impl would
//! require — `Wake` bounds its type on `Send + Sync`, which a thread-local,
//! `RefCell`-backed executor deliberately is not. We build the `RawWaker`
//! by hand instead, the same way a single-threaded executor avoids paying
//! for atomics it doesn't need.
//!
//! The task index alone is not enough: once a task terminates, its slot in
//! the executor's slab is freed and may be reused by an unrelated future.
//! Each waker also carries the generation the slot had when the waker was
//! created, so a stale wake (fired after the slot was reused) is a no-op
//! instead of corrupting an unrelated task's schedule.

use std::rc::Rc;
use std::task::{RawWaker, RawWakerVTable, Waker};

use crate::executor::Inner;

struct WakeData {
    inner: Rc<std::cell::RefCell<Inner>>,
    task: usize,
    generation: u64,
}

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_fn, wake_fn, wake_by_ref_fn, drop_fn);

unsafe fn clone_fn(data: *const ()) -> RawWaker {
    let rc = Rc::from_raw(data as *const WakeData);
    let cloned = Rc::clone(&rc);
    std::mem::forget(rc);
    RawWaker::new(Rc::into_raw(cloned) as *const (), &VTABLE)
}

unsafe fn wake_fn(data: *const ()) {
    let rc = Rc::from_raw(data as *const WakeData);
    rc.inner.borrow_mut().wake(rc.task, rc.generation);
}

unsafe fn wake_by_ref_fn(data: *const ()) {
    let rc = Rc::from_raw(data as *const WakeData);
    rc.inner.borrow_mut().wake(rc.task, rc.generation);
    std::mem::forget(rc);
}

unsafe fn drop_fn(data: *const ()) {
    drop(Rc::from_raw(data as *const WakeData));
}

/// Builds a waker that, when fired, re-enqueues task `task` on `inner` if
/// and only if that slot still holds the future it held when the waker was
/// created.
pub(crate) fn make_waker(inner: Rc<std::cell::RefCell<Inner>>, task: usize, generation: u64) -> Waker {
    let data = Rc::new(WakeData {
        inner,
        task,
        generation,
    });
    let raw = RawWaker::new(Rc::into_raw(data) as *const (), &VTABLE);
    // Safe: VTABLE's functions only ever operate on a pointer obtained from
    // `Rc::into_raw` on a `WakeData`, matching what we pass here, and every
    // clone/wake/drop cycle keeps the refcount balanced.
    unsafe { Waker::from_raw(raw) }
}
