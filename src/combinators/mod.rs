// Copyright 2020 The Chromium OS Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Futures whose progress drives one or two child futures and aggregates
//! their outcomes: [`then`] for sequential composition, [`join`] for
//! waiting on both children, and [`select`] for racing them.

pub mod join;
pub mod select;
pub mod then;

pub use join::{join, JoinFuture, JoinOutcome};
pub use select::{select, SelectError, SelectFuture, SelectWinner};
pub use then::{then, Accepts, ThenError, ThenFuture, THEN_FUTURE_ERR_FUT1_FAILED, THEN_FUTURE_ERR_FUT2_FAILED};
