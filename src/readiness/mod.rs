// Copyright 2026 The vrboot Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Block on a boot precondition until it holds or a deadline passes.
//!
//! A readiness predicate answers `Ok(true)` when the condition holds and
//! `Ok(false)` when it does not hold *yet*. Any `Err` is considered
//! non-transient (e.g. a populated but garbled payload) and is returned
//! immediately, without further polling.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use slog_scope::{debug, trace};

pub mod probes;

#[derive(Clone, Debug)]
pub struct Gate {
    timeout: Duration,
    interval: Duration,
}

impl Default for Gate {
    fn default() -> Self {
        Gate {
            timeout: Duration::from_secs(120),
            interval: Duration::from_millis(500),
        }
    }
}

impl Gate {
    /// Build a new gate polling every `interval`, for at most `timeout`.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Gate { timeout, interval }
    }

    /// Poll `ready` until it reports the condition as met.
    ///
    /// The first poll happens immediately. The last sleep is shortened so
    /// that a final poll happens right at the deadline; if that one fails
    /// too, the wait is aborted with an error naming `what`.
    pub fn wait<F>(&self, what: &str, mut ready: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let start = Instant::now();
        let mut polls: u32 = 0;

        loop {
            polls = polls.saturating_add(1);
            trace!("polling {}: attempt #{}", what, polls);

            if ready().with_context(|| format!("failed while waiting for {what}"))? {
                debug!("{} ready after {} poll(s)", what, polls);
                break Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                bail!(
                    "timed out waiting for {} after {:?} ({} polls)",
                    what,
                    self.timeout,
                    polls
                );
            }

            thread::sleep(self.interval.min(self.timeout - elapsed));
        }
    }
}
