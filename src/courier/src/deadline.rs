//! Absolute per-call deadlines.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// An absolute point in time after which the transport may abandon a call.
///
/// Calls without a timeout carry [`Deadline::INFINITE`], the latest
/// representable UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deadline(DateTime<Utc>);

impl Deadline {
    pub const INFINITE: Deadline = Deadline(DateTime::<Utc>::MAX_UTC);

    pub fn at(instant: DateTime<Utc>) -> Self {
        Deadline(instant)
    }

    /// `now + timeout`.
    pub fn after(timeout: Duration) -> Self {
        Self::compute(Some(timeout), None)
    }

    /// Compute the outgoing deadline for a call.
    ///
    /// A missing or zero-length `timeout` means no timeout of our own. The
    /// result is never later than `inherited`: deadlines shrink as they
    /// propagate, never grow.
    pub fn compute(timeout: Option<Duration>, inherited: Option<Deadline>) -> Self {
        Self::compute_at(Utc::now(), timeout, inherited)
    }

    /// [`Deadline::compute`] against an explicit clock reading.
    pub fn compute_at(
        now: DateTime<Utc>,
        timeout: Option<Duration>,
        inherited: Option<Deadline>,
    ) -> Self {
        let own = match timeout {
            Some(timeout) if !timeout.is_zero() => TimeDelta::from_std(timeout)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
                .map_or(Deadline::INFINITE, Deadline),
            _ => Deadline::INFINITE,
        };
        match inherited {
            Some(inherited) => own.min(inherited),
            None => own,
        }
    }

    pub fn is_infinite(&self) -> bool {
        *self == Deadline::INFINITE
    }

    pub fn has_elapsed(&self) -> bool {
        !self.is_infinite() && self.0 <= Utc::now()
    }

    /// Time left until the deadline; `None` for an infinite deadline and
    /// zero once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        if self.is_infinite() {
            return None;
        }
        Some((self.0 - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::INFINITE
    }
}

impl From<DateTime<Utc>> for Deadline {
    fn from(instant: DateTime<Utc>) -> Self {
        Deadline(instant)
    }
}
