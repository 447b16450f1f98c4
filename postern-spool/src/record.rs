use std::time::{Duration, SystemTime};

use postern_common::{Mail, MailId, State};
use serde::{Deserialize, Serialize};

/// A mail as held by a backing store, with its earliest allowed claim time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolEntry {
    pub mail: Mail,
    pub not_before: Option<SystemTime>,
}

impl SpoolEntry {
    #[must_use]
    pub const fn new(mail: Mail, not_before: Option<SystemTime>) -> Self {
        Self { mail, not_before }
    }

    #[must_use]
    pub fn record(&self) -> SpoolRecord {
        SpoolRecord {
            id: self.mail.id().clone(),
            state: self.mail.state().clone(),
            last_updated: self.mail.last_updated(),
            arrived_at: self.mail.arrived_at(),
            not_before: self.not_before,
        }
    }
}

/// The part of a spooled mail needed to decide whether it may be claimed
///
/// Records are what the pending cache holds; the full mail is only read once
/// a claim has been won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolRecord {
    pub id: MailId,
    pub state: State,
    pub last_updated: SystemTime,
    pub arrived_at: SystemTime,
    pub not_before: Option<SystemTime>,
}

impl SpoolRecord {
    /// The earliest time this record may be claimed.
    ///
    /// Mail in `error_state` waits `retry_delay` after its last update. Mail
    /// parked with a not-before time waits for that too. `None` means the
    /// wait overflows the clock and the record is never eligible.
    #[must_use]
    pub fn eligible_at(&self, error_state: &str, retry_delay: Duration) -> Option<SystemTime> {
        let mut at = SystemTime::UNIX_EPOCH;

        if self.state.as_str() == error_state {
            at = self.last_updated.checked_add(retry_delay)?;
        }

        if let Some(not_before) = self.not_before {
            at = at.max(not_before);
        }

        Some(at)
    }

    #[must_use]
    pub fn is_eligible(&self, error_state: &str, retry_delay: Duration, now: SystemTime) -> bool {
        self.eligible_at(error_state, retry_delay)
            .is_some_and(|at| at <= now)
    }
}

/// Sort records in arrival order, ties broken by id
pub(crate) fn sort_by_arrival(records: &mut [SpoolRecord]) {
    records.sort_by(|a, b| a.arrived_at.cmp(&b.arrived_at).then_with(|| a.id.cmp(&b.id)));
}
