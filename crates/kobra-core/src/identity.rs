//! Virtual-user identities and the shared allocator that hands them out.
//!
//! Identities are drawn from a bounded pool `[1, max_numbered_users]`. The
//! allocator wraps back to 1 once the ceiling is passed, so two live virtual
//! users can hold the same identity. Downstream actions (transfers) rely on
//! that shared namespace for contention against the same wallets.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Identity a virtual user logs in as.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualUserIdentity {
    /// Position in the numbered pool, always `>= 1`.
    pub sequence_number: u64,
    /// Display name derived from the sequence number (`user{n}`).
    pub display_name: String,
}

impl VirtualUserIdentity {
    /// Builds the identity for a pool sequence number.
    #[must_use]
    pub fn from_sequence(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            display_name: Self::display_name_for(sequence_number),
        }
    }

    /// Display name for an arbitrary pool member.
    #[must_use]
    pub fn display_name_for(sequence_number: u64) -> String {
        format!("user{sequence_number}")
    }

    /// Login email for this identity under `domain`.
    #[must_use]
    pub fn email(&self, domain: &str) -> String {
        format!("{}@{}", self.display_name, domain)
    }
}

impl fmt::Display for VirtualUserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Shared, wrapping sequence counter.
///
/// One allocator is owned by a population run and injected into each spawn.
/// The counter starts at zero so the first call returns 1; it never yields 0.
#[derive(Debug)]
pub struct IdentityAllocator {
    counter: Mutex<u64>,
    max_numbered_users: u64,
}

impl IdentityAllocator {
    /// Creates an allocator over `[1, max_numbered_users]`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ValidationError` when the ceiling is zero.
    pub fn new(max_numbered_users: u64) -> CoreResult<Self> {
        if max_numbered_users == 0 {
            return Err(CoreError::validation(
                "max_numbered_users must be at least 1",
            ));
        }

        Ok(Self {
            counter: Mutex::new(0),
            max_numbered_users,
        })
    }

    /// Advances the counter and returns the next sequence number.
    pub fn next(&self) -> u64 {
        let mut counter = self.counter.lock();
        *counter += 1;
        if *counter > self.max_numbered_users {
            *counter = 1;
        }
        *counter
    }

    /// Advances the counter and returns the full identity.
    pub fn next_identity(&self) -> VirtualUserIdentity {
        VirtualUserIdentity::from_sequence(self.next())
    }

    /// Upper bound of the identity pool.
    #[must_use]
    pub fn ceiling(&self) -> u64 {
        self.max_numbered_users
    }
}
