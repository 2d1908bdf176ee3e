use crate::identity::Identity;
use crate::material::Domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fresh identities start with this many warnings per domain.
pub const WARNING_CAP: u8 = 2;

/// Per-identity warning counters and blacklist flags, one pair per domain.
///
/// Invariant: a domain is blacklisted if and only if its counter is 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningRecord {
    pub identity: Identity,
    pub water_remaining: u8,
    pub recycling_remaining: u8,
    pub water_blacklisted: bool,
    pub recycling_blacklisted: bool,
    pub updated_at: DateTime<Utc>,
}

impl WarningRecord {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            water_remaining: WARNING_CAP,
            recycling_remaining: WARNING_CAP,
            water_blacklisted: false,
            recycling_blacklisted: false,
            updated_at: Utc::now(),
        }
    }

    pub fn remaining(&self, domain: Domain) -> u8 {
        match domain {
            Domain::Water => self.water_remaining,
            Domain::Recycling => self.recycling_remaining,
        }
    }

    pub fn is_blacklisted(&self, domain: Domain) -> bool {
        match domain {
            Domain::Water => self.water_blacklisted,
            Domain::Recycling => self.recycling_blacklisted,
        }
    }

    pub fn set(&mut self, domain: Domain, remaining: u8, blacklisted: bool) {
        match domain {
            Domain::Water => {
                self.water_remaining = remaining;
                self.water_blacklisted = blacklisted;
            }
            Domain::Recycling => {
                self.recycling_remaining = remaining;
                self.recycling_blacklisted = blacklisted;
            }
        }
        self.updated_at = Utc::now();
    }
}
