use chrono::{DateTime, Utc};

/// Result of asking a validity token about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityState {
    Valid,
    Invalid,
    /// Needs a comparison with a fresh token
    Unknown,
}

/// Freshness token for previously produced output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    /// Output never changes
    Always,
    /// Output must always be regenerated
    Never,
    /// Valid while the underlying input keeps this modification time
    Timestamp(DateTime<Utc>),
    /// Valid until the given instant
    Expires(DateTime<Utc>),
    /// Valid only if every component is
    Aggregate(Vec<Validity>),
}

impl Validity {
    pub fn is_valid(&self) -> ValidityState {
        match self {
            Validity::Always => ValidityState::Valid,
            Validity::Never => ValidityState::Invalid,
            Validity::Timestamp(_) => ValidityState::Unknown,
            Validity::Expires(at) => {
                if Utc::now() < *at {
                    ValidityState::Valid
                } else {
                    ValidityState::Invalid
                }
            }
            Validity::Aggregate(components) => {
                let mut state = ValidityState::Valid;
                for component in components {
                    match component.is_valid() {
                        ValidityState::Invalid => return ValidityState::Invalid,
                        ValidityState::Unknown => state = ValidityState::Unknown,
                        ValidityState::Valid => {}
                    }
                }
                state
            }
        }
    }

    /// Compare this (stored) token with a freshly computed one
    pub fn is_valid_against(&self, current: &Validity) -> bool {
        match (self, current) {
            (Validity::Always, _) => true,
            (Validity::Never, _) => false,
            (Validity::Timestamp(stored), Validity::Timestamp(now)) => stored == now,
            (Validity::Expires(_), _) => self.is_valid() == ValidityState::Valid,
            (Validity::Aggregate(stored), Validity::Aggregate(now)) => {
                stored.len() == now.len()
                    && stored.iter().zip(now).all(|(old, new)| match old.is_valid() {
                        ValidityState::Valid => true,
                        ValidityState::Invalid => false,
                        ValidityState::Unknown => old.is_valid_against(new),
                    })
            }
            _ => false,
        }
    }
}

/// Optional stage capability: identify the stage's configuration and input state
pub trait Cacheable {
    /// Uniquely identifies the current configuration and input
    fn key(&self) -> String;
    fn validity(&self) -> Validity;
}

/// Key and validity computed by a stage during setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    pub key: String,
    pub validity: Validity,
}

impl CacheInfo {
    pub fn new(key: impl Into<String>, validity: Validity) -> Self {
        CacheInfo {
            key: key.into(),
            validity,
        }
    }
}

impl Cacheable for CacheInfo {
    fn key(&self) -> String {
        self.key.clone()
    }

    fn validity(&self) -> Validity {
        self.validity.clone()
    }
}
