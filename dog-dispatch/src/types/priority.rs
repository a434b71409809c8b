use serde::{Deserialize, Serialize};

/// Job priority within a tenant lane (higher values dispatch first)
///
/// Any integer is accepted; the named constants are conventions only.
/// Jobs of equal priority keep their admission order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPriority(pub i32);

impl JobPriority {
    pub const LOW: Self = Self(-10);
    pub const NORMAL: Self = Self(0);
    pub const HIGH: Self = Self(10);
    pub const CRITICAL: Self = Self(100);

    /// Get the numeric value for ordering
    pub fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for JobPriority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "normal" => Ok(Self::NORMAL),
            "high" => Ok(Self::HIGH),
            "critical" => Ok(Self::CRITICAL),
            other => other
                .parse::<i32>()
                .map(Self)
                .map_err(|_| format!("Invalid priority: {}", s)),
        }
    }
}
