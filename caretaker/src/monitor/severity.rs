use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered alert level: `Ok < Warning < Critical < Expired`.
///
/// Derived from a time-remaining computation on every evaluation and never
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    Expired,
}

impl Severity {
    pub fn requires_alert(self) -> bool {
        self >= Severity::Warning
    }

    pub fn requires_remediation(self) -> bool {
        self >= Severity::Critical
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Ok < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert!(Severity::Critical < Severity::Expired);
    }

    #[test]
    fn alert_and_remediation_levels() {
        assert!(!Severity::Ok.requires_alert());
        assert!(Severity::Warning.requires_alert());
        assert!(!Severity::Warning.requires_remediation());
        assert!(Severity::Critical.requires_remediation());
        assert!(Severity::Expired.requires_remediation());
    }

    #[test]
    fn serializes_in_upper_case() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
    }
}
