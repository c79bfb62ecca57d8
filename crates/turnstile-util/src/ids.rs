//! Strongly-typed identifiers for turnstile

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an authenticated actor
    PrincipalId
);

uuid_id!(
    /// Unique identifier for a validation rule
    RuleId
);

uuid_id!(
    /// Unique identifier for one command submission
    SubmissionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(PrincipalId::new(), PrincipalId::new());
        assert_ne!(RuleId::new(), RuleId::new());
        assert_ne!(SubmissionId::new(), SubmissionId::new());
    }

    #[test]
    fn ids_parse_from_display() {
        let id = SubmissionId::new();
        let parsed: SubmissionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);

        assert!("not-a-uuid".parse::<RuleId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = PrincipalId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let parsed: PrincipalId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
