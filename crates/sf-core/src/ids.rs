//! Typed ID wrappers for sessions and the operations they run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generate a `Uuid` newtype with random construction, `Display` and
/// `FromStr`.
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                /// Create a new random ID.
                #[must_use]
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                /// Return the inner UUID value.
                #[must_use]
                pub fn as_uuid(&self) -> &Uuid {
                    &self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(&self.0, f)
                }
            }

            impl FromStr for $name {
                type Err = uuid::Error;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    Uuid::parse_str(s).map(Self)
                }
            }
        )+
    };
}

typed_id! {
    /// Identifies one transcode session manager instance.
    SessionId,
    /// Identifies a single `run` submitted to a session.
    OperationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(OperationId::new(), OperationId::new());
    }

    #[test]
    fn display_and_from_str() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = OperationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn invalid_from_str() {
        assert!(OperationId::from_str("not-a-uuid").is_err());
    }
}
