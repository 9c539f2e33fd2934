//! Branded ID newtypes for type safety.
//!
//! Every daemon-facing entity has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a
//! session ID where a command ID is expected.
//!
//! Daemon-assigned IDs are UUID v7 (time-ordered) via [`uuid::Uuid::now_v7`].
//! Session IDs are opaque strings chosen by the extension and are never
//! generated here, but share the same wrapper for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Opaque session identifier, supplied by the extension on its first `/sync`.
    SessionId
}

branded_id! {
    /// Daemon-assigned command identifier. Monotonic within a process, may
    /// repeat across restarts — pair with a correlation id for dedup.
    CommandId
}

branded_id! {
    /// Caller-chosen correlation id, stable across daemon restarts.
    CorrelationId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_id_new_is_uuid_v7() {
        let id = CommandId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        let a = CommandId::new();
        let b = CommandId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn from_string() {
        let id = CommandId::from_string("custom-id".to_owned());
        assert_eq!(id.as_str(), "custom-id");
    }

    #[test]
    fn from_str_ref() {
        let id = SessionId::from("abc-123");
        assert_eq!(id.as_str(), "abc-123");
    }

    #[test]
    fn deref_to_str() {
        let id = CommandId::from("hello");
        let s: &str = &id;
        assert_eq!(s, "hello");
    }

    #[test]
    fn display() {
        let id = CommandId::from("display-me");
        assert_eq!(format!("{id}"), "display-me");
    }

    #[test]
    fn into_string() {
        let id = SessionId::from("convert");
        let s: String = id.into();
        assert_eq!(s, "convert");
    }

    #[test]
    fn serde_roundtrip() {
        let id = CommandId::from("serde-test");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"serde-test\"");
        let back: CommandId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let id = SessionId::from("same");
        let _ = set.insert(id.clone());
        let _ = set.insert(id.clone());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ord_is_lexicographic_on_inner_string() {
        let a = CorrelationId::from("a");
        let b = CorrelationId::from("b");
        assert!(a < b);
    }
}
