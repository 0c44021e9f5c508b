//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`TaskId`] with a [`RepositoryId`] even though both are strings under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: externally assigned strings
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies one remote agent session.
    ///
    /// Assigned by the agent API when the session is created; it is the
    /// primary key of the session store and never changes afterwards.
    TaskId
}

string_id! {
    /// Identifies a GitHub repository in `"owner/repo"` format.
    RepositoryId
}

impl RepositoryId {
    /// Splits the identifier into its `(owner, name)` halves.
    ///
    /// Returns `None` unless the value has exactly the `owner/repo` shape with
    /// both halves non-empty.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.0.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }
}

// ---------------------------------------------------------------------------
// Identifiers: GitHub-integer-backed
// ---------------------------------------------------------------------------

/// The number of an issue or pull request within its repository.
///
/// GitHub shares one number space between issues and pull requests, so the
/// same value addresses the issue-comments endpoint for either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemNumber(u64);

impl ItemNumber {
    /// Creates an item number, returning `None` for zero.
    pub fn new(value: u64) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ItemNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one inbound webhook delivery.
///
/// Taken from the `X-GitHub-Delivery` header when it carries a UUID, generated
/// otherwise. Propagated through intake spans so every log line for a single
/// delivery can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Generates a new random delivery identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a delivery identifier from a header value, falling back to a
    /// fresh random identifier when the value is absent or not a UUID.
    pub fn from_header_or_random(value: Option<&str>) -> Self {
        value
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Self)
            .unwrap_or_else(Self::new_random)
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_reject_only_empty_values() {
        assert!(TaskId::new("").is_none());
        assert_eq!(TaskId::new(" ").unwrap().as_str(), " ");
        assert_eq!(TaskId::new("devin-1").unwrap().as_str(), "devin-1");
    }

    #[test]
    fn repository_id_splits_owner_and_name() {
        let repo = RepositoryId::new("octo/widgets").unwrap();
        assert_eq!(repo.owner_and_name(), Some(("octo", "widgets")));

        assert_eq!(RepositoryId::new("no-slash").unwrap().owner_and_name(), None);
        assert_eq!(RepositoryId::new("/widgets").unwrap().owner_and_name(), None);
        assert_eq!(RepositoryId::new("a/b/c").unwrap().owner_and_name(), None);
    }

    #[test]
    fn item_number_rejects_zero() {
        assert!(ItemNumber::new(0).is_none());
        assert_eq!(ItemNumber::new(7).unwrap().as_u64(), 7);
    }

    #[test]
    fn delivery_id_uses_header_when_it_is_a_uuid() {
        let raw = "72d3162e-cc78-11e3-81ab-4c9367dc0958";
        let id = DeliveryId::from_header_or_random(Some(raw));
        assert_eq!(id.to_string(), raw);

        let other = DeliveryId::from_header_or_random(Some("not-a-uuid"));
        assert_ne!(other.to_string(), "not-a-uuid");
    }

    #[test]
    fn identifiers_serialize_as_bare_values() {
        let task = TaskId::new("abc").unwrap();
        assert_eq!(serde_json::to_string(&task).unwrap(), "\"abc\"");
        let item = ItemNumber::new(12).unwrap();
        assert_eq!(serde_json::to_string(&item).unwrap(), "12");
    }
}
