use std::fmt;

use serde::{Deserialize, Serialize};

/// Address prefix the engine puts in front of peer URIs.
pub const RING_URI_PREFIX: &str = "ring:";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(AccountId);
id_newtype!(CallId);
id_newtype!(ConversationUid);
id_newtype!(ContactUri);

impl ContactUri {
    /// Builds a dialable URI from a bare hash or username.
    pub fn dialable(peer: &str) -> Self {
        Self(format!("{RING_URI_PREFIX}{peer}"))
    }

    /// Peer URI with the engine address prefix removed.
    pub fn without_prefix(&self) -> ContactUri {
        ContactUri(self.0.replace(RING_URI_PREFIX, ""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[default]
    Ring,
    Sip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_every_ring_prefix_from_peer_uri() {
        let uri = ContactUri::new("ring:abc123");
        assert_eq!(uri.without_prefix(), ContactUri::new("abc123"));
        assert_eq!(ContactUri::new("abc123").without_prefix().as_str(), "abc123");
    }

    #[test]
    fn dialable_uri_carries_prefix() {
        assert_eq!(ContactUri::dialable("bob").as_str(), "ring:bob");
    }
}
