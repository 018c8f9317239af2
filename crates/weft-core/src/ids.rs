use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
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
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(UserId, "user");
branded_id!(ThreadId, "thr");
branded_id!(CommunityId, "comm");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_identifies_the_record_type() {
        assert!(UserId::new().as_str().starts_with("user_"));
        assert!(ThreadId::new().as_str().starts_with("thr_"));
        assert!(CommunityId::new().as_str().starts_with("comm_"));
    }

    #[test]
    fn fresh_ids_never_collide() {
        let mut ids: Vec<String> = (0..1000).map(|_| ThreadId::new().0).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn round_trips_as_opaque_text() {
        // The store writes ids as TEXT columns and must read back the
        // exact string, whatever shape the caller handed in.
        for raw in ["thr_0190cafe", "legacy-import-42", ""] {
            let id = ThreadId::from_raw(raw);
            assert_eq!(id.as_str(), raw);
            assert_eq!(id.to_string().parse::<ThreadId>().unwrap(), id);

            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{raw}\""));
            assert_eq!(serde_json::from_str::<ThreadId>(&json).unwrap(), id);
        }
    }

    #[test]
    fn creation_order_matches_lexicographic_order() {
        // Feed ordering breaks created_at ties on the id column, which
        // only works because v7 ids sort by creation time.
        let ids: Vec<ThreadId> = (0..100).map(|_| ThreadId::new()).collect();
        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(ids, sorted);
    }
}
