use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{InvalidIdSnafu, StoreError, StoreResult};

// Server ids are integers that double as the ordering key, so every wrapper is `Ord`.
macro_rules! define_store_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn get(self) -> u64 {
                self.0
            }

            pub fn parse(raw: &str) -> StoreResult<Self> {
                let parsed = raw.trim().parse::<u64>().context(InvalidIdSnafu {
                    stage: "parse-store-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(raw: &str) -> StoreResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_store_id!(MessageId, "message-id");
define_store_id!(MemberId, "member-id");
