use std::fmt;

use serde::{Deserialize, Serialize};

/// A stop reference exactly as the upstream feed names it, like "MTA_305423".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StopID(String);

/// A route short name, like "B65".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteName(String);

/// The vehicle ref the feed uses to identify one physical bus.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusNumber(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new<S: Into<String>>(x: S) -> Self {
                Self(x.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(StopID);
string_id!(RouteName);
string_id!(BusNumber);
