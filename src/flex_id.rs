use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An identifier from an Xtream server, which may arrive as a number, a
/// string or null depending on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FlexId {
    Number(i64),
    String(String),
    #[default]
    Null,
}

impl FlexId {
    /// The id exactly as the server sent it. String ids are kept verbatim.
    pub fn to_key(&self) -> Option<String> {
        match self {
            FlexId::Number(n) => Some(n.to_string()),
            FlexId::String(s) => Some(s.clone()),
            FlexId::Null => None,
        }
    }

    /// Key for matching ids across endpoints: numeric strings compare equal
    /// to the number they spell, so `"012"`, `"12"` and `12` all join.
    pub fn join_key(&self) -> Option<String> {
        match self {
            FlexId::String(s) => match s.trim().parse::<i64>() {
                Ok(n) => Some(n.to_string()),
                Err(_) => Some(s.clone()),
            },
            other => other.to_key(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FlexId::Null)
    }
}

impl From<i64> for FlexId {
    fn from(n: i64) -> Self {
        FlexId::Number(n)
    }
}

impl From<&str> for FlexId {
    fn from(s: &str) -> Self {
        FlexId::String(s.to_string())
    }
}

impl fmt::Display for FlexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlexId::Number(n) => write!(f, "{}", n),
            FlexId::String(s) => write!(f, "{}", s),
            FlexId::Null => write!(f, "null"),
        }
    }
}

impl Serialize for FlexId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            FlexId::Number(n) => serializer.serialize_i64(*n),
            FlexId::String(s) => serializer.serialize_str(s),
            FlexId::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for FlexId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct FlexIdVisitor;

        impl<'de> Visitor<'de> for FlexIdVisitor {
            type Value = FlexId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number, string, or null")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(FlexId::Number(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                match i64::try_from(v) {
                    Ok(n) => Ok(FlexId::Number(n)),
                    Err(_) => Ok(FlexId::String(v.to_string())),
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(FlexId::from(v))
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FlexId::Null)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(FlexId::Null)
            }
        }

        deserializer.deserialize_any(FlexIdVisitor)
    }
}
