//! Wire-level domain types: user tags and the closed enumerations used in
//! requests and rollup keys.

/// Declares a closed enum with a canonical string form.
///
/// Generates `as_str`, `parse` (table driven, rejecting unknown strings
/// with a [`ValidationError`](crate::error::ValidationError) naming the
/// value), `ALL`, `Display`, `FromStr` and serde support through the
/// canonical string.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            const TABLE: &'static [($name, &'static str)] = &[$(($name::$variant, $text)),+];

            /// Canonical string form.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse the canonical string form.
            pub fn parse(text: &str) -> Result<Self, $crate::error::ValidationError> {
                Self::TABLE
                    .iter()
                    .find(|(_, candidate)| *candidate == text)
                    .map(|(variant, _)| *variant)
                    .ok_or_else(|| $crate::error::ValidationError::InvalidEnum {
                        kind: $kind,
                        value: text.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::error::ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }
    };
}

pub mod aggregate;
pub mod tag;
pub mod time;

pub use aggregate::{Aggregate, AggregateColumn};
pub use tag::{Action, Device, Product, UserTag};
pub use time::{TimeRange, bucket_start, format_bucket};
