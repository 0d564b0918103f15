//! Macro for implementing Display and FromStr for token enums
//!
//! Verbs, classifications and override markers all travel as short textual
//! tokens (in configuration files, marker metadata and log fields). This
//! macro gives each of them one canonical spelling for `Display` and a
//! case-insensitive `FromStr`.
//!
//! # Example
//!
//! ```rust
//! use callguard_domain::impl_token_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Shape {
//!     Sync,
//!     Async,
//! }
//!
//! impl_token_conversions!(Shape {
//!     Sync => "sync",
//!     Async => "async",
//! });
//!
//! assert_eq!(Shape::Async.to_string(), "async");
//! assert_eq!("SYNC".parse::<Shape>(), Ok(Shape::Sync));
//! ```

/// Implements Display and FromStr traits for token enums
///
/// # Arguments
///
/// * `$enum_name` - The name of the enum type
/// * `$variant => $str` - Mapping of enum variants to their canonical token
#[macro_export]
macro_rules! impl_token_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let token = s.trim();
                $(
                    if token.eq_ignore_ascii_case($str) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(format!("Invalid {}: {}", stringify!($enum_name), s))
            }
        }
    };
}
