//! Display/FromStr for status enums persisted as text columns
//!
//! ```rust
//! use fiscalsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum PrinterState {
//!     Ready,
//!     PaperOut,
//! }
//!
//! impl_domain_status_conversions!(PrinterState {
//!     Ready => "ready",
//!     PaperOut => "paper_out",
//! });
//!
//! assert_eq!(PrinterState::PaperOut.to_string(), "paper_out");
//! assert_eq!("READY".parse::<PrinterState>(), Ok(PrinterState::Ready));
//! ```

/// Implements Display and FromStr for a fieldless enum
///
/// Output is the given lowercase string; parsing is case-insensitive and
/// reports the enum name on failure.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
