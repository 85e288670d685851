//! Error Types for the Theory Cores.
//!
//! Numerical repair failures are not errors: a failed move simply returns
//! `false` and the outer loop picks another. The variants here cover the
//! structural failures that must propagate to the host.

use thiserror::Error;

/// Result type used throughout the Garnet crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural errors surfaced to the host solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Arithmetic left the representable range of the checked 64-bit
    /// instantiation. The current repair attempt is aborted; the host may
    /// fall back to the arbitrary-precision instantiation.
    #[error("checked integer overflow")]
    Overflow,

    /// A search exceeded its configured probe budget.
    #[error("resource budget exhausted in {0}")]
    ResourceOut(&'static str),

    /// An operator case the core deliberately does not handle.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A term that does not belong to the core's theory was handed to it.
    #[error("invalid term: {0}")]
    InvalidTerm(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::Overflow.to_string(), "checked integer overflow");
        assert_eq!(
            Error::ResourceOut("viable").to_string(),
            "resource budget exhausted in viable"
        );
    }
}
