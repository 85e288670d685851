//! Bit-Vector Reasoning Cores.
//!
//! Two engines share this module but no state:
//!
//! - **viable**: for each bit-vector variable, the set of values still
//!   allowed by currently asserted unary constraints, maintained as layers
//!   of forbidden intervals keyed by bit-width
//! - **slicing**: equivalence of bit-slices across variables, maintained in
//!   an e-graph of slice nodes with merge explanations
//!
//! **forbidden** turns unary constraints into the interval records viable
//! consumes.

mod egraph;
pub mod forbidden;
pub mod plugin;
pub mod slicing;
pub mod viable;

use num_bigint::BigUint;
use num_traits::One;

/// Index of a bit-vector variable tracked by these cores.
pub type PVar = u32;

/// `2^w`.
#[must_use]
pub fn pow2(w: u32) -> BigUint {
    BigUint::one() << w
}

/// Reduce a value modulo `2^w`.
#[must_use]
pub fn truncate(val: &BigUint, w: u32) -> BigUint {
    val % pow2(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow2_small() {
        assert_eq!(pow2(0), BigUint::from(1u32));
        assert_eq!(pow2(4), BigUint::from(16u32));
        assert_eq!(truncate(&BigUint::from(21u32), 4), BigUint::from(5u32));
    }
}
