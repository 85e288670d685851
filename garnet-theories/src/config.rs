//! Per-Core Tuning Parameters.

/// Tuning for the SLS arithmetic core.
#[derive(Debug, Clone)]
pub struct ArithConfig {
    /// Stop the local-search loop after this many consecutive moves without
    /// improvement.
    pub max_no_improve: u32,
    /// Percentage chance that an equality repair tries the pair-equation
    /// solver before a critical move. Heuristic; no tuning rationale is
    /// recorded.
    pub eq_pair_solve_percent: u32,
    /// The pair-equation solver rejects solutions whose magnitude exceeds
    /// this multiple of the current value (at least this absolute bound
    /// when the current value is zero). Heuristic.
    pub eq_pair_growth_limit: i64,
}

impl Default for ArithConfig {
    fn default() -> Self {
        Self {
            max_no_improve: 500_000,
            eq_pair_solve_percent: 10,
            eq_pair_growth_limit: 2,
        }
    }
}

/// Tuning for the viable-value engine.
#[derive(Debug, Clone)]
pub struct ViableConfig {
    /// Combined budget for interval hops and refinement probes in one
    /// `find_viable` call. Exhaustion reports `FindResult::ResourceOut`.
    pub max_probes: u32,
}

impl Default for ViableConfig {
    fn default() -> Self {
        Self { max_probes: 4096 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let a = ArithConfig::default();
        assert_eq!(a.eq_pair_solve_percent, 10);
        assert_eq!(a.eq_pair_growth_limit, 2);
        assert!(ViableConfig::default().max_probes > 0);
    }
}
