//! Configuration for the NLA check.

/// Knobs controlling which lemma strategies run and how many lemmas a check
/// may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NlaConfig {
    /// Stop once this many lemmas are collected.
    pub max_lemmas: usize,
    /// Run the bound-derived pass before the model-based passes.
    pub derived_pass: bool,
    /// Enable order lemmas (level 1).
    pub order_lemmas: bool,
    /// Enable monotonicity lemmas (level 2).
    pub monotonicity_lemmas: bool,
    /// Enable tangent plane lemmas (level 2).
    pub tangent_lemmas: bool,
    /// Also merge columns fixed to equal values into equivalence classes.
    pub equivs_from_fixed_vars: bool,
    /// Maximum number of doublings when pushing tangent points outward.
    pub tangent_push_steps: u32,
    /// Print `[NLA]` trace lines to stderr.
    pub debug: bool,
}

impl Default for NlaConfig {
    fn default() -> Self {
        Self {
            max_lemmas: 10,
            derived_pass: true,
            order_lemmas: true,
            monotonicity_lemmas: true,
            tangent_lemmas: true,
            equivs_from_fixed_vars: false,
            tangent_push_steps: 10,
            debug: std::env::var("Z4_DEBUG_NLA").is_ok(),
        }
    }
}

impl NlaConfig {
    /// Configuration that only runs the sign/zero/neutral/proportion basics.
    #[must_use]
    pub fn basics_only() -> Self {
        Self {
            order_lemmas: false,
            monotonicity_lemmas: false,
            tangent_lemmas: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NlaConfig::default();
        assert_eq!(config.max_lemmas, 10);
        assert!(config.derived_pass);
        assert!(config.order_lemmas && config.monotonicity_lemmas && config.tangent_lemmas);
        assert!(!config.equivs_from_fixed_vars);
    }

    #[test]
    fn test_basics_only_disables_higher_levels() {
        let config = NlaConfig::basics_only();
        assert!(!config.order_lemmas);
        assert!(!config.monotonicity_lemmas);
        assert!(!config.tangent_lemmas);
        assert_eq!(config.max_lemmas, NlaConfig::default().max_lemmas);
    }
}
