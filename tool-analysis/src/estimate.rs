//! Resource estimates derived from static structure.

use serde::{Deserialize, Serialize};

const BASE_MEMORY_MB: u64 = 64;
const MEMORY_PER_COMPLEXITY_MB: u64 = 2;
const MEMORY_CEILING_MB: u64 = 512;

const BASE_CPU_SECONDS: f64 = 0.1;
const CPU_PER_COMPLEXITY: f64 = 0.05;
const LOOP_PENALTY_SECONDS: f64 = 0.5;
const RECURSION_PENALTY_SECONDS: f64 = 1.0;
const CPU_CEILING_SECONDS: f64 = 30.0;

const BASE_COMPLEXITY: u32 = 1;
const LOOP_WEIGHT: u32 = 2;
const RECURSION_WEIGHT: u32 = 5;

/// Structural estimate of what a tool will consume when executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    /// Estimated peak memory in megabytes.
    pub memory_mb: u64,
    /// Estimated CPU time in seconds.
    pub cpu_seconds: f64,
    /// Weighted complexity score, at least 1.
    pub complexity: u32,
    /// Deepest block nesting observed.
    pub nesting_depth: u32,
    /// Loops counted toward complexity: every loop statement in Python, each
    /// loop kind present in JavaScript.
    pub loops: u32,
    /// Number of functions flagged recursive.
    pub recursive_functions: u32,
}

impl ResourceEstimate {
    /// Derives an estimate from structural counts.
    ///
    /// Both analyzers feed their counts through this one formula so that
    /// estimates stay comparable across languages.
    #[must_use]
    pub fn from_counts(loops: u32, recursive_functions: u32, nesting_depth: u32) -> Self {
        let complexity = BASE_COMPLEXITY
            .saturating_add(loops.saturating_mul(LOOP_WEIGHT))
            .saturating_add(recursive_functions.saturating_mul(RECURSION_WEIGHT));
        let memory_mb = (BASE_MEMORY_MB + MEMORY_PER_COMPLEXITY_MB * u64::from(complexity))
            .min(MEMORY_CEILING_MB);
        let mut cpu_seconds = BASE_CPU_SECONDS + CPU_PER_COMPLEXITY * f64::from(complexity);
        if loops > 0 {
            cpu_seconds += LOOP_PENALTY_SECONDS;
        }
        if recursive_functions > 0 {
            cpu_seconds += RECURSION_PENALTY_SECONDS;
        }
        let cpu_seconds = cpu_seconds.min(CPU_CEILING_SECONDS);

        Self {
            memory_mb,
            cpu_seconds,
            complexity,
            nesting_depth,
            loops,
            recursive_functions,
        }
    }

    /// Returns `true` when at least one function is recursive.
    #[must_use]
    pub fn has_recursion(&self) -> bool {
        self.recursive_functions > 0
    }

    /// Returns `true` when at least one loop construct was seen.
    #[must_use]
    pub fn has_loops(&self) -> bool {
        self.loops > 0
    }
}
