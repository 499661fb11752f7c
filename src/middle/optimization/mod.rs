//! IR optimizations. The optimizer never reorders or rewrites instructions,
//! it only drops them, so its output is always a subsequence of its input.

use crate::middle::ir::Instruction;

pub mod dead_code;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationStats {
    pub original: usize,
    pub optimized: usize,
    pub removed: usize,
    pub percentage_removed: f64,
}

impl OptimizationStats {
    fn new(original: usize, optimized: usize) -> Self {
        let removed = original - optimized;

        let percentage_removed = if original == 0 {
            0.0
        } else {
            removed as f64 * 100.0 / original as f64
        };

        Self {
            original,
            optimized,
            removed,
            percentage_removed,
        }
    }
}

impl core::fmt::Display for OptimizationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "original instructions:  {}", self.original)?;
        writeln!(f, "optimized instructions: {}", self.optimized)?;
        write!(
            f,
            "removed:                {} ({:.1}%)",
            self.removed, self.percentage_removed
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Optimized {
    pub instructions: Vec<Instruction>,
    pub stats: OptimizationStats,
}

pub fn optimize(instructions: &[Instruction]) -> Optimized {
    let optimized = dead_code::eliminate_dead_code(instructions);
    let stats = OptimizationStats::new(instructions.len(), optimized.len());

    tracing::debug!(
        original = stats.original,
        removed = stats.removed,
        "optimized IR"
    );

    Optimized {
        instructions: optimized,
        stats,
    }
}
