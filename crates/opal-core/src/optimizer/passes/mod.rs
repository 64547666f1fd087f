use crate::ast::Program;
use crate::config::OptimizationLevel;
use crate::errors::InternalError;
use crate::optimizer::OptimizerContext;
use crate::traversal::TrackingOutcome;
use serde::Serialize;

mod assertion_remover;
pub use assertion_remover::AssertionRemover;

mod cast_elision;
pub use cast_elision::CastElision;

mod finalizer;
pub use finalizer::Finalizer;

mod devirtualizer;
pub use devirtualizer::Devirtualizer;

mod pruner;
pub use pruner::Pruner;

mod compound_assignment;
pub use compound_assignment::CompoundAssignmentNormalizer;

mod long_emulation;
pub use long_emulation::LongEmulation;

mod equality_normalizer;
pub use equality_normalizer::EqualityNormalizer;

/// A rewrite over the whole program. Passes mutate the tree only through
/// the traversal framework so the optimizer context stays current.
pub trait OptimizationPass {
    fn name(&self) -> &'static str;

    fn min_level(&self) -> OptimizationLevel;

    fn run(
        &mut self,
        program: &mut Program,
        ctx: &mut dyn OptimizerContext,
    ) -> Result<OptimizerStats, InternalError>;
}

/// What a pass run, or a group of runs, did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerStats {
    pub name: String,
    pub num_visits: usize,
    pub num_mods: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OptimizerStats>,
}

impl OptimizerStats {
    pub fn new(name: impl Into<String>) -> Self {
        OptimizerStats {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_outcome(name: &str, outcome: &TrackingOutcome) -> Self {
        OptimizerStats {
            name: name.to_string(),
            num_visits: outcome.num_visits,
            num_mods: outcome.num_mods,
            children: Vec::new(),
        }
    }

    /// Attach a child run and fold its counts into this one
    pub fn add(&mut self, child: OptimizerStats) {
        self.num_visits += child.num_visits;
        self.num_mods += child.num_mods;
        self.children.push(child);
    }

    pub fn did_change(&self) -> bool {
        self.num_mods > 0
    }

    /// Total modifications attributed to passes called `name`
    pub fn mods_for(&self, name: &str) -> usize {
        let own = if self.name == name && self.children.is_empty() {
            self.num_mods
        } else {
            0
        };
        own + self
            .children
            .iter()
            .map(|child| child.mods_for(name))
            .sum::<usize>()
    }
}
