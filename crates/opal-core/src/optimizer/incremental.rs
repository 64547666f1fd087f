//! Which members a pass has to revisit.
//!
//! A pass that only rewrites locally can skip everything that has not
//! changed since it last completed. The ledger in the optimizer context
//! answers that, and the dependency graphs widen the answer to the
//! callers and callees of modified methods and to the methods that touch a
//! modified field. Without tracking the whole program is returned.

use super::context::OptimizerContext;
use super::graph::FxIndexSet;
use crate::ast::{FieldId, Member, MethodId, Program};
use crate::errors::InternalError;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectedMembers {
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
    /// Set when every live member was returned
    pub whole_program: bool,
}

impl AffectedMembers {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.fields.is_empty()
    }
}

/// Live members modified since `pass` last completed, plus the live methods
/// depending on them through a call or a field reference
pub fn affected_members(
    program: &Program,
    ctx: &dyn OptimizerContext,
    pass: &str,
) -> Result<AffectedMembers, InternalError> {
    if !ctx.is_incremental() {
        return Ok(AffectedMembers {
            methods: program.methods(),
            fields: program.fields(),
            whole_program: true,
        });
    }
    let since = ctx.last_step_for(pass);
    let modified: Vec<MethodId> = ctx.modified_methods_since(since)?.into_iter().collect();
    let fields: Vec<FieldId> = ctx
        .modified_fields_since(since)?
        .into_iter()
        .filter(|f| program.is_live(Member::Field(*f)))
        .collect();

    let mut methods = modified.iter().copied().collect::<FxIndexSet<_>>();
    let direct = methods.len();
    methods.extend(ctx.callers(&modified));
    methods.extend(ctx.callees(&modified));
    methods.extend(ctx.methods_referencing(&fields));
    let methods: Vec<MethodId> = methods
        .into_iter()
        .filter(|m| program.is_live(Member::Method(*m)))
        .collect();
    debug!(
        "{}: {} methods ({} modified) and {} fields since step {}",
        pass,
        methods.len(),
        direct,
        fields.len(),
        since
    );
    Ok(AffectedMembers {
        methods,
        fields,
        whole_program: false,
    })
}

/// Remember that `pass` completed in the current step
pub fn record_run(ctx: &mut dyn OptimizerContext, pass: &str) {
    let step = ctx.optimization_step();
    ctx.set_last_step_for(pass, step);
}
