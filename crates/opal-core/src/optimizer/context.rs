//! Dependency state shared by the passes of one compilation.
//!
//! [`FullOptimizerContext`] keeps the call graph, the field reference graph
//! and a step-indexed ledger of modified members so incremental passes can
//! ask what changed since they last ran. [`NoOpOptimizerContext`] answers
//! every query as empty for compiles that do not want the bookkeeping.

use super::graph::{CallGraph, FieldReferenceGraph, FxIndexMap, FxIndexSet};
use super::graph_builder::{build_graphs, References};
use crate::ast::{FieldId, Member, MethodId, Program};
use crate::errors::InternalError;
use crate::ice;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use tracing::debug;

pub trait OptimizerContext {
    /// Whether the ledger and graphs are maintained
    fn is_incremental(&self) -> bool;

    fn optimization_step(&self) -> usize;

    /// Close the current step and open the next. Called by the driver after
    /// each completed pass.
    fn inc_optimization_step(&mut self);

    /// Record that `member` changed in the current step
    fn mark_modified(&mut self, member: Member);

    /// Methods modified in any step of `[step, current)`
    fn modified_methods_since(&self, step: usize) -> Result<FxIndexSet<MethodId>, InternalError>;

    /// Fields modified in any step of `[step, current)`
    fn modified_fields_since(&self, step: usize) -> Result<FxIndexSet<FieldId>, InternalError>;

    fn callers(&self, callees: &[MethodId]) -> FxIndexSet<MethodId>;

    fn callees(&self, callers: &[MethodId]) -> FxIndexSet<MethodId>;

    fn methods_referencing(&self, fields: &[FieldId]) -> FxIndexSet<MethodId>;

    fn referenced_fields(&self, methods: &[MethodId]) -> FxIndexSet<FieldId>;

    /// Forget a removed member: its graph edges and ledger entries.
    /// Removing twice is a no-op.
    fn remove(&mut self, member: Member);

    /// Step at which the named pass last completed, 0 if never
    fn last_step_for(&self, optimizer: &str) -> usize;

    fn set_last_step_for(&mut self, optimizer: &str, step: usize);

    /// Recompute `method`'s callees from its current body and apply the
    /// difference. Dropped edges are added to `deleted` and new ones to
    /// `added`.
    fn update_call_graph_of_method(
        &mut self,
        program: &Program,
        method: MethodId,
        deleted: &mut CallGraph,
        added: &mut CallGraph,
    );

    /// Recompute the fields `method` references from its current body
    fn update_field_references_of_method(&mut self, program: &Program, method: MethodId);

    fn call_graph(&self) -> Option<&CallGraph>;

    fn field_references(&self) -> Option<&FieldReferenceGraph>;

    fn check_consistency(&self) -> Result<(), InternalError>;
}

/// Per-step sets of modified items plus each item's current step
#[derive(Debug, Clone)]
struct Ledger<T> {
    by_step: Vec<FxIndexSet<T>>,
    last_step: FxHashMap<T, usize>,
}

impl<T> Ledger<T>
where
    T: Copy + Eq + Hash + std::fmt::Debug,
{
    fn new() -> Self {
        Ledger {
            by_step: vec![FxIndexSet::default()],
            last_step: FxHashMap::default(),
        }
    }

    fn current(&self) -> usize {
        self.by_step.len() - 1
    }

    fn mark(&mut self, item: T) {
        let step = self.current();
        if let Some(previous) = self.last_step.insert(item, step) {
            if previous != step {
                self.by_step[previous].shift_remove(&item);
            }
        }
        self.by_step[step].insert(item);
    }

    fn open_step(&mut self) {
        self.by_step.push(FxIndexSet::default());
    }

    fn since(&self, step: usize) -> Result<FxIndexSet<T>, InternalError> {
        let current = self.current();
        if step > current {
            return Err(ice!(
                "modification query for step {} but the current step is {}",
                step,
                current
            ));
        }
        Ok(self.by_step[step..current].iter().flatten().copied().collect())
    }

    fn remove(&mut self, item: T) {
        if let Some(step) = self.last_step.remove(&item) {
            self.by_step[step].shift_remove(&item);
        }
    }

    fn check_consistency(&self) -> Result<(), InternalError> {
        let mut seen = 0;
        for (step, items) in self.by_step.iter().enumerate() {
            for item in items {
                if self.last_step.get(item) != Some(&step) {
                    return Err(ice!("{:?} is recorded in step {} but indexed elsewhere", item, step));
                }
                seen += 1;
            }
        }
        if seen != self.last_step.len() {
            return Err(ice!("ledger index has entries missing from every step"));
        }
        Ok(())
    }
}

/// Optimizer context with full dependency tracking
#[derive(Debug, Clone)]
pub struct FullOptimizerContext {
    methods: Ledger<MethodId>,
    fields: Ledger<FieldId>,
    last_step_for: FxIndexMap<String, usize>,
    call_graph: CallGraph,
    field_references: FieldReferenceGraph,
}

impl FullOptimizerContext {
    /// Seed the graphs from the whole program and record every member as
    /// modified in step 0. The returned context is at step 1.
    pub fn new(program: &Program) -> Self {
        let mut ctx = Self::empty();
        let (call_graph, field_references) = build_graphs(program);
        ctx.call_graph = call_graph;
        ctx.field_references = field_references;
        for method in program.methods() {
            ctx.methods.mark(method);
        }
        for field in program.fields() {
            ctx.fields.mark(field);
        }
        debug!(
            "Seeded optimizer context: {} calls, {} field references",
            ctx.call_graph.len(),
            ctx.field_references.len()
        );
        ctx.inc_optimization_step();
        ctx
    }

    /// Context with empty graphs at step 0
    pub fn empty() -> Self {
        FullOptimizerContext {
            methods: Ledger::new(),
            fields: Ledger::new(),
            last_step_for: FxIndexMap::default(),
            call_graph: CallGraph::new(),
            field_references: FieldReferenceGraph::new(),
        }
    }
}

fn collect<T, U, I>(items: &[T], f: impl Fn(T) -> I) -> FxIndexSet<U>
where
    T: Copy,
    U: Eq + Hash,
    I: Iterator<Item = U>,
{
    items.iter().flat_map(|item| f(*item)).collect()
}

impl OptimizerContext for FullOptimizerContext {
    fn is_incremental(&self) -> bool {
        true
    }

    fn optimization_step(&self) -> usize {
        self.methods.current()
    }

    fn inc_optimization_step(&mut self) {
        self.methods.open_step();
        self.fields.open_step();
    }

    fn mark_modified(&mut self, member: Member) {
        match member {
            Member::Method(m) => self.methods.mark(m),
            Member::Field(f) => self.fields.mark(f),
        }
    }

    fn modified_methods_since(&self, step: usize) -> Result<FxIndexSet<MethodId>, InternalError> {
        self.methods.since(step)
    }

    fn modified_fields_since(&self, step: usize) -> Result<FxIndexSet<FieldId>, InternalError> {
        self.fields.since(step)
    }

    fn callers(&self, callees: &[MethodId]) -> FxIndexSet<MethodId> {
        collect(callees, |m| self.call_graph.callers_of(m))
    }

    fn callees(&self, callers: &[MethodId]) -> FxIndexSet<MethodId> {
        collect(callers, |m| self.call_graph.callees_of(m))
    }

    fn methods_referencing(&self, fields: &[FieldId]) -> FxIndexSet<MethodId> {
        collect(fields, |f| self.field_references.methods_referencing(f))
    }

    fn referenced_fields(&self, methods: &[MethodId]) -> FxIndexSet<FieldId> {
        collect(methods, |m| self.field_references.fields_of(m))
    }

    fn remove(&mut self, member: Member) {
        match member {
            Member::Method(m) => {
                self.call_graph.remove_method(m);
                self.field_references.remove_method(m);
                self.methods.remove(m);
            }
            Member::Field(f) => {
                self.field_references.remove_field(f);
                self.fields.remove(f);
            }
        }
    }

    fn last_step_for(&self, optimizer: &str) -> usize {
        self.last_step_for.get(optimizer).copied().unwrap_or(0)
    }

    fn set_last_step_for(&mut self, optimizer: &str, step: usize) {
        self.last_step_for.insert(optimizer.to_string(), step);
    }

    fn update_call_graph_of_method(
        &mut self,
        program: &Program,
        method: MethodId,
        deleted: &mut CallGraph,
        added: &mut CallGraph,
    ) {
        let before: FxIndexSet<MethodId> = self.call_graph.callees_of(method).collect();
        let after = References::of_method(program, method).callees;
        for callee in before.iter().filter(|c| !after.contains(*c)) {
            self.call_graph.remove_call(method, *callee);
            deleted.add_call(method, *callee);
        }
        for callee in after.iter().filter(|c| !before.contains(*c)) {
            self.call_graph.add_call(method, *callee);
            added.add_call(method, *callee);
        }
    }

    fn update_field_references_of_method(&mut self, program: &Program, method: MethodId) {
        let after = References::of_method(program, method).fields;
        let before: FxIndexSet<FieldId> = self.field_references.fields_of(method).collect();
        for field in before.iter().filter(|f| !after.contains(*f)) {
            self.field_references.remove_reference(method, *field);
        }
        for field in after {
            self.field_references.add_reference(method, field);
        }
    }

    fn call_graph(&self) -> Option<&CallGraph> {
        Some(&self.call_graph)
    }

    fn field_references(&self) -> Option<&FieldReferenceGraph> {
        Some(&self.field_references)
    }

    fn check_consistency(&self) -> Result<(), InternalError> {
        self.call_graph.check_consistency()?;
        self.field_references.check_consistency()?;
        self.methods
            .check_consistency()
            .map_err(|e| e.with_context("in the method ledger"))?;
        self.fields
            .check_consistency()
            .map_err(|e| e.with_context("in the field ledger"))
    }
}

/// Optimizer context that tracks nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpOptimizerContext;

impl OptimizerContext for NoOpOptimizerContext {
    fn is_incremental(&self) -> bool {
        false
    }

    fn optimization_step(&self) -> usize {
        0
    }

    fn inc_optimization_step(&mut self) {}

    fn mark_modified(&mut self, _member: Member) {}

    fn modified_methods_since(&self, _step: usize) -> Result<FxIndexSet<MethodId>, InternalError> {
        Ok(FxIndexSet::default())
    }

    fn modified_fields_since(&self, _step: usize) -> Result<FxIndexSet<FieldId>, InternalError> {
        Ok(FxIndexSet::default())
    }

    fn callers(&self, _callees: &[MethodId]) -> FxIndexSet<MethodId> {
        FxIndexSet::default()
    }

    fn callees(&self, _callers: &[MethodId]) -> FxIndexSet<MethodId> {
        FxIndexSet::default()
    }

    fn methods_referencing(&self, _fields: &[FieldId]) -> FxIndexSet<MethodId> {
        FxIndexSet::default()
    }

    fn referenced_fields(&self, _methods: &[MethodId]) -> FxIndexSet<FieldId> {
        FxIndexSet::default()
    }

    fn remove(&mut self, _member: Member) {}

    fn last_step_for(&self, _optimizer: &str) -> usize {
        0
    }

    fn set_last_step_for(&mut self, _optimizer: &str, _step: usize) {}

    fn update_call_graph_of_method(
        &mut self,
        _program: &Program,
        _method: MethodId,
        _deleted: &mut CallGraph,
        _added: &mut CallGraph,
    ) {
    }

    fn update_field_references_of_method(&mut self, _program: &Program, _method: MethodId) {}

    fn call_graph(&self) -> Option<&CallGraph> {
        None
    }

    fn field_references(&self) -> Option<&FieldReferenceGraph> {
        None
    }

    fn check_consistency(&self) -> Result<(), InternalError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Field, Method, NodeKind, Type, TypeId, TypeKind};

    /// Adds `name` to `owner` with a body calling each of `callees`
    fn method_calling(
        program: &mut Program,
        owner: TypeId,
        name: &str,
        callees: &[MethodId],
    ) -> MethodId {
        let mut statements = Vec::new();
        for callee in callees {
            let call = program.call(None, *callee, Vec::new());
            statements.push(program.expr_stmt(call));
        }
        let body = program.block(statements);
        let mut method = Method::new(name, owner, Type::Void);
        method.is_static = true;
        method.body = Some(body);
        program.add_method(owner, method)
    }

    /// A calls B, B calls C
    fn chain() -> (Program, [MethodId; 3]) {
        let mut program = Program::new();
        let ty = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let c = method_calling(&mut program, ty, "c", &[]);
        let b = method_calling(&mut program, ty, "b", &[c]);
        let a = method_calling(&mut program, ty, "a", &[b]);
        (program, [a, b, c])
    }

    fn set<T: Eq + Hash>(items: impl IntoIterator<Item = T>) -> FxIndexSet<T> {
        items.into_iter().collect()
    }

    #[test]
    fn test_remove_middle_of_chain() {
        let (program, [a, b, c]) = chain();
        let mut ctx = FullOptimizerContext::new(&program);
        assert_eq!(ctx.callers(&[c]), set([b]));
        assert_eq!(ctx.callees(&[a]), set([b]));

        ctx.remove(Member::Method(b));
        assert!(ctx.callers(&[c]).is_empty());
        assert!(ctx.callees(&[a]).is_empty());
        ctx.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (program, [a, b, _]) = chain();
        let mut ctx = FullOptimizerContext::new(&program);
        ctx.remove(Member::Method(b));
        ctx.remove(Member::Method(b));
        assert!(!ctx.modified_methods_since(0).unwrap().contains(&b));
        assert!(ctx.modified_methods_since(0).unwrap().contains(&a));
        assert!(ctx.call_graph().unwrap().calls().all(|(x, y)| x != b && y != b));
        ctx.check_consistency().unwrap();
    }

    #[test]
    fn test_ledger_moves_member_to_newest_step() {
        let (_program, [m, _, _]) = chain();
        let mut ctx = FullOptimizerContext::empty();
        ctx.mark_modified(Member::Method(m));
        ctx.inc_optimization_step();
        ctx.mark_modified(Member::Method(m));
        ctx.inc_optimization_step();

        assert_eq!(ctx.modified_methods_since(0).unwrap(), set([m]));
        assert_eq!(ctx.modified_methods_since(1).unwrap(), set([m]));
        assert!(ctx.modified_methods_since(2).unwrap().is_empty());
        assert!(ctx.modified_methods_since(3).is_err());
        ctx.check_consistency().unwrap();
    }

    #[test]
    fn test_seeded_context_starts_at_step_one() {
        let (program, methods) = chain();
        let ctx = FullOptimizerContext::new(&program);
        assert_eq!(ctx.optimization_step(), 1);
        assert_eq!(ctx.modified_methods_since(0).unwrap(), set(methods.iter().rev().copied()));
        assert!(ctx.modified_methods_since(1).unwrap().is_empty());
    }

    #[test]
    fn test_call_graph_diff_reports_exact_edges() {
        let (mut program, [a, b, c]) = chain();
        let mut ctx = FullOptimizerContext::new(&program);

        // a() { b(); }  becomes  a() { c(); }
        let body = program.method(a).body.unwrap();
        let stmt = program.kind(body).children()[0];
        let call = match program.kind(stmt) {
            NodeKind::ExprStmt(call) => *call,
            other => panic!("unexpected {:?}", other),
        };
        if let NodeKind::MethodCall { method, .. } = &mut program.node_mut(call).kind {
            *method = c;
        }

        let mut deleted = CallGraph::new();
        let mut added = CallGraph::new();
        ctx.update_call_graph_of_method(&program, a, &mut deleted, &mut added);
        assert_eq!(deleted.calls().collect::<Vec<_>>(), vec![(a, b)]);
        assert_eq!(added.calls().collect::<Vec<_>>(), vec![(a, c)]);
        assert_eq!(ctx.callers(&[c]), set([b, a]));
        ctx.check_consistency().unwrap();
    }

    #[test]
    fn test_last_step_defaults_to_zero() {
        let mut ctx = FullOptimizerContext::empty();
        assert_eq!(ctx.last_step_for("pruner"), 0);
        ctx.set_last_step_for("pruner", 4);
        assert_eq!(ctx.last_step_for("pruner"), 4);
    }

    #[test]
    fn test_noop_context_answers_empty() {
        let (program, [a, _, c]) = chain();
        let mut ctx = NoOpOptimizerContext;
        ctx.mark_modified(Member::Method(a));
        ctx.inc_optimization_step();
        assert!(!ctx.is_incremental());
        assert!(ctx.callers(&[c]).is_empty());
        assert!(ctx.modified_methods_since(7).unwrap().is_empty());
        let mut deleted = CallGraph::new();
        let mut added = CallGraph::new();
        ctx.update_call_graph_of_method(&program, a, &mut deleted, &mut added);
        assert!(added.is_empty());
        assert!(ctx.call_graph().is_none());
    }

    /// Static fields `x`, `y`, `z` and a method `m() { x; y; }`
    fn readers() -> (Program, MethodId, [FieldId; 3]) {
        let mut program = Program::new();
        let ty = program.add_type(DeclaredType::new("Main", TypeKind::Class));
        let field = |program: &mut Program, name: &str| {
            let mut declared = Field::new(name, ty, Type::Int);
            declared.is_static = true;
            program.add_field(ty, declared)
        };
        let x = field(&mut program, "x");
        let y = field(&mut program, "y");
        let z = field(&mut program, "z");

        let mut statements = Vec::new();
        for read in [x, y] {
            let reference = program.field_ref(None, read);
            statements.push(program.expr_stmt(reference));
        }
        let body = program.block(statements);
        let mut method = Method::new("m", ty, Type::Void);
        method.is_static = true;
        method.body = Some(body);
        let m = program.add_method(ty, method);
        (program, m, [x, y, z])
    }

    #[test]
    fn test_field_reference_update_reports_exact_changes() {
        let (mut program, m, [x, y, z]) = readers();
        let mut ctx = FullOptimizerContext::new(&program);
        assert_eq!(ctx.referenced_fields(&[m]), set([x, y]));

        // m() { x; y; }  becomes  m() { x; z; }
        let body = program.method(m).body.unwrap();
        let stmt = program.kind(body).children()[1];
        let read = match program.kind(stmt) {
            NodeKind::ExprStmt(read) => *read,
            other => panic!("unexpected {:?}", other),
        };
        if let NodeKind::FieldRef { field, .. } = &mut program.node_mut(read).kind {
            *field = z;
        }

        ctx.update_field_references_of_method(&program, m);
        assert_eq!(ctx.referenced_fields(&[m]), set([x, z]));
        assert!(ctx.methods_referencing(&[y]).is_empty());
        assert_eq!(ctx.methods_referencing(&[x, z]), set([m]));
        assert_eq!(ctx.field_references().unwrap().len(), 2);
        ctx.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_field_purges_references_and_ledger() {
        let (program, m, [x, y, z]) = readers();
        let mut ctx = FullOptimizerContext::new(&program);

        ctx.remove(Member::Field(x));
        ctx.remove(Member::Field(x));
        assert!(ctx.methods_referencing(&[x]).is_empty());
        assert_eq!(ctx.referenced_fields(&[m]), set([y]));
        let modified = ctx.modified_fields_since(0).unwrap();
        assert!(!modified.contains(&x));
        assert_eq!(modified, set([y, z]));
        // The method that read it is untouched
        assert!(ctx.modified_methods_since(0).unwrap().contains(&m));
        ctx.check_consistency().unwrap();
    }
}
