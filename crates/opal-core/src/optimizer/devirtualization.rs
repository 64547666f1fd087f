//! Class hierarchy analysis for devirtualization.
//!
//! A virtual call can be bound statically when every class the receiver
//! may be an instance of dispatches it to the same method.
//!
//! RTA (Rapid Type Analysis):
//! When the program instantiates some subclass of the receiver type, only
//! instantiated classes are considered possible receivers. Otherwise the
//! analysis falls back to every concrete subclass (plain CHA).

use crate::ast::{MethodId, NodeKind, Program, TypeId};
use crate::optimizer::graph::FxIndexSet;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Class hierarchy information for devirtualization safety analysis
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    /// class -> parent (None at the root)
    parent_of: FxHashMap<TypeId, Option<TypeId>>,
    /// parent -> direct subclasses, and interface -> direct implementors
    /// and sub-interfaces
    children_of: FxHashMap<TypeId, Vec<TypeId>>,
    /// Classes that may be the runtime type of a value
    concrete: FxIndexSet<TypeId>,
    /// RTA: classes with a reachable `new`, library classes included
    instantiated: FxHashSet<TypeId>,
}

impl ClassHierarchy {
    /// Scan the live types and every live body for instantiations
    pub fn build(program: &Program) -> Self {
        let mut hierarchy = ClassHierarchy::default();
        for ty in program.types() {
            let declared = program.declared_type(*ty);
            // Superinterfaces are parents too, so sub-interfaces link their implementors
            for interface in &declared.interfaces {
                hierarchy.children_of.entry(*interface).or_default().push(*ty);
            }
            if declared.is_interface() {
                continue;
            }
            hierarchy.parent_of.insert(*ty, declared.super_class);
            if let Some(parent) = declared.super_class {
                hierarchy.children_of.entry(parent).or_default().push(*ty);
            }
            if !declared.is_abstract {
                hierarchy.concrete.insert(*ty);
                if declared.is_library {
                    hierarchy.instantiated.insert(*ty);
                }
            }
        }

        let roots = program
            .methods()
            .into_iter()
            .filter_map(|m| program.method(m).body)
            .chain(
                program
                    .fields()
                    .into_iter()
                    .filter_map(|f| program.field(f).initializer),
            )
            .collect::<Vec<_>>();
        for root in roots {
            for node in program.preorder(root) {
                if let NodeKind::New { class, .. } = program.kind(node) {
                    hierarchy.record_instantiation(*class);
                }
            }
        }
        hierarchy
    }

    /// RTA: Record that a specific class was instantiated
    pub fn record_instantiation(&mut self, class: TypeId) {
        self.instantiated.insert(class);
    }

    pub fn parent_of(&self, class: TypeId) -> Option<TypeId> {
        self.parent_of.get(&class).copied().flatten()
    }

    /// `ty` itself and everything below it
    pub fn descendants(&self, ty: TypeId) -> FxIndexSet<TypeId> {
        let mut seen = FxIndexSet::default();
        let mut stack = vec![ty];
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                if let Some(children) = self.children_of.get(&next) {
                    stack.extend(children.iter().rev().copied());
                }
            }
        }
        seen
    }

    /// Classes a receiver of static type `ty` may be an instance of
    pub fn possible_receivers(&self, ty: TypeId) -> Vec<TypeId> {
        let concrete: Vec<TypeId> = self
            .descendants(ty)
            .into_iter()
            .filter(|c| self.concrete.contains(c))
            .collect();
        let instantiated: Vec<TypeId> = concrete
            .iter()
            .copied()
            .filter(|c| self.instantiated.contains(c))
            .collect();
        if instantiated.is_empty() {
            concrete
        } else {
            instantiated
        }
    }

    /// The method a call to `method` runs on an instance of `class`: the
    /// nearest declaration along the superclass chain that is `method` or
    /// overrides it
    pub fn dispatch_target(
        &self,
        program: &Program,
        class: TypeId,
        method: MethodId,
    ) -> Option<MethodId> {
        let mut current = Some(class);
        while let Some(ty) = current {
            let found = program
                .declared_type(ty)
                .methods
                .iter()
                .copied()
                .find(|m| overrides_transitively(program, *m, method));
            if let Some(found) = found {
                return (!program.method(found).is_abstract()).then_some(found);
            }
            current = self.parent_of(ty);
        }
        None
    }

    /// Check if a call to `method` on a receiver of static type `receiver`
    /// always runs the same method, and return it.
    ///
    /// Safe if:
    /// 1. The method is final, OR
    /// 2. Every possible receiver class dispatches to one method (RTA when
    ///    the receiver type has instantiated subclasses, CHA otherwise)
    pub fn single_target(
        &self,
        program: &Program,
        receiver: TypeId,
        method: MethodId,
    ) -> Option<MethodId> {
        let declared = program.method(method);
        if (declared.is_final || program.declared_type(declared.enclosing).is_final)
            && !declared.is_abstract()
        {
            debug!("  CHA: {} is final", program.qualified_method_name(method));
            return Some(method);
        }

        let receivers = self.possible_receivers(receiver);
        if receivers.is_empty() {
            return None;
        }
        let mut targets = FxIndexSet::default();
        for class in receivers {
            targets.insert(self.dispatch_target(program, class, method)?);
        }
        if targets.len() == 1 {
            let target = targets.pop();
            if let Some(target) = target {
                debug!(
                    "  RTA: {} always dispatches to {}",
                    program.qualified_method_name(method),
                    program.qualified_method_name(target)
                );
            }
            target
        } else {
            debug!(
                "  RTA: {} has {} possible targets",
                program.qualified_method_name(method),
                targets.len()
            );
            None
        }
    }
}

/// Whether `candidate` is `method` or overrides it through any chain
pub fn overrides_transitively(program: &Program, candidate: MethodId, method: MethodId) -> bool {
    let mut stack = vec![candidate];
    let mut seen = FxHashSet::default();
    while let Some(next) = stack.pop() {
        if next == method {
            return true;
        }
        if seen.insert(next) {
            stack.extend(program.method(next).overrides.iter().copied());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclaredType, Method, Type, TypeKind};

    struct Shapes {
        program: Program,
        shape: TypeId,
        circle: TypeId,
        square: TypeId,
        area: MethodId,
        circle_area: MethodId,
        square_area: MethodId,
    }

    fn class(program: &mut Program, name: &str, parent: Option<TypeId>) -> TypeId {
        let mut declared = DeclaredType::new(name, TypeKind::Class);
        declared.super_class = parent;
        program.add_type(declared)
    }

    fn method(program: &mut Program, owner: TypeId, overrides: Option<MethodId>) -> MethodId {
        let mut declared = Method::new("area", owner, Type::Double);
        declared.body = Some(program.block(Vec::new()));
        declared.overrides.extend(overrides);
        program.add_method(owner, declared)
    }

    /// Shape.area overridden by Circle and Square
    fn shapes() -> Shapes {
        let mut program = Program::new();
        let shape = class(&mut program, "Shape", None);
        let circle = class(&mut program, "Circle", Some(shape));
        let square = class(&mut program, "Square", Some(shape));
        let area = method(&mut program, shape, None);
        let circle_area = method(&mut program, circle, Some(area));
        let square_area = method(&mut program, square, Some(area));
        Shapes {
            program,
            shape,
            circle,
            square,
            area,
            circle_area,
            square_area,
        }
    }

    #[test]
    fn test_class_hierarchy_build() {
        let s = shapes();
        let hierarchy = ClassHierarchy::build(&s.program);
        assert_eq!(hierarchy.parent_of(s.circle), Some(s.shape));
        assert_eq!(hierarchy.descendants(s.shape).len(), 3);
    }

    #[test]
    fn test_can_devirtualize_final_method() {
        let mut s = shapes();
        s.program.method_mut(s.area).is_final = true;
        let hierarchy = ClassHierarchy::build(&s.program);
        assert_eq!(hierarchy.single_target(&s.program, s.shape, s.area), Some(s.area));
    }

    #[test]
    fn test_cannot_devirtualize_overridden_method() {
        let s = shapes();
        let hierarchy = ClassHierarchy::build(&s.program);
        assert_eq!(hierarchy.single_target(&s.program, s.shape, s.area), None);
    }

    #[test]
    fn test_can_devirtualize_on_leaf_receiver() {
        let s = shapes();
        let hierarchy = ClassHierarchy::build(&s.program);
        assert_eq!(
            hierarchy.single_target(&s.program, s.circle, s.area),
            Some(s.circle_area)
        );
    }

    #[test]
    fn test_rta_single_instantiation_enables_devirtualization() {
        let s = shapes();
        let mut hierarchy = ClassHierarchy::build(&s.program);
        hierarchy.record_instantiation(s.square);
        assert_eq!(
            hierarchy.single_target(&s.program, s.shape, s.area),
            Some(s.square_area)
        );
    }

    #[test]
    fn test_rta_multi_instantiation_prevents_devirtualization() {
        let s = shapes();
        let mut hierarchy = ClassHierarchy::build(&s.program);
        hierarchy.record_instantiation(s.square);
        hierarchy.record_instantiation(s.circle);
        assert_eq!(hierarchy.single_target(&s.program, s.shape, s.area), None);
    }


    #[test]
    fn test_interface_with_single_implementor() {
        let mut program = Program::new();
        let iface = program.add_type(DeclaredType::new("Runnable", TypeKind::Interface));
        let run = program.add_method(iface, Method::new("run", iface, Type::Void));
        let task = class(&mut program, "Task", None);
        program.declared_type_mut(task).interfaces.push(iface);
        let mut task_run = Method::new("run", task, Type::Void);
        task_run.body = Some(program.block(Vec::new()));
        task_run.overrides.push(run);
        let task_run = program.add_method(task, task_run);

        let hierarchy = ClassHierarchy::build(&program);
        assert_eq!(hierarchy.single_target(&program, iface, run), Some(task_run));
    }

    #[test]
    fn test_implementor_through_sub_interface_is_a_receiver() {
        // interface I { m }, interface J extends I, D implements I, C implements J
        let mut program = Program::new();
        let i = program.add_type(DeclaredType::new("I", TypeKind::Interface));
        let m = program.add_method(i, Method::new("m", i, Type::Void));
        let j = program.add_type(DeclaredType::new("J", TypeKind::Interface));
        program.declared_type_mut(j).interfaces.push(i);

        let implementor = |program: &mut Program, name: &str, iface: TypeId| {
            let ty = class(program, name, None);
            program.declared_type_mut(ty).interfaces.push(iface);
            let mut body = Method::new("m", ty, Type::Void);
            body.body = Some(program.block(Vec::new()));
            body.overrides.push(m);
            (ty, program.add_method(ty, body))
        };
        let (d, d_m) = implementor(&mut program, "D", i);
        let (c, c_m) = implementor(&mut program, "C", j);

        let hierarchy = ClassHierarchy::build(&program);
        let below_i = hierarchy.descendants(i);
        assert!(below_i.contains(&j));
        assert!(below_i.contains(&c));
        assert!(below_i.contains(&d));
        assert_eq!(hierarchy.parent_of(j), None);

        assert_eq!(hierarchy.single_target(&program, i, m), None);
        assert_eq!(hierarchy.single_target(&program, j, m), Some(c_m));
        assert_eq!(hierarchy.single_target(&program, d, m), Some(d_m));
    }
}
