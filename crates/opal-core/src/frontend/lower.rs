use super::{
    ExprDecl, FieldDecl, MethodDecl, NativeDecl, ProgramDecl, StmtDecl, TypeDecl, TypeKindDecl,
    UnaryOpDecl,
};
use crate::ast::{
    BinaryOp, DeclaredType, Field, FieldId, Literal, LocalId, Method, MethodId, NativeCode,
    NodeId, NodeKind, Program, Type, TypeId, TypeKind, UnaryOp,
};
use crate::diagnostics::DiagnosticHandler;
use crate::errors::CompilationError;
use crate::span::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// Build the arena program for `decl`.
///
/// Unresolved names, bad type references and misplaced `this` are reported
/// through `handler` and loading continues so that every problem is seen in
/// one run. Any reported error fails the load with
/// [`CompilationError::Semantic`].
pub fn load_program(
    decl: &ProgramDecl,
    handler: &dyn DiagnosticHandler,
) -> Result<Program, CompilationError> {
    let errors_before = handler.error_count();
    let mut loader = Loader {
        program: Program::new(),
        handler,
        types: Vec::new(),
        methods: Vec::new(),
        fields: Vec::new(),
    };

    loader.declare_types(decl);
    loader.link_supertypes(decl);
    loader.declare_members(decl);
    loader.compute_overrides();
    loader.lower_bodies(decl);
    loader.resolve_entry_points(decl);
    handler.flush();

    let errors = handler.error_count() - errors_before;
    if errors > 0 {
        return Err(CompilationError::Semantic { errors });
    }
    let program = loader.program;
    info!(
        "loaded {} types, {} methods, {} fields",
        program.types().len(),
        program.methods().len(),
        program.fields().len()
    );
    Ok(program)
}

fn line_span(line: u32) -> Span {
    if line == 0 {
        Span::dummy()
    } else {
        Span::new(0, 0, line, 1)
    }
}

/// Parse a type reference in source spelling
fn parse_type(program: &Program, text: &str) -> Option<Type> {
    if let Some(element) = text.trim().strip_suffix("[]") {
        return parse_type(program, element).map(Type::array_of);
    }
    Some(match text.trim() {
        "void" => Type::Void,
        "boolean" => Type::Boolean,
        "int" => Type::Int,
        "long" => Type::Long,
        "double" => Type::Double,
        "String" => Type::String,
        name => Type::Class(program.find_type(name)?),
    })
}

struct Loader<'h> {
    program: Program,
    handler: &'h dyn DiagnosticHandler,
    /// Parallel to `ProgramDecl::types`
    types: Vec<TypeId>,
    methods: Vec<Vec<MethodId>>,
    fields: Vec<Vec<FieldId>>,
}

impl Loader<'_> {
    fn resolve_type(&self, text: &str, span: Span, what: &str) -> Type {
        parse_type(&self.program, text).unwrap_or_else(|| {
            self.handler
                .error(span, &format!("unknown type '{}' in {}", text, what));
            Type::Null
        })
    }

    fn declare_types(&mut self, decl: &ProgramDecl) {
        for ty in &decl.types {
            let span = line_span(ty.line);
            if self.program.find_type(&ty.name).is_some() {
                self.handler
                    .error(span, &format!("duplicate type '{}'", ty.name));
            }
            let kind = match ty.kind {
                TypeKindDecl::Class => TypeKind::Class,
                TypeKindDecl::Interface => TypeKind::Interface,
            };
            let mut declared = DeclaredType::new(ty.name.clone(), kind);
            declared.is_final = ty.is_final;
            declared.is_abstract |= ty.is_abstract;
            declared.is_library = ty.is_library;
            declared.span = span;
            self.types.push(self.program.add_type(declared));
        }
    }

    fn link_supertypes(&mut self, decl: &ProgramDecl) {
        for (ty, id) in decl.types.iter().zip(self.types.clone()) {
            let span = line_span(ty.line);
            if let Some(name) = &ty.super_class {
                match self.program.find_type(name) {
                    Some(parent) if !self.program.declared_type(parent).is_interface() => {
                        self.program.declared_type_mut(id).super_class = Some(parent);
                    }
                    Some(_) => self.handler.error(
                        span,
                        &format!("{} cannot extend interface '{}'", ty.name, name),
                    ),
                    None => self
                        .handler
                        .error(span, &format!("unknown superclass '{}' of {}", name, ty.name)),
                }
            }
            for name in &ty.interfaces {
                match self.program.find_type(name) {
                    Some(parent) if self.program.declared_type(parent).is_interface() => {
                        self.program.declared_type_mut(id).interfaces.push(parent);
                    }
                    Some(_) => self.handler.error(
                        span,
                        &format!("{} cannot implement class '{}'", ty.name, name),
                    ),
                    None => self
                        .handler
                        .error(span, &format!("unknown interface '{}' of {}", name, ty.name)),
                }
            }
        }

        let object = match &decl.object_type {
            Some(name) => {
                let found = self.program.find_type(name);
                if found.is_none() {
                    self.handler
                        .error(Span::dummy(), &format!("unknown object type '{}'", name));
                }
                found
            }
            None => self.program.find_type("Object"),
        };
        if let Some(object) = object {
            self.program.set_object_type(object);
            for id in self.types.clone() {
                let declared = self.program.declared_type(id);
                if id != object && !declared.is_interface() && declared.super_class.is_none() {
                    self.program.declared_type_mut(id).super_class = Some(object);
                }
            }
        }

        self.break_cycles();
    }

    /// A class that is its own ancestor loses its superclass so later
    /// hierarchy walks terminate
    fn break_cycles(&mut self) {
        for id in self.types.clone() {
            let mut seen = FxHashSet::default();
            let mut current = Some(id);
            while let Some(ty) = current {
                if !seen.insert(ty) {
                    // A cycle further up is reported when its own members are checked
                    if ty == id {
                        let declared = self.program.declared_type(id);
                        self.handler.error(
                            declared.span,
                            &format!("cyclic inheritance involving {}", declared.name),
                        );
                        self.program.declared_type_mut(id).super_class = None;
                    }
                    break;
                }
                current = self.program.declared_type(ty).super_class;
            }
        }
        for id in self.types.clone() {
            if self.interface_cycle(id, id, &mut FxHashSet::default()) {
                let declared = self.program.declared_type(id);
                self.handler.error(
                    declared.span,
                    &format!("cyclic inheritance involving {}", declared.name),
                );
                self.program.declared_type_mut(id).interfaces.clear();
            }
        }
    }

    fn interface_cycle(&self, start: TypeId, ty: TypeId, seen: &mut FxHashSet<TypeId>) -> bool {
        self.program
            .declared_type(ty)
            .interfaces
            .iter()
            .any(|parent| {
                *parent == start
                    || (seen.insert(*parent) && self.interface_cycle(start, *parent, seen))
            })
    }

    fn declare_members(&mut self, decl: &ProgramDecl) {
        for (ty, owner) in decl.types.iter().zip(self.types.clone()) {
            let fields = ty
                .fields
                .iter()
                .map(|field| self.declare_field(owner, field))
                .collect();
            self.fields.push(fields);

            let mut methods: Vec<MethodId> = ty
                .methods
                .iter()
                .map(|method| self.declare_method(owner, ty, method))
                .collect();
            let declares_constructor = ty.methods.iter().any(|m| m.is_constructor);
            if ty.kind == TypeKindDecl::Class && !declares_constructor {
                methods.push(self.default_constructor(owner));
            }
            self.methods.push(methods);

            if ty.is_library {
                for method in self.program.declared_type(owner).methods.clone() {
                    let key = self.program.qualified_method_name(method);
                    self.program.index_method(key, method);
                }
            }
        }
    }

    fn declare_field(&mut self, owner: TypeId, decl: &FieldDecl) -> FieldId {
        let span = line_span(decl.line);
        let ty = self.resolve_type(&decl.ty, span, &format!("field {}", decl.name));
        let mut field = Field::new(decl.name.clone(), owner, ty);
        field.is_static = decl.is_static;
        field.is_final = decl.is_final;
        field.span = span;
        self.program.add_field(owner, field)
    }

    fn declare_method(&mut self, owner: TypeId, ty: &TypeDecl, decl: &MethodDecl) -> MethodId {
        let span = line_span(decl.line);
        let what = format!("method {}.{}", ty.name, decl.name);
        let return_type = self.resolve_type(&decl.return_type, span, &what);
        let mut method = Method::new(decl.name.clone(), owner, return_type);
        method.is_static = decl.is_static;
        method.is_final = decl.is_final;
        method.is_constructor = decl.is_constructor;
        method.span = span;
        let id = self.program.add_method(owner, method);
        for param in &decl.params {
            let param_type = self.resolve_type(&param.ty, span, &what);
            self.program.add_param(id, param.name.clone(), param_type);
        }
        id
    }

    fn default_constructor(&mut self, owner: TypeId) -> MethodId {
        let mut method = Method::new("<init>", owner, Type::Void);
        method.is_constructor = true;
        method.is_synthetic = true;
        method.body = Some(self.program.block(Vec::new()));
        self.program.add_method(owner, method)
    }

    /// Record, for every virtual method, the nearest method of the same
    /// name and arity in each direct supertype
    fn compute_overrides(&mut self) {
        for method in self.program.methods() {
            let declared = self.program.method(method);
            if !declared.is_virtual() {
                continue;
            }
            let name = declared.name.clone();
            let arity = declared.params.len();
            let owner = self.program.declared_type(declared.enclosing);
            let parents: Vec<TypeId> = owner
                .super_class
                .into_iter()
                .chain(owner.interfaces.iter().copied())
                .collect();

            let mut overrides = Vec::new();
            for parent in parents {
                if let Some(overridden) = self.program.resolve_method(parent, &name, arity) {
                    if self.program.method(overridden).is_virtual()
                        && !overrides.contains(&overridden)
                    {
                        overrides.push(overridden);
                    }
                }
            }
            if !overrides.is_empty() {
                debug!(
                    "{} overrides {} method(s)",
                    self.program.qualified_method_name(method),
                    overrides.len()
                );
            }
            self.program.method_mut(method).overrides = overrides;
        }
    }

    fn lower_bodies(&mut self, decl: &ProgramDecl) {
        for (t, ty) in decl.types.iter().enumerate() {
            let owner = self.types[t];
            for (f, field_decl) in ty.fields.iter().enumerate() {
                let Some(init) = &field_decl.initializer else {
                    continue;
                };
                let field = self.fields[t][f];
                let field_ty = self.program.field(field).ty.clone();
                let mut body = BodyLowerer {
                    program: &mut self.program,
                    handler: self.handler,
                    owner,
                    method: None,
                    is_static: field_decl.is_static,
                    return_type: Type::Void,
                    scopes: Vec::new(),
                    span: line_span(field_decl.line),
                    context: format!("initializer of {}.{}", ty.name, field_decl.name),
                };
                let value = body.expr(init);
                let value = body.coerce(value, &field_ty);
                self.program.field_mut(field).initializer = Some(value);
            }

            for (m, method_decl) in ty.methods.iter().enumerate() {
                let method = self.methods[t][m];
                let body = match (&method_decl.body, &method_decl.native) {
                    (_, Some(native)) => Some(self.native_body(native, method)),
                    (Some(statements), None) => {
                        let params = self.program.method(method).params.clone();
                        let mut scope = FxHashMap::default();
                        for param in params {
                            scope.insert(self.program.local(param).name.clone(), param);
                        }
                        let return_type = self.program.method(method).return_type.clone();
                        let mut body = BodyLowerer {
                            program: &mut self.program,
                            handler: self.handler,
                            owner,
                            method: Some(method),
                            is_static: method_decl.is_static,
                            return_type,
                            scopes: vec![scope],
                            span: line_span(method_decl.line),
                            context: format!("{}.{}", ty.name, method_decl.name),
                        };
                        Some(body.block(statements))
                    }
                    (None, None) => None,
                };
                self.program.method_mut(method).body = body;
            }
        }
    }

    fn native_body(&mut self, native: &NativeDecl, method: MethodId) -> NodeId {
        let span = self.program.method(method).span;
        let method_refs = native
            .methods
            .iter()
            .filter_map(|name| {
                let found = name
                    .split_once('.')
                    .and_then(|(ty, member)| Some((self.program.find_type(ty)?, member)))
                    .and_then(|(ty, member)| self.program.find_method(ty, member));
                if found.is_none() {
                    self.handler
                        .error(span, &format!("native code refers to unknown method '{}'", name));
                }
                found
            })
            .collect();
        let field_refs = native
            .fields
            .iter()
            .filter_map(|name| {
                let found = name
                    .split_once('.')
                    .and_then(|(ty, member)| Some((self.program.find_type(ty)?, member)))
                    .and_then(|(ty, member)| self.program.find_field(ty, member));
                if found.is_none() {
                    self.handler
                        .error(span, &format!("native code refers to unknown field '{}'", name));
                }
                found
            })
            .collect();
        let code = NativeCode {
            code: native.code.clone(),
            method_refs,
            field_refs,
        };
        let native = self
            .program
            .add_node(NodeKind::NativeBlock(code), Type::Void, span);
        self.program.block(vec![native])
    }

    fn resolve_entry_points(&mut self, decl: &ProgramDecl) {
        for name in &decl.entry_points {
            let found = name
                .split_once('.')
                .and_then(|(ty, member)| Some((self.program.find_type(ty)?, member)))
                .and_then(|(ty, member)| self.program.find_method(ty, member));
            match found {
                Some(method) => self.program.add_entry_method(method),
                None => self
                    .handler
                    .error(Span::dummy(), &format!("unknown entry point '{}'", name)),
            }
        }
    }
}

/// Lowers the statements of one method body or one field initializer
struct BodyLowerer<'a> {
    program: &'a mut Program,
    handler: &'a dyn DiagnosticHandler,
    owner: TypeId,
    /// `None` inside a field initializer
    method: Option<MethodId>,
    is_static: bool,
    return_type: Type,
    /// Innermost block last
    scopes: Vec<FxHashMap<String, LocalId>>,
    span: Span,
    context: String,
}

impl BodyLowerer<'_> {
    fn error(&self, message: String) {
        self.handler
            .error(self.span, &format!("{} (in {})", message, self.context));
    }

    /// Placeholder for an expression that failed to resolve
    fn poisoned(&mut self) -> NodeId {
        self.program.literal(Literal::Null)
    }

    fn ty(&self, node: NodeId) -> Type {
        self.program.ty(node).clone()
    }

    fn resolve_type(&self, text: &str) -> Type {
        parse_type(self.program, text).unwrap_or_else(|| {
            self.error(format!("unknown type '{}'", text));
            Type::Null
        })
    }

    fn lookup_local(&self, name: &str) -> Option<LocalId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn declare_local(&mut self, name: &str, ty: Type) -> Option<LocalId> {
        let Some(method) = self.method else {
            self.error(format!("local '{}' declared outside a method", name));
            return None;
        };
        if self.lookup_local(name).is_some() {
            self.error(format!("duplicate local '{}'", name));
        }
        let local = self.program.add_local(method, name, ty);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
        Some(local)
    }

    /// Insert the conversion a `long` needs to become `to`, or the reverse.
    /// Other numeric conversions are free on the target.
    fn coerce(&mut self, node: NodeId, to: &Type) -> NodeId {
        let from = self.ty(node);
        if &from == to || !from.is_numeric() || !to.is_numeric() {
            return node;
        }
        if !from.is_long() && !to.is_long() {
            return node;
        }
        let span = self.program.node(node).span;
        self.program.add_node(
            NodeKind::Cast {
                target: to.clone(),
                expr: node,
            },
            to.clone(),
            span,
        )
    }

    fn this(&mut self) -> NodeId {
        if self.is_static {
            self.error("'this' used in a static context".to_string());
        }
        self.program
            .add_node(NodeKind::This, Type::Class(self.owner), Span::dummy())
    }

    // ---- statements --------------------------------------------------

    fn block(&mut self, statements: &[StmtDecl]) -> NodeId {
        self.scopes.push(FxHashMap::default());
        let lowered = statements.iter().map(|s| self.stmt(s)).collect();
        self.scopes.pop();
        self.program.block(lowered)
    }

    fn nested(&mut self, statement: &StmtDecl) -> NodeId {
        self.scopes.push(FxHashMap::default());
        let lowered = self.stmt(statement);
        self.scopes.pop();
        lowered
    }

    fn condition(&mut self, cond: &ExprDecl) -> NodeId {
        let cond = self.expr(cond);
        if !matches!(self.program.ty(cond), Type::Boolean | Type::Null) {
            let found = self.program.type_name(self.program.ty(cond));
            self.error(format!("condition must be boolean, found {}", found));
        }
        cond
    }

    fn stmt(&mut self, statement: &StmtDecl) -> NodeId {
        let kind = match statement {
            StmtDecl::Block { body } => return self.block(body),
            StmtDecl::Expr { expr } => {
                let expr = self.expr(expr);
                return self.program.expr_stmt(expr);
            }
            StmtDecl::Local { name, ty, init } => {
                let ty = self.resolve_type(ty);
                let init = init.as_ref().map(|init| {
                    let value = self.expr(init);
                    self.coerce(value, &ty)
                });
                let Some(local) = self.declare_local(name, ty) else {
                    return self.program.empty_statement();
                };
                NodeKind::LocalDecl { local, init }
            }
            StmtDecl::If {
                cond,
                then,
                otherwise,
            } => NodeKind::If {
                cond: self.condition(cond),
                then_branch: self.nested(then),
                else_branch: otherwise.as_ref().map(|s| self.nested(s)),
            },
            StmtDecl::While { cond, body } => NodeKind::While {
                cond: self.condition(cond),
                body: self.nested(body),
            },
            StmtDecl::For {
                init,
                cond,
                update,
                body,
            } => {
                self.scopes.push(FxHashMap::default());
                let kind = NodeKind::For {
                    init: init.iter().map(|s| self.stmt(s)).collect(),
                    cond: cond.as_ref().map(|c| self.condition(c)),
                    update: update.iter().map(|e| self.expr(e)).collect(),
                    body: self.nested(body),
                };
                self.scopes.pop();
                kind
            }
            StmtDecl::Return { value } => {
                let return_type = self.return_type.clone();
                let value = match value {
                    Some(value) => {
                        if return_type == Type::Void {
                            self.error("a void method cannot return a value".to_string());
                        }
                        let value = self.expr(value);
                        Some(self.coerce(value, &return_type))
                    }
                    None => {
                        if return_type != Type::Void {
                            self.error("missing return value".to_string());
                        }
                        None
                    }
                };
                NodeKind::Return(value)
            }
            StmtDecl::Break => NodeKind::Break,
            StmtDecl::Continue => NodeKind::Continue,
            StmtDecl::Throw { value } => NodeKind::Throw(self.expr(value)),
            StmtDecl::Assert { cond, message } => NodeKind::Assert {
                cond: self.condition(cond),
                message: message.as_ref().map(|m| self.expr(m)),
            },
            StmtDecl::Try {
                body,
                catches,
                finally,
            } => {
                let body = self.block(body);
                let mut catch_locals = Vec::new();
                let mut catch_bodies = Vec::new();
                for catch in catches {
                    self.scopes.push(FxHashMap::default());
                    let ty = self.resolve_type(&catch.ty);
                    if let Some(local) = self.declare_local(&catch.name, ty) {
                        catch_locals.push(local);
                        catch_bodies.push(self.block(&catch.body));
                    }
                    self.scopes.pop();
                }
                NodeKind::Try {
                    body,
                    catch_locals,
                    catch_bodies,
                    finally: finally.as_ref().map(|f| self.block(f)),
                }
            }
            StmtDecl::Empty => NodeKind::Empty,
        };
        self.program.add_node(kind, Type::Void, Span::dummy())
    }

    // ---- expressions -------------------------------------------------

    fn expr(&mut self, expr: &ExprDecl) -> NodeId {
        match expr {
            ExprDecl::Null => self.program.null_literal(),
            ExprDecl::Bool { value } => self.program.bool_literal(*value),
            ExprDecl::Int { value } => self.program.int_literal(*value),
            ExprDecl::Long { value } => self.program.long_literal(*value),
            ExprDecl::Double { value } => self.program.literal(Literal::Double(*value)),
            ExprDecl::String { value } => self.program.string_literal(value.clone()),
            ExprDecl::Local { name } => match self.lookup_local(name) {
                Some(local) => self.program.local_ref(local),
                None => {
                    self.error(format!("unknown local '{}'", name));
                    self.poisoned()
                }
            },
            ExprDecl::Field { name, instance } => self.field(name, instance.as_deref()),
            ExprDecl::This => self.this(),
            ExprDecl::Call {
                method,
                instance,
                args,
            } => self.call(method, instance.as_deref(), args),
            ExprDecl::New { class, args } => self.new_instance(class, args),
            ExprDecl::Binary { op, lhs, rhs } => self.binary(op, lhs, rhs),
            ExprDecl::Unary { op, operand } => self.unary(*op, operand),
            ExprDecl::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.condition(cond);
                let mut then_expr = self.expr(then);
                let mut else_expr = self.expr(otherwise);
                let (then_ty, else_ty) = (self.ty(then_expr), self.ty(else_expr));
                let ty = if then_ty.is_numeric() && else_ty.is_numeric() {
                    let ty = Type::promote(&then_ty, &else_ty);
                    then_expr = self.coerce(then_expr, &ty);
                    else_expr = self.coerce(else_expr, &ty);
                    ty
                } else if then_ty == Type::Null {
                    else_ty
                } else {
                    then_ty
                };
                self.program.add_node(
                    NodeKind::Conditional {
                        cond,
                        then_expr,
                        else_expr,
                    },
                    ty,
                    Span::dummy(),
                )
            }
            ExprDecl::Cast { ty, expr } => {
                let target = self.resolve_type(ty);
                let expr = self.expr(expr);
                self.program.add_node(
                    NodeKind::Cast {
                        target: target.clone(),
                        expr,
                    },
                    target,
                    Span::dummy(),
                )
            }
            ExprDecl::InstanceOf { expr, ty } => {
                let test = self.resolve_type(ty);
                let expr = self.expr(expr);
                self.program
                    .add_node(NodeKind::InstanceOf { expr, test }, Type::Boolean, Span::dummy())
            }
            ExprDecl::Index { array, index } => {
                let array = self.expr(array);
                let index = self.expr(index);
                let index = self.coerce(index, &Type::Int);
                let element = match self.program.ty(array).element_type() {
                    Some(element) => element.clone(),
                    None => {
                        let found = self.program.type_name(self.program.ty(array));
                        self.error(format!("cannot index a value of type {}", found));
                        Type::Null
                    }
                };
                self.program
                    .add_node(NodeKind::ArrayRef { array, index }, element, Span::dummy())
            }
            ExprDecl::Length { array } => {
                let array = self.expr(array);
                if self.program.ty(array).element_type().is_none() {
                    self.error("length of a non-array value".to_string());
                }
                self.program
                    .add_node(NodeKind::ArrayLength(array), Type::Int, Span::dummy())
            }
            ExprDecl::Sequence { exprs } => {
                let exprs = exprs.iter().map(|e| self.expr(e)).collect();
                self.program.multi(exprs)
            }
        }
    }

    fn receiver_class(&self, instance: NodeId, member: &str) -> Option<TypeId> {
        match self.program.ty(instance) {
            Type::Class(class) => Some(*class),
            other => {
                let found = self.program.type_name(other);
                self.error(format!("cannot access '{}' on a value of type {}", member, found));
                None
            }
        }
    }

    fn field(&mut self, name: &str, instance: Option<&ExprDecl>) -> NodeId {
        if let Some(instance) = instance {
            let instance = self.expr(instance);
            let Some(class) = self.receiver_class(instance, name) else {
                return self.poisoned();
            };
            return match self.program.resolve_field(class, name) {
                Some(field) => self.program.field_ref(Some(instance), field),
                None => {
                    let owner = self.program.declared_type(class).name.clone();
                    self.error(format!("unknown field '{}' in {}", name, owner));
                    self.poisoned()
                }
            };
        }

        let (owner, member) = match name.split_once('.') {
            Some((ty, member)) => match self.program.find_type(ty) {
                Some(owner) => (owner, member),
                None => {
                    self.error(format!("unknown type '{}'", ty));
                    return self.poisoned();
                }
            },
            None => (self.owner, name),
        };
        let Some(field) = self.program.resolve_field(owner, member) else {
            self.error(format!("unknown field '{}'", name));
            return self.poisoned();
        };
        if self.program.field(field).is_static {
            self.program.field_ref(None, field)
        } else {
            let this = self.this();
            self.program.field_ref(Some(this), field)
        }
    }

    fn arguments(&mut self, method: MethodId, args: Vec<NodeId>) -> Vec<NodeId> {
        let params: Vec<Type> = self
            .program
            .method(method)
            .params
            .iter()
            .map(|p| self.program.local(*p).ty.clone())
            .collect();
        args.into_iter()
            .zip(params)
            .map(|(arg, param)| self.coerce(arg, &param))
            .collect()
    }

    fn call(&mut self, name: &str, instance: Option<&ExprDecl>, args: &[ExprDecl]) -> NodeId {
        let instance = instance.map(|i| self.expr(i));
        let args: Vec<NodeId> = args.iter().map(|a| self.expr(a)).collect();
        let arity = args.len();

        if let Some(instance) = instance {
            let Some(class) = self.receiver_class(instance, name) else {
                return self.poisoned();
            };
            let Some(method) = self.program.resolve_method(class, name, arity) else {
                let owner = self.program.declared_type(class).name.clone();
                self.error(format!("no method {}/{} in {}", name, arity, owner));
                return self.poisoned();
            };
            if self.program.method(method).is_static {
                self.error(format!("static method '{}' called through an instance", name));
            }
            let args = self.arguments(method, args);
            return self.program.call(Some(instance), method, args);
        }

        let (owner, member, qualified) = match name.split_once('.') {
            Some((ty, member)) => match self.program.find_type(ty) {
                Some(owner) => (owner, member, true),
                None => {
                    self.error(format!("unknown type '{}'", ty));
                    return self.poisoned();
                }
            },
            None => (self.owner, name, false),
        };
        let Some(method) = self.program.resolve_method(owner, member, arity) else {
            self.error(format!("no method {}/{}", name, arity));
            return self.poisoned();
        };
        let args = self.arguments(method, args);
        if self.program.method(method).is_static {
            return self.program.call(None, method, args);
        }
        if self.is_static || self.method.is_none() {
            self.error(format!(
                "instance method '{}' called from a static context",
                name
            ));
            return self.poisoned();
        }
        let this = self.this();
        let call = self.program.call(Some(this), method, args);
        // `Base.m()` from an instance method is a super call
        if qualified {
            if let NodeKind::MethodCall {
                static_dispatch, ..
            } = &mut self.program.node_mut(call).kind
            {
                *static_dispatch = true;
            }
        }
        call
    }

    fn new_instance(&mut self, class_name: &str, args: &[ExprDecl]) -> NodeId {
        let args: Vec<NodeId> = args.iter().map(|a| self.expr(a)).collect();
        let Some(class) = self.program.find_type(class_name) else {
            self.error(format!("unknown class '{}'", class_name));
            return self.poisoned();
        };
        let declared = self.program.declared_type(class);
        if declared.is_interface() || declared.is_abstract {
            self.error(format!("cannot instantiate abstract type {}", class_name));
        }
        let constructor = declared.methods.iter().copied().find(|m| {
            let method = self.program.method(*m);
            method.is_constructor && method.params.len() == args.len()
        });
        let Some(constructor) = constructor else {
            self.error(format!(
                "no constructor of {} takes {} argument(s)",
                class_name,
                args.len()
            ));
            return self.poisoned();
        };
        let args = self.arguments(constructor, args);
        self.program.add_node(
            NodeKind::New {
                class,
                constructor,
                args,
            },
            Type::Class(class),
            Span::dummy(),
        )
    }

    fn check_assignable_target(&self, target: NodeId, op: &str) {
        if !matches!(
            self.program.kind(target),
            NodeKind::LocalRef(_) | NodeKind::FieldRef { .. } | NodeKind::ArrayRef { .. }
        ) {
            self.error(format!("left side of '{}' is not assignable", op));
        }
    }

    fn shift_count(&mut self, count: NodeId) -> NodeId {
        if self.program.ty(count).is_long() {
            self.coerce(count, &Type::Int)
        } else {
            count
        }
    }

    fn binary(&mut self, symbol: &str, lhs: &ExprDecl, rhs: &ExprDecl) -> NodeId {
        let lhs = self.expr(lhs);
        let rhs = self.expr(rhs);
        let Some(op) = BinaryOp::from_symbol(symbol) else {
            self.error(format!("unknown operator '{}'", symbol));
            return self.poisoned();
        };
        let (lhs_ty, rhs_ty) = (self.ty(lhs), self.ty(rhs));

        if op.is_assignment() {
            self.check_assignable_target(lhs, symbol);
            let rhs = match op.without_assignment() {
                Some(arith) if arith.is_shift() => self.shift_count(rhs),
                Some(BinaryOp::Add) if lhs_ty == Type::String => rhs,
                _ => self.coerce(rhs, &lhs_ty),
            };
            return self.program.binary(op, lhs, rhs, lhs_ty);
        }

        let (lhs, rhs, ty) = match op {
            BinaryOp::And | BinaryOp::Or => (lhs, rhs, Type::Boolean),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Shru => {
                let ty = if lhs_ty.is_long() { Type::Long } else { Type::Int };
                let rhs = self.shift_count(rhs);
                (lhs, rhs, ty)
            }
            BinaryOp::Add if lhs_ty == Type::String || rhs_ty == Type::String => {
                (lhs, rhs, Type::String)
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor
                if lhs_ty == Type::Boolean =>
            {
                (lhs, rhs, Type::Boolean)
            }
            _ if lhs_ty.is_numeric() && rhs_ty.is_numeric() => {
                let promoted = Type::promote(&lhs_ty, &rhs_ty);
                let lhs = self.coerce(lhs, &promoted);
                let rhs = self.coerce(rhs, &promoted);
                let ty = if op.is_comparison() {
                    Type::Boolean
                } else {
                    promoted
                };
                (lhs, rhs, ty)
            }
            BinaryOp::Eq | BinaryOp::Ne => (lhs, rhs, Type::Boolean),
            _ => {
                self.error(format!(
                    "operator '{}' cannot be applied to {} and {}",
                    symbol,
                    self.program.type_name(&lhs_ty),
                    self.program.type_name(&rhs_ty)
                ));
                return self.poisoned();
            }
        };
        self.program.binary(op, lhs, rhs, ty)
    }

    fn unary(&mut self, op: UnaryOpDecl, operand: &ExprDecl) -> NodeId {
        let operand = self.expr(operand);
        let op = match op {
            UnaryOpDecl::Neg => UnaryOp::Neg,
            UnaryOpDecl::Not => UnaryOp::Not,
            UnaryOpDecl::BitNot => UnaryOp::BitNot,
            UnaryOpDecl::PreInc => UnaryOp::PreInc,
            UnaryOpDecl::PreDec => UnaryOp::PreDec,
            UnaryOpDecl::PostInc => UnaryOp::PostInc,
            UnaryOpDecl::PostDec => UnaryOp::PostDec,
        };
        if op.is_modifying() {
            self.check_assignable_target(operand, op.symbol());
        }
        let ty = match op {
            UnaryOp::Not => Type::Boolean,
            _ => self.ty(operand),
        };
        self.program.unary(op, operand, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnosticHandler;
    use crate::frontend::ProgramDecl;
    use indoc::indoc;

    fn load(yaml: &str) -> Program {
        let decl = ProgramDecl::from_yaml_str(yaml).unwrap();
        let handler = CollectingDiagnosticHandler::new();
        match load_program(&decl, &handler) {
            Ok(program) => program,
            Err(e) => panic!("{}: {:?}", e, handler.get_diagnostics()),
        }
    }

    fn method(program: &Program, qualified: &str) -> MethodId {
        let (ty, name) = qualified.split_once('.').unwrap();
        program
            .find_method(program.find_type(ty).unwrap(), name)
            .unwrap()
    }

    #[test]
    fn test_hierarchy_overrides_and_default_constructor() {
        let program = load(indoc! {"
            types:
              - name: Object
              - name: Shape
                kind: interface
                methods:
                  - {name: area, returnType: double}
              - name: Square
                interfaces: [Shape]
                methods:
                  - name: area
                    returnType: double
                    body: [{kind: return, value: {kind: double, value: 1.0}}]
        "});
        let object = program.find_type("Object").unwrap();
        let square = program.find_type("Square").unwrap();
        assert_eq!(program.object_type(), Some(object));
        assert_eq!(program.declared_type(square).super_class, Some(object));
        assert_eq!(
            program.method(method(&program, "Square.area")).overrides,
            vec![method(&program, "Shape.area")]
        );
        let constructor = method(&program, "Square.<init>");
        assert!(program.method(constructor).is_constructor);
        assert!(program.method(constructor).is_synthetic);
    }

    #[test]
    fn test_int_operand_is_widened_in_long_arithmetic() {
        let program = load(indoc! {"
            types:
              - name: Main
                methods:
                  - name: f
                    isStatic: true
                    params: [{name: x, type: long}]
                    returnType: long
                    body:
                      - kind: return
                        value:
                          kind: binary
                          op: '+'
                          lhs: {kind: local, name: x}
                          rhs: {kind: int, value: 1}
        "});
        let f = method(&program, "Main.f");
        let body = program.method(f).body.unwrap();
        let NodeKind::Return(Some(sum)) = *program.kind(program.kind(body).children()[0]) else {
            panic!("expected a return");
        };
        assert_eq!(program.ty(sum), &Type::Long);
        let NodeKind::Binary { rhs, .. } = *program.kind(sum) else {
            panic!("expected a binary expression");
        };
        assert!(matches!(
            program.kind(rhs),
            NodeKind::Cast { target: Type::Long, .. }
        ));
    }

    #[test]
    fn test_library_methods_are_indexed_and_entry_points_resolved() {
        let program = load(indoc! {"
            entryPoints: [Main.main]
            types:
              - name: StringLib
                isLibrary: true
                methods:
                  - name: equals
                    isStatic: true
                    returnType: boolean
                    params: [{name: a, type: String}, {name: b, type: String}]
                    native: {code: 'return a === b;'}
              - name: Main
                methods:
                  - {name: main, isStatic: true, body: []}
        "});
        assert_eq!(
            program.indexed_method("StringLib.equals").unwrap(),
            method(&program, "StringLib.equals")
        );
        assert_eq!(program.entry_methods(), &[method(&program, "Main.main")]);
    }

    #[test]
    fn test_implicit_this_and_super_call() {
        let program = load(indoc! {"
            types:
              - name: Base
                fields: [{name: count, type: int}]
                methods:
                  - {name: run, body: []}
              - name: Derived
                superClass: Base
                methods:
                  - name: run
                    body:
                      - {kind: expr, expr: {kind: call, method: Base.run}}
                      - kind: expr
                        expr:
                          kind: unary
                          op: postInc
                          operand: {kind: field, name: count}
        "});
        let run = method(&program, "Derived.run");
        let body = program.method(run).body.unwrap();
        let statements = program.kind(body).children();
        let NodeKind::ExprStmt(call) = *program.kind(statements[0]) else {
            panic!("expected an expression statement");
        };
        assert!(matches!(
            program.kind(call),
            NodeKind::MethodCall { instance: Some(_), static_dispatch: true, .. }
        ));
        let NodeKind::ExprStmt(inc) = *program.kind(statements[1]) else {
            panic!("expected an expression statement");
        };
        let NodeKind::Unary { operand, .. } = *program.kind(inc) else {
            panic!("expected an increment");
        };
        assert!(matches!(
            program.kind(operand),
            NodeKind::FieldRef { instance: Some(_), .. }
        ));
    }

    #[test]
    fn test_unresolved_names_are_batched() {
        let decl = ProgramDecl::from_yaml_str(indoc! {"
            entryPoints: [Main.missing]
            types:
              - name: Main
                superClass: Nowhere
                methods:
                  - name: main
                    isStatic: true
                    body:
                      - {kind: expr, expr: {kind: local, name: ghost}}
                      - {kind: expr, expr: {kind: call, method: vanish}}
        "})
        .unwrap();
        let handler = CollectingDiagnosticHandler::new();
        let err = load_program(&decl, &handler).unwrap_err();
        assert!(matches!(err, CompilationError::Semantic { errors: 4 }));
        let messages: Vec<String> = handler
            .get_diagnostics()
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert!(messages.iter().any(|m| m.contains("unknown local 'ghost'")));
        assert!(messages.iter().any(|m| m.contains("unknown entry point")));
    }

    #[test]
    fn test_cyclic_inheritance_is_reported() {
        let decl = ProgramDecl::from_yaml_str(indoc! {"
            types:
              - {name: A, superClass: B}
              - {name: B, superClass: A}
        "})
        .unwrap();
        let handler = CollectingDiagnosticHandler::new();
        assert!(load_program(&decl, &handler).is_err());
        assert!(handler
            .get_diagnostics()
            .iter()
            .any(|d| d.message.contains("cyclic inheritance")));
    }
}
