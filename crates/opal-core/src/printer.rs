//! Java-like rendering of a program for `--dump` and snapshot tests.
//!
//! The output is meant for reading, not for compiling: nested binary
//! operands are always parenthesized, native bodies appear as `/*-{ }-*/`
//! blocks, and a call that no longer dispatches dynamically is written
//! `receiver.Type.method(...)`.

use crate::ast::{FieldId, Literal, MethodId, NodeId, NodeKind, Program, Type, TypeId};

/// Render every type of the program in declaration order
pub fn print_program(program: &Program) -> String {
    let mut printer = Printer::new(program);
    for (i, ty) in program.types().iter().enumerate() {
        if i > 0 {
            printer.writeln("");
        }
        printer.print_type(*ty);
    }
    printer.output
}

/// Render one method, signature included
pub fn print_method(program: &Program, method: MethodId) -> String {
    let mut printer = Printer::new(program);
    printer.print_method(method);
    printer.output
}

/// Render a statement or expression subtree
pub fn print_node(program: &Program, node: NodeId) -> String {
    let mut printer = Printer::new(program);
    if program.kind(node).is_statement() {
        printer.print_statement(node);
        printer.output
    } else {
        printer.expr(node)
    }
}

struct Printer<'p> {
    program: &'p Program,
    output: String,
    indent_level: usize,
    indent_str: &'static str,
}

impl<'p> Printer<'p> {
    fn new(program: &'p Program) -> Self {
        Printer {
            program,
            output: String::new(),
            indent_level: 0,
            indent_str: "    ",
        }
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn writeln(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(self.indent_str);
        }
    }

    fn type_name(&self, ty: &Type) -> String {
        self.program.type_name(ty)
    }

    fn print_type(&mut self, ty: TypeId) {
        let declared = self.program.declared_type(ty);
        let mut header = String::new();
        if declared.is_library {
            header.push_str("/* library */ ");
        }
        if declared.is_interface() {
            header.push_str("interface ");
        } else {
            if declared.is_abstract {
                header.push_str("abstract ");
            }
            if declared.is_final {
                header.push_str("final ");
            }
            header.push_str("class ");
        }
        header.push_str(&declared.name);
        if let Some(parent) = declared.super_class {
            header.push_str(" extends ");
            header.push_str(&self.program.declared_type(parent).name);
        }
        if !declared.interfaces.is_empty() {
            let names: Vec<&str> = declared
                .interfaces
                .iter()
                .map(|i| self.program.declared_type(*i).name.as_str())
                .collect();
            header.push_str(if declared.is_interface() {
                " extends "
            } else {
                " implements "
            });
            header.push_str(&names.join(", "));
        }
        header.push_str(" {");
        self.writeln(&header);

        self.indent();
        for field in declared.fields.clone() {
            self.print_field(field);
        }
        for (i, method) in declared.methods.iter().copied().enumerate() {
            if i > 0 || !declared.fields.is_empty() {
                self.writeln("");
            }
            self.print_method(method);
        }
        self.dedent();
        self.writeln("}");
    }

    fn print_field(&mut self, field: FieldId) {
        let declared = self.program.field(field);
        self.write_indent();
        if declared.is_static {
            self.write("static ");
        }
        if declared.is_final {
            self.write("final ");
        }
        let ty = self.type_name(&declared.ty);
        self.write(&format!("{} {}", ty, declared.name));
        if let Some(init) = declared.initializer {
            let init = self.expr(init);
            self.write(&format!(" = {}", init));
        }
        self.writeln(";");
    }

    fn print_method(&mut self, method: MethodId) {
        let declared = self.program.method(method);
        self.write_indent();
        if declared.is_synthetic {
            self.write("/* synthetic */ ");
        }
        if declared.is_static {
            self.write("static ");
        }
        if declared.is_final {
            self.write("final ");
        }
        if declared.is_abstract() {
            self.write("abstract ");
        }
        let owner = &self.program.declared_type(declared.enclosing).name;
        if declared.is_constructor {
            self.write(owner);
        } else {
            let ret = self.type_name(&declared.return_type);
            self.write(&format!("{} {}", ret, declared.name));
        }
        let params: Vec<String> = declared
            .params
            .iter()
            .map(|p| {
                let local = self.program.local(*p);
                format!("{} {}", self.type_name(&local.ty), local.name)
            })
            .collect();
        self.write(&format!("({})", params.join(", ")));
        match declared.body {
            Some(body) => {
                self.write(" ");
                self.print_block_inline(body);
                self.writeln("");
            }
            None => self.writeln(";"),
        }
    }

    /// Write a statement that continues the current line, opening a brace
    /// on it
    fn print_block_inline(&mut self, body: NodeId) {
        match self.program.kind(body) {
            NodeKind::Block(statements) => {
                let statements = statements.clone();
                if statements.is_empty() {
                    self.write("{ }");
                    return;
                }
                self.writeln("{");
                self.indent();
                for statement in statements {
                    self.print_statement(statement);
                }
                self.dedent();
                self.write_indent();
                self.write("}");
            }
            // Single statement branches are braced like blocks
            _ => {
                self.writeln("{");
                self.indent();
                self.print_statement(body);
                self.dedent();
                self.write_indent();
                self.write("}");
            }
        }
    }

    fn print_statement(&mut self, statement: NodeId) {
        let kind = self.program.kind(statement).clone();
        match kind {
            NodeKind::Block(_) => {
                self.write_indent();
                self.print_block_inline(statement);
                self.writeln("");
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(cond);
                self.write_indent();
                self.write(&format!("if ({}) ", cond));
                self.print_block_inline(then_branch);
                if let Some(else_branch) = else_branch {
                    self.write(" else ");
                    self.print_block_inline(else_branch);
                }
                self.writeln("");
            }
            NodeKind::While { cond, body } => {
                let cond = self.expr(cond);
                self.write_indent();
                self.write(&format!("while ({}) ", cond));
                self.print_block_inline(body);
                self.writeln("");
            }
            NodeKind::For {
                init,
                cond,
                update,
                body,
            } => {
                let init: Vec<String> = init.iter().map(|s| self.simple_statement(*s)).collect();
                let cond = cond.map(|c| self.expr(c)).unwrap_or_default();
                let update: Vec<String> = update.iter().map(|e| self.expr(*e)).collect();
                self.write_indent();
                self.write(&format!(
                    "for ({}; {}; {}) ",
                    init.join(", "),
                    cond,
                    update.join(", ")
                ));
                self.print_block_inline(body);
                self.writeln("");
            }
            NodeKind::Try {
                body,
                catch_locals,
                catch_bodies,
                finally,
            } => {
                self.write_indent();
                self.write("try ");
                self.print_block_inline(body);
                for (local, catch_body) in catch_locals.iter().zip(catch_bodies) {
                    let local = self.program.local(*local);
                    let header = format!(" catch ({} {}) ", self.type_name(&local.ty), local.name);
                    self.write(&header);
                    self.print_block_inline(catch_body);
                }
                if let Some(finally) = finally {
                    self.write(" finally ");
                    self.print_block_inline(finally);
                }
                self.writeln("");
            }
            NodeKind::NativeBlock(native) => {
                self.write_indent();
                self.writeln(&format!("/*-{{ {} }}-*/;", native.code.trim()));
            }
            _ => {
                let line = self.simple_statement(statement);
                self.write_indent();
                self.writeln(&format!("{};", line));
            }
        }
    }

    /// Statements that fit on one line, without the trailing semicolon
    fn simple_statement(&self, statement: NodeId) -> String {
        match self.program.kind(statement) {
            NodeKind::ExprStmt(expr) => self.expr(*expr),
            NodeKind::LocalDecl { local, init } => {
                let local = self.program.local(*local);
                let decl = format!("{} {}", self.type_name(&local.ty), local.name);
                match init {
                    Some(init) => format!("{} = {}", decl, self.expr(*init)),
                    None => decl,
                }
            }
            NodeKind::Return(Some(value)) => format!("return {}", self.expr(*value)),
            NodeKind::Return(None) => "return".to_string(),
            NodeKind::Break => "break".to_string(),
            NodeKind::Continue => "continue".to_string(),
            NodeKind::Throw(value) => format!("throw {}", self.expr(*value)),
            NodeKind::Assert {
                cond,
                message: Some(message),
            } => format!("assert {} : {}", self.expr(*cond), self.expr(*message)),
            NodeKind::Assert {
                cond,
                message: None,
            } => format!("assert {}", self.expr(*cond)),
            NodeKind::Empty => String::new(),
            other => format!("/* {:?} */", other.category()),
        }
    }

    /// An operand of a larger expression
    fn operand(&self, node: NodeId) -> String {
        let text = self.expr(node);
        match self.program.kind(node) {
            NodeKind::Binary { .. } | NodeKind::Conditional { .. } | NodeKind::InstanceOf { .. } => {
                format!("({})", text)
            }
            _ => text,
        }
    }

    fn args(&self, args: &[NodeId]) -> String {
        let args: Vec<String> = args.iter().map(|a| self.expr(*a)).collect();
        args.join(", ")
    }

    fn expr(&self, node: NodeId) -> String {
        let program = self.program;
        match program.kind(node) {
            NodeKind::Literal(literal) => match literal {
                Literal::Null => "null".to_string(),
                Literal::Boolean(value) => value.to_string(),
                Literal::Int(value) => value.to_string(),
                Literal::Long(value) => format!("{}L", value),
                Literal::Double(value) => format!("{:?}", value),
                Literal::String(value) => format!("{:?}", value),
            },
            NodeKind::LocalRef(local) => program.local(*local).name.clone(),
            NodeKind::FieldRef { instance, field } => {
                let name = &program.field(*field).name;
                match instance {
                    Some(instance) => format!("{}.{}", self.operand(*instance), name),
                    None => program.qualified_field_name(*field),
                }
            }
            NodeKind::This => "this".to_string(),
            NodeKind::MethodCall {
                instance,
                method,
                args,
                static_dispatch,
            } => {
                let args = self.args(args);
                match instance {
                    Some(instance) if *static_dispatch => format!(
                        "{}.{}({})",
                        self.operand(*instance),
                        program.qualified_method_name(*method),
                        args
                    ),
                    Some(instance) => format!(
                        "{}.{}({})",
                        self.operand(*instance),
                        program.method(*method).name,
                        args
                    ),
                    None => format!("{}({})", program.qualified_method_name(*method), args),
                }
            }
            NodeKind::New { class, args, .. } => format!(
                "new {}({})",
                program.declared_type(*class).name,
                self.args(args)
            ),
            NodeKind::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.operand(*lhs), op.symbol(), self.operand(*rhs))
            }
            NodeKind::Unary { op, operand } => {
                let operand = self.operand(*operand);
                if op.is_postfix() {
                    format!("{}{}", operand, op.symbol())
                } else {
                    format!("{}{}", op.symbol(), operand)
                }
            }
            NodeKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => format!(
                "{} ? {} : {}",
                self.operand(*cond),
                self.operand(*then_expr),
                self.operand(*else_expr)
            ),
            NodeKind::Cast { target, expr } => {
                format!("(({}) {})", self.type_name(target), self.operand(*expr))
            }
            NodeKind::InstanceOf { expr, test } => {
                format!("{} instanceof {}", self.operand(*expr), self.type_name(test))
            }
            NodeKind::ArrayRef { array, index } => {
                format!("{}[{}]", self.operand(*array), self.expr(*index))
            }
            NodeKind::ArrayLength(array) => format!("{}.length", self.operand(*array)),
            NodeKind::Multi(exprs) => format!("({})", self.args(exprs)),
            other => format!("/* {:?} */", other.category()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, DeclaredType, Method, TypeKind, UnaryOp};

    #[test]
    fn test_nested_operands_are_parenthesized() {
        let mut program = Program::new();
        let a = program.int_literal(1);
        let b = program.int_literal(2);
        let sum = program.binary(BinaryOp::Add, a, b, Type::Int);
        let c = program.int_literal(3);
        let product = program.binary(BinaryOp::Mul, sum, c, Type::Int);
        assert_eq!(print_node(&program, product), "(1 + 2) * 3");

        let neg = program.unary(UnaryOp::Neg, product, Type::Int);
        assert_eq!(print_node(&program, neg), "-((1 + 2) * 3)");
    }

    #[test]
    fn test_literals() {
        let mut program = Program::new();
        let long = program.long_literal(-4);
        let text = program.string_literal("a \"quoted\" word");
        let double = program.literal(Literal::Double(2.0));
        assert_eq!(print_node(&program, long), "-4L");
        assert_eq!(print_node(&program, text), r#""a \"quoted\" word""#);
        assert_eq!(print_node(&program, double), "2.0");
    }

    #[test]
    fn test_abstract_and_static_signatures() {
        let mut program = Program::new();
        let ty = program.add_type(DeclaredType::new("Shape", TypeKind::Class));
        let area = program.add_method(ty, Method::new("area", ty, Type::Double));
        let mut make = Method::new("make", ty, Type::Class(ty));
        make.is_static = true;
        make.body = Some(program.block(Vec::new()));
        let make = program.add_method(ty, make);
        program.add_param(make, "size", Type::Int);

        assert_eq!(print_method(&program, area), "abstract double area();\n");
        assert_eq!(
            print_method(&program, make),
            "static Shape make(int size) { }\n"
        );
    }
}
