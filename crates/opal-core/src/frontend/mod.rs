//! Serde interchange form of a resolved program.
//!
//! A front end hands the optimizer a tree of declarations in JSON or YAML.
//! Names are plain strings here; [`load_program`] resolves them, infers
//! expression types and builds the arena [`Program`](crate::ast::Program).
//!
//! Type references use source spelling: `void`, `boolean`, `int`, `long`,
//! `double`, `String`, a declared type name, or any of those followed by
//! `[]`.

mod lower;

pub use lower::load_program;

use crate::errors::CompilationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgramDecl {
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    /// Qualified method names, e.g. `Main.main`
    #[serde(default)]
    pub entry_points: Vec<String>,
    /// Root of the class hierarchy. Defaults to a declared `Object` type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

impl ProgramDecl {
    pub fn from_json_str(text: &str) -> Result<Self, CompilationError> {
        serde_json::from_str(text).map_err(|e| CompilationError::Load(e.to_string()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CompilationError> {
        serde_yaml::from_str(text).map_err(|e| CompilationError::Load(e.to_string()))
    }

    /// Read a `.json`, `.yaml` or `.yml` file; other extensions are read as
    /// JSON
    pub fn from_file(path: &Path) -> Result<Self, CompilationError> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
        .map_err(|e| match e {
            CompilationError::Load(message) => {
                CompilationError::Load(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TypeKindDecl {
    #[default]
    Class,
    Interface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub kind: TypeKindDecl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_abstract: bool,
    /// Runtime support type; every method is indexed as `Type.method`
    #[serde(default)]
    pub is_library: bool,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<ExprDecl>,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default = "default_return_type")]
    pub return_type: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub is_constructor: bool,
    /// Statements of the body; absent for abstract and interface methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<StmtDecl>>,
    /// A body written in the target language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeDecl>,
    #[serde(default)]
    pub line: u32,
}

fn default_return_type() -> String {
    "void".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeDecl {
    pub code: String,
    /// Qualified names of methods the code calls
    #[serde(default)]
    pub methods: Vec<String>,
    /// Qualified names of fields the code reads or writes
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub body: Vec<StmtDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StmtDecl {
    Block {
        body: Vec<StmtDecl>,
    },
    Expr {
        expr: ExprDecl,
    },
    Local {
        name: String,
        #[serde(rename = "type")]
        ty: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<ExprDecl>,
    },
    If {
        cond: ExprDecl,
        then: Box<StmtDecl>,
        #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
        otherwise: Option<Box<StmtDecl>>,
    },
    While {
        cond: ExprDecl,
        body: Box<StmtDecl>,
    },
    For {
        #[serde(default)]
        init: Vec<StmtDecl>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cond: Option<ExprDecl>,
        #[serde(default)]
        update: Vec<ExprDecl>,
        body: Box<StmtDecl>,
    },
    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<ExprDecl>,
    },
    Break,
    Continue,
    Throw {
        value: ExprDecl,
    },
    Assert {
        cond: ExprDecl,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<ExprDecl>,
    },
    Try {
        body: Vec<StmtDecl>,
        #[serde(default)]
        catches: Vec<CatchDecl>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finally: Option<Vec<StmtDecl>>,
    },
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOpDecl {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExprDecl {
    Null,
    Bool {
        value: bool,
    },
    Int {
        value: i32,
    },
    Long {
        value: i64,
    },
    Double {
        value: f64,
    },
    String {
        value: String,
    },
    /// A local variable or parameter
    Local {
        name: String,
    },
    /// `Type.field` for statics, or a bare name resolved against the
    /// instance's class or the enclosing type
    Field {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance: Option<Box<ExprDecl>>,
    },
    This,
    /// `Type.method` for statics, or a bare name resolved by arity against
    /// the instance's class or the enclosing type
    Call {
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instance: Option<Box<ExprDecl>>,
        #[serde(default)]
        args: Vec<ExprDecl>,
    },
    New {
        class: String,
        #[serde(default)]
        args: Vec<ExprDecl>,
    },
    /// `op` is the source operator, e.g. `+`, `>>>=`, `==`
    Binary {
        op: String,
        lhs: Box<ExprDecl>,
        rhs: Box<ExprDecl>,
    },
    Unary {
        op: UnaryOpDecl,
        operand: Box<ExprDecl>,
    },
    Conditional {
        cond: Box<ExprDecl>,
        then: Box<ExprDecl>,
        #[serde(rename = "else")]
        otherwise: Box<ExprDecl>,
    },
    Cast {
        #[serde(rename = "type")]
        ty: String,
        expr: Box<ExprDecl>,
    },
    InstanceOf {
        expr: Box<ExprDecl>,
        #[serde(rename = "type")]
        ty: String,
    },
    Index {
        array: Box<ExprDecl>,
        index: Box<ExprDecl>,
    },
    Length {
        array: Box<ExprDecl>,
    },
    Sequence {
        exprs: Vec<ExprDecl>,
    },
}
