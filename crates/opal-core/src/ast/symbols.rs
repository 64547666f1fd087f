use super::{MethodId, Program};
use crate::errors::InternalError;
use crate::ice;

/// Runtime entry points used to emulate 64-bit integers on a target whose
/// numbers are doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongLibrary {
    pub add: MethodId,
    pub sub: MethodId,
    pub mul: MethodId,
    pub div: MethodId,
    pub rem: MethodId,
    pub neg: MethodId,
    pub not: MethodId,
    pub and: MethodId,
    pub or: MethodId,
    pub xor: MethodId,
    pub shl: MethodId,
    pub shr: MethodId,
    pub shru: MethodId,
    pub eq: MethodId,
    pub ne: MethodId,
    pub lt: MethodId,
    pub le: MethodId,
    pub gt: MethodId,
    pub ge: MethodId,
    pub from_int: MethodId,
    pub from_double: MethodId,
    pub to_int: MethodId,
    pub to_double: MethodId,
}

impl LongLibrary {
    fn resolve(program: &Program) -> Result<Self, InternalError> {
        let get = |name: &str| program.indexed_method(&format!("LongLib.{}", name));
        Ok(LongLibrary {
            add: get("add")?,
            sub: get("sub")?,
            mul: get("mul")?,
            div: get("div")?,
            rem: get("rem")?,
            neg: get("neg")?,
            not: get("not")?,
            and: get("and")?,
            or: get("or")?,
            xor: get("xor")?,
            shl: get("shl")?,
            shr: get("shr")?,
            shru: get("shru")?,
            eq: get("eq")?,
            ne: get("ne")?,
            lt: get("lt")?,
            le: get("le")?,
            gt: get("gt")?,
            ge: get("ge")?,
            from_int: get("fromInt")?,
            from_double: get("fromDouble")?,
            to_int: get("toInt")?,
            to_double: get("toDouble")?,
        })
    }
}

/// Well-known runtime methods, resolved once after loading and handed to
/// the passes that synthesize calls to them.
///
/// Programs that never use a feature need not ship its runtime support, so
/// each group is optional here and `require_*` turns a missing group into an
/// internal error at the point of use.
#[derive(Debug, Clone, Default)]
pub struct WellKnownSymbols {
    long_library: Option<LongLibrary>,
    string_equals: Option<MethodId>,
}

impl WellKnownSymbols {
    pub fn resolve(program: &Program) -> Self {
        WellKnownSymbols {
            long_library: LongLibrary::resolve(program).ok(),
            string_equals: program.indexed_method("StringLib.equals").ok(),
        }
    }

    pub fn long_library(&self) -> Option<&LongLibrary> {
        self.long_library.as_ref()
    }

    pub fn require_long_library(&self) -> Result<&LongLibrary, InternalError> {
        self.long_library
            .as_ref()
            .ok_or_else(|| ice!("long emulation requires the LongLib runtime methods"))
    }

    pub fn require_string_equals(&self) -> Result<MethodId, InternalError> {
        self.string_equals
            .ok_or_else(|| ice!("string equality requires StringLib.equals"))
    }
}
