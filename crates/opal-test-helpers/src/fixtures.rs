//! Interchange programs for tests, written in YAML

/// Runtime support types: `LongLib` with every entry point long emulation
/// calls, and `StringLib.equals`
pub const RUNTIME: &str = r#"
types:
  - name: LongLib
    isLibrary: true
    isFinal: true
    methods:
      - {name: add, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.add(b);"}}
      - {name: sub, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.sub(b);"}}
      - {name: mul, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.mul(b);"}}
      - {name: div, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.div(b);"}}
      - {name: rem, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.rem(b);"}}
      - {name: neg, isStatic: true, returnType: long, params: [{name: a, type: long}], native: {code: "return a.neg();"}}
      - {name: not, isStatic: true, returnType: long, params: [{name: a, type: long}], native: {code: "return a.not();"}}
      - {name: and, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.and(b);"}}
      - {name: or, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.or(b);"}}
      - {name: xor, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.xor(b);"}}
      - {name: shl, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: n, type: int}], native: {code: "return a.shl(n);"}}
      - {name: shr, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: n, type: int}], native: {code: "return a.shr(n);"}}
      - {name: shru, isStatic: true, returnType: long, params: [{name: a, type: long}, {name: n, type: int}], native: {code: "return a.shru(n);"}}
      - {name: eq, isStatic: true, returnType: boolean, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.eq(b);"}}
      - {name: ne, isStatic: true, returnType: boolean, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return !a.eq(b);"}}
      - {name: lt, isStatic: true, returnType: boolean, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.cmp(b) < 0;"}}
      - {name: le, isStatic: true, returnType: boolean, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.cmp(b) <= 0;"}}
      - {name: gt, isStatic: true, returnType: boolean, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.cmp(b) > 0;"}}
      - {name: ge, isStatic: true, returnType: boolean, params: [{name: a, type: long}, {name: b, type: long}], native: {code: "return a.cmp(b) >= 0;"}}
      - {name: fromInt, isStatic: true, returnType: long, params: [{name: i, type: int}], native: {code: "return Long.fromInt(i);"}}
      - {name: fromDouble, isStatic: true, returnType: long, params: [{name: d, type: double}], native: {code: "return Long.fromNumber(d);"}}
      - {name: toInt, isStatic: true, returnType: int, params: [{name: a, type: long}], native: {code: "return a.toInt();"}}
      - {name: toDouble, isStatic: true, returnType: double, params: [{name: a, type: long}], native: {code: "return a.toNumber();"}}
  - name: StringLib
    isLibrary: true
    isFinal: true
    methods:
      - {name: equals, isStatic: true, returnType: boolean, params: [{name: a, type: String}, {name: b, type: String}], native: {code: "return a === b;"}}
"#;

/// An interface with one implementor behind a call site, an upcast that
/// can be elided, and a method nothing calls
pub const SHAPES: &str = r#"
entryPoints: [Main.main]
types:
  - name: Object
  - name: Shape
    kind: interface
    methods:
      - {name: area, returnType: double}
  - name: Square
    interfaces: [Shape]
    fields:
      - {name: side, type: double}
    methods:
      - name: area
        returnType: double
        body:
          - kind: return
            value:
              kind: binary
              op: "*"
              lhs: {kind: field, name: side}
              rhs: {kind: field, name: side}
      - name: describe
        returnType: String
        body:
          - {kind: return, value: {kind: string, value: square}}
  - name: Main
    methods:
      - name: main
        isStatic: true
        returnType: double
        body:
          - kind: local
            name: s
            type: Shape
            init:
              kind: cast
              type: Shape
              expr: {kind: new, class: Square}
          - kind: return
            value: {kind: call, method: area, instance: {kind: local, name: s}}
"#;

/// Long arithmetic, a compound assignment and an increment
pub const LONGS: &str = r#"
entryPoints: [Main.main]
types:
  - name: Main
    fields:
      - {name: total, type: long, isStatic: true}
    methods:
      - name: main
        isStatic: true
        returnType: long
        body:
          - kind: local
            name: x
            type: long
            init: {kind: int, value: 40}
          - kind: expr
            expr:
              kind: binary
              op: "+="
              lhs: {kind: field, name: Main.total}
              rhs: {kind: local, name: x}
          - kind: expr
            expr: {kind: unary, op: postInc, operand: {kind: local, name: x}}
          - kind: return
            value:
              kind: binary
              op: "*"
              lhs: {kind: local, name: x}
              rhs: {kind: int, value: 2}
"#;

/// String comparisons, one against null
pub const STRINGS: &str = r#"
entryPoints: [Main.same]
types:
  - name: Main
    methods:
      - name: same
        isStatic: true
        returnType: boolean
        params: [{name: a, type: String}, {name: b, type: String}]
        body:
          - kind: if
            cond:
              kind: binary
              op: "=="
              lhs: {kind: local, name: a}
              rhs: {kind: "null"}
            then: {kind: return, value: {kind: bool, value: false}}
          - kind: return
            value:
              kind: binary
              op: "!="
              lhs: {kind: local, name: a}
              rhs: {kind: local, name: b}
"#;

/// Assertions, a loop and a try statement
pub const CONTROL_FLOW: &str = r#"
entryPoints: [Main.main]
types:
  - name: Main
    methods:
      - name: main
        isStatic: true
        returnType: int
        params: [{name: n, type: int}]
        body:
          - kind: assert
            cond: {kind: binary, op: ">=", lhs: {kind: local, name: n}, rhs: {kind: int, value: 0}}
            message: {kind: string, value: negative}
          - {kind: local, name: sum, type: int, init: {kind: int, value: 0}}
          - kind: for
            init: [{kind: local, name: i, type: int, init: {kind: int, value: 0}}]
            cond: {kind: binary, op: "<", lhs: {kind: local, name: i}, rhs: {kind: local, name: n}}
            update: [{kind: unary, op: postInc, operand: {kind: local, name: i}}]
            body:
              kind: expr
              expr: {kind: binary, op: "+=", lhs: {kind: local, name: sum}, rhs: {kind: local, name: i}}
          - kind: try
            body:
              - kind: if
                cond: {kind: binary, op: ">", lhs: {kind: local, name: sum}, rhs: {kind: int, value: 100}}
                then: {kind: throw, value: {kind: string, value: overflow}}
            catches:
              - name: e
                type: String
                body: [{kind: return, value: {kind: int, value: -1}}]
          - {kind: return, value: {kind: local, name: sum}}
"#;

/// A program with two unresolved names
pub const UNRESOLVED: &str = r#"
types:
  - name: Main
    methods:
      - name: main
        isStatic: true
        body:
          - {kind: expr, expr: {kind: call, method: missing}}
          - {kind: expr, expr: {kind: local, name: ghost}}
"#;
