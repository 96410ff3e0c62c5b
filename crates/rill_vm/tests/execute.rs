//! End-to-end runs: build a tree, resolve, generate, execute.

use rill_codegen::generate;
use rill_compiler::resolve;
use rill_syntax::{NodeKind, SyntaxTree, TreeBuilder};
use rill_vm::{execute, ExecError};

fn run(tree: &SyntaxTree, entry: &str, params: &[u8]) -> Vec<u8> {
    let resolved = resolve(tree).unwrap();
    assert!(
        resolved.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        resolved.diagnostics
    );
    let generated = generate(&resolved.program).unwrap();
    execute(&generated.bytecode, entry, params).unwrap()
}

fn as_int(bytes: &[u8]) -> i32 {
    i32::from_le_bytes(bytes[..4].try_into().unwrap())
}

#[test]
fn evaluates_folded_arithmetic() {
    let mut b = TreeBuilder::new();
    let two = b.const_int(2);
    let three = b.const_int(3);
    let four = b.const_int(4);
    let mul = b.op(NodeKind::Multiply);
    let plus = b.op(NodeKind::Plus);
    let e = b.expr(vec![two, three, four, mul, plus]);
    let r = b.ret(Some(e));
    let body = b.block(vec![r]);
    let f = b.function("main", &[], body);
    let tree = b.finish(vec![f]);

    assert_eq!(as_int(&run(&tree, "main", &[])), 14);
}

#[test]
fn mixes_locals_and_constants() {
    // x = 6; return x * 7 - 2
    let mut b = TreeBuilder::new();
    let decl = b.var_decl("x", "int");
    let x = b.designator(&["x"]);
    let six = b.const_int(6);
    let rhs = b.expr(vec![six]);
    let assign = b.assign(x, rhs);
    let x2 = b.designator(&["x"]);
    let seven = b.const_int(7);
    let mul = b.op(NodeKind::Multiply);
    let two = b.const_int(2);
    let minus = b.op(NodeKind::Minus);
    let e = b.expr(vec![x2, seven, mul, two, minus]);
    let r = b.ret(Some(e));
    let body = b.block(vec![decl, assign, r]);
    let f = b.function("main", &[], body);
    let tree = b.finish(vec![f]);

    assert_eq!(as_int(&run(&tree, "main", &[])), 40);
}

#[test]
fn while_loop_counts_up() {
    // x = 0 implicitly; while x != 5 { x++ }; return x
    let mut b = TreeBuilder::new();
    let decl = b.var_decl("x", "int");
    let x = b.designator(&["x"]);
    let five = b.const_int(5);
    let ne = b.op(NodeKind::NotEqual);
    let cond = b.expr(vec![x, five, ne]);
    let x2 = b.designator(&["x"]);
    let inc = b.node(NodeKind::Increment, vec![x2]);
    let w = b.node(NodeKind::While, vec![cond, inc]);
    let x3 = b.designator(&["x"]);
    let e = b.expr(vec![x3]);
    let r = b.ret(Some(e));
    let body = b.block(vec![decl, w, r]);
    let f = b.function("main", &[], body);
    let tree = b.finish(vec![f]);

    assert_eq!(as_int(&run(&tree, "main", &[])), 5);
}

#[test]
fn parameters_arrive_through_raw_bytes() {
    let mut b = TreeBuilder::new();
    let x = b.designator(&["x"]);
    let y = b.designator(&["y"]);
    let plus = b.op(NodeKind::Plus);
    let e = b.expr(vec![x, y, plus]);
    let r = b.ret(Some(e));
    let body = b.block(vec![r]);
    let add = b.function("add", &[("x", "int"), ("y", "int")], body);
    let tree = b.finish(vec![add]);

    let mut params = Vec::new();
    params.extend_from_slice(&3i32.to_le_bytes());
    params.extend_from_slice(&4i32.to_le_bytes());
    assert_eq!(as_int(&run(&tree, "add", &params)), 7);
}

#[test]
fn calls_pass_arguments_between_frames() {
    let mut b = TreeBuilder::new();
    let x = b.designator(&["x"]);
    let y = b.designator(&["y"]);
    let plus = b.op(NodeKind::Plus);
    let e = b.expr(vec![x, y, plus]);
    let r = b.ret(Some(e));
    let abody = b.block(vec![r]);
    let add = b.function("add", &[("x", "int"), ("y", "int")], abody);

    let three = b.const_int(3);
    let a1 = b.expr(vec![three]);
    let four = b.const_int(4);
    let a2 = b.expr(vec![four]);
    let call = b.call("add", vec![a1, a2]);
    let e = b.expr(vec![call]);
    let r = b.ret(Some(e));
    let mbody = b.block(vec![r]);
    let main = b.function("main", &[], mbody);
    let tree = b.finish(vec![main, add]); // callee declared after the caller

    assert_eq!(as_int(&run(&tree, "main", &[])), 7);
}

#[test]
fn dynamic_division_by_zero_yields_zero() {
    // x stays zero; return 10 / x
    let mut b = TreeBuilder::new();
    let decl = b.var_decl("x", "int");
    let ten = b.const_int(10);
    let x = b.designator(&["x"]);
    let div = b.op(NodeKind::Divide);
    let e = b.expr(vec![ten, x, div]);
    let r = b.ret(Some(e));
    let body = b.block(vec![decl, r]);
    let f = b.function("main", &[], body);
    let tree = b.finish(vec![f]);

    assert_eq!(as_int(&run(&tree, "main", &[])), 0);
}

#[test]
fn record_fields_work_with_the_type_declared_later() {
    // p.x = 3; p.y = 4; return p.x + p.y, with `point` defined after main
    let mut b = TreeBuilder::new();
    let decl = b.var_decl("p", "point");
    let px = b.designator(&["p", "x"]);
    let three = b.const_int(3);
    let e1 = b.expr(vec![three]);
    let a1 = b.assign(px, e1);
    let py = b.designator(&["p", "y"]);
    let four = b.const_int(4);
    let e2 = b.expr(vec![four]);
    let a2 = b.assign(py, e2);
    let px2 = b.designator(&["p", "x"]);
    let py2 = b.designator(&["p", "y"]);
    let plus = b.op(NodeKind::Plus);
    let e = b.expr(vec![px2, py2, plus]);
    let r = b.ret(Some(e));
    let body = b.block(vec![decl, a1, a2, r]);
    let main = b.function("main", &[], body);
    let point = b.type_def("point", &[("x", "int"), ("y", "int")]);
    let tree = b.finish(vec![main, point]);

    assert_eq!(as_int(&run(&tree, "main", &[])), 7);
}

#[test]
fn recursion_computes_fibonacci() {
    let mut b = TreeBuilder::new();

    // if (n == 0) { return 0 }
    let n = b.designator(&["n"]);
    let zero = b.const_int(0);
    let eq = b.op(NodeKind::Equals);
    let cond0 = b.expr(vec![n, zero, eq]);
    let z = b.const_int(0);
    let ez = b.expr(vec![z]);
    let rz = b.ret(Some(ez));
    let body0 = b.block(vec![rz]);
    let if0 = b.node(NodeKind::If, vec![cond0, body0]);

    // if (n == 1) { return 1 }
    let n1 = b.designator(&["n"]);
    let one = b.const_int(1);
    let eq1 = b.op(NodeKind::Equals);
    let cond1 = b.expr(vec![n1, one, eq1]);
    let o = b.const_int(1);
    let eo = b.expr(vec![o]);
    let ro = b.ret(Some(eo));
    let body1 = b.block(vec![ro]);
    let if1 = b.node(NodeKind::If, vec![cond1, body1]);

    // return fib(n - 1) + fib(n - 2)
    let na = b.designator(&["n"]);
    let c1 = b.const_int(1);
    let m1 = b.op(NodeKind::Minus);
    let arg1 = b.expr(vec![na, c1, m1]);
    let call1 = b.call("fib", vec![arg1]);
    let nb = b.designator(&["n"]);
    let c2 = b.const_int(2);
    let m2 = b.op(NodeKind::Minus);
    let arg2 = b.expr(vec![nb, c2, m2]);
    let call2 = b.call("fib", vec![arg2]);
    let plus = b.op(NodeKind::Plus);
    let e = b.expr(vec![call1, call2, plus]);
    let r = b.ret(Some(e));

    let fbody = b.block(vec![if0, if1, r]);
    let fib = b.function("fib", &[("n", "int")], fbody);

    let ten = b.const_int(10);
    let a = b.expr(vec![ten]);
    let call = b.call("fib", vec![a]);
    let e = b.expr(vec![call]);
    let r = b.ret(Some(e));
    let mbody = b.block(vec![r]);
    let main = b.function("main", &[], mbody);
    let tree = b.finish(vec![fib, main]);

    assert_eq!(as_int(&run(&tree, "main", &[])), 55);
}

#[test]
fn bool_parameters_select_a_branch() {
    // pick(flag bool, a int, b int): if (flag == true) { return a } return b
    let mut b = TreeBuilder::new();
    let flag = b.designator(&["flag"]);
    let t = b.const_bool(true);
    let eq = b.op(NodeKind::Equals);
    let cond = b.expr(vec![flag, t, eq]);
    let a = b.designator(&["a"]);
    let ea = b.expr(vec![a]);
    let ra = b.ret(Some(ea));
    let then = b.block(vec![ra]);
    let ifs = b.node(NodeKind::If, vec![cond, then]);
    let bd = b.designator(&["b"]);
    let eb = b.expr(vec![bd]);
    let rb = b.ret(Some(eb));
    let body = b.block(vec![ifs, rb]);
    let pick = b.function("pick", &[("flag", "bool"), ("a", "int"), ("b", "int")], body);
    let tree = b.finish(vec![pick]);

    let mut on = vec![1u8];
    on.extend_from_slice(&11i32.to_le_bytes());
    on.extend_from_slice(&22i32.to_le_bytes());
    assert_eq!(as_int(&run(&tree, "pick", &on)), 11);

    let mut off = vec![0u8];
    off.extend_from_slice(&11i32.to_le_bytes());
    off.extend_from_slice(&22i32.to_le_bytes());
    assert_eq!(as_int(&run(&tree, "pick", &off)), 22);
}

#[test]
fn parameter_survives_a_shadowing_declaration() {
    // `var x` collides with the parameter; it is reported, left inert,
    // and the reference still reads the caller's bytes
    let mut b = TreeBuilder::new();
    let decl = b.var_decl("x", "int");
    let x = b.designator(&["x"]);
    let e = b.expr(vec![x]);
    let r = b.ret(Some(e));
    let body = b.block(vec![decl, r]);
    let f = b.function("f", &[("x", "int")], body);
    let tree = b.finish(vec![f]);

    let resolved = resolve(&tree).unwrap();
    assert!(resolved
        .diagnostics
        .iter()
        .any(|d| d.message.contains("already defined")));
    let generated = generate(&resolved.program).unwrap();
    let result = execute(&generated.bytecode, "f", &9i32.to_le_bytes()).unwrap();
    assert_eq!(as_int(&result), 9);
}

#[test]
fn static_division_by_zero_still_runs() {
    let mut b = TreeBuilder::new();
    let one = b.const_int(1);
    let zero = b.const_int(0);
    let div = b.op(NodeKind::Divide);
    let e = b.expr(vec![one, zero, div]);
    let r = b.ret(Some(e));
    let body = b.block(vec![r]);
    let f = b.function("main", &[], body);
    let tree = b.finish(vec![f]);

    let resolved = resolve(&tree).unwrap();
    let generated = generate(&resolved.program).unwrap();
    assert!(!generated.diagnostics.is_empty());
    let result = execute(&generated.bytecode, "main", &[]).unwrap();
    assert_eq!(as_int(&result), 0);
}

#[test]
fn unknown_entry_point_is_an_error() {
    let mut b = TreeBuilder::new();
    let r = b.ret(None);
    let body = b.block(vec![r]);
    let f = b.function("main", &[], body);
    let tree = b.finish(vec![f]);

    let resolved = resolve(&tree).unwrap();
    let generated = generate(&resolved.program).unwrap();
    let err = execute(&generated.bytecode, "missing", &[]).unwrap_err();
    assert_eq!(err, ExecError::UnknownFunction("missing".to_string()));
}
