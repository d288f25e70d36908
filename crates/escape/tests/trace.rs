use escflow::{escapes_with_observer, EscapeConfig, EscapeTrace};
use escflow_ir::{ProgramBuilder, Signature, Type};

#[test]
fn identity() {
    let mut pb = ProgramBuilder::new();
    let t = pb.declare_struct("T", &[("name", Type::String)]);
    let p_t = pb.ptr_type(t);
    let id = pb.declare_func(Signature::new("id").param("p", p_t).result(p_t));
    pb.define(id, |fb| {
        let p = fb.param(0);
        fb.ret(&[p]);
    });

    let mut program = pb.build();
    let mut trace = EscapeTrace::new();
    escapes_with_observer(&mut program, &EscapeConfig::default(), &mut trace).unwrap();

    insta::assert_snapshot!(trace.render(), @r"
    group [id]
      flow ~r0 <- p
      walk ~r0 <- p level={0 0}
      tag id(p) esc:0x12
    ");
}

#[test]
fn scalars_are_not_traced() {
    let mut pb = ProgramBuilder::new();
    let add = pb.declare_func(
        Signature::new("add")
            .param("x", Type::I64)
            .param("y", Type::I64)
            .result(Type::I64),
    );
    pb.define(add, |fb| {
        let x = fb.param(0);
        let y = fb.param(1);
        let sum = fb.binary(escflow_ir::Op::Add, x, y);
        fb.ret(&[sum]);
    });

    let mut program = pb.build();
    let mut trace = EscapeTrace::new();
    escapes_with_observer(&mut program, &EscapeConfig::default(), &mut trace).unwrap();

    insta::assert_snapshot!(trace.render(), @"group [add]");
}

#[test]
fn empty_program() {
    let mut program = ProgramBuilder::new().build();
    let mut trace = EscapeTrace::new();
    escapes_with_observer(&mut program, &EscapeConfig::default(), &mut trace).unwrap();

    insta::assert_snapshot!(trace.render(), @"<no groups>");
}
