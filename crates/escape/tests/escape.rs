use escflow::{escapes, DebugLevel, DiagnosticKind, EscClass, EscapeConfig, EscapeError, EscapeInfo, FuncState};
use escflow_ir::{FuncRef, NodeId, Op, Program, ProgramBuilder, Signature, Type};

/// A builder with `T struct { name string }` declared; returns `T` and `*T`.
fn builder() -> (ProgramBuilder, Type, Type) {
    let mut pb = ProgramBuilder::new();
    let t = pb.declare_struct("T", &[("name", Type::String)]);
    let p_t = pb.ptr_type(t);
    (pb, t, p_t)
}

fn analyze(pb: ProgramBuilder) -> (Program, EscapeInfo) {
    let mut program = pb.build();
    let cfg = EscapeConfig::for_level(DebugLevel::Summary);
    let info = escapes(&mut program, &cfg).expect("analysis should succeed");
    (program, info)
}

fn note(program: &Program, func: FuncRef, idx: usize) -> Option<&str> {
    program.func(func).param_note(idx)
}

fn assert_reported(info: &EscapeInfo, message: &str) {
    assert!(
        info.report().contains(message),
        "missing `{message}` in\n{}",
        info.report()
    );
}

#[test]
fn parameter_tags() {
    let (mut pb, _, p_t) = builder();
    let pp_t = pb.ptr_type(p_t);
    let ppp_t = pb.ptr_type(pp_t);
    let sink = pb.declare_global("sink", p_t);

    let id = pb.declare_func(Signature::new("id").param("p", p_t).result(p_t));
    pb.define(id, |fb| {
        let p = fb.param(0);
        fb.ret(&[p]);
    });

    let leak = pb.declare_func(Signature::new("leak").param("p", p_t));
    pb.define(leak, |fb| {
        let p = fb.param(0);
        fb.assign(sink, p);
    });

    let deref = pb.declare_func(Signature::new("deref").param("p", pp_t).result(p_t));
    pb.define(deref, |fb| {
        let p = fb.param(0);
        let x = fb.ind(p);
        fb.ret(&[x]);
    });

    let deep = pb.declare_func(Signature::new("deep").param("p", ppp_t).result(p_t));
    pb.define(deep, |fb| {
        let p = fb.param(0);
        let x = fb.ind(p);
        let y = fb.ind(x);
        fb.ret(&[y]);
    });

    let content = pb.declare_func(Signature::new("content").param("p", pp_t));
    pb.define(content, |fb| {
        let p = fb.param(0);
        let x = fb.ind(p);
        fb.assign(sink, x);
    });

    let noflow = pb.declare_func(Signature::new("noflow").param("p", p_t));
    pb.define(noflow, |_| {});

    let (program, info) = analyze(pb);

    assert_eq!(note(&program, id, 0), Some("esc:0x12"));
    assert_eq!(note(&program, leak, 0), None);
    assert_eq!(note(&program, deref, 0), Some("esc:0x22"));
    assert_eq!(note(&program, deep, 0), Some("esc:0x32"));
    assert_eq!(note(&program, content, 0), Some("esc:0x9"));
    assert_eq!(note(&program, noflow, 0), Some("esc:0x1"));

    assert_eq!(info.param_tag(&program, leak, 0), EscClass::Unknown.bits());
    assert_eq!(info.param_tag(&program, deep, 0), 0x32);

    assert_reported(&info, "leaking param: p to result ~r0 level=0");
    assert_reported(&info, "leaking param: p to result ~r0 level=1");
    assert_reported(&info, "leaking param: p");
    assert_reported(&info, "leaking param content: p");
    assert_reported(&info, "noflow p does not escape");

    for func in [id, leak, deref, deep, content, noflow] {
        assert_eq!(info.func_state(func), FuncState::Tagged);
    }
}

#[test]
fn address_of_local_stored_in_global() {
    let (mut pb, t, p_t) = builder();
    let sink = pb.declare_global("sink", p_t);

    let func = pb.declare_func(Signature::new("publish"));
    let mut nodes = None;
    pb.define(func, |fb| {
        let x = fb.local("x", t);
        let addr = fb.addr(x);
        fb.assign(sink, addr);
        nodes = Some((x, addr));
    });
    let (x, addr) = nodes.unwrap();

    let (_, info) = analyze(pb);
    assert!(info.is_moved_to_heap(x));
    assert!(info.escapes_to_heap(addr));
    assert_eq!(info.moved_to_heap().collect::<Vec<_>>(), vec![x]);
    assert_reported(&info, "moved to heap: x");
    assert_reported(&info, "&x escapes to heap");
}

#[test]
fn returned_address_of_local() {
    let (mut pb, t, p_t) = builder();
    let func = pb.declare_func(Signature::new("fresh").result(p_t));
    let mut var = None;
    pb.define(func, |fb| {
        let x = fb.local("x", t);
        let addr = fb.addr(x);
        fb.ret(&[addr]);
        var = Some(x);
    });

    let (_, info) = analyze(pb);
    assert!(info.is_moved_to_heap(var.unwrap()));
}

#[test]
fn local_allocation_does_not_escape() {
    let (mut pb, t, p_t) = builder();
    let func = pb.declare_func(Signature::new("scratch"));
    let mut alloc = None;
    pb.define(func, |fb| {
        let p = fb.local("p", p_t);
        let new = fb.new_(t);
        fb.assign(p, new);
        alloc = Some(new);
    });
    let alloc = alloc.unwrap();

    let (_, info) = analyze(pb);
    assert_eq!(info.class_of(alloc), EscClass::None);
    assert_eq!(info.loopdepth_of(alloc), 1);
    assert_reported(&info, "scratch new(T) does not escape");
}

#[test]
fn address_taken_inside_loop() {
    let (mut pb, t, p_t) = builder();

    let inner = pb.declare_func(Signature::new("inner"));
    let mut inner_var = None;
    pb.define(inner, |fb| {
        let p = fb.local("p", p_t);
        fb.for_(None, |fb| {
            let x = fb.local("x", t);
            let addr = fb.addr(x);
            fb.assign(p, addr);
            inner_var = Some(x);
        });
    });

    let outer = pb.declare_func(Signature::new("outer"));
    let mut outer_var = None;
    pb.define(outer, |fb| {
        let p = fb.local("p", p_t);
        let x = fb.local("x", t);
        fb.for_(None, |fb| {
            let addr = fb.addr(x);
            fb.assign(p, addr);
        });
        outer_var = Some(x);
    });

    let (_, info) = analyze(pb);
    let inner_var = inner_var.unwrap();
    assert_eq!(info.loopdepth_of(inner_var), 2);
    assert!(info.is_moved_to_heap(inner_var));
    assert!(!info.is_moved_to_heap(outer_var.unwrap()));
}

#[test]
fn backward_goto_is_a_loop() {
    let (mut pb, t, p_t) = builder();

    let backward = pb.declare_func(Signature::new("backward"));
    let mut backward_var = None;
    pb.define(backward, |fb| {
        let p = fb.local("p", p_t);
        fb.label("again");
        let x = fb.local("x", t);
        let addr = fb.addr(x);
        fb.assign(p, addr);
        fb.goto("again");
        backward_var = Some(x);
    });

    let forward = pb.declare_func(Signature::new("forward"));
    let mut forward_var = None;
    pb.define(forward, |fb| {
        let p = fb.local("p", p_t);
        fb.goto("done");
        fb.label("done");
        let x = fb.local("x", t);
        let addr = fb.addr(x);
        fb.assign(p, addr);
        forward_var = Some(x);
    });

    let (_, info) = analyze(pb);
    assert!(info.is_moved_to_heap(backward_var.unwrap()));
    assert!(!info.is_moved_to_heap(forward_var.unwrap()));
}

#[test]
fn self_reslice_is_ignored() {
    let mut pb = ProgramBuilder::new();
    let bytes = pb.slice_type(Type::I8);
    let buf = pb.declare_struct("Buf", &[("buf", bytes)]);
    let p_buf = pb.ptr_type(buf);

    let reslice = pb.declare_func(Signature::new("reslice").param("b", p_buf));
    pb.define(reslice, |fb| {
        let b = fb.param(0);
        let dst = fb.dot_ptr(b, "buf");
        let field = fb.dot_ptr(b, "buf");
        let one = fb.int(1);
        let tail = fb.slice(field, Some(one), None);
        fb.assign(dst, tail);
    });

    let steal = pb.declare_func(
        Signature::new("steal")
            .param("b", p_buf)
            .param("other", p_buf),
    );
    pb.define(steal, |fb| {
        let b = fb.param(0);
        let other = fb.param(1);
        let dst = fb.dot_ptr(b, "buf");
        let field = fb.dot_ptr(other, "buf");
        let one = fb.int(1);
        let tail = fb.slice(field, Some(one), None);
        fb.assign(dst, tail);
    });

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, reslice, 0), Some("esc:0x1"));
    assert_eq!(note(&program, steal, 0), Some("esc:0x1"));
    assert_eq!(note(&program, steal, 1), Some("esc:0x9"));

    let ignored: Vec<_> = info
        .report()
        .of_kind(DiagnosticKind::IgnoredSelfAssignment)
        .map(|diag| diag.message.as_str())
        .collect();
    assert_eq!(ignored, ["reslice ignoring self-assignment to b.buf"]);
}

#[test]
fn map_store_loses_track() {
    let (mut pb, _, p_t) = builder();
    let map = pb.map_type(Type::String, p_t);
    let put = pb.declare_func(Signature::new("put").param("m", map).param("p", p_t));
    pb.define(put, |fb| {
        let m = fb.param(0);
        let p = fb.param(1);
        let key = fb.str("k");
        let slot = fb.index(m, key);
        fb.assign(slot, p);
    });

    let (program, _) = analyze(pb);
    assert_eq!(note(&program, put, 0), Some("esc:0x1"));
    assert_eq!(note(&program, put, 1), None);
}

#[test]
fn tags_of_imported_callee() {
    let (mut pb, _, p_t) = builder();
    let ident = pb.import_func(Signature::new("ident").param("p", p_t).result(p_t));
    pb.set_param_note(ident, 0, "esc:0x12");
    let opaque = pb.import_func(Signature::new("opaque").param("p", p_t));

    let wrap = pb.declare_func(Signature::new("wrap").param("p", p_t).result(p_t));
    pb.define(wrap, |fb| {
        let p = fb.param(0);
        let call = fb.call(ident, &[p]);
        fb.ret(&[call]);
    });

    let give = pb.declare_func(Signature::new("give").param("p", p_t));
    pb.define(give, |fb| {
        let p = fb.param(0);
        let call = fb.call(opaque, &[p]);
        fb.expr_stmt(call);
    });

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, wrap, 0), Some("esc:0x12"));
    assert_eq!(note(&program, give, 0), None);
    assert_eq!(info.func_state(ident), FuncState::Unknown);
}

#[test]
fn corrupt_tag_is_an_error() {
    let (mut pb, _, p_t) = builder();
    let ident = pb.import_func(Signature::new("ident").param("p", p_t).result(p_t));
    // Flow to a second output that does not exist.
    pb.set_param_note(ident, 0, "esc:0x92");

    let wrap = pb.declare_func(Signature::new("wrap").param("p", p_t));
    pb.define(wrap, |fb| {
        let p = fb.param(0);
        let call = fb.call(ident, &[p]);
        fb.expr_stmt(call);
    });

    let mut program = pb.build();
    let err = escapes(&mut program, &EscapeConfig::default()).unwrap_err();
    assert_eq!(
        err,
        EscapeError::CorruptTag {
            note: "esc:0x92".to_string()
        }
    );
}

#[test]
fn recursive_results_flow_to_sink() {
    let (mut pb, _, p_t) = builder();
    let even = pb.declare_func(
        Signature::new("even")
            .param("p", p_t)
            .param("n", Type::I64)
            .result(p_t),
    );
    let odd = pb.declare_func(
        Signature::new("odd")
            .param("p", p_t)
            .param("n", Type::I64)
            .result(p_t),
    );

    pb.define(even, |fb| {
        let p = fb.param(0);
        let n = fb.param(1);
        let zero = fb.int(0);
        let cond = fb.binary(Op::Ne, n, zero);
        fb.if_(
            cond,
            |fb| {
                let call = fb.call(odd, &[p, n]);
                fb.ret(&[call]);
            },
            |_| {},
        );
        fb.ret(&[p]);
    });
    pb.define(odd, |fb| {
        let p = fb.param(0);
        let n = fb.param(1);
        let call = fb.call(even, &[p, n]);
        fb.ret(&[call]);
    });

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, even, 0), None);
    assert_eq!(note(&program, odd, 0), None);
    // Scalars are never tagged.
    assert_eq!(note(&program, even, 1), None);
    assert_eq!(info.report().of_kind(DiagnosticKind::LeakingParam).count(), 2);
}

#[test]
fn variadic_arguments() {
    let (mut pb, _, p_t) = builder();
    let ptrs = pb.slice_type(p_t);
    let collect = pb.declare_func(Signature::new("collect").variadic("xs", ptrs));
    pb.define(collect, |_| {});

    let spread = pb.declare_func(Signature::new("spread").param("a", p_t).param("b", p_t));
    let mut call = None;
    pb.define(spread, |fb| {
        let a = fb.param(0);
        let b = fb.param(1);
        let c = fb.call(collect, &[a, b]);
        fb.expr_stmt(c);
        call = Some(c);
    });
    let call = call.unwrap();

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, collect, 0), Some("esc:0x1"));

    let ddd = program.nodes[call].right.expand().expect("`...` argument");
    let ddd_data = &program.nodes[ddd];
    assert_eq!(ddd_data.op, Op::DddArg);
    assert!(ddd_data.noescape);
    let array = ddd_data.ty.and_then(|ty| program.types.deref(ty)).unwrap();
    assert_eq!(program.types.array_def(array), Some((p_t, 2)));
    assert_eq!(info.class_of(ddd), EscClass::None);
    assert_reported(&info, "spread ... argument does not escape");

    // Stored into an array that is only read by the callee.
    assert_eq!(note(&program, spread, 0), Some("esc:0x1"));
    assert_eq!(note(&program, spread, 1), Some("esc:0x1"));
}

#[test]
fn variadic_arguments_stored_by_callee() {
    let (mut pb, _, p_t) = builder();
    let ptrs = pb.slice_type(p_t);
    let all = pb.declare_global("all", ptrs);
    let collect = pb.declare_func(Signature::new("collect").variadic("xs", ptrs));
    pb.define(collect, |_| {});
    let hoard = pb.declare_func(Signature::new("hoard").variadic("xs", ptrs));
    pb.define(hoard, |fb| {
        let xs = fb.param(0);
        fb.assign(all, xs);
    });

    let give = pb.declare_func(Signature::new("give").param("a", p_t).param("b", p_t));
    pb.define(give, |fb| {
        let a = fb.param(0);
        let b = fb.param(1);
        let call = fb.call(hoard, &[a, b]);
        fb.expr_stmt(call);
    });

    // An existing slice is passed as is.
    let fwd = pb.declare_func(Signature::new("fwd").param("xs", ptrs));
    pb.define(fwd, |fb| {
        let xs = fb.param(0);
        let call = fb.call_spread(collect, &[xs]);
        fb.expr_stmt(call);
    });
    let dump = pb.declare_func(Signature::new("dump").param("xs", ptrs));
    let mut spread_call = None;
    pb.define(dump, |fb| {
        let xs = fb.param(0);
        let call = fb.call_spread(hoard, &[xs]);
        fb.expr_stmt(call);
        spread_call = Some(call);
    });

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, hoard, 0), None);
    assert_eq!(note(&program, give, 0), None);
    assert_eq!(note(&program, give, 1), None);
    assert_reported(&info, "... argument escapes to heap");
    assert_reported(&info, "leaking param: a");
    assert_reported(&info, "leaking param: b");

    assert_eq!(note(&program, fwd, 0), Some("esc:0x1"));
    assert_eq!(note(&program, dump, 0), None);
    assert!(program.nodes[spread_call.unwrap()].right.expand().is_none());
}

#[test]
fn defer_and_go() {
    let (mut pb, _, p_t) = builder();
    let work = pb.declare_func(Signature::new("work").param("p", p_t));
    pb.define(work, |_| {});

    let later = pb.declare_func(Signature::new("later").param("p", p_t));
    pb.define(later, |fb| {
        let p = fb.param(0);
        let call = fb.call(work, &[p]);
        fb.defer(call);
    });

    let looped = pb.declare_func(Signature::new("looped").param("p", p_t));
    pb.define(looped, |fb| {
        let p = fb.param(0);
        fb.for_(None, |fb| {
            let call = fb.call(work, &[p]);
            fb.defer(call);
        });
    });

    let spawn = pb.declare_func(Signature::new("spawn").param("p", p_t));
    pb.define(spawn, |fb| {
        let p = fb.param(0);
        let call = fb.call(work, &[p]);
        fb.go(call);
    });

    let (program, _) = analyze(pb);
    assert_eq!(note(&program, later, 0), Some("esc:0x1"));
    assert_eq!(note(&program, looped, 0), None);
    assert_eq!(note(&program, spawn, 0), None);
}

#[test]
fn literal_argument_is_statement_local() {
    let (mut pb, t, p_t) = builder();
    let work = pb.declare_func(Signature::new("work").param("p", p_t));
    pb.define(work, |_| {});

    let lit = pb.declare_func(Signature::new("lit"));
    let mut ptr_lit = None;
    pb.define(lit, |fb| {
        let value = fb.struct_lit(t, &[]);
        let ptr = fb.ptr_lit(value);
        let call = fb.call(work, &[ptr]);
        fb.expr_stmt(call);
        ptr_lit = Some(ptr);
    });
    let ptr_lit = ptr_lit.unwrap();

    let (program, info) = analyze(pb);
    assert!(program.nodes[ptr_lit].noescape);
    assert_reported(&info, "lit &T literal does not escape");
}

#[test]
fn bodyless_functions() {
    let (mut pb, _, p_t) = builder();
    let clear = pb.declare_func(Signature::new("clear").param("p", p_t).param("n", Type::I64));
    pb.mark_noescape(clear);
    let unknown = pb.declare_func(Signature::new("unknown").param("p", p_t));

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, clear, 0), Some("esc:0x1"));
    assert_eq!(note(&program, clear, 1), None);
    assert_eq!(note(&program, unknown, 0), None);

    let p = program.func(unknown).params[0].name.expand().unwrap();
    assert_eq!(info.class_of(p), EscClass::Heap);
}

#[test]
fn interface_call_leaks_receiver_and_arguments() {
    let (mut pb, _, p_t) = builder();
    let iface = pb.iface_type("Sink");
    let method = pb.func_type(&[p_t], &[]);
    let dispatch = pb.declare_func(Signature::new("dispatch").param("s", iface).param("p", p_t));
    pb.define(dispatch, |fb| {
        let s = fb.param(0);
        let p = fb.param(1);
        let call = fb.call_inter(s, "Put", method, &[p]);
        fb.expr_stmt(call);
    });

    let (program, info) = analyze(pb);
    assert_eq!(note(&program, dispatch, 0), None);
    assert_eq!(note(&program, dispatch, 1), None);
    assert_reported(&info, "leaking param: s");
}

#[test]
fn captured_variable_stays_local() {
    let mut pb = ProgramBuilder::new();
    let outer = pb.declare_func(Signature::new("outer"));
    let mut nodes = None;
    pb.define(outer, |fb| {
        let x = fb.local("x", Type::I64);
        let lit = fb.closure(Signature::new(""), |cb| {
            let x = cb.capture(x, false);
            let one = cb.int(1);
            cb.assign(x, one);
        });
        let fn_ty = fb.ty_of(lit).unwrap();
        let f = fb.local("f", fn_ty);
        fb.assign(f, lit);
        let call = fb.call_value(f, &[]);
        fb.expr_stmt(call);
        nodes = Some((x, lit));
    });
    let (x, lit) = nodes.unwrap();

    let (_, info) = analyze(pb);
    assert!(!info.is_moved_to_heap(x));
    assert_eq!(info.class_of(lit), EscClass::None);
    assert_reported(&info, "outer func literal does not escape");
}

#[test]
fn returned_closure_moves_captures() {
    let mut pb = ProgramBuilder::new();
    let fn_ty = pb.func_type(&[], &[]);
    let make = pb.declare_func(Signature::new("counter").result(fn_ty));
    let mut nodes: Option<(NodeId, NodeId)> = None;
    pb.define(make, |fb| {
        let x = fb.local("x", Type::I64);
        let lit = fb.closure(Signature::new(""), |cb| {
            let x = cb.capture(x, false);
            let one = cb.int(1);
            cb.assign_op(x, Op::Add, one);
        });
        fb.ret(&[lit]);
        nodes = Some((x, lit));
    });
    let (x, lit) = nodes.unwrap();

    let (_, info) = analyze(pb);
    assert!(info.escapes_to_heap(lit));
    assert!(info.is_moved_to_heap(x));
    assert_reported(&info, "func literal escapes to heap");
    assert_reported(&info, "moved to heap: x");
}

#[test]
fn unexpected_destination() {
    let (mut pb, _, p_t) = builder();
    let func = pb.declare_func(Signature::new("bad").param("p", p_t));
    pb.define(func, |fb| {
        let p = fb.param(0);
        let one = fb.int(1);
        fb.assign(one, p);
    });

    let mut program = pb.build();
    let err = escapes(&mut program, &EscapeConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        EscapeError::UnexpectedDestination { op: Op::Literal, .. }
    ));
}

#[test]
fn too_many_return_values() {
    let (mut pb, _, p_t) = builder();
    let func = pb.declare_func(Signature::new("bad").param("p", p_t).result(p_t));
    pb.define(func, |fb| {
        let p = fb.param(0);
        fb.ret(&[p, p]);
    });

    let mut program = pb.build();
    let err = escapes(&mut program, &EscapeConfig::default()).unwrap_err();
    assert!(matches!(err, EscapeError::ReturnCountMismatch { .. }));
}

#[test]
fn quiet_config_reports_nothing() {
    let (mut pb, _, p_t) = builder();
    let sink = pb.declare_global("sink", p_t);
    let leak = pb.declare_func(Signature::new("leak").param("p", p_t));
    pb.define(leak, |fb| {
        let p = fb.param(0);
        fb.assign(sink, p);
    });

    let mut program = pb.build();
    let info = escapes(&mut program, &EscapeConfig::default()).unwrap();
    assert!(info.report().is_empty());
    assert_eq!(note(&program, leak, 0), None);
}
