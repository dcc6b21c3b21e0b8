//! End-to-end runs through the public API.

use aex::analysis::absint::{AbstractInterpretation, AeOptions};
use aex::analysis::core::domain::IntervalValue;
use aex::analysis::Analysis;
use aex::ir::{
    BinOp, BinaryOpStmt, BranchStmt, CmpStmt, GepIdx, GepStmt, IrBuilder, PhiStmt, Predicate,
    Stmt, ValType,
};

/// i = 0; while (i < n) ++i; with a gep past its base object thrown in,
/// run with statistics and a bug-report file.
#[test]
fn full_run_reports_stats_and_bugs() {
    let mut b = IrBuilder::new();
    let f = b.add_fun("main");

    let init = b.add_node(f);
    let head = b.add_node(f);
    let body = b.add_node(f);
    let after = b.add_node(f);
    b.edge(b.fun_entry(f), init);
    b.edge(init, head);
    b.edge(body, head);

    let zero = b.const_int(init, 0, ValType::i32());
    let one = b.const_int(init, 1, ValType::i32());
    let ten = b.const_int(init, 10, ValType::i32());
    let i = b.new_var(ValType::i32());
    let i_next = b.new_var(ValType::i32());
    let c = b.new_var(ValType::i32());
    b.stmt(head, Stmt::Phi(PhiStmt { res: i, ops: vec![(zero, init), (i_next, body)] }));
    b.stmt(head, Stmt::Cmp(CmpStmt { res: c, op0: i, op1: ten, predicate: Predicate::Lt }));
    b.stmt(head, Stmt::Branch(BranchStmt { cond: c }));
    b.cond_edge(head, body, c, 1);
    b.cond_edge(head, after, c, 0);
    b.stmt(body, Stmt::BinaryOp(BinaryOpStmt { res: i_next, op0: i, op1: one, op: BinOp::Add }));

    // An eight-past-the-end gep on a small buffer.
    let obj = b.new_obj(ValType::array_of(ValType::i8(), 4));
    let p = b.addr_of(after, obj);
    let oob = b.new_var(ValType::ptr_to(ValType::i8()));
    b.stmt(after, Stmt::Gep(GepStmt { lhs: oob, rhs: p, offsets: vec![(GepIdx::Const(8), 1)] }));
    b.edge(after, b.fun_exit(f));

    let ir = b.finish();
    let report = std::env::temp_dir().join("aex-report.txt");
    let opts = AeOptions {
        p_stat: true,
        output_name: report.to_string_lossy().into_owned(),
        ..AeOptions::default()
    };
    let mut ae = AbstractInterpretation::new(&ir, opts).unwrap();
    ae.run().unwrap();

    assert_eq!(ae.state_at(after).unwrap().interval_of(i), IntervalValue::singleton(10));
    assert_eq!(ae.bug_records().len(), 1);
    assert!(ae.stat().blocks_visited() > 0);
    assert_eq!(ae.stat().counts()["Bug_Num"], 1);

    let written = std::fs::read_to_string(&report).unwrap();
    assert!(written.contains("Full Overflow (1 found)"));
    let _ = std::fs::remove_file(&report);

    // The engine can be reset and rerun to the same result.
    ae.reset();
    ae.run().unwrap();
    assert_eq!(ae.state_at(after).unwrap().interval_of(i), IntervalValue::singleton(10));
}

/// Missing extern-API artifact paths are a startup error.
#[test]
fn configured_ext_api_path_must_exist() {
    let mut b = IrBuilder::new();
    let f = b.add_fun("main");
    let n = b.add_node(f);
    b.edge(b.fun_entry(f), n);
    b.edge(n, b.fun_exit(f));
    let ir = b.finish();

    let opts = AeOptions { ext_api_path: "/no/such/extapi.json".to_string(), ..Default::default() };
    assert!(AbstractInterpretation::new(&ir, opts).is_err());
}
