use super::analyze;
use crate::analysis::core::domain::IntervalValue;
use crate::ir::{
    BinOp, BinaryOpStmt, BranchStmt, CmpStmt, IrBuilder, PhiStmt, Predicate, Stmt, ValType,
};

// int i = 0; while (i < 10) ++i; svf_assert(i == 10);
// Widening pushes the loop counter to [0, +oo); narrowing brings the head
// back to [0, 10] and the exit edge pins it to exactly 10.
#[test]
fn loop_widens_then_narrows_to_exact_exit() {
    let mut b = IrBuilder::new();
    let assert_fn = b.declare_fun("svf_assert", &[]);
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

    let a = b.new_var(ValType::i32());
    b.stmt(after, Stmt::Cmp(CmpStmt { res: a, op0: i, op1: ten, predicate: Predicate::Eq }));
    let (call, ret) = b.add_call(f, Some(assert_fn), vec![a], None);
    b.edge(after, call);
    b.edge(ret, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.expect("i == 10 must be entailed at the loop exit");

    let exit_state = ae.state_at(after).unwrap();
    assert_eq!(exit_state.interval_of(i), IntervalValue::singleton(10));
    // Inside the loop the counter never reaches 10.
    let body_state = ae.state_at(body).unwrap();
    assert_eq!(body_state.interval_of(i), IntervalValue::of(0, 9));
}

// A loop whose bound is unknown still terminates through widening and
// keeps the refined guard inside the body.
#[test]
fn unbounded_loop_terminates() {
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
    let n = b.new_var(ValType::i32());

    let i = b.new_var(ValType::i32());
    let i_next = b.new_var(ValType::i32());
    let c = b.new_var(ValType::i32());
    b.stmt(head, Stmt::Phi(PhiStmt { res: i, ops: vec![(zero, init), (i_next, body)] }));
    b.stmt(head, Stmt::Cmp(CmpStmt { res: c, op0: i, op1: n, predicate: Predicate::Lt }));
    b.stmt(head, Stmt::Branch(BranchStmt { cond: c }));
    b.cond_edge(head, body, c, 1);
    b.cond_edge(head, after, c, 0);
    b.stmt(body, Stmt::BinaryOp(BinaryOpStmt { res: i_next, op0: i, op1: one, op: BinOp::Add }));
    b.edge(after, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();
    // Terminated, and the trace covers every node of main.
    assert!(ae.state_at(after).is_some());
    // The visit count stays proportional to the node count times the
    // widening delay, not the (unbounded) concrete iteration space.
    assert!(ae.stat().blocks_visited() < ir.icfg.node_count() * 16);
    let body_state = ae.state_at(body).unwrap();
    assert!(body_state.interval_of(i).lb() >= crate::analysis::core::domain::Bound::Int(0));
}

// Nested loops: the inner cycle stabilizes inside each outer iteration.
#[test]
fn nested_loops_reach_fixpoint() {
    let mut b = IrBuilder::new();
    let f = b.add_fun("main");

    let init = b.add_node(f);
    let outer_head = b.add_node(f);
    let inner_head = b.add_node(f);
    let inner_body = b.add_node(f);
    let outer_latch = b.add_node(f);
    let after = b.add_node(f);
    b.edge(b.fun_entry(f), init);
    b.edge(init, outer_head);

    let zero = b.const_int(init, 0, ValType::i32());
    let one = b.const_int(init, 1, ValType::i32());
    let three = b.const_int(init, 3, ValType::i32());
    let five = b.const_int(init, 5, ValType::i32());

    let i = b.new_var(ValType::i32());
    let i_next = b.new_var(ValType::i32());
    let co = b.new_var(ValType::i32());
    b.stmt(outer_head, Stmt::Phi(PhiStmt { res: i, ops: vec![(zero, init), (i_next, outer_latch)] }));
    b.stmt(outer_head, Stmt::Cmp(CmpStmt { res: co, op0: i, op1: three, predicate: Predicate::Lt }));
    b.stmt(outer_head, Stmt::Branch(BranchStmt { cond: co }));
    b.cond_edge(outer_head, inner_head, co, 1);
    b.cond_edge(outer_head, after, co, 0);

    let j = b.new_var(ValType::i32());
    let j_next = b.new_var(ValType::i32());
    let ci = b.new_var(ValType::i32());
    b.stmt(inner_head, Stmt::Phi(PhiStmt { res: j, ops: vec![(zero, outer_head), (j_next, inner_body)] }));
    b.stmt(inner_head, Stmt::Cmp(CmpStmt { res: ci, op0: j, op1: five, predicate: Predicate::Lt }));
    b.stmt(inner_head, Stmt::Branch(BranchStmt { cond: ci }));
    b.cond_edge(inner_head, inner_body, ci, 1);
    b.cond_edge(inner_head, outer_latch, ci, 0);
    b.stmt(inner_body, Stmt::BinaryOp(BinaryOpStmt { res: j_next, op0: j, op1: one, op: BinOp::Add }));
    b.edge(inner_body, inner_head);

    b.stmt(outer_latch, Stmt::BinaryOp(BinaryOpStmt { res: i_next, op0: i, op1: one, op: BinOp::Add }));
    b.edge(outer_latch, outer_head);
    b.edge(after, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();
    let after_state = ae.state_at(after).unwrap();
    assert_eq!(after_state.interval_of(i), IntervalValue::of(3, 3));
    // The inner counter settles at its own exit bound.
    let latch_state = ae.state_at(outer_latch).unwrap();
    assert_eq!(latch_state.interval_of(j), IntervalValue::singleton(5));
}

// Re-running the engine over the same program yields the same trace.
#[test]
fn engine_is_deterministic() {
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
    let seven = b.const_int(init, 7, ValType::i32());
    let i = b.new_var(ValType::i32());
    let i_next = b.new_var(ValType::i32());
    let c = b.new_var(ValType::i32());
    b.stmt(head, Stmt::Phi(PhiStmt { res: i, ops: vec![(zero, init), (i_next, body)] }));
    b.stmt(head, Stmt::Cmp(CmpStmt { res: c, op0: i, op1: seven, predicate: Predicate::Lt }));
    b.stmt(head, Stmt::Branch(BranchStmt { cond: c }));
    b.cond_edge(head, body, c, 1);
    b.cond_edge(head, after, c, 0);
    b.stmt(body, Stmt::BinaryOp(BinaryOpStmt { res: i_next, op0: i, op1: one, op: BinOp::Add }));
    b.edge(after, b.fun_exit(f));
    let ir = b.finish();

    let (first, r1) = analyze(&ir);
    let (second, r2) = analyze(&ir);
    r1.unwrap();
    r2.unwrap();
    assert_eq!(first.trace().len(), second.trace().len());
    for (node, state) in first.trace() {
        assert_eq!(Some(state), second.state_at(*node), "trace differs at node {}", node);
    }
}
