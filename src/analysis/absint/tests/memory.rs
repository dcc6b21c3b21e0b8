use super::analyze;
use crate::analysis::core::domain::{Address, IntervalValue};
use crate::ir::{GepIdx, GepStmt, IrBuilder, Stmt, StoreStmt, ValType};

/// Store the byte constant `val` at `arr[idx]` through a fresh gep.
fn store_byte(b: &mut IrBuilder, node: usize, arr_ptr: u32, idx: i64, val: i64) {
    let elem = b.new_var(ValType::ptr_to(ValType::i8()));
    b.stmt(
        node,
        Stmt::Gep(GepStmt { lhs: elem, rhs: arr_ptr, offsets: vec![(GepIdx::Const(idx), 1)] }),
    );
    let v = b.const_int(node, val, ValType::i8());
    b.stmt(node, Stmt::Store(StoreStmt { lhs: elem, rhs: v }));
}

// char a[4] = {0}; char b[4] = {'A','B','C',0}; memcpy(a, b, 4);
// Afterwards a[0..2] contain 'A','B','C' and a[3] contains 0.
#[test]
fn memcpy_copies_element_wise() {
    let mut b = IrBuilder::new();
    let memcpy_fn = b.declare_fun("memcpy", &[]);
    let f = b.add_fun("main");
    let n1 = b.add_node(f);
    b.edge(b.fun_entry(f), n1);

    let obj_a = b.new_obj(ValType::array_of(ValType::i8(), 4));
    let obj_b = b.new_obj(ValType::array_of(ValType::i8(), 4));
    let pa = b.addr_of(n1, obj_a);
    let pb = b.addr_of(n1, obj_b);
    for i in 0..4 {
        store_byte(&mut b, n1, pa, i, 0);
    }
    for (i, ch) in [65, 66, 67, 0].into_iter().enumerate() {
        store_byte(&mut b, n1, pb, i as i64, ch);
    }
    let four = b.const_int(n1, 4, ValType::i32());
    let (call, ret) = b.add_call(f, Some(memcpy_fn), vec![pa, pb, four], None);
    b.edge(n1, call);
    b.edge(ret, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();

    let state = ae.state_at(call).unwrap();
    for (i, ch) in [65i64, 66, 67, 0].into_iter().enumerate() {
        let loaded = state.load(Address::new(obj_a, i as u32)).interval();
        assert!(
            loaded.contains(&IntervalValue::singleton(ch)),
            "a[{}] = {} should contain {}",
            i,
            loaded,
            ch
        );
    }
}

// strcpy scans the source for its terminator and copies it along.
#[test]
fn strcpy_copies_through_terminator() {
    let mut b = IrBuilder::new();
    let strcpy_fn = b.declare_fun("strcpy", &[]);
    let f = b.add_fun("main");
    let n1 = b.add_node(f);
    b.edge(b.fun_entry(f), n1);

    let obj_dst = b.new_obj(ValType::array_of(ValType::i8(), 8));
    let obj_src = b.new_obj(ValType::array_of(ValType::i8(), 8));
    let dst = b.addr_of(n1, obj_dst);
    let src = b.addr_of(n1, obj_src);
    for (i, ch) in [72, 73, 0].into_iter().enumerate() {
        store_byte(&mut b, n1, src, i as i64, ch);
    }
    let (call, ret) = b.add_call(f, Some(strcpy_fn), vec![dst, src], None);
    b.edge(n1, call);
    b.edge(ret, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();

    let state = ae.state_at(call).unwrap();
    assert_eq!(state.load(Address::new(obj_dst, 0)).interval(), IntervalValue::singleton(72));
    assert_eq!(state.load(Address::new(obj_dst, 1)).interval(), IntervalValue::singleton(73));
    assert_eq!(state.load(Address::new(obj_dst, 2)).interval(), IntervalValue::singleton(0));
    // Nothing beyond the terminator was written.
    assert!(state.load(Address::new(obj_dst, 3)).is_bottom());
}

// strcat appends after the destination's current length.
#[test]
fn strcat_appends_after_existing_contents() {
    let mut b = IrBuilder::new();
    let strcat_fn = b.declare_fun("strcat", &[]);
    let f = b.add_fun("main");
    let n1 = b.add_node(f);
    b.edge(b.fun_entry(f), n1);

    let obj_dst = b.new_obj(ValType::array_of(ValType::i8(), 8));
    let obj_src = b.new_obj(ValType::array_of(ValType::i8(), 8));
    let dst = b.addr_of(n1, obj_dst);
    let src = b.addr_of(n1, obj_src);
    for (i, ch) in [88, 0].into_iter().enumerate() {
        store_byte(&mut b, n1, dst, i as i64, ch);
    }
    for (i, ch) in [89, 0].into_iter().enumerate() {
        store_byte(&mut b, n1, src, i as i64, ch);
    }
    let (call, ret) = b.add_call(f, Some(strcat_fn), vec![dst, src], None);
    b.edge(n1, call);
    b.edge(ret, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();

    let state = ae.state_at(call).unwrap();
    // dst[1] was the old terminator; the appended 'Y' joins into it.
    let slot1 = state.load(Address::new(obj_dst, 1)).interval();
    assert!(slot1.contains(&IntervalValue::singleton(89)));
    let slot2 = state.load(Address::new(obj_dst, 2)).interval();
    assert!(slot2.contains(&IntervalValue::singleton(0)));
}

// memset writes the byte to every element within the length.
#[test]
fn memset_fills_prefix() {
    let mut b = IrBuilder::new();
    let memset_fn = b.declare_fun("memset", &[]);
    let f = b.add_fun("main");
    let n1 = b.add_node(f);
    b.edge(b.fun_entry(f), n1);

    let obj = b.new_obj(ValType::array_of(ValType::i8(), 4));
    let p = b.addr_of(n1, obj);
    let byte = b.const_int(n1, 7, ValType::i8());
    let two = b.const_int(n1, 2, ValType::i32());
    let (call, ret) = b.add_call(f, Some(memset_fn), vec![p, byte, two], None);
    b.edge(n1, call);
    b.edge(ret, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();

    let state = ae.state_at(call).unwrap();
    assert_eq!(state.load(Address::new(obj, 0)).interval(), IntervalValue::singleton(7));
    assert_eq!(state.load(Address::new(obj, 1)).interval(), IntervalValue::singleton(7));
    assert!(state.load(Address::new(obj, 2)).is_bottom());
}

// A gep whose byte offset runs past its base object is recorded as a
// potential overflow.
#[test]
fn out_of_bounds_gep_is_recorded() {
    let mut b = IrBuilder::new();
    let f = b.add_fun("main");
    let n1 = b.add_node(f);
    b.edge(b.fun_entry(f), n1);

    let obj = b.new_obj(ValType::array_of(ValType::i8(), 4));
    let p = b.addr_of(n1, obj);
    let oob = b.new_var(ValType::ptr_to(ValType::i8()));
    b.stmt(n1, Stmt::Gep(GepStmt { lhs: oob, rhs: p, offsets: vec![(GepIdx::Const(5), 1)] }));
    b.edge(n1, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();
    assert!(!ae.bug_records().is_bug_free());
    assert!(ae.bug_records().get(n1).is_some());
}

// An in-bounds gep stays silent.
#[test]
fn in_bounds_gep_is_clean() {
    let mut b = IrBuilder::new();
    let f = b.add_fun("main");
    let n1 = b.add_node(f);
    b.edge(b.fun_entry(f), n1);

    let obj = b.new_obj(ValType::array_of(ValType::i8(), 4));
    let p = b.addr_of(n1, obj);
    let elem = b.new_var(ValType::ptr_to(ValType::i8()));
    b.stmt(n1, Stmt::Gep(GepStmt { lhs: elem, rhs: p, offsets: vec![(GepIdx::Const(3), 1)] }));
    b.edge(n1, b.fun_exit(f));

    let ir = b.finish();
    let (ae, result) = analyze(&ir);
    result.unwrap();
    assert!(ae.bug_records().is_bug_free());
}
