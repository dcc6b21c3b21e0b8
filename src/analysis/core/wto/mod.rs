//! Weak topological ordering of a function's ICFG.
//!
//! Bourdoncle's recursive strongly-connected-component construction: the
//! result is a list of components, each either a single node or a cycle
//! with a distinguished head and a nested body. Walking components in
//! order, iterating cycles until they stabilize, yields a fixpoint in
//! finitely many steps.

use rustc_hash::FxHashMap;

use crate::ir::{Icfg, NodeId};

#[derive(Debug, Clone)]
pub enum WtoComp {
    Node(NodeId),
    Cycle(WtoCycle),
}

#[derive(Debug, Clone)]
pub struct WtoCycle {
    pub head: NodeId,
    pub body: Vec<WtoComp>,
}

#[derive(Debug, Clone)]
pub struct IcfgWto {
    pub comps: Vec<WtoComp>,
}

impl IcfgWto {
    /// Build the ordering for the function rooted at `entry`.
    pub fn build(icfg: &Icfg, entry: NodeId) -> Self {
        let mut b = WtoBuilder {
            icfg,
            dfn: FxHashMap::default(),
            stack: Vec::new(),
            num: 0,
        };
        let mut comps = Vec::new();
        b.visit(entry, &mut comps);
        comps.reverse();
        IcfgWto { comps }
    }

    /// Nodes in walk order, cycles flattened; used by tests and clients
    /// inspecting the ordering.
    pub fn flatten(&self) -> Vec<NodeId> {
        fn rec(comps: &[WtoComp], out: &mut Vec<NodeId>) {
            for comp in comps {
                match comp {
                    WtoComp::Node(n) => out.push(*n),
                    WtoComp::Cycle(c) => {
                        out.push(c.head);
                        rec(&c.body, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        rec(&self.comps, &mut out);
        out
    }
}

const DFN_DONE: u32 = u32::MAX;

struct WtoBuilder<'a> {
    icfg: &'a Icfg,
    dfn: FxHashMap<NodeId, u32>,
    stack: Vec<NodeId>,
    num: u32,
}

impl WtoBuilder<'_> {
    fn visit(&mut self, v: NodeId, partition: &mut Vec<WtoComp>) -> u32 {
        self.stack.push(v);
        self.num += 1;
        self.dfn.insert(v, self.num);
        let mut head = self.num;
        let mut loop_found = false;

        for succ in self.icfg.intra_succs(v) {
            let min = match self.dfn.get(&succ) {
                Some(&d) if d != 0 => d,
                _ => self.visit(succ, partition),
            };
            if min <= head && min != DFN_DONE {
                head = min;
                loop_found = true;
            }
        }

        if head == self.dfn[&v] {
            self.dfn.insert(v, DFN_DONE);
            let mut element = self.stack.pop().expect("stack underflow");
            if loop_found {
                while element != v {
                    self.dfn.insert(element, 0);
                    element = self.stack.pop().expect("stack underflow");
                }
                partition.push(WtoComp::Cycle(self.component(v)));
            } else {
                partition.push(WtoComp::Node(v));
            }
        }
        head
    }

    fn component(&mut self, v: NodeId) -> WtoCycle {
        let mut body = Vec::new();
        for succ in self.icfg.intra_succs(v) {
            if self.dfn.get(&succ).copied().unwrap_or(0) == 0 {
                self.visit(succ, &mut body);
            }
        }
        body.reverse();
        WtoCycle { head: v, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;

    #[test]
    fn straight_line_is_singletons() {
        let mut b = IrBuilder::new();
        let f = b.add_fun("main");
        let n1 = b.add_node(f);
        let n2 = b.add_node(f);
        b.edge(b.fun_entry(f), n1);
        b.edge(n1, n2);
        b.edge(n2, b.fun_exit(f));
        let ir = b.finish();

        let wto = IcfgWto::build(&ir.icfg, ir.fun(f).entry);
        assert!(wto.comps.iter().all(|c| matches!(c, WtoComp::Node(_))));
        assert_eq!(wto.flatten(), vec![ir.fun(f).entry, n1, n2, ir.fun(f).exit]);
    }

    #[test]
    fn loop_becomes_cycle_with_head() {
        let mut b = IrBuilder::new();
        let f = b.add_fun("main");
        let head = b.add_node(f);
        let body = b.add_node(f);
        let after = b.add_node(f);
        b.edge(b.fun_entry(f), head);
        b.edge(head, body);
        b.edge(body, head);
        b.edge(head, after);
        b.edge(after, b.fun_exit(f));
        let ir = b.finish();

        let wto = IcfgWto::build(&ir.icfg, ir.fun(f).entry);
        let cycle = wto
            .comps
            .iter()
            .find_map(|c| match c {
                WtoComp::Cycle(c) => Some(c),
                _ => None,
            })
            .expect("expected a cycle component");
        assert_eq!(cycle.head, head);
        assert_eq!(cycle.body.len(), 1);
        // The node after the loop follows the cycle.
        let flat = wto.flatten();
        let head_pos = flat.iter().position(|&n| n == head).unwrap();
        let after_pos = flat.iter().position(|&n| n == after).unwrap();
        assert!(head_pos < after_pos);
    }

    #[test]
    fn nested_loops_nest_cycles() {
        let mut b = IrBuilder::new();
        let f = b.add_fun("main");
        let outer = b.add_node(f);
        let inner = b.add_node(f);
        let inner_body = b.add_node(f);
        b.edge(b.fun_entry(f), outer);
        b.edge(outer, inner);
        b.edge(inner, inner_body);
        b.edge(inner_body, inner);
        b.edge(inner, outer);
        b.edge(outer, b.fun_exit(f));
        let ir = b.finish();

        let wto = IcfgWto::build(&ir.icfg, ir.fun(f).entry);
        let outer_cycle = wto
            .comps
            .iter()
            .find_map(|c| match c {
                WtoComp::Cycle(c) => Some(c),
                _ => None,
            })
            .expect("outer cycle");
        assert_eq!(outer_cycle.head, outer);
        assert!(
            outer_cycle.body.iter().any(|c| matches!(c, WtoComp::Cycle(ic) if ic.head == inner)),
            "inner loop should be a nested cycle"
        );
    }
}
