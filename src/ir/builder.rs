//! Programmatic assembly of an [`Ir`].
//!
//! Frontends lower their source programs through this builder; the test
//! suites use it to write programs directly against the statement model.

use rustc_hash::{FxHashMap, FxHashSet};

use super::icfg::{EdgeKind, Icfg, IcfgEdge, IcfgNode, NodeKind};
use super::{
    AddrStmt, FunId, FunInfo, Ir, NodeId, ObjId, ObjInfo, ObjKind, Stmt, ValType, VarId, VarInfo,
};

pub struct IrBuilder {
    nodes: Vec<IcfgNode>,
    edges: Vec<IcfgEdge>,
    vars: Vec<VarInfo>,
    objs: Vec<ObjInfo>,
    funs: Vec<FunInfo>,
    recursive_funs: FxHashSet<FunId>,
    indirect_calls: FxHashMap<NodeId, VarId>,
    global: NodeId,
}

impl IrBuilder {
    pub fn new() -> Self {
        let mut b = IrBuilder {
            nodes: Vec::new(),
            edges: Vec::new(),
            vars: Vec::new(),
            objs: Vec::new(),
            funs: Vec::new(),
            recursive_funs: FxHashSet::default(),
            indirect_calls: FxHashMap::default(),
            global: 0,
        };
        // Node 0 is the global-initializer node; var 0 the null pointer,
        // var 1 the blackhole pointer, object 0 the null object.
        b.global = b.push_node(None, NodeKind::Global);
        b.new_var(ValType::ptr_to(ValType::Other));
        b.new_var(ValType::ptr_to(ValType::Other));
        b.objs.push(ObjInfo {
            kind: ObjKind::Data,
            ty: ValType::Other,
            byte_size: 0,
            obj_var: super::NULL_PTR,
        });
        b
    }

    pub fn global(&self) -> NodeId {
        self.global
    }

    fn push_node(&mut self, fun: Option<FunId>, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(IcfgNode { id, fun, kind, stmts: Vec::new() });
        id
    }

    /// Define a function with a body. Entry and exit nodes are created up
    /// front; further nodes come from [`IrBuilder::add_node`].
    pub fn add_fun(&mut self, name: &str) -> FunId {
        let id = self.funs.len();
        let entry = self.push_node(Some(id), NodeKind::FunEntry(id));
        let exit = self.push_node(Some(id), NodeKind::FunExit(id));
        self.funs.push(FunInfo {
            name: name.to_string(),
            entry,
            exit,
            nodes: Vec::new(),
            annotations: Vec::new(),
            is_decl: false,
        });
        id
    }

    /// Declare an external function, optionally carrying extern-API
    /// annotations. Declarations have no body nodes.
    pub fn declare_fun(&mut self, name: &str, annotations: &[&str]) -> FunId {
        let id = self.funs.len();
        self.funs.push(FunInfo {
            name: name.to_string(),
            entry: usize::MAX,
            exit: usize::MAX,
            nodes: Vec::new(),
            annotations: annotations.iter().map(|s| s.to_string()).collect(),
            is_decl: true,
        });
        id
    }

    pub fn fun_entry(&self, f: FunId) -> NodeId {
        self.funs[f].entry
    }

    pub fn fun_exit(&self, f: FunId) -> NodeId {
        self.funs[f].exit
    }

    pub fn new_var(&mut self, ty: ValType) -> VarId {
        let id = self.vars.len() as VarId;
        self.vars.push(VarInfo { ty });
        id
    }

    /// Create a data object together with its object variable.
    pub fn new_obj(&mut self, ty: ValType) -> ObjId {
        self.make_obj(ObjKind::Data, ty)
    }

    /// Create a function object for `f`, so its address can flow through
    /// pointers and be resolved back at indirect callsites.
    pub fn fun_obj(&mut self, f: FunId) -> ObjId {
        self.make_obj(ObjKind::Fun(f), ValType::Fun)
    }

    fn make_obj(&mut self, kind: ObjKind, ty: ValType) -> ObjId {
        let obj_var = self.new_var(ValType::ptr_to(ty.clone()));
        let id = self.objs.len() as ObjId;
        let byte_size = ty.byte_size();
        self.objs.push(ObjInfo { kind, ty, byte_size, obj_var });
        id
    }

    /// The variable holding `obj` in `Addr` statements.
    pub fn obj_var(&self, obj: ObjId) -> VarId {
        self.objs[obj as usize].obj_var
    }

    /// Emit `lhs = &obj` into `node` and return `lhs`.
    pub fn addr_of(&mut self, node: NodeId, obj: ObjId) -> VarId {
        let ty = self.objs[obj as usize].ty.clone();
        let lhs = self.new_var(ValType::ptr_to(ty));
        let obj_var = self.objs[obj as usize].obj_var;
        self.stmt(node, Stmt::Addr(AddrStmt { lhs, obj_var, obj, size_vars: Vec::new() }));
        lhs
    }

    /// Materialize the integer literal `val` in `node` and return the
    /// variable holding it.
    pub fn const_int(&mut self, node: NodeId, val: i64, ty: ValType) -> VarId {
        let obj_var = self.new_var(ty.clone());
        let lhs = self.new_var(ty.clone());
        let id = self.objs.len() as ObjId;
        let byte_size = ty.byte_size();
        self.objs.push(ObjInfo { kind: ObjKind::ConstInt(val), ty, byte_size, obj_var });
        self.stmt(node, Stmt::Addr(AddrStmt { lhs, obj_var, obj: id, size_vars: Vec::new() }));
        lhs
    }

    /// Add a plain body node to `fun`.
    pub fn add_node(&mut self, fun: FunId) -> NodeId {
        let id = self.push_node(Some(fun), NodeKind::Intra);
        self.funs[fun].nodes.push(id);
        id
    }

    /// Add a callsite/return-site pair to `fun` and wire the
    /// interprocedural edges: call/ret edges for a defined callee, a
    /// fall-through intra edge otherwise.
    pub fn add_call(
        &mut self,
        fun: FunId,
        callee: Option<FunId>,
        args: Vec<VarId>,
        ret_var: Option<VarId>,
    ) -> (NodeId, NodeId) {
        let call = self.nodes.len();
        let ret = call + 1;
        self.push_node(Some(fun), NodeKind::Call { ret, callee, args, ret_var });
        self.push_node(Some(fun), NodeKind::Ret { call });
        self.funs[fun].nodes.push(call);
        self.funs[fun].nodes.push(ret);
        match callee {
            Some(f) if !self.funs[f].is_decl => {
                let entry = self.funs[f].entry;
                let exit = self.funs[f].exit;
                self.edges.push(IcfgEdge { src: call, dst: entry, kind: EdgeKind::Call });
                self.edges.push(IcfgEdge { src: exit, dst: ret, kind: EdgeKind::Ret });
            }
            _ => {
                self.edge(call, ret);
            }
        }
        (call, ret)
    }

    /// Register `call` as an indirect callsite resolved through `fp`, and
    /// wire call/ret edges for every function it may reach.
    pub fn mark_indirect(&mut self, call: NodeId, fp: VarId, may_reach: &[FunId]) {
        self.indirect_calls.insert(call, fp);
        let ret = match self.nodes[call].kind {
            NodeKind::Call { ret, .. } => ret,
            _ => panic!("mark_indirect on a non-call node"),
        };
        for &f in may_reach {
            let entry = self.funs[f].entry;
            let exit = self.funs[f].exit;
            self.edges.push(IcfgEdge { src: call, dst: entry, kind: EdgeKind::Call });
            self.edges.push(IcfgEdge { src: exit, dst: ret, kind: EdgeKind::Ret });
        }
    }

    pub fn mark_recursive(&mut self, f: FunId) {
        self.recursive_funs.insert(f);
    }

    pub fn stmt(&mut self, node: NodeId, stmt: Stmt) {
        self.nodes[node].stmts.push(stmt);
    }

    pub fn edge(&mut self, src: NodeId, dst: NodeId) {
        self.edges.push(IcfgEdge { src, dst, kind: EdgeKind::Intra { cond: None } });
    }

    /// Guarded intra edge, taken when `cond` evaluates to `val`.
    pub fn cond_edge(&mut self, src: NodeId, dst: NodeId, cond: VarId, val: i64) {
        self.edges.push(IcfgEdge { src, dst, kind: EdgeKind::Intra { cond: Some((cond, val)) } });
    }

    pub fn finish(self) -> Ir {
        let IrBuilder {
            nodes,
            mut edges,
            vars,
            objs,
            mut funs,
            recursive_funs,
            indirect_calls,
            global,
        } = self;

        // Entry and exit participate in the per-function node list.
        for fun in funs.iter_mut() {
            if !fun.is_decl {
                fun.nodes.insert(0, fun.entry);
                fun.nodes.push(fun.exit);
            }
        }

        // Connect globals to main so its entry sees an initial state.
        if let Some(main) = funs.iter().position(|f| f.name == "main" && !f.is_decl) {
            edges.push(IcfgEdge {
                src: global,
                dst: funs[main].entry,
                kind: EdgeKind::Intra { cond: None },
            });
        }

        let mut in_edges = vec![Vec::new(); nodes.len()];
        let mut out_edges = vec![Vec::new(); nodes.len()];
        for (i, e) in edges.iter().enumerate() {
            out_edges[e.src].push(i);
            in_edges[e.dst].push(i);
        }

        let mut defs = FxHashMap::default();
        for node in &nodes {
            for (idx, stmt) in node.stmts.iter().enumerate() {
                if let Some(v) = stmt.def_var() {
                    defs.entry(v).or_insert((node.id, idx));
                }
            }
        }

        Ir {
            icfg: Icfg { nodes, edges, in_edges, out_edges, global },
            vars,
            objs,
            funs,
            recursive_funs,
            indirect_calls,
            defs,
        }
    }
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
