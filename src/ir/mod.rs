//! Program representation consumed by the analyses.
//!
//! The engine does not build this itself: a frontend (or a test) assembles
//! an [`Ir`] through [`IrBuilder`] and hands it over. Variables, abstract
//! objects and functions are flat id-indexed tables; control flow lives in
//! the [`Icfg`]. Every statement kind the interpreter understands is a
//! variant of [`Stmt`], so an unhandled kind cannot exist at runtime.

pub mod builder;
pub mod icfg;

use rustc_hash::{FxHashMap, FxHashSet};

pub use builder::IrBuilder;
pub use icfg::{EdgeKind, Icfg, IcfgEdge, IcfgNode, NodeKind};

/// Variable id in the program graph.
pub type VarId = u32;
/// Abstract-object id. Object 0 is the null object.
pub type ObjId = u32;
/// ICFG node id.
pub type NodeId = usize;
/// Function id.
pub type FunId = usize;

/// The null pointer variable. Seeded with the empty address set before the
/// run; comparisons and loads through it stay sound without a real object.
pub const NULL_PTR: VarId = 0;
/// The blackhole pointer variable, standing in for unknown external
/// pointers (e.g. `main`'s environment). Seeded with the top interval.
pub const BLK_PTR: VarId = 1;
/// The null object. Loads from its addresses yield bottom.
pub const NULL_OBJ: ObjId = 0;

/// Static value types, just rich enough to compute byte sizes, integer
/// ranges and pointee element types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValType {
    Int { bytes: u32, signed: bool },
    Float,
    Ptr(Box<ValType>),
    Array { elem: Box<ValType>, len: u32 },
    Fun,
    Other,
}

impl ValType {
    pub fn i8() -> Self {
        ValType::Int { bytes: 1, signed: true }
    }

    pub fn i32() -> Self {
        ValType::Int { bytes: 4, signed: true }
    }

    pub fn i64() -> Self {
        ValType::Int { bytes: 8, signed: true }
    }

    pub fn u8() -> Self {
        ValType::Int { bytes: 1, signed: false }
    }

    pub fn u32() -> Self {
        ValType::Int { bytes: 4, signed: false }
    }

    pub fn ptr_to(pointee: ValType) -> Self {
        ValType::Ptr(Box::new(pointee))
    }

    pub fn array_of(elem: ValType, len: u32) -> Self {
        ValType::Array { elem: Box::new(elem), len }
    }

    pub fn byte_size(&self) -> u32 {
        match self {
            ValType::Int { bytes, .. } => *bytes,
            ValType::Float => 8,
            ValType::Ptr(_) | ValType::Fun => 8,
            ValType::Array { elem, len } => elem.byte_size() * len,
            ValType::Other => 1,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, ValType::Int { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, ValType::Ptr(_) | ValType::Fun)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ValType::Array { .. })
    }

    /// Element type of an array, or `None`.
    pub fn elem(&self) -> Option<&ValType> {
        match self {
            ValType::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Pointee type of a pointer, or `None`.
    pub fn pointee(&self) -> Option<&ValType> {
        match self {
            ValType::Ptr(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub ty: ValType,
}

/// What an abstract object stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjKind {
    /// A region of memory (stack slot, global, heap allocation).
    Data,
    /// Constant integer data. Taking its address yields the singleton
    /// interval instead of an address set; this is how literal constants
    /// enter the abstract state.
    ConstInt(i64),
    /// A function, so function pointers can be resolved back to a callee.
    Fun(FunId),
}

#[derive(Debug, Clone)]
pub struct ObjInfo {
    pub kind: ObjKind,
    pub ty: ValType,
    pub byte_size: u32,
    /// The variable holding this object in `Addr` statements.
    pub obj_var: VarId,
}

#[derive(Debug, Clone)]
pub struct FunInfo {
    pub name: String,
    /// Entry node; meaningless for declarations.
    pub entry: NodeId,
    pub exit: NodeId,
    /// All nodes belonging to the function body, in creation order.
    pub nodes: Vec<NodeId>,
    /// Extern-API annotations (`MEMCPY`, `ALLOC_RET`, ...), if any.
    pub annotations: Vec<String>,
    /// Declaration without a body.
    pub is_decl: bool,
}

/// Kinds of `Copy` statements. Distinguishes plain value copies from the
/// cast family, which reinterpret the operand at a different width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    Value,
    Zext,
    Sext,
    Trunc,
    Fptosi,
    Fptoui,
    Sitofp,
    Uitofp,
    Fptrunc,
    Inttoptr,
    Ptrtoint,
    Bitcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Xor,
    And,
    Or,
    Shl,
    Shr,
}

/// Comparison predicates. Signedness and float orderings collapse to the
/// six relations the interval domain can act on, plus the two constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    True,
    False,
}

impl Predicate {
    /// Predicate for the negated condition (`x > y` is false iff `x <= y`).
    pub fn inverse(self) -> Self {
        match self {
            Predicate::Eq => Predicate::Ne,
            Predicate::Ne => Predicate::Eq,
            Predicate::Gt => Predicate::Le,
            Predicate::Ge => Predicate::Lt,
            Predicate::Lt => Predicate::Ge,
            Predicate::Le => Predicate::Gt,
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
        }
    }

    /// Predicate after swapping the operands (`c < x` becomes `x > c`).
    pub fn swap(self) -> Self {
        match self {
            Predicate::Eq => Predicate::Eq,
            Predicate::Ne => Predicate::Ne,
            Predicate::Gt => Predicate::Lt,
            Predicate::Ge => Predicate::Le,
            Predicate::Lt => Predicate::Gt,
            Predicate::Le => Predicate::Ge,
            Predicate::True => Predicate::True,
            Predicate::False => Predicate::False,
        }
    }
}

/// One step of a `Gep` offset chain: the index (constant or variable) and
/// the byte size of the element it steps over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GepIdx {
    Const(i64),
    Var(VarId),
}

/// `lhs = &obj`
#[derive(Debug, Clone)]
pub struct AddrStmt {
    pub lhs: VarId,
    pub obj_var: VarId,
    pub obj: ObjId,
    /// Dynamic allocation-size operands (`alloca n`); empty for objects
    /// whose byte size is statically known.
    pub size_vars: Vec<VarId>,
}

/// `lhs = rhs` with a cast kind
#[derive(Debug, Clone)]
pub struct CopyStmt {
    pub lhs: VarId,
    pub rhs: VarId,
    pub kind: CopyKind,
}

/// `res = op0 <op> op1`
#[derive(Debug, Clone)]
pub struct BinaryOpStmt {
    pub res: VarId,
    pub op0: VarId,
    pub op1: VarId,
    pub op: BinOp,
}

/// `res = op0 <pred> op1`
#[derive(Debug, Clone)]
pub struct CmpStmt {
    pub res: VarId,
    pub op0: VarId,
    pub op1: VarId,
    pub predicate: Predicate,
}

/// `lhs = *rhs`
#[derive(Debug, Clone)]
pub struct LoadStmt {
    pub lhs: VarId,
    pub rhs: VarId,
}

/// `*lhs = rhs`
#[derive(Debug, Clone)]
pub struct StoreStmt {
    pub lhs: VarId,
    pub rhs: VarId,
}

/// `lhs = &rhs[...]` — address computation over a structured object.
#[derive(Debug, Clone)]
pub struct GepStmt {
    pub lhs: VarId,
    pub rhs: VarId,
    /// Offset chain; each entry is `(index, element byte size)`.
    pub offsets: Vec<(GepIdx, u32)>,
}

/// `res = cond ? tval : fval`
#[derive(Debug, Clone)]
pub struct SelectStmt {
    pub res: VarId,
    pub cond: VarId,
    pub tval: VarId,
    pub fval: VarId,
}

/// `res = phi(op_i @ pred_i)`
#[derive(Debug, Clone)]
pub struct PhiStmt {
    pub res: VarId,
    /// Operands paired with the ICFG node they flow in from.
    pub ops: Vec<(VarId, NodeId)>,
}

/// Parameter binding on a call: `formal = actual`.
#[derive(Debug, Clone)]
pub struct CallPe {
    pub lhs: VarId,
    pub rhs: VarId,
}

/// Return binding: `caller result = callee return value`.
#[derive(Debug, Clone)]
pub struct RetPe {
    pub lhs: VarId,
    pub rhs: VarId,
}

#[derive(Debug, Clone)]
pub struct UnaryOpStmt {
    pub res: VarId,
    pub op: VarId,
}

/// Branch on `cond`; the outgoing edge conditions carry the successor
/// values, so the statement itself transfers nothing.
#[derive(Debug, Clone)]
pub struct BranchStmt {
    pub cond: VarId,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Addr(AddrStmt),
    Copy(CopyStmt),
    BinaryOp(BinaryOpStmt),
    Cmp(CmpStmt),
    Load(LoadStmt),
    Store(StoreStmt),
    Gep(GepStmt),
    Select(SelectStmt),
    Phi(PhiStmt),
    Call(CallPe),
    Ret(RetPe),
    UnaryOp(UnaryOpStmt),
    Branch(BranchStmt),
}

impl Stmt {
    /// The variable this statement defines, if any. `Store` writes memory,
    /// not a variable; `Branch` defines nothing.
    pub fn def_var(&self) -> Option<VarId> {
        match self {
            Stmt::Addr(s) => Some(s.lhs),
            Stmt::Copy(s) => Some(s.lhs),
            Stmt::BinaryOp(s) => Some(s.res),
            Stmt::Cmp(s) => Some(s.res),
            Stmt::Load(s) => Some(s.lhs),
            Stmt::Store(_) => None,
            Stmt::Gep(s) => Some(s.lhs),
            Stmt::Select(s) => Some(s.res),
            Stmt::Phi(s) => Some(s.res),
            Stmt::Call(s) => Some(s.lhs),
            Stmt::Ret(s) => Some(s.lhs),
            Stmt::UnaryOp(s) => Some(s.res),
            Stmt::Branch(_) => None,
        }
    }
}

/// The whole consumed program: control flow, tables, and the pre-computed
/// collaborator results (recursive functions, indirect callsites).
#[derive(Debug)]
pub struct Ir {
    pub icfg: Icfg,
    pub vars: Vec<VarInfo>,
    pub objs: Vec<ObjInfo>,
    pub funs: Vec<FunInfo>,
    /// Functions on a call-graph cycle; calls into them are not descended.
    pub recursive_funs: FxHashSet<FunId>,
    /// Indirect callsites, keyed by call node, valued with the variable
    /// holding the function pointer.
    pub indirect_calls: FxHashMap<NodeId, VarId>,
    pub(crate) defs: FxHashMap<VarId, (NodeId, usize)>,
}

impl Ir {
    pub fn var_ty(&self, v: VarId) -> &ValType {
        &self.vars[v as usize].ty
    }

    pub fn is_pointer_var(&self, v: VarId) -> bool {
        self.vars[v as usize].ty.is_pointer()
    }

    pub fn obj(&self, o: ObjId) -> &ObjInfo {
        &self.objs[o as usize]
    }

    pub fn fun(&self, f: FunId) -> &FunInfo {
        &self.funs[f]
    }

    pub fn fun_by_name(&self, name: &str) -> Option<FunId> {
        self.funs.iter().position(|f| f.name == name)
    }

    /// Defining statement of `v`, if it has one.
    pub fn def_of(&self, v: VarId) -> Option<&Stmt> {
        let (node, idx) = *self.defs.get(&v)?;
        Some(&self.icfg.node(node).stmts[idx])
    }

    pub fn def_site(&self, v: VarId) -> Option<(NodeId, usize)> {
        self.defs.get(&v).copied()
    }
}
