//! Abstract syntax tree for Lethe.
//!
//! Every node lives in one flat, per-compilation-unit arena ([`Ast`]) and is
//! addressed by [`NodeId`] rather than by pointer. A parent's `children`
//! list owns its child ids; `parent`, `target`, `scope_ref`, `sym_scope_ref`
//! are non-owning back-references, so the tree has no reference cycles even
//! though nodes frequently need to point "up" or "sideways" (spec §3, §9:
//! "Cyclic parent pointers in AST").
//!
//! The node kind set is a closed enum rather than ~130 separate structs with
//! virtual dispatch — spec §9 explicitly recommends this for a fixed,
//! source-language-defined kind set. Each pass (`resolve`, `fold`,
//! `type_gen`, `codegen`, `codegen_ref`) is a function that matches on
//! [`NodeKind`] rather than a method with 130 overrides.

use lethe_host::SourceLocation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::bitset;
use crate::scope::ScopeId;
use crate::types::{QDataType, TypeId};

/// Index into [`Ast::nodes`]. `0` is never a valid id (reserved as a niche
/// so `Option<NodeId>` is the same size as `NodeId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(std::num::NonZeroU32);

impl NodeId {
    fn from_index(index: usize) -> NodeId {
        NodeId(std::num::NonZeroU32::new((index as u32) + 1).expect("index overflow"))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

bitset! {
    /// Modifier and code-gen-hint qualifiers attached to a [`QDataType`] or
    /// a declaration node (spec §3).
    pub struct Qualifiers: u64 {
        const CONST             = 1 << 0;
        const REFERENCE         = 1 << 1;
        const STATIC            = 1 << 2;
        const METHOD            = 1 << 3;
        const CTOR              = 1 << 4;
        const DTOR               = 1 << 5;
        const NATIVE            = 1 << 6;
        const INLINE            = 1 << 7;
        const VIRTUAL           = 1 << 8;
        const OVERRIDE          = 1 << 9;
        const FINAL             = 1 << 10;
        const PRIVATE           = 1 << 11;
        const PROTECTED         = 1 << 12;
        const FORMAT            = 1 << 13;
        const NODISCARD         = 1 << 14;
        const NOCOPY            = 1 << 15;
        const NOINIT            = 1 << 16;
        const NOTEMP            = 1 << 17;
        const STATE             = 1 << 18;
        const LATENT            = 1 << 19;
        const STATEBREAK        = 1 << 20;
        const THREAD_UNSAFE     = 1 << 21;
        const THREAD_CALL       = 1 << 22;
        const PROPERTY          = 1 << 23;
        const BITFIELD          = 1 << 24;
        const EDITABLE          = 1 << 25;
        const DEPRECATED        = 1 << 26;
        // transient code-gen hints
        const SKIP_DTOR              = 1 << 32;
        const REF_ALIASED            = 1 << 33;
        const REBUILD_MEMBER_TYPES   = 1 << 34;
        const CAN_MODIFY_CONSTANT    = 1 << 35;
        const NON_VIRT               = 1 << 36;
    }
}

bitset! {
    pub struct NodeFlags: u32 {
        const RESOLVED        = 1 << 0;
        const REFERENCED      = 1 << 1;
        const SKIP_CGEN       = 1 << 2;
        const NRVO            = 1 << 3;
        const LOCK            = 1 << 4;
        const TYPE_GEN        = 1 << 5;
        const RES_ELEM        = 1 << 6;
        const RES_SLICE       = 1 << 7;
        const PUSH_TYPE       = 1 << 8;
        const PUSH_TYPE_SIZE  = 1 << 9;
        const ARG1_ELEM       = 1 << 10;
        const ARG2_ELEM       = 1 << 11;
    }
}

/// Inline constant payload, kept as a tagged union of the numeric/bool
/// primitive kinds so constant folding never needs to allocate (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Bool(bool),
    Byte(i8),
    UByte(u8),
    Short(i16),
    UShort(u16),
    Char(u32),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
}

impl ConstValue {
    pub fn as_i64(self) -> Option<i64> {
        match self {
            ConstValue::Bool(b) => Some(b as i64),
            ConstValue::Byte(v) => Some(v as i64),
            ConstValue::UByte(v) => Some(v as i64),
            ConstValue::Short(v) => Some(v as i64),
            ConstValue::UShort(v) => Some(v as i64),
            ConstValue::Char(v) => Some(v as i64),
            ConstValue::Int(v) => Some(v as i64),
            ConstValue::UInt(v) => Some(v as i64),
            ConstValue::Long(v) => Some(v),
            ConstValue::ULong(v) => Some(v as i64),
            ConstValue::Float(_) | ConstValue::Double(_) => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            ConstValue::Float(v) => Some(v as f64),
            ConstValue::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            ConstValue::Float(v) => v == 0.0,
            ConstValue::Double(v) => v == 0.0,
            _ => self.as_i64() == Some(0),
        }
    }
}

/// Pattern in a `switch`/`case`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseLabel {
    pub value: ConstValue,
}

/// Binary operator tokens; arithmetic identity folding in `constfold.rs`
/// matches on these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Plus,
    Minus,
    BitNot,
    LogNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerKind {
    Strong,
    Weak,
    Raw,
}

/// The node kind set. Each variant carries only the data that pass logic
/// needs; child nodes (sub-expressions, statement lists, member lists) are
/// reached through `Node::children`, not duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Program,
    Namespace {
        name: String,
    },

    // ---- declarations ----
    StructDef {
        name: String,
        base: Option<String>,
    },
    ClassDef {
        name: String,
        base: Option<String>,
        /// nested `state class` — see spec §4.5.
        is_state: bool,
    },
    EnumDef {
        name: String,
        is_class: bool,
        is_flags: bool,
    },
    EnumItem {
        name: String,
    },
    FuncDef {
        name: String,
        /// `<=0` for non-operator functions; operator functions carry the
        /// operator token text (e.g. `"+="`) so ScopeTree can register
        /// them in the owning scope's operator table.
        operator: Option<String>,
    },
    ArgList,
    VarDeclList,
    VarDecl {
        name: String,
        is_auto: bool,
    },

    // ---- types (as AST nodes so array dims / template args can be
    // expressions that need resolve+fold before TypeGen runs) ----
    TypeName {
        name: String,
    },
    TypeAuto,
    TypePointer {
        kind: PointerKind,
    },
    TypeStaticArray,
    TypeDynamicArray,
    TypeArrayRef,
    TypeFuncPtr,
    TypeDelegate,

    // ---- statements ----
    Block,
    If,
    While {
        nobreak: bool,
    },
    Do {
        nobreak: bool,
    },
    For {
        nobreak: bool,
        /// range-based `for x : collection`
        is_range: bool,
    },
    Switch,
    Case {
        labels: Vec<CaseLabel>,
        is_default: bool,
    },
    Break,
    Continue,
    Return,
    Goto {
        label: String,
    },
    Label {
        name: String,
    },
    Defer,
    ExprStatement,

    // ---- expressions ----
    Ident {
        name: String,
    },
    ScopeRes {
        path: Vec<String>,
    },
    Dot {
        member: String,
    },
    Call,
    Index,
    BinaryOp(BinOp),
    UnaryOp(UnOp),
    UnaryPreOp(BinOp),
    UnaryPostOp(BinOp),
    Assign,
    CompoundAssign(BinOp),
    Ternary,
    InitializerList,
    New,
    This,
    AddressOf,

    // ---- constants ----
    ConstBool(bool),
    ConstInt(ConstValue),
    ConstString(String),
    ConstName(String),
    ConstNull,
}

/// One AST node. `children` is ordered and semantically positional per
/// `NodeKind` (e.g. for `Assign`, `children[0]` is the lhs, `children[1]`
/// the rhs) — callers index by meaning, not by searching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub location: SourceLocation,
    pub qualifiers: Qualifiers,
    #[serde(skip)]
    pub flags: NodeFlags,
    /// Stack-frame or global-pool byte offset once CodeGen/TypeGen assigns
    /// storage for this node (locals, members, constants).
    #[serde(skip)]
    pub offset: i64,
    #[serde(skip)]
    pub scope_ref: Option<ScopeId>,
    #[serde(skip)]
    pub sym_scope_ref: Option<ScopeId>,
    /// Resolution result: the declaration this node's identifier/call
    /// resolved to, or the canonical node after a scope-resolution collapse.
    #[serde(skip)]
    pub target: Option<NodeId>,
    #[serde(skip)]
    pub data_type: Option<QDataType>,
    #[serde(skip)]
    pub constant: Option<ConstValue>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_resolved(&self) -> bool {
        self.flags.contains(NodeFlags::RESOLVED)
    }
}

/// Per-compilation-unit AST arena. Owns every [`Node`]; deletion cascades
/// structurally (an orphaned subtree is just never visited again — the
/// arena itself is bulk-freed at the end of compilation).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
    /// `DataType`s referenced by `TypeId` from `QDataType`, kept here so
    /// `Ast` and `TypeTable` can be passed around independently while still
    /// sharing ids; the canonical storage is `TypeTable` (see `typetable.rs`).
    #[serde(skip)]
    pub type_names: HashMap<TypeId, String>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn alloc(&mut self, location: SourceLocation, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            id,
            parent: None,
            location,
            qualifiers: Qualifiers::EMPTY,
            flags: NodeFlags::EMPTY,
            offset: -1,
            scope_ref: None,
            sym_scope_ref: None,
            target: None,
            data_type: None,
            constant: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Append `child` to `parent`'s child list and set `child.parent`.
    /// Panics if `child` already has a parent — the AST forbids sharing.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        assert!(
            self.get(child).parent.is_none(),
            "node {:?} already has a parent; AST nodes are uniquely owned",
            child
        );
        self.get_mut(child).parent = Some(parent);
        self.get_mut(parent).children.push(child);
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.get(id).children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deep-copies `node` and its subtree as fresh, unparented nodes. Used
    /// by inline expansion (`codegen/inline.rs`) to splice a callee's body
    /// into a call site without aliasing the original definition (each
    /// expansion needs its own `target`/`offset` slots once locals are
    /// rewritten onto the caller's frame).
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let original = self.get(node).clone();
        let children: Vec<NodeId> = original
            .children
            .iter()
            .map(|&c| self.clone_subtree(c))
            .collect();
        let new_id = self.alloc(original.location.clone(), original.kind.clone());
        {
            let n = self.get_mut(new_id);
            n.qualifiers = original.qualifiers;
            n.flags = original.flags;
            n.offset = original.offset;
            n.scope_ref = original.scope_ref;
            n.sym_scope_ref = original.sym_scope_ref;
            n.target = original.target;
            n.data_type = original.data_type;
            n.constant = original.constant;
        }
        for child in children {
            self.add_child(new_id, child);
        }
        new_id
    }

    /// Replace `node`'s kind/children in place, freeing the old children
    /// (they become unreachable garbage in the arena). Used by the
    /// scope-resolution-chain collapse in `resolver.rs` (spec §4.1), which
    /// must mutate a node's identity without recursing into itself.
    pub fn rewrite(&mut self, node: NodeId, kind: NodeKind, children: Vec<NodeId>) {
        for &child in &children {
            self.get_mut(child).parent = Some(node);
        }
        let n = self.get_mut(node);
        n.kind = kind;
        n.children = children;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new("test.le", 0, 0)
    }

    #[test]
    fn add_child_sets_parent_and_ordering() {
        let mut ast = Ast::new();
        let root = ast.alloc(loc(), NodeKind::Block);
        let a = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(1)));
        let b = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(2)));
        ast.add_child(root, a);
        ast.add_child(root, b);
        assert_eq!(ast.children(root), &[a, b]);
        assert_eq!(ast.get(a).parent, Some(root));
    }

    #[test]
    #[should_panic(expected = "already has a parent")]
    fn add_child_rejects_shared_ownership() {
        let mut ast = Ast::new();
        let root1 = ast.alloc(loc(), NodeKind::Block);
        let root2 = ast.alloc(loc(), NodeKind::Block);
        let a = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(1)));
        ast.add_child(root1, a);
        ast.add_child(root2, a);
    }

    #[test]
    fn clone_subtree_produces_an_unparented_copy() {
        let mut ast = Ast::new();
        let root = ast.alloc(loc(), NodeKind::Block);
        let leaf = ast.alloc(loc(), NodeKind::ConstInt(ConstValue::Int(9)));
        ast.add_child(root, leaf);

        let clone = ast.clone_subtree(root);
        assert_ne!(clone, root);
        assert!(ast.get(clone).parent.is_none());
        assert_eq!(ast.children(clone).len(), 1);
        assert_ne!(ast.children(clone)[0], leaf);
    }

    #[test]
    fn qualifiers_bitset_round_trips() {
        let mut q = Qualifiers::EMPTY;
        q.insert(Qualifiers::CONST | Qualifiers::REFERENCE);
        assert!(q.contains(Qualifiers::CONST));
        assert!(q.contains(Qualifiers::REFERENCE));
        assert!(!q.contains(Qualifiers::STATIC));
        q.remove(Qualifiers::CONST);
        assert!(!q.contains(Qualifiers::CONST));
    }
}
