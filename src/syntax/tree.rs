//! Arena-allocated syntax tree.
//!
//! Nodes live in a flat `Vec` and refer to their children by index. Editing
//! never touches a tree in place: every edit clones the arena, appends the
//! new nodes and swaps a child index in the parent record. Nodes that fall
//! out of the tree stay in the arena but are unreachable from the root.

use crate::error::{TreeError, TreeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of a node inside one arena.
pub(crate) type Ix = usize;

/// Identity shared by a parsed tree and every tree derived from it by editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(u64);

impl TreeId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle to a node of a particular tree lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    tree: TreeId,
    index: Ix,
}

impl NodeId {
    /// Tree lineage this handle belongs to.
    #[must_use]
    pub fn tree(&self) -> TreeId {
        self.tree
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.tree.0)
    }
}

/// Coarse class of a node: what kind of slot it can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    /// The module root.
    Module,
    /// A statement inside a block.
    Statement,
    /// An expression.
    Expression,
}

/// Node category used to locate nodes and to pair crossover sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Module root.
    Module,
    /// `def` statement.
    FunctionDef,
    /// `return` statement.
    Return,
    /// Plain assignment.
    Assign,
    /// Augmented assignment such as `+=`.
    AugAssign,
    /// `for` loop.
    For,
    /// `while` loop.
    While,
    /// `if` statement (including `elif` chains).
    If,
    /// Expression used as a statement.
    ExprStmt,
    /// `pass`.
    Pass,
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// Variable reference.
    Name,
    /// Literal constant.
    Constant,
    /// List display.
    List,
    /// List comprehension or generator expression.
    Comprehension,
    /// Arithmetic operation.
    BinaryOp,
    /// Unary operation.
    UnaryOp,
    /// `and` / `or`.
    BoolOp,
    /// Comparison.
    Compare,
    /// Function or method call.
    Call,
    /// Attribute access.
    Attribute,
    /// Subscript access.
    Subscript,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 23] = [
        Self::Module,
        Self::FunctionDef,
        Self::Return,
        Self::Assign,
        Self::AugAssign,
        Self::For,
        Self::While,
        Self::If,
        Self::ExprStmt,
        Self::Pass,
        Self::Break,
        Self::Continue,
        Self::Name,
        Self::Constant,
        Self::List,
        Self::Comprehension,
        Self::BinaryOp,
        Self::UnaryOp,
        Self::BoolOp,
        Self::Compare,
        Self::Call,
        Self::Attribute,
        Self::Subscript,
    ];

    /// Slot class this category fills.
    #[must_use]
    pub fn class(self) -> NodeClass {
        match self {
            Self::Module => NodeClass::Module,
            Self::FunctionDef
            | Self::Return
            | Self::Assign
            | Self::AugAssign
            | Self::For
            | Self::While
            | Self::If
            | Self::ExprStmt
            | Self::Pass
            | Self::Break
            | Self::Continue => NodeClass::Statement,
            _ => NodeClass::Expression,
        }
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
}

impl BinaryOp {
    /// Source spelling.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `not x`
    Not,
}

/// Short-circuit boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtE,
    /// `>=`
    GtE,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl CmpOp {
    /// Source spelling.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtE => "<=",
            Self::GtE => ">=",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

/// Literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    Str(String),
}

impl Literal {
    /// Python truthiness of the constant.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
        }
    }
}

/// Whether a comprehension builds a list or a lazy generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComprehensionKind {
    /// `[elt for var in iter]`
    List,
    /// `(elt for var in iter)`
    Generator,
}

/// Node payload. Child references are arena indices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Module {
        body: Vec<Ix>,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Vec<Ix>,
    },
    Return {
        value: Option<Ix>,
    },
    Assign {
        target: Ix,
        value: Ix,
    },
    AugAssign {
        target: Ix,
        op: BinaryOp,
        value: Ix,
    },
    For {
        var: String,
        iter: Ix,
        body: Vec<Ix>,
    },
    While {
        test: Ix,
        body: Vec<Ix>,
    },
    If {
        test: Ix,
        body: Vec<Ix>,
        orelse: Vec<Ix>,
    },
    Expr {
        value: Ix,
    },
    Pass,
    Break,
    Continue,
    Name(String),
    Const(Literal),
    List(Vec<Ix>),
    Comprehension {
        kind: ComprehensionKind,
        elt: Ix,
        var: String,
        iter: Ix,
        cond: Option<Ix>,
    },
    Binary {
        op: BinaryOp,
        left: Ix,
        right: Ix,
    },
    Unary {
        op: UnaryOp,
        operand: Ix,
    },
    Bool {
        op: BoolOp,
        left: Ix,
        right: Ix,
    },
    Compare {
        op: CmpOp,
        left: Ix,
        right: Ix,
    },
    Call {
        func: Ix,
        args: Vec<Ix>,
    },
    Attribute {
        value: Ix,
        attr: String,
    },
    Subscript {
        value: Ix,
        index: Ix,
    },
}

impl NodeKind {
    pub(crate) fn category(&self) -> Category {
        match self {
            Self::Module { .. } => Category::Module,
            Self::FunctionDef { .. } => Category::FunctionDef,
            Self::Return { .. } => Category::Return,
            Self::Assign { .. } => Category::Assign,
            Self::AugAssign { .. } => Category::AugAssign,
            Self::For { .. } => Category::For,
            Self::While { .. } => Category::While,
            Self::If { .. } => Category::If,
            Self::Expr { .. } => Category::ExprStmt,
            Self::Pass => Category::Pass,
            Self::Break => Category::Break,
            Self::Continue => Category::Continue,
            Self::Name(_) => Category::Name,
            Self::Const(_) => Category::Constant,
            Self::List(_) => Category::List,
            Self::Comprehension { .. } => Category::Comprehension,
            Self::Binary { .. } => Category::BinaryOp,
            Self::Unary { .. } => Category::UnaryOp,
            Self::Bool { .. } => Category::BoolOp,
            Self::Compare { .. } => Category::Compare,
            Self::Call { .. } => Category::Call,
            Self::Attribute { .. } => Category::Attribute,
            Self::Subscript { .. } => Category::Subscript,
        }
    }

    pub(crate) fn is_assignable(&self) -> bool {
        matches!(
            self,
            Self::Name(_) | Self::Subscript { .. } | Self::Attribute { .. }
        )
    }

    /// Children in source order.
    pub(crate) fn children(&self) -> Vec<Ix> {
        match self {
            Self::Module { body } | Self::FunctionDef { body, .. } => body.clone(),
            Self::Return { value } => value.iter().copied().collect(),
            Self::Assign { target, value } | Self::AugAssign { target, value, .. } => {
                vec![*target, *value]
            }
            Self::For { iter, body, .. } => std::iter::once(*iter).chain(body.iter().copied()).collect(),
            Self::While { test, body } => std::iter::once(*test).chain(body.iter().copied()).collect(),
            Self::If { test, body, orelse } => std::iter::once(*test)
                .chain(body.iter().copied())
                .chain(orelse.iter().copied())
                .collect(),
            Self::Expr { value } | Self::Attribute { value, .. } => vec![*value],
            Self::Pass | Self::Break | Self::Continue | Self::Name(_) | Self::Const(_) => Vec::new(),
            Self::List(items) => items.clone(),
            Self::Comprehension {
                elt, iter, cond, ..
            } => {
                let mut out = vec![*elt, *iter];
                out.extend(cond.iter().copied());
                out
            }
            Self::Binary { left, right, .. }
            | Self::Bool { left, right, .. }
            | Self::Compare { left, right, .. } => vec![*left, *right],
            Self::Unary { operand, .. } => vec![*operand],
            Self::Call { func, args } => std::iter::once(*func).chain(args.iter().copied()).collect(),
            Self::Subscript { value, index } => vec![*value, *index],
        }
    }

    /// Mutable references to every child slot, in source order.
    pub(crate) fn child_slots_mut(&mut self) -> Vec<&mut Ix> {
        match self {
            Self::Module { body } | Self::FunctionDef { body, .. } => body.iter_mut().collect(),
            Self::Return { value } => value.iter_mut().collect(),
            Self::Assign { target, value } | Self::AugAssign { target, value, .. } => {
                vec![target, value]
            }
            Self::For { iter, body, .. } => std::iter::once(iter).chain(body.iter_mut()).collect(),
            Self::While { test, body } => std::iter::once(test).chain(body.iter_mut()).collect(),
            Self::If { test, body, orelse } => std::iter::once(test)
                .chain(body.iter_mut())
                .chain(orelse.iter_mut())
                .collect(),
            Self::Expr { value } | Self::Attribute { value, .. } => vec![value],
            Self::Pass | Self::Break | Self::Continue | Self::Name(_) | Self::Const(_) => Vec::new(),
            Self::List(items) => items.iter_mut().collect(),
            Self::Comprehension {
                elt, iter, cond, ..
            } => {
                let mut out = vec![elt, iter];
                out.extend(cond.iter_mut());
                out
            }
            Self::Binary { left, right, .. }
            | Self::Bool { left, right, .. }
            | Self::Compare { left, right, .. } => vec![left, right],
            Self::Unary { operand, .. } => vec![operand],
            Self::Call { func, args } => std::iter::once(func).chain(args.iter_mut()).collect(),
            Self::Subscript { value, index } => vec![value, index],
        }
    }

    /// Statement blocks owned by this node, paired with whether an empty
    /// block would be a syntax error.
    pub(crate) fn blocks(&self) -> Vec<(&Vec<Ix>, bool)> {
        match self {
            Self::Module { body } => vec![(body, false)],
            Self::FunctionDef { body, .. } | Self::For { body, .. } | Self::While { body, .. } => {
                vec![(body, true)]
            }
            Self::If { body, orelse, .. } => vec![(body, true), (orelse, false)],
            _ => Vec::new(),
        }
    }

    fn block_mut(&mut self, which: usize) -> Option<&mut Vec<Ix>> {
        match (self, which) {
            (
                Self::Module { body }
                | Self::FunctionDef { body, .. }
                | Self::For { body, .. }
                | Self::While { body, .. }
                | Self::If { body, .. },
                0,
            ) => Some(body),
            (Self::If { orelse, .. }, 1) => Some(orelse),
            _ => None,
        }
    }
}

/// One arena slot.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) line: usize,
}

/// A parsed program.
///
/// Trees are only produced by [`crate::syntax::parse`] or by editing another
/// tree; callers never assemble nodes by hand.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    id: TreeId,
    nodes: Vec<Node>,
    root: Ix,
}

impl SyntaxTree {
    pub(crate) fn from_parts(nodes: Vec<Node>, root: Ix) -> Self {
        Self {
            id: TreeId::fresh(),
            nodes,
            root,
        }
    }

    /// Lineage identity of this tree.
    #[must_use]
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Handle to the module root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.handle(self.root)
    }

    /// Category of a node.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NodeNotFound`] for foreign or unreachable handles.
    pub fn category(&self, node: NodeId) -> TreeResult<Category> {
        let ix = self.locate(node)?;
        Ok(self.nodes[ix].kind.category())
    }

    /// All reachable nodes of `category`, in pre-order.
    #[must_use]
    pub fn find_nodes_by_category(&self, category: Category) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&ix| self.nodes[ix].kind.category() == category)
            .map(|ix| self.handle(ix))
            .collect()
    }

    /// Categories that occur at least once in the tree.
    #[must_use]
    pub fn categories(&self) -> BTreeSet<Category> {
        self.preorder()
            .into_iter()
            .map(|ix| self.nodes[ix].kind.category())
            .collect()
    }

    /// Number of reachable nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    /// Deepest statement nesting; top-level statements sit at depth 0.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 0usize)];
        while let Some((ix, depth)) = stack.pop() {
            for (block, _) in self.nodes[ix].kind.blocks() {
                let inner = if ix == self.root { depth } else { depth + 1 };
                for &stmt in block {
                    deepest = deepest.max(inner);
                    stack.push((stmt, inner));
                }
            }
        }
        deepest
    }

    /// Names of the top-level functions, in definition order.
    #[must_use]
    pub fn function_names(&self) -> Vec<String> {
        let NodeKind::Module { body } = &self.nodes[self.root].kind else {
            return Vec::new();
        };
        body.iter()
            .filter_map(|&ix| match &self.nodes[ix].kind {
                NodeKind::FunctionDef { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Top-level functions with their parameter counts.
    pub(crate) fn function_signatures(&self) -> Vec<(String, usize)> {
        let NodeKind::Module { body } = &self.nodes[self.root].kind else {
            return Vec::new();
        };
        body.iter()
            .filter_map(|&ix| match &self.nodes[ix].kind {
                NodeKind::FunctionDef { name, params, .. } => Some((name.clone(), params.len())),
                _ => None,
            })
            .collect()
    }

    /// Return a new tree in which `target`'s subtree is replaced by a copy
    /// of `replacement`'s subtree taken from `donor`.
    ///
    /// `donor` may be `self` or any other tree. `self` is left untouched.
    ///
    /// # Errors
    ///
    /// - [`TreeError::NodeNotFound`] if either handle does not belong to its tree.
    /// - [`TreeError::RootReplacement`] if `target` is the module root.
    /// - [`TreeError::Incompatible`] if the replacement's class differs.
    /// - [`TreeError::NotAssignable`] if `target` is an assignment target and
    ///   the replacement is not assignable.
    pub fn replace_node(
        &self,
        target: NodeId,
        donor: &SyntaxTree,
        replacement: NodeId,
    ) -> TreeResult<SyntaxTree> {
        let target_ix = self.locate(target)?;
        let donor_ix = donor.locate(replacement)?;
        let parent = self.parent_of(target_ix).ok_or(TreeError::RootReplacement)?;

        let target_class = self.nodes[target_ix].kind.category().class();
        let donor_kind = &donor.nodes[donor_ix].kind;
        let replacement_class = donor_kind.category().class();
        if target_class != replacement_class {
            return Err(TreeError::Incompatible {
                target: target_class,
                replacement: replacement_class,
            });
        }
        if self.is_assignment_target(parent, target_ix) && !donor_kind.is_assignable() {
            return Err(TreeError::NotAssignable);
        }

        let mut edited = self.clone();
        let copied = edited.copy_subtree(donor, donor_ix);
        edited.swap_child(parent, target_ix, copied);
        Ok(edited)
    }

    // ---- crate-internal editing primitives ----

    pub(crate) fn root_ix(&self) -> Ix {
        self.root
    }

    pub(crate) fn handle(&self, ix: Ix) -> NodeId {
        NodeId {
            tree: self.id,
            index: ix,
        }
    }

    pub(crate) fn kind(&self, ix: Ix) -> &NodeKind {
        &self.nodes[ix].kind
    }

    pub(crate) fn line(&self, ix: Ix) -> usize {
        self.nodes[ix].line
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind, line: usize) -> Ix {
        self.nodes.push(Node { kind, line });
        self.nodes.len() - 1
    }

    /// Resolve a handle to a reachable arena index.
    pub(crate) fn locate(&self, node: NodeId) -> TreeResult<Ix> {
        if node.tree != self.id || node.index >= self.nodes.len() {
            return Err(TreeError::NodeNotFound(node));
        }
        if self.preorder().contains(&node.index) {
            Ok(node.index)
        } else {
            Err(TreeError::NodeNotFound(node))
        }
    }

    /// Reachable indices in pre-order.
    pub(crate) fn preorder(&self) -> Vec<Ix> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(ix) = stack.pop() {
            out.push(ix);
            stack.extend(self.nodes[ix].kind.children().into_iter().rev());
        }
        out
    }

    /// Reachable indices of the subtree rooted at `ix`, in pre-order.
    pub(crate) fn subtree(&self, ix: Ix) -> Vec<Ix> {
        let mut out = Vec::new();
        let mut stack = vec![ix];
        while let Some(ix) = stack.pop() {
            out.push(ix);
            stack.extend(self.nodes[ix].kind.children().into_iter().rev());
        }
        out
    }

    pub(crate) fn parent_of(&self, child: Ix) -> Option<Ix> {
        self.preorder()
            .into_iter()
            .find(|&ix| self.nodes[ix].kind.children().contains(&child))
    }

    fn is_assignment_target(&self, parent: Ix, child: Ix) -> bool {
        matches!(
            self.nodes[parent].kind,
            NodeKind::Assign { target, .. } | NodeKind::AugAssign { target, .. } if target == child
        )
    }

    /// Locate the block that holds statement `stmt`: `(parent, block, position)`.
    pub(crate) fn block_position(&self, stmt: Ix) -> Option<(Ix, usize, usize)> {
        let parent = self.parent_of(stmt)?;
        self.nodes[parent]
            .kind
            .blocks()
            .into_iter()
            .enumerate()
            .find_map(|(which, (block, _))| {
                block
                    .iter()
                    .position(|&s| s == stmt)
                    .map(|pos| (parent, which, pos))
            })
    }

    /// Statements following `stmt` in its block.
    pub(crate) fn siblings_after(&self, stmt: Ix) -> Vec<Ix> {
        self.block_position(stmt)
            .and_then(|(parent, which, pos)| {
                self.nodes[parent]
                    .kind
                    .blocks()
                    .get(which)
                    .map(|(block, _)| block[pos + 1..].to_vec())
            })
            .unwrap_or_default()
    }

    /// Statement directly preceding `stmt` in its block.
    pub(crate) fn previous_sibling(&self, stmt: Ix) -> Option<Ix> {
        let (parent, which, pos) = self.block_position(stmt)?;
        let blocks = self.nodes[parent].kind.blocks();
        let (block, _) = blocks.get(which)?;
        pos.checked_sub(1).map(|p| block[p])
    }

    /// Replace `remove` statements starting at `stmt` with `replacements`.
    ///
    /// A block that must not be empty receives a `pass`.
    pub(crate) fn splice(&mut self, stmt: Ix, remove: usize, replacements: Vec<Ix>) -> TreeResult<()> {
        let not_found = TreeError::NodeNotFound(self.handle(stmt));
        let (parent, which, pos) = self.block_position(stmt).ok_or(not_found)?;
        let required = self.nodes[parent]
            .kind
            .blocks()
            .get(which)
            .is_some_and(|(_, required)| *required);
        let line = self.nodes[stmt].line;

        let block = self.nodes[parent].kind.block_mut(which).ok_or(not_found)?;
        let end = (pos + remove).min(block.len());
        let _removed: Vec<Ix> = block.splice(pos..end, replacements).collect();
        let empty = block.is_empty();

        if empty && required {
            let pass = self.alloc(NodeKind::Pass, line);
            if let Some(block) = self.nodes[parent].kind.block_mut(which) {
                block.push(pass);
            }
        }
        Ok(())
    }

    /// Point `parent`'s slot holding `old` at `new`.
    pub(crate) fn swap_child(&mut self, parent: Ix, old: Ix, new: Ix) {
        for slot in self.nodes[parent].kind.child_slots_mut() {
            if *slot == old {
                *slot = new;
            }
        }
    }

    /// Replace the subtree at `target` with the freshly allocated `new` node.
    pub(crate) fn replace_with(&mut self, target: Ix, new: Ix) -> TreeResult<()> {
        let parent = self.parent_of(target).ok_or(TreeError::RootReplacement)?;
        self.swap_child(parent, target, new);
        Ok(())
    }

    /// Deep-copy a subtree of `donor` into this arena.
    pub(crate) fn copy_subtree(&mut self, donor: &SyntaxTree, ix: Ix) -> Ix {
        let mut kind = donor.nodes[ix].kind.clone();
        for slot in kind.child_slots_mut() {
            *slot = self.copy_subtree(donor, *slot);
        }
        self.alloc(kind, donor.nodes[ix].line)
    }

    /// Names bound inside the subtree at `ix`: assignment targets, loop and
    /// comprehension variables, function names and parameters.
    pub(crate) fn bound_names(&self, ix: Ix) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for ix in self.subtree(ix) {
            match &self.nodes[ix].kind {
                NodeKind::Assign { target, .. } | NodeKind::AugAssign { target, .. } => {
                    if let NodeKind::Name(name) = &self.nodes[*target].kind {
                        names.insert(name.clone());
                    }
                }
                NodeKind::For { var, .. } | NodeKind::Comprehension { var, .. } => {
                    names.insert(var.clone());
                }
                NodeKind::FunctionDef { name, params, .. } => {
                    names.insert(name.clone());
                    names.extend(params.iter().cloned());
                }
                _ => {}
            }
        }
        names
    }

    /// Every identifier that appears anywhere in the tree.
    pub(crate) fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for ix in self.preorder() {
            match &self.nodes[ix].kind {
                NodeKind::Name(name) | NodeKind::For { var: name, .. } => {
                    names.insert(name.clone());
                }
                NodeKind::Comprehension { var, .. } => {
                    names.insert(var.clone());
                }
                NodeKind::FunctionDef { name, params, .. } => {
                    names.insert(name.clone());
                    names.extend(params.iter().cloned());
                }
                NodeKind::Attribute { attr, .. } => {
                    names.insert(attr.clone());
                }
                _ => {}
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, render};

    const SAMPLE: &str = "def f(xs):\n    total = 0\n    for x in xs:\n        total += x\n    return total\n";

    #[test]
    fn test_find_nodes_preorder() {
        let tree = parse(SAMPLE).unwrap();
        let names = tree.find_nodes_by_category(Category::Name);
        let rendered: Vec<&NodeKind> = names
            .iter()
            .map(|id| tree.kind(tree.locate(*id).unwrap()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                &NodeKind::Name("total".into()),
                &NodeKind::Name("xs".into()),
                &NodeKind::Name("total".into()),
                &NodeKind::Name("x".into()),
                &NodeKind::Name("total".into()),
            ]
        );
        assert!(tree.find_nodes_by_category(Category::While).is_empty());
    }

    #[test]
    fn test_replace_node_leaves_original_untouched() {
        let tree = parse(SAMPLE).unwrap();
        let donor = parse("y = 42\n").unwrap();
        let target = tree.find_nodes_by_category(Category::Constant)[0];
        let replacement = donor.find_nodes_by_category(Category::Constant)[0];

        let edited = tree.replace_node(target, &donor, replacement).unwrap();
        assert!(render(&edited).contains("total = 42"));
        assert!(render(&tree).contains("total = 0"));
    }

    #[test]
    fn test_replace_node_rejects_foreign_handle() {
        let tree = parse(SAMPLE).unwrap();
        let other = parse(SAMPLE).unwrap();
        let foreign = other.find_nodes_by_category(Category::Return)[0];
        let own = tree.find_nodes_by_category(Category::Return)[0];
        let err = tree.replace_node(foreign, &tree, own).unwrap_err();
        assert_eq!(err, TreeError::NodeNotFound(foreign));
    }

    #[test]
    fn test_replace_node_rejects_unreachable_handle() {
        let tree = parse(SAMPLE).unwrap();
        let constant = tree.find_nodes_by_category(Category::Constant)[0];
        let name = tree.find_nodes_by_category(Category::Name)[1];
        let edited = tree.replace_node(constant, &tree, name).unwrap();

        // The old constant is detached in the derived tree.
        assert!(matches!(
            edited.category(constant),
            Err(TreeError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_replace_node_class_mismatch() {
        let tree = parse(SAMPLE).unwrap();
        let stmt = tree.find_nodes_by_category(Category::Return)[0];
        let expr = tree.find_nodes_by_category(Category::Name)[0];
        assert!(matches!(
            tree.replace_node(stmt, &tree, expr),
            Err(TreeError::Incompatible { .. })
        ));
        assert_eq!(
            tree.replace_node(tree.root(), &tree, stmt).unwrap_err(),
            TreeError::RootReplacement
        );
    }

    #[test]
    fn test_replace_assignment_target_requires_assignable() {
        let tree = parse(SAMPLE).unwrap();
        let target = tree.find_nodes_by_category(Category::Name)[0];
        let constant = tree.find_nodes_by_category(Category::Constant)[0];
        assert_eq!(
            tree.replace_node(target, &tree, constant).unwrap_err(),
            TreeError::NotAssignable
        );
    }

    #[test]
    fn test_max_depth_and_functions() {
        let tree = parse(SAMPLE).unwrap();
        assert_eq!(tree.max_depth(), 2);
        assert_eq!(tree.function_names(), vec!["f".to_string()]);
        assert_eq!(parse("x = 1\n").unwrap().max_depth(), 0);
    }
}
