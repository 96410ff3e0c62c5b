//! The program model the resolver builds and the generator consumes.
//!
//! Entities live in flat arenas owned by [`Program`] and reference each
//! other through index newtypes. While resolution runs, entities carry an
//! explicit `complete` flag plus whatever scratch state the fixpoint loop
//! needs (pending statement lists, per-block variable scopes); once an
//! entity completes, its addresses and type ids never change again.

use indexmap::IndexMap;
use rill_syntax::TokenSpan;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DesigId(pub u32);

/// Reserved type ids. User-defined types start at [`builtin::FIRST_USER`].
pub mod builtin {
    use super::TypeId;

    pub const UNKNOWN: TypeId = TypeId(0);
    pub const GENERIC: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const FLOAT: TypeId = TypeId(4);
    pub const DOUBLE: TypeId = TypeId(5);
    pub const BOOL: TypeId = TypeId(6);

    pub const FIRST_USER: u32 = 10;
}

#[derive(Clone, Debug)]
pub struct Field {
    pub declared_type: String,
    /// `builtin::UNKNOWN` until the declared type name resolves.
    pub type_id: TypeId,
    /// Byte offset inside the record, assigned at type completion.
    pub offset: i32,
}

#[derive(Clone, Debug)]
pub struct Type {
    pub id: TypeId,
    pub name: String,
    /// Total byte size; valid once `complete`.
    pub size: i32,
    /// Fields in declaration order.
    pub fields: IndexMap<String, Field>,
    /// Declared method names. Method bodies are not compiled yet.
    pub methods: Vec<String>,
    /// Declared legend (interface) tags, informational only.
    pub legends: Vec<String>,
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub struct Param {
    pub declared_type: String,
    pub type_id: TypeId,
    /// Byte offset inside the parameter buffer, assigned at list completion.
    pub offset: i32,
    pub complete: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ParamList {
    /// Parameters in declaration order.
    pub params: IndexMap<String, Param>,
    pub complete: bool,
}

impl ParamList {
    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.get(name)
    }
}

#[derive(Clone, Debug)]
pub struct Function {
    pub id: FuncId,
    pub name: String,
    /// `builtin::UNKNOWN` until inferred from a return statement.
    pub return_type: TypeId,
    pub params: ParamList,
    pub body: BlockId,
    /// Bytes of local-variable storage; grows as declarations complete.
    pub stack_size: i32,
    /// Bytes of parameter storage; valid once the parameter list completes.
    pub param_size: i32,
    pub complete: bool,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub function: FuncId,
    pub parent: Option<BlockId>,
    pub stmts: Vec<StmtId>,
    pub complete: bool,
    /// Completed declarations visible in this scope.
    pub(crate) vars: HashMap<String, StmtId>,
    pub(crate) pending_decls: Vec<StmtId>,
    pub(crate) pending_stmts: Vec<StmtId>,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    VarDecl {
        name: String,
        declared_type: String,
        type_id: TypeId,
        /// Byte offset in the local frame, assigned at completion.
        offset: i32,
    },
    Assign {
        target: DesigId,
        value: ExprId,
    },
    Increment {
        target: DesigId,
    },
    Decrement {
        target: DesigId,
    },
    Invoke {
        value: ExprId,
    },
    Return {
        value: Option<ExprId>,
    },
    If {
        cond: ExprId,
        body: StmtId,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    Block {
        block: BlockId,
    },
    /// Synthetic marker closing a nested block.
    BlockEnd,
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub block: BlockId,
    pub complete: bool,
}

/// One entry of a flattened postfix expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprValue {
    ConstInt(i32),
    ConstBool(bool),
    Designator(DesigId),
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Neg,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub values: Vec<ExprValue>,
    pub block: BlockId,
    pub result_type: TypeId,
    pub complete: bool,
    pub span: TokenSpan,
}

/// Where a designator's value lives once resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    Unknown,
    Local,
    Param,
    Heap,
    Call,
}

#[derive(Clone, Debug)]
pub struct Designator {
    pub name: String,
    pub parent: Option<DesigId>,
    /// Argument expressions when this segment is a call.
    pub args: Option<Vec<ExprId>>,
    pub kind: StorageKind,
    pub type_id: TypeId,
    /// Byte offset in the local frame or parameter buffer.
    pub address: i32,
    pub callee: Option<FuncId>,
    pub complete: bool,
    pub span: TokenSpan,
}

/// The resolved program: tables of types and functions plus the entity
/// arenas behind them. Complete and still-pending entities are kept in
/// disjoint name maps so lookups only ever observe finished entities.
#[derive(Clone, Debug, Default)]
pub struct Program {
    types: Vec<Type>,
    type_names: HashMap<String, TypeId>,
    pending_type_names: HashMap<String, TypeId>,
    functions: Vec<Function>,
    function_names: IndexMap<String, FuncId>,
    pending_function_names: IndexMap<String, FuncId>,
    blocks: Vec<Block>,
    stmts: Vec<Stmt>,
    exprs: Vec<Expr>,
    desigs: Vec<Designator>,
}

impl Program {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Byte size of a value of the given type. User types must be complete;
    /// asking for the size of an incomplete type is a caller bug.
    pub fn size_of(&self, id: TypeId) -> i32 {
        match id {
            builtin::INT | builtin::FLOAT => 4,
            builtin::DOUBLE => 8,
            builtin::BOOL => 1,
            _ => {
                let ty = self
                    .type_by_id(id)
                    .unwrap_or_else(|| panic!("size_of: no type with id {}", id.0));
                assert!(ty.complete, "size_of on incomplete type '{}'", ty.name);
                ty.size
            }
        }
    }

    /// Resolve a type name: complete types first, then pending ones, then
    /// the built-ins. Returns `builtin::UNKNOWN` when nothing matches;
    /// callers decide whether that blocks completion.
    pub fn resolve_type_name(&self, name: &str) -> TypeId {
        if let Some(&id) = self.type_names.get(name) {
            return id;
        }
        if let Some(&id) = self.pending_type_names.get(name) {
            return id;
        }
        match name {
            "int" => builtin::INT,
            "bool" => builtin::BOOL,
            _ => builtin::UNKNOWN,
        }
    }

    /// A type id whose size is already known: complete user types and the
    /// sized built-ins only.
    pub(crate) fn sized_type_id(&self, name: &str) -> Option<TypeId> {
        if let Some(&id) = self.type_names.get(name) {
            return Some(id);
        }
        match name {
            "int" => Some(builtin::INT),
            "bool" => Some(builtin::BOOL),
            _ => None,
        }
    }

    pub fn type_by_id(&self, id: TypeId) -> Option<&Type> {
        let index = id.0.checked_sub(builtin::FIRST_USER)? as usize;
        self.types.get(index)
    }

    pub fn type_by_name(&self, name: &str) -> Option<&Type> {
        self.type_names.get(name).and_then(|&id| self.type_by_id(id))
    }

    pub(crate) fn new_type(&mut self, name: &str) -> TypeId {
        let id = TypeId(builtin::FIRST_USER + self.types.len() as u32);
        self.types.push(Type {
            id,
            name: name.to_string(),
            size: 0,
            fields: IndexMap::new(),
            methods: Vec::new(),
            legends: Vec::new(),
            complete: false,
        });
        self.pending_type_names.insert(name.to_string(), id);
        id
    }

    pub(crate) fn type_ref(&self, id: TypeId) -> &Type {
        &self.types[(id.0 - builtin::FIRST_USER) as usize]
    }

    pub(crate) fn type_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[(id.0 - builtin::FIRST_USER) as usize]
    }

    pub(crate) fn is_type_name_taken(&self, name: &str) -> bool {
        self.type_names.contains_key(name) || self.pending_type_names.contains_key(name)
    }

    /// Move a type's name from the pending map to the complete map.
    pub(crate) fn promote_type(&mut self, name: &str, id: TypeId) {
        self.pending_type_names.remove(name);
        self.type_names.insert(name.to_string(), id);
    }

    /// All functions in declaration order, complete or not.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.function_names.get(name).map(|&id| self.function(id))
    }

    /// Id lookup over registered (complete) functions only.
    pub(crate) fn function_id_by_name(&self, name: &str) -> Option<FuncId> {
        self.function_names.get(name).copied()
    }

    /// Id lookup over complete and still-pending functions alike. Callers
    /// must check the entity's own state before relying on it.
    pub(crate) fn any_function_id_by_name(&self, name: &str) -> Option<FuncId> {
        self.function_names
            .get(name)
            .or_else(|| self.pending_function_names.get(name))
            .copied()
    }

    pub(crate) fn new_function(&mut self, name: &str) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function {
            id,
            name: name.to_string(),
            return_type: builtin::UNKNOWN,
            params: ParamList::default(),
            body: BlockId(0),
            stack_size: 0,
            param_size: 0,
            complete: false,
        });
        self.pending_function_names.insert(name.to_string(), id);
        id
    }

    pub(crate) fn function_ref(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub(crate) fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub(crate) fn is_function_name_taken(&self, name: &str) -> bool {
        self.function_names.contains_key(name) || self.pending_function_names.contains_key(name)
    }

    /// Move a function's name from the pending map to the complete map.
    pub(crate) fn register_function(&mut self, id: FuncId) {
        let name = self.functions[id.0 as usize].name.clone();
        self.pending_function_names.shift_remove(&name);
        self.function_names.insert(name, id);
    }

    pub(crate) fn new_block(&mut self, function: FuncId, parent: Option<BlockId>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block {
            function,
            parent,
            stmts: Vec::new(),
            complete: true,
            vars: HashMap::new(),
            pending_decls: Vec::new(),
            pending_stmts: Vec::new(),
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub(crate) fn new_stmt(&mut self, kind: StmtKind, block: BlockId, complete: bool) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, block, complete });
        id
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub(crate) fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.0 as usize]
    }

    pub(crate) fn new_expr(&mut self, values: Vec<ExprValue>, block: BlockId, span: TokenSpan) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr {
            values,
            block,
            result_type: builtin::UNKNOWN,
            complete: false,
            span,
        });
        id
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub(crate) fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.0 as usize]
    }

    pub(crate) fn new_designator(
        &mut self,
        name: String,
        parent: Option<DesigId>,
        args: Option<Vec<ExprId>>,
        span: TokenSpan,
    ) -> DesigId {
        let id = DesigId(self.desigs.len() as u32);
        let kind = if args.is_some() {
            StorageKind::Call
        } else {
            StorageKind::Unknown
        };
        self.desigs.push(Designator {
            name,
            parent,
            args,
            kind,
            type_id: builtin::UNKNOWN,
            address: 0,
            callee: None,
            complete: false,
            span,
        });
        id
    }

    pub fn designator(&self, id: DesigId) -> &Designator {
        &self.desigs[id.0 as usize]
    }

    pub(crate) fn desig_mut(&mut self, id: DesigId) -> &mut Designator {
        &mut self.desigs[id.0 as usize]
    }
}
