use crate::ast::ExprRef;
use crate::range::Range;
use crate::scope::ScopeStack;
use crate::sym::SymId;
use crate::util::fast_map::FastHashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Validity flag shared by every symbol of one analysis pass. Re-analyzing a
/// document flips the old pass to invalid in one store; consumers treat
/// invalid symbols as stale.
#[derive(Debug, Clone)]
pub struct ValidState(Arc<AtomicBool>);

impl ValidState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn valid(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn invalidate(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

impl Default for ValidState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Module,
    Class,
    Table,
    Function,
    Parameter,
    Variable,
    Property,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicType {
    Any,
    Nil,
    Boolean,
    Number,
    String,
    Table,
}

#[derive(Debug, Clone)]
pub enum Type {
    Basic(BasicType),
    Table(TableType),
    Function(FunctionType),
    Module(Box<ModuleType>),
    Lazy(LazyType),
    /// Aliases another symbol's type; used where type objects are shared by
    /// reference (`self` parameters, structural copies).
    Ref(SymId),
}

impl Type {
    pub const ANY: Type = Type::Basic(BasicType::Any);

    pub fn is_any(&self) -> bool {
        matches!(self, Type::Basic(BasicType::Any))
    }

    /// Field map of a table-like type (`TableType` or the table side of a
    /// `ModuleType`).
    pub fn as_table(&self) -> Option<&TableType> {
        match self {
            Type::Table(t) => Some(t),
            Type::Module(m) => Some(&m.table),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut TableType> {
        match self {
            Type::Table(t) => Some(t),
            Type::Module(m) => Some(&mut m.table),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleType> {
        match self {
            Type::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleType> {
        match self {
            Type::Module(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(BasicType::Any) => write!(f, "any"),
            Type::Basic(BasicType::Nil) => write!(f, "nil"),
            Type::Basic(BasicType::Boolean) => write!(f, "boolean"),
            Type::Basic(BasicType::Number) => write!(f, "number"),
            Type::Basic(BasicType::String) => write!(f, "string"),
            Type::Basic(BasicType::Table) | Type::Table(_) => write!(f, "table"),
            Type::Function(_) => write!(f, "function"),
            Type::Module(_) => write!(f, "module"),
            Type::Lazy(l) => write!(f, "<lazy {}>", l.name),
            Type::Ref(_) => write!(f, "<ref>"),
        }
    }
}

/// String-keyed field map with insertion-ordered iteration. Overwriting an
/// existing field keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct TableType {
    fields: Vec<(String, SymId)>,
    index: FastHashMap<String, usize>,
    pub metatable: Option<SymId>,
}

impl TableType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, sym: SymId) {
        match self.index.get(name) {
            Some(&at) => self.fields[at].1 = sym,
            None => {
                self.index.insert(name.to_string(), self.fields.len());
                self.fields.push((name.to_string(), sym));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<SymId> {
        self.index.get(name).map(|&at| self.fields[at].1)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, SymId)> {
        self.fields.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn set_metatable(&mut self, sym: SymId) {
        self.metatable = Some(sym);
    }
}

/// Positional parameter and return slots. `tail_call` records the type of a
/// tail-position call in a return statement so multi-return chaining stays
/// transparent.
#[derive(Debug, Clone, Default)]
pub struct FunctionType {
    params: Vec<Option<SymId>>,
    returns: Vec<Option<SymId>>,
    pub tail_call: Option<Box<Type>>,
}

impl FunctionType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_param(&mut self, slot: usize, sym: SymId) {
        if self.params.len() <= slot {
            self.params.resize(slot + 1, None);
        }
        self.params[slot] = Some(sym);
    }

    pub fn param(&self, slot: usize) -> Option<SymId> {
        self.params.get(slot).copied().flatten()
    }

    pub fn params(&self) -> &[Option<SymId>] {
        &self.params
    }

    pub fn set_return(&mut self, slot: usize, sym: SymId) {
        if self.returns.len() <= slot {
            self.returns.resize(slot + 1, None);
        }
        self.returns[slot] = Some(sym);
    }

    pub fn ret(&self, slot: usize) -> Option<SymId> {
        self.returns.get(slot).copied().flatten()
    }

    pub fn returns(&self) -> &[Option<SymId>] {
        &self.returns
    }
}

/// Deferred type reference: enough context to re-walk `node` inside the
/// owning module and select tuple position `index` at query time. The module
/// symbol graph must stay alive while any of these are outstanding.
#[derive(Debug, Clone)]
pub struct LazyType {
    pub context: SymId,
    pub node: ExprRef,
    pub name: String,
    pub index: usize,
}

/// Scope stack and registered-global map owned by one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    pub stack: ScopeStack,
    pub globals: FastHashMap<String, SymId>,
}

/// A module is a table plus its analysis environment, module-mode flag,
/// top-level return and imports.
#[derive(Debug, Clone, Default)]
pub struct ModuleType {
    pub table: TableType,
    pub menv: ModuleEnv,
    pub module_mode: bool,
    pub ret: Option<SymId>,
    imports: Vec<SymId>,
}

impl ModuleType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(&mut self, sym: SymId) {
        self.imports.push(sym);
    }

    pub fn imports(&self) -> &[SymId] {
        &self.imports
    }
}

/// A named declaration in a document.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Range of the defining identifier token.
    pub location: Range,
    /// Range of the definition expression; for functions, the body span.
    pub range: Range,
    /// Range over which the symbol is name-resolvable.
    pub scope: Range,
    pub is_local: bool,
    pub uri: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub state: ValidState,
    pub children: Vec<SymId>,
}

impl Symbol {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        location: Range,
        range: Range,
        scope: Range,
        is_local: bool,
        uri: impl Into<String>,
        kind: SymbolKind,
        ty: Type,
        state: ValidState,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            range,
            scope,
            is_local,
            uri: uri.into(),
            kind,
            ty,
            state,
            children: Vec::new(),
        }
    }

    pub fn valid(&self) -> bool {
        self.state.valid()
    }
}
