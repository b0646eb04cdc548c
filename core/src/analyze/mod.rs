use crate::ast::{self, Block, ExprRef, Name, Stmt, StmtKind};
use crate::globals::{DocState, GlobalEnv};
use crate::range::Range;
use crate::scope::ScopeStack;
use crate::sym::{BasicType, LazyType, ModuleType, SymId, Symbol, SymbolKind, Type, ValidState};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;

mod calls;
mod function;
mod init;

#[cfg(test)]
mod analyze_test;

/// Trailing path component of a document uri, with an optional `.lua` suffix.
static MODULE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+(?:-\w+)*)(?:\.lua)?$").expect("module name pattern"));

/// Analyze one document: parse `code`, walk the tree and build the module
/// symbol inside `env`. Only parse failures surface as errors; analysis
/// itself is total and silently skips shapes it does not recognize.
pub fn analyze(env: &mut GlobalEnv, code: &str, uri: &str) -> Result<SymId> {
    let chunk = ast::parse_chunk(code)?;
    tracing::debug!(uri, statements = chunk.stmts.len(), "analyzing document");
    let mut analyzer = Analyzer::begin(env, code, uri);
    analyzer.walk_block(&chunk);
    Ok(analyzer.finish())
}

/// Analyze against the process-wide environment.
pub fn analyze_shared(code: &str, uri: &str) -> Result<SymId> {
    let mut env = crate::globals::shared()
        .lock()
        .map_err(|_| anyhow!("global environment lock poisoned"))?;
    analyze(&mut env, code, uri)
}

fn module_name_of(uri: &str) -> String {
    MODULE_NAME
        .captures(uri)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| uri.to_string())
}

/// Single-pass syntax-directed walker. Carries the scope stack, the stack of
/// enclosing functions and the pass-wide validity state; all symbols land in
/// the environment's arena.
pub(crate) struct Analyzer<'e> {
    pub(crate) env: &'e mut GlobalEnv,
    uri: String,
    pub(crate) module: SymId,
    state: ValidState,
    pub(crate) stack: ScopeStack,
    func_stack: Vec<Option<SymId>>,
    pub(crate) current_func: Option<SymId>,
    pub(crate) doc_range: Range,
}

impl<'e> Analyzer<'e> {
    fn begin(env: &'e mut GlobalEnv, code: &str, uri: &str) -> Self {
        env.invalidate_doc(uri);
        let state = ValidState::new();
        let doc_range = Range::new(0, code.chars().count() + 1);
        let module = env.arena.alloc(Symbol::new(
            module_name_of(uri),
            Range::new(0, 1),
            doc_range,
            doc_range,
            false,
            uri,
            SymbolKind::Module,
            Type::Module(Box::new(ModuleType::new())),
            state.clone(),
        ));
        let meta = env.global_meta();
        if let Some(table) = env.arena.sym_mut(module).ty.as_table_mut() {
            table.set_metatable(meta);
        }
        let mut stack = ScopeStack::new();
        stack.enter(doc_range);
        Self {
            env,
            uri: uri.to_string(),
            module,
            state,
            stack,
            func_stack: Vec::new(),
            current_func: None,
            doc_range,
        }
    }

    fn finish(mut self) -> SymId {
        let end = self.doc_range.end;
        self.stack.exit_clamp(&mut self.env.arena, end);
        // The stack stays with the module so position-filtered search and
        // lazy forcing keep working after analysis.
        let stack = std::mem::take(&mut self.stack);
        let module = self.module;
        if let Some(m) = self.env.arena.sym_mut(module).ty.as_module_mut() {
            m.menv.stack = stack;
        }
        if self.module_mode() {
            self.register_module();
        }
        self.env.set_doc(
            &self.uri,
            DocState {
                state: self.state.clone(),
                module,
            },
        );
        module
    }

    /// Module-mode registration: insert into `_G`, or merge into a valid
    /// module of the same name that an earlier pass registered.
    fn register_module(&mut self) {
        let name = self.env.arena[self.module].name.clone();
        match self.env.get_global(&name) {
            Some(existing) if existing != self.module && self.env.arena[existing].valid() => {
                tracing::debug!(module = %name, "merging into existing _G module");
                self.env.merge_module_fields(existing, self.module);
            }
            _ => {
                tracing::debug!(module = %name, "registering module in _G");
                let module = self.module;
                self.env.set_global(&name, module);
            }
        }
    }

    pub(crate) fn walk_block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Local { names, exprs } => self.local_stmt(names, exprs),
            StmtKind::Assign { targets, exprs } => self.assign_stmt(targets, exprs),
            StmtKind::Function { name, local, body } => self.function_stmt(name, *local, body),
            StmtKind::Call(expr) => self.walk_expr(expr),
            StmtKind::If { clauses, else_block } => {
                for clause in clauses {
                    self.scoped_block(clause.range, &clause.body);
                }
                if let Some(block) = else_block {
                    self.scoped_block(block.range, block);
                }
            }
            StmtKind::While { body, .. } | StmtKind::Repeat { body, .. } | StmtKind::Do { body } => {
                self.scoped_block(stmt.range, body)
            }
            StmtKind::NumericFor { var, body, .. } => self.numeric_for(var, body, stmt.range),
            StmtKind::GenericFor { vars, exprs, body } => self.generic_for(vars, exprs, body, stmt.range),
            StmtKind::Return { exprs } => self.return_stmt(exprs),
            _ => {}
        }
    }

    fn scoped_block(&mut self, range: Range, body: &Block) {
        self.stack.enter(range);
        self.walk_block(body);
        self.stack.exit_clamp(&mut self.env.arena, range.end);
    }

    fn numeric_for(&mut self, var: &Name, body: &Block, range: Range) {
        self.stack.enter(range);
        if var.name != "_" {
            let scope = self.local_scope(var.range);
            let sym = self.mk(
                &var.name,
                var.range,
                var.range,
                true,
                SymbolKind::Variable,
                Type::Basic(BasicType::Number),
                scope,
            );
            self.stack.push(sym);
        }
        self.walk_block(body);
        self.stack.exit_clamp(&mut self.env.arena, range.end);
    }

    fn generic_for(&mut self, vars: &[Name], exprs: &[ExprRef], body: &Block, range: Range) {
        self.stack.enter(range);
        for (i, var) in vars.iter().enumerate() {
            if var.name == "_" {
                continue;
            }
            // Each iteration variable defers to the first iterator expression
            // at its own tuple position.
            let ty = match exprs.first() {
                Some(iter) => self.lazy(iter, &var.name, i),
                None => Type::ANY,
            };
            let scope = self.local_scope(var.range);
            let sym = self.mk(&var.name, var.range, var.range, true, SymbolKind::Variable, ty, scope);
            self.stack.push(sym);
        }
        self.walk_block(body);
        self.stack.exit_clamp(&mut self.env.arena, range.end);
    }

    // ---------------- shared helpers ----------------

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn mk(
        &mut self,
        name: &str,
        location: Range,
        range: Range,
        is_local: bool,
        kind: SymbolKind,
        ty: Type,
        scope: Range,
    ) -> SymId {
        self.env.arena.alloc(Symbol::new(
            name,
            location,
            range,
            scope,
            is_local,
            self.uri.clone(),
            kind,
            ty,
            self.state.clone(),
        ))
    }

    /// Scope of a local declared at `location`: visible from its site to the
    /// end of the innermost open frame.
    pub(crate) fn local_scope(&self, location: Range) -> Range {
        Range::range_of(location, self.stack.frame_range())
    }

    pub(crate) fn lazy(&self, node: &ExprRef, name: &str, index: usize) -> Type {
        Type::Lazy(LazyType {
            context: self.module,
            node: node.clone(),
            name: name.to_string(),
            index,
        })
    }

    /// Attach to the enclosing function's outline, or the module's at top
    /// level.
    pub(crate) fn add_child(&mut self, sym: SymId) {
        let parent = self.current_func.unwrap_or(self.module);
        self.env.arena.sym_mut(parent).children.push(sym);
    }

    pub(crate) fn module_mode(&self) -> bool {
        self.env.arena[self.module]
            .ty
            .as_module()
            .map(|m| m.module_mode)
            .unwrap_or(false)
    }

    /// Name resolution during the walk: scope stack filtered by position,
    /// then module fields, then `_G`.
    pub(crate) fn search(&self, name: &str, pos: usize) -> Option<SymId> {
        if let Some(hit) = self.stack.lookup(&self.env.arena, name, pos) {
            return Some(hit);
        }
        if let Some(hit) = self.env.arena[self.module].ty.as_table().and_then(|t| t.get(name)) {
            return Some(hit);
        }
        self.env.get_global(name)
    }

    pub(crate) fn register_doc_global(&mut self, name: &str, sym: SymId) {
        let module = self.module;
        if let Some(m) = self.env.arena.sym_mut(module).ty.as_module_mut() {
            m.menv.globals.insert(name.to_string(), sym);
        }
    }

    pub(crate) fn enter_function(&mut self, fsym: SymId) {
        self.func_stack.push(self.current_func.take());
        self.current_func = Some(fsym);
    }

    pub(crate) fn exit_function(&mut self) {
        self.current_func = self.func_stack.pop().flatten();
    }

    /// Upgrade an untyped symbol to an empty table; reject symbols that
    /// already carry a non-table type.
    pub(crate) fn ensure_table(&mut self, sym: SymId) -> bool {
        match &self.env.arena[sym].ty {
            Type::Table(_) | Type::Module(_) => true,
            Type::Basic(BasicType::Any) | Type::Basic(BasicType::Table) => {
                self.env.arena.sym_mut(sym).ty = Type::Table(Default::default());
                true
            }
            _ => false,
        }
    }
}
