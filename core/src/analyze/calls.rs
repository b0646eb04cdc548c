use super::init::Init;
use super::Analyzer;
use crate::ast::{Expr, ExprKind, ExprRef};
use crate::range::Range;
use crate::sym::{SymId, SymbolKind, Type};
use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing identifier of a require path: `core` in `"socket.core"`.
static IMPORT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+(?:-\w+)*)$").expect("import name pattern"));

/// Normalize the three call shapes to callee plus argument list.
pub(crate) fn call_parts(expr: &Expr) -> Option<(&ExprRef, Vec<&ExprRef>)> {
    match &expr.kind {
        ExprKind::Call { callee, args } => Some((callee, args.iter().collect())),
        ExprKind::StringCall { callee, arg } | ExprKind::TableCall { callee, arg } => Some((callee, vec![arg])),
        _ => None,
    }
}

fn is_pcall_require(args: &[&ExprRef]) -> bool {
    args.first()
        .is_some_and(|a| matches!(&a.kind, ExprKind::Name(n) | ExprKind::Str(n) if n == "require"))
}

impl<'e> Analyzer<'e> {
    /// Expression walk for side effects only: calls are intercepted, member
    /// bases descend, anonymous functions get symbols. Everything else is
    /// inert.
    pub(crate) fn walk_expr(&mut self, expr: &ExprRef) {
        match &expr.kind {
            ExprKind::Call { .. } | ExprKind::StringCall { .. } | ExprKind::TableCall { .. } => self.walk_call(expr),
            ExprKind::Member { base, .. } => self.walk_expr(base),
            ExprKind::Function(body) => self.anonymous_function(expr, body),
            _ => {}
        }
    }

    fn walk_call(&mut self, expr: &ExprRef) {
        let Some((callee, args)) = call_parts(expr) else {
            return;
        };
        if let Some(builtin) = callee.as_name() {
            match builtin {
                "module" => {
                    self.module_call(&args);
                    return;
                }
                "require" => {
                    self.try_register_import(expr);
                    return;
                }
                "pcall" if is_pcall_require(&args) => {
                    self.try_register_import(expr);
                    return;
                }
                "setmetatable" => {
                    self.setmetatable_call(&args);
                    return;
                }
                _ => {}
            }
        }
        self.walk_expr(callee);
        for arg in args {
            self.walk_expr(arg);
        }
    }

    /// `module(name)` renames the module symbol and switches the pass into
    /// module mode: subsequent globals become module fields.
    fn module_call(&mut self, args: &[&ExprRef]) {
        let Some(name) = args.first().and_then(|a| a.as_str()) else {
            return;
        };
        tracing::debug!(module = %name, "module() call enters module mode");
        let module = self.module;
        self.env.arena.sym_mut(module).name = name.to_string();
        if let Some(m) = self.env.arena.sym_mut(module).ty.as_module_mut() {
            m.module_mode = true;
        }
    }

    /// Register a lazy import symbol for `require("a.b.c")` or
    /// `pcall(require, "a.b.c")`. Non-literal paths are dropped silently.
    pub(crate) fn try_register_import(&mut self, expr: &ExprRef) -> Option<SymId> {
        let (callee, args) = call_parts(expr)?;
        let path_arg = match callee.as_name()? {
            "require" => args.first().copied(),
            "pcall" if is_pcall_require(&args) => args.get(1).copied(),
            _ => None,
        }?;
        let path = path_arg.as_str()?;
        let name = IMPORT_NAME.captures(path)?.get(1)?.as_str().to_string();
        let ty = self.lazy(expr, &name, 0);
        let sym = self.mk(
            &name,
            path_arg.range,
            expr.range,
            false,
            SymbolKind::Module,
            ty,
            Range::GLOBAL,
        );
        let module = self.module;
        if let Some(m) = self.env.arena.sym_mut(module).ty.as_module_mut() {
            m.import(sym);
        }
        tracing::trace!(import = %name, "registered require import");
        Some(sym)
    }

    /// Standalone `setmetatable(T, M)`: resolve `T` by name, make sure it is
    /// a table and attach the metatable symbol.
    fn setmetatable_call(&mut self, args: &[&ExprRef]) {
        let Some(target) = args.first() else { return };
        let Some(tname) = target.as_name() else { return };
        let Some(found) = self.search(tname, target.range.begin) else {
            return;
        };
        let tsym = self.env.arena.canonical(found);
        if !self.ensure_table(tsym) {
            return;
        }
        let meta = self.metatable_symbol(args.get(1).copied());
        if let Some(table) = self.env.arena.sym_mut(tsym).ty.as_table_mut() {
            table.set_metatable(meta);
        }
    }

    /// `local x = setmetatable(T, M)`: the binding takes `T`'s type; when the
    /// left-hand name is `T` itself the declaration symbol is reused. The
    /// inline form builds the table from its constructor first.
    pub(crate) fn setmetatable_init<F>(
        &mut self,
        init: &Init<'_>,
        call: &ExprRef,
        scope: Range,
        range: Range,
        place: F,
    ) -> SymId
    where
        F: FnOnce(&mut Self, SymId),
    {
        let args = call_parts(call).map(|(_, a)| a).unwrap_or_default();
        let meta = self.metatable_symbol(args.get(1).copied());
        let sym = match args.first().map(|t| (&t.kind, *t)) {
            Some((ExprKind::Name(tname), target)) => {
                let found = self
                    .search(tname, target.range.begin)
                    .map(|id| self.env.arena.canonical(id));
                match found {
                    Some(tsym) => {
                        if self.ensure_table(tsym) {
                            if let Some(table) = self.env.arena.sym_mut(tsym).ty.as_table_mut() {
                                table.set_metatable(meta);
                            }
                        }
                        if self.env.arena[tsym].name == init.name {
                            tsym
                        } else {
                            self.mk(
                                &init.name,
                                init.location,
                                range,
                                init.is_local,
                                SymbolKind::Table,
                                Type::Ref(tsym),
                                scope,
                            )
                        }
                    }
                    None => self.mk(
                        &init.name,
                        init.location,
                        range,
                        init.is_local,
                        SymbolKind::Variable,
                        Type::ANY,
                        scope,
                    ),
                }
            }
            Some((ExprKind::Table(items), _)) => {
                let sym = self.mk(
                    &init.name,
                    init.location,
                    range,
                    init.is_local,
                    SymbolKind::Table,
                    Type::Table(Default::default()),
                    scope,
                );
                self.build_table(sym, items);
                if let Some(table) = self.env.arena.sym_mut(sym).ty.as_table_mut() {
                    table.set_metatable(meta);
                }
                sym
            }
            _ => self.mk(
                &init.name,
                init.location,
                range,
                init.is_local,
                SymbolKind::Variable,
                Type::ANY,
                scope,
            ),
        };
        place(self, sym);
        sym
    }

    /// Synthetic `__metatable` symbol: a parsed table constructor or a lazy
    /// reference over whatever expression was passed.
    fn metatable_symbol(&mut self, arg: Option<&ExprRef>) -> SymId {
        match arg {
            Some(m) => match &m.kind {
                ExprKind::Table(items) => {
                    let sym = self.mk(
                        "__metatable",
                        m.range,
                        m.range,
                        false,
                        SymbolKind::Table,
                        Type::Table(Default::default()),
                        Range::GLOBAL,
                    );
                    self.build_table(sym, items);
                    sym
                }
                _ => {
                    let ty = self.lazy(m, "__metatable", 0);
                    self.mk("__metatable", m.range, m.range, false, SymbolKind::Table, ty, Range::GLOBAL)
                }
            },
            None => self.mk(
                "__metatable",
                Range::new(0, 1),
                Range::new(0, 1),
                false,
                SymbolKind::Table,
                Type::ANY,
                Range::GLOBAL,
            ),
        }
    }
}
