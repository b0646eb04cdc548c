use super::Analyzer;
use crate::ast::{Expr, ExprKind, ExprRef, Indexer, Name, TableItem};
use crate::range::Range;
use crate::sym::{SymId, SymbolKind, Type};

/// One left-hand slot of a declaration, assignment or return. `index` is the
/// tuple position selected out of `expr` when the right-hand side is shorter
/// than the left and its last expression expands.
pub(crate) struct Init<'a> {
    pub expr: Option<&'a ExprRef>,
    pub index: usize,
    pub name: String,
    pub location: Range,
    pub is_local: bool,
}

impl<'e> Analyzer<'e> {
    /// Build the symbol for one init slot and hand it to `place`, which
    /// decides where it is registered (scope, table field, patched
    /// declaration, global). For function right-hand sides placement runs
    /// before the body walk so the body sees the finished binding.
    pub(crate) fn bind_init<F>(&mut self, init: Init<'_>, place: F) -> SymId
    where
        F: FnOnce(&mut Self, SymId),
    {
        let scope = if init.is_local {
            self.local_scope(init.location)
        } else {
            Range::GLOBAL
        };
        let range = match init.expr {
            Some(e) => Range::new(init.location.begin, e.range.end.max(init.location.end)),
            None => init.location,
        };
        let Some(expr) = init.expr else {
            let sym = self.mk(
                &init.name,
                init.location,
                range,
                init.is_local,
                SymbolKind::Variable,
                Type::ANY,
                scope,
            );
            place(self, sym);
            return sym;
        };
        match &expr.kind {
            ExprKind::Table(items) => {
                let sym = self.mk(
                    &init.name,
                    init.location,
                    range,
                    init.is_local,
                    SymbolKind::Table,
                    Type::Table(Default::default()),
                    scope,
                );
                place(self, sym);
                self.build_table(sym, items);
                sym
            }
            ExprKind::Function(body) => {
                // The declaration inherits the left-hand name and extends
                // leftward to its location.
                let range = Range::new(init.location.begin, body.range.end.max(init.location.end));
                let sym = self.mk(
                    &init.name,
                    init.location,
                    range,
                    init.is_local,
                    SymbolKind::Function,
                    Type::Function(Default::default()),
                    scope,
                );
                place(self, sym);
                self.walk_function(sym, body, None);
                sym
            }
            ExprKind::Call { callee, .. }
            | ExprKind::StringCall { callee, .. }
            | ExprKind::TableCall { callee, .. } => {
                if callee.as_name() == Some("setmetatable") {
                    return self.setmetatable_init(&init, expr, scope, range, place);
                }
                if let Some(import) = self.try_register_import(expr) {
                    let ty = self.env.arena[import].ty.clone();
                    let sym = self.mk(
                        &init.name,
                        init.location,
                        range,
                        init.is_local,
                        SymbolKind::Variable,
                        ty,
                        scope,
                    );
                    place(self, sym);
                    return sym;
                }
                let ty = self.lazy(expr, &init.name, init.index);
                let sym = self.mk(
                    &init.name,
                    init.location,
                    range,
                    init.is_local,
                    SymbolKind::Variable,
                    ty,
                    scope,
                );
                place(self, sym);
                sym
            }
            ExprKind::Name(source) if *source == init.name => {
                // `local x = x`: adopt the shadowed local's type; otherwise
                // the name refers to a global and the query engine answers.
                let ty = match self.stack.lookup(&self.env.arena, source, expr.range.begin) {
                    Some(prev) if self.env.arena[prev].is_local => self.share_type(prev),
                    _ => crate::query::type_of_global(self.env, source),
                };
                let sym = self.mk(
                    &init.name,
                    init.location,
                    range,
                    init.is_local,
                    SymbolKind::Variable,
                    ty,
                    scope,
                );
                place(self, sym);
                sym
            }
            _ => {
                let ty = self.lazy(expr, &init.name, init.index);
                let sym = self.mk(
                    &init.name,
                    init.location,
                    range,
                    init.is_local,
                    SymbolKind::Variable,
                    ty,
                    scope,
                );
                place(self, sym);
                sym
            }
        }
    }

    /// Structural types are shared by reference, everything else is copied.
    pub(crate) fn share_type(&self, sym: SymId) -> Type {
        match &self.env.arena[sym].ty {
            t @ (Type::Basic(_) | Type::Lazy(_) | Type::Ref(_)) => t.clone(),
            _ => Type::Ref(sym),
        }
    }

    /// Populate a table symbol from constructor fields. Only plain
    /// string-keyed entries contribute; bracketed and positional items are
    /// computed at runtime and ignored here.
    pub(crate) fn build_table(&mut self, owner: SymId, items: &[TableItem]) {
        for item in items {
            let TableItem::Named { key, value } = item else { continue };
            let field_init = Init {
                expr: Some(value),
                index: 0,
                name: key.name.clone(),
                location: key.range,
                is_local: false,
            };
            let field = key.name.clone();
            self.bind_init(field_init, move |a, sym| {
                if a.env.arena[sym].kind == SymbolKind::Variable {
                    a.env.arena.sym_mut(sym).kind = SymbolKind::Property;
                }
                if let Some(table) = a.env.arena.sym_mut(owner).ty.as_table_mut() {
                    table.set(&field, sym);
                }
                a.env.arena.sym_mut(owner).children.push(sym);
            });
        }
    }

    pub(crate) fn local_stmt(&mut self, names: &[Name], exprs: &[ExprRef]) {
        let mut prev: Option<(&ExprRef, usize)> = None;
        for (i, name) in names.iter().enumerate() {
            let (expr, index) = match exprs.get(i) {
                Some(e) => {
                    prev = Some((e, i));
                    (Some(e), 0)
                }
                None => match prev {
                    Some((e, at)) => (Some(e), i - at),
                    None => (None, 0),
                },
            };
            if name.name == "_" {
                continue;
            }
            let init = Init {
                expr,
                index,
                name: name.name.clone(),
                location: name.range,
                is_local: true,
            };
            self.bind_init(init, |a, sym| {
                a.stack.push(sym);
                a.add_child(sym);
            });
        }
    }

    pub(crate) fn assign_stmt(&mut self, targets: &[ExprRef], exprs: &[ExprRef]) {
        let mut prev: Option<(&ExprRef, usize)> = None;
        for (i, target) in targets.iter().enumerate() {
            let (expr, index) = match exprs.get(i) {
                Some(e) => {
                    prev = Some((e, i));
                    (Some(e), 0)
                }
                None => match prev {
                    Some((e, at)) => (Some(e), i - at),
                    None => (None, 0),
                },
            };
            match &target.kind {
                ExprKind::Name(name) => {
                    if name == "_" {
                        continue;
                    }
                    let name = name.clone();
                    self.assign_name(&name, target.range, expr, index);
                }
                ExprKind::Member { .. } | ExprKind::Index { .. } => self.assign_member(target, expr, index),
                _ => {}
            }
        }
    }

    fn assign_name(&mut self, name: &str, at: Range, expr: Option<&ExprRef>, index: usize) {
        match self.search(name, at.begin) {
            Some(existing) => {
                let (is_local, is_any) = {
                    let sym = &self.env.arena[existing];
                    (sym.is_local, sym.ty.is_any())
                };
                let init = Init {
                    expr,
                    index,
                    name: name.to_string(),
                    location: at,
                    is_local,
                };
                if is_local && is_any {
                    // `local x; x = 1` patches the declaration's type.
                    // Structural types are shared so a function body filled
                    // in after placement stays visible through the patch.
                    self.bind_init(init, move |a, fresh| {
                        if fresh != existing {
                            let ty = a.share_type(fresh);
                            a.env.arena.sym_mut(existing).ty = ty;
                        }
                    });
                } else {
                    // Already typed: the declaration wins; the right-hand
                    // side is still evaluated for its side effects.
                    self.bind_init(init, |_, _| {});
                }
            }
            None => {
                let init = Init {
                    expr,
                    index,
                    name: name.to_string(),
                    location: at,
                    is_local: false,
                };
                let field = name.to_string();
                if self.module_mode() {
                    let module = self.module;
                    let doc_range = self.doc_range;
                    self.bind_init(init, move |a, sym| {
                        a.env.arena.sym_mut(sym).scope = doc_range;
                        if let Some(table) = a.env.arena.sym_mut(module).ty.as_table_mut() {
                            table.set(&field, sym);
                        }
                    });
                } else {
                    self.bind_init(init, move |a, sym| {
                        a.env.set_global(&field, sym);
                        a.register_doc_global(&field, sym);
                    });
                }
            }
        }
    }

    /// `base.member = value` with dotted or bracket-string segments. The base
    /// chain must resolve to tables all the way down; anything else is
    /// skipped silently.
    fn assign_member(&mut self, target: &ExprRef, expr: Option<&ExprRef>, index: usize) {
        let Some((root, segments)) = flatten_path(target) else {
            return;
        };
        let Some(found) = self.search(&root.0, root.1.begin) else {
            return;
        };
        let mut base = self.env.arena.canonical(found);
        let last = segments.len() - 1;
        for seg in &segments[..last] {
            let Some(next) = self.env.arena[base].ty.as_table().and_then(|t| t.get(&seg.0)) else {
                return;
            };
            base = self.env.arena.canonical(next);
        }
        if self.env.arena[base].ty.as_table().is_none() {
            return;
        }
        let (field, at) = segments[last].clone();
        let init = Init {
            expr,
            index,
            name: field.clone(),
            location: at,
            is_local: false,
        };
        self.bind_init(init, move |a, sym| {
            if a.env.arena[sym].kind == SymbolKind::Variable {
                a.env.arena.sym_mut(sym).kind = SymbolKind::Property;
            }
            if let Some(table) = a.env.arena.sym_mut(base).ty.as_table_mut() {
                table.set(&field, sym);
            }
        });
    }

    pub(crate) fn return_stmt(&mut self, exprs: &[ExprRef]) {
        for (i, expr) in exprs.iter().enumerate() {
            let init = Init {
                expr: Some(expr),
                index: 0,
                name: format!("R{}", i),
                location: expr.range,
                is_local: true,
            };
            let sym = self.bind_init(init, |_, _| {});
            if i + 1 == exprs.len() && expr.kind.is_call() {
                if let Some(func) = self.current_func {
                    // A call in the last slot chains its whole multi-return.
                    let ty = self.env.arena[sym].ty.clone();
                    if let Some(f) = self.env.arena.sym_mut(func).ty.as_function_mut() {
                        f.tail_call = Some(Box::new(ty));
                    }
                }
            }
            match self.current_func {
                Some(func) => {
                    if let Some(f) = self.env.arena.sym_mut(func).ty.as_function_mut() {
                        f.set_return(i, sym);
                    }
                }
                None => {
                    let module = self.module;
                    if let Some(m) = self.env.arena.sym_mut(module).ty.as_module_mut() {
                        m.ret = Some(sym);
                    }
                }
            }
        }
    }
}

/// Flatten `a.b["c"].d` into a root name and member segments. Computed keys,
/// colon indexers and non-name roots yield `None`.
fn flatten_path(expr: &Expr) -> Option<((String, Range), Vec<(String, Range)>)> {
    let mut segments = Vec::new();
    let mut cur = expr;
    loop {
        match &cur.kind {
            ExprKind::Member {
                base,
                indexer: Indexer::Dot,
                name,
            } => {
                segments.push((name.name.clone(), name.range));
                cur = base;
            }
            ExprKind::Index { base, index } => {
                let key = index.as_str()?;
                segments.push((key.to_string(), index.range));
                cur = base;
            }
            ExprKind::Name(name) => {
                if segments.is_empty() {
                    return None;
                }
                segments.reverse();
                return Some(((name.clone(), cur.range), segments));
            }
            _ => return None,
        }
    }
}
