use super::Analyzer;
use crate::ast::{Expr, FuncBody, FuncName, Name};
use crate::range::Range;
use crate::sym::{SymId, SymbolKind, Type};

impl<'e> Analyzer<'e> {
    pub(crate) fn function_stmt(&mut self, name: &FuncName, local: bool, body: &FuncBody) {
        if name.is_simple() {
            let declared = name.last().clone();
            self.simple_function(&declared, local, body);
        } else {
            self.method_function(name, body);
        }
    }

    /// `function foo() end` / `local function foo() end`. A prior local
    /// declaration of the same name is retargeted in place, so
    /// `local foo; function foo() end` leaves exactly one symbol.
    fn simple_function(&mut self, declared: &Name, local: bool, body: &FuncBody) {
        let location = declared.range;
        let existing = self
            .stack
            .lookup(&self.env.arena, &declared.name, location.begin)
            .filter(|&id| self.env.arena[id].is_local);
        if let Some(id) = existing {
            let scope = self.function_scope(location, body);
            let sym = self.env.arena.sym_mut(id);
            sym.location = location;
            sym.range = body.range;
            sym.scope = scope;
            sym.kind = SymbolKind::Function;
            sym.ty = Type::Function(Default::default());
            self.walk_function(id, body, None);
            return;
        }
        if local {
            let scope = self.function_scope(location, body);
            let sym = self.mk(
                &declared.name,
                location,
                body.range,
                true,
                SymbolKind::Function,
                Type::Function(Default::default()),
                scope,
            );
            self.stack.push(sym);
            self.add_child(sym);
            self.walk_function(sym, body, None);
            return;
        }
        let module_mode = self.module_mode();
        let scope = if module_mode { self.doc_range } else { Range::GLOBAL };
        let sym = self.mk(
            &declared.name,
            location,
            body.range,
            false,
            SymbolKind::Function,
            Type::Function(Default::default()),
            scope,
        );
        self.add_child(sym);
        if module_mode {
            let module = self.module;
            if let Some(table) = self.env.arena.sym_mut(module).ty.as_table_mut() {
                table.set(&declared.name, sym);
            }
        } else {
            self.env.set_global(&declared.name, sym);
            self.register_doc_global(&declared.name, sym);
        }
        self.walk_function(sym, body, None);
    }

    /// `function A.B.m() end` / `function A.B:m() end`: the dotted base must
    /// resolve to a table, which is promoted to a class. Colon syntax
    /// synthesizes a `self` parameter carrying the base's type.
    fn method_function(&mut self, name: &FuncName, body: &FuncBody) {
        let declared = name.last().clone();
        let parent = self.resolve_parent(name);
        let fsym = self.mk(
            &declared.name,
            declared.range,
            body.range,
            false,
            SymbolKind::Function,
            Type::Function(Default::default()),
            self.doc_range,
        );
        if let Some(parent) = parent {
            let kind = self.env.arena[parent].kind;
            if !matches!(kind, SymbolKind::Module | SymbolKind::Class) {
                self.env.arena.sym_mut(parent).kind = SymbolKind::Class;
            }
            if let Some(table) = self.env.arena.sym_mut(parent).ty.as_table_mut() {
                table.set(&declared.name, fsym);
            }
            self.env.arena.sym_mut(parent).children.push(fsym);
        }
        let self_parent = if name.is_method { parent } else { None };
        self.walk_function(fsym, body, self_parent);
    }

    /// Scope of a local function symbol. The `function` keyword precedes the
    /// declared name, so the scope start is pulled back to cover the whole
    /// definition range.
    fn function_scope(&self, location: Range, body: &FuncBody) -> Range {
        let frame = self.stack.frame_range();
        Range::new(location.begin.min(body.range.begin), frame.end)
    }

    /// Resolve the dotted base of a function declaration name, descending
    /// through table fields from the root scope stack.
    fn resolve_parent(&mut self, name: &FuncName) -> Option<SymId> {
        let root = &name.segments[0];
        let found = self.search(&root.name, root.range.begin)?;
        let mut cur = self.env.arena.canonical(found);
        for seg in &name.segments[1..name.segments.len() - 1] {
            let next = self.env.arena[cur].ty.as_table().and_then(|t| t.get(&seg.name))?;
            cur = self.env.arena.canonical(next);
        }
        if self.ensure_table(cur) {
            Some(cur)
        } else {
            None
        }
    }

    /// Anonymous function reached while walking an expression: a synthesized
    /// name keyed by position, location spanning the whole node.
    pub(crate) fn anonymous_function(&mut self, expr: &Expr, body: &FuncBody) {
        let name = format!("anon_{}", expr.range.begin);
        let scope = self.local_scope(expr.range);
        let sym = self.mk(
            &name,
            expr.range,
            expr.range,
            true,
            SymbolKind::Function,
            Type::Function(Default::default()),
            scope,
        );
        self.stack.push(sym);
        self.add_child(sym);
        self.walk_function(sym, body, None);
    }

    /// Shared body walk: open the function's frame, bind parameters into
    /// their slots (shifted past a synthesized `self`), walk the block under
    /// the function stack, then close the frame at the body's end.
    pub(crate) fn walk_function(&mut self, fsym: SymId, body: &FuncBody, self_parent: Option<SymId>) {
        self.stack.enter(body.range);
        let frame = self.stack.frame_range();
        let offset = usize::from(self_parent.is_some());
        for (i, param) in body.params.iter().enumerate() {
            if param.name == "_" {
                continue;
            }
            let sym = self.mk(
                &param.name,
                param.range,
                param.range,
                true,
                SymbolKind::Parameter,
                Type::ANY,
                Range::range_of(param.range, frame),
            );
            self.stack.push(sym);
            if let Some(f) = self.env.arena.sym_mut(fsym).ty.as_function_mut() {
                f.set_param(i + offset, sym);
            }
        }
        if let Some(parent) = self_parent {
            let at = Range::new(body.range.begin, body.range.begin + 1);
            let sym = self.mk(
                "self",
                at,
                at,
                true,
                SymbolKind::Parameter,
                Type::Ref(parent),
                Range::range_of(at, frame),
            );
            self.stack.push(sym);
            if let Some(f) = self.env.arena.sym_mut(fsym).ty.as_function_mut() {
                f.set_param(0, sym);
            }
        }
        self.enter_function(fsym);
        self.walk_block(&body.block);
        self.exit_function();
        self.stack.exit_clamp(&mut self.env.arena, body.range.end);
    }
}
