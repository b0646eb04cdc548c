use crate::range::Range;
use crate::sym::{ModuleType, SymId, Symbol, SymbolArena, SymbolKind, TableType, Type, ValidState};
use crate::util::fast_map::FastHashMap;
use once_cell::sync::Lazy;
use std::sync::Mutex;

/// What one analyzed document contributed: the pass-wide validity flag and
/// the module symbol. Entries are superseded by later passes for the same
/// uri, never removed.
#[derive(Debug)]
pub struct DocState {
    pub state: ValidState,
    pub module: SymId,
}

/// The process-wide global environment: the symbol arena, the `_G` module,
/// the shared global metatable and per-document state. Lookups that escape
/// all module and function frames fall through to `_G`.
///
/// Thread it into analysis calls explicitly; [`shared`] wraps one instance in
/// a mutex for single-host convenience.
#[derive(Debug)]
pub struct GlobalEnv {
    pub arena: SymbolArena,
    root: SymId,
    meta: SymId,
    docs: FastHashMap<String, DocState>,
}

impl GlobalEnv {
    pub fn new() -> Self {
        let mut arena = SymbolArena::new();
        let state = ValidState::new();
        let root = arena.alloc(Symbol::new(
            "_G",
            Range::new(0, 1),
            Range::GLOBAL,
            Range::GLOBAL,
            false,
            "",
            SymbolKind::Module,
            Type::Module(Box::new(ModuleType::new())),
            state.clone(),
        ));
        // The metatable every analyzed module shares: indexing falls back to _G.
        let index_field = arena.alloc(Symbol::new(
            "__index",
            Range::new(0, 1),
            Range::GLOBAL,
            Range::GLOBAL,
            false,
            "",
            SymbolKind::Property,
            Type::Ref(root),
            state.clone(),
        ));
        let mut meta_table = TableType::new();
        meta_table.set("__index", index_field);
        let meta = arena.alloc(Symbol::new(
            "__metatable",
            Range::new(0, 1),
            Range::GLOBAL,
            Range::GLOBAL,
            false,
            "",
            SymbolKind::Table,
            Type::Table(meta_table),
            state,
        ));
        Self {
            arena,
            root,
            meta,
            docs: FastHashMap::default(),
        }
    }

    /// The `_G` module symbol.
    pub fn root(&self) -> SymId {
        self.root
    }

    /// The metatable symbol shared by all analyzed modules.
    pub fn global_meta(&self) -> SymId {
        self.meta
    }

    pub fn get_global(&self, name: &str) -> Option<SymId> {
        self.arena[self.root].ty.as_table().and_then(|t| t.get(name))
    }

    pub fn set_global(&mut self, name: &str, sym: SymId) {
        let root = self.root;
        if let Some(table) = self.arena[root].ty.as_table_mut() {
            table.set(name, sym);
        }
    }

    pub fn doc(&self, uri: &str) -> Option<&DocState> {
        self.docs.get(uri)
    }

    pub fn set_doc(&mut self, uri: &str, doc: DocState) {
        self.docs.insert(uri.to_string(), doc);
    }

    /// Flip the previous pass for `uri` to invalid. Consumers holding
    /// symbols from that pass see them as stale.
    pub fn invalidate_doc(&mut self, uri: &str) {
        if let Some(doc) = self.docs.get(uri) {
            doc.state.invalidate();
        }
    }

    /// `ModuleType.search`: the module's scope stack filtered by position,
    /// then module fields, then `_G`.
    pub fn search_module(&self, module: SymId, name: &str, pos: usize) -> Option<SymId> {
        if let Some(m) = self.arena[module].ty.as_module() {
            if let Some(hit) = m.menv.stack.lookup(&self.arena, name, pos) {
                return Some(hit);
            }
            if let Some(hit) = m.table.get(name) {
                return Some(hit);
            }
        }
        self.get_global(name)
    }

    /// Merge a re-analyzed module into the one already registered: adopt a
    /// field only when the original has no entry or the entry is stale.
    /// Fields that disappeared from the new analysis are left in place.
    pub fn merge_module_fields(&mut self, existing: SymId, fresh: SymId) {
        let new_fields: Vec<(String, SymId)> = match self.arena[fresh].ty.as_table() {
            Some(table) => table.fields().map(|(n, s)| (n.to_string(), s)).collect(),
            None => return,
        };
        for (name, sym) in new_fields {
            let adopt = match self.arena[existing].ty.as_table().and_then(|t| t.get(&name)) {
                Some(orig) => !self.arena[orig].valid(),
                None => true,
            };
            if adopt {
                tracing::trace!(field = %name, "adopting module field");
                if let Some(table) = self.arena[existing].ty.as_table_mut() {
                    table.set(&name, sym);
                }
            }
        }
    }
}

impl Default for GlobalEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide environment for single-threaded hosts. Hosts analyzing
/// documents in parallel must keep holding the lock across an entire
/// analysis.
pub fn shared() -> &'static Mutex<GlobalEnv> {
    static SHARED: Lazy<Mutex<GlobalEnv>> = Lazy::new(|| Mutex::new(GlobalEnv::new()));
    &SHARED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sym::BasicType;

    fn global_sym(env: &mut GlobalEnv, name: &str, state: ValidState) -> SymId {
        env.arena.alloc(Symbol::new(
            name,
            Range::new(0, 1),
            Range::GLOBAL,
            Range::GLOBAL,
            false,
            "test.lua",
            SymbolKind::Variable,
            Type::Basic(BasicType::Any),
            state,
        ))
    }

    #[test]
    fn test_global_metatable_indexes_into_root() {
        let env = GlobalEnv::new();
        let meta = env.global_meta();
        let table = env.arena[meta].ty.as_table().unwrap();
        let index = table.get("__index").unwrap();
        assert_eq!(env.arena.canonical(index), env.root());
    }

    #[test]
    fn test_set_and_get_global() {
        let mut env = GlobalEnv::new();
        let sym = global_sym(&mut env, "print", ValidState::new());
        env.set_global("print", sym);
        assert_eq!(env.get_global("print"), Some(sym));
        assert_eq!(env.get_global("missing"), None);
    }

    #[test]
    fn test_merge_adopts_only_absent_or_stale_fields() {
        let mut env = GlobalEnv::new();
        let old_state = ValidState::new();
        let old_kept = global_sym(&mut env, "kept", old_state.clone());
        let old_stale = global_sym(&mut env, "stale", old_state.clone());

        let existing = env.arena.alloc(Symbol::new(
            "m",
            Range::new(0, 1),
            Range::GLOBAL,
            Range::GLOBAL,
            false,
            "a.lua",
            SymbolKind::Module,
            Type::Module(Box::new(ModuleType::new())),
            old_state.clone(),
        ));
        if let Some(t) = env.arena[existing].ty.as_table_mut() {
            t.set("kept", old_kept);
            t.set("stale", old_stale);
        }

        let new_state = ValidState::new();
        let new_stale = global_sym(&mut env, "stale", new_state.clone());
        let new_added = global_sym(&mut env, "added", new_state.clone());
        let fresh = env.arena.alloc(Symbol::new(
            "m",
            Range::new(0, 1),
            Range::GLOBAL,
            Range::GLOBAL,
            false,
            "a.lua",
            SymbolKind::Module,
            Type::Module(Box::new(ModuleType::new())),
            new_state,
        ));
        if let Some(t) = env.arena[fresh].ty.as_table_mut() {
            t.set("stale", new_stale);
            t.set("added", new_added);
        }

        // First merge: the old pass is still valid, only `added` is adopted.
        env.merge_module_fields(existing, fresh);
        let table = env.arena[existing].ty.as_table().unwrap();
        assert_eq!(table.get("kept"), Some(old_kept));
        assert_eq!(table.get("stale"), Some(old_stale));
        assert_eq!(table.get("added"), Some(new_added));

        // After invalidation the stale entry is replaced, the vanished one leaks.
        old_state.invalidate();
        env.merge_module_fields(existing, fresh);
        let table = env.arena[existing].ty.as_table().unwrap();
        assert_eq!(table.get("stale"), Some(new_stale));
        assert_eq!(table.get("kept"), Some(old_kept));
    }

    #[test]
    fn test_invalidate_doc_flips_previous_pass() {
        let mut env = GlobalEnv::new();
        let state = ValidState::new();
        let module = global_sym(&mut env, "m", state.clone());
        env.set_doc(
            "file:///a.lua",
            DocState {
                state: state.clone(),
                module,
            },
        );
        assert!(state.valid());
        env.invalidate_doc("file:///a.lua");
        assert!(!state.valid());
        // Unknown uris are a no-op
        env.invalidate_doc("file:///other.lua");
    }
}
