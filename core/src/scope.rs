use crate::range::Range;
use crate::sym::{SymbolArena, SymId};

#[derive(Debug, Clone, Copy)]
struct Frame {
    base: usize,
    range: Range,
}

/// Flat sequence of declared symbols with frame markers. Symbols are never
/// popped: lookups filter by declaration position and scope membership, which
/// keeps the full table available for out-of-order queries while preserving
/// lexical visibility.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    syms: Vec<SymId>,
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sym: SymId) {
        self.syms.push(sym);
    }

    pub fn enter(&mut self, range: Range) {
        self.frames.push(Frame {
            base: self.syms.len(),
            range,
        });
    }

    /// Pop the innermost frame, re-stamping the scope end of every symbol
    /// pushed within it. The clamp takes the minimum so symbols of inner
    /// frames keep their tighter bound.
    pub fn exit_clamp(&mut self, arena: &mut SymbolArena, end: usize) {
        let Some(frame) = self.frames.pop() else { return };
        for &id in &self.syms[frame.base..] {
            let scope = &mut arena.sym_mut(id).scope;
            scope.end = scope.end.min(end);
        }
    }

    /// Range of the innermost open frame.
    pub fn frame_range(&self) -> Range {
        match self.frames.last() {
            Some(frame) => frame.range,
            None => Range::GLOBAL,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn symbols(&self) -> &[SymId] {
        &self.syms
    }

    /// First match walking tail to head.
    pub fn search<P>(&self, predicate: P) -> Option<SymId>
    where
        P: Fn(SymId) -> bool,
    {
        self.syms.iter().rev().copied().find(|&id| predicate(id))
    }

    /// Resolve `name` as seen from `pos`: a declaration is visible only at or
    /// after its own location and inside its scope range.
    pub fn lookup(&self, arena: &SymbolArena, name: &str, pos: usize) -> Option<SymId> {
        self.search(|id| {
            let sym = &arena[id];
            sym.name == name && sym.location.begin <= pos && sym.scope.contains(pos)
        })
    }
}
