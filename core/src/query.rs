use crate::ast::{BinOp, Expr, ExprKind, UnOp};
use crate::globals::GlobalEnv;
use crate::sym::{BasicType, LazyType, SymId, Type};

/// Bound on lazy/alias indirection so reference cycles degrade to `any`
/// instead of recursing.
const MAX_DEPTH: usize = 16;

/// Type of a `_G` entry, shallowly resolved. Entry point for the
/// `local x = x` global shortcut.
pub fn type_of_global(env: &GlobalEnv, name: &str) -> Type {
    match env.get_global(name) {
        Some(sym) => resolved(env, sym, 0),
        None => Type::ANY,
    }
}

/// A symbol's type with `Lazy` and `Ref` indirections resolved.
pub fn type_of(env: &GlobalEnv, sym: SymId) -> Type {
    resolved(env, sym, 0)
}

/// Force a deferred reference: re-walk the recorded node inside its module
/// context and select the recorded tuple position. Pure; never mutates the
/// environment.
pub fn force(env: &GlobalEnv, lazy: &LazyType) -> Type {
    force_at(env, lazy, 0)
}

fn resolved(env: &GlobalEnv, sym: SymId, depth: usize) -> Type {
    if depth > MAX_DEPTH {
        return Type::ANY;
    }
    match &env.arena[sym].ty {
        Type::Ref(target) => resolved(env, *target, depth + 1),
        Type::Lazy(lazy) => force_at(env, lazy, depth + 1),
        other => other.clone(),
    }
}

fn force_at(env: &GlobalEnv, lazy: &LazyType, depth: usize) -> Type {
    if depth > MAX_DEPTH {
        return Type::ANY;
    }
    eval(env, lazy.context, &lazy.node, lazy.index, depth)
}

/// Evaluate an expression node to a type, best-effort. Anything the walk
/// cannot see through is `any`.
fn eval(env: &GlobalEnv, module: SymId, expr: &Expr, index: usize, depth: usize) -> Type {
    if depth > MAX_DEPTH {
        return Type::ANY;
    }
    match &expr.kind {
        ExprKind::Nil => Type::Basic(BasicType::Nil),
        ExprKind::True | ExprKind::False => Type::Basic(BasicType::Boolean),
        ExprKind::Number(_) => Type::Basic(BasicType::Number),
        ExprKind::Str(_) => Type::Basic(BasicType::String),
        ExprKind::Table(_) => Type::Basic(BasicType::Table),
        ExprKind::Function(_) => Type::Function(Default::default()),
        ExprKind::Name(name) => match env.search_module(module, name, expr.range.begin) {
            Some(sym) => resolved(env, sym, depth + 1),
            None => Type::ANY,
        },
        ExprKind::Member { base, name, .. } => {
            let base_ty = eval(env, module, base, 0, depth + 1);
            match base_ty.as_table().and_then(|t| t.get(&name.name)) {
                Some(field) => resolved(env, field, depth + 1),
                None => Type::ANY,
            }
        }
        ExprKind::Call { callee, .. }
        | ExprKind::StringCall { callee, .. }
        | ExprKind::TableCall { callee, .. } => call_slot(env, module, callee, index, depth),
        ExprKind::Unary { op, .. } => match op {
            UnOp::Not => Type::Basic(BasicType::Boolean),
            UnOp::Neg | UnOp::Len => Type::Basic(BasicType::Number),
        },
        ExprKind::Binary { op, .. } => match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                Type::Basic(BasicType::Number)
            }
            BinOp::Concat => Type::Basic(BasicType::String),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                Type::Basic(BasicType::Boolean)
            }
            BinOp::And | BinOp::Or => Type::ANY,
        },
        _ => Type::ANY,
    }
}

/// Select return tuple position `index` of a call through the callee's
/// function type, consulting the recorded tail call for trailing positions.
fn call_slot(env: &GlobalEnv, module: SymId, callee: &Expr, index: usize, depth: usize) -> Type {
    let callee_ty = eval(env, module, callee, 0, depth + 1);
    let Some(f) = callee_ty.as_function() else {
        return Type::ANY;
    };
    if let Some(sym) = f.ret(index) {
        return resolved(env, sym, depth + 1);
    }
    let nret = f.returns().len();
    if index + 1 >= nret.max(1) {
        if let Some(tail) = &f.tail_call {
            let offset = (index + 1).saturating_sub(nret.max(1));
            return match tail.as_ref() {
                Type::Lazy(l) => {
                    let shifted = LazyType {
                        index: l.index + offset,
                        ..l.clone()
                    };
                    force_at(env, &shifted, depth + 1)
                }
                other if offset == 0 => other.clone(),
                _ => Type::ANY,
            };
        }
    }
    Type::ANY
}
