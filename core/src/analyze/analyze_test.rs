use super::*;
use crate::query;
use crate::sym::{FunctionType, TableType};

fn run(env: &mut GlobalEnv, code: &str, uri: &str) -> SymId {
    analyze(env, code, uri).unwrap()
}

fn module_table(env: &GlobalEnv, module: SymId) -> &TableType {
    env.arena[module].ty.as_table().unwrap()
}

fn find_child(env: &GlobalEnv, parent: SymId, name: &str) -> Option<SymId> {
    env.arena[parent]
        .children
        .iter()
        .copied()
        .find(|&c| env.arena[c].name == name)
}

fn fn_type(env: &GlobalEnv, sym: SymId) -> &FunctionType {
    env.arena[sym].ty.as_function().unwrap()
}

#[test]
fn test_symbol_ranges_nest() {
    let mut env = GlobalEnv::new();
    let code = "\
local M = {}
local count = 1
function M:inc(step)
  local next = count + step
  return next
end
for i = 1, 3 do
  local doubled = i * 2
end
return M
";
    run(&mut env, code, "file:///nest.lua");
    for (_, sym) in env.arena.iter() {
        assert!(
            sym.range.contains_range(&sym.location),
            "location {} outside range {} for {}",
            sym.location,
            sym.range,
            sym.name
        );
        assert!(
            sym.scope.contains_range(&sym.range),
            "range {} outside scope {} for {}",
            sym.range,
            sym.scope,
            sym.name
        );
    }
}

#[test]
fn test_placeholder_never_appears() {
    let mut env = GlobalEnv::new();
    let code = "\
local _, b = f()
for _ in pairs(t) do end
_ = 10
";
    run(&mut env, code, "file:///ph.lua");
    for (_, sym) in env.arena.iter() {
        assert_ne!(sym.name, "_");
    }
}

#[test]
fn test_local_then_function_retargets() {
    let mut env = GlobalEnv::new();
    let code = "local foo\nfunction foo() end";
    let module = run(&mut env, code, "file:///retarget.lua");

    let foos: Vec<SymId> = env.arena[module]
        .children
        .iter()
        .copied()
        .filter(|&c| env.arena[c].name == "foo")
        .collect();
    assert_eq!(foos.len(), 1);
    let foo = &env.arena[foos[0]];
    assert_eq!(foo.kind, SymbolKind::Function);
    assert!(foo.is_local);
    // Location moved to the second declaration
    assert_eq!(foo.location.begin, code.find("function foo").unwrap() + 9);
    assert!(matches!(foo.ty, Type::Function(_)));
    // The function did not leak into _G
    assert!(env.get_global("foo").is_none());
}

#[test]
fn test_method_declaration_and_self() {
    let mut env = GlobalEnv::new();
    let code = "\
local M = {}
function M:hello(name)
  return name
end
return M
";
    let module = run(&mut env, code, "file:///class.lua");

    let m = find_child(&env, module, "M").unwrap();
    assert_eq!(env.arena[m].kind, SymbolKind::Class);

    let hello = env.arena[m].ty.as_table().unwrap().get("hello").unwrap();
    assert_eq!(env.arena[hello].kind, SymbolKind::Function);

    // Slot 0 is the synthesized self bound to M, the formal shifts to slot 1
    let f = fn_type(&env, hello);
    let self_param = f.param(0).unwrap();
    assert_eq!(env.arena[self_param].name, "self");
    assert_eq!(env.arena[self_param].kind, SymbolKind::Parameter);
    assert_eq!(env.arena.canonical(self_param), m);
    let name_param = f.param(1).unwrap();
    assert_eq!(env.arena[name_param].name, "name");

    // The method's first return chains to the untyped parameter
    let ret = f.ret(0).unwrap();
    assert!(query::type_of(&env, ret).is_any());

    // The chunk returns M
    let module_ret = env.arena[module].ty.as_module().unwrap().ret.unwrap();
    let ret_ty = query::type_of(&env, module_ret);
    assert!(ret_ty.as_table().is_some());
    assert!(ret_ty.as_table().unwrap().get("hello").is_some());
}

#[test]
fn test_module_mode_registers_in_globals() {
    let mut env = GlobalEnv::new();
    let code = "module(\"foo\")\nfunction bar() end";
    let module = run(&mut env, code, "file:///foo.lua");

    assert!(env.arena[module].ty.as_module().unwrap().module_mode);
    assert_eq!(env.arena[module].name, "foo");
    // bar became a module field, not a _G entry
    assert!(module_table(&env, module).get("bar").is_some());
    assert!(env.get_global("bar").is_none());
    assert_eq!(env.get_global("foo"), Some(module));
}

#[test]
fn test_module_merge_is_idempotent() {
    let mut env = GlobalEnv::new();
    let code = "module(\"m\")\nfunction a() end\nfunction b() end";
    run(&mut env, code, "file:///m.lua");
    let first: Vec<String> = {
        let g = env.get_global("m").unwrap();
        module_table(&env, g).fields().map(|(n, _)| n.to_string()).collect()
    };

    run(&mut env, code, "file:///m.lua");
    let g = env.get_global("m").unwrap();
    let second: Vec<String> = module_table(&env, g).fields().map(|(n, _)| n.to_string()).collect();
    assert_eq!(first, second);
    // Every surviving field belongs to the valid pass
    for (_, sym) in module_table(&env, g).fields() {
        assert!(env.arena[sym].valid());
    }
}

#[test]
fn test_module_merge_across_documents() {
    let mut env = GlobalEnv::new();
    run(&mut env, "module(\"shared\")\nfunction a() end", "file:///a.lua");
    run(&mut env, "module(\"shared\")\nfunction b() end", "file:///b.lua");

    let g = env.get_global("shared").unwrap();
    let table = module_table(&env, g);
    // Both documents contributed; the first registration kept its valid fields
    assert!(table.get("a").is_some());
    assert!(table.get("b").is_some());
}

#[test]
fn test_assignment_preserves_typed_local() {
    let mut env = GlobalEnv::new();
    let code = "local x = 1\nx = \"str\"";
    let module = run(&mut env, code, "file:///keep.lua");

    let x = find_child(&env, module, "x").unwrap();
    let ty = query::type_of(&env, x);
    assert!(matches!(ty, Type::Basic(BasicType::Number)));
}

#[test]
fn test_assignment_patches_untyped_local() {
    let mut env = GlobalEnv::new();
    let code = "local y\ny = 2";
    let module = run(&mut env, code, "file:///patch.lua");

    let ys: Vec<SymId> = env.arena[module]
        .children
        .iter()
        .copied()
        .filter(|&c| env.arena[c].name == "y")
        .collect();
    assert_eq!(ys.len(), 1);
    let ty = query::type_of(&env, ys[0]);
    assert!(matches!(ty, Type::Basic(BasicType::Number)));
}

#[test]
fn test_require_adds_import() {
    let mut env = GlobalEnv::new();
    let code = "local socket = require(\"socket.core\")";
    let module = run(&mut env, code, "file:///req.lua");

    let imports = env.arena[module].ty.as_module().unwrap().imports().to_vec();
    assert_eq!(imports.len(), 1);
    let import = &env.arena[imports[0]];
    assert_eq!(import.name, "core");
    assert_eq!(import.kind, SymbolKind::Module);
    assert!(matches!(&import.ty, Type::Lazy(l) if l.name == "core"));

    // The local is a lazy reference to the import
    let socket = find_child(&env, module, "socket").unwrap();
    assert!(matches!(&env.arena[socket].ty, Type::Lazy(l) if l.name == "core"));
}

#[test]
fn test_pcall_require_forms() {
    let mut env = GlobalEnv::new();
    let code = "\
pcall(require, \"json\")
local lfs = require(\"lfs\")
pcall(require, path_variable)
";
    let module = run(&mut env, code, "file:///pc.lua");
    let imports = env.arena[module].ty.as_module().unwrap().imports().to_vec();
    // The non-literal path is dropped silently
    assert_eq!(imports.len(), 2);
    assert_eq!(env.arena[imports[0]].name, "json");
    assert_eq!(env.arena[imports[1]].name, "lfs");
}

#[test]
fn test_multi_assignment_with_trailing_call() {
    let mut env = GlobalEnv::new();
    let code = "local a, b, c = true, f()";
    let module = run(&mut env, code, "file:///multi.lua");

    let a = find_child(&env, module, "a").unwrap();
    assert!(matches!(
        query::type_of(&env, a),
        Type::Basic(BasicType::Boolean)
    ));

    // b and c index the trailing call at tuple positions 0 and 1
    let b = find_child(&env, module, "b").unwrap();
    let c = find_child(&env, module, "c").unwrap();
    match (&env.arena[b].ty, &env.arena[c].ty) {
        (Type::Lazy(lb), Type::Lazy(lc)) => {
            assert_eq!(lb.index, 0);
            assert_eq!(lc.index, 1);
            assert!(lb.node.kind.is_call());
            assert!(lc.node.kind.is_call());
        }
        other => panic!("expected lazy bindings, got {:?}", other),
    }
}

#[test]
fn test_setmetatable_as_init() {
    let mut env = GlobalEnv::new();
    let code = "local T = setmetatable({}, { __index = base })";
    let module = run(&mut env, code, "file:///meta.lua");

    let t = find_child(&env, module, "T").unwrap();
    assert_eq!(env.arena[t].kind, SymbolKind::Table);
    let table = env.arena[t].ty.as_table().unwrap();
    let meta = table.metatable.unwrap();
    assert_eq!(env.arena[meta].name, "__metatable");
    let meta_table = env.arena[meta].ty.as_table().unwrap();
    assert!(meta_table.get("__index").is_some());
}

#[test]
fn test_setmetatable_standalone() {
    let mut env = GlobalEnv::new();
    let code = "local T = {}\nsetmetatable(T, { __call = handler })";
    let module = run(&mut env, code, "file:///meta2.lua");

    let t = find_child(&env, module, "T").unwrap();
    let meta = env.arena[t].ty.as_table().unwrap().metatable.unwrap();
    assert!(env.arena[meta].ty.as_table().unwrap().get("__call").is_some());
}

#[test]
fn test_setmetatable_reuses_declaration() {
    let mut env = GlobalEnv::new();
    let code = "local T = {}\nlocal T = setmetatable(T, {})";
    let module = run(&mut env, code, "file:///meta3.lua");

    let t = find_child(&env, module, "T").unwrap();
    assert!(env.arena[t].ty.as_table().unwrap().metatable.is_some());
}

#[test]
fn test_numeric_for_scopes() {
    let mut env = GlobalEnv::new();
    let code = "for i = 1, 10 do local x = i end";
    let module = run(&mut env, code, "file:///loop.lua");

    let inside = code.find("x = i").unwrap() + 4;
    let after = code.len() + 1;

    let i = env.search_module(module, "i", inside).unwrap();
    assert_eq!(env.arena[i].kind, SymbolKind::Variable);
    assert!(matches!(env.arena[i].ty, Type::Basic(BasicType::Number)));

    let x = env.search_module(module, "x", inside).unwrap();
    assert!(env.arena[x].is_local);

    // Neither is visible past the loop
    assert!(env.search_module(module, "i", after).is_none());
    assert!(env.search_module(module, "x", after).is_none());
}

#[test]
fn test_generic_for_binds_lazy_tuples() {
    let mut env = GlobalEnv::new();
    let code = "for k, v in pairs(t) do local _ = k end";
    let module = run(&mut env, code, "file:///gfor.lua");

    let inside = code.find("local").unwrap();
    let k = env.search_module(module, "k", inside).unwrap();
    let v = env.search_module(module, "v", inside).unwrap();
    match (&env.arena[k].ty, &env.arena[v].ty) {
        (Type::Lazy(lk), Type::Lazy(lv)) => {
            assert_eq!(lk.index, 0);
            assert_eq!(lv.index, 1);
            assert!(lk.node.kind.is_call());
        }
        other => panic!("expected lazy iteration variables, got {:?}", other),
    }
}

#[test]
fn test_block_statements_open_scopes() {
    let mut env = GlobalEnv::new();
    let code = "\
do local a = 1 end
if cond then local b = 2 else local c = 3 end
while cond do local d = 4 end
repeat local e = 5 until cond
";
    let module = run(&mut env, code, "file:///blocks.lua");

    let after = code.len() + 1;
    for name in ["a", "b", "c", "d", "e"] {
        assert!(
            env.search_module(module, name, after).is_none(),
            "{} escaped its block",
            name
        );
    }
    let in_b = code.find("b = 2").unwrap();
    assert!(env.search_module(module, "b", in_b).is_some());
    let in_e = code.find("e = 5").unwrap();
    assert!(env.search_module(module, "e", in_e).is_some());
}

#[test]
fn test_plain_global_assignment() {
    let mut env = GlobalEnv::new();
    let code = "g = 1\nfunction gf() end";
    let module = run(&mut env, code, "file:///glob.lua");

    let g = env.get_global("g").unwrap();
    assert!(!env.arena[g].is_local);
    assert_eq!(env.arena[g].scope, Range::GLOBAL);
    assert!(matches!(
        query::type_of(&env, g),
        Type::Basic(BasicType::Number)
    ));

    assert!(env.get_global("gf").is_some());
    // Both were recorded in the document's globals map
    let menv = &env.arena[module].ty.as_module().unwrap().menv;
    assert!(menv.globals.contains_key("g"));
    assert!(menv.globals.contains_key("gf"));
}

#[test]
fn test_member_assignment_extends_tables() {
    let mut env = GlobalEnv::new();
    let code = "\
local t = {}
t.x = 1
t.nested = {}
t.nested.z = \"s\"
u.v = 1
";
    let module = run(&mut env, code, "file:///fields.lua");

    let t = find_child(&env, module, "t").unwrap();
    let table = env.arena[t].ty.as_table().unwrap();
    let x = table.get("x").unwrap();
    assert_eq!(env.arena[x].kind, SymbolKind::Property);
    let nested = table.get("nested").unwrap();
    let z = env.arena[nested].ty.as_table().unwrap().get("z").unwrap();
    assert!(matches!(
        query::type_of(&env, z),
        Type::Basic(BasicType::String)
    ));

    // Unresolvable bases are skipped without effect
    assert!(env.get_global("u").is_none());
}

#[test]
fn test_table_constructor_fields() {
    let mut env = GlobalEnv::new();
    let code = "local cfg = { name = \"x\", count = 1, nested = { a = 1 }, [computed] = 2, 5 }";
    let module = run(&mut env, code, "file:///ctor.lua");

    let cfg = find_child(&env, module, "cfg").unwrap();
    let table = env.arena[cfg].ty.as_table().unwrap();
    let names: Vec<&str> = table.fields().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["name", "count", "nested"]);

    let count = table.get("count").unwrap();
    assert_eq!(env.arena[count].kind, SymbolKind::Property);
    assert!(matches!(
        query::type_of(&env, count),
        Type::Basic(BasicType::Number)
    ));
    let nested = table.get("nested").unwrap();
    assert_eq!(env.arena[nested].kind, SymbolKind::Table);
    assert!(env.arena[nested].ty.as_table().unwrap().get("a").is_some());
}

#[test]
fn test_tail_call_chains_multi_returns() {
    let mut env = GlobalEnv::new();
    let code = "\
local function inner() return 1, \"s\" end
local function outer() return inner() end
local a, b = outer()
";
    let module = run(&mut env, code, "file:///tail.lua");

    let outer = find_child(&env, module, "outer").unwrap();
    assert!(fn_type(&env, outer).tail_call.is_some());

    let a = find_child(&env, module, "a").unwrap();
    let b = find_child(&env, module, "b").unwrap();
    assert!(matches!(
        query::type_of(&env, a),
        Type::Basic(BasicType::Number)
    ));
    assert!(matches!(
        query::type_of(&env, b),
        Type::Basic(BasicType::String)
    ));
}

#[test]
fn test_anonymous_function_argument() {
    let mut env = GlobalEnv::new();
    let code = "register(function(a, b) local c = 1 end)";
    let module = run(&mut env, code, "file:///anon.lua");

    let anon = env.arena[module]
        .children
        .iter()
        .copied()
        .find(|&c| env.arena[c].name.starts_with("anon_"))
        .unwrap();
    assert_eq!(env.arena[anon].kind, SymbolKind::Function);
    assert_eq!(fn_type(&env, anon).params().len(), 2);
    // Its local landed in the function's outline, not the module's
    assert!(find_child(&env, anon, "c").is_some());
    assert!(find_child(&env, module, "c").is_none());
}

#[test]
fn test_identity_shortcut_copies_local_type() {
    let mut env = GlobalEnv::new();
    let code = "\
local x = 1
do
  local x = x
  local y = x
end
";
    let module = run(&mut env, code, "file:///shadow.lua");

    let inner = code.rfind("local x = x").unwrap() + 6;
    let x = env.search_module(module, "x", inner + 20).unwrap();
    assert!(matches!(
        query::type_of(&env, x),
        Type::Basic(BasicType::Number)
    ));
}

#[test]
fn test_identity_shortcut_asks_globals() {
    let mut env = GlobalEnv::new();
    let print = env.arena.alloc(crate::sym::Symbol::new(
        "print",
        Range::new(0, 1),
        Range::GLOBAL,
        Range::GLOBAL,
        false,
        "",
        SymbolKind::Function,
        Type::Function(Default::default()),
        ValidState::new(),
    ));
    env.set_global("print", print);

    let code = "local print = print";
    let module = run(&mut env, code, "file:///ident.lua");
    let local_print = find_child(&env, module, "print").unwrap();
    assert!(matches!(
        query::type_of(&env, local_print),
        Type::Function(_)
    ));
}

#[test]
fn test_reanalysis_invalidates_previous_pass() {
    let mut env = GlobalEnv::new();
    let first = run(&mut env, "local a = 1", "file:///re.lua");
    assert!(env.arena[first].valid());

    let second = run(&mut env, "local b = 2", "file:///re.lua");
    assert!(!env.arena[first].valid());
    assert!(env.arena[second].valid());
    assert_eq!(env.doc("file:///re.lua").unwrap().module, second);
}

#[test]
fn test_module_name_from_uri() {
    let mut env = GlobalEnv::new();
    let module = run(&mut env, "", "file:///x/socket-core.lua");
    assert_eq!(env.arena[module].name, "socket-core");

    let module = run(&mut env, "", "src/init.lua");
    assert_eq!(env.arena[module].name, "init");

    let module = run(&mut env, "", "plain");
    assert_eq!(env.arena[module].name, "plain");
}

#[test]
fn test_out_of_order_queries_filter_by_position() {
    let mut env = GlobalEnv::new();
    let code = "local a = 1\nlocal b = 2";
    let module = run(&mut env, code, "file:///order.lua");

    assert!(env.search_module(module, "b", 0).is_none());
    assert!(env.search_module(module, "b", code.len()).is_some());
    assert!(env.search_module(module, "a", code.len()).is_some());
}

#[test]
fn test_parse_errors_propagate() {
    let mut env = GlobalEnv::new();
    assert!(analyze(&mut env, "local = ", "file:///bad.lua").is_err());
    assert!(analyze(&mut env, "a.b", "file:///bad2.lua").is_err());
}

#[test]
fn test_shared_environment_entry() {
    let module = analyze_shared("local ok = true", "file:///shared-entry.lua").unwrap();
    let env = crate::globals::shared().lock().unwrap();
    assert_eq!(env.arena[module].name, "shared-entry");
}
