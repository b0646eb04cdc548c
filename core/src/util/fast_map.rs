pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;
