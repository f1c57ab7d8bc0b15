use std::collections::HashMap;

// =============================================================================
// SYMBOLS - Compile-time binding resolution
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical scope of bindings, chained to the enclosing scope.
///
/// Resolving a name defined in an outer function scope promotes it to a
/// free variable of this table and records the original symbol in
/// `free_symbols`, in capture order.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    store: HashMap<String, Symbol>,
    outer: Option<Box<SymbolTable>>,
    pub free_symbols: Vec<Symbol>,
    pub num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Discard this scope and return the enclosing one.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            // Globals are reachable from any frame; no capture needed.
            SymbolScope::Global => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define_and_resolve_global() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));
        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(global.resolve("missing"), None);
    }

    #[test]
    fn test_local_scope_indices_restart() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut local = SymbolTable::enclosed(global);
        assert_eq!(local.define("x"), symbol("x", SymbolScope::Local, 0));
        assert_eq!(local.define("y"), symbol("y", SymbolScope::Local, 1));

        // Globals resolve through the chain without capture.
        assert_eq!(local.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert!(local.free_symbols.is_empty());
    }

    #[test]
    fn test_resolving_outer_local_defines_free() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::enclosed(global);
        first.define("b");

        let mut second = SymbolTable::enclosed(first);
        second.define("c");

        assert_eq!(second.resolve("a"), Some(symbol("a", SymbolScope::Global, 0)));
        assert_eq!(second.resolve("b"), Some(symbol("b", SymbolScope::Free, 0)));
        assert_eq!(second.resolve("c"), Some(symbol("c", SymbolScope::Local, 0)));

        // The capture list records the symbol as seen from the scope it
        // was resolved out of.
        assert_eq!(
            second.free_symbols,
            vec![symbol("b", SymbolScope::Local, 0)]
        );
    }

    #[test]
    fn test_free_propagates_through_intermediate_scope() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::enclosed(global);
        first.define("b");

        let second = SymbolTable::enclosed(first);
        let mut third = SymbolTable::enclosed(second);

        // Reaching `b` two scopes up makes it free in the middle scope too.
        assert_eq!(third.resolve("b"), Some(symbol("b", SymbolScope::Free, 0)));
        let second = third.into_outer().unwrap();
        assert_eq!(
            second.free_symbols,
            vec![symbol("b", SymbolScope::Local, 0)]
        );
    }

    #[test]
    fn test_shadowing_in_inner_scope() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::enclosed(global);
        local.define("a");
        assert_eq!(local.resolve("a"), Some(symbol("a", SymbolScope::Local, 0)));
    }
}
