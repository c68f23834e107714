//! Symbol table: a stack of lexical scopes with a dedicated global scope at
//! the bottom (spec §3, §4.4). Modeled directly on the scope-stack pattern
//! used by the teacher's interpreter (`push_scope`/`pop_scope`/`define`/
//! `get`), generalized from values to resolved `Attribute` records.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Attribute, FnAttr, Ty};

/// The mandatory built-in: variadic, returns `void`, accepts any arguments
/// (spec §4.4). Pre-registered in the global scope before traversal.
pub fn print_builtin() -> Attribute {
    Attribute::Fn(Rc::new(FnAttr { name: "print".to_string(), return_ty: Ty::Void, params: Vec::new(), variadic: true }))
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Attribute>>,
}

impl SymbolTable {
    /// A fresh table with the global scope pre-populated with built-ins.
    pub fn new() -> Self {
        let mut table = Self { scopes: vec![HashMap::new()] };
        table.define("print", print_builtin()).expect("builtin registration cannot collide");
        table
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "global scope must never be popped");
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Insert a binding into the current (innermost) scope. Fails if the
    /// name already exists in the current scope, or exists in an outer
    /// scope with a different attribute kind (spec §3).
    pub fn define(&mut self, name: &str, attr: Attribute) -> Result<(), DefineError> {
        if let Some(current) = self.scopes.last() {
            if current.contains_key(name) {
                return Err(DefineError::AlreadyInScope);
            }
        }
        if let Some(existing) = self.lookup(name) {
            if existing.kind_name() != attr.kind_name() {
                return Err(DefineError::KindMismatch);
            }
        }
        self.scopes.last_mut().expect("at least the global scope exists").insert(name.to_string(), attr);
        Ok(())
    }

    /// Walk the scope stack top-down for `name`.
    pub fn lookup(&self, name: &str) -> Option<&Attribute> {
        for scope in self.scopes.iter().rev() {
            if let Some(attr) = scope.get(name) {
                return Some(attr);
            }
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineError {
    AlreadyInScope,
    KindMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::VarAttr;

    fn var(name: &str, ty: Ty, offset: u32) -> Attribute {
        Attribute::Var(Rc::new(VarAttr { name: name.to_string(), ty, offset }))
    }

    #[test]
    fn builtin_print_is_preregistered() {
        let table = SymbolTable::new();
        let attr = table.lookup("print").unwrap();
        assert_eq!(attr.kind_name(), "function");
        assert!(attr.as_fn().unwrap().variadic);
    }

    #[test]
    fn define_then_get_roundtrips() {
        let mut table = SymbolTable::new();
        table.define("x", var("x", Ty::Int, 0)).unwrap();
        assert!(table.lookup("x").is_some());
    }

    #[test]
    fn push_pop_scoping() {
        let mut table = SymbolTable::new();
        table.define("x", var("x", Ty::Int, 0)).unwrap();
        table.push_scope();
        assert!(table.lookup("x").is_some());
        table.define("y", var("y", Ty::Int, 0)).unwrap();
        table.pop_scope();
        assert!(table.lookup("y").is_none());
        assert!(table.lookup("x").is_some());
    }

    #[test]
    fn shadowing_in_inner_scope_succeeds() {
        let mut table = SymbolTable::new();
        table.define("x", var("x", Ty::Int, 0)).unwrap();
        table.push_scope();
        assert!(table.define("x", var("x", Ty::Float, 0)).is_ok());
        assert_eq!(table.lookup("x").unwrap().as_var().unwrap().ty, Ty::Float);
        table.pop_scope();
        assert_eq!(table.lookup("x").unwrap().as_var().unwrap().ty, Ty::Int);
    }

    #[test]
    fn redefine_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        table.define("x", var("x", Ty::Int, 0)).unwrap();
        assert_eq!(table.define("x", var("x", Ty::Int, 1)), Err(DefineError::AlreadyInScope));
    }

    #[test]
    fn kind_mismatch_against_outer_scope_fails() {
        let mut table = SymbolTable::new();
        assert_eq!(
            table.define("print", var("print", Ty::Int, 0)),
            Err(DefineError::KindMismatch)
        );
    }

    #[test]
    fn deep_nesting_resolves_through_all_levels() {
        let mut table = SymbolTable::new();
        table.define("a", var("a", Ty::Int, 0)).unwrap();
        for depth in 0..5 {
            table.push_scope();
            table.define(&format!("v{depth}"), var(&format!("v{depth}"), Ty::Int, 0)).unwrap();
        }
        assert!(table.lookup("a").is_some());
        assert!(table.lookup("v4").is_some());
        for _ in 0..5 {
            table.pop_scope();
        }
        assert_eq!(table.depth(), 1);
    }
}
