//! Lexically scoped symbol table used during IR generation.

use std::collections::HashMap;

use inkwell::types::BasicTypeEnum;
use inkwell::values::{FunctionValue, PointerValue};

/// Where a symbol's storage lives.
#[derive(Debug, Clone, Copy)]
pub enum Storage<'ctx> {
    /// Stack slot of a local variable or spilled parameter.
    Stack(PointerValue<'ctx>),
    /// Module-level global variable.
    Global(PointerValue<'ctx>),
    /// Function symbol; registered so name clashes are caught and recursion
    /// resolves before the body is emitted.
    Func(FunctionValue<'ctx>),
}

/// One symbol table entry.
///
/// `ty` is the value type of the storage: the scalar type for scalars, the
/// nested array type for declared arrays, and a pointer type for decayed
/// array parameters (for functions it is just the function's address type).
/// `array_dims` keeps the declared dimension sizes, 0 marking the unsized
/// leading dimension of an array parameter; `elem_ty` keeps the scalar
/// element type of array symbols. Both stay authoritative during lowering —
/// inner dimensions are never recomputed from IR types.
#[derive(Debug, Clone)]
pub struct SymbolInfo<'ctx> {
    pub name: String,
    pub ty: BasicTypeEnum<'ctx>,
    pub storage: Storage<'ctx>,
    pub is_const: bool,
    pub array_dims: Vec<i64>,
    pub elem_ty: Option<BasicTypeEnum<'ctx>>,
}

impl<'ctx> SymbolInfo<'ctx> {
    pub fn new(
        name: impl Into<String>,
        ty: BasicTypeEnum<'ctx>,
        storage: Storage<'ctx>,
        is_const: bool,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            storage,
            is_const,
            array_dims: Vec::new(),
            elem_ty: None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.storage, Storage::Func(_))
    }

    pub fn is_global(&self) -> bool {
        matches!(self.storage, Storage::Global(_) | Storage::Func(_))
    }

    /// The address of the symbol's storage.
    pub fn pointer(&self) -> PointerValue<'ctx> {
        match self.storage {
            Storage::Stack(p) | Storage::Global(p) => p,
            Storage::Func(f) => f.as_global_value().as_pointer_value(),
        }
    }
}

/// Stack of scopes, innermost last. The root (global) scope is created at
/// construction and can never be popped.
pub struct SymbolTable<'ctx> {
    scopes: Vec<HashMap<String, SymbolInfo<'ctx>>>,
}

impl<'ctx> Default for SymbolTable<'ctx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'ctx> SymbolTable<'ctx> {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_global_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Insert into the innermost scope. Fails (returns false) if the name is
    /// already declared there; shadowing an outer scope is fine.
    pub fn declare(&mut self, info: SymbolInfo<'ctx>) -> bool {
        let scope = self
            .scopes
            .last_mut()
            .expect("symbol table always has a root scope");
        if scope.contains_key(&info.name) {
            return false;
        }
        scope.insert(info.name.clone(), info);
        true
    }

    /// Search innermost-outward.
    pub fn lookup(&self, name: &str) -> Option<&SymbolInfo<'ctx>> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn shadowing_and_redeclaration() {
        let ctx = Context::create();
        let module = ctx.create_module("t");
        let i32_ty = ctx.i32_type();
        let g = module.add_global(i32_ty, None, "g");
        let ptr = g.as_pointer_value();

        let mut table = SymbolTable::new();
        assert!(table.is_global_scope());

        let info = |name: &str| {
            SymbolInfo::new(name, i32_ty.into(), Storage::Global(ptr), false)
        };

        assert!(table.declare(info("x")));
        assert!(!table.declare(info("x")), "same-scope duplicate must fail");

        table.enter_scope();
        assert!(table.declare(info("x")), "shadowing is allowed");
        assert_eq!(table.depth(), 2);
        assert!(table.lookup("x").is_some());
        table.exit_scope();

        assert_eq!(table.depth(), 1);
        assert!(table.lookup("x").is_some());
        assert!(table.lookup("y").is_none());
    }

    #[test]
    fn root_scope_is_never_popped() {
        let mut table: SymbolTable<'_> = SymbolTable::new();
        table.exit_scope();
        table.exit_scope();
        assert_eq!(table.depth(), 1);
    }
}
