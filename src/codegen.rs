//! LLVM IR generation for the C subset using Inkwell.
//!
//! The generator walks the AST once, in source order, carrying a scoped
//! symbol table, a loop-context stack for `break`/`continue`, and the single
//! builder insertion point. Semantic failures never unwind: they are recorded
//! as diagnostics and lowering continues with a sensible default, so one pass
//! reports as many errors as possible.

use anyhow::{anyhow, Result};
use inkwell::{
    basic_block::BasicBlock,
    builder::Builder,
    context::Context,
    module::{Linkage, Module},
    targets::{
        CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
        TargetTriple,
    },
    types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, IntType},
    values::{
        BasicMetadataValueEnum, BasicValueEnum, FunctionValue, IntValue, PointerValue,
    },
    AddressSpace, IntPredicate, OptimizationLevel,
};
use tracing::debug;

use crate::ast::{
    BinaryOp, Block, BlockItem, CompUnit, Expr, FuncDef, FuncParam, LVal, Stmt, TypeKind,
    TypeSpec, Unit, UnaryOp, VarDecl, VarDef,
};
use crate::diag::{CompileError, Diagnostic};
use crate::symtab::{Storage, SymbolInfo, SymbolTable};

/// Branch targets of the innermost enclosing loop.
struct LoopFrame<'ctx> {
    continue_target: BasicBlock<'ctx>,
    break_target: BasicBlock<'ctx>,
}

/// Walks a [`CompUnit`] and fills an LLVM module.
pub struct Codegen<'ctx> {
    ctx: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    symbols: SymbolTable<'ctx>,
    loop_stack: Vec<LoopFrame<'ctx>>,
    current_fn: Option<FunctionValue<'ctx>>,
    file: String,
    diagnostics: Vec<Diagnostic>,
}

impl<'ctx> Codegen<'ctx> {
    pub fn new(ctx: &'ctx Context, module_name: &str, source_file: &str) -> Self {
        let module = ctx.create_module(module_name);
        let builder = ctx.create_builder();
        Self {
            ctx,
            module,
            builder,
            symbols: SymbolTable::new(),
            loop_stack: Vec::new(),
            current_fn: None,
            file: source_file.to_string(),
            diagnostics: Vec::new(),
        }
    }

    /// Lower a whole compilation unit into the module, then verify it.
    ///
    /// Semantic errors accumulate in [`Codegen::diagnostics`]; only a failed
    /// module verification (an internal consistency bug) is returned as `Err`.
    pub fn emit_unit(&mut self, unit: &CompUnit) -> Result<(), CompileError> {
        for item in &unit.units {
            match item {
                Unit::Func(func) => self.emit_func_def(func),
                Unit::Decl(decl) => self.emit_var_decl(decl),
            }
        }

        self.module
            .verify()
            .map_err(|msg| CompileError::Verification(msg.to_string()))
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    /// The module as textual LLVM IR.
    pub fn ir_string(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn write_ir_to_file(&self, path: &std::path::Path) -> Result<()> {
        self.module
            .print_to_file(path)
            .map_err(|e| anyhow!(e.to_string()))
    }

    /// Emit an object file for the given target triple.
    pub fn write_object(&self, triple: &TargetTriple, out_obj: &std::path::Path) -> Result<()> {
        self.module.set_triple(triple);
        Target::initialize_all(&InitializationConfig::default());
        let target = Target::from_triple(triple).map_err(|e| anyhow!(e.to_string()))?;
        let tm = target
            .create_target_machine(
                triple,
                "generic",
                "",
                OptimizationLevel::None,
                RelocMode::Default,
                CodeModel::Default,
            )
            .ok_or_else(|| anyhow!("create target machine failed"))?;
        tm.write_to_file(&self.module, FileType::Object, out_obj)
            .map_err(|e| anyhow!(e.to_string()))
    }

    fn error(&mut self, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::unlocated(self.file.clone(), message));
    }

    /* ----------------------------- type helpers ----------------------------- */

    fn scalar_type(&self, kind: TypeKind) -> Option<BasicTypeEnum<'ctx>> {
        match kind {
            TypeKind::Int => Some(self.ctx.i32_type().into()),
            TypeKind::Char => Some(self.ctx.i8_type().into()),
            TypeKind::Void => None,
        }
    }

    /// Base type of a variable declaration; `void` is rejected.
    fn variable_base_type(&mut self, ty: TypeSpec) -> BasicTypeEnum<'ctx> {
        match self.scalar_type(ty.kind) {
            Some(t) => t,
            None => {
                self.error("Variable declared with void type");
                self.ctx.i32_type().into()
            }
        }
    }

    /// Evaluate the declared dimensions of `name`, substituting 1 for
    /// anything non-constant or non-positive.
    fn dim_values(&mut self, name: &str, dims: &[Expr]) -> Vec<i64> {
        let mut out = Vec::with_capacity(dims.len());
        for dim in dims {
            match self.eval_const_int(dim) {
                Some(v) if v > 0 => out.push(v),
                Some(_) => {
                    self.error(format!("Array size must be positive: {name}"));
                    out.push(1);
                }
                None => {
                    self.error(format!("Array size must be a constant expression: {name}"));
                    out.push(1);
                }
            }
        }
        out
    }

    /// Nested array type for `elem` with the given sizes, built right-to-left
    /// (innermost dimension first).
    fn build_array_type(elem: BasicTypeEnum<'ctx>, dims: &[i64]) -> BasicTypeEnum<'ctx> {
        let mut ty = elem;
        for &d in dims.iter().rev() {
            ty = ty.array_type(d as u32).into();
        }
        ty
    }

    /// Wrap the scalar element type of an array parameter with its trailing
    /// dimensions, producing the stride type at one subscript level. Fails if
    /// an inner dimension was not a known constant.
    fn wrap_param_dims(
        &mut self,
        name: &str,
        elem: BasicTypeEnum<'ctx>,
        dims: &[i64],
    ) -> Option<BasicTypeEnum<'ctx>> {
        let mut ty = elem;
        for &d in dims.iter().rev() {
            if d <= 0 {
                self.error(format!(
                    "Array parameter has an unspecified inner dimension: {name}"
                ));
                return None;
            }
            ty = ty.array_type(d as u32).into();
        }
        Some(ty)
    }

    /// Fold a constant integer expression, or `None` if it is not constant.
    /// Used for array dimensions and global initializers; no IR is emitted.
    fn eval_const_int(&self, e: &Expr) -> Option<i64> {
        match e {
            Expr::Number(v) => Some(*v as i64),
            Expr::Char(c) => Some(*c as i64),
            Expr::Unary { op, operand } => {
                let v = self.eval_const_int(operand)?;
                match op {
                    UnaryOp::Plus => Some(v),
                    UnaryOp::Neg => Some(v.wrapping_neg()),
                    UnaryOp::BitNot => Some(!v),
                    UnaryOp::Not => Some((v == 0) as i64),
                    UnaryOp::Inc | UnaryOp::Dec => None,
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval_const_int(lhs)?;
                let r = self.eval_const_int(rhs)?;
                match op {
                    BinaryOp::Add => Some(l.wrapping_add(r)),
                    BinaryOp::Sub => Some(l.wrapping_sub(r)),
                    BinaryOp::Mul => Some(l.wrapping_mul(r)),
                    BinaryOp::Div => (r != 0).then(|| l.wrapping_div(r)),
                    BinaryOp::Rem => (r != 0).then(|| l.wrapping_rem(r)),
                    BinaryOp::Shl => u32::try_from(r).ok().map(|s| l.wrapping_shl(s)),
                    BinaryOp::Shr => u32::try_from(r).ok().map(|s| l.wrapping_shr(s)),
                    BinaryOp::Lt => Some((l < r) as i64),
                    BinaryOp::Le => Some((l <= r) as i64),
                    BinaryOp::Gt => Some((l > r) as i64),
                    BinaryOp::Ge => Some((l >= r) as i64),
                    BinaryOp::Eq => Some((l == r) as i64),
                    BinaryOp::Ne => Some((l != r) as i64),
                    BinaryOp::BitAnd => Some(l & r),
                    BinaryOp::BitOr => Some(l | r),
                    BinaryOp::BitXor => Some(l ^ r),
                    BinaryOp::LogAnd => Some((l != 0 && r != 0) as i64),
                    BinaryOp::LogOr => Some((l != 0 || r != 0) as i64),
                }
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_const_int(cond)? != 0 {
                    self.eval_const_int(then_expr)
                } else {
                    self.eval_const_int(else_expr)
                }
            }
            _ => None,
        }
    }

    /// Convert a value to `i1` for branching: integers compare against zero,
    /// pointers against null, an `i1` passes through.
    fn to_bool(&mut self, value: BasicValueEnum<'ctx>) -> Option<IntValue<'ctx>> {
        match value {
            BasicValueEnum::IntValue(v) => {
                if v.get_type().get_bit_width() == 1 {
                    Some(v)
                } else {
                    Some(
                        self.builder
                            .build_int_compare(
                                IntPredicate::NE,
                                v,
                                v.get_type().const_zero(),
                                "tobool",
                            )
                            .unwrap(),
                    )
                }
            }
            BasicValueEnum::PointerValue(p) => {
                Some(self.builder.build_is_not_null(p, "tobool").unwrap())
            }
            _ => {
                self.error("Cannot convert value to a boolean");
                None
            }
        }
    }

    fn as_int_operand(
        &mut self,
        value: BasicValueEnum<'ctx>,
        what: &str,
    ) -> Option<IntValue<'ctx>> {
        match value {
            BasicValueEnum::IntValue(v) => Some(v),
            _ => {
                self.error(format!("{what} must be an integer value"));
                None
            }
        }
    }

    /// Adjust an integer to another width: truncate down, zero-extend `i1`,
    /// sign-extend anything else.
    fn coerce_int(&mut self, v: IntValue<'ctx>, target: IntType<'ctx>) -> IntValue<'ctx> {
        let from = v.get_type().get_bit_width();
        let to = target.get_bit_width();
        if from == to {
            v
        } else if from > to {
            self.builder.build_int_truncate(v, target, "trunc").unwrap()
        } else if from == 1 {
            self.builder.build_int_z_extend(v, target, "zext").unwrap()
        } else {
            self.builder.build_int_s_extend(v, target, "sext").unwrap()
        }
    }

    fn coerce_basic_to(
        &mut self,
        v: BasicValueEnum<'ctx>,
        target: BasicTypeEnum<'ctx>,
    ) -> BasicValueEnum<'ctx> {
        match (v, target) {
            (BasicValueEnum::IntValue(iv), BasicTypeEnum::IntType(t)) => {
                self.coerce_int(iv, t).into()
            }
            _ => v,
        }
    }

    /// Bring two integer operands to a common width (the wider of the two).
    fn coerce_int_pair(
        &mut self,
        l: BasicValueEnum<'ctx>,
        r: BasicValueEnum<'ctx>,
    ) -> Option<(IntValue<'ctx>, IntValue<'ctx>)> {
        let l = self.as_int_operand(l, "Operator operand")?;
        let r = self.as_int_operand(r, "Operator operand")?;
        let (lw, rw) = (l.get_type().get_bit_width(), r.get_type().get_bit_width());
        if lw == rw {
            Some((l, r))
        } else if lw > rw {
            let r = self.coerce_int(r, l.get_type());
            Some((l, r))
        } else {
            let l = self.coerce_int(l, r.get_type());
            Some((l, r))
        }
    }

    fn current_block_open(&self) -> bool {
        self.builder
            .get_insert_block()
            .map_or(false, |b| b.get_terminator().is_none())
    }

    fn parent_function(&self) -> FunctionValue<'ctx> {
        self.builder
            .get_insert_block()
            .unwrap()
            .get_parent()
            .unwrap()
    }

    /* ----------------------------- expressions ------------------------------ */

    /// Lower an expression to a value. `None` means a semantic error was
    /// already recorded; callers skip emission for the enclosing construct.
    fn emit_expr(&mut self, e: &Expr) -> Option<BasicValueEnum<'ctx>> {
        match e {
            Expr::Number(v) => Some(
                self.ctx
                    .i32_type()
                    .const_int(*v as i64 as u64, true)
                    .into(),
            ),
            Expr::Char(c) => Some(self.ctx.i8_type().const_int(*c as u64, false).into()),
            Expr::Str(s) => Some(
                self.builder
                    .build_global_string_ptr(s, ".str")
                    .unwrap()
                    .as_pointer_value()
                    .into(),
            ),
            Expr::LVal(lval) => self.emit_lval_value(lval),
            Expr::Unary { op, operand } => self.emit_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.emit_ternary(cond, then_expr, else_expr),
            Expr::Call { name, args } => match self.emit_call(name, args)? {
                Some(v) => Some(v),
                None => {
                    self.error(format!("Void function used as a value: {name}"));
                    None
                }
            },
            Expr::InitList(_) => {
                self.error("Initializer list is only valid as a variable initializer");
                None
            }
        }
    }

    fn emit_lval_value(&mut self, lval: &LVal) -> Option<BasicValueEnum<'ctx>> {
        let Some(sym) = self.symbols.lookup(&lval.name).cloned() else {
            self.error(format!("Undeclared variable: {}", lval.name));
            return None;
        };
        if sym.is_function() {
            self.error(format!("Function used as a variable: {}", lval.name));
            return None;
        }

        if lval.indices.is_empty() {
            // a bare array reference decays to a pointer to its first row; a
            // decayed parameter already holds that pointer, so a plain load
            // does the same job there
            if let BasicTypeEnum::ArrayType(_) = sym.ty {
                let zero = self.ctx.i32_type().const_zero();
                let ptr = unsafe {
                    self.builder
                        .build_gep(sym.pointer(), &[zero, zero], "arraydecay")
                        .unwrap()
                };
                return Some(ptr.into());
            }
            return Some(
                self.builder
                    .build_load(sym.pointer(), &lval.name)
                    .unwrap(),
            );
        }

        let (ptr, pointee) = self.element_ptr(&sym, &lval.indices)?;
        match pointee {
            // partially subscripted array: decay to the inner row pointer
            BasicTypeEnum::ArrayType(_) => {
                let zero = self.ctx.i32_type().const_zero();
                let inner = unsafe {
                    self.builder
                        .build_gep(ptr, &[zero, zero], "arraydecay")
                        .unwrap()
                };
                Some(inner.into())
            }
            _ => Some(self.builder.build_load(ptr, "arrayelem").unwrap()),
        }
    }

    /// Address of a subscripted lvalue, together with the value type the
    /// returned pointer points at. `indices` must be non-empty.
    fn element_ptr(
        &mut self,
        sym: &SymbolInfo<'ctx>,
        indices: &[Expr],
    ) -> Option<(PointerValue<'ctx>, BasicTypeEnum<'ctx>)> {
        match sym.ty {
            // local/global aggregate: one GEP with a leading zero index
            BasicTypeEnum::ArrayType(_) => {
                let mut pointee = sym.ty;
                for _ in 0..indices.len() {
                    pointee = match pointee {
                        BasicTypeEnum::ArrayType(a) => a.get_element_type(),
                        _ => {
                            self.error(format!("Too many array subscripts: {}", sym.name));
                            return None;
                        }
                    };
                }

                let mut idx_values = vec![self.ctx.i32_type().const_zero()];
                for ix in indices {
                    let v = self.emit_expr(ix)?;
                    idx_values.push(self.as_int_operand(v, "Array index")?);
                }

                let ptr = unsafe {
                    self.builder
                        .build_gep(sym.pointer(), &idx_values, "arrayidx")
                        .unwrap()
                };
                Some((ptr, pointee))
            }
            // array parameter: load the pointer, then one GEP per subscript
            // with the stride type rebuilt from the recorded dimensions
            BasicTypeEnum::PointerType(_) => {
                let Some(elem) = sym.elem_ty else {
                    self.error(format!("Subscripted value is not an array: {}", sym.name));
                    return None;
                };
                if indices.len() > sym.array_dims.len() {
                    self.error(format!("Too many array subscripts: {}", sym.name));
                    return None;
                }

                let mut ptr = self
                    .builder
                    .build_load(sym.pointer(), &format!("{}.ptr", sym.name))
                    .unwrap()
                    .into_pointer_value();
                let mut pointee = None;

                for (k, ix) in indices.iter().enumerate() {
                    let v = self.emit_expr(ix)?;
                    let iv = self.as_int_operand(v, "Array index")?;
                    let stride =
                        self.wrap_param_dims(&sym.name, elem, &sym.array_dims[k + 1..])?;
                    ptr = unsafe {
                        self.builder
                            .build_gep(ptr, &[iv], "arrayidx")
                            .unwrap()
                    };
                    pointee = Some(stride);
                }

                Some((ptr, pointee?))
            }
            _ => {
                self.error(format!("Subscripted value is not an array: {}", sym.name));
                None
            }
        }
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: &Expr) -> Option<BasicValueEnum<'ctx>> {
        let value = self.emit_expr(operand)?;
        match op {
            UnaryOp::Plus => Some(value),
            UnaryOp::Neg => {
                let v = self.as_int_operand(value, "Unary '-' operand")?;
                Some(self.builder.build_int_neg(v, "negtmp").unwrap().into())
            }
            UnaryOp::Not => {
                let b = self.to_bool(value)?;
                Some(self.builder.build_not(b, "nottmp").unwrap().into())
            }
            UnaryOp::BitNot => {
                let v = self.as_int_operand(value, "Unary '~' operand")?;
                Some(self.builder.build_not(v, "bitnot").unwrap().into())
            }
            UnaryOp::Inc | UnaryOp::Dec => {
                self.error("Prefix increment/decrement is not supported");
                None
            }
        }
    }

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Option<BasicValueEnum<'ctx>> {
        // logical operators short-circuit and get their own control flow
        if matches!(op, BinaryOp::LogAnd | BinaryOp::LogOr) {
            return self.emit_short_circuit(op == BinaryOp::LogAnd, lhs, rhs);
        }

        let l = self.emit_expr(lhs)?;
        let r = self.emit_expr(rhs)?;
        let (l, r) = self.coerce_int_pair(l, r)?;
        let b = &self.builder;

        let result: BasicValueEnum = match op {
            BinaryOp::Add => b.build_int_add(l, r, "addtmp").unwrap().into(),
            BinaryOp::Sub => b.build_int_sub(l, r, "subtmp").unwrap().into(),
            BinaryOp::Mul => b.build_int_mul(l, r, "multmp").unwrap().into(),
            BinaryOp::Div => b.build_int_signed_div(l, r, "divtmp").unwrap().into(),
            BinaryOp::Rem => b.build_int_signed_rem(l, r, "modtmp").unwrap().into(),
            BinaryOp::Lt => b
                .build_int_compare(IntPredicate::SLT, l, r, "cmptmp")
                .unwrap()
                .into(),
            BinaryOp::Gt => b
                .build_int_compare(IntPredicate::SGT, l, r, "cmptmp")
                .unwrap()
                .into(),
            BinaryOp::Le => b
                .build_int_compare(IntPredicate::SLE, l, r, "cmptmp")
                .unwrap()
                .into(),
            BinaryOp::Ge => b
                .build_int_compare(IntPredicate::SGE, l, r, "cmptmp")
                .unwrap()
                .into(),
            BinaryOp::Eq => b
                .build_int_compare(IntPredicate::EQ, l, r, "eqtmp")
                .unwrap()
                .into(),
            BinaryOp::Ne => b
                .build_int_compare(IntPredicate::NE, l, r, "netmp")
                .unwrap()
                .into(),
            BinaryOp::BitAnd => b.build_and(l, r, "bitand").unwrap().into(),
            BinaryOp::BitOr => b.build_or(l, r, "bitor").unwrap().into(),
            BinaryOp::BitXor => b.build_xor(l, r, "xortmp").unwrap().into(),
            BinaryOp::Shl => b.build_left_shift(l, r, "shltmp").unwrap().into(),
            // arithmetic right shift
            BinaryOp::Shr => b.build_right_shift(l, r, true, "ashrtmp").unwrap().into(),
            BinaryOp::LogAnd | BinaryOp::LogOr => unreachable!("handled above"),
        };
        Some(result)
    }

    /// Short-circuit lowering for `&&` / `||`: evaluate the left side, branch
    /// past the right side when it alone decides the result, and merge with a
    /// phi over {constant from the left block, right value}.
    fn emit_short_circuit(
        &mut self,
        is_and: bool,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Option<BasicValueEnum<'ctx>> {
        let l = self.emit_expr(lhs)?;
        let lb = self.to_bool(l)?;

        let func = self.parent_function();
        let lhs_end = self.builder.get_insert_block().unwrap();
        let (rhs_name, merge_name, result_name) = if is_and {
            ("and.rhs", "and.merge", "and.result")
        } else {
            ("or.rhs", "or.merge", "or.result")
        };
        let rhs_bb = self.ctx.append_basic_block(func, rhs_name);
        let merge_bb = self.ctx.append_basic_block(func, merge_name);

        if is_and {
            self.builder
                .build_conditional_branch(lb, rhs_bb, merge_bb)
                .unwrap();
        } else {
            self.builder
                .build_conditional_branch(lb, merge_bb, rhs_bb)
                .unwrap();
        }

        self.builder.position_at_end(rhs_bb);
        let r = self.emit_expr(rhs)?;
        let rb = self.to_bool(r)?;
        self.builder.build_unconditional_branch(merge_bb).unwrap();
        let rhs_end = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(merge_bb);
        let phi = self
            .builder
            .build_phi(self.ctx.bool_type(), result_name)
            .unwrap();
        let short_value = if is_and {
            self.ctx.bool_type().const_zero()
        } else {
            self.ctx.bool_type().const_int(1, false)
        };
        phi.add_incoming(&[(&short_value, lhs_end), (&rb, rhs_end)]);
        Some(phi.as_basic_value())
    }

    fn emit_ternary(
        &mut self,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
    ) -> Option<BasicValueEnum<'ctx>> {
        let c = self.emit_expr(cond)?;
        let cb = self.to_bool(c)?;

        let func = self.parent_function();
        let then_bb = self.ctx.append_basic_block(func, "tern.then");
        let else_bb = self.ctx.append_basic_block(func, "tern.else");
        let merge_bb = self.ctx.append_basic_block(func, "tern.merge");
        self.builder
            .build_conditional_branch(cb, then_bb, else_bb)
            .unwrap();

        self.builder.position_at_end(then_bb);
        let then_val = self.emit_expr(then_expr)?;
        self.builder.build_unconditional_branch(merge_bb).unwrap();
        let then_end = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(else_bb);
        let else_val = self.emit_expr(else_expr)?;
        // the result type follows the then-branch
        let else_val = self.coerce_basic_to(else_val, then_val.get_type());
        self.builder.build_unconditional_branch(merge_bb).unwrap();
        let else_end = self.builder.get_insert_block().unwrap();

        self.builder.position_at_end(merge_bb);
        let phi = self
            .builder
            .build_phi(then_val.get_type(), "ternary")
            .unwrap();
        phi.add_incoming(&[(&then_val, then_end), (&else_val, else_end)]);
        Some(phi.as_basic_value())
    }

    /// Lower a call. Outer `None` is a semantic error; inner `None` is a
    /// well-formed call to a void function.
    fn emit_call(
        &mut self,
        name: &str,
        args: &[Expr],
    ) -> Option<Option<BasicValueEnum<'ctx>>> {
        let Some(callee) = self.module.get_function(name) else {
            self.error(format!("Unknown function: {name}"));
            return None;
        };

        let expected = callee.count_params() as usize;
        if expected != args.len() {
            self.error(format!(
                "Incorrect number of arguments for function: {name} (expected {expected}, got {})",
                args.len()
            ));
            return None;
        }

        let mut arg_values: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let mut v = self.emit_expr(arg)?;
            if let Some(param) = callee.get_nth_param(i as u32) {
                v = self.coerce_basic_to(v, param.get_type());
            }
            arg_values.push(v.into());
        }

        let is_void = callee.get_type().get_return_type().is_none();
        let call = self
            .builder
            .build_call(callee, &arg_values, if is_void { "" } else { "calltmp" })
            .unwrap();
        Some(call.try_as_basic_value().left())
    }

    /* ------------------------------ statements ------------------------------ */

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => {
                if let Some(e) = expr {
                    // evaluate for side effects only; a void call is fine here
                    if let Expr::Call { name, args } = e {
                        self.emit_call(name, args);
                    } else {
                        self.emit_expr(e);
                    }
                }
            }
            Stmt::Assign { lhs, rhs } => self.emit_assign(lhs, rhs),
            Stmt::Block(block) => self.emit_block(block),
            Stmt::If {
                cond,
                then_stmt,
                else_stmt,
            } => self.emit_if(cond, then_stmt, else_stmt.as_deref()),
            Stmt::While { cond, body } => self.emit_while(cond, body),
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.emit_for(init.as_deref(), cond.as_ref(), step.as_deref(), body),
            Stmt::Return(value) => self.emit_return(value.as_ref()),
            Stmt::Break => match self.loop_stack.last().map(|f| f.break_target) {
                Some(target) => {
                    self.builder.build_unconditional_branch(target).unwrap();
                }
                None => self.error("Break statement outside of a loop"),
            },
            Stmt::Continue => match self.loop_stack.last().map(|f| f.continue_target) {
                Some(target) => {
                    self.builder.build_unconditional_branch(target).unwrap();
                }
                None => self.error("Continue statement outside of a loop"),
            },
        }
    }

    fn emit_assign(&mut self, lhs: &LVal, rhs: &Expr) {
        let Some(sym) = self.symbols.lookup(&lhs.name).cloned() else {
            self.error(format!("Undeclared variable: {}", lhs.name));
            return;
        };
        if sym.is_function() {
            self.error(format!("Cannot assign to function: {}", lhs.name));
            return;
        }
        if sym.is_const {
            self.error(format!("Cannot assign to const variable: {}", lhs.name));
            return;
        }

        let Some(value) = self.emit_expr(rhs) else {
            return;
        };

        if lhs.indices.is_empty() {
            if sym.ty.is_array_type() {
                self.error(format!("Cannot assign to an array: {}", lhs.name));
                return;
            }
            let value = self.coerce_basic_to(value, sym.ty);
            self.builder.build_store(sym.pointer(), value).unwrap();
        } else {
            let Some((ptr, pointee)) = self.element_ptr(&sym, &lhs.indices) else {
                return;
            };
            if pointee.is_array_type() {
                self.error(format!("Cannot assign to an array: {}", lhs.name));
                return;
            }
            let value = self.coerce_basic_to(value, pointee);
            self.builder.build_store(ptr, value).unwrap();
        }
    }

    fn emit_block(&mut self, block: &Block) {
        self.symbols.enter_scope();
        for item in &block.items {
            // everything after a terminator in this block is unreachable
            if !self.current_block_open() {
                break;
            }
            match item {
                BlockItem::Decl(decl) => self.emit_var_decl(decl),
                BlockItem::Stmt(stmt) => self.emit_stmt(stmt),
            }
        }
        self.symbols.exit_scope();
    }

    fn emit_if(&mut self, cond: &Expr, then_stmt: &Stmt, else_stmt: Option<&Stmt>) {
        let Some(c) = self.emit_expr(cond) else { return };
        let Some(cb) = self.to_bool(c) else { return };

        let func = self.parent_function();
        let then_bb = self.ctx.append_basic_block(func, "then");
        let else_bb = else_stmt.map(|_| self.ctx.append_basic_block(func, "else"));
        let merge_bb = self.ctx.append_basic_block(func, "ifcont");

        self.builder
            .build_conditional_branch(cb, then_bb, else_bb.unwrap_or(merge_bb))
            .unwrap();
        // without an else the false edge reaches the join block directly
        let mut merge_reachable = else_bb.is_none();

        self.builder.position_at_end(then_bb);
        self.emit_stmt(then_stmt);
        if self.current_block_open() {
            self.builder.build_unconditional_branch(merge_bb).unwrap();
            merge_reachable = true;
        }

        if let (Some(else_bb), Some(else_stmt)) = (else_bb, else_stmt) {
            self.builder.position_at_end(else_bb);
            self.emit_stmt(else_stmt);
            if self.current_block_open() {
                self.builder.build_unconditional_branch(merge_bb).unwrap();
                merge_reachable = true;
            }
        }

        if merge_reachable {
            self.builder.position_at_end(merge_bb);
        } else {
            // both arms terminated; drop the join block and leave the builder
            // on the terminated arm so the enclosing block stops emitting
            let _ = merge_bb.remove_from_function();
        }
    }

    fn emit_while(&mut self, cond: &Expr, body: &Stmt) {
        let func = self.parent_function();
        let cond_bb = self.ctx.append_basic_block(func, "while.cond");
        let body_bb = self.ctx.append_basic_block(func, "while.body");
        let after_bb = self.ctx.append_basic_block(func, "while.end");

        self.loop_stack.push(LoopFrame {
            continue_target: cond_bb,
            break_target: after_bb,
        });

        self.builder.build_unconditional_branch(cond_bb).unwrap();
        self.builder.position_at_end(cond_bb);
        let cond_val = self.emit_expr(cond).and_then(|v| self.to_bool(v));
        let Some(cb) = cond_val else {
            self.loop_stack.pop();
            return;
        };
        self.builder
            .build_conditional_branch(cb, body_bb, after_bb)
            .unwrap();

        self.builder.position_at_end(body_bb);
        self.emit_stmt(body);
        if self.current_block_open() {
            self.builder.build_unconditional_branch(cond_bb).unwrap();
        }

        self.builder.position_at_end(after_bb);
        self.loop_stack.pop();
    }

    fn emit_for(
        &mut self,
        init: Option<&BlockItem>,
        cond: Option<&Expr>,
        step: Option<&Stmt>,
        body: &Stmt,
    ) {
        // the init declaration lives in the loop's own scope
        self.symbols.enter_scope();
        match init {
            Some(BlockItem::Decl(decl)) => self.emit_var_decl(decl),
            Some(BlockItem::Stmt(stmt)) => self.emit_stmt(stmt),
            None => {}
        }

        let func = self.parent_function();
        let cond_bb = self.ctx.append_basic_block(func, "for.cond");
        let body_bb = self.ctx.append_basic_block(func, "for.body");
        let step_bb = self.ctx.append_basic_block(func, "for.step");
        let after_bb = self.ctx.append_basic_block(func, "for.end");

        self.loop_stack.push(LoopFrame {
            continue_target: step_bb,
            break_target: after_bb,
        });

        self.builder.build_unconditional_branch(cond_bb).unwrap();
        self.builder.position_at_end(cond_bb);
        match cond {
            Some(c) => {
                let Some(cb) = self.emit_expr(c).and_then(|v| self.to_bool(v)) else {
                    self.loop_stack.pop();
                    self.symbols.exit_scope();
                    return;
                };
                self.builder
                    .build_conditional_branch(cb, body_bb, after_bb)
                    .unwrap();
            }
            // no condition: loop until an inner break or return
            None => {
                self.builder.build_unconditional_branch(body_bb).unwrap();
            }
        }

        self.builder.position_at_end(body_bb);
        self.emit_stmt(body);
        if self.current_block_open() {
            self.builder.build_unconditional_branch(step_bb).unwrap();
        }

        self.builder.position_at_end(step_bb);
        if let Some(stmt) = step {
            self.emit_stmt(stmt);
        }
        self.builder.build_unconditional_branch(cond_bb).unwrap();

        self.builder.position_at_end(after_bb);
        self.loop_stack.pop();
        self.symbols.exit_scope();
    }

    fn emit_return(&mut self, value: Option<&Expr>) {
        match value {
            Some(expr) => {
                let Some(v) = self.emit_expr(expr) else { return };
                match self.current_fn.and_then(|f| f.get_type().get_return_type()) {
                    Some(ret_ty) => {
                        let v = self.coerce_basic_to(v, ret_ty);
                        self.builder.build_return(Some(&v)).unwrap();
                    }
                    None => {
                        self.error("Return with a value in a void function");
                        self.builder.build_return(None).unwrap();
                    }
                }
            }
            None => {
                self.builder.build_return(None).unwrap();
            }
        }
    }

    /* ----------------------------- declarations ----------------------------- */

    fn emit_var_decl(&mut self, decl: &VarDecl) {
        let base = self.variable_base_type(decl.ty);
        let is_global = self.symbols.is_global_scope();

        for var in &decl.vars {
            if is_global {
                self.emit_global_var(decl.ty, var, base);
            } else {
                self.emit_local_var(decl.ty, var, base);
            }
        }
    }

    fn emit_global_var(&mut self, ty: TypeSpec, var: &VarDef, base: BasicTypeEnum<'ctx>) {
        debug!(name = %var.name, "lowering global variable");
        let dims = self.dim_values(&var.name, &var.dims);
        let value_ty = if dims.is_empty() {
            base
        } else {
            Self::build_array_type(base, &dims)
        };

        let global = self.module.add_global(value_ty, None, &var.name);
        global.set_linkage(Linkage::External);
        global.set_constant(ty.is_const);

        let init: BasicValueEnum = if dims.is_empty() {
            match &var.init {
                Some(expr) => match self.eval_const_int(expr) {
                    Some(v) => base.into_int_type().const_int(v as u64, true).into(),
                    None => {
                        self.error(format!(
                            "Global variable initializer must be constant: {}",
                            var.name
                        ));
                        value_ty.const_zero()
                    }
                },
                None => value_ty.const_zero(),
            }
        } else {
            // TODO: lower brace initializers for global arrays to constant
            // aggregates instead of falling back to zero-init
            value_ty.const_zero()
        };
        global.set_initializer(&init);

        let mut info = SymbolInfo::new(
            var.name.clone(),
            value_ty,
            Storage::Global(global.as_pointer_value()),
            ty.is_const,
        );
        if !dims.is_empty() {
            info.array_dims = dims;
            info.elem_ty = Some(base);
        }
        if !self.symbols.declare(info) {
            self.error(format!("Redeclaration of variable: {}", var.name));
        }
    }

    fn emit_local_var(&mut self, ty: TypeSpec, var: &VarDef, base: BasicTypeEnum<'ctx>) {
        let dims = self.dim_values(&var.name, &var.dims);
        let value_ty = if dims.is_empty() {
            base
        } else {
            Self::build_array_type(base, &dims)
        };

        let slot = self.builder.build_alloca(value_ty, &var.name).unwrap();

        if let Some(init) = &var.init {
            if dims.is_empty() {
                // a singleton brace list initializes a scalar like C99
                let value = match init {
                    Expr::InitList(items) => match items.first() {
                        Some(first) => self.emit_expr(first),
                        None => None,
                    },
                    expr => self.emit_expr(expr),
                };
                if let Some(v) = value {
                    let v = self.coerce_basic_to(v, value_ty);
                    self.builder.build_store(slot, v).unwrap();
                }
            } else {
                self.init_local_array(slot, value_ty, base, &dims, init);
            }
        }

        let mut info = SymbolInfo::new(
            var.name.clone(),
            value_ty,
            Storage::Stack(slot),
            ty.is_const,
        );
        if !dims.is_empty() {
            info.array_dims = dims;
            info.elem_ty = Some(base);
        }
        if !self.symbols.declare(info) {
            self.error(format!("Redeclaration of variable: {}", var.name));
        }
    }

    /// Store an initializer into a local array. A brace list is flattened
    /// row-major (excess values dropped, missing elements left undefined); a
    /// scalar expression broadcasts to every element.
    fn init_local_array(
        &mut self,
        slot: PointerValue<'ctx>,
        array_ty: BasicTypeEnum<'ctx>,
        elem_ty: BasicTypeEnum<'ctx>,
        dims: &[i64],
        init: &Expr,
    ) {
        let total: i64 = dims.iter().product();

        match init {
            Expr::InitList(_) => {
                let mut values = Vec::new();
                self.flatten_init_list(init, &mut values);
                for (i, v) in values.into_iter().take(total as usize).enumerate() {
                    self.store_array_element(slot, array_ty, elem_ty, dims, i as i64, v);
                }
            }
            expr => {
                if let Some(v) = self.emit_expr(expr) {
                    for i in 0..total {
                        self.store_array_element(slot, array_ty, elem_ty, dims, i, v);
                    }
                }
            }
        }
    }

    fn flatten_init_list(&mut self, init: &Expr, out: &mut Vec<BasicValueEnum<'ctx>>) {
        let Expr::InitList(items) = init else { return };
        for item in items {
            match item {
                Expr::InitList(_) => self.flatten_init_list(item, out),
                expr => {
                    if let Some(v) = self.emit_expr(expr) {
                        out.push(v);
                    }
                }
            }
        }
    }

    fn store_array_element(
        &mut self,
        slot: PointerValue<'ctx>,
        array_ty: BasicTypeEnum<'ctx>,
        elem_ty: BasicTypeEnum<'ctx>,
        dims: &[i64],
        flat_index: i64,
        value: BasicValueEnum<'ctx>,
    ) {
        // unravel the flat index into one index per dimension, row-major
        let i32_ty = self.ctx.i32_type();
        let mut indices = vec![i32_ty.const_zero()];
        let mut remainder = flat_index;
        let mut per_dim = vec![0i64; dims.len()];
        for (d, &size) in dims.iter().enumerate().rev() {
            per_dim[d] = remainder % size;
            remainder /= size;
        }
        indices.extend(
            per_dim
                .iter()
                .map(|&ix| i32_ty.const_int(ix as u64, false)),
        );

        let ptr = unsafe {
            self.builder
                .build_gep(slot, &indices, "arrayinit")
                .unwrap()
        };
        let value = self.coerce_basic_to(value, elem_ty);
        self.builder.build_store(ptr, value).unwrap();
    }

    /* ------------------------- function definitions ------------------------- */

    fn emit_func_def(&mut self, func: &FuncDef) {
        debug!(function = %func.name, "lowering function definition");

        if self.module.get_function(&func.name).is_some() {
            self.error(format!("Redefinition of function: {}", func.name));
            return;
        }

        let mut param_types: Vec<BasicMetadataTypeEnum> = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let base = match self.scalar_type(param.ty.kind) {
                Some(t) => t,
                None => {
                    self.error(format!("Parameter declared with void type: {}", param.name));
                    self.ctx.i32_type().into()
                }
            };
            if param.is_array {
                // array parameters decay to a pointer to the element (or the
                // first inner row) type
                param_types.push(base.ptr_type(AddressSpace::default()).into());
            } else {
                param_types.push(base.into());
            }
        }

        let fn_type = match self.scalar_type(func.return_type.kind) {
            Some(ret) => ret.fn_type(&param_types, false),
            None => self.ctx.void_type().fn_type(&param_types, false),
        };
        let fn_value = self.module.add_function(&func.name, fn_type, None);
        for (arg, param) in fn_value.get_param_iter().zip(&func.params) {
            match arg {
                BasicValueEnum::IntValue(v) => v.set_name(&param.name),
                BasicValueEnum::PointerValue(v) => v.set_name(&param.name),
                _ => {}
            }
        }

        // register before the body is lowered so recursion resolves
        let info = SymbolInfo {
            name: func.name.clone(),
            ty: self
                .ctx
                .i8_type()
                .ptr_type(AddressSpace::default())
                .into(),
            storage: Storage::Func(fn_value),
            is_const: false,
            array_dims: Vec::new(),
            elem_ty: None,
        };
        if !self.symbols.declare(info) {
            self.error(format!("Redeclaration of: {}", func.name));
        }

        let entry = self.ctx.append_basic_block(fn_value, "entry");
        self.builder.position_at_end(entry);

        self.symbols.enter_scope();
        self.current_fn = Some(fn_value);

        self.emit_func_params(fn_value, &func.params);
        self.emit_block(&func.body);

        // fall off the end of a void function
        if func.return_type.kind == TypeKind::Void && self.current_block_open() {
            self.builder.build_return(None).unwrap();
        }

        self.symbols.exit_scope();
        self.current_fn = None;

        if !fn_value.verify(true) {
            self.error(format!("Function verification failed: {}", func.name));
            unsafe { fn_value.delete() };
        }
    }

    /// Spill each incoming argument to a stack slot and register it, keeping
    /// the declared array dimensions (leading 0 for the unsized dimension).
    fn emit_func_params(&mut self, fn_value: FunctionValue<'ctx>, params: &[FuncParam]) {
        for (i, param) in params.iter().enumerate() {
            let Some(arg) = fn_value.get_nth_param(i as u32) else {
                continue;
            };
            let arg_ty = arg.get_type();
            let slot = self.builder.build_alloca(arg_ty, &param.name).unwrap();
            self.builder.build_store(slot, arg).unwrap();

            let mut info = SymbolInfo::new(
                param.name.clone(),
                arg_ty,
                Storage::Stack(slot),
                param.ty.is_const,
            );
            if param.is_array {
                let mut dims = vec![0i64];
                for dim in &param.dims {
                    // non-constant inner dimensions are recorded as unknown
                    dims.push(self.eval_const_int(dim).filter(|v| *v > 0).unwrap_or(0));
                }
                info.array_dims = dims;
                info.elem_ty = self.scalar_type(param.ty.kind);
            }
            if !self.symbols.declare(info) {
                self.error(format!("Redeclaration of parameter: {}", param.name));
            }
        }
    }
}

/// Default target triple of the build machine.
pub fn host_triple() -> TargetTriple {
    TargetMachine::get_default_triple()
}
