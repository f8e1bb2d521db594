//! This module provides JIT compilation of expression systems.
//! It uses Cranelift as the backend compiler to generate native machine code.
//!
//! The main entry point is [`build_combined_function()`], which compiles a list
//! of expressions into one native function. The generated function reads its
//! inputs from a slice of f64 (one slot per variable, in layout order) and
//! writes expression `i` to slot `i` of an output slice.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    errors::BuilderError,
    expr::Expr,
    operators::{self, MathFunction},
    types::CombinedJITFunction,
};
use cranelift::prelude::*;
use cranelift_codegen::ir::{immediates::Offset32, FuncRef};
use cranelift_codegen::Context;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use isa::TargetIsa;
use log::trace;

struct ThreadSafeFunction(*const u8);
unsafe impl Send for ThreadSafeFunction {}
unsafe impl Sync for ThreadSafeFunction {}

/// Creates an Instruction Set Architecture (ISA) target for code generation.
///
/// This function detects the host machine architecture and configures appropriate
/// compilation flags for optimal code generation.
///
/// # Errors
/// Returns a BuilderError if:
/// - The host machine architecture is not supported
/// - A compiler setting is rejected
/// - Code generation configuration fails
pub(crate) fn create_isa() -> Result<Arc<dyn TargetIsa>, BuilderError> {
    let mut flag_builder = settings::builder();

    // Get target triple to detect architecture
    let target_triple = target_lexicon::Triple::host();
    let is_x86 = matches!(
        target_triple.architecture,
        target_lexicon::Architecture::X86_64
    );

    let pic = if is_x86 { "true" } else { "false" };
    let flags = [
        ("use_colocated_libcalls", pic),
        ("is_pic", pic),
        ("opt_level", "speed"),
        (
            "enable_verifier",
            if cfg!(debug_assertions) { "true" } else { "false" },
        ),
    ];
    for (name, value) in flags {
        flag_builder
            .set(name, value)
            .map_err(|e| BuilderError::Setting(format!("{name}={value}: {e}")))?;
    }

    let isa_builder = cranelift_native::builder()
        .map_err(|msg| BuilderError::HostMachineNotSupported(msg.to_string()))?;

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(BuilderError::CodegenError)
}

/// Creates a new JIT module for the host with the math shims linked in.
pub(crate) fn create_module(isa: Arc<dyn TargetIsa>) -> JITModule {
    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
    operators::register_symbols(&mut builder);
    JITModule::new(builder)
}

/// Builds a JIT-compiled function that evaluates multiple expressions together.
///
/// # Arguments
/// * `exprs` - Expressions to compile, in output order
/// * `variable_map` - Position of every variable in the input slice
///
/// # Returns
/// A thread-safe function that:
/// - Takes a slice of input values
/// - Takes a mutable slice for results
/// - Evaluates all expressions
/// - Stores results directly in the output slice
///
/// # Errors
/// Returns [`BuilderError::UnboundVariable`] if an expression uses a variable
/// missing from `variable_map`, or another BuilderError if compilation fails.
///
/// # Panics
/// The returned function panics if the input slice is shorter than the
/// variable layout or the results slice length differs from `exprs.len()`.
pub fn build_combined_function(
    exprs: &[Expr],
    variable_map: &HashMap<String, u32>,
) -> Result<CombinedJITFunction, BuilderError> {
    let mut builder_context = FunctionBuilderContext::new();
    let mut codegen_context = Context::new();
    let isa = create_isa()?;
    let mut module = create_module(isa);

    // fn(input_ptr: *const f64, output_ptr: *mut f64)
    let pointer_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(pointer_type));
    sig.params.push(AbiParam::new(pointer_type));

    let func_id = module
        .declare_function("combined", Linkage::Export, &sig)
        .map_err(|msg| BuilderError::DeclarationError(msg.to_string()))?;

    codegen_context.func.signature = sig;
    let mut builder = FunctionBuilder::new(&mut codegen_context.func, &mut builder_context);

    let entry_block = builder.create_block();
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);
    builder.seal_block(entry_block);

    let input_ptr = builder.block_params(entry_block)[0];
    let output_ptr = builder.block_params(entry_block)[1];

    let mut emitter = Emitter {
        module: &mut module,
        input_ptr,
        variable_map,
        loaded: HashMap::new(),
        imports: HashMap::new(),
    };
    let results = exprs
        .iter()
        .map(|expr| emitter.emit(&mut builder, expr))
        .collect::<Result<Vec<_>, _>>()?;

    for (i, result) in results.iter().enumerate() {
        builder.ins().store(
            MemFlags::new().with_aligned().with_notrap(),
            *result,
            output_ptr,
            Offset32::new(i as i32 * 8),
        );
    }

    // Return void since we wrote directly to output buffer
    builder.ins().return_(&[]);
    builder.finalize();
    trace!("generated IR:\n{}", codegen_context.func.display());

    module
        .define_function(func_id, &mut codegen_context)
        .map_err(|msg| BuilderError::FunctionError(msg.to_string()))?;
    module.clear_context(&mut codegen_context);
    module
        .finalize_definitions()
        .map_err(BuilderError::ModuleError)?;

    let inputs_len = variable_map
        .values()
        .map(|&idx| idx as usize + 1)
        .max()
        .unwrap_or(0);
    let results_len = exprs.len();

    let code = Arc::new(ThreadSafeFunction(module.get_finalized_function(func_id)));
    let wrapper = Box::new(move |inputs: &[f64], results: &mut [f64]| {
        assert!(
            inputs.len() >= inputs_len,
            "input slice has {} values, layout needs {inputs_len}",
            inputs.len()
        );
        assert_eq!(
            results.len(),
            results_len,
            "Results buffer has incorrect length"
        );
        // SAFETY: the function was compiled with signature
        // extern "C" fn(*const f64, *mut f64), only reads offsets below
        // inputs_len and only writes offsets below results_len. The module's
        // memory is never freed.
        unsafe {
            let f: extern "C" fn(*const f64, *mut f64) = std::mem::transmute(code.0);
            f(inputs.as_ptr(), results.as_mut_ptr());
        }
    });

    Ok(Arc::new(wrapper))
}

/// Per-function code generation state.
struct Emitter<'a> {
    module: &'a mut JITModule,
    input_ptr: Value,
    variable_map: &'a HashMap<String, u32>,
    /// Variables already loaded from the input slice, by index
    loaded: HashMap<u32, Value>,
    /// Math shims already declared in the function being built
    imports: HashMap<MathFunction, FuncRef>,
}

impl Emitter<'_> {
    fn emit(&mut self, builder: &mut FunctionBuilder, expr: &Expr) -> Result<Value, BuilderError> {
        Ok(match expr {
            Expr::Const(val) => builder.ins().f64const(*val),
            Expr::Var(name) => self.load(builder, name)?,
            Expr::Add(left, right) => {
                let (l, r) = self.emit_pair(builder, left, right)?;
                builder.ins().fadd(l, r)
            }
            Expr::Sub(left, right) => {
                let (l, r) = self.emit_pair(builder, left, right)?;
                builder.ins().fsub(l, r)
            }
            Expr::Mul(left, right) => {
                let (l, r) = self.emit_pair(builder, left, right)?;
                builder.ins().fmul(l, r)
            }
            Expr::Div(left, right) => {
                let (l, r) = self.emit_pair(builder, left, right)?;
                builder.ins().fdiv(l, r)
            }
            Expr::Neg(inner) => {
                let v = self.emit(builder, inner)?;
                builder.ins().fneg(v)
            }
            Expr::Abs(inner) => {
                let v = self.emit(builder, inner)?;
                builder.ins().fabs(v)
            }
            Expr::Sqrt(inner) => {
                let v = self.emit(builder, inner)?;
                builder.ins().sqrt(v)
            }
            Expr::Pow(base, exp) => {
                let b = self.emit(builder, base)?;
                generate_power(builder, b, *exp)
            }
            Expr::PowFloat(base, exp) => {
                let b = self.emit(builder, base)?;
                let e = builder.ins().f64const(*exp);
                self.call(builder, MathFunction::Pow, &[b, e])?
            }
            Expr::PowExpr(base, exponent) => {
                let (b, e) = self.emit_pair(builder, base, exponent)?;
                self.call(builder, MathFunction::Pow, &[b, e])?
            }
            Expr::Exp(inner) => {
                let v = self.emit(builder, inner)?;
                self.call(builder, MathFunction::Exp, &[v])?
            }
            Expr::Ln(inner) => {
                let v = self.emit(builder, inner)?;
                self.call(builder, MathFunction::Ln, &[v])?
            }
            Expr::Sin(inner) => {
                let v = self.emit(builder, inner)?;
                self.call(builder, MathFunction::Sin, &[v])?
            }
            Expr::Cos(inner) => {
                let v = self.emit(builder, inner)?;
                self.call(builder, MathFunction::Cos, &[v])?
            }
        })
    }

    fn emit_pair(
        &mut self,
        builder: &mut FunctionBuilder,
        left: &Expr,
        right: &Expr,
    ) -> Result<(Value, Value), BuilderError> {
        let l = self.emit(builder, left)?;
        let r = self.emit(builder, right)?;
        Ok((l, r))
    }

    fn load(&mut self, builder: &mut FunctionBuilder, name: &str) -> Result<Value, BuilderError> {
        let idx = *self
            .variable_map
            .get(name)
            .ok_or_else(|| BuilderError::UnboundVariable(name.to_string()))?;
        if let Some(value) = self.loaded.get(&idx) {
            return Ok(*value);
        }

        let mem = MemFlags::new().with_aligned().with_readonly().with_notrap();
        let value = builder.ins().load(
            types::F64,
            mem,
            self.input_ptr,
            Offset32::new(idx as i32 * 8),
        );
        self.loaded.insert(idx, value);
        Ok(value)
    }

    fn call(
        &mut self,
        builder: &mut FunctionBuilder,
        function: MathFunction,
        args: &[Value],
    ) -> Result<Value, BuilderError> {
        let func = match self.imports.get(&function) {
            Some(func) => *func,
            None => {
                let func_id = operators::link(&mut *self.module, function)?;
                let func = self.module.declare_func_in_func(func_id, builder.func);
                self.imports.insert(function, func);
                func
            }
        };
        Ok(operators::call(builder, func, args))
    }
}

/// Integer power by binary exponentiation.
///
/// Emits the same multiplication sequence as the interpreter so both backends
/// agree bit for bit.
fn generate_power(builder: &mut FunctionBuilder, base: Value, exp: i64) -> Value {
    let mut result: Option<Value> = None;
    let mut current = base;
    let mut remaining = exp.unsigned_abs();

    while remaining > 0 {
        if remaining & 1 == 1 {
            result = Some(match result {
                Some(acc) => builder.ins().fmul(acc, current),
                None => current,
            });
        }
        remaining >>= 1;
        if remaining > 0 {
            current = builder.ins().fmul(current, current);
        }
    }

    let result = match result {
        Some(value) => value,
        None => return builder.ins().f64const(1.0),
    };
    if exp < 0 {
        let one = builder.ins().f64const(1.0);
        builder.ins().fdiv(one, result)
    } else {
        result
    }
}
