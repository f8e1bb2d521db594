//! Host math functions callable from JIT-compiled code.
//!
//! Cranelift has native instructions for the arithmetic operators, `fabs` and
//! `sqrt`, but not for the transcendental functions. Those are provided by the
//! `extern "C"` shims below, registered as symbols on the [`JITBuilder`] and
//! declared as imports in the module before they are called.

use cranelift::prelude::*;
use cranelift_codegen::ir::FuncRef;
use cranelift_jit::JITBuilder;
use cranelift_module::{FuncId, Linkage, Module};

use crate::errors::BuilderError;

/// A host function that compiled code can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MathFunction {
    Exp,
    Ln,
    Sin,
    Cos,
    /// `powf(base, exponent)`
    Pow,
}

impl MathFunction {
    pub(crate) const ALL: [MathFunction; 5] = [
        MathFunction::Exp,
        MathFunction::Ln,
        MathFunction::Sin,
        MathFunction::Cos,
        MathFunction::Pow,
    ];

    /// Symbol name the shim is registered under.
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            MathFunction::Exp => "jd_exp",
            MathFunction::Ln => "jd_ln",
            MathFunction::Sin => "jd_sin",
            MathFunction::Cos => "jd_cos",
            MathFunction::Pow => "jd_pow",
        }
    }

    fn arity(self) -> usize {
        match self {
            MathFunction::Pow => 2,
            _ => 1,
        }
    }

    fn address(self) -> *const u8 {
        match self {
            MathFunction::Exp => exp_shim as *const u8,
            MathFunction::Ln => ln_shim as *const u8,
            MathFunction::Sin => sin_shim as *const u8,
            MathFunction::Cos => cos_shim as *const u8,
            MathFunction::Pow => pow_shim as *const u8,
        }
    }
}

extern "C" fn exp_shim(x: f64) -> f64 {
    x.exp()
}

extern "C" fn ln_shim(x: f64) -> f64 {
    x.ln()
}

extern "C" fn sin_shim(x: f64) -> f64 {
    x.sin()
}

extern "C" fn cos_shim(x: f64) -> f64 {
    x.cos()
}

extern "C" fn pow_shim(base: f64, exponent: f64) -> f64 {
    base.powf(exponent)
}

/// Makes every shim resolvable by name in modules created from `builder`.
pub(crate) fn register_symbols(builder: &mut JITBuilder) {
    for function in MathFunction::ALL {
        builder.symbol(function.symbol(), function.address());
    }
}

/// Declares `function` as an import of the module.
///
/// The signature is `(f64, ..) -> f64` with one parameter per argument.
pub(crate) fn link(module: &mut dyn Module, function: MathFunction) -> Result<FuncId, BuilderError> {
    let mut sig = module.make_signature();
    for _ in 0..function.arity() {
        sig.params.push(AbiParam::new(types::F64));
    }
    sig.returns.push(AbiParam::new(types::F64));

    module
        .declare_function(function.symbol(), Linkage::Import, &sig)
        .map_err(|e| BuilderError::DeclarationError(e.to_string()))
}

/// Emits a call to a previously declared function and returns its result.
pub(crate) fn call(builder: &mut FunctionBuilder, func: FuncRef, args: &[Value]) -> Value {
    let call = builder.ins().call(func, args);
    builder.inst_results(call)[0]
}
