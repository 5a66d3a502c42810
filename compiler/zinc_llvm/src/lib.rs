//! LLVM backend for zinc.
//!
//! Walks the typed stage-2 IR of every completed function and drives
//! inkwell: a dependency-ordered type lowering pass, global and function
//! declaration, body emission with runtime safety traps, then object
//! emission and the linker driver.
//!
//! The semantic core never sees this crate's types; it is the single
//! seam to the code generation library.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::too_many_arguments
)]

mod consts;
mod debug;
mod funcs;
pub mod link;
mod safety;
mod types;

use std::path::Path;

use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::types::BasicTypeEnum;
use inkwell::values::{FunctionValue, GlobalValue, PointerValue};
use inkwell::OptimizationLevel;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use zinc_sem::fns::FnAnalState;
use zinc_sem::ir::OverflowOp;
use zinc_sem::{Compilation, VarId};
use zinc_types::{FnId, TypeId};

pub use safety::PanicMsgId;

/// Code generation context for one compilation.
pub struct Codegen<'ctx, 'c> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub comp: &'c mut Compilation,
    target_machine: TargetMachine,
    pub(crate) dibuilder: Option<debug::DebugInfo<'ctx>>,

    pub(crate) fn_map: FxHashMap<FnId, FunctionValue<'ctx>>,
    pub(crate) global_map: FxHashMap<u32, GlobalValue<'ctx>>,
    pub(crate) type_cache: FxHashMap<TypeId, BasicTypeEnum<'ctx>>,
    /// Interned overflow intrinsics: one declaration per `{op, bits}`.
    pub(crate) overflow_intrinsics: FxHashMap<(OverflowOp, u32), FunctionValue<'ctx>>,
    /// Interned `ctlz`/`cttz` intrinsics per `{is_ctz, bits}`.
    pub(crate) bit_count_intrinsics: FxHashMap<(bool, u32), FunctionValue<'ctx>>,
    pub(crate) panic_fn: Option<FunctionValue<'ctx>>,
    pub(crate) panic_msg_globals: FxHashMap<PanicMsgId, GlobalValue<'ctx>>,
    /// Per-function local variable slots.
    pub(crate) locals: FxHashMap<VarId, PointerValue<'ctx>>,
}

impl<'ctx, 'c> Codegen<'ctx, 'c> {
    pub fn new(
        context: &'ctx Context,
        comp: &'c mut Compilation,
        module_name: &str,
    ) -> Result<Codegen<'ctx, 'c>, String> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(|message| format!("failed to initialize native target: {message}"))?;
        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).map_err(|e| e.to_string())?;
        let opt_level = if comp.options.is_release {
            OptimizationLevel::Aggressive
        } else {
            OptimizationLevel::None
        };
        let target_machine = target
            .create_target_machine(
                &triple,
                TargetMachine::get_host_cpu_name().to_str().unwrap_or(""),
                TargetMachine::get_host_cpu_features().to_str().unwrap_or(""),
                opt_level,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .ok_or_else(|| "failed to create target machine".to_string())?;

        let module = context.create_module(module_name);
        module.set_triple(&triple);
        let builder = context.create_builder();
        let dibuilder = if comp.options.strip {
            None
        } else {
            Some(debug::DebugInfo::new(context, &module, comp))
        };

        Ok(Codegen {
            context,
            module,
            builder,
            comp,
            target_machine,
            dibuilder,
            fn_map: FxHashMap::default(),
            global_map: FxHashMap::default(),
            type_cache: FxHashMap::default(),
            overflow_intrinsics: FxHashMap::default(),
            bit_count_intrinsics: FxHashMap::default(),
            panic_fn: None,
            panic_msg_globals: FxHashMap::default(),
            locals: FxHashMap::default(),
        })
    }

    /// Pointer width of the emission target, in bits.
    pub fn ptr_bits(&self) -> u32 {
        self.target_machine
            .get_target_data()
            .get_pointer_byte_size(None)
            * 8
    }

    /// Emit the whole image: types, globals, functions, panic plumbing.
    pub fn emit_module(&mut self) -> Result<(), String> {
        if self.comp.err_name_table_needed {
            self.emit_error_name_table();
        }

        // Globals first, then function declarations, then bodies, so
        // forward references resolve without patching.
        for global_index in 0..self.comp.globals.len() {
            self.declare_global(global_index as u32)?;
        }

        let fn_ids: Vec<FnId> = (0..self.comp.fns.len() as u32).map(FnId).collect();
        for &fn_id in &fn_ids {
            let entry = self.comp.fn_entry(fn_id);
            let reachable = entry.is_extern
                || matches!(entry.anal_state, FnAnalState::Complete);
            if reachable && !entry.is_generic() {
                self.declare_fn(fn_id)?;
            }
        }
        // The panic handler resolves against the declared functions: a
        // user-exported `panic` wins, otherwise a default that traps.
        self.declare_panic_handler();
        for &fn_id in &fn_ids {
            let entry = self.comp.fn_entry(fn_id);
            if matches!(entry.anal_state, FnAnalState::Complete)
                && entry.analyzed.is_some()
                && !entry.is_generic()
            {
                self.emit_fn_body(fn_id)?;
            }
        }

        self.emit_entry_point()?;
        if let Some(dibuilder) = &self.dibuilder {
            dibuilder.finalize();
        }
        debug!(fns = self.fn_map.len(), "emitted module");
        Ok(())
    }

    /// Write the object artifact.
    pub fn write_object(&self, path: &Path) -> Result<(), String> {
        self.module
            .verify()
            .map_err(|message| format!("invalid module: {}", message.to_string_lossy()))?;
        self.target_machine
            .write_to_file(&self.module, FileType::Object, path)
            .map_err(|message| message.to_string_lossy().into_owned())?;
        info!(path = %path.display(), "wrote object file");
        Ok(())
    }

    /// Render textual LLVM IR (the `asm` subcommand and tests use this).
    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinc_sem::{CompileOptions, SourceLoader};

    struct NoLoader;
    impl SourceLoader for NoLoader {
        fn load(&mut self, _from: &str, _name: &str) -> Result<(String, String), String> {
            Err("no loader".into())
        }
    }

    fn emit_ir(source: &str, options: CompileOptions) -> String {
        let mut comp = Compilation::new(options, Box::new(NoLoader));
        comp.add_source("main.zn".to_string(), source.to_string())
            .expect("source parses");
        comp.run();
        assert_eq!(
            comp.error_count(),
            0,
            "{:?}",
            comp.diagnostics.diagnostics()
        );
        let context = Context::create();
        let mut codegen = Codegen::new(&context, &mut comp, "test").expect("codegen init");
        codegen.emit_module().expect("emission");
        codegen.print_ir()
    }

    #[test]
    fn exe_gets_wrapped_entry_point() {
        let ir = emit_ir("fn main() -> i32 { return 42; }", CompileOptions::default());
        assert!(ir.contains("define i32 @main"), "{ir}");
        assert!(ir.contains("zinc.main"), "{ir}");
    }

    #[test]
    fn debug_build_requests_overflow_check() {
        let ir = emit_ir(
            "fn main() -> i32 { return 0; }\nfn add(a: i32, b: i32) -> i32 { return a + b; }",
            CompileOptions::default(),
        );
        assert!(ir.contains("sadd.with.overflow"), "{ir}");
        // Failing checks funnel into the panic handler.
        assert!(ir.contains("zinc.panic"), "{ir}");
    }

    #[test]
    fn release_build_omits_safety_traps() {
        let ir = emit_ir(
            "fn main() -> i32 { return 0; }\nfn add(a: i32, b: i32) -> i32 { return a + b; }",
            CompileOptions {
                is_release: true,
                strip: true,
                ..CompileOptions::default()
            },
        );
        assert!(!ir.contains("sadd.with.overflow"), "{ir}");
    }

    #[test]
    fn writes_an_object_file() {
        let mut comp = Compilation::new(CompileOptions::default(), Box::new(NoLoader));
        comp.add_source(
            "main.zn".to_string(),
            "fn main() -> i32 { return 0; }".to_string(),
        )
        .expect("source parses");
        comp.run();
        assert_eq!(comp.error_count(), 0);
        let context = Context::create();
        let mut codegen = Codegen::new(&context, &mut comp, "test").expect("codegen init");
        codegen.emit_module().expect("emission");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.o");
        codegen.write_object(&path).expect("object write");
        assert!(path.metadata().expect("object exists").len() > 0);
    }

    #[test]
    fn comptime_results_emit_as_constants() {
        let ir = emit_ir(
            "fn square(x: i32) -> i32 { return x * x; }\n\
             fn main() -> i32 { return comptime square(7); }",
            CompileOptions::default(),
        );
        assert!(ir.contains("49"), "{ir}");
    }
}
