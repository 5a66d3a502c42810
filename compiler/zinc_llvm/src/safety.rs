//! Runtime safety checks and the panic contract.
//!
//! Compiled images call `panic(message: []const u8) -> noreturn` when a
//! safety check fails. If the user program exports its own `panic`, that
//! one is used; otherwise a default that traps is supplied. Messages come
//! from a fixed table, one global per message id actually referenced.

use inkwell::module::Linkage as LlvmLinkage;
use inkwell::values::{FunctionValue, IntValue};

use crate::Codegen;

/// Canonical safety-failure messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PanicMsgId {
    Unreachable,
    BoundsCheck,
    CastNegativeToUnsigned,
    CastTruncatedData,
    IntegerOverflow,
    ShiftOverflow,
    DivisionByZero,
    RemainderByZero,
    ExactDivisionRemainder,
    SliceWidenRemainder,
    UnwrapNull,
    UnwrapError,
    InvalidErrorCode,
}

impl PanicMsgId {
    pub fn message(self) -> &'static str {
        match self {
            PanicMsgId::Unreachable => "reached unreachable code",
            PanicMsgId::BoundsCheck => "index out of bounds",
            PanicMsgId::CastNegativeToUnsigned => "attempt to cast negative value to unsigned integer",
            PanicMsgId::CastTruncatedData => "integer cast truncated bits",
            PanicMsgId::IntegerOverflow => "integer overflow",
            PanicMsgId::ShiftOverflow => "shift amount is greater than the type size",
            PanicMsgId::DivisionByZero => "division by zero",
            PanicMsgId::RemainderByZero => "remainder division by zero",
            PanicMsgId::ExactDivisionRemainder => "exact division produced remainder",
            PanicMsgId::SliceWidenRemainder => "slice widening size mismatch",
            PanicMsgId::UnwrapNull => "attempt to unwrap null",
            PanicMsgId::UnwrapError => "attempt to unwrap error",
            PanicMsgId::InvalidErrorCode => "invalid error code",
        }
    }
}

impl<'ctx> Codegen<'ctx, '_> {
    /// Declare the panic handler: the user's exported `panic` if one was
    /// compiled, else a weak default that traps.
    pub(crate) fn declare_panic_handler(&mut self) {
        if let Some(user_panic) = self.comp.panic_fn {
            if let Some(&function) = self.fn_map.get(&user_panic) {
                self.panic_fn = Some(function);
                return;
            }
        }

        let slice_ty = self.byte_slice_type();
        let fn_type = self
            .context
            .void_type()
            .fn_type(&[slice_ty.into()], false);

        let function =
            self.module
                .add_function("zinc.panic", fn_type, Some(LlvmLinkage::LinkOnceAny));
        let entry = self.context.append_basic_block(function, "entry");
        let saved = self.builder.get_insert_block();
        self.builder.position_at_end(entry);
        let trap = self.module.get_function("llvm.trap").unwrap_or_else(|| {
            let trap_type = self.context.void_type().fn_type(&[], false);
            self.module.add_function("llvm.trap", trap_type, None)
        });
        let _ = self.builder.build_call(trap, &[], "");
        let _ = self.builder.build_unreachable();
        if let Some(saved) = saved {
            self.builder.position_at_end(saved);
        }
        self.panic_fn = Some(function);
    }

    /// Branch to a panic call when `ok` is false.
    pub(crate) fn emit_safety_check(
        &mut self,
        ok: IntValue<'ctx>,
        msg: PanicMsgId,
        function: FunctionValue<'ctx>,
    ) -> Result<(), String> {
        let err = |e: inkwell::builder::BuilderError| e.to_string();
        let fail_block = self.context.append_basic_block(function, "safety.fail");
        let ok_block = self.context.append_basic_block(function, "safety.ok");
        self.builder
            .build_conditional_branch(ok, ok_block, fail_block)
            .map_err(err)?;
        self.builder.position_at_end(fail_block);
        self.emit_panic_call(msg)?;
        self.builder.position_at_end(ok_block);
        Ok(())
    }

    /// Unconditional call of the panic handler with a canonical message.
    /// Message globals are interned per id: one definition per image.
    pub(crate) fn emit_panic_call(&mut self, msg: PanicMsgId) -> Result<(), String> {
        let err = |e: inkwell::builder::BuilderError| e.to_string();
        let global = match self.panic_msg_globals.get(&msg) {
            Some(&cached) => cached,
            None => {
                let slice = self.const_byte_slice(msg.message());
                let global = self.module.add_global(
                    slice.get_type(),
                    Some(inkwell::AddressSpace::default()),
                    "panic.msg",
                );
                global.set_initializer(&slice);
                global.set_constant(true);
                global.set_linkage(LlvmLinkage::Internal);
                self.panic_msg_globals.insert(msg, global);
                global
            }
        };
        let slice_ty = self.byte_slice_type();
        let loaded = self
            .builder
            .build_load(slice_ty, global.as_pointer_value(), "msg")
            .map_err(err)?;
        self.emit_panic_with_value(loaded)
    }

    pub(crate) fn emit_panic_with_value(
        &mut self,
        message: inkwell::values::BasicValueEnum<'ctx>,
    ) -> Result<(), String> {
        let err = |e: inkwell::builder::BuilderError| e.to_string();
        let panic_fn = self
            .panic_fn
            .ok_or_else(|| "panic handler not declared".to_string())?;
        self.builder
            .build_call(panic_fn, &[message.into()], "")
            .map_err(err)?;
        self.builder.build_unreachable().map_err(err)?;
        Ok(())
    }
}
