//! System-V argument marshalling.
//!
//! Integer and pointer arguments ride the six GP argument registers on
//! x64, float/double the first eight XMM registers; everything else, and
//! everything on x86, goes to the stack. The per-call counters live in an
//! explicit [ArgState] threaded through the function emitter and reset
//! after each `call`.

use tracing::trace;

use crate::back::asm::{Syntax, Width};
use crate::back::codegen::FuncEmit;
use crate::back::operand::Operand;
use crate::error::Result;
use crate::middle::ir::{Inst, Type};

/// Per-call argument state.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArgState {
    /// Bytes pushed for the pending call; the call site pops them back.
    pub stack_bytes: i64,
    /// Next integer argument register index.
    pub int_idx: usize,
    /// Next XMM argument register index.
    pub float_idx: usize,
}

impl ArgState {
    pub fn reset(&mut self) {
        *self = ArgState::default();
    }
}

/// Integer/pointer argument registers in System-V order.
pub const INT_ARG_REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];

impl<'a> FuncEmit<'a> {
    pub(super) fn emit_arg(&mut self, inst: &Inst) -> Result<()> {
        trace!(ty = %inst.ty, "marshal argument");
        let t = self.target();
        match inst.ty {
            Type::Float | Type::Double if t.is64() && self.args.float_idx < 8 => {
                self.arg_xmm(inst)
            }
            Type::Float => self.arg_stack_float(inst),
            Type::Double => self.arg_stack_double(inst),
            Type::LDouble => self.arg_stack_ldouble(inst),
            _ if t.is64() && self.args.int_idx < 6 => self.arg_int_reg(inst),
            _ => self.arg_push(inst),
        }
    }

    /// Next GP argument register.
    fn arg_int_reg(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let w = t.word();
        let src = self.operand_of(inst.src1, w);
        let reg = INT_ARG_REGS[self.args.int_idx];
        self.per_syntax(
            format!("mov{w} {}, %{reg}", src.render(Syntax::Att, t, None)),
            format!("mov {reg}, {}", src.render(Syntax::Intel, t, Some(w.keyword()))),
        );
        self.args.int_idx += 1;
        Ok(())
    }

    /// Next XMM argument register: `movd` for float, `movq` for double.
    fn arg_xmm(&mut self, inst: &Inst) -> Result<()> {
        let (mn, w) = match inst.ty {
            Type::Float => ("movd", Width::Long),
            _ => ("movq", Width::Quad),
        };
        let t = self.target();
        let i = self.args.float_idx;
        let src = self.operand_of(inst.src1, w);
        self.per_syntax(
            format!("{mn} {}, %xmm{i}", src.render(Syntax::Att, t, None)),
            format!("{mn} xmm{i}, {}", src.render(Syntax::Intel, t, Some(w.keyword()))),
        );
        self.args.float_idx += 1;
        Ok(())
    }

    /// Four stack bytes, stored through XMM0.
    fn arg_stack_float(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        self.sp_adjust("sub", 4);
        let src = self.operand_of(inst.src1, Width::Long);
        self.per_syntax(
            format!("movd {}, %xmm0", src.render(Syntax::Att, t, None)),
            format!("movd xmm0, {}", src.render(Syntax::Intel, t, Some("dword ptr"))),
        );
        self.per_syntax(
            format!("movss %xmm0, (%{})", t.sp()),
            format!("movss dword ptr [{}], xmm0", t.sp()),
        );
        self.args.stack_bytes += 4;
        Ok(())
    }

    /// Eight stack bytes, stored through XMM0.
    fn arg_stack_double(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        self.sp_adjust("sub", 8);
        let src = self.operand_of(inst.src1, Width::Quad);
        self.per_syntax(
            format!("movq {}, %xmm0", src.render(Syntax::Att, t, None)),
            format!("movq xmm0, {}", src.render(Syntax::Intel, t, Some("qword ptr"))),
        );
        self.per_syntax(
            format!("movsd %xmm0, (%{})", t.sp()),
            format!("movsd qword ptr [{}], xmm0", t.sp()),
        );
        self.args.stack_bytes += 8;
        Ok(())
    }

    /// Ten-byte value through the x87 unit; 16 bytes of stack on x64 for
    /// alignment, 10 on x86.
    fn arg_stack_ldouble(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let size = if t.is64() { 16 } else { 10 };
        self.sp_adjust("sub", size);
        let src = self.slot_mem(inst.src1);
        self.fldt(&src);
        self.per_syntax(
            format!("fstpt (%{})", t.sp()),
            format!("fstp tword ptr [{}]", t.sp()),
        );
        self.args.stack_bytes += size;
        Ok(())
    }

    /// Plain word push: the x86 path, and the x64 overflow path once the
    /// argument registers run out.
    fn arg_push(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let w = t.word();
        let src = self.operand_of(inst.src1, w);
        self.op1("push", w, &src);
        self.args.stack_bytes += t.word_size() as i64;
        Ok(())
    }
}
