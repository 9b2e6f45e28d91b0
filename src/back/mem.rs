//! Load and store emitters.
//!
//! x86 has no memory-to-memory `mov`, so every path here routes spilled
//! operands through the scratch registers: scratch 0 first, scratch 1 when
//! a single instruction needs two memory operands live at once. Ten-byte
//! stores go through the x87 unit, 16- and 20-byte stores through an XMM
//! register with the trailing word copied via an integer scratch.

use crate::back::asm::{Gpr, Syntax, Width, SCRATCH0, SCRATCH1};
use crate::back::codegen::FuncEmit;
use crate::back::operand::{hw_scale, index_scale, stack_operand, type_size, type_width, Mem, Operand};
use crate::error::Result;
use crate::middle::ir::{Inst, Value};

impl<'a> FuncEmit<'a> {
    /// `Load name -> dest`: one typed move, widened through scratch 0 when
    /// the destination is spilled.
    pub(super) fn emit_load(&mut self, inst: &Inst) -> Result<()> {
        let src = stack_operand(self.sym_of(inst)?);
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.load_mem(inst.ty, src, reg);
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    /// `Store src1 -> name`.
    pub(super) fn emit_store(&mut self, inst: &Inst) -> Result<()> {
        let dst = stack_operand(self.sym_of(inst)?);
        self.store_value(inst, inst.src1, dst, SCRATCH0, SCRATCH0)
    }

    /// `LoadPtr src1 -> dest`: dereference a pointer value. A spilled
    /// pointer is loaded into scratch 0 first; the loaded result may then
    /// reuse the same scratch.
    pub(super) fn emit_load_ptr(&mut self, inst: &Inst) -> Result<()> {
        let addr = self.value_reg(inst.src1, SCRATCH0);
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.load_mem(inst.ty, Mem::deref(addr), reg);
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    /// `StorePtr src1=addr, src2=val`: when both operands are spilled the
    /// address takes scratch 0 and the value scratch 1.
    pub(super) fn emit_store_ptr(&mut self, inst: &Inst) -> Result<()> {
        let addr = self.value_reg(inst.src1, SCRATCH0);
        let val_scratch = if addr == SCRATCH0 { SCRATCH1 } else { SCRATCH0 };
        self.store_value(inst, inst.src2, Mem::deref(addr), val_scratch, val_scratch)
    }

    /// `LoadIdx name[src1] -> dest` with the scale rule: explicit or
    /// type-inferred, pre-multiplied through scratch 0 when the hardware
    /// cannot scale it.
    pub(super) fn emit_load_idx(&mut self, inst: &Inst) -> Result<()> {
        let base = stack_operand(self.sym_of(inst)?);
        let src = self.indexed_operand(inst, base);
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.load_mem(inst.ty, src, reg);
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    /// `StoreIdx name[src1] = src2`: the index claims scratch 0 when
    /// spilled or manually scaled; the value then falls back to scratch 1.
    pub(super) fn emit_store_idx(&mut self, inst: &Inst) -> Result<()> {
        let base = stack_operand(self.sym_of(inst)?);
        let dst = self.indexed_operand(inst, base);
        let index_scratched = matches!(&dst, Mem::Indexed { index, .. } if *index == SCRATCH0);
        let val_scratch = if index_scratched { SCRATCH1 } else { SCRATCH0 };
        self.store_value(inst, inst.src2, dst, val_scratch, val_scratch)
    }

    /// Synthesize the indexed memory operand for `inst` over `base`,
    /// emitting the index moves and the manual `imul` when needed.
    fn indexed_operand(&mut self, inst: &Inst, base: Mem) -> Mem {
        let t = self.target();
        let w = t.word();
        let scale = index_scale(inst.imm, inst.ty, t);
        let mut index = self.value_reg(inst.src1, SCRATCH0);
        if hw_scale(scale) {
            return base.indexed(index, scale);
        }
        // Non-standard scale: multiply into scratch 0 and address at 1.
        if index != SCRATCH0 {
            self.mov(w, &Operand::Reg(index, w), &Operand::Reg(SCRATCH0, w));
            index = SCRATCH0;
        }
        self.imul_imm(w, scale as i64, index);
        base.indexed(index, 1)
    }

    /// Store `value` into the typed destination `dst`, routing spills
    /// through `scratch` and wide tails through `tail`.
    ///
    /// Values wider than a word never fit a general-purpose register; the
    /// location map keeps them in spill slots, so the wide paths read the
    /// slot directly and a register-held wide value is a contract
    /// violation, not a narrower store.
    pub(super) fn store_value(
        &mut self,
        inst: &Inst,
        value: Value,
        dst: Mem,
        scratch: Gpr,
        tail: Gpr,
    ) -> Result<()> {
        let t = self.target();
        match type_size(inst.ty, t) {
            10 => {
                // Memory-to-memory ten-byte copy through the x87 unit.
                let src = self.slot_mem(value);
                self.fldt(&src);
                self.fstpt(&dst);
            }
            size @ (16 | 20) => {
                let src = self.slot_mem(value);
                self.wide_store(size, src, dst, tail)?;
            }
            _ => {
                let w = type_width(inst.ty, t);
                let reg = self.value_reg(value, scratch);
                self.mov(w, &Operand::Reg(reg, w), &Operand::Mem(dst));
            }
        }
        Ok(())
    }

    /// Sixteen bytes over XMM; the 20-byte form copies the trailing four
    /// bytes through the integer scratch `tail`.
    fn wide_store(&mut self, size: u32, src: Mem, dst: Mem, tail: Gpr) -> Result<()> {
        let xmm = self.take_xmm()?;
        self.op2_unsized("movdqu", &Operand::Mem(src.clone()), &Operand::Xmm(xmm));
        self.op2_unsized("movdqu", &Operand::Xmm(xmm), &Operand::Mem(dst.clone()));
        if size == 20 {
            let w = Width::Long;
            self.mov(w, &Operand::Mem(src.offset(16)), &Operand::Reg(tail, w));
            self.mov(w, &Operand::Reg(tail, w), &Operand::Mem(dst.offset(16)));
        }
        Ok(())
    }

    /// Two-operand SSE form: no AT&T suffix, no Intel size keyword (the
    /// XMM register fixes the operand size).
    pub(super) fn op2_unsized(&mut self, mn: &str, src: &Operand, dst: &Operand) {
        let t = self.target();
        let line = match self.syntax() {
            Syntax::Att => format!(
                "{mn} {}, {}",
                src.render(Syntax::Att, t, None),
                dst.render(Syntax::Att, t, None)
            ),
            Syntax::Intel => format!(
                "{mn} {}, {}",
                dst.render(Syntax::Intel, t, None),
                src.render(Syntax::Intel, t, None)
            ),
        };
        self.line(line);
    }
}
