//! Arithmetic, comparison, logical, floating, and pointer emitters.
//!
//! Three-address IR lowers to x86 two-address form: `src1` moves into the
//! destination register (or scratch 0 for spilled destinations), the
//! operation applies the `src2` operand, and spilled results store back.
//! Division and shifts have fixed register operands (A/D and CL); the
//! registers involved are saved around the sequence when they may hold
//! live values.

use crate::back::asm::{Gpr, Syntax, Width, SCRATCH0, SCRATCH1};
use crate::back::codegen::FuncEmit;
use crate::back::operand::{spill_mem, type_width, Operand};
use crate::back::regalloc::Loc;
use crate::error::Result;
use crate::middle::ir::{Inst, Opcode, Type, Value};

/// Condition-code suffix for a comparison, signed or unsigned row.
fn condition_code(op: Opcode, signed: bool) -> &'static str {
    match (op, signed) {
        (Opcode::CmpEq, _) => "e",
        (Opcode::CmpNe, _) => "ne",
        (Opcode::CmpLt, true) => "l",
        (Opcode::CmpLt, false) => "b",
        (Opcode::CmpLe, true) => "le",
        (Opcode::CmpLe, false) => "be",
        (Opcode::CmpGt, true) => "g",
        (Opcode::CmpGt, false) => "a",
        (Opcode::CmpGe, true) => "ge",
        (Opcode::CmpGe, false) => "ae",
        _ => unimplemented!("internal error: not a comparison opcode"),
    }
}

impl<'a> FuncEmit<'a> {
    pub(super) fn emit_binop(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let mut w = type_width(inst.ty, t);
        if inst.op == Opcode::Mul && w == Width::Byte {
            // No two-operand byte imul.
            w = Width::Long;
        }
        let mn = match inst.op {
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "imul",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            _ => unimplemented!("internal error: not a binary opcode"),
        };
        let (dreg, spilled) = self.dest_reg(inst.dest);
        // Writing src1 into the destination must not clobber src2.
        let work = if spilled || self.in_reg(inst.src2, dreg) { SCRATCH0 } else { dreg };
        self.value_into(inst.src1, work);
        let rhs = self.operand_of(inst.src2, w);
        self.op2(mn, w, &rhs, &Operand::Reg(work, w));
        self.store_result(inst.dest, work, dreg, spilled);
        Ok(())
    }

    pub(super) fn emit_divmod(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let signed = inst.ty.is_signed();
        // Byte division leaves the remainder in AH; promote.
        let w = type_width(inst.ty, t).max(Width::Long);
        let (dreg, spilled) = self.dest_reg(inst.dest);
        let dest_is_d = !spilled && dreg == Gpr::D;
        if !dest_is_d {
            self.push_reg(Gpr::D);
        }
        // The sign extension clobbers D; move a D-resident divisor first.
        let rhs = if self.in_reg(inst.src2, Gpr::D) {
            let ww = t.word();
            self.mov(ww, &Operand::Reg(Gpr::D, ww), &Operand::Reg(SCRATCH1, ww));
            Operand::Reg(SCRATCH1, w)
        } else {
            self.operand_of(inst.src2, w)
        };
        self.value_into(inst.src1, Gpr::A);
        if signed {
            self.sign_extend_into_d(w);
        } else {
            self.per_syntax("xorl %edx, %edx".to_string(), "xor edx, edx".to_string());
        }
        self.op1(if signed { "idiv" } else { "div" }, w, &rhs);
        let res = if inst.op == Opcode::Div { Gpr::A } else { Gpr::D };
        if spilled {
            self.spill_store(inst.dest, res);
        } else if dreg != res {
            let ww = t.word();
            self.mov(ww, &Operand::Reg(res, ww), &Operand::Reg(dreg, ww));
        }
        if !dest_is_d {
            self.pop_reg(Gpr::D);
        }
        Ok(())
    }

    pub(super) fn emit_shift(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let w = type_width(inst.ty, t);
        let mn = match (inst.op, inst.ty.is_signed()) {
            (Opcode::Shl, true) => "sal",
            (Opcode::Shl, false) => "shl",
            (Opcode::Shr, true) => "sar",
            (Opcode::Shr, false) => "shr",
            _ => unimplemented!("internal error: not a shift opcode"),
        };
        let (dreg, spilled) = self.dest_reg(inst.dest);
        let count_in_c = self.in_reg(inst.src2, Gpr::C);
        let work = if spilled || dreg == Gpr::C || self.in_reg(inst.src2, dreg) {
            SCRATCH0
        } else {
            dreg
        };
        let save_c = !count_in_c && dreg != Gpr::C;
        if save_c {
            self.push_reg(Gpr::C);
        }
        self.value_into(inst.src1, work);
        self.value_into(inst.src2, Gpr::C);
        self.per_syntax(
            format!("{mn}{w} %cl, %{}", work.name(w)),
            format!("{mn} {}, cl", work.name(w)),
        );
        self.store_result(inst.dest, work, dreg, spilled);
        if save_c {
            self.pop_reg(Gpr::C);
        }
        Ok(())
    }

    pub(super) fn emit_compare(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let w = type_width(inst.ty, t);
        let lhs = self.value_reg(inst.src1, SCRATCH0);
        let rhs = self.operand_of(inst.src2, w);
        self.op2("cmp", w, &rhs, &Operand::Reg(lhs, w));
        self.setcc(condition_code(inst.op, inst.ty.is_signed()));
        let (dreg, spilled) = self.dest_reg(inst.dest);
        let work = if spilled { SCRATCH0 } else { dreg };
        self.widen_al(work);
        if spilled {
            self.spill_store(inst.dest, work);
        }
        Ok(())
    }

    /// Short-circuit `&&`/`||` over generated local labels.
    pub(super) fn emit_logical(&mut self, inst: &Inst) -> Result<()> {
        let w = self.target().word();
        let (dreg, spilled) = self.dest_reg(inst.dest);
        let work = if spilled { SCRATCH0 } else { dreg };
        let short = self.cg.fresh_label();
        let done = self.cg.fresh_label();
        let a = self.operand_of(inst.src1, w);
        let b = self.operand_of(inst.src2, w);
        match inst.op {
            Opcode::LogAnd => {
                self.op2("cmp", w, &Operand::Imm(0), &a);
                self.jump("je", &short);
                self.op2("cmp", w, &Operand::Imm(0), &b);
                self.jump("je", &short);
                self.mov_imm(w, 1, work);
                self.jump("jmp", &done);
                self.cg.asm.label(&short);
                self.mov_imm(w, 0, work);
            }
            Opcode::LogOr => {
                self.op2("cmp", w, &Operand::Imm(0), &a);
                self.jump("jne", &short);
                self.op2("cmp", w, &Operand::Imm(0), &b);
                self.jump("jne", &short);
                self.mov_imm(w, 0, work);
                self.jump("jmp", &done);
                self.cg.asm.label(&short);
                self.mov_imm(w, 1, work);
            }
            _ => unimplemented!("internal error: not a logical opcode"),
        }
        self.cg.asm.label(&done);
        if spilled {
            self.spill_store(inst.dest, work);
        }
        Ok(())
    }

    /// Float/double arithmetic through XMM0/XMM1.
    pub(super) fn emit_float_binop(&mut self, inst: &Inst) -> Result<()> {
        let double = inst.ty == Type::Double;
        let sfx = if double { "sd" } else { "ss" };
        let base = match inst.op {
            Opcode::FAdd => "add",
            Opcode::FSub => "sub",
            Opcode::FMul => "mul",
            Opcode::FDiv => "div",
            _ => unimplemented!("internal error: not a float opcode"),
        };
        self.fp_into_xmm(inst.ty, inst.src1, 0);
        self.fp_into_xmm(inst.ty, inst.src2, 1);
        self.per_syntax(format!("{base}{sfx} %xmm1, %xmm0"), format!("{base}{sfx} xmm0, xmm1"));
        let t = self.target();
        let (dreg, spilled) = self.dest_reg(inst.dest);
        if spilled {
            let slot = self.slot_mem(inst.dest);
            let kw = if double { "qword ptr" } else { "dword ptr" };
            self.per_syntax(
                format!("mov{sfx} %xmm0, {}", slot.render(Syntax::Att, t, None)),
                format!("mov{sfx} {}, xmm0", slot.render(Syntax::Intel, t, Some(kw))),
            );
        } else {
            let (mn, w) = if double { ("movq", Width::Quad) } else { ("movd", Width::Long) };
            self.per_syntax(
                format!("{mn} %xmm0, %{}", dreg.name(w)),
                format!("{mn} {}, xmm0", dreg.name(w)),
            );
        }
        Ok(())
    }

    /// Long-double arithmetic on the x87 stack; operands and result live
    /// in ten-byte spill slots.
    pub(super) fn emit_ldouble_binop(&mut self, inst: &Inst) -> Result<()> {
        let a = self.slot_mem(inst.src1);
        let b = self.slot_mem(inst.src2);
        self.fldt(&a);
        self.fldt(&b);
        let mn = match inst.op {
            Opcode::LfAdd => "faddp",
            Opcode::LfSub => "fsubp",
            Opcode::LfMul => "fmulp",
            Opcode::LfDiv => "fdivp",
            _ => unimplemented!("internal error: not a long-double opcode"),
        };
        self.line(mn.to_string());
        let dst = self.slot_mem(inst.dest);
        self.fstpt(&dst);
        Ok(())
    }

    /// `dest = src1 + src2 * imm` with the element size in `imm`.
    pub(super) fn emit_ptr_add(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let w = t.word();
        let size = inst.imm.max(1);
        let (dreg, spilled) = self.dest_reg(inst.dest);
        if size > 1 {
            self.value_into(inst.src2, SCRATCH0);
            self.imul_imm(w, size, SCRATCH0);
            let work = if spilled { SCRATCH1 } else { dreg };
            self.value_into(inst.src1, work);
            self.op2("add", w, &Operand::Reg(SCRATCH0, w), &Operand::Reg(work, w));
            if spilled {
                self.spill_store(inst.dest, work);
            }
        } else {
            let work = if spilled || self.in_reg(inst.src2, dreg) { SCRATCH0 } else { dreg };
            self.value_into(inst.src1, work);
            let rhs = self.operand_of(inst.src2, w);
            self.op2("add", w, &rhs, &Operand::Reg(work, w));
            self.store_result(inst.dest, work, dreg, spilled);
        }
        Ok(())
    }

    /// `dest = (src1 - src2) / imm`: a shift for power-of-two element
    /// sizes, signed division otherwise.
    pub(super) fn emit_ptr_diff(&mut self, inst: &Inst) -> Result<()> {
        let t = self.target();
        let w = t.word();
        let size = inst.imm.max(1) as u64;
        self.value_into(inst.src1, SCRATCH0);
        let rhs = self.operand_of(inst.src2, w);
        self.op2("sub", w, &rhs, &Operand::Reg(SCRATCH0, w));
        if size > 1 {
            if size.is_power_of_two() {
                self.shift_imm("sar", w, size.trailing_zeros(), SCRATCH0);
            } else {
                self.push_reg(Gpr::D);
                self.mov_imm(w, size as i64, SCRATCH1);
                self.sign_extend_into_d(w);
                self.op1("idiv", w, &Operand::Reg(SCRATCH1, w));
                self.pop_reg(Gpr::D);
            }
        }
        let (dreg, spilled) = self.dest_reg(inst.dest);
        self.store_result(inst.dest, SCRATCH0, dreg, spilled);
        Ok(())
    }

    /// Move a float/double value into an XMM register: bit-pattern moves
    /// from a GPR, `movss`/`movsd` from a spill slot.
    fn fp_into_xmm(&mut self, ty: Type, v: Value, xmm: u8) {
        let t = self.target();
        let double = ty == Type::Double;
        match self.alloc.loc(v) {
            Loc::Reg(r) => {
                let (mn, w) = if double { ("movq", Width::Quad) } else { ("movd", Width::Long) };
                self.per_syntax(
                    format!("{mn} %{}, %xmm{xmm}", r.name(w)),
                    format!("{mn} xmm{xmm}, {}", r.name(w)),
                );
            }
            Loc::Spill(slot) => {
                let m = spill_mem(slot, t);
                let (mn, kw) = if double { ("movsd", "qword ptr") } else { ("movss", "dword ptr") };
                self.per_syntax(
                    format!("{mn} {}, %xmm{xmm}", m.render(Syntax::Att, t, None)),
                    format!("{mn} xmm{xmm}, {}", m.render(Syntax::Intel, t, Some(kw))),
                );
            }
        }
    }

    /// Sign-extend A into D ahead of a signed division.
    fn sign_extend_into_d(&mut self, w: Width) {
        match w {
            Width::Quad => self.per_syntax("cqto".to_string(), "cqo".to_string()),
            _ => self.per_syntax("cltd".to_string(), "cdq".to_string()),
        }
    }

    /// Common tail: spill the result or copy it out of the work register.
    fn store_result(&mut self, dest: Value, work: Gpr, dreg: Gpr, spilled: bool) {
        if spilled {
            self.spill_store(dest, work);
        } else if work != dreg {
            let w = self.target().word();
            self.mov(w, &Operand::Reg(work, w), &Operand::Reg(dreg, w));
        }
    }
}
