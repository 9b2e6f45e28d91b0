//! Constant, address, parameter, bit-field, and string-address emitters.

use crate::back::asm::{Gpr, Syntax, SCRATCH0};
use crate::back::codegen::FuncEmit;
use crate::back::operand::{stack_operand, type_width, Mem, Operand};
use crate::error::Result;
use crate::middle::ir::Inst;

/// All-ones mask of `width` bits.
pub fn bf_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Complement mask clearing a field of `mask` bits at `shift`.
pub fn bf_clear(mask: u64, shift: u32) -> u64 {
    !(mask << shift)
}

impl<'a> FuncEmit<'a> {
    /// Immediate move into the destination, spilling through scratch 0.
    pub(super) fn emit_const(&mut self, inst: &Inst) -> Result<()> {
        let w = self.target().word();
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.mov_imm(w, inst.imm, reg);
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    /// Address of a name: `lea` for frame-relative `stack:` references, an
    /// immediate symbol move otherwise.
    pub(super) fn emit_addr(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        let w = self.target().word();
        let (reg, spilled) = self.dest_reg(inst.dest);
        match stack_operand(name) {
            m @ Mem::Frame(_) => self.lea(&m, reg),
            _ => self.mov(w, &Operand::SymImm(name), &Operand::Reg(reg, w)),
        }
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    /// Parameters sit at `bp + 8 + index * word_size`.
    pub(super) fn emit_load_param(&mut self, inst: &Inst) -> Result<()> {
        let src = self.param_mem(inst.imm);
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.load_mem(inst.ty, src, reg);
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    pub(super) fn emit_store_param(&mut self, inst: &Inst) -> Result<()> {
        let dst = self.param_mem(inst.imm);
        let w = type_width(inst.ty, self.target());
        let reg = self.value_reg(inst.src1, SCRATCH0);
        self.mov(w, &Operand::Reg(reg, w), &Operand::Mem(dst));
        Ok(())
    }

    /// `BfLoad name -> dest`: whole-word load, shift down, mask.
    pub(super) fn emit_bf_load(&mut self, inst: &Inst) -> Result<()> {
        let src = stack_operand(self.sym_of(inst)?);
        let (shift, width) = (inst.bf_shift(), inst.bf_width());
        let w = self.target().word();
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.mov(w, &Operand::Mem(src), &Operand::Reg(reg, w));
        if shift != 0 {
            self.shift_imm("shr", w, shift, reg);
        }
        self.and_mask(w, bf_mask(width), reg);
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    /// `BfStore src1 -> name`: clear the field in the destination word,
    /// merge the masked and shifted source, write the word back. The C
    /// position serves as the merge temporary and is preserved around it.
    pub(super) fn emit_bf_store(&mut self, inst: &Inst) -> Result<()> {
        let dst = stack_operand(self.sym_of(inst)?);
        let (shift, width) = (inst.bf_shift(), inst.bf_width());
        let mask = bf_mask(width);
        let w = self.target().word();

        self.mov(w, &Operand::Mem(dst.clone()), &Operand::Reg(SCRATCH0, w));
        self.and_mask(w, bf_clear(mask, shift), SCRATCH0);

        self.push_reg(Gpr::C);
        self.value_into(inst.src1, Gpr::C);
        self.and_mask(w, mask, Gpr::C);
        if shift != 0 {
            self.shift_imm("shl", w, shift, Gpr::C);
        }
        self.op2("or", w, &Operand::Reg(Gpr::C, w), &Operand::Reg(SCRATCH0, w));
        self.pop_reg(Gpr::C);

        self.mov(w, &Operand::Reg(SCRATCH0, w), &Operand::Mem(dst));
        Ok(())
    }

    /// String-literal address into the destination.
    pub(super) fn emit_glob_string(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        let w = self.target().word();
        let (reg, spilled) = self.dest_reg(inst.dest);
        self.mov(w, &Operand::SymImm(name), &Operand::Reg(reg, w));
        if spilled {
            self.spill_store(inst.dest, reg);
        }
        Ok(())
    }

    fn param_mem(&self, index: i64) -> Mem {
        let word = self.target().word_size() as i32;
        Mem::Frame(8 + index as i32 * word)
    }

    fn lea(&mut self, m: &Mem, reg: Gpr) {
        let t = self.target();
        let w = t.word();
        self.per_syntax(
            format!("lea{w} {}, %{}", m.render(Syntax::Att, t, None), reg.name(w)),
            format!("lea {}, {}", reg.name(w), m.render(Syntax::Intel, t, None)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[test]
    fn masks() {
        assert_eq!(bf_mask(5), 31);
        assert_eq!(bf_mask(1), 1);
        assert_eq!(bf_mask(64), u64::MAX);
        assert_eq!(bf_clear(bf_mask(5), 3), !(31u64 << 3));
    }

    /// Storing then loading a field yields the masked value and preserves
    /// every bit outside the field.
    #[quickcheck]
    fn bitfield_round_trip(word: u64, value: u64, shift: u8, width: u8) -> TestResult {
        let shift = (shift % 64) as u32;
        let width = (width % 64 + 1) as u32;
        if shift + width > 64 {
            return TestResult::discard();
        }
        let mask = bf_mask(width);
        let clear = bf_clear(mask, shift);
        let stored = (word & clear) | ((value & mask) << shift);
        let loaded = (stored >> shift) & mask;
        TestResult::from_bool(loaded == value & mask && stored & clear == word & clear)
    }
}
