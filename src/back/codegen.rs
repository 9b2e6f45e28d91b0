//! The emission driver.
//!
//! [Codegen] owns the assembly buffer for a translation unit; [FuncEmit]
//! walks one function's IR, dispatching each instruction to its emitter
//! with an exhaustive match on the opcode. The memory, data, argument, and
//! arithmetic emitters live in the sibling modules and hang further
//! methods off [FuncEmit]; this module keeps the shared low-level helpers
//! every emitter formats lines through, so the AT&T/Intel differences stay
//! in one place.

use tracing::debug;

use crate::back::args::ArgState;
use crate::back::asm::{Asm, Gpr, Syntax, Target, Width, SCRATCH0, SCRATCH1};
use crate::back::operand::{
    checked_sym, ext_mnemonic, ext_mnemonic_intel, location, spill_mem, type_width, Mem, Operand,
};
use crate::back::regalloc::{allocate, Allocation, Loc};
use crate::common::Id;
use crate::error::{Error, Result};
use crate::middle::ir::{Function, Inst, Module, Opcode, Type, Value};

/// Translation-unit level code generator.
pub struct Codegen {
    pub syntax: Syntax,
    pub target: Target,
    pub(super) asm: Asm,
    next_label: u32,
}

impl Codegen {
    pub fn new(syntax: Syntax, target: Target) -> Codegen {
        let mut asm = Asm::new();
        asm.raw(".text");
        Codegen { syntax, target, asm, next_label: 0 }
    }

    /// Allocate registers for every function and emit the whole module.
    pub fn emit_module(&mut self, module: &mut Module) -> Result<()> {
        for f in &mut module.funcs {
            let alloc = allocate(f, self.target);
            self.emit_function(f, &alloc)?;
        }
        Ok(())
    }

    /// Emit one function against a completed allocation result.
    pub fn emit_function(&mut self, f: &Function, alloc: &Allocation) -> Result<()> {
        debug!(name = %f.name, insts = f.body.len(), "emitting function");
        let mut e = FuncEmit { cg: self, alloc, args: ArgState::default(), returned: false };
        for inst in &f.body {
            e.emit(inst)?;
        }
        Ok(())
    }

    /// The finished assembly text.
    pub fn finish(self) -> String {
        self.asm.into_text()
    }

    /// Next translation-unit-unique local label.
    pub(super) fn fresh_label(&mut self) -> String {
        let n = self.next_label;
        self.next_label += 1;
        format!(".L{n}")
    }
}

/// Per-function emission state.
pub struct FuncEmit<'a> {
    pub(super) cg: &'a mut Codegen,
    pub(super) alloc: &'a Allocation,
    pub(super) args: ArgState,
    returned: bool,
}

impl<'a> FuncEmit<'a> {
    /// Dispatch one instruction. Data-section opcodes are no-ops at this
    /// layer; they belong to the global data emitter.
    pub fn emit(&mut self, inst: &Inst) -> Result<()> {
        use Opcode::*;
        let result = match inst.op {
            Const => self.emit_const(inst),
            Load => self.emit_load(inst),
            Store => self.emit_store(inst),
            LoadParam => self.emit_load_param(inst),
            StoreParam => self.emit_store_param(inst),
            Addr => self.emit_addr(inst),
            LoadPtr => self.emit_load_ptr(inst),
            StorePtr => self.emit_store_ptr(inst),
            LoadIdx => self.emit_load_idx(inst),
            StoreIdx => self.emit_store_idx(inst),
            BfLoad => self.emit_bf_load(inst),
            BfStore => self.emit_bf_store(inst),
            Arg => self.emit_arg(inst),
            GlobString | GlobWString => self.emit_glob_string(inst),
            Add | Sub | Mul | And | Or | Xor => self.emit_binop(inst),
            Div | Mod => self.emit_divmod(inst),
            Shl | Shr => self.emit_shift(inst),
            FAdd | FSub | FMul | FDiv => self.emit_float_binop(inst),
            LfAdd | LfSub | LfMul | LfDiv => self.emit_ldouble_binop(inst),
            PtrAdd => self.emit_ptr_add(inst),
            PtrDiff => self.emit_ptr_diff(inst),
            CmpEq | CmpNe | CmpLt | CmpLe | CmpGt | CmpGe => self.emit_compare(inst),
            LogAnd | LogOr => self.emit_logical(inst),
            Label => self.emit_label(inst),
            Br => self.emit_br(inst),
            BCond => self.emit_bcond(inst),
            Call => self.emit_call(inst),
            Ret => self.emit_ret(inst),
            FuncBegin => self.emit_func_begin(inst),
            FuncEnd => self.emit_func_end(inst),
            GlobVar | GlobArray | GlobStruct | GlobUnion | GlobAddr => Ok(()),
        };
        self.returned = inst.op == Ret;
        result
    }

    pub(super) fn syntax(&self) -> Syntax {
        self.cg.syntax
    }

    pub(super) fn target(&self) -> Target {
        self.cg.target
    }

    pub(super) fn line(&mut self, line: String) {
        self.cg.asm.ins(line);
    }

    /// Append whichever rendering the selected syntax calls for.
    pub(super) fn per_syntax(&mut self, att: String, intel: String) {
        let line = match self.syntax() {
            Syntax::Att => att,
            Syntax::Intel => intel,
        };
        self.cg.asm.ins(line);
    }

    /// Two-operand instruction: `base<sfx> src, dst` in AT&T,
    /// `base dst, src` with size keywords in Intel.
    pub(super) fn op2(&mut self, base: &str, w: Width, src: &Operand, dst: &Operand) {
        let t = self.target();
        let line = match self.syntax() {
            Syntax::Att => format!(
                "{base}{w} {}, {}",
                src.render(Syntax::Att, t, None),
                dst.render(Syntax::Att, t, None)
            ),
            Syntax::Intel => format!(
                "{base} {}, {}",
                dst.render(Syntax::Intel, t, Some(w.keyword())),
                src.render(Syntax::Intel, t, Some(w.keyword()))
            ),
        };
        self.line(line);
    }

    /// One-operand instruction with the same suffix rules.
    pub(super) fn op1(&mut self, base: &str, w: Width, op: &Operand) {
        let t = self.target();
        let line = match self.syntax() {
            Syntax::Att => format!("{base}{w} {}", op.render(Syntax::Att, t, None)),
            Syntax::Intel => {
                format!("{base} {}", op.render(Syntax::Intel, t, Some(w.keyword())))
            }
        };
        self.line(line);
    }

    pub(super) fn mov(&mut self, w: Width, src: &Operand, dst: &Operand) {
        self.op2("mov", w, src, dst);
    }

    /// Immediate move; 64-bit literals outside the sign-extended 32-bit
    /// range need `movabs`.
    pub(super) fn mov_imm(&mut self, w: Width, imm: i64, reg: Gpr) {
        if w == Width::Quad && i32::try_from(imm).is_err() {
            self.per_syntax(
                format!("movabsq ${imm}, %{}", reg.name(w)),
                format!("movabs {}, {imm}", reg.name(w)),
            );
        } else {
            self.mov(w, &Operand::Imm(imm), &Operand::Reg(reg, w));
        }
    }

    /// `and` with a mask immediate, routing masks that do not fit the
    /// sign-extended 32-bit field through a scratch register.
    pub(super) fn and_mask(&mut self, w: Width, mask: u64, reg: Gpr) {
        let m = mask as i64;
        if w != Width::Quad || i32::try_from(m).is_ok() {
            self.op2("and", w, &Operand::Imm(m), &Operand::Reg(reg, w));
        } else {
            let holder = if reg == SCRATCH1 { SCRATCH0 } else { SCRATCH1 };
            self.mov_imm(w, m, holder);
            self.op2("and", w, &Operand::Reg(holder, w), &Operand::Reg(reg, w));
        }
    }

    pub(super) fn imul_imm(&mut self, w: Width, imm: i64, reg: Gpr) {
        self.op2("imul", w, &Operand::Imm(imm), &Operand::Reg(reg, w));
    }

    pub(super) fn shift_imm(&mut self, base: &str, w: Width, count: u32, reg: Gpr) {
        self.op2(base, w, &Operand::Imm(count as i64), &Operand::Reg(reg, w));
    }

    pub(super) fn push_reg(&mut self, r: Gpr) {
        let w = self.target().word();
        self.op1("push", w, &Operand::Reg(r, w));
    }

    pub(super) fn pop_reg(&mut self, r: Gpr) {
        let w = self.target().word();
        self.op1("pop", w, &Operand::Reg(r, w));
    }

    /// Adjust the stack pointer: `base` is `add` or `sub`.
    pub(super) fn sp_adjust(&mut self, base: &str, bytes: i64) {
        let t = self.target();
        let w = t.word();
        self.per_syntax(
            format!("{base}{w} ${bytes}, %{}", t.sp()),
            format!("{base} {}, {bytes}", t.sp()),
        );
    }

    /// Ten-byte x87 load.
    pub(super) fn fldt(&mut self, m: &Mem) {
        let t = self.target();
        self.per_syntax(
            format!("fldt {}", m.render(Syntax::Att, t, None)),
            format!("fld {}", m.render(Syntax::Intel, t, Some("tword ptr"))),
        );
    }

    /// Ten-byte x87 store-and-pop.
    pub(super) fn fstpt(&mut self, m: &Mem) {
        let t = self.target();
        self.per_syntax(
            format!("fstpt {}", m.render(Syntax::Att, t, None)),
            format!("fstp {}", m.render(Syntax::Intel, t, Some("tword ptr"))),
        );
    }

    /// `set<cc>` into the scratch byte register.
    pub(super) fn setcc(&mut self, cc: &str) {
        self.per_syntax(format!("set{cc} %al"), format!("set{cc} al"));
    }

    /// Zero-extend the scratch byte into a full register.
    pub(super) fn widen_al(&mut self, dst: Gpr) {
        let t = self.target();
        let full = t.word();
        let mn = if t.is64() { "movzbq" } else { "movzbl" };
        self.per_syntax(
            format!("{mn} %al, %{}", dst.name(full)),
            format!("movzx {}, al", dst.name(full)),
        );
    }

    pub(super) fn jump(&mut self, mn: &str, label: &str) {
        self.line(format!("{mn} {label}"));
    }

    /// The name carried by a memory or control opcode, length-checked.
    pub(super) fn sym_of(&self, inst: &Inst) -> Result<Id> {
        let name = inst.name.expect("ir invariant: opcode requires a name");
        checked_sym(name)
    }

    /// An XMM register not claimed by the in-flight call sequence.
    pub(super) fn take_xmm(&self) -> Result<u8> {
        if self.args.float_idx >= 8 {
            return Err(Error::NoXmmScratch);
        }
        Ok(self.args.float_idx as u8)
    }

    /// Destination register for a computed value: its own register, or
    /// scratch 0 with a spill store to follow.
    pub(super) fn dest_reg(&self, v: Value) -> (Gpr, bool) {
        match self.alloc.loc(v) {
            Loc::Reg(r) => (r, false),
            Loc::Spill(_) => (SCRATCH0, true),
        }
    }

    /// Frame form of a memory-resident value's slot. Wide values reach
    /// here unconditionally: the location-map contract keeps them spilled,
    /// and a register placement is rejected rather than narrowed.
    pub(super) fn slot_mem(&self, v: Value) -> Mem {
        match self.alloc.loc(v) {
            Loc::Spill(slot) => spill_mem(slot, self.target()),
            Loc::Reg(_) => {
                unimplemented!("internal error: {v} must live in a spill slot, not a register")
            }
        }
    }

    /// Widened store of a scratch-held result into its spill slot.
    pub(super) fn spill_store(&mut self, v: Value, from: Gpr) {
        let w = self.target().word();
        let slot = self.slot_mem(v);
        self.mov(w, &Operand::Reg(from, w), &Operand::Mem(slot));
    }

    /// Bring a value into a specific register with a widened move;
    /// no-op when it already lives there.
    pub(super) fn value_into(&mut self, v: Value, reg: Gpr) {
        let w = self.target().word();
        match self.alloc.loc(v) {
            Loc::Reg(r) if r == reg => {}
            Loc::Reg(r) => self.mov(w, &Operand::Reg(r, w), &Operand::Reg(reg, w)),
            Loc::Spill(slot) => {
                let m = spill_mem(slot, self.target());
                self.mov(w, &Operand::Mem(m), &Operand::Reg(reg, w));
            }
        }
    }

    /// Bring a value into a register, routing spills through `scratch`.
    pub(super) fn value_reg(&mut self, v: Value, scratch: Gpr) -> Gpr {
        match self.alloc.loc(v) {
            Loc::Reg(r) => r,
            Loc::Spill(_) => {
                self.value_into(v, scratch);
                scratch
            }
        }
    }

    /// The value as an instruction operand at width `w`: its register or
    /// its spill slot.
    pub(super) fn operand_of(&self, v: Value, w: Width) -> Operand {
        location(self.alloc, v, w, self.target())
            .expect("ir invariant: operand has no location")
    }

    /// Whether the value currently sits in `reg`.
    pub(super) fn in_reg(&self, v: Value, reg: Gpr) -> bool {
        v.is_some() && self.alloc.loc(v) == Loc::Reg(reg)
    }

    /// Typed load of a memory operand into `reg`, sign/zero extending
    /// sub-word sizes.
    pub(super) fn load_mem(&mut self, ty: Type, src: Mem, reg: Gpr) {
        let t = self.target();
        match ext_mnemonic(ty, t) {
            Some(ext) => {
                let full = t.word();
                match self.syntax() {
                    Syntax::Att => {
                        let line = format!(
                            "{ext} {}, %{}",
                            src.render(Syntax::Att, t, None),
                            reg.name(full)
                        );
                        self.line(line);
                    }
                    Syntax::Intel => {
                        let mn = ext_mnemonic_intel(ty);
                        let w = type_width(ty, t);
                        let line = format!(
                            "{mn} {}, {}",
                            reg.name(full),
                            src.render(Syntax::Intel, t, Some(w.keyword()))
                        );
                        self.line(line);
                    }
                }
            }
            None => {
                let w = type_width(ty, t);
                self.mov(w, &Operand::Mem(src), &Operand::Reg(reg, w));
            }
        }
    }

    fn emit_label(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        self.cg.asm.label(&name);
        Ok(())
    }

    fn emit_br(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        self.jump("jmp", &name);
        Ok(())
    }

    /// Branch-if-false: the guard being zero takes the branch.
    fn emit_bcond(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        let w = self.target().word();
        let guard = self.operand_of(inst.src1, w);
        self.op2("cmp", w, &Operand::Imm(0), &guard);
        self.jump("je", &name);
        Ok(())
    }

    fn emit_call(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        self.jump("call", &name);
        if self.args.stack_bytes > 0 {
            self.sp_adjust("add", self.args.stack_bytes);
        }
        if inst.dest.is_some() {
            let w = self.target().word();
            match self.alloc.loc(inst.dest) {
                Loc::Reg(Gpr::A) => {}
                Loc::Reg(r) => self.mov(w, &Operand::Reg(Gpr::A, w), &Operand::Reg(r, w)),
                Loc::Spill(_) => self.spill_store(inst.dest, Gpr::A),
            }
        }
        self.args.reset();
        Ok(())
    }

    fn emit_ret(&mut self, inst: &Inst) -> Result<()> {
        if inst.src1.is_some() {
            self.value_into(inst.src1, Gpr::A);
        }
        self.line("leave".to_string());
        self.line("ret".to_string());
        Ok(())
    }

    fn emit_func_begin(&mut self, inst: &Inst) -> Result<()> {
        let name = self.sym_of(inst)?;
        let t = self.target();
        self.cg.asm.raw(&format!(".globl {name}"));
        self.cg.asm.label(&name);
        self.per_syntax(format!("push{} %{}", t.word(), t.bp()), format!("push {}", t.bp()));
        self.per_syntax(
            format!("mov{} %{}, %{}", t.word(), t.sp(), t.bp()),
            format!("mov {}, {}", t.bp(), t.sp()),
        );
        if inst.imm > 0 {
            self.sp_adjust("sub", inst.imm);
        }
        Ok(())
    }

    fn emit_func_end(&mut self, _inst: &Inst) -> Result<()> {
        // Fall-off-the-end epilogue; skipped when an explicit return just
        // produced one.
        if !self.returned {
            self.line("leave".to_string());
            self.line("ret".to_string());
        }
        Ok(())
    }
}
