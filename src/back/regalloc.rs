//! The register-allocation contract and a linear-scan allocator.
//!
//! The contract is the location map: one integer per value id, a register
//! file position when non-negative, a spill slot number when negative
//! (frame offset `-slot * word_size`). The emitter treats the map as
//! read-only; anything that produces a well-formed map can stand in for the
//! allocator here. Well-formed means positions 0 (A) and 1 (B) hold no
//! value live across an emission, and every value wider than the target
//! word (`ldouble` and the complex types) sits in spill slots — the wide
//! store and x87 paths read those slots directly and panic on a map that
//! puts such a value in a register.

use tracing::debug;

use crate::back::asm::{Gpr, Target};
use crate::back::operand::type_size;
use crate::middle::ir::{Function, Opcode, Type, Value};

/// Where a value lives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Loc {
    Reg(Gpr),
    Spill(u32),
}

/// Completed allocation result for one function.
#[derive(Clone, Debug)]
pub struct Allocation {
    loc: Vec<i32>,
    spill_slots: u32,
}

impl Allocation {
    /// Build from a raw location map: `loc[i] >= 0` is a register file
    /// position, `loc[i] < 0` a spill slot number. `loc[0]` is unused.
    pub fn from_raw(loc: Vec<i32>) -> Allocation {
        let spill_slots = loc.iter().map(|&l| if l < 0 { -l as u32 } else { 0 }).max().unwrap_or(0);
        Allocation { loc, spill_slots }
    }

    pub fn loc(&self, v: Value) -> Loc {
        let raw = self.loc[v.index()];
        if raw >= 0 {
            Loc::Reg(Gpr::from_index(raw as usize))
        } else {
            Loc::Spill(-raw as u32)
        }
    }

    pub fn is_spilled(&self, v: Value) -> bool {
        matches!(self.loc(v), Loc::Spill(_))
    }

    pub fn spill_slots(&self) -> u32 {
        self.spill_slots
    }

    /// Total frame bytes reserved for spills.
    pub fn frame_size(&self, target: Target) -> i64 {
        (self.spill_slots * target.word_size()) as i64
    }
}

#[derive(Clone, Copy, Debug)]
struct Interval {
    value: Value,
    def: usize,
    last: usize,
    ty: Type,
}

/// Registers handed out to live values. A and B stay reserved as the
/// per-instruction scratches.
const POOL: [Gpr; 4] = [Gpr::C, Gpr::D, Gpr::Si, Gpr::Di];

/// Linear scan over one function. Patches the function's `FuncBegin.imm`
/// with the resulting frame size.
pub fn allocate(f: &mut Function, target: Target) -> Allocation {
    let n = f.max_value() as usize;
    let mut intervals: Vec<Option<Interval>> = vec![None; n + 1];
    let mut calls = Vec::new();

    for (i, inst) in f.body.iter().enumerate() {
        if inst.op == Opcode::Call {
            calls.push(i);
        }
        if inst.dest.is_some() {
            let iv = intervals[inst.dest.index()].get_or_insert(Interval {
                value: inst.dest,
                def: i,
                last: i,
                ty: inst.ty,
            });
            iv.last = iv.last.max(i);
        }
        for src in [inst.src1, inst.src2] {
            if src.is_some() {
                let iv = intervals[src.index()].get_or_insert(Interval {
                    value: src,
                    def: i,
                    last: i,
                    ty: inst.ty,
                });
                iv.last = i;
            }
        }
    }

    let mut ordered: Vec<Interval> = intervals.iter().flatten().copied().collect();
    ordered.sort_by_key(|iv| iv.def);

    let word = target.word_size();
    let mut loc = vec![0i32; n + 1];
    let mut free: Vec<Gpr> = POOL.iter().rev().copied().collect();
    let mut active: Vec<(usize, Gpr)> = Vec::new();
    let mut slots = 0u32;

    let mut spill = |loc: &mut Vec<i32>, slots: &mut u32, iv: &Interval| {
        let bytes = type_size(iv.ty, target);
        *slots += bytes.div_ceil(word);
        loc[iv.value.index()] = -(*slots as i32);
    };

    for iv in &ordered {
        // Expire intervals that ended strictly before this definition.
        active.retain(|&(last, r)| {
            if last < iv.def {
                free.push(r);
                false
            } else {
                true
            }
        });

        let wide = type_size(iv.ty, target) > word;
        let across_call = calls.iter().any(|&c| iv.def < c && c < iv.last);
        if wide || across_call {
            spill(&mut loc, &mut slots, iv);
            continue;
        }

        // Byte values cannot use SI/DI on x86: no low sub-register names.
        let byte_ok = |r: Gpr| target.is64() || type_size(iv.ty, target) > 1 || r < Gpr::Si;
        match free.iter().rposition(|&r| byte_ok(r)) {
            Some(pos) => {
                let r = free.remove(pos);
                loc[iv.value.index()] = r.index() as i32;
                active.push((iv.last, r));
            }
            None => spill(&mut loc, &mut slots, iv),
        }
    }

    let alloc = Allocation { loc, spill_slots: slots };
    for inst in f.body.iter_mut() {
        if inst.op == Opcode::FuncBegin {
            inst.imm = alloc.frame_size(target);
        }
    }
    debug!(name = %f.name, values = n, spills = slots, "register allocation");
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::id;
    use crate::middle::ir::{Inst, Type};

    fn add(d: u32, a: u32, b: u32) -> Inst {
        Inst::new(Opcode::Add).dest(Value(d)).src1(Value(a)).src2(Value(b))
    }

    fn func(body: Vec<Inst>) -> Function {
        let mut f = Function::new(id("f"));
        f.body.push(Inst::new(Opcode::FuncBegin).name(id("f")));
        f.body.extend(body);
        f.body.push(Inst::new(Opcode::FuncEnd));
        f
    }

    #[test]
    fn scratches_never_allocated() {
        let mut f = func(vec![
            Inst::new(Opcode::Const).dest(Value(1)).imm(1),
            Inst::new(Opcode::Const).dest(Value(2)).imm(2),
            add(3, 1, 2),
            add(4, 3, 1),
            add(5, 4, 2),
        ]);
        let alloc = allocate(&mut f, Target::X64);
        for v in 1..=5 {
            if let Loc::Reg(r) = alloc.loc(Value(v)) {
                assert!(r != Gpr::A && r != Gpr::B, "v{v} placed in a scratch");
            }
        }
    }

    #[test]
    fn dead_intervals_free_their_register() {
        let mut f = func(vec![
            Inst::new(Opcode::Const).dest(Value(1)).imm(1),
            Inst::new(Opcode::Store).src1(Value(1)).name(id("x")),
            Inst::new(Opcode::Const).dest(Value(2)).imm(2),
            Inst::new(Opcode::Store).src1(Value(2)).name(id("y")),
        ]);
        let alloc = allocate(&mut f, Target::X64);
        // v1 is dead before v2 is defined, so both fit the first pool slot.
        assert_eq!(alloc.loc(Value(1)), alloc.loc(Value(2)));
        assert_eq!(alloc.spill_slots(), 0);
    }

    #[test]
    fn pressure_spills() {
        // Six values all live until the final sum: only four registers.
        let mut f = func(vec![
            Inst::new(Opcode::Const).dest(Value(1)).imm(1),
            Inst::new(Opcode::Const).dest(Value(2)).imm(2),
            Inst::new(Opcode::Const).dest(Value(3)).imm(3),
            Inst::new(Opcode::Const).dest(Value(4)).imm(4),
            Inst::new(Opcode::Const).dest(Value(5)).imm(5),
            add(6, 1, 2),
            add(7, 6, 3),
            add(8, 7, 4),
            add(9, 8, 5),
        ]);
        let alloc = allocate(&mut f, Target::X64);
        let spilled = (1..=9).filter(|&v| alloc.is_spilled(Value(v))).count();
        assert!(spilled > 0);
        assert!(alloc.frame_size(Target::X64) >= 8);
    }

    #[test]
    fn live_across_call_is_spilled() {
        let mut f = func(vec![
            Inst::new(Opcode::Const).dest(Value(1)).imm(1),
            Inst::new(Opcode::Call).name(id("g")),
            Inst::new(Opcode::Store).src1(Value(1)).name(id("x")),
        ]);
        let alloc = allocate(&mut f, Target::X64);
        assert!(alloc.is_spilled(Value(1)));
    }

    #[test]
    fn wide_types_get_consecutive_slots() {
        let mut f = func(vec![
            Inst::new(Opcode::Load).dest(Value(1)).name(id("a")).ty(Type::LDoubleComplex),
            Inst::new(Opcode::Load).dest(Value(2)).name(id("b")).ty(Type::LDouble),
        ]);
        let alloc = allocate(&mut f, Target::X64);
        // 20 bytes = 3 slots, then 10 bytes = 2 slots.
        assert_eq!(alloc.loc(Value(1)), Loc::Spill(3));
        assert_eq!(alloc.loc(Value(2)), Loc::Spill(5));
        assert_eq!(alloc.frame_size(Target::X64), 40);
    }

    #[test]
    fn frame_size_patched_into_func_begin() {
        let mut f = func(vec![
            Inst::new(Opcode::Load).dest(Value(1)).name(id("a")).ty(Type::LDouble),
        ]);
        allocate(&mut f, Target::X64);
        assert_eq!(f.body[0].op, Opcode::FuncBegin);
        assert_eq!(f.body[0].imm, 16);
    }

    #[test]
    fn x86_byte_values_avoid_si_di() {
        let mut f = func(vec![
            Inst::new(Opcode::Load).dest(Value(1)).name(id("a")).ty(Type::Char),
            Inst::new(Opcode::Load).dest(Value(2)).name(id("b")).ty(Type::Char),
            Inst::new(Opcode::Load).dest(Value(3)).name(id("c")).ty(Type::Char),
            add(4, 1, 2),
            add(5, 4, 3),
            Inst::new(Opcode::Store).src1(Value(1)).name(id("x")),
            Inst::new(Opcode::Store).src1(Value(2)).name(id("x")),
            Inst::new(Opcode::Store).src1(Value(3)).name(id("x")),
        ]);
        let alloc = allocate(&mut f, Target::X86);
        for v in [1, 2, 3] {
            match alloc.loc(Value(v)) {
                Loc::Reg(r) => assert!(r < Gpr::Si, "byte value v{v} in {r:?}"),
                Loc::Spill(_) => {}
            }
        }
    }

    #[test]
    fn manual_maps_round_trip() {
        let alloc = Allocation::from_raw(vec![0, 5, -1, 2]);
        assert_eq!(alloc.loc(Value(1)), Loc::Reg(Gpr::Di));
        assert_eq!(alloc.loc(Value(2)), Loc::Spill(1));
        assert_eq!(alloc.loc(Value(3)), Loc::Reg(Gpr::C));
        assert_eq!(alloc.frame_size(Target::X64), 8);
        assert_eq!(alloc.frame_size(Target::X86), 4);
    }
}
