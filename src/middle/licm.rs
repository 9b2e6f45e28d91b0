//! Loop-invariant code motion.
//!
//! The IR builder shapes its single-block loops as
//! `label L; bcond g, exit; ...; br L` with no labels in between. Within
//! such a body, a pure instruction whose sources are not defined inside
//! the body computes the same value on every iteration; it is spliced out
//! and re-inserted immediately above the header label. After every hoist
//! the scan restarts from the header, so removing one definition can make
//! the instructions that consumed it invariant in turn.
//!
//! Loops with interior labels need dominator analysis to hoist safely and
//! are left alone.

use std::collections::BTreeSet;

use tracing::debug;

use crate::middle::ir::{Function, Inst, Module, Opcode, Value};

/// Run the pass over every function.
pub fn run(module: &mut Module) {
    for f in &mut module.funcs {
        run_function(f);
    }
}

/// Run the pass over one function, in place.
pub fn run_function(f: &mut Function) {
    let mut i = 0;
    while i < f.body.len() {
        if is_header(&f.body, i) {
            if let Some(back) = loop_end(&f.body, i) {
                if hoist_one(f, i, back) {
                    // A hoist shifted the header down one slot; rescan
                    // from the hoisted instruction to find it again.
                    continue;
                }
            }
        }
        i += 1;
    }
}

/// A loop header: a label immediately followed by the exit test.
fn is_header(body: &[Inst], i: usize) -> bool {
    body[i].op == Opcode::Label
        && body.get(i + 1).map(|inst| inst.op) == Some(Opcode::BCond)
}

/// Index of the `br` jumping back to the label at `header`, provided the
/// region in between has no other labels.
fn loop_end(body: &[Inst], header: usize) -> Option<usize> {
    let target = body[header].name;
    for (j, inst) in body.iter().enumerate().skip(header + 2) {
        match inst.op {
            Opcode::Label | Opcode::FuncEnd => return None,
            Opcode::Br => return (inst.name == target).then_some(j),
            _ => {}
        }
    }
    None
}

/// Hoist the first invariant instruction of the body, if any.
fn hoist_one(f: &mut Function, header: usize, back: usize) -> bool {
    let body = &f.body[header + 2..back];
    let defined: BTreeSet<Value> =
        body.iter().map(|inst| inst.dest).filter(|v| v.is_some()).collect();

    let invariant = |inst: &Inst| {
        inst.op.is_pure()
            && !defined.contains(&inst.src1)
            && !defined.contains(&inst.src2)
    };

    for j in header + 2..back {
        if invariant(&f.body[j]) {
            let inst = f.body.remove(j);
            debug!(func = %f.name, inst = %inst, "hoisting loop-invariant instruction");
            f.body.insert(header, inst);
            return true;
        }
    }
    false
}
