use proptest::prelude::*;

use monoc::bytecode::{find_branch_targets, Assembler, Instruction, Instructions, Opcode};

#[derive(Debug, Clone)]
enum Step {
    Plain(Opcode),
    Arg(Opcode, u32),
    /// Jump to the instruction at this step index (or the trailing return).
    Jump(Opcode, usize),
}

fn plain() -> impl Strategy<Value = Opcode> {
    prop::sample::select(vec![Opcode::PopTop, Opcode::BinaryAdd, Opcode::DupTop, Opcode::Nop])
}

fn with_arg() -> impl Strategy<Value = Opcode> {
    prop::sample::select(vec![Opcode::LoadConst, Opcode::LoadFast, Opcode::StoreFast, Opcode::LoadGlobal])
}

/// Straight-line bodies mixing small and wide immediates with absolute and
/// forward-relative jumps.
fn program() -> impl Strategy<Value = Vec<Step>> {
    (1usize..40).prop_flat_map(|len| {
        let step = prop_oneof![
            plain().prop_map(Step::Plain),
            (with_arg(), prop_oneof![0u32..300, 0x1_0000u32..0x20_0000]).prop_map(|(op, arg)| Step::Arg(op, arg)),
            (0..=len).prop_map(|t| Step::Jump(Opcode::JumpAbsolute, t)),
            (0..=len).prop_map(|t| Step::Jump(Opcode::JumpForward, t)),
        ];
        prop::collection::vec(step, len)
    })
}

fn assemble(steps: &[Step]) -> Vec<u8> {
    let mut asm = Assembler::new("f", &[]);
    let labels: Vec<_> = (0..=steps.len()).map(|_| asm.new_label()).collect();
    for (i, step) in steps.iter().enumerate() {
        asm.bind(labels[i]);
        match *step {
            Step::Plain(op) => {
                asm.emit(op);
            }
            Step::Arg(op, arg) => {
                asm.emit_arg(op, arg);
            }
            // Relative jumps only reach forward; fall back to absolute otherwise.
            Step::Jump(Opcode::JumpForward, t) if t > i => {
                asm.jump(Opcode::JumpForward, labels[t]);
            }
            Step::Jump(_, t) => {
                asm.jump(Opcode::JumpAbsolute, labels[t]);
            }
        }
    }
    asm.bind(labels[steps.len()]);
    asm.emit(Opcode::ReturnValue);
    asm.finish().unwrap().code
}

fn decode_all(code: &[u8]) -> Vec<Instruction> {
    Instructions::new(code).collect::<Result<Vec<_>, _>>().unwrap()
}

proptest! {
    #[test]
    fn prop_instructions_tile_the_body(steps in program()) {
        let code = assemble(&steps);
        let decoded = decode_all(&code);
        prop_assert_eq!(decoded.len(), steps.len() + 1);
        let mut offset = 0;
        for ins in &decoded {
            prop_assert_eq!(ins.offset, offset);
            offset = ins.next;
        }
        prop_assert_eq!(offset as usize, code.len());
    }

    #[test]
    fn prop_immediates_survive_encoding(steps in program()) {
        let code = assemble(&steps);
        let decoded = decode_all(&code);
        for (step, ins) in steps.iter().zip(&decoded) {
            match *step {
                Step::Plain(op) => prop_assert_eq!(ins.opcode, op),
                Step::Arg(op, arg) => {
                    prop_assert_eq!(ins.opcode, op);
                    prop_assert_eq!(ins.arg, arg);
                    prop_assert_eq!(ins.next - ins.offset, if arg > 0xffff { 6 } else { 3 });
                }
                Step::Jump(..) => prop_assert!(ins.jump_target().is_some()),
            }
        }
    }

    #[test]
    fn prop_jumps_land_on_their_labels(steps in program()) {
        let code = assemble(&steps);
        let decoded = decode_all(&code);
        for (step, ins) in steps.iter().zip(&decoded) {
            if let Step::Jump(_, t) = *step {
                prop_assert_eq!(ins.jump_target(), Some(decoded[t].offset));
            }
        }
        let starts: Vec<u32> = decoded.iter().map(|i| i.offset).collect();
        for target in find_branch_targets(&code).unwrap() {
            prop_assert!(starts.contains(&target), "target {} is not an instruction start", target);
        }
    }
}
