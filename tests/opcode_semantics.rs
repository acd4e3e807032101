use tcm_core::device::device::HeadlessConsole;
use tcm_core::engine::engine::{AluFault, Engine, alu, format_output};
use tcm_core::error::error::VmError;
use tcm_core::instruction::instruction::{Instruction, Program, Settings};
use tcm_core::outcome::outcome::{PendingConditional, StepOutcome};
use tcm_core::symbols::symbols::{
    ADDRESS_REGISTER, ARG1_LITERAL, ARG2_LITERAL, SymbolTable, opcodes, storage_codes,
};

const IMM: u8 = ARG1_LITERAL | ARG2_LITERAL;
const OUTPUT: u8 = storage_codes::OUTPUT;
const COUNTER: u8 = storage_codes::COUNTER;
const STACK: u8 = storage_codes::STACK;

fn symbols() -> &'static SymbolTable {
    Box::leak(Box::new(SymbolTable::new()))
}

fn engine_for(instructions: Vec<Instruction>) -> Engine<'static, HeadlessConsole> {
    Engine::new(Program::from_instructions(instructions), symbols(), HeadlessConsole::new())
}

fn engine_with(program: Program, console: HeadlessConsole) -> Engine<'static, HeadlessConsole> {
    Engine::new(program, symbols(), console)
}

fn with_settings(instructions: Vec<Instruction>, settings: Settings) -> Program {
    let mut program = Program::from_instructions(instructions);
    program.settings.iter_mut().for_each(|s| *s = settings);
    program
}

fn imm(opcode: u8, arg1: u8, arg2: u8, destination: u8) -> Instruction {
    Instruction::new(IMM | opcode, arg1, arg2, destination)
}

fn halt() -> Instruction {
    Instruction::new(opcodes::HALT, 0, 0, 0)
}

const OVERFLOW: Settings = Settings {
    overflow: true,
    char_output: false,
    signed_mode: false,
    string_input: false,
};

#[test]
fn opcode_bits_split_into_mode_and_base() {
    let instr = Instruction::new(ARG1_LITERAL | opcodes::SUB, 1, 2, 3);
    assert_eq!(instr.base_opcode(), opcodes::SUB);
    assert!(instr.arg1_is_literal());
    assert!(!instr.arg2_is_literal());

    let halt = Instruction::from_bytes([opcodes::HALT, 0, 0, 0]);
    assert_eq!(halt.base_opcode(), opcodes::HALT);
    assert!(!halt.arg1_is_literal());
    assert_eq!(halt.to_bytes(), [250, 0, 0, 0]);
}

#[test]
fn add_immediates_into_register() {
    let mut engine = engine_for(vec![imm(opcodes::ADD, 2, 3, 0)]);
    assert_eq!(engine.step().unwrap(), StepOutcome::Executed);
    assert_eq!(engine.machine.registers[0], 5);
    assert_eq!(engine.machine.ip, 1);
    assert_eq!(engine.step().unwrap(), StepOutcome::Finished);
}

#[test]
fn register_operands_are_resolved() {
    let mut engine = engine_for(vec![Instruction::new(ARG2_LITERAL | opcodes::ADD, 1, 1, 2)]);
    engine.machine.registers[1] = 7;
    engine.step().unwrap();
    assert_eq!(engine.machine.registers[2], 8);
}

#[test]
fn add_above_255_overflows() {
    let mut engine = engine_for(vec![imm(opcodes::ADD, 200, 100, 0)]);
    match engine.step() {
        Err(VmError::ArithmeticOverflow { index, value, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(value, 300);
        }
        other => panic!("expected overflow, got {other:?}"),
    }
}

#[test]
fn sub_below_zero_underflows() {
    let mut engine = engine_for(vec![imm(opcodes::SUB, 1, 2, 0)]);
    match engine.step() {
        Err(VmError::ArithmeticUnderflow { value, .. }) => assert_eq!(value, -1),
        other => panic!("expected underflow, got {other:?}"),
    }
}

#[test]
fn overflow_setting_wraps_results() {
    let program = with_settings(
        vec![imm(opcodes::ADD, 200, 100, 0), imm(opcodes::SUB, 1, 2, 1), imm(opcodes::MUL, 16, 17, 2)],
        OVERFLOW,
    );
    let mut engine = engine_with(program, HeadlessConsole::new());
    assert_eq!(engine.run().unwrap(), StepOutcome::Finished);
    assert_eq!(engine.machine.registers[0], 44);
    assert_eq!(engine.machine.registers[1], 255);
    assert_eq!(engine.machine.registers[2], 16);
}

#[test]
fn division_by_zero_ignores_overflow_setting() {
    for opcode in [opcodes::DIV, opcodes::MOD] {
        let program = with_settings(vec![imm(opcode, 5, 0, 0)], OVERFLOW);
        let mut engine = engine_with(program, HeadlessConsole::new());
        assert!(matches!(engine.step(), Err(VmError::DivisionByZero { index: 0, .. })));
    }
}

#[test]
fn alu_shifts_and_rotates() {
    assert_eq!(alu(opcodes::SHL, 1, 3, false), Ok(8));
    assert_eq!(alu(opcodes::SHL, 0x80, 1, false), Ok(256));
    assert_eq!(alu(opcodes::SHL, 0xFF, 200, true).map(|v| v.rem_euclid(256)), Ok(0));
    assert_eq!(alu(opcodes::SHR, 0x80, 7, false), Ok(1));
    assert_eq!(alu(opcodes::SHR, 0x80, 200, false), Ok(0));
    assert_eq!(alu(opcodes::ROL, 0x81, 1, false), Ok(0x03));
    assert_eq!(alu(opcodes::ROR, 0x01, 1, false), Ok(0x80));
    assert_eq!(alu(opcodes::ROL, 0x81, 9, false), Ok(0x03));
}

#[test]
fn alu_bitwise_and_arithmetic() {
    assert_eq!(alu(opcodes::AND, 0b1100, 0b1010, false), Ok(0b1000));
    assert_eq!(alu(opcodes::OR, 0b1100, 0b1010, false), Ok(0b1110));
    assert_eq!(alu(opcodes::XOR, 0b1100, 0b1010, false), Ok(0b0110));
    assert_eq!(alu(opcodes::DIV, 17, 5, false), Ok(3));
    assert_eq!(alu(opcodes::MOD, 17, 5, false), Ok(2));
}

#[test]
fn alu_power_and_root() {
    assert_eq!(alu(opcodes::POW, 2, 7, false), Ok(128));
    assert_eq!(alu(opcodes::POW, 2, 8, false), Ok(256));
    assert_eq!(alu(opcodes::POW, 2, 8, true), Ok(0));
    assert_eq!(alu(opcodes::POW, 3, 0, false), Ok(1));
    assert_eq!(alu(opcodes::NRT, 27, 3, false), Ok(3));
    assert_eq!(alu(opcodes::NRT, 26, 3, false), Ok(2));
    assert_eq!(alu(opcodes::NRT, 255, 2, false), Ok(15));
    assert_eq!(alu(opcodes::NRT, 200, 1, false), Ok(200));
    assert_eq!(alu(opcodes::NRT, 5, 0, false), Err(AluFault::DivisionByZero));
}

#[test]
fn alu_random_stays_in_bounds() {
    for _ in 0..100 {
        let value = alu(opcodes::RND, 10, 3, false).unwrap();
        assert!((3..=10).contains(&value), "{value} out of bounds");
    }
    assert_eq!(alu(opcodes::RND, 9, 9, false), Ok(9));
}

#[test]
fn alu_relational_results() {
    assert_eq!(alu(opcodes::IF_EQL, 4, 4, false), Ok(1));
    assert_eq!(alu(opcodes::IF_NEQ, 4, 4, false), Ok(0));
    assert_eq!(alu(opcodes::IF_LES, 3, 4, false), Ok(1));
    assert_eq!(alu(opcodes::IF_LOE, 4, 4, false), Ok(1));
    assert_eq!(alu(opcodes::IF_GRT, 4, 4, false), Ok(0));
    assert_eq!(alu(opcodes::IF_GOE, 5, 4, false), Ok(1));
}

#[test]
fn unknown_opcode_is_not_implemented() {
    assert_eq!(alu(15, 1, 1, false), Err(AluFault::NotImplemented));
    let mut engine = engine_for(vec![imm(40, 1, 1, 0)]);
    assert!(matches!(engine.step(), Err(VmError::NotImplemented { opcode: 40, .. })));
}

#[test]
fn false_conditional_skips_exactly_one_instruction() {
    let mut engine = engine_for(vec![
        imm(opcodes::IF_EQL, 1, 2, 0),
        imm(opcodes::ADD, 5, 0, OUTPUT),
        imm(opcodes::ADD, 6, 0, OUTPUT),
    ]);

    assert_eq!(engine.step().unwrap(), StepOutcome::Executed);
    assert_eq!(engine.pending(), PendingConditional::PendingFalse);

    assert_eq!(engine.step().unwrap(), StepOutcome::Skipped);
    assert_eq!(engine.pending(), PendingConditional::Idle);
    assert_eq!(engine.machine.ip, 2);
    assert!(engine.device.output.is_empty());

    assert_eq!(engine.step().unwrap(), StepOutcome::Executed);
    assert_eq!(engine.device.output, "6\n");
}

#[test]
fn true_conditional_runs_next_instruction() {
    let mut engine = engine_for(vec![
        imm(opcodes::IF_EQL, 2, 2, 0),
        imm(opcodes::ADD, 5, 0, OUTPUT),
        imm(opcodes::ADD, 6, 0, OUTPUT),
    ]);
    engine.step().unwrap();
    assert_eq!(engine.pending(), PendingConditional::PendingTrue);
    engine.step().unwrap();
    assert_eq!(engine.pending(), PendingConditional::Idle);
    engine.run().unwrap();
    assert_eq!(engine.device.output, "5\n6\n");
}

#[test]
fn conditional_writes_no_destination() {
    let mut engine = engine_for(vec![imm(opcodes::IF_EQL, 2, 2, OUTPUT)]);
    engine.step().unwrap();
    assert!(engine.device.output.is_empty());
    assert_eq!(engine.machine.output, 0);
}

#[test]
fn skipped_instruction_has_no_side_effects() {
    let mut engine = engine_for(vec![
        imm(opcodes::IF_NEQ, 1, 1, 0),
        halt(),
        imm(opcodes::IF_EQL, 0, 1, 0),
        Instruction::new(ARG2_LITERAL | opcodes::ADD, STACK, 0, OUTPUT),
        imm(opcodes::ADD, 9, 0, OUTPUT),
    ]);
    assert_eq!(engine.run().unwrap(), StepOutcome::Finished);
    assert_eq!(engine.device.output, "9\n");
}

#[test]
fn halt_stops_the_run() {
    let mut engine = engine_for(vec![halt(), imm(opcodes::ADD, 1, 0, OUTPUT)]);
    assert_eq!(engine.run().unwrap(), StepOutcome::Halted);
    assert!(engine.device.output.is_empty());
    assert_eq!(engine.machine.ip, 0);
}

#[test]
fn counter_write_jumps_without_advancing() {
    let mut engine = engine_for(vec![
        imm(opcodes::ADD, 2, 0, COUNTER),
        imm(opcodes::ADD, 1, 0, OUTPUT),
        imm(opcodes::ADD, 2, 0, OUTPUT),
    ]);
    engine.step().unwrap();
    assert_eq!(engine.machine.ip, 2);
    assert!(engine.machine.call_stack.is_empty());
    engine.run().unwrap();
    assert_eq!(engine.device.output, "2\n");
}

#[test]
fn counter_read_gives_current_pointer() {
    let mut engine = engine_for(vec![
        imm(opcodes::ADD, 0, 0, 0),
        Instruction::new(ARG2_LITERAL | opcodes::ADD, COUNTER, 0, 0),
    ]);
    engine.run().unwrap();
    assert_eq!(engine.machine.registers[0], 1);
}

#[test]
fn jump_to_subroutine_pushes_return_address() {
    let mut program = Program::from_instructions(vec![
        imm(opcodes::ADD, 3, 0, COUNTER),
        imm(opcodes::ADD, 7, 0, OUTPUT),
        halt(),
        imm(opcodes::ADD, 5, 0, OUTPUT),
        Instruction::new(ARG2_LITERAL | opcodes::ADD, STACK, 0, COUNTER),
    ]);
    program.subroutine_addresses.insert(3);
    let mut engine = engine_with(program, HeadlessConsole::new());

    engine.step().unwrap();
    assert_eq!(engine.machine.call_stack, vec![1]);
    assert_eq!(engine.machine.ip, 3);

    assert_eq!(engine.run().unwrap(), StepOutcome::Halted);
    assert_eq!(engine.device.output, "5\n7\n");
    assert!(engine.machine.call_stack.is_empty());
}

#[test]
fn nested_calls_return_in_lifo_order() {
    let ret = Instruction::new(ARG2_LITERAL | opcodes::ADD, STACK, 0, COUNTER);
    let mut program = Program::from_instructions(vec![
        imm(opcodes::ADD, 4, 0, COUNTER),
        imm(opcodes::ADD, 1, 0, OUTPUT),
        halt(),
        halt(),
        imm(opcodes::ADD, 2, 0, OUTPUT),
        imm(opcodes::ADD, 7, 0, COUNTER),
        ret,
        imm(opcodes::ADD, 3, 0, OUTPUT),
        ret,
    ]);
    program.subroutine_addresses.extend([4, 7]);
    let mut engine = engine_with(program, HeadlessConsole::new());

    assert_eq!(engine.run().unwrap(), StepOutcome::Halted);
    assert_eq!(engine.device.output, "2\n3\n1\n");
    assert_eq!(engine.machine.ip, 2);
}

#[test]
fn return_with_empty_call_stack_fails() {
    let mut engine = engine_for(vec![Instruction::new(ARG2_LITERAL | opcodes::ADD, STACK, 0, COUNTER)]);
    assert!(matches!(engine.step(), Err(VmError::ReturnWithoutCall { index: 0 })));
}

#[test]
fn stack_pop_when_empty_fails() {
    let mut engine = engine_for(vec![Instruction::new(ARG2_LITERAL | opcodes::ADD, STACK, 0, 0)]);
    assert!(matches!(engine.step(), Err(VmError::EmptyStack { index: 0 })));
}

#[test]
fn stack_works_as_storage() {
    let mut engine = engine_for(vec![
        imm(opcodes::ADD, 9, 0, STACK),
        Instruction::new(ARG2_LITERAL | opcodes::ADD, STACK, 1, 0),
    ]);
    engine.run().unwrap();
    assert_eq!(engine.machine.registers[0], 10);
    assert!(engine.machine.call_stack.is_empty());
}

#[test]
fn ram_is_addressed_through_last_register() {
    let mut engine = engine_for(vec![
        imm(opcodes::ADD, 42, 0, storage_codes::RAM),
        Instruction::new(ARG2_LITERAL | opcodes::ADD, storage_codes::RAM, 0, 0),
    ]);
    engine.machine.registers[ADDRESS_REGISTER as usize] = 4;
    engine.run().unwrap();
    assert_eq!(engine.machine.ram[4], 42);
    assert_eq!(engine.machine.registers[0], 42);
}

#[test]
fn output_formatting_priority() {
    let mut settings = Settings::default();
    assert_eq!(format_output(255, &settings), "255\n");
    settings.signed_mode = true;
    assert_eq!(format_output(255, &settings), "-1\n");
    assert_eq!(format_output(127, &settings), "127\n");
    settings.char_output = true;
    assert_eq!(format_output(65, &settings), "A");
}

#[test]
fn output_latch_is_readable() {
    let mut engine = engine_for(vec![
        imm(opcodes::ADD, 4, 0, OUTPUT),
        Instruction::new(ARG2_LITERAL | opcodes::ADD, OUTPUT, 1, 0),
    ]);
    engine.run().unwrap();
    assert_eq!(engine.machine.output, 4);
    assert_eq!(engine.machine.registers[0], 5);
}

#[test]
fn numeric_console_input() {
    let read = Instruction::new(ARG2_LITERAL | opcodes::ADD, storage_codes::INPUT, 0, 0);
    let program = Program::from_instructions(vec![read]);

    let mut engine = engine_with(program.clone(), HeadlessConsole::with_input([" 42 "]));
    engine.step().unwrap();
    assert_eq!(engine.machine.registers[0], 42);

    for bad in ["300", "abc", "-1", "   "] {
        let mut engine = engine_with(program.clone(), HeadlessConsole::with_input([bad]));
        assert!(matches!(engine.step(), Err(VmError::InvalidInput(_))), "accepted '{bad}'");
    }

    let mut engine = engine_with(program, HeadlessConsole::new());
    assert!(matches!(engine.step(), Err(VmError::InvalidInput(_))));
}

#[test]
fn string_console_input_fills_input_ram() {
    let read = Instruction::new(ARG2_LITERAL | opcodes::ADD, storage_codes::INPUT, 0, 0);
    let settings = Settings { string_input: true, ..Settings::default() };
    let program = with_settings(vec![read], settings);

    let mut engine = engine_with(program, HeadlessConsole::with_input(["Hi"]));
    engine.machine.input_ram[5] = 9;
    engine.step().unwrap();

    assert_eq!(engine.machine.registers[0], 2);
    assert_eq!(&engine.machine.input_ram[..3], &[b'H', b'i', 0]);
    assert_eq!(engine.machine.input_ram[5], 0);
}

#[test]
fn string_console_input_limits() {
    let read = Instruction::new(ARG2_LITERAL | opcodes::ADD, storage_codes::INPUT, 0, 0);
    let settings = Settings { string_input: true, ..Settings::default() };
    let program = with_settings(vec![read], settings);

    let mut engine = engine_with(program.clone(), HeadlessConsole::with_input(["x".repeat(255)]));
    engine.step().unwrap();
    assert_eq!(engine.machine.registers[0], 255);
    assert_eq!(engine.machine.input_ram[255], 0);

    let mut engine = engine_with(program.clone(), HeadlessConsole::with_input(["x".repeat(256)]));
    assert!(matches!(engine.step(), Err(VmError::InvalidInput(_))));

    let mut engine = engine_with(program, HeadlessConsole::with_input(["\u{100}"]));
    assert!(matches!(engine.step(), Err(VmError::InvalidInput(_))));
}

#[test]
fn unknown_storage_codes_are_rejected() {
    let mut engine = engine_for(vec![Instruction::new(ARG2_LITERAL | opcodes::ADD, 99, 0, 0)]);
    assert!(matches!(
        engine.step(),
        Err(VmError::InvalidStorageReference { index: 0, code: 99 })
    ));

    let mut engine = engine_for(vec![imm(opcodes::ADD, 1, 0, storage_codes::INPUT)]);
    assert!(matches!(engine.step(), Err(VmError::InvalidStorageReference { .. })));
}

#[test]
fn wait_and_clear_use_the_device() {
    let mut engine = engine_for(vec![
        imm(opcodes::ADD, 1, 0, OUTPUT),
        Instruction::new(opcodes::CLEAR, 0, 0, 0),
        Instruction::new(opcodes::WAIT, 20, 0, 0),
        imm(opcodes::ADD, 2, 0, OUTPUT),
    ]);
    assert_eq!(engine.run().unwrap(), StepOutcome::Finished);

    let console = engine.into_device();
    assert_eq!(console.clears, 1);
    assert_eq!(console.waited_ms, 20);
    assert_eq!(console.output, "2\n");
}

#[test]
fn unknown_system_instruction_fails() {
    let mut engine = engine_for(vec![Instruction::new(253, 0, 0, 0)]);
    assert!(matches!(engine.step(), Err(VmError::NotImplemented { opcode: 253, .. })));
}

#[test]
fn programs_beyond_the_address_space_do_not_run() {
    let mut instructions = vec![imm(opcodes::ADD, 0, 0, 0); 299];
    instructions.push(Instruction::new(ARG2_LITERAL | opcodes::ADD, COUNTER, 0, OUTPUT));
    let mut engine = engine_for(instructions);

    match engine.run() {
        Err(VmError::AddressSpaceExceeded { index, address, limit }) => {
            assert_eq!(index, 0);
            assert_eq!(address, 299);
            assert_eq!(limit, 256);
        }
        other => panic!("expected address space error, got {other:?}"),
    }
    assert!(engine.device.output.is_empty());
}

#[test]
fn counter_read_in_last_slot() {
    let mut instructions = vec![imm(opcodes::ADD, 0, 0, 0); 255];
    instructions.push(Instruction::new(ARG2_LITERAL | opcodes::ADD, COUNTER, 0, OUTPUT));
    let mut engine = engine_for(instructions);

    assert_eq!(engine.run().unwrap(), StepOutcome::Finished);
    assert_eq!(engine.device.output, "255\n");
}

#[test]
fn pow_overflow_reports_operands() {
    assert_eq!(alu(opcodes::POW, 16, 16, false), Err(AluFault::PowerOverflow));

    let mut engine = engine_for(vec![imm(opcodes::POW, 16, 16, 0)]);
    match engine.step() {
        Err(VmError::PowerOverflow { index, base, exponent, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(base, 16);
            assert_eq!(exponent, 16);
        }
        other => panic!("expected power overflow, got {other:?}"),
    }

    let mut engine = engine_for(vec![imm(opcodes::POW, 2, 9, 0)]);
    assert!(matches!(engine.step(), Err(VmError::ArithmeticOverflow { value: 512, .. })));

    let program = with_settings(vec![imm(opcodes::POW, 16, 16, 0)], OVERFLOW);
    let mut engine = engine_with(program, HeadlessConsole::new());
    engine.step().unwrap();
    assert_eq!(engine.machine.registers[0], 0);
}
