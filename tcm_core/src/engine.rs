pub mod engine {
    use log::{info, trace};
    use rand::Rng;

    use crate::device::device::ConsoleDevice;
    use crate::error::error::VmError;
    use crate::instruction::instruction::{Instruction, Program, Settings};
    use crate::machine::machine::Machine;
    use crate::outcome::outcome::{PendingConditional, StepOutcome};
    use crate::symbols::symbols::{
        MAX_INSTRUCTIONS, Storage, SymbolTable, is_conditional, is_system_opcode, opcodes,
        storage_codes,
    };

    /// Why the ALU refused to produce a value.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum AluFault {
        DivisionByZero,
        /// POW without wrapping whose exact result is too large to represent.
        PowerOverflow,
        NotImplemented,
    }

    /// Compute `a <op> b` as a wide signed value; range policy is applied by
    /// the caller. Only POW needs to know the policy up front, because its
    /// unwrapped result can exceed every integer type.
    pub fn alu(base_opcode: u8, a: u8, b: u8, wrap: bool) -> Result<i64, AluFault> {
        let (x, y) = (a as i64, b as i64);

        let result = match base_opcode {
            opcodes::ADD => x + y,
            opcodes::SUB => x - y,
            opcodes::AND => x & y,
            opcodes::OR => x | y,
            opcodes::XOR => x ^ y,
            opcodes::MUL => x * y,
            opcodes::DIV | opcodes::MOD | opcodes::NRT if b == 0 => {
                return Err(AluFault::DivisionByZero);
            }
            opcodes::DIV => x / y,
            opcodes::MOD => x % y,
            // anything shifted 8 or more bits left is 0 modulo 256 either way.
            opcodes::SHL => x << u32::from(b).min(8),
            opcodes::SHR => x >> u32::from(b).min(8),
            opcodes::ROL => a.rotate_left(u32::from(b) % 8) as i64,
            opcodes::ROR => a.rotate_right(u32::from(b) % 8) as i64,
            opcodes::POW if wrap => a.wrapping_pow(u32::from(b)) as i64,
            opcodes::POW => x.checked_pow(u32::from(b)).ok_or(AluFault::PowerOverflow)?,
            opcodes::NRT => nth_root(a, b) as i64,
            opcodes::RND => {
                let (lo, hi) = (a.min(b), a.max(b));
                rand::rng().random_range(lo..=hi) as i64
            }
            opcodes::IF_EQL => (a == b) as i64,
            opcodes::IF_NEQ => (a != b) as i64,
            opcodes::IF_LES => (a < b) as i64,
            opcodes::IF_LOE => (a <= b) as i64,
            opcodes::IF_GRT => (a > b) as i64,
            opcodes::IF_GOE => (a >= b) as i64,
            _ => return Err(AluFault::NotImplemented),
        };

        Ok(result)
    }

    // largest r with r^degree <= value.
    fn nth_root(value: u8, degree: u8) -> u8 {
        if degree == 1 || value <= 1 {
            return value;
        }
        let mut root: u8 = 1;
        while let Some(power) = (root as u64 + 1).checked_pow(u32::from(degree)) {
            if power > value as u64 {
                break;
            }
            root += 1;
        }
        root
    }

    /// Fetch-decode-execute loop over an assembled [`Program`].
    ///
    /// A relational opcode leaves a [`PendingConditional`] behind. When it is
    /// `PendingFalse` the next fetched instruction is consumed without any
    /// effect; `PendingTrue` just lets it run. Either way the latch returns to
    /// `Idle` once that instruction has been fetched.
    pub struct Engine<'a, D: ConsoleDevice> {
        pub machine: Machine,
        pub device: D,
        program: Program,
        symbols: &'a SymbolTable,
        pending: PendingConditional,
    }

    impl<'a, D: ConsoleDevice> Engine<'a, D> {
        pub fn new(program: Program, symbols: &'a SymbolTable, device: D) -> Engine<'a, D> {
            Engine {
                machine: Machine::new(),
                device,
                program,
                symbols,
                pending: PendingConditional::Idle,
            }
        }

        pub fn program(&self) -> &Program {
            &self.program
        }

        pub fn pending(&self) -> PendingConditional {
            self.pending
        }

        pub fn into_device(self) -> D {
            self.device
        }

        /// Run until HALT or until the pointer leaves the program.
        pub fn run(&mut self) -> Result<StepOutcome, VmError> {
            info!("running {} instructions", self.program.len());
            loop {
                match self.step()? {
                    outcome @ (StepOutcome::Halted | StepOutcome::Finished) => {
                        info!("stopped at instruction {}: {outcome:?}", self.machine.ip);
                        return Ok(outcome);
                    }
                    StepOutcome::Executed | StepOutcome::Skipped => {}
                }
            }
        }

        /// Execute the instruction under the pointer.
        pub fn step(&mut self) -> Result<StepOutcome, VmError> {
            let index = self.machine.ip;
            if self.program.len() > MAX_INSTRUCTIONS {
                return Err(VmError::AddressSpaceExceeded {
                    index,
                    address: self.program.len() - 1,
                    limit: MAX_INSTRUCTIONS,
                });
            }
            let Some(instr) = self.program.instructions.get(index).copied() else {
                return Ok(StepOutcome::Finished);
            };

            match std::mem::take(&mut self.pending) {
                PendingConditional::PendingFalse => {
                    trace!("[{index}] {instr} skipped");
                    self.advance(index);
                    return Ok(StepOutcome::Skipped);
                }
                PendingConditional::PendingTrue | PendingConditional::Idle => {}
            }

            if is_system_opcode(instr.opcode) {
                return self.execute_system(index, instr);
            }

            let settings = self.program.settings_at(index);
            let returning = instr.destination == storage_codes::COUNTER;

            let mut working = instr;
            if !instr.arg1_is_literal() {
                working.arg1 = self.read_storage(index, instr.arg1, &settings, returning)?;
            }
            if !instr.arg2_is_literal() {
                working.arg2 = self.read_storage(index, instr.arg2, &settings, returning)?;
            }

            let base = instr.base_opcode();
            let raw = alu(base, working.arg1, working.arg2, settings.overflow).map_err(|fault| match fault {
                AluFault::DivisionByZero => VmError::DivisionByZero { index, instruction: instr },
                AluFault::PowerOverflow => VmError::PowerOverflow {
                    index,
                    instruction: instr,
                    base: working.arg1,
                    exponent: working.arg2,
                },
                AluFault::NotImplemented => VmError::NotImplemented { index, opcode: base },
            })?;
            let value = self.fit_result(index, instr, raw, &settings)?;
            trace!("[{index}] {instr} -> {} {} = {value}", working.arg1, working.arg2);

            if is_conditional(base) {
                self.pending = if value != 0 {
                    PendingConditional::PendingTrue
                } else {
                    PendingConditional::PendingFalse
                };
                self.advance(index);
                return Ok(StepOutcome::Executed);
            }

            // a jump onto a registered subroutine entry is a call.
            if returning && self.program.is_subroutine_address(working.arg1) {
                let address = index + 1;
                let ret = u8::try_from(address)
                    .map_err(|_| VmError::AddressSpaceExceeded { index, address, limit: MAX_INSTRUCTIONS })?;
                self.machine.push(ret);
            }

            let jumped = self.write_storage(index, instr.destination, value, &settings)?;
            if !jumped {
                self.advance(index);
            }
            Ok(StepOutcome::Executed)
        }

        // past the representable maximum the pointer parks at usize::MAX,
        // which is always beyond the program and ends the run.
        fn advance(&mut self, index: usize) {
            self.machine.ip = index.checked_add(1).unwrap_or(usize::MAX);
        }

        fn fit_result(&self, index: usize, instruction: Instruction, value: i64, settings: &Settings) -> Result<u8, VmError> {
            if settings.overflow {
                return Ok(value.rem_euclid(256) as u8);
            }
            if value < 0 {
                return Err(VmError::ArithmeticUnderflow { index, instruction, value });
            }
            if value > u8::MAX as i64 {
                return Err(VmError::ArithmeticOverflow { index, instruction, value });
            }
            Ok(value as u8)
        }

        fn execute_system(&mut self, index: usize, instr: Instruction) -> Result<StepOutcome, VmError> {
            match instr.opcode {
                opcodes::HALT => {
                    trace!("[{index}] HALT");
                    Ok(StepOutcome::Halted)
                }
                opcodes::WAIT => {
                    trace!("[{index}] WAIT {}ms", instr.arg1);
                    self.device.wait(u64::from(instr.arg1));
                    self.advance(index);
                    Ok(StepOutcome::Executed)
                }
                opcodes::CLEAR => {
                    self.device.clear_screen()?;
                    self.advance(index);
                    Ok(StepOutcome::Executed)
                }
                opcode => Err(VmError::NotImplemented { index, opcode }),
            }
        }

        fn read_storage(&mut self, index: usize, code: u8, settings: &Settings, returning: bool) -> Result<u8, VmError> {
            let storage = self
                .symbols
                .storage(code)
                .ok_or(VmError::InvalidStorageReference { index, code })?;

            match storage {
                Storage::Register(reg) => Ok(self.machine.registers[reg as usize]),
                Storage::Output => Ok(self.machine.output),
                Storage::Stack => self.machine.pop().ok_or(if returning {
                    VmError::ReturnWithoutCall { index }
                } else {
                    VmError::EmptyStack { index }
                }),
                Storage::Ram => Ok(self.machine.ram_cell()),
                Storage::InputRam => Ok(self.machine.input_cell()),
                Storage::Input => self.read_input(settings),
                Storage::Counter => u8::try_from(index).map_err(|_| VmError::AddressSpaceExceeded {
                    index,
                    address: index,
                    limit: MAX_INSTRUCTIONS,
                }),
            }
        }

        /// Returns true when the write moved the instruction pointer.
        fn write_storage(&mut self, index: usize, code: u8, value: u8, settings: &Settings) -> Result<bool, VmError> {
            let storage = self
                .symbols
                .storage(code)
                .ok_or(VmError::InvalidStorageReference { index, code })?;

            match storage {
                Storage::Register(reg) => self.machine.registers[reg as usize] = value,
                Storage::Output => {
                    self.machine.output = value;
                    let text = format_output(value, settings);
                    self.device.write_output(&text)?;
                }
                Storage::Stack => self.machine.push(value),
                Storage::Ram => self.machine.set_ram_cell(value),
                Storage::Counter => {
                    self.machine.ip = value as usize;
                    return Ok(true);
                }
                Storage::Input | Storage::InputRam => {
                    return Err(VmError::InvalidStorageReference { index, code });
                }
            }
            Ok(false)
        }

        fn read_input(&mut self, settings: &Settings) -> Result<u8, VmError> {
            let Some(line) = self.device.read_line()? else {
                return Err(VmError::InvalidInput("no input available".to_string()));
            };
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                return Err(VmError::InvalidInput("empty input".to_string()));
            }

            if settings.string_input {
                return self.machine.store_string_input(line);
            }

            line.trim()
                .parse::<i64>()
                .ok()
                .and_then(|value| u8::try_from(value).ok())
                .ok_or_else(|| VmError::InvalidInput(format!("'{line}' is not a number between 0 and 255")))
        }
    }

    /// Text written for one OUTPUT store: character, then signed, then unsigned.
    pub fn format_output(value: u8, settings: &Settings) -> String {
        if settings.char_output {
            char::from(value).to_string()
        } else if settings.signed_mode {
            format!("{}\n", value as i8)
        } else {
            format!("{value}\n")
        }
    }
}
