pub mod instruction {
    use std::collections::BTreeSet;
    use std::fmt;

    use crate::symbols::symbols::{ARG1_LITERAL, ARG2_LITERAL, BASE_OPCODE_MASK, is_system_opcode};

    /// One 4-byte machine record: `[opcode, arg1, arg2, destination]`.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Instruction {
        pub opcode: u8,
        pub arg1: u8,
        pub arg2: u8,
        pub destination: u8,
    }

    impl Instruction {
        pub fn new(opcode: u8, arg1: u8, arg2: u8, destination: u8) -> Instruction {
            Instruction { opcode, arg1, arg2, destination }
        }

        pub fn from_bytes(bytes: [u8; 4]) -> Instruction {
            Instruction::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }

        pub fn to_bytes(&self) -> [u8; 4] {
            [self.opcode, self.arg1, self.arg2, self.destination]
        }

        // system opcodes never carry mode bits, so they are returned whole.
        pub fn base_opcode(&self) -> u8 {
            if is_system_opcode(self.opcode) {
                self.opcode
            } else {
                self.opcode & BASE_OPCODE_MASK
            }
        }

        pub fn arg1_is_literal(&self) -> bool {
            !is_system_opcode(self.opcode) && self.opcode & ARG1_LITERAL != 0
        }

        pub fn arg2_is_literal(&self) -> bool {
            !is_system_opcode(self.opcode) && self.opcode & ARG2_LITERAL != 0
        }
    }

    impl fmt::Display for Instruction {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} {} {} {}", self.opcode, self.arg1, self.arg2, self.destination)
        }
    }

    /// Pragma-controlled flags, snapshotted for every emitted instruction.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct Settings {
        /// wrap results modulo 256 instead of raising.
        pub overflow: bool,
        /// OUTPUT writes are printed as characters.
        pub char_output: bool,
        /// OUTPUT writes are printed as signed bytes.
        pub signed_mode: bool,
        /// INPUT reads a whole string into INPUT_RAM.
        pub string_input: bool,
    }

    /// Result of assembly and the only input the engine needs.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct Program {
        pub instructions: Vec<Instruction>,
        pub settings: Vec<Settings>,
        pub subroutine_addresses: BTreeSet<u8>,
        pub source_lines: Vec<usize>,
    }

    impl Program {
        /// Program with default settings for every slot and no source mapping.
        pub fn from_instructions(instructions: Vec<Instruction>) -> Program {
            let settings = vec![Settings::default(); instructions.len()];
            Program {
                instructions,
                settings,
                subroutine_addresses: BTreeSet::new(),
                source_lines: Vec::new(),
            }
        }

        pub fn len(&self) -> usize {
            self.instructions.len()
        }

        pub fn is_empty(&self) -> bool {
            self.instructions.is_empty()
        }

        pub fn settings_at(&self, index: usize) -> Settings {
            self.settings.get(index).copied().unwrap_or_default()
        }

        pub fn source_line(&self, index: usize) -> Option<usize> {
            self.source_lines.get(index).copied()
        }

        pub fn is_subroutine_address(&self, address: u8) -> bool {
            self.subroutine_addresses.contains(&address)
        }

        /// Flat binary image, four bytes per instruction.
        pub fn to_image(&self) -> Vec<u8> {
            self.instructions
                .iter()
                .flat_map(|instr| instr.to_bytes())
                .collect()
        }

        /// Human readable dump, one instruction per line.
        pub fn listing(&self) -> String {
            let mut out = String::new();
            for (idx, instr) in self.instructions.iter().enumerate() {
                let line = match self.source_line(idx) {
                    Some(line) => format!("line {line:>4}"),
                    None => String::from("         "),
                };
                let sub = if self.is_subroutine_address(idx as u8) { " <subroutine>" } else { "" };
                out.push_str(&format!(
                    "{idx:>3}  {line}  {:02X} {:02X} {:02X} {:02X}  ({instr}){sub}\n",
                    instr.opcode, instr.arg1, instr.arg2, instr.destination
                ));
            }
            out
        }
    }
}
