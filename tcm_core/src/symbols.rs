pub mod symbols {
    use std::collections::HashMap;

    /// REG0..REG29; the last register holds the RAM address pointer.
    pub const REGISTER_COUNT: usize = 30;
    pub const ADDRESS_REGISTER: u8 = (REGISTER_COUNT - 1) as u8;

    pub const MEMORY_SIZE: usize = 256;
    pub const MAX_INSTRUCTIONS: usize = 256;

    // opcode layout: bit 7 = arg1 literal, bit 6 = arg2 literal, low 6 bits = operation.
    pub const ARG1_LITERAL: u8 = 1 << 7;
    pub const ARG2_LITERAL: u8 = 1 << 6;
    pub const BASE_OPCODE_MASK: u8 = 0b0011_1111;

    pub const SYSTEM_INSTRUCTION_START: u8 = 250;

    pub mod opcodes {
        pub const ADD: u8 = 0;
        pub const SUB: u8 = 1;
        pub const AND: u8 = 2;
        pub const OR: u8 = 3;
        pub const XOR: u8 = 4;
        pub const MUL: u8 = 5;
        pub const DIV: u8 = 6;
        pub const MOD: u8 = 7;
        pub const SHL: u8 = 8;
        pub const SHR: u8 = 9;
        pub const ROL: u8 = 10;
        pub const ROR: u8 = 11;
        pub const POW: u8 = 12;
        pub const NRT: u8 = 13;
        pub const RND: u8 = 14;

        pub const IF_EQL: u8 = 16;
        pub const IF_NEQ: u8 = 17;
        pub const IF_LES: u8 = 18;
        pub const IF_LOE: u8 = 19;
        pub const IF_GRT: u8 = 20;
        pub const IF_GOE: u8 = 21;

        pub const HALT: u8 = 250;
        pub const WAIT: u8 = 251;
        pub const CLEAR: u8 = 252;
    }

    pub mod storage_codes {
        pub const COUNTER: u8 = 30;
        pub const OUTPUT: u8 = 31;
        pub const STACK: u8 = 32;
        pub const INPUT: u8 = 33;
        pub const RAM: u8 = 34;
        pub const INPUT_RAM: u8 = 35;
    }

    /// Words the statement templates and directives own. They never resolve to a
    /// value but are still off limits as label, subroutine or macro names.
    const RESERVED_WORDS: [&str; 13] = [
        "LABEL", "SUBROUTINE", "CONST", "INC", "DEC", "COPY", "CALL", "RETURN", "GOTO",
        "JMP", "PRINT", "IF", "THEN",
    ];

    /// A storage location named by an operand or destination byte.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum Storage {
        Register(u8),
        Counter,
        Output,
        Stack,
        Input,
        Ram,
        InputRam,
    }

    /// Identifier -> byte code map shared by the assembler and the engine.
    ///
    /// Built once and handed around by reference; nothing mutates it after
    /// construction.
    #[derive(Clone, Debug)]
    pub struct SymbolTable {
        codes: HashMap<String, u8>,
    }

    impl Default for SymbolTable {
        fn default() -> SymbolTable {
            SymbolTable::new()
        }
    }

    impl SymbolTable {
        pub fn new() -> SymbolTable {
            let mut codes = HashMap::new();

            for reg in 0..REGISTER_COUNT {
                codes.insert(format!("REG{reg}"), reg as u8);
            }
            codes.insert("ADDRESS".to_string(), ADDRESS_REGISTER);

            let named: [(&str, u8); 30] = [
                ("COUNTER", storage_codes::COUNTER),
                ("OUTPUT", storage_codes::OUTPUT),
                ("STACK", storage_codes::STACK),
                ("INPUT", storage_codes::INPUT),
                ("RAM", storage_codes::RAM),
                ("INPUT_RAM", storage_codes::INPUT_RAM),
                ("ADD", opcodes::ADD),
                ("SUB", opcodes::SUB),
                ("AND", opcodes::AND),
                ("OR", opcodes::OR),
                ("XOR", opcodes::XOR),
                ("MUL", opcodes::MUL),
                ("DIV", opcodes::DIV),
                ("MOD", opcodes::MOD),
                ("SHL", opcodes::SHL),
                ("SHR", opcodes::SHR),
                ("ROL", opcodes::ROL),
                ("ROR", opcodes::ROR),
                ("POW", opcodes::POW),
                ("NRT", opcodes::NRT),
                ("RND", opcodes::RND),
                ("IF_EQL", opcodes::IF_EQL),
                ("IF_NEQ", opcodes::IF_NEQ),
                ("IF_LES", opcodes::IF_LES),
                ("IF_LOE", opcodes::IF_LOE),
                ("IF_GRT", opcodes::IF_GRT),
                ("IF_GOE", opcodes::IF_GOE),
                ("HALT", opcodes::HALT),
                ("WAIT", opcodes::WAIT),
                ("CLEAR", opcodes::CLEAR),
            ];
            for (name, code) in named {
                codes.insert(name.to_string(), code);
            }

            SymbolTable { codes }
        }

        /// Exact (already upper-cased) lookup.
        pub fn get(&self, name: &str) -> Option<u8> {
            self.codes.get(name).copied()
        }

        /// True for any symbol or template/directive word, ignoring case.
        pub fn is_reserved(&self, name: &str) -> bool {
            let upper = name.to_ascii_uppercase();
            self.codes.contains_key(&upper) || RESERVED_WORDS.contains(&upper.as_str())
        }

        /// Upper-cased spelling of `token` if it is a reserved word.
        pub fn normalize<'t>(&self, token: &'t str) -> std::borrow::Cow<'t, str> {
            if self.is_reserved(token) {
                std::borrow::Cow::Owned(token.to_ascii_uppercase())
            } else {
                std::borrow::Cow::Borrowed(token)
            }
        }

        /// True only if `token` names a register or a reserved storage keyword.
        pub fn is_storage_name(&self, token: &str) -> bool {
            if token.starts_with("REG") {
                return self.codes.contains_key(token);
            }
            token == "ADDRESS" || is_storage_keyword(token)
        }

        /// Decode a storage byte into the location it names.
        pub fn storage(&self, code: u8) -> Option<Storage> {
            storage_for(code)
        }
    }

    fn is_storage_keyword(token: &str) -> bool {
        matches!(token, "COUNTER" | "OUTPUT" | "STACK" | "INPUT" | "RAM" | "INPUT_RAM")
    }

    fn storage_for(code: u8) -> Option<Storage> {
        if (code as usize) < REGISTER_COUNT {
            return Some(Storage::Register(code));
        }
        match code {
            storage_codes::COUNTER => Some(Storage::Counter),
            storage_codes::OUTPUT => Some(Storage::Output),
            storage_codes::STACK => Some(Storage::Stack),
            storage_codes::INPUT => Some(Storage::Input),
            storage_codes::RAM => Some(Storage::Ram),
            storage_codes::INPUT_RAM => Some(Storage::InputRam),
            _ => None,
        }
    }

    pub fn is_system_opcode(opcode: u8) -> bool {
        opcode >= SYSTEM_INSTRUCTION_START
    }

    pub fn is_conditional(base_opcode: u8) -> bool {
        (opcodes::IF_EQL..=opcodes::IF_GOE).contains(&base_opcode)
    }
}
