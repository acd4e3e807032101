pub mod machine {
    use crate::error::error::VmError;
    use crate::symbols::symbols::{ADDRESS_REGISTER, MEMORY_SIZE, REGISTER_COUNT};

    /// Registers, memories, call stack, instruction pointer and output latch.
    /// Owned by the engine for the whole run.
    #[derive(Clone, Debug)]
    pub struct Machine {
        pub registers: [u8; REGISTER_COUNT],
        pub ram: [u8; MEMORY_SIZE],
        /// filled only by INPUT under string-input mode.
        pub input_ram: [u8; MEMORY_SIZE],
        pub call_stack: Vec<u8>,
        pub ip: usize,
        pub output: u8,
    }

    impl Default for Machine {
        fn default() -> Machine {
            Machine {
                registers: [0; REGISTER_COUNT],
                ram: [0; MEMORY_SIZE],
                input_ram: [0; MEMORY_SIZE],
                call_stack: Vec::new(),
                ip: 0,
                output: 0,
            }
        }
    }

    impl Machine {
        pub fn new() -> Machine {
            Machine::default()
        }

        /// RAM and INPUT_RAM are indexed through the last register.
        pub fn address(&self) -> usize {
            self.registers[ADDRESS_REGISTER as usize] as usize
        }

        pub fn ram_cell(&self) -> u8 {
            self.ram[self.address()]
        }

        pub fn set_ram_cell(&mut self, value: u8) {
            let addr = self.address();
            self.ram[addr] = value;
        }

        pub fn input_cell(&self) -> u8 {
            self.input_ram[self.address()]
        }

        pub fn push(&mut self, value: u8) {
            self.call_stack.push(value);
        }

        pub fn pop(&mut self) -> Option<u8> {
            self.call_stack.pop()
        }

        /// Copy `text` into INPUT_RAM as a zero-terminated byte string and
        /// return its length.
        pub fn store_string_input(&mut self, text: &str) -> Result<u8, VmError> {
            let len = text.chars().count();
            if len > MEMORY_SIZE - 1 {
                return Err(VmError::InvalidInput(format!(
                    "input is {len} characters long, the limit is {}",
                    MEMORY_SIZE - 1
                )));
            }

            let mut bytes = Vec::with_capacity(len);
            for ch in text.chars() {
                let code = u8::try_from(u32::from(ch)).map_err(|_| {
                    VmError::InvalidInput(format!("character '{ch}' in '{text}' is outside 0-255"))
                })?;
                bytes.push(code);
            }

            self.input_ram = [0; MEMORY_SIZE];
            self.input_ram[..len].copy_from_slice(&bytes);
            Ok(len as u8)
        }
    }
}
