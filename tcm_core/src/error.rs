pub mod error {
    use thiserror::Error;

    use crate::instruction::instruction::Instruction;

    /// Assembly-time failures. Every variant carries the 1-based source line
    /// the offending statement came from.
    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum AsmError {
        #[error("line {line}: syntax error: {message}")]
        Syntax { line: usize, message: String },

        #[error("line {line}: range error: {message}")]
        Range { line: usize, message: String },

        #[error("line {line}: program exceeds the {limit} addressable instruction slots")]
        AddressSpaceExceeded { line: usize, limit: usize },
    }

    impl AsmError {
        pub fn syntax(line: usize, message: impl Into<String>) -> AsmError {
            AsmError::Syntax { line, message: message.into() }
        }

        pub fn range(line: usize, message: impl Into<String>) -> AsmError {
            AsmError::Range { line, message: message.into() }
        }
    }

    /// Run-time failures. `index` is the instruction slot that was executing.
    #[derive(Debug, Error)]
    pub enum VmError {
        #[error("arithmetic overflow at instruction {index} ({instruction}): result {value} is above 255")]
        ArithmeticOverflow { index: usize, instruction: Instruction, value: i64 },

        #[error("arithmetic underflow at instruction {index} ({instruction}): result {value} is below 0")]
        ArithmeticUnderflow { index: usize, instruction: Instruction, value: i64 },

        // the exact power does not fit any integer type.
        #[error("arithmetic overflow at instruction {index} ({instruction}): {base}^{exponent} is above 255")]
        PowerOverflow { index: usize, instruction: Instruction, base: u8, exponent: u8 },

        #[error("range error at instruction {index} ({instruction}): division by zero")]
        DivisionByZero { index: usize, instruction: Instruction },

        #[error("invalid storage reference {code} at instruction {index}")]
        InvalidStorageReference { index: usize, code: u8 },

        #[error("stack empty at instruction {index}")]
        EmptyStack { index: usize },

        #[error("call stack empty at instruction {index}: RETURN without matching CALL")]
        ReturnWithoutCall { index: usize },

        #[error("address {address} at instruction {index} is outside the {limit} addressable instruction slots")]
        AddressSpaceExceeded { index: usize, address: usize, limit: usize },

        #[error("invalid input: {0}")]
        InvalidInput(String),

        #[error("instruction {opcode} not implemented (instruction {index})")]
        NotImplemented { index: usize, opcode: u8 },

        #[error("console error: {0}")]
        Io(#[from] std::io::Error),
    }
}
