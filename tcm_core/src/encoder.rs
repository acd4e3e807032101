pub mod encoder {
    use log::debug;

    use crate::expression::expression::contains_operator;
    use crate::preprocess::preprocess::AssemblyContext;
    use crate::symbols::symbols::{ARG1_LITERAL, ARG2_LITERAL, SymbolTable, is_system_opcode};

    /// An operand is a storage reference only when it names a register or a
    /// storage keyword outright; numbers, expressions, declared names and
    /// anything else are immediates.
    pub fn is_literal_operand(token: &str, symbols: &SymbolTable, context: &AssemblyContext) -> bool {
        if token.starts_with(|c: char| c.is_ascii_digit()) || contains_operator(token) {
            return true;
        }
        if context.is_declared(token) {
            return true;
        }
        !symbols.is_storage_name(token)
    }

    /// Tag `base_opcode` with the addressing-mode bits for its two operands.
    pub fn build_opcode(
        base_opcode: u8,
        arg1: &str,
        arg2: &str,
        symbols: &SymbolTable,
        context: &AssemblyContext,
        line: usize,
    ) -> u8 {
        if is_system_opcode(base_opcode) {
            return base_opcode;
        }

        let mut opcode = base_opcode;
        if is_literal_operand(arg1, symbols, context) {
            opcode |= ARG1_LITERAL;
        }
        if is_literal_operand(arg2, symbols, context) {
            opcode |= ARG2_LITERAL;
        }

        if opcode != base_opcode {
            debug!("line {line}: opcode {base_opcode} tagged as {opcode} ('{arg1}', '{arg2}')");
        }
        opcode
    }
}
