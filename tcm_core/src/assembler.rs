pub mod assembler {
    use log::{debug, log_enabled, Level};

    use crate::encoder::encoder::build_opcode;
    use crate::error::error::AsmError;
    use crate::expression::expression::Evaluator;
    use crate::instruction::instruction::{Instruction, Program, Settings};
    use crate::preprocess::preprocess::{AssemblyContext, CanonicalLine, Preprocessor};
    use crate::symbols::symbols::{BASE_OPCODE_MASK, SymbolTable, is_system_opcode};

    /// Source text -> [`Program`]: preprocess, evaluate, encode.
    pub struct Assembler<'a> {
        symbols: &'a SymbolTable,
    }

    impl<'a> Assembler<'a> {
        pub fn new(symbols: &'a SymbolTable) -> Assembler<'a> {
            Assembler { symbols }
        }

        pub fn assemble(&self, source: &str) -> Result<Program, AsmError> {
            let context = Preprocessor::new(self.symbols).process(source)?;
            self.build(&context)
        }

        /// Second stage: turn every canonical line into a 4-byte record.
        pub fn build(&self, context: &AssemblyContext) -> Result<Program, AsmError> {
            let evaluator = Evaluator::new(self.symbols, context);
            let mut instructions = Vec::with_capacity(context.lines.len());

            for (line, settings) in context.lines.iter().zip(context.settings.iter()) {
                instructions.push(self.assemble_line(&evaluator, context, line, settings)?);
            }

            let program = Program {
                instructions,
                settings: context.settings.clone(),
                subroutine_addresses: context.subroutine_addresses.clone(),
                source_lines: context.lines.iter().map(|line| line.line).collect(),
            };

            if log_enabled!(Level::Debug) {
                debug!("final program:\n{}", program.listing());
            }
            Ok(program)
        }

        fn assemble_line(
            &self,
            evaluator: &Evaluator<'_>,
            context: &AssemblyContext,
            line: &CanonicalLine,
            settings: &Settings,
        ) -> Result<Instruction, AsmError> {
            let tokens = &line.tokens;
            let base = evaluator.evaluate(&tokens[0], line.line, settings.overflow)?;

            if tokens.len() == 1 {
                if is_system_opcode(base) {
                    return Ok(Instruction::new(base, 0, 0, 0));
                }
                return Err(AsmError::syntax(
                    line.line,
                    format!("'{}' is not a zero-operand instruction", tokens[0]),
                ));
            }

            if tokens.len() != 4 {
                return Err(AsmError::syntax(
                    line.line,
                    format!(
                        "invalid instruction '{}': expected 4 tokens, found {}",
                        tokens.join(" "),
                        tokens.len()
                    ),
                ));
            }

            if !is_system_opcode(base) && base > BASE_OPCODE_MASK {
                return Err(AsmError::syntax(
                    line.line,
                    format!("'{}' ({base}) is not an operation", tokens[0]),
                ));
            }

            let opcode = build_opcode(base, &tokens[1], &tokens[2], self.symbols, context, line.line);
            let arg1 = evaluator.evaluate(&tokens[1], line.line, settings.overflow)?;
            let arg2 = evaluator.evaluate(&tokens[2], line.line, settings.overflow)?;
            let destination = evaluator.evaluate(&tokens[3], line.line, settings.overflow)?;

            Ok(Instruction::new(opcode, arg1, arg2, destination))
        }
    }

    /// Assemble `source` with a fresh symbol table borrow.
    pub fn assemble(source: &str, symbols: &SymbolTable) -> Result<Program, AsmError> {
        Assembler::new(symbols).assemble(source)
    }
}
