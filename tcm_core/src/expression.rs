pub mod expression {
    use crate::error::error::AsmError;
    use crate::preprocess::preprocess::AssemblyContext;
    use crate::symbols::symbols::SymbolTable;

    /// Operator levels, lowest precedence first. An expression is split at the
    /// last operator of the lowest level it contains, which makes every level
    /// left-associative.
    const LEVELS: [&[char]; 5] = [&['|'], &['^'], &['&'], &['+', '-'], &['*', '/', '%']];

    pub fn contains_operator(token: &str) -> bool {
        token.chars().any(|c| LEVELS.iter().any(|level| level.contains(&c)))
    }

    /// Parse a numeric literal: decimal, `0x` hex or `0b` with exactly eight bits.
    ///
    /// `Ok(None)` means the token does not look like a number at all.
    pub fn parse_number(token: &str, line: usize) -> Result<Option<u128>, AsmError> {
        if !token.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(None);
        }

        let lower = token.to_ascii_lowercase();
        if let Some(bits) = lower.strip_prefix("0b") {
            if bits.len() != 8 || !bits.chars().all(|c| c == '0' || c == '1') {
                return Err(AsmError::syntax(
                    line,
                    format!("binary literal '{token}' must have exactly 8 bits"),
                ));
            }
            return u128::from_str_radix(bits, 2)
                .map(Some)
                .map_err(|_| AsmError::syntax(line, format!("invalid binary literal '{token}'")));
        }

        if let Some(hex) = lower.strip_prefix("0x") {
            if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(AsmError::syntax(line, format!("invalid hex literal '{token}'")));
            }
            return u128::from_str_radix(hex, 16)
                .map(Some)
                .map_err(|_| AsmError::range(line, format!("literal '{token}' is too large")));
        }

        if !token.chars().all(|c| c.is_ascii_digit()) {
            return Err(AsmError::syntax(line, format!("invalid number '{token}'")));
        }
        token
            .parse::<u128>()
            .map(Some)
            .map_err(|_| AsmError::range(line, format!("literal '{token}' is too large")))
    }

    // value modulo 256 of a decimal or hex literal that parse_number accepted
    // as well-formed but too large.
    fn wrap_literal(token: &str) -> u8 {
        let lower = token.to_ascii_lowercase();
        let (digits, radix) = match lower.strip_prefix("0x") {
            Some(hex) => (hex, 16),
            None => (lower.as_str(), 10),
        };
        digits
            .chars()
            .filter_map(|c| c.to_digit(radix))
            .fold(0u32, |acc, digit| (acc * radix + digit) % 256) as u8
    }

    /// Apply the overflow policy to an intermediate or final value.
    pub fn fit_byte(value: i128, overflow: bool, line: usize) -> Result<u8, AsmError> {
        if overflow {
            return Ok(value.rem_euclid(256) as u8);
        }
        u8::try_from(value)
            .map_err(|_| AsmError::range(line, format!("value {value} out of range (0-255)")))
    }

    /// Resolves operand tokens to bytes against the symbol table and the
    /// macro/label/subroutine tables collected during preprocessing.
    pub struct Evaluator<'a> {
        symbols: &'a SymbolTable,
        context: &'a AssemblyContext,
    }

    impl<'a> Evaluator<'a> {
        pub fn new(symbols: &'a SymbolTable, context: &'a AssemblyContext) -> Evaluator<'a> {
            Evaluator { symbols, context }
        }

        pub fn evaluate(&self, token: &str, line: usize, overflow: bool) -> Result<u8, AsmError> {
            self.resolve(token, line, overflow, true)
        }

        fn resolve(&self, token: &str, line: usize, overflow: bool, expand_macros: bool) -> Result<u8, AsmError> {
            if token.is_empty() {
                return Err(AsmError::syntax(line, "missing operand"));
            }

            if contains_operator(token) {
                return self.resolve_expression(token, line, overflow, expand_macros);
            }

            let parsed = match parse_number(token, line) {
                Err(AsmError::Range { .. }) if overflow => return Ok(wrap_literal(token)),
                other => other?,
            };
            if let Some(value) = parsed {
                if overflow {
                    return Ok((value % 256) as u8);
                }
                return u8::try_from(value)
                    .map_err(|_| AsmError::range(line, format!("value {value} out of range (0-255)")));
            }

            if let Some(replacement) = self.context.macros.get(token) {
                if !expand_macros {
                    return Err(AsmError::syntax(
                        line,
                        format!("macro '{token}' expands to another macro"),
                    ));
                }
                let [single] = replacement.as_slice() else {
                    return Err(AsmError::syntax(
                        line,
                        format!("macro '{token}' does not expand to a single value"),
                    ));
                };
                // a storage name here would be encoded as an immediate.
                if self.symbols.is_storage_name(&single.to_ascii_uppercase()) {
                    return Err(AsmError::syntax(
                        line,
                        format!("macro '{token}' names storage '{single}' and is not substituted here"),
                    ));
                }
                return self.resolve(single, line, overflow, false);
            }

            if let Some(addr) = self.context.labels.get(token) {
                return Ok(*addr);
            }

            if let Some(addr) = self.context.subroutines.get(token) {
                return Ok(*addr);
            }

            if let Some(code) = self.symbols.get(&token.to_ascii_uppercase()) {
                return Ok(code);
            }

            Err(AsmError::syntax(line, format!("unknown token '{token}'")))
        }

        fn resolve_expression(&self, expr: &str, line: usize, overflow: bool, expand_macros: bool) -> Result<u8, AsmError> {
            let Some((idx, op)) = LEVELS
                .iter()
                .find_map(|level| expr.char_indices().rev().find(|(_, c)| level.contains(c)))
            else {
                return self.resolve(expr, line, overflow, expand_macros);
            };

            let left = &expr[..idx];
            let right = &expr[idx + op.len_utf8()..];
            if left.is_empty() || right.is_empty() {
                return Err(AsmError::syntax(
                    line,
                    format!("operator '{op}' is missing an operand in '{expr}'"),
                ));
            }

            let lhs = self.resolve(left, line, overflow, expand_macros)? as i128;
            let rhs = self.resolve(right, line, overflow, expand_macros)? as i128;

            let result = match op {
                '|' => lhs | rhs,
                '^' => lhs ^ rhs,
                '&' => lhs & rhs,
                '+' => lhs + rhs,
                '-' => lhs - rhs,
                '*' => lhs * rhs,
                '/' | '%' if rhs == 0 => {
                    return Err(AsmError::range(line, format!("division by zero in '{expr}'")));
                }
                '/' => lhs / rhs,
                _ => lhs % rhs,
            };

            fit_byte(result, overflow, line)
        }
    }
}
