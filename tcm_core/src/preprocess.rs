pub mod preprocess {
    use std::collections::{BTreeSet, HashMap};

    use log::{debug, warn};

    use crate::error::error::AsmError;
    use crate::expression::expression::parse_number;
    use crate::instruction::instruction::Settings;
    use crate::symbols::symbols::{MAX_INSTRUCTIONS, SymbolTable};
    use crate::templates::templates;

    /// One emitted instruction in canonical token form.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct CanonicalLine {
        pub tokens: Vec<String>,
        /// 1-based line in the source file.
        pub line: usize,
    }

    /// Everything the single preprocessing pass collects. Macros, labels and
    /// subroutines share one namespace.
    #[derive(Clone, Debug, Default)]
    pub struct AssemblyContext {
        pub macros: HashMap<String, Vec<String>>,
        pub labels: HashMap<String, u8>,
        pub subroutines: HashMap<String, u8>,
        pub subroutine_addresses: BTreeSet<u8>,
        pub lines: Vec<CanonicalLine>,
        /// settings snapshot per entry of `lines`.
        pub settings: Vec<Settings>,
    }

    impl AssemblyContext {
        pub fn is_declared(&self, name: &str) -> bool {
            self.macros.contains_key(name)
                || self.labels.contains_key(name)
                || self.subroutines.contains_key(name)
        }
    }

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    enum Declaration {
        Label,
        Subroutine,
    }

    /// Drop a trailing `//` comment; quotes protect their contents.
    pub fn strip_comment(line: &str) -> &str {
        let mut in_string = false;
        let mut escaped = false;
        let mut prev_slash = false;

        for (idx, ch) in line.char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => {
                    in_string = true;
                    prev_slash = false;
                }
                '/' if prev_slash => return &line[..idx - 1],
                '/' => prev_slash = true,
                _ => prev_slash = false,
            }
        }
        line
    }

    /// Split a comment-free line on `;` and then on whitespace. A quoted run
    /// stays inside a single token.
    pub fn split_statements(line: &str, line_no: usize) -> Result<Vec<Vec<String>>, AsmError> {
        let mut statements = Vec::new();
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut in_string = false;
        let mut escaped = false;

        for ch in line.chars() {
            if in_string {
                current.push(ch);
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            match ch {
                '"' => {
                    in_string = true;
                    current.push(ch);
                }
                ';' => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    if !tokens.is_empty() {
                        statements.push(std::mem::take(&mut tokens));
                    }
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            }
        }

        if in_string {
            return Err(AsmError::syntax(line_no, "unterminated string literal"));
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        if !tokens.is_empty() {
            statements.push(tokens);
        }
        Ok(statements)
    }

    /// Walks the source once: expands macros, templates and string prints,
    /// applies pragmas, records declarations, and emits canonical lines.
    pub struct Preprocessor<'a> {
        symbols: &'a SymbolTable,
        context: AssemblyContext,
        // forward-propagating; every emitted line snapshots it.
        settings: Settings,
    }

    impl<'a> Preprocessor<'a> {
        pub fn new(symbols: &'a SymbolTable) -> Preprocessor<'a> {
            Preprocessor {
                symbols,
                context: AssemblyContext::default(),
                settings: Settings::default(),
            }
        }

        pub fn process(mut self, source: &str) -> Result<AssemblyContext, AsmError> {
            for (idx, raw_line) in source.lines().enumerate() {
                let line_no = idx + 1;
                let line = strip_comment(raw_line);
                for statement in split_statements(line, line_no)? {
                    self.process_statement(statement, line_no)?;
                }
            }

            debug!(
                "preprocessed {} instructions, {} labels, {} subroutines, {} macros",
                self.context.lines.len(),
                self.context.labels.len(),
                self.context.subroutines.len(),
                self.context.macros.len()
            );
            Ok(self.context)
        }

        fn process_statement(&mut self, tokens: Vec<String>, line: usize) -> Result<(), AsmError> {
            let Some(first) = tokens.first() else {
                return Ok(());
            };

            match first.to_ascii_lowercase().as_str() {
                "#pragma" => return self.apply_pragma(&tokens, line),
                "#define" => return self.define_macro(&tokens, line),
                "const" => return self.define_constant(&tokens, line),
                "label" => return self.declare(Declaration::Label, &tokens, line),
                "subroutine" => return self.declare(Declaration::Subroutine, &tokens, line),
                _ => {}
            }

            let tokens: Vec<String> = self
                .substitute_macros(tokens)
                .into_iter()
                .map(|token| self.symbols.normalize(&token).into_owned())
                .collect();

            if let Some(expanded) = templates::expand_string_print(&tokens, line, self.settings.char_output)? {
                for statement in expanded {
                    if statement[0] == "#pragma" {
                        self.apply_pragma(&statement, line)?;
                    } else {
                        self.emit(statement, line)?;
                    }
                }
                return Ok(());
            }

            match templates::expand(&tokens) {
                Some(expanded) => {
                    for statement in expanded {
                        self.emit(statement, line)?;
                    }
                    Ok(())
                }
                None => self.emit(tokens, line),
            }
        }

        // one pass; replacement text is never rescanned.
        fn substitute_macros(&self, tokens: Vec<String>) -> Vec<String> {
            let mut out = Vec::with_capacity(tokens.len());
            for token in tokens {
                match self.context.macros.get(&token) {
                    Some(replacement) => out.extend(replacement.iter().cloned()),
                    None => out.push(token),
                }
            }
            out
        }

        fn emit(&mut self, tokens: Vec<String>, line: usize) -> Result<(), AsmError> {
            if self.context.lines.len() >= MAX_INSTRUCTIONS {
                return Err(AsmError::AddressSpaceExceeded { line, limit: MAX_INSTRUCTIONS });
            }

            debug!("line {line}: instruction {} -> {}", self.context.lines.len(), tokens.join(" "));
            self.context.settings.push(self.settings);
            self.context.lines.push(CanonicalLine { tokens, line });
            Ok(())
        }

        fn apply_pragma(&mut self, tokens: &[String], line: usize) -> Result<(), AsmError> {
            let [_, option, value] = tokens else {
                return Err(AsmError::syntax(line, "expected #pragma <option> <true|false>"));
            };

            let enable = match value.to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(AsmError::syntax(
                        line,
                        format!("pragma value must be true or false, got '{value}'"),
                    ));
                }
            };

            match option.to_ascii_lowercase().as_str() {
                "overflow" => self.settings.overflow = enable,
                "char" => self.settings.char_output = enable,
                "signed" => self.settings.signed_mode = enable,
                "stringinput" | "string_input" => self.settings.string_input = enable,
                _ => {
                    return Err(AsmError::syntax(line, format!("unknown pragma option '{option}'")));
                }
            }

            debug!("line {line}: pragma {option} = {enable}");
            Ok(())
        }

        fn define_macro(&mut self, tokens: &[String], line: usize) -> Result<(), AsmError> {
            if tokens.len() < 3 {
                return Err(AsmError::syntax(line, "expected #define <name> <value>"));
            }
            let name = &tokens[1];
            self.check_name(name, line)?;

            debug!("line {line}: macro {name} = {}", tokens[2..].join(" "));
            self.context.macros.insert(name.clone(), tokens[2..].to_vec());
            Ok(())
        }

        fn define_constant(&mut self, tokens: &[String], line: usize) -> Result<(), AsmError> {
            let [_, name, value] = tokens else {
                return Err(AsmError::syntax(line, "expected const <name> <value>"));
            };
            self.check_name(name, line)?;

            let value = match parse_number(value, line)? {
                Some(v) if v <= u8::MAX as u128 => v as u8,
                Some(v) => {
                    return Err(AsmError::range(line, format!("constant {name} = {v} out of range (0-255)")));
                }
                None => {
                    return Err(AsmError::syntax(line, format!("constant {name} needs a numeric value, got '{value}'")));
                }
            };

            debug!("line {line}: constant {name} = {value}");
            self.context.macros.insert(name.clone(), vec![value.to_string()]);
            Ok(())
        }

        fn declare(&mut self, kind: Declaration, tokens: &[String], line: usize) -> Result<(), AsmError> {
            let [_, name] = tokens else {
                let what = match kind {
                    Declaration::Label => "label",
                    Declaration::Subroutine => "subroutine",
                };
                return Err(AsmError::syntax(line, format!("expected {what} <name>")));
            };
            self.check_name(name, line)?;

            // labels hold the raw instruction index.
            let index = self.context.lines.len();
            let address = u8::try_from(index)
                .map_err(|_| AsmError::AddressSpaceExceeded { line, limit: MAX_INSTRUCTIONS })?;

            match kind {
                Declaration::Label => {
                    self.context.labels.insert(name.clone(), address);
                    debug!("line {line}: label {name} at {address}");
                }
                Declaration::Subroutine => {
                    self.context.subroutines.insert(name.clone(), address);
                    self.context.subroutine_addresses.insert(address);
                    debug!("line {line}: subroutine {name} at {address}");
                }
            }

            if index + 1 == MAX_INSTRUCTIONS {
                warn!("line {line}: '{name}' points at the last addressable instruction slot");
            }
            Ok(())
        }

        fn check_name(&self, name: &str, line: usize) -> Result<(), AsmError> {
            if name.starts_with(|c: char| c.is_ascii_digit()) {
                return Err(AsmError::syntax(line, format!("'{name}' is a number and cannot be declared")));
            }
            let is_ident = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !is_ident {
                return Err(AsmError::syntax(line, format!("'{name}' is not a valid name")));
            }
            if self.symbols.is_reserved(name) {
                return Err(AsmError::syntax(line, format!("'{name}' is a reserved keyword")));
            }
            if self.context.is_declared(name) {
                return Err(AsmError::syntax(line, format!("'{name}' is already declared")));
            }
            Ok(())
        }
    }
}
