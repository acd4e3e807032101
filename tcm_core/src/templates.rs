pub mod templates {
    use std::collections::HashMap;

    use crate::error::error::AsmError;

    type Line = &'static [&'static str];

    /// Shorthand statement -> canonical 4-token line(s). `{NAME}` elements are
    /// placeholders; everything else must match case-insensitively.
    struct Template {
        pattern: Line,
        expansion: &'static [Line],
    }

    const TEMPLATES: &[Template] = &[
        Template { pattern: &["HALT"], expansion: &[&["HALT", "0", "0", "0"]] },
        Template { pattern: &["CLEAR"], expansion: &[&["CLEAR", "0", "0", "0"]] },
        Template { pattern: &["WAIT", "{MS}"], expansion: &[&["WAIT", "{MS}", "0", "0"]] },
        Template { pattern: &["INC", "{SOURCE}"], expansion: &[&["ADD", "{SOURCE}", "1", "{SOURCE}"]] },
        Template { pattern: &["DEC", "{SOURCE}"], expansion: &[&["SUB", "{SOURCE}", "1", "{SOURCE}"]] },
        Template { pattern: &["COPY", "{SOURCE}", "{DEST}"], expansion: &[&["ADD", "{SOURCE}", "0", "{DEST}"]] },
        Template { pattern: &["{DEST}", "=", "{SOURCE}"], expansion: &[&["ADD", "{SOURCE}", "0", "{DEST}"]] },
        Template { pattern: &["GOTO", "{TARGET}"], expansion: &[&["ADD", "{TARGET}", "0", "COUNTER"]] },
        Template { pattern: &["JMP", "{TARGET}"], expansion: &[&["ADD", "{TARGET}", "0", "COUNTER"]] },
        Template { pattern: &["CALL", "{TARGET}"], expansion: &[&["ADD", "{TARGET}", "0", "COUNTER"]] },
        Template { pattern: &["RETURN"], expansion: &[&["ADD", "STACK", "0", "COUNTER"]] },
        Template { pattern: &["PRINT", "{VALUE}"], expansion: &[&["ADD", "{VALUE}", "0", "OUTPUT"]] },
        Template { pattern: &["IF", "{A}", "{OP}", "{B}", "THEN"], expansion: &[&["{IF}", "{A}", "{B}", "0"]] },
        Template {
            pattern: &["IF", "{A}", "{OP}", "{B}", "GOTO", "{TARGET}"],
            expansion: &[&["{IF}", "{A}", "{B}", "0"], &["ADD", "{TARGET}", "0", "COUNTER"]],
        },
        Template {
            pattern: &["IF", "{A}", "{OP}", "{B}", "JMP", "{TARGET}"],
            expansion: &[&["{IF}", "{A}", "{B}", "0"], &["ADD", "{TARGET}", "0", "COUNTER"]],
        },
        Template {
            pattern: &["IF", "{A}", "{OP}", "{B}", "THEN", "GOTO", "{TARGET}"],
            expansion: &[&["{IF}", "{A}", "{B}", "0"], &["ADD", "{TARGET}", "0", "COUNTER"]],
        },
        Template {
            pattern: &["IF", "{A}", "{OP}", "{B}", "THEN", "JMP", "{TARGET}"],
            expansion: &[&["{IF}", "{A}", "{B}", "0"], &["ADD", "{TARGET}", "0", "COUNTER"]],
        },
    ];

    fn relational_opcode(op: &str) -> Option<&'static str> {
        match op {
            "=" | "==" => Some("IF_EQL"),
            "!=" => Some("IF_NEQ"),
            "<" => Some("IF_LES"),
            "<=" => Some("IF_LOE"),
            ">" => Some("IF_GRT"),
            ">=" => Some("IF_GOE"),
            _ => None,
        }
    }

    fn placeholder(element: &str) -> Option<&str> {
        element
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .filter(|name| !name.is_empty())
    }

    fn try_match(tokens: &[String], pattern: Line) -> Option<HashMap<&'static str, String>> {
        if tokens.len() != pattern.len() {
            return None;
        }

        let mut bound = HashMap::new();
        for (token, element) in tokens.iter().zip(pattern.iter()) {
            match placeholder(*element) {
                Some(name) => {
                    bound.insert(name, token.clone());
                }
                None if token.eq_ignore_ascii_case(element) => {}
                None => return None,
            }
        }

        if let Some(op) = bound.get("OP") {
            let opcode = relational_opcode(op)?;
            bound.insert("IF", opcode.to_string());
        }
        Some(bound)
    }

    /// Expand a shorthand statement. `None` when no template applies and the
    /// statement is already expected to be canonical.
    pub fn expand(tokens: &[String]) -> Option<Vec<Vec<String>>> {
        TEMPLATES.iter().find_map(|template| {
            let bound = try_match(tokens, template.pattern)?;
            let lines: Vec<Vec<String>> = template
                .expansion
                .iter()
                .map(|line| {
                    line.iter()
                        .map(|element| match placeholder(element) {
                            Some(name) => bound.get(name).cloned().unwrap_or_default(),
                            None => element.to_string(),
                        })
                        .collect::<Vec<String>>()
                })
                .collect();
            Some(lines)
        })
    }

    pub fn is_string_literal(token: &str) -> bool {
        token.starts_with('"')
    }

    /// Decode the body of a double-quoted literal into byte values.
    pub fn decode_string(literal: &str, line: usize) -> Result<Vec<u8>, AsmError> {
        let body = literal
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(|| AsmError::syntax(line, format!("unterminated string literal {literal}")))?;

        let mut bytes = Vec::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(ch) = chars.next() {
            let decoded = match ch {
                '\\' => {
                    let Some(escaped) = chars.next() else {
                        return Err(AsmError::syntax(line, "string literal ends with a lone '\\'"));
                    };
                    match escaped {
                        'n' => '\n',
                        'b' => '\u{8}',
                        't' => '\t',
                        'v' => '\u{b}',
                        'r' => '\r',
                        '\\' => '\\',
                        '"' => '"',
                        '/' => '/',
                        other => {
                            return Err(AsmError::syntax(
                                line,
                                format!("invalid escape sequence \"\\{other}\" inside string"),
                            ));
                        }
                    }
                }
                '"' => {
                    return Err(AsmError::syntax(line, "unescaped '\"' inside string literal"));
                }
                other => other,
            };

            let code = u8::try_from(u32::from(decoded)).map_err(|_| {
                AsmError::syntax(line, format!("character '{decoded}' does not fit in a byte"))
            })?;
            bytes.push(code);
        }

        Ok(bytes)
    }

    /// `PRINT "text"` -> char pragma on, one OUTPUT store per character, and
    /// the pragma back off unless character output was already in effect.
    ///
    /// `None` when the statement carries no string literal.
    pub fn expand_string_print(
        tokens: &[String],
        line: usize,
        char_output: bool,
    ) -> Result<Option<Vec<Vec<String>>>, AsmError> {
        if !tokens.iter().any(|token| token.contains('"')) {
            return Ok(None);
        }

        let [keyword, literal] = tokens else {
            return Err(AsmError::syntax(line, "string literals are only allowed as PRINT \"<text>\""));
        };
        if !keyword.eq_ignore_ascii_case("PRINT") || !is_string_literal(literal) {
            return Err(AsmError::syntax(line, "string literals are only allowed as PRINT \"<text>\""));
        }

        let to_line = |parts: &[&str]| parts.iter().map(|part| part.to_string()).collect::<Vec<_>>();

        let mut lines = vec![to_line(&["#pragma", "char", "true"])];
        for code in decode_string(literal, line)? {
            lines.push(vec!["ADD".to_string(), code.to_string(), "0".to_string(), "OUTPUT".to_string()]);
        }
        if !char_output {
            lines.push(to_line(&["#pragma", "char", "false"]));
        }

        Ok(Some(lines))
    }
}
