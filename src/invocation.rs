//! Invocation line parsing: `/command --flag value ...` and `@agent free text`.

use crate::error::RuntimeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `/name args...`; args are split shell-style, flags bound later
    Command { name: String, args: Vec<String> },
    /// `@name text`; the text is passed through verbatim as the prompt
    Agent { name: String, text: String },
}

impl Invocation {
    pub fn name(&self) -> &str {
        match self {
            Invocation::Command { name, .. } | Invocation::Agent { name, .. } => name,
        }
    }
}

pub fn parse_line(line: &str) -> Result<Invocation, RuntimeError> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix('/') {
        let args = split_args(rest).map_err(RuntimeError::InvalidInvocation)?;
        let mut args = args.into_iter();
        let name = args.next().ok_or_else(|| {
            RuntimeError::InvalidInvocation("missing command name after '/'".to_string())
        })?;
        return Ok(Invocation::Command {
            name,
            args: args.collect(),
        });
    }
    if let Some(rest) = line.strip_prefix('@') {
        let (name, text) = match rest.find(char::is_whitespace) {
            Some(i) => (&rest[..i], rest[i..].trim()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return Err(RuntimeError::InvalidInvocation(
                "missing agent name after '@'".to_string(),
            ));
        }
        return Ok(Invocation::Agent {
            name: name.to_string(),
            text: text.to_string(),
        });
    }
    Err(RuntimeError::InvalidInvocation(format!(
        "expected '/command' or '@agent', got '{}'",
        line
    )))
}

/// Split on whitespace, honouring `"..."` and `'...'` quoting and `\` escapes
/// (outside single quotes).
pub fn split_args(input: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_word = true;
                }
                None => return Err("trailing backslash".to_string()),
            },
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}
