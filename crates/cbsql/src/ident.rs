//! SQL name validation for tables, columns and caller-supplied aliases.
//!
//! Names reach rendered SQL verbatim (identifiers cannot be bound), so every
//! name registered in metadata or supplied as a derived alias goes through
//! [`SqlName::parse`].
//!
//! - Unquoted parts are validated against: `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted parts allow any characters except NUL and escape `"` as `""`

use crate::error::{CbError, CbResult};
use std::fmt;

/// A part of a dotted SQL name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamePart {
    Unquoted(String),
    Quoted(String),
}

/// A validated SQL name (`member`, `public.member`, `"MemberStatus"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlName {
    parts: Vec<NamePart>,
}

impl SqlName {
    /// Parse a dotted, optionally quoted name.
    pub fn parse(s: &str) -> CbResult<Self> {
        if s.is_empty() {
            return Err(CbError::validation("SQL name cannot be empty"));
        }
        if s.contains('\0') {
            return Err(CbError::validation("SQL name cannot contain NUL character"));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();
        while chars.peek().is_some() {
            if !parts.is_empty() {
                match chars.next() {
                    Some('.') if chars.peek().is_some() => {}
                    Some('.') => {
                        return Err(CbError::validation(format!("Trailing '.' in SQL name '{s}'")));
                    }
                    Some(c) => {
                        return Err(CbError::validation(format!(
                            "Expected '.' between name parts of '{s}', got '{c}'"
                        )));
                    }
                    None => break,
                }
            }

            if chars.peek() == Some(&'"') {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            name.push('"');
                        }
                        Some('"') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(CbError::validation(format!(
                                "Unclosed quoted name in '{s}'"
                            )));
                        }
                    }
                }
                if name.is_empty() {
                    return Err(CbError::validation("Empty quoted SQL name"));
                }
                parts.push(NamePart::Quoted(name));
                continue;
            }

            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let ok = if name.is_empty() {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !ok {
                    return Err(CbError::validation(format!(
                        "Invalid character '{c}' in SQL name '{s}'"
                    )));
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(CbError::validation(format!("Empty segment in SQL name '{s}'")));
            }
            parts.push(NamePart::Unquoted(name));
        }

        Ok(Self { parts })
    }

    /// Parse a name that must not be dotted (columns, aliases).
    pub fn parse_simple(s: &str) -> CbResult<Self> {
        let name = Self::parse(s)?;
        if name.parts.len() != 1 {
            return Err(CbError::validation(format!(
                "'{s}' must be a single, undotted SQL name"
            )));
        }
        Ok(name)
    }

    /// The last part without quotes, e.g. `member` for `public.member`.
    pub fn base_name(&self) -> &str {
        match self.parts.last() {
            Some(NamePart::Unquoted(s)) | Some(NamePart::Quoted(s)) => s,
            None => "",
        }
    }

    /// Render the name as SQL text.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                NamePart::Unquoted(s) => out.push_str(s),
                NamePart::Quoted(s) => {
                    out.push('"');
                    out.push_str(&s.replace('"', "\"\""));
                    out.push('"');
                }
            }
        }
    }
}

impl fmt::Display for SqlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_simple() {
        assert_eq!(SqlName::parse("member").unwrap().to_sql(), "member");
    }

    #[test]
    fn name_dotted() {
        let name = SqlName::parse("public.member").unwrap();
        assert_eq!(name.to_sql(), "public.member");
        assert_eq!(name.base_name(), "member");
    }

    #[test]
    fn name_quoted_with_escape() {
        let name = SqlName::parse(r#""has""quote""#).unwrap();
        assert_eq!(name.to_sql(), r#""has""quote""#);
        assert_eq!(name.base_name(), r#"has"quote"#);
    }

    #[test]
    fn name_with_dollar() {
        assert_eq!(SqlName::parse("max_price$1").unwrap().to_sql(), "max_price$1");
    }

    #[test]
    fn simple_rejects_dotted() {
        assert!(SqlName::parse_simple("a.b").is_err());
        assert!(SqlName::parse_simple("alias_ok").is_ok());
    }

    #[test]
    fn name_rejects_injection_shapes() {
        assert!(SqlName::parse("").is_err());
        assert!(SqlName::parse("1member").is_err());
        assert!(SqlName::parse("max price").is_err());
        assert!(SqlName::parse("a..b").is_err());
        assert!(SqlName::parse("a.").is_err());
        assert!(SqlName::parse(r#""unclosed"#).is_err());
        assert!(SqlName::parse("x; DROP TABLE member").is_err());
    }
}
