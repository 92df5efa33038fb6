use crate::errors::{Error, Result};

/// Low-level cursor over an expression string, shared by the path parser and
/// the template-leaf classifier.
pub struct Cursor<'a> {
    s: &'a str,
    i: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, i: 0 }
    }

    pub fn parse_identifier(&mut self) -> Result<String> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_ascii_alphanumeric() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(Error::Expression("identifier expected".into()));
        }
        Ok(self.s[start..self.i].to_string())
    }

    pub fn parse_int(&mut self) -> Result<i64> {
        let start = self.i;
        if self.peek_char() == Some('-') {
            self.i += 1;
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        let text = &self.s[start..self.i];
        if text.is_empty() || text == "-" {
            return Err(Error::Expression("integer expected".into()));
        }
        text.parse::<i64>()
            .map_err(|_| Error::Expression(format!("bad integer `{text}`")))
    }

    pub fn parse_number_literal(&mut self) -> Result<serde_json::Value> {
        let start = self.i;
        if self.peek_char() == Some('-') {
            self.i += 1;
        }
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.i += 1;
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            self.i += 1;
            while let Some(c) = self.peek_char() {
                if c.is_ascii_digit() {
                    self.i += 1;
                } else {
                    break;
                }
            }
        }
        let text = &self.s[start..self.i];
        if text.is_empty() {
            return Err(Error::Expression("number expected".into()));
        }
        if text.contains('.') {
            let f: f64 = text
                .parse()
                .map_err(|_| Error::Expression(format!("bad float `{text}`")))?;
            Ok(serde_json::Value::from(f))
        } else {
            let i: i64 = text
                .parse()
                .map_err(|_| Error::Expression(format!("bad int `{text}`")))?;
            Ok(serde_json::Value::from(i))
        }
    }

    /// `"..."` or `'...'` with `\` escapes.
    pub fn parse_quoted_string(&mut self) -> Result<String> {
        let quote = self
            .peek_char()
            .ok_or_else(|| Error::Expression("quoted string expected".into()))?;
        if quote != '\'' && quote != '"' {
            return Err(Error::Expression("quoted string expected".into()));
        }
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                return Ok(out);
            }
            if c == '\\' {
                if let Some(nc) = self.peek_char() {
                    self.i += nc.len_utf8();
                    match nc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '\\' => out.push('\\'),
                        '"' => out.push('"'),
                        '\'' => out.push('\''),
                        _ => {
                            out.push('\\');
                            out.push(nc);
                        }
                    }
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        Err(Error::Expression("unterminated string".into()))
    }

    pub fn capture_until(&mut self, end: char) -> Result<&'a str> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == end {
                break;
            }
            self.i += c.len_utf8();
        }
        if self.peek_char() != Some(end) {
            return Err(Error::Expression(format!("expected '{end}'")));
        }
        Ok(&self.s[start..self.i])
    }

    pub fn expect(&mut self, c: char) -> Result<()> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(Error::Expression(format!("expected '{c}'")))
        }
    }

    pub fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    pub fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    pub fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    pub fn rest(&self) -> &'a str {
        &self.s[self.i..]
    }

    pub fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}
