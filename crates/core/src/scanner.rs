//! The Slate scanner: raw source text to a flat token sequence.
//!
//! The scanner is where prose/code disambiguation happens. Column 1 triggers
//! markdown block detection (headings, blockquotes, list markers, fenced
//! blocks); every other position falls through to expression tokenization.
//! The scanner knows character classes only -- no grammar.

use crate::error::SlateError;
use crate::num::Num;
use crate::token::{Flavor, Token, TokenKind};
use crate::units::UnitRegistry;

/// Scan a source string into tokens. Positions are 1-based.
pub fn scan(source: &str, units: &UnitRegistry) -> Result<Vec<Token>, SlateError> {
    Scanner::new(source, units, 1, 1).run()
}

/// Token kinds that can end a value; used to disambiguate `/` (division vs
/// regex), `<` (comparison vs markup) and `..` (range vs spread).
fn ends_value(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number
            | TokenKind::Literal
            | TokenKind::Str
            | TokenKind::Symbol
            | TokenKind::DynamicSymbol
            | TokenKind::RParen
            | TokenKind::RBracket
    )
}

struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    units: &'a UnitRegistry,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    fn new(source: &str, units: &'a UnitRegistry, line: u32, col: u32) -> Self {
        Scanner {
            chars: source.chars().collect(),
            pos: 0,
            line,
            col,
            units,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn push(&mut self, tok: Token) {
        self.tokens.push(tok);
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|t| t.kind)
    }

    fn err(&self, message: impl Into<String>) -> SlateError {
        SlateError::scan(self.line, self.col, message)
    }

    fn run(mut self) -> Result<Vec<Token>, SlateError> {
        while let Some(c) = self.peek() {
            if self.col == 1 && self.scan_markdown()? {
                continue;
            }
            match c {
                '\n' => {
                    self.advance();
                    // Two newlines in a row become a paragraph break.
                    let kind = match self.last_kind() {
                        Some(TokenKind::Eol) | Some(TokenKind::Break) => TokenKind::Break,
                        _ => TokenKind::Eol,
                    };
                    self.push(Token::new(kind, self.line, self.col));
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                c if c.is_control() => {
                    return Err(self.err(format!("unexpected control character {:?}", c)));
                }
                '"' => self.scan_string()?,
                '`' => self.scan_backtick()?,
                '0'..='9' => self.scan_number()?,
                ':' => self.scan_symbol()?,
                '/' => self.scan_slash()?,
                '<' => self.scan_angle()?,
                c if c.is_alphabetic() || c == '_' => self.scan_word(),
                _ => self.scan_operator()?,
            }
        }
        self.push(Token::new(TokenKind::Eof, self.line, self.col));
        Ok(self.tokens)
    }

    // ── Markdown constructs (column 1 only) ──────────────────────

    /// Returns true when a markdown block was consumed.
    fn scan_markdown(&mut self) -> Result<bool, SlateError> {
        let (line, col) = (self.line, self.col);
        match self.peek() {
            Some('#') => {
                // Heading: one or more '#' then a space.
                let mut depth = 0;
                while self.peek_at(depth) == Some('#') {
                    depth += 1;
                }
                if self.peek_at(depth) != Some(' ') {
                    return Err(self.err("unexpected character '#'"));
                }
                for _ in 0..=depth {
                    self.advance();
                }
                let text = self.take_line();
                self.push(
                    Token::string(TokenKind::Heading, format!("{} {}", "#".repeat(depth), text), line, col)
                        .with_flavor(Flavor::Markup),
                );
                Ok(true)
            }
            Some('>') if self.peek_at(1) == Some(' ') => {
                self.advance();
                self.advance();
                let text = self.take_line();
                self.push(
                    Token::string(TokenKind::Blockquote, text, line, col).with_flavor(Flavor::Markup),
                );
                Ok(true)
            }
            Some(m @ ('-' | '*' | '+')) if self.peek_at(1) == Some(' ') && !self.continues_expression() => {
                self.advance();
                self.advance();
                let text = self.take_line();
                self.push(
                    Token::string(TokenKind::ListItem, format!("{} {}", m, text), line, col)
                        .with_flavor(Flavor::Markup),
                );
                Ok(true)
            }
            Some('`') if self.peek_at(1) == Some('`') && self.peek_at(2) == Some('`') => {
                self.scan_fence(line, col)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// A `- ` at column 1 is a list marker unless the previous line left an
    /// expression open (trailing operator), in which case it is subtraction.
    fn continues_expression(&self) -> bool {
        for tok in self.tokens.iter().rev() {
            match tok.kind {
                TokenKind::Eol | TokenKind::Break | TokenKind::Comment => continue,
                k => {
                    return matches!(
                        k,
                        TokenKind::Assign | TokenKind::Arrow | TokenKind::Plus | TokenKind::Star
                    )
                }
            }
        }
        false
    }

    fn take_line(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        text
    }

    fn scan_fence(&mut self, line: u32, col: u32) -> Result<(), SlateError> {
        for _ in 0..3 {
            self.advance();
        }
        let info = self.take_line();
        self.advance(); // newline after the opening fence
        let mut body = String::new();
        loop {
            if self.peek().is_none() {
                return Err(SlateError::scan(line, col, "unterminated fenced block"));
            }
            if self.col == 1
                && self.peek() == Some('`')
                && self.peek_at(1) == Some('`')
                && self.peek_at(2) == Some('`')
            {
                for _ in 0..3 {
                    self.advance();
                }
                break;
            }
            body.push(self.advance().unwrap());
        }
        let text = if info.is_empty() { body } else { format!("{}\n{}", info, body) };
        self.push(Token::string(TokenKind::Fence, text, line, col).with_flavor(Flavor::Multi));
        Ok(())
    }

    // ── Strings ──────────────────────────────────────────────────

    fn scan_string(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        if self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"') {
            return self.scan_triple_string(line, col);
        }
        self.advance(); // opening quote

        // Parts alternate between literal segments and interpolated token
        // runs; they are spliced back together with `++` concat markers so
        // the parser sees string ++ expr ++ string ++ ...
        enum Part {
            Seg(String),
            Sub(Vec<Token>),
        }
        let mut parts: Vec<Part> = Vec::new();
        let mut seg = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(SlateError::scan(line, col, "unterminated string literal"));
            };
            if c == '\n' {
                return Err(SlateError::scan(line, col, "unterminated string literal"));
            }
            if c == '"' {
                self.advance();
                break;
            }
            if c == '\\' {
                self.advance();
                match self.advance() {
                    Some('"') => seg.push('"'),
                    Some('\\') => seg.push('\\'),
                    Some('n') => seg.push('\n'),
                    Some('t') => seg.push('\t'),
                    Some(other) => {
                        seg.push('\\');
                        seg.push(other);
                    }
                    None => {
                        return Err(SlateError::scan(line, col, "unterminated escape in string"))
                    }
                }
                continue;
            }
            if c == '#' && self.peek_at(1) == Some('{') {
                parts.push(Part::Seg(std::mem::take(&mut seg)));
                self.advance();
                self.advance();
                let (sub_line, sub_col) = (self.line, self.col);
                let mut inner = String::new();
                let mut depth = 1;
                loop {
                    let Some(ic) = self.peek() else {
                        return Err(SlateError::scan(line, col, "unterminated interpolation"));
                    };
                    if ic == '{' {
                        depth += 1;
                    }
                    if ic == '}' {
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            break;
                        }
                    }
                    inner.push(ic);
                    self.advance();
                }
                let mut sub = Scanner::new(&inner, self.units, sub_line, sub_col).run()?;
                sub.retain(|t| !matches!(t.kind, TokenKind::Eof | TokenKind::Eol));
                parts.push(Part::Sub(sub));
                continue;
            }
            seg.push(c);
            self.advance();
        }
        if !seg.is_empty() || parts.is_empty() {
            parts.push(Part::Seg(seg));
        }

        // First part must be a string so downstream `+`-reduction sees
        // string concatenation; anchor with an empty segment if needed.
        if matches!(parts.first(), Some(Part::Sub(_))) {
            parts.insert(0, Part::Seg(String::new()));
        }
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                self.push(Token::new(TokenKind::Concat, line, col));
            }
            match part {
                Part::Seg(s) => self.push(Token::string(TokenKind::Str, s, line, col)),
                Part::Sub(toks) => {
                    self.push(Token::new(TokenKind::LParen, line, col));
                    self.tokens.extend(toks);
                    self.push(Token::new(TokenKind::RParen, line, col));
                }
            }
        }
        Ok(())
    }

    fn scan_triple_string(&mut self, line: u32, col: u32) -> Result<(), SlateError> {
        for _ in 0..3 {
            self.advance();
        }
        let mut body = String::new();
        loop {
            if self.peek().is_none() {
                return Err(SlateError::scan(line, col, "unterminated string literal"));
            }
            if self.peek() == Some('"') && self.peek_at(1) == Some('"') && self.peek_at(2) == Some('"')
            {
                for _ in 0..3 {
                    self.advance();
                }
                break;
            }
            body.push(self.advance().unwrap());
        }
        self.push(
            Token::string(TokenKind::Str, deindent(&body), line, col).with_flavor(Flavor::Multi),
        );
        Ok(())
    }

    fn scan_backtick(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        let mut body = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(SlateError::scan(line, col, "unterminated inline code span"))
                }
                Some('`') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    body.push(c);
                    self.advance();
                }
            }
        }
        self.push(Token::string(TokenKind::Str, body, line, col).with_flavor(Flavor::Raw));
        Ok(())
    }

    // ── Numbers ──────────────────────────────────────────────────

    fn scan_number(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        // Single fractional dot, only when a digit follows.
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
        }
        let mut num = Num::parse(&text)
            .ok_or_else(|| SlateError::scan(line, col, format!("invalid number '{}'", text)))?;

        // `/`-fraction: integer immediately followed by / and an integer.
        if !text.contains('.')
            && self.peek() == Some('/')
            && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit())
        {
            self.advance();
            let mut den = String::new();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                den.push(self.advance().unwrap());
            }
            let d: i64 = den
                .parse()
                .map_err(|_| SlateError::scan(line, col, format!("invalid fraction '{}/{}'", text, den)))?;
            num = Num::fraction(num.as_int().unwrap_or(0), d)
                .ok_or_else(|| SlateError::scan(line, col, "fraction with zero denominator"))?;
        }

        // Immediately-following unit word, via the registration chain.
        let mut unit = None;
        if matches!(self.peek(), Some(c) if c.is_alphabetic()) {
            let mut word = String::new();
            let mut ahead = 0;
            while let Some(c) = self.peek_at(ahead) {
                if c.is_alphabetic() {
                    word.push(c);
                    ahead += 1;
                } else {
                    break;
                }
            }
            if let Some(u) = self.units.lookup(num.to_f64(), &word) {
                for _ in 0..word.chars().count() {
                    self.advance();
                }
                unit = Some(u.unit);
            }
        }
        self.push(Token::number(num, unit, line, col));
        Ok(())
    }

    // ── Symbols / slash / angle ──────────────────────────────────

    fn scan_symbol(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        self.advance();
        match self.peek() {
            Some('"') => {
                let start = self.tokens.len();
                self.scan_string()?;
                if self.tokens.len() == start + 1 {
                    // Plain text: the one pushed string becomes the symbol.
                    if let Some(tok) = self.tokens.last_mut() {
                        if tok.kind == TokenKind::Str {
                            tok.kind = TokenKind::DynamicSymbol;
                            tok.line = line;
                            tok.col = col;
                        }
                    }
                } else {
                    // Interpolated: wrap the whole concat chain and convert
                    // the evaluated string through the `.symbol` accessor.
                    self.tokens.insert(start, Token::new(TokenKind::LParen, line, col));
                    self.push(Token::new(TokenKind::RParen, self.line, self.col));
                    self.push(Token::new(TokenKind::Dot, self.line, self.col));
                    self.push(Token::string(
                        TokenKind::Literal,
                        "symbol",
                        self.line,
                        self.col,
                    ));
                }
                Ok(())
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                    name.push(self.advance().unwrap());
                }
                self.push(Token::string(TokenKind::Symbol, name, line, col));
                Ok(())
            }
            _ => {
                self.push(Token::new(TokenKind::Colon, line, col));
                Ok(())
            }
        }
    }

    fn scan_slash(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        if self.peek_at(1) == Some('/') {
            self.advance();
            self.advance();
            let text = self.take_line();
            self.push(Token::string(TokenKind::Comment, text.trim().to_string(), line, col));
            return Ok(());
        }
        if self.peek_at(1) == Some('*') {
            self.advance();
            self.advance();
            let mut body = String::new();
            loop {
                if self.peek().is_none() {
                    return Err(SlateError::scan(line, col, "unterminated block comment"));
                }
                if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                    self.advance();
                    self.advance();
                    break;
                }
                body.push(self.advance().unwrap());
            }
            self.push(
                Token::string(TokenKind::Comment, body.trim().to_string(), line, col)
                    .with_flavor(Flavor::Multi),
            );
            return Ok(());
        }
        // Regex only when `/` cannot be division: the previous token must
        // not end a value, and something other than whitespace must follow.
        let prev_is_value = self.last_kind().map(ends_value).unwrap_or(false);
        if !prev_is_value && !matches!(self.peek_at(1), None | Some(' ') | Some('\n') | Some('\t')) {
            return self.scan_regex(line, col);
        }
        self.advance();
        self.push(Token::new(TokenKind::Slash, line, col));
        Ok(())
    }

    fn scan_regex(&mut self, line: u32, col: u32) -> Result<(), SlateError> {
        self.advance(); // opening /
        let mut body = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(SlateError::scan(line, col, "unterminated regex literal"))
                }
                Some('\\') => {
                    body.push(self.advance().unwrap());
                    if let Some(escaped) = self.advance() {
                        body.push(escaped);
                    }
                }
                Some('/') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    body.push(c);
                    self.advance();
                }
            }
        }
        let mut flags = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphabetic()) {
            let c = self.advance().unwrap();
            if !matches!(c, 'g' | 'i' | 'm' | 's') {
                return Err(SlateError::scan(line, col, format!("unknown regex flag '{}'", c)));
            }
            flags.push(c);
        }
        // Stored in source form so round-trip serialization is an echo.
        self.push(Token::string(TokenKind::Regex, format!("/{}/{}", body, flags), line, col));
        Ok(())
    }

    /// `<` opens a markup tag only when a balanced close tag exists ahead;
    /// otherwise it is a comparison operator.
    fn scan_angle(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        if matches!(self.peek_at(1), Some(c) if c.is_alphabetic()) {
            if let Some(len) = self.balanced_tag_len() {
                let mut text = String::new();
                for _ in 0..len {
                    text.push(self.advance().unwrap());
                }
                self.push(Token::string(TokenKind::Str, text, line, col).with_flavor(Flavor::Markup));
                return Ok(());
            }
        }
        self.advance();
        if self.peek() == Some('=') {
            self.advance();
            self.push(Token::new(TokenKind::Lte, line, col));
        } else {
            self.push(Token::new(TokenKind::Lt, line, col));
        }
        Ok(())
    }

    /// Length in chars of a balanced `<tag ...>...</tag>` (or `<tag/>`)
    /// starting at the cursor, or None when unbalanced.
    fn balanced_tag_len(&self) -> Option<usize> {
        let rest = &self.chars[self.pos..];
        let mut name = String::new();
        let mut i = 1;
        while i < rest.len() && (rest[i].is_alphanumeric() || rest[i] == '-') {
            name.push(rest[i]);
            i += 1;
        }
        if name.is_empty() {
            return None;
        }
        let open: Vec<char> = format!("<{}", name).chars().collect();
        let close: Vec<char> = format!("</{}>", name).chars().collect();
        let mut depth = 0;
        let mut j = 0;
        while j < rest.len() {
            if rest[j..].starts_with(&close[..]) {
                depth -= 1;
                j += close.len();
                if depth == 0 {
                    return Some(j);
                }
                continue;
            }
            if rest[j..].starts_with(&open[..]) {
                // Self-closing tags don't increase depth.
                let mut k = j + open.len();
                while k < rest.len() && rest[k] != '>' && rest[k] != '<' {
                    k += 1;
                }
                if k < rest.len() && rest[k] == '>' {
                    if rest[k - 1] == '/' {
                        if depth == 0 {
                            return Some(k + 1);
                        }
                    } else {
                        depth += 1;
                    }
                    j = k + 1;
                    continue;
                }
                return None;
            }
            j += 1;
        }
        None
    }

    // ── Words and operators ──────────────────────────────────────

    fn scan_word(&mut self) {
        let (line, col) = (self.line, self.col);
        let mut word = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            word.push(self.advance().unwrap());
        }
        if word == "_" {
            self.push(Token::new(TokenKind::Underscore, line, col));
        } else {
            self.push(Token::string(TokenKind::Literal, word, line, col));
        }
    }

    fn scan_operator(&mut self) -> Result<(), SlateError> {
        let (line, col) = (self.line, self.col);
        let c = self.peek().unwrap();
        let next = self.peek_at(1);
        let (kind, len) = match (c, next) {
            ('+', Some('+')) => (TokenKind::Concat, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', Some('>')) => (TokenKind::Arrow, 2),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('!', Some('=')) => (TokenKind::Neq, 2),
            ('!', _) => (TokenKind::Bang, 1),
            ('?', _) => (TokenKind::Question, 1),
            ('$', _) => (TokenKind::AllOf, 1),
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('=', _) => (TokenKind::Assign, 1),
            ('|', Some('>')) => (TokenKind::PipeForward, 2),
            ('|', _) => (TokenKind::Pipe, 1),
            ('>', Some('=')) => (TokenKind::Gte, 2),
            ('>', _) => (TokenKind::Gt, 1),
            (',', _) => (TokenKind::Comma, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            ('.', Some('.')) => {
                let kind = if self.last_kind().map(ends_value).unwrap_or(false) {
                    TokenKind::RangeOp
                } else {
                    TokenKind::Spread
                };
                (kind, 2)
            }
            ('.', next) => {
                // A dot that cannot start an access or a decimal is prose
                // (sentence punctuation).
                if matches!(next, Some(c) if c.is_alphanumeric() || c == '_') {
                    (TokenKind::Dot, 1)
                } else {
                    self.advance();
                    self.push(
                        Token::string(TokenKind::Text, ".", line, col).with_flavor(Flavor::Markup),
                    );
                    return Ok(());
                }
            }
            _ => return Err(self.err(format!("unexpected character '{}'", c))),
        };
        for _ in 0..len {
            self.advance();
        }
        self.push(Token::new(kind, line, col));
        Ok(())
    }
}

/// Strip the common leading indentation of a triple-quoted string body and
/// any leading newline after the opening quotes.
fn deindent(body: &str) -> String {
    let body = body.strip_prefix('\n').unwrap_or(body);
    let indent = body
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);
    let stripped: Vec<&str> = body.lines().map(|l| strip_indent(l, indent)).collect();
    stripped.join("\n").trim_end().to_string()
}

/// Drop up to `indent` leading whitespace characters from a line. Counts
/// characters, not bytes, so multibyte whitespace never splits.
fn strip_indent(line: &str, indent: usize) -> &str {
    let mut rest = line;
    for _ in 0..indent {
        match rest.chars().next() {
            Some(c) if c.is_whitespace() => rest = &rest[c.len_utf8()..],
            _ => break,
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenValue;

    fn toks(src: &str) -> Vec<Token> {
        scan(src, &UnitRegistry::new()).unwrap()
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        toks(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers_and_operators() {
        assert_eq!(
            kinds("1+2*3"),
            vec![
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::Star,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn slash_fraction_scans_as_one_number() {
        let t = toks("1/2 + 3/4");
        assert_eq!(t[0].kind, TokenKind::Number);
        assert_eq!(t[0].value, TokenValue::Number { num: Num::Fraction(1, 2), unit: None });
        assert_eq!(t[1].kind, TokenKind::Plus);
        assert_eq!(t[2].value, TokenValue::Number { num: Num::Fraction(3, 4), unit: None });
    }

    #[test]
    fn spaced_slash_is_division() {
        assert_eq!(
            kinds("1 / 2"),
            vec![TokenKind::Number, TokenKind::Slash, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn unit_suffix_captured_through_registry() {
        let mut reg = UnitRegistry::new();
        reg.register(|v, u| {
            matches!(u, "cm" | "mm").then(|| crate::units::UnitValue { value: v, unit: u.into() })
        });
        let t = scan("1cm - 35mm.", &reg).unwrap();
        assert_eq!(t[0].value, TokenValue::Number { num: Num::Int(1), unit: Some("cm".into()) });
        assert_eq!(t[1].kind, TokenKind::Minus);
        assert_eq!(t[2].value, TokenValue::Number { num: Num::Int(35), unit: Some("mm".into()) });
        // Trailing sentence dot stays prose.
        assert_eq!(t[3].kind, TokenKind::Text);
    }

    #[test]
    fn unknown_unit_word_is_left_for_the_parser() {
        let t = toks("3x");
        assert_eq!(t[0].value, TokenValue::Number { num: Num::Int(3), unit: None });
        assert_eq!(t[1].kind, TokenKind::Literal);
        assert_eq!(t[1].text(), Some("x"));
    }

    #[test]
    fn heading_consumes_line_as_prose() {
        let t = toks("# Budget 2026\n1+2");
        assert_eq!(t[0].kind, TokenKind::Heading);
        assert_eq!(t[0].text(), Some("# Budget 2026"));
        assert_eq!(t[0].flavor, Some(Flavor::Markup));
        assert_eq!(t[1].kind, TokenKind::Eol);
        assert_eq!(t[2].kind, TokenKind::Number);
    }

    #[test]
    fn interpolation_splices_with_concat_markers() {
        let k = kinds(r#""total: #{1+2}!""#);
        assert_eq!(
            k,
            vec![
                TokenKind::Str,
                TokenKind::Concat,
                TokenKind::LParen,
                TokenKind::Number,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::Concat,
                TokenKind::Str,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn leading_interpolation_gets_empty_anchor_segment() {
        let t = toks("\"#{x} wide\"");
        assert_eq!(t[0].kind, TokenKind::Str);
        assert_eq!(t[0].text(), Some(""));
        assert_eq!(t[1].kind, TokenKind::Concat);
    }

    #[test]
    fn triple_quoted_string_deindents() {
        let src = "\"\"\"\n    line one\n      line two\n\"\"\"";
        let t = toks(src);
        assert_eq!(t[0].kind, TokenKind::Str);
        assert_eq!(t[0].flavor, Some(Flavor::Multi));
        assert_eq!(t[0].text(), Some("line one\n  line two"));
    }

    #[test]
    fn triple_quoted_deindent_counts_characters_not_bytes() {
        // Em-space indentation is wider in bytes than in characters.
        let src = "\"\"\"\n \u{2003}x\n  y\n\"\"\"";
        let t = toks(src);
        assert_eq!(t[0].kind, TokenKind::Str);
        assert_eq!(t[0].text(), Some("x\ny"));
    }

    #[test]
    fn balanced_markup_tag_is_one_raw_token() {
        let t = toks("<b>bold <i>both</i></b> + 1");
        assert_eq!(t[0].kind, TokenKind::Str);
        assert_eq!(t[0].flavor, Some(Flavor::Markup));
        assert_eq!(t[0].text(), Some("<b>bold <i>both</i></b>"));
        assert_eq!(t[1].kind, TokenKind::Plus);
    }

    #[test]
    fn unbalanced_angle_is_comparison() {
        assert_eq!(
            kinds("a < b"),
            vec![TokenKind::Literal, TokenKind::Lt, TokenKind::Literal, TokenKind::Eof]
        );
    }

    #[test]
    fn regex_only_when_not_division() {
        let t = toks("/ab+c/gi");
        assert_eq!(t[0].kind, TokenKind::Regex);
        let t = toks("x/2");
        assert_eq!(t[1].kind, TokenKind::Slash);
    }

    #[test]
    fn unknown_regex_flag_errors() {
        let err = scan("/a/q", &UnitRegistry::new()).unwrap_err();
        assert!(err.message.contains("unknown regex flag"));
    }

    #[test]
    fn unterminated_string_is_positioned() {
        let err = scan("x = \"oops", &UnitRegistry::new()).unwrap_err();
        assert_eq!((err.line, err.col), (1, 5));
    }

    #[test]
    fn symbols_and_dynamic_symbols() {
        let t = toks(":if :\"at runtime\"");
        assert_eq!(t[0].kind, TokenKind::Symbol);
        assert_eq!(t[0].text(), Some("if"));
        assert_eq!(t[1].kind, TokenKind::DynamicSymbol);
        assert_eq!(t[1].text(), Some("at runtime"));
    }

    #[test]
    fn interpolated_dynamic_symbol_wraps_the_whole_chain() {
        let k = kinds(":\"a#{x}b\"");
        assert_eq!(
            k,
            vec![
                TokenKind::LParen,
                TokenKind::Str,
                TokenKind::Concat,
                TokenKind::LParen,
                TokenKind::Literal,
                TokenKind::RParen,
                TokenKind::Concat,
                TokenKind::Str,
                TokenKind::RParen,
                TokenKind::Dot,
                TokenKind::Literal,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn range_vs_spread() {
        let t = toks("[1..5]");
        assert_eq!(t[2].kind, TokenKind::RangeOp);
        let t = toks("(..rest)");
        assert_eq!(t[1].kind, TokenKind::Spread);
    }

    #[test]
    fn blank_line_becomes_break() {
        let k = kinds("1\n\n2");
        assert_eq!(
            k,
            vec![TokenKind::Number, TokenKind::Eol, TokenKind::Break, TokenKind::Number, TokenKind::Eof]
        );
    }
}
