//! The Slate parser: token sequence to nested `Expr` lists.
//!
//! The parser resolves statement-mapping symbols into structured objects,
//! expands user templates mid-stream, folds `->` closures, rewrites surface
//! assignment into the canonical `:let` object, and applies the numeric
//! disambiguation rules (adjacent numbers imply addition, number-literal
//! and number-paren imply multiplication). Operators other than these stay
//! in the list for the evaluator's reduction passes.
//!
//! Parse errors abort immediately -- no partial AST is returned.

use crate::error::SlateError;
use crate::expr::{Expr, ExprValue, Param, RangeSpec, SliceSpec};
use crate::template::{spelling, TemplateRule, TemplateTable};
use crate::token::{Flavor, Token, TokenKind, TokenValue};

/// Control symbols with a fixed grammar, validated per keyword.
pub const RESERVED: &[&str] = &[
    "if", "else", "loop", "in", "match", "when", "try", "check", "rescue", "while", "do", "let",
    "import", "from", "module", "export", "template",
];

/// Parse a token sequence into statement-level expressions.
///
/// `raw` selects document mode: prose tokens pass through as text nodes and
/// stray punctuation is tolerated. Expression mode (`raw = false`) is used
/// for one-shot evaluation. `templates` is consulted and extended by
/// `:template` statements within the same pass.
pub fn parse(
    tokens: &[Token],
    raw: bool,
    templates: &mut TemplateTable,
) -> Result<Vec<Expr>, SlateError> {
    Parser { tokens, pos: 0, raw, templates }.run()
}

/// Line-oriented statement split, for one-statement-at-a-time execution.
/// Splits on EOL, paragraph breaks, and `;` at bracket depth zero; every
/// returned statement is terminated with EOF.
pub fn split(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut out: Vec<Vec<Token>> = Vec::new();
    let mut cur: Vec<Token> = Vec::new();
    let mut depth = 0i32;
    for tok in tokens {
        match tok.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                depth += 1;
                cur.push(tok.clone());
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth -= 1;
                cur.push(tok.clone());
            }
            TokenKind::Eol | TokenKind::Break | TokenKind::Semicolon if depth == 0 => {
                if !cur.is_empty() {
                    cur.push(Token::new(TokenKind::Eof, tok.line, tok.col));
                    out.push(std::mem::take(&mut cur));
                }
            }
            TokenKind::Eof => {
                if !cur.is_empty() {
                    cur.push(tok.clone());
                    out.push(std::mem::take(&mut cur));
                }
            }
            _ => cur.push(tok.clone()),
        }
    }
    out
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    raw: bool,
    templates: &'a mut TemplateTable,
}

impl<'a> Parser<'a> {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err_at(&self, tok: &Token, msg: impl Into<String>) -> SlateError {
        SlateError::parse(tok.line, tok.col, msg).with_lexeme(spelling(tok))
    }

    fn err(&self, msg: impl Into<String>) -> SlateError {
        self.err_at(self.cur(), msg)
    }

    fn run(mut self) -> Result<Vec<Expr>, SlateError> {
        let mut out = Vec::new();
        loop {
            match self.cur().kind {
                TokenKind::Eof => break,
                TokenKind::Eol | TokenKind::Break => {
                    self.advance();
                }
                _ if self.cur().is_prose() => {
                    let tok = self.advance();
                    let flavor = tok.flavor.unwrap_or(Flavor::Markup);
                    let text = tok.text().unwrap_or_default().to_string();
                    out.push(
                        Expr::new(ExprValue::Text { text, flavor }).at(tok.line, tok.col),
                    );
                }
                _ => {
                    let stmt = self.parse_statement()?;
                    if !stmt.is_empty() {
                        out.push(Expr::group(stmt));
                    }
                }
            }
        }
        Ok(out)
    }

    /// One statement: expressions up to an EOL/`;`/EOF at depth zero,
    /// template-expanded and shaped.
    fn parse_statement(&mut self) -> Result<Vec<Expr>, SlateError> {
        let mut exprs: Vec<Expr> = Vec::new();
        loop {
            let tok = self.cur();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Eol | TokenKind::Break | TokenKind::Semicolon => {
                    self.advance();
                    break;
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    return Err(self.err(format!("unmatched '{}'", spelling(tok))));
                }
                TokenKind::Symbol if exprs.is_empty() && tok.text() == Some("template") => {
                    self.parse_template_def()?;
                    return Ok(Vec::new());
                }
                _ => {
                    if !self.templates.is_empty() {
                        if let Some((len, rule)) = self.templates.matches(&self.tokens[self.pos..])
                        {
                            let rule = rule.clone();
                            self.expand_template(len, rule, &mut exprs)?;
                            continue;
                        }
                    }
                    let e = self.parse_unit()?;
                    exprs.push(e);
                }
            }
        }
        self.shape(exprs)
    }

    /// Substitute the gathered arguments into a copy of the rule body and
    /// splice it in place of the matched span.
    fn expand_template(
        &mut self,
        len: usize,
        rule: TemplateRule,
        exprs: &mut Vec<Expr>,
    ) -> Result<(), SlateError> {
        let site = self.cur().clone();
        for _ in 0..len {
            self.advance();
        }
        if exprs.len() < rule.params.len() {
            return Err(self.err_at(
                &site,
                format!(
                    "template expects {} preceding argument(s), found {}",
                    rule.params.len(),
                    exprs.len()
                ),
            ));
        }
        let args = exprs.split_off(exprs.len() - rule.params.len());
        let mut body = rule.body.clone();
        for e in &mut body {
            for (param, arg) in rule.params.iter().zip(&args) {
                e.sub(param, arg);
            }
        }
        exprs.extend(body);
        Ok(())
    }

    /// `:template <spelling tokens> (params -> body)`
    fn parse_template_def(&mut self) -> Result<(), SlateError> {
        let opening = self.advance(); // :template
        let mut spellings = Vec::new();
        while !matches!(
            self.cur().kind,
            TokenKind::LParen | TokenKind::Eof | TokenKind::Eol | TokenKind::Semicolon
        ) {
            spellings.push(spelling(&self.advance()));
        }
        if spellings.is_empty() {
            return Err(self.err_at(&opening, "':template' requires a token spelling to match"));
        }
        if self.cur().kind != TokenKind::LParen {
            return Err(self.err_at(&opening, "':template' requires a parenthesized rule"));
        }
        let block = self.parse_unit()?;
        let callable = match &block.value {
            ExprValue::Block(groups) if groups.len() == 1 && groups[0].len() == 1 => {
                groups[0][0].as_callable().cloned()
            }
            _ => None,
        };
        let Some(callable) = callable else {
            return Err(self.err_at(&opening, "':template' rule must be (params -> body)"));
        };
        self.templates.insert(
            &spellings,
            TemplateRule {
                params: callable.params.iter().map(|p| p.name.clone()).collect(),
                body: callable.body,
            },
        );
        Ok(())
    }

    /// One expression unit: a literal token or a full bracketed construct.
    fn parse_unit(&mut self) -> Result<Expr, SlateError> {
        let tok = self.cur().clone();
        let pos = (tok.line, tok.col);
        match tok.kind {
            TokenKind::Number => {
                self.advance();
                match tok.value {
                    TokenValue::Number { num, unit } => {
                        Ok(Expr::new(ExprValue::Number { num, unit }).at(pos.0, pos.1))
                    }
                    _ => Err(self.err_at(&tok, "malformed number token")),
                }
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expr::string(tok.text().unwrap_or_default()).at(pos.0, pos.1))
            }
            TokenKind::Regex => {
                self.advance();
                Ok(Expr::new(ExprValue::Regex(tok.text().unwrap_or_default().into()))
                    .at(pos.0, pos.1))
            }
            TokenKind::Symbol | TokenKind::DynamicSymbol => {
                self.advance();
                Ok(Expr::symbol(tok.text().unwrap_or_default()).at(pos.0, pos.1))
            }
            TokenKind::Literal => {
                self.advance();
                Ok(Expr::literal(tok.text().unwrap_or_default()).at(pos.0, pos.1))
            }
            TokenKind::Comment => {
                self.advance();
                Ok(Expr::new(ExprValue::Comment(tok.text().unwrap_or_default().into()))
                    .at(pos.0, pos.1))
            }
            TokenKind::Underscore => {
                self.advance();
                Ok(Expr::new(ExprValue::Hole).at(pos.0, pos.1))
            }
            TokenKind::LParen => self.parse_block(TokenKind::RParen),
            TokenKind::LBrace => self.parse_block(TokenKind::RBrace),
            TokenKind::LBracket => self.parse_bracket(),
            _ if tok.is_prose() => {
                self.advance();
                Ok(Expr::new(ExprValue::Text {
                    text: tok.text().unwrap_or_default().into(),
                    flavor: tok.flavor.unwrap_or(Flavor::Markup),
                })
                .at(pos.0, pos.1))
            }
            // Remaining kinds are operators carried through to evaluation.
            _ => {
                self.advance();
                Ok(Expr::op(tok.kind).at(pos.0, pos.1))
            }
        }
    }

    /// `( ... , ... )` or `{ ... ; ... }` -- comma/statement separated groups.
    fn parse_block(&mut self, close: TokenKind) -> Result<Expr, SlateError> {
        let open = self.advance();
        let braces = close == TokenKind::RBrace;
        let mut groups: Vec<Vec<Expr>> = Vec::new();
        let mut cur: Vec<Expr> = Vec::new();
        loop {
            let tok = self.cur();
            match tok.kind {
                TokenKind::Eof => {
                    return Err(self.err_at(&open, format!("unmatched '{}'", spelling(&open))));
                }
                k if k == close => {
                    self.advance();
                    break;
                }
                TokenKind::Comma if !braces => {
                    self.advance();
                    groups.push(std::mem::take(&mut cur));
                }
                TokenKind::Eol | TokenKind::Break | TokenKind::Semicolon => {
                    self.advance();
                    if braces && !cur.is_empty() {
                        groups.push(std::mem::take(&mut cur));
                    }
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    return Err(self.err(format!("unmatched '{}'", spelling(tok))));
                }
                _ => {
                    if !self.templates.is_empty() {
                        if let Some((len, rule)) = self.templates.matches(&self.tokens[self.pos..])
                        {
                            let rule = rule.clone();
                            self.expand_template(len, rule, &mut cur)?;
                            continue;
                        }
                    }
                    let e = self.parse_unit()?;
                    cur.push(e);
                }
            }
        }
        groups.push(cur);
        // Drop a trailing empty group from `(a, b,)` style input.
        while groups.len() > 1 && groups.last().map(Vec::is_empty).unwrap_or(false) {
            groups.pop();
        }
        let shaped: Result<Vec<Vec<Expr>>, SlateError> =
            groups.into_iter().map(|g| self.shape(g)).collect();
        Ok(Expr::block(shaped?).at(open.line, open.col))
    }

    /// `[ ... ]`: an array literal, or a range once `..` appears at top
    /// level -- `[begin .. end : length - offset : step]`.
    fn parse_bracket(&mut self) -> Result<Expr, SlateError> {
        let open = self.advance();
        let mut items: Vec<Expr> = Vec::new();
        let mut cur: Vec<Expr> = Vec::new();
        loop {
            let tok = self.cur();
            match tok.kind {
                TokenKind::Eof => return Err(self.err_at(&open, "unmatched '['")),
                TokenKind::RBracket => {
                    self.advance();
                    break;
                }
                TokenKind::RangeOp | TokenKind::Spread if items.is_empty() => {
                    self.advance();
                    let begin = Expr::group(self.shape(std::mem::take(&mut cur))?);
                    return self.parse_range(open, begin);
                }
                TokenKind::Comma => {
                    self.advance();
                    if !cur.is_empty() {
                        items.push(Expr::group(self.shape(std::mem::take(&mut cur))?));
                    }
                }
                TokenKind::Eol | TokenKind::Break => {
                    self.advance();
                }
                _ => {
                    let e = self.parse_unit()?;
                    cur.push(e);
                }
            }
        }
        if !cur.is_empty() {
            items.push(Expr::group(self.shape(cur)?));
        }
        Ok(Expr::array(items).at(open.line, open.col))
    }

    /// Remainder of a range literal after the `..`.
    fn parse_range(&mut self, open: Token, begin: Expr) -> Result<Expr, SlateError> {
        let mut end: Vec<Expr> = Vec::new();
        let mut slice_part: Vec<Expr> = Vec::new();
        let mut step_part: Vec<Expr> = Vec::new();
        let mut section = 0;
        loop {
            let tok = self.cur();
            match tok.kind {
                TokenKind::Eof => return Err(self.err_at(&open, "unmatched '['")),
                TokenKind::RBracket => {
                    self.advance();
                    break;
                }
                TokenKind::Colon => {
                    self.advance();
                    section += 1;
                    if section > 2 {
                        return Err(self.err_at(&open, "malformed range slice"));
                    }
                }
                _ => {
                    let e = self.parse_unit()?;
                    match section {
                        0 => end.push(e),
                        1 => slice_part.push(e),
                        _ => step_part.push(e),
                    }
                }
            }
        }
        if end.is_empty() {
            return Err(self.err_at(&open, "range requires an end bound"));
        }
        let end = Expr::group(self.shape(end)?);
        let slice = self.shape_slice(slice_part, &open)?;
        let step = if step_part.is_empty() {
            None
        } else {
            Some(Expr::group(self.shape(step_part)?))
        };
        Ok(Expr::range(RangeSpec { begin, end, step, slice }).at(open.line, open.col))
    }

    /// `length` or `length - offset`, both optional.
    fn shape_slice(
        &mut self,
        part: Vec<Expr>,
        open: &Token,
    ) -> Result<Option<SliceSpec>, SlateError> {
        if part.is_empty() {
            return Ok(None);
        }
        let mut split = None;
        for (i, e) in part.iter().enumerate() {
            if i > 0 && e.is_op(TokenKind::Minus) {
                split = Some(i);
                break;
            }
        }
        let (length, offset) = match split {
            Some(i) => {
                let offset = part[i + 1..].to_vec();
                let length = part[..i].to_vec();
                if offset.is_empty() {
                    return Err(self.err_at(open, "malformed range slice"));
                }
                (length, Some(offset))
            }
            None => (part, None),
        };
        Ok(Some(SliceSpec {
            length: Some(Expr::group(self.shape(length)?)),
            offset: match offset {
                Some(o) => Some(Expr::group(self.shape(o)?)),
                None => None,
            },
        }))
    }

    // ── Shaping ──────────────────────────────────────────────────

    /// Structure a flat expression group: statement mappings, assignment
    /// rewrite, closure folding, numeric disambiguation.
    fn shape(&mut self, exprs: Vec<Expr>) -> Result<Vec<Expr>, SlateError> {
        if matches!(exprs.first().map(|e| &e.value), Some(ExprValue::Symbol(_))) {
            let obj = self.build_object(exprs)?;
            return Ok(vec![obj]);
        }
        self.shape_plain(exprs)
    }

    fn shape_plain(&mut self, mut exprs: Vec<Expr>) -> Result<Vec<Expr>, SlateError> {
        // Assignment: `name = value` / `name! = value` becomes the
        // canonical `:let` object.
        if exprs.len() >= 3 {
            if let ExprValue::Literal(name) = &exprs[0].value {
                let cached = exprs[1].is_op(TokenKind::Bang);
                let assign_at = if cached { 2 } else { 1 };
                if exprs.get(assign_at).map(|e| e.is_op(TokenKind::Assign)).unwrap_or(false) {
                    let name = name.clone();
                    let (line, col) = (exprs[0].line, exprs[0].col);
                    let value = exprs.split_off(assign_at + 1);
                    if value.is_empty() {
                        return Err(SlateError::parse(line, col, "missing value after '='"));
                    }
                    let value = Expr::group(self.shape(value)?);
                    let mut pairs = vec![("let".to_string(), Expr::literal(&name))];
                    if cached {
                        pairs.push(("cached".to_string(), Expr::bool(true)));
                    }
                    pairs.push(("value".to_string(), value));
                    return Ok(vec![Expr::object(pairs).at(line, col)]);
                }
            }
        }

        // Closure folding at the first top-level arrow.
        if let Some(i) = exprs.iter().position(|e| e.is_op(TokenKind::Arrow)) {
            let body = exprs.split_off(i + 1);
            exprs.pop(); // the arrow
            let (line, col) = exprs
                .first()
                .map(|e| (e.line, e.col))
                .unwrap_or((0, 0));
            let params = self.params_from(exprs)?;
            if body.is_empty() {
                return Err(SlateError::parse(line, col, "missing closure body after '->'"));
            }
            let body = self.shape(body)?;
            return Ok(vec![Expr::callable(params, body).at(line, col)]);
        }

        // Numeric disambiguation: adjacent numbers imply addition; a number
        // immediately followed by a literal or parenthesized group implies
        // multiplication.
        let mut out: Vec<Expr> = Vec::new();
        for e in exprs {
            if let Some(prev) = out.last() {
                let prev_is_number = matches!(prev.value, ExprValue::Number { .. });
                if prev_is_number {
                    match &e.value {
                        ExprValue::Number { .. } => {
                            out.push(Expr::op(TokenKind::Plus).at(e.line, e.col))
                        }
                        ExprValue::Literal(_) | ExprValue::Block(_) => {
                            out.push(Expr::op(TokenKind::Star).at(e.line, e.col))
                        }
                        _ => {}
                    }
                }
            }
            out.push(e);
        }
        Ok(out)
    }

    /// Parameter list from the expressions preceding an arrow.
    fn params_from(&self, exprs: Vec<Expr>) -> Result<Vec<Param>, SlateError> {
        // `(a, b) -> ...` supplies a block; flatten its groups.
        let items: Vec<Expr> = match exprs.as_slice() {
            [Expr { value: ExprValue::Block(groups), .. }] => {
                groups.iter().flatten().cloned().collect()
            }
            _ => exprs,
        };
        let mut params = Vec::new();
        let mut spread = false;
        for e in items {
            match &e.value {
                ExprValue::Op(TokenKind::Spread) | ExprValue::Op(TokenKind::RangeOp) => {
                    spread = true;
                }
                ExprValue::Literal(name) => {
                    params.push(Param { name: name.clone(), spread });
                    spread = false;
                }
                ExprValue::Op(TokenKind::Comma) => {}
                _ => {
                    return Err(SlateError::parse(
                        e.line,
                        e.col,
                        format!("invalid closure parameter ({:?})", e.kind()),
                    ));
                }
            }
        }
        Ok(params)
    }

    // ── Statement mappings ───────────────────────────────────────

    /// Accumulate `:key value, :key value, ...` into an insertion-ordered
    /// object, then validate control keywords against their fixed grammar.
    fn build_object(&mut self, exprs: Vec<Expr>) -> Result<Expr, SlateError> {
        let (line, col) = exprs.first().map(|e| (e.line, e.col)).unwrap_or((0, 0));
        let mut pairs: Vec<(String, Expr)> = Vec::new();
        let mut iter = exprs.into_iter().peekable();
        while let Some(e) = iter.next() {
            let ExprValue::Symbol(key) = &e.value else {
                return Err(SlateError::parse(e.line, e.col, "expected ':key' in mapping"));
            };
            let key = key.clone();
            let key_pos = (e.line, e.col);
            let mut value: Vec<Expr> = Vec::new();
            while let Some(next) = iter.peek() {
                if matches!(next.value, ExprValue::Symbol(_)) {
                    break;
                }
                let next = iter.next().unwrap();
                // Commas separate mapping entries, not values.
                if next.is_op(TokenKind::Comma) {
                    break;
                }
                value.push(next);
            }
            let value = if key == "let" {
                self.canonical_let(value, key_pos, &mut pairs)?;
                continue;
            } else {
                let shaped = self.shape_plain(value)?;
                if shaped.is_empty() {
                    Expr::null().at(key_pos.0, key_pos.1)
                } else {
                    Expr::group(shaped)
                }
            };
            pairs.push((key, value));
        }
        validate_object(&pairs, line, col)?;
        Ok(Expr::object(pairs).at(line, col))
    }

    /// `:let name = value` (as written in source or in a template body)
    /// normalizes to the same pairs the assignment rewrite produces.
    fn canonical_let(
        &mut self,
        value: Vec<Expr>,
        pos: (u32, u32),
        pairs: &mut Vec<(String, Expr)>,
    ) -> Result<(), SlateError> {
        let shaped = self.shape_plain(value)?;
        match shaped.as_slice() {
            [Expr { value: ExprValue::Object(inner), .. }]
                if inner.iter().any(|(k, _)| k == "let") =>
            {
                pairs.extend(inner.clone());
                Ok(())
            }
            _ => Err(SlateError::parse(pos.0, pos.1, "':let' requires 'name = value'")),
        }
    }
}

/// Items of a shaped group value: a one-group block unwraps to its items.
pub fn group_items(e: &Expr) -> Vec<Expr> {
    match &e.value {
        ExprValue::Block(groups) if groups.len() == 1 => groups[0].clone(),
        _ => vec![e.clone()],
    }
}

fn validate_object(pairs: &[(String, Expr)], line: u32, col: u32) -> Result<(), SlateError> {
    let has = |k: &str| pairs.iter().any(|(key, _)| key == k);
    for (i, (key, value)) in pairs.iter().enumerate() {
        match key.as_str() {
            "if" => {
                let items = group_items(value);
                let cond_ok = matches!(items.first().map(|e| &e.value), Some(ExprValue::Block(_)));
                if !cond_ok || items.len() < 2 {
                    return Err(SlateError::parse(
                        value.line,
                        value.col,
                        "':if' requires a parenthesized condition followed by a body",
                    ));
                }
            }
            "else" => {
                let paired = pairs[..i].iter().any(|(k, _)| k == "if" || k == "when");
                if !paired {
                    return Err(SlateError::parse(line, col, "':else' without ':if' or ':when'"));
                }
            }
            "check" | "rescue" => {
                if !has("try") {
                    return Err(SlateError::parse(
                        line,
                        col,
                        format!("':{}' without ':try'", key),
                    ));
                }
            }
            "in" => {
                if !has("loop") {
                    return Err(SlateError::parse(line, col, "':in' without ':loop'"));
                }
            }
            "when" => {
                if !has("match") {
                    return Err(SlateError::parse(line, col, "':when' without ':match'"));
                }
            }
            "do" => {
                if !(has("loop") || has("while") || i + 1 < pairs.len() && pairs[i + 1].0 == "while")
                {
                    return Err(SlateError::parse(line, col, "':do' without ':while' or ':loop'"));
                }
            }
            "while" => {
                let cond_ok = matches!(value.value, ExprValue::Block(_));
                if !cond_ok {
                    return Err(SlateError::parse(
                        value.line,
                        value.col,
                        "':while' requires a parenthesized condition",
                    ));
                }
            }
            "loop" | "match" | "export" => {
                if matches!(value.value, ExprValue::Null) {
                    return Err(SlateError::parse(
                        line,
                        col,
                        format!("':{}' requires a value", key),
                    ));
                }
            }
            "from" | "module" => {
                let ok = matches!(value.value, ExprValue::Str(_) | ExprValue::Literal(_));
                if !ok {
                    return Err(SlateError::parse(
                        value.line,
                        value.col,
                        format!("':{}' requires a name or string path", key),
                    ));
                }
            }
            "import" => {
                // A bare path, or a parenthesized name list after `:from`.
                let ok = matches!(
                    value.value,
                    ExprValue::Str(_) | ExprValue::Literal(_) | ExprValue::Block(_)
                );
                if !ok {
                    return Err(SlateError::parse(
                        value.line,
                        value.col,
                        "':import' requires a name, string path, or name list",
                    ));
                }
            }
            "template" => {
                return Err(SlateError::parse(line, col, "misplaced ':template'"));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::Num;
    use crate::scanner::scan;
    use crate::units::UnitRegistry;

    fn parsed(src: &str) -> Vec<Expr> {
        let toks = scan(src, &UnitRegistry::new()).unwrap();
        let mut templates = TemplateTable::new();
        parse(&toks, true, &mut templates).unwrap()
    }

    fn parse_err(src: &str) -> SlateError {
        let toks = scan(src, &UnitRegistry::new()).unwrap();
        let mut templates = TemplateTable::new();
        parse(&toks, true, &mut templates).unwrap_err()
    }

    fn flat(src: &str) -> Vec<Expr> {
        let mut stmts = parsed(src);
        assert_eq!(stmts.len(), 1, "expected one statement");
        match stmts.pop().unwrap() {
            Expr { value: ExprValue::Block(mut groups), .. } if groups.len() == 1 => {
                groups.pop().unwrap()
            }
            e => vec![e],
        }
    }

    #[test]
    fn adjacent_numbers_imply_addition() {
        let exprs = flat("1 2 3");
        let kinds: Vec<_> = exprs.iter().map(|e| e.kind()).collect();
        assert_eq!(exprs.len(), 5);
        assert!(exprs[1].is_op(TokenKind::Plus) && exprs[3].is_op(TokenKind::Plus));
        let _ = kinds;
    }

    #[test]
    fn number_literal_implies_multiplication() {
        let exprs = flat("3x");
        assert!(exprs[1].is_op(TokenKind::Star));
        assert_eq!(exprs[2].value, ExprValue::Literal("x".into()));
        let exprs = flat("3(4)");
        assert!(exprs[1].is_op(TokenKind::Star));
        assert_eq!(exprs[2].kind(), crate::expr::ExprKind::Block);
    }

    #[test]
    fn assignment_becomes_let_object() {
        let stmts = parsed("a = 1 + 2");
        match &stmts[0].value {
            ExprValue::Object(pairs) => {
                assert_eq!(pairs[0].0, "let");
                assert_eq!(pairs[0].1.value, ExprValue::Literal("a".into()));
                assert_eq!(pairs[1].0, "value");
            }
            other => panic!("expected let object, got {:?}", other),
        }
    }

    #[test]
    fn bang_marks_cached_binding() {
        let stmts = parsed("fib! = n -> n");
        match &stmts[0].value {
            ExprValue::Object(pairs) => {
                assert!(pairs.iter().any(|(k, v)| k == "cached" && v.is_truthy()));
            }
            other => panic!("expected let object, got {:?}", other),
        }
    }

    #[test]
    fn curried_closure_folds_right() {
        let stmts = parsed("sum = a -> b -> a + b");
        let ExprValue::Object(pairs) = &stmts[0].value else { panic!() };
        let value = &pairs.iter().find(|(k, _)| k == "value").unwrap().1;
        let outer = value.as_callable().expect("outer callable");
        assert_eq!(outer.params.len(), 1);
        assert_eq!(outer.arity(), 2);
    }

    #[test]
    fn spread_parameter() {
        let stmts = parsed("collect = a, ..rest -> rest");
        let ExprValue::Object(pairs) = &stmts[0].value else { panic!() };
        let value = &pairs.iter().find(|(k, _)| k == "value").unwrap().1;
        let c = value.as_callable().unwrap();
        assert!(!c.params[0].spread);
        assert!(c.params[1].spread);
        assert_eq!(c.params[1].name, "rest");
    }

    #[test]
    fn range_with_slice_stays_lazy() {
        let stmts = parsed("[-10..10:5-3]");
        match &stmts[0].value {
            ExprValue::Range(spec) => {
                let slice = spec.slice.as_ref().expect("slice spec");
                assert!(slice.length.is_some());
                assert!(slice.offset.is_some());
                assert!(spec.step.is_none());
            }
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn statement_mapping_accumulates_in_order() {
        let stmts = parsed(":if (1) (2) :else (3)");
        match &stmts[0].value {
            ExprValue::Object(pairs) => {
                assert_eq!(pairs[0].0, "if");
                assert_eq!(pairs[1].0, "else");
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn else_without_if_is_rejected() {
        let err = parse_err(":else (1)");
        assert!(err.message.contains("':else' without"));
    }

    #[test]
    fn if_requires_parenthesized_condition() {
        let err = parse_err(":if 1 (2)");
        assert!(err.message.contains("parenthesized condition"));
    }

    #[test]
    fn unmatched_brackets_are_positioned() {
        let err = parse_err("f(1, 2");
        assert!(err.message.contains("unmatched '('"));
        assert_eq!(err.line, 1);
        assert_eq!(err.col, 2);
        let err = parse_err("1 + 2)");
        assert!(err.message.contains("unmatched ')'"));
    }

    #[test]
    fn template_expansion_matches_inlined_form() {
        let by_macro = parsed(":template ++ (a -> :let a = a + 1)\nx++");
        let by_hand = parsed(":let x = x + 1");
        assert_eq!(by_macro, by_hand);
    }

    #[test]
    fn split_is_line_oriented_and_depth_aware() {
        let toks = scan("a = 1; b = (2,\n3)\nc", &UnitRegistry::new()).unwrap();
        let stmts = split(&toks);
        assert_eq!(stmts.len(), 3);
        assert!(stmts.iter().all(|s| s.last().unwrap().kind == TokenKind::Eof));
    }

    #[test]
    fn prose_passes_through_in_document_mode() {
        let stmts = parsed("# Title\n1 + 2");
        assert!(matches!(stmts[0].value, ExprValue::Text { .. }));
    }

    #[test]
    fn serialized_ast_is_golden_testable() {
        let stmts = parsed("1 + 2");
        let json = serde_json::to_value(&stmts).unwrap();
        assert!(json.is_array());
    }

    #[test]
    fn number_unit_survives_to_expr() {
        let mut reg = UnitRegistry::new();
        reg.register(|v, u| {
            (u == "cm").then(|| crate::units::UnitValue { value: v, unit: u.into() })
        });
        let toks = scan("2cm", &reg).unwrap();
        let mut templates = TemplateTable::new();
        let stmts = parse(&toks, true, &mut templates).unwrap();
        assert_eq!(
            stmts[0].value,
            ExprValue::Number { num: Num::Int(2), unit: Some("cm".into()) }
        );
    }
}
