use crate::ast::{
    BinOp, Block, CondClause, Expr, ExprKind, ExprRef, FuncBody, FuncName, Indexer, Name, Stmt, StmtKind, TableItem,
    UnOp,
};
use crate::range::Range;
use crate::token::{Token, Tokenizer};
use anyhow::{anyhow, Result};
use std::sync::Arc;

/// Parse `code` into a chunk with node ranges derived from token ranges.
pub fn parse_chunk(code: &str) -> Result<Block> {
    let (tokens, ranges) = Tokenizer::tokenize_with_ranges(code).map_err(anyhow::Error::new)?;
    let mut parser = Parser::new(&tokens, &ranges);
    let mut block = parser.parse_block()?;
    if !parser.eof() {
        return Err(parser.err("unexpected token after chunk"));
    }
    block.range = Range::new(0, code.chars().count());
    Ok(block)
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    ranges: &'a [Range],
    pos: usize,
    len: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], ranges: &'a [Range]) -> Self {
        Self {
            tokens,
            ranges,
            pos: 0,
            len: tokens.len(),
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.len
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn check(&self, t: &Token) -> bool {
        self.peek() == Some(t)
    }

    fn accept(&mut self, t: &Token) -> bool {
        if self.check(t) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, t: &Token) -> Result<()> {
        if self.accept(t) {
            Ok(())
        } else {
            Err(self.err(&format!("expected {:?}", t)))
        }
    }

    /// Offset where the current token starts; end of input at eof.
    fn begin(&self) -> usize {
        match self.ranges.get(self.pos) {
            Some(r) => r.begin,
            None => self.prev_end(),
        }
    }

    /// Offset just past the most recently consumed token.
    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            return 0;
        }
        match self.ranges.get(self.pos - 1) {
            Some(r) => r.end,
            None => 0,
        }
    }

    fn range_from(&self, start: usize) -> Range {
        Range::new(start, self.prev_end().max(start))
    }

    fn err(&self, msg: &str) -> anyhow::Error {
        match (self.peek(), self.ranges.get(self.pos)) {
            (Some(tok), Some(at)) => anyhow!("{} near {:?} at {}", msg, tok, at),
            _ => anyhow!("{} near <eof>", msg),
        }
    }

    fn name(&mut self) -> Result<Name> {
        let start = self.begin();
        match self.peek() {
            Some(Token::Name(n)) => {
                let name = n.clone();
                self.advance();
                Ok(Name {
                    name,
                    range: self.range_from(start),
                })
            }
            _ => Err(self.err("expected a name")),
        }
    }

    fn is_block_end(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::End) | Some(Token::Else) | Some(Token::Elseif) | Some(Token::Until)
        )
    }

    // ---------------- statements ----------------

    fn parse_block(&mut self) -> Result<Block> {
        let start = self.begin();
        let mut stmts = Vec::new();
        loop {
            while self.accept(&Token::Semicolon) {}
            if self.is_block_end() {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(Block {
            stmts,
            range: self.range_from(start),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let start = self.begin();
        let kind = match self.peek() {
            Some(Token::Local) => self.parse_local()?,
            Some(Token::If) => self.parse_if()?,
            Some(Token::While) => self.parse_while()?,
            Some(Token::Repeat) => self.parse_repeat()?,
            Some(Token::Do) => {
                self.advance();
                let body = self.parse_block()?;
                self.expect(&Token::End)?;
                StmtKind::Do { body }
            }
            Some(Token::For) => self.parse_for()?,
            Some(Token::Function) => {
                let fstart = self.begin();
                self.advance();
                let name = self.parse_funcname()?;
                let body = self.parse_funcbody(fstart)?;
                StmtKind::Function {
                    name,
                    local: false,
                    body,
                }
            }
            Some(Token::Return) => {
                self.advance();
                let exprs = if self.is_block_end() || self.check(&Token::Semicolon) {
                    Vec::new()
                } else {
                    self.parse_exprlist()?
                };
                StmtKind::Return { exprs }
            }
            Some(Token::Break) => {
                self.advance();
                StmtKind::Break
            }
            Some(_) => self.parse_expr_statement()?,
            None => return Err(self.err("expected a statement")),
        };
        Ok(Stmt {
            kind,
            range: self.range_from(start),
        })
    }

    fn parse_local(&mut self) -> Result<StmtKind> {
        self.expect(&Token::Local)?;
        if self.check(&Token::Function) {
            let fstart = self.begin();
            self.advance();
            let name = self.name()?;
            let body = self.parse_funcbody(fstart)?;
            return Ok(StmtKind::Function {
                name: FuncName {
                    segments: vec![name],
                    is_method: false,
                },
                local: true,
                body,
            });
        }
        let mut names = vec![self.name()?];
        while self.accept(&Token::Comma) {
            names.push(self.name()?);
        }
        let exprs = if self.accept(&Token::Assign) {
            self.parse_exprlist()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::Local { names, exprs })
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        let mut clauses = Vec::new();
        let mut clause_start = self.begin();
        self.expect(&Token::If)?;
        loop {
            let cond = self.parse_expr()?;
            self.expect(&Token::Then)?;
            let body = self.parse_block()?;
            clauses.push(CondClause {
                cond,
                body,
                range: self.range_from(clause_start),
            });
            clause_start = self.begin();
            if !self.accept(&Token::Elseif) {
                break;
            }
        }
        let else_block = if self.accept(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        self.expect(&Token::End)?;
        Ok(StmtKind::If { clauses, else_block })
    }

    fn parse_while(&mut self) -> Result<StmtKind> {
        self.expect(&Token::While)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::Do)?;
        let body = self.parse_block()?;
        self.expect(&Token::End)?;
        Ok(StmtKind::While { cond, body })
    }

    fn parse_repeat(&mut self) -> Result<StmtKind> {
        self.expect(&Token::Repeat)?;
        let body = self.parse_block()?;
        self.expect(&Token::Until)?;
        let cond = self.parse_expr()?;
        Ok(StmtKind::Repeat { body, cond })
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.expect(&Token::For)?;
        let first = self.name()?;
        if self.accept(&Token::Assign) {
            let from = self.parse_expr()?;
            self.expect(&Token::Comma)?;
            let to = self.parse_expr()?;
            let step = if self.accept(&Token::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(&Token::Do)?;
            let body = self.parse_block()?;
            self.expect(&Token::End)?;
            return Ok(StmtKind::NumericFor {
                var: first,
                from,
                to,
                step,
                body,
            });
        }
        let mut vars = vec![first];
        while self.accept(&Token::Comma) {
            vars.push(self.name()?);
        }
        self.expect(&Token::In)?;
        let exprs = self.parse_exprlist()?;
        self.expect(&Token::Do)?;
        let body = self.parse_block()?;
        self.expect(&Token::End)?;
        Ok(StmtKind::GenericFor { vars, exprs, body })
    }

    fn parse_funcname(&mut self) -> Result<FuncName> {
        let mut segments = vec![self.name()?];
        let mut is_method = false;
        loop {
            if self.accept(&Token::Dot) {
                segments.push(self.name()?);
            } else if self.accept(&Token::Colon) {
                segments.push(self.name()?);
                is_method = true;
                break;
            } else {
                break;
            }
        }
        Ok(FuncName { segments, is_method })
    }

    /// Parameter list and body; `start` is the offset of the `function`
    /// keyword so the returned range spans `function` through `end`.
    fn parse_funcbody(&mut self, start: usize) -> Result<FuncBody> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if !self.check(&Token::RParen) {
            loop {
                if self.accept(&Token::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.name()?);
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let block = self.parse_block()?;
        self.expect(&Token::End)?;
        Ok(FuncBody {
            params,
            is_vararg,
            block,
            range: self.range_from(start),
        })
    }

    fn parse_expr_statement(&mut self) -> Result<StmtKind> {
        let first = self.parse_suffixed()?;
        if self.check(&Token::Assign) || self.check(&Token::Comma) {
            let mut targets = vec![first];
            while self.accept(&Token::Comma) {
                targets.push(self.parse_suffixed()?);
            }
            self.expect(&Token::Assign)?;
            let exprs = self.parse_exprlist()?;
            return Ok(StmtKind::Assign { targets, exprs });
        }
        if first.kind.is_call() {
            return Ok(StmtKind::Call(first));
        }
        Err(self.err("syntax error: expression is not a statement"))
    }

    // ---------------- expressions ----------------

    fn parse_exprlist(&mut self) -> Result<Vec<ExprRef>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.accept(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<ExprRef> {
        self.parse_or_expr()
    }

    fn mk(&self, kind: ExprKind, start: usize) -> ExprRef {
        Arc::new(Expr {
            kind,
            range: self.range_from(start),
        })
    }

    fn parse_or_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let mut lhs = self.parse_and_expr()?;
        while self.accept(&Token::Or) {
            let rhs = self.parse_and_expr()?;
            lhs = self.mk(ExprKind::Binary { op: BinOp::Or, lhs, rhs }, start);
        }
        Ok(lhs)
    }

    fn parse_and_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let mut lhs = self.parse_cmp_expr()?;
        while self.accept(&Token::And) {
            let rhs = self.parse_cmp_expr()?;
            lhs = self.mk(ExprKind::Binary { op: BinOp::And, lhs, rhs }, start);
        }
        Ok(lhs)
    }

    fn parse_cmp_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let mut lhs = self.parse_concat_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_concat_expr()?;
            lhs = self.mk(ExprKind::Binary { op, lhs, rhs }, start);
        }
        Ok(lhs)
    }

    /// `..` is right-associative.
    fn parse_concat_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let lhs = self.parse_additive_expr()?;
        if self.accept(&Token::Concat) {
            let rhs = self.parse_concat_expr()?;
            return Ok(self.mk(
                ExprKind::Binary {
                    op: BinOp::Concat,
                    lhs,
                    rhs,
                },
                start,
            ));
        }
        Ok(lhs)
    }

    fn parse_additive_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let mut lhs = self.parse_multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative_expr()?;
            lhs = self.mk(ExprKind::Binary { op, lhs, rhs }, start);
        }
        Ok(lhs)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let mut lhs = self.parse_unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary_expr()?;
            lhs = self.mk(ExprKind::Binary { op, lhs, rhs }, start);
        }
        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let op = match self.peek() {
            Some(Token::Not) => Some(UnOp::Not),
            Some(Token::Minus) => Some(UnOp::Neg),
            Some(Token::Hash) => Some(UnOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.parse_unary_expr()?;
            return Ok(self.mk(ExprKind::Unary { op, expr }, start));
        }
        self.parse_pow_expr()
    }

    /// `^` is right-associative and binds tighter than unary on the left.
    fn parse_pow_expr(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let base = self.parse_suffixed()?;
        if self.accept(&Token::Caret) {
            let rhs = self.parse_unary_expr()?;
            return Ok(self.mk(
                ExprKind::Binary {
                    op: BinOp::Pow,
                    lhs: base,
                    rhs,
                },
                start,
            ));
        }
        Ok(base)
    }

    fn parse_suffixed(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let name = self.name()?;
                    expr = self.mk(
                        ExprKind::Member {
                            base: expr,
                            indexer: Indexer::Dot,
                            name,
                        },
                        start,
                    );
                }
                Some(Token::Colon) => {
                    self.advance();
                    let name = self.name()?;
                    expr = self.mk(
                        ExprKind::Member {
                            base: expr,
                            indexer: Indexer::Colon,
                            name,
                        },
                        start,
                    );
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    expr = self.mk(ExprKind::Index { base: expr, index }, start);
                }
                Some(Token::LParen) => {
                    self.advance();
                    let args = if self.check(&Token::RParen) {
                        Vec::new()
                    } else {
                        self.parse_exprlist()?
                    };
                    self.expect(&Token::RParen)?;
                    expr = self.mk(ExprKind::Call { callee: expr, args }, start);
                }
                Some(Token::Str(s)) => {
                    let s = s.clone();
                    let arg_start = self.begin();
                    let arg = self.mk_leaf(ExprKind::Str(s), arg_start);
                    expr = self.mk(ExprKind::StringCall { callee: expr, arg }, start);
                }
                Some(Token::LBrace) => {
                    let arg = self.parse_table()?;
                    expr = self.mk(ExprKind::TableCall { callee: expr, arg }, start);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Build a single-token leaf node and consume the token.
    fn mk_leaf(&mut self, kind: ExprKind, start: usize) -> ExprRef {
        self.advance();
        self.mk(kind, start)
    }

    fn parse_primary(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        match self.peek() {
            Some(Token::Nil) => Ok(self.mk_leaf(ExprKind::Nil, start)),
            Some(Token::True) => Ok(self.mk_leaf(ExprKind::True, start)),
            Some(Token::False) => Ok(self.mk_leaf(ExprKind::False, start)),
            Some(Token::Ellipsis) => Ok(self.mk_leaf(ExprKind::Vararg, start)),
            Some(Token::Number(n)) => {
                let n = *n;
                Ok(self.mk_leaf(ExprKind::Number(n), start))
            }
            Some(Token::Str(s)) => {
                let s = s.clone();
                Ok(self.mk_leaf(ExprKind::Str(s), start))
            }
            Some(Token::Name(n)) => {
                let n = n.clone();
                Ok(self.mk_leaf(ExprKind::Name(n), start))
            }
            Some(Token::Function) => {
                self.advance();
                let body = self.parse_funcbody(start)?;
                Ok(self.mk(ExprKind::Function(body), start))
            }
            Some(Token::LBrace) => self.parse_table(),
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            _ => Err(self.err("unexpected symbol in expression")),
        }
    }

    fn parse_table(&mut self) -> Result<ExprRef> {
        let start = self.begin();
        self.expect(&Token::LBrace)?;
        let mut items = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eof() {
                return Err(self.err("unfinished table constructor"));
            }
            let item = match (self.peek(), self.peek_at(1)) {
                (Some(Token::LBracket), _) => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(&Token::RBracket)?;
                    self.expect(&Token::Assign)?;
                    let value = self.parse_expr()?;
                    TableItem::Bracket { key, value }
                }
                (Some(Token::Name(_)), Some(Token::Assign)) => {
                    let key = self.name()?;
                    self.expect(&Token::Assign)?;
                    let value = self.parse_expr()?;
                    TableItem::Named { key, value }
                }
                _ => TableItem::Item(self.parse_expr()?),
            };
            items.push(item);
            if !self.accept(&Token::Comma) && !self.accept(&Token::Semicolon) {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(self.mk(ExprKind::Table(items), start))
    }
}
