//! Recursive-descent Cypher parser. One-token lookahead; entry point
//! returns a single `Query` (a chain of `UNION`-linked queries is just a
//! `Query` whose `union_next` points at the next branch).

use std::collections::HashMap;

use super::ast::*;
use super::lexer::{Token, TokenKind};
use crate::{Error, Result};

pub fn parse_statement(tokens: &[Token]) -> Result<Query> {
    let mut p = Parser { tokens, pos: 0 };
    let query = p.parse_query()?;
    p.expect(TokenKind::Eof)?;
    Ok(query)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek().clone();
            Err(self.err(format!("expected {kind:?}, found {:?} ('{}')", tok.kind, tok.text)))
        }
    }

    fn err(&self, message: String) -> Error {
        let span = self.peek().span;
        Error::ParseError { line: span.line, column: span.column, message }
    }

    // ========================================================================
    // Query: MATCH* WHERE? UNWIND? CREATE? MERGE? SET? REMOVE? DELETE? RETURN?
    //        ORDER BY? SKIP? LIMIT? (UNION [ALL] Query)?
    // ========================================================================

    fn parse_query(&mut self) -> Result<Query> {
        let mut q = Query::default();

        loop {
            match self.peek_kind() {
                TokenKind::Match => {
                    q.matches.push(self.parse_match_clause(false)?);
                    self.fold_where(&mut q)?;
                }
                TokenKind::Optional => {
                    self.advance();
                    self.expect(TokenKind::Match)?;
                    q.matches.push(self.parse_match_clause(true)?);
                    self.fold_where(&mut q)?;
                }
                TokenKind::Unwind => {
                    q.unwind = Some(self.parse_unwind_clause()?);
                }
                TokenKind::Create => {
                    q.create = Some(self.parse_create_clause()?);
                }
                TokenKind::Merge => {
                    q.merge = Some(self.parse_merge_clause()?);
                }
                TokenKind::Set => {
                    q.set = Some(self.parse_set_clause()?);
                }
                TokenKind::Remove => {
                    q.remove = Some(self.parse_remove_clause()?);
                }
                TokenKind::Delete => {
                    q.delete = Some(self.parse_delete_clause(false)?);
                }
                TokenKind::Detach => {
                    self.advance();
                    self.expect(TokenKind::Delete)?;
                    q.delete = Some(self.parse_delete_clause(true)?);
                }
                _ => break,
            }
        }

        if self.at(TokenKind::Return) {
            q.return_clause = Some(self.parse_return_clause()?);
            if self.at(TokenKind::Order) {
                q.order_by = Some(self.parse_order_by()?);
            }
            if self.eat(TokenKind::Skip) {
                q.skip = Some(self.parse_expr()?);
            }
            if self.eat(TokenKind::Limit) {
                q.limit = Some(self.parse_expr()?);
            }
        }

        if self.eat(TokenKind::Union) {
            let union_type = if self.eat(TokenKind::All) { UnionType::UnionAll } else { UnionType::Union };
            q.union = Some(union_type);
            q.union_next = Some(Box::new(self.parse_query()?));
        }

        if q.matches.is_empty()
            && q.unwind.is_none()
            && q.create.is_none()
            && q.merge.is_none()
            && q.set.is_none()
            && q.remove.is_none()
            && q.delete.is_none()
            && q.return_clause.is_none()
        {
            return Err(self.err("expected a query clause".into()));
        }

        Ok(q)
    }

    fn fold_where(&mut self, q: &mut Query) -> Result<()> {
        if self.eat(TokenKind::Where) {
            let w = self.parse_expr()?;
            q.where_clause = Some(match q.where_clause.take() {
                Some(existing) => Expr::BinaryOp { left: Box::new(existing), op: BinaryOp::And, right: Box::new(w) },
                None => w,
            });
        }
        Ok(())
    }

    fn parse_unwind_clause(&mut self) -> Result<UnwindClause> {
        self.expect(TokenKind::Unwind)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::As)?;
        let alias = self.parse_identifier()?;
        Ok(UnwindClause { expr, alias })
    }

    fn parse_create_clause(&mut self) -> Result<CreateClause> {
        self.expect(TokenKind::Create)?;
        let patterns = self.parse_pattern_list()?;
        Ok(CreateClause { patterns })
    }

    fn parse_merge_clause(&mut self) -> Result<MergeClause> {
        self.expect(TokenKind::Merge)?;
        let pattern = self.parse_pattern()?;
        let mut on_create = Vec::new();
        let mut on_match = Vec::new();
        while self.at(TokenKind::On) {
            self.advance();
            let ident = self.expect(TokenKind::Identifier)?.text.to_ascii_uppercase();
            self.expect(TokenKind::Set)?;
            let items = self.parse_set_items()?;
            match ident.as_str() {
                "CREATE" => on_create.extend(items),
                "MATCH" => on_match.extend(items),
                other => return Err(self.err(format!("expected ON CREATE or ON MATCH, found ON {other}"))),
            }
        }
        Ok(MergeClause { pattern, on_create, on_match })
    }

    fn parse_set_clause(&mut self) -> Result<SetClause> {
        self.expect(TokenKind::Set)?;
        Ok(SetClause { items: self.parse_set_items()? })
    }

    fn parse_set_items(&mut self) -> Result<Vec<SetItem>> {
        let mut items = vec![self.parse_set_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_set_item()?);
        }
        Ok(items)
    }

    fn parse_set_item(&mut self) -> Result<SetItem> {
        let variable = self.parse_identifier()?;
        if self.eat(TokenKind::Dot) {
            let key = self.parse_identifier()?;
            self.expect(TokenKind::Eq)?;
            let value = self.parse_expr()?;
            Ok(SetItem::Property { variable, key, value })
        } else if self.eat(TokenKind::PlusEq) {
            let properties = self.parse_map_literal_inner()?;
            Ok(SetItem::MergeProperties { variable, properties })
        } else if self.eat(TokenKind::Eq) {
            let properties = self.parse_map_literal_inner()?;
            Ok(SetItem::AllProperties { variable, properties })
        } else if self.eat(TokenKind::Colon) {
            let label = self.parse_identifier()?;
            Ok(SetItem::Label { variable, label })
        } else {
            Err(self.err("expected '.', ':', '=' or '+=' after SET variable".into()))
        }
    }

    fn parse_remove_clause(&mut self) -> Result<RemoveClause> {
        self.expect(TokenKind::Remove)?;
        let mut items = vec![self.parse_remove_item()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_remove_item()?);
        }
        Ok(RemoveClause { items })
    }

    fn parse_remove_item(&mut self) -> Result<RemoveItem> {
        let variable = self.parse_identifier()?;
        if self.eat(TokenKind::Dot) {
            let key = self.parse_identifier()?;
            Ok(RemoveItem::Property { variable, key })
        } else if self.eat(TokenKind::Colon) {
            let label = self.parse_identifier()?;
            Ok(RemoveItem::Label { variable, label })
        } else {
            Err(self.err("expected '.' or ':' after REMOVE variable".into()))
        }
    }

    fn parse_delete_clause(&mut self, detach: bool) -> Result<DeleteClause> {
        self.expect(TokenKind::Delete)?;
        let mut variables = vec![self.parse_identifier()?];
        while self.eat(TokenKind::Comma) {
            variables.push(self.parse_identifier()?);
        }
        Ok(DeleteClause { variables, detach })
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    fn parse_pattern_list(&mut self) -> Result<Vec<Pattern>> {
        let mut patterns = vec![self.parse_pattern()?];
        while self.eat(TokenKind::Comma) {
            patterns.push(self.parse_pattern()?);
        }
        Ok(patterns)
    }

    fn parse_pattern(&mut self) -> Result<Pattern> {
        let mut elements = vec![PatternElement::Node(self.parse_node_pattern()?)];
        while self.at(TokenKind::Dash) || self.at(TokenKind::LeftArrow) {
            elements.push(PatternElement::Relationship(self.parse_rel_pattern()?));
            elements.push(PatternElement::Node(self.parse_node_pattern()?));
        }
        Ok(Pattern { elements })
    }

    fn parse_node_pattern(&mut self) -> Result<NodePattern> {
        self.expect(TokenKind::LParen)?;
        let alias = if self.at(TokenKind::Identifier) {
            Some(self.parse_identifier()?)
        } else {
            None
        };
        let mut labels = Vec::new();
        while self.eat(TokenKind::Colon) {
            labels.push(self.parse_identifier()?);
        }
        let properties = if self.at(TokenKind::LBrace) {
            self.parse_map_literal_inner()?
        } else {
            HashMap::new()
        };
        self.expect(TokenKind::RParen)?;
        Ok(NodePattern { alias, labels, properties })
    }

    fn parse_rel_pattern(&mut self) -> Result<RelPattern> {
        let left_arrow = self.eat(TokenKind::LeftArrow);
        if !left_arrow {
            self.expect(TokenKind::Dash)?;
        }

        let mut alias = None;
        let mut rel_types = Vec::new();
        let mut properties = HashMap::new();
        let mut var_length = None;

        if self.eat(TokenKind::LBracket) {
            if self.at(TokenKind::Identifier) {
                alias = Some(self.parse_identifier()?);
            }
            if self.eat(TokenKind::Colon) {
                rel_types.push(self.parse_identifier()?);
                while self.eat(TokenKind::Pipe) {
                    self.eat(TokenKind::Colon);
                    rel_types.push(self.parse_identifier()?);
                }
            }
            if self.eat(TokenKind::Star) {
                var_length = Some(self.parse_var_length()?);
            }
            if self.at(TokenKind::LBrace) {
                properties = self.parse_map_literal_inner()?;
            }
            self.expect(TokenKind::RBracket)?;
        }

        let direction = if left_arrow {
            PatternDirection::Left
        } else if self.eat(TokenKind::Arrow) {
            PatternDirection::Right
        } else {
            self.expect(TokenKind::Dash)?;
            PatternDirection::Both
        };

        Ok(RelPattern { alias, rel_types, direction, properties, var_length })
    }

    /// Parses what follows a `*` in a relationship pattern: `*`, `*n`, or
    /// `*min..max` with either bound optionally omitted.
    fn parse_var_length(&mut self) -> Result<VarLength> {
        if !self.at(TokenKind::Integer) && !self.at(TokenKind::DotDot) {
            return Ok(VarLength { min: None, max: None });
        }
        let min = if self.at(TokenKind::Integer) {
            Some(self.parse_usize_literal()?)
        } else {
            None
        };
        if self.eat(TokenKind::DotDot) {
            let max = if self.at(TokenKind::Integer) {
                Some(self.parse_usize_literal()?)
            } else {
                None
            };
            Ok(VarLength { min, max })
        } else {
            Ok(VarLength { min, max: min })
        }
    }

    fn parse_usize_literal(&mut self) -> Result<usize> {
        let tok = self.expect(TokenKind::Integer)?;
        tok.text.parse::<usize>().map_err(|_| self.err(format!("invalid integer '{}'", tok.text)))
    }

    fn parse_map_literal_inner(&mut self) -> Result<HashMap<String, Expr>> {
        self.expect(TokenKind::LBrace)?;
        let mut map = HashMap::new();
        if !self.at(TokenKind::RBrace) {
            loop {
                let key = self.parse_identifier()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_expr()?;
                map.insert(key, value);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(map)
    }

    fn parse_match_clause(&mut self, optional: bool) -> Result<MatchClause> {
        self.expect(TokenKind::Match)?;
        let patterns = self.parse_pattern_list()?;
        Ok(MatchClause { optional, patterns })
    }

    fn parse_identifier(&mut self) -> Result<String> {
        Ok(self.expect(TokenKind::Identifier)?.text.clone())
    }

    // ========================================================================
    // RETURN / ORDER BY
    // ========================================================================

    fn parse_return_clause(&mut self) -> Result<ReturnClause> {
        self.expect(TokenKind::Return)?;
        let distinct = self.eat(TokenKind::Distinct);
        let items = if self.eat(TokenKind::Star) {
            vec![ReturnItem { expr: Expr::Star, alias: None }]
        } else {
            let mut items = vec![self.parse_return_item()?];
            while self.eat(TokenKind::Comma) {
                items.push(self.parse_return_item()?);
            }
            items
        };
        Ok(ReturnClause { distinct, items })
    }

    fn parse_return_item(&mut self) -> Result<ReturnItem> {
        let expr = self.parse_expr()?;
        let alias = if self.eat(TokenKind::As) {
            Some(self.parse_identifier()?)
        } else {
            None
        };
        Ok(ReturnItem { expr, alias })
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderExpr>> {
        self.expect(TokenKind::Order)?;
        self.expect(TokenKind::By)?;
        let mut items = vec![self.parse_order_expr()?];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_order_expr()?);
        }
        Ok(items)
    }

    fn parse_order_expr(&mut self) -> Result<OrderExpr> {
        let expr = self.parse_expr()?;
        let ascending = if self.eat(TokenKind::Desc) {
            false
        } else {
            self.eat(TokenKind::Asc);
            true
        };
        Ok(OrderExpr { expr, ascending })
    }

    // ========================================================================
    // Expressions — precedence climbing, lowest to highest:
    // OR, XOR, AND, NOT, comparison, additive, multiplicative, power, unary,
    // property-access, primary.
    // ========================================================================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_xor_expr()?;
        while self.eat(TokenKind::Or) {
            let right = self.parse_xor_expr()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_xor_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expr()?;
        while self.eat(TokenKind::Xor) {
            let right = self.parse_and_expr()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Xor, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_not_expr()?;
        while self.eat(TokenKind::And) {
            let right = self.parse_not_expr()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr> {
        if self.eat(TokenKind::Not) {
            let expr = self.parse_not_expr()?;
            Ok(Expr::UnaryOp { op: UnaryOp::Not, expr: Box::new(expr) })
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            match self.peek_kind() {
                TokenKind::Eq => { self.advance(); let r = self.parse_additive()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Eq, right: Box::new(r) }; }
                TokenKind::Neq => { self.advance(); let r = self.parse_additive()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Neq, right: Box::new(r) }; }
                TokenKind::Lt => { self.advance(); let r = self.parse_additive()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Lt, right: Box::new(r) }; }
                TokenKind::Lte => { self.advance(); let r = self.parse_additive()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Lte, right: Box::new(r) }; }
                TokenKind::Gt => { self.advance(); let r = self.parse_additive()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Gt, right: Box::new(r) }; }
                TokenKind::Gte => { self.advance(); let r = self.parse_additive()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Gte, right: Box::new(r) }; }
                TokenKind::In => { self.advance(); let list = self.parse_additive()?; left = Expr::In { expr: Box::new(left), list: Box::new(list) }; }
                TokenKind::Is => {
                    self.advance();
                    let negated = self.eat(TokenKind::Not);
                    self.expect(TokenKind::Null)?;
                    left = Expr::IsNull { expr: Box::new(left), negated };
                }
                TokenKind::StartsWith => { self.advance(); let r = self.parse_additive()?; left = Expr::StringOp { left: Box::new(left), op: StringOp::StartsWith, right: Box::new(r) }; }
                TokenKind::EndsWith => { self.advance(); let r = self.parse_additive()?; left = Expr::StringOp { left: Box::new(left), op: StringOp::EndsWith, right: Box::new(r) }; }
                TokenKind::Contains => { self.advance(); let r = self.parse_additive()?; left = Expr::StringOp { left: Box::new(left), op: StringOp::Contains, right: Box::new(r) }; }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            match self.peek_kind() {
                TokenKind::Plus => { self.advance(); let r = self.parse_multiplicative()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Add, right: Box::new(r) }; }
                TokenKind::Dash => { self.advance(); let r = self.parse_multiplicative()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Sub, right: Box::new(r) }; }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_power()?;
        loop {
            match self.peek_kind() {
                TokenKind::Star => { self.advance(); let r = self.parse_power()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Mul, right: Box::new(r) }; }
                TokenKind::Slash => { self.advance(); let r = self.parse_power()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Div, right: Box::new(r) }; }
                TokenKind::Percent => { self.advance(); let r = self.parse_power()?; left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Mod, right: Box::new(r) }; }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_unary()?;
        if self.eat(TokenKind::Caret) {
            let exp = self.parse_power()?; // right-associative
            Ok(Expr::BinaryOp { left: Box::new(base), op: BinaryOp::Pow, right: Box::new(exp) })
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(TokenKind::Dash) {
            let expr = self.parse_unary()?;
            Ok(Expr::UnaryOp { op: UnaryOp::Negate, expr: Box::new(expr) })
        } else {
            self.parse_property_access()
        }
    }

    fn parse_property_access(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(TokenKind::Dot) {
                let key = self.parse_identifier()?;
                expr = Expr::Property { expr: Box::new(expr), key };
            } else if self.at(TokenKind::Colon) {
                // Label-check only applies to a bare variable reference; in
                // any other context (e.g. a map-literal key) leave the colon
                // for the caller.
                let save = self.pos;
                self.advance();
                if self.at(TokenKind::Identifier) {
                    let label = self.parse_identifier()?;
                    expr = Expr::HasLabel { expr: Box::new(expr), label };
                } else {
                    self.pos = save;
                    break;
                }
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek_kind() {
            TokenKind::Integer => {
                let tok = self.advance().clone();
                let n: i64 = tok.text.parse().map_err(|_| self.err(format!("invalid integer '{}'", tok.text)))?;
                Ok(Expr::Literal(Literal::Int(n)))
            }
            TokenKind::Float => {
                let tok = self.advance().clone();
                let f: f64 = tok.text.parse().map_err(|_| self.err(format!("invalid float '{}'", tok.text)))?;
                Ok(Expr::Literal(Literal::Float(f)))
            }
            TokenKind::StringLiteral => {
                let tok = self.advance().clone();
                Ok(Expr::Literal(Literal::String(tok.text)))
            }
            TokenKind::True => { self.advance(); Ok(Expr::Literal(Literal::Bool(true))) }
            TokenKind::False => { self.advance(); Ok(Expr::Literal(Literal::Bool(false))) }
            TokenKind::Null => { self.advance(); Ok(Expr::Literal(Literal::Null)) }
            TokenKind::Parameter => {
                let tok = self.advance().clone();
                Ok(Expr::Parameter(tok.text))
            }
            TokenKind::Star => { self.advance(); Ok(Expr::Star) }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.at(TokenKind::RBracket) {
                    items.push(self.parse_expr()?);
                    while self.eat(TokenKind::Comma) {
                        items.push(self.parse_expr()?);
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::Case => self.parse_case_expr(),
            TokenKind::Identifier => self.parse_ident_or_call(),
            _ => {
                let tok = self.peek().clone();
                Err(self.err(format!("unexpected token {:?} ('{}')", tok.kind, tok.text)))
            }
        }
    }

    fn parse_case_expr(&mut self) -> Result<Expr> {
        self.expect(TokenKind::Case)?;
        let operand = if !self.at(TokenKind::When) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        let mut whens = Vec::new();
        while self.eat(TokenKind::When) {
            let cond = self.parse_expr()?;
            self.expect(TokenKind::Then)?;
            let result = self.parse_expr()?;
            whens.push((cond, result));
        }
        let else_expr = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect(TokenKind::End)?;
        Ok(Expr::Case { operand, whens, else_expr })
    }

    fn parse_ident_or_call(&mut self) -> Result<Expr> {
        let name = self.parse_identifier()?;
        if self.eat(TokenKind::LParen) {
            let distinct = self.eat(TokenKind::Distinct);
            let mut args = Vec::new();
            if self.eat(TokenKind::Star) {
                args.push(Expr::Star);
            } else if !self.at(TokenKind::RParen) {
                args.push(self.parse_expr()?);
                while self.eat(TokenKind::Comma) {
                    args.push(self.parse_expr()?);
                }
            }
            self.expect(TokenKind::RParen)?;
            Ok(Expr::FunctionCall { name, args, distinct })
        } else {
            Ok(Expr::Variable(name))
        }
    }
}
