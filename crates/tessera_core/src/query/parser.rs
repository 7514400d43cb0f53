//! Recursive-descent parser for predicate strings.
//!
//! ```text
//! or      := and (("||" | OR) and)*
//! and     := unary (("&&" | AND) unary)*
//! unary   := ("!" | NOT) unary | primary
//! primary := "(" or ")" | TRUEPREDICATE | FALSEPREDICATE
//!          | operand [compare-op ["[c]"] operand]
//! operand := keypath | literal | "$" index
//! keypath := segment ("." segment)*
//! segment := identifier | "@links" "." type "." property | "@count" | "@size"
//! ```

use super::ast::{CompareOp, Comparison, Component, Expr, Operand, PathExpr};
use super::lexer::{tokenize, Token, TokenKind};
use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// Deepest nesting of `!` and parentheses a predicate may use.
const MAX_DEPTH: usize = 256;

pub(crate) fn parse(input: &str) -> CoreResult<Expr> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or_expr()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(syntax(trailing, "unexpected token after end of predicate"));
    }
    Ok(expr)
}

/// Parses a bare key path such as `assignee.name`.
pub(crate) fn parse_key_path(input: &str) -> CoreResult<PathExpr> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    let path = parser.key_path()?;
    let trailing = parser.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(syntax(trailing, "unexpected token after key path"));
    }
    Ok(path)
}

fn syntax(token: &Token, message: &str) -> CoreError {
    let text = if token.kind == TokenKind::Eof {
        "end of input"
    } else {
        token.text.as_str()
    };
    CoreError::predicate_syntax(text, token.offset, message)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> CoreResult<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(syntax(self.peek(), message))
        }
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CoreResult<Expr>) -> CoreResult<Expr> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax(self.peek(), "predicate nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn or_expr(&mut self) -> CoreResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> CoreResult<Expr> {
        let mut lhs = self.unary()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> CoreResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> CoreResult<Expr> {
        match self.peek().kind {
            TokenKind::LParen => {
                self.advance();
                let inner = self.nested(Self::or_expr)?;
                self.expect(&TokenKind::RParen, "expected ')'")?;
                Ok(inner)
            }
            TokenKind::TruePredicate => {
                self.advance();
                Ok(Expr::Constant(true))
            }
            TokenKind::FalsePredicate => {
                self.advance();
                Ok(Expr::Constant(false))
            }
            _ => self.comparison(),
        }
    }

    fn comparison(&mut self) -> CoreResult<Expr> {
        let lhs = self.operand()?;
        let Some(op) = compare_op(&self.peek().kind) else {
            // A bare key path tests a bool property.
            return match lhs {
                Operand::Path(_) => Ok(Expr::Compare(Comparison {
                    lhs,
                    op: CompareOp::Eq,
                    rhs: Operand::Literal(Value::Bool(true)),
                    case_insensitive: false,
                })),
                _ => Err(syntax(self.peek(), "expected a comparison operator")),
            };
        };
        self.advance();
        let case_insensitive = self.eat(&TokenKind::CaseInsensitive);
        if case_insensitive && !op.is_string_op() && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
            let token = &self.tokens[self.pos - 1];
            return Err(syntax(token, "'[c]' only applies to string comparisons"));
        }
        let rhs = self.operand()?;
        Ok(Expr::Compare(Comparison {
            lhs,
            op,
            rhs,
            case_insensitive,
        }))
    }

    fn operand(&mut self) -> CoreResult<Operand> {
        let token = self.advance();
        let literal = match token.kind {
            TokenKind::Ident(_) | TokenKind::At(_) => {
                self.pos -= 1;
                return self.key_path().map(Operand::Path);
            }
            TokenKind::Arg(index) => {
                return Ok(Operand::Arg {
                    index,
                    offset: token.offset,
                })
            }
            TokenKind::Int(n) => Value::Int(n),
            TokenKind::Float(f) => Value::Double(f),
            TokenKind::Str(s) => Value::String(s),
            TokenKind::Date(d) => Value::Date(d),
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            TokenKind::Null => Value::Null,
            TokenKind::Minus => match self.advance().kind {
                TokenKind::Int(n) => Value::Int(-n),
                TokenKind::Float(f) => Value::Double(-f),
                _ => return Err(syntax(&token, "expected a number after '-'")),
            },
            _ => return Err(syntax(&token, "expected a key path or a value")),
        };
        Ok(Operand::Literal(literal))
    }

    fn key_path(&mut self) -> CoreResult<PathExpr> {
        let start = self.peek().offset;
        let mut components = Vec::new();
        let mut end;

        loop {
            let token = self.advance();
            end = token.offset + token.text.len();
            let component = match token.kind {
                TokenKind::Ident(name) => Component::Property(name),
                TokenKind::At(ref word) if word.eq_ignore_ascii_case("count") || word.eq_ignore_ascii_case("size") => {
                    Component::Count
                }
                TokenKind::At(ref word) if word.eq_ignore_ascii_case("links") => {
                    self.expect(&TokenKind::Dot, "expected '.' after '@links'")?;
                    let object_type = self.identifier("expected an object type after '@links.'")?;
                    self.expect(&TokenKind::Dot, "expected '.' after the object type")?;
                    let property_token = self.peek().clone();
                    let property = self.identifier("expected a property name")?;
                    end = property_token.offset + property_token.text.len();
                    Component::Links {
                        object_type,
                        property,
                    }
                }
                TokenKind::At(_) => return Err(syntax(&token, "unknown '@' keyword")),
                _ => return Err(syntax(&token, "expected a property name")),
            };
            components.push(component);

            if !self.eat(&TokenKind::Dot) {
                break;
            }
        }

        Ok(PathExpr {
            components,
            offset: start,
            text: String::new(),
        }
        .with_text(start, end, &self.tokens))
    }

    fn identifier(&mut self, message: &str) -> CoreResult<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(syntax(self.peek(), message)),
        }
    }
}

impl PathExpr {
    fn with_text(mut self, start: usize, end: usize, tokens: &[Token]) -> Self {
        self.text = tokens
            .iter()
            .filter(|t| t.offset >= start && t.offset + t.text.len() <= end)
            .map(|t| t.text.as_str())
            .collect();
        self
    }
}

fn compare_op(kind: &TokenKind) -> Option<CompareOp> {
    let op = match kind {
        TokenKind::Eq => CompareOp::Eq,
        TokenKind::Ne => CompareOp::Ne,
        TokenKind::Lt => CompareOp::Lt,
        TokenKind::Le => CompareOp::Le,
        TokenKind::Gt => CompareOp::Gt,
        TokenKind::Ge => CompareOp::Ge,
        TokenKind::BeginsWith => CompareOp::BeginsWith,
        TokenKind::EndsWith => CompareOp::EndsWith,
        TokenKind::Contains => CompareOp::Contains,
        TokenKind::Like => CompareOp::Like,
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(expr: &Operand) -> &PathExpr {
        match expr {
            Operand::Path(p) => p,
            other => panic!("expected a key path, got {other:?}"),
        }
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a == 1 || b == 2 && c == 3").unwrap();
        let Expr::Or(_, rhs) = expr else {
            panic!("expected OR at the root");
        };
        assert!(matches!(*rhs, Expr::And(_, _)));
    }

    #[test]
    fn parentheses_group() {
        let expr = parse("(a == 1 || b == 2) && c == 3").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn not_applies_to_comparison() {
        let expr = parse("!name BEGINSWITH[c] 'wash'").unwrap();
        let Expr::Not(inner) = expr else {
            panic!("expected NOT");
        };
        let Expr::Compare(cmp) = *inner else {
            panic!("expected a comparison");
        };
        assert_eq!(cmp.op, CompareOp::BeginsWith);
        assert!(cmp.case_insensitive);
    }

    #[test]
    fn backlink_key_path() {
        let Expr::Compare(cmp) = parse("@links.User.posts.birthdate >= 2000-01-01@00:00:00:0").unwrap()
        else {
            panic!("expected a comparison");
        };
        let p = path(&cmp.lhs);
        assert_eq!(
            p.components,
            vec![
                Component::Links {
                    object_type: "User".into(),
                    property: "posts".into()
                },
                Component::Property("birthdate".into()),
            ]
        );
        assert_eq!(p.text, "@links.User.posts.birthdate");
        assert!(matches!(cmp.rhs, Operand::Literal(Value::Date(_))));
    }

    #[test]
    fn count_and_negative_literals() {
        let Expr::Compare(cmp) = parse("posts.@count > -1").unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(path(&cmp.lhs).components[1], Component::Count);
        assert_eq!(cmp.rhs, Operand::Literal(Value::Int(-1)));
    }

    #[test]
    fn bare_path_is_bool_test() {
        let Expr::Compare(cmp) = parse("isComplete").unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(cmp.rhs, Operand::Literal(Value::Bool(true)));
    }

    #[test]
    fn constants_and_arguments() {
        assert_eq!(parse("TRUEPREDICATE").unwrap(), Expr::Constant(true));
        let Expr::Compare(cmp) = parse("assignee == $0").unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(cmp.rhs, Operand::Arg { index: 0, offset: 12 });
    }

    #[test]
    fn syntax_errors_name_the_token() {
        let err = parse("name == ").unwrap_err();
        assert!(
            matches!(err, CoreError::PredicateSyntax { ref token, .. } if token == "end of input")
        );

        let err = parse("priority > 3 )").unwrap_err();
        assert!(matches!(err, CoreError::PredicateSyntax { ref token, offset: 13, .. } if token == ")"));

        let err = parse("(priority > 3").unwrap_err();
        assert!(matches!(err, CoreError::PredicateSyntax { .. }));

        let err = parse("priority >> 3").unwrap_err();
        assert!(matches!(err, CoreError::PredicateSyntax { ref token, .. } if token == ">"));

        assert!(parse("@links.User").is_err());
        assert!(parse_key_path("assignee.name").is_ok());
        assert!(parse_key_path("assignee name").is_err());
        assert!(parse("5 3").is_err());
        assert!(parse("priority < [c] 3").is_err());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let negations = format!("{}score > 1", "!".repeat(200_000));
        let err = parse(&negations).unwrap_err();
        assert!(
            matches!(err, CoreError::PredicateSyntax { ref message, .. } if message.contains("nested too deeply"))
        );

        let parens = format!("{}a == 1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse(&parens), Err(CoreError::PredicateSyntax { .. })));

        let shallow = format!("{}a == 1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse(&shallow).is_ok());
        assert!(parse(&format!("{}flag", "!".repeat(50))).is_ok());
    }
}
