//! Payload-length formulas.
//!
//! Command tables describe variable-length payloads with small integer
//! formulas over the command's argument bytes, e.g. `nL + 256*nH` for the
//! little-endian length pair used throughout ESC/POS. The language is
//! deliberately tiny: decimal integers, argument names, `+ - * /` with the
//! usual precedence, and parentheses. Anything else is rejected when the
//! formula is compiled.

use serde::{Serialize, Serializer};

/// Formula compilation errors. Offsets are byte offsets into the formula text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    /// The formula text is blank.
    #[error("empty formula")]
    Empty,
    /// A character that is not part of the formula language.
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Byte offset of the character.
        offset: usize,
    },
    /// A valid token in a position where it is not allowed.
    #[error("unexpected {found:?} at offset {offset}")]
    UnexpectedToken {
        /// Source text of the token.
        found: String,
        /// Byte offset of the token.
        offset: usize,
    },
    /// The formula ended where an operand or `)` was required.
    #[error("unexpected end of formula at offset {offset}")]
    UnexpectedEnd {
        /// Length of the formula text.
        offset: usize,
    },
    /// An identifier that is not one of the command's argument names.
    #[error("unknown identifier {name:?} at offset {offset}")]
    UnknownIdentifier {
        /// The identifier.
        name: String,
        /// Byte offset of the identifier.
        offset: usize,
    },
    /// An integer literal that does not fit in `i64`.
    #[error("integer literal {literal:?} at offset {offset} is too large")]
    IntegerTooLarge {
        /// The literal text.
        literal: String,
        /// Byte offset of the literal.
        offset: usize,
    },
}

/// Formula evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// A `/` whose right-hand side evaluated to zero.
    #[error("division by zero")]
    DivisionByZero,
    /// An intermediate result overflowed `i64`.
    #[error("arithmetic overflow")]
    Overflow,
    /// The argument slice does not match the formula's argument names.
    #[error("number of arguments {got} != number of argument names {expected}")]
    ArgCount {
        /// Number of argument names the formula was compiled against.
        expected: usize,
        /// Number of argument bytes supplied.
        got: usize,
    },
    /// A variable with no bound argument.
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    /// The formula produced a negative payload length.
    #[error("negative payload length {0}")]
    NegativeLength(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Int(i64),
    Var { name: String, index: usize },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn eval(&self, args: &[u8]) -> Result<i64, EvalError> {
        match self {
            Expr::Int(v) => Ok(*v),
            Expr::Var { name, index } => args
                .get(*index)
                .map(|&b| i64::from(b))
                .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(args)?;
                let r = rhs.eval(args)?;
                let v = match op {
                    BinOp::Add => l.checked_add(r),
                    BinOp::Sub => l.checked_sub(r),
                    BinOp::Mul => l.checked_mul(r),
                    BinOp::Div => {
                        if r == 0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        l.checked_div(r)
                    }
                };
                v.ok_or(EvalError::Overflow)
            }
        }
    }
}

/// A compiled payload-length formula.
///
/// Identifiers are resolved to argument positions at compile time, so
/// evaluation only needs the raw argument bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    source: String,
    arity: usize,
    expr: Expr,
}

impl Formula {
    /// Compile `text` against the command's argument names.
    pub fn compile<S: AsRef<str>>(text: &str, arg_names: &[S]) -> Result<Self, FormulaError> {
        let toks = lex(text)?;
        if toks.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut p = Parser {
            toks: &toks,
            pos: 0,
            len: text.len(),
            names: arg_names,
        };
        let expr = p.expr()?;
        if let Some(tok) = p.toks.get(p.pos) {
            return Err(FormulaError::UnexpectedToken {
                found: tok.text.to_string(),
                offset: tok.offset,
            });
        }
        Ok(Self {
            source: text.trim().to_string(),
            arity: arg_names.len(),
            expr,
        })
    }

    /// Evaluate the formula over `args`, one byte per argument name.
    pub fn eval(&self, args: &[u8]) -> Result<i64, EvalError> {
        if args.len() != self.arity {
            return Err(EvalError::ArgCount {
                expected: self.arity,
                got: args.len(),
            });
        }
        self.expr.eval(args)
    }

    /// The formula text as written in the table.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Formula {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

// ─── Lexer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokKind {
    Int,
    Ident,
    Op(BinOp),
    LParen,
    RParen,
}

#[derive(Debug)]
struct Tok<'a> {
    kind: TokKind,
    text: &'a str,
    offset: usize,
}

fn lex(text: &str) -> Result<Vec<Tok<'_>>, FormulaError> {
    let mut toks = Vec::new();
    let b = text.as_bytes();
    let mut i = 0usize;
    while i < b.len() {
        let c = b[i];
        let start = i;
        let kind = match c {
            b' ' | b'\t' => {
                i += 1;
                continue;
            }
            b'+' => TokKind::Op(BinOp::Add),
            b'-' => TokKind::Op(BinOp::Sub),
            b'*' => TokKind::Op(BinOp::Mul),
            b'/' => TokKind::Op(BinOp::Div),
            b'(' => TokKind::LParen,
            b')' => TokKind::RParen,
            b'0'..=b'9' => {
                while i < b.len() && b[i].is_ascii_digit() {
                    i += 1;
                }
                toks.push(Tok {
                    kind: TokKind::Int,
                    text: &text[start..i],
                    offset: start,
                });
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'_') {
                    i += 1;
                }
                toks.push(Tok {
                    kind: TokKind::Ident,
                    text: &text[start..i],
                    offset: start,
                });
                continue;
            }
            _ => {
                let ch = text[start..].chars().next().unwrap_or('\u{FFFD}');
                return Err(FormulaError::UnexpectedChar { ch, offset: start });
            }
        };
        i += 1;
        toks.push(Tok {
            kind,
            text: &text[start..i],
            offset: start,
        });
    }
    Ok(toks)
}

// ─── Parser ─────────────────────────────────────────────────────────────────

struct Parser<'t, 'a, S> {
    toks: &'t [Tok<'a>],
    pos: usize,
    len: usize,
    names: &'t [S],
}

impl<S: AsRef<str>> Parser<'_, '_, S> {
    fn peek_op(&self, ops: &[BinOp]) -> Option<BinOp> {
        match self.toks.get(self.pos) {
            Some(Tok {
                kind: TokKind::Op(op),
                ..
            }) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek_op(&[BinOp::Add, BinOp::Sub]) {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.factor()?;
        while let Some(op) = self.peek_op(&[BinOp::Mul, BinOp::Div]) {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // factor := INT | IDENT | '(' expr ')'
    fn factor(&mut self) -> Result<Expr, FormulaError> {
        let Some(tok) = self.toks.get(self.pos) else {
            return Err(FormulaError::UnexpectedEnd { offset: self.len });
        };
        self.pos += 1;
        match tok.kind {
            TokKind::Int => tok.text.parse::<i64>().map(Expr::Int).map_err(|_| {
                FormulaError::IntegerTooLarge {
                    literal: tok.text.to_string(),
                    offset: tok.offset,
                }
            }),
            TokKind::Ident => {
                let index = self
                    .names
                    .iter()
                    .position(|n| n.as_ref() == tok.text)
                    .ok_or_else(|| FormulaError::UnknownIdentifier {
                        name: tok.text.to_string(),
                        offset: tok.offset,
                    })?;
                Ok(Expr::Var {
                    name: tok.text.to_string(),
                    index,
                })
            }
            TokKind::LParen => {
                let inner = self.expr()?;
                match self.toks.get(self.pos) {
                    Some(Tok {
                        kind: TokKind::RParen,
                        ..
                    }) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    Some(other) => Err(FormulaError::UnexpectedToken {
                        found: other.text.to_string(),
                        offset: other.offset,
                    }),
                    None => Err(FormulaError::UnexpectedEnd { offset: self.len }),
                }
            }
            TokKind::Op(_) | TokKind::RParen => Err(FormulaError::UnexpectedToken {
                found: tok.text.to_string(),
                offset: tok.offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str, names: &[&str]) -> Formula {
        Formula::compile(text, names).unwrap_or_else(|e| panic!("{text}: {e}"))
    }

    #[test]
    fn little_endian_length_pair() {
        let f = compile("nL + 256*nH", &["nL", "nH"]);
        assert_eq!(f.eval(&[128, 1]), Ok(384));
        assert_eq!(f.eval(&[0, 0]), Ok(0));
        assert_eq!(f.eval(&[255, 255]), Ok(65535));
    }

    #[test]
    fn precedence_and_parentheses() {
        let f = compile("a + b * c", &["a", "b", "c"]);
        assert_eq!(f.eval(&[1, 2, 3]), Ok(7));
        let f = compile("(a + b) * c", &["a", "b", "c"]);
        assert_eq!(f.eval(&[1, 2, 3]), Ok(9));
        let f = compile("pL+pH*256-2", &["pL", "pH"]);
        assert_eq!(f.eval(&[5, 1]), Ok(259));
    }

    #[test]
    fn subtraction_and_division_are_left_associative() {
        let f = compile("100 - 10 - 1", &[] as &[&str]);
        assert_eq!(f.eval(&[]), Ok(89));
        let f = compile("100 / 10 / 5", &[] as &[&str]);
        assert_eq!(f.eval(&[]), Ok(2));
        let f = compile("(x * y + 7) / 8", &["x", "y"]);
        assert_eq!(f.eval(&[3, 5]), Ok(2));
    }

    #[test]
    fn division_by_zero_fails_at_eval_time() {
        let f = compile("k / n", &["k", "n"]);
        assert_eq!(f.eval(&[4, 2]), Ok(2));
        assert_eq!(f.eval(&[4, 0]), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn arg_count_mismatch() {
        let f = compile("n", &["n"]);
        assert_eq!(
            f.eval(&[1, 2]),
            Err(EvalError::ArgCount {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn unknown_identifier_is_a_compile_error() {
        let err = Formula::compile("nL + 256*nX", &["nL", "nH"]).unwrap_err();
        assert_eq!(
            err,
            FormulaError::UnknownIdentifier {
                name: "nX".into(),
                offset: 9
            }
        );
    }

    #[test]
    fn rejects_non_arithmetic_syntax() {
        for bad in [
            "n == 1", "n % 2", "-n", "f(n)", "n +", "(n", "n)", "n n", "1.5", "n << 1",
        ] {
            assert!(
                Formula::compile(bad, &["n", "f"]).is_err(),
                "{bad:?} should not compile"
            );
        }
        assert_eq!(Formula::compile("  ", &["n"]), Err(FormulaError::Empty));
    }

    #[test]
    fn overflow_is_reported() {
        let f = compile("9223372036854775807 + n", &["n"]);
        assert_eq!(f.eval(&[1]), Err(EvalError::Overflow));
        assert!(matches!(
            Formula::compile("99999999999999999999", &[] as &[&str]),
            Err(FormulaError::IntegerTooLarge { .. })
        ));
    }

    #[test]
    fn source_is_preserved() {
        let f = compile(" nL + 256 * nH ", &["nL", "nH"]);
        assert_eq!(f.source(), "nL + 256 * nH");
        assert_eq!(f.to_string(), "nL + 256 * nH");
    }
}
