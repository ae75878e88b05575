//! Recursive Descent Parser for Jam
//!
//! Consumes tokens from the lexer and produces the AST.
//!
//! Grammar (simplified):
//!   script     ::= statement*
//!   statement  ::= arg '=' list ';' | arg '?=' list ';' | arg '+=' list ';'
//!                | arg 'default' '=' list ';'
//!                | arg 'on' list assign-op list ';'
//!                | 'local' list [ '=' list ] ';'
//!                | 'rule' NAME params '{' statement* '}'
//!                | 'actions' flags* NAME [ 'bind' NAME* ] '{' raw '}'
//!                | 'if' expr '{' ... '}' [ 'else' statement ]
//!                | 'while' expr '{' ... '}'
//!                | 'for' arg 'in' list '{' ... '}'
//!                | 'switch' list '{' ( 'case' PATTERN ':' statement* )* '}'
//!                | 'include' list ';' | 'on' arg statement
//!                | 'break' ';' | 'continue' ';' | 'return' list ';'
//!                | '{' statement* '}'
//!                | arg lol ';'
//!   lol        ::= list ( ':' list )*
//!   arg        ::= WORD | '[' func ']'
//!   func       ::= arg lol | 'on' arg arg lol
//!   expr       ::= and ( '||' and )* ; and ::= unary ( '&&' unary )*
//!   unary      ::= '!' unary | primary
//!   primary    ::= '(' expr ')' | arg [ cmp-op arg | 'in' list ]

use crate::ast::types::{
    ActionFlags, ActionsDef, Arg, AssignOp, CmpOp, Expr, List, Lol, RuleCall, Stmt, SwitchCase,
};
use crate::parser::lexer::{Lexer, Token, TokenType};
use crate::parser::types::ParseError;

/// Parse Jam source into a statement list.
pub fn parse(input: &str, filename: Option<&str>) -> Result<Vec<Stmt>, ParseError> {
    let file = filename.unwrap_or("Jamfile");
    let tokens = Lexer::new(input, file).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        file: file.to_string(),
    };
    let stmts = parser.parse_statements()?;
    parser.expect(TokenType::Eof)?;
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_type(&self) -> TokenType {
        self.peek().token_type
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, t: TokenType) -> Result<Token, ParseError> {
        if self.peek_type() == t {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected '{}'", t.as_str())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::with_token(message, &self.file, token.line, token.value.clone())
    }

    fn parse_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek_type() {
                TokenType::Eof | TokenType::RBrace | TokenType::Case => break,
                _ => stmts.push(self.parse_statement()?),
            }
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_type() {
            TokenType::Local => self.parse_local(),
            TokenType::Include => {
                self.advance();
                let path = self.parse_list()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Include { path })
            }
            TokenType::Return => {
                self.advance();
                let values = self.parse_list()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Return { values })
            }
            TokenType::Break => {
                self.advance();
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Break)
            }
            TokenType::Continue => {
                self.advance();
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Continue)
            }
            TokenType::For => self.parse_for(),
            TokenType::Switch => self.parse_switch(),
            TokenType::If => self.parse_if(),
            TokenType::While => self.parse_while(),
            TokenType::Rule => self.parse_rule_def(),
            TokenType::Actions => self.parse_actions_def(),
            TokenType::On => self.parse_on(),
            TokenType::LBrace => {
                self.advance();
                let body = self.parse_statements()?;
                self.expect(TokenType::RBrace)?;
                Ok(Stmt::Block(body))
            }
            TokenType::Word | TokenType::LBracket => self.parse_arg_statement(),
            _ => Err(self.error("expected a statement")),
        }
    }

    // assignment, on-target assignment, or rule invocation
    fn parse_arg_statement(&mut self) -> Result<Stmt, ParseError> {
        let arg = self.parse_arg()?;
        match self.peek_type() {
            TokenType::Equals | TokenType::PlusEquals | TokenType::QuestionEquals => {
                let op = self.parse_assign_op()?;
                let values = self.parse_list()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Assign {
                    names: vec![arg],
                    op,
                    values,
                })
            }
            TokenType::Default => {
                self.advance();
                self.expect(TokenType::Equals)?;
                let values = self.parse_list()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Assign {
                    names: vec![arg],
                    op: AssignOp::SetDefault,
                    values,
                })
            }
            TokenType::On => {
                self.advance();
                let targets = self.parse_list()?;
                let op = self.parse_assign_op()?;
                let values = self.parse_list()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::AssignOn {
                    names: vec![arg],
                    targets,
                    op,
                    values,
                })
            }
            _ => {
                let args = self.parse_lol()?;
                self.expect(TokenType::Semicolon)?;
                Ok(Stmt::Call { name: arg, args })
            }
        }
    }

    fn parse_assign_op(&mut self) -> Result<AssignOp, ParseError> {
        match self.peek_type() {
            TokenType::Equals => {
                self.advance();
                Ok(AssignOp::Set)
            }
            TokenType::PlusEquals => {
                self.advance();
                Ok(AssignOp::Append)
            }
            TokenType::QuestionEquals => {
                self.advance();
                Ok(AssignOp::SetDefault)
            }
            TokenType::Default => {
                self.advance();
                self.expect(TokenType::Equals)?;
                Ok(AssignOp::SetDefault)
            }
            _ => Err(self.error("expected an assignment operator")),
        }
    }

    fn parse_local(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let names = self.parse_list()?;
        let values = if self.peek_type() == TokenType::Equals {
            self.advance();
            self.parse_list()?
        } else {
            Vec::new()
        };
        self.expect(TokenType::Semicolon)?;
        Ok(Stmt::Local { names, values })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let var = self.parse_arg()?;
        self.expect(TokenType::In)?;
        let items = self.parse_list()?;
        let body = self.parse_block()?;
        Ok(Stmt::For { var, items, body })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let cond = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.peek_type() == TokenType::Else {
            self.advance();
            if self.peek_type() == TokenType::LBrace {
                Some(self.parse_block()?)
            } else {
                // else-if chains and single statements
                Some(vec![self.parse_statement()?])
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let value = self.parse_list()?;
        self.expect(TokenType::LBrace)?;
        let mut cases = Vec::new();
        while self.peek_type() == TokenType::Case {
            self.advance();
            let pattern = self.advance();
            if pattern.token_type == TokenType::Eof {
                return Err(self.error("expected a case pattern"));
            }
            self.expect(TokenType::Colon)?;
            let body = self.parse_statements()?;
            cases.push(SwitchCase {
                pattern: pattern.value,
                body,
            });
        }
        self.expect(TokenType::RBrace)?;
        Ok(Stmt::Switch { value, cases })
    }

    fn parse_rule_def(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let name = self.expect_word()?;
        let mut params = Vec::new();
        while self.peek_type() == TokenType::Word {
            params.push(self.advance().value);
            if self.peek_type() == TokenType::Colon {
                self.advance();
            } else {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt::RuleDef { name, params, body })
    }

    fn parse_actions_def(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        // words before `bind`/`{` are flags, the last one is the name
        let mut words = Vec::new();
        while self.peek_type() == TokenType::Word {
            words.push(self.advance().value);
        }
        let name = words
            .pop()
            .ok_or_else(|| self.error("expected an actions name"))?;
        let mut flags = ActionFlags::default();
        for word in &words {
            match word.as_str() {
                "updated" => flags.updated = true,
                "together" => flags.together = true,
                "ignore" => flags.ignore = true,
                "quietly" => flags.quietly = true,
                "piecemeal" => flags.piecemeal = true,
                "existing" => flags.existing = true,
                other => {
                    return Err(self.error(format!("unknown actions flag '{}'", other)));
                }
            }
        }
        let mut bindlist = Vec::new();
        if self.peek_type() == TokenType::Bind {
            self.advance();
            while self.peek_type() == TokenType::Word {
                bindlist.push(self.advance().value);
            }
        }
        self.expect(TokenType::LBrace)?;
        let script = self.expect(TokenType::ActionBody)?.value;
        self.expect(TokenType::RBrace)?;
        Ok(Stmt::ActionsDef(ActionsDef {
            name,
            flags,
            bindlist,
            script,
        }))
    }

    fn parse_on(&mut self) -> Result<Stmt, ParseError> {
        self.advance();
        let target = self.parse_arg()?;
        // the body is one statement; a braced one parses as a block and
        // keeps its own scope
        let body = vec![self.parse_statement()?];
        Ok(Stmt::On { target, body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenType::LBrace)?;
        let body = self.parse_statements()?;
        self.expect(TokenType::RBrace)?;
        Ok(body)
    }

    fn expect_word(&mut self) -> Result<String, ParseError> {
        if self.peek_type() == TokenType::Word {
            Ok(self.advance().value)
        } else {
            Err(self.error("expected a word"))
        }
    }

    // ---------------------------------------------------------------------
    // arguments
    // ---------------------------------------------------------------------

    fn parse_arg(&mut self) -> Result<Arg, ParseError> {
        match self.peek_type() {
            TokenType::Word => Ok(Arg::Word(self.advance().value)),
            TokenType::LBracket => {
                self.advance();
                let call = if self.peek_type() == TokenType::On {
                    self.advance();
                    let target = self.parse_arg()?;
                    let name = self.parse_arg()?;
                    let args = self.parse_lol()?;
                    RuleCall {
                        on_target: Some(target),
                        name,
                        args,
                    }
                } else {
                    let name = self.parse_arg()?;
                    let args = self.parse_lol()?;
                    RuleCall {
                        on_target: None,
                        name,
                        args,
                    }
                };
                self.expect(TokenType::RBracket)?;
                Ok(Arg::Call(Box::new(call)))
            }
            _ => Err(self.error("expected an argument")),
        }
    }

    fn parse_list(&mut self) -> Result<List, ParseError> {
        let mut list = Vec::new();
        loop {
            match self.peek_type() {
                TokenType::Word => list.push(Arg::Word(self.advance().value)),
                TokenType::LBracket => list.push(self.parse_arg()?),
                _ => break,
            }
        }
        Ok(list)
    }

    fn parse_lol(&mut self) -> Result<Lol, ParseError> {
        let mut lol = vec![self.parse_list()?];
        while self.peek_type() == TokenType::Colon {
            self.advance();
            lol.push(self.parse_list()?);
        }
        Ok(lol)
    }

    // ---------------------------------------------------------------------
    // expressions
    // ---------------------------------------------------------------------

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek_type() == TokenType::OrOr {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while self.peek_type() == TokenType::AndAnd {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek_type() == TokenType::Bang {
            self.advance();
            Ok(Expr::Not(Box::new(self.parse_unary()?)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.peek_type() == TokenType::LParen {
            self.advance();
            let expr = self.parse_expr()?;
            self.expect(TokenType::RParen)?;
            return Ok(expr);
        }

        let arg = self.parse_arg()?;
        let op = match self.peek_type() {
            TokenType::Equals => Some(CmpOp::Eq),
            TokenType::NotEquals => Some(CmpOp::Ne),
            TokenType::Less => Some(CmpOp::Lt),
            TokenType::Greater => Some(CmpOp::Gt),
            TokenType::LessEq => Some(CmpOp::Le),
            TokenType::GreaterEq => Some(CmpOp::Ge),
            TokenType::In => {
                self.advance();
                let right = self.parse_list()?;
                return Ok(Expr::In(vec![arg], right));
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let right = self.parse_arg()?;
                Ok(Expr::Compare(
                    op,
                    Box::new(Expr::List(vec![arg])),
                    Box::new(Expr::List(vec![right])),
                ))
            }
            None => Ok(Expr::List(vec![arg])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Vec<Stmt> {
        parse(input, Some("test")).unwrap()
    }

    #[test]
    fn test_assignment() {
        let stmts = parse_ok("X = a b c ;");
        match &stmts[0] {
            Stmt::Assign { names, op, values } => {
                assert_eq!(names, &vec![Arg::word("X")]);
                assert_eq!(*op, AssignOp::Set);
                assert_eq!(values.len(), 3);
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_flavours() {
        let stmts = parse_ok("X += a ; Y ?= b ; Z default = c ;");
        assert!(matches!(
            stmts[0],
            Stmt::Assign {
                op: AssignOp::Append,
                ..
            }
        ));
        assert!(matches!(
            stmts[1],
            Stmt::Assign {
                op: AssignOp::SetDefault,
                ..
            }
        ));
        assert!(matches!(
            stmts[2],
            Stmt::Assign {
                op: AssignOp::SetDefault,
                ..
            }
        ));
    }

    #[test]
    fn test_on_target_assignment() {
        let stmts = parse_ok("CFLAGS on main.o lib.o += -O2 ;");
        match &stmts[0] {
            Stmt::AssignOn {
                names,
                targets,
                op,
                values,
            } => {
                assert_eq!(names, &vec![Arg::word("CFLAGS")]);
                assert_eq!(targets.len(), 2);
                assert_eq!(*op, AssignOp::Append);
                assert_eq!(values, &vec![Arg::word("-O2")]);
            }
            other => panic!("expected on-target assign, got {:?}", other),
        }
    }

    #[test]
    fn test_invocation_with_lol() {
        let stmts = parse_ok("Main app : a.c b.c ;");
        match &stmts[0] {
            Stmt::Call { name, args } => {
                assert_eq!(name, &Arg::word("Main"));
                assert_eq!(args.len(), 2);
                assert_eq!(args[0], vec![Arg::word("app")]);
                assert_eq!(args[1].len(), 2);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_lol_column() {
        let stmts = parse_ok("Rule : b ;");
        match &stmts[0] {
            Stmt::Call { args, .. } => {
                assert!(args[0].is_empty());
                assert_eq!(args[1], vec![Arg::word("b")]);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_def_with_params() {
        let stmts = parse_ok("rule Object target : source { Compile $(target) ; }");
        match &stmts[0] {
            Stmt::RuleDef { name, params, body } => {
                assert_eq!(name, "Object");
                assert_eq!(params, &vec!["target".to_string(), "source".to_string()]);
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected rule def, got {:?}", other),
        }
    }

    #[test]
    fn test_actions_def() {
        let stmts = parse_ok("actions updated together cp bind LIBS { cp $(>) $(<) }");
        match &stmts[0] {
            Stmt::ActionsDef(def) => {
                assert_eq!(def.name, "cp");
                assert!(def.flags.updated);
                assert!(def.flags.together);
                assert!(!def.flags.quietly);
                assert_eq!(def.bindlist, vec!["LIBS".to_string()]);
                assert!(def.script.contains("cp $(>) $(<)"));
            }
            other => panic!("expected actions def, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let stmts = parse_ok("if $(A) { X = 1 ; } else if $(B) { X = 2 ; } else { X = 3 ; }");
        match &stmts[0] {
            Stmt::If { else_body, .. } => {
                let else_body = else_body.as_ref().unwrap();
                assert!(matches!(else_body[0], Stmt::If { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_expressions() {
        let stmts = parse_ok("if $(A) = yes && ! ( $(B) in x y ) { }");
        match &stmts[0] {
            Stmt::If { cond, .. } => match cond {
                Expr::And(left, right) => {
                    assert!(matches!(**left, Expr::Compare(CmpOp::Eq, _, _)));
                    assert!(matches!(**right, Expr::Not(_)));
                }
                other => panic!("expected and, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_and_while() {
        let stmts = parse_ok("for f in a b { ECHO $(f) ; } while $(X) { X = ; }");
        assert!(matches!(stmts[0], Stmt::For { .. }));
        assert!(matches!(stmts[1], Stmt::While { .. }));
    }

    #[test]
    fn test_switch() {
        let stmts = parse_ok("switch $(OS) { case LINUX : X = 1 ; case * : X = 2 ; }");
        match &stmts[0] {
            Stmt::Switch { cases, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].pattern, "LINUX");
                assert_eq!(cases[1].pattern, "*");
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_bracket_call() {
        let stmts = parse_ok("X = [ Glob src : *.c ] ;");
        match &stmts[0] {
            Stmt::Assign { values, .. } => match &values[0] {
                Arg::Call(call) => {
                    assert_eq!(call.name, Arg::word("Glob"));
                    assert_eq!(call.args.len(), 2);
                    assert!(call.on_target.is_none());
                }
                other => panic!("expected call arg, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_bracket_call_on_target() {
        let stmts = parse_ok("X = [ on app Libs ] ;");
        match &stmts[0] {
            Stmt::Assign { values, .. } => match &values[0] {
                Arg::Call(call) => {
                    assert_eq!(call.on_target, Some(Arg::word("app")));
                    assert_eq!(call.name, Arg::word("Libs"));
                }
                other => panic!("expected call arg, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_on_statement() {
        let stmts = parse_ok("on app { LINKLIBS = -lm ; }");
        match &stmts[0] {
            Stmt::On { target, body } => {
                assert_eq!(target, &Arg::word("app"));
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected on, got {:?}", other),
        }
    }

    #[test]
    fn test_include() {
        let stmts = parse_ok("include $(TOP)/Jamrules ;");
        assert!(matches!(&stmts[0], Stmt::Include { path } if path.len() == 1));
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        let err = parse("X = a", Some("Jamfile")).unwrap_err();
        assert_eq!(err.file, "Jamfile");
        assert!(err.to_string().contains("Jamfile:1"));
    }

    #[test]
    fn test_local_without_value() {
        let stmts = parse_ok("local a b ;");
        match &stmts[0] {
            Stmt::Local { names, values } => {
                assert_eq!(names.len(), 2);
                assert!(values.is_empty());
            }
            other => panic!("expected local, got {:?}", other),
        }
    }
}
