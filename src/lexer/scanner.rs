use crate::core::Loc;

use super::Token;

#[derive(Debug)]
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    line_start: usize,
}

#[allow(clippy::while_let_on_iterator)]
impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            line_start: 0,
        }
    }

    fn location(&self, start: usize) -> Loc {
        Loc::new(self.line, start - self.line_start + 1)
    }

    fn offset(&mut self) -> usize {
        match self.chars.peek() {
            Some((offset, _)) => *offset,
            None => self.source.len(),
        }
    }

    fn newline(&mut self, offset: usize) {
        self.line += 1;
        self.line_start = offset + 1;
    }

    fn match_char(&mut self, next: char) -> bool {
        if let Some((_, c)) = self.chars.peek() {
            if *c == next {
                self.chars.next();
                return true;
            }
        }

        false
    }

    fn advance_while<F: Fn(char) -> bool>(&mut self, f: F) {
        while let Some((offset, c)) = self.chars.peek() {
            if !f(*c) {
                break;
            }

            if *c == '\n' {
                let offset = *offset;
                self.newline(offset);
            }

            self.chars.next();
        }
    }

    fn read_token(&mut self) -> Option<Token> {
        while let Some((start, char)) = self.chars.next() {
            let location = self.location(start);

            match char {
                ' ' | '\r' | '\t' => continue,
                '\n' => self.newline(start),

                '(' => return Some(Token::LeftParen(location)),
                ')' => return Some(Token::RightParen(location)),
                '{' => return Some(Token::LeftBrace(location)),
                '}' => return Some(Token::RightBrace(location)),
                ',' => return Some(Token::Comma(location)),
                '.' => return Some(Token::Dot(location)),
                '-' => return Some(Token::Minus(location)),
                '+' => return Some(Token::Plus(location)),
                ';' => return Some(Token::Semicolon(location)),
                '*' => return Some(Token::Star(location)),

                '!' if self.match_char('=') => return Some(Token::BangEqual(location)),
                '!' => return Some(Token::Bang(location)),
                '=' if self.match_char('=') => return Some(Token::EqualEqual(location)),
                '=' => return Some(Token::Equal(location)),
                '>' if self.match_char('=') => return Some(Token::GreaterEqual(location)),
                '>' => return Some(Token::Greater(location)),
                '<' if self.match_char('=') => return Some(Token::LessEqual(location)),
                '<' => return Some(Token::Less(location)),

                '/' if self.match_char('/') => {
                    self.advance_while(|c| c != '\n');
                }
                // Block comments are not part of the language.
                '/' if self.match_char('*') => {
                    return Some(Token::Error(location, "Unexpected character.".to_string()));
                }
                '/' => return Some(Token::Slash(location)),

                '"' => return Some(self.read_string(start, location)),

                c if c.is_numeric() => return Some(self.read_number(start, location)),
                c if c.is_alphabetic() || c == '_' => {
                    return Some(self.read_identifier(start, location))
                }

                _ => return Some(Token::Error(location, "Unexpected character.".to_string())),
            }
        }

        None
    }

    fn read_string(&mut self, start: usize, location: Loc) -> Token {
        while let Some((offset, c)) = self.chars.next() {
            match c {
                '\n' => self.newline(offset),
                '"' => {
                    return Token::String(location, self.source[start..offset + 1].to_string());
                }
                _ => {}
            }
        }

        Token::Error(location, "Unterminated string.".to_string())
    }

    fn read_number(&mut self, start: usize, location: Loc) -> Token {
        self.advance_while(|c| c.is_numeric());

        // A fractional part needs a digit after the dot; a trailing dot is
        // a separate token.
        if let Some((offset, '.')) = self.chars.peek() {
            let after_dot = offset + 1;
            if self
                .source
                .get(after_dot..)
                .and_then(|rest| rest.chars().next())
                .map(|c| c.is_numeric())
                .unwrap_or_default()
            {
                self.chars.next();
                self.advance_while(|c| c.is_numeric());
            }
        }

        let end = self.offset();
        Token::Number(location, self.source[start..end].to_string())
    }

    fn read_identifier(&mut self, start: usize, location: Loc) -> Token {
        self.advance_while(|c| c.is_alphanumeric() || c == '_');
        let end = self.offset();

        match &self.source[start..end] {
            "and" => Token::And(location),
            "class" => Token::Class(location),
            "else" => Token::Else(location),
            "false" => Token::False(location),
            "for" => Token::For(location),
            "fun" => Token::Fun(location),
            "if" => Token::If(location),
            "nil" => Token::Nil(location),
            "or" => Token::Or(location),
            "print" => Token::Print(location),
            "return" => Token::Return(location),
            "super" => Token::Super(location),
            "this" => Token::This(location),
            "true" => Token::True(location),
            "var" => Token::Var(location),
            "while" => Token::While(location),
            lexeme => Token::Identifier(location, lexeme.to_string()),
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operators() {
        let mut lexer = Scanner::new("+ - * /");

        assert_eq!(lexer.next().expect("a token"), Token::Plus(Loc::new(1, 1)));
        assert_eq!(lexer.next().expect("a token"), Token::Minus(Loc::new(1, 3)));
        assert_eq!(lexer.next().expect("a token"), Token::Star(Loc::new(1, 5)));
        assert_eq!(lexer.next().expect("a token"), Token::Slash(Loc::new(1, 7)));
        assert!(lexer.next().is_none(), "no more tokens");
    }

    #[test]
    fn test_basic_symbols() {
        let mut lexer = Scanner::new(
            r#"
// this is a comment
(( )){} // grouping stuff
!*+-/=<> <= == // operators
"#,
        );

        let tokens = [
            "(", "(", ")", ")", "{", "}", "!", "*", "+", "-", "/", "=", "<", ">", "<=", "==",
        ];

        for token in tokens {
            assert_eq!(lexer.next().expect("a token").lexeme(), token);
        }

        assert!(lexer.next().is_none(), "no more tokens");
    }

    #[test]
    fn test_line_comments() {
        let mut lexer = Scanner::new("// just a comment\nprint");

        assert_eq!(lexer.next().expect("a token"), Token::Print(Loc::new(2, 1)));
        assert!(lexer.next().is_none(), "no more tokens");
    }

    #[test]
    fn test_block_comments_are_rejected() {
        let mut lexer = Scanner::new("/* not supported */");

        assert_eq!(
            lexer.next().expect("a token"),
            Token::Error(Loc::new(1, 1), "Unexpected character.".to_string())
        );
    }

    #[test]
    fn test_strings() {
        let mut lexer = Scanner::new(r#" "test" "#);

        if let Token::String(loc, lexeme) = lexer.next().expect("a token") {
            assert_eq!(lexeme, "\"test\"");
            assert_eq!(loc, Loc::new(1, 2));
        } else {
            panic!("expected a string token");
        }

        assert!(lexer.next().is_none(), "no more tokens");
    }

    #[test]
    fn test_multiline_string() {
        let mut lexer = Scanner::new("\"one\ntwo\" nil");

        if let Token::String(loc, lexeme) = lexer.next().expect("a token") {
            assert_eq!(lexeme, "\"one\ntwo\"");
            assert_eq!(loc, Loc::new(1, 1));
        } else {
            panic!("expected a string token");
        }

        // The line counter advanced across the embedded newline.
        assert_eq!(lexer.next().expect("a token"), Token::Nil(Loc::new(2, 6)));
    }

    #[test]
    fn test_unterminated_string() {
        let mut lexer = Scanner::new(r#""oops"#);

        assert_eq!(
            lexer.next().expect("a token"),
            Token::Error(Loc::new(1, 1), "Unterminated string.".to_string())
        );
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Scanner::new(" 123 12.34 12. ");

        let numbers = ["123", "12.34", "12"];
        for number in numbers {
            if let Token::Number(_, lexeme) = lexer.next().expect("a token") {
                assert_eq!(lexeme, number);
            } else {
                panic!("expected a number token");
            }
        }

        assert!(
            matches!(lexer.next(), Some(Token::Dot(_))),
            "expected a dot token"
        );
        assert!(lexer.next().is_none(), "no more tokens");
    }

    #[test]
    fn test_identifiers_and_keywords() {
        let mut lexer = Scanner::new(
            r#"
identifier _id a_b_c
and class else false for fun if nil or print return super this true var while
"#,
        );

        let identifiers = ["identifier", "_id", "a_b_c"];
        for identifier in identifiers {
            if let Token::Identifier(_, lexeme) = lexer.next().expect("a token") {
                assert_eq!(lexeme, identifier);
            } else {
                panic!("expected an identifier token");
            }
        }

        let keywords = [
            "and", "class", "else", "false", "for", "fun", "if", "nil", "or", "print", "return",
            "super", "this", "true", "var", "while",
        ];
        for keyword in keywords {
            assert_eq!(lexer.next().expect("a token").lexeme(), keyword);
        }
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Scanner::new("var a = @;");

        assert!(matches!(lexer.next(), Some(Token::Var(_))));
        assert!(matches!(lexer.next(), Some(Token::Identifier(..))));
        assert!(matches!(lexer.next(), Some(Token::Equal(_))));
        assert_eq!(
            lexer.next().expect("a token"),
            Token::Error(Loc::new(1, 9), "Unexpected character.".to_string())
        );
        assert!(matches!(lexer.next(), Some(Token::Semicolon(_))));
    }
}
