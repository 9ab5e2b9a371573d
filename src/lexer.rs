//! Lexer
//!
//! A state-function lexer over a [`Reader`]. The current state is a value
//! that is stepped repeatedly; each step may emit tokens into a queue and
//! returns the next state, or `None` once the input is exhausted.

// Imports
use {
	crate::reader::Reader,
	std::{collections::VecDeque, fmt, mem},
};

/// Runes that cannot be part of a bare (unquoted) word.
const NON_BARE_RUNES: &str = " \t\n\r\\=:#'\"$";

/// Token kind
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TokenKind {
	/// Lexing error
	Error,

	/// End of a non-empty logical line
	Newline,

	/// A word
	Word,

	/// `<|` at top level
	PipeInclude,

	/// `<` at top level
	RedirInclude,

	/// `:` at top level
	Colon,

	/// `=` at top level
	Assign,

	/// An indented recipe block
	Recipe,
}

impl fmt::Display for TokenKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Error => "[Error]",
			Self::Newline => "[Newline]",
			Self::Word => "[Word]",
			Self::PipeInclude => "[PipeInclude]",
			Self::RedirInclude => "[RedirInclude]",
			Self::Colon => "[Colon]",
			Self::Assign => "[Assign]",
			Self::Recipe => "[Recipe]",
		};
		f.write_str(s)
	}
}

/// Token
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Token {
	/// Token kind
	pub kind: TokenKind,

	/// Token string
	pub val: String,

	/// Line where the token was found
	pub line: usize,

	/// Column on which the token began
	pub col: usize,
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.kind {
			TokenKind::Newline => f.write_str("\\n"),
			_ => f.write_str(&self.val),
		}
	}
}

/// Lexer state.
///
/// Each state is simultaneously the position of the lexer and the next
/// action it will perform.
#[derive(Clone, Copy, Debug)]
enum LexState {
	/// Top level of the mkfile
	TopLevel,

	/// Skipping a `#` comment
	Comment,

	/// After a `<`
	Include,

	/// At a `:`
	Colon,

	/// At a `=`
	Assign,

	/// Inside a bare word
	BareWord,

	/// Inside a `"`-quoted span
	DoubleQuotedWord,

	/// Inside a `'`-quoted span
	SingleQuotedWord,

	/// Inside a backtick-quoted span
	BackQuotedWord,

	/// Inside a `${...}` span
	BracketExpansion,

	/// Inside an indented recipe block
	Recipe,
}

/// Lexer
#[derive(Clone, Debug)]
pub struct Lexer {
	/// Underlying reader
	reader: Reader,

	/// Runes of the token being built
	value: String,

	/// Tokens ready to be handed out
	output: VecDeque<Token>,

	/// Column on which the current token began
	start_col: usize,

	/// First error message encountered, if any
	err_msg: Option<String>,

	/// Lex only a single line of words
	barewords: bool,

	/// Current state
	state: Option<LexState>,
}

impl Lexer {
	/// Creates a new lexer over `input`.
	///
	/// With `barewords`, the lexer lexes a single line of words and
	/// terminates at the first newline, without emitting it.
	pub fn new(input: &str, barewords: bool) -> Self {
		Self {
			reader: Reader::new(input),
			value: String::new(),
			output: VecDeque::new(),
			start_col: 0,
			err_msg: None,
			barewords,
			state: Some(LexState::TopLevel),
		}
	}

	/// Returns the line the reader is currently on
	pub fn line(&self) -> usize {
		self.reader.line
	}

	/// Returns the column the reader is currently on
	pub fn col(&self) -> usize {
		self.reader.col
	}

	/// Returns the first error message encountered, if any
	pub fn err_msg(&self) -> Option<&str> {
		self.err_msg.as_deref()
	}

	/// Returns the next token, or `None` once the input is exhausted
	pub fn next_token(&mut self) -> Option<Token> {
		while self.state.is_some() && self.output.is_empty() {
			let state = self.state.take().expect("Just checked for a state");
			self.state = self.step(state);
		}
		self.output.pop_front()
	}

	/// Records a lexing error
	fn lex_error(&mut self, what: String) {
		if self.err_msg.is_none() {
			self.err_msg = Some(what);
		}
		self.emit(TokenKind::Error);
	}

	/// Consumes the next rune into the current token
	fn advance(&mut self) {
		if let Some(c) = self.reader.next() {
			self.value.push(c);
		}
	}

	/// Consumes the next rune without keeping it
	fn skip(&mut self) {
		self.reader.next();
		self.value.clear();
		self.start_col = self.reader.col;
	}

	/// Emits the current token
	fn emit(&mut self, kind: TokenKind) {
		self.output.push_back(Token {
			kind,
			val: mem::take(&mut self.value),
			line: self.reader.line,
			col: self.start_col,
		});
		self.start_col = 0;
	}

	/// Consumes the next rune if it is in `valid`
	fn accept(&mut self, valid: &str) -> bool {
		match self.reader.peek() {
			Some(c) if valid.contains(c) => {
				self.advance();
				true
			},
			_ => false,
		}
	}

	/// Consumes runes while they are in `valid`
	fn accept_run(&mut self, valid: &str) {
		while self.reader.peek().is_some_and(|c| valid.contains(c)) {
			self.advance();
		}
	}

	/// Consumes runes until one in `invalid` is encountered.
	///
	/// Reaching the end of the input instead is an error.
	fn accept_until(&mut self, invalid: &str) {
		self.accept_until_or_eof(invalid);
		if self.reader.peek().is_none() {
			self.lex_error(format!("end of file encountered while looking for one of: {invalid}"));
		}
	}

	/// Consumes runes until one in `invalid`, or the end of the input, is encountered
	fn accept_until_or_eof(&mut self, invalid: &str) {
		while self.reader.peek().is_some_and(|c| !invalid.contains(c)) {
			self.advance();
		}
	}

	/// Skips runes while they are in `valid`
	fn skip_run(&mut self, valid: &str) {
		while self.reader.peek().is_some_and(|c| valid.contains(c)) {
			self.skip();
		}
	}

	/// Skips runes until one in `invalid` is encountered.
	///
	/// Reaching the end of the input instead is an error.
	fn skip_until(&mut self, invalid: &str) {
		while self.reader.peek().is_some_and(|c| !invalid.contains(c)) {
			self.skip();
		}
		if self.reader.peek().is_none() {
			self.lex_error(format!("end of file encountered while looking for one of: {invalid}"));
		}
	}

	/// Performs a single state transition
	fn step(&mut self, state: LexState) -> Option<LexState> {
		match state {
			LexState::TopLevel => self.lex_top_level(),
			LexState::Comment => self.lex_comment(),
			LexState::Include => self.lex_include(),
			LexState::Colon => self.lex_colon(),
			LexState::Assign => self.lex_assign(),
			LexState::BareWord => self.lex_bare_word(),
			LexState::DoubleQuotedWord => self.lex_double_quoted_word(),
			LexState::SingleQuotedWord => self.lex_single_quoted_word(),
			LexState::BackQuotedWord => self.lex_back_quoted_word(),
			LexState::BracketExpansion => self.lex_bracket_expansion(),
			LexState::Recipe => self.lex_recipe(),
		}
	}

	fn lex_top_level(&mut self) -> Option<LexState> {
		loop {
			self.skip_run(" \t\r");

			// Emit a newline token if we are ending a non-empty line
			if self.reader.peek() == Some('\n') && !self.reader.indented {
				self.advance();
				match self.barewords {
					true => return None,
					false => self.emit(TokenKind::Newline),
				}
			}
			self.skip_run(" \t\r\n");

			// Line continuation
			match self.reader.peek() == Some('\\') && self.reader.peek_n(1) == Some('\n') {
				true => {
					self.advance();
					self.advance();
					self.reader.indented = false;
				},
				false => break,
			}
		}

		if self.reader.indented && self.reader.col > 0 {
			return Some(LexState::Recipe);
		}

		match self.reader.peek()? {
			'#' => Some(LexState::Comment),
			'<' => Some(LexState::Include),
			':' => Some(LexState::Colon),
			'=' => Some(LexState::Assign),
			'"' => Some(LexState::DoubleQuotedWord),
			'\'' => Some(LexState::SingleQuotedWord),
			'`' => Some(LexState::BackQuotedWord),
			_ => Some(LexState::BareWord),
		}
	}

	fn lex_colon(&mut self) -> Option<LexState> {
		self.advance();
		self.emit(TokenKind::Colon);
		Some(LexState::TopLevel)
	}

	fn lex_assign(&mut self) -> Option<LexState> {
		self.advance();
		self.emit(TokenKind::Assign);
		Some(LexState::TopLevel)
	}

	fn lex_comment(&mut self) -> Option<LexState> {
		// '#'
		self.skip();
		self.skip_until("\n");
		Some(LexState::TopLevel)
	}

	fn lex_include(&mut self) -> Option<LexState> {
		// '<'
		self.advance();
		match self.accept("|") {
			true => self.emit(TokenKind::PipeInclude),
			false => self.emit(TokenKind::RedirInclude),
		}
		Some(LexState::TopLevel)
	}

	fn lex_double_quoted_word(&mut self) -> Option<LexState> {
		// '"'
		self.advance();
		while !matches!(self.reader.peek(), Some('"') | None) {
			self.accept_until("\\\"");
			if self.accept("\\") {
				self.accept("\"");
			}
		}

		if self.reader.peek().is_none() {
			self.lex_error("end of file encountered while parsing a quoted string.".to_owned());
		}

		// '"'
		self.advance();
		Some(LexState::BareWord)
	}

	fn lex_back_quoted_word(&mut self) -> Option<LexState> {
		// '`'
		self.advance();
		self.accept_until("`");
		// '`'
		self.advance();
		Some(LexState::BareWord)
	}

	fn lex_single_quoted_word(&mut self) -> Option<LexState> {
		// '\''
		self.advance();
		self.accept_until("'");
		// '\''
		self.advance();
		Some(LexState::BareWord)
	}

	fn lex_recipe(&mut self) -> Option<LexState> {
		loop {
			self.accept_until_or_eof("\n");
			self.accept_run(" \t\n\r");
			if !self.reader.indented || self.reader.col == 0 {
				break;
			}
		}

		if self.value.chars().any(|c| !c.is_whitespace()) {
			self.emit(TokenKind::Recipe);
		} else {
			self.value.clear();
		}
		Some(LexState::TopLevel)
	}

	fn lex_bare_word(&mut self) -> Option<LexState> {
		self.accept_until(NON_BARE_RUNES);
		match self.reader.peek() {
			Some('"') => return Some(LexState::DoubleQuotedWord),
			Some('\'') => return Some(LexState::SingleQuotedWord),
			Some('`') => return Some(LexState::BackQuotedWord),
			Some('\\') => match self.reader.peek_n(1) {
				// A continuation ends the word
				Some('\n' | '\r') => {
					if !self.value.is_empty() {
						self.emit(TokenKind::Word);
					}
					self.skip();
					self.skip();
					return Some(LexState::TopLevel);
				},

				// Any other escape is kept in the word
				_ => {
					self.advance();
					self.advance();
					return Some(LexState::BareWord);
				},
			},
			Some('$') => match self.reader.peek_n(1) {
				Some('{') => return Some(LexState::BracketExpansion),
				_ => {
					self.advance();
					return Some(LexState::BareWord);
				},
			},
			_ => (),
		}

		if !self.value.is_empty() {
			self.emit(TokenKind::Word);
		}

		Some(LexState::TopLevel)
	}

	fn lex_bracket_expansion(&mut self) -> Option<LexState> {
		// '$'
		self.advance();
		// '{'
		self.advance();
		self.accept_until("}");
		// '}'
		self.advance();
		Some(LexState::BareWord)
	}
}

/// Lexes `input` in barewords mode, returning the words of its first line.
///
/// This is how backtick output is split into words.
pub fn lex_barewords(input: &str) -> Vec<String> {
	let mut lexer = Lexer::new(input, true);
	let mut words = vec![];
	while let Some(tok) = lexer.next_token() {
		words.push(tok.val);
	}
	words
}
