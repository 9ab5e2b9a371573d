//! Parser
//!
//! A state-function mkfile parser. It executes assignments and includes as
//! it goes, and collects rules and variables into a [`RuleSet`].

// Imports
use {
	crate::{
		error::AppError,
		expand::{expand, expand_recipe_sigils},
		lexer::{Lexer, Token, TokenKind},
		recipe::strip_indentation,
		rules::{Pattern, Rule, RuleSet, Vars},
	},
	itertools::Itertools,
	std::{
		mem,
		path::{Path, PathBuf},
		process::{Command, Stdio},
	},
};

/// Parser state.
///
/// Each state describes what the statement collected so far is, and thereby
/// what the next token may be.
#[derive(Clone, Copy, Debug)]
enum ParseState {
	/// Top level, expecting a rule, include or assignment
	TopLevel,

	/// Consumed a `<|`, collecting the command
	PipeInclude,

	/// Consumed a `<`, collecting the file name
	RedirInclude,

	/// Consumed one word at the beginning of a line
	EqualsOrTarget,

	/// Consumed `name =`, collecting the right-hand side
	Assignment,

	/// Collecting targets up to the first `:`
	Targets,

	/// Consumed the first `:`
	AttributesOrPrereqs,

	/// Consumed the second `:`
	Prereqs,

	/// Consumed an entire rule header, expecting a recipe
	Recipe,
}

/// Parser
struct Parser<'a> {
	/// Name of the file being parsed
	name: String,

	/// Full path of the file being parsed
	path: PathBuf,

	/// Tokens consumed on the current statement
	tokenbuf: Vec<Token>,

	/// Rule set being built
	rules: &'a mut RuleSet,
}

/// Parses a mkfile, returning a new rule set
pub fn parse(input: &str, name: &str, path: &Path, vars: Vars) -> Result<RuleSet, AppError> {
	let mut rules = RuleSet::new(vars);
	self::parse_into(input, name, &mut rules, path)?;
	Ok(rules)
}

/// Parses a mkfile, inserting rules and variables into an existing rule set.
///
/// `$mkfiledir` is scoped to the directory of `path` for the duration of
/// this parse.
pub fn parse_into(input: &str, name: &str, rules: &mut RuleSet, path: &Path) -> Result<(), AppError> {
	let old_mkfiledir = rules.vars.remove("mkfiledir");
	let mkfiledir = match path.parent() {
		Some(dir) if dir != Path::new("") => dir.display().to_string(),
		_ => ".".to_owned(),
	};
	rules.vars.set("mkfiledir", vec![mkfiledir]);

	let mut lexer = Lexer::new(input, false);
	let mut parser = Parser {
		name: name.to_owned(),
		path: path.to_owned(),
		tokenbuf: vec![],
		rules,
	};

	let mut state = ParseState::TopLevel;
	while let Some(token) = lexer.next_token() {
		if token.kind == TokenKind::Error {
			return Err(AppError::Lex {
				file: parser.name,
				line: token.line,
				msg:  lexer.err_msg().unwrap_or("unknown lexing error").to_owned(),
			});
		}

		state = parser.step(state, token)?;
	}

	// Insert a dummy newline to allow any final assignment or recipe-less
	// rule to finish.
	let newline = Token {
		kind: TokenKind::Newline,
		val:  "\n".to_owned(),
		line: lexer.line(),
		col:  lexer.col(),
	};
	let _ = parser.step(state, newline)?;

	match old_mkfiledir {
		Some(old) => rules.vars.set("mkfiledir", old),
		None => {
			rules.vars.remove("mkfiledir");
		},
	}

	Ok(())
}

impl Parser<'_> {
	/// Creates a parse error at `found`
	fn parse_error(&self, context: &str, expected: &str, found: &Token) -> AppError {
		AppError::Parse {
			file:     self.name.clone(),
			line:     found.line,
			context:  context.to_owned(),
			expected: expected.to_owned(),
			found:    found.to_string(),
		}
	}

	/// Performs a single state transition on `token`
	fn step(&mut self, state: ParseState, token: Token) -> Result<ParseState, AppError> {
		match state {
			ParseState::TopLevel => match token.kind {
				TokenKind::Newline => Ok(ParseState::TopLevel),
				TokenKind::PipeInclude => Ok(ParseState::PipeInclude),
				TokenKind::RedirInclude => Ok(ParseState::RedirInclude),
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::EqualsOrTarget)
				},
				_ => Err(self.parse_error("parsing mkfile", "a rule, include, or assignment", &token)),
			},

			ParseState::PipeInclude => match token.kind {
				TokenKind::Newline => {
					self.execute_pipe_include(&token)?;
					self.tokenbuf.clear();
					Ok(ParseState::TopLevel)
				},

				// Almost anything goes, the shell sorts it out
				TokenKind::PipeInclude |
				TokenKind::RedirInclude |
				TokenKind::Colon |
				TokenKind::Assign |
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::PipeInclude)
				},

				_ => Err(self.parse_error("parsing piped include", "a shell command", &token)),
			},

			ParseState::RedirInclude => match token.kind {
				TokenKind::Newline => {
					self.execute_redir_include(&token)?;
					self.tokenbuf.clear();
					Ok(ParseState::TopLevel)
				},
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::RedirInclude)
				},
				_ => Err(self.parse_error("parsing include", "a file name", &token)),
			},

			ParseState::EqualsOrTarget => match token.kind {
				TokenKind::Assign => Ok(ParseState::Assignment),
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::Targets)
				},
				TokenKind::Colon => {
					self.tokenbuf.push(token);
					Ok(ParseState::AttributesOrPrereqs)
				},
				_ => Err(self.parse_error("reading a target or assignment", "'=', ':', or another target", &token)),
			},

			ParseState::Assignment => match token.kind {
				TokenKind::Newline => {
					let tokens = mem::take(&mut self.tokenbuf);
					self.rules.execute_assignment(&tokens, &self.name)?;
					Ok(ParseState::TopLevel)
				},
				_ => {
					self.tokenbuf.push(token);
					Ok(ParseState::Assignment)
				},
			},

			ParseState::Targets => match token.kind {
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::Targets)
				},
				TokenKind::Colon => {
					self.tokenbuf.push(token);
					Ok(ParseState::AttributesOrPrereqs)
				},
				_ => Err(self.parse_error("reading a rule's targets", "filename or pattern", &token)),
			},

			ParseState::AttributesOrPrereqs => match token.kind {
				TokenKind::Newline => Ok(ParseState::Recipe),
				TokenKind::Colon => {
					self.tokenbuf.push(token);
					Ok(ParseState::Prereqs)
				},
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::AttributesOrPrereqs)
				},
				_ => Err(self.parse_error(
					"reading a rule's attributes or prerequisites",
					"an attribute, pattern, or filename",
					&token,
				)),
			},

			ParseState::Prereqs => match token.kind {
				TokenKind::Newline => Ok(ParseState::Recipe),
				TokenKind::Word => {
					self.tokenbuf.push(token);
					Ok(ParseState::Prereqs)
				},
				_ => Err(self.parse_error("reading a rule's prerequisites", "filename or pattern", &token)),
			},

			ParseState::Recipe => self.finish_rule(token),
		}
	}

	/// Executes a collected `<|` include by running the command and parsing
	/// its output into the same rule set
	fn execute_pipe_include(&mut self, newline: &Token) -> Result<(), AppError> {
		let mut args = Vec::with_capacity(self.tokenbuf.len());
		for token in &self.tokenbuf {
			args.extend(expand(&token.val, &self.rules.vars, false)?);
		}
		let Some((cmd_name, cmd_args)) = args.split_first() else {
			return Err(AppError::EmptyPipeInclude {
				file: self.name.clone(),
				line: newline.line,
			});
		};
		let cmd_fmt = format!("<|{}", args.iter().join(" "));

		let child = Command::new(cmd_name)
			.args(cmd_args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.spawn()
			.map_err(AppError::spawn_command(&cmd_fmt))?;
		let output = child.wait_with_output().map_err(AppError::wait_command(&cmd_fmt))?;
		if !output.status.success() {
			return Err(AppError::IncludeCommandFailed {
				cmd_fmt,
				status: output.status,
			});
		}

		let stdout = String::from_utf8_lossy(&output.stdout);
		let path = self.path.clone();
		self::parse_into(&stdout, &cmd_fmt, self.rules, &path)
	}

	/// Executes a collected `<` include by parsing the file into the same
	/// rule set
	fn execute_redir_include(&mut self, newline: &Token) -> Result<(), AppError> {
		let filename_raw = self.tokenbuf.iter().map(|token| token.val.as_str()).collect::<String>();

		// Expand variables in the path
		let parts = expand(&filename_raw, &self.rules.vars, false)?;
		let [filename] = parts.as_slice() else {
			return Err(AppError::IncludeFilename {
				file: self.name.clone(),
				line: newline.line,
			});
		};

		let contents = std::fs::read_to_string(filename).map_err(|err| AppError::OpenInclude {
			file: self.name.clone(),
			line: self.tokenbuf.first().map_or(newline.line, |token| token.line),
			path: filename.into(),
			err,
		})?;
		let path = std::path::absolute(filename).unwrap_or_else(|_| PathBuf::from(filename));

		self::parse_into(&contents, filename, self.rules, &path)
	}

	/// Assembles a rule from the collected header tokens.
	///
	/// `token` is the token following the header's newline; a recipe token
	/// belongs to the rule, anything else is re-dispatched at top level.
	fn finish_rule(&mut self, token: Token) -> Result<ParseState, AppError> {
		let tokenbuf = mem::take(&mut self.tokenbuf);
		let line = tokenbuf.first().map_or(token.line, |token| token.line);
		let mut rule = Rule::new(self.name.clone(), line);

		// Find the one or two colons delimiting targets and attributes
		let first_colon = tokenbuf
			.iter()
			.position(|token| token.kind == TokenKind::Colon)
			.unwrap_or(tokenbuf.len());
		let second_colon = tokenbuf
			.get(first_colon + 1..)
			.unwrap_or(&[])
			.iter()
			.position(|token| token.kind == TokenKind::Colon)
			.map(|pos| first_colon + 1 + pos);

		// Attributes, when the rule has a second colon
		let prereqs_start = match second_colon {
			Some(second_colon) => {
				let mut attribs = vec![];
				for token in &tokenbuf[first_colon + 1..second_colon] {
					attribs.extend(expand(&token.val, &self.rules.vars, true)?);
				}
				rule.parse_attribs(&attribs).map_err(|found| AppError::UnknownAttribute {
					file: self.name.clone(),
					line: tokenbuf.get(first_colon + 1).map_or(line, |token| token.line),
					found,
				})?;

				// Snapshot the shell for this rule, unless `S` chose one
				if rule.shell.is_empty() {
					rule.shell = match self.rules.vars.get_local("shell") {
						Some(shell) if !shell.is_empty() => shell.to_vec(),
						_ => vec![self.rules.vars.default_shell.clone()],
					};
				}

				if rule.attrs.regex {
					rule.is_meta = true;
				}

				second_colon + 1
			},
			None => first_colon + 1,
		};

		// Targets
		for token in &tokenbuf[..first_colon] {
			for target in expand(&token.val, &self.rules.vars, true)? {
				let pattern = match rule.attrs.regex {
					true => Pattern::regex(&target).map_err(|err| AppError::InvalidRegex {
						file: self.name.clone(),
						line: token.line,
						pat:  target.clone(),
						err:  Box::new(err),
					})?,
					false => match target.contains('%') {
						true => {
							rule.is_meta = true;
							Pattern::suffix(target)
						},
						false => Pattern::literal(target),
					},
				};
				rule.targets.push(pattern);
			}
		}
		if rule.targets.is_empty() {
			return Err(AppError::RuleNoTargets {
				file: self.name.clone(),
				line,
			});
		}

		// Prereqs
		for token in tokenbuf.get(prereqs_start..).unwrap_or(&[]) {
			rule.prereqs.extend(expand(&token.val, &self.rules.vars, true)?);
		}

		// Recipe
		if token.kind == TokenKind::Recipe {
			let stripped = strip_indentation(&token.val, token.col);
			rule.recipe = expand_recipe_sigils(&stripped, &self.rules.vars)?;
		}

		self.rules.add(rule)?;

		// The current token doesn't belong to this rule
		match token.kind {
			TokenKind::Recipe => Ok(ParseState::TopLevel),
			_ => self.step(ParseState::TopLevel, token),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse_str(input: &str) -> RuleSet {
		let vars = Vars::new("sh -c", false, ":");
		self::parse(input, "mkfile", Path::new("mkfile"), vars).expect("Parse should succeed")
	}

	#[test]
	fn assignment_binds_list() {
		let rules = self::parse_str("x = a b c\n");
		assert_eq!(
			rules.vars.get_local("x"),
			Some(["a".to_owned(), "b".to_owned(), "c".to_owned()].as_slice())
		);
	}

	#[test]
	fn assignment_expands_previous_vars() {
		let rules = self::parse_str("x = 1 2\ny = $x 3\n");
		assert_eq!(
			rules.vars.get_local("y"),
			Some(["1".to_owned(), "2".to_owned(), "3".to_owned()].as_slice())
		);
	}

	#[test]
	fn simple_rule() {
		let rules = self::parse_str("all: a b\n\techo done\n");
		assert_eq!(rules.rules.len(), 1);

		let rule = &rules.rules[0];
		assert_eq!(rule.targets.len(), 1);
		assert_eq!(rule.targets[0].spat, "all");
		assert_eq!(rule.prereqs, vec!["a".to_owned(), "b".to_owned()]);
		assert_eq!(rule.recipe, "echo done\n");
		assert!(!rule.is_meta);
	}

	#[test]
	fn rule_with_attributes() {
		let rules = self::parse_str("clean:VQ: junk\n\trm -f *.o\n");
		let rule = &rules.rules[0];
		assert!(rule.attrs.is_virtual);
		assert!(rule.attrs.quiet);
		assert_eq!(rule.prereqs, vec!["junk".to_owned()]);
		assert_eq!(rule.shell, vec!["sh -c".to_owned()]);
	}

	#[test]
	fn suffix_rule_is_meta() {
		let rules = self::parse_str("%.o: %.c\n\tcc -c $stem.c\n");
		let rule = &rules.rules[0];
		assert!(rule.is_meta);
		assert!(rule.targets[0].is_suffix);
		assert_eq!(rule.prereqs, vec!["%.c".to_owned()]);
	}

	#[test]
	fn regex_rule_is_meta() {
		let rules = self::parse_str(r"(a|b)\.out:R: \1.in
	cp $prereq $target
");
		let rule = &rules.rules[0];
		assert!(rule.is_meta);
		assert!(rule.attrs.regex);
		assert!(rule.targets[0].rpat.is_some());
	}

	#[test]
	fn rules_merge_through_parsing() {
		let rules = self::parse_str("foo: bar\nfoo:\n\ttouch foo\n");
		assert_eq!(rules.rules.len(), 1);
		assert_eq!(rules.rules[0].prereqs, vec!["bar".to_owned()]);
		assert_eq!(rules.rules[0].recipe, "touch foo\n");
	}

	#[test]
	fn ambiguous_recipes_error() {
		let vars = Vars::new("sh -c", false, ":");
		let res = self::parse("foo: a\n\tone\nfoo: b\n\ttwo\n", "mkfile", Path::new("mkfile"), vars);
		assert!(matches!(res, Err(AppError::AmbiguousRecipe { .. })));
	}

	#[test]
	fn recipe_sigils_expand_at_parse_time() {
		let rules = self::parse_str("x = 1 2\nall:\n\techo $x $target\n");
		// `$x` is known at parse time, `$target` is deferred to execution
		assert_eq!(rules.rules[0].recipe, "echo 1 2 $target\n");
	}

	#[test]
	fn variables_in_rule_headers() {
		let rules = self::parse_str("objs = a.o b.o\nall: $objs\n\techo\n");
		assert_eq!(rules.rules[0].prereqs, vec!["a.o".to_owned(), "b.o".to_owned()]);
	}

	#[test]
	fn unknown_attribute_errors() {
		let vars = Vars::new("sh -c", false, ":");
		let res = self::parse("a:Z: b\n", "mkfile", Path::new("mkfile"), vars);
		assert!(matches!(res, Err(AppError::UnknownAttribute { found: 'Z', .. })));
	}

	#[test]
	fn parse_error_on_stray_colon() {
		let vars = Vars::new("sh -c", false, ":");
		let res = self::parse(": foo\n", "mkfile", Path::new("mkfile"), vars);
		assert!(matches!(res, Err(AppError::Parse { .. })));
	}

	#[test]
	fn emitted_rules_reparse_identically() {
		let input = "x = 1 2
all:V: a.o b.o
	echo $x done
%.o:Q: %.c
	cc -c $stem.c
out:Pcmp '-s': dep
	touch out
";
		let rules = self::parse_str(input);
		let emitted = rules.rules.iter().map(Rule::emit).collect::<String>();
		let reparsed = self::parse_str(&emitted);

		assert_eq!(rules.rules.len(), reparsed.rules.len());
		for (rule, other) in rules.rules.iter().zip(&reparsed.rules) {
			assert_eq!(
				rule.targets.iter().map(|target| &target.spat).collect::<Vec<_>>(),
				other.targets.iter().map(|target| &target.spat).collect::<Vec<_>>(),
			);
			assert_eq!(
				rule.targets.iter().map(|target| target.is_suffix).collect::<Vec<_>>(),
				other.targets.iter().map(|target| target.is_suffix).collect::<Vec<_>>(),
			);
			assert_eq!(rule.attrs, other.attrs);
			assert_eq!(rule.prereqs, other.prereqs);
			assert_eq!(rule.recipe, other.recipe);
			assert_eq!(rule.shell, other.shell);
			assert_eq!(rule.program, other.program);
			assert_eq!(rule.is_meta, other.is_meta);
		}
	}

	#[test]
	fn pipe_include() {
		let rules = self::parse_str("<|echo 'x = 5'\nall:\n\techo $x\n");
		assert_eq!(rules.vars.get_local("x"), Some(["5".to_owned()].as_slice()));
		assert_eq!(rules.rules[0].recipe, "echo 5\n");
	}

	#[test]
	fn redir_include() {
		let temp_dir = tempdir::TempDir::new("mk").expect("Should create temp dir");
		let included = temp_dir.path().join("vars.mk");
		std::fs::write(&included, "y = 7\n").expect("Should write include");

		let input = format!("<{}\nall:\n\techo $y\n", included.display());
		let rules = self::parse_str(&input);
		assert_eq!(rules.vars.get_local("y"), Some(["7".to_owned()].as_slice()));
	}

	#[test]
	fn mkfiledir_is_scoped() {
		let rules = self::parse_str("dir = $mkfiledir\n");
		assert_eq!(rules.vars.get_local("dir"), Some([".".to_owned()].as_slice()));
		assert_eq!(rules.vars.get_local("mkfiledir"), None);
	}
}
