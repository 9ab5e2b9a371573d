//! String substitution and expansion

// Imports
use {
	crate::{
		error::AppError,
		lexer,
		rules::{self, Vars},
	},
	itertools::Itertools,
	std::{io::Write, process::Stdio, sync::LazyLock},
};

/// Expands a word against `vars`. This includes substituting variables and
/// handling quotes.
///
/// Because variables are list-valued, list-producing expansions split the
/// surrounding word across list boundaries, so a word may expand to any
/// number of words.
pub fn expand(input: &str, vars: &Vars, expand_backticks: bool) -> Result<Vec<String>, AppError> {
	let mut parts: Vec<String> = vec![];
	let mut expanded = String::new();
	let mut input = input;
	while !input.is_empty() {
		let Some(j) = input.find(['"', '\'', '`', '$', '\\']) else {
			expanded.push_str(input);
			break;
		};

		expanded.push_str(&input[..j]);
		let c = input[j..].chars().next().expect("Just found a special rune here");
		input = &input[j + 1..];

		let off = match c {
			'\\' => {
				let (out, off) = self::expand_escape(input);
				expanded.push_str(&out);
				off
			},

			'"' => {
				let (out, off) = self::expand_double_quoted(input, vars, expand_backticks)?;
				expanded.push_str(&out);
				off
			},

			'\'' => {
				let (out, off) = self::expand_single_quoted(input);
				expanded.push_str(out);
				off
			},

			'`' => match expand_backticks {
				true => {
					let (out_parts, off) = self::expand_back_quoted(input, vars)?;
					self::splice_parts(&mut parts, &mut expanded, out_parts);
					off
				},

				// When disabled, the backtick is an ordinary character
				false => {
					expanded.push('`');
					0
				},
			},

			'$' => {
				let (out_parts, off) = self::expand_sigil(input, vars)?;
				self::splice_parts(&mut parts, &mut expanded, out_parts);
				off
			},

			_ => unreachable!("Searched for one of `\"'` $\\`"),
		};

		input = &input[off..];
	}

	if !expanded.is_empty() {
		parts.push(expanded);
	}

	Ok(parts)
}

/// Splices a list-valued expansion into the accumulated parts.
///
/// The current accumulator becomes the prefix of the first value,
/// intermediate values become standalone words and the last value becomes
/// the new accumulator.
fn splice_parts(parts: &mut Vec<String>, expanded: &mut String, mut out_parts: Vec<String>) {
	if out_parts.is_empty() {
		return;
	}

	out_parts[0].insert_str(0, expanded);
	*expanded = out_parts.pop().expect("Just checked for non-empty");
	parts.append(&mut out_parts);
}

/// Expands the rune following a `\`.
///
/// Escaped whitespace is kept literally, an escaped newline is a line
/// continuation, and anything else keeps its backslash.
fn expand_escape(input: &str) -> (String, usize) {
	match input.chars().next() {
		Some(c @ ('\t' | ' ')) => (c.to_string(), c.len_utf8()),
		Some('\n') => (String::new(), 1),
		Some(c) => (format!("\\{c}"), c.len_utf8()),
		None => ("\\".to_owned(), 0),
	}
}

/// Expands a double quoted span starting after a `"`.
///
/// The contents are recursively expanded, then joined with single spaces
/// into one word.
fn expand_double_quoted(input: &str, vars: &Vars, expand_backticks: bool) -> Result<(String, usize), AppError> {
	// Find the first non-escaped "
	let mut i = 0;
	while let Some(j) = input[i..].find(['"', '\\']).map(|j| i + j) {
		let c = input[j..].chars().next().expect("Just found a rune here");
		i = j + c.len_utf8();

		match c {
			'"' => return Ok((expand(&input[..j], vars, expand_backticks)?.join(" "), i)),
			_ => match input[i..].chars().next() {
				Some(escaped) => i += escaped.len_utf8(),
				None => break,
			},
		}
	}

	Ok((input.to_owned(), input.len()))
}

/// Expands a single quoted span starting after a `'`.
///
/// The contents are kept literally.
fn expand_single_quoted(input: &str) -> (&str, usize) {
	match input.find('\'') {
		Some(j) => (&input[..j], j + 1),
		None => (input, input.len()),
	}
}

/// The `${name:a%b=c%d}` namelist rewrite form
static NAMELIST_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
	regex::Regex::new(r"^\s*([^:]+)\s*:\s*([^%]*)%([^=]*)\s*=\s*([^%]*)%([^%]*)\s*").expect("Namelist pattern should compile")
});

/// Expands a sigil starting after a `$`.
///
/// Returns the values it produced and the length of the consumed sigil. A
/// sigil that doesn't resolve is preserved verbatim.
fn expand_sigil(input: &str, vars: &Vars) -> Result<(Vec<String>, usize), AppError> {
	let Some(c) = input.chars().next() else {
		return Ok((vec!["$".to_owned()], 0));
	};

	let varname;
	let offset;
	match c {
		// Escaping of `$` with `$$`
		'$' => return Ok((vec!["$".to_owned()], 1)),

		// Bracketed expansions: `${foo}`, or `${foo:a%b=c%d}`
		'{' => {
			let Some(j) = input[1..].find('}') else {
				return Ok((vec![format!("${input}")], input.len()));
			};
			varname = &input[1..1 + j];
			offset = 1 + j + 1;

			// Is this a namelist?
			if let Some(mat) = NAMELIST_PATTERN.captures(varname) {
				let name = mat.get(1).map_or("", |m| m.as_str());
				if rules::is_valid_var_name(name) {
					let (a, b) = (mat.get(2).map_or("", |m| m.as_str()), mat.get(3).map_or("", |m| m.as_str()));
					let (c, d) = (mat.get(4).map_or("", |m| m.as_str()), mat.get(5).map_or("", |m| m.as_str()));
					let Some(values) = vars.get(name) else {
						return Ok((vec![], offset));
					};

					let mut expanded_values = Vec::with_capacity(values.len());
					for value in values {
						match value.strip_prefix(a).and_then(|v| v.strip_suffix(b)) {
							Some(stem) => {
								let rewritten = format!("{c}{stem}{d}");
								expanded_values.extend(expand(&rewritten, vars, false)?);
							},

							// Non-matching values pass through unchanged
							None => expanded_values.push(value),
						}
					}

					return Ok((expanded_values, offset));
				}
			}
		},

		// Bare variables: `$foo`
		_ => {
			let end = input
				.char_indices()
				.find(|&(i, c)| !(c.is_alphabetic() || c == '_' || (i > 0 && c.is_numeric())))
				.map_or(input.len(), |(i, _)| i);

			match end > 0 {
				true => {
					varname = &input[..end];
					offset = end;
				},
				false => {
					let offset = c.len_utf8();
					return Ok((vec![format!("${}", &input[..offset])], offset));
				},
			}
		},
	}

	// Look the name up in the variables, then in the process environment,
	// and preserve the sigil verbatim if both fail.
	if rules::is_valid_var_name(varname) {
		if let Some(values) = vars.get_local(varname) {
			return Ok((values.to_vec(), offset));
		}
		if let Ok(value) = std::env::var(varname) {
			return Ok((vec![value], offset));
		}
	}

	Ok((vec![format!("${}", &input[..offset])], offset))
}

/// Finds and expands all sigils in a recipe, producing a flat string.
///
/// List-valued expansions are joined with single spaces; `\$` escapes to a
/// literal `$` and any other escape passes through as-is.
pub fn expand_recipe_sigils(input: &str, vars: &Vars) -> Result<String, AppError> {
	let mut expanded = String::new();
	let mut input = input;
	while !input.is_empty() {
		let Some(off) = input.find(['$', '\\']) else {
			expanded.push_str(input);
			break;
		};
		expanded.push_str(&input[..off]);
		input = &input[off..];

		let c = input.chars().next().expect("Just found a special rune here");
		input = &input[c.len_utf8()..];
		match c {
			'$' => {
				let (parts, off) = self::expand_sigil(input, vars)?;
				expanded.push_str(&parts.iter().join(" "));
				input = &input[off..];
			},
			_ => match input.chars().next() {
				Some('$') => {
					expanded.push('$');
					input = &input[1..];
				},
				Some(c) => {
					expanded.push('\\');
					expanded.push(c);
					input = &input[c.len_utf8()..];
				},
				None => expanded.push('\\'),
			},
		}
	}

	Ok(expanded)
}

/// Expands all unescaped `%` runes in `input` to `stem`.
///
/// `\%` becomes a literal `%`; any other escape passes through as-is.
pub fn expand_suffixes(input: &str, stem: &str) -> String {
	let mut expanded = String::with_capacity(input.len());
	let mut runes = input.chars();
	while let Some(c) = runes.next() {
		match c {
			'%' => expanded.push_str(stem),
			'\\' => match runes.clone().next() {
				Some('%') => {
					runes.next();
					expanded.push('%');
				},
				_ => expanded.push('\\'),
			},
			c => expanded.push(c),
		}
	}

	expanded
}

/// Expands a backtick quoted span, by executing the contents.
///
/// The span is piped to a subshell's stdin and the subshell's stdout is
/// lexed in barewords mode into the resulting values.
fn expand_back_quoted(input: &str, vars: &Vars) -> Result<(Vec<String>, usize), AppError> {
	let Some(j) = input.find('`') else {
		return Ok((vec![input.to_owned()], input.len()));
	};

	// Resolve the shell from `$shell`, then the configured default
	let (shell, shell_args) = match vars.get_local("shell") {
		Some([shell, ..]) => self::expand_shell(shell, &[], vars.keep_shell_args),
		_ => self::expand_shell(&vars.default_shell, &[], vars.keep_shell_args),
	};
	let cmd_fmt = format!("`{}`", &input[..j]);

	let mut cmd = std::process::Command::new(&shell);
	cmd.args(&shell_args)
		.stdin(Stdio::piped())
		.stdout(Stdio::piped())
		.envs(vars.iter().map(|(name, values)| (name, values.join(" "))));

	let mut child = cmd.spawn().map_err(AppError::spawn_command(&cmd_fmt))?;
	child
		.stdin
		.take()
		.expect("Child stdin should be piped")
		.write_all(input[..j].as_bytes())
		.map_err(AppError::write_command_stdin(&cmd_fmt))?;
	let output = child.wait_with_output().map_err(AppError::wait_command(&cmd_fmt))?;

	let parts = lexer::lex_barewords(&String::from_utf8_lossy(&output.stdout));
	Ok((parts, j + 1))
}

/// Expands a shell invocation into its command and arguments.
///
/// E.g. `"sh -c"` with args `["pwd"]` becomes `sh` with `["-c", "pwd"]`.
/// Without further arguments the invocation's own arguments are dropped,
/// unless `keep_shell_args`, so that `sh -c` degrades to `sh` reading the
/// recipe from stdin.
pub fn expand_shell(shcmd: &str, args: &[String], keep_shell_args: bool) -> (String, Vec<String>) {
	let mut fields = shcmd.split_whitespace();
	let shell = fields.next().unwrap_or("sh").to_owned();
	let shell_args = fields.map(str::to_owned).collect::<Vec<_>>();

	let args = match !shell_args.is_empty() && (!args.is_empty() || keep_shell_args) {
		true => shell_args.into_iter().chain(args.iter().cloned()).collect(),
		false => args.to_vec(),
	};

	(shell, args)
}
