//! Recipe execution
//!
//! Formats a rule's recipe for a resolved target, echoes it and runs it
//! through the configured shell.

// Imports
use {
	crate::{
		error::AppError,
		expand::{expand_recipe_sigils, expand_shell},
		graph::{Edge, Node},
		rules::{RuleSet, Vars},
	},
	itertools::Itertools,
	std::{
		collections::HashMap,
		io::Write,
		mem,
		process::Stdio,
		sync::{Mutex, PoisonError},
	},
	tokio::{io::AsyncWriteExt, process::Command},
};

/// Ansi color codes
const ANSI_TERM_DEFAULT: &str = "\x1b[0m";
const ANSI_TERM_BLUE: &str = "\x1b[34m";
const ANSI_TERM_BRIGHT: &str = "\x1b[1m";
const ANSI_TERM_UNDERLINE: &str = "\x1b[4m";

/// Lock on standard out, so recipe echoes don't interleave with each other
static MSG_LOCK: Mutex<()> = Mutex::new(());

/// Unindents a recipe so that it begins at column 0.
///
/// Each line loses up to `min_col` leading blanks, stopping at the first
/// non-blank rune. (This is mainly for recipes in python, or other
/// indentation-significant languages.)
pub fn strip_indentation(s: &str, min_col: usize) -> String {
	let mut output = String::with_capacity(s.len());
	for line in s.split_inclusive('\n') {
		let mut strip = 0;
		for c in line.chars().take(min_col) {
			if c != ' ' && c != '\t' {
				break;
			}
			strip += c.len_utf8();
		}
		output.push_str(&line[strip..]);
	}

	output
}

/// Writes `s` with every line but the first indented by `ind` spaces
pub fn print_indented(out: &mut impl Write, s: &str, ind: usize) {
	let indentation = " ".repeat(ind);
	for (i, line) in s.split_inclusive('\n').enumerate() {
		if i > 0 {
			let _ = out.write_all(indentation.as_bytes());
		}
		let _ = out.write_all(line.as_bytes());
	}
}

/// Echoes a recipe about to be executed
fn print_recipe(target: &str, recipe: &str, quiet: bool, color: bool) {
	let _guard = MSG_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
	let stdout = std::io::stdout();
	let mut stdout = stdout.lock();

	match color {
		false => {
			let _ = write!(stdout, "{target}: ");
		},
		true => {
			let _ = write!(
				stdout,
				"{ANSI_TERM_BLUE}{ANSI_TERM_BRIGHT}{ANSI_TERM_UNDERLINE}{target}{ANSI_TERM_DEFAULT} \u{2192} \
				 {ANSI_TERM_BLUE}"
			);
		},
	}

	match quiet {
		true => {
			let _ = writeln!(stdout, "{}", match color {
				true => "\u{2026}",
				false => "...",
			});
		},
		false => {
			self::print_indented(&mut stdout, recipe, target.len() + 3);
			if recipe.is_empty() {
				let _ = stdout.write_all(b"\n");
			}
		},
	}

	if color {
		let _ = stdout.write_all(ANSI_TERM_DEFAULT.as_bytes());
	}
	let _ = stdout.flush();
}

/// Executes the recipe of `edge` to bring `node` up to date.
///
/// The recipe's sigils are expanded against the per-target variables, the
/// recipe is echoed unless the rule is quiet, and the body is piped to the
/// resolved shell's stdin with the merged variables in its environment.
pub async fn execute(node: &Node, edge: &Edge, rules: &RuleSet, dry_run: bool, color: bool) -> Result<(), AppError> {
	let rule = &rules.rules[edge.rule];

	// Per-target variables
	let mut recipe_vars = HashMap::new();
	recipe_vars.insert("target".to_owned(), vec![node.name.clone()]);
	if rule.is_meta {
		match rule.attrs.regex {
			true =>
				for (i, sub) in edge.matches.iter().enumerate() {
					recipe_vars.insert(format!("stem{i}"), vec![sub.clone()]);
				},
			false =>
				if let Some(stem) = &edge.stem {
					recipe_vars.insert("stem".to_owned(), vec![stem.clone()]);
				},
		}
	}

	let prereqs = edge.prereqs.iter().map(|prereq| prereq.name.clone()).collect::<Vec<_>>();
	for (i, prereq) in prereqs.iter().enumerate() {
		recipe_vars.insert(format!("prereq{}", i + 1), vec![prereq.clone()]);
	}
	recipe_vars.insert("prereq".to_owned(), prereqs);

	// Setup the shell
	let (shell, shell_args) = match rule.shell.is_empty() {
		false => expand_shell(&rule.shell[0], &rule.shell[1..], rules.vars.keep_shell_args),
		true => expand_shell(&rules.vars.default_shell, &[], rules.vars.keep_shell_args),
	};
	recipe_vars.insert(
		"shell".to_owned(),
		std::iter::once(shell.clone()).chain(shell_args.iter().cloned()).collect(),
	);

	// Build the command
	let vars = Vars::with_values(recipe_vars, &rules.vars);
	let input = expand_recipe_sigils(&rule.recipe, &vars)?;

	self::print_recipe(&node.name, &input, rule.attrs.quiet, color);
	if dry_run {
		return Ok(());
	}

	// Construct the execution environment: the global variables overlaid
	// with the per-target ones, each encoded as a delimiter-joined list.
	let delim = &rules.vars.list_delim;
	let mut cmd = Command::new(&shell);
	cmd.args(&shell_args).stdin(Stdio::piped());
	for (name, values) in rules.vars.iter() {
		cmd.env(name, values.join(delim));
	}
	for (name, values) in vars.iter() {
		cmd.env(name, values.join(delim));
	}

	let cmd_fmt = std::iter::once(&shell).chain(&shell_args).join(" ");
	tracing::debug!(target=%node.name, cmd=%cmd_fmt, "Executing recipe");

	let mut child = cmd.spawn().map_err(AppError::spawn_command(&cmd_fmt))?;
	let mut stdin = child.stdin.take().expect("Child stdin should be piped");
	stdin
		.write_all(input.as_bytes())
		.await
		.map_err(AppError::write_command_stdin(&cmd_fmt))?;
	mem::drop(stdin);

	let status = child.wait().await.map_err(AppError::wait_command(&cmd_fmt))?;
	if !status.success() {
		// Delete the target when the rule asks for it
		if rule.attrs.del_failed && !rule.attrs.is_virtual {
			match tokio::fs::remove_file(&node.name).await {
				Ok(()) => tracing::debug!(target=%node.name, "Deleted target after failed recipe"),
				Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
				Err(err) => return Err(AppError::remove_file(&node.name)(err)),
			}
		}

		return Err(AppError::RecipeFailed {
			target: node.name.clone(),
			status,
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strip_uniform_indentation() {
		assert_eq!(self::strip_indentation("\techo a\n\techo b\n", 1), "echo a\necho b\n");
		assert_eq!(self::strip_indentation("  a\n  b\n", 2), "a\nb\n");
	}

	#[test]
	fn strip_stops_at_non_blank() {
		assert_eq!(self::strip_indentation("a\n\tb\n", 1), "a\nb\n");
	}

	#[test]
	fn strip_keeps_deeper_indentation() {
		// Recipes in indentation-significant languages keep their structure
		assert_eq!(self::strip_indentation("\tif x:\n\t\ty()\n", 1), "if x:\n\ty()\n");
	}

	#[test]
	fn strip_keeps_blank_lines() {
		assert_eq!(self::strip_indentation("\ta\n\n\tb\n", 1), "a\n\nb\n");
	}

	#[test]
	fn print_indented_lines() {
		let mut out = vec![];
		self::print_indented(&mut out, "a\nb\nc\n", 2);
		assert_eq!(out, b"a\n  b\n  c\n");
	}
}
