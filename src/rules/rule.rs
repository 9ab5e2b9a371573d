//! Rule

// Imports
use super::{Attrs, Pattern};

/// A single rule
#[derive(Clone, Debug)]
pub struct Rule {
	/// Non-empty list of targets
	pub targets: Vec<Pattern>,

	/// Rule attributes
	pub attrs: Attrs,

	/// Possibly empty prerequisite templates.
	///
	/// These still contain `%` and `\k` references, substituted when the
	/// rule is applied to a target.
	pub prereqs: Vec<String>,

	/// Explicit shell invocation for the recipe, if any
	pub shell: Vec<String>,

	/// `P` attribute program and arguments, if any
	pub program: Vec<String>,

	/// Recipe source, stripped of its leading indentation
	pub recipe: String,

	/// Whether any target is non-constant
	pub is_meta: bool,

	/// File where the rule is defined
	pub file: String,

	/// Line on which the rule is defined
	pub line: usize,
}

impl Rule {
	/// Creates a new, empty, rule defined at `file:line`
	pub fn new(file: impl Into<String>, line: usize) -> Self {
		Self {
			targets: vec![],
			attrs: Attrs::default(),
			prereqs: vec![],
			shell: vec![],
			program: vec![],
			recipe: String::new(),
			is_meta: false,
			file: file.into(),
			line,
		}
	}

	/// Returns whether this rule has a non-blank recipe
	pub fn has_recipe(&self) -> bool {
		!self.recipe.trim().is_empty()
	}

	/// Re-emits this rule as mkfile source.
	///
	/// Targets, prerequisites and the `P`/`S` arguments are single-quoted,
	/// so parsing the output against the same variables yields an
	/// equivalent rule. Only one of the program and the shell fits in the
	/// attribute section; the program wins and the shell is re-derived
	/// from context on reparse.
	pub fn emit(&self) -> String {
		let mut out = String::new();
		for (i, target) in self.targets.iter().enumerate() {
			if i > 0 {
				out.push(' ');
			}
			out.push('\'');
			out.push_str(&target.spat);
			out.push('\'');
		}
		out.push(':');

		let mut attr_words = vec![];
		let mut flags = String::new();
		for (flag, set) in [
			('D', self.attrs.del_failed),
			('E', self.attrs.nonstop),
			('N', self.attrs.forced_timestamp),
			('n', self.attrs.nonvirtual),
			('Q', self.attrs.quiet),
			('R', self.attrs.regex),
			('U', self.attrs.update),
			('V', self.attrs.is_virtual),
			('X', self.attrs.exclusive),
		] {
			if set {
				flags.push(flag);
			}
		}
		if !flags.is_empty() {
			attr_words.push(flags);
		}
		if let Some((head, rest)) = self.program.split_first() {
			attr_words.push(format!("P'{head}'"));
			attr_words.extend(rest.iter().map(|arg| format!("'{arg}'")));
		} else if let Some((head, rest)) = self.shell.split_first() {
			attr_words.push(format!("S'{head}'"));
			attr_words.extend(rest.iter().map(|arg| format!("'{arg}'")));
		}
		if !attr_words.is_empty() {
			out.push_str(&attr_words.join(" "));
			out.push(':');
		}

		for prereq in &self.prereqs {
			out.push_str(" '");
			out.push_str(prereq);
			out.push('\'');
		}
		out.push('\n');

		for line in self.recipe.split_inclusive('\n') {
			out.push('\t');
			out.push_str(line);
		}
		if !self.recipe.is_empty() && !self.recipe.ends_with('\n') {
			out.push('\n');
		}

		out
	}

	/// Returns whether this rule's target patterns are string-equal, in
	/// order, to `other`'s
	pub fn same_targets(&self, other: &Self) -> bool {
		self.targets.len() == other.targets.len() &&
			self.targets
				.iter()
				.zip(&other.targets)
				.all(|(lhs, rhs)| lhs.spat == rhs.spat)
	}

	/// Reads attributes from words, updating this rule.
	///
	/// The `P` and `S` attributes consume the rest of their word, plus all
	/// following words, as the program / shell arguments. Returns the
	/// offending character on an unknown attribute.
	pub fn parse_attribs(&mut self, inputs: &[String]) -> Result<(), char> {
		for (i, input) in inputs.iter().enumerate() {
			for (pos, c) in input.char_indices() {
				match c {
					'D' => self.attrs.del_failed = true,
					'E' => self.attrs.nonstop = true,
					'N' => self.attrs.forced_timestamp = true,
					'n' => self.attrs.nonvirtual = true,
					'Q' => self.attrs.quiet = true,
					'R' => self.attrs.regex = true,
					'U' => self.attrs.update = true,
					'V' => self.attrs.is_virtual = true,
					'X' => self.attrs.exclusive = true,
					'P' => {
						let rest = &input[pos + c.len_utf8()..];
						if !rest.is_empty() {
							self.program.push(rest.to_owned());
						}
						self.program.extend(inputs[i + 1..].iter().cloned());
						return Ok(());
					},
					'S' => {
						let rest = &input[pos + c.len_utf8()..];
						if !rest.is_empty() {
							self.shell.push(rest.to_owned());
						}
						self.shell.extend(inputs[i + 1..].iter().cloned());
						return Ok(());
					},
					c => return Err(c),
				}
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn simple_attribs() {
		let mut rule = Rule::new("mkfile", 1);
		rule.parse_attribs(&["QV".to_owned(), "X".to_owned()]).expect("Should parse");
		assert!(rule.attrs.quiet);
		assert!(rule.attrs.is_virtual);
		assert!(rule.attrs.exclusive);
		assert!(!rule.attrs.regex);
	}

	#[test]
	fn unknown_attrib() {
		let mut rule = Rule::new("mkfile", 1);
		assert_eq!(rule.parse_attribs(&["Qz".to_owned()]), Err('z'));
	}

	#[test]
	fn shell_attrib_consumes_rest() {
		let mut rule = Rule::new("mkfile", 1);
		rule.parse_attribs(&["QSrc".to_owned(), "-v".to_owned()])
			.expect("Should parse");
		assert!(rule.attrs.quiet);
		assert_eq!(rule.shell, vec!["rc".to_owned(), "-v".to_owned()]);
	}

	#[test]
	fn emit_format() {
		let mut rule = Rule::new("mkfile", 1);
		rule.targets = vec![Pattern::literal("foo")];
		rule.prereqs = vec!["bar".to_owned()];
		rule.attrs.quiet = true;
		rule.recipe = "touch foo\n".to_owned();

		assert_eq!(rule.emit(), "'foo':Q: 'bar'\n\ttouch foo\n");
	}

	#[test]
	fn emit_without_attributes() {
		let mut rule = Rule::new("mkfile", 1);
		rule.targets = vec![Pattern::literal("a"), Pattern::literal("b")];
		rule.prereqs = vec!["c".to_owned()];

		assert_eq!(rule.emit(), "'a' 'b': 'c'\n");
	}

	#[test]
	fn program_attrib_consumes_rest() {
		let mut rule = Rule::new("mkfile", 1);
		rule.parse_attribs(&["Pcmp".to_owned(), "-s".to_owned()])
			.expect("Should parse");
		assert_eq!(rule.program, vec!["cmp".to_owned(), "-s".to_owned()]);
	}
}
