//! Rules
//!
//! Mkfiles are parsed into a [`RuleSet`]: the accumulated rules with their
//! recipes, plus the variables assigned along the way, which get expanded
//! when evaluating rules and recipes.

// Modules
mod attrs;
mod pattern;
mod rule;

// Exports
pub use {attrs::Attrs, pattern::Pattern, rule::Rule};

// Imports
use {
	crate::{
		error::AppError,
		expand::expand,
		lexer::{Token, TokenKind},
	},
	std::{collections::HashMap, env},
};

/// Variable environment.
///
/// Variables are list-valued throughout. Lookup checks the in-memory
/// mapping first, then falls back to the process environment, whose values
/// are treated as single-element lists.
///
/// Also carries the shell configuration, since both backtick expansion and
/// recipe execution need it wherever variables are available.
#[derive(Clone, Debug)]
pub struct Vars {
	/// All assigned variables
	values: HashMap<String, Vec<String>>,

	/// Default shell invocation, used when no `shell` variable is set
	pub default_shell: String,

	/// Keep shell arguments even when the recipe is passed on stdin
	pub keep_shell_args: bool,

	/// Delimiter used to join list values in the child environment
	pub list_delim: String,
}

impl Vars {
	/// Creates a new, empty, variable environment
	pub fn new(default_shell: impl Into<String>, keep_shell_args: bool, list_delim: impl Into<String>) -> Self {
		Self {
			values: HashMap::new(),
			default_shell: default_shell.into(),
			keep_shell_args,
			list_delim: list_delim.into(),
		}
	}

	/// Creates a variable environment with the values of `values` and the
	/// configuration of `other`
	pub fn with_values(values: HashMap<String, Vec<String>>, other: &Self) -> Self {
		Self {
			values,
			default_shell: other.default_shell.clone(),
			keep_shell_args: other.keep_shell_args,
			list_delim: other.list_delim.clone(),
		}
	}

	/// Returns the value of a variable, falling back to the process environment
	pub fn get(&self, name: &str) -> Option<Vec<String>> {
		match self.values.get(name) {
			Some(values) => Some(values.clone()),
			None => env::var(name).ok().map(|value| vec![value]),
		}
	}

	/// Returns the value of a variable, without the process environment fallback
	pub fn get_local(&self, name: &str) -> Option<&[String]> {
		self.values.get(name).map(Vec::as_slice)
	}

	/// Assigns a variable
	pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
		self.values.insert(name.into(), values);
	}

	/// Removes a variable, returning its old value
	pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
		self.values.remove(name)
	}

	/// Iterates over all assigned variables
	pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
		self.values.iter()
	}
}

/// Returns whether `name` is a valid variable name
pub fn is_valid_var_name(name: &str) -> bool {
	!name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// A set of rules
#[derive(Clone, Debug)]
pub struct RuleSet {
	/// Variables
	pub vars: Vars,

	/// All rules, in definition order
	pub rules: Vec<Rule>,

	/// Maps a constant target to the indices of the rules that name it
	target_rules: HashMap<String, Vec<usize>>,
}

impl RuleSet {
	/// Creates a new, empty, rule set
	pub fn new(vars: Vars) -> Self {
		Self {
			vars,
			rules: vec![],
			target_rules: HashMap::new(),
		}
	}

	/// Adds a rule to the rule set.
	///
	/// When the rule's target patterns are string-equal, in order, to an
	/// existing rule's, the two are merged instead:
	/// - a recipe-less existing rule adopts the new rule's recipe, with the
	///   prerequisites of both;
	/// - two recipes with differing prerequisites are an error;
	/// - a recipe-less redefinition with the same prerequisites is a no-op;
	/// - otherwise the new rule overrides the existing one in place.
	pub fn add(&mut self, rule: Rule) -> Result<(), AppError> {
		for existing in &mut self.rules {
			if !existing.same_targets(&rule) {
				continue;
			}

			let has_existing = existing.has_recipe();
			let has_new = rule.has_recipe();
			let same_prereqs = existing.prereqs == rule.prereqs;

			if !has_existing && has_new {
				existing.prereqs.extend(rule.prereqs);
				existing.recipe = rule.recipe;
				existing.shell = rule.shell;
				existing.program = rule.program;
				existing.attrs = rule.attrs;
				return Ok(());
			}
			if has_existing && has_new && !same_prereqs {
				return Err(AppError::AmbiguousRecipe {
					file:   rule.file,
					line:   rule.line,
					target: rule.targets[0].spat.clone(),
				});
			}
			if has_existing && !has_new && same_prereqs {
				return Ok(());
			}
			if same_prereqs {
				*existing = rule;
				return Ok(());
			}
		}

		// No merge, append as a new rule and index its constant targets
		let rule_idx = self.rules.len();
		for target in &rule.targets {
			if target.rpat.is_none() {
				self.target_rules.entry(target.spat.clone()).or_default().push(rule_idx);
			}
		}
		self.rules.push(rule);

		Ok(())
	}

	/// Returns the indices of the rules whose constant targets name `target`
	pub fn rules_for_target(&self, target: &str) -> &[usize] {
		self.target_rules.get(target).map_or(&[], Vec::as_slice)
	}

	/// Parses and executes an assignment statement from its tokens.
	///
	/// `tokens[0]` is the variable name, the rest is the right-hand side.
	pub fn execute_assignment(&mut self, tokens: &[Token], file: &str) -> Result<(), AppError> {
		let assignee = &tokens[0].val;
		if !self::is_valid_var_name(assignee) {
			return Err(AppError::InvalidAssignmentTarget {
				file: file.to_owned(),
				line: tokens[0].line,
				name: assignee.clone(),
			});
		}

		// Interpret the tokens in assignment context: non-word tokens, and
		// words without a word directly before them, concatenate onto the
		// previous element, preserving the word boundaries as lexed.
		let mut input: Vec<String> = vec![];
		for (i, token) in tokens.iter().enumerate().skip(1) {
			let starts_word = token.kind == TokenKind::Word && (i == 1 || tokens[i - 1].kind == TokenKind::Word);
			match (starts_word, input.last_mut()) {
				(false, Some(last)) => last.push_str(&token.val),
				_ => input.push(token.val.clone()),
			}
		}

		// Then expand the values
		let mut values = vec![];
		for part in &input {
			values.extend(expand(part, &self.vars, true)?);
		}
		self.vars.set(assignee.clone(), values);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_vars() -> Vars {
		Vars::new("sh -c", false, ":")
	}

	fn rule_with(targets: &[&str], prereqs: &[&str], recipe: &str) -> Rule {
		let mut rule = Rule::new("mkfile", 1);
		rule.targets = targets.iter().map(|&t| Pattern::literal(t)).collect();
		rule.prereqs = prereqs.iter().map(|&p| p.to_owned()).collect();
		rule.recipe = recipe.to_owned();
		rule
	}

	#[test]
	fn merge_prereqs_into_recipe() {
		let mut rules = RuleSet::new(self::test_vars());
		rules.add(self::rule_with(&["foo"], &["bar"], "")).expect("Should add");
		rules
			.add(self::rule_with(&["foo"], &[], "touch foo\n"))
			.expect("Should merge");

		assert_eq!(rules.rules.len(), 1);
		assert_eq!(rules.rules[0].prereqs, vec!["bar".to_owned()]);
		assert_eq!(rules.rules[0].recipe, "touch foo\n");
	}

	#[test]
	fn ambiguous_recipe() {
		let mut rules = RuleSet::new(self::test_vars());
		rules.add(self::rule_with(&["foo"], &["a"], "one\n")).expect("Should add");
		let res = rules.add(self::rule_with(&["foo"], &["b"], "two\n"));
		assert!(matches!(res, Err(AppError::AmbiguousRecipe { .. })));
	}

	#[test]
	fn same_prereqs_overrides() {
		let mut rules = RuleSet::new(self::test_vars());
		rules.add(self::rule_with(&["foo"], &["a"], "one\n")).expect("Should add");
		rules.add(self::rule_with(&["foo"], &["a"], "two\n")).expect("Should override");

		assert_eq!(rules.rules.len(), 1);
		assert_eq!(rules.rules[0].recipe, "two\n");
	}

	#[test]
	fn recipeless_redefinition_is_kept() {
		let mut rules = RuleSet::new(self::test_vars());
		rules.add(self::rule_with(&["foo"], &["a"], "one\n")).expect("Should add");
		rules.add(self::rule_with(&["foo"], &["a"], "")).expect("Should be a no-op");

		assert_eq!(rules.rules.len(), 1);
		assert_eq!(rules.rules[0].recipe, "one\n");
	}

	#[test]
	fn distinct_targets_append() {
		let mut rules = RuleSet::new(self::test_vars());
		rules.add(self::rule_with(&["foo"], &[], "")).expect("Should add");
		rules.add(self::rule_with(&["foo", "bar"], &[], "")).expect("Should add");

		assert_eq!(rules.rules.len(), 2);
		assert_eq!(rules.rules_for_target("foo"), &[0, 1]);
		assert_eq!(rules.rules_for_target("bar"), &[1]);
	}

	#[test]
	fn var_name_validity() {
		assert!(self::is_valid_var_name("foo"));
		assert!(self::is_valid_var_name("_foo2"));
		assert!(self::is_valid_var_name("2foo"));
		assert!(!self::is_valid_var_name(""));
		assert!(!self::is_valid_var_name("foo.bar"));
		assert!(!self::is_valid_var_name("foo bar"));
	}
}
