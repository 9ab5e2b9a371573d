//! Graph
//!
//! Materializes the DAG of nodes reachable from a requested target,
//! resolving meta-rules against target names.

// Imports
use {
	crate::{error::AppError, expand::expand_suffixes, rules::RuleSet},
	std::{collections::HashMap, path::Path, sync::Arc},
};

/// A single target name resolved against the rule set
#[derive(Debug)]
pub struct Node {
	/// Target name
	pub name: String,

	/// Whether the rule that brings this target up to date is virtual
	pub is_virtual: bool,

	/// Rule applications for this target.
	///
	/// Empty for leaves, which must exist on disk.
	pub edges: Vec<Edge>,
}

impl Node {
	/// Returns the edge whose recipe brings this node up to date: the last
	/// edge with a recipe, or, failing that, the last edge
	pub fn exec_edge(&self, rules: &RuleSet) -> Option<&Edge> {
		self.edges
			.iter()
			.rev()
			.find(|edge| rules.rules[edge.rule].has_recipe())
			.or_else(|| self.edges.last())
	}
}

/// A rule application bound to a target
#[derive(Debug)]
pub struct Edge {
	/// Index of the applied rule
	pub rule: usize,

	/// Stem bound by a `%` rule
	pub stem: Option<String>,

	/// Submatches bound by a regex rule, starting with the whole match
	pub matches: Vec<String>,

	/// Prerequisite nodes
	pub prereqs: Vec<Arc<Node>>,
}

/// The dependency graph
#[derive(Debug)]
pub struct Graph {
	/// Root node
	pub root: Arc<Node>,
}

/// Builds the dependency graph reachable from `root`.
///
/// `max_rule_apps` caps how many times a single rule may be applied along
/// any resolution path, bounding recursion through meta-rules.
pub fn build(rules: &RuleSet, root: &str, max_rule_apps: usize) -> Result<Graph, AppError> {
	let mut builder = GraphBuilder {
		rules,
		nodes: HashMap::new(),
		rule_counts: HashMap::new(),
		max_rule_apps: max_rule_apps.max(1),
	};
	let root = builder.resolve(root, &mut vec![])?;

	Ok(Graph { root })
}

/// Graph builder
struct GraphBuilder<'a> {
	/// Rule set to resolve against
	rules: &'a RuleSet,

	/// Nodes resolved so far
	nodes: HashMap<String, Arc<Node>>,

	/// How many times each rule is applied along the current path
	rule_counts: HashMap<usize, usize>,

	/// Maximum number of applications of a single rule along a path
	max_rule_apps: usize,
}

impl GraphBuilder<'_> {
	/// Resolves a target name into a node, creating it and its
	/// prerequisites on first demand
	fn resolve(&mut self, name: &str, stack: &mut Vec<String>) -> Result<Arc<Node>, AppError> {
		// A name already on the resolution path is a cycle
		if let Some(pos) = stack.iter().position(|entry| entry == name) {
			let mut chain = stack[pos..].to_vec();
			chain.push(name.to_owned());
			return Err(AppError::CircularDependency { chain });
		}

		if let Some(node) = self.nodes.get(name) {
			return Ok(Arc::clone(node));
		}

		let selected = self.select_rules(name)?;
		tracing::trace!(target=%name, rules=?selected.iter().map(|&(rule, ..)| rule).collect::<Vec<_>>(), "Selected rules");

		// Resolve each selected rule's prerequisites
		stack.push(name.to_owned());
		let mut edges = Vec::with_capacity(selected.len());
		for (rule_idx, stem, matches) in selected {
			*self.rule_counts.entry(rule_idx).or_insert(0) += 1;

			let templates = self.rules.rules[rule_idx].prereqs.clone();
			let mut prereqs = Vec::with_capacity(templates.len());
			for template in &templates {
				let mut prereq = template.clone();
				if let Some(stem) = &stem {
					prereq = expand_suffixes(&prereq, stem);
				}
				for (k, sub) in matches.iter().enumerate() {
					prereq = prereq.replace(&format!("\\{k}"), sub);
				}

				prereqs.push(self.resolve(&prereq, stack)?);
			}

			*self.rule_counts.get_mut(&rule_idx).expect("Just inserted the count") -= 1;
			edges.push(Edge {
				rule: rule_idx,
				stem,
				matches,
				prereqs,
			});
		}
		stack.pop();

		// Virtuality comes from the rule that will be executed
		let exec_rule = edges
			.iter()
			.rev()
			.find(|edge| self.rules.rules[edge.rule].has_recipe())
			.or_else(|| edges.last());
		let is_virtual = exec_rule.is_some_and(|edge| self.rules.rules[edge.rule].attrs.is_virtual);

		let node = Arc::new(Node {
			name: name.to_owned(),
			is_virtual,
			edges,
		});
		self.nodes.insert(name.to_owned(), Arc::clone(&node));

		Ok(node)
	}

	/// Selects the rules to apply to `name`: all constant rules naming it,
	/// or, failing that, the first matching meta-rule in definition order.
	///
	/// A matching rule that has hit its application budget along the
	/// current path is skipped in favor of later candidates; when that
	/// leaves no applicable rule at all, the exhaustion is an error,
	/// distinct from there being no rule in the first place.
	fn select_rules(&self, name: &str) -> Result<Vec<(usize, Option<String>, Vec<String>)>, AppError> {
		let mut blocked = None;

		let mut selected = vec![];
		for &rule_idx in self.rules.rules_for_target(name) {
			match self.over_budget(rule_idx) {
				true => blocked = Some(rule_idx),
				false => selected.push((rule_idx, None, vec![])),
			}
		}

		if selected.is_empty() {
			'rules: for (rule_idx, rule) in self.rules.rules.iter().enumerate() {
				if !rule.is_meta {
					continue;
				}

				// `n` rules only ever match existing files
				if rule.attrs.nonvirtual && !Path::new(name).exists() {
					continue;
				}

				for pattern in &rule.targets {
					if let Some(matches) = pattern.matches(name) {
						// The application budget bounds meta-rule recursion
						if self.over_budget(rule_idx) {
							blocked = Some(rule_idx);
							continue 'rules;
						}

						let stem = pattern.is_suffix.then(|| matches.get(1).cloned().unwrap_or_default());
						let matches = match rule.attrs.regex {
							true => matches,
							false => vec![],
						};

						selected.push((rule_idx, stem, matches));
						break 'rules;
					}
				}
			}
		}

		if selected.is_empty() {
			if let Some(rule_idx) = blocked {
				return Err(AppError::RuleBudgetExceeded {
					target: name.to_owned(),
					rule:   self.rules.rules[rule_idx]
						.targets
						.first()
						.map_or_else(String::new, |target| target.spat.clone()),
				});
			}
		}

		Ok(selected)
	}

	/// Returns whether a rule has hit its application budget along the
	/// current path
	fn over_budget(&self, rule_idx: usize) -> bool {
		self.rule_counts.get(&rule_idx).copied().unwrap_or(0) >= self.max_rule_apps
	}
}

#[cfg(test)]
mod tests {
	use {
		super::*,
		crate::{parser, rules::Vars},
		std::path::Path,
	};

	fn parse_str(input: &str) -> RuleSet {
		let vars = Vars::new("sh -c", false, ":");
		parser::parse(input, "mkfile", Path::new("mkfile"), vars).expect("Parse should succeed")
	}

	#[test]
	fn literal_rule_wins_over_meta() {
		let rules = self::parse_str("%.o:\n\techo meta\nfoo.o:\n\techo literal\n");
		let graph = self::build(&rules, "foo.o", 1).expect("Should build");

		assert_eq!(graph.root.edges.len(), 1);
		let edge = &graph.root.edges[0];
		assert!(!rules.rules[edge.rule].is_meta);
	}

	#[test]
	fn suffix_rule_binds_stem_and_prereqs() {
		let rules = self::parse_str("%.o: %.c %.h\n\tcc\n");
		let graph = self::build(&rules, "foo.o", 1).expect("Should build");

		let edge = &graph.root.edges[0];
		assert_eq!(edge.stem.as_deref(), Some("foo"));
		let prereqs = edge.prereqs.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
		assert_eq!(prereqs, vec!["foo.c", "foo.h"]);
		assert!(edge.prereqs.iter().all(|p| p.edges.is_empty()));
	}

	#[test]
	fn regex_rule_binds_submatches() {
		let rules = self::parse_str("([a-z]+)-([a-z]+)\\.out:R: \\1.in \\2.in\n\tcp\n");
		let graph = self::build(&rules, "foo-bar.out", 1).expect("Should build");

		let edge = &graph.root.edges[0];
		assert_eq!(edge.matches, vec![
			"foo-bar.out".to_owned(),
			"foo".to_owned(),
			"bar".to_owned()
		]);
		let prereqs = edge.prereqs.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
		assert_eq!(prereqs, vec!["foo.in", "bar.in"]);
	}

	#[test]
	fn shared_prereqs_are_one_node() {
		let rules = self::parse_str("all: a b\n\techo\na: common\n\techo\nb: common\n\techo\n");
		let graph = self::build(&rules, "all", 1).expect("Should build");

		let edge = &graph.root.edges[0];
		let a_common = &edge.prereqs[0].edges[0].prereqs[0];
		let b_common = &edge.prereqs[1].edges[0].prereqs[0];
		assert!(Arc::ptr_eq(a_common, b_common));
	}

	#[test]
	fn cycles_error() {
		let rules = self::parse_str("a: b\n\t:\nb: a\n\t:\n");
		let err = self::build(&rules, "a", 1).expect_err("Should be circular");
		assert_eq!(err.to_string(), "circular dependency: a->b->a");
	}

	#[test]
	fn rule_budget_exhaustion_errors() {
		// `%.x` depends on itself with an extra suffix; without the budget
		// this would recurse forever
		let rules = self::parse_str("%.x: %.x.x\n\techo\n");
		let err = self::build(&rules, "a.x", 1).expect_err("Should exhaust the budget");
		assert!(matches!(err, AppError::RuleBudgetExceeded { .. }));
	}

	#[test]
	fn rule_budget_is_per_path() {
		// The same rule applies once along each sibling path
		let rules = self::parse_str("all: a.o b.o\n\techo\n%.o: %.c\n\tcc\n");
		let graph = self::build(&rules, "all", 1).expect("Should build");

		let edge = &graph.root.edges[0];
		assert_eq!(edge.prereqs.len(), 2);
		assert!(edge.prereqs.iter().all(|prereq| !prereq.edges.is_empty()));
	}

	#[test]
	fn virtual_rules_mark_nodes() {
		let rules = self::parse_str("clean:V:\n\trm -f junk\n");
		let graph = self::build(&rules, "clean", 1).expect("Should build");
		assert!(graph.root.is_virtual);
	}
}
