//! `mk` build tool
//!
//! A reimplementation of the Plan 9 `mk` build utility: a mkfile is parsed
//! into rules and variables, a dependency graph is materialized for the
//! requested targets and out-of-date targets are brought up to date by
//! concurrently executing their recipes.

// Modules
mod args;
mod build;
mod error;
mod expand;
mod graph;
mod lexer;
pub mod logger;
mod parser;
mod reader;
mod recipe;
mod rules;

// Exports
pub use self::{args::Args, error::AppError};

// Imports
use {
	crate::{
		build::{BuildOpts, Builder},
		rules::{Pattern, Rule, Vars},
	},
	std::{
		collections::HashSet,
		env,
		io::{BufRead, IsTerminal, Write},
		sync::Arc,
		thread,
	},
};

/// Runs a full mk invocation: parse the mkfile, build the graph and bring
/// the requested targets up to date
pub async fn run(args: Args) -> Result<(), AppError> {
	// Move to the requested directory
	if let Some(dir) = &args.directory {
		env::set_current_dir(dir).map_err(AppError::set_current_dir(dir))?;
	}

	let color = args.color.unwrap_or_else(|| std::io::stdout().is_terminal());

	// Parse the mkfile
	let contents = std::fs::read_to_string(&args.mkfile).map_err(AppError::read_file(&args.mkfile))?;
	let abs_path = std::path::absolute(&args.mkfile).unwrap_or_else(|_| args.mkfile.clone());
	let list_delim = match args.shell_delimiter.as_deref() {
		Some("plan9") => "\x01",
		_ => ":",
	};
	let vars = Vars::new(args.shell.clone(), args.keep_shell_args, list_delim);
	let mkfile_name = args.mkfile.display().to_string();
	let mut rules = parser::parse(&contents, &mkfile_name, &abs_path, vars)?;
	tracing::debug!(rules = rules.rules.len(), "Parsed mkfile");

	if args.quiet {
		for rule in &mut rules.rules {
			rule.attrs.quiet = true;
		}
	}

	// Decide the targets to build: the requested ones, or the first
	// non-meta rule's targets
	let mut targets = args.targets.clone();
	if targets.is_empty() {
		if let Some(rule) = rules.rules.iter().find(|rule| !rule.is_meta) {
			targets.extend(rule.targets.iter().map(|target| target.spat.clone()));
		}
	}
	if targets.is_empty() {
		println!("mk: nothing to mk");
		return Ok(());
	}
	tracing::debug!(?targets, "Targets to build");

	let force_targets = match args.force_target {
		true => targets.iter().cloned().collect::<HashSet<_>>(),
		false => HashSet::new(),
	};

	// Add a root rule that depends on every requested target
	let mut root = Rule::new(mkfile_name, 0);
	root.targets = vec![Pattern::literal("")];
	root.attrs.is_virtual = true;
	root.prereqs = targets;
	rules.add(root)?;

	// Build the graph
	let graph = graph::build(&rules, "", args.depth)?;

	// Get the max number of recipes we can execute at once
	let jobs = match args.jobs {
		Some(0) => {
			tracing::warn!("Cannot use 0 jobs, defaulting to 1");
			1
		},
		Some(jobs) => jobs,
		None => thread::available_parallelism().map_err(AppError::get_default_jobs())?.into(),
	};
	tracing::debug!(?jobs, "Concurrent jobs");

	let rules = Arc::new(rules);
	let opts = BuildOpts {
		dry_run: args.dry_run,
		keep_going: args.keep_going,
		force_all: args.force_all,
		force_targets,
		color,
	};

	// Interactive mode dry-runs first and asks to proceed
	if args.interactive {
		let builder = Builder::new(jobs, Arc::clone(&rules), BuildOpts {
			dry_run: true,
			..opts.clone()
		});
		builder.build(&graph.root).await?;

		if !self::confirm_proceed() {
			return Ok(());
		}
	}

	let builder = Builder::new(jobs, rules, opts);
	builder.build(&graph.root).await?;

	Ok(())
}

/// Prompts on stdout and waits for a `y` on stdin
fn confirm_proceed() -> bool {
	print!("Proceed? ");
	let _ = std::io::stdout().flush();

	let stdin = std::io::stdin();
	let mut stdin = stdin.lock();
	let mut line = String::new();
	loop {
		line.clear();
		match stdin.read_line(&mut line) {
			Ok(0) | Err(_) => return false,
			Ok(_) => match line.chars().find(|c| !c.is_whitespace()) {
				Some('y') => return true,
				Some(_) => return false,
				None => continue,
			},
		}
	}
}
