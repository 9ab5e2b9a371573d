//! Cli manager

// Imports
use std::path::PathBuf;

/// Data from the command line
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(clap::Parser)]
#[clap(author, version, about)]
pub struct Args {
	/// All targets to build.
	///
	/// If empty, the first non-meta rule's targets are built.
	pub targets: Vec<String>,

	/// Directory to change into before doing anything
	#[clap(long = "directory", short = 'C')]
	pub directory: Option<PathBuf>,

	/// Use the given file as the mkfile
	#[clap(long = "file", short = 'f', default_value = "mkfile")]
	pub mkfile: PathBuf,

	/// Print recipes without actually executing them
	#[clap(long = "dry-run", short = 'n')]
	pub dry_run: bool,

	/// Maximum number of recipes to execute in parallel.
	///
	/// Defaults to available parallelism.
	#[clap(long = "jobs", short = 'j')]
	pub jobs: Option<usize>,

	/// Maximum number of times a single rule may be applied along a
	/// dependency path
	#[clap(long = "depth", short = 'd', default_value_t = 1)]
	pub depth: usize,

	/// Dry-run first, then ask before executing the recipes
	#[clap(long = "interactive", short = 'i')]
	pub interactive: bool,

	/// Don't print recipes before executing them
	#[clap(long = "quiet", short = 'q')]
	pub quiet: bool,

	/// Force building of all dependencies
	#[clap(long = "force-all")]
	pub force_all: bool,

	/// Force building of just the requested targets
	#[clap(long = "force-target")]
	pub force_target: bool,

	/// Do as much work as possible in the face of errors
	#[clap(long = "keep-going", short = 'k')]
	pub keep_going: bool,

	/// Default shell to use if none is specified via `$shell`
	#[clap(long = "shell", default_value = "sh -c")]
	pub shell: String,

	/// Don't drop the shell's own arguments when the recipe is passed on
	/// stdin
	#[clap(long = "keep-shell-args")]
	pub keep_shell_args: bool,

	/// Delimiter style for lists in the child environment.
	///
	/// `plan9` joins with `\x01`, anything else with `:`.
	#[clap(long = "shell-delimiter")]
	pub shell_delimiter: Option<String>,

	/// Turn color on or off.
	///
	/// Defaults to whether stdout is a terminal.
	#[clap(long = "color", num_args = 0..=1, default_missing_value = "true")]
	pub color: Option<bool>,

	/// File to write logs into
	#[clap(long = "log-file")]
	pub log_file: Option<PathBuf>,
}

impl Default for Args {
	fn default() -> Self {
		Self {
			targets: vec![],
			directory: None,
			mkfile: PathBuf::from("mkfile"),
			dry_run: false,
			jobs: None,
			depth: 1,
			interactive: false,
			quiet: false,
			force_all: false,
			force_target: false,
			keep_going: false,
			shell: "sh -c".to_owned(),
			keep_shell_args: false,
			shell_delimiter: None,
			color: None,
			log_file: None,
		}
	}
}
