//! Errors

// Imports
use {
	itertools::Itertools,
	std::{io, path::PathBuf, process::ExitStatus, sync::Arc},
};

/// App error
///
/// Error that will be bubbled up to main when a fatal error occurs
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
	/// Shared
	#[error(transparent)]
	Shared(Arc<Self>),

	/// Set current directory
	#[error("Unable to set current directory to {dir_path:?}")]
	SetCurrentDir {
		/// Directory that we failed to set as current
		dir_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Read file
	#[error("Unable to read file {file_path:?}")]
	ReadFile {
		/// File we failed to read
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Read file metadata
	#[error("Unable to read file metadata {file_path:?}")]
	ReadFileMetadata {
		/// File we failed to read metadata of
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Check if file exists
	#[error("Unable to check if file exists {file_path:?}")]
	CheckFileExists {
		/// File we failed to check
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Remove file
	#[error("Unable to remove file {file_path:?}")]
	RemoveFile {
		/// File we failed to remove
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Get default jobs
	#[error("Unable to query system for available parallelism for default number of jobs")]
	GetDefaultJobs {
		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Lex error
	#[error("{file}:{line}: syntax error: {msg}")]
	Lex {
		/// File being lexed
		file: String,

		/// Line the error occurred on
		line: usize,

		/// Error message
		msg: String,
	},

	/// Parse error
	#[error("{file}:{line}: syntax error: while {context}, expected {expected} but found '{found}'")]
	Parse {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,

		/// What we were doing
		context: String,

		/// What we expected
		expected: String,

		/// What we found
		found: String,
	},

	/// Unknown rule attribute
	#[error("{file}:{line}: syntax error: while reading a rule's attributes expected an attribute but found \"{found}\"")]
	UnknownAttribute {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,

		/// The offending character
		found: char,
	},

	/// Invalid regular expression in a rule target
	#[error("{file}:{line}: invalid regular expression: {pat:?}")]
	InvalidRegex {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,

		/// The pattern that failed to compile
		pat: String,

		/// Underlying error
		#[source]
		err: Box<regex::Error>,
	},

	/// Invalid assignment target
	#[error("{file}:{line}: syntax error: target of assignment is not a valid variable name: {name:?}")]
	InvalidAssignmentTarget {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,

		/// The offending name
		name: String,
	},

	/// Rule without targets
	#[error("{file}:{line}: syntax error: rule has no targets")]
	RuleNoTargets {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,
	},

	/// Ambiguous recipe
	#[error("{file}:{line}: ambiguous recipe for target `{target}` with differing prerequisites")]
	AmbiguousRecipe {
		/// File the new rule was defined in
		file: String,

		/// Line the new rule was defined on
		line: usize,

		/// First target of the rule
		target: String,
	},

	/// Empty pipe include
	#[error("{file}:{line}: syntax error: empty pipe include")]
	EmptyPipeInclude {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,
	},

	/// Include filename expanded to several words
	#[error("{file}:{line}: filename variables need to be a single value")]
	IncludeFilename {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,
	},

	/// Cannot open an included file
	#[error("{file}:{line}: cannot open {path:?}")]
	OpenInclude {
		/// File being parsed
		file: String,

		/// Line the error occurred on
		line: usize,

		/// Path we failed to open
		path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Circular dependency
	#[error("circular dependency: {}", chain.iter().join("->"))]
	CircularDependency {
		/// The cycle, from the first repeated target back to itself
		chain: Vec<String>,
	},

	/// No rule and no file for a target
	#[error("don't know how to make {target}")]
	DontKnowHowToMake {
		/// Target we don't know how to make
		target: String,
	},

	/// Rule application budget exhausted
	#[error("rule application budget exceeded while resolving {target} with rule `{rule}`")]
	RuleBudgetExceeded {
		/// Target being resolved
		target: String,

		/// First target pattern of the exhausted rule
		rule: String,
	},

	/// Recipe failed
	#[error("recipe for {target} failed: {status}")]
	RecipeFailed {
		/// Target whose recipe failed
		target: String,

		/// Exit status of the recipe
		status: ExitStatus,
	},

	/// Spawn command
	#[error("Unable to spawn {cmd_fmt}")]
	SpawnCommand {
		/// Command formatted
		cmd_fmt: String,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Wait for command
	#[error("Unable to wait for {cmd_fmt}")]
	WaitCommand {
		/// Command formatted
		cmd_fmt: String,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Write to a command's stdin
	#[error("Unable to write to stdin of {cmd_fmt}")]
	WriteCommandStdin {
		/// Command formatted
		cmd_fmt: String,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Include command failed
	#[error("Include command failed {cmd_fmt}: {status}")]
	IncludeCommandFailed {
		/// Command formatted
		cmd_fmt: String,

		/// Exit status of the command
		status: ExitStatus,
	},

	/// Build target
	#[error("Unable to build target {target}")]
	BuildTarget {
		/// Target name
		target: String,

		/// Underlying error
		#[source]
		err: Box<Self>,
	},
}

/// Error shortcuts
///
/// These are functions that return functions to pass to `.map_err` to
/// specify a certain error.
impl AppError {
	pub fn set_current_dir(dir_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::SetCurrentDir {
			dir_path: dir_path.into(),
			err,
		}
	}

	pub fn read_file(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::ReadFile {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn read_file_metadata(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::ReadFileMetadata {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn check_file_exists(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::CheckFileExists {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn remove_file(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::RemoveFile {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn get_default_jobs() -> impl FnOnce(io::Error) -> Self {
		move |err| Self::GetDefaultJobs { err }
	}

	pub fn spawn_command(cmd_fmt: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::SpawnCommand {
			cmd_fmt: cmd_fmt.into(),
			err,
		}
	}

	pub fn wait_command(cmd_fmt: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::WaitCommand {
			cmd_fmt: cmd_fmt.into(),
			err,
		}
	}

	pub fn write_command_stdin(cmd_fmt: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::WriteCommandStdin {
			cmd_fmt: cmd_fmt.into(),
			err,
		}
	}

	pub fn build_target(target: impl Into<String>) -> impl FnOnce(Self) -> Self {
		move |err| Self::BuildTarget {
			target: target.into(),
			err:    Box::new(err),
		}
	}

	/// Writes this error, and all of its sources, to stderr, prefixed with `error:`.
	pub fn print_to_stderr(&self, color: bool) {
		use std::{error::Error, io::Write};

		let stderr = std::io::stderr();
		let mut stderr = stderr.lock();
		if color {
			let _ = stderr.write_all(b"\x1b[31m");
		}
		let _ = writeln!(stderr, "error: {self}");
		let mut source = self.source();
		while let Some(err) = source {
			let _ = writeln!(stderr, "error: caused by: {err}");
			source = err.source();
		}
		if color {
			let _ = stderr.write_all(b"\x1b[0m");
		}
	}
}
