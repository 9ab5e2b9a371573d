//! Build
//!
//! Concurrent DAG execution with bounded parallelism: walks the graph,
//! decides out-of-dateness from modification times and invokes recipes
//! under a job-count semaphore, with an exclusive barrier for `X` rules.

// Imports
use {
	crate::{
		error::AppError,
		expand::expand_shell,
		graph::Node,
		recipe,
		rules::{Rule, RuleSet},
	},
	async_recursion::async_recursion,
	dashmap::DashMap,
	filetime::FileTime,
	futures::{stream::FuturesUnordered, StreamExt},
	itertools::Itertools,
	std::{
		collections::HashSet,
		mem,
		process::Stdio,
		sync::{
			atomic::{AtomicBool, Ordering},
			Arc,
		},
		time::{Duration, SystemTime},
	},
	tokio::{
		fs,
		process::Command,
		sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, Semaphore},
	},
};

/// Terminal status of a built node
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuildStatus {
	/// The recipe ran
	Done,

	/// The target was already up to date
	Nop,
}

/// Build options
#[derive(Clone, Debug)]
pub struct BuildOpts {
	/// Print recipes without executing them
	pub dry_run: bool,

	/// Keep independent work going after a failure
	pub keep_going: bool,

	/// Consider every target out of date
	pub force_all: bool,

	/// Targets to consider out of date
	pub force_targets: HashSet<String>,

	/// Color the recipe echoes
	pub color: bool,
}

/// Builder
#[derive(Debug)]
pub struct Builder {
	/// Rule set
	rules: Arc<RuleSet>,

	/// Maximum concurrent recipes
	jobs: u32,

	/// All targets' build status
	targets: DashMap<String, BuildLock>,

	/// Recipe execution semaphore
	exec_semaphore: Semaphore,

	/// Serializes exclusive rules draining the semaphore
	exclusive: Mutex<()>,

	/// Set once a build fails without `keep_going`
	stop: AtomicBool,

	/// Options
	opts: BuildOpts,
}

impl Builder {
	/// Creates a new builder executing up to `jobs` concurrent recipes
	pub fn new(jobs: usize, rules: Arc<RuleSet>, opts: BuildOpts) -> Self {
		let jobs = u32::try_from(jobs.max(1)).unwrap_or(u32::MAX);
		Self {
			rules,
			jobs,
			targets: DashMap::new(),
			exec_semaphore: Semaphore::new(jobs as usize),
			exclusive: Mutex::new(()),
			stop: AtomicBool::new(false),
			opts,
		}
	}

	/// Builds a target node.
	///
	/// If the node is already built, or being built, its result is shared;
	/// a node's recipe executes at most once per run.
	#[async_recursion]
	pub async fn build(&self, node: &Arc<Node>) -> Result<BuildStatus, AppError> {
		tracing::trace!(target=%node.name, "Building target");

		// Get the build lock, or create it
		let build_lock = self
			.targets
			.entry(node.name.clone())
			.or_insert_with(BuildLock::new)
			.clone();

		// Then check if built
		let build_guard = build_lock.lock_dep().await;
		match build_guard.res() {
			// If we got it, we were built, so just return it
			Some(res) => res,

			// Else build first
			// Note: Tokio read locks don't support upgrading, so we do a
			//       double-checked lock here.
			None => {
				mem::drop(build_guard);
				let mut build_guard = build_lock.lock_build().await;

				match build_guard.res() {
					// If we got it in the meantime, return it
					Some(res) => res,

					// Else build
					None => {
						let res = self.build_unchecked(node).await;
						if res.is_err() && !self.opts.keep_going {
							self.stop.store(true, Ordering::Relaxed);
						}
						build_guard.finish(res)
					},
				}
			},
		}
	}

	/// Builds a target without checking if it is already being built
	async fn build_unchecked(&self, node: &Arc<Node>) -> Result<BuildStatus, AppError> {
		// A leaf has no rule, so it must exist (or be virtual)
		if node.edges.is_empty() {
			let exists = self::fs_try_exists(&node.name)
				.await
				.map_err(AppError::check_file_exists(&node.name))?;
			return match exists || node.is_virtual {
				true => Ok(BuildStatus::Nop),
				false => Err(AppError::DontKnowHowToMake {
					target: node.name.clone(),
				}),
			};
		}

		let exec_edge = node
			.exec_edge(&self.rules)
			.expect("Node with edges should have an exec edge");
		let rule = &self.rules.rules[exec_edge.rule];

		// Build all prerequisites, of all edges, in parallel, and wait for
		// every one of them: in-flight work finishes even on failure.
		let prereqs = node.edges.iter().flat_map(|edge| &edge.prereqs).collect::<Vec<_>>();
		let results = prereqs
			.iter()
			.map(|&prereq| async move { (prereq, self.build(prereq).await) })
			.collect::<FuturesUnordered<_>>()
			.collect::<Vec<_>>()
			.await;

		let mut statuses = Vec::with_capacity(results.len());
		let mut first_err = None;
		for (prereq, res) in results {
			match res {
				Ok(status) => statuses.push((prereq, status)),
				Err(err) => {
					tracing::debug!(target=%node.name, prereq=%prereq.name, "Prerequisite failed");
					if first_err.is_none() {
						first_err = Some(AppError::build_target(prereq.name.clone())(err));
					}
				},
			}
		}
		if let Some(err) = first_err {
			// `E` rules continue as best-effort
			match rule.attrs.nonstop {
				true => tracing::warn!(target=%node.name, "Continuing despite failed prerequisite"),
				false => return Err(err),
			}
		}

		// Decide whether the target is out of date
		let forced = self.opts.force_all || self.opts.force_targets.contains(&node.name);
		let uptodate = match forced || node.is_virtual {
			true => false,
			false => self.is_uptodate(node, rule, &statuses).await?,
		};
		if uptodate || !rule.has_recipe() {
			return Ok(BuildStatus::Nop);
		}

		// No new work once a failure has stopped the build
		if self.stop.load(Ordering::Relaxed) {
			tracing::debug!(target=%node.name, "Skipping recipe, build is stopping");
			return Ok(BuildStatus::Nop);
		}

		// Reserve execution slots; an exclusive rule reserves every slot,
		// waiting for in-flight recipes to drain while holding none itself.
		let _exclusive_guard = match rule.attrs.exclusive {
			true => Some(self.exclusive.lock().await),
			false => None,
		};
		let permits = match rule.attrs.exclusive {
			true => self.jobs,
			false => 1,
		};
		let _permit = self
			.exec_semaphore
			.acquire_many(permits)
			.await
			.expect("Exec semaphore was closed");

		let res = recipe::execute(node, exec_edge, &self.rules, self.opts.dry_run, self.opts.color).await;
		match res {
			Ok(()) => Ok(BuildStatus::Done),
			Err(err) => match rule.attrs.nonstop {
				// `E` rules tolerate their own recipe failing
				true => {
					tracing::warn!(target=%node.name, err=%err, "Recipe failed, continuing");
					Ok(BuildStatus::Done)
				},
				false => Err(err),
			},
		}
	}

	/// Returns whether `node` is up to date with respect to its built
	/// prerequisites
	async fn is_uptodate(&self, node: &Node, rule: &Rule, statuses: &[(&Arc<Node>, BuildStatus)]) -> Result<bool, AppError> {
		let Some(mtime) = self::file_mtime(&node.name).await? else {
			return Ok(false);
		};

		for (prereq, status) in statuses {
			// A prerequisite that was rebuilt this run outdates us
			if *status == BuildStatus::Done {
				return Ok(false);
			}
			if prereq.is_virtual {
				continue;
			}

			// With a `P` program, the program decides instead of the mtimes
			match rule.program.is_empty() {
				true => match self::file_mtime(&prereq.name).await? {
					Some(prereq_mtime) if prereq_mtime > mtime => return Ok(false),
					Some(_) => (),
					None => return Ok(false),
				},
				false =>
					if !self.run_outdate_program(rule, &node.name, &prereq.name).await? {
						return Ok(false);
					},
			}
		}

		Ok(true)
	}

	/// Runs a rule's `P` program, which exits zero iff `target` is up to
	/// date with respect to `prereq`
	async fn run_outdate_program(&self, rule: &Rule, target: &str, prereq: &str) -> Result<bool, AppError> {
		let body = format!("{} {target} {prereq}", rule.program.iter().join(" "));
		let (shell, shell_args) =
			expand_shell(&self.rules.vars.default_shell, &[body.clone()], self.rules.vars.keep_shell_args);
		let cmd_fmt = format!("{shell} {body}");

		let status = Command::new(&shell)
			.args(&shell_args)
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.status()
			.await
			.map_err(AppError::spawn_command(&cmd_fmt))?;

		Ok(status.success())
	}
}

/// Build state
#[derive(Clone, Debug)]
struct BuildState {
	/// Result, if built
	res: Option<Result<BuildStatus, Arc<AppError>>>,
}

/// Build lock
#[derive(Clone, Debug)]
struct BuildLock {
	/// State
	state: Arc<RwLock<BuildState>>,
}

impl BuildLock {
	/// Creates a new build lock
	fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(BuildState { res: None })),
		}
	}

	/// Locks the build lock for building
	async fn lock_build(&self) -> BuildLockBuildGuard {
		BuildLockBuildGuard {
			state: Arc::clone(&self.state).write_owned().await,
		}
	}

	/// Locks the build lock as a dependency
	async fn lock_dep(&self) -> BuildLockDepGuard {
		BuildLockDepGuard {
			state: Arc::clone(&self.state).read_owned().await,
		}
	}
}

/// Build lock build guard
#[derive(Debug)]
struct BuildLockBuildGuard {
	/// State
	state: OwnedRwLockWriteGuard<BuildState>,
}

impl BuildLockBuildGuard {
	/// Returns the result of the build
	fn res(&self) -> Option<Result<BuildStatus, AppError>> {
		self.state.res.clone().map(|res| res.map_err(AppError::Shared))
	}

	/// Finishes a build
	fn finish(&mut self, res: Result<BuildStatus, AppError>) -> Result<BuildStatus, AppError> {
		let res = res.map_err(Arc::new);
		self.state.res = Some(res.clone());
		res.map_err(AppError::Shared)
	}
}

/// Build lock dependency guard
#[derive(Debug)]
struct BuildLockDepGuard {
	/// State
	state: OwnedRwLockReadGuard<BuildState>,
}

impl BuildLockDepGuard {
	/// Returns the result of the build
	fn res(&self) -> Option<Result<BuildStatus, AppError>> {
		self.state.res.clone().map(|res| res.map_err(AppError::Shared))
	}
}

/// Returns the modification time of `path`, or `None` if it doesn't exist
async fn file_mtime(path: &str) -> Result<Option<SystemTime>, AppError> {
	match fs::metadata(path).await {
		Ok(metadata) => Ok(Some(self::file_modified_time(metadata))),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(err) => Err(AppError::read_file_metadata(path)(err)),
	}
}

/// Returns the file modified time
fn file_modified_time(metadata: std::fs::Metadata) -> SystemTime {
	let file_time = FileTime::from_last_modification_time(&metadata);
	let unix_offset = Duration::new(
		file_time
			.unix_seconds()
			.try_into()
			.expect("File time was before unix epoch"),
		file_time.nanoseconds(),
	);

	SystemTime::UNIX_EPOCH + unix_offset
}

/// Async `std::fs::try_exists`
async fn fs_try_exists(path: &str) -> Result<bool, std::io::Error> {
	match fs::metadata(path).await {
		Ok(_) => Ok(true),
		Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(err) => Err(err),
	}
}
