//! Utilities for all integration tests

// Lints
#![allow(dead_code)]

// Imports
use {anyhow::Context, mk::Args, std::fs, tempdir::TempDir, tokio::sync::Mutex};

/// Serializes runs: `mk::run` changes the process working directory, which
/// concurrent tests in the same binary would race on.
static RUN_LOCK: Mutex<()> = Mutex::const_new(());

/// Creates a directory with a mkfile, runs mk over `targets` in it, and
/// returns the directory
pub async fn with_mkfile<'a, T>(mkfile: &str, targets: T) -> Result<TempDir, anyhow::Error>
where
	T: AsRef<[&'a str]>,
{
	let temp_dir = TempDir::new("mk").context("Unable to create temporary directory")?;
	self::run_mk(&temp_dir, mkfile, targets, |_| ()).await?;

	Ok(temp_dir)
}

/// Runs mk over `targets` in `temp_dir` with the given mkfile, customizing
/// the arguments with `customize`
pub async fn run_mk<'a, T>(
	temp_dir: &TempDir,
	mkfile: &str,
	targets: T,
	customize: impl FnOnce(&mut Args),
) -> Result<(), anyhow::Error>
where
	T: AsRef<[&'a str]>,
{
	let mkfile_path = temp_dir.path().join("mkfile");
	fs::write(&mkfile_path, mkfile).context("Unable to write mkfile")?;

	let mut args = Args {
		targets: targets.as_ref().iter().copied().map(str::to_owned).collect(),
		mkfile: mkfile_path,
		directory: Some(temp_dir.path().to_owned()),
		..Args::default()
	};
	customize(&mut args);
	tracing::info!(?args, "Arguments");

	let _guard = RUN_LOCK.lock().await;
	mk::run(args).await.context("Unable to run mk")
}

/// Reads a file in `temp_dir`
pub fn read(temp_dir: &TempDir, name: &str) -> Result<String, anyhow::Error> {
	fs::read_to_string(temp_dir.path().join(name)).with_context(|| format!("Unable to read {name:?}"))
}

/// Returns whether a file exists in `temp_dir`
pub fn exists(temp_dir: &TempDir, name: &str) -> bool {
	temp_dir.path().join(name).exists()
}
