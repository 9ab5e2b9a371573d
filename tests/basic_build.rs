//! Basic builds

// Modules
mod util;

// Imports
use anyhow::Context;

/// Two leaves built in parallel, then the root's recipe, exactly once; a
/// second run of the leaves is a no-op
#[tokio::test]
#[tracing_test::traced_test]
async fn basic_build() -> Result<(), anyhow::Error> {
	let mkfile = "all: a b
	echo done >> log
a:
	echo A >> a
b:
	echo B >> b
";

	let temp_dir = tempdir::TempDir::new("mk").context("Unable to create temporary directory")?;
	util::run_mk(&temp_dir, mkfile, ["all"], |args| args.jobs = Some(2)).await?;

	anyhow::ensure!(util::read(&temp_dir, "a")? == "A\n", "`a` was not built correctly");
	anyhow::ensure!(util::read(&temp_dir, "b")? == "B\n", "`b` was not built correctly");
	anyhow::ensure!(util::read(&temp_dir, "log")? == "done\n", "Root recipe should run exactly once");

	// The leaves are now up to date, so building them again is a no-op
	util::run_mk(&temp_dir, mkfile, ["a", "b"], |args| args.jobs = Some(2)).await?;
	anyhow::ensure!(util::read(&temp_dir, "a")? == "A\n", "`a` was rebuilt despite being up to date");
	anyhow::ensure!(util::read(&temp_dir, "b")? == "B\n", "`b` was rebuilt despite being up to date");

	Ok(())
}

/// A dry run prints recipes without executing anything
#[tokio::test]
#[tracing_test::traced_test]
async fn dry_run() -> Result<(), anyhow::Error> {
	let mkfile = "all:V: sub
	touch all_ran
sub:
	touch sub_ran
";

	let temp_dir = tempdir::TempDir::new("mk").context("Unable to create temporary directory")?;
	util::run_mk(&temp_dir, mkfile, ["all"], |args| args.dry_run = true).await?;

	anyhow::ensure!(!util::exists(&temp_dir, "all_ran"), "Dry run executed the root recipe");
	anyhow::ensure!(!util::exists(&temp_dir, "sub_ran"), "Dry run executed a recipe");

	Ok(())
}
