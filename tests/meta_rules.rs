//! Meta-rule builds

// Modules
mod util;

// Imports
use {anyhow::Context, std::fs};

/// A `%` rule binds its stem and rebuilds only when out of date
#[tokio::test]
#[tracing_test::traced_test]
async fn suffix_rule() -> Result<(), anyhow::Error> {
	let mkfile = "%.o: %.c
	cp $prereq $target
	echo $stem >> log
";

	let temp_dir = tempdir::TempDir::new("mk").context("Unable to create temporary directory")?;
	fs::write(temp_dir.path().join("foo.c"), "int x;\n").context("Unable to write source file")?;

	util::run_mk(&temp_dir, mkfile, ["foo.o"], |_| ()).await?;
	anyhow::ensure!(
		util::read(&temp_dir, "foo.o")? == "int x;\n",
		"`foo.o` was not built from `foo.c`"
	);
	anyhow::ensure!(util::read(&temp_dir, "log")? == "foo\n", "`$stem` should be `foo`");

	// `foo.o` is now newer than `foo.c`, so nothing should run
	util::run_mk(&temp_dir, mkfile, ["foo.o"], |_| ()).await?;
	anyhow::ensure!(util::read(&temp_dir, "log")? == "foo\n", "Up to date target was rebuilt");

	Ok(())
}

/// A regex rule binds its submatches into prereqs and recipe variables
#[tokio::test]
#[tracing_test::traced_test]
async fn regex_rule() -> Result<(), anyhow::Error> {
	let mkfile = "([a-z]+)\\.out:R: \\1.in
	cp $stem1.in $target
";

	let temp_dir = tempdir::TempDir::new("mk").context("Unable to create temporary directory")?;
	fs::write(temp_dir.path().join("foo.in"), "data\n").context("Unable to write source file")?;

	util::run_mk(&temp_dir, mkfile, ["foo.out"], |_| ()).await?;
	anyhow::ensure!(
		util::read(&temp_dir, "foo.out")? == "data\n",
		"`foo.out` was not built from `foo.in`"
	);

	Ok(())
}

/// A missing target with no rule and no file is an error
#[tokio::test]
#[tracing_test::traced_test]
async fn unknown_target() -> Result<(), anyhow::Error> {
	let mkfile = "all: missing
	echo done
";

	let temp_dir = tempdir::TempDir::new("mk").context("Unable to create temporary directory")?;
	let res = util::run_mk(&temp_dir, mkfile, ["all"], |_| ()).await;

	let err = res.expect_err("Build should fail");
	anyhow::ensure!(
		format!("{err:#}").contains("don't know how to make missing"),
		"Unexpected error: {err:#}"
	);

	Ok(())
}
