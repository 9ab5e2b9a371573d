//! Exclusive rules

// Modules
mod util;

// Imports
use anyhow::Context;

/// While an exclusive recipe runs, no other recipe may be mid-flight.
///
/// The two slow rules write a marker line before and after sleeping; the
/// exclusive rule writes a single marker. Whatever order the scheduler
/// picks, the exclusive marker must never land between another rule's
/// start and end markers.
#[tokio::test]
#[tracing_test::traced_test]
async fn exclusive_rule_quiesces() -> Result<(), anyhow::Error> {
	let mkfile = "all:V: s1 s2 ex
s1:V:
	echo s1 >> log; sleep 0.3; echo s1 >> log
s2:V:
	echo s2 >> log; sleep 0.3; echo s2 >> log
ex:VX:
	echo ex >> log
";

	let temp_dir = tempdir::TempDir::new("mk").context("Unable to create temporary directory")?;
	util::run_mk(&temp_dir, mkfile, ["all"], |args| args.jobs = Some(4)).await?;

	let log = util::read(&temp_dir, "log")?;
	let lines = log.lines().collect::<Vec<_>>();
	anyhow::ensure!(lines.len() == 5, "Expected 5 marker lines, got {lines:?}");

	for marker in ["s1", "s2"] {
		let start = lines
			.iter()
			.position(|&line| line == marker)
			.context("Missing start marker")?;
		let end = lines
			.iter()
			.rposition(|&line| line == marker)
			.context("Missing end marker")?;
		let ex = lines.iter().position(|&line| line == "ex").context("Missing ex marker")?;

		anyhow::ensure!(
			!(start < ex && ex < end),
			"Exclusive recipe ran while `{marker}` was mid-flight: {lines:?}"
		);
	}

	Ok(())
}
