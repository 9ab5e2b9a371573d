//! `mk` build tool

// Imports
use {
	clap::Parser,
	mk::Args,
	std::{io::IsTerminal, process::ExitCode},
};

#[tokio::main]
async fn main() -> ExitCode {
	// Get all args
	let args = Args::parse();

	// Initialize the logger
	mk::logger::init(args.log_file.as_deref());
	tracing::trace!(?args, "Arguments");

	// Note: `run` may change directory, so resolve color up-front, from
	// the same stdout the recipes will echo to.
	let color = args.color.unwrap_or_else(|| std::io::stdout().is_terminal());

	match mk::run(args).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			err.print_to_stderr(color);
			ExitCode::FAILURE
		},
	}
}
