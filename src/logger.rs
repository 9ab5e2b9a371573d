//! Logger

// Imports
use {
	std::{fs, path::Path},
	tracing::metadata::LevelFilter,
	tracing_subscriber::{prelude::*, EnvFilter},
};

/// Initializes the logger.
///
/// Events go to stderr, filtered by `RUST_LOG` (warnings by default), and,
/// when `log_file` is given, to it as well, filtered by `RUST_LOG_FILE`.
pub fn init(log_file: Option<&Path>) {
	// Warnings to emit after configuring the logger
	let mut warnings = vec![];

	let term_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(
		EnvFilter::builder()
			.with_default_directive(LevelFilter::WARN.into())
			.from_env_lossy(),
	);

	// Create the file layer, if requested
	let file_layer = log_file.and_then(|log_file| {
		let file = match fs::File::create(log_file) {
			Ok(file) => file,
			Err(err) => {
				warnings.push(format!("Unable to create log file: {err}"));
				return None;
			},
		};

		let layer = tracing_subscriber::fmt::layer().with_writer(file).with_ansi(false).with_filter(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::DEBUG.into())
				.with_env_var("RUST_LOG_FILE")
				.from_env_lossy(),
		);

		Some(layer)
	});

	tracing_subscriber::registry().with(term_layer).with(file_layer).init();
	tracing::debug!(?log_file, "Initialized logging");

	for warning in warnings {
		tracing::warn!("{warning}");
	}
}
