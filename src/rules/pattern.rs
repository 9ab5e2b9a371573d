//! Target and prerequisite patterns

// Imports
use regex::Regex;

/// A target pattern.
///
/// Either a constant string, a suffix pattern with a single `%`, whose
/// match binds the stem, or a regular expression, whose match binds the
/// submatches.
#[derive(Clone, Debug)]
pub struct Pattern {
	/// Whether this is a `%` suffix pattern, which defines `$stem`
	pub is_suffix: bool,

	/// The simple string pattern
	pub spat: String,

	/// The compiled pattern, if this isn't a constant
	pub rpat: Option<Regex>,
}

impl Pattern {
	/// Creates a constant pattern
	pub fn literal(spat: impl Into<String>) -> Self {
		Self {
			is_suffix: false,
			spat:      spat.into(),
			rpat:      None,
		}
	}

	/// Compiles a regular expression pattern, anchored at both ends
	pub fn regex(spat: impl Into<String>) -> Result<Self, regex::Error> {
		let spat = spat.into();
		let rpat = Regex::new(&format!("^{spat}$"))?;
		Ok(Self {
			is_suffix: false,
			spat,
			rpat: Some(rpat),
		})
	}

	/// Compiles a suffix pattern, splitting `spat` at its first `%`.
	///
	/// The match of the `(.*)` between the quoted halves is the stem.
	pub fn suffix(spat: impl Into<String>) -> Self {
		let spat = spat.into();
		let idx = spat.find('%').expect("Suffix pattern should contain a `%`");
		let (left, right) = (&spat[..idx], &spat[idx + 1..]);
		let rpat = Regex::new(&format!("^{}(.*){}$", regex::escape(left), regex::escape(right)))
			.expect("Quoted suffix pattern should compile");

		Self {
			is_suffix: true,
			spat,
			rpat: Some(rpat),
		}
	}

	/// Matches this pattern against a target name.
	///
	/// On a match, returns the submatches, starting with the whole match;
	/// constant patterns match with no submatches.
	pub fn matches(&self, target: &str) -> Option<Vec<String>> {
		match &self.rpat {
			Some(rpat) => rpat.captures(target).map(|captures| {
				captures
					.iter()
					.map(|m| m.map_or_else(String::new, |m| m.as_str().to_owned()))
					.collect()
			}),
			None => (target == self.spat).then(Vec::new),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn literal_matches_itself_only() {
		let pat = Pattern::literal("foo.o");
		assert_eq!(pat.matches("foo.o"), Some(vec![]));
		assert_eq!(pat.matches("bar.o"), None);
	}

	#[test]
	fn suffix_binds_stem() {
		let pat = Pattern::suffix("%.o");
		assert!(pat.is_suffix);
		assert_eq!(pat.matches("foo.o"), Some(vec!["foo.o".to_owned(), "foo".to_owned()]));
		assert_eq!(pat.matches("foo.c"), None);
	}

	#[test]
	fn suffix_quotes_metacharacters() {
		// The `.` must not match any character
		let pat = Pattern::suffix("%.o");
		assert_eq!(pat.matches("fooXo"), None);
	}

	#[test]
	fn regex_submatches() {
		let pat = Pattern::regex(r"(\w+)\.(o|a)").expect("Should compile");
		assert_eq!(
			pat.matches("foo.o"),
			Some(vec!["foo.o".to_owned(), "foo".to_owned(), "o".to_owned()])
		);
		assert_eq!(pat.matches("foo.c"), None);
	}
}
