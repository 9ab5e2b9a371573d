//! Rule attributes

/// Attributes of a rule
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Attrs {
	/// `D`: delete the target when the recipe fails
	pub del_failed: bool,

	/// `E`: don't stop other work if the recipe fails
	pub nonstop: bool,

	/// `N`: update the target's timestamp whether the recipe does or not
	pub forced_timestamp: bool,

	/// `n`: a meta-rule that will only match files
	pub nonvirtual: bool,

	/// `Q`: don't print the recipe
	pub quiet: bool,

	/// `R`: targets are regular expressions
	pub regex: bool,

	/// `U`: treat the targets as if they were updated
	pub update: bool,

	/// `V`: targets are virtual, not files
	pub is_virtual: bool,

	/// `X`: don't execute concurrently with any other rule
	pub exclusive: bool,
}
