/// Wholesale replacement, for edits the structured appliers cannot express.
pub fn apply(_old: &str, new: &str) -> String {
    new.to_string()
}
