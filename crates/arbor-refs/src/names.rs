//! Branch name validation.
//!
//! Branch names key the `branches` map of their fork point, so they must be
//! non-empty, printable, and free of path-like syntax:
//! - no whitespace or control characters
//! - none of `~ ^ : ? * [ \`
//! - no `..`, and no leading or trailing `.` or `/`

use crate::error::{RefError, RefResult};

const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a branch name, returning `Ok(())` if valid.
///
/// ```
/// use arbor_refs::validate_branch_name;
///
/// assert!(validate_branch_name("draft").is_ok());
/// assert!(validate_branch_name("review/2024").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("a..b").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> RefResult<()> {
    let reject = |reason: String| {
        Err(RefError::InvalidBranchName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("must not be empty".into());
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return reject(format!("contains forbidden character {ch:?}"));
    }
    if name.contains("..") {
        return reject("must not contain '..'".into());
    }
    for edge in ['.', '/'] {
        if name.starts_with(edge) || name.ends_with(edge) {
            return reject(format!("must not start or end with {edge:?}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested() {
        for name in ["main", "v1.0", "my-branch", "team/alice/fix"] {
            assert!(validate_branch_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in [
            "", "a b", "a\tb", "a~b", "a:b", "a*b", "a\\b", "x..y", ".x", "x.", "/x", "x/",
        ] {
            assert!(validate_branch_name(name).is_err(), "{name:?}");
        }
    }
}
