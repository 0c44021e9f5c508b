//! Agent instruction text.

use crate::TaskRequest;

/// Builds the instruction sent to the agent for `target_url`.
///
/// The comment text is embedded verbatim between double quotes; it is never
/// truncated or escaped, so the agent sees exactly what the reviewer wrote.
pub fn build_prompt(target_url: &str, instruction_text: &str) -> String {
    format!(
        "Fix the issues in PR {target_url} based on the following comment: \
         \"{instruction_text}\". \
         Once complete, push the fix to a new branch and create a new pull request."
    )
}

/// Convenience wrapper over [`build_prompt`] for an extracted request.
pub fn prompt_for(request: &TaskRequest) -> String {
    build_prompt(request.target_url(), request.instruction_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_the_target_and_quotes_the_comment() {
        let prompt = build_prompt("https://github.com/o/r/pull/7", "fix X");
        assert_eq!(
            prompt,
            "Fix the issues in PR https://github.com/o/r/pull/7 based on the following comment: \
             \"fix X\". Once complete, push the fix to a new branch and create a new pull request."
        );
    }

    #[test]
    fn long_multiline_comment_is_embedded_verbatim() {
        let comment = format!("line one\n```rust\nlet x = 1;\n```\n{}", "y".repeat(10_000));
        let prompt = build_prompt("https://h/o/r/pull/1", &comment);
        assert!(prompt.contains(&format!("\"{comment}\"")));
    }
}
