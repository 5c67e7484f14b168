//! Template content rendering.

use std::collections::HashMap;

/// Substitutes `${name}` placeholders in `content` with values from
/// `variables`.
///
/// Placeholders without a matching key are left literal, so a partially
/// filled template remains inspectable downstream.
#[must_use]
pub fn replace_variables(content: &str, variables: &HashMap<String, String>) -> String {
    let mut result = content.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("${{{key}}}"), value);
    }
    result
}

/// Renders the final message content for one record: the template signature
/// prefixed to the variable-substituted template body.
#[must_use]
pub fn render_content(
    signature: &str,
    content: &str,
    variables: &HashMap<String, String>,
) -> String {
    format!("{signature}{}", replace_variables(content, variables))
}
