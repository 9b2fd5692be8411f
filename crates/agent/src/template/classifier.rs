//! Record classification against a template's matching rule.

use super::types::Template;

/// Decides whether `record` belongs to `template`.
///
/// - no pattern and no accepted types: everything matches
/// - a pattern without accepted types: nothing matches
/// - otherwise capture group 1 must be one of the accepted types
pub fn matches(record: &str, template: &Template) -> bool {
    let Some(pattern) = &template.type_pattern else {
        return template.accepted_types.is_empty();
    };

    if template.accepted_types.is_empty() {
        return false;
    }

    pattern
        .captures(record)
        .and_then(|caps| caps.get(1))
        .is_some_and(|group| template.accepted_types.contains(group.as_str()))
}
