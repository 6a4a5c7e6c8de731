//! `{{name}}` placeholder substitution.
//!
//! This is the only templating syntax in the workflow format.  Substitution
//! is textual and case-sensitive; placeholders with no matching value are
//! left untouched so a later substitution pass (or the executor's
//! extracted-data fill) can resolve them.

use std::collections::BTreeMap;

/// Replace every `{{name}}` occurrence in `input` with the matching value.
///
/// Names absent from `values` are not an error; the placeholder survives
/// verbatim.
pub fn substitute(input: &str, values: &BTreeMap<String, String>) -> String {
    let mut result = input.to_string();
    for (name, value) in values {
        let placeholder = format!("{{{{{name}}}}}");
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, value);
        }
    }
    result
}

/// Substitute in place, only if the string actually holds a placeholder.
pub fn substitute_opt(field: &mut Option<String>, values: &BTreeMap<String, String>) {
    if let Some(s) = field {
        *s = substitute(s, values);
    }
}

/// Whether `input` still contains an unresolved `{{name}}` placeholder.
pub fn has_placeholder(input: &str) -> bool {
    match input.find("{{") {
        Some(open) => input[open..].contains("}}"),
        None => false,
    }
}
