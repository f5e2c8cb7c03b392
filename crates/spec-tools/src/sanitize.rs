//! Tool and resource name helpers.

use std::collections::HashSet;

/// Longest name a compiled tool, resource, or prompt may carry.
pub const MAX_NAME_LEN: usize = 64;

const EMPTY_NAME: &str = "unnamed";

/// Collapse an arbitrary identifier into `[A-Za-z0-9_-]{1,64}`.
///
/// Disallowed characters become `_`, runs of `_` collapse, and leading/trailing `_` are
/// trimmed (again after truncation). Idempotent.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len().min(MAX_NAME_LEN * 2));
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = cap(out.trim_matches('_'), MAX_NAME_LEN);
    if trimmed.is_empty() {
        EMPTY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

// ASCII-only input, so byte slicing is safe.
fn cap(name: &str, max: usize) -> &str {
    if name.len() > max {
        name[..max].trim_end_matches('_')
    } else {
        name
    }
}

/// Best-effort English singular for resource nouns (`pets` → `pet`, `categories` → `category`).
#[must_use]
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.len() <= 3 || lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }
    if lower.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if ["ses", "xes", "zes", "ches", "shes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        return word[..word.len() - 2].to_string();
    }
    match lower.strip_suffix('s') {
        Some(_) => word[..word.len() - 1].to_string(),
        None => word.to_string(),
    }
}

/// Claim `base` in `taken`, or the first free `base_1`, `base_2`, ... that fits the length cap.
pub fn reserve_unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    if taken.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1usize;
    loop {
        let suffix = format!("_{counter}");
        let stem = cap(base, MAX_NAME_LEN.saturating_sub(suffix.len()));
        let candidate = format!("{stem}{suffix}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_and_collapses_disallowed_characters() {
        assert_eq!(sanitize_name("petstore_GET /pets/{petId}"), "petstore_GET_pets_petId");
        assert_eq!(sanitize_name("__a..b__"), "a_b");
        assert_eq!(sanitize_name("drive.files-list"), "drive_files-list");
        assert_eq!(sanitize_name("ünïcode"), "n_code");
    }

    #[test]
    fn empty_results_get_a_placeholder() {
        assert_eq!(sanitize_name(""), "unnamed");
        assert_eq!(sanitize_name("///"), "unnamed");
    }

    #[test]
    fn sanitize_is_idempotent_and_capped() {
        let long = format!("{}_/{}", "x".repeat(63), "y".repeat(40));
        let inputs = [
            "simple",
            "with spaces and $ymbols!",
            "_leading_and_trailing_",
            long.as_str(),
            "a".repeat(200).as_str(),
            "日本語のツール名",
        ]
        .map(str::to_string);
        for input in inputs {
            let once = sanitize_name(&input);
            assert!(once.len() <= MAX_NAME_LEN, "{once}");
            assert_eq!(sanitize_name(&once), once);
        }
        assert_eq!(sanitize_name(&long), "x".repeat(63));
    }

    #[test]
    fn singularizes_common_plurals() {
        assert_eq!(singularize("pets"), "pet");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("user"), "user");
    }

    #[test]
    fn unique_names_get_suffixes_within_the_cap() {
        let mut taken = HashSet::new();
        assert_eq!(reserve_unique_name(&mut taken, "list_pets"), "list_pets");
        assert_eq!(reserve_unique_name(&mut taken, "list_pets"), "list_pets_1");
        assert_eq!(reserve_unique_name(&mut taken, "list_pets"), "list_pets_2");

        let long = "a".repeat(MAX_NAME_LEN);
        reserve_unique_name(&mut taken, &long);
        let second = reserve_unique_name(&mut taken, &long);
        assert_eq!(second.len(), MAX_NAME_LEN);
        assert!(second.ends_with("_1"));
    }
}
