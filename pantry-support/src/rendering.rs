//! Text rendering utilities for human-friendly error messages.
//!
//! Helpers to format resolution chains, type names and
//! "did you mean?" suggestions for unknown service identifiers.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use pantry_support::rendering::render_chain;
///
/// let chain = vec!["session", "session_storage", "session"];
/// assert_eq!(render_chain(&chain), "session → session_storage → session");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut rendered = String::new();
    for (i, link) in chain.iter().enumerate() {
        if i > 0 {
            rendered.push_str(" → ");
        }
        rendered.push_str(link.as_ref());
    }
    rendered
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use pantry_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::session::SessionStorage");
/// assert_eq!(short, "SessionStorage");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Mailer>");
/// assert_eq!(short, "Arc<dyn Mailer>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut result = String::with_capacity(full_name.len());
    let mut segment = String::new();
    let mut chars = full_name.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&segment);
                result.push(ch);
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    result.push_str(&segment);
    result
}

/// Levenshtein distance between two identifiers, compared case-insensitively.
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Suggests registered identifiers close to `requested`.
///
/// Substring matches rank first, then identifiers within a small edit
/// distance (at most a third of the requested length, minimum one).
///
/// ```
/// use pantry_support::rendering::suggest_similar;
///
/// let available = ["session", "session_storage", "cookie_name"];
/// let suggestions = suggest_similar("sesion", &available, 2);
/// assert_eq!(suggestions[0], "session");
/// ```
pub fn suggest_similar(requested: &str, available: &[&str], max_suggestions: usize) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let tolerance = (requested.chars().count() / 3).max(1);

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter_map(|&name| {
            if name == requested {
                return None;
            }

            let name_lower = name.to_lowercase();
            let distance = edit_distance(&name_lower, &requested_lower);

            if !requested_lower.is_empty()
                && (name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower))
            {
                return Some((name, distance.min(tolerance)));
            }

            (distance <= tolerance).then_some((name, distance))
        })
        .collect();

    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_cycle_chain() {
        let chain = vec!["a", "b", "a"];
        assert_eq!(render_chain(&chain), "a → b → a");
    }

    #[test]
    fn render_single_element_chain() {
        assert_eq!(render_chain(&["a"]), "a");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn shorten_simple_path() {
        assert_eq!(shorten_type_name("alloc::string::String"), "String");
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::vec::Vec<core::option::Option<i32>>"),
            "Vec<Option<i32>>"
        );
    }

    #[test]
    fn shorten_references_and_slices() {
        assert_eq!(shorten_type_name("&[my_app::Session]"), "&[Session]");
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("session", "session"), 0);
        assert_eq!(edit_distance("session", "sesion"), 1);
        assert_eq!(edit_distance("Cookie", "cookie"), 0);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn suggest_typo() {
        let available = ["database", "logger", "mailer"];
        let suggestions = suggest_similar("databse", &available, 3);
        assert_eq!(suggestions, vec!["database".to_string()]);
    }

    #[test]
    fn suggest_substring_first() {
        let available = ["cookie_name", "cookie", "storage"];
        let suggestions = suggest_similar("cookie_nam", &available, 3);
        assert_eq!(suggestions[0], "cookie_name");
    }

    #[test]
    fn suggest_no_match() {
        let available = ["database"];
        assert!(suggest_similar("xyz", &available, 3).is_empty());
    }

    #[test]
    fn suggest_skips_exact_identifier() {
        let available = ["session"];
        assert!(suggest_similar("session", &available, 3).is_empty());
    }
}
