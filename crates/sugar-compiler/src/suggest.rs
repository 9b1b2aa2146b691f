//! "Did you mean" suggestions for misspelled names.

/// Maximum edit distance for a suggestion.
pub const MAX_DISTANCE: usize = 2;

/// Returns the candidate closest to `input`, if any is within
/// [`MAX_DISTANCE`].
///
/// Comparison is case-insensitive. Ties go to the lexicographically smaller
/// candidate, so results do not depend on discovery order.
pub fn did_you_mean<'a>(input: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let needle = input.to_lowercase();

    candidates
        .into_iter()
        .filter(|candidate| !candidate.is_empty() && *candidate != input)
        .map(|candidate| {
            let distance = strsim::levenshtein(&needle, &candidate.to_lowercase());
            (distance, candidate)
        })
        .filter(|(distance, _)| *distance <= MAX_DISTANCE)
        .min()
        .map(|(_, candidate)| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_closest_match() {
        assert_eq!(
            did_you_mean("buton", ["card", "button", "alert"]),
            Some("button".to_string())
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(did_you_mean("S:FOREACH", ["s:foreach"]), Some("s:foreach".to_string()));
    }

    #[test]
    fn test_too_far() {
        assert_eq!(did_you_mean("navigation", ["nav"]), None);
    }

    #[test]
    fn test_empty_input_or_candidates() {
        assert_eq!(did_you_mean("", ["a"]), None);
        assert_eq!(did_you_mean("a", Vec::<&str>::new()), None);
    }

    #[test]
    fn test_ties_are_lexicographic() {
        assert_eq!(did_you_mean("cat", ["hat", "bat"]), Some("bat".to_string()));
    }
}
