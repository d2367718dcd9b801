//! Edit-distance suggestions against the student table.

use crate::exam_layout::StudentEntry;

/// Largest edit distance at which a name is suggested outright.
pub const MAX_NAME_DISTANCE: usize = 3;

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            cur[j + 1] = substitution.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Student whose id is nearest to `query`.
pub fn closest_id<'a>(students: &'a [StudentEntry], query: &str) -> Option<&'a StudentEntry> {
    let query = query.trim();
    students.iter().min_by_key(|s| levenshtein(query, &s.id))
}

/// Best guess of the student meant by a mistyped name.
///
/// Tried in order: a name within [`MAX_NAME_DISTANCE`] edits, a name
/// starting with the query, a name part starting with the query, a name
/// part contained in the query or containing it. Case-insensitive.
pub fn suggest_name<'a>(students: &'a [StudentEntry], query: &str) -> Option<&'a StudentEntry> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    let lowered: Vec<(String, &StudentEntry)> = students.iter().map(|s| (s.name.to_lowercase(), s)).collect();

    let nearest = lowered
        .iter()
        .map(|(name, s)| (levenshtein(&query, name), *s))
        .min_by_key(|(d, _)| *d);
    if let Some((d, s)) = nearest {
        if d <= MAX_NAME_DISTANCE {
            return Some(s);
        }
    }

    let find = |pred: &dyn Fn(&str) -> bool| lowered.iter().find(|(name, _)| pred(name.as_str())).map(|(_, s)| *s);
    find(&|name: &str| name.starts_with(&query))
        .or_else(|| find(&|name: &str| name.split_whitespace().any(|part| part.starts_with(&query))))
        .or_else(|| {
            find(&|name: &str| {
                name.split_whitespace()
                    .any(|part| part.contains(&query) || query.contains(part))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn students() -> Vec<StudentEntry> {
        vec![
            StudentEntry::new("12", "Ada Lovelace"),
            StudentEntry::new("21", "Alan Turing"),
            StudentEntry::new("30", "Grace Hopper"),
        ]
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("turing", "turing"), 0);
        assert_eq!(levenshtein("héllo", "hello"), 1);
    }

    #[test]
    fn close_typo_is_suggested_first() {
        let list = students();
        assert_eq!(suggest_name(&list, "alan turnig").map(|s| s.id.as_str()), Some("21"));
    }

    #[test]
    fn prefixes_and_parts_are_tried_in_order() {
        let list = students();
        assert_eq!(suggest_name(&list, "Grace H").map(|s| s.id.as_str()), Some("30"));
        assert_eq!(suggest_name(&list, "lovel").map(|s| s.id.as_str()), Some("12"));
        assert_eq!(suggest_name(&list, "mr hopper jr").map(|s| s.id.as_str()), Some("30"));
        assert!(suggest_name(&list, "zzzzzzzz").is_none());
        assert!(suggest_name(&list, "  ").is_none());
    }

    #[test]
    fn nearest_id_wins() {
        let list = students();
        assert_eq!(closest_id(&list, "33").map(|s| s.name.as_str()), Some("Grace Hopper"));
        assert!(closest_id(&[], "33").is_none());
    }
}
