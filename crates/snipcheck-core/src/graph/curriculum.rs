//! Curriculum ordering of documents.
//!
//! Lessons encode their order only in path names (`01-intro/02-types.md`).
//! Each path component is split into a leading number and a remainder;
//! numbered components sort numerically before unnumbered ones, ties are
//! broken lexicographically. An `order:` front-matter value replaces the
//! number of the file name component.

use std::cmp::Ordering;

/// One component of a curriculum key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyPart {
    number: Option<u64>,
    rest: String,
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number, other.number) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.rest.cmp(&other.rest)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.rest.cmp(&other.rest),
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort key derived from a corpus-relative path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CurriculumKey(Vec<KeyPart>);

impl CurriculumKey {
    /// Build the key for a corpus-relative path (forward slashes).
    pub fn from_path(path: &str, order_hint: Option<u64>) -> Self {
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let last = components.len().saturating_sub(1);

        let parts = components
            .iter()
            .enumerate()
            .map(|(i, component)| {
                let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
                let rest = component[digits.len()..]
                    .trim_start_matches(['-', '_', '.', ' '])
                    .to_lowercase();
                let number = if i == last && order_hint.is_some() {
                    order_hint
                } else {
                    digits.parse().ok()
                };
                KeyPart { number, rest }
            })
            .collect();

        Self(parts)
    }
}

/// Compute curriculum ordinals for a list of `(path, order_hint)` entries.
///
/// Returns, for each input entry, its 0-based position in curriculum order.
/// Equal keys fall back to the raw path so the result is total.
pub fn curriculum_ordinals(entries: &[(&str, Option<u64>)]) -> Vec<usize> {
    let mut keyed: Vec<(CurriculumKey, &str, usize)> = entries
        .iter()
        .enumerate()
        .map(|(i, (path, hint))| (CurriculumKey::from_path(path, *hint), *path, i))
        .collect();
    keyed.sort();

    let mut ordinals = vec![0; entries.len()];
    for (ordinal, (_, _, original)) in keyed.into_iter().enumerate() {
        ordinals[original] = ordinal;
    }
    ordinals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(paths: &[&str]) -> Vec<String> {
        let entries: Vec<_> = paths.iter().map(|p| (*p, None)).collect();
        let ordinals = curriculum_ordinals(&entries);
        let mut sorted: Vec<(usize, &str)> = ordinals.into_iter().zip(paths.iter().copied()).collect();
        sorted.sort();
        sorted.into_iter().map(|(_, p)| p.to_string()).collect()
    }

    #[test]
    fn test_numeric_prefixes_sort_numerically() {
        let sorted = order(&["10-advanced.md", "2-types.md", "1-intro.md"]);
        assert_eq!(sorted, vec!["1-intro.md", "2-types.md", "10-advanced.md"]);
    }

    #[test]
    fn test_nested_directories() {
        let sorted = order(&[
            "02-functions/01-basics.md",
            "01-start/10-more.md",
            "01-start/02-next.md",
            "README.md",
        ]);
        assert_eq!(
            sorted,
            vec![
                "01-start/02-next.md",
                "01-start/10-more.md",
                "02-functions/01-basics.md",
                "README.md",
            ]
        );
    }

    #[test]
    fn test_order_hint_overrides_file_prefix() {
        let entries = [("01-a.md", None), ("02-b.md", None), ("03-c.md", Some(0))];
        let ordinals = curriculum_ordinals(&entries);
        assert_eq!(ordinals, vec![1, 2, 0]);
    }

    #[test]
    fn test_unnumbered_lexicographic() {
        let sorted = order(&["zeta.md", "Alpha.md", "beta.md"]);
        assert_eq!(sorted, vec!["Alpha.md", "beta.md", "zeta.md"]);
    }
}
