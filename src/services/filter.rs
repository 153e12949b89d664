//! Filter matching for backup exclusion.
//!
//! A filter is a plain case-insensitive substring; there are no glob or regex
//! semantics. Filters are evaluated in configured order and the first match
//! is the one reported.

use crate::models::Mod;

/// Check whether `filter` appears anywhere inside `candidate`, ignoring case.
///
/// An empty filter matches everything. Empty filters are rejected when they
/// are added to the configuration, not here.
///
/// # Examples
///
/// ```
/// use aurora::services::filter::matches;
///
/// assert!(matches("WeaponRetex", "weapon"));
/// assert!(!matches("Hair", "weapon"));
/// ```
pub fn matches(candidate: &str, filter: &str) -> bool {
    candidate.to_lowercase().contains(&filter.to_lowercase())
}

/// Find the first filter that excludes a mod.
///
/// Each filter is checked against the mod name, and against the collection
/// name when the mod belongs to exactly one collection. A mod shared by
/// several collections is never excluded through a collection name.
///
/// # Arguments
///
/// * `mod_entry` - The mod to test
/// * `filters` - Filter patterns in configured order
///
/// # Returns
///
/// The matching filter, or `None` if the mod is kept
pub fn first_match<'a>(mod_entry: &Mod, filters: &'a [String]) -> Option<&'a str> {
    let name = mod_entry.name.to_lowercase();
    let collection = match mod_entry.collections.as_slice() {
        [only] => Some(only.to_lowercase()),
        _ => None,
    };

    filters
        .iter()
        .find(|filter| {
            let filter = filter.to_lowercase();
            name.contains(&filter)
                || collection
                    .as_deref()
                    .is_some_and(|collection| collection.contains(&filter))
        })
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mod_in(name: &str, collections: &[&str]) -> Mod {
        let mut m = Mod::new(name, format!("/mods/{}", name), 1);
        m.collections = collections.iter().map(|c| c.to_string()).collect();
        m
    }

    fn filters(list: &[&str]) -> Vec<String> {
        list.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_matches_case_insensitive() {
        assert!(matches("WeaponRetex", "weapon"));
        assert!(matches("weaponretex", "RETEX"));
        assert!(!matches("Hair Pack", "weapon"));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches("Anything", ""));
        assert!(matches("", ""));
    }

    #[test]
    fn test_first_match_wins() {
        let m = mod_in("abc", &["Default"]);
        assert_eq!(first_match(&m, &filters(&["a", "ab"])), Some("a"));
        assert_eq!(first_match(&m, &filters(&["ab", "a"])), Some("ab"));
    }

    #[test]
    fn test_no_match() {
        let m = mod_in("Hair Pack", &["Default"]);
        assert_eq!(first_match(&m, &filters(&["weapon", "gear"])), None);
        assert_eq!(first_match(&m, &[]), None);
    }

    #[test]
    fn test_single_collection_name_matches() {
        let m = mod_in("Hair Pack", &["Gpose Only"]);
        assert_eq!(first_match(&m, &filters(&["gpose"])), Some("gpose"));
    }

    #[test]
    fn test_shared_mod_ignores_collection_name() {
        let m = mod_in("Hair Pack", &["Gpose Only", "Default"]);
        assert_eq!(first_match(&m, &filters(&["gpose"])), None);
    }

    proptest! {
        #[test]
        fn prop_match_ignores_case(candidate in "[a-zA-Z ]{0,24}", start in 0usize..24, len in 0usize..8) {
            let start = start.min(candidate.len());
            let end = (start + len).min(candidate.len());
            let filter = candidate[start..end].to_string();

            prop_assert!(matches(&candidate, &filter));
            prop_assert!(matches(&candidate.to_uppercase(), &filter.to_lowercase()));
            prop_assert!(matches(&candidate.to_lowercase(), &filter.to_uppercase()));
        }

        #[test]
        fn prop_first_match_is_earliest(name in "[a-z]{1,12}", extra in proptest::collection::vec("[a-z]{1,3}", 0..6)) {
            let m = mod_in(&name, &[]);
            let mut list = extra.clone();
            list.push(name[..1].to_string());

            let found = first_match(&m, &list).map(str::to_string);
            let expected = list.iter().find(|f| name.contains(f.as_str())).cloned();
            prop_assert_eq!(found, expected);
        }
    }
}
