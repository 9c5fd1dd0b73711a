use std::collections::BTreeMap;

use crate::types::{Catalog, Program};

/// Programs borrowed from a catalog, keyed by identifier and iterated in identifier order
pub type ProgramMatches<'a> = BTreeMap<&'a str, &'a Program>;

fn contains(candidate: &str, pattern: &str, ignore_case: bool) -> bool {
    if ignore_case {
        candidate.to_lowercase().contains(pattern)
    } else {
        candidate.contains(pattern)
    }
}

/// Programs whose title or foreign title contains `pattern`.
///
/// Results come back in identifier order, the same order as the catalog.
pub fn search<'a>(catalog: &'a Catalog, pattern: &str, ignore_case: bool) -> ProgramMatches<'a> {
    let pattern = if ignore_case {
        pattern.to_lowercase()
    } else {
        pattern.to_string()
    };

    catalog
        .programs()
        .filter(|program| {
            contains(&program.title, &pattern, ignore_case)
                || program
                    .foreign_title
                    .as_deref()
                    .is_some_and(|foreign| contains(foreign, &pattern, ignore_case))
        })
        .map(|program| (program.id.as_str(), program))
        .collect()
}

/// Union of the matches for every pattern, each program appearing once, in identifier order
pub fn search_all<'a, P: AsRef<str>>(
    catalog: &'a Catalog,
    patterns: &[P],
    ignore_case: bool,
) -> ProgramMatches<'a> {
    let mut found = ProgramMatches::new();
    for pattern in patterns {
        found.extend(search(catalog, pattern.as_ref(), ignore_case));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        let program = |id: &str, title: &str, foreign: Option<&str>| Program {
            id: id.into(),
            title: title.into(),
            foreign_title: foreign.map(Into::into),
            short_description: None,
            episodes: Vec::new(),
        };
        [
            program("p1", "Fréttir", None),
            program("p2", "Hvolpasveitin", Some("Paw Patrol")),
            program("p3", "Krakkafréttir", None),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn ignore_case_lowers_both_sides() {
        let catalog = catalog();

        let found = search(&catalog, "frétt", true);
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), ["p1", "p3"]);

        let found = search(&catalog, "frétt", false);
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), ["p3"]);
    }

    #[test]
    fn foreign_title_matches() {
        let catalog = catalog();

        assert!(search(&catalog, "Paw", false).contains_key("p2"));
        assert!(search(&catalog, "paw", false).is_empty());
        assert!(search(&catalog, "PAW", true).contains_key("p2"));
    }

    #[test]
    fn matches_borrow_catalog_programs() {
        let catalog = catalog();
        let found = search(&catalog, "Hvolpa", false);

        assert!(std::ptr::eq(found["p2"], catalog.get("p2").unwrap()));
    }

    #[test]
    fn multiple_patterns_are_unioned_without_duplicates() {
        let catalog = catalog();

        let found = search_all(&catalog, &["frétt", "Fréttir", "Patrol"], false);

        assert_eq!(found.keys().copied().collect::<Vec<_>>(), ["p1", "p2", "p3"]);
    }

    #[test]
    fn results_follow_identifier_order() {
        let program = |id: &str| Program {
            id: id.into(),
            title: format!("Fréttir {id}"),
            foreign_title: None,
            short_description: None,
            episodes: Vec::new(),
        };
        let catalog: Catalog = ["p9", "p1", "p5"].map(program).into_iter().collect();

        let ids: Vec<_> = search(&catalog, "Fréttir", false).into_keys().collect();
        assert_eq!(ids, ["p1", "p5", "p9"]);
    }
}
