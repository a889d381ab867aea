//! Closed-set region/language vocabulary used to parse tags out of display
//! basenames (§4.1). Spec.md leaves the exact set as an Open Question
//! (§9); this is the common No-Intro/TOSEC tag vocabulary, overridable by
//! the caller through [`crate::config::RunConfig`] if it ever needs to grow.

/// Region codes recognized inside parenthesized groups, e.g. `(USA, Europe)`.
pub const REGIONS: &[(&str, &str)] = &[
    ("USA", "US"),
    ("US", "US"),
    ("World", "WOR"),
    ("Europe", "EU"),
    ("EU", "EU"),
    ("Japan", "JP"),
    ("JP", "JP"),
    ("Asia", "AS"),
    ("Australia", "AU"),
    ("Brazil", "BR"),
    ("Canada", "CA"),
    ("China", "CN"),
    ("France", "FR"),
    ("Germany", "DE"),
    ("Italy", "IT"),
    ("Korea", "KR"),
    ("Netherlands", "NL"),
    ("Russia", "RU"),
    ("Spain", "ES"),
    ("Sweden", "SE"),
    ("Taiwan", "TW"),
    ("UK", "UK"),
];

/// Language codes recognized the same way, e.g. `(En,Fr,De)`.
pub const LANGUAGES: &[&str] = &[
    "En", "Fr", "De", "Es", "It", "Nl", "Pt", "Sv", "No", "Da", "Fi", "Zh", "Ja", "Ko", "Ru", "Pl",
];

/// Split a basename into its bare title and the declared regions/languages
/// found in parenthesized groups. Titles without annotation yield empty lists.
pub fn parse_tags(basename: &str) -> (Vec<String>, Vec<String>) {
    let mut regions = Vec::new();
    let mut languages = Vec::new();

    let mut depth = 0usize;
    let mut group = String::new();
    for c in basename.chars() {
        match c {
            '(' => {
                depth += 1;
                group.clear();
            }
            ')' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        classify_group(&group, &mut regions, &mut languages);
                    }
                }
            }
            _ if depth > 0 => group.push(c),
            _ => {}
        }
    }

    (regions, languages)
}

fn classify_group(group: &str, regions: &mut Vec<String>, languages: &mut Vec<String>) {
    for token in group.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some((_, code)) = REGIONS.iter().find(|(name, _)| name.eq_ignore_ascii_case(token)) {
            if !regions.contains(&code.to_string()) {
                regions.push(code.to_string());
            }
            continue;
        }
        if let Some(code) = LANGUAGES.iter().find(|l| l.eq_ignore_ascii_case(token)) {
            let code = (*code).to_string();
            if !languages.contains(&code) {
                languages.push(code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_region() {
        let (regions, languages) = parse_tags("World Explorer (World)");
        assert_eq!(regions, vec!["WOR"]);
        assert!(languages.is_empty());
    }

    #[test]
    fn parses_multi_region_in_source_order() {
        let (regions, _) = parse_tags("Sample Saga (USA, Europe)");
        assert_eq!(regions, vec!["US", "EU"]);
    }

    #[test]
    fn unannotated_title_has_no_tags() {
        let (regions, languages) = parse_tags("Untitled Game");
        assert!(regions.is_empty());
        assert!(languages.is_empty());
    }

    #[test]
    fn mixed_region_and_language_group() {
        let (regions, languages) = parse_tags("Demo Orbit (Europe) (En,Fr,De)");
        assert_eq!(regions, vec!["EU"]);
        assert_eq!(languages, vec!["En", "Fr", "De"]);
    }
}
