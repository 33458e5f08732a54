//! Free-text U.S. state classification
//!
//! Given a voter's free-text answer, return one canonical state name or
//! nothing. Ambiguity resolves to nothing so the router asks again; the
//! classifier never guesses.

use crate::text::normalize;

struct StateEntry {
    /// Canonical display name, e.g. "North Carolina"
    name: &'static str,
    /// Lowercased name with spaces removed, e.g. "northcarolina"
    squashed: &'static str,
    /// Postal abbreviation, lowercased
    abbrev: &'static str,
}

const STATES: &[StateEntry] = &[
    StateEntry { name: "Alabama", squashed: "alabama", abbrev: "al" },
    StateEntry { name: "Alaska", squashed: "alaska", abbrev: "ak" },
    StateEntry { name: "Arizona", squashed: "arizona", abbrev: "az" },
    StateEntry { name: "Arkansas", squashed: "arkansas", abbrev: "ar" },
    StateEntry { name: "California", squashed: "california", abbrev: "ca" },
    StateEntry { name: "Colorado", squashed: "colorado", abbrev: "co" },
    StateEntry { name: "Connecticut", squashed: "connecticut", abbrev: "ct" },
    StateEntry { name: "Delaware", squashed: "delaware", abbrev: "de" },
    StateEntry { name: "District of Columbia", squashed: "districtofcolumbia", abbrev: "dc" },
    // Alias row: "washington dc" must resolve to the district, not tie
    // with Washington state
    StateEntry { name: "District of Columbia", squashed: "washingtondc", abbrev: "dc" },
    StateEntry { name: "Florida", squashed: "florida", abbrev: "fl" },
    StateEntry { name: "Georgia", squashed: "georgia", abbrev: "ga" },
    StateEntry { name: "Hawaii", squashed: "hawaii", abbrev: "hi" },
    StateEntry { name: "Idaho", squashed: "idaho", abbrev: "id" },
    StateEntry { name: "Illinois", squashed: "illinois", abbrev: "il" },
    StateEntry { name: "Indiana", squashed: "indiana", abbrev: "in" },
    StateEntry { name: "Iowa", squashed: "iowa", abbrev: "ia" },
    StateEntry { name: "Kansas", squashed: "kansas", abbrev: "ks" },
    StateEntry { name: "Kentucky", squashed: "kentucky", abbrev: "ky" },
    StateEntry { name: "Louisiana", squashed: "louisiana", abbrev: "la" },
    StateEntry { name: "Maine", squashed: "maine", abbrev: "me" },
    StateEntry { name: "Maryland", squashed: "maryland", abbrev: "md" },
    StateEntry { name: "Massachusetts", squashed: "massachusetts", abbrev: "ma" },
    StateEntry { name: "Michigan", squashed: "michigan", abbrev: "mi" },
    StateEntry { name: "Minnesota", squashed: "minnesota", abbrev: "mn" },
    StateEntry { name: "Mississippi", squashed: "mississippi", abbrev: "ms" },
    StateEntry { name: "Missouri", squashed: "missouri", abbrev: "mo" },
    StateEntry { name: "Montana", squashed: "montana", abbrev: "mt" },
    StateEntry { name: "Nebraska", squashed: "nebraska", abbrev: "ne" },
    StateEntry { name: "Nevada", squashed: "nevada", abbrev: "nv" },
    StateEntry { name: "New Hampshire", squashed: "newhampshire", abbrev: "nh" },
    StateEntry { name: "New Jersey", squashed: "newjersey", abbrev: "nj" },
    StateEntry { name: "New Mexico", squashed: "newmexico", abbrev: "nm" },
    StateEntry { name: "New York", squashed: "newyork", abbrev: "ny" },
    StateEntry { name: "North Carolina", squashed: "northcarolina", abbrev: "nc" },
    StateEntry { name: "North Dakota", squashed: "northdakota", abbrev: "nd" },
    StateEntry { name: "Ohio", squashed: "ohio", abbrev: "oh" },
    StateEntry { name: "Oklahoma", squashed: "oklahoma", abbrev: "ok" },
    StateEntry { name: "Oregon", squashed: "oregon", abbrev: "or" },
    StateEntry { name: "Pennsylvania", squashed: "pennsylvania", abbrev: "pa" },
    StateEntry { name: "Rhode Island", squashed: "rhodeisland", abbrev: "ri" },
    StateEntry { name: "South Carolina", squashed: "southcarolina", abbrev: "sc" },
    StateEntry { name: "South Dakota", squashed: "southdakota", abbrev: "sd" },
    StateEntry { name: "Tennessee", squashed: "tennessee", abbrev: "tn" },
    StateEntry { name: "Texas", squashed: "texas", abbrev: "tx" },
    StateEntry { name: "Utah", squashed: "utah", abbrev: "ut" },
    StateEntry { name: "Vermont", squashed: "vermont", abbrev: "vt" },
    StateEntry { name: "Virginia", squashed: "virginia", abbrev: "va" },
    StateEntry { name: "Washington", squashed: "washington", abbrev: "wa" },
    StateEntry { name: "West Virginia", squashed: "westvirginia", abbrev: "wv" },
    StateEntry { name: "Wisconsin", squashed: "wisconsin", abbrev: "wi" },
    StateEntry { name: "Wyoming", squashed: "wyoming", abbrev: "wy" },
];

/// Classify free text as one canonical U.S. state name.
///
/// Matches whole tokens only: a postal abbreviation must be its own word
/// ("once" never matches NC) and a full name must be a contiguous run of
/// words ("noRtH CaRolinA" matches, "northcarolinian" does not). A match
/// whose tokens sit entirely inside another state's longer match is
/// shadowed and dropped, so "west virginia" is West Virginia and never a
/// tie with Virginia. If more than one distinct state survives shadowing,
/// returns `None`.
pub fn classify(text: &str) -> Option<&'static str> {
    let normalized = normalize(text);
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.is_empty() {
        return None;
    }

    let mut matches: Vec<(&'static str, Span)> = Vec::new();
    for state in STATES {
        for span in matching_spans(state, &tokens) {
            matches.push((state.name, span));
        }
    }

    let mut found: Option<&'static str> = None;
    for &(name, span) in &matches {
        let shadowed = matches
            .iter()
            .any(|&(other, outer)| other != name && span.inside(outer));
        if shadowed {
            continue;
        }
        match found {
            Some(prev) if prev != name => return None,
            _ => found = Some(name),
        }
    }
    found
}

/// Half-open token range a state name or abbreviation matched at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    /// Strictly contained: within `outer` but not equal to it. Equal spans
    /// stay a genuine tie.
    fn inside(self, outer: Span) -> bool {
        outer.start <= self.start && self.end <= outer.end && self != outer
    }
}

/// Every token range where this state matches: standalone abbreviation
/// tokens, plus contiguous token windows whose concatenation equals the
/// squashed name ("north carolina" and "northcarolina" both match).
fn matching_spans(state: &StateEntry, tokens: &[&str]) -> Vec<Span> {
    let mut spans = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if *token == state.abbrev {
            spans.push(Span { start: i, end: i + 1 });
        }
    }
    for start in 0..tokens.len() {
        let mut acc = String::new();
        for (offset, token) in tokens.iter().skip(start).enumerate() {
            acc.push_str(token);
            if acc.len() >= state.squashed.len() {
                if acc == state.squashed {
                    spans.push(Span {
                        start,
                        end: start + offset + 1,
                    });
                }
                break;
            }
        }
    }
    spans
}
