//! Request → roster matching by full name.

use merchgen_shared::{EntityRecord, MatchedEntity, MerchRequest};
use tracing::debug;

/// How full names are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    pub case_sensitive: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

/// Matched entities in request order, plus the requests nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedEntity>,
    pub missing: Vec<MerchRequest>,
}

/// Pair every request with the first roster entity whose full name equals
/// the request's `"{city} {name}"`.
///
/// Linear scan per request; rosters are a few dozen rows.
pub fn match_requests(
    requests: &[MerchRequest],
    roster: &[EntityRecord],
    options: MatchOptions,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    for request in requests {
        let wanted = request.full_name();
        let found = roster.iter().find(|record| {
            if options.case_sensitive {
                record.full_name == wanted
            } else {
                record.full_name.to_lowercase() == wanted.to_lowercase()
            }
        });

        match found {
            Some(record) => outcome.matched.push(MatchedEntity {
                request: request.clone(),
                record: record.clone(),
            }),
            None => {
                debug!(request = %wanted, "no roster entity");
                outcome.missing.push(request.clone());
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(abb: &str, full_name: &str) -> EntityRecord {
        EntityRecord {
            abbreviation: abb.into(),
            city: String::new(),
            name: full_name.into(),
            full_name: full_name.into(),
            classification: "AL".into(),
            division: "East".into(),
            colors: ["bd3039".into(), String::new(), String::new()],
        }
    }

    fn request(city: &str, name: &str) -> MerchRequest {
        MerchRequest {
            abbreviation: String::new(),
            city: city.into(),
            name: name.into(),
        }
    }

    #[test]
    fn matches_by_full_name_and_tallies_missing() {
        let roster = vec![record("BOS", "Red Sox"), record("NYY", "Yankees")];
        let requests = vec![request("Red", "Sox"), request("Blue", "Jays")];

        let outcome = match_requests(&requests, &roster, MatchOptions::default());
        assert_eq!(outcome.matched.len(), 1);
        assert_eq!(outcome.matched[0].record.abbreviation, "BOS");
        assert_eq!(outcome.missing, vec![request("Blue", "Jays")]);
    }

    #[test]
    fn deterministic_and_order_preserving() {
        let roster = vec![
            record("BOS", "Boston Red Sox"),
            record("NYY", "New York Yankees"),
            record("TOR", "Toronto Blue Jays"),
        ];
        let requests = vec![
            request("Toronto", "Blue Jays"),
            request("Boston", "Red Sox"),
            request("New York", "Yankees"),
        ];

        let first = match_requests(&requests, &roster, MatchOptions::default());
        let second = match_requests(&requests, &roster, MatchOptions::default());
        assert_eq!(first, second);
        let order: Vec<_> = first.matched.iter().map(|m| m.record.abbreviation.as_str()).collect();
        assert_eq!(order, vec!["TOR", "BOS", "NYY"]);
    }

    #[test]
    fn first_roster_match_wins() {
        let roster = vec![record("OLD", "Red Sox"), record("NEW", "Red Sox")];
        let outcome = match_requests(&[request("Red", "Sox")], &roster, MatchOptions::default());
        assert_eq!(outcome.matched[0].record.abbreviation, "OLD");
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let roster = vec![record("BOS", "Boston Red Sox")];
        let requests = vec![request("boston", "RED SOX")];

        let strict = match_requests(&requests, &roster, MatchOptions { case_sensitive: true });
        assert!(strict.matched.is_empty());
        assert_eq!(strict.missing.len(), 1);

        let loose = match_requests(&requests, &roster, MatchOptions { case_sensitive: false });
        assert_eq!(loose.matched.len(), 1);
        assert!(loose.missing.is_empty());
        // The request keeps its own spelling; the record is canonical.
        assert_eq!(loose.matched[0].request.city, "boston");
        assert_eq!(loose.matched[0].full_name(), "Boston Red Sox");
    }

    #[test]
    fn missing_city_matches_name_only_record() {
        let roster = vec![record("SOX", "Sox")];
        let outcome = match_requests(&[request("", "Sox")], &roster, MatchOptions::default());
        assert_eq!(outcome.matched.len(), 1);
    }
}
