use crate::error::SearchError;
use crate::models::MovieRecord;

pub const MAX_RATING: f32 = 10.0;

/// Keeps records rated at least `min_rating`, in input order, capped at
/// `max_results`.
pub fn filter_by_rating(
    records: Vec<MovieRecord>,
    min_rating: f32,
    max_results: usize,
) -> Result<Vec<MovieRecord>, SearchError> {
    if !min_rating.is_finite() || !(0.0..=MAX_RATING).contains(&min_rating) {
        return Err(SearchError::InvalidInput(format!(
            "minimum rating must be between 0 and {MAX_RATING}, got {min_rating}"
        )));
    }
    Ok(records
        .into_iter()
        .filter(|r| r.rating >= min_rating)
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(title: &str, rating: f32) -> MovieRecord {
        MovieRecord {
            id: 0,
            title: title.to_string(),
            year: 2000,
            rating,
            genres: vec![],
            poster: None,
            page_url: format!("https://yts.mx/movies/{}", title.to_lowercase()),
            imdb_code: None,
            runtime_minutes: 0,
            summary: None,
            date_uploaded: None,
            torrents: vec![],
        }
    }

    fn titles(records: &[MovieRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn keeps_threshold_and_order() {
        let input = vec![
            movie("A", 7.1),
            movie("B", 5.9),
            movie("C", 6.0),
            movie("D", 9.3),
            movie("E", 2.0),
        ];
        let out = filter_by_rating(input, 6.0, 10).unwrap();
        assert_eq!(titles(&out), vec!["A", "C", "D"]);
        assert!(out.iter().all(|r| r.rating >= 6.0));
    }

    #[test]
    fn truncates_after_filtering() {
        let input = vec![
            movie("A", 8.0),
            movie("low", 1.0),
            movie("B", 8.0),
            movie("C", 8.0),
        ];
        let out = filter_by_rating(input, 6.0, 2).unwrap();
        assert_eq!(titles(&out), vec!["A", "B"]);
    }

    #[test]
    fn length_never_exceeds_max_for_any_threshold() {
        let ratings = [0.0, 3.2, 5.5, 6.0, 6.1, 7.7, 8.8, 9.9, 10.0];
        for threshold in [0.0_f32, 2.5, 6.0, 8.8, 10.0] {
            for max in 0..=ratings.len() + 1 {
                let input: Vec<_> = ratings
                    .iter()
                    .enumerate()
                    .map(|(i, r)| movie(&format!("m{i}"), *r))
                    .collect();
                let out = filter_by_rating(input.clone(), threshold, max).unwrap();
                assert!(out.len() <= max);
                assert!(out.iter().all(|r| r.rating >= threshold));
                // Output is a subsequence of the input.
                let mut positions = out
                    .iter()
                    .map(|o| input.iter().position(|i| i.title == o.title).unwrap());
                let mut last = None;
                for p in positions.by_ref() {
                    assert!(last.map_or(true, |l| p > l));
                    last = Some(p);
                }
            }
        }
    }

    #[test]
    fn nothing_qualifies_is_empty_not_error() {
        let out = filter_by_rating(vec![movie("ObscureFlop", 3.2)], 6.0, 10).unwrap();
        assert!(out.is_empty());
        assert!(filter_by_rating(vec![], 6.0, 10).unwrap().is_empty());
    }

    #[test]
    fn zero_max_results_yields_nothing() {
        let out = filter_by_rating(vec![movie("A", 9.0)], 6.0, 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        for bad in [f32::NAN, -0.5, 10.5, f32::INFINITY] {
            assert!(matches!(
                filter_by_rating(vec![], bad, 10),
                Err(SearchError::InvalidInput(_))
            ));
        }
    }
}
