use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, AppResult};

/// Name reported for a genre id that has no matching genre record.
pub const UNKNOWN_GENRE: &str = "Unknown";

/// Film fields that have no null form; an explicit null is rejected, not ignored.
const NON_NULLABLE: &[&str] = &["id", "title", "vote_average", "vote_count"];

/// A passthrough attribute carried verbatim from ingestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<Attr>),
    Map(BTreeMap<String, Attr>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Film {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genre_ids: Vec<i64>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: i64,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Attr>,
}

impl Film {
    /// Parses an untyped film record, rejecting anything without an integral `id`.
    pub fn from_document(doc: serde_json::Value) -> AppResult<Self> {
        let Some(obj) = doc.as_object() else {
            return Err(AppError::validation("film record must be an object"));
        };
        if !obj.get("id").is_some_and(|id| id.is_i64() || id.is_u64()) {
            return Err(AppError::validation("film record requires an integer `id`"));
        }

        let film: Film =
            serde_json::from_value(doc).map_err(|e| AppError::validation(e.to_string()))?;
        film.validate()?;
        Ok(film)
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_rating("vote_average", self.vote_average)?;
        if self.vote_count < 0 {
            return Err(AppError::validation("vote_count must be non-negative"));
        }
        Ok(())
    }

    /// `vote_average == 0` means the film has no votes yet.
    pub fn is_rated(&self) -> bool {
        self.vote_average != 0.0
    }

    /// Field-level merge: everything present in `patch` overwrites, everything else stays.
    pub fn apply(&mut self, patch: FilmPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(genre_ids) = patch.genre_ids {
            self.genre_ids = genre_ids;
        }
        if let Some(vote_average) = patch.vote_average {
            self.vote_average = vote_average;
        }
        if let Some(vote_count) = patch.vote_count {
            self.vote_count = vote_count;
        }
        if let Some(release_date) = patch.release_date {
            self.release_date = release_date;
        }
        self.extra.extend(patch.extra);
    }
}

/// A manual edit. `None` means "leave the stored field alone".
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct FilmPatch {
    pub id: Option<i64>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present_or_empty")]
    pub genre_ids: Option<Vec<i64>>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    pub release_date: Option<Option<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Attr>,
}

impl FilmPatch {
    pub fn from_document(doc: serde_json::Value) -> AppResult<Self> {
        let Some(obj) = doc.as_object() else {
            return Err(AppError::validation("film update must be an object"));
        };
        let null_field = NON_NULLABLE.iter().find(|f| obj.get(**f).is_some_and(|v| v.is_null()));
        if let Some(field) = null_field {
            return Err(AppError::validation(format!("{field} may not be null")));
        }
        let patch: FilmPatch =
            serde_json::from_value(doc).map_err(|e| AppError::validation(e.to_string()))?;
        if patch.is_empty() {
            return Err(AppError::validation("film update has no fields"));
        }
        if let Some(vote_average) = patch.vote_average {
            validate_rating("vote_average", vote_average)?;
        }
        if patch.vote_count.is_some_and(|c| c < 0) {
            return Err(AppError::validation("vote_count must be non-negative"));
        }
        Ok(patch)
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.title.is_none()
            && self.genre_ids.is_none()
            && self.vote_average.is_none()
            && self.vote_count.is_none()
            && self.release_date.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Conjunctive film filter; every `None` is unconstrained.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchFilter {
    pub title: Option<String>,
    pub genre_id: Option<i64>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
}

impl SearchFilter {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(min) = self.min_rating {
            validate_bound("min_rating", min)?;
        }
        if let Some(max) = self.max_rating {
            validate_bound("max_rating", max)?;
        }
        if let (Some(min), Some(max)) = (self.min_rating, self.max_rating) {
            if min > max {
                return Err(AppError::validation(format!(
                    "min_rating ({min}) is greater than max_rating ({max})"
                )));
            }
        }
        Ok(())
    }

    /// Lower-cased title needle, or `None` when the filter is blank.
    /// Whitespace inside a non-blank needle is significant.
    pub fn title_needle(&self) -> Option<String> {
        self.title.as_deref().filter(|t| !t.trim().is_empty()).map(str::to_lowercase)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenreCount {
    pub genre_id: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AverageRating {
    pub average_rating: f64,
    pub rated_films: i64,
}

fn validate_rating(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || !(0.0..=10.0).contains(&value) {
        return Err(AppError::validation(format!("{field} must be between 0 and 10, got {value}")));
    }
    Ok(())
}

fn validate_bound(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() {
        return Err(AppError::validation(format!("{field} must be a finite number")));
    }
    Ok(())
}

fn null_as_empty<'de, D>(d: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<i64>>::deserialize(d)?.unwrap_or_default())
}

fn present_or_empty<'de, D>(d: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    null_as_empty(d).map(Some)
}

fn present<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(d).map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn film_keeps_unknown_attributes() {
        let doc = json!({
            "id": 27205,
            "title": "Inception",
            "genre_ids": [28, 878],
            "vote_average": 8.4,
            "vote_count": 36000,
            "release_date": "2010-07-15",
            "adult": false,
            "popularity": 88.5,
            "poster_path": null,
            "origin_country": ["US", "GB"]
        });
        let film = Film::from_document(doc.clone()).unwrap();

        assert_eq!(film.genre_ids, vec![28, 878]);
        assert_eq!(film.extra.get("adult"), Some(&Attr::Bool(false)));
        assert_eq!(film.extra.get("poster_path"), Some(&Attr::Null));
        assert_eq!(serde_json::to_value(&film).unwrap(), doc);
    }

    #[test]
    fn film_without_id_is_rejected() {
        let err = Film::from_document(json!({ "title": "Nameless" })).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = Film::from_document(json!({ "id": "12", "title": "Stringly" })).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn missing_or_null_genres_mean_empty() {
        let a = Film::from_document(json!({ "id": 1 })).unwrap();
        let b = Film::from_document(json!({ "id": 2, "genre_ids": null })).unwrap();
        assert!(a.genre_ids.is_empty());
        assert!(b.genre_ids.is_empty());
    }

    #[test]
    fn out_of_range_rating_is_rejected() {
        let err = Film::from_document(json!({ "id": 3, "vote_average": 11.0 })).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut film = Film::from_document(json!({
            "id": 5,
            "title": "Alien",
            "genre_ids": [27],
            "vote_average": 8.1,
            "vote_count": 15000,
            "release_date": "1979-05-25",
            "overview": "In space..."
        }))
        .unwrap();
        let patch =
            FilmPatch::from_document(json!({ "vote_average": 7.2, "tagline": "No one can hear you scream" }))
                .unwrap();

        film.apply(patch);

        assert_eq!(film.title, "Alien");
        assert_eq!(film.vote_average, 7.2);
        assert_eq!(film.release_date.as_deref(), Some("1979-05-25"));
        assert_eq!(film.extra.len(), 2);
    }

    #[test]
    fn patch_can_clear_release_date() {
        let patch = FilmPatch::from_document(json!({ "release_date": null })).unwrap();
        assert_eq!(patch.release_date, Some(None));

        let patch = FilmPatch::from_document(json!({ "title": "x" })).unwrap();
        assert_eq!(patch.release_date, None);
    }

    #[test]
    fn patch_rejects_null_for_required_fields() {
        for field in ["title", "vote_average", "vote_count", "id"] {
            let err = FilmPatch::from_document(json!({ field: null })).unwrap_err();
            match err {
                AppError::Validation(msg) => assert_eq!(msg, format!("{field} may not be null")),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn null_release_date_round_trips() {
        let doc = json!({
            "id": 1,
            "title": "x",
            "genre_ids": [],
            "vote_average": 0.0,
            "vote_count": 0,
            "release_date": null
        });
        let film = Film::from_document(doc.clone()).unwrap();
        assert_eq!(serde_json::to_value(&film).unwrap(), doc);
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(matches!(FilmPatch::from_document(json!({})), Err(AppError::Validation(_))));
    }

    #[test]
    fn zero_is_a_valid_rating_bound() {
        let filter = SearchFilter { min_rating: Some(0.0), ..Default::default() };
        assert!(filter.validate().is_ok());

        let filter =
            SearchFilter { min_rating: Some(8.0), max_rating: Some(2.0), ..Default::default() };
        assert!(matches!(filter.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn blank_title_is_not_a_filter() {
        let filter = SearchFilter { title: Some("  ".into()), ..Default::default() };
        assert_eq!(filter.title_needle(), None);

        let filter = SearchFilter { title: Some("DUNE ".into()), ..Default::default() };
        assert_eq!(filter.title_needle().as_deref(), Some("dune "));
    }
}
