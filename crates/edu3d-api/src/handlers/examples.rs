//! Built-in example catalog.

use axum::extract::Path;
use axum::Json;

use edu3d_models::{catalog, ExampleTopic, Subject, SubjectTopics};

use crate::error::{ApiError, ApiResult};

fn parse_subject(raw: &str) -> ApiResult<Subject> {
    raw.parse().map_err(|e: edu3d_models::ParseEnumError| ApiError::validation(e.to_string()))
}

/// Example keys grouped by subject.
pub async fn list_examples() -> Json<Vec<SubjectTopics>> {
    Json(catalog::list_all_topics())
}

pub async fn list_subject_examples(
    Path(subject): Path<String>,
) -> ApiResult<Json<Vec<ExampleTopic>>> {
    let subject = parse_subject(&subject)?;
    let examples = catalog::examples_for_subject(subject)
        .into_iter()
        .copied()
        .collect();
    Ok(Json(examples))
}

pub async fn get_example(
    Path((subject, key)): Path<(String, String)>,
) -> ApiResult<Json<ExampleTopic>> {
    let subject = parse_subject(&subject)?;
    catalog::example(subject, &key)
        .copied()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("No example '{key}' for {subject}")))
}
