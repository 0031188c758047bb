//! Input validation and sanitization for video submissions.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use validator::{Validate, ValidationError, ValidationErrors};

use edu3d_models::{
    GenerationMethod, Language, Level, Subject, VideoQuality, VideoRequest,
    DEFAULT_DURATION_SECS,
};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Maximum topic length, in characters.
pub const MAX_TOPIC_CHARS: usize = 500;

/// Maximum user id length.
pub const MAX_USER_ID_CHARS: usize = 128;

/// Characters removed from topics before they reach prompts and file names.
static UNSAFE_TOPIC_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>"';&\p{Cc}]"#).unwrap());

static USER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.@-]+$").unwrap());

/// Body of `POST /api/videos`.
///
/// Enumerations arrive as strings so that unknown values surface as a 400
/// with a readable message instead of a deserialization rejection.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVideoRequest {
    /// Trimmed on arrival; everything downstream sees the trimmed id
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(
        length(min = 1, max = 128, message = "user_id must be 1-128 characters"),
        custom(function = "user_id_chars")
    )]
    pub user_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub level: String,
    /// Seconds
    #[validate(range(min = 30, max = 300, message = "duration must be between 30 and 300 seconds"))]
    pub duration: Option<u32>,
    pub quality: Option<String>,
    pub language: Option<String>,
    pub method: Option<String>,
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

fn user_id_chars(user_id: &str) -> Result<(), ValidationError> {
    if USER_ID_PATTERN.is_match(user_id) {
        Ok(())
    } else {
        Err(ValidationError::new("user_id_chars").with_message(Cow::Borrowed(
            "user_id may only contain letters, digits, '_', '.', '@' and '-'",
        )))
    }
}

impl CreateVideoRequest {
    /// Check the user id alone. Runs before rate limiting so the limiter is
    /// never keyed by garbage.
    pub fn checked_user_id(&self) -> ApiResult<&str> {
        validate_user_id(&self.user_id)?;
        Ok(&self.user_id)
    }

    /// Validate every field and build the queue payload.
    pub fn into_video_request(self, config: &ApiConfig) -> ApiResult<VideoRequest> {
        self.validate().map_err(|e| ApiError::validation(describe(&e)))?;

        let topic = validate_topic(&self.topic)?;
        let subject: Subject = parse_required("subject", &self.subject)?;
        let level: Level = parse_required("level", &self.level)?;
        let quality = parse_optional(self.quality.as_deref())?.unwrap_or(config.default_quality);
        let language: Language =
            parse_optional(self.language.as_deref())?.unwrap_or(config.default_language);
        let method: GenerationMethod = parse_optional(self.method.as_deref())?.unwrap_or_default();

        Ok(VideoRequest::new(topic, subject, level, self.user_id)
            .with_duration(self.duration.unwrap_or(DEFAULT_DURATION_SECS))
            .with_quality(quality)
            .with_language(language)
            .with_method(method))
    }
}

fn parse_required<T>(field: &str, raw: &str) -> ApiResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if raw.trim().is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    raw.parse().map_err(|e: T::Err| ApiError::validation(e.to_string()))
}

fn parse_optional<T>(raw: Option<&str>) -> ApiResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ApiError::validation(e.to_string())),
    }
}

/// Flatten validator errors into one stable message.
fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

/// Remove `< > " ' ; &` and control characters.
pub fn sanitize_topic(topic: &str) -> String {
    UNSAFE_TOPIC_CHARS.replace_all(topic, "").into_owned()
}

/// Validate and sanitize a topic, returning the cleaned text.
pub fn validate_topic(topic: &str) -> ApiResult<String> {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("topic must not be empty"));
    }
    if trimmed.chars().count() > MAX_TOPIC_CHARS {
        return Err(ApiError::validation(format!(
            "topic must be at most {MAX_TOPIC_CHARS} characters"
        )));
    }

    let cleaned = sanitize_topic(trimmed).trim().to_string();
    if cleaned.is_empty() {
        return Err(ApiError::validation("topic must not be empty"));
    }
    Ok(cleaned)
}

pub fn validate_user_id(user_id: &str) -> ApiResult<()> {
    if user_id.is_empty() {
        return Err(ApiError::validation("user_id is required"));
    }
    if user_id.chars().count() > MAX_USER_ID_CHARS {
        return Err(ApiError::validation(format!(
            "user_id must be at most {MAX_USER_ID_CHARS} characters"
        )));
    }
    user_id_chars(user_id).map_err(|e| {
        ApiError::validation(
            e.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "user_id is invalid".to_string()),
        )
    })
}

/// Validate job ID format (UUID-like, prevents path traversal).
pub fn is_valid_job_id(id: &str) -> bool {
    if id.len() < 8 || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateVideoRequest {
        CreateVideoRequest {
            user_id: "student_1".into(),
            topic: "Photosynthesis".into(),
            subject: "Biology".into(),
            level: "High School".into(),
            duration: None,
            quality: None,
            language: None,
            method: None,
        }
    }

    #[test]
    fn test_sanitize_topic_strips_unsafe_chars() {
        assert_eq!(
            sanitize_topic("<b>Acids & \"bases\"</b>; 'pH'"),
            "bAcids  bases/b pH"
        );
        assert_eq!(sanitize_topic("line\nbreak\ttab\u{7}"), "linebreaktab");
        assert_eq!(sanitize_topic("Ohm's law: V = I·R"), "Ohms law: V = I·R");
    }

    #[test]
    fn test_validate_topic() {
        assert_eq!(validate_topic("  Newton's laws  ").unwrap(), "Newtons laws");
        assert!(validate_topic("").is_err());
        assert!(validate_topic("   ").is_err());
        assert!(validate_topic("<>;&").is_err());

        let max = "a".repeat(MAX_TOPIC_CHARS);
        assert!(validate_topic(&max).is_ok());
        let too_long = "a".repeat(MAX_TOPIC_CHARS + 1);
        assert!(validate_topic(&too_long).is_err());
        // Limit counts characters, not bytes.
        let unicode = "é".repeat(MAX_TOPIC_CHARS);
        assert!(validate_topic(&unicode).is_ok());
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("alice@example.com").is_ok());
        assert!(validate_user_id("user-1_a.b").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("bad user").is_err());
        assert!(validate_user_id("a/b").is_err());
        assert!(validate_user_id(&"u".repeat(MAX_USER_ID_CHARS + 1)).is_err());
    }

    #[test]
    fn test_user_id_trimmed_once_on_arrival() {
        let payload: CreateVideoRequest = serde_json::from_value(serde_json::json!({
            "user_id": "  alice ",
            "topic": "Cells",
            "subject": "Biology",
            "level": "College"
        }))
        .unwrap();

        // The id the limiter sees is the id that gets validated and queued.
        assert_eq!(payload.checked_user_id().unwrap(), "alice");
        let req = payload.into_video_request(&ApiConfig::default()).unwrap();
        assert_eq!(req.user_id, "alice");
    }

    #[test]
    fn test_into_video_request_defaults() {
        let config = ApiConfig::default();
        let req = request().into_video_request(&config).unwrap();
        assert_eq!(req.subject, Subject::Biology);
        assert_eq!(req.level, Level::HighSchool);
        assert_eq!(req.duration_secs, DEFAULT_DURATION_SECS);
        assert_eq!(req.quality, VideoQuality::Hd1080);
        assert_eq!(req.language, Language::English);
        assert_eq!(req.method, GenerationMethod::Hybrid);
    }

    #[test]
    fn test_into_video_request_uses_configured_defaults() {
        let config = ApiConfig {
            default_quality: VideoQuality::Hd720,
            default_language: Language::Spanish,
            ..Default::default()
        };
        let req = request().into_video_request(&config).unwrap();
        assert_eq!(req.quality, VideoQuality::Hd720);
        assert_eq!(req.language, Language::Spanish);
    }

    #[test]
    fn test_rejects_unknown_enumerations() {
        let config = ApiConfig::default();

        let mut bad_subject = request();
        bad_subject.subject = "Astrology".into();
        let err = bad_subject.into_video_request(&config).unwrap_err();
        assert!(err.to_string().contains("subject"));

        let mut bad_level = request();
        bad_level.level = "Kindergarten".into();
        assert!(bad_level.into_video_request(&config).is_err());

        let mut missing_level = request();
        missing_level.level = String::new();
        assert!(missing_level.into_video_request(&config).is_err());

        let mut bad_method = request();
        bad_method.method = Some("watercolor".into());
        assert!(bad_method.into_video_request(&config).is_err());
    }

    #[test]
    fn test_duration_bounds() {
        let config = ApiConfig::default();
        for (duration, ok) in [(29, false), (30, true), (300, true), (301, false)] {
            let mut req = request();
            req.duration = Some(duration);
            assert_eq!(req.into_video_request(&config).is_ok(), ok, "duration {duration}");
        }
    }

    #[test]
    fn test_is_valid_job_id() {
        assert!(is_valid_job_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("../../etc/passwd"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }
}
