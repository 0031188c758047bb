//! Video generation request and its enumerations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Shortest video a user may request, in seconds.
pub const MIN_DURATION_SECS: u32 = 30;
/// Longest video a user may request, in seconds.
pub const MAX_DURATION_SECS: u32 = 300;
/// Duration used when the request does not specify one.
pub const DEFAULT_DURATION_SECS: u32 = 120;

/// Error returned when a string does not name a known enumeration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Normalize user input for case/spacing-insensitive enum matching.
fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect()
}

/// School subject a video is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Subject {
    Physics,
    Chemistry,
    Biology,
    Mathematics,
    History,
    Geography,
    #[serde(rename = "Computer Science")]
    ComputerScience,
}

impl Subject {
    pub const ALL: &'static [Subject] = &[
        Subject::Physics,
        Subject::Chemistry,
        Subject::Biology,
        Subject::Mathematics,
        Subject::History,
        Subject::Geography,
        Subject::ComputerScience,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Biology => "Biology",
            Subject::Mathematics => "Mathematics",
            Subject::History => "History",
            Subject::Geography => "Geography",
            Subject::ComputerScience => "Computer Science",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Subject {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Subject::ALL
            .iter()
            .copied()
            .find(|subject| normalize(subject.as_str()) == key)
            .ok_or_else(|| ParseEnumError::new("subject", s))
    }
}

/// Audience level of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Level {
    Elementary,
    #[serde(rename = "Middle School")]
    MiddleSchool,
    #[serde(rename = "High School")]
    HighSchool,
    College,
    Professional,
}

impl Level {
    pub const ALL: &'static [Level] = &[
        Level::Elementary,
        Level::MiddleSchool,
        Level::HighSchool,
        Level::College,
        Level::Professional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Elementary => "Elementary",
            Level::MiddleSchool => "Middle School",
            Level::HighSchool => "High School",
            Level::College => "College",
            Level::Professional => "Professional",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        Level::ALL
            .iter()
            .copied()
            .find(|level| normalize(level.as_str()) == key)
            .ok_or_else(|| ParseEnumError::new("level", s))
    }
}

/// Output resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum VideoQuality {
    #[serde(rename = "720p")]
    Hd720,
    #[default]
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "4K")]
    Uhd4k,
}

impl VideoQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoQuality::Hd720 => "720p",
            VideoQuality::Hd1080 => "1080p",
            VideoQuality::Uhd4k => "4K",
        }
    }

    /// Frame size in pixels (width, height).
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            VideoQuality::Hd720 => (1280, 720),
            VideoQuality::Hd1080 => (1920, 1080),
            VideoQuality::Uhd4k => (3840, 2160),
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VideoQuality {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "720p" | "720" | "hd" => Ok(VideoQuality::Hd720),
            "1080p" | "1080" | "fullhd" => Ok(VideoQuality::Hd1080),
            "4k" | "2160p" | "uhd" => Ok(VideoQuality::Uhd4k),
            _ => Err(ParseEnumError::new("video quality", s)),
        }
    }
}

/// Narration / annotation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum Language {
    #[default]
    English,
    Spanish,
    French,
    German,
    Hindi,
}

impl Language {
    pub const ALL: &'static [Language] = &[
        Language::English,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Hindi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Hindi => "Hindi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize(s);
        let by_code = match key.as_str() {
            "en" => Some(Language::English),
            "es" => Some(Language::Spanish),
            "fr" => Some(Language::French),
            "de" => Some(Language::German),
            "hi" => Some(Language::Hindi),
            _ => None,
        };
        by_code
            .or_else(|| {
                Language::ALL
                    .iter()
                    .copied()
                    .find(|lang| normalize(lang.as_str()) == key)
            })
            .ok_or_else(|| ParseEnumError::new("language", s))
    }
}

/// How the video is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Full 3D render through Blender
    Blender,
    /// Image workflow stitched into a slideshow
    NanoBanana,
    /// Blender first, image workflow when rendering fails
    #[default]
    Hybrid,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::Blender => "blender",
            GenerationMethod::NanoBanana => "nano_banana",
            GenerationMethod::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for GenerationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GenerationMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "blender" | "3d" | "3dblender" => Ok(GenerationMethod::Blender),
            "nanobanana" | "visual" | "visualworkflow" => Ok(GenerationMethod::NanoBanana),
            "hybrid" => Ok(GenerationMethod::Hybrid),
            _ => Err(ParseEnumError::new("generation method", s)),
        }
    }
}

/// A validated request to generate one educational video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoRequest {
    pub topic: String,
    pub subject: Subject,
    pub level: Level,
    pub user_id: String,
    #[serde(default = "default_duration")]
    pub duration_secs: u32,
    #[serde(default)]
    pub quality: VideoQuality,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub method: GenerationMethod,
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_SECS
}

impl VideoRequest {
    pub fn new(
        topic: impl Into<String>,
        subject: Subject,
        level: Level,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            subject,
            level,
            user_id: user_id.into(),
            duration_secs: DEFAULT_DURATION_SECS,
            quality: VideoQuality::default(),
            language: Language::default(),
            method: GenerationMethod::default(),
        }
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_quality(mut self, quality: VideoQuality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_method(mut self, method: GenerationMethod) -> Self {
        self.method = method;
        self
    }

    /// Filesystem-safe form of the topic (`Water cycle!` -> `Water_cycle`).
    pub fn topic_slug(&self) -> String {
        let slug: String = self
            .topic
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let slug = slug
            .split('_')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");
        if slug.is_empty() {
            "video".to_string()
        } else {
            slug.chars().take(64).collect()
        }
    }

    /// Key used to reject a duplicate submission while the first one is in flight.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.user_id,
            self.subject.as_str(),
            self.level.as_str(),
            self.topic.trim().to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_parses_display_names_loosely() {
        assert_eq!("Physics".parse::<Subject>().unwrap(), Subject::Physics);
        assert_eq!(
            "computer science".parse::<Subject>().unwrap(),
            Subject::ComputerScience
        );
        assert_eq!(
            "computer_science".parse::<Subject>().unwrap(),
            Subject::ComputerScience
        );
        assert!("Astrology".parse::<Subject>().is_err());
    }

    #[test]
    fn test_level_serializes_with_spaces() {
        let json = serde_json::to_string(&Level::HighSchool).unwrap();
        assert_eq!(json, "\"High School\"");
        assert_eq!("high school".parse::<Level>().unwrap(), Level::HighSchool);
        assert!("Kindergarten".parse::<Level>().is_err());
    }

    #[test]
    fn test_quality_resolution() {
        assert_eq!(VideoQuality::Hd720.resolution(), (1280, 720));
        assert_eq!("4K".parse::<VideoQuality>().unwrap(), VideoQuality::Uhd4k);
        assert_eq!(
            serde_json::to_string(&VideoQuality::Hd1080).unwrap(),
            "\"1080p\""
        );
    }

    #[test]
    fn test_language_accepts_codes() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Spanish);
        assert_eq!("German".parse::<Language>().unwrap(), Language::German);
        assert!("Klingon".parse::<Language>().is_err());
    }

    #[test]
    fn test_request_defaults_when_missing() {
        let json = r#"{"topic":"Photosynthesis","subject":"Biology","level":"College","user_id":"u1"}"#;
        let req: VideoRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.duration_secs, DEFAULT_DURATION_SECS);
        assert_eq!(req.quality, VideoQuality::Hd1080);
        assert_eq!(req.method, GenerationMethod::Hybrid);
    }

    #[test]
    fn test_topic_slug_is_filesystem_safe() {
        let req = VideoRequest::new("  Water cycle / rain!  ", Subject::Geography, Level::Elementary, "u1");
        assert_eq!(req.topic_slug(), "Water_cycle_rain");

        let empty = VideoRequest::new("???", Subject::Geography, Level::Elementary, "u1");
        assert_eq!(empty.topic_slug(), "video");
    }

    #[test]
    fn test_dedup_key_ignores_topic_case() {
        let a = VideoRequest::new("DNA Replication", Subject::Biology, Level::College, "u1");
        let b = VideoRequest::new("dna replication ", Subject::Biology, Level::College, "u1");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
