use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Extension of the clip objects the pipeline works on.
pub const VIDEO_EXTENSION: &str = ".mp4";

/// Object name the concatenated video is stored under, inside the clip prefix.
pub const OUTPUT_OBJECT_NAME: &str = "concatenated_output.mp4";

pub const DEFAULT_LOCAL_DIR: &str = "clips";
pub const DEFAULT_OUTPUT_PATH: &str = "concatenated_output.mp4";

pub const MISSING_FIELDS_MESSAGE: &str = "id, match_id, type, and entity_type are required.";
pub const INVALID_ENTITY_MESSAGE: &str = "Invalid entity_type. Must be 'player' or 'team'.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Player,
    Team,
}

impl EntityType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "player" => Some(EntityType::Player),
            "team" => Some(EntityType::Team),
            _ => None,
        }
    }

    /// Path segment used in the storage layout.
    pub fn segment(&self) -> &'static str {
        match self {
            EntityType::Player => "players",
            EntityType::Team => "teams",
        }
    }
}

/// Body of `POST /concatenate`.
///
/// Every field is optional at the serde level so that missing values can be
/// reported with the same message as empty ones.
#[derive(Debug, Default, Deserialize)]
pub struct ConcatenateRequest {
    pub id: Option<String>,
    pub match_id: Option<String>,
    #[serde(rename = "type")]
    pub clip_type: Option<String>,
    pub entity_type: Option<String>,
    pub local_dir: Option<String>,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("{}", MISSING_FIELDS_MESSAGE)]
    MissingFields,

    #[error("{}", INVALID_ENTITY_MESSAGE)]
    InvalidEntityType,
}

/// The storage folder holding every clip of one entity, match and clip type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFolder {
    pub entity_type: EntityType,
    pub id: String,
    pub match_id: String,
    pub clip_type: String,
}

impl ClipFolder {
    /// `highlights/{players|teams}/{id}/{match_id}/{clip_type}/`
    pub fn prefix(&self) -> String {
        format!(
            "highlights/{}/{}/{}/{}/",
            self.entity_type.segment(),
            self.id,
            self.match_id,
            self.clip_type
        )
    }

    pub fn output_key(&self) -> String {
        format!("{}{}", self.prefix(), OUTPUT_OBJECT_NAME)
    }
}

/// A validated request, ready for the pipeline.
#[derive(Debug, Clone)]
pub struct ConcatJob {
    pub folder: ClipFolder,
    pub local_dir: PathBuf,
    pub output_path: PathBuf,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ConcatenateRequest {
    pub fn into_job(self) -> Result<ConcatJob, RequestError> {
        let (id, match_id, clip_type, entity_type) = match (
            required(self.id),
            required(self.match_id),
            required(self.clip_type),
            required(self.entity_type),
        ) {
            (Some(id), Some(match_id), Some(clip_type), Some(entity_type)) => {
                (id, match_id, clip_type, entity_type)
            }
            _ => return Err(RequestError::MissingFields),
        };

        let entity_type =
            EntityType::parse(&entity_type).ok_or(RequestError::InvalidEntityType)?;

        Ok(ConcatJob {
            folder: ClipFolder {
                entity_type,
                id,
                match_id,
                clip_type,
            },
            local_dir: PathBuf::from(
                self.local_dir.unwrap_or_else(|| DEFAULT_LOCAL_DIR.to_string()),
            ),
            output_path: PathBuf::from(
                self.output_path
                    .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string()),
            ),
        })
    }
}
