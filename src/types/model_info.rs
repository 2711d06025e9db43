use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A model available to the configured credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Unique model identifier, e.g. `gpt-4`.
    pub id: String,

    /// Owning organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,

    /// When the model was created.
    #[serde(
        default,
        with = "time::serde::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<OffsetDateTime>,
}

/// Response body of `GET /models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    /// The models.
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}
