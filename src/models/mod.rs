use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ModelConfig;

/// Format tag written into every exported document.
pub const MODEL_FORMAT_VERSION: &str = "1.0.0";

/// Rating assumed for interactions that carry no explicit value.
pub const IMPLICIT_RATING: f32 = 1.0;

/// Opaque user or entity identifier.
///
/// Integer and string ids never collide: `Id::Int(1)` and `Id::Str("1")` are
/// distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl Id {
    /// Parses command-line input, preferring the integer form.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(Id::Int)
            .unwrap_or_else(|_| Id::Str(raw.to_string()))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(value) => write!(f, "{}", value),
            Id::Str(value) => f.write_str(value),
        }
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::Str(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::Str(value)
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Int(value)
    }
}

impl From<i32> for Id {
    fn from(value: i32) -> Self {
        Id::Int(value as i64)
    }
}

/// Which slot space an identifier lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    User,
    Entity,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::User => Side::Entity,
            Side::Entity => Side::User,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::User => f.write_str("user"),
            Side::Entity => f.write_str("entity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user: Id,
    pub entity: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

impl Interaction {
    pub fn new(user: impl Into<Id>, entity: impl Into<Id>) -> Self {
        Self {
            user: user.into(),
            entity: entity.into(),
            rating: None,
        }
    }

    pub fn rated(user: impl Into<Id>, entity: impl Into<Id>, rating: f32) -> Self {
        Self {
            user: user.into(),
            entity: entity.into(),
            rating: Some(rating),
        }
    }

    /// Training target, defaulting to the implicit positive signal.
    pub fn target(&self) -> f32 {
        self.rating.unwrap_or(IMPLICIT_RATING)
    }
}

/// Forward and reverse mappings of an identity index, for both sides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub user_map: Vec<(Id, usize)>,
    pub entity_map: Vec<(Id, usize)>,
    pub reverse_user_map: Vec<Id>,
    pub reverse_entity_map: Vec<Id>,
}

/// Self-describing snapshot of a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedModel {
    pub version: String,
    pub config: ModelConfig,
    pub user_embeddings: Vec<Vec<f32>>,
    pub entity_embeddings: Vec<Vec<f32>>,
    pub user_map: Vec<(Id, usize)>,
    pub entity_map: Vec<(Id, usize)>,
    pub reverse_user_map: Vec<Id>,
    pub reverse_entity_map: Vec<Id>,
    pub initialized: bool,
}

impl SerializedModel {
    pub fn index_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            user_map: self.user_map.clone(),
            entity_map: self.entity_map.clone(),
            reverse_user_map: self.reverse_user_map.clone(),
            reverse_entity_map: self.reverse_entity_map.clone(),
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::RecommenderError::Corrupt(format!("failed to encode model: {}", e)))
    }

    pub fn from_json(raw: &str) -> crate::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| crate::RecommenderError::Corrupt(format!("failed to parse model: {}", e)))
    }
}

/// Summary of one `fit` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub interactions: usize,
    pub new_users: usize,
    pub new_entities: usize,
    pub epochs: usize,
    pub skipped: usize,
    pub epoch_losses: Vec<f64>,
}

impl FitReport {
    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_untagged_json() {
        let ids: Vec<Id> = serde_json::from_str(r#"["u1", 7, "7"]"#).unwrap();
        assert_eq!(ids, vec![Id::from("u1"), Id::Int(7), Id::from("7")]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#"["u1",7,"7"]"#);
    }

    #[test]
    fn test_interaction_defaults_to_implicit_rating() {
        let interaction: Interaction =
            serde_json::from_str(r#"{"user": "u1", "entity": 3}"#).unwrap();
        assert_eq!(interaction.rating, None);
        assert_eq!(interaction.target(), IMPLICIT_RATING);
        assert_eq!(Interaction::rated("u1", "e1", 4.5).target(), 4.5);
    }

    #[test]
    fn test_document_uses_camel_case_fields() {
        let document = SerializedModel {
            version: MODEL_FORMAT_VERSION.to_string(),
            config: ModelConfig::default(),
            user_embeddings: vec![vec![0.5]],
            entity_embeddings: vec![],
            user_map: vec![(Id::from("u1"), 0)],
            entity_map: vec![],
            reverse_user_map: vec![Id::from("u1")],
            reverse_entity_map: vec![],
            initialized: true,
        };
        let value: serde_json::Value = serde_json::from_str(&document.to_json().unwrap()).unwrap();
        assert_eq!(value["userMap"], serde_json::json!([["u1", 0]]));
        assert_eq!(value["reverseUserMap"], serde_json::json!(["u1"]));
        assert!(value["config"]["embeddingSize"].is_number());
        assert_eq!(value["initialized"], serde_json::json!(true));
    }

    #[test]
    fn test_from_json_reports_corrupt() {
        let err = SerializedModel::from_json("{not json").unwrap_err();
        assert!(matches!(err, crate::RecommenderError::Corrupt(_)));
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(Id::parse_lenient("42"), Id::Int(42));
        assert_eq!(Id::parse_lenient("u42"), Id::from("u42"));
    }
}
