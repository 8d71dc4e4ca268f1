use std::collections::HashSet;

use crate::error::{RecommenderError, Result};
use crate::models::{Id, Interaction, SerializedModel};

fn validate_id(position: usize, field: &str, id: &Id) -> Result<()> {
    if let Id::Str(raw) = id {
        if raw.is_empty() {
            return Err(RecommenderError::InvalidInteraction {
                position,
                reason: format!("{} id must not be empty", field),
            });
        }
    }
    Ok(())
}

pub fn validate_interaction(position: usize, interaction: &Interaction) -> Result<()> {
    validate_id(position, "user", &interaction.user)?;
    validate_id(position, "entity", &interaction.entity)?;
    if let Some(rating) = interaction.rating {
        if !rating.is_finite() {
            return Err(RecommenderError::InvalidInteraction {
                position,
                reason: format!("rating must be finite, got {}", rating),
            });
        }
    }
    Ok(())
}

pub fn validate_interactions(interactions: &[Interaction]) -> Result<()> {
    interactions
        .iter()
        .enumerate()
        .try_for_each(|(position, interaction)| validate_interaction(position, interaction))
}

fn validate_matrix(name: &str, rows: &[Vec<f32>], ids: &[Id], width: usize) -> Result<()> {
    if rows.len() != ids.len() {
        return Err(RecommenderError::Corrupt(format!(
            "{} has {} rows but {} registered ids",
            name,
            rows.len(),
            ids.len()
        )));
    }
    if let Some((slot, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
        return Err(RecommenderError::Corrupt(format!(
            "{} row {} has {} values, expected {}",
            name,
            slot,
            row.len(),
            width
        )));
    }
    Ok(())
}

fn validate_unique(name: &str, ids: &[Id]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id) {
            return Err(RecommenderError::Corrupt(format!("{} lists {} twice", name, id)));
        }
    }
    Ok(())
}

/// Checks that a document can be loaded without breaking slot/row alignment.
///
/// Forward/reverse map agreement is left to the identity index on import.
pub fn validate_serialized_model(document: &SerializedModel) -> Result<()> {
    document
        .config
        .validate()
        .map_err(|e| RecommenderError::Corrupt(format!("config: {}", e)))?;

    if !document.initialized
        && (!document.user_embeddings.is_empty() || !document.entity_embeddings.is_empty())
    {
        return Err(RecommenderError::Corrupt(
            "document is marked uninitialized but carries embedding rows".to_string(),
        ));
    }

    let width = document.config.embedding_size;
    validate_unique("reverseUserMap", &document.reverse_user_map)?;
    validate_unique("reverseEntityMap", &document.reverse_entity_map)?;
    validate_matrix("userEmbeddings", &document.user_embeddings, &document.reverse_user_map, width)?;
    validate_matrix(
        "entityEmbeddings",
        &document.entity_embeddings,
        &document.reverse_entity_map,
        width,
    )?;
    Ok(())
}
