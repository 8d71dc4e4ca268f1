use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{RecommenderError, Result};
use crate::models::{Id, IndexSnapshot, Side};

/// Bidirectional mapping between external ids and dense slots.
///
/// Slots are assigned on first sight, grow monotonically, and are never reused.
#[async_trait]
pub trait IdentityIndex: Send + Sync {
    async fn get_index(&self, side: Side, id: &Id) -> Option<usize>;

    /// Returns the existing slot or assigns the next free one.
    async fn get_or_create_index(&mut self, side: Side, id: &Id) -> usize;

    /// All ids of one side, position = slot.
    async fn all_ids(&self, side: Side) -> Vec<Id>;

    async fn len(&self, side: Side) -> usize;

    async fn export_snapshot(&self) -> IndexSnapshot;

    /// Replaces the current contents with `snapshot`.
    async fn import_snapshot(&mut self, snapshot: IndexSnapshot) -> Result<()>;

    async fn all_users(&self) -> Vec<Id> {
        self.all_ids(Side::User).await
    }

    async fn all_entities(&self) -> Vec<Id> {
        self.all_ids(Side::Entity).await
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct SlotMap {
    forward: HashMap<Id, usize>,
    reverse: Vec<Id>,
}

impl SlotMap {
    fn get(&self, id: &Id) -> Option<usize> {
        self.forward.get(id).copied()
    }

    fn get_or_insert(&mut self, id: &Id) -> usize {
        if let Some(slot) = self.forward.get(id) {
            return *slot;
        }
        let slot = self.reverse.len();
        self.forward.insert(id.clone(), slot);
        self.reverse.push(id.clone());
        slot
    }

    fn forward_pairs(&self) -> Vec<(Id, usize)> {
        self.reverse
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.clone(), slot))
            .collect()
    }

    /// Rebuilds from a snapshot, insisting the two halves describe the same
    /// gap-free assignment.
    fn restore(side: Side, forward: Vec<(Id, usize)>, reverse: Vec<Id>) -> Result<Self> {
        if forward.len() != reverse.len() {
            return Err(RecommenderError::Corrupt(format!(
                "{} map has {} entries but reverse map has {}",
                side,
                forward.len(),
                reverse.len()
            )));
        }

        let mut restored = SlotMap {
            forward: HashMap::with_capacity(forward.len()),
            reverse,
        };
        for (id, slot) in forward {
            if restored.reverse.get(slot) != Some(&id) {
                return Err(RecommenderError::Corrupt(format!(
                    "{} map sends {} to slot {} which the reverse map does not agree with",
                    side, id, slot
                )));
            }
            if restored.forward.insert(id.clone(), slot).is_some() {
                return Err(RecommenderError::Corrupt(format!("duplicate {} id {}", side, id)));
            }
        }
        Ok(restored)
    }
}

/// Default process-local index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryIdentityIndex {
    users: SlotMap,
    entities: SlotMap,
}

impl InMemoryIdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, side: Side) -> &SlotMap {
        match side {
            Side::User => &self.users,
            Side::Entity => &self.entities,
        }
    }

    fn map_mut(&mut self, side: Side) -> &mut SlotMap {
        match side {
            Side::User => &mut self.users,
            Side::Entity => &mut self.entities,
        }
    }
}

#[async_trait]
impl IdentityIndex for InMemoryIdentityIndex {
    async fn get_index(&self, side: Side, id: &Id) -> Option<usize> {
        self.map(side).get(id)
    }

    async fn get_or_create_index(&mut self, side: Side, id: &Id) -> usize {
        self.map_mut(side).get_or_insert(id)
    }

    async fn all_ids(&self, side: Side) -> Vec<Id> {
        self.map(side).reverse.clone()
    }

    async fn len(&self, side: Side) -> usize {
        self.map(side).reverse.len()
    }

    async fn export_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            user_map: self.users.forward_pairs(),
            entity_map: self.entities.forward_pairs(),
            reverse_user_map: self.users.reverse.clone(),
            reverse_entity_map: self.entities.reverse.clone(),
        }
    }

    async fn import_snapshot(&mut self, snapshot: IndexSnapshot) -> Result<()> {
        let users = SlotMap::restore(Side::User, snapshot.user_map, snapshot.reverse_user_map)?;
        let entities = SlotMap::restore(Side::Entity, snapshot.entity_map, snapshot.reverse_entity_map)?;
        self.users = users;
        self.entities = entities;
        Ok(())
    }
}
