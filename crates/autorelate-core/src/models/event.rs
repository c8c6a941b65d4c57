use serde::{Deserialize, Serialize};

use crate::models::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Add,
    Modify,
    Delete,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Item,
    Collection,
    Other,
}

/// Change notification emitted by the library store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEvent {
    pub action: EventAction,
    pub kind: EventKind,
    pub ids: Vec<DocumentId>,
}

impl ItemEvent {
    pub fn items_added(ids: impl IntoIterator<Item = impl Into<DocumentId>>) -> Self {
        Self {
            action: EventAction::Add,
            kind: EventKind::Item,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Only newly added items are queued for relation discovery.
    pub fn is_item_add(&self) -> bool {
        self.action == EventAction::Add && self.kind == EventKind::Item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_added_is_item_add() {
        let event = ItemEvent::items_added([1u64, 2]);
        assert!(event.is_item_add());
        assert_eq!(event.ids, vec![DocumentId(1), DocumentId(2)]);
    }

    #[test]
    fn test_other_events_are_filtered() {
        let modify = ItemEvent {
            action: EventAction::Modify,
            kind: EventKind::Item,
            ids: vec![DocumentId(1)],
        };
        let collection = ItemEvent {
            action: EventAction::Add,
            kind: EventKind::Collection,
            ids: vec![DocumentId(1)],
        };
        assert!(!modify.is_item_add());
        assert!(!collection.is_item_add());
    }
}
