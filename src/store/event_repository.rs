use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::Event;

/// Entity persistence seam. The real mapping lives with an external
/// collaborator; the processor only needs id assignment on save and
/// existence checks for UPDATE validation.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Persist an event, assigning an id when it has none. Returns the
    /// stored event including its id.
    async fn save(&self, event: Event) -> Result<Event>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Event>>;
}

/// No deduplication: saving the same NEW payload twice creates two entities.
pub struct InMemoryEventRepository {
    inner: Mutex<Inner>,
}

struct Inner {
    events: HashMap<i32, Event>,
    next_id: i32,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: HashMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn save(&self, mut event: Event) -> Result<Event> {
        let mut inner = self.inner.lock().unwrap();
        let id = match event.id {
            Some(id) => id,
            None => {
                let id = inner.next_id;
                inner.next_id += 1;
                event.id = Some(id);
                id
            }
        };
        inner.events.insert(id, event.clone());
        Ok(event)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Event>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.events.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, EventType};

    fn new_event() -> Event {
        Event {
            id: None,
            event_type: EventType::New,
            book: Book {
                id: 5,
                name: "Dune".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn save_assigns_distinct_ids() {
        let repo = InMemoryEventRepository::new();
        let first = repo.save(new_event()).await.unwrap();
        let second = repo.save(new_event()).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(repo.find_by_id(first.id.unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_with_id_overwrites_in_place() {
        let repo = InMemoryEventRepository::new();
        let stored = repo.save(new_event()).await.unwrap();

        let mut updated = stored.clone();
        updated.book.name = "Dune Messiah".to_string();
        repo.save(updated).await.unwrap();

        let found = repo.find_by_id(stored.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(found.book.name, "Dune Messiah");
    }
}
