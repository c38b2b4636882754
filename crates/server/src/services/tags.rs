//! Shared session labels.

use serde::Deserialize;
use tracing::{info, instrument};

use knowledge_share_core::{Identity, Tag};

use super::Bounded;
use crate::db::Store;
use crate::error::AppError;

/// A tag as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

pub struct TagService<'a, S> {
    store: Bounded<'a, S>,
}

impl<'a, S: Store> TagService<'a, S> {
    #[must_use]
    pub const fn new(store: Bounded<'a, S>) -> Self {
        Self { store }
    }

    /// All tags, ordered by name.
    ///
    /// # Errors
    ///
    /// Store errors only.
    pub async fn list(&self) -> Result<Vec<Tag>, AppError> {
        self.store.call(self.store.store().list_tags()).await
    }

    /// Create a tag. Names need not be unique.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank name or a color that is not `#RRGGBB`.
    #[instrument(skip(self, identity, tag), fields(actor = %identity.id))]
    pub async fn create(&self, identity: &Identity, tag: NewTag) -> Result<Tag, AppError> {
        let name = tag.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("tag name cannot be empty".to_owned()));
        }
        let color = match tag.color.as_deref().map(str::trim) {
            None | Some("") => Tag::DEFAULT_COLOR.to_owned(),
            Some(color) if is_hex_color(color) => color.to_owned(),
            Some(color) => {
                return Err(AppError::Validation(format!(
                    "invalid color {color:?}, expected #RRGGBB"
                )));
            }
        };

        let tag = self
            .store
            .call(self.store.store().create_tag(name, &color))
            .await?;
        info!(tag_id = %tag.id, name = %tag.name, "Tag created");
        Ok(tag)
    }
}

fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use knowledge_share_core::Role;

    use super::*;
    use crate::db::MemoryStore;
    use crate::services::testing::{TIMEOUT, member};

    #[test]
    fn test_hex_color() {
        assert!(is_hex_color("#27A4F6"));
        assert!(is_hex_color("#ffffff"));
        assert!(!is_hex_color("27A4F6"));
        assert!(!is_hex_color("#27A4F"));
        assert!(!is_hex_color("#GGGGGG"));
    }

    #[tokio::test]
    async fn test_create_defaults_color_and_allows_duplicates() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let service = TagService::new(Bounded::new(&store, TIMEOUT));

        let first = service
            .create(
                &bob,
                NewTag {
                    name: " Rust ".to_owned(),
                    color: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first.name, "Rust");
        assert_eq!(first.color, Tag::DEFAULT_COLOR);

        service
            .create(
                &bob,
                NewTag {
                    name: "Rust".to_owned(),
                    color: Some("#000000".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(service.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_name_is_rejected() {
        let store = MemoryStore::new();
        let bob = member(&store, "Bob", Role::Basic).await;
        let service = TagService::new(Bounded::new(&store, TIMEOUT));

        let result = service
            .create(
                &bob,
                NewTag {
                    name: "  ".to_owned(),
                    color: None,
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
