//! Persistence seam. Every recipe-side call takes the owner id; rows of other users are
//! invisible rather than forbidden.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::recipes::repo_types::{
    Attribute, AttributeKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter,
};
use crate::users::repo_types::{NewUser, User, UserChanges};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update_user(&self, id: Uuid, changes: UserChanges)
        -> Result<Option<User>, StoreError>;

    /// Ordered by name descending. `assigned_only` keeps rows linked to at least one of
    /// the owner's recipes, each once.
    async fn list_attributes(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        assigned_only: bool,
    ) -> Result<Vec<Attribute>, StoreError>;
    /// Owned rows among `ids`, ordered by name ascending. Unknown ids are skipped.
    async fn find_attributes(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Attribute>, StoreError>;
    async fn insert_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        name: &str,
    ) -> Result<Attribute, StoreError>;
    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, StoreError>;
    /// Also unlinks the row from every recipe.
    async fn delete_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        id: Uuid,
    ) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list_recipes(
        &self,
        owner: Uuid,
        filter: &RecipeFilter,
    ) -> Result<Vec<Recipe>, StoreError>;
    async fn find_recipe(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError>;
    /// Link ids must already be validated as owned.
    async fn insert_recipe(&self, owner: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError>;
    async fn update_recipe(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StoreError>;
    /// Returns the removed recipe so its image can be cleaned up.
    async fn delete_recipe(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError>;
    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: Uuid,
        image: Option<&str>,
    ) -> Result<Option<Recipe>, StoreError>;
}

/// Sorted and deduplicated copy of `ids`.
pub(crate) fn normalize_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out = ids.to_vec();
    out.sort();
    out.dedup();
    out
}
