use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{normalize_ids, Store, StoreError};
use crate::recipes::repo_types::{
    Attribute, AttributeKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter,
};
use crate::users::repo_types::{NewUser, User, UserChanges};

/// Process-local store. Used when no `DATABASE_URL` is configured and by the test suite.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

// Vectors keep insertion order, which stands in for `created_at` ordering.
#[derive(Default)]
struct Tables {
    users: Vec<User>,
    tags: Vec<Attribute>,
    ingredients: Vec<Attribute>,
    recipes: Vec<Recipe>,
}

impl Tables {
    fn attributes(&self, kind: AttributeKind) -> &Vec<Attribute> {
        match kind {
            AttributeKind::Tag => &self.tags,
            AttributeKind::Ingredient => &self.ingredients,
        }
    }

    fn attributes_mut(&mut self, kind: AttributeKind) -> &mut Vec<Attribute> {
        match kind {
            AttributeKind::Tag => &mut self.tags,
            AttributeKind::Ingredient => &mut self.ingredients,
        }
    }

    fn recipe_mut(&mut self, owner: Uuid, id: Uuid) -> Option<&mut Recipe> {
        self.recipes
            .iter_mut()
            .find(|r| r.id == id && r.user_id == owner)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let row = User {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            is_active: true,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        if let Some(email) = &changes.email {
            if t.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::DuplicateEmail);
            }
        }
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        Ok(Some(user.clone()))
    }

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        assigned_only: bool,
    ) -> Result<Vec<Attribute>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Attribute> = t
            .attributes(kind)
            .iter()
            .filter(|a| a.user_id == owner)
            .filter(|a| {
                !assigned_only
                    || t.recipes
                        .iter()
                        .any(|r| r.user_id == owner && r.links(kind).contains(&a.id))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(rows)
    }

    async fn find_attributes(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Attribute>, StoreError> {
        let t = self.tables.read().await;
        let mut rows: Vec<Attribute> = t
            .attributes(kind)
            .iter()
            .filter(|a| a.user_id == owner && ids.contains(&a.id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        name: &str,
    ) -> Result<Attribute, StoreError> {
        let mut t = self.tables.write().await;
        let row = Attribute {
            id: Uuid::new_v4(),
            user_id: owner,
            name: name.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.attributes_mut(kind).push(row.clone());
        Ok(row)
    }

    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, StoreError> {
        let mut t = self.tables.write().await;
        let row = t
            .attributes_mut(kind)
            .iter_mut()
            .find(|a| a.id == id && a.user_id == owner)
            .map(|a| {
                a.name = name.to_string();
                a.clone()
            });
        Ok(row)
    }

    async fn delete_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let rows = t.attributes_mut(kind);
        let before = rows.len();
        rows.retain(|a| !(a.id == id && a.user_id == owner));
        if rows.len() == before {
            return Ok(false);
        }
        for recipe in t.recipes.iter_mut() {
            match kind {
                AttributeKind::Tag => recipe.tags.retain(|x| *x != id),
                AttributeKind::Ingredient => recipe.ingredients.retain(|x| *x != id),
            }
        }
        Ok(true)
    }

    async fn list_recipes(
        &self,
        owner: Uuid,
        filter: &RecipeFilter,
    ) -> Result<Vec<Recipe>, StoreError> {
        fn matches(wanted: &[Uuid], have: &[Uuid]) -> bool {
            wanted.is_empty() || wanted.iter().any(|id| have.contains(id))
        }

        let t = self.tables.read().await;
        Ok(t.recipes
            .iter()
            .rev()
            .filter(|r| r.user_id == owner)
            .filter(|r| matches(&filter.tags, &r.tags))
            .filter(|r| matches(&filter.ingredients, &r.ingredients))
            .cloned()
            .collect())
    }

    async fn find_recipe(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.recipes
            .iter()
            .find(|r| r.id == id && r.user_id == owner)
            .cloned())
    }

    async fn insert_recipe(&self, owner: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError> {
        let mut t = self.tables.write().await;
        let row = Recipe {
            id: Uuid::new_v4(),
            user_id: owner,
            title: recipe.title,
            time_minutes: recipe.time_minutes,
            price: recipe.price,
            tags: normalize_ids(&recipe.tags),
            ingredients: normalize_ids(&recipe.ingredients),
            image: None,
            created_at: OffsetDateTime::now_utc(),
        };
        t.recipes.push(row.clone());
        Ok(row)
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(recipe) = t.recipe_mut(owner, id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            recipe.title = title;
        }
        if let Some(minutes) = changes.time_minutes {
            recipe.time_minutes = minutes;
        }
        if let Some(price) = changes.price {
            recipe.price = price;
        }
        if let Some(tags) = changes.tags {
            recipe.tags = normalize_ids(&tags);
        }
        if let Some(ingredients) = changes.ingredients {
            recipe.ingredients = normalize_ids(&ingredients);
        }
        Ok(Some(recipe.clone()))
    }

    async fn delete_recipe(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let mut t = self.tables.write().await;
        let pos = t
            .recipes
            .iter()
            .position(|r| r.id == id && r.user_id == owner);
        Ok(pos.map(|i| t.recipes.remove(i)))
    }

    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: Uuid,
        image: Option<&str>,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut t = self.tables.write().await;
        Ok(t.recipe_mut(owner, id).map(|r| {
            r.image = image.map(str::to_string);
            r.clone()
        }))
    }
}
