use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{normalize_ids, Store, StoreError};
use crate::recipes::repo_types::{
    Attribute, AttributeKind, NewRecipe, Recipe, RecipeChanges, RecipeFilter,
};
use crate::users::repo_types::{NewUser, User, UserChanges};

const USER_COLUMNS: &str =
    "id, email, name, password_hash, is_active, is_staff, is_superuser, created_at";
const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, image, created_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct RecipeRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    time_minutes: i32,
    price: Decimal,
    image: Option<String>,
    created_at: OffsetDateTime,
}

impl RecipeRow {
    fn into_recipe(self, tags: Vec<Uuid>, ingredients: Vec<Uuid>) -> Recipe {
        Recipe {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            time_minutes: self.time_minutes,
            price: self.price,
            tags,
            ingredients,
            image: self.image,
            created_at: self.created_at,
        }
    }
}

fn map_unique(e: sqlx::Error) -> StoreError {
    let duplicate = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
    if duplicate {
        StoreError::DuplicateEmail
    } else {
        StoreError::Database(e)
    }
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        Ok(Self { db })
    }

    /// Link ids per recipe for one kind, sorted.
    async fn links(
        &self,
        kind: AttributeKind,
        recipe_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Uuid>>, StoreError> {
        let sql = format!(
            "SELECT recipe_id, {col} FROM {link} WHERE recipe_id = ANY($1) ORDER BY {col}",
            col = kind.link_column(),
            link = kind.link_table(),
        );
        let rows = sqlx::query_as::<_, (Uuid, Uuid)>(&sql)
            .bind(recipe_ids)
            .fetch_all(&self.db)
            .await?;
        let mut out: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (recipe_id, attr_id) in rows {
            out.entry(recipe_id).or_default().push(attr_id);
        }
        Ok(out)
    }

    async fn hydrate(&self, rows: Vec<RecipeRow>) -> Result<Vec<Recipe>, StoreError> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut tags = self.links(AttributeKind::Tag, &ids).await?;
        let mut ingredients = self.links(AttributeKind::Ingredient, &ids).await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let t = tags.remove(&r.id).unwrap_or_default();
                let i = ingredients.remove(&r.id).unwrap_or_default();
                r.into_recipe(t, i)
            })
            .collect())
    }
}

async fn replace_links_tx(
    tx: &mut Transaction<'_, Postgres>,
    kind: AttributeKind,
    recipe_id: Uuid,
    ids: &[Uuid],
) -> Result<(), StoreError> {
    let delete = format!("DELETE FROM {} WHERE recipe_id = $1", kind.link_table());
    sqlx::query(&delete)
        .bind(recipe_id)
        .execute(&mut **tx)
        .await?;
    let insert = format!(
        "INSERT INTO {} (recipe_id, {}) SELECT $1, UNNEST($2::uuid[])",
        kind.link_table(),
        kind.link_column(),
    );
    sqlx::query(&insert)
        .bind(recipe_id)
        .bind(normalize_ids(ids))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, is_staff, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.is_staff)
            .bind(user.is_superuser)
            .fetch_one(&self.db)
            .await
            .map_err(map_unique)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   name = COALESCE($3, name),
                   password_hash = COALESCE($4, password_hash),
                   is_active = COALESCE($5, is_active)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.email)
            .bind(changes.name)
            .bind(changes.password_hash)
            .bind(changes.is_active)
            .fetch_optional(&self.db)
            .await
            .map_err(map_unique)
    }

    async fn list_attributes(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        assigned_only: bool,
    ) -> Result<Vec<Attribute>, StoreError> {
        // EXISTS rather than a join: one row per attribute however many recipes use it
        let sql = format!(
            r#"
            SELECT a.id, a.user_id, a.name, a.created_at
              FROM {table} a
             WHERE a.user_id = $1
               AND (NOT $2 OR EXISTS (
                    SELECT 1
                      FROM {link} l
                      JOIN recipes r ON r.id = l.recipe_id
                     WHERE l.{col} = a.id AND r.user_id = $1))
             ORDER BY a.name DESC
            "#,
            table = kind.table(),
            link = kind.link_table(),
            col = kind.link_column(),
        );
        Ok(sqlx::query_as::<_, Attribute>(&sql)
            .bind(owner)
            .bind(assigned_only)
            .fetch_all(&self.db)
            .await?)
    }

    async fn find_attributes(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Attribute>, StoreError> {
        let sql = format!(
            r#"
            SELECT id, user_id, name, created_at
              FROM {}
             WHERE user_id = $1 AND id = ANY($2)
             ORDER BY name ASC
            "#,
            kind.table()
        );
        Ok(sqlx::query_as::<_, Attribute>(&sql)
            .bind(owner)
            .bind(ids)
            .fetch_all(&self.db)
            .await?)
    }

    async fn insert_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        name: &str,
    ) -> Result<Attribute, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (id, user_id, name)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, name, created_at
            "#,
            kind.table()
        );
        Ok(sqlx::query_as::<_, Attribute>(&sql)
            .bind(Uuid::new_v4())
            .bind(owner)
            .bind(name)
            .fetch_one(&self.db)
            .await?)
    }

    async fn rename_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Attribute>, StoreError> {
        let sql = format!(
            r#"
            UPDATE {} SET name = $3
             WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, name, created_at
            "#,
            kind.table()
        );
        Ok(sqlx::query_as::<_, Attribute>(&sql)
            .bind(id)
            .bind(owner)
            .bind(name)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn delete_attribute(
        &self,
        kind: AttributeKind,
        owner: Uuid,
        id: Uuid,
    ) -> Result<bool, StoreError> {
        // link rows go with it via ON DELETE CASCADE
        let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", kind.table());
        let res = sqlx::query(&sql)
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_recipes(
        &self,
        owner: Uuid,
        filter: &RecipeFilter,
    ) -> Result<Vec<Recipe>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECIPE_COLUMNS}
              FROM recipes r
             WHERE r.user_id = $1
               AND (cardinality($2::uuid[]) = 0 OR EXISTS (
                    SELECT 1 FROM recipe_tags t
                     WHERE t.recipe_id = r.id AND t.tag_id = ANY($2)))
               AND (cardinality($3::uuid[]) = 0 OR EXISTS (
                    SELECT 1 FROM recipe_ingredients i
                     WHERE i.recipe_id = r.id AND i.ingredient_id = ANY($3)))
             ORDER BY r.created_at DESC, r.id DESC
            "#
        );
        let rows = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(owner)
            .bind(&filter.tags)
            .bind(&filter.ingredients)
            .fetch_all(&self.db)
            .await?;
        self.hydrate(rows).await
    }

    async fn find_recipe(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn insert_recipe(&self, owner: Uuid, recipe: NewRecipe) -> Result<Recipe, StoreError> {
        let mut tx = self.db.begin().await?;
        let sql = format!(
            r#"
            INSERT INTO recipes (id, user_id, title, time_minutes, price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(owner)
            .bind(&recipe.title)
            .bind(recipe.time_minutes)
            .bind(recipe.price)
            .fetch_one(&mut *tx)
            .await?;
        replace_links_tx(&mut tx, AttributeKind::Tag, row.id, &recipe.tags).await?;
        replace_links_tx(&mut tx, AttributeKind::Ingredient, row.id, &recipe.ingredients).await?;
        tx.commit().await?;

        Ok(row.into_recipe(
            normalize_ids(&recipe.tags),
            normalize_ids(&recipe.ingredients),
        ))
    }

    async fn update_recipe(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: RecipeChanges,
    ) -> Result<Option<Recipe>, StoreError> {
        let mut tx = self.db.begin().await?;
        let sql = format!(
            r#"
            UPDATE recipes
               SET title = COALESCE($3, title),
                   time_minutes = COALESCE($4, time_minutes),
                   price = COALESCE($5, price)
             WHERE id = $1 AND user_id = $2
            RETURNING {RECIPE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(id)
            .bind(owner)
            .bind(changes.title)
            .bind(changes.time_minutes)
            .bind(changes.price)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        if let Some(tags) = &changes.tags {
            replace_links_tx(&mut tx, AttributeKind::Tag, row.id, tags).await?;
        }
        if let Some(ingredients) = &changes.ingredients {
            replace_links_tx(&mut tx, AttributeKind::Ingredient, row.id, ingredients).await?;
        }
        tx.commit().await?;

        Ok(self.hydrate(vec![row]).await?.pop())
    }

    async fn delete_recipe(&self, owner: Uuid, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let sql = format!(
            "DELETE FROM recipes WHERE id = $1 AND user_id = $2 RETURNING {RECIPE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|r| r.into_recipe(Vec::new(), Vec::new())))
    }

    async fn set_recipe_image(
        &self,
        owner: Uuid,
        id: Uuid,
        image: Option<&str>,
    ) -> Result<Option<Recipe>, StoreError> {
        let sql = format!(
            "UPDATE recipes SET image = $3 WHERE id = $1 AND user_id = $2 RETURNING {RECIPE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RecipeRow>(&sql)
            .bind(id)
            .bind(owner)
            .bind(image)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}
