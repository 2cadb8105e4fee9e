use std::fmt::Debug;

use futures::future::BoxFuture;
use sea_orm::prelude::*;
use sea_orm::{ActiveValue, DatabaseConnection, QueryOrder};
use uuid::Uuid;

use crate::entities::generation;
use crate::entities::prelude::*;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneration {
    pub website_url: String,
    pub prompt: String,
    pub asset_id: String,
    pub mime_type: String,
    pub user_id: String,
}

/// Generation rows. Rows are written once and never updated.
pub trait GenerationStore: Debug + Send + Sync {
    fn record(&self, new: NewGeneration) -> BoxFuture<'_, Result<generation::Model, Error>>;

    /// Newest first.
    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<generation::Model>, Error>>;

    fn find_owned<'a>(
        &'a self,
        id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<generation::Model>, Error>>;

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmGenerationStore {
    db: DatabaseConnection,
}

impl SeaOrmGenerationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl GenerationStore for SeaOrmGenerationStore {
    fn record(&self, new: NewGeneration) -> BoxFuture<'_, Result<generation::Model, Error>> {
        Box::pin(async move {
            let row = generation::ActiveModel {
                id: ActiveValue::set(Uuid::new_v4().to_string()),
                website_url: ActiveValue::set(new.website_url),
                prompt: ActiveValue::set(new.prompt),
                asset_id: ActiveValue::set(new.asset_id),
                mime_type: ActiveValue::set(new.mime_type),
                user_id: ActiveValue::set(new.user_id),
                created_at: ActiveValue::set(chrono::Utc::now().naive_utc()),
            };
            Ok(row.insert(&self.db).await?)
        })
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<generation::Model>, Error>> {
        Box::pin(async move {
            let rows = Generation::find()
                .filter(generation::Column::UserId.eq(user_id))
                .order_by_desc(generation::Column::CreatedAt)
                .all(&self.db)
                .await?;
            Ok(rows)
        })
    }

    fn find_owned<'a>(
        &'a self,
        id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<generation::Model>, Error>> {
        Box::pin(async move {
            let row = Generation::find_by_id(id.to_string())
                .filter(generation::Column::UserId.eq(user_id))
                .one(&self.db)
                .await?;
            Ok(row)
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            Generation::delete_by_id(id.to_string())
                .exec(&self.db)
                .await
                .map_err(|e| Error::Database(format!("Error deleting generation: {}", e)))?;
            Ok(())
        })
    }
}
