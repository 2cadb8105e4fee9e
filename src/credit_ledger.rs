use std::fmt::Debug;

use futures::future::BoxFuture;
use sea_orm::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{DatabaseConnection, QuerySelect};
use tracing::{event, Level};

use crate::entities::prelude::*;
use crate::entities::user;
use crate::error::Error;

/// Per-user credit balance. Every mutation is a single conditional statement,
/// callers never read the balance and write it back.
pub trait CreditLedger: Debug + Send + Sync {
    /// Takes one credit if the balance is positive. `Ok(false)` means denied.
    fn try_consume<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool, Error>>;
    /// Gives one credit back.
    fn refund<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), Error>>;
    fn balance<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<i32>, Error>>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmCreditLedger {
    db: DatabaseConnection,
}

impl SeaOrmCreditLedger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl CreditLedger for SeaOrmCreditLedger {
    fn try_consume<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let res = User::update_many()
                .col_expr(user::Column::Credit, Expr::col(user::Column::Credit).sub(1))
                .filter(user::Column::Id.eq(user_id))
                .filter(user::Column::Credit.gt(0))
                .exec(&self.db)
                .await
                .map_err(|e| Error::Database(format!("Error consuming credit: {}", e)))?;
            event!(
                Level::DEBUG,
                user_id,
                rows = res.rows_affected,
                "credit consume"
            );
            Ok(res.rows_affected == 1)
        })
    }

    fn refund<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            let res = User::update_many()
                .col_expr(user::Column::Credit, Expr::col(user::Column::Credit).add(1))
                .filter(user::Column::Id.eq(user_id))
                .exec(&self.db)
                .await
                .map_err(|e| Error::Database(format!("Error refunding credit: {}", e)))?;
            if res.rows_affected != 1 {
                return Err(Error::Database(format!(
                    "Refund matched {} users for id {}",
                    res.rows_affected, user_id
                )));
            }
            Ok(())
        })
    }

    fn balance<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<Option<i32>, Error>> {
        Box::pin(async move {
            let credit = User::find_by_id(user_id.to_string())
                .select_only()
                .column(user::Column::Credit)
                .into_tuple::<i32>()
                .one(&self.db)
                .await?;
            Ok(credit)
        })
    }
}
