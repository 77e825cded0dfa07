use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::db::format_timestamp;
use crate::entities::auth_tokens;
use crate::models::TokenKind;

/// Persistence for single-use verification and password-reset tokens.
pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl TokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Stores a fresh token for `user_id`, first marking every unused token
    /// of the same kind for that user as used.
    pub async fn create(
        &self,
        user_id: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let token = generate_token();
        let txn = self.conn.begin().await?;

        auth_tokens::Entity::update_many()
            .col_expr(auth_tokens::Column::Used, Expr::value(true))
            .filter(auth_tokens::Column::UserId.eq(user_id))
            .filter(auth_tokens::Column::Kind.eq(kind.as_str()))
            .filter(auth_tokens::Column::Used.eq(false))
            .exec(&txn)
            .await
            .context("Failed to invalidate superseded tokens")?;

        auth_tokens::ActiveModel {
            token: Set(token.clone()),
            user_id: Set(user_id.to_string()),
            kind: Set(kind.as_str().to_string()),
            expires_at: Set(format_timestamp(now + kind.ttl())),
            used: Set(false),
            created_at: Set(format_timestamp(now)),
        }
        .insert(&txn)
        .await
        .context("Failed to insert token")?;

        txn.commit().await?;
        Ok(token)
    }

    /// Consumes an unexpired, unused token of `kind` and returns its user id.
    ///
    /// The used flag is flipped by a conditional update, so two concurrent
    /// calls with the same token cannot both succeed.
    pub async fn consume(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let now = format_timestamp(now);

        let Some(row) = auth_tokens::Entity::find_by_id(token.to_string())
            .filter(auth_tokens::Column::Kind.eq(kind.as_str()))
            .filter(auth_tokens::Column::Used.eq(false))
            .filter(auth_tokens::Column::ExpiresAt.gt(now.as_str()))
            .one(&self.conn)
            .await
            .context("Failed to query token")?
        else {
            return Ok(None);
        };

        let result = auth_tokens::Entity::update_many()
            .col_expr(auth_tokens::Column::Used, Expr::value(true))
            .filter(auth_tokens::Column::Token.eq(token))
            .filter(auth_tokens::Column::Used.eq(false))
            .exec(&self.conn)
            .await
            .context("Failed to mark token used")?;

        Ok((result.rows_affected == 1).then_some(row.user_id))
    }

    /// Deletes tokens that are used or past their expiry.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = auth_tokens::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(auth_tokens::Column::Used.eq(true))
                    .add(auth_tokens::Column::ExpiresAt.lte(format_timestamp(now))),
            )
            .exec(&self.conn)
            .await
            .context("Failed to purge tokens")?;

        Ok(result.rows_affected)
    }
}

/// Random 64 character hex string.
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
