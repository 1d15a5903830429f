use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::repo_types::{Payment, PaymentListRow, PaymentStatus, ServiceRequest};

const PAYMENT_COLUMNS: &str = "id, user_id, payment_id, amount, currency, description, status, \
                               yookassa_payment_id, created_at";

impl Payment {
    pub async fn insert_pending(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        payment_id: Uuid,
        amount: f64,
        currency: &str,
        description: &str,
    ) -> sqlx::Result<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (user_id, payment_id, amount, currency, description, status)
            VALUES (?, ?, ?, ?, ?, 'pending')
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(payment_id)
        .bind(amount)
        .bind(currency)
        .bind(description)
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn set_provider_reference(
        db: &SqlitePool,
        id: i64,
        provider_id: &str,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE payments SET yookassa_payment_id = ? WHERE id = ?")
            .bind(provider_id)
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Move a pending payment (and its service request) to `to`.
    /// Returns false when the payment had already left `pending`.
    pub async fn transition(db: &SqlitePool, id: i64, to: PaymentStatus) -> sqlx::Result<bool> {
        let mut tx = db.begin().await?;
        let changed = sqlx::query("UPDATE payments SET status = ? WHERE id = ? AND status = 'pending'")
            .bind(to)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;
        if changed {
            sqlx::query("UPDATE service_requests SET status = ? WHERE payment_id = ?")
                .bind(to)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(changed)
    }

    pub async fn find_for_user(
        db: &SqlitePool,
        user_id: Uuid,
        payment_id: Uuid,
    ) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = ? AND user_id = ?"
        ))
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_provider_reference(
        db: &SqlitePool,
        provider_id: &str,
    ) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE yookassa_payment_id = ?"
        ))
        .bind(provider_id)
        .fetch_optional(db)
        .await
    }

    /// Newest first; the row id breaks ties between equal timestamps.
    pub async fn list_by_user(db: &SqlitePool, user_id: Uuid) -> sqlx::Result<Vec<PaymentListRow>> {
        sqlx::query_as::<_, PaymentListRow>(
            r#"
            SELECT p.payment_id, p.amount, p.description, p.status, s.service_type, p.created_at
            FROM payments p
            LEFT JOIN service_requests s ON s.payment_id = p.id
            WHERE p.user_id = ?
            ORDER BY p.created_at DESC, p.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }
}

impl ServiceRequest {
    pub async fn insert(
        conn: &mut SqliteConnection,
        user_id: Uuid,
        service_type: &str,
        description: Option<&str>,
        payment_row_id: i64,
    ) -> sqlx::Result<ServiceRequest> {
        sqlx::query_as::<_, ServiceRequest>(
            r#"
            INSERT INTO service_requests (user_id, service_type, description, status, payment_id)
            VALUES (?, ?, ?, 'pending', ?)
            RETURNING id, user_id, service_type, description, status, payment_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(service_type)
        .bind(description)
        .bind(payment_row_id)
        .fetch_one(&mut *conn)
        .await
    }
}
