//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the auth, credit, report and package ports from the `core` crate. It handles
//! all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coaching_core::domain::{
    CreditBalance, CreditKind, DeductionOutcome, DeductionRequest, DimensionScores, NewReport,
    Package, PackageDocument, Profile, QueuedPackage, Report, ReportStatus, ReportType, User,
    UserCredentials,
};
use coaching_core::ports::{
    CreditStore, DatabaseService, PackageStore, PortError, PortResult, ReportStore,
};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter implementing the relational ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    subscribed: bool,
}

#[derive(FromRow)]
struct BalanceRecord {
    credits: i32,
    health_score_credits: i32,
}
impl BalanceRecord {
    fn to_domain(self) -> CreditBalance {
        CreditBalance {
            credits: self.credits.max(0) as u32,
            health_score_credits: self.health_score_credits.max(0) as u32,
        }
    }
}

const REPORT_COLUMNS: &str = "id, user_id, title, company_name, exercise_id, status, report_type, \
    plan_score, people_score, profits_score, purpose_impact_score, stress_leadership_score, \
    overall_score, document_url, company_id, created_at, updated_at";

#[derive(FromRow)]
struct ReportRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    company_name: String,
    exercise_id: String,
    status: String,
    report_type: String,
    plan_score: Option<f64>,
    people_score: Option<f64>,
    profits_score: Option<f64>,
    purpose_impact_score: Option<f64>,
    stress_leadership_score: Option<f64>,
    overall_score: Option<f64>,
    document_url: Option<String>,
    company_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ReportRecord {
    fn to_domain(self) -> PortResult<Report> {
        let status = ReportStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Report {} has unknown status '{}'", self.id, self.status))
        })?;
        let report_type = ReportType::parse(&self.report_type).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Report {} has unknown type '{}'",
                self.id, self.report_type
            ))
        })?;
        Ok(Report {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            company_name: self.company_name,
            exercise_id: self.exercise_id,
            status,
            report_type,
            scores: DimensionScores {
                plan: self.plan_score,
                people: self.people_score,
                profits: self.profits_score,
                purpose_impact: self.purpose_impact_score,
                stress_leadership: self.stress_leadership_score,
                overall: self.overall_score,
            },
            document_url: self.document_url,
            company_id: self.company_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn reports_to_domain(records: Vec<ReportRecord>) -> PortResult<Vec<Report>> {
    records.into_iter().map(ReportRecord::to_domain).collect()
}

#[derive(FromRow)]
struct PackageRecord {
    id: Uuid,
    report_id: Uuid,
    package_name: String,
    documents: Json<Vec<PackageDocument>>,
    cover_image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl PackageRecord {
    fn to_domain(self) -> Package {
        Package {
            id: self.id,
            report_id: self.report_id,
            package_name: self.package_name,
            documents: self.documents.0,
            cover_image_url: self.cover_image_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct QueuedPackageRecord {
    id: Uuid,
    report_id: Uuid,
    package_name: String,
    estimated_completion: DateTime<Utc>,
    created_at: DateTime<Utc>,
}
impl QueuedPackageRecord {
    fn to_domain(self) -> QueuedPackage {
        QueuedPackage {
            id: self.id,
            report_id: self.report_id,
            package_name: self.package_name,
            estimated_completion: self.estimated_completion,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, hashed_password) VALUES ($1, $2) RETURNING user_id, email",
        )
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("INSERT INTO profiles (user_id) VALUES ($1)")
            .bind(record.user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1 AND hashed_password IS NOT NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User with email {}", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("User {}", user_id)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, subscribed FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or_unexpected(format!("Profile {}", user_id)))?;
        Ok(Profile {
            user_id: record.user_id,
            subscribed: record.subscribed,
        })
    }
}

//=========================================================================================
// `CreditStore` Trait Implementation
//=========================================================================================

fn balance_column(kind: CreditKind) -> &'static str {
    match kind {
        CreditKind::General => "credits",
        CreditKind::HealthScore => "health_score_credits",
    }
}

/// Balances are `INTEGER` columns; an amount past `i32::MAX` is refused.
fn amount_param(amount: u32) -> PortResult<i32> {
    i32::try_from(amount)
        .map_err(|_| PortError::Unexpected(format!("Credit amount {} is out of range", amount)))
}

async fn read_balance(conn: &mut PgConnection, user_id: Uuid) -> PortResult<CreditBalance> {
    let record = sqlx::query_as::<_, BalanceRecord>(
        "SELECT credits, health_score_credits FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await
    .map_err(not_found_or_unexpected(format!("Credit balance for {}", user_id)))?;
    Ok(record.to_domain())
}

#[async_trait]
impl CreditStore for DbAdapter {
    async fn fetch_balance(&self, user_id: Uuid) -> PortResult<CreditBalance> {
        let mut conn = self.pool.acquire().await.map_err(unexpected)?;
        read_balance(&mut *conn, user_id).await
    }

    async fn deduct(
        &self,
        user_id: Uuid,
        request: &DeductionRequest,
    ) -> PortResult<DeductionOutcome> {
        let amount = amount_param(request.amount)?;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let replay: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM credit_transactions WHERE request_id = $1")
                .bind(request.request_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;
        if replay.is_some() {
            let balance = read_balance(&mut *tx, user_id).await?;
            tx.commit().await.map_err(unexpected)?;
            info!(%user_id, request_id = %request.request_id, "Deduction replayed, not charged again");
            return Ok(DeductionOutcome::Applied(balance));
        }

        // The conditional update is the arbiter: it only matches when the
        // balance still covers the amount.
        let column = balance_column(request.kind);
        let sql = format!(
            "UPDATE profiles SET {col} = {col} - $1, updated_at = now() \
             WHERE user_id = $2 AND {col} >= $1 \
             RETURNING credits, health_score_credits",
            col = column
        );
        let updated = sqlx::query_as::<_, BalanceRecord>(&sql)
            .bind(amount)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?;

        let Some(updated) = updated else {
            let balance = read_balance(&mut *tx, user_id).await?;
            tx.rollback().await.map_err(unexpected)?;
            return Ok(DeductionOutcome::Insufficient(balance));
        };

        sqlx::query(
            "INSERT INTO credit_transactions (user_id, request_id, kind, amount, reason, category) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(request.request_id)
        .bind(request.kind.as_str())
        .bind(-amount)
        .bind(&request.reason)
        .bind(&request.category)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(DeductionOutcome::Applied(updated.to_domain()))
    }

    async fn refund(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        kind: CreditKind,
        amount: u32,
        reason: &str,
    ) -> PortResult<CreditBalance> {
        let amount = amount_param(amount)?;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let inserted = sqlx::query(
            "INSERT INTO credit_transactions (user_id, refund_of, kind, amount, reason, category) \
             VALUES ($1, $2, $3, $4, $5, 'refund') ON CONFLICT (refund_of) DO NOTHING",
        )
        .bind(user_id)
        .bind(request_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(reason)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if inserted.rows_affected() > 0 {
            let column = balance_column(kind);
            let sql = format!(
                "UPDATE profiles SET {col} = {col} + $1, updated_at = now() WHERE user_id = $2",
                col = column
            );
            sqlx::query(&sql)
                .bind(amount)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }

        let balance = read_balance(&mut *tx, user_id).await?;
        tx.commit().await.map_err(unexpected)?;
        Ok(balance)
    }
}

//=========================================================================================
// `ReportStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReportStore for DbAdapter {
    async fn insert_report(&self, report: &NewReport) -> PortResult<Report> {
        let sql = format!(
            "INSERT INTO reports (user_id, title, company_name, exercise_id, status, report_type, document_url, company_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            REPORT_COLUMNS
        );
        let record = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(report.user_id)
            .bind(&report.title)
            .bind(&report.company_name)
            .bind(&report.exercise_id)
            .bind(report.status.as_str())
            .bind(report.report_type.as_str())
            .bind(&report.document_url)
            .bind(report.company_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_report(&self, user_id: Uuid, report_id: Uuid) -> PortResult<Report> {
        let sql = format!("SELECT {} FROM reports WHERE id = $1 AND user_id = $2", REPORT_COLUMNS);
        let record = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(report_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("Report {}", report_id)))?;
        record.to_domain()
    }

    async fn list_reports(&self, user_id: Uuid) -> PortResult<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE user_id = $1 ORDER BY created_at DESC",
            REPORT_COLUMNS
        );
        let records = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        reports_to_domain(records)
    }

    async fn list_new_reports_for_company(
        &self,
        user_id: Uuid,
        company_name: &str,
    ) -> PortResult<Vec<Report>> {
        let sql = format!(
            "SELECT {} FROM reports WHERE user_id = $1 AND company_name = $2 AND report_type = 'New' \
             ORDER BY created_at ASC",
            REPORT_COLUMNS
        );
        let records = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(user_id)
            .bind(company_name)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        reports_to_domain(records)
    }

    async fn set_report_status(
        &self,
        user_id: Uuid,
        report_id: Uuid,
        status: ReportStatus,
    ) -> PortResult<Report> {
        let sql = format!(
            "UPDATE reports SET status = $1, updated_at = now() WHERE id = $2 AND user_id = $3 RETURNING {}",
            REPORT_COLUMNS
        );
        let record = sqlx::query_as::<_, ReportRecord>(&sql)
            .bind(status.as_str())
            .bind(report_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found_or_unexpected(format!("Report {}", report_id)))?;
        record.to_domain()
    }

    async fn delete_report(&self, user_id: Uuid, report_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM reports WHERE id = $1 AND user_id = $2")
            .bind(report_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Report {}", report_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `PackageStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl PackageStore for DbAdapter {
    async fn list_packages(&self, report_id: Uuid) -> PortResult<Vec<Package>> {
        let records = sqlx::query_as::<_, PackageRecord>(
            "SELECT id, report_id, package_name, documents, cover_image_url, created_at, updated_at \
             FROM packages WHERE report_id = $1 ORDER BY created_at DESC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_queued(&self, report_id: Uuid) -> PortResult<Vec<QueuedPackage>> {
        let records = sqlx::query_as::<_, QueuedPackageRecord>(
            "SELECT id, report_id, package_name, estimated_completion, created_at \
             FROM package_queue WHERE report_id = $1 ORDER BY created_at ASC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_package(&self, user_id: Uuid, package_id: Uuid) -> PortResult<()> {
        let result = sqlx::query(
            "DELETE FROM packages p USING reports r \
             WHERE p.id = $1 AND p.report_id = r.id AND r.user_id = $2",
        )
        .bind(package_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Package {}", package_id)));
        }
        Ok(())
    }
}
