/// Account manager implementation using runtime queries
///
/// Uses sqlx runtime query building instead of compile-time macros to
/// avoid needing DATABASE_URL during compilation. Multi-record writes
/// (signup, activation, reset) run inside a single transaction; an early
/// return drops the transaction and rolls back every write in it.

use crate::{
    account::{
        Account, AccountRole, AccountStatus, CompanyProfile, OneTimeToken, ProfileResponse,
        TokenKind, TokenStatus, UserProfile,
    },
    config::ServerConfig,
    error::{GateError, GateResult},
    session::ModuleGrant,
    token::generate_one_time_token,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    // ==================== Signup ====================

    /// Create a user account with its profile sub-record and activation
    /// token in one transaction
    ///
    /// Returns the new account id and the opaque activation token.
    pub async fn create_user_account(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> GateResult<(Uuid, String)> {
        self.check_email_free(email).await?;

        let password_hash = self.hash_password(password)?;
        let account_id = Uuid::new_v4();
        let token = generate_one_time_token();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        self.insert_account(&mut tx, account_id, email, &password_hash, AccountRole::User, now)
            .await?;
        self.insert_one_time_token(&mut tx, account_id, &token, TokenKind::Validation, now)
            .await?;

        sqlx::query(
            "INSERT INTO user_profile (id, account_id, first_name, last_name)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id.to_string())
        .bind(first_name)
        .bind(last_name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("user account created: {}", account_id);
        Ok((account_id, token))
    }

    /// Create a company account with its profile sub-record and activation
    /// token in one transaction
    pub async fn create_company_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> GateResult<(Uuid, String)> {
        self.check_email_free(email).await?;

        let password_hash = self.hash_password(password)?;
        let account_id = Uuid::new_v4();
        let token = generate_one_time_token();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        self.insert_account(&mut tx, account_id, email, &password_hash, AccountRole::Company, now)
            .await?;
        self.insert_one_time_token(&mut tx, account_id, &token, TokenKind::Validation, now)
            .await?;

        sqlx::query(
            "INSERT INTO company_profile (id, account_id, name) VALUES (?1, ?2, ?3)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id.to_string())
        .bind(name)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("company account created: {}", account_id);
        Ok((account_id, token))
    }

    async fn check_email_free(&self, email: &str) -> GateResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        if count > 0 {
            return Err(GateError::Conflict("Email already exists".to_string()));
        }

        Ok(())
    }

    async fn insert_account(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        account_id: Uuid,
        email: &str,
        password_hash: &str,
        role: AccountRole,
        now: DateTime<Utc>,
    ) -> GateResult<()> {
        sqlx::query(
            "INSERT INTO account (id, created_at, updated_at, email, password_hash, role, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(account_id.to_string())
        .bind(now)
        .bind(now)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(AccountStatus::Pending.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn insert_one_time_token(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        account_id: Uuid,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> GateResult<()> {
        let ttl = match kind {
            TokenKind::Otp => Duration::minutes(5),
            _ => Duration::seconds(self.config.authentication.one_time_token_ttl),
        };

        sqlx::query(
            "INSERT INTO one_time_token (id, created_at, account_id, token, expire_at, kind, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(now)
        .bind(account_id.to_string())
        .bind(token)
        .bind(now + ttl)
        .bind(kind.as_str())
        .bind(TokenStatus::Pending.as_str())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    // ==================== Login ====================

    /// Verify credentials for a role and return the account with its
    /// profile id
    ///
    /// Every failure maps to the same generic authentication error; the
    /// specific reason goes to the log only.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        role: AccountRole,
    ) -> GateResult<(Account, Uuid)> {
        let generic = || GateError::Authentication("Invalid email or password".to_string());

        let account = match self.get_account_by_email(email).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!("login failed for {}: {}", email, e);
                return Err(generic());
            }
        };

        if account.role != role {
            tracing::warn!("login failed for {}: wrong role", email);
            return Err(generic());
        }

        if account.status != AccountStatus::Active {
            tracing::warn!("login failed for {}: account not active", email);
            return Err(generic());
        }

        if !self.verify_password(password, &account.password_hash)? {
            tracing::warn!("login failed for {}: invalid password", email);
            return Err(generic());
        }

        let profile_id = self.profile_id_for(&account).await?;

        Ok((account, profile_id))
    }

    async fn profile_id_for(&self, account: &Account) -> GateResult<Uuid> {
        let query = match account.role {
            AccountRole::User => "SELECT id FROM user_profile WHERE account_id = ?1",
            AccountRole::Company => "SELECT id FROM company_profile WHERE account_id = ?1",
        };

        let id: Option<String> = sqlx::query_scalar(query)
            .bind(account.id.to_string())
            .fetch_optional(&self.db)
            .await?;

        let id = id.ok_or_else(|| {
            GateError::Internal(format!("Account {} has no profile record", account.id))
        })?;

        Uuid::parse_str(&id)
            .map_err(|_| GateError::Internal("Malformed profile id in store".to_string()))
    }

    // ==================== One-time tokens ====================

    /// Activate a pending account with a validation token
    ///
    /// The status flip and the token consumption commit together.
    pub async fn activate(&self, token: &str) -> GateResult<Uuid> {
        let token_row = self.get_pending_token(token, TokenKind::Validation).await?;

        let account = self.get_account_by_id(token_row.account_id).await?;
        if account.status == AccountStatus::Active {
            return Err(GateError::Validation("Account already active".to_string()));
        }

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE account SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(AccountStatus::Active.as_str())
            .bind(Utc::now())
            .bind(account.id.to_string())
            .execute(&mut *tx)
            .await?;

        self.consume_token(&mut tx, token).await?;

        tx.commit().await?;

        tracing::info!("account activated: {}", account.id);
        Ok(account.id)
    }

    /// Create a password-reset token for the account owning this email
    pub async fn create_reset_token(&self, email: &str) -> GateResult<(Account, String)> {
        let account = self.get_account_by_email(email).await?;

        let token = generate_one_time_token();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        self.insert_one_time_token(&mut tx, account.id, &token, TokenKind::ResetPassword, now)
            .await?;
        tx.commit().await?;

        Ok((account, token))
    }

    /// Reset the password with a one-time reset token
    pub async fn reset_password(&self, token: &str, new_password: &str) -> GateResult<Uuid> {
        let token_row = self.get_pending_token(token, TokenKind::ResetPassword).await?;

        let password_hash = self.hash_password(new_password)?;

        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE account SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&password_hash)
            .bind(Utc::now())
            .bind(token_row.account_id.to_string())
            .execute(&mut *tx)
            .await?;

        self.consume_token(&mut tx, token).await?;

        tx.commit().await?;

        tracing::info!("password reset for {}", token_row.account_id);
        Ok(token_row.account_id)
    }

    /// Fetch a one-time token, requiring a string match AND pending
    /// status AND an unexpired timestamp
    ///
    /// Checking only the string would allow a replay of a used token.
    async fn get_pending_token(&self, token: &str, kind: TokenKind) -> GateResult<OneTimeToken> {
        let row = sqlx::query(
            "SELECT id, created_at, account_id, token, expire_at, kind, status
             FROM one_time_token WHERE token = ?1 AND kind = ?2",
        )
        .bind(token)
        .bind(kind.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound("Invalid token".to_string()))?;

        let status: String = row.try_get("status")?;
        if status != TokenStatus::Pending.as_str() {
            return Err(GateError::Validation(
                "Token has already been used".to_string(),
            ));
        }

        let expire_at: DateTime<Utc> = row.try_get("expire_at")?;
        if Utc::now() > expire_at {
            return Err(GateError::Validation("Token has expired".to_string()));
        }

        let id: String = row.try_get("id")?;
        let account_id: String = row.try_get("account_id")?;

        Ok(OneTimeToken {
            id: parse_uuid(&id)?,
            created_at: row.try_get("created_at")?,
            account_id: parse_uuid(&account_id)?,
            token: row.try_get("token")?,
            expire_at,
            kind,
            status: TokenStatus::Pending,
        })
    }

    async fn consume_token(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        token: &str,
    ) -> GateResult<()> {
        sqlx::query("UPDATE one_time_token SET status = ?1 WHERE token = ?2")
            .bind(TokenStatus::Used.as_str())
            .bind(token)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    // ==================== Password ====================

    /// Change the password after verifying the current one
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> GateResult<()> {
        let account = self.get_account_by_id(account_id).await?;

        if !self.verify_password(current_password, &account.password_hash)? {
            tracing::warn!("password change rejected for {}: invalid password", account_id);
            return Err(GateError::Validation("Invalid password".to_string()));
        }

        let password_hash = self.hash_password(new_password)?;

        sqlx::query("UPDATE account SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&password_hash)
            .bind(Utc::now())
            .bind(account_id.to_string())
            .execute(&self.db)
            .await?;

        tracing::info!("password changed for {}", account_id);
        Ok(())
    }

    fn hash_password(&self, password: &str) -> GateResult<String> {
        bcrypt::hash(password, self.config.authentication.bcrypt_cost)
            .map_err(|e| GateError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify_password(&self, password: &str, hash: &str) -> GateResult<bool> {
        bcrypt::verify(password, hash)
            .map_err(|e| GateError::Internal(format!("Password verification failed: {}", e)))
    }

    // ==================== Profiles ====================

    /// Profile view for an account: the account fields plus the sub-record
    /// matching its role
    pub async fn profile(&self, account_id: Uuid) -> GateResult<ProfileResponse> {
        let account = self.get_account_by_id(account_id).await?;

        let (user, company) = match account.role {
            AccountRole::User => (Some(self.user_profile(account_id).await?), None),
            AccountRole::Company => (None, Some(self.company_profile(account_id).await?)),
        };

        Ok(ProfileResponse {
            id: account.id,
            email: account.email,
            role: account.role,
            status: account.status,
            user,
            company,
        })
    }

    /// Update the user profile sub-record and return the fresh profile view
    pub async fn update_user_profile(
        &self,
        account_id: Uuid,
        first_name: &str,
        last_name: &str,
    ) -> GateResult<ProfileResponse> {
        let result = sqlx::query(
            "UPDATE user_profile SET first_name = ?1, last_name = ?2 WHERE account_id = ?3",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(account_id.to_string())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound("No user profile for account".to_string()));
        }

        self.profile(account_id).await
    }

    /// Update the company profile sub-record and return the fresh profile view
    pub async fn update_company_profile(
        &self,
        account_id: Uuid,
        name: &str,
    ) -> GateResult<ProfileResponse> {
        let result = sqlx::query("UPDATE company_profile SET name = ?1 WHERE account_id = ?2")
            .bind(name)
            .bind(account_id.to_string())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GateError::NotFound(
                "No company profile for account".to_string(),
            ));
        }

        self.profile(account_id).await
    }

    async fn user_profile(&self, account_id: Uuid) -> GateResult<UserProfile> {
        let row = sqlx::query(
            "SELECT id, account_id, first_name, last_name FROM user_profile WHERE account_id = ?1",
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound("No user profile for account".to_string()))?;

        let id: String = row.try_get("id")?;

        Ok(UserProfile {
            id: parse_uuid(&id)?,
            account_id,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
        })
    }

    async fn company_profile(&self, account_id: Uuid) -> GateResult<CompanyProfile> {
        let row = sqlx::query(
            "SELECT id, account_id, name FROM company_profile WHERE account_id = ?1",
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound("No company profile for account".to_string()))?;

        let id: String = row.try_get("id")?;

        Ok(CompanyProfile {
            id: parse_uuid(&id)?,
            account_id,
            name: row.try_get("name")?,
        })
    }

    // ==================== Permissions ====================

    /// Module grants for a role, loaded into the session record at login
    pub async fn grants_for_role(&self, role: AccountRole) -> GateResult<Vec<ModuleGrant>> {
        let rows = sqlx::query(
            "SELECT module_id, module_access, read_access, write_access, delete_access
             FROM module_permission WHERE role = ?1 ORDER BY module_id",
        )
        .bind(role.as_str())
        .fetch_all(&self.db)
        .await?;

        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            grants.push(ModuleGrant {
                module_id: row.try_get("module_id")?,
                module_access: row.try_get("module_access")?,
                read_access: row.try_get("read_access")?,
                write_access: row.try_get("write_access")?,
                delete_access: row.try_get("delete_access")?,
            });
        }

        Ok(grants)
    }

    // ==================== Lookup ====================

    /// Get account by id
    pub async fn get_account_by_id(&self, id: Uuid) -> GateResult<Account> {
        let row = sqlx::query(
            "SELECT id, created_at, updated_at, email, password_hash, role, status
             FROM account WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound("Account not found".to_string()))?;

        row_to_account(&row)
    }

    /// Get account by email
    pub async fn get_account_by_email(&self, email: &str) -> GateResult<Account> {
        let row = sqlx::query(
            "SELECT id, created_at, updated_at, email, password_hash, role, status
             FROM account WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| GateError::NotFound("Account not found".to_string()))?;

        row_to_account(&row)
    }
}

fn parse_uuid(raw: &str) -> GateResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| GateError::Internal("Malformed id in store".to_string()))
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> GateResult<Account> {
    let id: String = row.try_get("id")?;
    let role: String = row.try_get("role")?;
    let status: String = row.try_get("status")?;

    Ok(Account {
        id: parse_uuid(&id)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: AccountRole::parse(&role)
            .ok_or_else(|| GateError::Internal(format!("Unknown account role: {}", role)))?,
        status: AccountStatus::parse(&status)
            .ok_or_else(|| GateError::Internal(format!("Unknown account status: {}", status)))?,
    })
}
