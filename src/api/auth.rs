/// /auth/* endpoints
use crate::{
    account::{AccountRole, ProfileResponse},
    api::{
        envelope::{self, DataResponse, MessageResponse},
        middleware::AuthContext,
    },
    context::AppContext,
    error::{GateError, GateResult},
    session::{modules, Capability, SessionRecord},
};
use axum::{
    extract::State,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/signup/user", post(signup_user))
        .route("/auth/signup/company", post(signup_company))
        .route("/auth/activate", post(activate))
        .route("/auth/login/user", post(login_user))
        .route("/auth/login/company", post(login_company))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot", post(forgot_password))
        .route("/auth/reset", post(reset_password))
        .route("/auth/profile", get(get_profile))
        .route("/auth/user", patch(update_user_profile))
        .route("/auth/company", patch(update_company_profile))
        .route("/auth/change", patch(change_password))
}

fn validate(req: &impl Validate) -> GateResult<()> {
    req.validate()
        .map_err(|e| GateError::Validation(e.to_string()))
}

// ==================== Requests & responses ====================

#[derive(Debug, Deserialize, Validate)]
pub struct SignupUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupCompanyRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub account_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: Uuid,
    pub token: String,
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1))]
    pub token: String,
    #[validate(length(min = 8))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

// ==================== Signup & activation ====================

async fn signup_user(
    State(ctx): State<AppContext>,
    Json(req): Json<SignupUserRequest>,
) -> GateResult<Json<DataResponse<SignupResponse>>> {
    validate(&req)?;

    let (account_id, token) = ctx
        .account_manager
        .create_user_account(&req.email, &req.password, &req.first_name, &req.last_name)
        .await?;

    let name = format!("{} {}", req.first_name, req.last_name);
    ctx.mailer
        .send_activation_email(
            std::slice::from_ref(&req.email),
            name.trim(),
            &token,
            &ctx.service_url(),
        )
        .await?;

    Ok(Json(envelope::success_with(
        SignupResponse { account_id },
        "Successfully signed up",
    )))
}

async fn signup_company(
    State(ctx): State<AppContext>,
    Json(req): Json<SignupCompanyRequest>,
) -> GateResult<Json<DataResponse<SignupResponse>>> {
    validate(&req)?;

    let (account_id, token) = ctx
        .account_manager
        .create_company_account(&req.email, &req.password, &req.name)
        .await?;

    ctx.mailer
        .send_activation_email(
            std::slice::from_ref(&req.email),
            &req.name,
            &token,
            &ctx.service_url(),
        )
        .await?;

    Ok(Json(envelope::success_with(
        SignupResponse { account_id },
        "Successfully signed up",
    )))
}

async fn activate(
    State(ctx): State<AppContext>,
    Json(req): Json<ActivateRequest>,
) -> GateResult<Json<MessageResponse>> {
    validate(&req)?;

    let account_id = ctx.account_manager.activate(&req.token).await?;
    tracing::info!("account {} activated", account_id);

    Ok(Json(envelope::success("Successfully validated")))
}

// ==================== Login & logout ====================

async fn login_user(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> GateResult<Json<DataResponse<LoginResponse>>> {
    login(ctx, req, AccountRole::User).await
}

async fn login_company(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> GateResult<Json<DataResponse<LoginResponse>>> {
    login(ctx, req, AccountRole::Company).await
}

/// Shared login flow: verify credentials, issue the bearer token and
/// write the session record, replacing any prior record for the account
async fn login(
    ctx: AppContext,
    req: LoginRequest,
    role: AccountRole,
) -> GateResult<Json<DataResponse<LoginResponse>>> {
    validate(&req)?;

    let (account, profile_id) = ctx.account_manager.login(&req.email, &req.password, role).await?;

    let token = ctx
        .token_codec
        .issue(account.id, profile_id, &account.email, account.role)?;

    let grants = ctx.account_manager.grants_for_role(account.role).await?;
    ctx.session_store
        .put(account.id, &SessionRecord::new(token.clone(), grants))
        .await?;

    tracing::info!("successful login for {}", account.id);

    Ok(Json(envelope::success_with(
        LoginResponse {
            id: account.id,
            token,
            email: account.email,
        },
        "Successfully logged in",
    )))
}

async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> GateResult<Json<MessageResponse>> {
    ctx.session_store.delete(auth.identity.account_id).await?;

    tracing::info!("successful logout for {}", auth.identity.account_id);
    Ok(Json(envelope::success("Successfully logged out")))
}

// ==================== Password recovery ====================

async fn forgot_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ForgotPasswordRequest>,
) -> GateResult<Json<MessageResponse>> {
    validate(&req)?;

    let (account, token) = ctx.account_manager.create_reset_token(&req.email).await?;

    let profile = ctx.account_manager.profile(account.id).await?;
    let name = display_name(&profile);

    ctx.mailer
        .send_password_reset_email(
            std::slice::from_ref(&req.email),
            &name,
            &token,
            &ctx.service_url(),
        )
        .await?;

    Ok(Json(envelope::success("Forgot password email sent")))
}

fn display_name(profile: &ProfileResponse) -> String {
    if let Some(company) = &profile.company {
        company.name.clone()
    } else if let Some(user) = &profile.user {
        format!("{} {}", user.first_name, user.last_name).trim().to_string()
    } else {
        profile.email.clone()
    }
}

async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> GateResult<Json<MessageResponse>> {
    validate(&req)?;

    let account_id = ctx
        .account_manager
        .reset_password(&req.token, &req.password)
        .await?;

    // Credentials changed: any live session must re-authenticate
    ctx.session_store.mark_updated(account_id).await?;

    Ok(Json(envelope::success("Password reset successfully")))
}

// ==================== Profile ====================

async fn get_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> GateResult<Json<DataResponse<ProfileResponse>>> {
    auth.require(modules::PROFILE, Capability::Read)?;

    let profile = ctx.account_manager.profile(auth.identity.account_id).await?;

    Ok(Json(envelope::success_with(
        profile,
        "Successfully got profile",
    )))
}

async fn update_user_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateUserRequest>,
) -> GateResult<Json<DataResponse<ProfileResponse>>> {
    auth.require(modules::PROFILE, Capability::Write)?;
    validate(&req)?;

    let profile = ctx
        .account_manager
        .update_user_profile(auth.identity.account_id, &req.first_name, &req.last_name)
        .await?;

    Ok(Json(envelope::success_with(
        profile,
        "Successfully updated profile",
    )))
}

async fn update_company_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<UpdateCompanyRequest>,
) -> GateResult<Json<DataResponse<ProfileResponse>>> {
    auth.require(modules::PROFILE, Capability::Write)?;
    validate(&req)?;

    let profile = ctx
        .account_manager
        .update_company_profile(auth.identity.account_id, &req.name)
        .await?;

    Ok(Json(envelope::success_with(
        profile,
        "Successfully updated profile",
    )))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> GateResult<Json<MessageResponse>> {
    validate(&req)?;

    ctx.account_manager
        .change_password(
            auth.identity.account_id,
            &req.current_password,
            &req.new_password,
        )
        .await?;

    // Credentials changed: the session record stays but is marked stale,
    // so the next request gets the "data changed" rejection
    ctx.session_store.mark_updated(auth.identity.account_id).await?;

    Ok(Json(envelope::success("Successfully changed password")))
}
