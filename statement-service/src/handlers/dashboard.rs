use crate::dtos::dashboard::RECENT_FILES_LIMIT;
use crate::dtos::{AdminDashboardResponse, UserDashboardResponse, UserStatsRow, UsersStatsResponse};
use crate::middleware::{AdminUser, UserId};
use crate::startup::AppState;
use axum::{extract::State, Json};
use service_core::error::AppError;

pub async fn dashboard_stats(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<UserDashboardResponse>, AppError> {
    let counts = state.store.user_counts(user_id).await?;
    let recent = state.store.recent_jobs(user_id, RECENT_FILES_LIMIT).await?;

    Ok(Json(UserDashboardResponse::new(counts, recent)))
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
) -> Result<Json<AdminDashboardResponse>, AppError> {
    tracing::debug!(admin_id = %admin_id, "Admin dashboard requested");
    let counts = state.store.system_counts().await?;
    Ok(Json(AdminDashboardResponse::from(counts)))
}

pub async fn users_stats(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
) -> Result<Json<UsersStatsResponse>, AppError> {
    tracing::debug!(admin_id = %admin_id, "Per-user statistics requested");
    let users: Vec<UserStatsRow> = state
        .store
        .per_user_counts()
        .await?
        .into_iter()
        .map(UserStatsRow::from)
        .collect();

    Ok(Json(UsersStatsResponse {
        total_users: users.len(),
        users,
    }))
}
