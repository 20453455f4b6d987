//! Member API endpoints.

use axum::extract::{Path, State};

use super::{success, ApiResult, AppJson, AppQuery};
use crate::errors::AppError;
use crate::models::{CreateMemberRequest, Member, MemberListQuery, UpdateMemberRequest};
use crate::AppState;

/// GET /api/members - List members, optionally filtered by `?ministry=`.
pub async fn list_members(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<MemberListQuery>,
) -> ApiResult<Vec<Member>> {
    let ministry = query.ministry.as_deref().filter(|m| !m.trim().is_empty());
    success(state.repo.list_members(ministry).await?)
}

/// GET /api/members/:id - Get a single member.
pub async fn get_member(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Member> {
    match state.repo.get_member(&id).await? {
        Some(member) => success(member),
        None => Err(AppError::NotFound(format!("Member {} not found", id))),
    }
}

/// POST /api/members - Create a new member.
pub async fn create_member(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateMemberRequest>,
) -> ApiResult<Member> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let member = state.repo.create_member(&request).await?;
    tracing::info!(member_id = %member.id, "Member created");
    success(member)
}

/// PUT /api/members/:id - Update a member.
pub async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AppJson(request): AppJson<UpdateMemberRequest>,
) -> ApiResult<Member> {
    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }

    success(state.repo.update_member(&id, &request).await?)
}

/// DELETE /api/members/:id - Delete a member.
pub async fn delete_member(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<()> {
    state.repo.delete_member(&id).await?;
    tracing::info!(member_id = %id, "Member deleted");
    success(())
}
