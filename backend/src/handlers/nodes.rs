use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppError, models::mesh::MeshNode, services::auth::AuthContext, state::AppState,
};

pub async fn list_nodes(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<MeshNode>>, AppError> {
    Ok(Json(state.nodes.list_nodes(&ctx.realm).await?))
}

pub async fn get_node(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(node_id): Path<String>,
) -> Result<Json<MeshNode>, AppError> {
    Ok(Json(state.nodes.get_node(&ctx.realm, &node_id).await?))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(node_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.nodes.delete_node(&ctx.realm, &node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
