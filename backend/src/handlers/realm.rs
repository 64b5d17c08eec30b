use axum::{extract::Extension, Json};

use crate::{models::realm::RealmResponse, services::auth::AuthContext};

pub async fn get_realm(Extension(ctx): Extension<AuthContext>) -> Json<RealmResponse> {
    Json(ctx.realm.into())
}
