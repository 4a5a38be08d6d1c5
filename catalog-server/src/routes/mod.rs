//! HTTP route handlers (§6).

pub mod assets;
pub mod tags;

use axum::routing::{delete, get, head, post, put};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/api/assets", get(assets::list_assets))
		.route("/api/assets", post(assets::upload_asset))
		.route("/api/assets/seed", post(assets::seed))
		.route("/api/assets/from-hash", post(assets::register_from_hash))
		.route("/api/assets/hash/:hash", head(assets::head_by_hash))
		.route("/api/assets/:id", get(assets::get_asset))
		.route("/api/assets/:id", put(assets::update_asset))
		.route("/api/assets/:id", delete(assets::delete_asset))
		.route("/api/assets/:id/content", get(assets::get_content))
		.route("/api/assets/:id/tags", post(assets::add_tags))
		.route("/api/assets/:id/tags", delete(assets::remove_tags))
		.route("/api/tags", get(tags::list_tags))
		.with_state(state)
}
