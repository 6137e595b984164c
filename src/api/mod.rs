use rocket::Route;

pub mod analytics;
pub mod auth;
pub(crate) mod common;
pub mod elections;
pub mod management;
pub mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(elections::routes());
    routes.extend(voting::routes());
    routes.extend(management::routes());
    routes.extend(analytics::routes());
    routes
}
