use axum::Router;

pub mod materials;
pub mod orders;
pub mod products;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/materials", materials::router())
        .nest("/products", products::router())
        .nest("/orders", orders::router())
}
