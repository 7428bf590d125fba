pub mod handlers;
pub mod ip_extractor;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
