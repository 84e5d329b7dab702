pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod response;
pub mod routes;

pub use routes::create_router;
