mod middleware;
mod routes;
mod server;
mod state;

pub use middleware::validate_bearer;
pub use server::{router, GatewayServer};
pub use state::AppState;
