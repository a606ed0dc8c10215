pub mod api;

pub use api::{api_routes, state::ApiState};
