mod auth;
mod health;
mod users;
mod util;

pub use auth::{login, profile, refresh};
pub use health::{health_check, metrics_snapshot};
pub use users::{create_user, delete_user, get_user, update_user};
