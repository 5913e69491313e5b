mod api;
mod user;

pub use api::{
    CreateUserRequest, HealthQuery, HealthResponse, LoginRequest, LoginResponse,
    UpdateUserRequest, UserResponse, UserSummary,
};
pub use user::{NewUser, User};
