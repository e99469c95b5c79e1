//! Adapters for the domain ports.

mod ids;
mod password;
mod user_repository;

pub use ids::UuidV4Generator;
pub use password::Argon2PasswordHasher;
pub use user_repository::InMemoryUserRepository;
