pub use super::generation::Entity as Generation;
pub use super::user::Entity as User;
