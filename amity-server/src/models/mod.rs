//! Domain models with validation at construction
//!
//! All user input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod validation;
pub mod account;
pub mod profile;
pub mod message;
pub mod pagination;

pub use validation::ValidationError;
pub use account::{Email, Password, Username};
pub use profile::{age_on, Bio, BirthDate, DisplayName, Gender, Interests, ZipCode};
pub use message::MessageContent;
pub use pagination::{Pagination, Paginated, PaginationParams};
