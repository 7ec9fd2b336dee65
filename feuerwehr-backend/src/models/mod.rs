pub mod session;

pub use session::{Session, ADMIN_ROLE};
