mod handler;
pub mod model;

pub use handler::send_lifecycle_emails;
