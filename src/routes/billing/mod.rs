mod handler;
pub mod model;

pub use handler::{checkout, stripe_webhook};
