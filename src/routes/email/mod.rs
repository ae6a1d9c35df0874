mod handler;
mod model;

pub use handler::send_welcome;
