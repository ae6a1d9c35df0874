mod handler;
pub mod model;

pub use handler::demo_detect;
