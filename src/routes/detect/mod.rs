mod handler;
pub mod model;

pub use handler::detect;
pub use model::Plan;
