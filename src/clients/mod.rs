pub mod pangram;
pub mod resend;
pub mod stripe;
