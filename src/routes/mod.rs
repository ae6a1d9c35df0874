pub mod billing;
pub mod cron;
pub mod demo;
pub mod detect;
pub mod email;
