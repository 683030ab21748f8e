pub mod email;
pub mod policy;
pub mod user;
