pub mod health;
pub mod interception;
