pub mod order;
pub mod user;
pub mod wallet;
