pub mod error;
pub mod order;
pub mod validator;

pub use error::OrderError;
pub use order::{Delivery, Item, Order, Payment};
