pub mod order;
pub mod order_item;
pub mod order_receipt;

pub use order::OrderStatus;
