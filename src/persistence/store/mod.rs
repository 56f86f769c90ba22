pub mod order_store;

pub use order_store::{Listing, OrderStore};
