pub mod customer;
pub mod filling;
pub mod order;
pub mod order_line;
pub mod pending_cart;
pub mod product;
pub mod push_destination;
pub mod topping;
