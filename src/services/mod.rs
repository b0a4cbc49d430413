// Catalog lookups
pub mod catalog;

// Cart, checkout and payment commit
pub mod commerce;

// Payment gateway client
pub mod payments;

// Order reads and lifecycle
pub mod order_status;
pub mod orders;
