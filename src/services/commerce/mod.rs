//! Cart to order pipeline: variant keys, carts, checkout and payment commit.
pub mod cart_service;
pub mod cart_store;
pub mod checkout_service;
pub mod payment_commit;
pub mod variant_key;

pub use cart_service::{Cart, CartLine, CartService, RawCartLine};
pub use cart_store::{CartStore, FileCartStore, MemoryCartStore};
pub use checkout_service::{CheckoutRedirect, CheckoutRequest, CheckoutService, DeliveryDetails};
pub use payment_commit::{CommitOutcome, PaymentCommitService};
pub use variant_key::{derive_key, VariantKey};
