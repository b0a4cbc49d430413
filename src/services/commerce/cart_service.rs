use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::cart_store::CartStore;
use super::variant_key::{derive_key, normalize_selection, VariantKey};
use crate::{errors::ServiceError, services::catalog::CatalogService};

/// One purchasable configuration and how many of it the shopper wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topping_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filling_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_message: Option<String>,
    #[schema(value_type = String)]
    pub variant_key: VariantKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topping_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filling_name: Option<String>,
}

impl CartLine {
    pub fn new(
        product_id: i64,
        quantity: i32,
        unit_price: Decimal,
        topping_id: Option<i64>,
        filling_id: Option<i64>,
        custom_message: Option<String>,
    ) -> Self {
        let custom_message = custom_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        Self {
            product_id,
            quantity,
            unit_price,
            topping_id: normalize_selection(topping_id),
            filling_id: normalize_selection(filling_id),
            variant_key: derive_key(
                product_id,
                topping_id,
                filling_id,
                custom_message.as_deref(),
            ),
            custom_message,
            product_name: None,
            product_image: None,
            topping_name: None,
            filling_name: None,
        }
    }

    /// Recomputes the key from the line's own fields, discarding whatever was stored.
    pub fn rekeyed(mut self) -> Self {
        self.topping_id = normalize_selection(self.topping_id);
        self.filling_id = normalize_selection(self.filling_id);
        self.variant_key = derive_key(
            self.product_id,
            self.topping_id,
            self.filling_id,
            self.custom_message.as_deref(),
        );
        self
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    fn backfill_from(&mut self, other: CartLine) {
        fill(&mut self.product_name, other.product_name);
        fill(&mut self.product_image, other.product_image);
        fill(&mut self.topping_name, other.topping_name);
        fill(&mut self.filling_name, other.filling_name);
        fill(&mut self.custom_message, other.custom_message);
    }
}

fn fill(target: &mut Option<String>, source: Option<String>) {
    let missing = target.as_deref().map_or(true, str::is_empty);
    if missing {
        if let Some(value) = source.filter(|v| !v.is_empty()) {
            *target = Some(value);
        }
    }
}

/// Reference to a product nested inside an incoming row (`"producto": {...}`).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProductRef {
    pub id: i64,
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(default, alias = "imagen", alias = "image_url", alias = "imagen_url")]
    pub image: Option<String>,
    #[serde(default, alias = "precio")]
    pub price: Option<Decimal>,
}

/// A cart row as it arrives from clients or older stored carts.
///
/// Depending on where the row came from, the product reference appears as
/// `product_id`, `productId`, `id_producto`, a nested `producto` object, or
/// (for carts saved before variant keys existed) the row's own `id`.
/// [`RawCartLine::normalize`] resolves these into a single [`CartLine`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RawCartLine {
    #[serde(default, alias = "productId", alias = "id_producto", alias = "producto_id")]
    pub product_id: Option<i64>,
    #[serde(default, alias = "product")]
    pub producto: Option<ProductRef>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, alias = "cantidad")]
    pub quantity: Option<i32>,
    #[serde(default, alias = "unitPrice", alias = "precio", alias = "price")]
    pub unit_price: Option<Decimal>,
    #[serde(default, alias = "toppingId", alias = "id_topping")]
    pub topping_id: Option<i64>,
    #[serde(default, alias = "fillingId", alias = "id_relleno", alias = "relleno_id")]
    pub filling_id: Option<i64>,
    #[serde(default, alias = "customMessage", alias = "mensaje")]
    pub custom_message: Option<String>,
    #[serde(default, alias = "productName", alias = "nombre")]
    pub product_name: Option<String>,
    #[serde(default, alias = "productImage", alias = "imagen")]
    pub product_image: Option<String>,
    #[serde(default, alias = "toppingName")]
    pub topping_name: Option<String>,
    #[serde(default, alias = "fillingName")]
    pub filling_name: Option<String>,
}

impl RawCartLine {
    pub fn resolve_product_id(&self) -> Option<i64> {
        self.product_id
            .or_else(|| self.producto.as_ref().map(|p| p.id))
            .or(self.id)
    }

    pub fn normalize(self) -> Result<CartLine, ServiceError> {
        let product_id = self.resolve_product_id().ok_or_else(|| {
            ServiceError::ValidationError("cart line has no product reference".to_string())
        })?;

        let quantity = self.quantity.unwrap_or(1);
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "quantity for product {} must be at least 1",
                product_id
            )));
        }

        let (ref_name, ref_image, ref_price) = match self.producto {
            Some(p) => (p.name, p.image, p.price),
            None => (None, None, None),
        };

        let unit_price = self.unit_price.or(ref_price).ok_or_else(|| {
            ServiceError::ValidationError(format!("cart line for product {} has no price", product_id))
        })?;
        if unit_price.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "price for product {} cannot be negative",
                product_id
            )));
        }

        let mut line = CartLine::new(
            product_id,
            quantity,
            unit_price,
            self.topping_id,
            self.filling_id,
            self.custom_message,
        );
        line.product_name = self.product_name.or(ref_name);
        line.product_image = self.product_image.or(ref_image);
        line.topping_name = self.topping_name;
        line.filling_name = self.filling_name;
        Ok(line)
    }
}

/// The client-held cart: an ordered list with at most one line per variant key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, key: &VariantKey) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.variant_key == key)
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Adds `incoming`, summing into an existing line with the same key.
    ///
    /// Descriptive fields already on the existing line win; missing ones are
    /// taken from `incoming`.
    pub fn merge_line(mut self, incoming: CartLine) -> Self {
        let incoming = incoming.rekeyed();
        match self
            .lines
            .iter_mut()
            .find(|l| l.variant_key == incoming.variant_key)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(incoming.quantity);
                existing.backfill_from(incoming);
            }
            None => self.lines.push(incoming),
        }
        self
    }

    /// Sets the quantity of one line, never below 1. Unknown keys leave the cart as is.
    pub fn set_quantity(mut self, key: &VariantKey, quantity: i32) -> Self {
        if let Some(line) = self.lines.iter_mut().find(|l| &l.variant_key == key) {
            line.quantity = quantity.max(1);
        }
        self
    }

    pub fn remove_line(mut self, key: &VariantKey) -> Self {
        self.lines.retain(|l| &l.variant_key != key);
        self
    }

    /// Re-keys every line and merges duplicates, keeping first-seen order.
    pub fn normalize_legacy(self) -> Self {
        self.lines
            .into_iter()
            .fold(Cart::default(), |cart, line| cart.merge_line(line))
    }

    /// Reads a stored blob row by row. A row of the wrong shape costs only
    /// that row; a blob that is not a list yields `None`.
    pub fn from_stored(blob: &Value) -> Option<Self> {
        let Value::Array(rows) = blob else {
            return None;
        };
        let rows = rows
            .iter()
            .filter_map(|row| match serde_json::from_value::<RawCartLine>(row.clone()) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    warn!("Dropping malformed stored cart row: {}", e);
                    None
                }
            })
            .collect();
        Some(Self::from_raw(rows))
    }

    /// Builds a cart from stored rows of any vintage. Rows that cannot be
    /// resolved to a product and price are dropped.
    pub fn from_raw(rows: Vec<RawCartLine>) -> Self {
        let lines = rows
            .into_iter()
            .filter_map(|row| match row.normalize() {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("Dropping unreadable stored cart line: {}", e);
                    None
                }
            })
            .collect();
        Cart { lines }.normalize_legacy()
    }
}

/// Loads, mutates and persists carts held under a client key.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CartStore>,
    catalog: CatalogService,
}

impl CartService {
    pub fn new(store: Arc<dyn CartStore>, catalog: CatalogService) -> Self {
        Self { store, catalog }
    }

    /// Returns the normalized cart, writing it back if normalization changed it.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_key: &str) -> Result<Cart, ServiceError> {
        let Some(blob) = self.store.load(cart_key).await? else {
            return Ok(Cart::default());
        };

        let Some(cart) = Cart::from_stored(&blob) else {
            // not ours to repair; the next mutation replaces it
            warn!(cart_key, "Stored cart is not a list of lines, leaving it untouched");
            return Ok(Cart::default());
        };

        let normalized = serde_json::to_value(&cart)?;
        if normalized != blob {
            info!(cart_key, lines = cart.lines.len(), "Repaired stored cart");
            self.store.save(cart_key, &normalized).await?;
        }
        Ok(cart)
    }

    #[instrument(skip(self, incoming))]
    pub async fn add_line(
        &self,
        cart_key: &str,
        incoming: RawCartLine,
    ) -> Result<Cart, ServiceError> {
        let mut line = incoming.normalize()?;
        self.describe(&mut line).await?;

        let cart = self.get_cart(cart_key).await?.merge_line(line);
        self.persist(cart_key, &cart).await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        cart_key: &str,
        variant_key: &VariantKey,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        let cart = self.get_cart(cart_key).await?;
        if cart.get(variant_key).is_none() {
            return Err(ServiceError::NotFound(format!(
                "Cart line {} not found",
                variant_key
            )));
        }
        let cart = cart.set_quantity(variant_key, quantity);
        self.persist(cart_key, &cart).await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn remove_line(
        &self,
        cart_key: &str,
        variant_key: &VariantKey,
    ) -> Result<Cart, ServiceError> {
        let cart = self.get_cart(cart_key).await?.remove_line(variant_key);
        self.persist(cart_key, &cart).await?;
        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, cart_key: &str) -> Result<(), ServiceError> {
        self.store.clear(cart_key).await?;
        info!(cart_key, "Cart cleared");
        Ok(())
    }

    async fn persist(&self, cart_key: &str, cart: &Cart) -> Result<(), ServiceError> {
        let blob = serde_json::to_value(cart)?;
        self.store.save(cart_key, &blob).await?;
        Ok(())
    }

    /// Fills names and image the client did not send.
    async fn describe(&self, line: &mut CartLine) -> Result<(), ServiceError> {
        if line.product_name.is_none() || line.product_image.is_none() {
            if let Some(product) = self.catalog.product(line.product_id).await? {
                fill(&mut line.product_name, Some(product.name));
                fill(&mut line.product_image, product.image_url);
            }
        }
        if let Some(id) = line.topping_id.filter(|_| line.topping_name.is_none()) {
            line.topping_name = self.catalog.topping_name(id).await?;
        }
        if let Some(id) = line.filling_id.filter(|_| line.filling_name.is_none()) {
            line.filling_name = self.catalog.filling_name(id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(product_id: i64, qty: i32, topping: Option<i64>) -> CartLine {
        CartLine::new(product_id, qty, dec!(2500), topping, None, None)
    }

    #[test]
    fn merging_same_configuration_sums_quantity() {
        let cart = Cart::default()
            .merge_line(line(1, 2, None))
            .merge_line(line(1, 3, Some(0)));
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 5);
    }

    #[test]
    fn merge_backfills_missing_descriptions_without_overwriting() {
        let mut first = line(1, 1, Some(4));
        first.product_name = Some("Torta Selva Negra".into());
        let mut second = line(1, 1, Some(4));
        second.product_name = Some("Renamed".into());
        second.topping_name = Some("Chocolate".into());

        let cart = Cart::default().merge_line(first).merge_line(second);
        let merged = &cart.lines[0];
        assert_eq!(merged.product_name.as_deref(), Some("Torta Selva Negra"));
        assert_eq!(merged.topping_name.as_deref(), Some("Chocolate"));
    }

    #[test]
    fn set_quantity_floors_at_one() {
        let l = line(1, 3, None);
        let key = l.variant_key.clone();
        let cart = Cart::default().merge_line(l).set_quantity(&key, 0);
        assert_eq!(cart.lines[0].quantity, 1);
        let cart = cart.set_quantity(&key, -4);
        assert_eq!(cart.lines[0].quantity, 1);
        let cart = cart.set_quantity(&key, 6);
        assert_eq!(cart.lines[0].quantity, 6);
    }

    #[test]
    fn remove_only_touches_exact_key() {
        let plain = line(1, 1, None);
        let with_topping = line(1, 1, Some(2));
        let key = with_topping.variant_key.clone();
        let cart = Cart::default()
            .merge_line(plain.clone())
            .merge_line(with_topping)
            .remove_line(&key);
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].variant_key, plain.variant_key);
    }

    #[test]
    fn legacy_rows_reconcile_with_keyed_rows() {
        let rows: Vec<RawCartLine> = serde_json::from_value(json!([
            // saved before variant keys: product id under `id`, no key
            {"id": 3, "cantidad": 1, "precio": 1200, "nombre": "Alfajor", "imagen": "alfajor.jpg"},
            {"product_id": 3, "quantity": 2, "unit_price": "1200",
             "variant_key": "3|topping:0|filling:0|message:"},
            {"producto": {"id": 4, "nombre": "Kuchen", "precio": 5000}, "quantity": 1},
            {"quantity": 1, "unit_price": 100}
        ]))
        .unwrap();

        let cart = Cart::from_raw(rows);
        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].product_id, 3);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.lines[0].product_name.as_deref(), Some("Alfajor"));
        assert_eq!(cart.lines[0].product_image.as_deref(), Some("alfajor.jpg"));
        assert_eq!(cart.lines[1].product_name.as_deref(), Some("Kuchen"));
        assert_eq!(cart.subtotal(), dec!(8600));
    }

    #[test]
    fn one_malformed_stored_row_costs_only_that_row() {
        let blob = json!([
            {"product_id": 1, "quantity": 2, "unit_price": 100},
            {"product_id": 2, "quantity": "3", "unit_price": 100}
        ]);
        let cart = Cart::from_stored(&blob).unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].product_id, 1);
        assert_eq!(cart.lines[0].quantity, 2);

        assert!(Cart::from_stored(&json!({"lines": []})).is_none());
    }

    #[tokio::test]
    async fn get_cart_never_wipes_a_stored_cart() {
        use crate::services::commerce::cart_store::MemoryCartStore;
        use sea_orm::DatabaseConnection;

        let store = Arc::new(MemoryCartStore::new());
        let service = CartService::new(
            store.clone(),
            CatalogService::new(Arc::new(DatabaseConnection::Disconnected)),
        );

        let mixed = json!([
            {"product_id": 1, "quantity": 2, "unit_price": 100},
            {"product_id": 2, "quantity": "3", "unit_price": 100}
        ]);
        store.save("device-a", &mixed).await.unwrap();
        let cart = service.get_cart("device-a").await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        let stored = store.load("device-a").await.unwrap().unwrap();
        assert_eq!(stored.as_array().unwrap().len(), 1);
        assert_eq!(stored[0]["product_id"], 1);

        let foreign = json!({"version": 2, "items": [1, 2]});
        store.save("device-b", &foreign).await.unwrap();
        let cart = service.get_cart("device-b").await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(store.load("device-b").await.unwrap(), Some(foreign));
    }

    #[test]
    fn normalize_legacy_is_idempotent() {
        let mut stale = line(2, 1, None);
        stale.variant_key = serde_json::from_value(json!("2|old-format")).unwrap();
        let cart = Cart {
            lines: vec![stale, line(2, 4, Some(0))],
        };
        let once = cart.normalize_legacy();
        let twice = once.clone().normalize_legacy();
        assert_eq!(once, twice);
        assert_eq!(once.lines.len(), 1);
        assert_eq!(once.lines[0].quantity, 5);
    }

    #[test]
    fn rows_without_product_reference_are_validation_errors() {
        let err = RawCartLine {
            quantity: Some(1),
            unit_price: Some(dec!(10)),
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        let err = RawCartLine {
            product_id: Some(1),
            quantity: Some(0),
            unit_price: Some(dec!(10)),
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
