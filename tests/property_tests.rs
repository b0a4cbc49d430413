//! Property-based tests for cart identity and merging.

use bakery_orders::services::commerce::{derive_key, Cart, CartLine, VariantKey};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn selection_strategy() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![Just(None), Just(Some(0)), (1i64..5).prop_map(Some)]
}

fn message_strategy() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some(String::new())),
        "[ ]{0,2}(feliz|FELIZ|Feliz) cumple[ ]{0,2}".prop_map(Some),
        "[a-z]{1,8}".prop_map(Some),
    ]
}

prop_compose! {
    fn line_strategy()(
        product_id in 1i64..4,
        quantity in 1i32..20,
        price in 100i64..10_000,
        topping in selection_strategy(),
        filling in selection_strategy(),
        message in message_strategy(),
    ) -> CartLine {
        CartLine::new(product_id, quantity, Decimal::from(price), topping, filling, message)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn keys_are_stable_through_text(line in line_strategy()) {
        let parsed: VariantKey = line.variant_key.as_str().parse().unwrap();
        prop_assert_eq!(parsed, line.variant_key.clone());
    }

    #[test]
    fn equal_keys_mean_equal_configurations(a in line_strategy(), b in line_strategy()) {
        let same_config = a.product_id == b.product_id
            && a.topping_id == b.topping_id
            && a.filling_id == b.filling_id
            && a.custom_message.as_deref().map(|m| m.to_lowercase())
                == b.custom_message.as_deref().map(|m| m.to_lowercase());
        prop_assert_eq!(a.variant_key == b.variant_key, same_config);
    }

    #[test]
    fn merging_preserves_quantity_and_keeps_keys_unique(
        lines in prop::collection::vec(line_strategy(), 0..25)
    ) {
        let expected: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let cart = lines
            .into_iter()
            .fold(Cart::default(), |cart, line| cart.merge_line(line));

        let merged: i64 = cart.lines.iter().map(|l| i64::from(l.quantity)).sum();
        prop_assert_eq!(merged, expected);

        let mut keys: Vec<_> = cart.lines.iter().map(|l| l.variant_key.clone()).collect();
        keys.sort();
        keys.dedup();
        prop_assert_eq!(keys.len(), cart.lines.len());
    }

    #[test]
    fn normalizing_twice_changes_nothing(lines in prop::collection::vec(line_strategy(), 0..25)) {
        let once = Cart { lines }.normalize_legacy();
        let twice = once.clone().normalize_legacy();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn quantity_never_drops_below_one(line in line_strategy(), quantity in -50i32..50) {
        let key = line.variant_key.clone();
        let cart = Cart::default().merge_line(line).set_quantity(&key, quantity);
        prop_assert_eq!(cart.get(&key).unwrap().quantity, quantity.max(1));
    }
}

#[test]
fn absent_and_zero_selections_share_a_key() {
    assert_eq!(
        derive_key(7, None, Some(0), Some("")),
        derive_key(7, Some(0), None, None)
    );
}
