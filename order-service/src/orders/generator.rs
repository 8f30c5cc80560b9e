//! 随机订单生成
//!
//! Used by the "create orders" operation to fill the store with plausible
//! test data. Totals are internally consistent:
//!
//! - `item.total_price = price × quantity × (1 − sale / 100)`
//! - `payment.goods_total = Σ item.total_price`
//! - `payment.amount = delivery_cost + goods_total + custom_fee`

use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use shared::models::{Delivery, Item, Order, Payment};
use uuid::{Builder, Uuid};

/// Items per generated order (inclusive)
pub const MAX_ITEMS_PER_ORDER: usize = 10;
/// Highest discount percentage handed out
const MAX_SALE: i32 = 50;
const MAX_QUANTITY: i64 = 5;

const FIRST_NAMES: &[&str] = &[
    "Ivan", "Maria", "Alexei", "Olga", "Dmitry", "Anna", "Sergei", "Elena", "Pavel", "Irina",
];
const LAST_NAMES: &[&str] = &[
    "Petrov", "Ivanova", "Smirnov", "Kuznetsova", "Popov", "Volkova", "Sokolov", "Lebedeva",
];
const CITIES: &[(&str, &str)] = &[
    ("Moscow", "Moscow"),
    ("Kazan", "Tatarstan"),
    ("Novosibirsk", "Novosibirsk Oblast"),
    ("Yekaterinburg", "Sverdlovsk Oblast"),
    ("Kiryat Mozkin", "Kraiot"),
    ("Saint Petersburg", "Leningrad Oblast"),
];
const STREETS: &[&str] = &[
    "Ploshad Mira",
    "Lenina",
    "Tverskaya",
    "Nevsky Prospekt",
    "Sadovaya",
    "Pushkina",
];
const COMPANIES: &[&str] = &[
    "wbpay", "meest", "cdek", "boxberry", "dpd", "pochta", "alpha", "sber",
];
const BANKS: &[&str] = &["alpha", "sber", "tinkoff", "vtb", "raiffeisen", "gazprom"];
const CURRENCIES: &[&str] = &["RUB", "USD", "EUR", "KZT"];
const LOCALES: &[&str] = &["en", "ru", "de", "kk"];
const PRODUCTS: &[&str] = &[
    "Mascaras",
    "Lipstick",
    "Sneakers",
    "Backpack",
    "Headphones",
    "Teapot",
    "Notebook",
    "Desk Lamp",
    "Umbrella",
    "Wool Scarf",
];
const BRANDS: &[&str] = &[
    "Vivienne Sabo",
    "Nike",
    "Xiaomi",
    "Bork",
    "Moleskine",
    "Ikea",
    "Samsonite",
];
const SIZES: &[&str] = &["0", "XS", "S", "M", "L", "XL"];

/// Build one random order
pub fn random_order<R: Rng + ?Sized>(rng: &mut R) -> Order {
    let order_uid = random_uuid(rng).simple().to_string();
    let track_number = format!("WBIL{:010}", rng.gen_range(0..10_000_000_000u64));
    let item_count = rng.gen_range(1..=MAX_ITEMS_PER_ORDER);

    let items: Vec<Item> = (0..item_count)
        .map(|_| random_item(rng, &track_number))
        .collect();
    let goods_total: f64 = items.iter().map(|item| item.total_price).sum();
    let payment = random_payment(rng, &order_uid, goods_total);

    Order {
        delivery: random_delivery(rng),
        payment,
        items,
        locale: pick(rng, LOCALES).to_string(),
        internal_signature: String::new(),
        customer_id: random_uuid(rng).simple().to_string(),
        delivery_service: pick(rng, COMPANIES).to_string(),
        shardkey: rng.gen_range(0..10).to_string(),
        sm_id: rng.gen_range(1..=100),
        date_created: Utc::now() - Duration::seconds(rng.gen_range(0..86_400 * 30)),
        oof_shard: rng.gen_range(0..3).to_string(),
        entry: "WBIL".to_string(),
        track_number,
        order_uid,
    }
}

fn random_delivery<R: Rng + ?Sized>(rng: &mut R) -> Delivery {
    let first = pick(rng, FIRST_NAMES);
    let last = pick(rng, LAST_NAMES);
    let (city, region) = *CITIES.choose(rng).unwrap_or(&CITIES[0]);

    Delivery {
        name: format!("{first} {last}"),
        phone: format!("+7{:010}", rng.gen_range(0..10_000_000_000u64)),
        zip: format!("{:06}", rng.gen_range(100_000..1_000_000)),
        city: city.to_string(),
        address: format!("{} {}", pick(rng, STREETS), rng.gen_range(1..200)),
        region: region.to_string(),
        email: format!(
            "{}.{}@example.com",
            first.to_lowercase(),
            last.to_lowercase()
        ),
    }
}

fn random_payment<R: Rng + ?Sized>(rng: &mut R, order_uid: &str, goods_total: f64) -> Payment {
    let delivery_cost = random_price(rng);
    let custom_fee = random_price(rng);

    Payment {
        transaction: order_uid.to_string(),
        request_id: random_uuid(rng).simple().to_string(),
        currency: pick(rng, CURRENCIES).to_string(),
        provider: pick(rng, COMPANIES).to_string(),
        amount: delivery_cost + goods_total + custom_fee,
        payment_dt: Utc::now().timestamp() - rng.gen_range(0..86_400 * 30),
        bank: pick(rng, BANKS).to_string(),
        delivery_cost,
        goods_total,
        custom_fee,
    }
}

fn random_item<R: Rng + ?Sized>(rng: &mut R, track_number: &str) -> Item {
    let price: i64 = rng.gen_range(1_000..=10_000);
    let quantity: i64 = rng.gen_range(1..=MAX_QUANTITY);
    let sale: i32 = rng.gen_range(0..=MAX_SALE);

    Item {
        chrt_id: rng.gen_range(1..=10_000_000),
        track_number: track_number.to_string(),
        price,
        rid: random_uuid(rng).simple().to_string(),
        name: pick(rng, PRODUCTS).to_string(),
        sale,
        size: pick(rng, SIZES).to_string(),
        total_price: line_total(price, quantity, sale),
        nm_id: rng.gen_range(10_000..100_000),
        brand: pick(rng, BRANDS).to_string(),
        status: rng.gen_range(200..=202),
    }
}

/// `price × quantity × (1 − sale / 100)`
pub fn line_total(price: i64, quantity: i64, sale: i32) -> f64 {
    (price * quantity) as f64 * (1.0 - f64::from(sale) / 100.0)
}

/// Two-decimal monetary amount in `1.00..=10000.00`
fn random_price<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.gen_range(100..=1_000_000) as f64 / 100.0
}

fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    Builder::from_random_bytes(rng.r#gen()).into_uuid()
}

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, values: &[&'a str]) -> &'a str {
    values.choose(rng).copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(1000, 2, 0), 2000.0);
        assert_eq!(line_total(1000, 2, 50), 1000.0);
        assert_eq!(line_total(453, 1, 30), 453.0 * 0.7);
    }

    #[test]
    fn test_random_order_totals_are_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let order = random_order(&mut rng);

            assert!((1..=MAX_ITEMS_PER_ORDER).contains(&order.items.len()));
            let goods_total: f64 = order.items.iter().map(|i| i.total_price).sum();
            assert!((order.payment.goods_total - goods_total).abs() < 1e-6);

            let expected_amount =
                order.payment.delivery_cost + order.payment.goods_total + order.payment.custom_fee;
            assert!((order.payment.amount - expected_amount).abs() < 1e-6);

            for item in &order.items {
                assert!((0..=MAX_SALE).contains(&item.sale));
                assert_eq!(item.track_number, order.track_number);
            }
        }
    }

    #[test]
    fn test_random_orders_have_distinct_uids() {
        let mut rng = rand::thread_rng();
        let a = random_order(&mut rng);
        let b = random_order(&mut rng);
        assert_ne!(a.order_uid, b.order_uid);
        assert_eq!(a.order_uid.len(), 32);
    }

    #[test]
    fn test_random_order_round_trips_through_json() {
        let order = random_order(&mut StdRng::seed_from_u64(1));
        let json = serde_json::to_string(&order).unwrap();
        let decoded: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.order_uid, order.order_uid);
        assert_eq!(decoded.items.len(), order.items.len());
    }
}
