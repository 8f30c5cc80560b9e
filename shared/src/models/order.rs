//! Order Model
//!
//! JSON field names follow the public order feed format
//! (`order_uid`, `track_number`, `sm_id`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery address and recipient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

/// Payment details
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    /// delivery_cost + goods_total + custom_fee
    pub amount: f64,
    /// Unix timestamp (seconds)
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: f64,
    pub goods_total: f64,
    pub custom_fee: f64,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    /// Discount percentage (0-100)
    pub sale: i32,
    pub size: String,
    /// price * quantity * (1 - sale / 100)
    pub total_price: f64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

/// Order aggregate (header + delivery + payment + items)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Externally generated, immutable once assigned
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// Order header as persisted (everything except the child records)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderHeader {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

impl Order {
    /// Split the aggregate into its persisted parts
    pub fn header(&self) -> OrderHeader {
        OrderHeader {
            order_uid: self.order_uid.clone(),
            track_number: self.track_number.clone(),
            entry: self.entry.clone(),
            locale: self.locale.clone(),
            internal_signature: self.internal_signature.clone(),
            customer_id: self.customer_id.clone(),
            delivery_service: self.delivery_service.clone(),
            shardkey: self.shardkey.clone(),
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard.clone(),
        }
    }

    /// Reassemble an aggregate from its persisted parts
    pub fn assemble(
        header: OrderHeader,
        delivery: Delivery,
        payment: Payment,
        items: Vec<Item>,
    ) -> Self {
        Self {
            order_uid: header.order_uid,
            track_number: header.track_number,
            entry: header.entry,
            delivery,
            payment,
            items,
            locale: header.locale,
            internal_signature: header.internal_signature,
            customer_id: header.customer_id,
            delivery_service: header.delivery_service,
            shardkey: header.shardkey,
            sm_id: header.sm_id,
            date_created: header.date_created,
            oof_shard: header.oof_shard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Order {
        Order {
            order_uid: "b563feb7b2b84b6test".to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                city: "Kiryat Mozkin".to_string(),
                ..Default::default()
            },
            payment: Payment {
                transaction: "b563feb7b2b84b6test".to_string(),
                currency: "USD".to_string(),
                amount: 1817.0,
                ..Default::default()
            },
            items: vec![Item {
                chrt_id: 9934930,
                price: 453,
                sale: 30,
                total_price: 317.0,
                ..Default::default()
            }],
            locale: "en".to_string(),
            internal_signature: String::new(),
            customer_id: "test".to_string(),
            delivery_service: "meest".to_string(),
            shardkey: "9".to_string(),
            sm_id: 99,
            date_created: DateTime::parse_from_rfc3339("2021-11-26T06:22:19Z")
                .unwrap()
                .with_timezone(&Utc),
            oof_shard: "1".to_string(),
        }
    }

    #[test]
    fn header_and_assemble_are_inverse() {
        let order = sample();
        let rebuilt = Order::assemble(
            order.header(),
            order.delivery.clone(),
            order.payment.clone(),
            order.items.clone(),
        );
        assert_eq!(rebuilt, order);
    }

    #[test]
    fn json_uses_feed_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["order_uid"], "b563feb7b2b84b6test");
        assert_eq!(json["sm_id"], 99);
        assert_eq!(json["items"][0]["chrt_id"], 9934930);
        assert_eq!(json["payment"]["currency"], "USD");
    }
}
