use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::rider::Rider;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub country: String,
    pub zip_code: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchaser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PaymentInfo {
    pub id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum OrderStatus {
    #[default]
    Processing,
    Shipping,
    OnTheWay,
    Delivered,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub cart: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    pub user: Purchaser,
    pub total_price: f64,
    pub status: OrderStatus,
    #[serde(default)]
    pub payment_info: PaymentInfo,
    pub paid_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Snapshot of the rider taken at assignment time; `None` when no rider
    /// was available. Only the propagator rewrites it afterwards.
    pub rider: Option<Rider>,
}

/// Checkout payload handed over by the order-creation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub cart: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
    pub user: Purchaser,
    pub total_price: f64,
    #[serde(default)]
    pub payment_info: PaymentInfo,
}

impl Order {
    pub fn from_checkout(new_order: NewOrder) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            cart: new_order.cart,
            shipping_address: new_order.shipping_address,
            user: new_order.user,
            total_price: new_order.total_price,
            status: OrderStatus::Processing,
            payment_info: new_order.payment_info,
            paid_at: now,
            delivered_at: None,
            created_at: now,
            rider: None,
        }
    }

    pub fn rider_id(&self) -> Option<Uuid> {
        self.rider.as_ref().map(|rider| rider.id)
    }
}
