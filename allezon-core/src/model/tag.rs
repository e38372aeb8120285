//! User tags: the immutable events accepted on ingress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use allezon_log::Partitionable;

string_enum! {
    /// What the user did with the product.
    pub enum Action as "action" {
        View => "VIEW",
        Buy => "BUY",
    }
}

string_enum! {
    /// Device class the event was recorded on.
    pub enum Device as "device" {
        Pc => "PC",
        Mobile => "MOBILE",
        Tv => "TV",
    }
}

/// Product the event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: u64,
    pub brand_id: String,
    pub category_id: String,
    pub price: i32,
}

/// A single user event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTag {
    #[serde(with = "tag_time")]
    pub time: DateTime<Utc>,
    pub cookie: String,
    pub country: String,
    pub device: Device,
    pub action: Action,
    pub origin: String,
    #[serde(rename = "product_info")]
    pub product: Product,
}

impl UserTag {
    /// Decode a tag from its JSON body.
    pub fn from_json(bytes: &[u8]) -> Result<Self, crate::error::ValidationError> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::ValidationError::MalformedTag(e.to_string()))
    }
}

impl Partitionable for UserTag {
    fn partition_key(&self) -> Option<&str> {
        Some(&self.cookie)
    }
}

/// Tag timestamps: `YYYY-MM-DDTHH:MM:SS[.fff]Z` in, millisecond precision out.
mod tag_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::model::time::{TAG_TIME_OUTPUT, parse_datetime_with_zone};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&time.format(TAG_TIME_OUTPUT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse_datetime_with_zone(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A VIEW tag at the given second past 2024-01-01T00:00:00Z.
    pub fn tag_at(cookie: &str, second: i64) -> UserTag {
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(second);
        UserTag {
            time,
            cookie: cookie.to_string(),
            country: "PL".to_string(),
            device: Device::Pc,
            action: Action::View,
            origin: "shop1".to_string(),
            product: Product {
                product_id: 42,
                brand_id: "b1".to_string(),
                category_id: "c1".to_string(),
                price: 100,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::TimeZone;

    const BODY: &str = r#"{
        "time": "2024-01-01T00:00:30.123Z",
        "cookie": "abc",
        "country": "PL",
        "device": "MOBILE",
        "action": "BUY",
        "origin": "shop1",
        "product_info": {
            "product_id": 7,
            "brand_id": "b1",
            "category_id": "c1",
            "price": 250
        }
    }"#;

    #[test]
    fn action_parses_canonical_strings() {
        assert_eq!(Action::parse("VIEW").unwrap(), Action::View);
        assert_eq!("BUY".parse::<Action>().unwrap(), Action::Buy);
        assert_eq!(Action::Buy.as_str(), "BUY");
    }

    #[test]
    fn action_rejects_unknown_string() {
        let err = Action::parse("view").unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidEnum {
                kind: "action",
                value: "view".to_string()
            }
        );
    }

    #[test]
    fn device_strings_cover_every_variant() {
        for device in Device::ALL {
            assert_eq!(Device::parse(device.as_str()).unwrap(), *device);
        }
        assert!(Device::parse("TABLET").is_err());
    }

    #[test]
    fn decodes_tag_body() {
        let tag = UserTag::from_json(BODY.as_bytes()).unwrap();

        assert_eq!(tag.cookie, "abc");
        assert_eq!(tag.device, Device::Mobile);
        assert_eq!(tag.action, Action::Buy);
        assert_eq!(tag.product.price, 250);
        assert_eq!(
            tag.time,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap()
                + chrono::Duration::milliseconds(123)
        );
    }

    #[test]
    fn accepts_second_precision_time() {
        let body = BODY.replace("2024-01-01T00:00:30.123Z", "2024-01-01T00:00:30Z");
        let tag = UserTag::from_json(body.as_bytes()).unwrap();
        assert_eq!(tag.time, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap());
    }

    #[test]
    fn rejects_unknown_device() {
        let body = BODY.replace("MOBILE", "WATCH");
        let err = UserTag::from_json(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedTag(msg) if msg.contains("WATCH")));
    }

    #[test]
    fn rejects_time_without_zone() {
        let body = BODY.replace("30.123Z", "30.123");
        assert!(UserTag::from_json(body.as_bytes()).is_err());
    }

    #[test]
    fn serializes_with_millisecond_time_and_product_info() {
        let tag = fixtures::tag_at("abc", 30);
        let json = serde_json::to_value(&tag).unwrap();

        assert_eq!(json["time"], "2024-01-01T00:00:30.000Z");
        assert_eq!(json["action"], "VIEW");
        assert_eq!(json["device"], "PC");
        assert_eq!(json["product_info"]["brand_id"], "b1");
    }

    #[test]
    fn partitions_by_cookie() {
        let tag = fixtures::tag_at("cookie-1", 0);
        assert_eq!(tag.partition_key(), Some("cookie-1"));
    }
}
