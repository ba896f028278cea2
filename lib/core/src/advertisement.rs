use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{GeoPoint, Geometry};
use crate::vector::Vector;
use crate::{Error, Result};

/// Identity of an advertisement, assigned by the catalog on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdId(pub u64);

/// Identity of a geo-zone row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u64);

/// Opaque requester identity. Integer ids are keyed by their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl std::fmt::Display for AdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AdId {
    fn from(id: u64) -> Self {
        AdId(id)
    }
}

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into().trim().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        UserId::new(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId::new(s)
    }
}

impl From<u64> for UserId {
    fn from(i: u64) -> Self {
        UserId(i.to_string())
    }
}

// JSON clients send either `"1534556"` or `1534556`; binary formats always carry the string.
impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawUserId {
            Integer(u64),
            String(String),
        }

        if deserializer.is_human_readable() {
            Ok(match RawUserId::deserialize(deserializer)? {
                RawUserId::Integer(i) => UserId::from(i),
                RawUserId::String(s) => UserId::new(s),
            })
        } else {
            String::deserialize(deserializer).map(UserId)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub enabled: bool,
    pub link: Option<String>,
}

/// An advertiser campaign as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: AdId,
    pub campaign_name: String,
    pub campaign_details: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    /// Total campaign budget
    pub budget_amount: f64,
    /// Amount offered per auction
    pub bid_amount: f64,
    pub conversion: Conversion,
    pub positive_keywords: String,
    pub negative_keywords: String,
    /// Targeting embedding
    pub embedding: Vector,
    pub asset_type: String,
    pub asset_name: String,
}

/// Advertisement fields supplied by the advertiser, before an id is assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAdvertisement {
    #[serde(default)]
    pub campaign_name: String,
    #[serde(default)]
    pub campaign_details: String,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub budget_amount: f64,
    pub bid_amount: f64,
    #[serde(default)]
    pub conversion: Conversion,
    #[serde(default)]
    pub positive_keywords: String,
    #[serde(default)]
    pub negative_keywords: String,
    pub embedding: Vector,
    #[serde(default)]
    pub asset_type: String,
    #[serde(default)]
    pub asset_name: String,
}

impl NewAdvertisement {
    /// Minimal campaign: a bid and a targeting embedding
    pub fn new(bid_amount: f64, embedding: Vector) -> Self {
        Self {
            campaign_name: String::new(),
            campaign_details: String::new(),
            start_at: None,
            end_at: None,
            budget_amount: 0.0,
            bid_amount,
            conversion: Conversion::default(),
            positive_keywords: String::new(),
            negative_keywords: String::new(),
            embedding,
            asset_type: String::new(),
            asset_name: String::new(),
        }
    }

    #[must_use]
    pub fn with_campaign_name(mut self, name: impl Into<String>) -> Self {
        self.campaign_name = name.into();
        self
    }

    #[must_use]
    pub fn with_keywords(mut self, positive: impl Into<String>, negative: impl Into<String>) -> Self {
        self.positive_keywords = positive.into();
        self.negative_keywords = negative.into();
        self
    }

    #[must_use]
    pub fn with_active_window(
        mut self,
        start_at: Option<DateTime<Utc>>,
        end_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_at = start_at;
        self.end_at = end_at;
        self
    }

    pub fn validate(&self, embedding_dim: usize) -> Result<()> {
        self.embedding.validate(embedding_dim)?;
        if !self.bid_amount.is_finite() || self.bid_amount < 0.0 {
            return Err(Error::InvalidInput(format!(
                "bid amount must be a non-negative number, got {}",
                self.bid_amount
            )));
        }
        if !self.budget_amount.is_finite() || self.budget_amount < 0.0 {
            return Err(Error::InvalidInput(format!(
                "budget amount must be a non-negative number, got {}",
                self.budget_amount
            )));
        }
        if let (Some(start), Some(end)) = (self.start_at, self.end_at) {
            if end < start {
                return Err(Error::InvalidInput(
                    "campaign ends before it starts".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn into_advertisement(self, id: AdId) -> Advertisement {
        Advertisement {
            id,
            campaign_name: self.campaign_name,
            campaign_details: self.campaign_details,
            start_at: self.start_at,
            end_at: self.end_at,
            budget_amount: self.budget_amount,
            bid_amount: self.bid_amount,
            conversion: self.conversion,
            positive_keywords: self.positive_keywords,
            negative_keywords: self.negative_keywords,
            embedding: self.embedding,
            asset_type: self.asset_type,
            asset_name: self.asset_name,
        }
    }
}

impl Advertisement {
    /// Whether `at` falls inside the campaign's active window (open ends allowed)
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start_at.map_or(true, |start| start <= at) && self.end_at.map_or(true, |end| at <= end)
    }
}

/// Zone fields supplied on creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGeoZone {
    #[serde(default)]
    pub place_name: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub radius_meters: Option<f64>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

impl NewGeoZone {
    pub fn circle(place_name: impl Into<String>, center: GeoPoint, radius_meters: f64) -> Self {
        Self {
            place_name: place_name.into(),
            latitude: Some(center.latitude),
            longitude: Some(center.longitude),
            radius_meters: Some(radius_meters),
            geometry: None,
        }
    }

    pub fn geometry(place_name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            place_name: place_name.into(),
            latitude: None,
            longitude: None,
            radius_meters: None,
            geometry: Some(geometry),
        }
    }

    /// The region this zone covers: explicit geometry first, else center plus radius
    pub fn region(&self) -> Result<Geometry> {
        let region = match (&self.geometry, self.latitude, self.longitude, self.radius_meters) {
            (Some(geometry), _, _, _) => geometry.clone(),
            (None, Some(latitude), Some(longitude), Some(radius_meters)) => Geometry::Circle {
                center: GeoPoint::new(latitude, longitude),
                radius_meters,
            },
            _ => {
                return Err(Error::InvalidInput(
                    "zone needs a geometry or latitude, longitude and radius".to_string(),
                ))
            }
        };
        region.validate()?;
        Ok(region)
    }

    pub fn into_zone(self, id: ZoneId, ad_id: AdId) -> Result<AdGeoZone> {
        let region = self.region()?;
        Ok(AdGeoZone {
            id,
            ad_id,
            place_name: self.place_name,
            latitude: self.latitude,
            longitude: self.longitude,
            radius_meters: self.radius_meters,
            geometry: self.geometry,
            region,
        })
    }
}

/// One eligible service area of an advertisement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdGeoZone {
    pub id: ZoneId,
    pub ad_id: AdId,
    pub place_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_meters: Option<f64>,
    pub geometry: Option<Geometry>,
    /// Resolved containment region
    region: Geometry,
}

impl AdGeoZone {
    #[inline]
    pub fn region(&self) -> &Geometry {
        &self.region
    }

    #[inline]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.region.contains(point)
    }
}

/// Cached interest embedding for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferenceEmbedding {
    pub user_id: UserId,
    #[serde(default)]
    pub keywords: String,
    pub embedding: Vector,
}
