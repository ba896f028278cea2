use geoauction_core::{Error, GeoPoint, Result, UserId, Vector};
use serde::{Deserialize, Serialize};

/// How the winner is chosen among ranked candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SelectionMethod {
    /// Highest bid wins, lowest ad id on ties
    #[default]
    HighestBid,
}

impl TryFrom<i64> for SelectionMethod {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(SelectionMethod::HighestBid),
            other => Err(Error::UnsupportedMethod(other)),
        }
    }
}

impl From<SelectionMethod> for i64 {
    fn from(method: SelectionMethod) -> i64 {
        match method {
            SelectionMethod::HighestBid => 0,
        }
    }
}

/// One auction to resolve
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub positive_keywords: String,
    pub negative_keywords: String,
    /// Wire discriminator of the [`SelectionMethod`]
    pub method: i64,
    pub requester_id: UserId,
    /// Overrides every other source of the query embedding
    pub query_embedding: Option<Vector>,
}

impl AuctionRequest {
    pub fn new(requester_id: impl Into<UserId>, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            positive_keywords: String::new(),
            negative_keywords: String::new(),
            method: SelectionMethod::HighestBid.into(),
            requester_id: requester_id.into(),
            query_embedding: None,
        }
    }

    #[must_use]
    pub fn with_keywords(mut self, positive: impl Into<String>, negative: impl Into<String>) -> Self {
        self.positive_keywords = positive.into();
        self.negative_keywords = negative.into();
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: i64) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_query_embedding(mut self, embedding: Vector) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    #[inline]
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    #[inline]
    pub fn selection_method(&self) -> Result<SelectionMethod> {
        SelectionMethod::try_from(self.method)
    }

    /// Reject malformed input before any storage call is made
    pub fn validate(&self, embedding_dim: usize) -> Result<()> {
        self.point().validate()?;
        if self.requester_id.is_empty() {
            return Err(Error::InvalidInput("requester id must not be empty".to_string()));
        }
        self.selection_method()?;
        if let Some(embedding) = &self.query_embedding {
            embedding.validate(embedding_dim)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_wire_values() {
        assert_eq!(SelectionMethod::try_from(0).unwrap(), SelectionMethod::HighestBid);
        assert!(matches!(SelectionMethod::try_from(1), Err(Error::UnsupportedMethod(1))));
        assert!(serde_json::from_str::<SelectionMethod>("7").is_err());
        assert_eq!(serde_json::to_string(&SelectionMethod::HighestBid).unwrap(), "0");
    }

    #[test]
    fn test_validate() {
        let ok = AuctionRequest::new("1534556", 40.7, -74.0);
        assert!(ok.validate(2).is_ok());

        let bad_point = AuctionRequest::new("1", 95.0, 0.0);
        assert!(matches!(bad_point.validate(2), Err(Error::InvalidCoordinates { .. })));

        let nan = AuctionRequest::new("1", f64::NAN, 0.0);
        assert!(nan.validate(2).is_err());

        let anonymous = AuctionRequest::new("  ", 0.0, 0.0);
        assert!(matches!(anonymous.validate(2), Err(Error::InvalidInput(_))));

        let method = AuctionRequest::new("1", 0.0, 0.0).with_method(3);
        assert!(matches!(method.validate(2), Err(Error::UnsupportedMethod(3))));

        let wrong_dim = AuctionRequest::new("1", 0.0, 0.0).with_query_embedding(Vector::zeros(3));
        assert!(matches!(wrong_dim.validate(2), Err(Error::InvalidDimension { .. })));
    }
}
