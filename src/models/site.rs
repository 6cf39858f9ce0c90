use serde::{Deserialize, Serialize};
use validator::Validate;

/// A flux tower location as listed in a site coordinates file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SiteLocation {
    #[validate(length(min = 1))]
    #[serde(alias = "sitecode")]
    pub site: String,

    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(alias = "lat")]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(alias = "lon")]
    pub longitude: f64,

    #[serde(default, alias = "elev")]
    pub elevation: Option<f64>,
}

impl SiteLocation {
    pub fn new(site: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            site: site.into(),
            latitude,
            longitude,
            elevation: None,
        }
    }

    /// Ameriflux style identifier, e.g. "Seg" -> "US-Seg"
    pub fn ameriflux_id(&self) -> String {
        if self.site.contains('-') {
            self.site.clone()
        } else {
            format!("US-{}", self.site)
        }
    }
}
