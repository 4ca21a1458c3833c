use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Equipment or site feature a photo can be labeled with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum Category {
    #[serde(rename = "road")]
    #[strum(serialize = "road")]
    Road,
    #[serde(rename = "total_station")]
    #[strum(serialize = "total_station")]
    TotalStation,
    #[serde(rename = "tripod")]
    #[strum(serialize = "tripod")]
    Tripod,
    #[serde(rename = "FDD")]
    #[strum(serialize = "FDD")]
    Fdd,
    #[serde(rename = "auto_level")]
    #[strum(serialize = "auto_level")]
    AutoLevel,
    #[serde(rename = "leveling_staff")]
    #[strum(serialize = "leveling_staff")]
    LevelingStaff,
}

/// Where the final coordinate of a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Client,
    Ocr,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadResult {
    pub filename: String,
    pub chainage_km: Option<String>,
    pub labels: BTreeSet<Category>,
    pub confidences: BTreeMap<Category, f32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub gps_valid: bool,
    pub distance_to_route: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_route_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_source: Option<LocationSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadResponse {
    pub results: Vec<UploadResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub route_points: usize,
    pub classifiers_ready: Vec<String>,
    pub classifiers_unavailable: Vec<String>,
    pub ocr_binary: String,
    pub tolerance_meters: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn category_names_match_wire_labels() {
        let names: Vec<&'static str> = Category::iter().map(Into::into).collect();
        assert_eq!(
            names,
            vec!["road", "total_station", "tripod", "FDD", "auto_level", "leveling_staff"]
        );
        assert_eq!(Category::from_str("FDD").unwrap(), Category::Fdd);
        assert_eq!(Category::LevelingStaff.to_string(), "leveling_staff");
    }

    #[test]
    fn confidences_serialize_as_label_keyed_object() {
        let mut confidences = BTreeMap::new();
        confidences.insert(Category::Fdd, 0.5f32);
        confidences.insert(Category::Road, 0.25f32);

        let result = UploadResult {
            filename: "ab12cd34_site.jpg".into(),
            chainage_km: Some("12+400".into()),
            labels: [Category::Fdd].into_iter().collect(),
            confidences,
            lat: None,
            lon: None,
            gps_valid: false,
            distance_to_route: None,
            nearest_route_index: None,
            location_source: None,
            error: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["confidences"]["FDD"], 0.5);
        assert_eq!(json["confidences"]["road"], 0.25);
        assert_eq!(json["labels"], serde_json::json!(["FDD"]));
        assert!(json["lat"].is_null());
        assert!(json.get("error").is_none());
    }
}
