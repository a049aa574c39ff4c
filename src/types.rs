use geo::Point;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CenterType {
    HealthCenter,
    Hospital,
    Clinic,
}

impl CenterType {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.starts_with("Centro de Salud") || name.starts_with("CMSc") {
            Some(CenterType::HealthCenter)
        } else if name.starts_with("Hospital") {
            Some(CenterType::Hospital)
        } else if name.starts_with("Centro de Especialidades") {
            Some(CenterType::Clinic)
        } else {
            None
        }
    }
}

/// A stored row, either a real center or a proposal (`is_suggested`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MedicalCenter {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub type_of_center: Option<CenterType>,
    #[serde(default, rename = "accesibility")]
    pub accessibility: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub city_district: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub population_in_district: Option<i64>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub is_suggested: bool,
}

impl MedicalCenter {
    pub fn location(&self) -> Option<Point<f64>> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => {
                Some(Point::new(lon, lat))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CenterSample {
    pub district: String,
    // x = longitude, y = latitude
    pub point: Point<f64>,
    pub population: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistrictAggregate {
    pub district: String,
    pub centroid: Point<f64>,
    pub total_population: u64,
    pub current_centers: usize,
    pub population_per_center: f64,
}
