use crate::error::{InputDataError, StoreError};
use crate::store::CenterStore;
use crate::types::{CenterSample, DistrictAggregate, MedicalCenter};
use geo::Point;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProposalMode {
    #[default]
    Append,
    // Earlier suggestions are dropped in the same write as the new batch
    Replace,
}

#[derive(Debug, Clone, Default)]
pub struct ProposalRun {
    pub ranking: Vec<DistrictAggregate>,
    pub proposals: Vec<MedicalCenter>,
    pub skipped: usize,
}

pub fn validate(center: &MedicalCenter) -> Result<CenterSample, InputDataError> {
    let id = center.id;
    let district = center
        .city_district
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(InputDataError::MissingDistrict { id })?;
    let point = center
        .location()
        .ok_or(InputDataError::MissingCoordinates { id })?;
    let population = match center.population_in_district {
        None => return Err(InputDataError::MissingPopulation { id }),
        Some(value) if value < 0 => return Err(InputDataError::NegativePopulation { id, value }),
        Some(value) => value as u64,
    };

    Ok(CenterSample {
        district: district.to_string(),
        point,
        population,
    })
}

pub fn validate_all<'a, I>(records: I) -> (Vec<CenterSample>, usize)
where
    I: IntoIterator<Item = &'a MedicalCenter>,
{
    let mut samples = Vec::new();
    let mut skipped = 0;
    for record in records {
        match validate(record) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                warn!("Skipping record: {}", e);
                skipped += 1;
            }
        }
    }
    (samples, skipped)
}

/// Validates only real centers, so earlier suggestions never count as demand.
pub fn organic_samples(records: &[MedicalCenter]) -> (Vec<CenterSample>, usize) {
    validate_all(records.iter().filter(|r| !r.is_suggested))
}

#[derive(Default)]
struct DistrictAccumulator {
    count: usize,
    population: u64,
    weight: f64,
    weighted_lon: f64,
    weighted_lat: f64,
    sum_lon: f64,
    sum_lat: f64,
}

impl DistrictAccumulator {
    fn push(&mut self, district: &str, sample: &CenterSample) {
        if self.count == 0 {
            self.population = sample.population;
        } else if sample.population != self.population {
            warn!(
                district,
                kept = self.population,
                ignored = sample.population,
                "Conflicting district population, keeping the first value"
            );
        }

        let w = sample.population as f64;
        self.count += 1;
        self.weight += w;
        self.weighted_lon += sample.point.x() * w;
        self.weighted_lat += sample.point.y() * w;
        self.sum_lon += sample.point.x();
        self.sum_lat += sample.point.y();
    }

    fn centroid(&self) -> Point<f64> {
        if self.weight > 0.0 {
            Point::new(self.weighted_lon / self.weight, self.weighted_lat / self.weight)
        } else {
            let n = self.count as f64;
            Point::new(self.sum_lon / n, self.sum_lat / n)
        }
    }
}

pub fn population_per_center(total_population: u64, current_centers: usize) -> f64 {
    total_population as f64 / (current_centers as f64 + 1.0)
}

pub fn aggregate_districts(samples: &[CenterSample]) -> Vec<DistrictAggregate> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, DistrictAccumulator> = HashMap::new();

    for sample in samples {
        let district = sample.district.as_str();
        let acc = groups.entry(district).or_insert_with(|| {
            order.push(district);
            DistrictAccumulator::default()
        });
        acc.push(district, sample);
    }

    order
        .into_iter()
        .filter_map(|district| {
            let acc = groups.get(district)?;
            Some(DistrictAggregate {
                district: district.to_string(),
                centroid: acc.centroid(),
                total_population: acc.population,
                current_centers: acc.count,
                population_per_center: population_per_center(acc.population, acc.count),
            })
        })
        .collect()
}

// Stable, so equal scores keep first-appearance order
pub fn rank_districts(mut aggregates: Vec<DistrictAggregate>) -> Vec<DistrictAggregate> {
    aggregates.sort_by(|a, b| b.population_per_center.total_cmp(&a.population_per_center));
    aggregates
}

pub fn to_proposal(aggregate: &DistrictAggregate, city: &str) -> MedicalCenter {
    MedicalCenter {
        id: 0,
        type_of_center: None,
        accessibility: None,
        name: None,
        city: Some(city.to_string()),
        city_district: Some(aggregate.district.clone()),
        latitude: Some(aggregate.centroid.y()),
        longitude: Some(aggregate.centroid.x()),
        population_in_district: i64::try_from(aggregate.total_population).ok(),
        street: None,
        is_suggested: true,
    }
}

pub fn propose(records: &[MedicalCenter], city: &str) -> ProposalRun {
    // 1. Validate real centers
    let (samples, skipped) = organic_samples(records);

    // 2. Aggregate and rank districts
    let ranking = rank_districts(aggregate_districts(&samples));

    // 3. One proposal per district, in ranking order
    let proposals = ranking.iter().map(|a| to_proposal(a, city)).collect();

    ProposalRun {
        ranking,
        proposals,
        skipped,
    }
}

/// Writes a batch of proposals as one store operation and returns the rows
/// inserted.
pub fn persist<S>(
    store: &mut S,
    proposals: Vec<MedicalCenter>,
    mode: ProposalMode,
) -> Result<Vec<MedicalCenter>, StoreError>
where
    S: CenterStore + ?Sized,
{
    match mode {
        ProposalMode::Append if proposals.is_empty() => Ok(Vec::new()),
        ProposalMode::Append => store.insert_batch(proposals),
        ProposalMode::Replace => store.replace_suggested(proposals),
    }
}

/// Computes proposals from the store, persists them and returns every
/// suggested row now stored.
pub fn generate_and_persist<S>(
    store: &mut S,
    city: &str,
    mode: ProposalMode,
) -> Result<Vec<MedicalCenter>, StoreError>
where
    S: CenterStore + ?Sized,
{
    let records = store.all()?;
    let run = propose(&records, city);
    info!(
        districts = run.ranking.len(),
        skipped = run.skipped,
        ?mode,
        "Computed proposals"
    );

    persist(store, run.proposals, mode)?;
    store.filter_suggested(true)
}
