use crate::error::PipelineError;
use crate::types::{CenterType, MedicalCenter};
use csv::{ReaderBuilder, StringRecord};
use encoding_rs::WINDOWS_1252;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    // `fecha` value to keep from the population register
    pub population_date: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            population_date: crate::config::default_population_date(),
        }
    }
}

pub fn load_centers(
    health_csv: &Path,
    population_csv: &Path,
    options: &PipelineOptions,
) -> Result<Vec<MedicalCenter>, PipelineError> {
    // 1. Population per district
    let population_text = read_text(population_csv)?;
    let population = parse_district_population(
        &population_text,
        &options.population_date,
        &population_csv.display().to_string(),
    )?;
    info!("Loaded population for {} districts", population.len());

    // 2. Facilities, joined on district code
    let health_text = read_text(health_csv)?;
    let centers = parse_health_centers(
        &health_text,
        &population,
        &health_csv.display().to_string(),
    )?;
    info!("Loaded {} classified medical centers", centers.len());

    Ok(centers)
}

pub fn read_text(path: &Path) -> Result<String, PipelineError> {
    let bytes = fs::read(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(decode(bytes))
}

// Exports that are not UTF-8 are Windows-1252
fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("Input is not UTF-8, decoding as Windows-1252");
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(e.as_bytes());
            text.into_owned()
        }
    }
}

struct Columns {
    file: String,
    indices: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord, file: &str) -> Self {
        let indices = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
            .collect();
        Self {
            file: file.to_string(),
            indices,
        }
    }

    fn require(&self, column: &str) -> Result<usize, PipelineError> {
        self.indices
            .get(column)
            .copied()
            .ok_or_else(|| PipelineError::MissingColumn {
                column: column.to_string(),
                file: self.file.clone(),
            })
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> Option<&'r str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

fn district_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes())
}

pub fn parse_district_population(
    text: &str,
    date: &str,
    file: &str,
) -> Result<HashMap<String, i64>, PipelineError> {
    let mut rdr = reader(text);
    let cols = Columns::new(rdr.headers()?, file);
    let fecha = cols.require("fecha")?;
    let cod_distrito = cols.require("cod_distrito")?;
    let cod_barrio = cols.require("cod_barrio")?;
    let num_personas = cols.require("num_personas")?;

    let mut totals: HashMap<String, f64> = HashMap::new();
    for (line, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping population row {}: {}", line + 2, e);
                continue;
            }
        };

        if field(&record, fecha) != Some(date) {
            continue;
        }
        let (Some(district), Some(barrio)) = (field(&record, cod_distrito), field(&record, cod_barrio))
        else {
            continue;
        };
        // District totals are the rows where the barrio code repeats the district code
        if district != barrio || district == "Todos" {
            continue;
        }

        let count = field(&record, num_personas).and_then(parse_decimal).unwrap_or(0.0);
        *totals.entry(district_key(district)).or_default() += count;
    }

    Ok(totals
        .into_iter()
        .map(|(k, v)| (k, v.round() as i64))
        .collect())
}

pub fn parse_health_centers(
    text: &str,
    population: &HashMap<String, i64>,
    file: &str,
) -> Result<Vec<MedicalCenter>, PipelineError> {
    let mut rdr = reader(text);
    let cols = Columns::new(rdr.headers()?, file);
    let nombre = cols.require("NOMBRE")?;
    let clase_vial = cols.require("CLASE-VIAL")?;
    let nombre_via = cols.require("NOMBRE-VIA")?;
    let num = cols.require("NUM")?;
    let localidad = cols.require("LOCALIDAD")?;
    let distrito = cols.require("DISTRITO")?;
    let cod_distrito = cols.require("COD-DISTRITO")?;
    let latitud = cols.require("LATITUD")?;
    let longitud = cols.require("LONGITUD")?;
    let transporte = cols.require("TRANSPORTE")?;

    let mut centers = Vec::new();
    let mut unclassified = 0usize;

    for (line, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping facility row {}: {}", line + 2, e);
                continue;
            }
        };

        let Some(name) = field(&record, nombre) else {
            continue;
        };
        let Some(kind) = CenterType::from_name(name) else {
            unclassified += 1;
            continue;
        };

        let street = [clase_vial, nombre_via, num]
            .iter()
            .map(|&i| field(&record, i))
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.join(" "));

        let population_in_district = field(&record, cod_distrito)
            .and_then(|code| population.get(&district_key(code)))
            .copied();

        centers.push(MedicalCenter {
            id: 0,
            type_of_center: Some(kind),
            accessibility: field(&record, transporte).map(str::to_string),
            name: Some(name.to_string()),
            city: field(&record, localidad).map(str::to_string),
            city_district: field(&record, distrito).map(str::to_string),
            latitude: field(&record, latitud).and_then(parse_decimal),
            longitude: field(&record, longitud).and_then(parse_decimal),
            population_in_district,
            street,
            is_suggested: false,
        });
    }

    if unclassified > 0 {
        info!("Dropped {} facilities of other kinds", unclassified);
    }

    Ok(centers)
}
