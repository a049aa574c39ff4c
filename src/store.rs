use crate::error::StoreError;
use crate::types::MedicalCenter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of truth for medical center rows. Mutations are all-or-nothing.
pub trait CenterStore {
    fn all(&self) -> Result<Vec<MedicalCenter>, StoreError>;

    fn filter_suggested(&self, suggested: bool) -> Result<Vec<MedicalCenter>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|c| c.is_suggested == suggested)
            .collect())
    }

    fn insert_batch(&mut self, centers: Vec<MedicalCenter>) -> Result<Vec<MedicalCenter>, StoreError>;

    // Drops every suggested row and appends the batch in one write
    fn replace_suggested(
        &mut self,
        centers: Vec<MedicalCenter>,
    ) -> Result<Vec<MedicalCenter>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    centers: Vec<MedicalCenter>,
}

impl Snapshot {
    fn with_batch(
        &self,
        batch: Vec<MedicalCenter>,
        drop_suggested: bool,
    ) -> Result<(Snapshot, Vec<MedicalCenter>), StoreError> {
        for center in &batch {
            check_constraints(center)?;
        }

        let mut next = self.clone();
        if drop_suggested {
            next.centers.retain(|c| !c.is_suggested);
        }
        next.next_id = next.next_id.max(1);

        let mut inserted = Vec::with_capacity(batch.len());
        for mut center in batch {
            center.id = next.next_id;
            next.next_id += 1;
            inserted.push(center.clone());
            next.centers.push(center);
        }
        Ok((next, inserted))
    }
}

fn check_constraints(center: &MedicalCenter) -> Result<(), StoreError> {
    if let Some(lat) = center.latitude {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(StoreError::Constraint(format!("latitude out of range: {}", lat)));
        }
    }
    if let Some(lon) = center.longitude {
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(StoreError::Constraint(format!("longitude out of range: {}", lon)));
        }
    }
    if let Some(pop) = center.population_in_district {
        if pop < 0 {
            return Err(StoreError::Constraint(format!("negative population: {}", pop)));
        }
    }
    Ok(())
}

// Reads go to disk; writes go through a temp sibling that is renamed into place
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }
        let data = fs::read(&self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        debug!(path = %self.path.display(), rows = snapshot.centers.len(), "store written");
        Ok(())
    }

    fn write(
        &mut self,
        batch: Vec<MedicalCenter>,
        drop_suggested: bool,
    ) -> Result<Vec<MedicalCenter>, StoreError> {
        let (next, inserted) = self.load()?.with_batch(batch, drop_suggested)?;
        self.save(&next)?;
        Ok(inserted)
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl CenterStore for JsonFileStore {
    fn all(&self) -> Result<Vec<MedicalCenter>, StoreError> {
        Ok(self.load()?.centers)
    }

    fn insert_batch(&mut self, centers: Vec<MedicalCenter>) -> Result<Vec<MedicalCenter>, StoreError> {
        self.write(centers, false)
    }

    fn replace_suggested(
        &mut self,
        centers: Vec<MedicalCenter>,
    ) -> Result<Vec<MedicalCenter>, StoreError> {
        self.write(centers, true)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: Snapshot,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CenterStore for MemoryStore {
    fn all(&self) -> Result<Vec<MedicalCenter>, StoreError> {
        Ok(self.snapshot.centers.clone())
    }

    fn insert_batch(&mut self, centers: Vec<MedicalCenter>) -> Result<Vec<MedicalCenter>, StoreError> {
        let (next, inserted) = self.snapshot.with_batch(centers, false)?;
        self.snapshot = next;
        Ok(inserted)
    }

    fn replace_suggested(
        &mut self,
        centers: Vec<MedicalCenter>,
    ) -> Result<Vec<MedicalCenter>, StoreError> {
        let (next, inserted) = self.snapshot.with_batch(centers, true)?;
        self.snapshot = next;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center(name: &str, suggested: bool) -> MedicalCenter {
        MedicalCenter {
            name: Some(name.to_string()),
            city_district: Some("Centro".to_string()),
            latitude: Some(40.41),
            longitude: Some(-3.70),
            population_in_district: Some(1000),
            is_suggested: suggested,
            ..Default::default()
        }
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let mut store = MemoryStore::new();
        let first = store.insert_batch(vec![center("a", false), center("b", false)]).unwrap();
        let second = store.insert_batch(vec![center("c", false)]).unwrap();
        assert_eq!(first.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second[0].id, 3);
    }

    #[test]
    fn constraint_violation_rejects_whole_batch() {
        let mut store = MemoryStore::new();
        store.insert_batch(vec![center("a", false)]).unwrap();

        let mut bad = center("bad", false);
        bad.latitude = Some(f64::NAN);
        let err = store.insert_batch(vec![center("ok", false), bad]).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn negative_population_is_a_constraint_violation() {
        let mut bad = center("bad", false);
        bad.population_in_district = Some(-1);
        assert!(check_constraints(&bad).is_err());
    }

    #[test]
    fn replace_suggested_keeps_real_rows() {
        let mut store = MemoryStore::new();
        store
            .insert_batch(vec![center("real", false), center("old proposal", true)])
            .unwrap();
        store.replace_suggested(vec![center("new proposal", true)]).unwrap();

        let suggested = store.filter_suggested(true).unwrap();
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].name.as_deref(), Some("new proposal"));
        assert_eq!(store.filter_suggested(false).unwrap().len(), 1);
    }
}
