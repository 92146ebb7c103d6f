use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Prescription, PrescriptionError};

const PRESCRIPTIONS_TABLE: &str = "prescriptions";

/// Persistence for prescription records. `update` is a compare-and-swap on
/// `version`: it only succeeds when the stored version equals
/// `expected_version`, and stores `expected_version + 1`.
#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn insert(&self, prescription: Prescription) -> Result<Prescription, PrescriptionError>;

    async fn get(&self, id: Uuid) -> Result<Option<Prescription>, PrescriptionError>;

    async fn update(
        &self,
        prescription: Prescription,
        expected_version: i64,
    ) -> Result<Prescription, PrescriptionError>;

    /// Newest issue date first.
    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Prescription>, PrescriptionError>;

    /// Newest issue date first.
    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Prescription>, PrescriptionError>;
}

fn newest_first(prescriptions: &mut [Prescription]) {
    prescriptions.sort_by(|a, b| {
        b.issue_date
            .cmp(&a.issue_date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryPrescriptionStore {
    records: RwLock<HashMap<Uuid, Prescription>>,
}

impl InMemoryPrescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn list_where<F>(&self, predicate: F) -> Vec<Prescription>
    where
        F: Fn(&Prescription) -> bool,
    {
        let mut matching: Vec<Prescription> = self
            .records
            .read()
            .await
            .values()
            .filter(|p| predicate(p))
            .cloned()
            .collect();

        newest_first(&mut matching);
        matching
    }
}

#[async_trait]
impl PrescriptionStore for InMemoryPrescriptionStore {
    async fn insert(&self, prescription: Prescription) -> Result<Prescription, PrescriptionError> {
        let mut records = self.records.write().await;

        if records.contains_key(&prescription.id) {
            return Err(PrescriptionError::Conflict);
        }

        records.insert(prescription.id, prescription.clone());
        Ok(prescription)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Prescription>, PrescriptionError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        mut prescription: Prescription,
        expected_version: i64,
    ) -> Result<Prescription, PrescriptionError> {
        let mut records = self.records.write().await;

        let stored = records
            .get_mut(&prescription.id)
            .ok_or(PrescriptionError::NotFound)?;

        if stored.version != expected_version {
            warn!(
                "Stale write to prescription {}: expected version {}, found {}",
                prescription.id, expected_version, stored.version
            );
            return Err(PrescriptionError::Conflict);
        }

        prescription.version = expected_version + 1;
        *stored = prescription.clone();

        Ok(prescription)
    }

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Prescription>, PrescriptionError> {
        Ok(self.list_where(|p| p.doctor_id == doctor_id).await)
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Prescription>, PrescriptionError> {
        Ok(self.list_where(|p| p.patient_id == patient_id).await)
    }
}

// ==============================================================================
// SUPABASE STORE
// ==============================================================================

/// PostgREST-backed store. The version check is pushed into the PATCH filter so
/// concurrent writers in other processes are caught too.
pub struct SupabasePrescriptionStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabasePrescriptionStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn database_error(error: anyhow::Error) -> PrescriptionError {
        PrescriptionError::DatabaseError(error.to_string())
    }

    async fn list_filtered(&self, column: &str, id: Uuid) -> Result<Vec<Prescription>, PrescriptionError> {
        let filter = format!("{}=eq.{}&order=issue_date.desc,created_at.desc", column, id);
        let mut rows: Vec<Prescription> = self
            .supabase
            .select(PRESCRIPTIONS_TABLE, &filter)
            .await
            .map_err(Self::database_error)?;

        newest_first(&mut rows);
        Ok(rows)
    }
}

#[async_trait]
impl PrescriptionStore for SupabasePrescriptionStore {
    async fn insert(&self, prescription: Prescription) -> Result<Prescription, PrescriptionError> {
        let row = serde_json::to_value(&prescription)
            .map_err(|e| PrescriptionError::DatabaseError(e.to_string()))?;

        let inserted: Vec<Prescription> = self
            .supabase
            .insert(PRESCRIPTIONS_TABLE, row)
            .await
            .map_err(|e| {
                if e.to_string().starts_with("Conflict") {
                    PrescriptionError::Conflict
                } else {
                    Self::database_error(e)
                }
            })?;

        inserted
            .into_iter()
            .next()
            .ok_or_else(|| PrescriptionError::DatabaseError("Insert returned no rows".to_string()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Prescription>, PrescriptionError> {
        let rows: Vec<Prescription> = self
            .supabase
            .select(PRESCRIPTIONS_TABLE, &format!("id=eq.{}", id))
            .await
            .map_err(Self::database_error)?;

        Ok(rows.into_iter().next())
    }

    async fn update(
        &self,
        mut prescription: Prescription,
        expected_version: i64,
    ) -> Result<Prescription, PrescriptionError> {
        prescription.version = expected_version + 1;

        let mut patch = serde_json::to_value(&prescription)
            .map_err(|e| PrescriptionError::DatabaseError(e.to_string()))?;
        if let Some(fields) = patch.as_object_mut() {
            fields.remove("id");
            fields.remove("created_at");
        }

        let filter = format!("id=eq.{}&version=eq.{}", prescription.id, expected_version);
        let updated: Vec<Prescription> = self
            .supabase
            .update(PRESCRIPTIONS_TABLE, &filter, patch)
            .await
            .map_err(Self::database_error)?;

        if let Some(row) = updated.into_iter().next() {
            return Ok(row);
        }

        // Nothing matched: either the row is gone or someone bumped the version.
        match self.get(prescription.id).await? {
            Some(current) => {
                warn!(
                    "Stale write to prescription {}: expected version {}, found {}",
                    prescription.id, expected_version, current.version
                );
                Err(PrescriptionError::Conflict)
            }
            None => Err(PrescriptionError::NotFound),
        }
    }

    async fn list_by_doctor(&self, doctor_id: Uuid) -> Result<Vec<Prescription>, PrescriptionError> {
        debug!("Listing prescriptions for doctor {}", doctor_id);
        self.list_filtered("doctor_id", doctor_id).await
    }

    async fn list_by_patient(&self, patient_id: Uuid) -> Result<Vec<Prescription>, PrescriptionError> {
        debug!("Listing prescriptions for patient {}", patient_id);
        self.list_filtered("patient_id", patient_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemoryPrescriptionStore::new();
        let prescription = store.insert(Prescription::sample_draft(1)).await.unwrap();

        let mut changed = prescription.clone();
        changed.diagnosis = "Updated".to_string();
        let saved = store.update(changed, prescription.version).await.unwrap();

        assert_eq!(saved.version, prescription.version + 1);
        assert_eq!(store.get(prescription.id).await.unwrap().unwrap().diagnosis, "Updated");
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryPrescriptionStore::new();
        let prescription = store.insert(Prescription::sample_draft(1)).await.unwrap();

        store.update(prescription.clone(), prescription.version).await.unwrap();
        assert_matches!(
            store.update(prescription.clone(), prescription.version).await,
            Err(PrescriptionError::Conflict)
        );
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = InMemoryPrescriptionStore::new();
        let prescription = Prescription::sample_draft(0);

        assert!(store.get(prescription.id).await.unwrap().is_none());
        assert_matches!(
            store.update(prescription, 1).await,
            Err(PrescriptionError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_lists_newest_first() {
        let store = InMemoryPrescriptionStore::new();
        let older = Prescription::sample_draft(0);
        let mut newer = older.clone();
        newer.id = Uuid::new_v4();
        newer.issue_date = older.issue_date + Duration::days(2);
        let mut unrelated = Prescription::sample_draft(0);
        unrelated.patient_id = Uuid::new_v4();

        store.insert(older.clone()).await.unwrap();
        store.insert(newer.clone()).await.unwrap();
        store.insert(unrelated).await.unwrap();

        let listed = store.list_by_patient(older.patient_id).await.unwrap();
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(store.list_by_doctor(older.doctor_id).await.unwrap().len(), 2);
    }
}
