// libs/appointment-cell/src/services/directory.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, PetRecord, PractitionerRecord};

#[async_trait]
pub trait PetLookup: Send + Sync {
    async fn get(&self, pet_id: Uuid) -> Result<Option<PetRecord>, AppointmentError>;
}

#[async_trait]
pub trait PractitionerLookup: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<PractitionerRecord>, AppointmentError>;

    /// Every user holding practitioner capability, ordered by id.
    async fn list_practitioners(&self) -> Result<Vec<PractitionerRecord>, AppointmentError>;
}

/// Pets and practitioners read from the `pets` and `users` tables.
pub struct SupabaseDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl PetLookup for SupabaseDirectory {
    async fn get(&self, pet_id: Uuid) -> Result<Option<PetRecord>, AppointmentError> {
        debug!("Looking up pet {}", pet_id);

        let path = format!("/rest/v1/pets?id=eq.{}&select=id,owner_id,name", pet_id);
        let rows: Vec<PetRecord> = self.supabase.request(Method::GET, &path, None, None).await?;

        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl PractitionerLookup for SupabaseDirectory {
    async fn get(&self, user_id: Uuid) -> Result<Option<PractitionerRecord>, AppointmentError> {
        debug!("Looking up practitioner {}", user_id);

        let path = format!("/rest/v1/users?id=eq.{}&select=id,role,full_name", user_id);
        let rows: Vec<PractitionerRecord> = self.supabase.request(Method::GET, &path, None, None).await?;

        Ok(rows.into_iter().next())
    }

    async fn list_practitioners(&self) -> Result<Vec<PractitionerRecord>, AppointmentError> {
        let path = format!(
            "/rest/v1/users?role=eq.{}&select=id,role,full_name&order=id.asc",
            PractitionerRecord::PRACTITIONER_ROLE
        );
        let rows: Vec<PractitionerRecord> = self.supabase.request(Method::GET, &path, None, None).await?;

        debug!("Found {} practitioners", rows.len());
        Ok(rows)
    }
}

/// Fixed in-process directory for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    pets: BTreeMap<Uuid, PetRecord>,
    users: BTreeMap<Uuid, PractitionerRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pet(mut self, pet_id: Uuid, owner_id: Uuid) -> Self {
        self.pets.insert(
            pet_id,
            PetRecord {
                id: pet_id,
                owner_id,
                name: None,
            },
        );
        self
    }

    pub fn with_practitioner(self, user_id: Uuid) -> Self {
        self.with_user(user_id, PractitionerRecord::PRACTITIONER_ROLE)
    }

    pub fn with_user(mut self, user_id: Uuid, role: &str) -> Self {
        self.users.insert(
            user_id,
            PractitionerRecord {
                id: user_id,
                role: Some(role.to_string()),
                full_name: None,
            },
        );
        self
    }
}

#[async_trait]
impl PetLookup for StaticDirectory {
    async fn get(&self, pet_id: Uuid) -> Result<Option<PetRecord>, AppointmentError> {
        Ok(self.pets.get(&pet_id).cloned())
    }
}

#[async_trait]
impl PractitionerLookup for StaticDirectory {
    async fn get(&self, user_id: Uuid) -> Result<Option<PractitionerRecord>, AppointmentError> {
        Ok(self.users.get(&user_id).cloned())
    }

    async fn list_practitioners(&self) -> Result<Vec<PractitionerRecord>, AppointmentError> {
        Ok(self
            .users
            .values()
            .filter(|user| user.is_practitioner())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_directory_lists_only_vets() {
        let (vet, owner) = (Uuid::new_v4(), Uuid::new_v4());
        let directory = StaticDirectory::new().with_practitioner(vet).with_user(owner, "pet_owner");

        let listed = tokio_test::block_on(directory.list_practitioners()).unwrap();
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![vet]);

        let found = tokio_test::block_on(PractitionerLookup::get(&directory, owner)).unwrap();
        assert!(!found.unwrap().is_practitioner());
    }
}
