use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    errors::Error,
    relationships::{self, RelationshipStore},
};

/// Closed set of account roles carried by every identity claim.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Pharmacist,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Pharmacist => "pharmacist",
            Role::Admin => "admin",
        }
    }

    /// Pharmacists and admins manage the catalog, deliveries and dashboards.
    pub fn manages_inventory(&self) -> bool {
        match self {
            Role::Pharmacist | Role::Admin => true,
            Role::Patient | Role::Doctor => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{userId, role}` claim resolved from a bearer token.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn require(&self, role: Role) -> Result<(), Error> {
        if self.role != role {
            return Err(Error::forbidden(format!(
                "requires role {role}, caller is {}",
                self.role
            )));
        }
        Ok(())
    }

    pub fn require_inventory_manager(&self) -> Result<(), Error> {
        if !self.role.manages_inventory() {
            return Err(Error::forbidden(format!(
                "requires pharmacist or admin, caller is {}",
                self.role
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub role: Role,
    #[serde(default)]
    pub address: Option<Address>,
    /// Doctors only
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub credential_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id.clone(), self.role)
    }

    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            role: self.role,
            address: self.address.clone(),
            specialization: self.specialization.clone(),
        }
    }

    pub fn listing(&self) -> DoctorListing {
        DoctorListing {
            id: self.id.clone(),
            name: self.name.clone(),
            specialization: self.specialization.clone(),
        }
    }

    fn specialized_in(&self, needle: &str) -> bool {
        self.specialization
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(needle))
    }
}

/// Account as exposed over the API, without credentials.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

/// Public directory entry for a doctor; no contact details.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorListing {
    pub id: String,
    pub name: String,
    pub specialization: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccountInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub address: Option<Address>,
    /// Kept for doctor accounts, ignored for every other role
    #[serde(default)]
    pub specialization: Option<String>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Account>, Error>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, Error>;
    async fn list_by_role(&self, role: Role) -> Result<Vec<Account>, Error>;
    async fn put(&self, account: &Account) -> Result<(), Error>;
    async fn delete(&self, id: &str) -> Result<(), Error>;
}

/// Validates the input and stores a new account with the given role.
pub async fn create_account(
    store: &dyn AccountStore,
    input: NewAccountInput,
    role: Role,
) -> Result<Account, Error> {
    let name = input.name.trim();
    let email = input.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(Error::validation("name is required"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(Error::validation("a valid email is required"));
    }
    if store.find_by_email(&email).await?.is_some() {
        return Err(Error::validation(format!("email {email} is already registered")));
    }

    let specialization = match role {
        Role::Doctor => input
            .specialization
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Role::Patient | Role::Pharmacist | Role::Admin => None,
    };

    let account = Account {
        id: ulid::Ulid::new().to_string(),
        name: name.to_string(),
        email,
        phone: input.phone.trim().to_string(),
        role,
        address: input.address,
        specialization,
        credential_hash: None,
        created_at: Utc::now(),
    };
    store.put(&account).await?;
    tracing::info!(account_id = %account.id, role = %role, "Account created");
    Ok(account)
}

/// Admin-only account creation with any role; defaults to patient.
pub async fn admin_create(
    store: &dyn AccountStore,
    actor: &Identity,
    input: NewAccountInput,
) -> Result<Account, Error> {
    actor.require(Role::Admin)?;
    let role = input.role.unwrap_or(Role::Patient);
    create_account(store, input, role).await
}

/// Removes an account together with every relationship it takes part in.
pub async fn delete_account(
    store: &dyn AccountStore,
    relations: &dyn RelationshipStore,
    actor: &Identity,
    id: &str,
) -> Result<(), Error> {
    actor.require(Role::Admin)?;
    if store.get(id).await?.is_none() {
        return Err(Error::not_found("Account", id));
    }
    let removed = relationships::delete_for_account(relations, id).await?;
    store.delete(id).await?;
    tracing::info!(account_id = %id, relationships = removed, "Account deleted");
    Ok(())
}

/// Doctors whose name or specialization contains `search`, case-insensitively, sorted by name.
pub async fn doctors(store: &dyn AccountStore, search: Option<&str>) -> Result<Vec<DoctorListing>, Error> {
    let needle = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
    let mut found: Vec<Account> = store
        .list_by_role(Role::Doctor)
        .await?
        .into_iter()
        .filter(|a| needle.is_empty() || a.name.to_lowercase().contains(&needle) || a.specialized_in(&needle))
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found.iter().map(Account::listing).collect())
}

pub async fn doctors_by_specialization(
    store: &dyn AccountStore,
    specialization: &str,
) -> Result<Vec<DoctorListing>, Error> {
    let needle = specialization.trim().to_lowercase();
    if needle.is_empty() {
        return Err(Error::validation("specialization is required"));
    }
    let mut found: Vec<Account> = store
        .list_by_role(Role::Doctor)
        .await?
        .into_iter()
        .filter(|a| a.specialized_in(&needle))
        .collect();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found.iter().map(Account::listing).collect())
}

pub async fn doctor(store: &dyn AccountStore, id: &str) -> Result<DoctorListing, Error> {
    match store.get(id).await? {
        Some(account) if account.role == Role::Doctor => Ok(account.listing()),
        _ => Err(Error::not_found("Doctor", id)),
    }
}
