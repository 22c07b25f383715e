//! Registry of bookable services.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::SchedulingError;
use crate::models::{NewService, Service, TokenNumber};

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    /// Active services first, then by name.
    async fn list(&self) -> Result<Vec<Service>, SchedulingError>;

    async fn get(&self, service_id: Uuid) -> Result<Service, SchedulingError>;

    async fn create(&self, new: NewService) -> Result<Service, SchedulingError>;

    /// Only flips the flag; appointments already booked stay untouched.
    async fn set_active(&self, service_id: Uuid, active: bool) -> Result<Service, SchedulingError>;
}

pub fn catalog_order(a: &Service, b: &Service) -> Ordering {
    b.active
        .cmp(&a.active)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.service_id.cmp(&b.service_id))
}

pub fn validate_new_service(new: &NewService) -> Result<NewService, SchedulingError> {
    let name = new.name.trim();
    let department = new.department.trim();
    if name.is_empty() {
        return Err(SchedulingError::Validation("name is required".into()));
    }
    if name.chars().count() > 128 {
        return Err(SchedulingError::Validation("name is too long (max 128)".into()));
    }
    if department.is_empty() {
        return Err(SchedulingError::Validation("department is required".into()));
    }
    if !(1..=24 * 60).contains(&new.duration_minutes) {
        return Err(SchedulingError::Validation(
            "duration_minutes must be between 1 and 1440".into(),
        ));
    }
    Ok(NewService {
        name: name.to_string(),
        department: department.to_string(),
        duration_minutes: new.duration_minutes,
    })
}

/// Token codes must identify one department, so `RES` cannot join a
/// catalog that already has `REG`.
pub fn check_token_code<'a, I>(department: &str, existing: I) -> Result<(), SchedulingError>
where
    I: IntoIterator<Item = &'a str>,
{
    let code = TokenNumber::department_code(department);
    for other in existing {
        if other != department && TokenNumber::department_code(other) == code {
            return Err(SchedulingError::Validation(format!(
                "department {department:?} would share token code {code} with {other:?}"
            )));
        }
    }
    Ok(())
}

/* ============================================================
   In-memory
   ============================================================ */

#[derive(Default)]
pub struct MemoryCatalog {
    services: RwLock<HashMap<Uuid, Service>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceCatalog for MemoryCatalog {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<Service>, SchedulingError> {
        let mut out: Vec<Service> = self.services.read().await.values().cloned().collect();
        out.sort_by(catalog_order);
        Ok(out)
    }

    async fn get(&self, service_id: Uuid) -> Result<Service, SchedulingError> {
        self.services
            .read()
            .await
            .get(&service_id)
            .cloned()
            .ok_or_else(|| SchedulingError::service_not_found(service_id))
    }

    async fn create(&self, new: NewService) -> Result<Service, SchedulingError> {
        let new = validate_new_service(&new)?;
        let mut services = self.services.write().await;
        check_token_code(&new.department, services.values().map(|s| s.department.as_str()))?;
        let service = Service {
            service_id: Uuid::new_v4(),
            name: new.name,
            department: new.department,
            duration_minutes: new.duration_minutes,
            active: true,
            created_at: Utc::now(),
        };
        services.insert(service.service_id, service.clone());
        Ok(service)
    }

    async fn set_active(&self, service_id: Uuid, active: bool) -> Result<Service, SchedulingError> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(&service_id)
            .ok_or_else(|| SchedulingError::service_not_found(service_id))?;
        service.active = active;
        Ok(service.clone())
    }
}

/* ============================================================
   PostgreSQL
   ============================================================ */

pub struct PgCatalog {
    db: PgPool,
}

impl PgCatalog {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ServiceCatalog for PgCatalog {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn list(&self) -> Result<Vec<Service>, SchedulingError> {
        let rows = sqlx::query_as::<_, Service>(
            r#"
            SELECT service_id, name, department, duration_minutes, is_active, created_at
            FROM service
            ORDER BY is_active DESC, name ASC, service_id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get(&self, service_id: Uuid) -> Result<Service, SchedulingError> {
        sqlx::query_as::<_, Service>(
            r#"
            SELECT service_id, name, department, duration_minutes, is_active, created_at
            FROM service
            WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| SchedulingError::service_not_found(service_id))
    }

    async fn create(&self, new: NewService) -> Result<Service, SchedulingError> {
        let new = validate_new_service(&new)?;
        let departments: Vec<String> = sqlx::query_scalar("SELECT DISTINCT department FROM service")
            .fetch_all(&self.db)
            .await?;
        check_token_code(&new.department, departments.iter().map(String::as_str))?;

        let row = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO service (service_id, name, department, duration_minutes, is_active)
            VALUES ($1, $2, $3, $4, TRUE)
            RETURNING service_id, name, department, duration_minutes, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.department)
        .bind(new.duration_minutes)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn set_active(&self, service_id: Uuid, active: bool) -> Result<Service, SchedulingError> {
        sqlx::query_as::<_, Service>(
            r#"
            UPDATE service
            SET is_active = $2
            WHERE service_id = $1
            RETURNING service_id, name, department, duration_minutes, is_active, created_at
            "#,
        )
        .bind(service_id)
        .bind(active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| SchedulingError::service_not_found(service_id))
    }
}
