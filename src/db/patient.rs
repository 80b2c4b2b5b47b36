//! Patient registry with filtered, paginated listing and dashboard counts.

use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::QueryBuilder;

/// A registered patient.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(skip)]
    pub id: i64,
    pub uuid: String,
    pub name: String,
    pub age: i64,
    pub sex: String,
    pub phone_number: String,
    pub whatsapp_number: String,
    pub place: String,
    pub department: String,
    pub doctor: String,
    pub registered_by: String,
    pub registered_by_role: String,
    pub created_at: String,
}

/// Fields for registering a patient.
pub struct NewPatient<'a> {
    pub uuid: &'a str,
    pub name: &'a str,
    pub age: i64,
    pub sex: &'a str,
    pub phone_number: &'a str,
    pub whatsapp_number: &'a str,
    pub place: &'a str,
    pub department: &'a str,
    pub doctor: &'a str,
    pub registered_by: &'a str,
    pub registered_by_role: &'a str,
}

/// Sort direction for listing, by registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing filters. All optional; unset filters match everything.
#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    /// Exact department match.
    pub department: Option<String>,
    /// Doctor name substring.
    pub doctor: Option<String>,
    /// Patient name substring.
    pub name: Option<String>,
    /// Registration date, `YYYY-MM-DD`, matched against the calendar day.
    pub date: Option<String>,
    pub sort: Option<SortOrder>,
}

/// One page of the patient listing, with the totals the dashboard renders.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPage {
    pub patients: Vec<Patient>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_patients: i64,
    pub patients_per_page: u32,
}

/// Patient count for one department.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct DepartmentCount {
    pub department: String,
    pub count: i64,
}

/// Patient count for one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct MonthlyCount {
    pub month: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct PatientStore {
    pool: SqlitePool,
}

const PATIENT_COLUMNS: &str = "id, uuid, name, age, sex, phone_number, whatsapp_number, place, \
                               department, doctor, registered_by, registered_by_role, created_at";

impl PatientStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a patient. Returns the row ID.
    pub async fn create(&self, patient: &NewPatient<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO patients (uuid, name, age, sex, phone_number, whatsapp_number, place,
                                   department, doctor, registered_by, registered_by_role)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(patient.uuid)
        .bind(patient.name)
        .bind(patient.age)
        .bind(patient.sex)
        .bind(patient.phone_number)
        .bind(patient.whatsapp_number)
        .bind(patient.place)
        .bind(patient.department)
        .bind(patient.doctor)
        .bind(patient.registered_by)
        .bind(patient.registered_by_role)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a patient by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<Patient>, sqlx::Error> {
        let row: Option<Patient> = sqlx::query_as(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE uuid = ?"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Replace a patient's editable fields.
    pub async fn update(&self, uuid: &str, patient: &NewPatient<'_>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE patients SET name = ?, age = ?, sex = ?, phone_number = ?,
                                 whatsapp_number = ?, place = ?, department = ?, doctor = ?
             WHERE uuid = ?",
        )
        .bind(patient.name)
        .bind(patient.age)
        .bind(patient.sex)
        .bind(patient.phone_number)
        .bind(patient.whatsapp_number)
        .bind(patient.place)
        .bind(patient.department)
        .bind(patient.doctor)
        .bind(uuid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a patient by UUID.
    pub async fn delete(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM patients WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filter: &'a PatientFilter) {
        if let Some(department) = &filter.department {
            builder.push(" AND department = ").push_bind(department);
        }
        if let Some(doctor) = &filter.doctor {
            builder
                .push(" AND doctor LIKE '%' || ")
                .push_bind(doctor)
                .push(" || '%'");
        }
        if let Some(name) = &filter.name {
            builder
                .push(" AND name LIKE '%' || ")
                .push_bind(name)
                .push(" || '%'");
        }
        if let Some(date) = &filter.date {
            builder.push(" AND date(created_at) = ").push_bind(date);
        }
    }

    /// List patients matching the filter, one page at a time.
    /// `page` is 1-based; out-of-range pages return an empty list with
    /// accurate totals.
    pub async fn list(
        &self,
        filter: &PatientFilter,
        page: u32,
        limit: u32,
    ) -> Result<PatientPage, sqlx::Error> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM patients WHERE 1=1");
        Self::push_filters(&mut count_query, filter);
        let total_patients: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let order = filter.sort.unwrap_or(SortOrder::Desc).as_sql();
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE 1=1"
        ));
        Self::push_filters(&mut query, filter);
        query.push(format!(" ORDER BY created_at {order}, id {order}"));
        // Offset arithmetic in i64: a huge page number must yield an empty
        // page, not overflow u32.
        let offset = (i64::from(page) - 1) * i64::from(limit);
        query
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(offset);

        let patients: Vec<Patient> = query.build_query_as().fetch_all(&self.pool).await?;

        let total_pages = (total_patients as u64).div_ceil(limit as u64) as u32;
        Ok(PatientPage {
            patients,
            current_page: page,
            total_pages,
            total_patients,
            patients_per_page: limit,
        })
    }

    /// Total patients, optionally restricted to a `YYYY-MM-DD` date range
    /// (inclusive on both ends).
    pub async fn count_in_range(
        &self,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM patients WHERE 1=1");
        if let Some(from) = from {
            query.push(" AND date(created_at) >= ").push_bind(from);
        }
        if let Some(to) = to {
            query.push(" AND date(created_at) <= ").push_bind(to);
        }
        query.build_query_scalar().fetch_one(&self.pool).await
    }

    /// Patients registered today (server clock, UTC).
    pub async fn count_today(&self) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM patients WHERE date(created_at) = date('now')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Patient counts per department, busiest first.
    pub async fn department_counts(&self) -> Result<Vec<DepartmentCount>, sqlx::Error> {
        sqlx::query_as(
            "SELECT department, COUNT(*) AS count FROM patients
             GROUP BY department ORDER BY count DESC, department",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Registration counts per calendar month, oldest first, starting at
    /// `from` (`YYYY-MM-DD`) and optionally capped at `to`.
    pub async fn monthly_history(
        &self,
        from: &str,
        to: Option<&str>,
    ) -> Result<Vec<MonthlyCount>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT strftime('%Y-%m', created_at) AS month, COUNT(*) AS count
             FROM patients WHERE date(created_at) >= ",
        );
        query.push_bind(from);
        if let Some(to) = to {
            query.push(" AND date(created_at) <= ").push_bind(to);
        }
        query.push(" GROUP BY month ORDER BY month");
        query.build_query_as().fetch_all(&self.pool).await
    }
}
