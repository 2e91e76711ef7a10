//! Postgres-backed storage for jobs, result rows, and the canonical
//! person/affiliation graph (spec §4.9, §4.10). Runtime `sqlx::query()` +
//! `.bind()` + `Row::get()` throughout rather than the compile-time
//! `sqlx::query!` macros — this crate is written without a live database to
//! check schemas against.

use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::domain::{
    Affiliation, AffiliationSourceType, ContactList, ImportPreviewCounts, ImportProgress,
    ImportStatus, Job, JobStats, JobStatus, ListMember, Person, Prospect, ResultRow,
    ResultRowStatus, VerificationStatus,
};
use crate::error::{MiningError, Result};
use crate::ids::{AffiliationId, JobId, ListId, PersonId, ProspectId, ResultRowId};

pub struct MiningStore {
    pool: PgPool,
}

/// Identity key a `ResultRow` is upserted on: email-keyed rows and
/// profile-only rows never collide because the prefix differs, which is
/// what makes "never overwrite an email-keyed row with a profile-only one"
/// (spec §4.9) true by construction rather than by a runtime check.
pub fn identity_key(emails: &[String], contact_name: Option<&str>, source_url: &str) -> String {
    if let Some(email) = emails.first() {
        format!("email:{}", email.to_lowercase())
    } else {
        format!(
            "profile:{}|{}",
            contact_name.unwrap_or("").trim().to_lowercase(),
            source_url.to_lowercase()
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultRowFilter {
    pub has_email: Option<bool>,
    pub status: Option<ResultRowStatus>,
    pub verification_status: Option<VerificationStatus>,
    pub country: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResultRowPatch {
    pub contact_name: Option<Option<String>>,
    pub company_name: Option<Option<String>>,
    pub job_title: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub verification_status: Option<VerificationStatus>,
}

fn status_str(status: ResultRowStatus) -> &'static str {
    match status {
        ResultRowStatus::New => "new",
        ResultRowStatus::Imported => "imported",
    }
}

fn status_from_str(s: &str) -> ResultRowStatus {
    match s {
        "imported" => ResultRowStatus::Imported,
        _ => ResultRowStatus::New,
    }
}

fn verification_str(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Unverified => "unverified",
        VerificationStatus::Valid => "valid",
        VerificationStatus::Invalid => "invalid",
        VerificationStatus::Risky => "risky",
    }
}

fn verification_from_str(s: &str) -> VerificationStatus {
    match s {
        "valid" => VerificationStatus::Valid,
        "invalid" => VerificationStatus::Invalid,
        "risky" => VerificationStatus::Risky,
        _ => VerificationStatus::Unverified,
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
    }
}

fn job_status_from_str(s: &str) -> JobStatus {
    match s {
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Pending,
    }
}

fn import_status_str(status: ImportStatus) -> &'static str {
    match status {
        ImportStatus::Processing => "processing",
        ImportStatus::Completed => "completed",
        ImportStatus::Failed => "failed",
    }
}

fn import_status_from_str(s: &str) -> ImportStatus {
    match s {
        "completed" => ImportStatus::Completed,
        "failed" => ImportStatus::Failed,
        _ => ImportStatus::Processing,
    }
}

fn row_to_result_row(r: &sqlx::postgres::PgRow) -> Result<ResultRow> {
    Ok(ResultRow {
        id: ResultRowId::from_uuid(r.get("id")),
        job_id: JobId::from_uuid(r.get("job_id")),
        tenant_id: r.get("tenant_id"),
        source_url: r.get("source_url"),
        company_name: r.get("company_name"),
        contact_name: r.get("contact_name"),
        job_title: r.get("job_title"),
        emails: r.get::<Vec<String>, _>("emails"),
        phone: r.get("phone"),
        country: r.get("country"),
        city: r.get("city"),
        address: r.get("address"),
        website: r.get("website"),
        confidence: r.get::<i16, _>("confidence") as u8,
        status: status_from_str(r.get::<String, _>("status").as_str()),
        verification_status: verification_from_str(r.get::<String, _>("verification_status").as_str()),
        raw: r.get("raw"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

impl MiningStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent `CREATE TABLE IF NOT EXISTS` migrations, run once at
    /// startup rather than via a separate migration tool: schema lives
    /// next to the code that uses it.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_jobs (
                id UUID PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                input_url TEXT NOT NULL,
                config JSONB NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'pending',
                import_status TEXT,
                import_progress JSONB,
                stats JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_result_rows (
                id UUID PRIMARY KEY,
                job_id UUID NOT NULL REFERENCES mining_jobs(id) ON DELETE CASCADE,
                tenant_id TEXT NOT NULL,
                identity_key TEXT NOT NULL,
                source_url TEXT NOT NULL,
                company_name TEXT,
                contact_name TEXT,
                job_title TEXT,
                emails TEXT[] NOT NULL DEFAULT '{}',
                phone TEXT,
                country TEXT,
                city TEXT,
                address TEXT,
                website TEXT,
                confidence SMALLINT NOT NULL DEFAULT 0,
                is_profile_only BOOLEAN NOT NULL DEFAULT false,
                status TEXT NOT NULL DEFAULT 'new',
                verification_status TEXT NOT NULL DEFAULT 'unverified',
                raw JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (job_id, identity_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS mining_result_rows_job_id_idx ON mining_result_rows (job_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_persons (
                id UUID PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                email TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (tenant_id, email)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_affiliations (
                id UUID PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                person_id UUID NOT NULL REFERENCES mining_persons(id) ON DELETE CASCADE,
                company_name TEXT,
                position TEXT,
                country_code TEXT,
                city TEXT,
                website TEXT,
                phone TEXT,
                source_type TEXT NOT NULL,
                source_ref TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0,
                raw JSONB NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS mining_affiliations_company_unique_idx
            ON mining_affiliations (tenant_id, person_id, lower(company_name))
            WHERE company_name IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_prospects (
                id UUID PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                email TEXT NOT NULL,
                contact_name TEXT,
                company_name TEXT,
                tags TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (tenant_id, lower(email))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_contact_lists (
                id UUID PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (tenant_id, lower(name))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mining_list_members (
                list_id UUID NOT NULL REFERENCES mining_contact_lists(id) ON DELETE CASCADE,
                prospect_id UUID NOT NULL REFERENCES mining_prospects(id) ON DELETE CASCADE,
                tenant_id TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (list_id, prospect_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // -- Jobs -----------------------------------------------------------

    pub async fn create_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mining_jobs (id, tenant_id, input_url, config, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.id.0)
        .bind(&job.tenant_id)
        .bind(&job.input_url)
        .bind(&job.config)
        .bind(job_status_str(job.status))
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, input_url, config, status, import_status, import_progress,
                   stats, created_at, completed_at
            FROM mining_jobs WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MiningError::JobNotFound(id.0))?;

        let import_progress: Option<Value> = row.get("import_progress");
        let stats: Value = row.get("stats");

        Ok(Job {
            id: JobId::from_uuid(row.get("id")),
            tenant_id: row.get("tenant_id"),
            input_url: row.get("input_url"),
            config: row.get("config"),
            status: job_status_from_str(row.get::<String, _>("status").as_str()),
            import_status: row
                .get::<Option<String>, _>("import_status")
                .map(|s| import_status_from_str(&s)),
            import_progress: import_progress
                .map(|v| serde_json::from_value(v).unwrap_or_default()),
            stats: serde_json::from_value(stats).unwrap_or_else(|_| JobStats::default()),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        })
    }

    pub async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<()> {
        let completed_at = matches!(status, JobStatus::Completed | JobStatus::Failed).then(Utc::now);
        sqlx::query("UPDATE mining_jobs SET status = $2, completed_at = COALESCE($3, completed_at) WHERE id = $1")
            .bind(id.0)
            .bind(job_status_str(status))
            .bind(completed_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_job_stats(&self, id: JobId, stats: &JobStats) -> Result<()> {
        sqlx::query("UPDATE mining_jobs SET stats = $2 WHERE id = $1")
            .bind(id.0)
            .bind(serde_json::to_value(stats)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_import_status(&self, id: JobId, status: ImportStatus) -> Result<()> {
        sqlx::query("UPDATE mining_jobs SET import_status = $2 WHERE id = $1")
            .bind(id.0)
            .bind(import_status_str(status))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_import_progress(&self, id: JobId, progress: &ImportProgress) -> Result<()> {
        sqlx::query("UPDATE mining_jobs SET import_progress = $2 WHERE id = $1")
            .bind(id.0)
            .bind(serde_json::to_value(progress)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Result rows ------------------------------------------------------

    /// Upsert rules (spec §4.9): non-identity fields fill in with
    /// `COALESCE(NULLIF(..))` so a blank incoming value never clobbers an
    /// existing one; confidence uses `MAX` for email-keyed rows and `LEAST`
    /// for profile-only rows (the more conservative of the two estimates).
    pub async fn upsert_result_row(&self, row: &ResultRow) -> Result<()> {
        self.upsert_result_row_with(&self.pool, row).await
    }

    /// Same upsert as [`Self::upsert_result_row`], runnable against any
    /// executor; see [`Self::upsert_person_with`]. Lets `finalize` write
    /// every row of an aggregate inside one transaction (spec §4.9).
    pub async fn upsert_result_row_with<'e, E>(&self, exec: E, row: &ResultRow) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let key = identity_key(&row.emails, row.contact_name.as_deref(), &row.source_url);
        let is_profile_only = row.emails.is_empty();

        sqlx::query(
            r#"
            INSERT INTO mining_result_rows (
                id, job_id, tenant_id, identity_key, source_url, company_name, contact_name,
                job_title, emails, phone, country, city, address, website, confidence,
                is_profile_only, status, verification_status, raw, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $20
            )
            ON CONFLICT (job_id, identity_key) DO UPDATE SET
                company_name = COALESCE(NULLIF(EXCLUDED.company_name, ''), mining_result_rows.company_name),
                contact_name = COALESCE(NULLIF(EXCLUDED.contact_name, ''), mining_result_rows.contact_name),
                job_title = COALESCE(NULLIF(EXCLUDED.job_title, ''), mining_result_rows.job_title),
                phone = COALESCE(NULLIF(EXCLUDED.phone, ''), mining_result_rows.phone),
                country = COALESCE(NULLIF(EXCLUDED.country, ''), mining_result_rows.country),
                city = COALESCE(NULLIF(EXCLUDED.city, ''), mining_result_rows.city),
                address = COALESCE(NULLIF(EXCLUDED.address, ''), mining_result_rows.address),
                website = COALESCE(NULLIF(EXCLUDED.website, ''), mining_result_rows.website),
                emails = (
                    SELECT ARRAY(SELECT DISTINCT unnest(mining_result_rows.emails || EXCLUDED.emails))
                ),
                confidence = CASE
                    WHEN mining_result_rows.is_profile_only THEN LEAST(mining_result_rows.confidence, EXCLUDED.confidence)
                    ELSE GREATEST(mining_result_rows.confidence, EXCLUDED.confidence)
                END,
                raw = EXCLUDED.raw,
                updated_at = now()
            "#,
        )
        .bind(row.id.0)
        .bind(row.job_id.0)
        .bind(&row.tenant_id)
        .bind(&key)
        .bind(&row.source_url)
        .bind(&row.company_name)
        .bind(&row.contact_name)
        .bind(&row.job_title)
        .bind(&row.emails)
        .bind(&row.phone)
        .bind(&row.country)
        .bind(&row.city)
        .bind(&row.address)
        .bind(&row.website)
        .bind(row.confidence as i16)
        .bind(is_profile_only)
        .bind(status_str(row.status))
        .bind(verification_str(row.verification_status))
        .bind(&row.raw)
        .bind(row.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn get_result_row(&self, id: ResultRowId) -> Result<ResultRow> {
        let row = sqlx::query(
            r#"
            SELECT id, job_id, tenant_id, source_url, company_name, contact_name, job_title,
                   emails, phone, country, city, address, website, confidence, status,
                   verification_status, raw, created_at, updated_at
            FROM mining_result_rows WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(MiningError::ResultRowNotFound(id.0))?;
        row_to_result_row(&row)
    }

    pub async fn list_result_rows(
        &self,
        job_id: JobId,
        filter: &ResultRowFilter,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<ResultRow>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 500);
        let offset = (page - 1) as i64 * limit as i64;

        let mut clauses = vec!["job_id = $1".to_string()];
        let mut idx = 2;
        if filter.has_email == Some(true) {
            clauses.push("cardinality(emails) > 0".to_string());
        } else if filter.has_email == Some(false) {
            clauses.push("cardinality(emails) = 0".to_string());
        }
        if filter.status.is_some() {
            clauses.push(format!("status = ${idx}"));
            idx += 1;
        }
        if filter.verification_status.is_some() {
            clauses.push(format!("verification_status = ${idx}"));
            idx += 1;
        }
        if filter.country.is_some() {
            clauses.push(format!("country ILIKE ${idx}"));
            idx += 1;
        }
        if filter.search.is_some() {
            clauses.push(format!(
                "(contact_name ILIKE ${idx} OR company_name ILIKE ${idx} OR website ILIKE ${idx} \
                 OR source_url ILIKE ${idx} OR array_to_string(emails, ',') ILIKE ${idx})"
            ));
            idx += 1;
        }
        let where_clause = clauses.join(" AND ");

        let count_sql = format!("SELECT count(*) FROM mining_result_rows WHERE {where_clause}");
        let list_sql = format!(
            "SELECT id, job_id, tenant_id, source_url, company_name, contact_name, job_title, \
             emails, phone, country, city, address, website, confidence, status, \
             verification_status, raw, created_at, updated_at \
             FROM mining_result_rows WHERE {where_clause} \
             ORDER BY created_at DESC OFFSET ${idx} LIMIT ${next}",
            idx = idx,
            next = idx + 1,
        );

        fn bind_filters<'q>(
            mut q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
            job_id: JobId,
            filter: &'q ResultRowFilter,
        ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
            q = q.bind(job_id.0);
            if let Some(status) = filter.status {
                q = q.bind(status_str(status));
            }
            if let Some(v) = filter.verification_status {
                q = q.bind(verification_str(v));
            }
            if let Some(country) = &filter.country {
                q = q.bind(format!("%{country}%"));
            }
            if let Some(search) = &filter.search {
                q = q.bind(format!("%{search}%"));
            }
            q
        }

        let count_row = bind_filters(sqlx::query(&count_sql), job_id, filter)
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = count_row.get(0);

        let mut list_q = bind_filters(sqlx::query(&list_sql), job_id, filter);
        list_q = list_q.bind(offset).bind(limit as i64);
        let rows = list_q.fetch_all(&self.pool).await?;

        let results = rows
            .iter()
            .map(row_to_result_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((results, total))
    }

    pub async fn update_result_row(&self, id: ResultRowId, patch: &ResultRowPatch) -> Result<ResultRow> {
        if let Some(name) = &patch.contact_name {
            sqlx::query("UPDATE mining_result_rows SET contact_name = $2, updated_at = now() WHERE id = $1")
                .bind(id.0)
                .bind(name)
                .execute(&self.pool)
                .await?;
        }
        if let Some(company) = &patch.company_name {
            sqlx::query("UPDATE mining_result_rows SET company_name = $2, updated_at = now() WHERE id = $1")
                .bind(id.0)
                .bind(company)
                .execute(&self.pool)
                .await?;
        }
        if let Some(title) = &patch.job_title {
            sqlx::query("UPDATE mining_result_rows SET job_title = $2, updated_at = now() WHERE id = $1")
                .bind(id.0)
                .bind(title)
                .execute(&self.pool)
                .await?;
        }
        if let Some(phone) = &patch.phone {
            sqlx::query("UPDATE mining_result_rows SET phone = $2, updated_at = now() WHERE id = $1")
                .bind(id.0)
                .bind(phone)
                .execute(&self.pool)
                .await?;
        }
        if let Some(v) = patch.verification_status {
            sqlx::query("UPDATE mining_result_rows SET verification_status = $2, updated_at = now() WHERE id = $1")
                .bind(id.0)
                .bind(verification_str(v))
                .execute(&self.pool)
                .await?;
        }
        self.get_result_row(id).await
    }

    pub async fn delete_result_row(&self, id: ResultRowId) -> Result<()> {
        sqlx::query("DELETE FROM mining_result_rows WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- Canonical person / affiliation graph ----------------------------

    pub async fn upsert_person(
        &self,
        tenant_id: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Person> {
        self.upsert_person_with(&self.pool, tenant_id, email, first_name, last_name).await
    }

    /// Same upsert, but runnable against any executor (a savepoint-scoped
    /// transaction in the importer, or the pool directly) so a caller inside
    /// a batch transaction can share one connection across the whole row.
    pub async fn upsert_person_with<'e, E>(
        &self,
        exec: E,
        tenant_id: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Person>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            r#"
            INSERT INTO mining_persons (id, tenant_id, email, first_name, last_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, now(), now())
            ON CONFLICT (tenant_id, email) DO UPDATE SET
                first_name = COALESCE(mining_persons.first_name, EXCLUDED.first_name),
                last_name = COALESCE(mining_persons.last_name, EXCLUDED.last_name),
                updated_at = now()
            RETURNING id, tenant_id, email, first_name, last_name, created_at, updated_at
            "#,
        )
        .bind(PersonId::new().0)
        .bind(tenant_id)
        .bind(email.to_lowercase())
        .bind(first_name)
        .bind(last_name)
        .fetch_one(exec)
        .await?;

        Ok(Person {
            id: PersonId::from_uuid(row.get("id")),
            tenant_id: row.get("tenant_id"),
            email: row.get("email"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Additive affiliation merge (spec §4.10): when `company_name` is
    /// `Some`, upsert on the `(tenant_id, person_id, lower(company_name))`
    /// partial unique index and fill NULLs / take MAX confidence. When
    /// `None`, always insert — NULL-company rows accumulate unconstrained
    /// (spec §9 Open Question, resolved as intentional).
    pub async fn upsert_affiliation(&self, affiliation: &Affiliation) -> Result<Affiliation> {
        self.upsert_affiliation_with(&self.pool, affiliation).await
    }

    /// Same upsert as [`Self::upsert_affiliation`], runnable against any
    /// executor; see [`Self::upsert_person_with`].
    pub async fn upsert_affiliation_with<'e, E>(&self, exec: E, affiliation: &Affiliation) -> Result<Affiliation>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let source_type = match affiliation.source_type {
            AffiliationSourceType::Job => "job",
            AffiliationSourceType::Manual => "manual",
            AffiliationSourceType::Import => "import",
        };

        let row = if affiliation.company_name.is_some() {
            sqlx::query(
                r#"
                INSERT INTO mining_affiliations (
                    id, tenant_id, person_id, company_name, position, country_code, city,
                    website, phone, source_type, source_ref, confidence, raw
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (tenant_id, person_id, lower(company_name)) WHERE company_name IS NOT NULL
                DO UPDATE SET
                    position = COALESCE(mining_affiliations.position, EXCLUDED.position),
                    country_code = COALESCE(mining_affiliations.country_code, EXCLUDED.country_code),
                    city = COALESCE(mining_affiliations.city, EXCLUDED.city),
                    website = COALESCE(mining_affiliations.website, EXCLUDED.website),
                    phone = COALESCE(mining_affiliations.phone, EXCLUDED.phone),
                    confidence = GREATEST(mining_affiliations.confidence, EXCLUDED.confidence)
                RETURNING id, tenant_id, person_id, company_name, position, country_code, city,
                          website, phone, source_type, source_ref, confidence, raw
                "#,
            )
        } else {
            sqlx::query(
                r#"
                INSERT INTO mining_affiliations (
                    id, tenant_id, person_id, company_name, position, country_code, city,
                    website, phone, source_type, source_ref, confidence, raw
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING id, tenant_id, person_id, company_name, position, country_code, city,
                          website, phone, source_type, source_ref, confidence, raw
                "#,
            )
        }
        .bind(AffiliationId::new().0)
        .bind(&affiliation.tenant_id)
        .bind(affiliation.person_id.0)
        .bind(&affiliation.company_name)
        .bind(&affiliation.position)
        .bind(&affiliation.country_code)
        .bind(&affiliation.city)
        .bind(&affiliation.website)
        .bind(&affiliation.phone)
        .bind(source_type)
        .bind(&affiliation.source_ref)
        .bind(affiliation.confidence)
        .bind(&affiliation.raw)
        .fetch_one(exec)
        .await?;

        Ok(Affiliation {
            id: AffiliationId::from_uuid(row.get("id")),
            tenant_id: row.get("tenant_id"),
            person_id: PersonId::from_uuid(row.get("person_id")),
            company_name: row.get("company_name"),
            position: row.get("position"),
            country_code: row.get("country_code"),
            city: row.get("city"),
            website: row.get("website"),
            phone: row.get("phone"),
            source_type: match row.get::<String, _>("source_type").as_str() {
                "manual" => AffiliationSourceType::Manual,
                "import" => AffiliationSourceType::Import,
                _ => AffiliationSourceType::Job,
            },
            source_ref: row.get("source_ref"),
            confidence: row.get("confidence"),
            raw: row.get("raw"),
        })
    }

    // -- Prospects / lists -------------------------------------------------

    pub async fn create_list(&self, tenant_id: &str, name: &str) -> Result<ContactList> {
        let existing = sqlx::query("SELECT id FROM mining_contact_lists WHERE tenant_id = $1 AND lower(name) = lower($2)")
            .bind(tenant_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(MiningError::DuplicateListName(name.to_string()));
        }

        let id = ListId::new();
        let created_at = Utc::now();
        sqlx::query("INSERT INTO mining_contact_lists (id, tenant_id, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(id.0)
            .bind(tenant_id)
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await?;
        Ok(ContactList { id, tenant_id: tenant_id.to_string(), name: name.to_string(), created_at })
    }

    /// Legacy prospect upsert (spec §4.11): find by `(tenant_id,
    /// lower(email))`; if found, union `tags` into the existing row, else
    /// insert a new prospect with the given tags. Runnable against a
    /// savepoint-scoped transaction or the pool directly.
    pub async fn upsert_prospect_with<'e, E>(&self, exec: E, prospect: &Prospect) -> Result<Prospect>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(
            r#"
            INSERT INTO mining_prospects (id, tenant_id, email, contact_name, company_name, tags, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, lower(email)) DO UPDATE SET
                tags = (SELECT ARRAY(SELECT DISTINCT unnest(mining_prospects.tags || EXCLUDED.tags))),
                contact_name = COALESCE(mining_prospects.contact_name, EXCLUDED.contact_name),
                company_name = COALESCE(mining_prospects.company_name, EXCLUDED.company_name)
            RETURNING id, tenant_id, email, contact_name, company_name, tags, created_at
            "#,
        )
        .bind(prospect.id.0)
        .bind(&prospect.tenant_id)
        .bind(prospect.email.to_lowercase())
        .bind(&prospect.contact_name)
        .bind(&prospect.company_name)
        .bind(&prospect.tags)
        .bind(prospect.created_at)
        .fetch_one(exec)
        .await?;

        Ok(Prospect {
            id: ProspectId::from_uuid(row.get("id")),
            tenant_id: row.get("tenant_id"),
            email: row.get("email"),
            contact_name: row.get("contact_name"),
            company_name: row.get("company_name"),
            tags: row.get::<Vec<String>, _>("tags"),
            created_at: row.get("created_at"),
        })
    }

    /// Conflict-do-nothing join into a list (spec §4.11's "optional list
    /// membership"); idempotent across import restarts.
    pub async fn insert_list_member_with<'e, E>(&self, exec: E, member: &ListMember) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO mining_list_members (list_id, prospect_id, tenant_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (list_id, prospect_id) DO NOTHING
            "#,
        )
        .bind(member.list_id.0)
        .bind(member.prospect_id.0)
        .bind(&member.tenant_id)
        .bind(member.created_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn count_list_members(&self, list_id: ListId) -> Result<i64> {
        let row = sqlx::query("SELECT count(*) FROM mining_list_members WHERE list_id = $1")
            .bind(list_id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Next batch of importable rows for `job_id` (spec §4.11): non-empty
    /// `emails`, not yet marked `imported`, ordered by `id` so a restart
    /// after a crash resumes from the same point rather than re-scanning.
    pub async fn fetch_importable_batch(&self, job_id: JobId, limit: i64) -> Result<Vec<ResultRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, job_id, tenant_id, source_url, company_name, contact_name, job_title,
                   emails, phone, country, city, address, website, confidence, status,
                   verification_status, raw, created_at, updated_at
            FROM mining_result_rows
            WHERE job_id = $1 AND cardinality(emails) > 0 AND status != 'imported'
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(job_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_result_row).collect()
    }

    /// Flip a result row to `status = imported` inside the row's savepoint,
    /// the flag idempotency after a crash relies on (spec §4.11, §8).
    pub async fn mark_result_row_imported_with<'e, E>(&self, exec: E, id: ResultRowId) -> Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("UPDATE mining_result_rows SET status = 'imported', updated_at = now() WHERE id = $1")
            .bind(id.0)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Counts backing `GET .../import-preview` (spec §6): how many of a
    /// job's result rows have an email, are already imported, or have
    /// neither (and so can never be imported).
    pub async fn import_preview_counts(&self, job_id: JobId) -> Result<ImportPreviewCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                count(*) AS total_results,
                count(*) FILTER (WHERE cardinality(emails) > 0) AS with_email,
                count(*) FILTER (WHERE cardinality(emails) > 0 AND status != 'imported') AS importable,
                count(*) FILTER (WHERE status = 'imported') AS already_imported,
                count(*) FILTER (WHERE cardinality(emails) = 0) AS without_email
            FROM mining_result_rows WHERE job_id = $1
            "#,
        )
        .bind(job_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(ImportPreviewCounts {
            total_results: row.get("total_results"),
            with_email: row.get("with_email"),
            importable: row.get("importable"),
            already_imported: row.get("already_imported"),
            without_email: row.get("without_email"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_prefers_email_over_profile() {
        let emails = vec!["A@Acme.com".to_string()];
        assert_eq!(identity_key(&emails, Some("Ada"), "https://acme.com"), "email:a@acme.com");
    }

    #[test]
    fn identity_key_falls_back_to_profile_for_email_less_contacts() {
        let key = identity_key(&[], Some(" Ada Lovelace "), "https://Acme.com/Team");
        assert_eq!(key, "profile:ada lovelace|https://acme.com/team");
    }
}
