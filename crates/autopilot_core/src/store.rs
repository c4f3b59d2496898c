//! Knowledge store backed by SQLite.
//!
//! Holds developer profiles and sprint history for the lifetime of a team.
//! The handle is passed explicitly to whoever needs it; every mutation is a
//! single statement or transaction, so a call either commits or leaves the
//! store untouched.
//!
//! Schema:
//! ```text
//! sprint_history(sprint_id PRIMARY KEY, start_date, end_date, completed_points, team_velocity)
//! developer_profiles(developer_id PRIMARY KEY, name, specialization, current_workload DEFAULT 0)
//! ```

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::assignment::AssigneeMatch;
use crate::error::{CoreError, CoreResult};
use crate::models::{DeveloperProfile, Specialization, SprintSnapshot};

/// Number of sprints averaged when no window is given.
pub const DEFAULT_VELOCITY_WINDOW: usize = 3;

/// Durable record of developer profiles and sprint history.
///
/// The connection sits behind a mutex, which serializes writers inside one
/// process. Read-modify-write sequences spanning several calls (such as
/// reading a workload and setting it to `+1`) are not isolated; callers
/// keep a single writer per run.
pub struct KnowledgeStore {
    conn: Mutex<Connection>,
}

impl KnowledgeStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        info!("Opening knowledge store at {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory store.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> CoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sprint_history (
                sprint_id INTEGER PRIMARY KEY,
                start_date TEXT,
                end_date TEXT,
                completed_points INTEGER,
                team_velocity REAL
            );
            CREATE TABLE IF NOT EXISTS developer_profiles (
                developer_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                specialization TEXT,
                current_workload INTEGER DEFAULT 0
            );",
        )?;
        debug!("Knowledge store tables verified");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // --- Developer profiles ---

    /// Insert the given profiles if the profile table is empty.
    ///
    /// Returns the number of profiles inserted (zero when the team already
    /// exists). All rows are inserted in one transaction.
    pub fn seed_profiles(&self, profiles: &[DeveloperProfile]) -> CoreResult<usize> {
        let mut conn = self.conn.lock();
        let existing: i64 =
            conn.query_row("SELECT COUNT(*) FROM developer_profiles", [], |row| row.get(0))?;
        if existing > 0 {
            debug!("Developer profiles already present ({}), skipping seed", existing);
            return Ok(0);
        }

        let tx = conn.transaction()?;
        for profile in profiles {
            tx.execute(
                "INSERT INTO developer_profiles (developer_id, name, specialization, current_workload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    profile.developer_id,
                    profile.name,
                    profile.specialization.as_str(),
                    profile.current_workload,
                ],
            )?;
        }
        tx.commit()?;

        info!("Seeded {} developer profiles", profiles.len());
        Ok(profiles.len())
    }

    /// All profiles in insertion order.
    pub fn all_profiles(&self) -> CoreResult<Vec<DeveloperProfile>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT developer_id, name, specialization, current_workload
             FROM developer_profiles ORDER BY rowid",
        )?;
        let profiles = stmt
            .query_map([], row_to_profile)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    /// Look up a single profile.
    pub fn profile(&self, developer_id: &str) -> CoreResult<Option<DeveloperProfile>> {
        let conn = self.conn.lock();
        let profile = conn
            .query_row(
                "SELECT developer_id, name, specialization, current_workload
                 FROM developer_profiles WHERE developer_id = ?1",
                params![developer_id],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Delete a profile. Returns whether a row existed.
    pub fn remove_profile(&self, developer_id: &str) -> CoreResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM developer_profiles WHERE developer_id = ?1",
            params![developer_id],
        )?;
        if removed > 0 {
            info!(developer_id, "Developer profile removed");
        }
        Ok(removed > 0)
    }

    /// The least-loaded developer with exactly this specialization.
    ///
    /// Ties on workload are broken by developer id.
    pub fn least_loaded(&self, specialization: Specialization) -> CoreResult<Option<DeveloperProfile>> {
        let conn = self.conn.lock();
        let profile = conn
            .query_row(
                "SELECT developer_id, name, specialization, current_workload
                 FROM developer_profiles
                 WHERE specialization = ?1
                 ORDER BY current_workload ASC, developer_id ASC
                 LIMIT 1",
                params![specialization.as_str()],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    /// Find the developer a ticket of this specialization should go to.
    ///
    /// Specialists first, then the least-loaded FullStack developer, then
    /// nobody. The outcome records which branch fired.
    pub fn best_assignee(&self, specialization: Specialization) -> CoreResult<AssigneeMatch> {
        if let Some(profile) = self.least_loaded(specialization)? {
            return Ok(AssigneeMatch::Matched(profile));
        }

        if specialization != Specialization::FullStack {
            debug!("No '{}' developer found, falling back to FullStack", specialization);
            if let Some(profile) = self.least_loaded(Specialization::FullStack)? {
                return Ok(AssigneeMatch::FallbackMatched {
                    requested: specialization,
                    profile,
                });
            }
        }

        Ok(AssigneeMatch::NoneAvailable { requested: specialization })
    }

    /// Set a developer's workload to an absolute value.
    ///
    /// Fails with [`CoreError::DeveloperNotFound`] when no row matches; in
    /// that case nothing is written.
    pub fn set_workload(&self, developer_id: &str, new_workload: u32) -> CoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE developer_profiles SET current_workload = ?1 WHERE developer_id = ?2",
            params![new_workload, developer_id],
        )?;
        if updated == 0 {
            return Err(CoreError::DeveloperNotFound(developer_id.to_string()));
        }
        tx.commit()?;

        debug!(developer_id, new_workload, "Workload updated");
        Ok(())
    }

    /// Set a developer's workload, reporting failure as `false`.
    pub fn update_workload(&self, developer_id: &str, new_workload: u32) -> bool {
        match self.set_workload(developer_id, new_workload) {
            Ok(()) => true,
            Err(e) => {
                warn!(developer_id, "Failed to update workload: {}", e);
                false
            }
        }
    }

    // --- Sprint history ---

    /// Upsert today's snapshot for a sprint and return the completed count.
    pub fn record_sprint_health(&self, sprint_id: i64, completed_count: u32) -> CoreResult<u32> {
        let today = Utc::now().date_naive();
        self.record_snapshot(&SprintSnapshot::new(sprint_id, today, completed_count))
    }

    /// Upsert a snapshot. Re-recording the same sprint replaces its row;
    /// a missing start date or velocity keeps the stored value.
    pub fn record_snapshot(&self, snapshot: &SprintSnapshot) -> CoreResult<u32> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sprint_history (sprint_id, start_date, end_date, completed_points, team_velocity)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(sprint_id) DO UPDATE SET
                start_date = COALESCE(excluded.start_date, sprint_history.start_date),
                end_date = excluded.end_date,
                completed_points = excluded.completed_points,
                team_velocity = COALESCE(excluded.team_velocity, sprint_history.team_velocity)",
            params![
                snapshot.sprint_id,
                snapshot.start_date,
                snapshot.end_date,
                snapshot.completed_count,
                snapshot.team_velocity,
            ],
        )?;

        info!(
            sprint_id = snapshot.sprint_id,
            completed = snapshot.completed_count,
            "Sprint health recorded"
        );
        Ok(snapshot.completed_count)
    }

    /// Mean completed count over the `last_n` most recent sprints.
    ///
    /// Returns `0.0` when there is no history.
    pub fn average_velocity(&self, last_n: usize) -> CoreResult<f64> {
        let conn = self.conn.lock();
        let average: Option<f64> = conn.query_row(
            "SELECT AVG(completed_points) FROM (
                SELECT completed_points FROM sprint_history
                ORDER BY end_date DESC, sprint_id DESC
                LIMIT ?1
            )",
            params![last_n as i64],
            |row| row.get(0),
        )?;
        Ok(average.unwrap_or(0.0))
    }

    /// Like [`average_velocity`](Self::average_velocity) but ignores one
    /// sprint, so a sprint in progress is not measured against itself.
    pub fn average_velocity_excluding(&self, sprint_id: i64, last_n: usize) -> CoreResult<f64> {
        let conn = self.conn.lock();
        let average: Option<f64> = conn.query_row(
            "SELECT AVG(completed_points) FROM (
                SELECT completed_points FROM sprint_history
                WHERE sprint_id != ?1
                ORDER BY end_date DESC, sprint_id DESC
                LIMIT ?2
            )",
            params![sprint_id, last_n as i64],
            |row| row.get(0),
        )?;
        Ok(average.unwrap_or(0.0))
    }

    /// Look up the snapshot of one sprint.
    pub fn snapshot(&self, sprint_id: i64) -> CoreResult<Option<SprintSnapshot>> {
        let conn = self.conn.lock();
        let snapshot = conn
            .query_row(
                "SELECT sprint_id, start_date, end_date, completed_points, team_velocity
                 FROM sprint_history WHERE sprint_id = ?1",
                params![sprint_id],
                row_to_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }

    /// The most recent snapshots, newest first.
    pub fn recent_history(&self, limit: usize) -> CoreResult<Vec<SprintSnapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT sprint_id, start_date, end_date, completed_points, team_velocity
             FROM sprint_history
             ORDER BY end_date DESC, sprint_id DESC
             LIMIT ?1",
        )?;
        let history = stmt
            .query_map(params![limit as i64], row_to_snapshot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(history)
    }
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<DeveloperProfile> {
    let raw: String = row.get(2)?;
    let specialization = raw
        .parse::<Specialization>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(DeveloperProfile {
        developer_id: row.get(0)?,
        name: row.get(1)?,
        specialization,
        current_workload: row.get(3)?,
    })
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<SprintSnapshot> {
    let end_date: NaiveDate = row.get(2)?;
    Ok(SprintSnapshot {
        sprint_id: row.get(0)?,
        start_date: row.get(1)?,
        end_date,
        completed_count: row.get::<_, Option<u32>>(3)?.unwrap_or(0),
        team_velocity: row.get(4)?,
    })
}
