use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classname::{level_token, parse_class_name};

pub const GRADE_LEVELS: std::ops::RangeInclusive<i64> = 0..=12;
pub const SECTIONS: [char; 6] = ['A', 'B', 'C', 'D', 'E', 'F'];
pub const DEFAULT_CLASS_CAPACITY: i64 = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub checked: usize,
    pub fixed: usize,
    pub matched: usize,
    pub skipped_unparseable: usize,
    pub skipped_missing_grade: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub grades: i64,
    pub classes: i64,
}

/// Find the grade record for a level. Zero rows is the missing-grade
/// condition reported by the caller. If drift has produced duplicate
/// levels, the lowest id wins so repeated runs resolve identically.
pub fn find_grade_by_level(conn: &Connection, level: i64) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT id FROM grades WHERE level = ? ORDER BY id LIMIT 1",
            [level],
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(id)
}

/// One bounded pass over every class, repointing each at the grade its
/// name encodes. Unparseable names and levels with no grade record are
/// skipped and counted; only database errors abort the pass. Running the
/// pass twice in a row yields zero fixes the second time.
pub fn reconcile_class_grades(conn: &Connection) -> anyhow::Result<ReconcileSummary> {
    let mut stmt = conn.prepare("SELECT id, name, grade_id FROM classes ORDER BY name, id")?;
    let classes = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut summary = ReconcileSummary::default();

    for (class_id, name, current_grade_id) in classes {
        summary.checked += 1;

        let Some(parsed) = parse_class_name(&name) else {
            warn!(%class_id, %name, "class name unparseable, skipping");
            summary.skipped_unparseable += 1;
            continue;
        };

        let Some(target_grade_id) = find_grade_by_level(conn, parsed.level)? else {
            warn!(
                %class_id,
                %name,
                level = parsed.level,
                "no grade record for level, skipping"
            );
            summary.skipped_missing_grade += 1;
            continue;
        };

        if current_grade_id == target_grade_id {
            debug!(%class_id, %name, level = parsed.level, "grade link already correct");
            summary.matched += 1;
            continue;
        }

        conn.execute(
            "UPDATE classes SET grade_id = ? WHERE id = ?",
            (&target_grade_id, &class_id),
        )?;
        info!(
            %class_id,
            %name,
            level = parsed.level,
            old = %current_grade_id,
            new = %target_grade_id,
            "repointed class at matching grade"
        );
        summary.fixed += 1;
    }

    info!(
        checked = summary.checked,
        fixed = summary.fixed,
        matched = summary.matched,
        skipped_unparseable = summary.skipped_unparseable,
        skipped_missing_grade = summary.skipped_missing_grade,
        "reconcile pass complete"
    );
    Ok(summary)
}

/// Destructive reinitialization of the reference data: wipe dependents
/// and grades, then recreate 13 grades (levels 0..=12) with 6 classes
/// each (sections A-F). Runs in one transaction and verifies the final
/// counts before committing, so a failed run leaves no partial state.
pub fn seed_reference_data(conn: &Connection) -> anyhow::Result<SeedSummary> {
    let tx = conn.unchecked_transaction()?;

    // Dependents first. Announcements and events are school-wide records
    // that may reference a class; they survive the reset with the link
    // cleared rather than being destroyed.
    tx.execute("DELETE FROM reports", [])?;
    tx.execute("DELETE FROM lessons", [])?;
    tx.execute("UPDATE announcements SET class_id = NULL WHERE class_id IS NOT NULL", [])?;
    tx.execute("UPDATE events SET class_id = NULL WHERE class_id IS NOT NULL", [])?;
    tx.execute("DELETE FROM students", [])?;
    tx.execute("DELETE FROM classes", [])?;
    tx.execute("DELETE FROM grades", [])?;

    for level in GRADE_LEVELS {
        let grade_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO grades(id, level) VALUES(?, ?)",
            (&grade_id, level),
        )?;
        for section in SECTIONS {
            let name = format!("{}{}", level_token(level), section);
            tx.execute(
                "INSERT INTO classes(id, name, capacity, grade_id) VALUES(?, ?, ?, ?)",
                (
                    Uuid::new_v4().to_string(),
                    &name,
                    DEFAULT_CLASS_CAPACITY,
                    &grade_id,
                ),
            )?;
        }
        debug!(level, "seeded grade with one class per section");
    }

    let grades: i64 = tx.query_row("SELECT COUNT(*) FROM grades", [], |r| r.get(0))?;
    let classes: i64 = tx.query_row("SELECT COUNT(*) FROM classes", [], |r| r.get(0))?;
    let expected_grades = GRADE_LEVELS.count() as i64;
    let expected_classes = expected_grades * SECTIONS.len() as i64;
    if grades != expected_grades || classes != expected_classes {
        anyhow::bail!(
            "seed post-condition failed: {} grades (want {}), {} classes (want {})",
            grades,
            expected_grades,
            classes,
            expected_classes
        );
    }

    tx.commit()?;
    info!(grades, classes, "seeded reference data");
    Ok(SeedSummary { grades, classes })
}
