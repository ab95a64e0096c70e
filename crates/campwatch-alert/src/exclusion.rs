use crate::error::{AlertError, Result};
use campwatch_common::types::{
    ExclusionEntry, ExclusionTable, MetricRow, MetricSnapshot, MISSING_ENTITY,
};
use std::collections::{BTreeMap, BTreeSet};

/// Per-entity opt-outs: entity id -> rule names that must ignore it.
///
/// Also remembers which entities have a row in the exclusion table at all,
/// even with no rule marked, so new entities can be listed for review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    by_entity: BTreeMap<String, BTreeSet<String>>,
    listed: BTreeSet<String>,
}

/// Cell text that marks an entity as excluded in the wide sheet layout.
pub fn is_exclusion_mark(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case("x")
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exclude(&mut self, entity: &str, rule: &str) {
        self.listed.insert(entity.to_string());
        self.by_entity
            .entry(entity.to_string())
            .or_default()
            .insert(rule.to_string());
    }

    /// Builds the set from sparse `{entity, rule, excluded}` rows. A pair
    /// marked excluded anywhere in the table stays excluded.
    pub fn from_entries(entries: &[ExclusionEntry]) -> Self {
        let mut set = Self::new();
        for entry in entries {
            if entry.excluded {
                set.exclude(&entry.entity, &entry.rule);
            } else {
                set.listed.insert(entry.entity.clone());
            }
        }
        set
    }

    /// Builds the set from the sheet layout: one row per entity, one column
    /// per rule, `x` in a cell meaning excluded. A row with a blank entity
    /// cell applies to rows whose entity has no value.
    ///
    /// A row without the entity column at all is a
    /// [`AlertError::SchemaMismatch`]: its marks cannot be attributed.
    pub fn from_wide_table(entity_column: &str, rows: &[BTreeMap<String, String>]) -> Result<Self> {
        let mut set = Self::new();
        for row in rows {
            let cell = row.get(entity_column).ok_or_else(|| AlertError::SchemaMismatch {
                column: entity_column.to_string(),
                context: "exclusion table".to_string(),
            })?;
            let entity = Some(cell.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or(MISSING_ENTITY);
            set.listed.insert(entity.to_string());
            for (rule, cell) in row {
                if rule != entity_column && is_exclusion_mark(cell) {
                    set.exclude(entity, rule);
                }
            }
        }
        Ok(set)
    }

    pub fn from_table(entity_column: &str, table: &ExclusionTable) -> Result<Self> {
        match table {
            ExclusionTable::Sparse(entries) => Ok(Self::from_entries(entries)),
            ExclusionTable::Wide(rows) => Self::from_wide_table(entity_column, rows),
        }
    }

    pub fn is_excluded(&self, entity: &str, rule: &str) -> bool {
        self.by_entity
            .get(entity)
            .is_some_and(|rules| rules.contains(rule))
    }

    pub fn rules_for(&self, entity: &str) -> Option<&BTreeSet<String>> {
        self.by_entity.get(entity)
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    /// Entities in the snapshot that have no row in the exclusion table,
    /// sorted. Used to append blank rows for newly seen entities.
    pub fn unlisted_entities(&self, snapshot: &MetricSnapshot) -> Vec<String> {
        snapshot
            .entities()
            .into_iter()
            .filter(|entity| !self.listed.contains(entity))
            .collect()
    }
}

/// A snapshot row together with the rules it is excluded from.
#[derive(Debug, Clone)]
pub struct AnnotatedRow<'a> {
    row: &'a MetricRow,
    entity: &'a str,
    excluded_for: BTreeSet<String>,
}

impl<'a> AnnotatedRow<'a> {
    pub fn row(&self) -> &'a MetricRow {
        self.row
    }

    pub fn entity(&self) -> &'a str {
        self.entity
    }

    pub fn is_excluded_for(&self, rule: &str) -> bool {
        self.excluded_for.contains(rule)
    }
}

/// Annotates every snapshot row with its per-rule exclusion flags.
/// Exclusions for entities absent from the snapshot are ignored.
pub fn resolve<'a>(snapshot: &'a MetricSnapshot, exclusions: &ExclusionSet) -> Vec<AnnotatedRow<'a>> {
    snapshot
        .rows()
        .iter()
        .map(|row| {
            let entity = snapshot.entity_of(row);
            AnnotatedRow {
                row,
                entity,
                excluded_for: exclusions.rules_for(entity).cloned().unwrap_or_default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entities: &[&str]) -> MetricSnapshot {
        MetricSnapshot::new(
            "campaign",
            entities
                .iter()
                .map(|e| MetricRow::new().with_dimension("campaign", e).with_metric("playerload", 1.0))
                .collect(),
        )
    }

    fn wide_row(cells: &[(&str, &str)]) -> BTreeMap<String, String> {
        cells.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn wide_table_marks_only_x_cells() {
        let set = ExclusionSet::from_wide_table(
            "campaign",
            &[
                wide_row(&[("campaign", "None"), ("no-fill-alert", "x")]),
                wide_row(&[("campaign", "stories-editorial-androidonly"), ("no-fill-alert", " X ")]),
                wide_row(&[("campaign", "example-campaign"), ("no-fill-alert", "")]),
                wide_row(&[("campaign", "dogs"), ("broken-player-alert", "x"), ("no-fill-alert", "no")]),
            ],
        )
        .unwrap();

        assert!(set.is_excluded("None", "no-fill-alert"));
        assert!(set.is_excluded("stories-editorial-androidonly", "no-fill-alert"));
        assert!(!set.is_excluded("example-campaign", "no-fill-alert"));
        assert!(set.is_excluded("dogs", "broken-player-alert"));
        assert!(!set.is_excluded("dogs", "no-fill-alert"));
    }

    #[test]
    fn blank_entity_cell_maps_to_missing_entity() {
        let set = ExclusionSet::from_wide_table("campaign", &[wide_row(&[("campaign", " "), ("r", "x")])]).unwrap();
        assert!(set.is_excluded(MISSING_ENTITY, "r"));
    }

    #[test]
    fn row_without_entity_column_is_schema_mismatch() {
        let table = ExclusionTable::Wide(vec![
            wide_row(&[("campaign", "E2"), ("no-fill", "")]),
            wide_row(&[("site", "E1"), ("no-fill", "x")]),
        ]);
        let err = ExclusionSet::from_table("campaign", &table).unwrap_err();
        assert_eq!(
            err,
            AlertError::SchemaMismatch {
                column: "campaign".to_string(),
                context: "exclusion table".to_string(),
            }
        );
    }

    #[test]
    fn sparse_entries_keep_any_exclusion() {
        let entries = vec![
            ExclusionEntry { entity: "a".into(), rule: "r".into(), excluded: true },
            ExclusionEntry { entity: "a".into(), rule: "r".into(), excluded: false },
            ExclusionEntry { entity: "b".into(), rule: "r".into(), excluded: false },
        ];
        let set = ExclusionSet::from_entries(&entries);
        assert!(set.is_excluded("a", "r"));
        assert!(!set.is_excluded("b", "r"));
    }

    #[test]
    fn resolve_ignores_unknown_entities_and_flags_per_rule() {
        let mut set = ExclusionSet::new();
        set.exclude("E1", "no-fill");
        set.exclude("ghost", "no-fill");

        let snap = snapshot(&["E1", "E2"]);
        let rows = resolve(&snap, &set);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity(), "E1");
        assert!(rows[0].is_excluded_for("no-fill"));
        assert!(!rows[0].is_excluded_for("broken-player"));
        assert!(!rows[1].is_excluded_for("no-fill"));
    }

    #[test]
    fn unlisted_entities_are_sorted_and_skip_listed_rows() {
        let set = ExclusionSet::from_wide_table(
            "campaign",
            &[wide_row(&[("campaign", "b"), ("r", "")])],
        )
        .unwrap();
        let snap = snapshot(&["c", "b", "a", "c"]);
        assert_eq!(set.unlisted_entities(&snap), vec!["a".to_string(), "c".to_string()]);
    }
}
