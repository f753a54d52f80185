//! Result set diffing
//!
//! Turns two snapshots of the same query into the minimal-move change batch
//! that takes the first to the second. Sections are matched by name and
//! objects by identity; ordering is reconciled through a longest increasing
//! subsequence so only objects that actually change relative order move.
//!
//! Emission order:
//! - section deletes (descending), section inserts (ascending), section updates
//! - object deletes (descending old position)
//! - object inserts (ascending new position)
//! - moves (ascending new position)
//! - updates (ascending old position)

use std::collections::{BTreeSet, HashMap, HashSet};

use super::event::{ChangeBatch, IndexPath, ObjectChange, SectionChange};
use crate::controller::FetchedResultSet;
use crate::store::{Entity, ObjectId};

/// Computes change batches between result set snapshots
pub struct ChangeTracker;

impl ChangeTracker {
    /// Diffs `old` against `new`.
    ///
    /// An object that stays in place is reported as updated when its id is
    /// in `updated` or its snapshot differs between the two sets.
    pub fn diff<E: Entity>(
        old: &FetchedResultSet<E>,
        new: &FetchedResultSet<E>,
        updated: &BTreeSet<ObjectId>,
    ) -> ChangeBatch<E> {
        let mut batch = ChangeBatch::new();

        let old_names = old.section_names();
        let new_names = new.section_names();
        let old_section_index: HashMap<&str, usize> =
            old_names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        // Retained sections keep their identity only if they keep their
        // relative order; the rest are deleted and re-inserted.
        let retained: Vec<(usize, usize)> = new_names
            .iter()
            .enumerate()
            .filter_map(|(ni, name)| old_section_index.get(name).map(|&oi| (ni, oi)))
            .collect();
        let keep = increasing_run(&retained.iter().map(|(_, oi)| *oi).collect::<Vec<_>>());
        let stable: HashMap<&str, (usize, usize)> = retained
            .iter()
            .zip(keep)
            .filter(|(_, kept)| *kept)
            .map(|(&(ni, oi), _)| (new_names[ni], (oi, ni)))
            .collect();

        for (oi, name) in old_names.iter().enumerate().rev() {
            if !stable.contains_key(name) {
                if let Some(info) = old.section(oi) {
                    batch.push_section(SectionChange::Deleted { info, index: oi });
                }
            }
        }
        for (ni, name) in new_names.iter().enumerate() {
            if !stable.contains_key(name) {
                if let Some(info) = new.section(ni) {
                    batch.push_section(SectionChange::Inserted { info, index: ni });
                }
            }
        }
        for (ni, name) in new_names.iter().enumerate() {
            let title_changed = stable.contains_key(name)
                && old.section_index_title_for_section_name(name)
                    != new.section_index_title_for_section_name(name);
            if title_changed {
                if let Some(info) = new.section(ni) {
                    batch.push_section(SectionChange::Updated { info, index: ni });
                }
            }
        }

        let old_positions = positions(old);
        let new_positions = positions(new);

        // Objects that keep their section and their relative order stay put
        let mut kept: HashSet<&ObjectId> = HashSet::new();
        for &(oi, ni) in stable.values() {
            let Some(members) = new.section_entities(ni) else {
                continue;
            };
            let candidates: Vec<(&ObjectId, usize)> = members
                .iter()
                .filter_map(|e| {
                    let id = e.object_id();
                    match old_positions.get(id) {
                        Some((path, _)) if path.section == oi => Some((id, path.item)),
                        _ => None,
                    }
                })
                .collect();
            let run = increasing_run(&candidates.iter().map(|(_, item)| *item).collect::<Vec<_>>());
            for ((id, _), stays) in candidates.into_iter().zip(run) {
                if stays {
                    kept.insert(id);
                }
            }
        }

        let mut deletes: Vec<(IndexPath, &E)> = old_positions
            .iter()
            .filter(|(id, _)| !new_positions.contains_key(*id))
            .map(|(_, (path, object))| (*path, *object))
            .collect();
        deletes.sort_by(|a, b| b.0.cmp(&a.0));
        for (old_index, object) in deletes {
            batch.push_object(ObjectChange::Delete {
                object: object.clone(),
                old_index,
            });
        }

        let mut inserts: Vec<(IndexPath, &E)> = new_positions
            .iter()
            .filter(|(id, _)| !old_positions.contains_key(*id))
            .map(|(_, (path, object))| (*path, *object))
            .collect();
        inserts.sort_by_key(|(path, _)| *path);
        for (new_index, object) in inserts {
            batch.push_object(ObjectChange::Insert {
                object: object.clone(),
                new_index,
            });
        }

        let mut moves: Vec<(IndexPath, IndexPath, &E)> = new_positions
            .iter()
            .filter(|(id, _)| !kept.contains(*id))
            .filter_map(|(id, (new_path, object))| {
                old_positions
                    .get(*id)
                    .map(|(old_path, _)| (*old_path, *new_path, *object))
            })
            .collect();
        moves.sort_by_key(|(_, new_path, _)| *new_path);
        for (old_index, new_index, object) in moves {
            batch.push_object(ObjectChange::Move {
                object: object.clone(),
                old_index,
                new_index,
            });
        }

        let mut updates: Vec<(IndexPath, &E)> = kept
            .iter()
            .filter_map(|id| {
                let (old_path, before) = old_positions.get(*id)?;
                let (_, after) = new_positions.get(*id)?;
                let changed = updated.contains(*id) || before.object() != after.object();
                changed.then_some((*old_path, *after))
            })
            .collect();
        updates.sort_by_key(|(path, _)| *path);
        for (index, object) in updates {
            batch.push_object(ObjectChange::Update {
                object: object.clone(),
                index,
            });
        }

        batch
    }
}

fn positions<E: Entity>(set: &FetchedResultSet<E>) -> HashMap<&ObjectId, (IndexPath, &E)> {
    let mut out = HashMap::with_capacity(set.len());
    for section in 0..set.section_count() {
        if let Some(members) = set.section_entities(section) {
            for (item, entity) in members.iter().enumerate() {
                out.insert(entity.object_id(), (IndexPath::new(section, item), entity));
            }
        }
    }
    out
}

/// Marks the members of one longest strictly increasing subsequence
fn increasing_run(values: &[usize]) -> Vec<bool> {
    // tails[k]: index into `values` of the smallest tail of a run of length k + 1
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];

    for (i, &v) in values.iter().enumerate() {
        let at = tails.partition_point(|&t| values[t] < v);
        if at > 0 {
            previous[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }

    let mut members = vec![false; values.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        members[i] = true;
        cursor = previous[i];
    }
    members
}
