//! Fetched result sets
//!
//! A sectioned, immutable snapshot of a controller's current results.
//! Grouping uses the section key path attribute: sections appear in the
//! order their first member appears in the fetch, and members keep fetch
//! order within a section. Without a key path there is exactly one
//! unnamed section, even when empty.
//!
//! Index titles are computed once when a set is built, so section lookups
//! are stable for the lifetime of one instance. Change batches produce a
//! new instance through [`FetchedResultSet::apply`].

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::notify::{ChangeBatch, IndexPath, ObjectChange, SectionChange, SectionInfo};
use crate::store::{Entity, ObjectId};

#[derive(Debug, Clone)]
struct Section<E> {
    name: String,
    index_title: Option<String>,
    objects: Vec<E>,
}

/// Sectioned snapshot of fetched entities
#[derive(Debug, Clone)]
pub struct FetchedResultSet<E> {
    sections: Vec<Section<E>>,
    section_key_path: Option<String>,
    index_titles: Vec<String>,
}

impl<E: Entity> FetchedResultSet<E> {
    /// Groups `objects` into sections, naming each through `index_title`
    pub fn build(
        objects: Vec<E>,
        section_key_path: Option<&str>,
        index_title: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let sections = match section_key_path {
            None => vec![Section {
                name: String::new(),
                index_title: index_title(""),
                objects,
            }],
            Some(key_path) => {
                let mut sections: Vec<Section<E>> = Vec::new();
                let mut positions: HashMap<String, usize> = HashMap::new();
                for object in objects {
                    let name = section_name(object.object().get(key_path));
                    let at = match positions.get(&name) {
                        Some(&at) => at,
                        None => {
                            positions.insert(name.clone(), sections.len());
                            sections.push(Section {
                                index_title: index_title(&name),
                                name,
                                objects: Vec::new(),
                            });
                            sections.len() - 1
                        }
                    };
                    sections[at].objects.push(object);
                }
                sections
            }
        };

        Self::from_sections(sections, section_key_path.map(str::to_string))
    }

    fn from_sections(sections: Vec<Section<E>>, section_key_path: Option<String>) -> Self {
        let mut index_titles: Vec<String> = Vec::new();
        for title in sections.iter().filter_map(|s| s.index_title.as_ref()) {
            if !index_titles.contains(title) {
                index_titles.push(title.clone());
            }
        }
        Self {
            sections,
            section_key_path,
            index_titles,
        }
    }

    /// An empty set with the same sectioning rules
    pub fn empty(section_key_path: Option<&str>, index_title: impl Fn(&str) -> Option<String>) -> Self {
        Self::build(Vec::new(), section_key_path, index_title)
    }

    pub fn section_key_path(&self) -> Option<&str> {
        self.section_key_path.as_deref()
    }

    /// Total number of entities
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.objects.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.objects.is_empty())
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Entities in section order
    pub fn entities(&self) -> impl Iterator<Item = &E> {
        self.sections.iter().flat_map(|s| s.objects.iter())
    }

    /// Entities of one section
    pub fn section_entities(&self, section: usize) -> Option<&[E]> {
        self.sections.get(section).map(|s| s.objects.as_slice())
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn section(&self, index: usize) -> Option<SectionInfo> {
        let start: usize = self.sections[..index.min(self.sections.len())]
            .iter()
            .map(|s| s.objects.len())
            .sum();
        self.sections.get(index).map(|s| SectionInfo {
            name: s.name.clone(),
            index_title: s.index_title.clone(),
            object_count: s.objects.len(),
            range: start..start + s.objects.len(),
        })
    }

    pub fn sections(&self) -> Vec<SectionInfo> {
        let mut start = 0;
        self.sections
            .iter()
            .map(|s| {
                let info = SectionInfo {
                    name: s.name.clone(),
                    index_title: s.index_title.clone(),
                    object_count: s.objects.len(),
                    range: start..start + s.objects.len(),
                };
                start += s.objects.len();
                info
            })
            .collect()
    }

    pub fn entity_at(&self, index: IndexPath) -> Option<&E> {
        self.sections.get(index.section)?.objects.get(index.item)
    }

    pub fn index_path_for(&self, id: &ObjectId) -> Option<IndexPath> {
        self.sections.iter().enumerate().find_map(|(section, s)| {
            s.objects
                .iter()
                .position(|o| o.object_id() == id)
                .map(|item| IndexPath::new(section, item))
        })
    }

    /// Distinct index titles in section order
    pub fn section_index_titles(&self) -> &[String] {
        &self.index_titles
    }

    /// Section for an index title.
    ///
    /// Falls back to the title at `at_index` of
    /// [`section_index_titles`](Self::section_index_titles) when `title` names
    /// no section.
    pub fn section_for_section_index_title(&self, title: &str, at_index: usize) -> Option<usize> {
        let by_title = |t: &str| {
            self.sections
                .iter()
                .position(|s| s.index_title.as_deref() == Some(t))
        };
        by_title(title).or_else(|| {
            self.index_titles
                .get(at_index)
                .and_then(|fallback| by_title(fallback))
        })
    }

    /// Index title recorded for a section name in this set
    pub fn section_index_title_for_section_name(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.index_title.as_deref())
    }

    /// Produces the set that results from applying `batch` to this one.
    ///
    /// Deletes and moves are removed by identity, section deletes and
    /// inserts are applied by index, then inserts and moves are placed at
    /// their new positions in ascending order. Updates replace the object
    /// snapshot in place.
    pub fn apply(&self, batch: &ChangeBatch<E>) -> Self {
        let removed: HashSet<&ObjectId> = batch
            .objects
            .iter()
            .filter(|c| matches!(c, ObjectChange::Delete { .. } | ObjectChange::Move { .. }))
            .map(|c| c.object().object_id())
            .collect();

        let mut sections: Vec<Section<E>> = self
            .sections
            .iter()
            .map(|s| Section {
                name: s.name.clone(),
                index_title: s.index_title.clone(),
                objects: s
                    .objects
                    .iter()
                    .filter(|o| !removed.contains(o.object_id()))
                    .cloned()
                    .collect(),
            })
            .collect();

        let mut deleted: Vec<usize> = batch
            .sections
            .iter()
            .filter_map(|c| match c {
                SectionChange::Deleted { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        deleted.sort_unstable_by(|a, b| b.cmp(a));
        for index in deleted {
            if index < sections.len() {
                sections.remove(index);
            }
        }

        let mut inserted: Vec<(usize, &SectionInfo)> = batch
            .sections
            .iter()
            .filter_map(|c| match c {
                SectionChange::Inserted { info, index } => Some((*index, info)),
                _ => None,
            })
            .collect();
        inserted.sort_by_key(|(index, _)| *index);
        for (index, info) in inserted {
            let at = index.min(sections.len());
            sections.insert(
                at,
                Section {
                    name: info.name.clone(),
                    index_title: info.index_title.clone(),
                    objects: Vec::new(),
                },
            );
        }

        for change in &batch.sections {
            if let SectionChange::Updated { info, index } = change {
                if let Some(section) = sections.get_mut(*index) {
                    section.index_title = info.index_title.clone();
                }
            }
        }

        let mut placed: Vec<(IndexPath, &E)> = batch
            .objects
            .iter()
            .filter_map(|c| match c {
                ObjectChange::Insert { object, new_index }
                | ObjectChange::Move {
                    object, new_index, ..
                } => Some((*new_index, object)),
                _ => None,
            })
            .collect();
        placed.sort_by_key(|(index, _)| *index);
        for (index, object) in placed {
            if let Some(section) = sections.get_mut(index.section) {
                let at = index.item.min(section.objects.len());
                section.objects.insert(at, object.clone());
            }
        }

        for change in &batch.objects {
            if let ObjectChange::Update { object, .. } = change {
                let target = sections
                    .iter_mut()
                    .flat_map(|s| s.objects.iter_mut())
                    .find(|o| o.object_id() == object.object_id());
                if let Some(slot) = target {
                    *slot = object.clone();
                }
            }
        }

        Self::from_sections(sections, self.section_key_path.clone())
    }
}

impl<E: Entity> PartialEq for FetchedResultSet<E> {
    fn eq(&self, other: &Self) -> bool {
        self.section_key_path == other.section_key_path
            && self.sections.len() == other.sections.len()
            && self.sections.iter().zip(&other.sections).all(|(a, b)| {
                a.name == b.name
                    && a.index_title == b.index_title
                    && a.objects.len() == b.objects.len()
                    && a.objects
                        .iter()
                        .zip(&b.objects)
                        .all(|(x, y)| x.object() == y.object())
            })
    }
}

/// Section name for a key path value
fn section_name(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
