//! Change events
//!
//! Object positions are [`IndexPath`]s into a sectioned result set.
//! Within a batch:
//! - `Delete` and `Update` positions refer to the result set before the batch
//! - `Insert` positions refer to the result set after the batch
//! - `Move` carries both

use std::fmt;
use std::ops::Range;

/// Section and item position of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexPath {
    pub section: usize,
    pub item: usize,
}

impl IndexPath {
    pub fn new(section: usize, item: usize) -> Self {
        Self { section, item }
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.section, self.item)
    }
}

/// Description of one section of a result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Section name (value of the section key path, empty when unsectioned)
    pub name: String,
    pub index_title: Option<String>,
    pub object_count: usize,
    /// Member range in the flattened entity list
    pub range: Range<usize>,
}

/// Per-object change
#[derive(Debug, Clone)]
pub enum ObjectChange<E> {
    Insert {
        object: E,
        new_index: IndexPath,
    },
    Delete {
        object: E,
        old_index: IndexPath,
    },
    Update {
        object: E,
        index: IndexPath,
    },
    Move {
        object: E,
        old_index: IndexPath,
        new_index: IndexPath,
    },
}

impl<E> ObjectChange<E> {
    pub fn object(&self) -> &E {
        match self {
            ObjectChange::Insert { object, .. }
            | ObjectChange::Delete { object, .. }
            | ObjectChange::Update { object, .. }
            | ObjectChange::Move { object, .. } => object,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            ObjectChange::Insert { .. } => ChangeKind::Insert,
            ObjectChange::Delete { .. } => ChangeKind::Delete,
            ObjectChange::Update { .. } => ChangeKind::Update,
            ObjectChange::Move { .. } => ChangeKind::Move,
        }
    }
}

/// Per-section change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionChange {
    Inserted { info: SectionInfo, index: usize },
    Deleted { info: SectionInfo, index: usize },
    Updated { info: SectionInfo, index: usize },
}

impl SectionChange {
    pub fn info(&self) -> &SectionInfo {
        match self {
            SectionChange::Inserted { info, .. }
            | SectionChange::Deleted { info, .. }
            | SectionChange::Updated { info, .. } => info,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            SectionChange::Inserted { index, .. }
            | SectionChange::Deleted { index, .. }
            | SectionChange::Updated { index, .. } => *index,
        }
    }
}

/// Change type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Delete,
    Update,
    Move,
}

/// Changes delivered between one will-change and its did-change
#[derive(Debug, Clone)]
pub struct ChangeBatch<E> {
    pub sections: Vec<SectionChange>,
    pub objects: Vec<ObjectChange<E>>,
}

impl<E> ChangeBatch<E> {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            objects: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.objects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len() + self.objects.len()
    }

    pub fn push_section(&mut self, change: SectionChange) {
        self.sections.push(change);
    }

    pub fn push_object(&mut self, change: ObjectChange<E>) {
        self.objects.push(change);
    }

    /// Number of object changes of one kind
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.objects.iter().filter(|c| c.kind() == kind).count()
    }
}

impl<E> Default for ChangeBatch<E> {
    fn default() -> Self {
        Self::new()
    }
}
