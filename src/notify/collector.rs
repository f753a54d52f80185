//! List update collector
//!
//! Binds a [`ChangeDelegate`] to a list-style view. Events between
//! `will_change` and `did_change` are gathered into one [`ListUpdate`]
//! handed to the sink when the batch closes. A batch announced as a full
//! reload is handed over as [`ListUpdate::Reload`] with no granular ops.

use std::sync::Arc;

use parking_lot::Mutex;

use super::delegate::{ChangeDelegate, SubscriptionHandle};
use super::event::IndexPath;

/// One structural list operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp {
    InsertSection(usize),
    DeleteSection(usize),
    ReloadSection(usize),
    InsertItem(IndexPath),
    DeleteItem(IndexPath),
    ReloadItem(IndexPath),
    MoveItem { from: IndexPath, to: IndexPath },
}

/// What a list view should do after one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListUpdate {
    Batch(Vec<ListOp>),
    Reload,
}

#[derive(Default)]
struct Pending {
    reload: bool,
    ops: Vec<ListOp>,
}

/// Collects delegate events into list updates
pub struct ListUpdateCollector {
    handles: Vec<SubscriptionHandle>,
}

impl ListUpdateCollector {
    /// Registers on `delegate` and forwards each closed batch to `sink`
    pub fn attach<E: 'static>(
        delegate: &ChangeDelegate<E>,
        sink: impl Fn(ListUpdate) + Send + Sync + 'static,
    ) -> Self {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let mut handles = Vec::with_capacity(10);

        let p = pending.clone();
        handles.push(delegate.on_will_change(move || p.lock().ops.clear()));

        let p = pending.clone();
        handles.push(delegate.on_needs_reload(move || p.lock().reload = true));

        let p = pending.clone();
        handles.push(delegate.on_section_inserted(move |_, index| {
            push(&p, ListOp::InsertSection(index))
        }));
        let p = pending.clone();
        handles.push(delegate.on_section_deleted(move |_, index| {
            push(&p, ListOp::DeleteSection(index))
        }));
        let p = pending.clone();
        handles.push(delegate.on_section_updated(move |_, index| {
            push(&p, ListOp::ReloadSection(index))
        }));

        let p = pending.clone();
        handles.push(delegate.on_object_inserted(move |_, at| push(&p, ListOp::InsertItem(at))));
        let p = pending.clone();
        handles.push(delegate.on_object_deleted(move |_, at| push(&p, ListOp::DeleteItem(at))));
        let p = pending.clone();
        handles.push(delegate.on_object_updated(move |_, at| push(&p, ListOp::ReloadItem(at))));
        let p = pending.clone();
        handles.push(delegate.on_object_moved(move |_, from, to| {
            push(&p, ListOp::MoveItem { from, to })
        }));

        let p = pending;
        handles.push(delegate.on_did_change(move || {
            let done = std::mem::take(&mut *p.lock());
            if done.reload {
                sink(ListUpdate::Reload);
            } else {
                sink(ListUpdate::Batch(done.ops));
            }
        }));

        Self { handles }
    }

    /// Unregisters every handler this collector added
    pub fn detach<E>(self, delegate: &ChangeDelegate<E>) {
        for handle in self.handles {
            delegate.unregister(handle);
        }
    }
}

fn push(pending: &Mutex<Pending>, op: ListOp) {
    let mut pending = pending.lock();
    if !pending.reload {
        pending.ops.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChangeBatch, ObjectChange};

    fn collect(delegate: &ChangeDelegate<u32>) -> (ListUpdateCollector, Arc<Mutex<Vec<ListUpdate>>>) {
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = out.clone();
        let collector = ListUpdateCollector::attach(delegate, move |u| sink.lock().push(u));
        (collector, out)
    }

    #[test]
    fn test_batch_collected() {
        let delegate = ChangeDelegate::new();
        let (_collector, out) = collect(&delegate);

        let mut batch = ChangeBatch::new();
        batch.push_object(ObjectChange::Delete {
            object: 1,
            old_index: IndexPath::new(0, 0),
        });
        batch.push_object(ObjectChange::Move {
            object: 2,
            old_index: IndexPath::new(0, 2),
            new_index: IndexPath::new(0, 0),
        });
        delegate.deliver(&batch).unwrap();

        assert_eq!(
            *out.lock(),
            vec![ListUpdate::Batch(vec![
                ListOp::DeleteItem(IndexPath::new(0, 0)),
                ListOp::MoveItem {
                    from: IndexPath::new(0, 2),
                    to: IndexPath::new(0, 0)
                },
            ])]
        );
    }

    #[test]
    fn test_reload_then_batch() {
        let delegate = ChangeDelegate::new();
        let (_collector, out) = collect(&delegate);

        delegate.deliver_reload(|| ()).unwrap();
        delegate.deliver(&ChangeBatch::new()).unwrap();

        assert_eq!(*out.lock(), vec![ListUpdate::Reload, ListUpdate::Batch(vec![])]);
    }

    #[test]
    fn test_reload_flag_survives_will_change() {
        let delegate = ChangeDelegate::<u32>::new();
        let (_collector, out) = collect(&delegate);

        delegate.deliver_reload(|| ()).unwrap();
        delegate.deliver_reload(|| ()).unwrap();

        assert_eq!(*out.lock(), vec![ListUpdate::Reload, ListUpdate::Reload]);
    }

    #[test]
    fn test_detach() {
        let delegate = ChangeDelegate::new();
        let (collector, out) = collect(&delegate);
        collector.detach(&delegate);

        delegate.deliver(&ChangeBatch::new()).unwrap();
        assert!(out.lock().is_empty());
    }
}
