//! Bounded breadcrumb recorder.
//!
//! Crumbs are recorded out-of-band and snapshotted into a report at format
//! time, oldest first. When full, the oldest crumb is evicted.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::Breadcrumb;

pub struct BreadcrumbRecorder {
    inner: Mutex<Inner>,
}

struct Inner {
    capacity: usize,
    crumbs: VecDeque<Breadcrumb>,
}

impl BreadcrumbRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity,
                crumbs: VecDeque::new(),
            }),
        }
    }

    pub fn add(&self, crumb: Breadcrumb) {
        let mut inner = self.inner.lock().expect("breadcrumbs");
        while inner.crumbs.len() >= inner.capacity.max(1) {
            inner.crumbs.pop_front();
        }
        inner.crumbs.push_back(crumb);
    }

    /// Current crumbs, oldest → newest.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        let inner = self.inner.lock().expect("breadcrumbs");
        inner.crumbs.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().expect("breadcrumbs").crumbs.clear();
    }

    pub fn set_capacity(&self, capacity: usize) {
        let mut inner = self.inner.lock().expect("breadcrumbs");
        inner.capacity = capacity;
        while inner.crumbs.len() > inner.capacity.max(1) {
            inner.crumbs.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("breadcrumbs").crumbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
