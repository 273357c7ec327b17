//! Pure projections of the authoritative task set for presentation.
//!
//! No hidden state: identical inputs always yield the identical ordered page.

use todosync_core::{SyncState, Task};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Incomplete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Newest first.
    #[default]
    CreatedAt,
    /// Soonest first; tasks without a due date sort after all dated ones.
    DueDate,
    /// High before medium before low.
    Priority,
}

#[derive(Debug, Clone)]
pub struct TaskQuery {
    pub search: String,
    pub status: StatusFilter,
    pub sort: SortKey,
    /// 1-based; out-of-range pages clamp to the last page.
    pub page: usize,
    pub page_size: usize,
}

impl Default for TaskQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: StatusFilter::All,
            sort: SortKey::CreatedAt,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskPage {
    pub items: Vec<Task>,
    /// Matches after filtering, before pagination.
    pub total: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Filter, sort and paginate the authoritative set. Tasks awaiting a delete
/// confirmation are never shown.
pub fn project(tasks: &[Task], query: &TaskQuery) -> TaskPage {
    let needle = query.search.to_lowercase();

    let mut matched: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.sync_state != SyncState::PendingDelete)
        .filter(|task| needle.is_empty() || task.title.to_lowercase().contains(&needle))
        .filter(|task| match query.status {
            StatusFilter::All => true,
            StatusFilter::Completed => task.completed,
            StatusFilter::Incomplete => !task.completed,
        })
        .collect();

    // Stable sort keeps ties in the incoming order.
    match query.sort {
        SortKey::CreatedAt => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortKey::DueDate => matched.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }),
        SortKey::Priority => matched.sort_by_key(|task| task.priority.rank()),
    }

    let total = matched.len();
    let page_size = query.page_size.max(1);
    let total_pages = total.div_ceil(page_size).max(1);
    let page = query.page.clamp(1, total_pages);

    let items = matched
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();

    TaskPage {
        items,
        total,
        page,
        total_pages,
    }
}
