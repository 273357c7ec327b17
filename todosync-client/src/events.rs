use std::sync::Mutex;

use todosync_core::{Task, TaskId};

/// Notification from the reconciliation engine to the embedding UI.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    TaskCreated { task: Task },
    TaskUpdated { task: Task },
    TaskDeleted { id: TaskId },
    /// A create confirmed and the provisional id was replaced everywhere;
    /// UI selection state should follow.
    TaskIdChanged { old: TaskId, new: TaskId },
    SyncStarted,
    SyncCompleted { count: usize },
    SyncError { message: String },
    ConnectionChanged { online: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskIdChanged,
    SyncStarted,
    SyncCompleted,
    SyncError,
    ConnectionChanged,
}

impl TaskEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TaskEvent::TaskCreated { .. } => EventKind::TaskCreated,
            TaskEvent::TaskUpdated { .. } => EventKind::TaskUpdated,
            TaskEvent::TaskDeleted { .. } => EventKind::TaskDeleted,
            TaskEvent::TaskIdChanged { .. } => EventKind::TaskIdChanged,
            TaskEvent::SyncStarted => EventKind::SyncStarted,
            TaskEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            TaskEvent::SyncError { .. } => EventKind::SyncError,
            TaskEvent::ConnectionChanged { .. } => EventKind::ConnectionChanged,
        }
    }
}

type EventCallback = Box<dyn Fn(&TaskEvent) + Send + Sync>;

struct CallbackEntry {
    callback: EventCallback,
    filter: Option<EventKind>,
}

/// Fan-out point for engine notifications. Callbacks run inline on the
/// engine loop, so they must stay cheap.
pub struct EventDispatcher {
    callbacks: Mutex<Vec<CallbackEntry>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    pub fn register<F>(&self, callback: F, filter: Option<EventKind>)
    where
        F: Fn(&TaskEvent) + Send + Sync + 'static,
    {
        let mut callbacks = match self.callbacks.lock() {
            Ok(callbacks) => callbacks,
            Err(_) => {
                tracing::error!("event dispatcher lock poisoned; dropping registration");
                return;
            }
        };
        callbacks.push(CallbackEntry {
            callback: Box::new(callback),
            filter,
        });
    }

    pub fn emit(&self, event: &TaskEvent) {
        let callbacks = match self.callbacks.lock() {
            Ok(callbacks) => callbacks,
            Err(_) => {
                tracing::error!("event dispatcher lock poisoned; dropping event");
                return;
            }
        };

        for entry in callbacks.iter() {
            if let Some(filter) = entry.filter {
                if filter != event.kind() {
                    continue;
                }
            }
            (entry.callback)(event);
        }
    }

    pub fn emit_task_created(&self, task: &Task) {
        self.emit(&TaskEvent::TaskCreated { task: task.clone() });
    }

    pub fn emit_task_updated(&self, task: &Task) {
        self.emit(&TaskEvent::TaskUpdated { task: task.clone() });
    }

    pub fn emit_task_deleted(&self, id: &TaskId) {
        self.emit(&TaskEvent::TaskDeleted { id: id.clone() });
    }

    pub fn emit_task_id_changed(&self, old: &TaskId, new: &TaskId) {
        self.emit(&TaskEvent::TaskIdChanged {
            old: old.clone(),
            new: new.clone(),
        });
    }

    pub fn emit_sync_started(&self) {
        self.emit(&TaskEvent::SyncStarted);
    }

    pub fn emit_sync_completed(&self, count: usize) {
        self.emit(&TaskEvent::SyncCompleted { count });
    }

    pub fn emit_sync_error(&self, message: &str) {
        self.emit(&TaskEvent::SyncError {
            message: message.to_string(),
        });
    }

    pub fn emit_connection_changed(&self, online: bool) {
        self.emit(&TaskEvent::ConnectionChanged { online });
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_all_callbacks() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            dispatcher.register(
                move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            );
        }

        dispatcher.emit_sync_started();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_filtered_callback_only_sees_its_kind() {
        let dispatcher = EventDispatcher::new();
        let deletes = Arc::new(AtomicUsize::new(0));

        let seen = deletes.clone();
        dispatcher.register(
            move |event| {
                assert!(matches!(event, TaskEvent::TaskDeleted { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            },
            Some(EventKind::TaskDeleted),
        );

        dispatcher.emit_sync_started();
        dispatcher.emit_task_deleted(&TaskId::from("t1"));
        dispatcher.emit_sync_completed(4);

        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_id_change_carries_both_ids() {
        let dispatcher = EventDispatcher::new();
        let captured = Arc::new(Mutex::new(None));

        let slot = captured.clone();
        dispatcher.register(
            move |event| {
                if let TaskEvent::TaskIdChanged { old, new } = event {
                    *slot.lock().unwrap() = Some((old.clone(), new.clone()));
                }
            },
            Some(EventKind::TaskIdChanged),
        );

        let old = TaskId::local();
        let new = TaskId::from("t1");
        dispatcher.emit_task_id_changed(&old, &new);

        let captured = captured.lock().unwrap();
        let (seen_old, seen_new) = captured.as_ref().unwrap();
        assert!(seen_old.is_local());
        assert_eq!(seen_new, &new);
    }
}
