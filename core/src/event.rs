use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};
use crossbeam_skiplist::SkipSet;

/// An event that can be dispatched to the listeners of a [`ListenerList`].
pub trait Event: fmt::Debug + Send + Sync {
    /// The value each listener callback returns.
    type HandlerReturnType: fmt::Debug;

    /// Folds a listener's return value back into the event.
    ///
    /// Called once per listener, in registration order. The default does nothing.
    fn update(&mut self, _handler_result: Self::HandlerReturnType) {}
}

type Callback<E> = dyn Fn(&E) -> <E as Event>::HandlerReturnType + Send + Sync;

struct ListenerEntry<E: Event> {
    // Only the `Listener` handle owns the callback.
    callback: Weak<Callback<E>>,
    order: usize,
}

impl<E: Event> Eq for ListenerEntry<E> {}

impl<E: Event> PartialEq for ListenerEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl<E: Event> Ord for ListenerEntry<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order.cmp(&other.order)
    }
}

impl<E: Event> PartialOrd for ListenerEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

static LISTENER_ORDER: AtomicUsize = AtomicUsize::new(0);

/// The listeners registered for one event type `E`, kept in registration order.
///
/// Dispatch is restricted to this crate: only the component that owns the list
/// (a live query, for instance) emits events into it.
pub struct ListenerList<E: Event> {
    inner: SkipSet<ListenerEntry<E>>,
}

impl<E: Event + 'static> ListenerList<E> {
    pub fn new() -> Self {
        ListenerList {
            inner: SkipSet::new(),
        }
    }

    /// Number of registered entries, including ones whose handle has been
    /// dropped but which have not been swept by a dispatch yet.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Calls every live listener with `event`, folding each return value into
    /// the event via [`Event::update`]. Entries whose [`Listener`] was dropped
    /// are removed.
    pub(crate) fn dispatch(&self, event: &mut E) {
        for entry in self.inner.iter() {
            match entry.callback.upgrade() {
                Some(callback) => {
                    let result = callback(event);
                    event.update(result);
                }
                None => {
                    entry.remove();
                }
            }
        }
    }
}

impl<E: Event + 'static> Default for ListenerList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for ListenerList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("listener_count", &self.inner.len())
            .finish()
    }
}

/// An active listener registration.
///
/// The registration lasts as long as this handle. Once it is dropped the
/// callback is no longer invoked and its entry is swept on the next dispatch.
pub struct Listener<E: Event> {
    #[allow(dead_code)] // owns the callback, the list only holds a Weak
    callback: Arc<Callback<E>>,
    order: usize,
}

impl<E: Event + 'static> Listener<E> {
    /// Registers `callback` with `listeners`.
    pub fn new<F>(listeners: &ListenerList<E>, callback: F) -> Self
    where
        F: Fn(&E) -> E::HandlerReturnType + Send + Sync + 'static,
    {
        let order = LISTENER_ORDER.fetch_add(1, Ordering::SeqCst);
        let callback: Arc<Callback<E>> = Arc::new(callback);
        listeners.inner.insert(ListenerEntry {
            callback: Arc::downgrade(&callback),
            order,
        });
        Listener { callback, order }
    }
}

impl<E: Event> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("order", &self.order)
            .finish()
    }
}

/// Declares a struct with one public [`ListenerList`] field per event type.
macro_rules! define_event_listeners {
    ($struct_name:ident { $($field_name:ident: $event_type:ty),* $(,)? }) => {
        /// Listener lists for the events this component emits.
        #[derive(Debug, Default)]
        pub struct $struct_name {
            $(
                pub $field_name: $crate::event::ListenerList<$event_type>,
            )*
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self {
                    $(
                        $field_name: $crate::event::ListenerList::new(),
                    )*
                }
            }
        }
    };
}

pub(crate) use define_event_listeners;


#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    struct Counted(usize);
    impl Event for Counted {
        type HandlerReturnType = usize;

        fn update(&mut self, value: usize) {
            self.0 += value;
        }
    }

    #[derive(Debug)]
    struct Renamed(String);
    impl Event for Renamed {
        type HandlerReturnType = ();
    }

    define_event_listeners!(TestEvents {
        counted: Counted,
        renamed: Renamed,
    });

    #[test]
    fn test_dispatch_folds_results() {
        let events = TestEvents::new();
        let _a = Listener::new(&events.counted, |_| 2);
        let _b = Listener::new(&events.counted, |e: &Counted| e.0 * 10);

        let mut event = Counted(1);
        events.counted.dispatch(&mut event);
        // 1 + 2, then + 3 * 10
        assert_eq!(event.0, 33);
    }

    #[test]
    fn test_lists_are_independent() {
        let events = TestEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _renamed = Listener::new(&events.renamed, move |e: &Renamed| {
            seen_clone.lock().unwrap().push(e.0.clone());
        });

        let mut counted = Counted(0);
        events.counted.dispatch(&mut counted);
        assert!(seen.lock().unwrap().is_empty());

        events.renamed.dispatch(&mut Renamed("inbox".into()));
        assert_eq!(*seen.lock().unwrap(), vec!["inbox".to_string()]);
    }

    #[test]
    fn test_dropped_listener_is_swept() {
        let events = TestEvents::new();
        {
            let _temp = Listener::new(&events.counted, |_| 1);
            assert_eq!(events.counted.len(), 1);
        }
        // Still registered until the next dispatch.
        assert_eq!(events.counted.len(), 1);

        let mut event = Counted(0);
        events.counted.dispatch(&mut event);
        assert_eq!(event.0, 0);
        assert!(events.counted.is_empty());
    }

    #[test]
    fn test_listener_order() {
        let events = TestEvents::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (order.clone(), order.clone(), order.clone());

        let _a = Listener::new(&events.renamed, move |_| a.lock().unwrap().push("A"));
        let _b = Listener::new(&events.renamed, move |_| b.lock().unwrap().push("B"));
        let _c = Listener::new(&events.renamed, move |_| c.lock().unwrap().push("C"));

        events.renamed.dispatch(&mut Renamed(String::new()));
        assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
    }
}
