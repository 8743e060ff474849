use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::{Map, Value, json};

use crate::server::notify::Notifier;
use crate::tweak::value::{TweakError, Tweakable};

/// Explicitly owned set of live tweakable values.
///
/// Cloning shares the same registry. Create it before any [`Tweak`] and
/// before the [`TweakServer`](crate::tweak::TweakServer) that serves it;
/// tweaks and the server may be dropped in any order afterwards.
#[derive(Clone, Default)]
pub struct TweakRegistry {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    tweaks: BTreeMap<u64, Entry>,
    /// Updates posted by the UI, applied on the next sync
    received: BTreeMap<String, String>,
    serial: u64,
    snapshot: Map<String, Value>,
    notifier: Option<Notifier>,
}

struct Entry {
    name: String,
    hint: String,
    cell: Arc<dyn TweakCell>,
}

trait TweakCell: Send + Sync {
    fn serialize(&self) -> String;
    fn deserialize(&self, name: &str, value: &str) -> Result<(), TweakError>;
}

impl<T: Tweakable> TweakCell for Mutex<T> {
    fn serialize(&self) -> String {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_tweak_string()
    }

    fn deserialize(&self, name: &str, value: &str) -> Result<(), TweakError> {
        let parsed = T::parse_for(name, value)?;
        *self.lock().unwrap_or_else(PoisonError::into_inner) = parsed;
        Ok(())
    }
}

/// A registered value. Reads see UI edits only after [`TweakRegistry::sync`].
///
/// Dropping it removes the value from the registry.
pub struct Tweak<T: Tweakable> {
    id: u64,
    name: String,
    cell: Arc<Mutex<T>>,
    registry: Weak<Shared>,
}

impl<T: Tweakable> Tweak<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self, value: T) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        f(&*value)
    }
}

impl<T: Tweakable + Clone> Tweak<T> {
    pub fn get(&self) -> T {
        self.with(T::clone)
    }
}

impl<T: Tweakable> Drop for Tweak<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.lock().tweaks.remove(&self.id);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TweakRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value under `name` with the type's default hint.
    pub fn tweak<T: Tweakable>(&self, name: impl Into<String>, initial: T) -> Tweak<T> {
        self.tweak_with_hint(name, T::hint(), initial)
    }

    /// Registers a value with a custom UI hint, e.g. `"float 0.0 1.0"`.
    pub fn tweak_with_hint<T: Tweakable>(
        &self,
        name: impl Into<String>,
        hint: impl Into<String>,
        initial: T,
    ) -> Tweak<T> {
        let name = name.into();
        let cell = Arc::new(Mutex::new(initial));

        let mut state = self.shared.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.tweaks.insert(
            id,
            Entry {
                name: name.clone(),
                hint: hint.into(),
                cell: cell.clone(),
            },
        );

        Tweak {
            id,
            name,
            cell,
            registry: Arc::downgrade(&self.shared),
        }
    }

    pub fn len(&self) -> usize {
        self.shared.lock().tweaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies UI updates to live values and republishes their state.
    ///
    /// Returns true when the published state changed; the serial is bumped
    /// and the attached server woken in that case.
    pub fn sync(&self) -> bool {
        let mut state = self.shared.lock();
        let received = std::mem::take(&mut state.received);

        let mut snapshot = Map::new();
        for entry in state.tweaks.values() {
            if let Some(value) = received.get(&entry.name) {
                if let Err(e) = entry.cell.deserialize(&entry.name, value) {
                    tracing::warn!(error = %e, "ignoring tweak update");
                }
            }
            snapshot.insert(
                entry.name.clone(),
                json!({ "hint": entry.hint, "value": entry.cell.serialize() }),
            );
        }

        if snapshot == state.snapshot {
            return false;
        }

        state.snapshot = snapshot;
        state.serial += 1;
        tracing::trace!(serial = state.serial, "tweak state changed");
        if let Some(notifier) = &state.notifier {
            notifier.notify();
        }
        true
    }

    pub fn serial(&self) -> u64 {
        self.shared.lock().serial
    }

    /// `{"serial":N,"state":{name:{"hint":..,"value":..}}}` as last published.
    pub fn state_json(&self) -> String {
        let state = self.shared.lock();
        json!({ "serial": state.serial, "state": state.snapshot }).to_string()
    }

    /// Queues name → value updates for the next [`sync`](Self::sync).
    /// Later updates to the same name win; unknown names are ignored there.
    pub fn receive(&self, updates: impl IntoIterator<Item = (String, String)>) {
        self.shared.lock().received.extend(updates);
    }

    pub(crate) fn attach(&self, notifier: Notifier) {
        self.shared.lock().notifier = Some(notifier);
    }

    pub(crate) fn detach(&self) {
        self.shared.lock().notifier = None;
    }
}
