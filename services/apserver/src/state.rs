use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use svar_matching::Registry;
use svar_shm::UdpNotifier;
use svar_types::ids::SvKey;
use svar_types::notice::Notification;

use crate::error::ServerError;

/// Everything guarded by the registry lock
pub struct Shared {
    pub registry: Box<Registry>,
    /// Values written with `ASSIGN_VALUE`
    pub values: HashMap<SvKey, Vec<u8>>,
    /// Values written with `ASSIGN_WSWS_VAR`
    pub wsws: HashMap<SvKey, Vec<u8>>,
}

impl Shared {
    /// Forget values of rows that no longer exist.
    fn prune(&mut self) {
        let registry = &self.registry;
        self.values.retain(|key, _| registry.find_var(*key).is_some());
        self.wsws.retain(|key, _| registry.find_var(*key).is_some());
    }
}

#[derive(Clone)]
pub struct ServerState {
    shared: Arc<Mutex<Shared>>,
    notifier: Arc<UdpNotifier>,
}

impl ServerState {
    pub fn new(notify_host: IpAddr) -> Result<Self, ServerError> {
        Ok(Self {
            shared: Arc::new(Mutex::new(Shared {
                registry: Registry::boxed(),
                values: HashMap::new(),
                wsws: HashMap::new(),
            })),
            notifier: Arc::new(UdpNotifier::new(notify_host)?),
        })
    }

    /// Run `f` under the lock, then send the notifications it queued.
    ///
    /// The lock is never held across an await point.
    pub fn with_shared<R>(&self, f: impl FnOnce(&mut Shared, &mut Vec<Notification>) -> R) -> R {
        let mut outbox = Vec::new();
        let result = {
            // a panicking session must not take the registry down with it
            let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut shared, &mut outbox);
            shared.prune();
            result
        };
        self.notifier.send_all(&outbox);
        result
    }

    /// Consistent copy of the registry
    pub fn snapshot(&self) -> Box<Registry> {
        self.with_shared(|shared, _| shared.registry.clone())
    }
}
