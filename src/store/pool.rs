//! Connection pool for blocking PostgreSQL clients.
//!
//! Connections are opened lazily up to `max_size`. A checked-out client is
//! wrapped in a [`PooledClient`] that hands it back on drop, whatever the
//! exit path, so a failed query never leaks a session. Clients found closed
//! are discarded instead of being returned.

use postgres::{Client, NoTls};
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::logging::{self, Component};
use crate::model::StoreError;

/// Pool configuration
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub url: String,
    pub max_size: usize,
    pub acquire_timeout: Duration,
}

#[derive(Default)]
struct PoolState {
    idle: Vec<Client>,
    /// Idle plus checked-out clients, plus connections being opened.
    open: usize,
}

/// Connection pool
pub struct ClientPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    returned: Condvar,
}

/// A client checked out of a [`ClientPool`].
pub struct PooledClient<'a> {
    client: Option<Client>,
    pool: &'a ClientPool,
}

impl ClientPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
        }
    }

    /// Checks out a client, opening a new connection if the pool has room,
    /// otherwise waiting for one to be returned.
    pub fn get(&self) -> Result<PooledClient<'_>, StoreError> {
        let deadline = Instant::now() + self.config.acquire_timeout;
        let mut state = self.lock_state();

        loop {
            while let Some(client) = state.idle.pop() {
                if client.is_closed() {
                    state.open -= 1;
                    continue;
                }
                return Ok(PooledClient { client: Some(client), pool: self });
            }

            if state.open < self.config.max_size {
                state.open += 1;
                drop(state);
                return self.connect();
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::PoolTimeout {
                    waited_secs: self.config.acquire_timeout.as_secs(),
                });
            }
            state = match self.returned.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Number of connections currently open (idle or checked out).
    pub fn open_connections(&self) -> usize {
        self.lock_state().open
    }

    fn connect(&self) -> Result<PooledClient<'_>, StoreError> {
        match Client::connect(&self.config.url, NoTls) {
            Ok(client) => {
                logging::debug(Component::Database, None, "opened database connection");
                Ok(PooledClient { client: Some(client), pool: self })
            }
            Err(e) => {
                self.release_slot();
                Err(StoreError::Connect(e.to_string()))
            }
        }
    }

    fn give_back(&self, client: Client) {
        let mut state = self.lock_state();
        if client.is_closed() {
            state.open -= 1;
        } else {
            state.idle.push(client);
        }
        drop(state);
        self.returned.notify_one();
    }

    fn release_slot(&self) {
        self.lock_state().open -= 1;
        self.returned.notify_one();
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        // Nothing that can panic runs while the lock is held.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Deref for PooledClient<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("pooled client is only taken on drop")
    }
}

impl DerefMut for PooledClient<'_> {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("pooled client is only taken on drop")
    }
}

impl Drop for PooledClient<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.give_back(client);
        }
    }
}
