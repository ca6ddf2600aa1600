//! Network guard state machine
//!
//! Consumes attach/detach/keystroke events and decides when to toggle the
//! network, invoking the injected control exactly once per logical state
//! transition. Registry and guard state share one lock domain so the
//! unauthorized count is always evaluated against the snapshot that triggers
//! a transition; the passphrase matcher has its own lock since keystrokes are
//! a single logical stream.

use crate::allowlist::AllowList;
use crate::error::{ControlError, GuardError, Result};
use crate::identity::{DeviceHandle, DeviceIdentity};
use crate::passphrase::{MatchResult, PassphraseMatcher};
use crate::registry::DeviceRegistry;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Logical state of the network guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Network is up; no unauthorized device has forced it down
    Enabled,
    /// Network was taken down because an unauthorized device is present
    Disabled,
}

/// Direction of an in-flight transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Disable,
    Enable,
}

/// Fallible external action that actually toggles the network
///
/// The guard treats both calls as potentially slow and potentially failing;
/// it never holds its state lock across them. Implementations must be
/// idempotent enough to tolerate a retry after a reported failure.
pub trait NetworkControl: Send + Sync {
    /// Take the network down
    fn disable(&self) -> impl Future<Output = std::result::Result<(), ControlError>> + Send;
    /// Bring the network back up
    fn enable(&self) -> impl Future<Output = std::result::Result<(), ControlError>> + Send;
}

struct GuardInner {
    registry: DeviceRegistry,
    state: GuardState,
    in_flight: Option<Transition>,
    /// Set when the registry changed while a transition was in flight; the
    /// transition re-evaluates the registry after committing and fires the
    /// compensating transition if one is now required.
    deferred: bool,
}

/// Two-state controller deciding whether the network stays up
///
/// All mutations of the registry and the guard state are serialized behind
/// one mutex. A transition is performed in three steps: mark it in flight
/// under the lock, release the lock for the external call, then re-acquire
/// to commit (on success) or roll back (on failure). Events observing an
/// in-flight transition do not start another one; registry changes made
/// during the flight are noted and settled once the transition lands, so the
/// final state always reflects the devices present when it was reached. A
/// failed transition leaves the state unchanged so the next event retries it.
pub struct NetworkGuard<C> {
    inner: Mutex<GuardInner>,
    matcher: Mutex<PassphraseMatcher>,
    allow_list: AllowList,
    control: C,
}

impl<C: NetworkControl> NetworkGuard<C> {
    /// Create a guard in the `Enabled` state with an empty registry
    pub fn new(allow_list: AllowList, passphrase: &str, control: C) -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                registry: DeviceRegistry::new(),
                state: GuardState::Enabled,
                in_flight: None,
                deferred: false,
            }),
            matcher: Mutex::new(PassphraseMatcher::new(passphrase)),
            allow_list,
            control,
        }
    }

    /// Handle a device attach event
    ///
    /// The device is tracked unconditionally (duplicates included). If it
    /// leaves the registry with unauthorized devices while the guard is
    /// `Enabled`, the disable transition fires. A control failure is
    /// returned after the device is already tracked; the guard stays
    /// `Enabled` and the next attach retries.
    pub async fn on_attach(&self, identity: DeviceIdentity) -> Result<DeviceHandle> {
        let mut inner = self.inner.lock().await;
        let handle = inner.registry.insert(identity.clone());
        let unauthorized = inner.registry.count_unauthorized(&self.allow_list);
        info!("device connected: {} ({} unauthorized)", identity, unauthorized);

        if inner.in_flight.is_some() {
            debug!("transition in flight, attach will be settled once it lands");
            inner.deferred = true;
            return Ok(handle);
        }
        if unauthorized == 0 {
            debug!("all connected devices are allowed, network untouched");
            return Ok(handle);
        }
        if inner.state == GuardState::Disabled {
            debug!("network already disabled, nothing to do");
            return Ok(handle);
        }

        info!("{} unauthorized device(s) connected, disabling network", unauthorized);
        inner.in_flight = Some(Transition::Disable);
        drop(inner);

        self.run_transition(Transition::Disable).await?;
        Ok(handle)
    }

    /// Handle a device detach event
    ///
    /// Removes every tracked entry the identity matches (a detach for an
    /// unknown identity is a silent no-op) and, when the last unauthorized
    /// device is gone while the guard is `Disabled`, fires the enable
    /// transition. Returns how many entries were removed.
    pub async fn on_detach(&self, identity: &DeviceIdentity) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let removed = inner.registry.remove(identity);
        if removed == 0 {
            debug!("detach for untracked device {}, ignoring", identity);
            return Ok(0);
        }
        info!("device disconnected: {} ({} entries removed)", identity, removed);

        if inner.in_flight.is_some() {
            debug!("transition in flight, detach will be settled once it lands");
            inner.deferred = true;
            return Ok(removed);
        }
        if inner.state == GuardState::Enabled {
            return Ok(removed);
        }
        let unauthorized = inner.registry.count_unauthorized(&self.allow_list);
        if unauthorized > 0 {
            info!("{} unauthorized device(s) still connected, network stays down", unauthorized);
            return Ok(removed);
        }

        info!("all unauthorized devices disconnected, enabling network");
        inner.in_flight = Some(Transition::Enable);
        drop(inner);

        self.run_transition(Transition::Enable).await?;
        Ok(removed)
    }

    /// Handle a key-down event
    ///
    /// Keystrokes are ignored while the guard is `Enabled`, so no partial
    /// match accumulates before a lock event. A full match forces the enable
    /// transition regardless of the unauthorized count.
    pub async fn on_key(&self, c: char) -> Result<MatchResult> {
        // State check and matcher feed share one critical section so an
        // enable committing in between cannot let a keystroke extend the
        // prefix while the guard is already `Enabled`.
        let mut inner = self.inner.lock().await;
        if inner.state == GuardState::Enabled {
            return Ok(MatchResult::NoMatch);
        }

        let result = self.matcher.lock().await.feed(c);
        if result != MatchResult::Matched {
            return Ok(result);
        }

        info!("passphrase matched, enabling network");
        if inner.in_flight.is_some() {
            // An enable is already on its way; the match is consumed.
            return Ok(result);
        }
        inner.in_flight = Some(Transition::Enable);
        drop(inner);

        self.run_transition(Transition::Enable).await?;
        Ok(result)
    }

    /// Current guard state
    pub async fn state(&self) -> GuardState {
        self.inner.lock().await.state
    }

    /// Number of tracked devices
    pub async fn connected(&self) -> usize {
        self.inner.lock().await.registry.len()
    }

    /// Number of tracked devices absent from the allow-list
    pub async fn unauthorized(&self) -> usize {
        self.inner
            .lock()
            .await
            .registry
            .count_unauthorized(&self.allow_list)
    }

    /// Perform a transition previously marked in flight
    ///
    /// Called with the state lock released. Commits the new state only on
    /// confirmed success; on failure the state is untouched and the error
    /// propagates to the caller. When the registry changed mid-flight, the
    /// landed state is re-checked against it and the compensating transition
    /// runs until the guard is quiescent, so an attach racing an enable (or a
    /// detach racing a disable) cannot strand the network in the wrong state.
    async fn run_transition(&self, transition: Transition) -> Result<()> {
        let mut current = transition;
        let mut first_error = None;

        loop {
            let result = match current {
                Transition::Disable => self.control.disable().await,
                Transition::Enable => self.control.enable().await,
            };

            let mut inner = self.inner.lock().await;
            inner.in_flight = None;
            match result {
                Ok(()) => {
                    inner.state = match current {
                        Transition::Disable => GuardState::Disabled,
                        Transition::Enable => GuardState::Enabled,
                    };
                    match inner.state {
                        GuardState::Disabled => info!("network is down"),
                        GuardState::Enabled => info!("network is available again"),
                    }
                }
                Err(e) => {
                    match current {
                        Transition::Disable => warn!("unable to disable network: {}", e),
                        Transition::Enable => warn!("unable to enable network: {}", e),
                    }
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }

            if !inner.deferred {
                break;
            }
            inner.deferred = false;

            let unauthorized = inner.registry.count_unauthorized(&self.allow_list);
            let next = match inner.state {
                GuardState::Enabled if unauthorized > 0 => Some(Transition::Disable),
                GuardState::Disabled if unauthorized == 0 => Some(Transition::Enable),
                _ => None,
            };
            let Some(next) = next else {
                break;
            };

            info!("settling registry change that arrived mid-transition");
            inner.in_flight = Some(next);
            current = next;
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(GuardError::Control(e)),
        }
    }
}
